//! slots_context tool implementation.
//!
//! Returns, per service area, the day's appointments with their centroid
//! distances and the optimized visiting order.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use fieldroute_core::CacheManager;

use super::{json_result, parse_date};

/// Input parameters for slots_context tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SlotsContextParams {
    /// Day to plan, as YYYY-MM-DD.
    pub date: String,
}

/// Implementation of the slots_context tool.
pub async fn slots_context_impl(manager: &CacheManager, params: SlotsContextParams) -> Result<CallToolResult, McpError> {
    let date = parse_date(&params.date)?;
    let context = manager.slots_context(date).await?;
    json_result(&context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::tools::test_support::{manager, output_json};
    use chrono::NaiveDate;
    use fieldroute_core::GeoPoint;
    use fieldroute_core::geocode::Address;
    use fieldroute_core::store::Appointment;

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date(" 2026-10-19 ").unwrap(), NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert!(matches!(parse_date("19/10/2026"), Err(ToolError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_slots_context_empty_day() {
        let (manager, _) = manager().await;
        let params = SlotsContextParams { date: "2026-10-19".into() };

        let result = slots_context_impl(&manager, params).await.unwrap();
        let output = output_json(&result);

        assert_eq!(output["date"], "2026-10-19");
        assert_eq!(output["areas"][0]["area_id"], "limburg-south");
        assert!(output["areas"][0]["cluster"].is_null());
        assert!(output["areas"][0]["matrix"].is_null());
    }

    #[tokio::test]
    async fn test_slots_context_with_appointments() {
        let (manager, store) = manager().await;
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        for (id, lat) in [("a1", 50.90), ("a2", 50.86)] {
            store
                .add_appointment(Appointment {
                    id: id.into(),
                    date,
                    address: Address::from_postal_code("6221AB"),
                    location: Some(GeoPoint::new(lat, 5.70).unwrap()),
                    service_area_id: Some("limburg-south".into()),
                    duration_minutes: 30,
                })
                .await;
        }

        let result = slots_context_impl(&manager, SlotsContextParams { date: "2026-10-19".into() })
            .await
            .unwrap();
        let output = output_json(&result);
        let area = &output["areas"][0];

        assert_eq!(area["appointments"].as_array().unwrap().len(), 2);
        assert_eq!(area["matrix"]["rows"][0].as_array().unwrap().len(), 2);
        assert_eq!(area["cluster"]["route"]["source"], "fallback");
        assert_eq!(area["time_windows"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_slots_context_bad_date() {
        let (manager, _) = manager().await;
        let err = slots_context_impl(&manager, SlotsContextParams { date: "tomorrow".into() })
            .await
            .unwrap_err();
        assert_eq!(err.code.0, -32602);
    }
}
