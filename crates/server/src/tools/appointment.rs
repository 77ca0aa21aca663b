//! record_appointment tool implementation.
//!
//! Feeds bookings into the in-process store so warming and slot planning
//! see them. Addresses are geocoded through the cache when no location is
//! given, and the area is filled in from the boundary check.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use fieldroute_core::geocode::Address;
use fieldroute_core::store::{Appointment, MemoryStore};
use fieldroute_core::{CacheManager, Error, GeoPoint};

use super::{json_result, parse_date};

fn default_duration() -> u32 {
    45
}

/// Input parameters for record_appointment tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecordAppointmentParams {
    /// Booking id; recording the same id again replaces the booking.
    pub id: String,

    /// Visit date as YYYY-MM-DD.
    pub date: String,

    pub address: Address,

    /// Known coordinates. Looked up through the geocoding cache when absent.
    #[serde(default)]
    pub location: Option<GeoPoint>,

    /// Visit length in minutes (default 45).
    #[serde(default = "default_duration")]
    pub duration_minutes: u32,
}

/// Output structure for record_appointment tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecordAppointmentOutput {
    pub appointment: Appointment,
    /// False when the address could not be located; warming retries it later.
    pub geocoded: bool,
}

/// Implementation of the record_appointment tool.
pub async fn record_appointment_impl(
    manager: &CacheManager, store: &MemoryStore, params: RecordAppointmentParams,
) -> Result<CallToolResult, McpError> {
    if params.id.trim().is_empty() {
        return Err(Error::InvalidInput("id cannot be empty".into()).into());
    }
    let date = parse_date(&params.date)?;

    let boundary = manager.validate_address(&params.address).await?;

    let location = match params.location {
        Some(point) => {
            point.validate()?;
            Some(point)
        }
        None => match manager.geocoding().resolve(&params.address).await {
            Ok(result) => Some(result.location),
            Err(e) => {
                tracing::warn!(id = %params.id, error = %e, "appointment recorded without coordinates");
                None
            }
        },
    };

    let appointment = Appointment {
        id: params.id,
        date,
        address: params.address,
        location,
        service_area_id: boundary.service_area_id.filter(|_| boundary.valid),
        duration_minutes: params.duration_minutes,
    };
    store.add_appointment(appointment.clone()).await;
    if let Some(area_id) = &appointment.service_area_id {
        manager.routes().invalidate_route_cluster(area_id, date).await;
    }

    json_result(&RecordAppointmentOutput { geocoded: location.is_some(), appointment })
}
