//! validate_address and validate_addresses tool implementations.
//!
//! Decides whether addresses fall inside a configured service area by
//! combining a postal-code range check with geocoding.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use fieldroute_core::boundary::ValidationResult;
use fieldroute_core::geocode::Address;
use fieldroute_core::{CacheManager, Error};

use super::json_result;

/// Input parameters for validate_address tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ValidateAddressParams {
    /// The address to check. At least one field must be non-empty.
    pub address: Address,
}

/// Input parameters for validate_addresses tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ValidateAddressesParams {
    /// Addresses to check; validated in batches.
    pub addresses: Vec<Address>,
}

/// Outcome for one address of a batch.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchValidationItem {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ValidationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Output structure for validate_addresses tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ValidateAddressesOutput {
    pub items: Vec<BatchValidationItem>,
    pub valid: usize,
    pub invalid: usize,
    pub failed: usize,
}

/// Implementation of the validate_address tool.
pub async fn validate_address_impl(
    manager: &CacheManager, params: ValidateAddressParams,
) -> Result<CallToolResult, McpError> {
    let result = manager.validate_address(&params.address).await?;
    json_result(&result)
}

/// Implementation of the validate_addresses tool.
pub async fn validate_addresses_impl(
    manager: &CacheManager, params: ValidateAddressesParams,
) -> Result<CallToolResult, McpError> {
    if params.addresses.is_empty() {
        return Err(Error::InvalidInput("addresses cannot be empty".into()).into());
    }

    let results = manager.validate_batch(&params.addresses).await?;

    let items: Vec<BatchValidationItem> = results
        .into_iter()
        .enumerate()
        .map(|(index, outcome)| match outcome {
            Ok(result) => BatchValidationItem { index, result: Some(result), error: None },
            Err(e) => BatchValidationItem { index, result: None, error: Some(e.to_string()) },
        })
        .collect();

    let valid = items.iter().filter(|i| i.result.as_ref().is_some_and(|r| r.valid)).count();
    let failed = items.iter().filter(|i| i.error.is_some()).count();
    let output = ValidateAddressesOutput { invalid: items.len() - valid - failed, valid, failed, items };

    json_result(&output)
}
