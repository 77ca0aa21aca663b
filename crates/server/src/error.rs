//! Structured errors for the fieldroute server.
//!
//! Core errors convert to MCP errors in `fieldroute-core`; these cover
//! failures that only exist at the tool surface.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Errors raised while decoding tool arguments or encoding tool output.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// An argument failed to parse (e.g., a malformed date).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Tool output could not be serialized.
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(String),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let (code, message) = match &err {
            ToolError::InvalidInput(msg) => (-32602, msg.clone()),
            ToolError::Serialization(msg) => (-32002, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_codes() {
        let err: McpError = ToolError::InvalidInput("bad date".into()).into();
        assert_eq!(err.code.0, -32602);
        assert_eq!(err.message, "bad date");

        let err: McpError = ToolError::Serialization("nan".into()).into();
        assert_eq!(err.code.0, -32002);
    }
}
