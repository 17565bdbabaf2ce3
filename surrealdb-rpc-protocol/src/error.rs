//! Protocol error types and server error codes.

use std::fmt;
use thiserror::Error;

/// Errors raised while decoding MessagePack bytes into a [`Value`](crate::Value).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("truncated input: need {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("unknown extension tag: {0}")]
    UnknownExtension(i8),

    #[error("malformed input: {0}")]
    Malformed(String),
}

impl DecodeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        DecodeError::Malformed(reason.into())
    }
}

/// Errors raised while parsing the text forms of identifiers and scalar types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing ':' between table and id in {0:?}")]
    MissingSeparator(String),

    #[error("empty table name")]
    EmptyTable,

    #[error("empty record id")]
    EmptyId,

    #[error("unexpected {found} at offset {offset}, expected {expected}")]
    Unexpected {
        offset: usize,
        expected: &'static str,
        found: String,
    },

    #[error("unterminated {0}")]
    Unterminated(&'static str),

    #[error("integer out of range: {0}")]
    IntegerOverflow(String),

    #[error("invalid uuid: {0:?}")]
    InvalidUuid(String),

    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),

    #[error("invalid datetime {input:?}: {reason}")]
    InvalidDatetime { input: String, reason: String },

    #[error("invalid decimal: {0:?}")]
    InvalidDecimal(String),

    #[error("trailing characters at offset {0}")]
    TrailingCharacters(usize),

    #[error("nesting deeper than {0} levels")]
    NestingTooDeep(usize),
}

/// Envelope-level errors: a frame decoded, but is not a valid RPC message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Error codes returned by the server in `error.code`.
///
/// The numbering follows JSON-RPC; codes this client does not know are
/// preserved in [`ErrorCode::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    MethodNotAllowed,
    InvalidParams,
    LiveQueryNotSupported,
    BadLiveQueryConfig,
    BadGraphQlConfig,
    InternalError,
    Thrown,
    Other(i64),
}

impl ErrorCode {
    pub fn from_code(code: i64) -> Self {
        match code {
            -32700 => ErrorCode::ParseError,
            -32600 => ErrorCode::InvalidRequest,
            -32601 => ErrorCode::MethodNotFound,
            -32602 => ErrorCode::MethodNotAllowed,
            -32603 => ErrorCode::InvalidParams,
            -32604 => ErrorCode::LiveQueryNotSupported,
            -32605 => ErrorCode::BadLiveQueryConfig,
            -32606 => ErrorCode::BadGraphQlConfig,
            -32000 => ErrorCode::InternalError,
            -32006 => ErrorCode::Thrown,
            other => ErrorCode::Other(other),
        }
    }

    /// Returns the numeric code as sent on the wire.
    pub fn code(&self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::MethodNotAllowed => -32602,
            ErrorCode::InvalidParams => -32603,
            ErrorCode::LiveQueryNotSupported => -32604,
            ErrorCode::BadLiveQueryConfig => -32605,
            ErrorCode::BadGraphQlConfig => -32606,
            ErrorCode::InternalError => -32000,
            ErrorCode::Thrown => -32006,
            ErrorCode::Other(code) => *code,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::ParseError => write!(f, "PARSE_ERROR"),
            ErrorCode::InvalidRequest => write!(f, "INVALID_REQUEST"),
            ErrorCode::MethodNotFound => write!(f, "METHOD_NOT_FOUND"),
            ErrorCode::MethodNotAllowed => write!(f, "METHOD_NOT_ALLOWED"),
            ErrorCode::InvalidParams => write!(f, "INVALID_PARAMS"),
            ErrorCode::LiveQueryNotSupported => write!(f, "LIVE_QUERY_NOT_SUPPORTED"),
            ErrorCode::BadLiveQueryConfig => write!(f, "BAD_LIVE_QUERY_CONFIG"),
            ErrorCode::BadGraphQlConfig => write!(f, "BAD_GRAPHQL_CONFIG"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
            ErrorCode::Thrown => write!(f, "THROWN"),
            ErrorCode::Other(code) => write!(f, "ERROR({})", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        for code in [
            -32700, -32600, -32601, -32602, -32603, -32604, -32605, -32606, -32000, -32006,
        ] {
            assert_eq!(ErrorCode::from_code(code).code(), code);
        }

        assert_eq!(ErrorCode::from_code(-32601), ErrorCode::MethodNotFound);
        assert_eq!(ErrorCode::from_code(42), ErrorCode::Other(42));
        assert_eq!(ErrorCode::Other(42).code(), 42);
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(format!("{}", ErrorCode::ParseError), "PARSE_ERROR");
        assert_eq!(format!("{}", ErrorCode::MethodNotFound), "METHOD_NOT_FOUND");
        assert_eq!(format!("{}", ErrorCode::InternalError), "INTERNAL_ERROR");
        assert_eq!(format!("{}", ErrorCode::BadGraphQlConfig), "BAD_GRAPHQL_CONFIG");
        assert_eq!(format!("{}", ErrorCode::Other(7)), "ERROR(7)");
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::Truncated {
            needed: 10,
            available: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("3"));

        let err = DecodeError::UnknownExtension(99);
        assert!(err.to_string().contains("99"));

        let err = DecodeError::malformed("reserved marker");
        assert!(err.to_string().contains("reserved marker"));
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::MissingField("result");
        assert!(err.to_string().contains("result"));

        let err = ProtocolError::from(DecodeError::UnknownExtension(64));
        assert!(err.to_string().contains("64"));

        let err = ProtocolError::InvalidField {
            field: "id",
            reason: "expected integer".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("id"));
        assert!(msg.contains("expected integer"));
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::Unexpected {
            offset: 4,
            expected: "':'",
            found: "'x'".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("offset 4"));
        assert!(msg.contains("':'"));

        let err = ParseError::IntegerOverflow("99999999999999999999".to_string());
        assert!(err.to_string().contains("99999999999999999999"));
    }
}
