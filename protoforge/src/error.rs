//! Error types raised by generated code at runtime.
//!
//! - [`DecodeError`]: malformed binary wire data
//! - [`JsonError`]: JSON values that cannot be coerced to the field type
//! - [`RpcError`]: failures surfaced by generated clients

/// Malformed wire data encountered while decoding a message.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The buffer ended before the value being read was complete.
    #[error("malformed wire data: unexpected end of buffer at offset {offset}")]
    Truncated { offset: usize },

    /// A varint ran longer than ten bytes.
    #[error("malformed wire data: varint at offset {offset} is longer than 10 bytes")]
    VarintOverflow { offset: usize },

    /// A tag carried a wire type that cannot be skipped.
    #[error("malformed wire data: invalid wire type {wire_type} at offset {offset}")]
    InvalidWireType { wire_type: u32, offset: usize },

    /// A length prefix pointed past the end of the enclosing frame.
    #[error("malformed wire data: length {length} at offset {offset} overruns the frame")]
    FrameOverrun { offset: usize, length: usize },

    /// The last field of a frame ended past the frame boundary.
    #[error("malformed wire data: field ended at offset {position}, frame ends at {end}")]
    FieldOverrun { position: usize, end: usize },

    /// A string field was not valid UTF-8.
    #[error("malformed wire data: string field at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },

    /// A start-group tag had no matching end-group tag.
    #[error("malformed wire data: unterminated group starting at offset {offset}")]
    UnterminatedGroup { offset: usize },

    /// Sub-messages or groups nested deeper than the reader allows.
    #[error("malformed wire data: nesting at offset {offset} exceeds {limit} levels")]
    RecursionLimit { offset: usize, limit: u32 },
}

/// A JSON value that does not fit the field it is assigned to.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum JsonError {
    #[error("expected {expected}, found {found}")]
    InvalidValue {
        expected: &'static str,
        found: String,
    },

    #[error("number {value} is out of range for {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("invalid base64: {0}")]
    Base64(String),

    #[error("invalid timestamp: {0}")]
    Timestamp(String),

    #[error("invalid map key {key:?}")]
    MapKey { key: String },
}

impl JsonError {
    pub(crate) fn invalid(expected: &'static str, found: &serde_json::Value) -> Self {
        let found = match found {
            serde_json::Value::Null => "null".to_string(),
            serde_json::Value::Bool(b) => format!("boolean {b}"),
            serde_json::Value::Number(n) => format!("number {n}"),
            serde_json::Value::String(s) => format!("string {s:?}"),
            serde_json::Value::Array(_) => "array".to_string(),
            serde_json::Value::Object(_) => "object".to_string(),
        };
        JsonError::InvalidValue { expected, found }
    }
}

/// Errors returned by generated clients.
///
/// `Clone` so a single batch failure can be delivered to every caller that
/// shared the batch.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RpcError {
    /// The transport failed to deliver the request or response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response bytes were not a valid message.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A batch call returned a different number of results than keys.
    #[error("batch returned {actual} results for {expected} keys")]
    BatchMismatch { expected: usize, actual: usize },

    /// The transport does not implement the requested call shape.
    #[error("unimplemented: {0}")]
    Unimplemented(String),

    /// A pending load was dropped before its batch completed.
    #[error("request canceled before the batch completed")]
    Canceled,
}

impl RpcError {
    /// Create a transport error from any displayable message.
    pub fn transport<S: Into<String>>(message: S) -> Self {
        RpcError::Transport(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_errors_mention_malformed_wire() {
        let err = DecodeError::Truncated { offset: 3 };
        assert_eq!(
            err.to_string(),
            "malformed wire data: unexpected end of buffer at offset 3"
        );
    }

    #[test]
    fn json_error_describes_found_value() {
        let err = JsonError::invalid("an integer", &json!("abc"));
        assert_eq!(err.to_string(), "expected an integer, found string \"abc\"");
    }

    #[test]
    fn rpc_error_wraps_decode_error() {
        let err: RpcError = DecodeError::InvalidUtf8 { offset: 0 }.into();
        assert!(matches!(err, RpcError::Decode(_)));
    }
}
