use crate::error::ConvertError;

/// Decodes a raw delivery body into the payload value handed to handlers.
/// Fixed per consumer at build time; a decode failure rejects the delivery
/// without requeue, since redelivering the same bytes cannot succeed.
pub trait MessageCodec: Send + Sync {
    fn decode(&self, body: &[u8]) -> Result<serde_json::Value, ConvertError>;
}

/// Default codec: the body is a single UTF-8 JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn decode(&self, body: &[u8]) -> Result<serde_json::Value, ConvertError> {
        serde_json::from_slice(body).map_err(ConvertError::from)
    }
}
