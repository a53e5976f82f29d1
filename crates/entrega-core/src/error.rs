use std::time::Duration;

use thiserror::Error;

/// Boxed error for failures raised by user-supplied code: handlers,
/// extractors, custom codecs.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Transport-level failures from the broker channel. Channel operations can
/// only fail this way; domain failures never reach this type.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,

    #[error("unknown delivery tag: {0}")]
    UnknownDeliveryTag(u64),

    #[error("transport error: {0}")]
    Transport(String),
}

/// A delivery body the codec could not turn into a payload.
#[derive(Debug, Error)]
#[error("malformed delivery payload: {0}")]
pub struct ConvertError(pub String);

impl From<serde_json::Error> for ConvertError {
    fn from(err: serde_json::Error) -> Self {
        ConvertError(err.to_string())
    }
}

/// A broker-facing acknowledgment call that failed. The gate's decision slot
/// stays taken, so the call is never retried for this delivery.
#[derive(Debug, Error)]
#[error("acknowledgment failed for delivery {delivery_tag}: {source}")]
pub struct AckError {
    pub delivery_tag: u64,
    #[source]
    pub source: ChannelError,
}

/// An extractor that aborted the pre-handler pipeline.
#[derive(Debug, Error)]
#[error("extractor `{extractor}` failed: {source}")]
pub struct ExtractError {
    pub extractor: String,
    #[source]
    pub source: BoxError,
}

/// Business handler failure modes.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(#[source] BoxError),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error("handler exceeded its {}ms budget", .0.as_millis())]
    TimedOut(Duration),
}

/// Everything a single dispatch can fail with, in pipeline order. This is
/// the type handed to a consumer's error hook.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Ack(#[from] AckError),
}

impl DispatchError {
    /// Stable pipeline-stage label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Convert(_) => "convert",
            DispatchError::Extract(_) => "extract",
            DispatchError::Handler(_) => "handler",
            DispatchError::Ack(_) => "ack",
        }
    }
}

/// Consumer start failures.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("no handler registered for queue {0}")]
    MissingHandler(String),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}
