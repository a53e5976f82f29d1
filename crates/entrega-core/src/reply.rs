use async_trait::async_trait;

use crate::error::ChannelError;

/// Producer handle for RPC-style consumers: publishes a response body to the
/// address a request named in its `reply_to` property. Supplied by the
/// transport layer and attached per consumer; handlers that never reply do
/// not need one.
#[async_trait]
pub trait ReplyProducer: Send + Sync {
    async fn reply(
        &self,
        reply_to: &str,
        correlation_id: Option<&str>,
        body: Vec<u8>,
    ) -> Result<(), ChannelError>;
}
