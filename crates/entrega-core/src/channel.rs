use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ChannelError;

/// Broker acknowledgment operations, as exposed by the transport client.
/// Implementations must be thread-safe: one channel is shared by every
/// delivery task of a consumer.
///
/// `multiple` mirrors the wire protocol's batch flag (true covers every
/// outstanding delivery up to and including `delivery_tag`). The dispatch
/// pipeline always passes false; the flag exists so adapters can expose the
/// full broker surface.
#[async_trait]
pub trait AckChannel: Send + Sync {
    /// Positively acknowledge `delivery_tag`.
    async fn basic_ack(&self, delivery_tag: u64, multiple: bool) -> Result<(), ChannelError>;

    /// Negatively acknowledge `delivery_tag`, optionally requeueing it for
    /// redelivery.
    async fn basic_nack(
        &self,
        delivery_tag: u64,
        multiple: bool,
        requeue: bool,
    ) -> Result<(), ChannelError>;
}

/// Yields broker-operation delegates. A consumer acquires its channel from
/// the factory exactly once, when it starts.
pub trait ChannelFactory: Send + Sync {
    fn acquire(&self) -> Result<Arc<dyn AckChannel>, ChannelError>;
}
