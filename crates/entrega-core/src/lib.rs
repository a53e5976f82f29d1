pub mod channel;
pub mod codec;
pub mod consumer;
pub mod context;
pub mod error;
pub mod extract;
pub mod gate;
pub mod message;
pub mod metrics;
pub mod reply;
pub mod telemetry;

pub use channel::{AckChannel, ChannelFactory};
pub use codec::{JsonCodec, MessageCodec};
pub use consumer::{Consumer, ConsumerBuilder, ErrorHook, Handler, LifecycleHooks};
pub use context::{ConsumerTuning, Context, ContextConfig, IdGenerator};
pub use error::{
    AckError, BoxError, ChannelError, ConvertError, DispatchError, ExtractError, HandlerError,
    StartError,
};
pub use extract::Extractor;
pub use gate::{AckGate, AckMode, Decision};
pub use message::{DeliveryInfo, Message, Properties, RawDelivery, TIMEOUT_HEADER, TimeBudget};
pub use reply::ReplyProducer;
