use super::*;

use std::sync::atomic::AtomicU64;

// --- channel doubles ---

/// One recorded broker-facing acknowledgment call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum AckCall {
    Ack {
        delivery_tag: u64,
        multiple: bool,
    },
    Nack {
        delivery_tag: u64,
        multiple: bool,
        requeue: bool,
    },
}

/// Channel double that records every call and can be told to fail or to
/// stall before a call takes effect.
pub(super) struct RecordingChannel {
    pub(super) calls: Mutex<Vec<AckCall>>,
    pub(super) fail: AtomicBool,
    pub(super) stall_ms: AtomicU64,
}

impl RecordingChannel {
    pub(super) fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            stall_ms: AtomicU64::new(0),
        })
    }

    pub(super) fn calls(&self) -> Vec<AckCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Make every later broker call sleep before taking effect.
    pub(super) fn stall_for(&self, delay: Duration) {
        self.stall_ms
            .store(delay.as_millis() as u64, Ordering::Release);
    }

    async fn stall(&self) {
        let ms = self.stall_ms.load(Ordering::Acquire);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl AckChannel for RecordingChannel {
    async fn basic_ack(&self, delivery_tag: u64, multiple: bool) -> Result<(), ChannelError> {
        self.stall().await;
        if self.fail.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }
        self.calls.lock().unwrap().push(AckCall::Ack {
            delivery_tag,
            multiple,
        });
        Ok(())
    }

    async fn basic_nack(
        &self,
        delivery_tag: u64,
        multiple: bool,
        requeue: bool,
    ) -> Result<(), ChannelError> {
        self.stall().await;
        if self.fail.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }
        self.calls.lock().unwrap().push(AckCall::Nack {
            delivery_tag,
            multiple,
            requeue,
        });
        Ok(())
    }
}

pub(super) struct FixedFactory {
    pub(super) channel: Arc<RecordingChannel>,
}

impl ChannelFactory for FixedFactory {
    fn acquire(&self) -> Result<Arc<dyn AckChannel>, ChannelError> {
        Ok(self.channel.clone())
    }
}

pub(super) fn test_context(channel: Arc<RecordingChannel>) -> Context {
    Context::new(ContextConfig::default(), Arc::new(FixedFactory { channel }))
}

/// Start `builder` over a fresh recording channel.
pub(super) fn started_consumer(builder: ConsumerBuilder) -> (Consumer, Arc<RecordingChannel>) {
    let channel = RecordingChannel::new();
    let context = test_context(channel.clone());
    let consumer = builder.start(&context).expect("start consumer");
    (consumer, channel)
}

// --- delivery builders ---

pub(super) fn raw_json(delivery_tag: u64, payload: serde_json::Value) -> RawDelivery {
    RawDelivery {
        consumer_tag: "ctag-test".to_string(),
        info: DeliveryInfo {
            delivery_tag,
            exchange: String::new(),
            routing_key: "orders".to_string(),
            redelivered: false,
        },
        props: Properties::default(),
        body: payload.to_string().into_bytes(),
    }
}

pub(super) fn raw_with_props(delivery_tag: u64, props: Properties) -> RawDelivery {
    RawDelivery {
        props,
        ..raw_json(delivery_tag, serde_json::json!({}))
    }
}

// --- handler doubles ---

pub(super) struct OkHandler;

#[async_trait]
impl Handler for OkHandler {
    async fn handle(&self, _message: &Message) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Acks the message, then optionally fails.
pub(super) struct AckingHandler {
    pub(super) fail_after: bool,
}

#[async_trait]
impl Handler for AckingHandler {
    async fn handle(&self, message: &Message) -> Result<(), BoxError> {
        message.ack().await?;
        if self.fail_after {
            return Err("post-ack failure".into());
        }
        Ok(())
    }
}

pub(super) struct FailingHandler;

#[async_trait]
impl Handler for FailingHandler {
    async fn handle(&self, _message: &Message) -> Result<(), BoxError> {
        Err("handler exploded".into())
    }
}

pub(super) struct PanickingHandler;

#[async_trait]
impl Handler for PanickingHandler {
    async fn handle(&self, _message: &Message) -> Result<(), BoxError> {
        panic!("handler panicked on purpose");
    }
}

pub(super) struct SlowHandler {
    pub(super) sleep: Duration,
}

#[async_trait]
impl Handler for SlowHandler {
    async fn handle(&self, _message: &Message) -> Result<(), BoxError> {
        tokio::time::sleep(self.sleep).await;
        Ok(())
    }
}

/// Everything a handler can observe about one message.
#[derive(Debug, Clone)]
pub(super) struct CapturedView {
    pub(super) body: Vec<u8>,
    pub(super) payload: serde_json::Value,
    pub(super) headers: HashMap<String, String>,
    pub(super) extensions: HashMap<String, String>,
    pub(super) stale: bool,
    pub(super) budget: Option<TimeBudget>,
    pub(super) redelivered: bool,
}

pub(super) struct CapturingHandler {
    pub(super) seen: Arc<Mutex<Vec<CapturedView>>>,
}

#[async_trait]
impl Handler for CapturingHandler {
    async fn handle(&self, message: &Message) -> Result<(), BoxError> {
        self.seen.lock().unwrap().push(CapturedView {
            body: message.body().to_vec(),
            payload: message.payload().clone(),
            headers: message.props().headers.clone(),
            extensions: message.extensions().clone(),
            stale: message.is_stale(),
            budget: message.time_budget(),
            redelivered: message.info().redelivered,
        });
        Ok(())
    }
}

// --- extractor doubles ---

/// Appends its name to a shared run log and stamps the extension map.
pub(super) struct OrderedExtractor {
    pub(super) name: &'static str,
    pub(super) order: Arc<Mutex<Vec<&'static str>>>,
}

impl Extractor for OrderedExtractor {
    fn name(&self) -> &str {
        self.name
    }

    fn extract(&self, message: &mut Message) -> Result<(), BoxError> {
        self.order.lock().unwrap().push(self.name);
        message
            .extensions_mut()
            .insert(self.name.to_string(), "ran".to_string());
        Ok(())
    }
}

pub(super) struct FailingExtractor {
    pub(super) name: &'static str,
}

impl Extractor for FailingExtractor {
    fn name(&self) -> &str {
        self.name
    }

    fn extract(&self, _message: &mut Message) -> Result<(), BoxError> {
        Err("extraction failed".into())
    }
}

pub(super) struct PanickingExtractor;

impl Extractor for PanickingExtractor {
    fn name(&self) -> &str {
        "panicking"
    }

    fn extract(&self, _message: &mut Message) -> Result<(), BoxError> {
        panic!("extractor panicked on purpose");
    }
}

// --- hook doubles ---

/// Records `(delivery_tag, stage)` for every reported failure.
pub(super) struct RecordingHook {
    pub(super) errors: Arc<Mutex<Vec<(u64, &'static str)>>>,
}

#[async_trait]
impl ErrorHook for RecordingHook {
    async fn on_error(&self, message: &Message, error: &DispatchError) {
        self.errors
            .lock()
            .unwrap()
            .push((message.delivery_tag(), error.kind()));
    }
}

/// Records the rendered error text.
pub(super) struct RenderingHook {
    pub(super) rendered: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ErrorHook for RenderingHook {
    async fn on_error(&self, _message: &Message, error: &DispatchError) {
        self.rendered.lock().unwrap().push(error.to_string());
    }
}

/// Decides the gate itself: rejects without requeue.
pub(super) struct DecidingHook;

#[async_trait]
impl ErrorHook for DecidingHook {
    async fn on_error(&self, message: &Message, _error: &DispatchError) {
        let _ = message.nack(false).await;
    }
}

pub(super) struct PanickingHook;

#[async_trait]
impl ErrorHook for PanickingHook {
    async fn on_error(&self, _message: &Message, _error: &DispatchError) {
        panic!("hook panicked on purpose");
    }
}

// --- lifecycle doubles ---

/// Records lifecycle events in arrival order.
pub(super) struct RecordingLifecycle {
    pub(super) events: Arc<Mutex<Vec<String>>>,
}

impl LifecycleHooks for RecordingLifecycle {
    fn consume_ok(&self, consumer_tag: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("consume-ok:{consumer_tag}"));
    }

    fn cancel_ok(&self, consumer_tag: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("cancel-ok:{consumer_tag}"));
    }

    fn cancel(&self, consumer_tag: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("cancel:{consumer_tag}"));
    }

    fn shutdown(&self, consumer_tag: &str, reason: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("shutdown:{consumer_tag}:{reason}"));
    }

    fn recover_ok(&self, consumer_tag: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("recover-ok:{consumer_tag}"));
    }
}
