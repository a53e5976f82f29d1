use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::error::{AckError, ConvertError};
use crate::gate::{AckGate, Decision};

/// Reserved header carrying a per-message processing budget in milliseconds.
/// Deliveries without it are never considered stale.
pub const TIMEOUT_HEADER: &str = "timeout";

/// Broker-assigned routing metadata for one delivery.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeliveryInfo {
    pub delivery_tag: u64,
    pub exchange: String,
    pub routing_key: String,
    pub redelivered: bool,
}

/// Message properties as published: creation timestamp, application headers,
/// and the reply-routing fields used by RPC-style consumers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Properties {
    /// Publish timestamp, milliseconds since the Unix epoch.
    pub timestamp_ms: Option<u64>,
    pub headers: HashMap<String, String>,
    pub reply_to: Option<String>,
    pub correlation_id: Option<String>,
}

/// One raw delivery as pushed by the broker client, before conversion.
#[derive(Debug, Clone)]
pub struct RawDelivery {
    pub consumer_tag: String,
    pub info: DeliveryInfo,
    pub props: Properties,
    pub body: Vec<u8>,
}

/// Resolved processing budget for a time-bound message. Attached once by the
/// staleness check; every later read sees the same values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBudget {
    pub budget_ms: u64,
    pub stale: bool,
}

/// One delivered unit of work, bound to its acknowledgment gate.
///
/// Body, envelope info, and properties are fixed at construction. The only
/// state that changes during dispatch is the gate's decision slot and the
/// extension map written by extractors.
#[derive(Debug)]
pub struct Message {
    consumer_tag: String,
    info: DeliveryInfo,
    props: Properties,
    body: Vec<u8>,
    payload: serde_json::Value,
    pub(crate) time_budget: Option<TimeBudget>,
    extensions: HashMap<String, String>,
    gate: AckGate,
}

impl Message {
    /// Assemble a message from a raw delivery, its decoded payload, and the
    /// gate that owns its acknowledgment.
    pub fn new(raw: RawDelivery, payload: serde_json::Value, gate: AckGate) -> Self {
        Self {
            consumer_tag: raw.consumer_tag,
            info: raw.info,
            props: raw.props,
            body: raw.body,
            payload,
            time_budget: None,
            extensions: HashMap::new(),
            gate,
        }
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    pub fn delivery_tag(&self) -> u64 {
        self.info.delivery_tag
    }

    pub fn info(&self) -> &DeliveryInfo {
        &self.info
    }

    pub fn props(&self) -> &Properties {
        &self.props
    }

    /// Look up one application header.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.props.headers.get(key).map(String::as_str)
    }

    /// The raw body bytes exactly as delivered.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The decoded payload produced by the consumer's codec. `Null` when the
    /// body could not be decoded (only error hooks see such messages).
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Deserialize the decoded payload into a concrete type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ConvertError> {
        serde_json::from_value(self.payload.clone()).map_err(ConvertError::from)
    }

    /// The resolved time budget. Present only on time-bound messages, after
    /// the staleness check ran.
    pub fn time_budget(&self) -> Option<TimeBudget> {
        self.time_budget
    }

    /// Whether the staleness check found this message past its budget.
    /// Informational: stale messages are still dispatched.
    pub fn is_stale(&self) -> bool {
        self.time_budget.is_some_and(|budget| budget.stale)
    }

    /// Extractor-attached state, keyed by extractor-chosen names.
    pub fn extensions(&self) -> &HashMap<String, String> {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.extensions
    }

    /// The acknowledgment gate bound to this delivery.
    pub fn gate(&self) -> &AckGate {
        &self.gate
    }

    /// Positively acknowledge this delivery. A no-op if a decision exists.
    pub async fn ack(&self) -> Result<(), AckError> {
        self.gate.accept().await
    }

    /// Negatively acknowledge this delivery, optionally requeueing it.
    /// A no-op if a decision exists.
    pub async fn nack(&self, requeue: bool) -> Result<(), AckError> {
        self.gate.reject(requeue).await
    }

    /// The decision currently recorded on the gate.
    pub fn decision(&self) -> Decision {
        self.gate.decision()
    }
}
