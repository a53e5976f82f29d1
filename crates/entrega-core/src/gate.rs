use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::channel::AckChannel;
use crate::error::{AckError, ChannelError};

/// How a consumer's deliveries are acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// Deliveries need an explicit ack or nack through the gate.
    #[default]
    Manual,
    /// The broker treats every delivery as acknowledged on send. The gate
    /// still records decisions, but never issues broker calls.
    Auto,
}

/// Terminal acknowledgment outcome for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Undecided,
    Accepted,
    Rejected { requeue: bool },
}

// Decision slot encoding. Written exactly once, by the winning
// compare-exchange.
const UNDECIDED: u8 = 0;
const ACCEPTED: u8 = 1;
const REJECTED: u8 = 2;
const REJECTED_REQUEUE: u8 = 3;

/// Single-use acknowledgment gate bound to one delivery.
///
/// The first `decide` call wins; every later call is a no-op regardless of
/// arguments. The slot is a lock-free compare-exchange, so callers racing
/// from different tasks (handler, error hook, the dispatcher's safety net)
/// can neither block each other nor acknowledge the same delivery twice.
pub struct AckGate {
    delivery_tag: u64,
    mode: AckMode,
    channel: Arc<dyn AckChannel>,
    decision: AtomicU8,
}

impl AckGate {
    pub fn new(delivery_tag: u64, mode: AckMode, channel: Arc<dyn AckChannel>) -> Self {
        Self {
            delivery_tag,
            mode,
            channel,
            decision: AtomicU8::new(UNDECIDED),
        }
    }

    /// Record a terminal decision and, in manual mode, issue the single
    /// broker-facing call. Losing callers get `Ok(())` and no side effect.
    ///
    /// The slot flips before the broker call, so a failed call leaves the
    /// decision taken: it is never retried and no second call can fire for
    /// this delivery. The call itself runs on its own task: once the slot is
    /// claimed it must reach the broker even when the caller is cancelled
    /// mid-await, as when a handler acking on a slow channel hits its time
    /// budget.
    pub async fn decide(&self, accept: bool, requeue: bool) -> Result<(), AckError> {
        let slot = match (accept, requeue) {
            (true, _) => ACCEPTED,
            (false, true) => REJECTED_REQUEUE,
            (false, false) => REJECTED,
        };
        if self
            .decision
            .compare_exchange(UNDECIDED, slot, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        if self.mode == AckMode::Auto {
            return Ok(());
        }

        let channel = Arc::clone(&self.channel);
        let delivery_tag = self.delivery_tag;
        let call = tokio::spawn(async move {
            if accept {
                channel.basic_ack(delivery_tag, false).await
            } else {
                channel.basic_nack(delivery_tag, false, requeue).await
            }
        });
        match call.await {
            Ok(outcome) => outcome.map_err(|source| AckError {
                delivery_tag: self.delivery_tag,
                source,
            }),
            Err(join_error) => Err(AckError {
                delivery_tag: self.delivery_tag,
                source: ChannelError::Transport(join_error.to_string()),
            }),
        }
    }

    /// Shorthand for `decide(true, false)`.
    pub async fn accept(&self) -> Result<(), AckError> {
        self.decide(true, false).await
    }

    /// Shorthand for `decide(false, requeue)`.
    pub async fn reject(&self, requeue: bool) -> Result<(), AckError> {
        self.decide(false, requeue).await
    }

    /// The decision as currently visible. `Undecided` only before the first
    /// `decide` call wins its compare-exchange.
    pub fn decision(&self) -> Decision {
        match self.decision.load(Ordering::Acquire) {
            ACCEPTED => Decision::Accepted,
            REJECTED => Decision::Rejected { requeue: false },
            REJECTED_REQUEUE => Decision::Rejected { requeue: true },
            _ => Decision::Undecided,
        }
    }

    pub fn is_decided(&self) -> bool {
        self.decision.load(Ordering::Acquire) != UNDECIDED
    }

    pub fn mode(&self) -> AckMode {
        self.mode
    }

    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }
}

impl fmt::Debug for AckGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckGate")
            .field("delivery_tag", &self.delivery_tag)
            .field("mode", &self.mode)
            .field("decision", &self.decision())
            .finish_non_exhaustive()
    }
}
