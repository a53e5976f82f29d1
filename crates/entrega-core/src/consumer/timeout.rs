use tracing::warn;

use crate::message::{Message, TIMEOUT_HEADER, TimeBudget};

/// Resolve the optional time budget declared on `message` and record whether
/// the delivery is already past it. Runs once per delivery; the result is
/// cached on the message so every later read sees the same answer.
///
/// Fail-open rules: no `timeout` header means no budget, an unparseable
/// header is ignored with a warning, and a missing or future publish
/// timestamp never marks the message stale.
pub(super) fn evaluate(message: &mut Message, now_ms: u64) -> bool {
    let Some(raw) = message.header(TIMEOUT_HEADER) else {
        return false;
    };
    let budget_ms = match raw.parse::<u64>() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!(
                delivery_tag = message.delivery_tag(),
                header = raw,
                "unparseable timeout header, ignoring budget"
            );
            return false;
        }
    };

    // A timestamp ahead of `now` (producer clock skew) has no age yet, which
    // with a zero budget is not the same thing as an age of zero.
    let stale = match message.props().timestamp_ms {
        Some(timestamp_ms) => now_ms
            .checked_sub(timestamp_ms)
            .is_some_and(|age| age >= budget_ms),
        None => false,
    };
    message.time_budget = Some(TimeBudget { budget_ms, stale });
    stale
}
