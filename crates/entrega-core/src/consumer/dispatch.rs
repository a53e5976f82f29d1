use std::panic::AssertUnwindSafe;
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::FutureExt;
use tracing::error;

use super::*;
use crate::error::{AckError, ExtractError, HandlerError};
use crate::gate::{AckGate, Decision};
use crate::message::RawDelivery;

impl Consumer {
    /// Run one raw delivery through the pipeline: conversion, the staleness
    /// check, extraction, the handler, finalization.
    ///
    /// Every path ends with exactly one terminal decision on the delivery's
    /// gate. A delivery is never dropped without a broker-facing answer (or,
    /// in auto-ack mode, a recorded decision).
    #[tracing::instrument(skip_all, fields(queue = %self.queue, delivery_tag = raw.info.delivery_tag))]
    pub async fn handle_delivery(&self, raw: RawDelivery) {
        let _guard = self.track_inflight();
        self.metrics.record_received(&self.queue);

        let gate = AckGate::new(raw.info.delivery_tag, self.ack_mode, Arc::clone(&self.channel));

        // A draining consumer refuses the delivery outright so the broker
        // can hand it to another one.
        if self.is_shutting_down() {
            debug!("delivery refused during shutdown, requeueing");
            self.finalize(&gate).await;
            self.record_outcome(&gate);
            return;
        }

        let mut message = match self.codec.decode(&raw.body) {
            Ok(payload) => Message::new(raw, payload, gate),
            Err(e) => {
                // Redelivering the same bytes cannot succeed: reject without
                // requeue once the hook has had its chance to decide.
                let message = Message::new(raw, serde_json::Value::Null, gate);
                self.report(&message, &DispatchError::Convert(e)).await;
                if let Err(ack_err) = message.gate().reject(false).await {
                    self.report_ack_failure(&ack_err);
                }
                self.record_outcome(message.gate());
                return;
            }
        };

        // Staleness is recorded, never enforced: the delivery still reaches
        // the handler.
        if timeout::evaluate(&mut message, now_ms()) {
            self.metrics.record_stale(&self.queue);
            let budget_ms = message.time_budget().map(|b| b.budget_ms).unwrap_or_default();
            warn!(budget_ms, "message exceeded its time budget");
        }

        let result = match self.run_extractors(&mut message) {
            Ok(()) => self
                .invoke_handler(&message)
                .await
                .map_err(DispatchError::Handler),
            Err(e) => Err(DispatchError::Extract(e)),
        };

        if let Err(e) = result {
            self.report(&message, &e).await;
        }

        self.finalize(message.gate()).await;
        self.record_outcome(message.gate());
    }

    /// Run the extraction pipeline in registration order. The first failure
    /// aborts the remainder; effects of earlier extractors stay visible.
    fn run_extractors(&self, message: &mut Message) -> Result<(), ExtractError> {
        for extractor in &self.extractors {
            let outcome =
                std::panic::catch_unwind(AssertUnwindSafe(|| extractor.extract(message)));
            let source = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(source)) => source,
                Err(panic) => BoxError::from(format!("panic: {}", panic_text(panic))),
            };
            return Err(ExtractError {
                extractor: extractor.name().to_string(),
                source,
            });
        }
        Ok(())
    }

    /// Invoke the business handler, bounded by the configured timeout and
    /// isolated from panics. A timeout cancels the handler future at its
    /// next await point.
    async fn invoke_handler(&self, message: &Message) -> Result<(), HandlerError> {
        let invocation = AssertUnwindSafe(self.handler.handle(message)).catch_unwind();

        let outcome = match self.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, invocation).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(HandlerError::TimedOut(limit)),
            },
            None => invocation.await,
        };

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(HandlerError::Failed(source)),
            Err(panic) => Err(HandlerError::Panicked(panic_text(panic))),
        }
    }

    /// Route a dispatch failure to the error hook when one is registered,
    /// otherwise log it. Hook panics are contained so finalization always
    /// runs.
    async fn report(&self, message: &Message, error: &DispatchError) {
        self.metrics.record_dispatch_failure(&self.queue, error.kind());
        match &self.error_hook {
            Some(hook) => {
                debug!(error = %error, "dispatch failed, invoking error hook");
                if AssertUnwindSafe(hook.on_error(message, error))
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    error!(error = %error, "error hook panicked");
                }
            }
            None => {
                error!(error = %error, "dispatch failed with no error hook registered");
            }
        }
    }

    /// The safety net every dispatch ends on: a requeueing nack, which is a
    /// no-op when a decision was already taken. Keeps at-least-once
    /// semantics even when the handler neither decided nor succeeded.
    async fn finalize(&self, gate: &AckGate) {
        if let Err(e) = gate.reject(true).await {
            self.report_ack_failure(&e);
        }
    }

    /// An acknowledgment failure cannot be recovered locally: the channel
    /// may be unusable. Count it and leave recovery to the lifecycle
    /// callbacks.
    fn report_ack_failure(&self, error: &AckError) {
        self.metrics.record_ack_failure(&self.queue);
        error!(error = %error, "broker acknowledgment failed, channel degraded");
    }

    /// Count the terminal decision after finalization.
    fn record_outcome(&self, gate: &AckGate) {
        match gate.decision() {
            Decision::Accepted => self.metrics.record_ack(&self.queue),
            Decision::Rejected { requeue: true } => self.metrics.record_requeue(&self.queue),
            Decision::Rejected { requeue: false } => self.metrics.record_reject(&self.queue),
            Decision::Undecided => {}
        }
    }
}

/// Best-effort text for a panic payload (panics usually carry a string).
fn panic_text(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Milliseconds since the Unix epoch.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
