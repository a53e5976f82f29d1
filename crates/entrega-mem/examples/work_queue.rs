//! Work-queue consumption with explicit acknowledgments.
//!
//! Publishes a handful of jobs onto an in-memory broker and drives them
//! through a consumer. One job fails on its first attempt: the safety net
//! requeues it and the retry succeeds, showing at-least-once delivery
//! without any broker setup.
//!
//! ```sh
//! cargo run --example work_queue
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use entrega_core::consumer::{Consumer, Handler};
use entrega_core::context::{Context, ContextConfig};
use entrega_core::error::BoxError;
use entrega_core::message::{Message, Properties};
use entrega_mem::MemBroker;

struct JobHandler;

#[async_trait]
impl Handler for JobHandler {
    async fn handle(&self, message: &Message) -> Result<(), BoxError> {
        let job = message.payload();
        if job["flaky"].as_bool().unwrap_or(false) && !message.info().redelivered {
            return Err("flaky job failed on first attempt".into());
        }
        println!(
            "  handled job {} (redelivered: {})",
            job["id"],
            message.info().redelivered
        );
        message.ack().await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    entrega_core::telemetry::try_init_tracing();

    let broker = MemBroker::new();
    let context = Context::new(ContextConfig::default(), Arc::new(broker.clone()));
    let consumer = Consumer::builder("jobs").handler(JobHandler).start(&context)?;

    // Enqueue 5 jobs; job 2 fails once before succeeding
    println!("Publishing 5 jobs...");
    for i in 0..5 {
        let body = serde_json::json!({ "id": i, "flaky": i == 2 })
            .to_string()
            .into_bytes();
        broker.publish("jobs", Properties::default(), body);
    }

    println!("\nDraining the queue:\n");
    while let Some(raw) = broker.fetch("jobs", "worker-1") {
        consumer.handle_delivery(raw).await;
    }

    println!("\nacked tags:  {:?}", broker.acked());
    println!("nacked tags: {:?} (tag, requeued)", broker.nacked());
    println!("queue depth: {}", broker.depth("jobs"));

    consumer.destroy().await;
    Ok(())
}
