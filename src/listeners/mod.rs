//! Decoder intake listeners (§4.F), generalized from the teacher's
//! `socket_server.rs` accept-loop-with-spawned-handler shape: here each
//! transport (UDP/TCP/ZMQ) runs its own task per connection descriptor,
//! normalizes every datagram/line/frame through `formatters::normalize`,
//! and pushes the result onto the shared `MessageQueue`.

pub mod tcp;
pub mod udp;
pub mod zmq;

use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{ConnectionDescriptor, ListenType};
use crate::db::now_unix;
use crate::formatters;
use crate::queue::{MessageQueue, QueuedMessage};

/// Live health snapshot for one decoder, read by the scheduler's decoder
/// health probe (§4.I) and mirrored into `connection_status` there.
#[derive(Debug, Clone, Default)]
pub struct HealthSnapshot {
    pub connected: bool,
    pub last_message_at: Option<i64>,
    pub consecutive_failures: u32,
}

#[derive(Debug, Default)]
pub struct ListenerHealth {
    inner: RwLock<HealthSnapshot>,
}

impl ListenerHealth {
    pub fn snapshot(&self) -> HealthSnapshot {
        self.inner.read().clone()
    }

    pub fn mark_connected(&self) {
        let mut inner = self.inner.write();
        inner.connected = true;
        inner.consecutive_failures = 0;
    }

    pub fn mark_message(&self) {
        let mut inner = self.inner.write();
        inner.last_message_at = Some(now_unix());
        inner.consecutive_failures = 0;
    }

    pub fn mark_failure(&self) {
        let mut inner = self.inner.write();
        inner.connected = false;
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
    }
}

/// Handle to one running decoder's set of listener tasks.
pub struct ListenerSet {
    pub decoder_name: &'static str,
    pub health: Arc<ListenerHealth>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl ListenerSet {
    pub fn abort_all(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Parse one inbound payload (already split into a JSON document by the
/// transport) through the formatter pipeline and push it onto the queue.
/// Formatter errors (including the deliberate SatDump non-ACARS drop) are
/// logged and the payload is otherwise discarded; a malformed/dropped
/// message must never take down the listener task.
async fn process_payload(
    decoder_name: &str,
    raw: &[u8],
    queue: &MessageQueue,
    logged: bool,
    health: &ListenerHealth,
) {
    let value: Value = match serde_json::from_slice(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(decoder = decoder_name, error = %e, "discarding unparseable payload");
            return;
        }
    };

    match formatters::normalize(&value) {
        Ok(Some(message)) => {
            health.mark_message();
            queue
                .push(QueuedMessage {
                    decoder_type: decoder_name.to_string(),
                    message,
                    logged,
                })
                .await;
        }
        Ok(None) => {}
        Err(e) => {
            debug!(decoder = decoder_name, error = %e, "formatter dropped message");
        }
    }
}

/// Start every listener task for one decoder's connection descriptors.
/// Disabled decoders (empty descriptor list) yield an empty task set.
pub fn start(
    decoder_name: &'static str,
    descriptors: Vec<ConnectionDescriptor>,
    queue: Arc<MessageQueue>,
    logged: bool,
) -> ListenerSet {
    let health = Arc::new(ListenerHealth::default());
    let mut tasks = Vec::new();

    for descriptor in descriptors {
        let queue = queue.clone();
        let health = health.clone();
        let task = match descriptor.listen_type {
            ListenType::Udp => {
                tokio::spawn(async move { udp::run(decoder_name, descriptor, queue, logged, health).await })
            }
            ListenType::Tcp => {
                tokio::spawn(async move { tcp::run(decoder_name, descriptor, queue, logged, health).await })
            }
            ListenType::Zmq => {
                tokio::spawn(async move { zmq::run(decoder_name, descriptor, queue, logged, health).await })
            }
        };
        tasks.push(task);
    }

    ListenerSet { decoder_name, health, tasks }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_tracks_consecutive_failures_and_resets_on_message() {
        let health = ListenerHealth::default();
        health.mark_failure();
        health.mark_failure();
        assert_eq!(health.snapshot().consecutive_failures, 2);
        assert!(!health.snapshot().connected);

        health.mark_message();
        let snap = health.snapshot();
        assert_eq!(snap.consecutive_failures, 0);
        assert!(snap.last_message_at.is_some());
    }

    #[tokio::test]
    async fn process_payload_discards_invalid_json_without_panicking() {
        let queue = MessageQueue::new(4);
        let health = ListenerHealth::default();
        process_payload("acars", b"not json", &queue, true, &health).await;
        assert_eq!(health.snapshot().consecutive_failures, 0);
    }
}
