//! TCP listener: connects as a client to a decoder's newline-delimited JSON
//! feed (the mode dumpvdl2/acarsdec/dumphfdl offer via `--feed tcp`), with
//! exponential backoff capped at 30s so a stalled remote never deadlocks the
//! process (§4.F).

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tracing::{error, info, warn};

use super::{process_payload, ListenerHealth};
use crate::config::ConnectionDescriptor;
use crate::queue::MessageQueue;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub async fn run(
    decoder_name: &'static str,
    descriptor: ConnectionDescriptor,
    queue: Arc<MessageQueue>,
    logged: bool,
    health: Arc<ListenerHealth>,
) {
    let addr = format!("{}:{}", descriptor.host, descriptor.port);
    let mut backoff = INITIAL_BACKOFF;

    loop {
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                info!(decoder = decoder_name, %addr, "TCP connected");
                health.mark_connected();
                backoff = INITIAL_BACKOFF;
                read_lines(decoder_name, stream, &queue, logged, &health).await;
                warn!(decoder = decoder_name, %addr, "TCP connection closed, reconnecting");
            }
            Err(e) => {
                error!(decoder = decoder_name, %addr, error = %e, "TCP connect failed");
            }
        }

        health.mark_failure();
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

async fn read_lines(
    decoder_name: &str,
    stream: TcpStream,
    queue: &MessageQueue,
    logged: bool,
    health: &ListenerHealth,
) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                process_payload(decoder_name, trimmed.as_bytes(), queue, logged, health).await;
            }
            Ok(None) => return,
            Err(e) => {
                error!(decoder = decoder_name, error = %e, "TCP read error");
                return;
            }
        }
    }
}
