//! ZMQ listener: subscribes to a decoder's PUB socket (the mode dumpvdl2
//! and dumphfdl offer via `--feed zmq`), one JSON document per message
//! frame (§4.F).

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use zeromq::{Socket, SocketRecv};

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
    let endpoint = format!("tcp://{}:{}", descriptor.host, descriptor.port);
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let mut socket = zeromq::SubSocket::new();
        match socket.connect(&endpoint).await {
            Ok(()) => {
                if let Err(e) = socket.subscribe("").await {
                    error!(decoder = decoder_name, error = %e, "ZMQ subscribe failed");
                    health.mark_failure();
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
                info!(decoder = decoder_name, %endpoint, "ZMQ subscribed");
                health.mark_connected();
                backoff = INITIAL_BACKOFF;
                receive_loop(decoder_name, &mut socket, &queue, logged, &health).await;
            }
            Err(e) => {
                error!(decoder = decoder_name, %endpoint, error = %e, "ZMQ connect failed");
            }
        }

        health.mark_failure();
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

async fn receive_loop(
    decoder_name: &str,
    socket: &mut zeromq::SubSocket,
    queue: &MessageQueue,
    logged: bool,
    health: &ListenerHealth,
) {
    loop {
        match socket.recv().await {
            Ok(message) => {
                for frame in message.into_vec() {
                    process_payload(decoder_name, frame.as_ref(), queue, logged, health).await;
                }
            }
            Err(e) => {
                error!(decoder = decoder_name, error = %e, "ZMQ recv error");
                return;
            }
        }
    }
}
