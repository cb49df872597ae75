//! UDP datagram listener: acarsdec/dumpvdl2/dumphfdl style decoders emit one
//! JSON document per datagram (§4.F).

use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{error, info};

use super::{process_payload, ListenerHealth};
use crate::config::ConnectionDescriptor;
use crate::queue::MessageQueue;

const MAX_DATAGRAM: usize = 64 * 1024;
const RETRY_DELAY: Duration = Duration::from_secs(5);

pub async fn run(
    decoder_name: &'static str,
    descriptor: ConnectionDescriptor,
    queue: Arc<MessageQueue>,
    logged: bool,
    health: Arc<ListenerHealth>,
) {
    let addr = format!("{}:{}", descriptor.host, descriptor.port);
    loop {
        match UdpSocket::bind(&addr).await {
            Ok(socket) => {
                info!(decoder = decoder_name, %addr, "UDP listener bound");
                health.mark_connected();
                receive_loop(decoder_name, &socket, &queue, logged, &health).await;
            }
            Err(e) => {
                error!(decoder = decoder_name, %addr, error = %e, "failed to bind UDP socket");
                health.mark_failure();
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
}

async fn receive_loop(
    decoder_name: &str,
    socket: &UdpSocket,
    queue: &MessageQueue,
    logged: bool,
    health: &ListenerHealth,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        match socket.recv(&mut buf).await {
            Ok(len) => {
                process_payload(decoder_name, &buf[..len], queue, logged, health).await;
            }
            Err(e) => {
                error!(decoder = decoder_name, error = %e, "UDP recv error");
                health.mark_failure();
                return;
            }
        }
    }
}
