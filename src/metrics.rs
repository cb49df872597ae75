//! Prometheus metrics (§4.A ambient stack), served from the `/metrics`
//! route mounted in [`crate::web`]. `init_metrics` and `process_metrics_task`
//! are reused from the teacher's metrics module nearly verbatim; the
//! domain-specific zero-init list is replaced wholesale.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::{Duration, Instant};

/// Initialize the Prometheus exporter and install it as the global recorder.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full("http_request_duration_seconds".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .expect("failed to set buckets for http_request_duration_seconds")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Background task updating process-level uptime/memory gauges every 5s.
pub async fn process_metrics_task() {
    let start_time = Instant::now();

    loop {
        metrics::gauge!("process_uptime_seconds").set(start_time.elapsed().as_secs() as f64);
        metrics::gauge!("process_is_up").set(1.0);

        #[cfg(target_os = "linux")]
        {
            if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
                for line in status.lines() {
                    if line.starts_with("VmRSS:")
                        && let Some(kb_str) = line.split_whitespace().nth(1)
                        && let Ok(kb) = kb_str.parse::<f64>()
                    {
                        metrics::gauge!("process_memory_bytes").set(kb * 1024.0);
                        break;
                    }
                }
            }
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

/// Zero-initialize every ACARS Hub domain metric so each one appears in
/// Prometheus queries immediately at startup, before the first real event
/// (§4.A/§4.E/§4.G/§4.H/§4.I).
pub fn initialize_domain_metrics() {
    // Message queue (§4.E)
    metrics::gauge!("acarshub_queue_depth").set(0.0);
    metrics::counter!("acarshub_queue_messages_logged_total").absolute(0);
    metrics::counter!("acarshub_queue_messages_dropped_total").absolute(0);

    // Decoder listeners (§4.F)
    for decoder in ["acars", "vdlm", "hfdl", "imsl", "irdm"] {
        metrics::gauge!("acarshub_decoder_connected", "decoder" => decoder).set(0.0);
        metrics::counter!("acarshub_decoder_messages_total", "decoder" => decoder).absolute(0);
        metrics::counter!("acarshub_decoder_errors_total", "decoder" => decoder).absolute(0);
    }

    // Alert engine (§4.G)
    metrics::counter!("acarshub_alert_matches_total").absolute(0);
    metrics::gauge!("acarshub_alert_terms_active").set(0.0);

    // Time-series writer (§4.H)
    metrics::counter!("acarshub_timeseries_rows_written_total").absolute(0);
    metrics::counter!("acarshub_timeseries_rollups_total").absolute(0);

    // Scheduler (§4.I)
    metrics::counter!("acarshub_scheduled_task_runs_total").absolute(0);
    metrics::counter!("acarshub_scheduled_task_errors_total").absolute(0);

    // FTS maintenance (§4.B)
    metrics::counter!("acarshub_fts_merge_runs_total").absolute(0);
    metrics::counter!("acarshub_fts_repairs_total").absolute(0);

    // Real-time event layer (§4.J)
    metrics::gauge!("acarshub_websocket_connections").set(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_domain_metrics_does_not_panic_without_a_recorder() {
        initialize_domain_metrics();
    }
}
