//! HTTP surface (§4.J), generalized from the teacher's asset-serving
//! `axum::Router` into the ACARS Hub endpoint set: `/health`, `/`, `/metrics`,
//! the two `/data/*` JSON endpoints, and the WebSocket event route. No
//! browser UI is served (non-goal) — the teacher's embedded-SPA asset
//! serving, auth routes, and Sentry middleware are dropped entirely.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::db::stats_repo::StatsRepository;
use crate::events::{self, EventState};
use crate::queue::QueueStats;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub stats_repo: StatsRepository,
    pub events: EventState,
    pub metrics_handle: PrometheusHandle,
    pub started_at: Instant,
    pub queue_stats: QueueStats,
    pub messages_repo: crate::db::messages_repo::MessagesRepository,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/data/heywhatsthat.geojson", get(heywhatsthat_handler))
        .route("/data/stats.json", get(stats_handler))
        .route("/socket.io/main", get(events::ws_handler).with_state(state.events.clone()))
        .layer(middleware::from_fn_with_state(state.clone(), migration_gate_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Migrations-in-progress gate (§4.K/§6): every HTTP endpoint gets a 503 with
/// `Retry-After: 5` while `migration_running` is set. The WebSocket route is
/// exempt: §4.J specifies a distinct in-band protocol for sockets that
/// connect mid-migration (an immediate `migration_status{running:true}`,
/// held on a pending list, then drained once the gate clears), which
/// requires the handshake itself to complete rather than be rejected at the
/// HTTP layer — documented as an Open Question resolution in DESIGN.md.
async fn migration_gate_middleware(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    if request.uri().path() != "/socket.io/main" && state.events.is_migrating() {
        let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
        response.headers_mut().insert("Retry-After", HeaderValue::from_static("5"));
        return response;
    }
    next.run(request).await
}

/// `{status, database:{connected,messages,size}, version}` (§6).
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let messages = state.messages_repo.total_count().await;
    let connected = messages.is_ok();
    let size = std::fs::metadata(&state.settings.db_path).map(|m| m.len()).unwrap_or(0);
    Json(json!({
        "status": if connected { "ok" } else { "degraded" },
        "database": {
            "connected": connected,
            "messages": messages.unwrap_or(0),
            "size": size,
        },
        "version": env!("VERGEN_GIT_DESCRIBE"),
    }))
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({"name": "acarshub", "version": env!("VERGEN_GIT_DESCRIBE")}))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics_handle.render()
}

/// HeyWhatsThat coverage polygon, when configured (§4.A). The reference
/// loader doesn't currently cache a fetched polygon in memory, so this
/// reports unconfigured/not-yet-fetched rather than serving stale data.
async fn heywhatsthat_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.settings.heywhatsthat_site_id.is_none() {
        return (StatusCode::NOT_FOUND, "heywhatsthat coverage not configured").into_response();
    }
    (StatusCode::NOT_FOUND, "heywhatsthat coverage not yet fetched").into_response()
}

/// `{acars, vdlm2, hfdl, imsl, irdm, total}` summed over the last hour (§6).
/// In the first minute after startup the hourly DB query can't yet reflect a
/// full window, so the live in-memory queue counters stand in instead.
async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    let counts = if state.started_at.elapsed().as_secs() < 60 {
        let (per_decoder, _, _) = state.queue_stats.snapshot();
        [
            ("acars", per_decoder.get("acars").map(|c| c.total as i64).unwrap_or(0)),
            ("vdlm2", per_decoder.get("vdlm").map(|c| c.total as i64).unwrap_or(0)),
            ("hfdl", per_decoder.get("hfdl").map(|c| c.total as i64).unwrap_or(0)),
            ("imsl", per_decoder.get("imsl").map(|c| c.total as i64).unwrap_or(0)),
            ("irdm", per_decoder.get("irdm").map(|c| c.total as i64).unwrap_or(0)),
        ]
    } else {
        let since = crate::db::now_unix() - 3_600;
        let per_type = state.stats_repo.counts_since(since).await.unwrap_or_default();
        [
            ("acars", *per_type.get("ACARS").unwrap_or(&0)),
            ("vdlm2", *per_type.get("VDL-M2").unwrap_or(&0)),
            ("hfdl", *per_type.get("HFDL").unwrap_or(&0)),
            ("imsl", *per_type.get("IMS-L").unwrap_or(&0)),
            ("irdm", *per_type.get("IRDM").unwrap_or(&0)),
        ]
    };
    let total: i64 = counts.iter().map(|(_, c)| c).sum();
    Json(json!({
        "acars": counts[0].1,
        "vdlm2": counts[1].1,
        "hfdl": counts[2].1,
        "imsl": counts[3].1,
        "irdm": counts[4].1,
        "total": total,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_state_is_cloneable() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }
}
