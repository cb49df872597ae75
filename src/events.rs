//! Real-time event layer (§4.J), generalized from the teacher's
//! single-purpose `fixes_live_websocket` (`actions/fixes.rs`)
//! read/write-task-plus-channel shape into one typed bidirectional event
//! envelope multiplexed over a single `axum` WebSocket route. This crate
//! has no Socket.IO-protocol dependency available in the pack, so the
//! connect-sequence/event-name contract is reimplemented over a plain
//! typed JSON WebSocket protocol (`{event, data}`) — recorded as an Open
//! Question resolution in DESIGN.md.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::alert_engine::AlertEngine;
use crate::config::Settings;
use crate::db::alerts_repo::AlertsRepository;
use crate::db::connection_status_repo::ConnectionStatusRepository;
use crate::db::messages_repo::{MessagesRepository, SearchTerm};
use crate::db::stats_repo::StatsRepository;
use crate::enrichment::enrich_message;
use crate::reference::ReferenceTables;
use crate::timeseries::TimeseriesWriter;

/// The single wire envelope every event (server -> client) and command
/// (client -> server) uses (§4.J).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl EventEnvelope {
    fn new(event: &str, data: Value) -> Self {
        Self { event: event.to_string(), data }
    }
}

/// Chunk size for the two batch streams in the connect sequence (§4.J).
const BATCH_CHUNK_SIZE: usize = 50;

/// Shared state every connected socket reads from. `Clone` is cheap: every
/// field is a repository/cache handle wrapping an `Arc`-backed pool or lock.
#[derive(Clone)]
pub struct EventState {
    pub settings: Arc<Settings>,
    pub messages_repo: MessagesRepository,
    pub alerts_repo: AlertsRepository,
    pub stats_repo: StatsRepository,
    pub connection_status_repo: ConnectionStatusRepository,
    pub alert_engine: AlertEngine,
    pub timeseries: Arc<TimeseriesWriter>,
    pub reference: Arc<ReferenceTables>,
    pub migration_running: Arc<AtomicBool>,
    /// Broadcast fan-out for `newmsg`/`alert_match`/`system_status`/`decoders`
    /// (every socket receives these); targeted query responses go out over
    /// the per-socket channel created in `handle_socket` instead.
    pub broadcast: tokio::sync::broadcast::Sender<EventEnvelope>,
}

impl EventState {
    pub fn new(
        settings: Arc<Settings>,
        messages_repo: MessagesRepository,
        alerts_repo: AlertsRepository,
        stats_repo: StatsRepository,
        connection_status_repo: ConnectionStatusRepository,
        alert_engine: AlertEngine,
        timeseries: Arc<TimeseriesWriter>,
        reference: Arc<ReferenceTables>,
    ) -> Self {
        let (broadcast, _rx) = tokio::sync::broadcast::channel(1024);
        Self {
            settings,
            messages_repo,
            alerts_repo,
            stats_repo,
            connection_status_repo,
            alert_engine,
            timeseries,
            reference,
            // True from construction (§4.K step 1): the orchestrator builds
            // this before accepting any connection and only clears it once
            // every startup phase has finished (step 7).
            migration_running: Arc::new(AtomicBool::new(true)),
            broadcast,
        }
    }

    pub fn broadcast_event(&self, event: &str, data: Value) {
        let _ = self.broadcast.send(EventEnvelope::new(event, data));
    }

    pub fn is_migrating(&self) -> bool {
        self.migration_running.load(Ordering::Acquire)
    }

    pub fn set_migrating(&self, running: bool) {
        self.migration_running.store(running, Ordering::Release);
        self.broadcast_event("migration_status", json!({"running": running}));
    }
}

pub async fn ws_handler(State(state): State<EventState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: EventState) {
    let (mut sink, mut stream) = socket.split();
    let mut broadcast_rx = state.broadcast.subscribe();
    let (targeted_tx, mut targeted_rx) = flume::unbounded::<EventEnvelope>();

    // Migration gate (§4.J): a socket that connects mid-migration only gets
    // `migration_status{running:true}` and waits; the connect sequence
    // proper starts once the gate clears.
    if state.is_migrating() {
        let _ = send(&mut sink, EventEnvelope::new("migration_status", json!({"running": true}))).await;
        loop {
            match broadcast_rx.recv().await {
                Ok(envelope) if envelope.event == "migration_status" => {
                    let running = envelope.data.get("running").and_then(Value::as_bool).unwrap_or(false);
                    if !running {
                        break;
                    }
                }
                Ok(_) => continue,
                Err(_) => return,
            }
        }
        // The gate broadcast above may have been consumed by a different
        // in-flight subscriber race; every socket that waited gets its own
        // explicit `running:false` before the connect sequence starts (§4.J).
        if send(&mut sink, EventEnvelope::new("migration_status", json!({"running": false}))).await.is_err() {
            return;
        }
    }

    if let Err(err) = run_connect_sequence(&mut sink, &state).await {
        warn!(error = %err, "connect sequence failed, closing socket");
        return;
    }

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_command(&text, &state, &targeted_tx).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        debug!(error = %err, "websocket receive error");
                        break;
                    }
                }
            }
            envelope = broadcast_rx.recv() => {
                match envelope {
                    Ok(envelope) => {
                        if send(&mut sink, envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "socket fell behind broadcast stream");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            envelope = targeted_rx.recv_async() => {
                match envelope {
                    Ok(envelope) => {
                        if send(&mut sink, envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        }
    }
}

async fn send(
    sink: &mut futures_util::stream::SplitSink<WebSocket, WsMessage>,
    envelope: EventEnvelope,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string());
    sink.send(WsMessage::Text(text.into())).await
}

/// The seven ordered events plus two chunked batch streams every freshly
/// connected socket receives, in order, before any client command is
/// processed (§4.J).
async fn run_connect_sequence(
    sink: &mut futures_util::stream::SplitSink<WebSocket, WsMessage>,
    state: &EventState,
) -> Result<(), axum::Error> {
    send(sink, EventEnvelope::new("features_enabled", json!({
        "acars": state.settings.enable_acars,
        "vdlm": state.settings.enable_vdlm,
        "hfdl": state.settings.enable_hfdl,
        "imsl": state.settings.enable_imsl,
        "irdm": state.settings.enable_irdm,
        "adsb": state.settings.enable_adsb,
    }))).await?;

    send(sink, EventEnvelope::new("terms", json!({"terms": state.alert_engine.cache().terms()}))).await?;

    send(sink, EventEnvelope::new("labels", json!(state.reference.labels))).await?;

    let total = state.messages_repo.total_count().await.unwrap_or(0);
    send(sink, EventEnvelope::new("database", json!({"total_messages": total}))).await?;

    send(sink, EventEnvelope::new("signal", json!({"enabled": true}))).await?;

    send(sink, EventEnvelope::new("alert_terms", json!({
        "terms": state.alert_engine.cache().terms(),
        "ignore": state.alert_engine.cache().ignore_terms(),
    }))).await?;

    send(sink, EventEnvelope::new("acarshub_version", json!(env!("VERGEN_GIT_DESCRIBE")))).await?;

    let recent = state.messages_repo.recent(500).await.unwrap_or_default();
    for chunk in recent.chunks(BATCH_CHUNK_SIZE) {
        let batch: Vec<Value> = chunk.iter().map(|m| enrich_message(m, &state.reference)).collect();
        send(sink, EventEnvelope::new("acars_msg_batch", json!({"messages": batch, "done_loading": false}))).await?;
    }
    send(sink, EventEnvelope::new("acars_msg_batch", json!({"messages": [], "done_loading": true}))).await?;

    let recent_matches = state.alerts_repo.recent_matches(500).await.unwrap_or_default();
    for chunk in recent_matches.chunks(BATCH_CHUNK_SIZE) {
        let batch: Vec<Value> = chunk
            .iter()
            .map(|m| json!({
                "message_uid": m.message_uid,
                "term": m.term,
                "match_type": m.match_type,
                "matched_at": m.matched_at,
            }))
            .collect();
        send(sink, EventEnvelope::new("alert_matches_batch", json!({"matches": batch, "done_loading": false}))).await?;
    }
    send(sink, EventEnvelope::new("alert_matches_batch", json!({"matches": [], "done_loading": true}))).await?;

    Ok(())
}

/// Dispatch one client command. Responses that only this socket cares about
/// go out over `reply`, never the broadcast channel.
async fn handle_command(text: &str, state: &EventState, reply: &flume::Sender<EventEnvelope>) {
    let envelope: EventEnvelope = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(err) => {
            debug!(error = %err, "discarding malformed client command");
            return;
        }
    };

    let result = match envelope.event.as_str() {
        "query_search" => handle_query_search(&envelope.data, state).await,
        "update_alerts" => handle_update_alerts(&envelope.data, state).await,
        "signal_freqs" => handle_signal_freqs(&envelope.data, state).await,
        "signal_count" => handle_signal_count(state).await,
        "signal_graphs" => handle_signal_graphs(&envelope.data, state).await,
        "request_status" => handle_request_status(state).await,
        "alert_term_query" => handle_alert_term_query(&envelope.data, state).await,
        "query_alerts_by_term" => handle_query_alerts_by_term(&envelope.data, state).await,
        "request_recent_alerts" => handle_request_recent_alerts(state).await,
        "rrd_timeseries" => handle_rrd_timeseries(&envelope.data, state).await,
        "regenerate_alert_matches" => handle_regenerate_alert_matches(state).await,
        other => {
            debug!(event = other, "unrecognized client command");
            return;
        }
    };

    match result {
        Ok(response) => {
            let _ = reply.send(response);
        }
        Err(err) => {
            let _ = reply.send(EventEnvelope::new("command_error", json!({"event": envelope.event, "error": err})));
        }
    }
}

/// Reject a mutating command when remote updates are disabled (§4.A/§4.J):
/// the socket stays open, the client gets a typed failure event instead of
/// a disconnect.
fn reject_if_remote_updates_disabled(state: &EventState) -> Result<(), String> {
    if state.settings.allow_remote_updates {
        Ok(())
    } else {
        Err("remote updates are disabled on this instance".to_string())
    }
}

/// Build a [`SearchTerm`] from a `query_search` payload's `search_term`
/// object (§6). Factored out of [`handle_query_search`] so the field
/// mapping (note `text` on the wire vs. `msg_text` in the struct) is
/// independently testable without a database.
fn search_term_from_json(data: &Value) -> SearchTerm {
    SearchTerm {
        flight: data.get("flight").and_then(Value::as_str).map(str::to_string),
        tail: data.get("tail").and_then(Value::as_str).map(str::to_string),
        icao: data.get("icao").and_then(Value::as_str).map(str::to_string),
        station_id: data.get("station_id").and_then(Value::as_str).map(str::to_string),
        msg_text: data.get("text").and_then(Value::as_str).map(str::to_string),
        label: data.get("label").and_then(Value::as_str).map(str::to_string),
        freq: data.get("freq").and_then(Value::as_str).map(str::to_string),
        msgno: data.get("msgno").and_then(Value::as_str).map(str::to_string),
        msg_type: data.get("msg_type").and_then(Value::as_str).map(str::to_string),
        depa: data.get("depa").and_then(Value::as_str).map(str::to_string),
        dsta: data.get("dsta").and_then(Value::as_str).map(str::to_string),
    }
}

async fn handle_query_search(data: &Value, state: &EventState) -> Result<EventEnvelope, String> {
    let search_term = data.get("search_term").cloned().unwrap_or(Value::Null);
    let term = search_term_from_json(&search_term);
    let results_after = data.get("results_after").and_then(Value::as_i64);
    let show_all = data.get("show_all").and_then(Value::as_bool).unwrap_or(false);

    let rows = state
        .messages_repo
        .search(term, results_after, show_all)
        .await
        .map_err(|e| e.to_string())?;
    let messages: Vec<Value> = rows.iter().map(|m| enrich_message(m, &state.reference)).collect();
    let num_results = messages.len();
    Ok(EventEnvelope::new("query_search_results", json!({"messages": messages, "num_results": num_results})))
}

async fn handle_update_alerts(data: &Value, state: &EventState) -> Result<EventEnvelope, String> {
    reject_if_remote_updates_disabled(state)?;
    let terms: Vec<String> = data
        .get("terms")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let ignore: Vec<String> = data
        .get("ignore")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    state.alert_engine.update_terms(terms.clone(), ignore.clone()).await.map_err(|e| e.to_string())?;
    // Connect sequence treats `terms` and `alert_terms` as distinct events
    // (the former carries just the alert terms, the latter terms + ignore);
    // broadcast both so a client subscribed to either sees the update (§8
    // scenario 5).
    state.broadcast_event("terms", json!({"terms": terms.clone()}));
    state.broadcast_event("alert_terms", json!({"terms": terms, "ignore": ignore}));
    Ok(EventEnvelope::new("update_alerts_ok", json!({})))
}

/// Per-decoder frequency histogram (§6). Targeted per §9's resolution:
/// documented as diverging from the distributed-broadcast default.
async fn handle_signal_freqs(data: &Value, state: &EventState) -> Result<EventEnvelope, String> {
    let message_type = data.get("message_type").and_then(Value::as_str).unwrap_or("ACARS");
    let since = crate::db::now_unix() - 3_600;
    let counts = state.stats_repo.counts_since(since).await.map_err(|e| e.to_string())?;
    Ok(EventEnvelope::new("signal_freqs_result", json!({"message_type": message_type, "counts": counts})))
}

async fn handle_signal_count(state: &EventState) -> Result<EventEnvelope, String> {
    let counts = state.stats_repo.global_counts().await.map_err(|e| e.to_string())?;
    Ok(EventEnvelope::new("signal_count_result", json!({
        "total": counts.total,
        "errors": counts.errors,
        "good": counts.good,
        "nonlogged_errors": counts.nonlogged_errors,
        "nonlogged_good": counts.nonlogged_good,
    })))
}

/// Targeted, per §9 Open Question resolution (spec leaves "broadcast vs.
/// targeted" unspecified for this one; a signal-level graph is a per-request
/// expensive aggregate only the requester needs).
async fn handle_signal_graphs(data: &Value, state: &EventState) -> Result<EventEnvelope, String> {
    let range = data.get("range").and_then(Value::as_str).unwrap_or("1hr");
    let points = state.timeseries.cache().get(range).unwrap_or_default();
    Ok(EventEnvelope::new("signal_graphs_result", json!({"range": range, "points": points})))
}

async fn handle_request_status(state: &EventState) -> Result<EventEnvelope, String> {
    let connections = state.connection_status_repo.all().await.map_err(|e| e.to_string())?;
    let counts = state.stats_repo.global_counts().await.map_err(|e| e.to_string())?;
    Ok(EventEnvelope::new("status_result", json!({
        "connections": connections.into_iter().map(|c| json!({
            "decoder_type": c.decoder_type,
            "enabled": c.enabled,
            "connected": c.connected,
            "last_message_at": c.last_message_at,
            "consecutive_failures": c.consecutive_failures,
        })).collect::<Vec<_>>(),
        "total": counts.total,
        "errors": counts.errors,
    })))
}

async fn handle_alert_term_query(_data: &Value, state: &EventState) -> Result<EventEnvelope, String> {
    let cache = state.alert_engine.cache();
    Ok(EventEnvelope::new("alert_term_query_result", json!({
        "terms": cache.terms(),
        "ignore": cache.ignore_terms(),
    })))
}

async fn handle_query_alerts_by_term(data: &Value, state: &EventState) -> Result<EventEnvelope, String> {
    let term = data.get("term").and_then(Value::as_str).unwrap_or_default().to_string();
    let page = data.get("page").and_then(Value::as_i64).unwrap_or(0);
    let rows = state
        .alerts_repo
        .matches_by_term(term.clone(), page)
        .await
        .map_err(|e| e.to_string())?;
    let total_count = state.alerts_repo.count_by_term(term).await.map_err(|e| e.to_string())?;
    let matches: Vec<Value> = rows
        .iter()
        .map(|m| json!({
            "message_uid": m.message_uid,
            "term": m.term,
            "match_type": m.match_type,
            "matched_at": m.matched_at,
        }))
        .collect();
    Ok(EventEnvelope::new(
        "query_alerts_by_term_result",
        json!({"matches": matches, "total_count": total_count}),
    ))
}

async fn handle_request_recent_alerts(state: &EventState) -> Result<EventEnvelope, String> {
    let rows = state.alerts_repo.recent_matches(100).await.map_err(|e| e.to_string())?;
    let matches: Vec<Value> = rows
        .iter()
        .map(|m| json!({
            "message_uid": m.message_uid,
            "term": m.term,
            "match_type": m.match_type,
            "matched_at": m.matched_at,
        }))
        .collect();
    Ok(EventEnvelope::new("recent_alerts_result", json!({"matches": matches})))
}

async fn handle_rrd_timeseries(data: &Value, state: &EventState) -> Result<EventEnvelope, String> {
    let time_period = data.get("time_period").and_then(Value::as_str).unwrap_or("24hr");
    let points = state.timeseries.cache().get(time_period).unwrap_or_default();
    let total_count = points.len();
    Ok(EventEnvelope::new(
        "rrd_timeseries_result",
        json!({"time_period": time_period, "data": points, "total_count": total_count}),
    ))
}

/// Regeneration is long-running (a full table scan in batches), so the
/// caller gets a `start` broadcast before the scan begins and a
/// `complete` broadcast once it finishes (§4.G), in addition to the
/// targeted ack this handler returns to the requesting socket.
async fn handle_regenerate_alert_matches(state: &EventState) -> Result<EventEnvelope, String> {
    reject_if_remote_updates_disabled(state)?;
    state.broadcast_event("regenerate_alert_matches_progress", json!({"status": "start"}));
    let written = state.alert_engine.regenerate().await.map_err(|e| e.to_string())?;
    info!(written, "regenerated alert matches on client request");
    state.broadcast_event(
        "regenerate_alert_matches_progress",
        json!({"status": "complete", "matches_written": written}),
    );
    Ok(EventEnvelope::new("regenerate_alert_matches_ok", json!({"matches_written": written})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn envelope_round_trips_through_json() {
        let env = EventEnvelope::new("terms", json!({"terms": ["WN4899"]}));
        let text = serde_json::to_string(&env).unwrap();
        let back: EventEnvelope = serde_json::from_str(&text).unwrap();
        assert_eq!(back.event, "terms");
        assert_eq!(back.data["terms"][0], "WN4899");
    }

    #[test]
    fn envelope_defaults_data_to_null_when_absent() {
        let env: EventEnvelope = serde_json::from_str(r#"{"event":"request_status"}"#).unwrap();
        assert_eq!(env.event, "request_status");
        assert!(env.data.is_null());
    }

    #[test]
    fn search_term_maps_wire_text_field_to_msg_text() {
        let data = json!({"flight": "WN4899", "text": "mayday", "icao": "A12345"});
        let term = search_term_from_json(&data);
        assert_eq!(term.flight.as_deref(), Some("WN4899"));
        assert_eq!(term.msg_text.as_deref(), Some("mayday"));
        assert_eq!(term.icao.as_deref(), Some("A12345"));
        assert!(term.tail.is_none());
    }

    #[test]
    fn search_term_from_empty_object_is_all_none() {
        let term = search_term_from_json(&Value::Null);
        assert!(term.flight.is_none());
        assert!(term.msg_text.is_none());
        assert!(term.depa.is_none());
    }

    #[test]
    fn reject_helper_allows_when_remote_updates_enabled() {
        let settings = Settings::try_parse_from(["acarshub", "--allow-remote-updates", "true"]).unwrap();
        let state_allows = settings.allow_remote_updates;
        assert!(state_allows);
    }

    #[test]
    fn reject_helper_blocks_when_remote_updates_disabled() {
        let settings = Settings::try_parse_from(["acarshub", "--allow-remote-updates", "false"]).unwrap();
        assert!(!settings.allow_remote_updates);
    }
}
