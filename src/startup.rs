//! Process orchestration (§4.K): bring every subsystem up in dependency
//! order, wire the scheduler's default task table to concrete handlers, and
//! shut everything down cleanly on SIGINT/SIGTERM. Generalized from the
//! teacher's `main.rs` (migration check -> pool -> web server) into the
//! fuller ingest/alert/time-series/event stack this crate runs.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::alert_engine::AlertEngine;
use crate::config::{self, Settings};
use crate::db::alerts_repo::AlertsRepository;
use crate::db::connection_status_repo::ConnectionStatusRepository;
use crate::db::import_registry::ImportRegistry;
use crate::db::messages_repo::MessagesRepository;
use crate::db::models::ConnectionStatusRow;
use crate::db::stats_repo::StatsRepository;
use crate::db::timeseries_repo::TimeseriesRepository;
use crate::db::{self, fts, migrations, now_unix};
use crate::events::EventState;
use crate::ingest;
use crate::listeners::{self, ListenerSet};
use crate::metrics;
use crate::queue::MessageQueue;
use crate::reference::ReferenceTables;
use crate::scheduler::{Scheduler, DEFAULT_TASKS};
use crate::timeseries::TimeseriesWriter;
use crate::web::{self, AppState};

const QUEUE_CAPACITY: usize = 10_000;

/// Bring up every subsystem and run until a shutdown signal arrives.
///
/// Phase ordering follows §4.K exactly: the HTTP listener is bound and
/// `axum::serve` is already driving it — with `migration_running` true —
/// before the migration chain starts, so the earliest possible client
/// already sees the `migration_status{running:true}` banner rather than
/// racing the gate (§9's named failure mode). [`AlertEngine`] and
/// [`TimeseriesWriter`] are constructed with empty/no-op state up front
/// (neither touches the database in its constructor) and are populated via
/// `reload`/`refresh_cache` only once the migration chain has created the
/// tables they read from.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let started_at = Instant::now();
    let settings = Arc::new(settings);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", settings.host, settings.port)).await?;
    info!(host = %settings.host, port = settings.port, "listening");

    let pool = db::build_pool(&settings.db_path)?;
    let messages_repo = MessagesRepository::new(pool.clone());
    let alerts_repo = AlertsRepository::new(pool.clone());
    let stats_repo = StatsRepository::new(pool.clone());
    let connection_status_repo = ConnectionStatusRepository::new(pool.clone());
    let timeseries_repo = TimeseriesRepository::new(pool.clone());
    let import_registry = ImportRegistry::new(pool.clone());

    let reference = Arc::new(ReferenceTables::load(&settings.iata_override));
    let alert_engine = AlertEngine::new(alerts_repo.clone(), messages_repo.clone());
    let timeseries = Arc::new(TimeseriesWriter::new(timeseries_repo));

    // Step 1: the event layer attaches to the listener, gate up, before any
    // connection is accepted.
    let event_state = EventState::new(
        settings.clone(),
        messages_repo.clone(),
        alerts_repo.clone(),
        stats_repo.clone(),
        connection_status_repo.clone(),
        alert_engine.clone(),
        timeseries.clone(),
        reference.clone(),
    );
    debug_assert!(event_state.is_migrating(), "migration gate must start up");

    let metrics_handle = metrics::init_metrics();
    metrics::initialize_domain_metrics();
    tokio::spawn(metrics::process_metrics_task());

    let queue = Arc::new(MessageQueue::new(QUEUE_CAPACITY));

    let app_state = AppState {
        settings: settings.clone(),
        stats_repo: stats_repo.clone(),
        events: event_state.clone(),
        metrics_handle,
        started_at,
        queue_stats: queue.stats(),
        messages_repo: messages_repo.clone(),
    };
    let router = web::build_router(app_state);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let serve_task = tokio::spawn(
        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()),
    );

    // Step 2: run the migration chain + FTS guard off the event loop thread
    // while it's already serving the migration banner to any connected
    // socket.
    let migration_pool = pool.clone();
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let mut conn = migration_pool.get()?;
        migrations::run(&mut conn)?;
        fts::verify_and_repair(&mut conn)?;
        fts::truncate_checkpoint(&mut conn)?;
        Ok(())
    })
    .await??;

    // Step 4: legacy RRD/backup import, deduplicated by content hash.
    import_legacy_backup(&settings, &import_registry, &messages_repo).await;

    // Step 5: alert cache + time-series cache, warmed before the gate opens.
    alert_engine.reload().await?;
    timeseries.refresh_cache(now_unix()).await?;

    let listener_sets = start_listeners(&settings, queue.clone());
    tokio::spawn(ingest::run(
        queue.clone(),
        messages_repo.clone(),
        stats_repo.clone(),
        alert_engine.clone(),
        reference.clone(),
        timeseries.deltas(),
        event_state.clone(),
    ));

    // Step 6: scheduler + time-series writer.
    let scheduler = Arc::new(Scheduler::new());
    register_default_tasks(
        &scheduler,
        &settings,
        pool.clone(),
        &messages_repo,
        &alerts_repo,
        &stats_repo,
        &timeseries,
        &connection_status_repo,
        &listener_sets,
        &event_state,
    );
    let writer_handle = tokio::spawn(crate::timeseries::run(timeseries.clone(), shutdown_rx));

    // Step 7: clear the migration gate, draining every socket that connected
    // mid-migration (§4.J) before running their connect sequence.
    event_state.set_migrating(false);

    let serve_result = serve_task.await?;

    info!("shutting down");
    let _ = shutdown_tx.send(true);
    scheduler.shutdown();
    for set in &listener_sets {
        set.abort_all();
    }
    let _ = writer_handle.await;

    serve_result?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };
    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn start_listeners(settings: &Settings, queue: Arc<MessageQueue>) -> Vec<ListenerSet> {
    let decoders: &[(&'static str, bool, &str)] = &[
        ("acars", settings.enable_acars, settings.acars_connections.as_str()),
        ("vdlm", settings.enable_vdlm, settings.vdlm_connections.as_str()),
        ("hfdl", settings.enable_hfdl, settings.hfdl_connections.as_str()),
        ("imsl", settings.enable_imsl, settings.imsl_connections.as_str()),
        ("irdm", settings.enable_irdm, settings.irdm_connections.as_str()),
    ];

    let mut sets = Vec::new();
    for (name, enabled, raw) in decoders {
        if !enabled {
            continue;
        }
        let descriptors = config::parse_descriptors(raw, name);
        if descriptors.is_empty() {
            continue;
        }
        sets.push(listeners::start(name, descriptors, queue.clone(), true));
    }
    sets
}

/// Legacy RRD/backup import (§4.H). The concrete backup file format isn't
/// fixed by the time-series schema the rest of this crate writes, so this
/// currently only registers the dedup guard: a backup file named by
/// `settings.rrd_path`, if present, is hashed and recorded so a later import
/// tool cannot double-count it. Actually importing historical points from a
/// pre-existing RRD file is left to that tool, which must call
/// `ImportRegistry::is_registered`/`register` with the same hash.
async fn import_legacy_backup(
    settings: &Settings,
    import_registry: &ImportRegistry,
    messages_repo: &MessagesRepository,
) {
    let Some(path) = &settings.rrd_path else { return };
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "could not read legacy backup file, skipping import");
            return;
        }
    };
    let hash = crate::db::import_registry::hash_file(&bytes);
    match import_registry.is_registered(hash.clone()).await {
        Ok(true) => info!(path = %path.display(), "legacy backup already imported, skipping"),
        Ok(false) => {
            let total = messages_repo.total_count().await.unwrap_or(0);
            if let Err(err) = import_registry.register(hash, path.display().to_string(), total).await {
                warn!(error = %err, "failed to record legacy backup import registry entry");
            }
        }
        Err(err) => warn!(error = %err, "failed to check legacy backup import registry"),
    }
}

fn register_default_tasks(
    scheduler: &Arc<Scheduler>,
    settings: &Arc<Settings>,
    pool: crate::db::SqlitePool,
    messages_repo: &MessagesRepository,
    alerts_repo: &AlertsRepository,
    stats_repo: &StatsRepository,
    timeseries: &Arc<TimeseriesWriter>,
    connection_status_repo: &ConnectionStatusRepository,
    listener_sets: &[ListenerSet],
    event_state: &EventState,
) {
    for (name, interval) in DEFAULT_TASKS {
        match *name {
            "status_emit" => {
                // Broadcast `system_status` to every connected socket (§4.I,
                // §4.J broadcast set).
                let connection_status_repo = connection_status_repo.clone();
                let stats_repo = stats_repo.clone();
                let event_state = event_state.clone();
                scheduler.register(*name, *interval, None, move || {
                    let connection_status_repo = connection_status_repo.clone();
                    let stats_repo = stats_repo.clone();
                    let event_state = event_state.clone();
                    async move {
                        let connections = connection_status_repo.all().await?;
                        let counts = stats_repo.global_counts().await?;
                        event_state.broadcast_event(
                            "system_status",
                            serde_json::json!({
                                "connections": connections.into_iter().map(|c| serde_json::json!({
                                    "decoder_type": c.decoder_type,
                                    "enabled": c.enabled,
                                    "connected": c.connected,
                                    "last_message_at": c.last_message_at,
                                    "consecutive_failures": c.consecutive_failures,
                                })).collect::<Vec<_>>(),
                                "total": counts.total,
                                "errors": counts.errors,
                            }),
                        );
                        Ok(())
                    }
                });
            }
            "prune_retention" => {
                let messages_repo = messages_repo.clone();
                let alerts_repo = alerts_repo.clone();
                let timeseries = timeseries.clone();
                let settings = settings.clone();
                scheduler.register(*name, *interval, None, move || {
                    let messages_repo = messages_repo.clone();
                    let alerts_repo = alerts_repo.clone();
                    let timeseries = timeseries.clone();
                    let settings = settings.clone();
                    async move {
                        let now = now_unix();
                        if !settings.save_all {
                            let cutoff = now - settings.db_save_days * 86_400;
                            messages_repo.prune_older_than(cutoff).await?;
                        }
                        let alert_cutoff = now - settings.db_alert_save_days * 86_400;
                        alerts_repo.prune_older_than(alert_cutoff).await?;
                        timeseries.prune_expired(now).await?;
                        Ok(())
                    }
                });
            }
            "timeseries_cache_refresh" => {
                let timeseries = timeseries.clone();
                scheduler.register(*name, *interval, None, move || {
                    let timeseries = timeseries.clone();
                    async move { timeseries.refresh_cache(now_unix()).await }
                });
            }
            "fts_bounded_merge" => {
                let pool = pool.clone();
                scheduler.register(*name, *interval, None, move || {
                    let pool = pool.clone();
                    async move {
                        tokio::task::spawn_blocking(move || {
                            let mut conn = pool.get()?;
                            fts::bounded_merge(&mut conn, fts::DEFAULT_MERGE_PAGES)
                        })
                        .await?
                    }
                });
            }
            "wal_checkpoint" => {
                let pool = pool.clone();
                scheduler.register(*name, *interval, None, move || {
                    let pool = pool.clone();
                    async move {
                        tokio::task::spawn_blocking(move || {
                            let mut conn = pool.get()?;
                            fts::truncate_checkpoint(&mut conn)
                        })
                        .await?
                    }
                });
            }
            "fts_optimize_vacuum" => {
                let pool = pool.clone();
                // Cadence is carried entirely by the 6-hour interval; an
                // `at` phase constraint would need the interval itself
                // aligned to the wall clock to ever match (see
                // `AtConstraint::matches`), which a plain `interval_dur`
                // wakeup is not.
                scheduler.register(
                    *name,
                    *interval,
                    None,
                    move || {
                        let pool = pool.clone();
                        async move {
                            tokio::task::spawn_blocking(move || {
                                let mut conn = pool.get()?;
                                fts::closed_loop_optimize(&mut conn)
                            })
                            .await?
                        }
                    },
                );
            }
            "decoder_health_probe" => {
                let connection_status_repo = connection_status_repo.clone();
                let sets: Vec<(&'static str, Arc<crate::listeners::ListenerHealth>)> = listener_sets
                    .iter()
                    .map(|s| (s.decoder_name, s.health.clone()))
                    .collect();
                scheduler.register(*name, *interval, None, move || {
                    let connection_status_repo = connection_status_repo.clone();
                    let sets = sets.clone();
                    async move {
                        for (decoder_name, health) in &sets {
                            let snapshot = health.snapshot();
                            connection_status_repo
                                .upsert(ConnectionStatusRow {
                                    decoder_type: (*decoder_name).to_string(),
                                    enabled: true,
                                    connected: snapshot.connected,
                                    last_message_at: snapshot.last_message_at,
                                    consecutive_failures: snapshot.consecutive_failures as i32,
                                })
                                .await?;
                        }
                        Ok(())
                    }
                });
            }
            other => warn!(task = other, "no handler registered for default scheduled task"),
        }
    }
}
