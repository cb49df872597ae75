//! Wall-clock-aligned time-series writer, resolution roll-ups, and the
//! canonical-range query cache (§4.H). The durable half lives in
//! [`crate::db::timeseries_repo`]; this module owns the minute-aligned
//! writer task, generalized from the teacher's `connection_status.rs`
//! `start_periodic_publish` fixed-interval loop into a wall-clock-aligned
//! one, plus an in-memory cache over the eight canonical ranges the
//! real-time event layer serves on demand.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::db::models::{NewTimeseriesRow, TimeseriesRow};
use crate::db::timeseries_repo::TimeseriesRepository;

/// Resolutions in finer-to-coarser order, each name matching the
/// `resolution` column value written by migration 8 (§4.B/§4.H).
pub const RESOLUTIONS: &[&str] = &["1min", "5min", "1hr", "1day"];

fn resolution_seconds(resolution: &str) -> i64 {
    match resolution {
        "1min" => 60,
        "5min" => 300,
        "1hr" => 3_600,
        "1day" => 86_400,
        _ => 60,
    }
}

/// Retention cutoffs per resolution (§4.H): `1min` kept 24h, `5min` kept a
/// week, `1hr` kept a month, `1day` kept indefinitely (no pruning).
fn retention_seconds(resolution: &str) -> Option<i64> {
    match resolution {
        "1min" => Some(86_400),
        "5min" => Some(7 * 86_400),
        "1hr" => Some(30 * 86_400),
        "1day" => None,
        _ => None,
    }
}

/// The eight canonical ranges the event layer's `rrd_timeseries` handler
/// serves (§4.H/§6): name plus lookback window and the resolution backing it.
pub const CANONICAL_RANGES: &[(&str, i64, &str)] = &[
    ("1hr", 3_600, "1min"),
    ("6hr", 6 * 3_600, "1min"),
    ("12hr", 12 * 3_600, "5min"),
    ("24hr", 86_400, "5min"),
    ("1wk", 7 * 86_400, "1hr"),
    ("30day", 30 * 86_400, "1hr"),
    ("6mon", 182 * 86_400, "1day"),
    ("1yr", 365 * 86_400, "1day"),
];

/// Per-decoder deltas accumulated between minute boundaries.
#[derive(Debug, Default, Clone)]
pub struct Deltas {
    pub acars: i64,
    pub vdlm: i64,
    pub hfdl: i64,
    pub imsl: i64,
    pub irdm: i64,
    pub error: i64,
}

impl Deltas {
    pub fn record(&mut self, message_type: &str, is_error: bool) {
        match crate::db::stats_repo::table_suffix(message_type) {
            Some("acars") => self.acars += 1,
            Some("vdlm") => self.vdlm += 1,
            Some("hfdl") => self.hfdl += 1,
            Some("imsl") => self.imsl += 1,
            Some("irdm") => self.irdm += 1,
            _ => {}
        }
        if is_error {
            self.error += 1;
        }
    }

    fn total(&self) -> i64 {
        self.acars + self.vdlm + self.hfdl + self.imsl + self.irdm
    }

    fn take(&mut self) -> Deltas {
        std::mem::take(self)
    }
}

/// One point on the wire: millisecond epoch timestamp plus per-decoder
/// counts, the shape `rrd_timeseries` emits (§4.H/§6).
#[derive(Debug, Clone, Serialize)]
pub struct TimeseriesPoint {
    pub timestamp_ms: i64,
    pub acars: i64,
    pub vdlm: i64,
    pub hfdl: i64,
    pub imsl: i64,
    pub irdm: i64,
    pub total: i64,
    pub error: i64,
}

impl From<TimeseriesRow> for TimeseriesPoint {
    fn from(row: TimeseriesRow) -> Self {
        Self {
            timestamp_ms: row.timestamp * 1000,
            acars: row.acars,
            vdlm: row.vdlm,
            hfdl: row.hfdl,
            imsl: row.imsl,
            irdm: row.irdm,
            total: row.total,
            error: row.error,
        }
    }
}

#[derive(Debug, Default)]
struct RangeCache {
    points: HashMap<&'static str, Vec<TimeseriesPoint>>,
}

/// Shared counter accumulator the ingest pipeline records into; drained by
/// the minute-aligned writer task.
#[derive(Clone, Default)]
pub struct DeltaAccumulator {
    inner: Arc<RwLock<Deltas>>,
}

impl DeltaAccumulator {
    pub fn record(&self, message_type: &str, is_error: bool) {
        self.inner.write().record(message_type, is_error);
    }

    fn drain(&self) -> Deltas {
        self.inner.write().take()
    }
}

/// Cheaply cloned handle to the canonical-range point cache the event
/// layer reads from for `rrd_timeseries` responses.
#[derive(Clone, Default)]
pub struct TimeseriesCache {
    inner: Arc<RwLock<RangeCache>>,
}

impl TimeseriesCache {
    pub fn get(&self, range: &str) -> Option<Vec<TimeseriesPoint>> {
        self.inner.read().points.get(range).cloned()
    }

    fn set(&self, range: &'static str, points: Vec<TimeseriesPoint>) {
        self.inner.write().points.insert(range, points);
    }
}

pub struct TimeseriesWriter {
    repo: TimeseriesRepository,
    deltas: DeltaAccumulator,
    cache: TimeseriesCache,
}

impl TimeseriesWriter {
    pub fn new(repo: TimeseriesRepository) -> Self {
        Self { repo, deltas: DeltaAccumulator::default(), cache: TimeseriesCache::default() }
    }

    pub fn deltas(&self) -> DeltaAccumulator {
        self.deltas.clone()
    }

    pub fn cache(&self) -> TimeseriesCache {
        self.cache.clone()
    }

    /// Write the drained counters as one `1min` row aligned to the wall
    /// clock minute that just elapsed (§4.H).
    pub async fn write_minute(&self, now_unix: i64) -> Result<()> {
        let deltas = self.deltas.drain();
        let minute_start = (now_unix / 60) * 60 - 60;
        let row = NewTimeseriesRow {
            timestamp: minute_start,
            resolution: "1min".to_string(),
            acars: deltas.acars,
            vdlm: deltas.vdlm,
            hfdl: deltas.hfdl,
            imsl: deltas.imsl,
            irdm: deltas.irdm,
            total: deltas.total(),
            error: deltas.error,
            created_at: now_unix,
        };
        self.repo.write_row(row).await
    }

    /// Roll the just-completed window of the finer resolution up into one
    /// row of the next coarser resolution, if that coarser window just
    /// closed (§4.H roll-up schedule: 5 x 1min -> 5min, 12 x 5min -> 1hr,
    /// 24 x 1hr -> 1day).
    pub async fn maybe_rollup(&self, now_unix: i64) -> Result<()> {
        for window in [("1min", "5min", 300), ("5min", "1hr", 3_600), ("1hr", "1day", 86_400)] {
            let (finer, coarser, window_secs) = window;
            if now_unix % window_secs < 60 {
                let window_end = (now_unix / window_secs) * window_secs;
                let window_start = window_end - window_secs;
                self.repo
                    .rollup_window(finer.to_string(), coarser.to_string(), window_start, window_end, now_unix)
                    .await?;
                debug!(finer, coarser, window_start, window_end, "rolled up timeseries window");
            }
        }
        Ok(())
    }

    /// Prune resolutions past their retention window (§4.H).
    pub async fn prune_expired(&self, now_unix: i64) -> Result<()> {
        for resolution in RESOLUTIONS {
            if let Some(retention) = retention_seconds(resolution) {
                let cutoff = now_unix - retention;
                let deleted = self.repo.prune_resolution_before((*resolution).to_string(), cutoff).await?;
                if deleted > 0 {
                    debug!(resolution, deleted, "pruned expired timeseries rows");
                }
            }
        }
        Ok(())
    }

    /// Refresh the in-memory cache for every canonical range (§4.H), called
    /// periodically by the scheduler and once eagerly at startup.
    pub async fn refresh_cache(&self, now_unix: i64) -> Result<()> {
        for (name, lookback, resolution) in CANONICAL_RANGES {
            let start = now_unix - lookback;
            match self.repo.range(resolution.to_string(), start, now_unix + 1).await {
                Ok(rows) => {
                    let points = rows.into_iter().map(TimeseriesPoint::from).collect();
                    self.cache.set(name, points);
                }
                Err(err) => warn!(range = name, error = %err, "failed to refresh timeseries range cache"),
            }
        }
        Ok(())
    }
}

async fn tick(writer: &TimeseriesWriter) {
    let now = crate::db::now_unix();
    if let Err(err) = writer.write_minute(now).await {
        warn!(error = %err, "failed to write timeseries minute row");
    }
    if let Err(err) = writer.maybe_rollup(now).await {
        warn!(error = %err, "failed to roll up timeseries window");
    }
}

/// Drive the writer on a wall-clock-aligned one-minute cadence until
/// `shutdown` fires. Sleeps to the next minute boundary first so restarts
/// don't write a short first interval at an arbitrary offset.
pub async fn run(writer: Arc<TimeseriesWriter>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let now = crate::db::now_unix();
    let until_next_minute = 60 - (now % 60);
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(until_next_minute as u64)) => {}
        _ = shutdown.changed() => return,
    }

    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = interval.tick() => tick(&writer).await,
            _ = shutdown.changed() => {
                debug!("timeseries writer shutting down");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_record_routes_by_decoder_and_counts_errors() {
        let mut d = Deltas::default();
        d.record("ACARS", false);
        d.record("VDL-M2", true);
        d.record("bogus", false);
        assert_eq!(d.acars, 1);
        assert_eq!(d.vdlm, 1);
        assert_eq!(d.error, 1);
        assert_eq!(d.total(), 2);
    }

    #[test]
    fn point_timestamp_converts_to_milliseconds() {
        let row = TimeseriesRow {
            id: 1,
            timestamp: 1_700_000_000,
            resolution: "1min".into(),
            acars: 1,
            vdlm: 0,
            hfdl: 0,
            imsl: 0,
            irdm: 0,
            total: 1,
            error: 0,
            created_at: 1_700_000_000,
        };
        let point: TimeseriesPoint = row.into();
        assert_eq!(point.timestamp_ms, 1_700_000_000_000);
    }

    #[test]
    fn canonical_ranges_cover_every_name_from_spec() {
        let names: Vec<&str> = CANONICAL_RANGES.iter().map(|(n, _, _)| *n).collect();
        assert_eq!(names, vec!["1hr", "6hr", "12hr", "24hr", "1wk", "30day", "6mon", "1yr"]);
    }

    #[test]
    fn retention_is_indefinite_for_daily_resolution() {
        assert!(retention_seconds("1day").is_none());
        assert_eq!(retention_seconds("1min"), Some(86_400));
    }
}
