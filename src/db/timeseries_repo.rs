//! Time-series persistence (§4.H): minute-aligned writes, resolution
//! roll-ups, range queries, and retention pruning.

use anyhow::Result;
use diesel::prelude::*;

use super::models::{NewTimeseriesRow, TimeseriesRow};
use super::schema::timeseries_stats;
use super::SqlitePool;

#[derive(Clone)]
pub struct TimeseriesRepository {
    pool: SqlitePool,
}

impl TimeseriesRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// INSERT-OR-IGNORE on `(timestamp, resolution)` so replays (e.g. a
    /// restart mid-minute) are idempotent (§4.H).
    pub async fn write_row(&self, row: NewTimeseriesRow) -> Result<()> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            diesel::insert_or_ignore_into(timeseries_stats::table)
                .values(&row)
                .execute(&mut conn)?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;
        Ok(())
    }

    /// Sum the next-finer resolution's rows inside `[window_start,
    /// window_end)` into one coarser-resolution row (§4.H roll-up math).
    pub async fn rollup_window(
        &self,
        finer_resolution: String,
        coarser_resolution: String,
        window_start: i64,
        window_end: i64,
        created_at: i64,
    ) -> Result<()> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let rows: Vec<TimeseriesRow> = timeseries_stats::table
                .filter(timeseries_stats::resolution.eq(&finer_resolution))
                .filter(timeseries_stats::timestamp.ge(window_start))
                .filter(timeseries_stats::timestamp.lt(window_end))
                .select(TimeseriesRow::as_select())
                .load(&mut conn)?;

            if rows.is_empty() {
                return Ok::<(), anyhow::Error>(());
            }

            let summed = NewTimeseriesRow {
                timestamp: window_start,
                resolution: coarser_resolution,
                acars: rows.iter().map(|r| r.acars).sum(),
                vdlm: rows.iter().map(|r| r.vdlm).sum(),
                hfdl: rows.iter().map(|r| r.hfdl).sum(),
                imsl: rows.iter().map(|r| r.imsl).sum(),
                irdm: rows.iter().map(|r| r.irdm).sum(),
                total: rows.iter().map(|r| r.total).sum(),
                error: rows.iter().map(|r| r.error).sum(),
                created_at,
            };

            diesel::insert_or_ignore_into(timeseries_stats::table)
                .values(&summed)
                .execute(&mut conn)?;
            Ok(())
        })
        .await??;
        Ok(())
    }

    /// Select rows for `resolution` within `[start, end)`, ascending.
    pub async fn range(&self, resolution: String, start: i64, end: i64) -> Result<Vec<TimeseriesRow>> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let rows = timeseries_stats::table
                .filter(timeseries_stats::resolution.eq(resolution))
                .filter(timeseries_stats::timestamp.ge(start))
                .filter(timeseries_stats::timestamp.lt(end))
                .order(timeseries_stats::timestamp.asc())
                .select(TimeseriesRow::as_select())
                .load(&mut conn)?;
            Ok::<Vec<TimeseriesRow>, anyhow::Error>(rows)
        })
        .await??;
        Ok(result)
    }

    /// Retention: `1min` after 24h, `5min` after a week, `1hr` after a
    /// month, `1day` kept indefinitely (§4.H).
    pub async fn prune_resolution_before(&self, resolution: String, cutoff: i64) -> Result<usize> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let deleted = diesel::delete(
                timeseries_stats::table
                    .filter(timeseries_stats::resolution.eq(resolution))
                    .filter(timeseries_stats::timestamp.lt(cutoff)),
            )
            .execute(&mut conn)?;
            Ok::<usize, anyhow::Error>(deleted)
        })
        .await??;
        Ok(result)
    }

    pub async fn bulk_insert_for_import(&self, rows: Vec<NewTimeseriesRow>) -> Result<usize> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let mut inserted = 0usize;
            for chunk in rows.chunks(500) {
                inserted += diesel::insert_or_ignore_into(timeseries_stats::table)
                    .values(chunk)
                    .execute(&mut conn)?;
            }
            Ok::<usize, anyhow::Error>(inserted)
        })
        .await??;
        Ok(result)
    }
}
