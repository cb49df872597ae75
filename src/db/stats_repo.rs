//! Per-decoder frequency/signal-level counters and the global/nonlogged
//! message counters (§3 "Decoder statistics"), generalized from the
//! per-decoder-table schema split migrations 02/03.

use anyhow::Result;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Double, Text};

use super::SqlitePool;

/// Map any legal spelling of a decoder type (§8: `ACARS, VDL-M2, VDLM2,
/// HFDL, IMSL, IMS-L, IRDM`) onto the table-name suffix used by the
/// per-decoder freq/level tables.
pub fn table_suffix(message_type: &str) -> Option<&'static str> {
    match message_type.to_ascii_uppercase().replace('-', "").as_str() {
        "ACARS" => Some("acars"),
        "VDLM2" | "VDLM" => Some("vdlm"),
        "HFDL" => Some("hfdl"),
        "IMSL" => Some("imsl"),
        "IRDM" => Some("irdm"),
        _ => None,
    }
}

/// Canonical `message_type` value stored on `decoder_count`/`connection_status`.
pub fn canonical_message_type(message_type: &str) -> Option<&'static str> {
    match table_suffix(message_type)? {
        "acars" => Some("ACARS"),
        "vdlm" => Some("VDL-M2"),
        "hfdl" => Some("HFDL"),
        "imsl" => Some("IMS-L"),
        "irdm" => Some("IRDM"),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct GlobalCounts {
    pub total: i64,
    pub errors: i64,
    pub good: i64,
    pub nonlogged_errors: i64,
    pub nonlogged_good: i64,
}

#[derive(QueryableByName, Default)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    total: i64,
    #[diesel(sql_type = BigInt)]
    errors: i64,
    #[diesel(sql_type = BigInt)]
    good: i64,
}

#[derive(QueryableByName, Default)]
struct NonloggedRow {
    #[diesel(sql_type = BigInt)]
    nonlogged_errors: i64,
    #[diesel(sql_type = BigInt)]
    nonlogged_good: i64,
}

#[derive(Clone)]
pub struct StatsRepository {
    pool: SqlitePool,
}

impl StatsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Writes exactly one row to the per-decoder frequency table for
    /// `message_type` (§8 testable property), incrementing its count.
    pub async fn update_frequencies(&self, message_type: String, freq: f64) -> Result<()> {
        let Some(suffix) = table_suffix(&message_type) else {
            return Ok(());
        };
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let sql = format!(
                "INSERT INTO decoder_freq_{suffix} (freq, count) VALUES (?, 1)
                 ON CONFLICT(freq) DO UPDATE SET count = count + 1"
            );
            diesel::sql_query(sql)
                .bind::<Double, _>(freq)
                .execute(&mut conn)?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;
        Ok(())
    }

    pub async fn update_level(&self, message_type: String, level: f64) -> Result<()> {
        let Some(suffix) = table_suffix(&message_type) else {
            return Ok(());
        };
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let sql = format!(
                "INSERT INTO decoder_level_{suffix} (level, count) VALUES (?, 1)
                 ON CONFLICT(level) DO UPDATE SET count = count + 1"
            );
            diesel::sql_query(sql)
                .bind::<Double, _>(level)
                .execute(&mut conn)?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;
        Ok(())
    }

    pub async fn increment_decoder_count(&self, message_type: String, is_error: bool) -> Result<()> {
        let Some(canonical) = canonical_message_type(&message_type) else {
            return Ok(());
        };
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let (errors, good) = if is_error { (1, 0) } else { (0, 1) };
            diesel::sql_query(
                "INSERT INTO decoder_count (message_type, total, errors, good) VALUES (?, 1, ?, ?)
                 ON CONFLICT(message_type) DO UPDATE SET
                    total = total + 1, errors = errors + excluded.errors, good = good + excluded.good",
            )
            .bind::<Text, _>(canonical)
            .bind::<BigInt, _>(errors)
            .bind::<BigInt, _>(good)
            .execute(&mut conn)?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;
        Ok(())
    }

    pub async fn increment_nonlogged_count(&self, is_error: bool) -> Result<()> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let column = if is_error { "nonlogged_errors" } else { "nonlogged_good" };
            diesel::sql_query(format!(
                "UPDATE nonlogged_count SET {column} = {column} + 1 WHERE id = 1"
            ))
            .execute(&mut conn)?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;
        Ok(())
    }

    /// Global totals for the `/data/stats.json` endpoint and `system_status`
    /// event (summed across all decoders, not per-decoder).
    pub async fn global_counts(&self) -> Result<GlobalCounts> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let counts: CountRow = diesel::sql_query(
                "SELECT COALESCE(SUM(total),0) AS total, COALESCE(SUM(errors),0) AS errors, COALESCE(SUM(good),0) AS good FROM decoder_count",
            )
            .get_result(&mut conn)
            .unwrap_or_default();
            let nonlogged: NonloggedRow = diesel::sql_query(
                "SELECT nonlogged_errors, nonlogged_good FROM nonlogged_count WHERE id = 1",
            )
            .get_result(&mut conn)
            .unwrap_or_default();
            Ok::<GlobalCounts, anyhow::Error>(GlobalCounts {
                total: counts.total,
                errors: counts.errors,
                good: counts.good,
                nonlogged_errors: nonlogged.nonlogged_errors,
                nonlogged_good: nonlogged.nonlogged_good,
            })
        })
        .await??;
        Ok(result)
    }

    /// Per-message-type totals over the last hour, for `/data/stats.json`'s
    /// `{acars, vdlm2, hfdl, imsl, irdm, total}` shape.
    pub async fn counts_since(&self, since_unix: i64) -> Result<std::collections::HashMap<String, i64>> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            #[derive(QueryableByName)]
            struct Row {
                #[diesel(sql_type = Text)]
                message_type: String,
                #[diesel(sql_type = BigInt)]
                count: i64,
            }
            let rows: Vec<Row> = diesel::sql_query(
                "SELECT message_type, COUNT(*) AS count FROM messages WHERE timestamp >= ? GROUP BY message_type",
            )
            .bind::<BigInt, _>(since_unix)
            .load(&mut conn)?;
            Ok::<std::collections::HashMap<String, i64>, anyhow::Error>(
                rows.into_iter().map(|r| (r.message_type, r.count)).collect(),
            )
        })
        .await??;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_suffix_accepts_every_legal_spelling() {
        assert_eq!(table_suffix("ACARS"), Some("acars"));
        assert_eq!(table_suffix("VDL-M2"), Some("vdlm"));
        assert_eq!(table_suffix("VDLM2"), Some("vdlm"));
        assert_eq!(table_suffix("HFDL"), Some("hfdl"));
        assert_eq!(table_suffix("IMSL"), Some("imsl"));
        assert_eq!(table_suffix("IMS-L"), Some("imsl"));
        assert_eq!(table_suffix("IRDM"), Some("irdm"));
        assert_eq!(table_suffix("bogus"), None);
    }

    #[test]
    fn canonical_message_type_round_trips() {
        assert_eq!(canonical_message_type("vdlm2"), Some("VDL-M2"));
        assert_eq!(canonical_message_type("ims-l"), Some("IMS-L"));
    }
}
