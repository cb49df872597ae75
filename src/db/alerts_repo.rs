//! Durable side of the alert engine (§4.G): term/ignore-term tables and the
//! `alert_matches` table, with the INSERT-OR-IGNORE discipline the spec
//! requires for the `(message_uid, term)` pair.

use anyhow::Result;
use diesel::prelude::*;

use super::models::{AlertMatch, AlertTerm, IgnoreAlertTerm, NewAlertMatch};
use super::schema::{alert_matches, alert_stats, ignore_alert_terms};
use super::{now_unix, SqlitePool};

#[derive(Clone)]
pub struct AlertsRepository {
    pool: SqlitePool,
}

impl AlertsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn load_terms(&self) -> Result<Vec<AlertTerm>> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let rows = alert_stats::table
                .order(alert_stats::created_at.asc())
                .select(AlertTerm::as_select())
                .load(&mut conn)?;
            Ok::<Vec<AlertTerm>, anyhow::Error>(rows)
        })
        .await??;
        Ok(result)
    }

    pub async fn load_ignore_terms(&self) -> Result<Vec<IgnoreAlertTerm>> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let rows = ignore_alert_terms::table
                .order(ignore_alert_terms::created_at.asc())
                .select(IgnoreAlertTerm::as_select())
                .load(&mut conn)?;
            Ok::<Vec<IgnoreAlertTerm>, anyhow::Error>(rows)
        })
        .await??;
        Ok(result)
    }

    /// Replace the persisted term set with `terms`/`ignore`, transactionally.
    /// The in-memory cache swap is the caller's responsibility (§4.G).
    pub async fn replace_terms(&self, terms: Vec<String>, ignore: Vec<String>) -> Result<()> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let now = now_unix();
            conn.transaction::<_, anyhow::Error, _>(|conn| {
                diesel::delete(alert_stats::table).execute(conn)?;
                diesel::delete(ignore_alert_terms::table).execute(conn)?;
                for term in terms.iter().map(|t| t.to_uppercase()) {
                    diesel::insert_into(alert_stats::table)
                        .values((alert_stats::term.eq(term), alert_stats::created_at.eq(now)))
                        .execute(conn)?;
                }
                for term in ignore.iter().map(|t| t.to_uppercase()) {
                    diesel::insert_into(ignore_alert_terms::table)
                        .values((
                            ignore_alert_terms::term.eq(term),
                            ignore_alert_terms::created_at.eq(now),
                        ))
                        .execute(conn)?;
                }
                Ok(())
            })?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;
        Ok(())
    }

    /// INSERT-OR-IGNORE on `(message_uid, term)`, the duplicate-avoidance
    /// discipline required by §4.G step 3.
    pub async fn record_matches(&self, matches: Vec<NewAlertMatch>) -> Result<usize> {
        if matches.is_empty() {
            return Ok(0);
        }
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let mut inserted = 0usize;
            for m in matches {
                inserted += diesel::insert_or_ignore_into(alert_matches::table)
                    .values(&m)
                    .execute(&mut conn)?;
            }
            Ok::<usize, anyhow::Error>(inserted)
        })
        .await??;
        Ok(result)
    }

    /// Retention pruner counterpart to `MessagesRepository::prune_older_than`
    /// (§4.I "Prune old messages + alert matches"): delete matches older than
    /// `cutoff_unix`.
    pub async fn prune_older_than(&self, cutoff_unix: i64) -> Result<usize> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let deleted = diesel::delete(alert_matches::table.filter(alert_matches::matched_at.lt(cutoff_unix)))
                .execute(&mut conn)?;
            Ok::<usize, anyhow::Error>(deleted)
        })
        .await??;
        Ok(result)
    }

    /// Wipe `alert_matches` ahead of a regeneration pass (§4.G).
    pub async fn clear_matches(&self) -> Result<usize> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let deleted = diesel::delete(alert_matches::table).execute(&mut conn)?;
            Ok::<usize, anyhow::Error>(deleted)
        })
        .await??;
        Ok(result)
    }

    pub async fn recent_matches(&self, limit: i64) -> Result<Vec<AlertMatch>> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let mut rows = alert_matches::table
                .order(alert_matches::id.desc())
                .limit(limit)
                .select(AlertMatch::as_select())
                .load::<AlertMatch>(&mut conn)?;
            rows.reverse();
            Ok::<Vec<AlertMatch>, anyhow::Error>(rows)
        })
        .await??;
        Ok(result)
    }

    /// Page size is fixed so two adjacent pages never share a `uid` once the
    /// total exceeds it (§8 scenario 3).
    pub const MATCHES_BY_TERM_PAGE_SIZE: i64 = 50;

    pub async fn matches_by_term(&self, term: String, page: i64) -> Result<Vec<AlertMatch>> {
        let pool = self.pool.clone();
        let page_size = Self::MATCHES_BY_TERM_PAGE_SIZE;
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let rows = alert_matches::table
                .filter(alert_matches::term.eq(term.to_uppercase()))
                .order(alert_matches::matched_at.desc())
                .limit(page_size)
                .offset(page.max(0) * page_size)
                .select(AlertMatch::as_select())
                .load(&mut conn)?;
            Ok::<Vec<AlertMatch>, anyhow::Error>(rows)
        })
        .await??;
        Ok(result)
    }

    /// Total match count for a term, backing `query_alerts_by_term`'s
    /// `total_count` (§8 scenario 3), independent of the requested page.
    pub async fn count_by_term(&self, term: String) -> Result<i64> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let count = alert_matches::table
                .filter(alert_matches::term.eq(term.to_uppercase()))
                .count()
                .get_result::<i64>(&mut conn)?;
            Ok::<i64, anyhow::Error>(count)
        })
        .await??;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_alert_match_uppercases_are_the_callers_job() {
        // record_matches persists exactly what it is given; the alert
        // engine (§4.G) is responsible for uppercasing terms before calling.
        let m = NewAlertMatch {
            message_uid: "abc".into(),
            term: "WN4899".into(),
            match_type: "flight".into(),
            matched_at: 0,
        };
        assert_eq!(m.term, "WN4899");
    }
}
