//! Message persistence and full-text search, generalized from the teacher's
//! `AirportsRepository` (`spawn_blocking` + `pool.get()` per call) to SQLite.

use anyhow::Result;
use diesel::prelude::*;
use tracing::info;

use super::models::{Message, NewMessage};
use super::schema::messages;
use super::stats_repo::canonical_message_type;
use super::SqlitePool;

#[derive(Clone)]
pub struct MessagesRepository {
    pool: SqlitePool,
}

/// One field of `query_search` (§6 wire protocol).
#[derive(Debug, Clone, Default)]
pub struct SearchTerm {
    pub flight: Option<String>,
    pub tail: Option<String>,
    pub icao: Option<String>,
    pub station_id: Option<String>,
    pub msg_text: Option<String>,
    pub label: Option<String>,
    pub freq: Option<String>,
    pub msgno: Option<String>,
    pub msg_type: Option<String>,
    pub depa: Option<String>,
    pub dsta: Option<String>,
}

#[derive(QueryableByName)]
struct FtsRowId {
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    rowid: i64,
}

impl MessagesRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert one message. The insert/delete/update FTS5 triggers (§4.B
    /// migration 4) keep `messages_fts` in sync automatically.
    pub async fn insert(&self, new_message: NewMessage) -> Result<Message> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            diesel::insert_into(messages::table)
                .values(&new_message)
                .execute(&mut conn)?;
            let inserted = messages::table
                .order(messages::id.desc())
                .select(Message::as_select())
                .first(&mut conn)?;
            Ok::<Message, anyhow::Error>(inserted)
        })
        .await??;

        Ok(result)
    }

    pub async fn get_by_uid(&self, uid: String) -> Result<Option<Message>> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let message = messages::table
                .filter(messages::uid.eq(uid))
                .select(Message::as_select())
                .first(&mut conn)
                .optional()?;
            Ok::<Option<Message>, anyhow::Error>(message)
        })
        .await??;
        Ok(result)
    }

    /// `query_search` (§6): build an FTS5 MATCH expression from the populated
    /// fields, constrain exact-match fields with plain equality, and page
    /// via `results_after` (a message id cursor) when not `show_all`.
    pub async fn search(
        &self,
        term: SearchTerm,
        results_after: Option<i64>,
        show_all: bool,
    ) -> Result<Vec<Message>> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let mut match_clauses = Vec::new();
            if let Some(v) = &term.msg_text {
                match_clauses.push(format!("msg_text: {}", fts_quote(v)));
            }
            if let Some(v) = &term.tail {
                match_clauses.push(format!("tail: {}", fts_quote(v)));
            }
            if let Some(v) = &term.flight {
                match_clauses.push(format!("flight: {}", fts_quote(v)));
            }
            if let Some(v) = &term.icao {
                match_clauses.push(format!("icao: {}", fts_quote(v)));
            }
            if let Some(v) = &term.depa {
                match_clauses.push(format!("depa: {}", fts_quote(v)));
            }
            if let Some(v) = &term.dsta {
                match_clauses.push(format!("dsta: {}", fts_quote(v)));
            }
            if let Some(v) = &term.label {
                match_clauses.push(format!("label: {}", fts_quote(v)));
            }

            let matched_ids: Vec<i64> = if match_clauses.is_empty() {
                Vec::new()
            } else {
                let fts_query = match_clauses.join(" AND ");
                let rows: Vec<FtsRowId> = diesel::sql_query(
                    "SELECT rowid FROM messages_fts WHERE messages_fts MATCH ? ORDER BY rowid DESC LIMIT 500",
                )
                .bind::<diesel::sql_types::Text, _>(fts_query)
                .load(&mut conn)?;
                rows.into_iter().map(|r| r.rowid).collect()
            };

            let mut query = messages::table.into_boxed();
            if !match_clauses.is_empty() {
                query = query.filter(messages::id.eq_any(matched_ids));
            }
            if let Some(v) = &term.station_id {
                query = query.filter(messages::station_id.eq(v.clone()));
            }
            if let Some(v) = &term.freq {
                if let Ok(f) = v.parse::<f64>() {
                    query = query.filter(messages::freq.eq(f));
                }
            }
            if let Some(v) = &term.msgno {
                query = query.filter(messages::msgno.eq(v.clone()));
            }
            if let Some(v) = &term.msg_type {
                let normalized = canonical_message_type(v).map(str::to_string).unwrap_or_else(|| v.clone());
                query = query.filter(messages::message_type.eq(normalized));
            }
            if let (false, Some(after)) = (show_all, results_after) {
                query = query.filter(messages::id.lt(after));
            }

            let rows = query
                .order(messages::id.desc())
                .limit(500)
                .select(Message::as_select())
                .load(&mut conn)?;

            Ok::<Vec<Message>, anyhow::Error>(rows)
        })
        .await??;
        Ok(result)
    }

    /// Most recent `limit` messages, oldest-first, for the connect-sequence
    /// `acars_msg_batch` stream (§4.J).
    pub async fn recent(&self, limit: i64) -> Result<Vec<Message>> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let mut rows = messages::table
                .order(messages::id.desc())
                .limit(limit)
                .select(Message::as_select())
                .load::<Message>(&mut conn)?;
            rows.reverse();
            Ok::<Vec<Message>, anyhow::Error>(rows)
        })
        .await??;
        Ok(result)
    }

    pub async fn total_count(&self) -> Result<i64> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let count = messages::table.count().get_result::<i64>(&mut conn)?;
            Ok::<i64, anyhow::Error>(count)
        })
        .await??;
        Ok(result)
    }

    /// Retention pruner: delete messages older than `retention_days`, unless
    /// `save_all` (caller's responsibility to skip calling this then). FTS
    /// rows follow automatically via the delete trigger.
    pub async fn prune_older_than(&self, cutoff_unix: i64) -> Result<usize> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let deleted = diesel::delete(messages::table.filter(messages::timestamp.lt(cutoff_unix)))
                .execute(&mut conn)?;
            Ok::<usize, anyhow::Error>(deleted)
        })
        .await??;
        if result > 0 {
            info!("pruned {} messages older than retention window", result);
        }
        Ok(result)
    }
}

fn fts_quote(raw: &str) -> String {
    format!("\"{}\"", raw.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fts_quote_escapes_embedded_quotes() {
        assert_eq!(fts_quote("N123\"AB"), "\"N123\"\"AB\"");
    }

    #[test]
    fn search_term_default_is_empty() {
        let term = SearchTerm::default();
        assert!(term.flight.is_none());
        assert!(term.icao.is_none());
    }
}
