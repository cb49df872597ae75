//! FTS5 integrity guard and compaction operations (§4.B).

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use tracing::{info, warn};

/// Bounded merge below this page count cannot keep pace with tombstones on a
/// busy index and caused unbounded segment growth in the prior implementation.
pub const MIN_MERGE_PAGES: u32 = 16;
pub const DEFAULT_MERGE_PAGES: u32 = 500;

#[derive(QueryableByName)]
struct NameRow {
    #[diesel(sql_type = diesel::sql_types::Text)]
    name: String,
}

const CANONICAL_TRIGGERS: &[&str] = &[
    "messages_fts_insert",
    "messages_fts_delete",
    "messages_fts_update",
];

fn fts_has_sentinel_column(conn: &mut SqliteConnection) -> anyhow::Result<bool> {
    let rows: Vec<NameRow> = diesel::sql_query(
        "SELECT name FROM pragma_table_info('messages_fts') WHERE name = 'message_type'",
    )
    .load(conn)?;
    Ok(!rows.is_empty())
}

fn triggers_present(conn: &mut SqliteConnection) -> anyhow::Result<bool> {
    let rows: Vec<NameRow> = diesel::sql_query(
        "SELECT name FROM sqlite_master WHERE type = 'trigger' AND name LIKE 'messages_fts_%'",
    )
    .load(conn)?;
    let present: std::collections::HashSet<String> = rows.into_iter().map(|r| r.name).collect();
    Ok(CANONICAL_TRIGGERS.iter().all(|t| present.contains(*t)))
}

const CREATE_FTS_SQL: &str = include_str!("../../migrations/20240101000004_create_fts5/up.sql");

/// Same statements migration 4 runs, minus its trailing
/// `UPDATE schema_revision SET revision = 4` stamp. The guard can run on a
/// database already at revision 8; re-running that stamp would regress
/// `schema_revision` and corrupt the very marker §4.B's migration detection
/// resumes from.
fn repair_sql() -> &'static str {
    let marker = "UPDATE schema_revision SET revision = 4 WHERE id = 1;";
    match CREATE_FTS_SQL.find(marker) {
        Some(idx) => &CREATE_FTS_SQL[..idx],
        None => CREATE_FTS_SQL,
    }
}

/// Run unconditionally after migrations on every startup (§4.B). If the
/// sentinel column is missing or any trigger is stale, drop and rebuild both
/// the virtual table and the triggers from the canonical definitions, then
/// reissue a full rebuild. This is the only mechanism that repairs upgrades
/// from installations predating the typed FTS schema.
pub fn verify_and_repair(conn: &mut SqliteConnection) -> anyhow::Result<()> {
    let healthy = fts_has_sentinel_column(conn)? && triggers_present(conn)?;
    if healthy {
        return Ok(());
    }

    warn!("messages_fts is missing the sentinel column or a canonical trigger; rebuilding");
    conn.batch_execute(
        "DROP TRIGGER IF EXISTS messages_fts_update;
         DROP TRIGGER IF EXISTS messages_fts_delete;
         DROP TRIGGER IF EXISTS messages_fts_insert;
         DROP TABLE IF EXISTS messages_fts;",
    )?;
    conn.batch_execute(repair_sql())?;
    info!("messages_fts rebuilt from canonical definition");
    Ok(())
}

/// Run until the b-tree is fully consolidated. Document count is unchanged
/// and segment count never increases.
pub fn closed_loop_optimize(conn: &mut SqliteConnection) -> anyhow::Result<()> {
    diesel::sql_query("INSERT INTO messages_fts(messages_fts) VALUES ('optimize')").execute(conn)?;
    Ok(())
}

/// Do at most `pages` pages of incremental merge work. Values <= 16 are
/// forbidden (see MIN_MERGE_PAGES).
pub fn bounded_merge(conn: &mut SqliteConnection, pages: u32) -> anyhow::Result<()> {
    if pages <= MIN_MERGE_PAGES {
        anyhow::bail!(
            "bounded_merge pages={pages} must be > {MIN_MERGE_PAGES}; it cannot keep pace with tombstones"
        );
    }
    diesel::sql_query(format!(
        "INSERT INTO messages_fts(messages_fts, rank) VALUES ('merge', {pages})"
    ))
    .execute(conn)?;
    Ok(())
}

/// TRUNCATE checkpoint: issued at startup and every 5 minutes (§4.B). Both
/// call sites treat a failure here as non-fatal.
pub fn truncate_checkpoint(conn: &mut SqliteConnection) -> anyhow::Result<()> {
    diesel::sql_query("PRAGMA wal_checkpoint(TRUNCATE)").execute(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::Connection;

    fn migrated_conn() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        crate::db::migrations::run(&mut conn).unwrap();
        conn
    }

    #[test]
    fn fresh_schema_passes_the_guard_untouched() {
        let mut conn = migrated_conn();
        verify_and_repair(&mut conn).expect("a freshly migrated schema should already be healthy");
        assert!(fts_has_sentinel_column(&mut conn).unwrap());
        assert!(triggers_present(&mut conn).unwrap());
    }

    #[test]
    fn dropped_trigger_triggers_a_rebuild() {
        let mut conn = migrated_conn();
        conn.batch_execute("DROP TRIGGER messages_fts_insert;").unwrap();
        assert!(!triggers_present(&mut conn).unwrap());
        verify_and_repair(&mut conn).unwrap();
        assert!(triggers_present(&mut conn).unwrap());
    }

    #[test]
    fn repair_does_not_regress_schema_revision_past_its_current_value() {
        let mut conn = migrated_conn();

        #[derive(QueryableByName)]
        struct Rev {
            #[diesel(sql_type = diesel::sql_types::Integer)]
            revision: i32,
        }
        let before: Rev = diesel::sql_query("SELECT revision FROM schema_revision WHERE id = 1")
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(before.revision, 8);

        conn.batch_execute("DROP TRIGGER messages_fts_insert;").unwrap();
        verify_and_repair(&mut conn).unwrap();

        let after: Rev = diesel::sql_query("SELECT revision FROM schema_revision WHERE id = 1")
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(after.revision, 8, "FTS repair must not regress the schema_revision marker");
    }

    #[test]
    fn merge_below_floor_is_rejected() {
        let mut conn = migrated_conn();
        assert!(bounded_merge(&mut conn, 16).is_err());
        assert!(bounded_merge(&mut conn, 8).is_err());
        assert!(bounded_merge(&mut conn, 500).is_ok());
    }
}
