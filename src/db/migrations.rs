//! Migration chain runner and revision detection (§4.B).

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use thiserror::Error;
use tracing::{info, warn};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("database is in an unrecognized state: {0}")]
    AmbiguousState(String),
    #[error("migration chain failed: {0}")]
    Failed(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Detect whether this is a brand-new database, a legacy database matching
/// migration-01's exact base shape (stamp it revision 1 and continue), or an
/// already-versioned database (resume from the stored revision). Anything
/// else fails loudly rather than guessing (§4.B).
fn detect_starting_state(conn: &mut SqliteConnection) -> Result<(), MigrationError> {
    let has_revision_table: i64 = diesel::sql_query(
        "SELECT COUNT(*) as count FROM sqlite_master WHERE type='table' AND name='schema_revision'",
    )
    .get_result::<CountRow>(conn)
    .map(|r| r.count)
    .unwrap_or(0);

    if has_revision_table > 0 {
        return Ok(());
    }

    let has_messages_table: i64 = diesel::sql_query(
        "SELECT COUNT(*) as count FROM sqlite_master WHERE type='table' AND name='messages'",
    )
    .get_result::<CountRow>(conn)
    .map(|r| r.count)
    .unwrap_or(0);

    if has_messages_table == 0 {
        // Brand new database; the full chain runs from migration 1.
        return Ok(());
    }

    let has_uid_column: i64 = diesel::sql_query("SELECT COUNT(*) as count FROM pragma_table_info('messages') WHERE name='uid'")
        .get_result::<CountRow>(conn)
        .map(|r| r.count)
        .unwrap_or(0);
    let has_aircraft_id_column: i64 = diesel::sql_query(
        "SELECT COUNT(*) as count FROM pragma_table_info('messages') WHERE name='aircraft_id'",
    )
    .get_result::<CountRow>(conn)
    .map(|r| r.count)
    .unwrap_or(0);
    let has_unified_freqs: i64 =
        diesel::sql_query("SELECT COUNT(*) as count FROM sqlite_master WHERE type='table' AND name='freqs'")
            .get_result::<CountRow>(conn)
            .map(|r| r.count)
            .unwrap_or(0);

    if has_uid_column == 0 && has_aircraft_id_column == 0 && has_unified_freqs > 0 {
        warn!("legacy database predates the schema_revision marker; stamping revision 1");
        diesel::sql_query(
            "CREATE TABLE schema_revision (id INTEGER PRIMARY KEY CHECK (id = 1), revision INTEGER NOT NULL)",
        )
        .execute(conn)
        .map_err(|e| MigrationError::AmbiguousState(e.to_string()))?;
        diesel::sql_query("INSERT INTO schema_revision (id, revision) VALUES (1, 1)")
            .execute(conn)
            .map_err(|e| MigrationError::AmbiguousState(e.to_string()))?;
        // `run_pending_migrations` below tracks progress in diesel's own
        // `__diesel_schema_migrations` ledger, not `schema_revision`. A
        // legacy database already has migration 1's tables (this branch's
        // whole premise), so without a matching row here diesel would try
        // to replay migration 1's `CREATE TABLE messages` against a
        // database that already has one and fail instead of resuming at
        // migration 2.
        diesel::sql_query(
            "CREATE TABLE IF NOT EXISTS __diesel_schema_migrations (
                version VARCHAR(50) PRIMARY KEY NOT NULL,
                run_on TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(conn)
        .map_err(|e| MigrationError::AmbiguousState(e.to_string()))?;
        diesel::sql_query(
            "INSERT OR IGNORE INTO __diesel_schema_migrations (version) VALUES ('20240101000001')",
        )
        .execute(conn)
        .map_err(|e| MigrationError::AmbiguousState(e.to_string()))?;
        return Ok(());
    }

    Err(MigrationError::AmbiguousState(
        "messages table exists but does not match any known revision shape".to_string(),
    ))
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    count: i64,
}

/// Run the full eight-step chain, then VACUUM/ANALYZE (§4.B step 8) — VACUUM
/// cannot run inside diesel_migrations' per-file transaction, so it happens
/// here, once, after the chain commits.
pub fn run(conn: &mut SqliteConnection) -> anyhow::Result<()> {
    detect_starting_state(conn)?;

    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(MigrationError::Failed)?;
    for m in &applied {
        info!("applied migration {}", m);
    }

    conn.batch_execute("VACUUM;")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::Connection;

    fn fresh_conn() -> SqliteConnection {
        SqliteConnection::establish(":memory:").expect("in-memory sqlite connection")
    }

    #[test]
    fn fresh_database_runs_full_chain() {
        let mut conn = fresh_conn();
        run(&mut conn).expect("migration chain should succeed on a fresh db");

        #[derive(QueryableByName)]
        struct Rev {
            #[diesel(sql_type = diesel::sql_types::Integer)]
            revision: i32,
        }
        let rev: Rev = diesel::sql_query("SELECT revision FROM schema_revision WHERE id = 1")
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(rev.revision, 8);
    }

    #[test]
    fn running_twice_is_idempotent() {
        let mut conn = fresh_conn();
        run(&mut conn).unwrap();
        run(&mut conn).unwrap();
    }

    /// Migration 1's SQL minus its trailing `schema_revision` table, i.e.
    /// the exact shape a pre-marker legacy database has.
    fn legacy_migration_01_sql() -> &'static str {
        const UP: &str = include_str!("../../migrations/20240101000001_initial_tables/up.sql");
        let marker = "CREATE TABLE schema_revision";
        match UP.find(marker) {
            Some(idx) => &UP[..idx],
            None => UP,
        }
    }

    #[test]
    fn legacy_database_resumes_at_migration_two_instead_of_replaying_one() {
        let mut conn = fresh_conn();
        conn.batch_execute(legacy_migration_01_sql()).unwrap();

        run(&mut conn).expect("legacy db should be stamped and resume from migration 2, not replay migration 1");

        #[derive(QueryableByName)]
        struct Rev {
            #[diesel(sql_type = diesel::sql_types::Integer)]
            revision: i32,
        }
        let rev: Rev = diesel::sql_query("SELECT revision FROM schema_revision WHERE id = 1")
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(rev.revision, 8);
    }
}
