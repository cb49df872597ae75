//! Embedded SQLite storage engine: connection pooling, migration chain, the
//! FTS5 integrity guard, and per-entity repositories (§4.B).

pub mod alerts_repo;
pub mod connection_status_repo;
pub mod fts;
pub mod import_registry;
pub mod messages_repo;
pub mod migrations;
pub mod models;
pub mod schema;
pub mod stats_repo;
pub mod timeseries_repo;

use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::sqlite::SqliteConnection;
use diesel::RunQueryDsl;

pub type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

#[derive(Debug)]
struct WalPragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for WalPragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        diesel::sql_query("PRAGMA journal_mode = WAL")
            .execute(conn)
            .map_err(diesel::r2d2::Error::QueryError)?;
        diesel::sql_query("PRAGMA synchronous = NORMAL")
            .execute(conn)
            .map_err(diesel::r2d2::Error::QueryError)?;
        diesel::sql_query("PRAGMA foreign_keys = ON")
            .execute(conn)
            .map_err(diesel::r2d2::Error::QueryError)?;
        Ok(())
    }
}

/// Build the pool. Every checked-out connection carries WAL +
/// synchronous=NORMAL (§4.B) via the r2d2 customizer, so callers never have
/// to remember to set pragmas themselves.
pub fn build_pool(db_path: &std::path::Path) -> anyhow::Result<SqlitePool> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path.to_string_lossy());
    let pool = Pool::builder()
        .max_size(8)
        .connection_customizer(Box::new(WalPragmas))
        .build(manager)?;
    Ok(pool)
}

pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}
