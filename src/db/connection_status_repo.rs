//! Durable mirror of per-decoder connection status (§3), read by the status
//! emitter and written by the scheduler's decoder health probe (§4.I).

use anyhow::Result;
use diesel::prelude::*;

use super::models::ConnectionStatusRow;
use super::schema::connection_status;
use super::SqlitePool;

#[derive(Clone)]
pub struct ConnectionStatusRepository {
    pool: SqlitePool,
}

impl ConnectionStatusRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, row: ConnectionStatusRow) -> Result<()> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            diesel::insert_into(connection_status::table)
                .values(&row)
                .on_conflict(connection_status::decoder_type)
                .do_update()
                .set(&row)
                .execute(&mut conn)?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;
        Ok(())
    }

    pub async fn all(&self) -> Result<Vec<ConnectionStatusRow>> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let rows = connection_status::table
                .select(ConnectionStatusRow::as_select())
                .load(&mut conn)?;
            Ok::<Vec<ConnectionStatusRow>, anyhow::Error>(rows)
        })
        .await??;
        Ok(result)
    }
}
