//! Legacy RRD import dedup registry (§4.H): prevents double-importing a
//! backup file already registered by its sha-256 hash.

use anyhow::Result;
use diesel::prelude::*;
use sha2::{Digest, Sha256};

use super::schema::import_registry;
use super::{now_unix, SqlitePool};

#[derive(Clone)]
pub struct ImportRegistry {
    pool: SqlitePool,
}

pub fn hash_file(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

impl ImportRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn is_registered(&self, file_hash: String) -> Result<bool> {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let count: i64 = import_registry::table
                .filter(import_registry::file_hash.eq(file_hash))
                .count()
                .get_result(&mut conn)?;
            Ok::<bool, anyhow::Error>(count > 0)
        })
        .await??;
        Ok(result)
    }

    pub async fn register(&self, file_hash: String, source_path: String, rows_imported: i64) -> Result<()> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            diesel::insert_or_ignore_into(import_registry::table)
                .values((
                    import_registry::file_hash.eq(file_hash),
                    import_registry::source_path.eq(source_path),
                    import_registry::imported_at.eq(now_unix()),
                    import_registry::rows_imported.eq(rows_imported),
                ))
                .execute(&mut conn)?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_sha256_hex() {
        let h1 = hash_file(b"hello world");
        let h2 = hash_file(b"hello world");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn different_content_hashes_differ() {
        assert_ne!(hash_file(b"a"), hash_file(b"b"));
    }
}
