//! Mapping repository implementation

use chrono::{DateTime, Utc};
use libsql::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::models::{Fingerprint, MappingRecord};

/// Trait for mapping storage operations (async)
///
/// The store is the only writer of mapping records. Callers serialize
/// operations on the same `local_path`; different paths never interfere.
#[allow(async_fn_in_trait)]
pub trait MappingRepository {
    /// Get the record for a local path
    async fn get(&self, local_path: &str) -> Result<Option<MappingRecord>>;

    /// Insert or replace a record. Returns once the write is committed.
    async fn put(&self, record: &MappingRecord) -> Result<()>;

    /// Delete the record for a local path. Returns whether one existed.
    async fn delete(&self, local_path: &str) -> Result<bool>;

    /// All records, ordered by local path
    async fn all(&self) -> Result<Vec<MappingRecord>>;

    /// Find the record linked to a remote page
    async fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<MappingRecord>>;

    /// Move a record to a new local path, replacing any record already there
    async fn rename(&self, from: &str, to: &str) -> Result<bool>;
}

/// libSQL implementation of `MappingRepository`
pub struct LibSqlMappingRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlMappingRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_record(row: &Row) -> Result<MappingRecord> {
        let local_path: String = row.get(0)?;
        let remote_id: String = row.get(1)?;
        let fingerprint: String = row.get(2)?;
        let synced_at: i64 = row.get(3)?;
        let last_synced_at = DateTime::<Utc>::from_timestamp_millis(synced_at).ok_or_else(|| {
            Error::Mapping(format!("invalid synced_at {synced_at} for {local_path}"))
        })?;

        Ok(MappingRecord {
            local_path,
            remote_id,
            last_synced_fingerprint: Fingerprint::from(fingerprint),
            last_synced_at,
        })
    }

    async fn query_one(&self, sql: &str, key: &str) -> Result<Option<MappingRecord>> {
        let mut rows = self.conn.query(sql, [key]).await?;
        match rows.next().await? {
            Some(row) => Self::parse_record(&row).map(Some),
            None => Ok(None),
        }
    }
}

impl MappingRepository for LibSqlMappingRepository<'_> {
    async fn get(&self, local_path: &str) -> Result<Option<MappingRecord>> {
        self.query_one(
            "SELECT local_path, remote_id, fingerprint, synced_at FROM mappings WHERE local_path = ?",
            local_path,
        )
        .await
    }

    async fn put(&self, record: &MappingRecord) -> Result<()> {
        if record.local_path.is_empty() || record.remote_id.is_empty() {
            return Err(Error::InvalidInput(
                "mapping records need a local path and a remote id".to_string(),
            ));
        }

        self.conn
            .execute(
                "INSERT OR REPLACE INTO mappings (local_path, remote_id, fingerprint, synced_at) VALUES (?, ?, ?, ?)",
                params![
                    record.local_path.as_str(),
                    record.remote_id.as_str(),
                    record.last_synced_fingerprint.as_str(),
                    record.last_synced_at.timestamp_millis()
                ],
            )
            .await?;
        tracing::debug!(
            path = %record.local_path,
            fingerprint = record.last_synced_fingerprint.short(),
            "Committed mapping"
        );
        Ok(())
    }

    async fn delete(&self, local_path: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM mappings WHERE local_path = ?", [local_path])
            .await?;
        Ok(affected > 0)
    }

    async fn all(&self) -> Result<Vec<MappingRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT local_path, remote_id, fingerprint, synced_at FROM mappings ORDER BY local_path",
                (),
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }

    async fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<MappingRecord>> {
        self.query_one(
            "SELECT local_path, remote_id, fingerprint, synced_at FROM mappings WHERE remote_id = ? ORDER BY synced_at DESC LIMIT 1",
            remote_id,
        )
        .await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<bool> {
        if from == to {
            return Ok(self.get(from).await?.is_some());
        }
        let affected = self
            .conn
            .execute(
                "UPDATE OR REPLACE mappings SET local_path = ? WHERE local_path = ?",
                [to, from],
            )
            .await?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn record(path: &str, remote_id: &str, fingerprint: &str) -> MappingRecord {
        MappingRecord {
            local_path: path.to_string(),
            remote_id: remote_id.to_string(),
            last_synced_fingerprint: Fingerprint::from(fingerprint.to_string()),
            last_synced_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_and_get() {
        let db = setup().await;
        let repo = LibSqlMappingRepository::new(db.connection());

        assert_eq!(repo.get("notes/a.md").await.unwrap(), None);

        let stored = record("notes/a.md", "page-1", "sha256:aa");
        repo.put(&stored).await.unwrap();
        assert_eq!(repo.get("notes/a.md").await.unwrap(), Some(stored));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_replaces_existing_record() {
        let db = setup().await;
        let repo = LibSqlMappingRepository::new(db.connection());

        repo.put(&record("a.md", "page-1", "sha256:aa")).await.unwrap();
        repo.put(&record("a.md", "page-1", "sha256:bb")).await.unwrap();

        let all = repo.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].last_synced_fingerprint.as_str(), "sha256:bb");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_rejects_incomplete_record() {
        let db = setup().await;
        let repo = LibSqlMappingRepository::new(db.connection());

        let result = repo.put(&record("a.md", "", "sha256:aa")).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_records_are_independent() {
        let db = setup().await;
        let repo = LibSqlMappingRepository::new(db.connection());

        repo.put(&record("b.md", "page-2", "sha256:02")).await.unwrap();
        repo.put(&record("a.md", "page-1", "sha256:01")).await.unwrap();
        assert!(repo.delete("b.md").await.unwrap());
        assert!(!repo.delete("b.md").await.unwrap());

        let paths: Vec<String> = repo
            .all()
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.local_path)
            .collect();
        assert_eq!(paths, vec!["a.md".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_find_by_remote_id() {
        let db = setup().await;
        let repo = LibSqlMappingRepository::new(db.connection());

        repo.put(&record("a.md", "page-1", "sha256:01")).await.unwrap();
        let found = repo.find_by_remote_id("page-1").await.unwrap();
        assert_eq!(found.map(|record| record.local_path), Some("a.md".to_string()));
        assert_eq!(repo.find_by_remote_id("page-9").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rename_moves_record() {
        let db = setup().await;
        let repo = LibSqlMappingRepository::new(db.connection());

        repo.put(&record("old.md", "page-1", "sha256:01")).await.unwrap();
        repo.put(&record("new.md", "page-2", "sha256:02")).await.unwrap();

        assert!(repo.rename("old.md", "new.md").await.unwrap());
        assert_eq!(repo.get("old.md").await.unwrap(), None);
        let moved = repo.get("new.md").await.unwrap().unwrap();
        assert_eq!(moved.remote_id, "page-1");
        assert!(!repo.rename("missing.md", "x.md").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_records_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mappings.db");
        {
            let db = Database::open(&path).await.unwrap();
            let repo = LibSqlMappingRepository::new(db.connection());
            repo.put(&record("a.md", "page-1", "sha256:01")).await.unwrap();
        }

        let db = Database::open(&path).await.unwrap();
        let repo = LibSqlMappingRepository::new(db.connection());
        assert!(repo.get("a.md").await.unwrap().is_some());
    }
}
