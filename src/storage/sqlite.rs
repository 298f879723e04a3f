//! SQLite record store.
//!
//! Provides persistent storage using a SQLite database. Each entity kind has
//! its own table keyed by `(keyspace, identity)`; the record itself is kept
//! as a JSON document in the `info` column.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Sqlite;
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

use super::{RecordStore, StorageError};
use crate::core::record::{CanonicalRecord, Fields};
use crate::core::types::{EntityKind, Identity};

type Query<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// SQLite record store.
///
/// Provides persistent storage with automatic schema migration. Several
/// mirrors may share a database file by using different keyspaces.
pub struct SqliteStore {
    pool: SqlitePool,
    keyspace: String,
}

impl SqliteStore {
    /// Open (or create) the database at the given path.
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(
        path: impl AsRef<Path>,
        keyspace: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let path_str = path.as_ref().to_string_lossy();
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path_str))
            .map_err(|e| StorageError::Other(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let store = Self {
            pool,
            keyspace: keyspace.into(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (useful for testing).
    pub async fn in_memory(keyspace: impl Into<String>) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let store = Self {
            pool,
            keyspace: keyspace.into(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Keyspace this store reads and writes.
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        let schema = include_str!("../../migrations/001_initial_schema.sql");
        sqlx::raw_sql(schema)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Other(format!("migration failed: {}", e)))?;
        Ok(())
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn bind_identity<'q>(query: Query<'q>, identity: &Identity) -> Query<'q> {
    match identity {
        Identity::Name(name) => query.bind(name.clone()),
        Identity::Number(id) => query.bind(*id),
    }
}

fn to_json(value: &impl serde::Serialize) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// JSON path addressing one top-level key of the `info` document.
///
/// SQLite has no escape for `"` inside a quoted path label, so such keys
/// are rejected.
fn json_path(key: &str) -> Result<String, StorageError> {
    if key.contains('"') {
        return Err(StorageError::Other(format!(
            "field name {:?} cannot be addressed in a JSON path",
            key
        )));
    }
    Ok(format!("$.\"{}\"", key))
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn list_identities(&self, kind: EntityKind) -> Result<BTreeSet<Identity>, StorageError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE keyspace = ?",
            kind.identity_field(),
            kind.table()
        );

        let ids = match kind {
            EntityKind::Job => {
                let rows: Vec<(i64,)> = sqlx::query_as(&sql)
                    .bind(&self.keyspace)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| StorageError::Other(e.to_string()))?;
                rows.into_iter().map(|(id,)| Identity::Number(id)).collect()
            }
            EntityKind::Node | EntityKind::Partition => {
                let rows: Vec<(String,)> = sqlx::query_as(&sql)
                    .bind(&self.keyspace)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| StorageError::Other(e.to_string()))?;
                rows.into_iter().map(|(name,)| Identity::Name(name)).collect()
            }
        };
        Ok(ids)
    }

    async fn get_record(
        &self,
        kind: EntityKind,
        identity: &Identity,
    ) -> Result<Fields, StorageError> {
        let sql = format!(
            "SELECT info FROM {} WHERE keyspace = ? AND {} = ?",
            kind.table(),
            kind.identity_field()
        );
        let query = sqlx::query_as::<_, (String,)>(&sql).bind(&self.keyspace);
        let query = match identity {
            Identity::Name(name) => query.bind(name.clone()),
            Identity::Number(id) => query.bind(*id),
        };

        let (info,) = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?
            .ok_or_else(|| StorageError::not_found(kind, identity))?;

        serde_json::from_str(&info).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn insert_record(&self, record: &CanonicalRecord) -> Result<(), StorageError> {
        let kind = record.kind;
        let sql = format!(
            "INSERT INTO {} (keyspace, {}, info, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            kind.table(),
            kind.identity_field()
        );
        let info = to_json(&record.to_fields())?;
        let now = Utc::now().to_rfc3339();

        let query = bind_identity(sqlx::query(&sql).bind(self.keyspace.clone()), &record.identity)
            .bind(info)
            .bind(now.clone())
            .bind(now);

        match query.execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StorageError::duplicate(kind, &record.identity))
            }
            Err(e) => Err(StorageError::Other(e.to_string())),
        }
    }

    async fn update_record(
        &self,
        kind: EntityKind,
        identity: &Identity,
        patch: &Fields,
    ) -> Result<(), StorageError> {
        // One json_set call covers every patched key so the update is a
        // single statement.
        let set_info = if patch.is_empty() {
            String::new()
        } else {
            let pairs = vec!["?, json(?)"; patch.len()].join(", ");
            format!("info = json_set(info, {}), ", pairs)
        };
        let sql = format!(
            "UPDATE {} SET {}updated_at = ? WHERE keyspace = ? AND {} = ?",
            kind.table(),
            set_info,
            kind.identity_field()
        );

        let mut query = sqlx::query(&sql);
        for (key, value) in patch {
            query = query.bind(json_path(key)?).bind(to_json(value)?);
        }
        let query = query
            .bind(Utc::now().to_rfc3339())
            .bind(self.keyspace.clone());
        let result = bind_identity(query, identity)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(kind, identity));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn create_test_store() -> SqliteStore {
        SqliteStore::in_memory("test").await.unwrap()
    }

    fn partition(name: &str, state: &str) -> CanonicalRecord {
        let mut record = CanonicalRecord::new(EntityKind::Partition, Identity::name(name))
            .with_core("state", json!(state))
            .with_core("nodes", json!("n[1-4]"));
        record.insert_into_bucket("resources", "total_cpus", json!(64));
        record.insert_into_bucket("restrictions", "max_time", json!("UNLIMITED"));
        record
    }

    fn job(id: i64) -> CanonicalRecord {
        CanonicalRecord::new(EntityKind::Job, Identity::number(id))
            .with_core("job_state", json!("PENDING"))
            .with_core("partition", json!("debug"))
            .with_core("dependency", json!([]))
    }

    #[tokio::test]
    async fn test_insert_and_get_record() {
        let store = create_test_store().await;
        let record = partition("debug", "UP");
        store.insert_record(&record).await.unwrap();

        let fields = store
            .get_record(EntityKind::Partition, &Identity::name("debug"))
            .await
            .unwrap();
        assert_eq!(fields, record.to_fields());
        store.close().await;
    }

    #[tokio::test]
    async fn test_job_identities_are_numeric() {
        let store = create_test_store().await;
        store.insert_record(&job(7)).await.unwrap();
        store.insert_record(&job(1001)).await.unwrap();

        let ids = store.list_identities(EntityKind::Job).await.unwrap();
        assert_eq!(
            ids.into_iter().collect::<Vec<_>>(),
            vec![Identity::number(7), Identity::number(1001)]
        );

        let fields = store
            .get_record(EntityKind::Job, &Identity::number(7))
            .await
            .unwrap();
        assert_eq!(fields.get("job_id"), Some(&json!(7)));
        assert_eq!(fields.get("dependency"), Some(&json!([])));
        store.close().await;
    }

    #[tokio::test]
    async fn test_duplicate_insert_fails() {
        let store = create_test_store().await;
        store.insert_record(&partition("debug", "UP")).await.unwrap();

        let result = store.insert_record(&partition("debug", "DOWN")).await;
        assert!(matches!(result, Err(StorageError::DuplicateKey(_))));
        store.close().await;
    }

    #[tokio::test]
    async fn test_partial_update_touches_only_patched_keys() {
        let store = create_test_store().await;
        store.insert_record(&partition("debug", "UP")).await.unwrap();

        let mut patch = Fields::new();
        patch.insert("state".to_string(), json!("DOWN"));
        patch.insert("resources".to_string(), json!({"total_cpus": 128}));
        store
            .update_record(EntityKind::Partition, &Identity::name("debug"), &patch)
            .await
            .unwrap();

        let fields = store
            .get_record(EntityKind::Partition, &Identity::name("debug"))
            .await
            .unwrap();
        assert_eq!(fields.get("state"), Some(&json!("DOWN")));
        assert_eq!(fields.get("resources"), Some(&json!({"total_cpus": 128})));
        assert_eq!(fields.get("nodes"), Some(&json!("n[1-4]")));
        assert_eq!(
            fields.get("restrictions"),
            Some(&json!({"max_time": "UNLIMITED"}))
        );
        store.close().await;
    }

    #[tokio::test]
    async fn test_update_missing_record_is_not_found() {
        let store = create_test_store().await;
        let mut patch = Fields::new();
        patch.insert("job_state".to_string(), json!("RUNNING"));

        let result = store
            .update_record(EntityKind::Job, &Identity::number(404), &patch)
            .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
        store.close().await;
    }

    #[tokio::test]
    async fn test_keyspaces_are_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("mirror.db");

        let prod = SqliteStore::new(&db_path, "prod").await.unwrap();
        let staging = SqliteStore::new(&db_path, "staging").await.unwrap();
        prod.insert_record(&partition("debug", "UP")).await.unwrap();
        staging.insert_record(&partition("debug", "DOWN")).await.unwrap();

        let prod_fields = prod
            .get_record(EntityKind::Partition, &Identity::name("debug"))
            .await
            .unwrap();
        assert_eq!(prod_fields.get("state"), Some(&json!("UP")));
        assert_eq!(staging.keyspace(), "staging");
        assert_eq!(
            staging
                .list_identities(EntityKind::Partition)
                .await
                .unwrap()
                .len(),
            1
        );

        prod.close().await;
        staging.close().await;
    }

    #[tokio::test]
    async fn test_migration_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("mirror.db");

        {
            let store = SqliteStore::new(&db_path, "slurm").await.unwrap();
            store.insert_record(&job(1)).await.unwrap();
            store.close().await;
        }

        {
            let store = SqliteStore::new(&db_path, "slurm").await.unwrap();
            let ids = store.list_identities(EntityKind::Job).await.unwrap();
            assert_eq!(ids.len(), 1);
            store.close().await;
        }
    }

    #[test]
    fn test_json_path_quotes_key() {
        assert_eq!(json_path("state").unwrap(), "$.\"state\"");
        assert_eq!(json_path("cpus/task").unwrap(), "$.\"cpus/task\"");
        assert!(json_path("bad\"key").is_err());
    }

    #[tokio::test]
    async fn test_update_with_unaddressable_key_fails_cleanly() {
        let store = create_test_store().await;
        store.insert_record(&partition("debug", "UP")).await.unwrap();

        let mut patch = Fields::new();
        patch.insert("bad\"key".to_string(), json!(1));
        let result = store
            .update_record(EntityKind::Partition, &Identity::name("debug"), &patch)
            .await;
        assert!(matches!(result, Err(StorageError::Other(_))));

        let fields = store
            .get_record(EntityKind::Partition, &Identity::name("debug"))
            .await
            .unwrap();
        assert_eq!(fields.get("state"), Some(&json!("UP")));
        store.close().await;
    }
}
