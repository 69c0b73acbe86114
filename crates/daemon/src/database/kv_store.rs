use async_trait::async_trait;
use sqlx::{Executor, Sqlite};

use common::bucket_store::{BucketId, BucketStore, UniquenessScope};

use crate::database::Database;

/// Concatenates onto the existing value inside one statement, so
///  concurrent appends to a bucket serialize in the database.
const APPEND_SQL: &str = r#"
    INSERT INTO kv_store (id, value) VALUES (?, ?)
    ON CONFLICT(id) DO UPDATE SET value = CAST(kv_store.value || excluded.value AS BLOB)
"#;

const PUT_SQL: &str = r#"
    INSERT INTO kv_store (id, value) VALUES (?, ?)
    ON CONFLICT(id) DO UPDATE SET value = excluded.value
"#;

const RECORD_IN_BUCKET_SQL: &str = r#"
    INSERT INTO kv_store_shadow (id, value) VALUES (?, ?)
    ON CONFLICT(id, value) DO NOTHING
"#;

const RECORD_GLOBAL_SQL: &str = r#"
    INSERT INTO kv_store_shadow (id, value)
    SELECT ?, ?
    WHERE NOT EXISTS (SELECT 1 FROM kv_store_shadow WHERE value = ?)
"#;

/// SQLite-backed bucket store over the `kv_store` and `kv_store_shadow` tables
#[derive(Debug, Clone)]
pub struct KvStore {
    db: Database,
    scope: UniquenessScope,
}

impl KvStore {
    pub fn new(db: Database, scope: UniquenessScope) -> Self {
        Self { db, scope }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn is_recorded(&self, id: &BucketId, value: &[u8]) -> Result<bool, sqlx::Error> {
        let row = match self.scope {
            UniquenessScope::Bucket => {
                sqlx::query("SELECT 1 FROM kv_store_shadow WHERE id = ? AND value = ?")
                    .bind(id.to_hex())
                    .bind(value)
                    .fetch_optional(&*self.db)
                    .await?
            }
            UniquenessScope::Global => {
                sqlx::query("SELECT 1 FROM kv_store_shadow WHERE value = ?")
                    .bind(value)
                    .fetch_optional(&*self.db)
                    .await?
            }
        };
        Ok(row.is_some())
    }
}

/// Insert the uniqueness record if absent; true when this call inserted it
async fn record<'e, E>(
    executor: E,
    scope: UniquenessScope,
    id: &BucketId,
    value: &'e [u8],
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let query = match scope {
        UniquenessScope::Bucket => sqlx::query(RECORD_IN_BUCKET_SQL)
            .bind(id.to_hex())
            .bind(value),
        UniquenessScope::Global => sqlx::query(RECORD_GLOBAL_SQL)
            .bind(id.to_hex())
            .bind(value)
            .bind(value),
    };
    let result = executor.execute(query).await?;
    Ok(result.rows_affected() == 1)
}

async fn append<'e, E>(executor: E, id: &BucketId, value: &'e [u8]) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    executor
        .execute(sqlx::query(APPEND_SQL).bind(id.to_hex()).bind(value))
        .await?;
    Ok(())
}

#[async_trait]
impl BucketStore for KvStore {
    type Error = sqlx::Error;

    fn scope(&self) -> UniquenessScope {
        self.scope
    }

    async fn put(&self, id: &BucketId, value: &[u8]) -> Result<(), Self::Error> {
        sqlx::query(PUT_SQL)
            .bind(id.to_hex())
            .bind(value)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    async fn get(&self, id: &BucketId) -> Result<Vec<u8>, Self::Error> {
        let value: Option<Vec<u8>> = sqlx::query_scalar("SELECT value FROM kv_store WHERE id = ?")
            .bind(id.to_hex())
            .fetch_optional(&*self.db)
            .await?;
        Ok(value.unwrap_or_default())
    }

    async fn append(&self, id: &BucketId, value: &[u8]) -> Result<(), Self::Error> {
        append(&*self.db, id, value).await
    }

    async fn is_unique(&self, id: &BucketId, value: &[u8]) -> bool {
        match self.is_recorded(id, value).await {
            Ok(recorded) => !recorded,
            Err(e) => {
                tracing::error!(bucket_id = %id, error = %e, "uniqueness lookup failed, treating entry as duplicate");
                false
            }
        }
    }

    async fn record_unique(&self, id: &BucketId, value: &[u8]) -> Result<bool, Self::Error> {
        record(&*self.db, self.scope, id, value).await
    }

    async fn append_unique(&self, id: &BucketId, value: &[u8]) -> Result<bool, Self::Error> {
        let mut tx = self.db.begin().await?;

        if !record(&mut *tx, self.scope, id, value).await? {
            tx.rollback().await?;
            return Ok(false);
        }
        append(&mut *tx, id, value).await?;

        tx.commit().await?;
        Ok(true)
    }
}
