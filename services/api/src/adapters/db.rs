//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `RemoteStore` port from the `core` crate. Every collection lives in one
//! JSONB table; filters are evaluated with JSONB containment.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use training_portal_core::ports::{Collection, Filter, PortError, PortResult, RemoteStore};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `RemoteStore` port.
#[derive(Clone)]
pub struct PgRemoteStore {
    pool: PgPool,
}

impl PgRemoteStore {
    /// Creates a new `PgRemoteStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct RecordRow {
    data: Value,
}

fn record_id(collection: Collection, record: &Value) -> PortResult<&str> {
    record
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| PortError::Unexpected(format!("{} record has no string id", collection)))
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// `RemoteStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RemoteStore for PgRemoteStore {
    async fn insert(&self, collection: Collection, record: Value) -> PortResult<Value> {
        let id = record_id(collection, &record)?.to_string();
        let row = sqlx::query_as::<_, RecordRow>(
            "INSERT INTO portal_records (collection, id, data) VALUES ($1, $2, $3) RETURNING data",
        )
        .bind(collection.name())
        .bind(id)
        .bind(&record)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(row.data)
    }

    async fn update(&self, collection: Collection, id: &str, patch: Value) -> PortResult<()> {
        if !patch.is_object() {
            return Err(PortError::Unexpected("patch must be a JSON object".to_string()));
        }
        let result = sqlx::query(
            "UPDATE portal_records SET data = data || $3 WHERE collection = $1 AND id = $2",
        )
        .bind(collection.name())
        .bind(id)
        .bind(&patch)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("{} record {}", collection, id)));
        }
        Ok(())
    }

    async fn select(&self, collection: Collection, filter: &Filter) -> PortResult<Vec<Value>> {
        let records = sqlx::query_as::<_, RecordRow>(
            "SELECT data FROM portal_records WHERE collection = $1 AND data @> $2 ORDER BY created_at ASC",
        )
        .bind(collection.name())
        .bind(Value::Object(filter.as_object().clone()))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.data).collect())
    }

    async fn delete(&self, collection: Collection, id: &str) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM portal_records WHERE collection = $1 AND id = $2")
            .bind(collection.name())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("{} record {}", collection, id)));
        }
        Ok(())
    }
}
