use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction};
use tracing::debug;

use tenantflow_core::{
    domain::repository::{
        CredentialSnapshot, CredentialSnapshotStore, FlowChangeSet, FlowSnapshot, FlowStore,
    },
    CoreError, FlowRecord, RecordKey, Scope,
};

use crate::PostgresConnection;

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> CoreError {
    move |e| CoreError::StoreUnavailable(format!("{}: {}", context, e))
}

fn to_revision(value: i64) -> Result<u64, CoreError> {
    u64::try_from(value)
        .map_err(|_| CoreError::SerializationError(format!("negative revision {}", value)))
}

fn scope_column(scope: &Option<Scope>) -> &str {
    scope.as_ref().map(Scope::as_str).unwrap_or("")
}

fn record_from_row(row: &PgRow) -> Result<FlowRecord, CoreError> {
    let scope: String = row
        .try_get("scope")
        .map_err(|e| CoreError::SerializationError(format!("Error getting scope: {}", e)))?;
    let id: String = row
        .try_get("id")
        .map_err(|e| CoreError::SerializationError(format!("Error getting id: {}", e)))?;
    let node: serde_json::Value = row
        .try_get("node")
        .map_err(|e| CoreError::SerializationError(format!("Error getting node: {}", e)))?;

    let scope = if scope.is_empty() {
        None
    } else {
        Some(Scope::new(scope)?)
    };
    Ok(FlowRecord::new(id, scope, node))
}

/// Postgres implementation of the FlowStore
#[derive(Clone)]
pub struct PostgresFlowStore {
    conn: PostgresConnection,
}

impl PostgresFlowStore {
    /// Create a new Postgres flow store
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, CoreError> {
        self.conn
            .pool()
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))
    }

    async fn upsert_in(
        tx: &mut Transaction<'static, Postgres>,
        records: &[FlowRecord],
    ) -> Result<(), CoreError> {
        let query = "
            INSERT INTO flow_records (scope, id, node)
            VALUES ($1, $2, $3)
            ON CONFLICT (scope, id) DO UPDATE SET
                node = EXCLUDED.node,
                position = nextval('flow_records_position_seq'),
                updated_at = NOW()
        ";

        for record in records {
            sqlx::query(query)
                .bind(scope_column(&record.scope))
                .bind(&record.id)
                .bind(&record.node)
                .execute(&mut **tx)
                .await
                .map_err(db_error("Failed to upsert flow record"))?;
        }
        Ok(())
    }

    async fn remove_in(
        tx: &mut Transaction<'static, Postgres>,
        keys: &[RecordKey],
    ) -> Result<usize, CoreError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let scopes: Vec<String> = keys
            .iter()
            .map(|k| scope_column(&k.scope).to_string())
            .collect();
        let ids: Vec<String> = keys.iter().map(|k| k.id.clone()).collect();

        let result = sqlx::query(
            "
            DELETE FROM flow_records
            WHERE (scope, id) IN (SELECT * FROM UNNEST($1::text[], $2::text[]))
            ",
        )
        .bind(&scopes)
        .bind(&ids)
        .execute(&mut **tx)
        .await
        .map_err(db_error("Failed to remove flow records"))?;

        Ok(result.rows_affected() as usize)
    }

    async fn bump_revision(tx: &mut Transaction<'static, Postgres>) -> Result<u64, CoreError> {
        let row = sqlx::query(
            "UPDATE flow_store_revision SET revision = revision + 1 WHERE singleton RETURNING revision",
        )
        .fetch_one(&mut **tx)
        .await
        .map_err(db_error("Failed to advance revision"))?;

        let revision: i64 = row
            .try_get("revision")
            .map_err(|e| CoreError::SerializationError(format!("Error getting revision: {}", e)))?;
        to_revision(revision)
    }
}

#[async_trait]
impl FlowStore for PostgresFlowStore {
    async fn snapshot(&self) -> Result<FlowSnapshot, CoreError> {
        let mut tx = self.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to set isolation level"))?;

        let row = sqlx::query("SELECT revision FROM flow_store_revision WHERE singleton")
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error("Failed to read revision"))?;
        let revision: i64 = row
            .try_get("revision")
            .map_err(|e| CoreError::SerializationError(format!("Error getting revision: {}", e)))?;

        let rows = sqlx::query("SELECT scope, id, node FROM flow_records ORDER BY position")
            .fetch_all(&mut *tx)
            .await
            .map_err(db_error("Failed to list flow records"))?;

        tx.commit()
            .await
            .map_err(db_error("Failed to finish snapshot"))?;

        let records = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FlowSnapshot {
            records,
            revision: to_revision(revision)?,
        })
    }

    async fn upsert(&self, records: &[FlowRecord]) -> Result<Vec<FlowRecord>, CoreError> {
        let mut tx = self.begin().await?;
        Self::upsert_in(&mut tx, records).await?;
        Self::bump_revision(&mut tx).await?;
        tx.commit()
            .await
            .map_err(db_error("Failed to commit upsert"))?;
        Ok(records.to_vec())
    }

    async fn remove_all(&self, keys: &[RecordKey]) -> Result<usize, CoreError> {
        let mut tx = self.begin().await?;
        let removed = Self::remove_in(&mut tx, keys).await?;
        Self::bump_revision(&mut tx).await?;
        tx.commit()
            .await
            .map_err(db_error("Failed to commit removal"))?;
        Ok(removed)
    }

    async fn apply(&self, changes: FlowChangeSet) -> Result<u64, CoreError> {
        let mut tx = self.begin().await?;

        let row = sqlx::query("SELECT revision FROM flow_store_revision WHERE singleton FOR UPDATE")
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error("Failed to lock revision"))?;
        let current: i64 = row
            .try_get("revision")
            .map_err(|e| CoreError::SerializationError(format!("Error getting revision: {}", e)))?;
        let current = to_revision(current)?;

        if current != changes.expected_revision {
            // Dropping the transaction rolls it back
            return Err(CoreError::ConcurrentModification(format!(
                "flow store is at revision {}, expected {}",
                current, changes.expected_revision
            )));
        }

        Self::upsert_in(&mut tx, &changes.upserts).await?;
        let removed = Self::remove_in(&mut tx, &changes.removals).await?;
        let revision = Self::bump_revision(&mut tx).await?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit change set"))?;

        debug!(
            revision,
            upserted = changes.upserts.len(),
            removed,
            "Applied flow change set"
        );
        Ok(revision)
    }

    async fn health_check(&self) -> Result<bool, CoreError> {
        self.conn.ping().await
    }
}

/// Postgres implementation of the CredentialSnapshotStore
#[derive(Clone)]
pub struct PostgresCredentialStore {
    conn: PostgresConnection,
}

impl PostgresCredentialStore {
    /// Create a new Postgres credential snapshot log
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl CredentialSnapshotStore for PostgresCredentialStore {
    async fn latest(&self) -> Result<Option<CredentialSnapshot>, CoreError> {
        let row = sqlx::query(
            "SELECT sequence, ciphertext, created_at FROM credential_snapshots ORDER BY sequence DESC LIMIT 1",
        )
        .fetch_optional(self.conn.pool())
        .await
        .map_err(db_error("Failed to read credential snapshot"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let sequence: i64 = row
            .try_get("sequence")
            .map_err(|e| CoreError::SerializationError(format!("Error getting sequence: {}", e)))?;
        let ciphertext: String = row
            .try_get("ciphertext")
            .map_err(|e| CoreError::SerializationError(format!("Error getting ciphertext: {}", e)))?;
        let timestamp: i64 = row
            .try_get("created_at")
            .map_err(|e| CoreError::SerializationError(format!("Error getting created_at: {}", e)))?;

        Ok(Some(CredentialSnapshot {
            sequence: to_revision(sequence)?,
            ciphertext,
            timestamp,
        }))
    }

    async fn append(
        &self,
        expected_latest: Option<u64>,
        ciphertext: String,
        timestamp: i64,
    ) -> Result<CredentialSnapshot, CoreError> {
        let sequence = expected_latest.unwrap_or(0) + 1;
        let sequence_i64 = i64::try_from(sequence)
            .map_err(|_| CoreError::ValidationError(format!("sequence {} out of range", sequence)))?;

        // Sequences are dense, so a stale writer collides on the primary key
        let result = sqlx::query(
            "INSERT INTO credential_snapshots (sequence, ciphertext, created_at) VALUES ($1, $2, $3)",
        )
        .bind(sequence_i64)
        .bind(&ciphertext)
        .bind(timestamp)
        .execute(self.conn.pool())
        .await;

        match result {
            Ok(_) => Ok(CredentialSnapshot {
                sequence,
                ciphertext,
                timestamp,
            }),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(CoreError::ConcurrentModification(format!(
                    "credential snapshot {} already exists",
                    sequence
                )))
            }
            Err(e) => Err(db_error("Failed to append credential snapshot")(e)),
        }
    }

    async fn health_check(&self) -> Result<bool, CoreError> {
        self.conn.ping().await
    }
}
