use sqlx::{PgPool, Row};
use tracing::{debug, info};

use tenantflow_core::CoreError;

/// Generate SQL migrations for the PostgreSQL state store
///
/// Unscoped flow records are stored with an empty `scope` so that the pair
/// `(scope, id)` can serve as the primary key.
pub fn generate_migrations() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "20240601000000_flow_records",
            r#"
            -- Store order: every insert or replacement takes a fresh position
            CREATE SEQUENCE IF NOT EXISTS flow_records_position_seq;

            CREATE TABLE IF NOT EXISTS flow_records (
                scope TEXT NOT NULL DEFAULT '',
                id TEXT NOT NULL,
                node JSONB NOT NULL,
                position BIGINT NOT NULL DEFAULT nextval('flow_records_position_seq'),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (scope, id)
            );

            CREATE INDEX IF NOT EXISTS idx_flow_records_position ON flow_records(position);

            -- Single-row revision counter guarding reconciliation
            CREATE TABLE IF NOT EXISTS flow_store_revision (
                singleton BOOLEAN PRIMARY KEY DEFAULT TRUE CHECK (singleton),
                revision BIGINT NOT NULL
            );

            INSERT INTO flow_store_revision (singleton, revision)
            VALUES (TRUE, 0)
            ON CONFLICT (singleton) DO NOTHING;
            "#,
        ),
        (
            "20240601000001_credential_snapshots",
            r#"
            CREATE TABLE IF NOT EXISTS credential_snapshots (
                sequence BIGINT PRIMARY KEY CHECK (sequence > 0),
                ciphertext TEXT NOT NULL,
                created_at BIGINT NOT NULL
            );
            "#,
        ),
    ]
}

/// Apply every migration not yet recorded in `_tenantflow_migrations`
pub async fn run_migrations(pool: &PgPool) -> Result<(), CoreError> {
    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS _tenantflow_migrations (
            version TEXT PRIMARY KEY,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| CoreError::StoreUnavailable(format!("Failed to prepare migrations: {}", e)))?;

    let applied: Vec<String> = sqlx::query("SELECT version FROM _tenantflow_migrations")
        .fetch_all(pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(format!("Failed to read migrations: {}", e)))?
        .into_iter()
        .map(|row| row.try_get::<String, _>("version"))
        .collect::<Result<_, _>>()
        .map_err(|e| CoreError::SerializationError(format!("Invalid migration row: {}", e)))?;

    for (version, sql) in generate_migrations() {
        if applied.iter().any(|v| v == version) {
            debug!(version, "Migration already applied");
            continue;
        }

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| CoreError::StoreUnavailable(format!("Failed to begin migration: {}", e)))?;

        sqlx::raw_sql(sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                CoreError::StoreUnavailable(format!("Migration {} failed: {}", version, e))
            })?;

        sqlx::query("INSERT INTO _tenantflow_migrations (version) VALUES ($1)")
            .bind(version)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                CoreError::StoreUnavailable(format!("Failed to record migration {}: {}", version, e))
            })?;

        tx.commit()
            .await
            .map_err(|e| CoreError::StoreUnavailable(format!("Failed to commit migration: {}", e)))?;

        info!(version, "Applied migration");
    }

    Ok(())
}
