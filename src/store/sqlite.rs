use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{migrate::MigrateDatabase, Row, SqlitePool};
use std::collections::HashMap;
use tracing::info;

use crate::store::session::{FailedMint, SessionState, WorkflowKind, WorkflowSession};
use crate::store::{SessionStore, StoreError};

/// SQLite-backed session store. Compare-and-swap is implemented with a
/// conditional UPDATE on the serialized state column, so a stale writer
/// affects zero rows and observes a conflict.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Open (creating if necessary) the database and run migrations.
    pub async fn connect(database_url: &str, auto_migrate: bool) -> Result<Self, StoreError> {
        if !sqlx::Sqlite::database_exists(database_url)
            .await
            .map_err(backend)?
        {
            info!("Creating session database at {}", database_url);
            sqlx::Sqlite::create_database(database_url)
                .await
                .map_err(backend)?;
        }

        let pool = SqlitePool::connect(database_url).await.map_err(backend)?;

        if auto_migrate {
            info!("Running session store migrations");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn shutdown(&self) {
        self.pool.close().await;
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowSession, StoreError> {
        let kind_raw: String = row.get("kind");
        let kind = WorkflowKind::parse(&kind_raw)
            .ok_or_else(|| StoreError::Backend(format!("unknown workflow kind '{kind_raw}'")))?;

        let state_json: String = row.get("state");
        let refs_json: String = row.get("external_refs");
        let payload_json: Option<String> = row.get("payload");
        let updated_raw: String = row.get("updated_at");

        let state: SessionState = serde_json::from_str(&state_json)?;
        let external_refs: HashMap<String, String> = serde_json::from_str(&refs_json)?;
        let payload = payload_json
            .map(|raw| serde_json::from_str(&raw))
            .transpose()?;
        let updated_at = DateTime::parse_from_rfc3339(&updated_raw)
            .map_err(|e| StoreError::Backend(format!("bad updated_at timestamp: {e}")))?
            .with_timezone(&Utc);

        Ok(WorkflowSession {
            subject_id: row.get("subject_id"),
            kind,
            state,
            external_refs,
            wallet_address: row.get("wallet_address"),
            wallet_secret: row.get("wallet_secret"),
            payload,
            last_error: row.get("last_error"),
            updated_at,
        })
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(
        &self,
        subject_id: &str,
        kind: WorkflowKind,
    ) -> Result<Option<WorkflowSession>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT subject_id, kind, state, external_refs, wallet_address,
                   wallet_secret, payload, last_error, updated_at
            FROM workflow_sessions
            WHERE subject_id = ?1 AND kind = ?2
            "#,
        )
        .bind(subject_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn compare_and_swap(
        &self,
        expected: Option<&SessionState>,
        session: &WorkflowSession,
    ) -> Result<(), StoreError> {
        let state_json = serde_json::to_string(&session.state)?;
        let refs_json = serde_json::to_string(&session.external_refs)?;
        let payload_json = session
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = Utc::now().to_rfc3339();

        let conflict = || StoreError::Conflict {
            subject_id: session.subject_id.clone(),
            kind: session.kind,
        };

        match expected {
            None => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO workflow_sessions
                        (subject_id, kind, state, external_refs, wallet_address,
                         wallet_secret, payload, last_error, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    "#,
                )
                .bind(&session.subject_id)
                .bind(session.kind.as_str())
                .bind(&state_json)
                .bind(&refs_json)
                .bind(&session.wallet_address)
                .bind(&session.wallet_secret)
                .bind(&payload_json)
                .bind(&session.last_error)
                .bind(&now)
                .execute(&self.pool)
                .await;

                match result {
                    Ok(_) => Ok(()),
                    Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(conflict()),
                    Err(e) => Err(backend(e)),
                }
            }
            Some(expected_state) => {
                let expected_json = serde_json::to_string(expected_state)?;
                let result = sqlx::query(
                    r#"
                    UPDATE workflow_sessions
                    SET state = ?1, external_refs = ?2, wallet_address = ?3,
                        wallet_secret = ?4, payload = ?5, last_error = ?6,
                        updated_at = ?7
                    WHERE subject_id = ?8 AND kind = ?9 AND state = ?10
                    "#,
                )
                .bind(&state_json)
                .bind(&refs_json)
                .bind(&session.wallet_address)
                .bind(&session.wallet_secret)
                .bind(&payload_json)
                .bind(&session.last_error)
                .bind(&now)
                .bind(&session.subject_id)
                .bind(session.kind.as_str())
                .bind(&expected_json)
                .execute(&self.pool)
                .await
                .map_err(backend)?;

                if result.rows_affected() == 1 {
                    Ok(())
                } else {
                    Err(conflict())
                }
            }
        }
    }

    async fn record_failed_mint(
        &self,
        wallet_address: &str,
        amount: &str,
        reason: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO failed_mints (wallet_address, amount, reason, recorded_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(wallet_address)
        .bind(amount)
        .bind(reason)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn list_failed_mints(&self) -> Result<Vec<FailedMint>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT wallet_address, amount, reason, recorded_at
            FROM failed_mints
            ORDER BY recorded_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter()
            .map(|row| {
                let recorded_raw: String = row.get("recorded_at");
                let recorded_at = DateTime::parse_from_rfc3339(&recorded_raw)
                    .map_err(|e| StoreError::Backend(format!("bad recorded_at timestamp: {e}")))?
                    .with_timezone(&Utc);
                Ok(FailedMint {
                    wallet_address: row.get("wallet_address"),
                    amount: row.get("amount"),
                    reason: row.get("reason"),
                    recorded_at,
                })
            })
            .collect()
    }

    async fn clear_failed_mint(&self, wallet_address: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM failed_mints WHERE wallet_address = ?1")
            .bind(wallet_address)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
