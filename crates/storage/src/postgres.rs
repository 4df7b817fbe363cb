//! PostgreSQL-backed implementation of the transactional store.
//!
//! Layout per service database:
//! - `service_state` — single JSONB row holding the service's durable state,
//!   locked `FOR UPDATE` for the duration of a transaction;
//! - `processed_events` — idempotency marks, primary-keyed by event id;
//! - `outbox` — committed outbound envelopes with a `BIGSERIAL` sequence.
//!
//! The duplicate-event authority is the `processed_events` primary key:
//! `INSERT ... ON CONFLICT DO NOTHING` reporting zero affected rows rolls the
//! whole transaction back.

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::EventId;
use sqlx::{PgPool, Row};

use crate::error::{Result, StoreError};
use crate::outbox::{OutboxEntry, OutboxSource};
use crate::tx::{ServiceState, Transaction, TransactionalStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS service_state (
    id BOOLEAN PRIMARY KEY DEFAULT TRUE CHECK (id),
    state JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS processed_events (
    event_id UUID PRIMARY KEY,
    event_type TEXT NOT NULL,
    processed_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS outbox (
    seq BIGSERIAL PRIMARY KEY,
    envelope JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    published_at TIMESTAMPTZ
);
"#;

/// PostgreSQL transactional store.
///
/// Each service points its store at its own database (or schema); the state
/// type `S` is stored as a single JSONB document, which keeps the store
/// generic over service shapes while the outbox and idempotency tables carry
/// the cross-cutting contracts.
pub struct PostgresStore<S> {
    pool: PgPool,
    _state: PhantomData<fn() -> S>,
}

impl<S> Clone for PostgresStore<S> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _state: PhantomData,
        }
    }
}

impl<S: ServiceState> PostgresStore<S> {
    /// Creates a store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _state: PhantomData,
        }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Installs the store schema. Idempotent.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    async fn load_state<'e, E>(executor: E, for_update: bool) -> Result<S>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let sql = if for_update {
            "SELECT state FROM service_state WHERE id = TRUE FOR UPDATE"
        } else {
            "SELECT state FROM service_state WHERE id = TRUE"
        };
        let row = sqlx::query(sql).fetch_optional(executor).await?;
        match row {
            Some(row) => {
                let json: serde_json::Value = row.try_get("state")?;
                Ok(serde_json::from_value(json)?)
            }
            None => Ok(S::default()),
        }
    }
}

#[async_trait]
impl<S: ServiceState> TransactionalStore<S> for PostgresStore<S> {
    async fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Transaction<S>) -> Result<T> + Send + 'static,
    {
        let mut db_tx = self.pool.begin().await?;

        let state = Self::load_state(&mut *db_tx, true).await?;
        let mut tx = Transaction::new(state);
        let value = f(&mut tx)?;
        let (state, marks, outbox) = tx.into_parts();

        for mark in &marks {
            let result = sqlx::query(
                r#"
                INSERT INTO processed_events (event_id, event_type, processed_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (event_id) DO NOTHING
                "#,
            )
            .bind(mark.event_id.as_uuid())
            .bind(&mark.event_type)
            .bind(mark.processed_at)
            .execute(&mut *db_tx)
            .await?;

            if result.rows_affected() == 0 {
                // Dropping the transaction rolls back the whole unit of work.
                return Err(StoreError::DuplicateEvent(mark.event_id));
            }
        }

        let state_json = serde_json::to_value(&state)?;
        sqlx::query(
            r#"
            INSERT INTO service_state (id, state)
            VALUES (TRUE, $1)
            ON CONFLICT (id) DO UPDATE SET state = EXCLUDED.state
            "#,
        )
        .bind(state_json)
        .execute(&mut *db_tx)
        .await?;

        for envelope in &outbox {
            sqlx::query("INSERT INTO outbox (envelope) VALUES ($1)")
                .bind(serde_json::to_value(envelope)?)
                .execute(&mut *db_tx)
                .await?;
        }

        db_tx.commit().await?;
        Ok(value)
    }

    async fn query<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> T + Send + 'static,
    {
        let state = Self::load_state(&self.pool, false).await?;
        Ok(f(&state))
    }

    async fn is_processed(&self, event_id: EventId) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM processed_events WHERE event_id = $1)")
                .bind(event_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

#[async_trait]
impl<S: ServiceState> OutboxSource for PostgresStore<S> {
    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT seq, envelope, created_at, published_at
            FROM outbox
            WHERE published_at IS NULL
            ORDER BY seq ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let envelope_json: serde_json::Value = row.try_get("envelope")?;
                Ok(OutboxEntry {
                    seq: row.try_get("seq")?,
                    envelope: serde_json::from_value(envelope_json)?,
                    created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
                    published_at: row.try_get::<Option<DateTime<Utc>>, _>("published_at")?,
                })
            })
            .collect()
    }

    async fn mark_published(&self, seqs: &[i64]) -> Result<()> {
        sqlx::query("UPDATE outbox SET published_at = now() WHERE seq = ANY($1)")
            .bind(seqs.to_vec())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
