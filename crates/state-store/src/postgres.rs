use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::SagaId;
use domain::{DomainError, OrderFacts, SagaState, SagaStatus};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{Result, SagaStore, StoreError};

const SELECT_COLUMNS: &str =
    "SELECT saga_id, customer_id, product_id, quantity, status, created_at, last_updated FROM saga_states";

/// PostgreSQL-backed saga store implementation.
#[derive(Clone)]
pub struct PostgresSagaStore {
    pool: PgPool,
}

impl PostgresSagaStore {
    /// Creates a new PostgreSQL saga store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and returns a store on a fresh pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("saga_states migrations applied");
        Ok(())
    }

    fn row_to_state(row: PgRow) -> Result<SagaState> {
        let quantity: i64 = row.try_get("quantity")?;
        let quantity = u32::try_from(quantity).map_err(|_| {
            DomainError::InvalidOrder(format!("stored quantity {quantity} out of range"))
        })?;
        let status: String = row.try_get("status")?;

        let order = OrderFacts::new(
            row.try_get::<String, _>("saga_id")?,
            row.try_get::<String, _>("customer_id")?,
            row.try_get::<String, _>("product_id")?,
            quantity,
        );

        Ok(SagaState::restore(
            order,
            status.parse()?,
            row.try_get::<DateTime<Utc>, _>("created_at")?,
            row.try_get::<DateTime<Utc>, _>("last_updated")?,
        ))
    }
}

#[async_trait]
impl SagaStore for PostgresSagaStore {
    async fn insert(&self, state: SagaState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO saga_states (saga_id, customer_id, product_id, quantity, status, created_at, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(state.saga_id().as_str())
        .bind(state.customer_id().as_str())
        .bind(state.product_id().as_str())
        .bind(i64::from(state.quantity()))
        .bind(state.status().as_str())
        .bind(state.created_at())
        .bind(state.last_updated())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::AlreadyExists(state.saga_id().clone());
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get(&self, saga_id: &SagaId) -> Result<Option<SagaState>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE saga_id = $1"))
            .bind(saga_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_state).transpose()
    }

    async fn compare_and_swap(&self, state: &SagaState, expected: SagaStatus) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE saga_states
            SET status = $3, last_updated = $4
            WHERE saga_id = $1 AND status = $2
            "#,
        )
        .bind(state.saga_id().as_str())
        .bind(expected.as_str())
        .bind(state.status().as_str())
        .bind(state.last_updated())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        // Zero rows: either the saga is gone or another writer moved it on.
        match self.get(state.saga_id()).await? {
            None => Err(StoreError::NotFound(state.saga_id().clone())),
            Some(stored) => {
                metrics::counter!("saga_store_conflicts_total").increment(1);
                tracing::debug!(
                    saga_id = %state.saga_id(),
                    expected = %expected,
                    actual = %stored.status(),
                    "status compare-and-swap lost"
                );
                Err(StoreError::Conflict {
                    saga_id: state.saga_id().clone(),
                    expected,
                    actual: stored.status(),
                })
            }
        }
    }

    async fn discard(&self, saga_id: &SagaId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM saga_states WHERE saga_id = $1")
            .bind(saga_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_by_status(&self, statuses: &[SagaStatus]) -> Result<Vec<SagaState>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();

        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE status = ANY($1) ORDER BY last_updated ASC"
        ))
        .bind(statuses)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_state).collect()
    }
}
