use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info, instrument};

use crate::domain::{StrategyConfig, StrategyId, StrategyStatus, StrategyType};
use crate::error::{EngineError, Result};
use crate::strategy::traits::StrategyRepository;

const STRATEGY_COLUMNS: &str = r#"
    id, name, strategy_type, parameters, symbol, timeframe, is_active, status,
    initial_balance, current_balance, total_trades, started_at, stopped_at, last_run_at
"#;

/// PostgreSQL strategy repository over `trading_strategies`
#[derive(Clone)]
pub struct PostgresStrategyStore {
    pool: PgPool,
}

impl PostgresStrategyStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Flip `is_active` and `status` together, returning whether the row exists.
    ///
    /// Used by the operator CLI; a running daemon observes the change on its
    /// next reconcile pass or cycle.
    #[instrument(skip(self))]
    pub async fn set_active(&self, id: StrategyId, active: bool) -> Result<bool> {
        let status = if active {
            StrategyStatus::Active
        } else {
            StrategyStatus::Inactive
        };

        let result = sqlx::query(
            r#"
            UPDATE trading_strategies
            SET is_active = $2, status = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(active)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    fn row_to_strategy(row: &PgRow) -> Result<StrategyConfig> {
        let strategy_type: String = row.try_get("strategy_type")?;
        let status: String = row.try_get("status")?;

        Ok(StrategyConfig {
            id: StrategyId(row.try_get("id")?),
            name: row.try_get("name")?,
            strategy_type: StrategyType::try_from(strategy_type.as_str())
                .map_err(EngineError::Validation)?,
            parameters: row.try_get("parameters")?,
            symbol: row.try_get("symbol")?,
            timeframe: row.try_get("timeframe")?,
            is_active: row.try_get("is_active")?,
            status: StrategyStatus::try_from(status.as_str()).map_err(EngineError::Validation)?,
            initial_balance: row.try_get("initial_balance")?,
            current_balance: row.try_get("current_balance")?,
            total_trades: row.try_get("total_trades")?,
            started_at: row.try_get("started_at")?,
            stopped_at: row.try_get("stopped_at")?,
            last_run_at: row.try_get("last_run_at")?,
        })
    }

    fn ensure_updated(id: StrategyId, rows_affected: u64) -> Result<()> {
        if rows_affected == 0 {
            return Err(EngineError::StrategyNotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl StrategyRepository for PostgresStrategyStore {
    #[instrument(skip(self))]
    async fn get_by_id(&self, id: StrategyId) -> Result<Option<StrategyConfig>> {
        let query = format!(
            "SELECT {} FROM trading_strategies WHERE id = $1",
            STRATEGY_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_strategy).transpose()
    }

    #[instrument(skip(self, strategy), fields(strategy_id = %strategy.id))]
    async fn save_lifecycle(&self, strategy: &StrategyConfig) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE trading_strategies
            SET is_active = $2, status = $3, started_at = $4, stopped_at = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(strategy.id.0)
        .bind(strategy.is_active)
        .bind(strategy.status.as_str())
        .bind(strategy.started_at)
        .bind(strategy.stopped_at)
        .execute(&self.pool)
        .await?;

        Self::ensure_updated(strategy.id, result.rows_affected())
    }

    #[instrument(skip(self, strategy), fields(strategy_id = %strategy.id))]
    async fn save_progress(&self, strategy: &StrategyConfig) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE trading_strategies
            SET current_balance = $2, total_trades = $3, last_run_at = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(strategy.id.0)
        .bind(strategy.current_balance)
        .bind(strategy.total_trades)
        .bind(strategy.last_run_at)
        .execute(&self.pool)
        .await?;

        debug!(
            balance = %strategy.current_balance,
            trades = strategy.total_trades,
            "Progress saved"
        );
        Self::ensure_updated(strategy.id, result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<StrategyConfig>> {
        let query = format!(
            "SELECT {} FROM trading_strategies ORDER BY id",
            STRATEGY_COLUMNS
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        rows.iter().map(Self::row_to_strategy).collect()
    }

    #[instrument(skip(self))]
    async fn list_active(&self) -> Result<Vec<StrategyConfig>> {
        let query = format!(
            "SELECT {} FROM trading_strategies WHERE is_active ORDER BY id",
            STRATEGY_COLUMNS
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        rows.iter().map(Self::row_to_strategy).collect()
    }
}
