use crate::models::{InstrumentId, StrategyConfig};
use crate::persistence::StrategySource;
use crate::Result;
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};

/// Postgres store for strategy parameters and the watchlist
pub struct PostgresStrategyStore {
    pool: PgPool,
}

fn period(row: &PgRow, column: &str) -> Result<usize> {
    let value: i32 = row.try_get(column)?;
    Ok(usize::try_from(value)?)
}

fn strategy_from_row(row: &PgRow) -> Result<StrategyConfig> {
    let timeframe: i32 = row.try_get("timeframe")?;

    Ok(StrategyConfig {
        timeframe: u32::try_from(timeframe)?,
        sma_period: period(row, "sma_period")?,
        rsi_period: period(row, "rsi_period")?,
        fast_period: period(row, "fast_period")?,
        fast_multiplier: row.try_get("fast_multiplier")?,
        slow_period: period(row, "slow_period")?,
        slow_multiplier: row.try_get("slow_multiplier")?,
    })
}

impl PostgresStrategyStore {
    /// Connect to Postgres
    ///
    /// # Arguments
    /// * `database_url` - Postgres connection URL
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres at {}", database_url);

        Ok(Self { pool })
    }

    /// Save strategy parameters for an instrument, replacing any existing row
    pub async fn save_strategy(&self, instrument: &InstrumentId, config: &StrategyConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO strategies (
                instrument, timeframe, sma_period, rsi_period,
                fast_period, fast_multiplier, slow_period, slow_multiplier
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (instrument) DO UPDATE SET
                timeframe = EXCLUDED.timeframe,
                sma_period = EXCLUDED.sma_period,
                rsi_period = EXCLUDED.rsi_period,
                fast_period = EXCLUDED.fast_period,
                fast_multiplier = EXCLUDED.fast_multiplier,
                slow_period = EXCLUDED.slow_period,
                slow_multiplier = EXCLUDED.slow_multiplier,
                updated_at = NOW()
            "#,
        )
        .bind(instrument.as_str())
        .bind(i32::try_from(config.timeframe)?)
        .bind(i32::try_from(config.sma_period)?)
        .bind(i32::try_from(config.rsi_period)?)
        .bind(i32::try_from(config.fast_period)?)
        .bind(config.fast_multiplier)
        .bind(i32::try_from(config.slow_period)?)
        .bind(config.slow_multiplier)
        .execute(&self.pool)
        .await?;

        tracing::debug!(instrument = %instrument, "Saved strategy to Postgres");

        Ok(())
    }

    /// Add an instrument to the watchlist, reactivating it if it was removed
    pub async fn add_to_watchlist(&self, instrument: &InstrumentId, name: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO watchlist (instrument, name, status)
            VALUES ($1, $2, 'active')
            ON CONFLICT (instrument) DO UPDATE SET
                name = EXCLUDED.name,
                status = 'active',
                updated_at = NOW()
            "#,
        )
        .bind(instrument.as_str())
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mark an instrument as removed; returns false if it was not listed
    pub async fn remove_from_watchlist(&self, instrument: &InstrumentId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE watchlist
            SET status = 'removed', updated_at = NOW()
            WHERE instrument = $1 AND status = 'active'
            "#,
        )
        .bind(instrument.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Load all active watchlist instruments, oldest first
    pub async fn load_watchlist(&self) -> Result<Vec<InstrumentId>> {
        let rows = sqlx::query(
            r#"
            SELECT instrument
            FROM watchlist
            WHERE status = 'active'
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut instruments = Vec::with_capacity(rows.len());
        for row in rows {
            let instrument: String = row.try_get("instrument")?;
            instruments.push(InstrumentId::from(instrument));
        }

        tracing::info!("Loaded {} watchlist instruments from Postgres", instruments.len());

        Ok(instruments)
    }

    /// Delete everything (testing only)
    #[cfg(test)]
    pub async fn clear_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM strategies").execute(&self.pool).await?;
        sqlx::query("DELETE FROM watchlist").execute(&self.pool).await?;
        Ok(())
    }
}

impl StrategySource for PostgresStrategyStore {
    async fn load_strategy(&self, instrument: &InstrumentId) -> Result<Option<StrategyConfig>> {
        let row = sqlx::query(
            r#"
            SELECT timeframe, sma_period, rsi_period,
                   fast_period, fast_multiplier, slow_period, slow_multiplier
            FROM strategies
            WHERE instrument = $1
            "#,
        )
        .bind(instrument.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(strategy_from_row).transpose()
    }
}
