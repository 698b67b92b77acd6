use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::info;

use crate::config::CoreConfig;
use crate::errors::Result;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Postgres pool shared by the snapshot store and its migrator.
#[derive(Clone)]
pub struct DatabasePool {
    pool: Pool<Postgres>,
}

impl DatabasePool {
    pub async fn connect(config: &CoreConfig) -> Result<Self> {
        let pool = pool_options(config.db_max_connections)
            .connect(config.database_url())
            .await?;
        info!(max_connections = config.db_max_connections, "connected to postgres");
        Ok(Self { pool })
    }

    /// Builds the pool without opening a connection until first use.
    pub fn connect_lazy(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = pool_options(max_connections).connect_lazy(database_url)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn inner(&self) -> &Pool<Postgres> {
        &self.pool
    }

    /// Applies the migrator's schema to this pool.
    pub async fn migrate(&self, migrator: &(dyn DatabaseMigrator + Send + Sync)) -> Result<()> {
        migrator.run_migrations(self).await?;
        info!(schema = migrator.name(), "schema migrated");
        Ok(())
    }
}

fn pool_options(max_connections: u32) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(ACQUIRE_TIMEOUT)
}

/// Implemented by stores that own a schema.
#[async_trait]
pub trait DatabaseMigrator {
    fn name(&self) -> &'static str;

    async fn run_migrations(&self, pool: &DatabasePool) -> Result<()>;
}
