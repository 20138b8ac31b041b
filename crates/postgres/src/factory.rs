//! Env-driven construction of Postgres infrastructure.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::warn;

use chronicle_application::{
    ApplicationError, Env, FactoryRegistry, InfrastructureFactory, keys,
};
use chronicle_persistence::{AggregateRecorder, ApplicationRecorder, ProcessRecorder};

use crate::recorder::{
    PostgresAggregateRecorder, PostgresApplicationRecorder, PostgresProcessRecorder,
    sanitize_table_name,
};

/// Connection string for the application's database.
pub const POSTGRES_DSN: &str = "POSTGRES_DSN";

const CONNECT_ATTEMPTS: u32 = 3;
const MAX_CONNECTIONS: u32 = 10;

/// Builds Postgres recorders sharing one connection pool.
///
/// Tables are namespaced by the application name: `{name}_events`,
/// `{name}_snapshots`, `{name}_tracking`, created on demand.
#[derive(Debug, Clone)]
pub struct PostgresFactory {
    pool: Arc<PgPool>,
    prefix: String,
}

impl PostgresFactory {
    pub fn new(pool: Arc<PgPool>, application_name: &str) -> Self {
        Self {
            pool,
            prefix: sanitize_table_name(application_name),
        }
    }

    /// Connect using `POSTGRES_DSN` from the environment.
    ///
    /// Connection establishment is the only retried operation: transient
    /// connect failures are retried a bounded number of times with backoff
    /// before surfacing. Inserts are never retried.
    pub fn connect(env: &Env) -> Result<Self, ApplicationError> {
        let dsn = env.get(POSTGRES_DSN).ok_or_else(|| {
            ApplicationError::programming(format!(
                "{POSTGRES_DSN} is required by the postgres persistence module"
            ))
        })?;
        let name = env.get(keys::APPLICATION_NAME).unwrap_or("chronicle");

        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            ApplicationError::programming(
                "the postgres persistence module requires a tokio runtime",
            )
        })?;
        let pool = handle
            .block_on(connect_with_retry(dsn))
            .map_err(|e| {
                ApplicationError::Persistence(chronicle_persistence::PersistenceError::datastore(
                    format!("failed to connect to postgres: {e}"),
                ))
            })?;
        Ok(Self::new(Arc::new(pool), name))
    }

    /// Register this module in a factory registry under "postgres".
    pub fn register(registry: &mut FactoryRegistry) {
        registry.register("postgres", |env| {
            Ok(Arc::new(PostgresFactory::connect(env)?) as Arc<dyn InfrastructureFactory>)
        });
    }

    fn block_on<T>(
        &self,
        future: impl Future<Output = Result<T, chronicle_persistence::PersistenceError>>,
    ) -> Result<T, ApplicationError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            ApplicationError::programming(
                "the postgres persistence module requires a tokio runtime",
            )
        })?;
        handle.block_on(future).map_err(ApplicationError::from)
    }
}

async fn connect_with_retry(dsn: &str) -> Result<PgPool, sqlx::Error> {
    let mut backoff = Duration::from_millis(100);
    let mut attempt = 1;
    loop {
        match PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(dsn)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                warn!(attempt, error = %e, "postgres connect failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

impl InfrastructureFactory for PostgresFactory {
    fn aggregate_recorder(
        &self,
        purpose: &str,
    ) -> Result<Arc<dyn AggregateRecorder>, ApplicationError> {
        let recorder = PostgresAggregateRecorder::new(
            Arc::clone(&self.pool),
            &format!("{}_{purpose}", self.prefix),
        );
        self.block_on(recorder.create_table())?;
        Ok(Arc::new(recorder))
    }

    fn application_recorder(&self) -> Result<Arc<dyn ApplicationRecorder>, ApplicationError> {
        let recorder = PostgresApplicationRecorder::new(
            Arc::clone(&self.pool),
            &format!("{}_events", self.prefix),
        );
        self.block_on(recorder.create_table())?;
        Ok(Arc::new(recorder))
    }

    fn process_recorder(&self) -> Result<Arc<dyn ProcessRecorder>, ApplicationError> {
        let recorder = PostgresProcessRecorder::new(
            Arc::clone(&self.pool),
            &format!("{}_events", self.prefix),
            &format!("{}_tracking", self.prefix),
        );
        self.block_on(recorder.create_table())?;
        Ok(Arc::new(recorder))
    }
}
