use crate::config::DatabaseConfig;
use crate::error::{BillingError, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Shared connection pool, built from [`DatabaseConfig`].
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut options =
            PgConnectOptions::from_str(&config.url).map_err(|e| BillingError::DatabaseError {
                operation: "parse_database_url".to_string(),
                source: Box::new(e),
            })?;

        if config.enable_ssl {
            options = options.ssl_mode(PgSslMode::Require);
            if let Some(ca_path) = &config.ssl_ca_cert_path {
                options = options.ssl_root_cert(ca_path);
            }
        }

        info!(
            "Connecting to database (max_connections={})",
            config.max_connections
        );

        let connect = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(config.max_lifetime_seconds))
            .connect_with(options);

        let pool = tokio::time::timeout(
            Duration::from_secs(config.connect_timeout_seconds),
            connect,
        )
        .await
        .map_err(|_| BillingError::DatabaseError {
            operation: "connect".to_string(),
            source: format!(
                "connection attempt timed out after {}s",
                config.connect_timeout_seconds
            )
            .into(),
        })?
        .map_err(|e| BillingError::DatabaseError {
            operation: "connect".to_string(),
            source: Box::new(e),
        })?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| BillingError::DatabaseError {
                operation: "migrate".to_string(),
                source: Box::new(e),
            })?;

        info!("Database migrations completed successfully");
        Ok(())
    }
}
