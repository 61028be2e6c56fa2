//! PostgreSQL driver.
//!
//! - [`PgExecutor`]: single-attempt statements on one client
//! - [`PgSource`]: source reader
//! - [`PgTarget`]: target writer
//! - [`PgConnector`]: opens both with retries and TLS

mod executor;
mod reader;
mod writer;

pub use executor::PgExecutor;
pub use reader::PgSource;
pub use writer::{audit_insert, PgTarget};

use async_trait::async_trait;

use crate::config::Config;
use crate::core::traits::{Connector, SourceReader, TargetWriter};
use crate::drivers::common::{retry, RetryPolicy, RetryingExecutor, SslMode, TlsBuilder};
use crate::error::{MigrateError, Result};
use crate::logging::RunLog;

/// Connects to the configured source and target PostgreSQL servers.
pub struct PgConnector {
    source_url: String,
    target_url: String,
    tls: TlsBuilder,
    policy: RetryPolicy,
}

impl PgConnector {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            source_url: config.database.source_url.clone(),
            target_url: config.database.target_url.clone(),
            tls: TlsBuilder::new(SslMode::parse(&config.database.ssl_mode)?),
            policy: config.migration.retry.policy(),
        })
    }

    async fn open(&self, endpoint: &str, url: &str, log: &RunLog) -> Result<RetryingExecutor<PgExecutor>> {
        let label = format!("connect to {}", endpoint);
        let client = retry(&self.policy, log, &label, move |_| self.tls.connect(url))
            .await
            .map_err(|e| MigrateError::connection(endpoint, self.policy.max_attempts, e.to_string()))?;

        log.info(format!("Connected to {} (ssl_mode={})", endpoint, self.tls.ssl_mode()));
        Ok(RetryingExecutor::new(
            PgExecutor::new(client),
            self.policy,
            log.clone(),
        ))
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect_source(&self, log: &RunLog) -> Result<Box<dyn SourceReader>> {
        let exec = self.open("source", &self.source_url, log).await?;
        Ok(Box::new(PgSource::new(exec)))
    }

    async fn connect_target(&self, log: &RunLog) -> Result<Box<dyn TargetWriter>> {
        let exec = self.open("target", &self.target_url, log).await?;
        Ok(Box::new(PgTarget::new(exec)))
    }
}
