//! Ingester configuration.

use anyhow::{bail, Context, Result};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use ingestion::PipelineConfig;
use storage::{IpfsConfig, PublishOptions, PublishQueueConfig, DEFAULT_ROOT};

/// Top-level ingester configuration.
#[derive(Debug, Clone)]
pub struct IngesterConfig {
    /// Interface to bind
    pub host: String,
    /// HTTP port
    pub port: u16,
    /// IPFS node connection
    pub ipfs: IpfsConfig,
    /// MFS folder holding the geohash directories
    pub root_folder: String,
    /// Number of publish workers
    pub concurrency: usize,
    /// Deadline for one publish job (seconds)
    pub publish_timeout_secs: u64,
    /// IPNS publish options
    pub publish: PublishOptions,
    /// Deadline for one ingestion or query (seconds)
    pub request_timeout_secs: u64,
    /// Log level
    pub log_level: String,
}

impl Default for IngesterConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            ipfs: IpfsConfig::default(),
            root_folder: DEFAULT_ROOT.to_string(),
            concurrency: 3,
            publish_timeout_secs: 300,
            publish: PublishOptions::default(),
            request_timeout_secs: 600,
            log_level: "info".to_string(),
        }
    }
}

impl IngesterConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup; unset keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT", defaults.port)?,
            ipfs: IpfsConfig {
                url: lookup("IPFS_URL").unwrap_or(defaults.ipfs.url),
                timeout_secs: parse_var(&lookup, "IPFS_TIMEOUT_SECS", defaults.ipfs.timeout_secs)?,
            },
            root_folder: lookup("ROOT_FOLDER").unwrap_or(defaults.root_folder),
            concurrency: parse_var(&lookup, "CONCURRENCY", defaults.concurrency)?,
            publish_timeout_secs: parse_var(
                &lookup,
                "PUBLISH_TIMEOUT_SECS",
                defaults.publish_timeout_secs,
            )?,
            publish: PublishOptions {
                lifetime: lookup("IPNS_LIFETIME").unwrap_or(defaults.publish.lifetime),
                allow_offline: defaults.publish.allow_offline,
                key: lookup("IPNS_KEY").filter(|k| !k.is_empty()),
            },
            request_timeout_secs: parse_var(
                &lookup,
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("CONCURRENCY must be at least 1");
        }
        if !self.root_folder.starts_with('/') {
            bail!("ROOT_FOLDER must be an absolute MFS path, got '{}'", self.root_folder);
        }
        Ok(())
    }

    pub fn queue_config(&self) -> PublishQueueConfig {
        PublishQueueConfig {
            concurrency: self.concurrency,
            job_timeout: Duration::from_secs(self.publish_timeout_secs),
            root: self.root_folder.clone(),
            publish: self.publish.clone(),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            root: self.root_folder.clone(),
            request_timeout: self.request_timeout(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = IngesterConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3001);
        assert_eq!(config.ipfs.url, "http://127.0.0.1:5001");
        assert_eq!(config.root_folder, "/weather");
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.publish.lifetime, "8760h");
        assert!(config.publish.key.is_none());
        assert_eq!(config.request_timeout(), Duration::from_secs(600));
        assert_eq!(config.queue_config().job_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_overrides() {
        let config = IngesterConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("IPFS_URL", "http://ipfs:5001"),
            ("CONCURRENCY", "1"),
            ("IPNS_KEY", "weather"),
            ("ROOT_FOLDER", "/telemetry"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.ipfs.url, "http://ipfs:5001");
        assert_eq!(config.queue_config().concurrency, 1);
        assert_eq!(config.queue_config().publish.key.as_deref(), Some("weather"));
        assert_eq!(config.pipeline_config().root, "/telemetry");
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let err = IngesterConfig::from_lookup(lookup(&[("PORT", "http")])).unwrap_err();
        assert!(format!("{:#}", err).contains("PORT"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(IngesterConfig::from_lookup(lookup(&[("CONCURRENCY", "0")])).is_err());
    }

    #[test]
    fn test_relative_root_rejected() {
        assert!(IngesterConfig::from_lookup(lookup(&[("ROOT_FOLDER", "weather")])).is_err());
    }
}
