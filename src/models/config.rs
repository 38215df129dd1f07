//! Configuration data model and validation

use crate::config::EnvManager;
use crate::defaults;
use crate::error::{AppError, Result};
use crate::logging::{LogFormat, LogLevel};
use crate::ranking::Ranking;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Maximum latency tolerated for a server to be kept
    pub max_latency: Duration,

    /// Number of concurrent probing workers
    pub workers: usize,

    /// Maximum number of regions kept after ranking, 0 for no limit
    pub max_regions: usize,

    /// Where to get the list of regions from
    pub servers_list_url: String,

    /// Sort key, `name` or `latency`
    pub order_by: String,

    /// Sort direction, `asc` or `desc`
    pub order_direction: String,

    /// Log verbosity, from 0 (debug) to 3 (fatal only)
    pub verbosity: u8,

    /// Log output format
    pub log_format: LogFormat,

    /// How often the regions list is refreshed
    pub frequency: Duration,

    /// How often the latest snapshot is written
    pub persist_frequency: Duration,

    /// Delay before the first refresh after startup
    pub initial_delay: Duration,

    /// TCP port probed on every server
    pub probe_port: u16,

    /// Capacity of the request and result queues
    pub queue_capacity: usize,

    /// Timeout of one catalog fetch
    pub fetch_timeout: Duration,

    /// Timeout of one snapshot write
    pub persist_timeout: Duration,

    /// Stop after this many consecutive fetch or write failures, 0 to never stop
    pub max_consecutive_failures: u32,

    /// Namespace the snapshot object lives in
    pub namespace: String,

    /// Name of the snapshot object
    pub object_name: String,

    /// Root directory of the file object store
    pub store_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_latency: defaults::DEFAULT_MAX_LATENCY,
            workers: defaults::DEFAULT_WORKERS,
            max_regions: defaults::DEFAULT_MAX_REGIONS,
            servers_list_url: defaults::DEFAULT_SERVERS_LIST_URL.to_string(),
            order_by: defaults::DEFAULT_ORDER_BY.to_string(),
            order_direction: defaults::DEFAULT_ORDER_DIRECTION.to_string(),
            verbosity: defaults::DEFAULT_VERBOSITY,
            log_format: LogFormat::Console,
            frequency: defaults::DEFAULT_FREQUENCY,
            persist_frequency: defaults::DEFAULT_PERSIST_FREQUENCY,
            initial_delay: defaults::DEFAULT_INITIAL_DELAY,
            probe_port: defaults::DEFAULT_PROBE_PORT,
            queue_capacity: defaults::DEFAULT_QUEUE_CAPACITY,
            fetch_timeout: defaults::DEFAULT_FETCH_TIMEOUT,
            persist_timeout: defaults::DEFAULT_PERSIST_TIMEOUT,
            max_consecutive_failures: 0,
            namespace: String::new(),
            object_name: defaults::DEFAULT_OBJECT_NAME.to_string(),
            store_dir: PathBuf::from(defaults::DEFAULT_STORE_DIR),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration and return the first error found
    pub fn validate(&self) -> Result<()> {
        if self.max_latency.is_zero() {
            return Err(AppError::config("invalid max latency provided: must be greater than 0"));
        }

        if self.verbosity > defaults::MAX_VERBOSITY {
            return Err(AppError::config(format!(
                "invalid verbosity level {}: must be between 0 and {}",
                self.verbosity,
                defaults::MAX_VERBOSITY
            )));
        }

        match url::Url::parse(&self.servers_list_url) {
            Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
            Ok(parsed) => {
                return Err(AppError::config(format!(
                    "invalid servers list url '{}': unsupported scheme '{}'",
                    self.servers_list_url,
                    parsed.scheme()
                )));
            }
            Err(e) => {
                return Err(AppError::config(format!(
                    "invalid servers list url '{}': {}",
                    self.servers_list_url, e
                )));
            }
        }

        self.ranking()?;

        if self.frequency.is_zero() {
            return Err(AppError::config("frequency must be greater than 0"));
        }

        if self.persist_frequency.is_zero() {
            return Err(AppError::config("persist frequency must be greater than 0"));
        }

        if self.queue_capacity == 0 {
            return Err(AppError::config("queue capacity must be greater than 0"));
        }

        if self.namespace.trim().is_empty() {
            return Err(AppError::config(format!(
                "could not get namespace: set the {} environment variable",
                defaults::NAMESPACE_ENV
            )));
        }

        if self.object_name.trim().is_empty() {
            return Err(AppError::config("object name cannot be empty"));
        }

        Ok(())
    }

    /// The ranking selected by `order_by` and `order_direction`
    pub fn ranking(&self) -> Result<Ranking> {
        Ranking::from_options(&self.order_by, &self.order_direction)
    }

    /// Log level selected by the verbosity
    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_verbosity(self.verbosity)
    }

    /// Worker count with the zero value replaced by the default
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            defaults::DEFAULT_WORKERS
        } else {
            self.workers
        }
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        self.merge_from_lookup(|key| std::env::var(key).ok())
    }

    fn merge_from_lookup<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(namespace) = lookup(defaults::NAMESPACE_ENV) {
            EnvManager::validate_env_var(defaults::NAMESPACE_ENV, &namespace)?;
            self.namespace = namespace.trim().to_string();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            namespace: "vpn".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config_values() {
        let config = Config::default();
        assert_eq!(config.max_latency, Duration::from_millis(50));
        assert_eq!(config.workers, 5);
        assert_eq!(config.max_regions, 25);
        assert_eq!(config.order_by, "name");
        assert_eq!(config.order_direction, "asc");
        assert_eq!(config.verbosity, 1);
        assert_eq!(config.frequency, Duration::from_secs(3600));
        assert_eq!(config.persist_frequency, Duration::from_secs(300));
        assert_eq!(config.object_name, "pia-regions");
        assert_eq!(config.max_consecutive_failures, 0);
    }

    #[test]
    fn test_merge_namespace_from_env() {
        let mut config = Config::default();
        config
            .merge_from_lookup(|key| (key == "NAMESPACE").then(|| " vpn ".to_string()))
            .unwrap();
        assert_eq!(config.namespace, "vpn");

        let mut untouched = valid_config();
        untouched.merge_from_lookup(|_| None).unwrap();
        assert_eq!(untouched.namespace, "vpn");
    }

    #[test]
    fn test_blank_namespace_env_is_rejected() {
        let mut config = valid_config();
        let err = config
            .merge_from_lookup(|key| (key == "NAMESPACE").then(|| "   ".to_string()))
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert_eq!(config.namespace, "vpn");
    }

    #[test]
    fn test_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_namespace_is_rejected() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("NAMESPACE"));
    }

    #[test]
    fn test_zero_max_latency_is_rejected() {
        let config = Config {
            max_latency: Duration::ZERO,
            ..valid_config()
        };
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_bad_url_is_rejected() {
        for url in ["not a url", "ftp://example.com/list"] {
            let config = Config {
                servers_list_url: url.to_string(),
                ..valid_config()
            };
            assert!(matches!(config.validate(), Err(AppError::Config(_))), "{url} accepted");
        }
    }

    #[test]
    fn test_unknown_order_options_are_rejected() {
        let config = Config {
            order_by: "country".to_string(),
            ..valid_config()
        };
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let config = Config {
            order_direction: "sideways".to_string(),
            ..valid_config()
        };
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_verbosity_out_of_range_is_rejected() {
        let config = Config {
            verbosity: 4,
            ..valid_config()
        };
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_zero_workers_falls_back_to_default() {
        let config = Config {
            workers: 0,
            ..valid_config()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_workers(), defaults::DEFAULT_WORKERS);
    }

    #[test]
    fn test_log_level_from_verbosity() {
        let config = Config {
            verbosity: 0,
            ..valid_config()
        };
        assert_eq!(config.log_level(), LogLevel::Debug);

        let config = Config {
            verbosity: 2,
            ..valid_config()
        };
        assert_eq!(config.log_level(), LogLevel::Error);
    }
}
