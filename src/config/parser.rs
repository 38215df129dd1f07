//! Configuration parsing from CLI arguments and environment variables

use crate::{
    cli::{format_duration, Cli},
    config::env::EnvManager,
    error::Result,
    models::Config,
};

/// Configuration parser that combines CLI arguments with environment variables
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    /// Create a new configuration parser with CLI arguments
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        // Start with default configuration
        let mut config = Config::default();

        EnvManager::load_env_file()?;
        config.merge_from_env()?;

        self.apply_cli_overrides(&mut config)?;

        config.validate()?;

        Ok(config)
    }

    /// Apply CLI argument overrides to configuration
    fn apply_cli_overrides(&self, config: &mut Config) -> Result<()> {
        let cli = &self.cli;

        config.max_latency = cli.max_latency;
        config.workers = cli.workers;
        config.max_regions = cli.max_regions;
        config.servers_list_url = cli.servers_list_url.trim().to_string();
        config.order_by = cli.order_by.trim().to_string();
        config.order_direction = cli.order_direction.trim().to_string();
        config.verbosity = cli.verbosity;
        config.log_format = cli.log_format.parse()?;
        config.frequency = cli.frequency;
        config.persist_frequency = cli.persist_frequency;
        config.probe_port = cli.probe_port;
        config.store_dir = cli.store_dir.clone();
        config.object_name = cli.object_name.trim().to_string();
        config.max_consecutive_failures = cli.max_consecutive_failures;

        // also fed by the NAMESPACE variable through clap
        if let Some(ref namespace) = cli.namespace {
            config.namespace = namespace.trim().to_string();
        }

        Ok(())
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let mut summary = Vec::new();

    summary.push(format!("Servers list: {}", config.servers_list_url));
    summary.push(format!("Max latency: {}", format_duration(config.max_latency)));
    summary.push(format!("Workers: {}", config.effective_workers()));
    summary.push(format!(
        "Max regions: {}",
        if config.max_regions == 0 {
            "unlimited".to_string()
        } else {
            config.max_regions.to_string()
        }
    ));
    summary.push(format!("Order: {} {}", config.order_by, config.order_direction));
    summary.push(format!("Refresh every: {}", format_duration(config.frequency)));
    summary.push(format!("Write every: {}", format_duration(config.persist_frequency)));
    summary.push(format!("Probe port: {}", config.probe_port));
    summary.push(format!("Target: {}/{} in {}", config.namespace, config.object_name, config.store_dir.display()));

    summary.join("\n")
}
