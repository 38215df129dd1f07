//! Regions Updater
//!
//! Periodically downloads the list of VPN regions, measures the TCP connect
//! latency of every WireGuard server through a bounded pool of workers,
//! keeps the regions with at least one fast enough server, ranks them and
//! writes the result to a namespaced key/value object store.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod persist;
pub mod pool;
pub mod probe;
pub mod ranking;

// Re-export commonly used types
pub use error::{AppError, Result};
pub use models::{Config, Region, Server};
pub use orchestrator::{Orchestrator, RunSummary};
pub use ranking::Ranking;

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Build information set by build.rs
pub const BUILD_TIME: &str = env!("BUILD_TIME");
pub const GIT_COMMIT: &str = env!("GIT_COMMIT");
pub const TARGET_TRIPLE: &str = env!("TARGET_TRIPLE");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_MAX_LATENCY: Duration = Duration::from_millis(50);
    pub const DEFAULT_WORKERS: usize = 5;
    pub const DEFAULT_MAX_REGIONS: usize = 25;
    pub const DEFAULT_SERVERS_LIST_URL: &str = "https://serverlist.piaservers.net/vpninfo/servers/v6";
    pub const DEFAULT_ORDER_BY: &str = "name";
    pub const DEFAULT_ORDER_DIRECTION: &str = "asc";
    pub const DEFAULT_VERBOSITY: u8 = 1;
    pub const MAX_VERBOSITY: u8 = 3;
    pub const DEFAULT_FREQUENCY: Duration = Duration::from_secs(60 * 60);
    pub const DEFAULT_PERSIST_FREQUENCY: Duration = Duration::from_secs(5 * 60);
    pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(5);
    pub const DEFAULT_PROBE_PORT: u16 = 443;
    pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
    pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_PERSIST_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_OBJECT_NAME: &str = "pia-regions";
    pub const DEFAULT_STORE_DIR: &str = "/var/lib/regions-updater";

    /// Environment variable holding the target namespace
    pub const NAMESPACE_ENV: &str = "NAMESPACE";
}
