//! Data models and structures for the regions updater

pub mod config;
pub mod region;

// Re-export main model types
pub use config::Config;
pub use region::{CatalogEnvelope, Region, Server, ServerGroup, TransportFamily};
