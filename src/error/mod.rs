//! Error handling for the regions updater
//!
//! `AppError` is the crate-wide error. Each stage of the refresh cycle has
//! its own narrower error type (`FetchError`, `ProbeError`, `StoreError`,
//! `PersistError`) so that the event loop can decide per stage whether a
//! failure is logged and skipped or escalated.

use thiserror::Error;

/// Custom error types for the regions updater
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog retrieval errors
    #[error("Catalog error: {0}")]
    Fetch(#[from] FetchError),

    /// Latency probe errors
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Snapshot persistence errors
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    /// Object store errors outside of a snapshot write (e.g. opening the store)
    #[error("Object store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Parsing errors (URLs, JSON, durations, etc.)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure to retrieve the region catalog
#[derive(Error, Debug)]
pub enum FetchError {
    /// Connection, transport or HTTP status failure
    #[error("network failure: {0}")]
    Network(String),

    /// The body was not a well-formed regions envelope
    #[error("could not decode regions list: {0}")]
    Decode(String),
}

/// Failure to measure the connect latency of one endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The connection was not established within the latency budget
    #[error("latency above {0:?}")]
    Timeout(std::time::Duration),

    /// Refused, unreachable, bad address and everything else
    #[error("{0}")]
    Other(String),
}

/// Errors raised by an `ObjectStore` backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed object does not exist
    #[error("object {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    /// Create was called for an object that already exists
    #[error("object {namespace}/{name} already exists")]
    AlreadyExists { namespace: String, name: String },

    /// The object was modified by another writer since it was read
    #[error("object {namespace}/{name} was modified concurrently (expected revision {expected}, found {found})")]
    Conflict {
        namespace: String,
        name: String,
        expected: u64,
        found: u64,
    },

    /// Transport or backend failure
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Failure to write the snapshot object
#[derive(Error, Debug)]
pub enum PersistError {
    /// The object did not exist and creating it failed
    #[error("object not found and could not be created: {0}")]
    CreateFailed(StoreError),

    /// Another writer updated the object first
    #[error("concurrent modification: {0}")]
    Conflict(StoreError),

    /// Transport, backend or encoding failure
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Fetch(_) => "FETCH",
            Self::Probe(_) => "PROBE",
            Self::Persist(_) => "PERSIST",
            Self::Store(_) => "STORE",
            Self::Io(_) => "IO",
            Self::Parse(_) => "PARSE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Check if error is recoverable (the next cycle may succeed)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(_) | Self::Probe(_) | Self::Persist(_) => true,
            Self::Store(StoreError::Conflict { .. }) | Self::Store(StoreError::Backend(_)) => true,
            Self::Store(_) => false,
            Self::Config(_) | Self::Parse(_) | Self::Io(_) | Self::Internal(_) => false,
        }
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Parse(_) => 1,  // Invalid configuration/usage
            Self::Fetch(_) | Self::Probe(_) => 2,  // Network issues
            Self::Persist(_) | Self::Store(_) | Self::Io(_) => 5,  // Storage issues
            Self::Internal(_) => 99,  // Internal/unexpected errors
        }
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if use_color {
            use colored::Colorize;
            match self {
                Self::Config(_) | Self::Parse(_) => {
                    format!("[{}] {}", category.red().bold(), message.red())
                }
                Self::Fetch(_) | Self::Probe(_) => {
                    format!("[{}] {}", category.yellow().bold(), message.yellow())
                }
                Self::Persist(_) | Self::Store(_) | Self::Io(_) => {
                    format!("[{}] {}", category.cyan().bold(), message.cyan())
                }
                Self::Internal(_) => {
                    format!("[{}] {}", category.bright_red().bold(), message.bright_red())
                }
            }
        } else {
            format!("[{}] {}", category, message)
        }
    }
}

impl ProbeError {
    /// Whether this failure only means the endpoint was too slow
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<StoreError> for PersistError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict { .. } => Self::Conflict(error),
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

// Standard library error conversions
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(error: url::ParseError) -> Self {
        Self::parse(format!("URL parse error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        Self::Fetch(error.into())
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

// Anyhow integration
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(error.to_string())
    }
}

/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;
