//! Feed Relay Error Hierarchy
//!
//! Errors are grouped by the layer that raises them. Watcher construction,
//! initialization and poll-cycle failures are never escalated to
//! [`Error::Fatal`]; only losing the configuration change stream is.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Settings loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Watcher construction, lifecycle and poll-cycle failures
    #[error(transparent)]
    Watcher(#[from] WatcherError),

    /// Durable store failures (watermarks, configuration records)
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Rendering agent and page extraction failures
    #[error(transparent)]
    Rendering(#[from] RenderingError),

    /// Notification sink failures
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Value conversion failures
    #[error(transparent)]
    Convert(#[from] ConvertError),

    /// Admin/metrics HTTP server failures
    #[error("Server error: {0}")]
    Server(String),

    /// Shutdown signal could not be delivered
    #[error("Signal sender closed: {0}")]
    SignalSenderClosed(String),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    /// Source identifier missing from configuration
    #[error("Watcher can't be created with an empty source id")]
    EmptySourceId,

    /// Source has no sink to deliver to
    #[error("Watcher for {source_id} can't be created with no sink targets")]
    NoSinkTargets { source_id: String },

    /// Registry already holds a watcher for this source
    #[error("Watcher for {source_id} already exists")]
    AlreadyExists { source_id: String },

    /// Lifecycle state machine violation
    #[error("Invalid watcher state transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    /// Page URL could not be built from the configured template
    #[error("Invalid page url for {source_id}: {reason}")]
    InvalidPageUrl { source_id: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Disk I/O failures while opening the store
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Embedded database errors
    #[error(transparent)]
    SledError(#[from] sled::Error),

    /// Serialization failures for persisted records
    #[error(transparent)]
    BincodeError(#[from] bincode::Error),

    /// Persisted value could not be decoded
    #[error("Corrupted value under key {key}: {reason}")]
    DataCorruption { key: String, reason: String },

    /// Change notification feed stopped producing events
    #[error("Configuration change stream closed")]
    ChangeStreamClosed,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderingError {
    /// Transport failure while fetching the page
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Page answered with a non-success status
    #[error("Fetching {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Malformed page url
    #[error("Invalid url: {0}")]
    InvalidUrl(String),

    /// Selector could not be parsed
    #[error("Invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// An element the extraction contract requires is absent
    #[error("No element matches `{0}`")]
    ElementNotFound(String),

    /// Content did not become available within the wait budget
    #[error("Page did not settle within {0:?}")]
    Timeout(Duration),

    /// Session used after close
    #[error("Rendering session already closed")]
    SessionClosed,
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Transport failure while posting to the sink
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// Sink answered with a non-success status
    #[error("Sink rejected message with status {status}")]
    Rejected { status: u16 },
}

/// Error type for value conversion operations
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// Item ids are decimal u64 strings
    #[error("invalid item id: {0:?}")]
    InvalidItemId(String),

    /// Sink targets must be absolute http(s) urls
    #[error("invalid sink target: {0:?}")]
    InvalidSinkTarget(String),
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::Storage(StorageError::SledError(e))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Storage(StorageError::BincodeError(e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(StorageError::IoError(e))
    }
}
