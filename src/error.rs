//! Error types for episode-harvest
//!
//! This module provides the error taxonomy shared by every component:
//! - Render-surface failures (timeouts, missing elements, malformed attributes)
//! - Persisted-state failures (corrupt catalog files)
//! - Fatal failures (the browsing context cannot be created)
//!
//! Most variants are absorbed at episode or show scope by the pipeline. Use
//! [`Error::is_fatal`] to tell the few that must stop a run.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for episode-harvest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for episode-harvest
#[derive(Debug, Error)]
pub enum Error {
    /// A navigation or element wait did not finish within its bound
    #[error("timed out after {timeout:?} waiting for {what}")]
    NavigationTimeout {
        /// What was being waited for (URL, selector, staleness of an element)
        what: String,
        /// The bound that expired
        timeout: Duration,
    },

    /// A selector matched nothing where an element was required
    #[error("element not found: {selector}")]
    ElementNotFound {
        /// The selector that matched nothing
        selector: String,
    },

    /// An attribute was present but did not have the expected shape
    #[error("malformed attribute {name}: {reason}")]
    MalformedAttribute {
        /// Attribute name (e.g. "src")
        name: String,
        /// Why the value was rejected
        reason: String,
    },

    /// The persisted catalog could not be read as a catalog
    #[error("corrupt persisted state at {path}: {reason}")]
    CorruptPersistedState {
        /// Catalog file path
        path: PathBuf,
        /// Parser or validation message
        reason: String,
    },

    /// The page did not have any of the expected layouts
    #[error("unexpected page shape: {0}")]
    UnexpectedPageShape(String),

    /// The render surface itself cannot be started or has gone away
    #[error("render surface unavailable: {0}")]
    SurfaceUnavailable(String),

    /// The run was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_batch")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a timeout error for `what`
    pub fn timeout(what: impl Into<String>, timeout: Duration) -> Self {
        Error::NavigationTimeout {
            what: what.into(),
            timeout,
        }
    }

    /// Create an element-not-found error for `selector`
    pub fn not_found(selector: impl Into<String>) -> Self {
        Error::ElementNotFound {
            selector: selector.into(),
        }
    }

    /// Create a malformed-attribute error
    pub fn malformed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedAttribute {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error must stop the whole run
    ///
    /// Only a lost or unstartable render surface is fatal when it comes out of
    /// an episode or show. Everything else is absorbed at that scope. Catalog
    /// write failures are handled separately by the pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::SurfaceUnavailable(_))
    }

    /// Short machine-readable code, used in events and run summaries
    pub fn code(&self) -> &'static str {
        match self {
            Error::NavigationTimeout { .. } => "navigation_timeout",
            Error::ElementNotFound { .. } => "element_not_found",
            Error::MalformedAttribute { .. } => "malformed_attribute",
            Error::CorruptPersistedState { .. } => "corrupt_persisted_state",
            Error::UnexpectedPageShape(_) => "unexpected_page_shape",
            Error::SurfaceUnavailable(_) => "surface_unavailable",
            Error::Cancelled => "cancelled",
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Network(_) => "network_error",
            Error::Other(_) => "other",
        }
    }
}
