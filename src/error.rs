//! Error types for Betafarm.

use thiserror::Error;

/// Errors raised while discovering a page's feed and hub.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The page advertises no RSS/Atom alternate link.
    #[error("URL does not have an RSS/Atom feed: {0}")]
    NoFeed(String),

    /// The advertised feed URL does not parse as a feed.
    #[error("invalid feed format: {0}")]
    InvalidFeed(String),
}

/// Errors raised by a PubSubHubbub hub.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    /// The hub could not be reached.
    #[error("hub request failed: {0}")]
    Transport(String),

    /// The hub answered with a non-2xx status.
    #[error("hub rejected {mode} request with status {status}: {body}")]
    Rejected {
        mode: String,
        status: u16,
        body: String,
    },
}

/// Common error type for Betafarm.
#[derive(Error, Debug)]
pub enum BetafarmError {
    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Fetching a remote document failed.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Feed or hub discovery failed.
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Hub protocol error.
    #[error("hub error: {0}")]
    Hub(#[from] HubError),
}

impl BetafarmError {
    /// Whether retrying the same unit of work might succeed.
    ///
    /// Network and hub failures are transient; discovery failures mean the
    /// page itself is wrong and are not retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, BetafarmError::Fetch(_) | BetafarmError::Hub(_))
    }
}

impl From<sqlx::Error> for BetafarmError {
    fn from(e: sqlx::Error) -> Self {
        BetafarmError::Database(e.to_string())
    }
}

/// Result type alias for Betafarm operations.
pub type Result<T> = std::result::Result<T, BetafarmError>;
