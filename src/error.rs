//! Error types for the website resource cache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving, fetching or caching website resources
#[derive(Error, Debug)]
pub enum Error {
    /// Resource absent from the remote datastore (no path entry or no chunk count)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Remote data present but malformed (zero chunk count, short batch, empty chunk)
    #[error("Corrupt data: {0}")]
    Corrupt(String),

    /// Entry present in neither cache tier.
    ///
    /// Internal signal between the cache and the resource service, never fatal.
    #[error("Cache miss for {address}/{resource}")]
    CacheMiss { address: String, resource: String },

    /// Transport or RPC failure while talking to the remote datastore
    #[error("Remote datastore unavailable: {0}")]
    RemoteUnavailable(String),

    /// Persistent tier failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a cache miss for the given identity
    pub fn cache_miss(address: &str, resource: &str) -> Self {
        Error::CacheMiss {
            address: address.to_string(),
            resource: resource.to_string(),
        }
    }

    /// Returns true for [`Error::NotFound`]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Returns true for [`Error::CacheMiss`]
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Error::CacheMiss { .. })
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::RemoteUnavailable(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}
