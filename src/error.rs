//! Error types for quiver_asset

use thiserror::Error;

/// Main error type for asset manager operations
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("no loader registered for type {type_name} (asset {name:?})")]
    NoLoader { name: String, type_name: &'static str },

    #[error("asset {name:?} already requested as {existing}, cannot load it as {requested}")]
    TypeConflict {
        name: String,
        existing: &'static str,
        requested: &'static str,
    },

    #[error("asset not loaded: {name:?}")]
    NotLoaded { name: String },

    #[error("could not resolve file for asset {name:?}")]
    FileNotFound {
        name: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("failed to load asset {name:?}")]
    TaskFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("asset manager has been disposed")]
    Disposed,
}

/// Result type alias for asset operations
pub type Result<T> = std::result::Result<T, AssetError>;
