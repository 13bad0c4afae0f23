//! Error types for the export pipeline

use thiserror::Error;

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving assets or exporting a document
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or incomplete configuration (e.g. no output path)
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// No asset provider could be selected
    #[error("Provider resolution failed: {0}")]
    ProviderError(String),

    /// Failed to fetch or read an asset while inlining
    #[error("Failed to load asset {url}: {reason}")]
    AssetError { url: String, reason: String },

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to launch or initialize the browser
    #[error("Browser initialization failed: {0}")]
    InitializationError(String),

    /// Failed to load the assembled page into the browser
    #[error("Failed to load page: {0}")]
    LoadError(String),

    /// Failed to render or capture content
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// In-page evaluation failed or returned an unexpected value
    #[error("Script execution failed: {0}")]
    ScriptError(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// The requested format needs a backend that was compiled out
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn asset(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::AssetError {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ScriptError(format!("Malformed reply from page: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_error_names_the_url() {
        let err = Error::asset("https://cdn.example/a.js", "404 Not Found");
        let msg = err.to_string();
        assert!(msg.contains("https://cdn.example/a.js"));
        assert!(msg.contains("404"));
    }

    #[test]
    fn timeout_reports_milliseconds() {
        assert_eq!(Error::Timeout(30000).to_string(), "Operation timed out after 30000ms");
    }
}
