use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolFetchError {
    #[error("Network error while {context}: {source}")]
    Network {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} failed: HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Malformed release metadata from {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("No asset in the latest {tool} release matches the expected pattern. Check {releases_page} for changes. Available assets: {available}")]
    NoMatchingAsset {
        tool: String,
        releases_page: String,
        available: String,
    },

    #[error("{file} was not properly downloaded: {size} bytes is below the {minimum} byte minimum")]
    DownloadIntegrity {
        file: String,
        size: u64,
        minimum: u64,
    },

    #[error("Could not delete previous temp extract directory: {}", path.display())]
    StaleState { path: PathBuf },

    #[error("Could not find the {expected} executable in {}", dir.display())]
    ExecutableNotFound { expected: String, dir: PathBuf },

    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not extract files from {}: {reason}", archive.display())]
    Extraction { archive: PathBuf, reason: String },

    #[error("{tool} has no downloadable build for {platform}")]
    UnsupportedPlatform { tool: String, platform: String },

    #[error("{tool} is packaged as 7z but no 7-Zip executable was found; install 7-Zip first")]
    MissingExtractor { tool: String },

    #[error("Invalid match pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl ToolFetchError {
    /// Attach a path to an I/O error.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn network(context: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            context: context.into(),
            source,
        }
    }

    /// Whether a caller may reasonably retry the whole operation later.
    ///
    /// This crate never retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ToolFetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filesystem_error_mentions_path() {
        let err = ToolFetchError::fs(
            "/data/FFmpeg",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let message = err.to_string();
        assert!(message.contains("/data/FFmpeg"));
        assert!(message.contains("denied"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_http_status_retryable() {
        let server_error = ToolFetchError::HttpStatus {
            url: "https://example.com".to_string(),
            status: 503,
        };
        assert!(server_error.is_retryable());

        let not_found = ToolFetchError::HttpStatus {
            url: "https://example.com".to_string(),
            status: 404,
        };
        assert!(!not_found.is_retryable());
    }

    #[test]
    fn test_no_matching_asset_points_to_release_page() {
        let err = ToolFetchError::NoMatchingAsset {
            tool: "FFmpeg".to_string(),
            releases_page: "https://github.com/BtbN/FFmpeg-Builds/releases/".to_string(),
            available: "checksums.sha256".to_string(),
        };
        assert!(err
            .to_string()
            .contains("https://github.com/BtbN/FFmpeg-Builds/releases/"));
    }
}
