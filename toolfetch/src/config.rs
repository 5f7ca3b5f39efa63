use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Runtime settings for the install pipeline.
///
/// Nothing here is persisted; hosts build one from defaults and the
/// environment, then override fields as needed.
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    /// Base URL of the release-metadata API.
    pub api_base: String,
    /// Root under which each tool gets its own directory.
    pub data_root: PathBuf,
    /// Optional token sent as a bearer credential to the release API.
    pub github_token: Option<String>,
    pub user_agent: String,
    /// Upper bound for the release-metadata request.
    pub metadata_timeout: Duration,
    /// Bytes written per chunk; cancellation is polled between chunks.
    pub chunk_size: usize,
    /// Emit download progress once per this many chunks.
    pub progress_every_chunks: u64,
    /// Downloads smaller than this are treated as failed.
    pub min_download_size: u64,
    /// Share of the 0..=100 range given to the download stage.
    pub download_progress_cap: u8,
    /// Explicit 7-Zip executable; located automatically when unset.
    pub seven_zip_path: Option<PathBuf>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            data_root: default_data_root(),
            github_token: None,
            user_agent: format!("toolfetch/{}", env!("CARGO_PKG_VERSION")),
            metadata_timeout: Duration::from_secs(15),
            chunk_size: 1024,
            progress_every_chunks: 1000,
            min_download_size: 1000,
            download_progress_cap: 90,
            seven_zip_path: None,
        }
    }
}

impl InstallerConfig {
    /// Defaults overlaid with `TOOLFETCH_*` and `GITHUB_TOKEN` environment variables.
    pub fn from_env() -> Self {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    fn apply_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(api_base) = non_empty("TOOLFETCH_API_BASE") {
            self.api_base = api_base.trim_end_matches('/').to_string();
        }
        if let Some(root) = non_empty("TOOLFETCH_DATA_DIR") {
            self.data_root = PathBuf::from(root);
        }
        if let Some(token) = non_empty("GITHUB_TOKEN") {
            self.github_token = Some(token);
        }
        if let Some(seven_zip) = non_empty("TOOLFETCH_SEVEN_ZIP") {
            self.seven_zip_path = Some(PathBuf::from(seven_zip));
        }
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_data_root(mut self, data_root: impl Into<PathBuf>) -> Self {
        self.data_root = data_root.into();
        self
    }

    pub fn with_seven_zip(mut self, path: impl Into<PathBuf>) -> Self {
        self.seven_zip_path = Some(path.into());
        self
    }

    pub fn with_min_download_size(mut self, bytes: u64) -> Self {
        self.min_download_size = bytes;
        self
    }

    pub fn with_progress_every_chunks(mut self, chunks: u64) -> Self {
        self.progress_every_chunks = chunks.max(1);
        self
    }
}

/// Per-user roaming data directory, e.g. `%APPDATA%` on Windows or
/// `~/.local/share` on Linux.
pub fn default_data_root() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("toolfetch"))
}
