//! Per-user, per-tool directory layout.
//!
//! Every tool lives in its own directory under a data root:
//!
//! - Windows: `%APPDATA%\<Tool>\`
//! - Linux: `~/.local/share/<Tool>/`
//!
//! Paths are computed on demand from the injected root, so tests can point
//! the whole layout at a temporary directory.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Result, ToolFetchError};
use crate::tools::ToolSpec;

/// Name of the scratch directory archives are unpacked into.
pub const EXTRACT_DIR_NAME: &str = "temp_download";

#[derive(Debug, Clone)]
pub struct ToolPaths {
    data_root: PathBuf,
}

impl ToolPaths {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Install directory for `spec`, without touching the filesystem.
    pub fn install_dir(&self, spec: &ToolSpec) -> PathBuf {
        self.data_root.join(&spec.dir_name)
    }

    /// Install directory for `spec`, created if it does not exist yet.
    pub fn resolve_install_dir(&self, spec: &ToolSpec) -> Result<PathBuf> {
        let dir = self.install_dir(spec);
        fs::create_dir_all(&dir).map_err(|e| ToolFetchError::fs(&dir, e))?;
        debug!("Using install directory {}", dir.display());
        Ok(dir)
    }

    /// Scratch directory used while unpacking an archive.
    pub fn extract_dir(&self, spec: &ToolSpec) -> PathBuf {
        self.install_dir(spec).join(EXTRACT_DIR_NAME)
    }

    /// Where the downloaded file is written before it is unpacked.
    pub fn download_path(&self, spec: &ToolSpec, file_name: &str) -> PathBuf {
        self.install_dir(spec).join(file_name)
    }

    /// Already-installed executable for `spec`, if any.
    ///
    /// Looks in the install directory first, then on `PATH` under each of
    /// the tool's search names.
    pub fn find_existing_executable(&self, spec: &ToolSpec) -> Option<PathBuf> {
        let local = self.install_dir(spec).join(&spec.executable);
        if local.is_file() {
            return Some(local);
        }

        spec.search_names
            .iter()
            .find_map(|name| which::which(name).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{AssetSource, LayoutRule, MatchRule, Tool};
    use tempfile::tempdir;

    fn spec(executable: &str, search: &[&str]) -> ToolSpec {
        ToolSpec {
            tool: Tool::FFmpeg,
            display_name: "Example".to_string(),
            dir_name: "Example".to_string(),
            source: AssetSource::GithubLatest {
                repo: "owner/example".to_string(),
            },
            match_rule: MatchRule::Contains("x64".to_string()),
            layout: LayoutRule::BareExecutable,
            executable: executable.to_string(),
            search_names: search.iter().map(|s| s.to_string()).collect(),
            releases_page: String::new(),
        }
    }

    #[test]
    fn test_resolve_install_dir_is_idempotent() {
        let root = tempdir().unwrap();
        let paths = ToolPaths::new(root.path());
        let spec = spec("bin/example", &[]);

        let first = paths.resolve_install_dir(&spec).unwrap();
        let second = paths.resolve_install_dir(&spec).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, root.path().join("Example"));
        assert!(first.is_dir());
    }

    #[test]
    fn test_scratch_and_download_paths_live_in_install_dir() {
        let paths = ToolPaths::new("/data");
        let spec = spec("bin/example", &[]);
        let install = paths.install_dir(&spec);

        assert_eq!(paths.extract_dir(&spec), install.join("temp_download"));
        assert_eq!(
            paths.download_path(&spec, "ffmpeg-full.zip"),
            install.join("ffmpeg-full.zip")
        );
    }

    #[test]
    fn test_find_existing_prefers_install_dir() {
        let root = tempdir().unwrap();
        let paths = ToolPaths::new(root.path());
        let spec = spec("bin/example", &["definitely-not-on-path-toolfetch"]);

        assert_eq!(paths.find_existing_executable(&spec), None);

        let exe = paths.install_dir(&spec).join("bin/example");
        fs::create_dir_all(exe.parent().unwrap()).unwrap();
        fs::write(&exe, b"binary").unwrap();

        assert_eq!(paths.find_existing_executable(&spec), Some(exe));
    }

    #[test]
    fn test_find_existing_has_no_side_effects() {
        let root = tempdir().unwrap();
        let paths = ToolPaths::new(root.path());
        let spec = spec("example", &["definitely-not-on-path-toolfetch"]);

        assert!(paths.find_existing_executable(&spec).is_none());
        assert!(!paths.install_dir(&spec).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_find_existing_falls_back_to_path() {
        let root = tempdir().unwrap();
        let paths = ToolPaths::new(root.path());
        let spec = spec("example", &["definitely-not-on-path-toolfetch", "sh"]);

        let found = paths.find_existing_executable(&spec).unwrap();
        assert_eq!(found.file_name().unwrap(), "sh");
    }
}
