use regex::Regex;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::cancel::CancelFlag;
use crate::config::InstallerConfig;
use crate::download::{DownloadOutcome, Downloader};
use crate::error::{Result, ToolFetchError};
use crate::extract::{self, ArchiveFormat};
use crate::paths::ToolPaths;
use crate::progress::{self, ProgressReporter, ProgressSink};
use crate::release::{select_asset, ReleaseAsset, ReleaseClient};
use crate::tools::{github_feed_url, AssetSource, LayoutRule, Platform, Tool, ToolSpec};

/// Terminal result of one install attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Freshly downloaded and installed.
    Installed { executable: PathBuf, asset: String },
    /// Found locally or on `PATH`; nothing was downloaded.
    AlreadyInstalled { executable: PathBuf },
    /// The host declined the download.
    Declined,
    /// Stopped at a checkpoint after a cancel request.
    Cancelled,
}

impl InstallOutcome {
    pub fn executable(&self) -> Option<&Path> {
        match self {
            Self::Installed { executable, .. } | Self::AlreadyInstalled { executable } => {
                Some(executable)
            }
            Self::Declined | Self::Cancelled => None,
        }
    }
}

/// Host-side yes/no decision taken before a missing tool is downloaded.
pub trait Confirm: Send + Sync {
    fn confirm_download(&self, spec: &ToolSpec) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&ToolSpec) -> bool + Send + Sync,
{
    fn confirm_download(&self, spec: &ToolSpec) -> bool {
        self(spec)
    }
}

/// Files that only exist for the duration of one attempt.
///
/// [`cleanup`](Self::cleanup) removes them on the blocking pool when the
/// attempt ends; dropping the guard without it (a cancelled task or a panic)
/// removes them inline.
#[derive(Default)]
struct TransientFiles {
    scratch: Option<PathBuf>,
    download: Option<PathBuf>,
}

impl TransientFiles {
    async fn cleanup(mut self) {
        let scratch = self.scratch.take();
        let download = self.download.take();
        if scratch.is_none() && download.is_none() {
            return;
        }

        let task = tokio::task::spawn_blocking(move || {
            remove_transient(scratch.as_deref(), download.as_deref())
        });
        if let Err(e) = task.await {
            warn!("Cleanup of transient files failed: {}", e);
        }
    }
}

impl Drop for TransientFiles {
    fn drop(&mut self) {
        remove_transient(self.scratch.as_deref(), self.download.as_deref());
    }
}

fn remove_transient(scratch: Option<&Path>, download: Option<&Path>) {
    if let Some(download) = download {
        extract::remove_file_quietly(download);
    }
    if let Some(scratch) = scratch {
        extract::remove_dir_quietly(scratch);
    }
}

pub struct Installer {
    config: InstallerConfig,
    paths: ToolPaths,
    platform: Platform,
    releases: ReleaseClient,
    downloader: Downloader,
}

impl Installer {
    pub fn new(config: InstallerConfig) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ToolFetchError::network("building HTTP client", e))?;

        Ok(Self {
            paths: ToolPaths::new(config.data_root.clone()),
            platform: Platform::current(),
            releases: ReleaseClient::new(http_client.clone(), &config),
            downloader: Downloader::new(http_client, &config),
            config,
        })
    }

    /// Resolve tool definitions for `platform` instead of the running one.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    pub fn paths(&self) -> &ToolPaths {
        &self.paths
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn spec(&self, tool: Tool) -> Result<ToolSpec> {
        ToolSpec::for_tool(tool, self.platform)
    }

    /// Existing executable for `tool`, without downloading anything.
    pub fn locate(&self, tool: Tool) -> Result<Option<PathBuf>> {
        let spec = self.spec(tool)?;
        Ok(self.paths.find_existing_executable(&spec))
    }

    /// Return the installed tool, asking `confirm` before downloading it.
    pub async fn ensure_available(
        &self,
        tool: Tool,
        confirm: &dyn Confirm,
        cancel: &CancelFlag,
        progress: &dyn ProgressSink,
    ) -> Result<InstallOutcome> {
        let spec = self.spec(tool)?;
        if let Some(executable) = self.paths.find_existing_executable(&spec) {
            debug!(
                "{} already available at {}",
                spec.display_name,
                executable.display()
            );
            return Ok(InstallOutcome::AlreadyInstalled { executable });
        }

        if !confirm.confirm_download(&spec) {
            info!("Download of {} declined", spec.display_name);
            return Ok(InstallOutcome::Declined);
        }

        self.install_spec(&spec, cancel, progress).await
    }

    /// Download and install the newest build of `tool`.
    pub async fn install(
        &self,
        tool: Tool,
        cancel: &CancelFlag,
        progress: &dyn ProgressSink,
    ) -> Result<InstallOutcome> {
        let spec = self.spec(tool)?;
        self.install_spec(&spec, cancel, progress).await
    }

    /// Run the locate, download, extract and install pipeline for `spec`.
    pub async fn install_spec(
        &self,
        spec: &ToolSpec,
        cancel: &CancelFlag,
        progress: &dyn ProgressSink,
    ) -> Result<InstallOutcome> {
        info!(
            "Installing {} into {}",
            spec.display_name,
            self.paths.install_dir(spec).display()
        );
        let reporter = ProgressReporter::new(progress);

        let result = self.run_pipeline(spec, cancel, &reporter).await;
        match &result {
            Ok(InstallOutcome::Installed { executable, .. }) => {
                reporter.report(progress::COMPLETE);
                info!("{} installed at {}", spec.display_name, executable.display());
            }
            Ok(InstallOutcome::Cancelled) => info!("Download cancelled"),
            Ok(_) => {}
            Err(e) => error!("Installing {} failed: {}", spec.display_name, e),
        }
        result
    }

    async fn run_pipeline(
        &self,
        spec: &ToolSpec,
        cancel: &CancelFlag,
        reporter: &ProgressReporter<'_>,
    ) -> Result<InstallOutcome> {
        let install_dir = self.paths.resolve_install_dir(spec)?;
        let mut transient = TransientFiles::default();

        let result = self
            .run_stages(spec, &install_dir, cancel, reporter, &mut transient)
            .await;
        transient.cleanup().await;
        result
    }

    async fn run_stages(
        &self,
        spec: &ToolSpec,
        install_dir: &Path,
        cancel: &CancelFlag,
        reporter: &ProgressReporter<'_>,
        transient: &mut TransientFiles,
    ) -> Result<InstallOutcome> {
        if let LayoutRule::SingleRootFolder { .. } = spec.layout {
            let scratch = self.paths.extract_dir(spec);
            extract::prepare_scratch_dir(&scratch)?;
            transient.scratch = Some(scratch);
        }

        let seven_zip = match spec.layout {
            LayoutRule::FlatSevenZip { .. } => Some(self.find_seven_zip(spec)?),
            _ => None,
        };

        let Some(asset) = self.locate_asset(spec, cancel).await? else {
            return Ok(InstallOutcome::Cancelled);
        };

        let download_path = self.download_path(spec, &asset)?;
        transient.download = Some(download_path.clone());

        match self
            .downloader
            .download(&asset, &download_path, cancel, reporter)
            .await?
        {
            DownloadOutcome::Cancelled => return Ok(InstallOutcome::Cancelled),
            DownloadOutcome::Completed { bytes } => debug!("Received {} bytes", bytes),
        }

        let executable = match &spec.layout {
            LayoutRule::SingleRootFolder { root_prefix, stale } => {
                let scratch = self.paths.extract_dir(spec);
                let format = archive_format(&asset, &download_path)?;
                let (archive, dest) = (download_path.clone(), scratch.clone());
                run_blocking(&download_path, move || {
                    extract::extract_archive(&archive, &dest, format)
                })
                .await?;

                if cancel.checkpoint("after extraction") {
                    return Ok(InstallOutcome::Cancelled);
                }
                reporter.report(progress::EXTRACTED);

                // The new payload is checked before the old install is touched.
                let root = extract::find_single_root(&scratch, root_prefix)?;
                expect_executable(&root, &spec.executable)?;

                let (dir, names, archive) =
                    (install_dir.to_path_buf(), stale.clone(), download_path.clone());
                run_blocking(&download_path, move || {
                    extract::remove_stale_entries(&dir, &names);
                    extract::remove_file_quietly(&archive);
                    Ok(())
                })
                .await?;
                reporter.report(progress::STALE_REMOVED);

                let dir = install_dir.to_path_buf();
                run_blocking(&download_path, move || extract::move_contents(&root, &dir))
                    .await?;
                reporter.report(progress::MOVED);

                expect_executable(install_dir, &spec.executable)?
            }
            LayoutRule::FlatSevenZip { executable_pattern } => {
                let pattern = Regex::new(executable_pattern)?;
                let seven_zip = seven_zip.as_deref().ok_or_else(|| {
                    ToolFetchError::MissingExtractor {
                        tool: spec.display_name.clone(),
                    }
                })?;
                extract::extract_with_seven_zip(seven_zip, &download_path, install_dir).await?;

                if cancel.checkpoint("after extraction") {
                    return Ok(InstallOutcome::Cancelled);
                }
                reporter.report(progress::EXTRACTED);
                extract::remove_file_quietly(&download_path);
                reporter.report(progress::MOVED);

                extract::find_matching_file(install_dir, &pattern)?.ok_or_else(|| {
                    ToolFetchError::ExecutableNotFound {
                        expected: executable_pattern.clone(),
                        dir: install_dir.to_path_buf(),
                    }
                })?
            }
            LayoutRule::BareExecutable => {
                let target = install_dir.join(&spec.executable);
                tokio::fs::rename(&download_path, &target)
                    .await
                    .map_err(|e| ToolFetchError::fs(&target, e))?;
                reporter.report(progress::MOVED);
                target
            }
        };

        extract::make_executable(&executable)?;

        Ok(InstallOutcome::Installed {
            executable,
            asset: asset.name,
        })
    }

    /// Asset to download, or `None` when cancelled during the lookup.
    async fn locate_asset(
        &self,
        spec: &ToolSpec,
        cancel: &CancelFlag,
    ) -> Result<Option<ReleaseAsset>> {
        match &spec.source {
            AssetSource::Direct { url, file_name } => Ok(Some(ReleaseAsset {
                name: file_name.clone(),
                url: url.clone(),
                size: None,
            })),
            AssetSource::GithubLatest { repo } => {
                let feed_url = github_feed_url(&self.config.api_base, repo);
                let metadata = self.releases.fetch_latest_release(&feed_url).await?;

                if cancel.checkpoint("after release lookup") {
                    return Ok(None);
                }
                select_asset(&metadata, spec).map(Some)
            }
        }
    }

    fn download_path(&self, spec: &ToolSpec, asset: &ReleaseAsset) -> Result<PathBuf> {
        let file_name = match spec.layout {
            LayoutRule::BareExecutable => format!("{}.part", spec.executable),
            _ => {
                let format = ArchiveFormat::from_name(&asset.name).ok_or_else(|| {
                    ToolFetchError::Extraction {
                        archive: PathBuf::from(&asset.name),
                        reason: "unsupported archive format".to_string(),
                    }
                })?;
                format!("download-full.{}", format.extension())
            }
        };
        Ok(self.paths.download_path(spec, &file_name))
    }

    /// 7-Zip executable used for `FlatSevenZip` layouts.
    fn find_seven_zip(&self, spec: &ToolSpec) -> Result<PathBuf> {
        if let Some(path) = &self.config.seven_zip_path {
            if path.is_file() {
                return Ok(path.clone());
            }
            debug!("Configured 7-Zip {} does not exist", path.display());
        }

        ToolSpec::for_tool(Tool::SevenZip, self.platform)
            .ok()
            .and_then(|seven_zip| self.paths.find_existing_executable(&seven_zip))
            .ok_or_else(|| ToolFetchError::MissingExtractor {
                tool: spec.display_name.clone(),
            })
    }
}

fn archive_format(asset: &ReleaseAsset, archive: &Path) -> Result<ArchiveFormat> {
    ArchiveFormat::from_name(&asset.name).ok_or_else(|| ToolFetchError::Extraction {
        archive: archive.to_path_buf(),
        reason: format!("unsupported archive format: {}", asset.name),
    })
}

/// Run filesystem work for `archive` on the blocking pool.
async fn run_blocking<F>(archive: &Path, task: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ToolFetchError::Extraction {
            archive: archive.to_path_buf(),
            reason: e.to_string(),
        })?
}

fn expect_executable(install_dir: &Path, relative: &str) -> Result<PathBuf> {
    let path = install_dir.join(relative);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ToolFetchError::ExecutableNotFound {
            expected: relative.to_string(),
            dir: install_dir.to_path_buf(),
        })
    }
}
