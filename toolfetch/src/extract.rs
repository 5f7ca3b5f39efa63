use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Result, ToolFetchError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    TarXz,
    TarBz2,
    /// Needs an external 7-Zip executable.
    SevenZip,
}

impl ArchiveFormat {
    /// Infer the format from a file or asset name.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".tar.xz") {
            Some(Self::TarXz)
        } else if lower.ends_with(".tar.bz2") {
            Some(Self::TarBz2)
        } else if lower.ends_with(".7z") {
            Some(Self::SevenZip)
        } else {
            None
        }
    }

    /// Extension used for the on-disk download file.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
            Self::TarXz => "tar.xz",
            Self::TarBz2 => "tar.bz2",
            Self::SevenZip => "7z",
        }
    }
}

fn extraction_error(archive: &Path, reason: impl ToString) -> ToolFetchError {
    ToolFetchError::Extraction {
        archive: archive.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Unpack an in-process supported archive into `dest_dir`.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path, format: ArchiveFormat) -> Result<()> {
    info!(
        "Extracting {:?} archive {} to {}",
        format,
        archive_path.display(),
        dest_dir.display()
    );
    fs::create_dir_all(dest_dir).map_err(|e| ToolFetchError::fs(dest_dir, e))?;

    match format {
        ArchiveFormat::Zip => extract_zip(archive_path, dest_dir),
        ArchiveFormat::TarGz => {
            let file = open(archive_path)?;
            extract_tar(archive_path, flate2::read::GzDecoder::new(file), dest_dir)
        }
        ArchiveFormat::TarXz => {
            let file = open(archive_path)?;
            extract_tar(archive_path, xz2::read::XzDecoder::new(file), dest_dir)
        }
        ArchiveFormat::TarBz2 => {
            let file = open(archive_path)?;
            extract_tar(archive_path, bzip2::read::BzDecoder::new(file), dest_dir)
        }
        ArchiveFormat::SevenZip => Err(extraction_error(
            archive_path,
            "7z archives must be extracted with an external 7-Zip executable",
        )),
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| ToolFetchError::fs(path, e))
}

fn extract_tar<R: io::Read>(archive_path: &Path, reader: R, dest_dir: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive
        .unpack(dest_dir)
        .map_err(|e| extraction_error(archive_path, e))
}

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = open(archive_path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| extraction_error(archive_path, e))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| extraction_error(archive_path, e))?;
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping unsafe path in zip: {}", entry.name());
            continue;
        };
        let outpath = dest_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath).map_err(|e| ToolFetchError::fs(&outpath, e))?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent).map_err(|e| ToolFetchError::fs(parent, e))?;
        }
        let mut outfile = File::create(&outpath).map_err(|e| ToolFetchError::fs(&outpath, e))?;
        io::copy(&mut entry, &mut outfile).map_err(|e| extraction_error(archive_path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode))
                    .map_err(|e| ToolFetchError::fs(&outpath, e))?;
            }
        }
    }

    debug!("ZIP extraction complete");
    Ok(())
}

/// Flatten a 7z archive into `dest_dir` with an external 7-Zip.
///
/// Runs `<seven_zip> e <archive> -o<dest_dir> -y`.
pub async fn extract_with_seven_zip(
    seven_zip: &Path,
    archive_path: &Path,
    dest_dir: &Path,
) -> Result<()> {
    info!(
        "Extracting {} with {}",
        archive_path.display(),
        seven_zip.display()
    );

    let output = tokio::process::Command::new(seven_zip)
        .arg("e")
        .arg(archive_path)
        .arg(format!("-o{}", dest_dir.display()))
        .arg("-y")
        .output()
        .await
        .map_err(|e| {
            extraction_error(
                archive_path,
                format!("could not run {}: {e}", seven_zip.display()),
            )
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(extraction_error(
            archive_path,
            format!(
                "{} exited with {:?}: {}",
                seven_zip.display(),
                output.status.code(),
                stderr.trim()
            ),
        ));
    }
    Ok(())
}

/// Make sure `dir` does not exist before extracting into it.
///
/// A leftover directory from an earlier attempt is removed; if it cannot
/// be, extraction must not proceed.
pub fn prepare_scratch_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        debug!("Removing leftover scratch directory {}", dir.display());
        if let Err(e) = fs::remove_dir_all(dir) {
            debug!("Could not remove {}: {}", dir.display(), e);
        }
    }
    if dir.exists() {
        return Err(ToolFetchError::StaleState {
            path: dir.to_path_buf(),
        });
    }
    Ok(())
}

/// Remove a directory tree, logging instead of failing.
pub fn remove_dir_quietly(dir: &Path) {
    match fs::remove_dir_all(dir) {
        Ok(()) => debug!("Removed {}", dir.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", dir.display(), e),
    }
}

/// Remove a file, logging instead of failing.
pub fn remove_file_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}

/// Delete entries left behind by a previous install of the same tool.
pub fn remove_stale_entries(install_dir: &Path, names: &[String]) {
    for name in names {
        let path = install_dir.join(name);
        if path.is_dir() {
            remove_dir_quietly(&path);
        } else {
            remove_file_quietly(&path);
        }
    }
}

/// The single top-level folder in `dir` whose name starts with `prefix`.
pub fn find_single_root(dir: &Path, prefix: &str) -> Result<PathBuf> {
    let entries = fs::read_dir(dir).map_err(|e| ToolFetchError::fs(dir, e))?;
    let mut roots = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ToolFetchError::fs(dir, e))?;
        let is_match = entry.file_name().to_string_lossy().starts_with(prefix);
        if is_match && entry.path().is_dir() {
            roots.push(entry.path());
        }
    }

    match roots.len() {
        1 => Ok(roots.remove(0)),
        n => Err(extraction_error(
            dir,
            format!("expected one top-level folder starting with '{prefix}', found {n}"),
        )),
    }
}

/// Move every entry of `from` into `to`, replacing same-named entries.
pub fn move_contents(from: &Path, to: &Path) -> Result<()> {
    let entries = fs::read_dir(from).map_err(|e| ToolFetchError::fs(from, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ToolFetchError::fs(from, e))?;
        let source = entry.path();
        let target = to.join(entry.file_name());

        if target.is_dir() {
            fs::remove_dir_all(&target).map_err(|e| ToolFetchError::fs(&target, e))?;
        } else if target.exists() {
            fs::remove_file(&target).map_err(|e| ToolFetchError::fs(&target, e))?;
        }

        debug!("Moving {} to {}", source.display(), target.display());
        fs::rename(&source, &target).map_err(|e| ToolFetchError::fs(&source, e))?;
    }
    Ok(())
}

/// First file directly inside `dir` whose name matches `pattern`, in name
/// order.
pub fn find_matching_file(dir: &Path, pattern: &regex::Regex) -> Result<Option<PathBuf>> {
    for entry in walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            ToolFetchError::fs(path, io::Error::other(e))
        })?;
        let matches = entry
            .file_name()
            .to_str()
            .map(|name| pattern.is_match(name))
            .unwrap_or(false);
        if matches && entry.file_type().is_file() {
            return Ok(Some(entry.into_path()));
        }
    }
    Ok(None)
}

/// Make a file executable (Unix only)
#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = fs::metadata(path)
        .map_err(|e| ToolFetchError::fs(path, e))?
        .permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    fs::set_permissions(path, permissions).map_err(|e| ToolFetchError::fs(path, e))?;
    Ok(())
}

#[cfg(windows)]
pub fn make_executable(_path: &Path) -> Result<()> {
    // No-op on Windows
    Ok(())
}
