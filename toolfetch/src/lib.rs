//! # toolfetch
//!
//! Fetches third-party media tools (FFmpeg, the rigaya hardware encoders
//! and 7-Zip) from their release feeds and installs them into a per-user
//! data directory.
//!
//! ## Overview
//!
//! One install attempt runs a fixed pipeline:
//!
//! 1. resolve and create the tool's install directory
//! 2. read the latest release and pick the matching asset
//! 3. stream the asset to disk, reporting progress
//! 4. unpack it and move the payload into place
//!
//! The host can stop an attempt at any time through a [`CancelFlag`]; the
//! pipeline stops at its next checkpoint and removes everything it wrote.
//! Progress arrives as integers in `0..=100` through a [`ProgressSink`] and
//! never goes backwards; 100 is only sent once the tool is installed.
//!
//! ## Usage
//!
//! ```no_run
//! use toolfetch::{CancelFlag, InstallOutcome, Installer, InstallerConfig, Tool};
//!
//! # async fn run() -> toolfetch::Result<()> {
//! let installer = Installer::new(InstallerConfig::from_env())?;
//! let cancel = CancelFlag::new();
//!
//! match installer
//!     .install(Tool::FFmpeg, &cancel, &|percent: u8| println!("{percent}%"))
//!     .await?
//! {
//!     InstallOutcome::Installed { executable, .. } => println!("{}", executable.display()),
//!     InstallOutcome::Cancelled => println!("Download cancelled"),
//!     _ => {}
//! }
//! # Ok(())
//! # }
//! ```

/// Cooperative cancellation shared between host and pipeline
pub mod cancel;

/// Runtime settings and environment overrides
pub mod config;

/// Streaming asset download with cleanup of partial files
pub mod download;

/// Error types and error handling utilities
pub mod error;

/// Archive extraction and file relocation
pub mod extract;

/// The end-to-end install pipeline
pub mod installer;

/// Per-user, per-tool directory layout
pub mod paths;

/// Monotonic progress reporting
pub mod progress;

/// Release feed lookup and asset selection
pub mod release;

/// Definitions of the supported tools
pub mod tools;

pub use cancel::CancelFlag;
pub use config::InstallerConfig;
pub use error::{Result, ToolFetchError};
pub use installer::{Confirm, InstallOutcome, Installer};
pub use progress::{NoProgress, ProgressSink};
pub use tools::{Platform, Tool, ToolSpec};
