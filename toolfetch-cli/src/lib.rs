//! # toolfetch-cli
//!
//! Command-line host for the `toolfetch` install pipeline.
//!
//! ## Usage
//!
//! ```bash
//! # Install FFmpeg, asking before the download starts
//! toolfetch install ffmpeg
//!
//! # Install NVEncC without prompting
//! toolfetch install nvenc --yes
//!
//! # Show where a tool lives
//! toolfetch which 7zip
//!
//! # List supported tools for this platform
//! toolfetch list
//! ```
//!
//! Press Ctrl-C during an install to cancel it; partial files are removed.

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Terminal progress bar and download prompt
pub mod host;
