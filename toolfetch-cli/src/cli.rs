use clap::{Parser, Subcommand};
use std::path::PathBuf;
use toolfetch::{InstallerConfig, Tool};

#[derive(Parser, Debug)]
#[clap(
    name = "toolfetch",
    version,
    about = "Download and install FFmpeg, hardware encoders and 7-Zip",
    long_about = None
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,

    /// Root directory for installed tools (defaults to the per-user data directory)
    #[clap(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose output
    #[clap(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Install a tool unless it is already available
    Install {
        /// Tool to install (ffmpeg, ffmpeg-stable, nvenc, qsvenc, vceenc, 7zip)
        tool: Tool,

        /// Do not ask before downloading
        #[clap(short, long)]
        yes: bool,
    },

    /// Print the path of an installed tool
    Which {
        tool: Tool,
    },

    /// List supported tools and where they are installed
    List,
}

impl Cli {
    /// Installer settings from the environment, with command-line overrides applied.
    pub fn installer_config(&self) -> InstallerConfig {
        let config = InstallerConfig::from_env();
        match &self.data_dir {
            Some(dir) => config.with_data_root(dir),
            None => config,
        }
    }

    /// Default filter directive when `RUST_LOG` is not set.
    pub fn log_directive(&self) -> &'static str {
        if self.verbose {
            "toolfetch=debug,toolfetch_cli=debug"
        } else {
            "toolfetch=warn,toolfetch_cli=info"
        }
    }
}
