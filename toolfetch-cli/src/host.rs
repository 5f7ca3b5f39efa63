use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use toolfetch::{Confirm, Installer, ProgressSink, ToolSpec};

/// Terminal progress bar fed by the install pipeline.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(label: &str) -> Self {
        let style = ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos:>3}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");

        let bar = ProgressBar::new(100);
        bar.set_style(style);
        bar.set_message(label.to_string());
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish();
    }

    pub fn clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for BarProgress {
    fn emit(&self, percent: u8) {
        self.bar.set_position(u64::from(percent));
    }
}

/// Asks on the terminal before downloading, unless `assume_yes` is set.
pub struct TerminalConfirm {
    pub assume_yes: bool,
}

impl Confirm for TerminalConfirm {
    fn confirm_download(&self, spec: &ToolSpec) -> bool {
        if self.assume_yes {
            return true;
        }

        print!(
            "{} was not found. Download it from {}? [y/N] ",
            spec.display_name, spec.releases_page
        );
        if io::stdout().flush().is_err() {
            return false;
        }

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(_) => false,
        }
    }
}

/// Decision taken before any network or interrupt handling starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preflight {
    AlreadyInstalled(PathBuf),
    Declined,
    Download,
}

/// Look for an existing install and, when there is none, ask `confirm`.
///
/// Callers arm their Ctrl-C handler only after this returns, so an interrupt
/// at the prompt still terminates the process.
pub fn preflight(installer: &Installer, spec: &ToolSpec, confirm: &dyn Confirm) -> Preflight {
    if let Some(executable) = installer.paths().find_existing_executable(spec) {
        return Preflight::AlreadyInstalled(executable);
    }
    if confirm.confirm_download(spec) {
        Preflight::Download
    } else {
        Preflight::Declined
    }
}

/// Whether a prompt answer means yes. Anything else, including an empty line, is no.
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
