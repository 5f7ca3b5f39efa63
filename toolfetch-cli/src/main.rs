use anyhow::{bail, Result};
use clap::Parser;
use toolfetch::{CancelFlag, InstallOutcome, Installer, Tool};
use tracing_subscriber::EnvFilter;

use toolfetch_cli::cli::{Cli, Command};
use toolfetch_cli::host::{preflight, BarProgress, Preflight, TerminalConfirm};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let installer = Installer::new(cli.installer_config())?;

    match cli.command {
        Command::Install { tool, yes } => install(&installer, tool, yes).await,
        Command::Which { tool } => match installer.locate(tool)? {
            Some(path) => {
                println!("{}", path.display());
                Ok(())
            }
            None => bail!("{} is not installed", tool),
        },
        Command::List => {
            for &tool in Tool::all() {
                match installer.spec(tool) {
                    Ok(spec) => {
                        let location = installer
                            .paths()
                            .find_existing_executable(&spec)
                            .map(|p| p.display().to_string())
                            .unwrap_or_else(|| "not installed".to_string());
                        println!("{:<14} {:<16} {}", tool, spec.display_name, location);
                    }
                    Err(_) => println!("{:<14} unsupported on {}", tool, installer.platform()),
                }
            }
            Ok(())
        }
    }
}

async fn install(installer: &Installer, tool: Tool, yes: bool) -> Result<()> {
    let spec = installer.spec(tool)?;

    match preflight(installer, &spec, &TerminalConfirm { assume_yes: yes }) {
        Preflight::AlreadyInstalled(executable) => {
            println!(
                "{} is already available at {}",
                spec.display_name,
                executable.display()
            );
            return Ok(());
        }
        Preflight::Declined => {
            println!("Download declined");
            return Ok(());
        }
        Preflight::Download => {}
    }

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling");
            on_interrupt.request_cancel();
        }
    });

    let progress = BarProgress::new(&spec.display_name);
    let outcome = installer.install_spec(&spec, &cancel, &progress).await;

    match outcome {
        Ok(InstallOutcome::Installed { executable, asset }) => {
            progress.finish();
            println!("Installed {} from {}", executable.display(), asset);
            Ok(())
        }
        Ok(InstallOutcome::Cancelled) => {
            progress.clear();
            bail!("Download cancelled")
        }
        Ok(_) => {
            progress.clear();
            Ok(())
        }
        Err(e) => {
            progress.clear();
            Err(e.into())
        }
    }
}
