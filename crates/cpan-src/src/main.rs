//! cpan-src - install a CPAN module and print its source repository.
//!
//! Runs `cpanm <module>` while watching perl's `.meta` directory, and prints
//! the `resources.repository.url` of every `MYMETA.json` the install writes.
//! Logs go to stderr; stdout carries the installer's output and the reports.

mod output;

use anyhow::Result;
use clap::Parser;
use cpan_src_core::{run_session, CpanSrcError, Extraction, InstallerConfig, SessionConfig};
use output::ReportFormat;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const USAGE: &str = "usage: $ cpan-src <Foo::Bar>";

#[derive(Parser, Debug)]
#[command(name = "cpan-src")]
#[command(about = "Install a CPAN module and print its source repository URL")]
struct Args {
    /// Module to install, e.g. Foo::Bar
    package: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Print each extraction as a JSON object
    #[arg(long)]
    json: bool,

    /// Watch this directory instead of <perl sitearchexp>/.meta
    #[arg(long)]
    install_dir: Option<PathBuf>,

    /// Installer program
    #[arg(long, default_value = "cpanm")]
    installer: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let package = match args.package.as_deref() {
        Some(package) if !package.is_empty() => package.to_string(),
        _ => {
            println!("{}", USAGE);
            std::process::exit(1);
        }
    };

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let prerequisites = vec![
        InstallerConfig::REPOSITORY_TOOL.to_string(),
        args.installer.clone(),
    ];
    let mut config = SessionConfig::new(package)
        .with_installer(args.installer)
        .with_prerequisites(prerequisites);
    if let Some(dir) = args.install_dir {
        config = config.with_install_dir(dir);
    }

    let format = if args.json {
        ReportFormat::Json
    } else {
        ReportFormat::Plain
    };

    let report = match run_session(
        &config,
        Arc::new(move |extraction: Extraction| format.print(&extraction)),
    )
    .await
    {
        Ok(report) => report,
        Err(e @ CpanSrcError::MissingPrerequisite { .. }) => {
            println!("{}", e);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    info!(
        "{} repository url(s) found under {}, installer {}",
        report.extractions,
        report.watch_dir.display(),
        if report.installer.is_success() { "succeeded" } else { "failed" }
    );

    Ok(())
}
