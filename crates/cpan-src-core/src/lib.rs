//! cpan-src core - install a CPAN module and report its source repository.
//!
//! An install session runs `cpanm <module>` in the background while a cascade
//! of directory watches follows the installer through `<site arch>/.meta`.
//! Whenever a `MYMETA.json` appears, its `resources.repository.url` is
//! extracted and handed to a report callback. The session ends once the
//! installer has exited and no parse or watch setup is still in flight.
//!
//! # Example
//!
//! ```rust,no_run
//! use cpan_src_core::{run_session, Extraction, SessionConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> cpan_src_core::Result<()> {
//!     let config = SessionConfig::new("Foo::Bar");
//!     let report = run_session(&config, Arc::new(|extraction: Extraction| {
//!         println!("{}", extraction.repository_url);
//!     }))
//!     .await?;
//!
//!     println!("found {} repositories", report.extractions);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod install;
pub mod metadata;
pub mod platform;
pub mod session;
pub mod shutdown;
pub mod watch;

pub use config::{InstallerConfig, MetadataConfig, SessionConfig};
pub use error::{CpanSrcError, Result};
pub use install::{InstallOutcome, Installer};
pub use metadata::{Extraction, MetadataDocument};
pub use session::{Session, WorkGuard};
pub use watch::{FileEventFilter, ReportCallback, TreeSummary, WatchTree};

use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

/// What happened during one install session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    /// The directory the root watch was placed on.
    pub watch_dir: PathBuf,
    /// Metadata files parsed and reported.
    pub extractions: usize,
    /// Metadata files that could not be opened or decoded.
    pub parse_failures: usize,
    /// Watch nodes established, including the root.
    pub nodes_established: usize,
    /// How the installer run ended.
    pub installer: InstallOutcome,
}

/// Run a complete install session.
///
/// Order of work:
/// 1. Check the prerequisite tools.
/// 2. Resolve the watched directory (unless overridden in `config`).
/// 3. Establish the root watch.
/// 4. Start the installer and wait for all pending work to drain.
///
/// Errors returned from here are fatal. Installer failures and unreadable
/// metadata are logged and reflected in the report instead.
pub async fn run_session(config: &SessionConfig, on_report: ReportCallback) -> Result<SessionReport> {
    install::check_prerequisites(&config.prerequisites)?;

    let watch_dir = match &config.install_dir {
        Some(dir) => dir.clone(),
        None => install::metadata_dir(&install::resolve_install_root().await?),
    };

    let session = Session::new();
    let filter = FileEventFilter::new(config.metadata_suffix.clone(), session.clone(), on_report);
    let tree = WatchTree::new(&watch_dir, session.clone(), filter);
    tree.start()?;

    let installer = Installer::from_config(config).spawn(&session);

    let summary = match tree.wait().await {
        Ok(summary) => summary,
        Err(e) => {
            installer.abort();
            return Err(e);
        }
    };

    let installer = match installer.await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("installer task failed: {}", e);
            InstallOutcome::Failed { code: None }
        }
    };

    info!(
        "session finished: {} extraction(s), {} watch(es), installer {:?}",
        summary.extractions, summary.nodes_established, installer
    );

    Ok(SessionReport {
        watch_dir,
        extractions: summary.extractions,
        parse_failures: summary.parse_failures,
        nodes_established: summary.nodes_established,
        installer,
    })
}
