//! Install session plumbing: prerequisite checks, install root resolution and
//! the installer subprocess.

mod installer;
mod root;

pub use installer::{InstallOutcome, Installer};
pub use root::{metadata_dir, resolve_install_root};

use crate::platform::command_exists;
use crate::{CpanSrcError, Result};
use tracing::debug;

/// Fail with [`CpanSrcError::MissingPrerequisite`] for the first tool in
/// `tools` that is not on PATH.
pub fn check_prerequisites<S: AsRef<str>>(tools: &[S]) -> Result<()> {
    for tool in tools {
        let tool = tool.as_ref();
        if !command_exists(tool) {
            return Err(CpanSrcError::MissingPrerequisite {
                tool: tool.to_string(),
            });
        }
        debug!("found {}", tool);
    }
    Ok(())
}
