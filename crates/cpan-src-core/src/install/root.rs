//! Install root resolution through perl's `Config`.

use crate::config::{InstallerConfig, MetadataConfig};
use crate::{CpanSrcError, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Ask perl for the directory modules are installed into.
pub async fn resolve_install_root() -> Result<PathBuf> {
    resolve_with(
        InstallerConfig::PERL,
        &["-MConfig", "-e", InstallerConfig::INSTALL_ROOT_SCRIPT],
    )
    .await
}

/// Run `program` and treat its trimmed stdout as the install root.
pub(crate) async fn resolve_with(program: &str, args: &[&str]) -> Result<PathBuf> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| CpanSrcError::InstallRoot {
            message: format!("{}: {}", program, e),
        })?;

    if !output.status.success() {
        return Err(CpanSrcError::InstallRoot {
            message: format!(
                "{} exited with status: {}: {}",
                program,
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if root.is_empty() {
        return Err(CpanSrcError::InstallRoot {
            message: format!("{} printed no directory", program),
        });
    }

    debug!("install root: {}", root);
    Ok(PathBuf::from(root))
}

/// The metadata directory under an install root.
pub fn metadata_dir(install_root: &Path) -> PathBuf {
    install_root.join(MetadataConfig::META_DIR_NAME)
}
