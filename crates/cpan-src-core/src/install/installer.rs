//! Background installer subprocess.

use crate::config::SessionConfig;
use crate::session::{Session, WorkGuard};
use crate::CpanSrcError;
use serde::Serialize;
use std::process::Stdio;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// How the installer run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstallOutcome {
    Succeeded,
    /// Non-zero exit. `code` is `None` when the process was killed by a
    /// signal.
    Failed { code: Option<i32> },
    /// The process could not be started.
    SpawnFailed { message: String },
}

impl InstallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InstallOutcome::Succeeded)
    }
}

/// The installer command for one package.
#[derive(Debug, Clone)]
pub struct Installer {
    program: String,
    args: Vec<String>,
}

impl Installer {
    /// Create an installer invocation `program args...`.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `installer installer_args... package` from a session config.
    pub fn from_config(config: &SessionConfig) -> Self {
        let mut args = config.installer_args.clone();
        args.push(config.package.clone());
        Self::new(config.installer.clone(), args)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Start the installer in the background as one unit of session work.
    ///
    /// The unit is registered before this returns, so a coordinator waiting
    /// on the session right afterwards does not see it idle.
    pub fn spawn(self, session: &Session) -> JoinHandle<InstallOutcome> {
        let work = session.acquire();
        tokio::spawn(async move { self.run(work).await })
    }

    /// Run to completion with stdout and stderr inherited from this process.
    ///
    /// Failures are logged, never propagated: the watch cascade keeps running
    /// in case a failed install still wrote its metadata.
    async fn run(self, _work: WorkGuard) -> InstallOutcome {
        info!("running {} {}", self.program, self.args.join(" "));

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                let err = CpanSrcError::InstallerSpawn {
                    program: self.program.clone(),
                    source: e,
                };
                error!("an error occurred while executing {}: {}", self.program, err);
                return InstallOutcome::SpawnFailed {
                    message: err.to_string(),
                };
            }
        };

        match child.wait().await {
            Ok(status) if status.success() => {
                info!("{} finished", self.program);
                InstallOutcome::Succeeded
            }
            Ok(status) => {
                let err = CpanSrcError::InstallerFailed {
                    program: self.program.clone(),
                    code: status.code().unwrap_or(-1),
                };
                error!("an error occurred while executing {}: {}", self.program, err);
                InstallOutcome::Failed {
                    code: status.code(),
                }
            }
            Err(e) => {
                error!("failed to wait for {}: {}", self.program, e);
                InstallOutcome::Failed { code: None }
            }
        }
    }
}
