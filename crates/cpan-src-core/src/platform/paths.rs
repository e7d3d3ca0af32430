//! PATH lookups for external tools.

use std::process::{Command, Stdio};

/// Check if a command exists in the system PATH.
///
/// # Platform Behavior
/// - **Linux/macOS**: Uses `which` command
/// - **Windows**: Uses `where` command
pub fn command_exists(cmd: &str) -> bool {
    #[cfg(unix)]
    let finder = "which";
    #[cfg(windows)]
    let finder = "where";

    Command::new(finder)
        .arg(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_command_exists_for_shell() {
        assert!(command_exists("sh"));
    }

    #[test]
    fn test_command_exists_for_unknown_tool() {
        assert!(!command_exists("cpan-src-no-such-tool-9f2c"));
    }
}
