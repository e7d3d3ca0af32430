//! Centralized configuration for cpan-src.
//!
//! Fixed names live in unit structs as associated constants. Per-run settings
//! are carried by [`SessionConfig`], which the CLI builds from its arguments.

use std::path::{Path, PathBuf};

/// Metadata file and directory names.
pub struct MetadataConfig;

impl MetadataConfig {
    /// Suffix of the metadata file written by the installer.
    pub const FILE_SUFFIX: &'static str = "MYMETA.json";
    /// Subdirectory of the install root that holds per-distribution metadata.
    pub const META_DIR_NAME: &'static str = ".meta";
}

/// External tools used by an install session.
pub struct InstallerConfig;

impl InstallerConfig {
    pub const INSTALLER: &'static str = "cpanm";
    pub const REPOSITORY_TOOL: &'static str = "ghq";
    pub const PERL: &'static str = "perl";
    /// Prints the architecture-specific site install directory.
    pub const INSTALL_ROOT_SCRIPT: &'static str = "print $Config{sitearchexp}";

    /// Tools that must be on PATH before a session starts, in check order.
    pub fn prerequisites() -> Vec<String> {
        vec![Self::REPOSITORY_TOOL.to_string(), Self::INSTALLER.to_string()]
    }
}

/// Settings for a single install session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Package to install, e.g. `Foo::Bar`.
    pub package: String,
    /// Watched directory override. When unset the directory is resolved
    /// through perl and suffixed with [`MetadataConfig::META_DIR_NAME`].
    pub install_dir: Option<PathBuf>,
    /// Installer program.
    pub installer: String,
    /// Arguments passed before the package name.
    pub installer_args: Vec<String>,
    /// Tools checked on PATH before anything else runs.
    pub prerequisites: Vec<String>,
    /// Filename suffix that marks a metadata document.
    pub metadata_suffix: String,
}

impl SessionConfig {
    /// Create a session config with the standard toolchain.
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            install_dir: None,
            installer: InstallerConfig::INSTALLER.to_string(),
            installer_args: vec![],
            prerequisites: InstallerConfig::prerequisites(),
            metadata_suffix: MetadataConfig::FILE_SUFFIX.to_string(),
        }
    }

    /// Watch `dir` directly instead of resolving it through perl.
    pub fn with_install_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.install_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set the installer program.
    pub fn with_installer(mut self, program: impl Into<String>) -> Self {
        self.installer = program.into();
        self
    }

    /// Add an installer argument placed before the package name.
    pub fn with_installer_arg(mut self, arg: impl Into<String>) -> Self {
        self.installer_args.push(arg.into());
        self
    }

    /// Replace the prerequisite tool list.
    pub fn with_prerequisites(mut self, tools: Vec<String>) -> Self {
        self.prerequisites = tools;
        self
    }

    /// Set the metadata filename suffix.
    pub fn with_metadata_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.metadata_suffix = suffix.into();
        self
    }
}
