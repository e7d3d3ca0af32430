//! Typed view of a `MYMETA.json` document.
//!
//! Only `resources.repository.url` is read. Every level defaults, so a
//! document without a repository section decodes to an empty URL instead of
//! failing.

use crate::{CpanSrcError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Parsed metadata document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MetadataDocument {
    #[serde(default)]
    pub resources: Resources,
}

/// The `resources` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub repository: Repository,
}

/// The `resources.repository` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub url: String,
}

impl MetadataDocument {
    /// Decode a document from a byte stream.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        serde_json::from_reader(reader).map_err(|e| CpanSrcError::Json {
            message: format!("failed to parse metadata document: {}", e),
            source: Some(e),
        })
    }

    /// Open and decode the document at `path`.
    ///
    /// An open failure is reported as [`CpanSrcError::Io`] and no decoding is
    /// attempted; malformed content is reported as [`CpanSrcError::Json`].
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| CpanSrcError::io_with_path(e, path))?;

        Self::from_reader(BufReader::new(file)).map_err(|e| match e {
            CpanSrcError::Json { source, .. } => CpanSrcError::Json {
                message: format!(
                    "failed to parse {}: {}",
                    path.display(),
                    source.as_ref().map(|s| s.to_string()).unwrap_or_default()
                ),
                source,
            },
            other => other,
        })
    }

    /// The repository URL, empty when the document does not name one.
    pub fn repository_url(&self) -> &str {
        &self.resources.repository.url
    }
}

/// A repository URL extracted from one metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extraction {
    /// The metadata file the URL was read from.
    pub path: PathBuf,
    /// Value of `resources.repository.url`, possibly empty.
    pub repository_url: String,
}

impl Extraction {
    /// Build the report for `document` read from `path`.
    pub fn from_document(path: impl Into<PathBuf>, document: &MetadataDocument) -> Self {
        Self {
            path: path.into(),
            repository_url: document.repository_url().to_string(),
        }
    }
}

/// Read `path` and extract its repository URL.
pub fn extract_repository(path: &Path) -> Result<Extraction> {
    let document = MetadataDocument::open(path)?;
    Ok(Extraction::from_document(path, &document))
}
