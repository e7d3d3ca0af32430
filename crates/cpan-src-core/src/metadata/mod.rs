//! Metadata document parsing.

mod document;

pub use document::{extract_repository, Extraction, MetadataDocument, Repository, Resources};
