//! Extraction report printing.

use cpan_src_core::Extraction;
use std::io::{self, Write};
use tracing::warn;

/// How extractions are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// The bare URL, one per line.
    Plain,
    /// One JSON object per line.
    Json,
}

impl ReportFormat {
    /// Render an extraction, or `None` when there is nothing to print.
    pub fn render(&self, extraction: &Extraction) -> Option<String> {
        match self {
            ReportFormat::Plain if extraction.repository_url.is_empty() => None,
            ReportFormat::Plain => Some(extraction.repository_url.clone()),
            ReportFormat::Json => serde_json::to_string(extraction).ok(),
        }
    }

    /// Write the rendered line to stdout. A closed stdout is logged, not
    /// raised, so the watch that found the file keeps running.
    pub fn print(&self, extraction: &Extraction) {
        if let Err(e) = self.write_to(&mut std::io::stdout().lock(), extraction) {
            warn!("failed to print report for {}: {}", extraction.path.display(), e);
        }
    }

    pub fn write_to<W: Write>(&self, out: &mut W, extraction: &Extraction) -> io::Result<()> {
        match self.render(extraction) {
            Some(line) => {
                writeln!(out, "{}", line)?;
                out.flush()
            }
            None => {
                warn!("no repository url in {}", extraction.path.display());
                Ok(())
            }
        }
    }
}
