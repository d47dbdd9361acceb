//! Result types returned by composition and delivery.

use crate::error::{DeliveryError, PhotoError};
use crate::pipeline::layout::RenderedDocument;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A composed report: the PDF bytes plus the layout they were written from.
#[derive(Clone)]
pub struct ComposedReport {
    /// Complete PDF file.
    pub pdf: Vec<u8>,
    /// Positioned pages and embedded images, kept for inspection.
    pub document: RenderedDocument,
    /// Photos that were skipped, in slot order.
    pub photo_errors: Vec<PhotoError>,
    pub stats: ComposeStats,
}

impl ComposedReport {
    pub fn page_count(&self) -> usize {
        self.document.page_count()
    }
}

impl fmt::Debug for ComposedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedReport")
            .field("pdf_bytes", &self.pdf.len())
            .field("pages", &self.document.page_count())
            .field("photo_errors", &self.photo_errors)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Counters and timings for one composition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeStats {
    pub pages: usize,
    /// Images that made it into the PDF.
    pub photos_embedded: usize,
    /// Images skipped after a decode or encode failure.
    pub photos_skipped: usize,
    /// Gallery photos beyond the per-observation limit.
    pub photos_ignored: usize,
    pub pdf_bytes: usize,
    pub normalize_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// What happened to each delivery leg of a generated report.
///
/// The PDF exists whenever a `ReportOutcome` exists; the legs only say where
/// it got to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportOutcome {
    pub pages: usize,
    pub pdf_bytes: usize,
    /// Object key used for the upload.
    pub storage_key: String,
    pub recipient: String,
    /// `None` when no download directory was configured.
    pub local_copy: Option<Result<PathBuf, String>>,
    /// Public URL of the uploaded copy.
    pub storage: Result<String, DeliveryError>,
    pub email: Result<(), DeliveryError>,
    pub photo_errors: Vec<PhotoError>,
}

impl ReportOutcome {
    /// True when both storage and email went through.
    pub fn fully_delivered(&self) -> bool {
        self.storage.is_ok() && self.email.is_ok()
    }

    /// Short status line for the person who filled in the report.
    ///
    /// Always says the PDF was generated; then reports what failed, if
    /// anything, so the user knows to forward the local copy by hand.
    pub fn user_message(&self) -> String {
        let mut msg = format!("Report generated ({} pages).", self.pages);
        match (&self.storage, &self.email) {
            (Ok(_), Ok(())) => {
                msg.push_str(&format!(" Saved to storage and emailed to {}.", self.recipient));
            }
            (Err(_), Ok(())) => {
                msg.push_str(&format!(
                    " Emailed to {}, but the storage upload failed.",
                    self.recipient
                ));
            }
            (Ok(_), Err(_)) => {
                msg.push_str(" Saved to storage, but the email could not be sent.");
            }
            (Err(_), Err(_)) => {
                msg.push_str(" Neither the storage upload nor the email succeeded.");
            }
        }
        match &self.local_copy {
            Some(Ok(path)) => msg.push_str(&format!(" Local copy: {}.", path.display())),
            Some(Err(_)) => msg.push_str(" The local copy could not be written."),
            None => {}
        }
        if !self.photo_errors.is_empty() {
            msg.push_str(&format!(" {} photo(s) could not be read and were left out.", self.photo_errors.len()));
        }
        msg
    }
}
