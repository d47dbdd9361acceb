//! Error types for the visit-report library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`ReportError`] (**Fatal**): the report cannot be produced at all
//!   (unreadable manifest, invalid configuration, PDF serialisation failure).
//!   Returned as `Err(ReportError)` from [`crate::compose::compose`] and
//!   [`crate::deliver::generate_and_deliver`].
//!
//! * [`PhotoError`] (**Non-fatal**): a single photo could not be decoded or
//!   re-encoded. The photo is skipped and the error is stored in
//!   [`crate::output::ComposedReport::photo_errors`] so one corrupt upload
//!   never blocks a whole report.
//!
//! * [`DeliveryError`] (**Per leg**): the storage upload or the email
//!   dispatch failed. Each leg is reported independently in
//!   [`crate::output::ReportOutcome`]; the generated PDF is still valid and
//!   still saved locally.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the visit-report library.
///
/// Photo-level failures use [`PhotoError`] and delivery failures use
/// [`DeliveryError`]; neither is propagated here unless the caller opted
/// into `strict_images`.
#[derive(Debug, Error)]
pub enum ReportError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A manifest or photo file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The request is structurally unusable (bad manifest JSON, empty reference…).
    #[error("Invalid input: {detail}")]
    InvalidInput { detail: String },

    /// A photo URL was syntactically valid but the download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Photo download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Composition errors ────────────────────────────────────────────────
    /// A photo failed and `strict_images` turned the failure into an abort.
    #[error("Photo rejected in strict mode: {0}")]
    PhotoRejected(PhotoError),

    /// The laid-out document could not be written as PDF.
    #[error("PDF serialisation failed: {detail}")]
    Serialization { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the local copy of the report.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Where a photo sits in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PhotoSlot {
    /// The property photo placed on the cover page.
    Lead,
    /// Photo `photo` (0-indexed) of observation `observation` (0-indexed).
    Observation { observation: usize, photo: usize },
    /// The drawn signature on the validation page.
    Signature,
}

impl fmt::Display for PhotoSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhotoSlot::Lead => write!(f, "lead photo"),
            PhotoSlot::Observation { observation, photo } => {
                write!(f, "observation {} photo {}", observation + 1, photo + 1)
            }
            PhotoSlot::Signature => write!(f, "signature"),
        }
    }
}

/// A non-fatal error for a single image.
///
/// The assembler logs it, skips the image and carries on with the rest of
/// the document.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum PhotoError {
    /// Magic bytes are neither PNG nor JPEG.
    #[error("{slot}: unsupported image format (first bytes {magic:02x?})")]
    Unsupported { slot: PhotoSlot, magic: Vec<u8> },

    /// The bytes look like a known format but could not be decoded.
    #[error("{slot}: decode failed: {detail}")]
    Decode { slot: PhotoSlot, detail: String },

    /// Re-encoding the resampled image failed.
    #[error("{slot}: encode failed: {detail}")]
    Encode { slot: PhotoSlot, detail: String },
}

impl PhotoError {
    /// The report slot the failing image was destined for.
    pub fn slot(&self) -> PhotoSlot {
        match self {
            PhotoError::Unsupported { slot, .. }
            | PhotoError::Decode { slot, .. }
            | PhotoError::Encode { slot, .. } => *slot,
        }
    }
}

/// Failure of one delivery leg (storage upload or email dispatch).
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum DeliveryError {
    /// Required request fields were missing; nothing was sent.
    #[error("{service}: invalid request: {detail}")]
    InvalidRequest { service: String, detail: String },

    /// The collaborator has no credentials or endpoint configured.
    #[error("{service}: not configured ({hint})")]
    NotConfigured { service: String, hint: String },

    /// The call did not complete within the network timeout.
    #[error("{service}: timed out after {secs}s")]
    Timeout { service: String, secs: u64 },

    /// The remote answered with a non-success status.
    #[error("{service}: HTTP {status}: {body}")]
    Http {
        service: String,
        status: u16,
        body: String,
    },

    /// Connection-level failure (DNS, TLS, reset…).
    #[error("{service}: request failed: {detail}")]
    Transport { service: String, detail: String },
}

impl DeliveryError {
    /// Whether a single retry has a reasonable chance of succeeding.
    ///
    /// Timeouts, transport errors, 429 and 5xx are transient; invalid
    /// requests and 4xx responses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            DeliveryError::Timeout { .. } | DeliveryError::Transport { .. } => true,
            DeliveryError::Http { status, .. } => *status == 429 || *status >= 500,
            DeliveryError::InvalidRequest { .. } | DeliveryError::NotConfigured { .. } => false,
        }
    }
}
