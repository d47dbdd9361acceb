//! # visit-report
//!
//! Turn a property visit (metadata, observations with photos, a signature)
//! into a paginated A4 PDF report, then file and send it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ReportRequest
//!  │
//!  ├─ 1. Sanitise   free text → printable WinAnsi-safe ASCII
//!  ├─ 2. Normalise  photos: EXIF orientation, downscale, re-encode (spawn_blocking)
//!  ├─ 3. Layout     cover, one page per observation, photo pages, signature
//!  ├─ 4. Serialise  lopdf document → bytes
//!  └─ 5. Deliver    local copy, storage upload and email (best effort, per leg)
//! ```
//!
//! Composition is pure; it either returns PDF bytes or a fatal
//! [`ReportError`]. Delivery never fails as a whole: each leg's result is
//! recorded in the [`ReportOutcome`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use visit_report::{compose, ReportConfig, ReportRequest, VisitMetadata};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let request = ReportRequest {
//!         visit: VisitMetadata {
//!             date: "2024-05-01".into(),
//!             address: "3 rue Victor Hugo".into(),
//!             author: "Elodie BONNAY".into(),
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     };
//!     let report = compose(&request, &ReportConfig::default()).await?;
//!     std::fs::write("rapport-visite.pdf", &report.pdf)?;
//!     eprintln!("{} pages", report.page_count());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `visit-report` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! visit-report = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod compose;
pub mod config;
pub mod deliver;
pub mod error;
pub mod input;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod routing;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use compose::{compose, compose_sync};
pub use config::{EmailPayload, ImageBudget, ReportConfig, ReportConfigBuilder};
pub use deliver::{
    deliver, generate_and_deliver, save_local, storage_key, EmailBody, EmailMessage, EmailSender, ResendConfig,
    ResendMailer, StorageBackend, SupabaseConfig, SupabaseStorage,
};
pub use error::{DeliveryError, PhotoError, PhotoSlot, ReportError};
pub use input::{load_request, ReportManifest};
pub use model::{Observation, PhotoInput, ReportRequest, Tone, VisitMetadata};
pub use output::{ComposeStats, ComposedReport, ReportOutcome};
pub use progress::{DeliveryLeg, NoopProgressCallback, ProgressCallback, ReportProgressCallback};
pub use routing::RecipientRouter;
