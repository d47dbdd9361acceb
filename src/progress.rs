//! Progress-callback trait for per-photo and per-delivery events.
//!
//! Inject an [`Arc<dyn ReportProgressCallback>`] via
//! [`crate::config::ReportConfigBuilder::progress_callback`] to receive
//! events while photos are normalised and the report is delivered.
//!
//! # Example
//!
//! ```rust
//! use visit_report::{ReportConfig, ReportProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     photos: AtomicUsize,
//! }
//!
//! impl ReportProgressCallback for CountingCallback {
//!     fn on_photo_complete(&self, _slot: visit_report::PhotoSlot, done: usize, total: usize) {
//!         self.photos.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("photo {done}/{total}");
//!     }
//! }
//!
//! let config = ReportConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { photos: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::PhotoSlot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One delivery destination of a finished report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryLeg {
    LocalCopy,
    Storage,
    Email,
}

impl fmt::Display for DeliveryLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeliveryLeg::LocalCopy => "local copy",
            DeliveryLeg::Storage => "storage",
            DeliveryLeg::Email => "email",
        })
    }
}

/// Called by the assembler as it works through a report.
///
/// Photos are normalised concurrently, so `on_photo_complete` and
/// `on_photo_error` may be called from several threads at once. All methods
/// default to no-ops.
pub trait ReportProgressCallback: Send + Sync {
    /// Called once before any photo is decoded.
    fn on_compose_start(&self, total_photos: usize) {
        let _ = total_photos;
    }

    /// Called when a photo is ready. `done` counts finished photos so far,
    /// failures included.
    fn on_photo_complete(&self, slot: PhotoSlot, done: usize, total: usize) {
        let _ = (slot, done, total);
    }

    /// Called when a photo is skipped.
    fn on_photo_error(&self, slot: PhotoSlot, error: &str) {
        let _ = (slot, error);
    }

    /// Called once the PDF bytes exist.
    fn on_compose_complete(&self, pages: usize, pdf_bytes: usize) {
        let _ = (pages, pdf_bytes);
    }

    /// Called when one delivery leg finishes.
    fn on_delivery(&self, leg: DeliveryLeg, ok: bool) {
        let _ = (leg, ok);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ReportProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ReportConfig`].
pub type ProgressCallback = Arc<dyn ReportProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        total: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        legs: Mutex<Vec<(DeliveryLeg, bool)>>,
    }

    impl ReportProgressCallback for TrackingCallback {
        fn on_compose_start(&self, total_photos: usize) {
            self.total.store(total_photos, Ordering::SeqCst);
        }

        fn on_photo_complete(&self, _slot: PhotoSlot, _done: usize, _total: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_photo_error(&self, _slot: PhotoSlot, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_delivery(&self, leg: DeliveryLeg, ok: bool) {
            self.legs.lock().unwrap().push((leg, ok));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_compose_start(3);
        cb.on_photo_complete(PhotoSlot::Lead, 1, 3);
        cb.on_photo_error(PhotoSlot::Signature, "bad png");
        cb.on_compose_complete(4, 1024);
        cb.on_delivery(DeliveryLeg::Email, false);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_compose_start(2);
        tracker.on_photo_complete(PhotoSlot::Lead, 1, 2);
        tracker.on_photo_error(PhotoSlot::Signature, "decode failed");
        tracker.on_delivery(DeliveryLeg::Storage, true);
        tracker.on_delivery(DeliveryLeg::Email, false);

        assert_eq!(tracker.total.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(
            *tracker.legs.lock().unwrap(),
            vec![(DeliveryLeg::Storage, true), (DeliveryLeg::Email, false)]
        );
    }

    #[test]
    fn leg_display() {
        assert_eq!(DeliveryLeg::LocalCopy.to_string(), "local copy");
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_delivery(DeliveryLeg::LocalCopy, true);
    }
}
