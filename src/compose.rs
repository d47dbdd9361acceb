//! Report composition: [`ReportRequest`] → PDF bytes.
//!
//! ```text
//! ReportRequest
//!  │
//!  ├─ 1. Normalise  every image, concurrently (CPU-bound, spawn_blocking)
//!  ├─ 2. Collect    sort by slot, skip failures (or abort in strict mode)
//!  ├─ 3. Layout     cover → observations/photos → signature
//!  └─ 4. Serialise  lopdf document → bytes (spawn_blocking)
//! ```
//!
//! Composition has no side effects. Delivery lives in [`crate::deliver`].

use crate::config::{ImageBudget, ReportConfig};
use crate::error::{PhotoError, PhotoSlot, ReportError};
use crate::model::{PhotoInput, ReportRequest};
use crate::output::{ComposeStats, ComposedReport};
use crate::pipeline::layout::{self, GalleryTemplate, PreparedImages};
use crate::pipeline::normalize::{self, NormalizedImage};
use crate::pipeline::serialize;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One image waiting to be normalised.
struct ImageJob {
    slot: PhotoSlot,
    photo: PhotoInput,
    budget: ImageBudget,
    lossless: bool,
}

impl ImageJob {
    fn run(self) -> Result<NormalizedImage, PhotoError> {
        if self.lossless {
            normalize::normalize_lossless(&self.photo.bytes, &self.budget, self.slot)
        } else {
            normalize::normalize(
                &self.photo.bytes,
                self.photo.mime_hint.as_deref(),
                &self.budget,
                self.slot,
            )
        }
    }
}

/// Compose a report into PDF bytes.
///
/// # Returns
/// `Ok(ComposedReport)` even if some photos were skipped (check
/// `report.photo_errors`).
///
/// # Errors
/// Returns `Err(ReportError)` only for fatal errors:
/// - a photo failed and `config.strict_images` is set
/// - the PDF could not be serialised
pub async fn compose(request: &ReportRequest, config: &ReportConfig) -> Result<ComposedReport, ReportError> {
    let total_start = Instant::now();
    info!(
        "Composing report for '{}' ({} observation(s))",
        request.visit.address,
        request.observations.len()
    );

    // ── Step 1: Collect image jobs ────────────────────────────────────────
    let (jobs, ignored) = image_jobs(request, config);
    let total = jobs.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_compose_start(total);
    }

    // ── Step 2: Normalise concurrently ────────────────────────────────────
    let normalize_start = Instant::now();
    let done = Arc::new(AtomicUsize::new(0));
    let mut results: Vec<(PhotoSlot, Result<NormalizedImage, PhotoError>)> =
        stream::iter(jobs.into_iter().map(|job| {
            let slot = job.slot;
            let done = Arc::clone(&done);
            let callback = config.progress_callback.clone();
            async move {
                let result = tokio::task::spawn_blocking(move || job.run())
                    .await
                    .unwrap_or_else(|e| {
                        Err(PhotoError::Decode {
                            slot,
                            detail: format!("image task panicked: {e}"),
                        })
                    });
                let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(cb) = callback {
                    match &result {
                        Ok(_) => cb.on_photo_complete(slot, n, total),
                        Err(e) => cb.on_photo_error(slot, &e.to_string()),
                    }
                }
                (slot, result)
            }
        }))
        .buffer_unordered(config.concurrency)
        .collect()
        .await;
    let normalize_duration_ms = normalize_start.elapsed().as_millis() as u64;

    // Sort by slot so galleries keep their input order.
    results.sort_by_key(|(slot, _)| *slot);

    // ── Step 3: Split survivors from failures ─────────────────────────────
    let mut prepared = PreparedImages {
        galleries: vec![Vec::new(); request.observations.len()],
        ..Default::default()
    };
    let mut photo_errors = Vec::new();
    for (slot, result) in results {
        match result {
            Ok(image) => match slot {
                PhotoSlot::Lead => prepared.lead = Some(image),
                PhotoSlot::Signature => prepared.signature = Some(image),
                PhotoSlot::Observation { observation, .. } => {
                    if let Some(gallery) = prepared.galleries.get_mut(observation) {
                        gallery.push(image);
                    }
                }
            },
            Err(e) => {
                if config.strict_images {
                    return Err(ReportError::PhotoRejected(e));
                }
                warn!("Skipping {}", e);
                photo_errors.push(e);
            }
        }
    }
    let photos_embedded = total - photo_errors.len();
    info!(
        "Normalised {}/{} image(s) in {}ms",
        photos_embedded, total, normalize_duration_ms
    );

    // ── Step 4: Layout ────────────────────────────────────────────────────
    let document = layout::lay_out(request, prepared, config.signature_scale);
    debug!("Laid out {} page(s)", document.page_count());

    // ── Step 5: Serialise ─────────────────────────────────────────────────
    let (document, pdf) = tokio::task::spawn_blocking(move || {
        let pdf = serialize::serialize(&document);
        (document, pdf)
    })
    .await
    .map_err(|e| ReportError::Internal(format!("Serialise task panicked: {}", e)))?;
    let pdf = pdf?;

    let stats = ComposeStats {
        pages: document.page_count(),
        photos_embedded,
        photos_skipped: photo_errors.len(),
        photos_ignored: ignored,
        pdf_bytes: pdf.len(),
        normalize_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Report composed: {} page(s), {} bytes, {}ms total",
        stats.pages, stats.pdf_bytes, stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_compose_complete(stats.pages, stats.pdf_bytes);
    }

    Ok(ComposedReport {
        pdf,
        document,
        photo_errors,
        stats,
    })
}

/// Synchronous wrapper around [`compose`].
///
/// Creates a temporary tokio runtime internally.
pub fn compose_sync(request: &ReportRequest, config: &ReportConfig) -> Result<ComposedReport, ReportError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ReportError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(compose(request, config))
}

/// Build one job per image, in slot order. Returns the jobs and the number
/// of gallery photos dropped for exceeding the per-observation limit.
fn image_jobs(request: &ReportRequest, config: &ReportConfig) -> (Vec<ImageJob>, usize) {
    let mut jobs = Vec::with_capacity(request.photo_count(GalleryTemplate::MAX_PHOTOS));
    let mut ignored = 0;

    if let Some(ref photo) = request.lead_photo {
        jobs.push(ImageJob {
            slot: PhotoSlot::Lead,
            photo: photo.clone(),
            budget: config.lead_photo_budget,
            lossless: false,
        });
    }

    for (observation, obs) in request.observations.iter().enumerate() {
        if obs.photos.len() > GalleryTemplate::MAX_PHOTOS {
            let extra = obs.photos.len() - GalleryTemplate::MAX_PHOTOS;
            debug!(
                "Observation {}: ignoring {} photo(s) beyond the first {}",
                observation + 1,
                extra,
                GalleryTemplate::MAX_PHOTOS
            );
            ignored += extra;
        }
        for (photo_index, photo) in obs.photos.iter().take(GalleryTemplate::MAX_PHOTOS).enumerate() {
            jobs.push(ImageJob {
                slot: PhotoSlot::Observation {
                    observation,
                    photo: photo_index,
                },
                photo: photo.clone(),
                budget: config.photo_budget,
                lossless: false,
            });
        }
    }

    if let Some(ref photo) = request.signature {
        jobs.push(ImageJob {
            slot: PhotoSlot::Signature,
            photo: photo.clone(),
            budget: config.photo_budget,
            lossless: true,
        });
    }

    (jobs, ignored)
}
