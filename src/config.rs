//! Configuration types for report composition and delivery.
//!
//! All behaviour is controlled through [`ReportConfig`], built via its
//! [`ReportConfigBuilder`]. One struct holds the image budgets, the
//! recipient routing table and the delivery knobs, so a run can be logged and
//! reproduced from its config alone.

use crate::error::ReportError;
use crate::progress::ProgressCallback;
use crate::routing::RecipientRouter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Pixel and quality budget for one class of image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageBudget {
    /// Images wider than this are downscaled to it. Default: 1000.
    pub max_width_px: u32,

    /// Upper bound on the scale factor, in `(0, 1]`. Default: 1.0.
    ///
    /// Lower it to shrink every photo further regardless of width, e.g. 0.5
    /// for reports sent over a metered connection.
    pub max_scale_factor: f32,

    /// JPEG quality, 1–100. Default: 70.
    pub jpeg_quality: u8,
}

impl Default for ImageBudget {
    fn default() -> Self {
        Self {
            max_width_px: 1000,
            max_scale_factor: 1.0,
            jpeg_quality: 70,
        }
    }
}

impl ImageBudget {
    const MIN_WIDTH_PX: u32 = 16;

    /// Bring every field into its valid range.
    pub fn clamped(self) -> Self {
        let scale = if self.max_scale_factor.is_finite() && self.max_scale_factor > 0.0 {
            self.max_scale_factor.min(1.0)
        } else {
            1.0
        };
        Self {
            max_width_px: self.max_width_px.max(Self::MIN_WIDTH_PX),
            max_scale_factor: scale,
            jpeg_quality: self.jpeg_quality.clamp(1, 100),
        }
    }

    fn validate(&self, name: &str) -> Result<(), ReportError> {
        if self.max_width_px < Self::MIN_WIDTH_PX {
            return Err(ReportError::InvalidConfig(format!(
                "{name}: max_width_px must be ≥ {}, got {}",
                Self::MIN_WIDTH_PX,
                self.max_width_px
            )));
        }
        if !(self.max_scale_factor > 0.0 && self.max_scale_factor <= 1.0) {
            return Err(ReportError::InvalidConfig(format!(
                "{name}: max_scale_factor must be in (0, 1], got {}",
                self.max_scale_factor
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ReportError::InvalidConfig(format!(
                "{name}: jpeg_quality must be 1–100, got {}",
                self.jpeg_quality
            )));
        }
        Ok(())
    }
}

/// What the notification email carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmailPayload {
    /// The PDF itself, base64-encoded. (default)
    #[default]
    Attachment,
    /// A link to the uploaded copy. Falls back to the attachment when the
    /// upload fails.
    Link,
}

/// Configuration for composing and delivering a visit report.
///
/// # Example
/// ```rust
/// use visit_report::ReportConfig;
///
/// let config = ReportConfig::builder()
///     .concurrency(2)
///     .jpeg_quality(80)
///     .build()
///     .unwrap();
/// assert_eq!(config.photo_budget.jpeg_quality, 80);
/// ```
#[derive(Clone)]
pub struct ReportConfig {
    /// Budget for observation photos.
    pub photo_budget: ImageBudget,

    /// Budget for the cover photo.
    pub lead_photo_budget: ImageBudget,

    /// Signature pixels → points. Default: 0.5.
    pub signature_scale: f32,

    /// Number of images normalised in parallel. Default: 4.
    pub concurrency: usize,

    /// Abort on the first undecodable image instead of skipping it. Default: false.
    pub strict_images: bool,

    /// Author → recipient table.
    pub router: RecipientRouter,

    /// Attach the PDF or link to the uploaded copy. Default: attachment.
    pub email_payload: EmailPayload,

    /// Per-call timeout for storage and email, in seconds. Default: 30.
    pub network_timeout_secs: u64,

    /// Retries after a transient delivery failure. Default: 1.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Directory for the local copy. `None` skips it.
    pub download_dir: Option<PathBuf>,

    /// Progress callback. Default: no-op.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            photo_budget: ImageBudget::default(),
            lead_photo_budget: ImageBudget::default(),
            signature_scale: 0.5,
            concurrency: 4,
            strict_images: false,
            router: RecipientRouter::default(),
            email_payload: EmailPayload::default(),
            network_timeout_secs: 30,
            max_retries: 1,
            retry_backoff_ms: 500,
            download_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ReportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportConfig")
            .field("photo_budget", &self.photo_budget)
            .field("lead_photo_budget", &self.lead_photo_budget)
            .field("signature_scale", &self.signature_scale)
            .field("concurrency", &self.concurrency)
            .field("strict_images", &self.strict_images)
            .field("router", &self.router)
            .field("email_payload", &self.email_payload)
            .field("network_timeout_secs", &self.network_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("download_dir", &self.download_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ReportProgressCallback>"),
            )
            .finish()
    }
}

impl ReportConfig {
    /// Create a new builder for `ReportConfig`.
    pub fn builder() -> ReportConfigBuilder {
        ReportConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ReportConfig`].
#[derive(Debug)]
pub struct ReportConfigBuilder {
    config: ReportConfig,
}

impl ReportConfigBuilder {
    pub fn photo_budget(mut self, budget: ImageBudget) -> Self {
        self.config.photo_budget = budget.clamped();
        self
    }

    pub fn lead_photo_budget(mut self, budget: ImageBudget) -> Self {
        self.config.lead_photo_budget = budget.clamped();
        self
    }

    /// Set the width budget of both photo classes.
    pub fn max_width_px(mut self, px: u32) -> Self {
        for b in [&mut self.config.photo_budget, &mut self.config.lead_photo_budget] {
            *b = ImageBudget { max_width_px: px, ..*b }.clamped();
        }
        self
    }

    /// Set the JPEG quality of both photo classes.
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        for b in [&mut self.config.photo_budget, &mut self.config.lead_photo_budget] {
            *b = ImageBudget {
                jpeg_quality: quality,
                ..*b
            }
            .clamped();
        }
        self
    }

    pub fn signature_scale(mut self, scale: f32) -> Self {
        self.config.signature_scale = scale;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn strict_images(mut self, v: bool) -> Self {
        self.config.strict_images = v;
        self
    }

    pub fn router(mut self, router: RecipientRouter) -> Self {
        self.config.router = router;
        self
    }

    pub fn email_payload(mut self, payload: EmailPayload) -> Self {
        self.config.email_payload = payload;
        self
    }

    pub fn network_timeout_secs(mut self, secs: u64) -> Self {
        self.config.network_timeout_secs = secs.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.download_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ReportConfig, ReportError> {
        let c = &self.config;
        c.photo_budget.validate("photo_budget")?;
        c.lead_photo_budget.validate("lead_photo_budget")?;
        if !(c.signature_scale.is_finite() && c.signature_scale > 0.0) {
            return Err(ReportError::InvalidConfig(format!(
                "signature_scale must be > 0, got {}",
                c.signature_scale
            )));
        }
        if c.concurrency == 0 {
            return Err(ReportError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.router.default_recipient().trim().is_empty() {
            return Err(ReportError::InvalidConfig(
                "Routing table needs a default recipient".into(),
            ));
        }
        Ok(self.config)
    }
}
