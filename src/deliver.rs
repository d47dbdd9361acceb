//! Delivery: local copy, storage upload and notification email.
//!
//! The three legs are independent. The local copy is written first, then the
//! upload and the email run concurrently; each result is recorded in the
//! [`ReportOutcome`] and none of them can undo the others. Only composition
//! errors are fatal.
//!
//! ## Collaborators
//!
//! Storage and email sit behind the [`StorageBackend`] and [`EmailSender`]
//! traits. [`SupabaseStorage`] and [`ResendMailer`] are the HTTP
//! implementations; tests substitute in-memory ones. `Option<T>` implements
//! both traits, so an unconfigured leg reports `NotConfigured` instead of
//! needing a separate code path.
//!
//! ## Retries
//!
//! Every call is bounded by `network_timeout_secs`. Transient failures
//! (timeouts, transport errors, 429, 5xx) are retried `max_retries` times
//! with exponential backoff (`retry_backoff_ms * 2^attempt`).

use crate::compose::compose;
use crate::config::{EmailPayload, ReportConfig};
use crate::error::{DeliveryError, ReportError};
use crate::model::{ReportRequest, VisitMetadata};
use crate::output::{ComposedReport, ReportOutcome};
use crate::pipeline::sanitize::sanitize_file_name;
use crate::progress::DeliveryLeg;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

/// File name of the local copy and of the email attachment.
pub const DOWNLOAD_FILE_NAME: &str = "rapport-visite.pdf";
pub const PDF_CONTENT_TYPE: &str = "application/pdf";
pub const DEFAULT_BUCKET: &str = "rapports-visite";
pub const RESEND_API_URL: &str = "https://api.resend.com/emails";
pub const DEFAULT_FROM_ADDRESS: &str = "onboarding@resend.dev";

const STORAGE: &str = "storage";
const EMAIL: &str = "email";
const MAX_ERROR_BODY: usize = 500;

// ── Collaborator traits ───────────────────────────────────────────────────

/// Remote object storage for finished reports.
pub trait StorageBackend: Send + Sync {
    /// Store `payload` under `key` and return its public URL.
    fn upload(
        &self,
        payload: &[u8],
        key: &str,
        content_type: &str,
        overwrite: bool,
    ) -> impl Future<Output = Result<String, DeliveryError>> + Send;
}

/// Outgoing email transport.
pub trait EmailSender: Send + Sync {
    fn send(&self, message: &EmailMessage) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

impl<T: StorageBackend> StorageBackend for Option<T> {
    async fn upload(
        &self,
        payload: &[u8],
        key: &str,
        content_type: &str,
        overwrite: bool,
    ) -> Result<String, DeliveryError> {
        match self {
            Some(backend) => backend.upload(payload, key, content_type, overwrite).await,
            None => Err(DeliveryError::NotConfigured {
                service: STORAGE.into(),
                hint: "set SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY".into(),
            }),
        }
    }
}

impl<T: EmailSender> EmailSender for Option<T> {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        match self {
            Some(sender) => sender.send(message).await,
            None => Err(DeliveryError::NotConfigured {
                service: EMAIL.into(),
                hint: "set RESEND_API_KEY".into(),
            }),
        }
    }
}

// ── Email message ─────────────────────────────────────────────────────────

/// What the email carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailBody {
    /// The PDF, base64-encoded.
    Attachment { filename: String, base64: String },
    /// Public URL of the uploaded copy.
    Link { url: String },
}

impl EmailBody {
    pub fn attachment(pdf: &[u8]) -> Self {
        EmailBody::Attachment {
            filename: DOWNLOAD_FILE_NAME.to_string(),
            base64: STANDARD.encode(pdf),
        }
    }
}

/// A report notification addressed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub address: String,
    pub date: String,
    pub body: EmailBody,
}

impl EmailMessage {
    pub fn new(to: impl Into<String>, visit: &VisitMetadata, body: EmailBody) -> Self {
        Self {
            to: to.into(),
            address: visit.address.clone(),
            date: visit.date.clone(),
            body,
        }
    }

    pub fn subject(&self) -> String {
        format!("Rapport de visite - {} - {}", self.address, self.date)
    }

    pub fn html(&self) -> String {
        let address = escape_html(&self.address);
        let date = escape_html(&self.date);
        let middle = match &self.body {
            EmailBody::Attachment { .. } => format!(
                "Veuillez trouver ci-joint le rapport de visite effectué à l'adresse : \
                 <strong>{address}</strong> le <strong>{date}</strong>."
            ),
            EmailBody::Link { url } => {
                let url = escape_html(url);
                format!(
                    "Le rapport de visite effectué à l'adresse : <strong>{address}</strong> \
                     le <strong>{date}</strong> est disponible ici : <a href=\"{url}\">{url}</a>."
                )
            }
        };
        format!("<p>Bonjour,<br><br>{middle}<br><br>Cordialement,<br>Service Syndic ORPI</p>")
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ── Supabase storage ──────────────────────────────────────────────────────

/// Supabase project credentials.
#[derive(Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    pub url: String,
    /// Service-role key; bypasses row-level security, keep it server-side.
    pub service_key: String,
    pub bucket: String,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            service_key: service_key.into(),
            bucket: DEFAULT_BUCKET.to_string(),
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }
}

impl fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("service_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// Supabase storage over its REST API.
#[derive(Debug, Clone)]
pub struct SupabaseStorage {
    client: reqwest::Client,
    config: SupabaseConfig,
    timeout_secs: u64,
}

impl SupabaseStorage {
    pub fn new(config: SupabaseConfig, timeout_secs: u64) -> Result<Self, ReportError> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            config,
            timeout_secs,
        })
    }

    fn base(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Upload endpoint for `key`.
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base(), self.config.bucket, key)
    }

    /// Public download URL for `key`.
    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base(),
            self.config.bucket,
            key
        )
    }
}

impl StorageBackend for SupabaseStorage {
    async fn upload(
        &self,
        payload: &[u8],
        key: &str,
        content_type: &str,
        overwrite: bool,
    ) -> Result<String, DeliveryError> {
        let response = self
            .client
            .post(self.object_url(key))
            .bearer_auth(&self.config.service_key)
            .header("apikey", &self.config.service_key)
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", if overwrite { "true" } else { "false" })
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|e| request_error(STORAGE, e, self.timeout_secs))?;
        check_status(STORAGE, response).await?;
        Ok(self.public_url(key))
    }
}

// ── Resend email ──────────────────────────────────────────────────────────

/// Resend API credentials.
#[derive(Clone)]
pub struct ResendConfig {
    pub api_key: String,
    pub from_address: String,
    pub api_url: String,
}

impl ResendConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            from_address: DEFAULT_FROM_ADDRESS.to_string(),
            api_url: RESEND_API_URL.to_string(),
        }
    }

    pub fn with_from_address(mut self, from: impl Into<String>) -> Self {
        self.from_address = from.into();
        self
    }
}

impl fmt::Debug for ResendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResendConfig")
            .field("api_key", &"<redacted>")
            .field("from_address", &self.from_address)
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ResendPayload<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: String,
    html: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<ResendAttachment<'a>>,
}

#[derive(Debug, Serialize)]
struct ResendAttachment<'a> {
    filename: &'a str,
    content: &'a str,
    content_type: &'a str,
}

impl<'a> ResendPayload<'a> {
    fn new(from: &'a str, message: &'a EmailMessage) -> Self {
        let attachments = match &message.body {
            EmailBody::Attachment { filename, base64 } => vec![ResendAttachment {
                filename,
                content: base64,
                content_type: PDF_CONTENT_TYPE,
            }],
            EmailBody::Link { .. } => Vec::new(),
        };
        Self {
            from,
            to: vec![message.to.as_str()],
            subject: message.subject(),
            html: message.html(),
            attachments,
        }
    }
}

/// Email through the Resend HTTP API.
#[derive(Debug, Clone)]
pub struct ResendMailer {
    client: reqwest::Client,
    config: ResendConfig,
    timeout_secs: u64,
}

impl ResendMailer {
    pub fn new(config: ResendConfig, timeout_secs: u64) -> Result<Self, ReportError> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            config,
            timeout_secs,
        })
    }
}

impl EmailSender for ResendMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        let payload = ResendPayload::new(&self.config.from_address, message);
        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| request_error(EMAIL, e, self.timeout_secs))?;
        check_status(EMAIL, response).await
    }
}

// ── HTTP helpers ──────────────────────────────────────────────────────────

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ReportError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ReportError::Internal(format!("HTTP client: {e}")))
}

fn request_error(service: &str, e: reqwest::Error, timeout_secs: u64) -> DeliveryError {
    if e.is_timeout() {
        DeliveryError::Timeout {
            service: service.into(),
            secs: timeout_secs,
        }
    } else {
        DeliveryError::Transport {
            service: service.into(),
            detail: e.to_string(),
        }
    }
}

async fn check_status(service: &str, response: reqwest::Response) -> Result<(), DeliveryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|&i| body.is_char_boundary(i))
            .unwrap_or(0);
        body.truncate(cut);
    }
    Err(DeliveryError::Http {
        service: service.into(),
        status: status.as_u16(),
        body,
    })
}

/// Run `call` under the network timeout, retrying transient failures.
async fn with_retry<T, F, Fut>(service: &str, config: &ReportConfig, mut call: F) -> Result<T, DeliveryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DeliveryError>>,
{
    let timeout = Duration::from_secs(config.network_timeout_secs);
    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "{}: retry {}/{} after {}ms",
                service, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let result = tokio::time::timeout(timeout, call())
            .await
            .unwrap_or_else(|_| {
                Err(DeliveryError::Timeout {
                    service: service.into(),
                    secs: config.network_timeout_secs,
                })
            });
        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                warn!("{}: attempt {} failed: {}", service, attempt + 1, e);
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| DeliveryError::Transport {
        service: service.into(),
        detail: "no attempt was made".into(),
    }))
}

// ── Legs ──────────────────────────────────────────────────────────────────

/// Object key for a report: `report_<address>_<date>.pdf`, or a timestamp
/// name when either part sanitises to nothing.
pub fn storage_key(visit: &VisitMetadata, now: DateTime<Utc>) -> String {
    let address = sanitize_file_name(visit.address.trim());
    let date = sanitize_file_name(visit.date.trim());
    if address.trim_matches('_').is_empty() || date.trim_matches('_').is_empty() {
        format!("report_{}.pdf", now.timestamp_millis())
    } else {
        format!("report_{address}_{date}.pdf")
    }
}

/// Write `pdf` to `dir/rapport-visite.pdf`.
///
/// Uses atomic write (temp file + rename) so a reader never sees a partial
/// file.
pub async fn save_local(pdf: &[u8], dir: &Path) -> Result<PathBuf, ReportError> {
    let path = dir.join(DOWNLOAD_FILE_NAME);
    let write_err = |e| ReportError::OutputWriteFailed {
        path: path.clone(),
        source: e,
    };

    tokio::fs::create_dir_all(dir).await.map_err(write_err)?;
    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, pdf).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, &path).await.map_err(write_err)?;

    info!("Saved local copy: {}", path.display());
    Ok(path)
}

async fn upload_leg<S: StorageBackend>(
    storage: &S,
    pdf: &[u8],
    key: &str,
    config: &ReportConfig,
) -> Result<String, DeliveryError> {
    if pdf.is_empty() || key.is_empty() {
        return Err(DeliveryError::InvalidRequest {
            service: STORAGE.into(),
            detail: "missing payload or key".into(),
        });
    }
    with_retry(STORAGE, config, move || storage.upload(pdf, key, PDF_CONTENT_TYPE, true)).await
}

async fn email_leg<E: EmailSender>(
    mailer: &E,
    message: &EmailMessage,
    config: &ReportConfig,
) -> Result<(), DeliveryError> {
    if message.to.trim().is_empty() {
        return Err(DeliveryError::InvalidRequest {
            service: EMAIL.into(),
            detail: "no recipient address".into(),
        });
    }
    with_retry(EMAIL, config, move || mailer.send(message)).await
}

fn report_leg<T>(config: &ReportConfig, leg: DeliveryLeg, result: &Result<T, DeliveryError>) {
    match result {
        Ok(_) => info!("{} delivered", leg),
        Err(e) => warn!("{} failed: {}", leg, e),
    }
    if let Some(ref cb) = config.progress_callback {
        cb.on_delivery(leg, result.is_ok());
    }
}

/// Upload the report and email it to the author's recipient.
///
/// Never fails: each leg's result lands in the returned outcome. In
/// [`EmailPayload::Link`] mode the email waits for the upload and attaches
/// the PDF instead if the upload failed.
pub async fn deliver<S, E>(
    report: &ComposedReport,
    visit: &VisitMetadata,
    config: &ReportConfig,
    storage: &S,
    mailer: &E,
) -> ReportOutcome
where
    S: StorageBackend,
    E: EmailSender,
{
    let key = storage_key(visit, Utc::now());
    let recipient = config.router.recipient_for(&visit.author).to_string();
    info!("Delivering '{}' to storage and {}", key, recipient);

    let (stored, emailed) = match config.email_payload {
        EmailPayload::Attachment => {
            let message = EmailMessage::new(&recipient, visit, EmailBody::attachment(&report.pdf));
            tokio::join!(
                upload_leg(storage, &report.pdf, &key, config),
                email_leg(mailer, &message, config),
            )
        }
        EmailPayload::Link => {
            let stored = upload_leg(storage, &report.pdf, &key, config).await;
            let body = match &stored {
                Ok(url) => EmailBody::Link { url: url.clone() },
                Err(e) => {
                    warn!("No public link ({}), attaching the PDF instead", e);
                    EmailBody::attachment(&report.pdf)
                }
            };
            let message = EmailMessage::new(&recipient, visit, body);
            let emailed = email_leg(mailer, &message, config).await;
            (stored, emailed)
        }
    };

    report_leg(config, DeliveryLeg::Storage, &stored);
    report_leg(config, DeliveryLeg::Email, &emailed);

    ReportOutcome {
        pages: report.page_count(),
        pdf_bytes: report.pdf.len(),
        storage_key: key,
        recipient,
        local_copy: None,
        storage: stored,
        email: emailed,
        photo_errors: report.photo_errors.clone(),
    }
}

/// Compose the report, save the local copy, then deliver it.
///
/// # Errors
/// Only composition errors are returned; delivery and local-copy failures
/// are recorded in the outcome.
pub async fn generate_and_deliver<S, E>(
    request: &ReportRequest,
    config: &ReportConfig,
    storage: &S,
    mailer: &E,
) -> Result<ReportOutcome, ReportError>
where
    S: StorageBackend,
    E: EmailSender,
{
    let report = compose(request, config).await?;

    let local_copy = match config.download_dir {
        Some(ref dir) => {
            let saved = save_local(&report.pdf, dir).await.map_err(|e| e.to_string());
            if let Err(ref e) = saved {
                warn!("{} failed: {}", DeliveryLeg::LocalCopy, e);
            }
            if let Some(ref cb) = config.progress_callback {
                cb.on_delivery(DeliveryLeg::LocalCopy, saved.is_ok());
            }
            Some(saved)
        }
        None => None,
    };

    let mut outcome = deliver(&report, &request.visit, config, storage, mailer).await;
    outcome.local_copy = local_copy;
    info!("{}", outcome.user_message());
    Ok(outcome)
}
