//! Input resolution: a JSON manifest on disk → an in-memory [`ReportRequest`].
//!
//! The manifest holds the visit text and *references* to images: local paths
//! (relative ones resolve against the manifest's directory) or `http(s)` URLs
//! that are downloaded. All images are loaded before composition starts, so
//! an unreadable file aborts the run before anything is uploaded or sent.
//!
//! ```json
//! {
//!   "visit": { "date": "2024-05-01", "address": "3 rue Victor Hugo", "author": "Elodie BONNAY" },
//!   "observations": [
//!     { "type": "✅ Positive", "description": "Hall propre", "photos": ["hall.jpg"] }
//!   ],
//!   "signature": "signature.png",
//!   "leadPhoto": "https://example.com/facade.jpg"
//! }
//! ```

use crate::error::ReportError;
use crate::model::{Observation, PhotoInput, ReportRequest, VisitMetadata};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// On-disk description of one report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportManifest {
    pub visit: VisitMetadata,
    #[serde(default)]
    pub observations: Vec<ManifestObservation>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub lead_photo: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestObservation {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub action: Option<String>,
    /// Image references, in display order.
    #[serde(default)]
    pub photos: Vec<String>,
}

/// Check if the reference looks like a URL.
pub fn is_url(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// Read and parse a manifest file.
pub async fn load_manifest(path: &Path) -> Result<ReportManifest, ReportError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| io_error(path, e))?;
    serde_json::from_str(&text).map_err(|e| ReportError::InvalidInput {
        detail: format!("'{}' is not a valid report manifest: {e}", path.display()),
    })
}

impl ReportManifest {
    /// Load every referenced image and build the request.
    ///
    /// Relative paths resolve against `base_dir`; downloads give up after
    /// `timeout_secs`.
    pub async fn resolve(self, base_dir: &Path, timeout_secs: u64) -> Result<ReportRequest, ReportError> {
        let client = http_client(timeout_secs)?;
        let fetch = |reference: String| {
            let client = client.clone();
            async move { fetch_image(&client, &reference, base_dir, timeout_secs).await }
        };

        let mut observations = Vec::with_capacity(self.observations.len());
        for obs in self.observations {
            let mut photos = Vec::with_capacity(obs.photos.len());
            for reference in obs.photos {
                photos.push(fetch(reference).await?);
            }
            observations.push(Observation {
                kind: obs.kind,
                description: obs.description,
                action: obs.action,
                photos,
            });
        }

        let signature = match self.signature {
            Some(r) => Some(fetch(r).await?),
            None => None,
        };
        let lead_photo = match self.lead_photo {
            Some(r) => Some(fetch(r).await?),
            None => None,
        };

        Ok(ReportRequest {
            visit: self.visit,
            observations,
            signature,
            lead_photo,
        })
    }
}

/// Load a manifest and all of its images.
pub async fn load_request(manifest_path: &Path, timeout_secs: u64) -> Result<ReportRequest, ReportError> {
    let manifest = load_manifest(manifest_path).await?;
    let base_dir = manifest_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    manifest.resolve(&base_dir, timeout_secs).await
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ReportError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ReportError::Internal(format!("HTTP client: {e}")))
}

async fn fetch_image(
    client: &reqwest::Client,
    reference: &str,
    base_dir: &Path,
    timeout_secs: u64,
) -> Result<PhotoInput, ReportError> {
    if reference.trim().is_empty() {
        return Err(ReportError::InvalidInput {
            detail: "empty image reference in manifest".into(),
        });
    }
    if is_url(reference) {
        download_url(client, reference, timeout_secs).await
    } else {
        read_local(&base_dir.join(reference)).await
    }
}

async fn read_local(path: &Path) -> Result<PhotoInput, ReportError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| io_error(path, e))?;
    debug!("Read {} ({} bytes)", path.display(), bytes.len());
    let hint = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => Some("image/png"),
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        _ => None,
    };
    let photo = PhotoInput::new(bytes);
    Ok(match hint {
        Some(h) => photo.with_mime_hint(h),
        None => photo,
    })
}

async fn download_url(client: &reqwest::Client, url: &str, timeout_secs: u64) -> Result<PhotoInput, ReportError> {
    info!("Downloading image from: {}", url);

    let map_err = |e: reqwest::Error| {
        if e.is_timeout() {
            ReportError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ReportError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_err)?;
    if !response.status().is_success() {
        return Err(ReportError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let mime = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
    let bytes = response.bytes().await.map_err(map_err)?;
    debug!("Downloaded {} bytes from {}", bytes.len(), url);

    let photo = PhotoInput::new(bytes.to_vec());
    Ok(match mime {
        Some(m) => photo.with_mime_hint(m),
        None => photo,
    })
}

fn io_error(path: &Path, e: std::io::Error) -> ReportError {
    match e.kind() {
        std::io::ErrorKind::NotFound => ReportError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => ReportError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ReportError::InvalidInput {
            detail: format!("cannot read '{}': {e}", path.display()),
        },
    }
}
