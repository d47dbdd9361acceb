//! Author → email recipient routing.
//!
//! Each property manager receives the reports they wrote; anything else,
//! including an empty author, goes to the default mailbox. The table is plain
//! data so an agency can load its own from JSON instead of recompiling.

use crate::error::ReportError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Exact-match author → address table with a fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientRouter {
    #[serde(default)]
    routes: BTreeMap<String, String>,
    default: String,
}

impl Default for RecipientRouter {
    fn default() -> Self {
        Self::new("skita@orpi.com")
            .with_route("Elodie BONNAY", "ebonnay@orpi.com")
            .with_route("David SAINT-GERMAIN", "dsaintgermain@orpi.com")
    }
}

impl RecipientRouter {
    /// Empty table sending everything to `default`.
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            routes: BTreeMap::new(),
            default: default.into(),
        }
    }

    pub fn with_route(mut self, author: impl Into<String>, address: impl Into<String>) -> Self {
        self.routes.insert(author.into(), address.into());
        self
    }

    /// Recipient for `author`. Matching is exact; unknown names fall back.
    pub fn recipient_for(&self, author: &str) -> &str {
        self.routes
            .get(author)
            .map(String::as_str)
            .unwrap_or(&self.default)
    }

    pub fn default_recipient(&self) -> &str {
        &self.default
    }

    /// Parse a table of the form `{"routes": {"Name": "addr"}, "default": "addr"}`.
    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        serde_json::from_str(json).map_err(|e| ReportError::InvalidConfig(format!(
            "Routing table is not valid JSON: {e}"
        )))
    }

    /// Load a routing table from a JSON file.
    pub async fn load(path: &Path) -> Result<Self, ReportError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ReportError::FileNotFound {
                    path: path.to_path_buf(),
                },
                std::io::ErrorKind::PermissionDenied => ReportError::PermissionDenied {
                    path: path.to_path_buf(),
                },
                _ => ReportError::InvalidInput {
                    detail: format!("Cannot read routing table '{}': {e}", path.display()),
                },
            })?;
        Self::from_json(&text)
    }
}
