//! The report request: what the field agent captured on site.

use crate::pipeline::layout::Rgb;
use crate::pipeline::sanitize::sanitize;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Observation type labels containing this word (any case) are drawn in green.
const POSITIVE_MARKER: &str = "positive";

/// Header fields of the visit, shown on the cover page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisitMetadata {
    pub date: String,
    pub address: String,
    /// Report author; also selects the email recipient.
    #[serde(alias = "redacteur")]
    pub author: String,
    pub arrival_time: String,
    pub departure_time: String,
    /// Building access code.
    #[serde(alias = "code")]
    pub building_code: String,
    #[serde(alias = "personnesPresentes")]
    pub people_present: String,
}

impl VisitMetadata {
    /// Labelled cover lines, in display order.
    pub fn cover_lines(&self) -> [(&'static str, &str); 7] {
        [
            ("Date :", &self.date),
            ("Adresse :", &self.address),
            ("Rédacteur :", &self.author),
            ("Heure d'arrivée :", &self.arrival_time),
            ("Heure de départ :", &self.departure_time),
            ("Code :", &self.building_code),
            ("Personnes présentes :", &self.people_present),
        ]
    }
}

/// Raw image bytes as received from the client.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PhotoInput {
    pub bytes: Vec<u8>,
    /// Declared MIME type, if any. Advisory only.
    pub mime_hint: Option<String>,
}

impl PhotoInput {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_hint: None,
        }
    }

    pub fn with_mime_hint(mut self, hint: impl Into<String>) -> Self {
        self.mime_hint = Some(hint.into());
        self
    }
}

impl fmt::Debug for PhotoInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhotoInput")
            .field("bytes", &self.bytes.len())
            .field("mime_hint", &self.mime_hint)
            .finish()
    }
}

/// How an observation is rendered: good news or something to fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tone {
    Positive,
    NeedsAttention,
}

impl Tone {
    pub fn color(self) -> Rgb {
        match self {
            Tone::Positive => Rgb::POSITIVE,
            Tone::NeedsAttention => Rgb::NEEDS_ATTENTION,
        }
    }
}

/// One finding recorded during the visit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    /// Free-form type label, e.g. `"✅ Positive"` or `"⚠️ À surveiller"`.
    pub kind: String,
    pub description: String,
    /// Follow-up action; `None` or blank means no action block.
    pub action: Option<String>,
    /// In display order. Only the first three are laid out.
    pub photos: Vec<PhotoInput>,
}

impl Observation {
    pub fn tone(&self) -> Tone {
        if sanitize(&self.kind).to_lowercase().contains(POSITIVE_MARKER) {
            Tone::Positive
        } else {
            Tone::NeedsAttention
        }
    }

    /// The action text, if it has anything printable in it.
    pub fn action_text(&self) -> Option<&str> {
        self.action
            .as_deref()
            .filter(|a| !sanitize(a).is_empty())
    }
}

/// Everything needed to compose one report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportRequest {
    pub visit: VisitMetadata,
    pub observations: Vec<Observation>,
    /// Drawn signature, usually a transparent PNG.
    pub signature: Option<PhotoInput>,
    /// Property photo shown on the cover.
    pub lead_photo: Option<PhotoInput>,
}

impl ReportRequest {
    /// Total number of images the assembler will try to normalise.
    pub fn photo_count(&self, max_per_observation: usize) -> usize {
        let gallery: usize = self
            .observations
            .iter()
            .map(|o| o.photos.len().min(max_per_observation))
            .sum();
        gallery + usize::from(self.signature.is_some()) + usize::from(self.lead_photo.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(kind: &str) -> Observation {
        Observation {
            kind: kind.into(),
            ..Default::default()
        }
    }

    #[test]
    fn tone_matches_positive_case_insensitively() {
        assert_eq!(obs("✅ Positive").tone(), Tone::Positive);
        assert_eq!(obs("POSITIVE").tone(), Tone::Positive);
        assert_eq!(obs("⚠️ À surveiller").tone(), Tone::NeedsAttention);
        assert_eq!(obs("").tone(), Tone::NeedsAttention);
    }

    #[test]
    fn tone_reads_the_printed_label() {
        assert_eq!(obs("Positivé").tone(), Tone::Positive);
        assert_eq!(obs("✅ POSITIVÉ").tone(), Tone::Positive);
    }

    #[test]
    fn blank_action_counts_as_none() {
        let mut o = obs("x");
        assert_eq!(o.action_text(), None);
        o.action = Some("  \n ".into());
        assert_eq!(o.action_text(), None);
        o.action = Some("Appeler le plombier".into());
        assert_eq!(o.action_text(), Some("Appeler le plombier"));
    }

    #[test]
    fn metadata_accepts_client_field_names() {
        let visit: VisitMetadata = serde_json::from_str(
            r#"{"date":"2024-05-01","address":"3 rue Victor Hugo","redacteur":"Elodie BONNAY",
                "arrivalTime":"09:00","code":"A1234","personnesPresentes":"Gardien"}"#,
        )
        .unwrap();
        assert_eq!(visit.author, "Elodie BONNAY");
        assert_eq!(visit.building_code, "A1234");
        assert_eq!(visit.people_present, "Gardien");
        assert_eq!(visit.departure_time, "");
    }

    #[test]
    fn photo_count_caps_galleries() {
        let mut o = obs("x");
        o.photos = vec![PhotoInput::new(vec![1]); 5];
        let req = ReportRequest {
            observations: vec![o],
            signature: Some(PhotoInput::new(vec![1])),
            ..Default::default()
        };
        assert_eq!(req.photo_count(3), 4);
    }

    #[test]
    fn photo_input_debug_hides_bytes() {
        let p = PhotoInput::new(vec![0u8; 1024]).with_mime_hint("image/jpeg");
        let dbg = format!("{p:?}");
        assert!(dbg.contains("1024"));
        assert!(dbg.contains("image/jpeg"));
    }
}
