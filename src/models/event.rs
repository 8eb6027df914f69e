//! Event (entity) data structure.

use serde::{Deserialize, Serialize};

use crate::utils::url::extract_event_id;

/// Placeholder written for descriptive fields the source did not provide.
pub const UNKNOWN: &str = "unknown";

/// A competition event discovered from a listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Stable identifier, used as the checkpoint key
    #[serde(default)]
    pub id: String,

    /// Canonical event URL
    #[serde(default)]
    pub url: String,

    /// Human-readable title
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub organizer: String,

    #[serde(default)]
    pub club: String,

    #[serde(default)]
    pub location: String,

    /// Date range as rendered by the source
    #[serde(default)]
    pub dates: String,

    #[serde(default)]
    pub status: String,

    /// Participant listing page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants_url: Option<String>,
}

impl Event {
    /// Fill a missing identifier from the URL's event segment.
    ///
    /// Returns `false` when no identifier could be established.
    pub fn ensure_id(&mut self) -> bool {
        if self.id.trim().is_empty() {
            let from_url = self
                .participants_url
                .as_deref()
                .and_then(extract_event_id)
                .or_else(|| extract_event_id(&self.url));
            if let Some(id) = from_url {
                self.id = id;
            }
        }
        !self.id.trim().is_empty()
    }

    /// Render a descriptive value, substituting [`UNKNOWN`] for blanks.
    pub fn or_unknown(value: &str) -> &str {
        let trimmed = value.trim();
        if trimmed.is_empty() { UNKNOWN } else { trimmed }
    }
}
