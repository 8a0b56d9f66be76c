use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An extracted, unvalidated event. All fields are free text; empty means
/// the field was not found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    pub location: String,
    pub description: String,
    pub url: String,
    pub image: String,
    /// Publisher's own identifier, from JSON-LD `@id` or `identifier`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// schema.org subtype such as `MusicEvent`, when the page declares one.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event_type: String,
}

impl RawEvent {
    /// Stable identifier used by the ingestion boundary for de-duplication.
    pub fn source_event_id(&self, source_name: &str) -> String {
        if !self.id.is_empty() {
            return self.id.clone();
        }
        if !self.url.is_empty() {
            return self.url.clone();
        }
        Self::generate_id(source_name, &self.name, &self.start_date)
    }

    /// Deterministic ID from source name, event name and start date
    pub fn generate_id(source_name: &str, name: &str, start_date: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source_name.as_bytes());
        hasher.update(b"|");
        hasher.update(name.as_bytes());
        hasher.update(b"|");
        hasher.update(start_date.as_bytes());
        hex::encode(hasher.finalize())
    }
}
