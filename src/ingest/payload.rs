use serde::Serialize;

use crate::domain::{RawEvent, SourceConfig};

/// Body of `POST /events:batch`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchPayload {
    pub events: Vec<EventInput>,
}

impl BatchPayload {
    pub fn new(events: &[RawEvent], source: &SourceConfig) -> Self {
        Self {
            events: events
                .iter()
                .map(|e| EventInput::from_raw(e, source))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInput {
    #[serde(rename = "@type", skip_serializing_if = "String::is_empty")]
    pub event_type: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub start_date: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub end_date: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<PlaceInput>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub license: String,
    pub source: SourceInput,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaceInput {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInput {
    pub url: String,
    pub event_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub license: String,
}

impl EventInput {
    pub fn from_raw(raw: &RawEvent, source: &SourceConfig) -> Self {
        let location = if raw.location.is_empty() {
            None
        } else {
            Some(PlaceInput {
                name: raw.location.clone(),
            })
        };

        Self {
            event_type: raw.event_type.clone(),
            name: raw.name.clone(),
            start_date: raw.start_date.clone(),
            end_date: raw.end_date.clone(),
            description: raw.description.clone(),
            url: raw.url.clone(),
            image: raw.image.clone(),
            location,
            license: source.license.clone(),
            source: SourceInput {
                url: source.url.clone(),
                event_id: raw.source_event_id(&source.name),
                name: source.name.clone(),
                license: source.license.clone(),
            },
        }
    }
}
