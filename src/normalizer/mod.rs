use html_escape::decode_html_entities;
use serde_json::Value;
use url::Url;

use crate::domain::RawEvent;

/// Turns parsed markup into [`RawEvent`] fields.
#[derive(Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Trim and collapse runs of whitespace into single spaces.
    pub fn collapse_whitespace(&self, raw: &str) -> String {
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Decode HTML entities, then collapse whitespace.
    pub fn clean_text(&self, raw: &str) -> String {
        self.collapse_whitespace(&decode_html_entities(raw))
    }

    /// Resolve `value` against `base`. Absolute values pass through; values
    /// that cannot be joined are kept as-is.
    pub fn resolve_url(&self, base: &Url, value: &str) -> String {
        let value = value.trim();
        if value.is_empty() {
            return String::new();
        }
        base.join(value)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| value.to_string())
    }

    /// Map one schema.org Event object onto a [`RawEvent`].
    pub fn from_json_ld(&self, event: &Value, page_url: &Url) -> RawEvent {
        let url = string_value(&event["url"]);
        let image = image_value(&event["image"]);

        RawEvent {
            name: self.clean_text(&string_value(&event["name"])),
            start_date: string_value(&event["startDate"]).trim().to_string(),
            end_date: string_value(&event["endDate"]).trim().to_string(),
            location: self.clean_text(&location_value(&event["location"])),
            description: self.clean_text(&string_value(&event["description"])),
            url: self.resolve_url(page_url, &url),
            image: self.resolve_url(page_url, &image),
            id: id_value(event),
            event_type: event_type_value(&event["@type"]),
        }
    }
}

/// `@id` when present, otherwise `identifier` (plain or a `PropertyValue`).
fn id_value(event: &Value) -> String {
    let id = string_value(&event["@id"]);
    if !id.trim().is_empty() {
        return id.trim().to_string();
    }
    let identifier = match &event["identifier"] {
        Value::Object(obj) if obj.contains_key("value") => string_value(&obj["value"]),
        other => string_value(other),
    };
    identifier.trim().to_string()
}

/// The declared subtype without its schema.org prefix. For a list of
/// types the first one naming an event wins.
fn event_type_value(ty: &Value) -> String {
    let types: Vec<&str> = match ty {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    let stripped: Vec<&str> = types
        .iter()
        .map(|t| {
            let t = t.trim();
            ["https://schema.org/", "http://schema.org/", "schema:"]
                .iter()
                .find_map(|prefix| t.strip_prefix(prefix))
                .unwrap_or(t)
        })
        .collect();
    stripped
        .iter()
        .find(|t| t.ends_with("Event") || **t == "EventSeries")
        .or_else(|| stripped.first())
        .map(|t| t.to_string())
        .unwrap_or_default()
}

/// A JSON-LD string: plain, `{"@value": ...}`, a number, or the first
/// element of an array.
fn string_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.first().map(string_value).unwrap_or_default(),
        Value::Object(obj) => obj.get("@value").map(string_value).unwrap_or_default(),
        _ => String::new(),
    }
}

/// A string, a `Place` with name and address, or an array of either.
fn location_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.first().map(location_value).unwrap_or_default(),
        Value::Object(place) => {
            let mut parts = Vec::new();

            let name = string_value(place.get("name").unwrap_or(&Value::Null));
            if !name.trim().is_empty() {
                parts.push(name);
            }

            match place.get("address") {
                Some(Value::String(s)) if !s.trim().is_empty() => parts.push(s.clone()),
                Some(addr @ Value::Object(_)) => parts.extend(address_parts(addr)),
                // Some sites put address fields on the Place itself
                _ => parts.extend(address_parts(value)),
            }

            parts.join(", ")
        }
        _ => String::new(),
    }
}

fn address_parts(addr: &Value) -> Vec<String> {
    [
        "streetAddress",
        "addressLocality",
        "addressRegion",
        "postalCode",
        "addressCountry",
    ]
    .iter()
    .filter_map(|key| {
        let field = addr.get(*key)?;
        let text = match field {
            Value::Object(obj) if obj.contains_key("name") => string_value(&obj["name"]),
            other => string_value(other),
        };
        let text = text.trim().to_string();
        (!text.is_empty()).then_some(text)
    })
    .collect()
}

/// A URL string, an `ImageObject`, or an array of either.
fn image_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.first().map(image_value).unwrap_or_default(),
        Value::Object(obj) => obj
            .get("url")
            .or_else(|| obj.get("contentUrl"))
            .map(string_value)
            .unwrap_or_default(),
        _ => String::new(),
    }
}
