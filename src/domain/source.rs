use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::app::{Result, TributaryError};

pub const DEFAULT_TRUST_LEVEL: u8 = 5;
pub const DEFAULT_MAX_PAGES: u32 = 10;
pub const DEFAULT_SCHEDULE: &str = "manual";

/// Which extraction strategy a source uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    /// Operator-authored CSS selectors, with pagination.
    Selector,
    /// Embedded schema.org JSON-LD records.
    #[default]
    StructuredData,
}

impl Tier {
    pub fn as_u8(self) -> u8 {
        match self {
            Tier::Selector => 1,
            Tier::StructuredData => 2,
        }
    }
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Tier::Selector),
            2 => Ok(Tier::StructuredData),
            other => Err(format!("tier must be 1 or 2, got {}", other)),
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> Self {
        tier.as_u8()
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// CSS selectors for tier 1 sources. Absent selectors leave the field empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_list: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<String>,
}

impl SelectorSet {
    /// The event container selector, if present and non-blank.
    pub fn event_list(&self) -> Option<&str> {
        self.event_list
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// A scrape target.
///
/// `selectors` is last so the TOML encoding keeps it as a trailing table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    pub tier: Tier,
    pub schedule: String,
    pub trust_level: u8,
    pub license: String,
    pub enabled: bool,
    pub max_pages: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selectors: Option<SelectorSet>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            url: String::new(),
            tier: Tier::default(),
            schedule: DEFAULT_SCHEDULE.to_string(),
            trust_level: DEFAULT_TRUST_LEVEL,
            license: String::new(),
            enabled: true,
            max_pages: DEFAULT_MAX_PAGES,
            notes: String::new(),
            selectors: None,
        }
    }
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>, tier: Tier) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            tier,
            ..Default::default()
        }
    }

    /// Fill zero values left by a sparse file and drop selectors a tier 2
    /// source never reads.
    pub fn apply_defaults(&mut self) {
        if self.trust_level == 0 {
            self.trust_level = DEFAULT_TRUST_LEVEL;
        }
        if self.max_pages == 0 {
            self.max_pages = DEFAULT_MAX_PAGES;
        }
        if self.schedule.trim().is_empty() {
            self.schedule = DEFAULT_SCHEDULE.to_string();
        }
        if self.tier == Tier::StructuredData {
            self.selectors = None;
        }
    }

    /// Check every field and report all problems in one error.
    pub fn validate(&self) -> Result<()> {
        let mut errs = Vec::new();

        if self.name.trim().is_empty() {
            errs.push("name: required".to_string());
        }

        if self.url.trim().is_empty() {
            errs.push("url: required".to_string());
        } else {
            let valid = Url::parse(&self.url)
                .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
                .unwrap_or(false);
            if !valid {
                errs.push(format!(
                    "url: must be a valid http/https URL, got {:?}",
                    self.url
                ));
            }
        }

        if !(1..=10).contains(&self.trust_level) {
            errs.push(format!("trust_level: must be 1-10, got {}", self.trust_level));
        }

        if self.max_pages == 0 {
            errs.push("max_pages: must be at least 1".to_string());
        }

        if self.tier == Tier::Selector
            && self
                .selectors
                .as_ref()
                .and_then(SelectorSet::event_list)
                .is_none()
        {
            errs.push("selectors.event_list: required for tier 1".to_string());
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(TributaryError::InvalidSource(format!(
                "{}: {}",
                self.display_name(),
                errs.join("; ")
            )))
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.url
        } else {
            &self.name
        }
    }
}

/// A row of the `scraper_sources` table.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub tier: u8,
    pub schedule: String,
    pub trust_level: u8,
    pub license: String,
    pub enabled: bool,
    pub max_pages: u32,
    /// JSON-encoded [`SelectorSet`]; `None` for tier 2.
    pub selectors: Option<String>,
    pub notes: String,
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SourceRecord {
    /// Decode the row back into a [`SourceConfig`].
    pub fn to_config(&self) -> Result<SourceConfig> {
        let tier = Tier::try_from(self.tier).map_err(|e| {
            TributaryError::InvalidSource(format!("{}: {}", self.name, e))
        })?;

        let selectors = match (&self.selectors, tier) {
            (Some(json), Tier::Selector) if !json.trim().is_empty() => {
                let decoded: SelectorSet = serde_json::from_str(json).map_err(|e| {
                    TributaryError::InvalidSource(format!(
                        "decode selectors for {:?}: {}",
                        self.name, e
                    ))
                })?;
                Some(decoded)
            }
            _ => None,
        };

        Ok(SourceConfig {
            name: self.name.clone(),
            url: self.url.clone(),
            tier,
            schedule: self.schedule.clone(),
            trust_level: self.trust_level,
            license: self.license.clone(),
            enabled: self.enabled,
            max_pages: self.max_pages,
            notes: self.notes.clone(),
            selectors,
        })
    }

    /// Whether the last upsert inserted the row rather than updating it.
    pub fn was_created(&self) -> bool {
        self.updated_at == self.created_at
    }
}

/// Fields written by an upsert keyed on `name`.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceUpsert {
    pub name: String,
    pub url: String,
    pub tier: u8,
    pub schedule: String,
    pub trust_level: u8,
    pub license: String,
    pub enabled: bool,
    pub max_pages: u32,
    pub selectors: Option<String>,
    pub notes: String,
}

impl SourceUpsert {
    /// Encode a config for the store. Selectors are only kept for tier 1.
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let selectors = match (config.tier, &config.selectors) {
            (Tier::Selector, Some(sel)) => Some(serde_json::to_string(sel)?),
            _ => None,
        };

        Ok(Self {
            name: config.name.clone(),
            url: config.url.clone(),
            tier: config.tier.as_u8(),
            schedule: config.schedule.clone(),
            trust_level: config.trust_level,
            license: config.license.clone(),
            enabled: config.enabled,
            max_pages: config.max_pages,
            selectors,
            notes: config.notes.clone(),
        })
    }
}
