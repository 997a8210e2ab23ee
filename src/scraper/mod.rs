use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod browser;
pub mod collector;
pub mod extractor;
pub mod session;

#[cfg(test)]
pub mod testing;

pub use collector::{Collection, CollectionOutcome, ResultCollector};
pub use extractor::RecordExtractor;
pub use session::BrowserSession;

/// Browser page operations the pipeline relies on.
///
/// Implementations own one page of one browser instance. Every method is
/// engine-agnostic so the collector and extractor can run against a fake.
#[async_trait]
pub trait Automation: Send + Sync {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    async fn fill(&self, selector: &str, text: &str) -> Result<()>;

    /// Press a key on whatever element currently has focus
    async fn press_key(&self, key: &str) -> Result<()>;

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Scroll the first element matching `selector` to its current bottom
    async fn scroll_to_bottom(&self, selector: &str) -> Result<()>;

    /// Inner text of the first match, `None` when nothing matches
    async fn read_text(&self, selector: &str) -> Result<Option<String>>;

    /// Attribute of the first match, `None` when the element or attribute is missing
    async fn read_attribute(&self, selector: &str, name: &str) -> Result<Option<String>>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn count_matches(&self, selector: &str) -> Result<usize>;

    /// Shut down the page and everything the implementation launched for it
    async fn close(&self) -> Result<()>;
}

/// Opens fresh, exclusive automation instances, one per job
#[async_trait]
pub trait AutomationLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Automation>>;
}

/// Handle to one entry of the currently rendered results feed.
///
/// Only meaningful while the session that discovered it is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEntry {
    pub index: usize,
    pub selector: String,
}

impl CandidateEntry {
    pub fn new(feed_entry_selector: &str, index: usize) -> Self {
        Self {
            index,
            selector: format!("{} >> nth={}", feed_entry_selector, index),
        }
    }
}

/// One extracted listing. Every field is independently optional.
///
/// Text fields never hold blank strings: blank text is absent, both when
/// extracted and when a record is read or written through serde.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, with = "present_text")]
    pub name: Option<String>,
    #[serde(default, with = "present_text")]
    pub address: Option<String>,
    #[serde(default, with = "present_text")]
    pub website: Option<String>,
    #[serde(default, with = "present_text")]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub reviews_count: Option<u64>,
    #[serde(default)]
    pub reviews_average: Option<f64>,
    #[serde(default, with = "present_text")]
    pub place_type: Option<String>,
    #[serde(default, with = "present_text")]
    pub opens_at: Option<String>,
    #[serde(default, with = "present_text")]
    pub introduction: Option<String>,
}

impl Record {
    /// Column names in export order
    pub const FIELDS: [&'static str; 9] = [
        "name",
        "address",
        "website",
        "phone_number",
        "reviews_count",
        "reviews_average",
        "place_type",
        "opens_at",
        "introduction",
    ];

    /// Number of fields that carry a value
    pub fn present_fields(&self) -> usize {
        [
            self.name.is_some(),
            self.address.is_some(),
            self.website.is_some(),
            self.phone_number.is_some(),
            self.reviews_count.is_some(),
            self.reviews_average.is_some(),
            self.place_type.is_some(),
            self.opens_at.is_some(),
            self.introduction.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }
}

/// Trimmed text, or `None` when nothing but whitespace is left
pub(crate) fn non_blank(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == text.len() {
        Some(text)
    } else {
        Some(trimmed.to_string())
    }
}

mod present_text {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        match value.as_deref().map(str::trim).filter(|text| !text.is_empty()) {
            Some(text) => serializer.serialize_some(text),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<String>::deserialize(deserializer)?.and_then(super::non_blank))
    }
}
