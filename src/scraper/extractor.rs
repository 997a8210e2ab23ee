use regex::Regex;
use tracing::{debug, info, warn};

use super::{non_blank, Automation, CandidateEntry, Record};
use crate::config::ScrapingConfig;
use crate::error::{PlaceScrapeError, PlaceScrapeResult};

/// Average and review count read from one rating label
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rating {
    pub average: f64,
    pub count: u64,
}

/// Parses labels such as `4.5 (1,234)` or `4,7 (87)`
pub struct RatingParser {
    count_token: Regex,
}

impl RatingParser {
    pub fn new() -> Self {
        Self {
            count_token: Regex::new(r"^[(\[]?(\d[\d,.'\u{a0}\u{202f}]*)[)\]]?$")
                .expect("rating count pattern is valid"),
        }
    }

    /// Both values, or nothing when either token does not parse
    pub fn parse(&self, text: &str) -> Option<Rating> {
        let mut tokens = text.split_whitespace();
        let average_token = tokens.next()?;
        let count_token = tokens.next()?;

        let average = average_token.replace(',', ".").parse::<f64>().ok()?;
        if !average.is_finite() || !(0.0..=5.0).contains(&average) {
            return None;
        }

        let digits: String = self
            .count_token
            .captures(count_token)?
            .get(1)?
            .as_str()
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        let count = digits.parse::<u64>().ok()?;

        Some(Rating { average, count })
    }
}

impl Default for RatingParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns feed candidates into records, one detail pane at a time
pub struct RecordExtractor<'a> {
    automation: &'a dyn Automation,
    config: &'a ScrapingConfig,
    rating_parser: RatingParser,
}

impl<'a> RecordExtractor<'a> {
    pub fn new(automation: &'a dyn Automation, config: &'a ScrapingConfig) -> Self {
        Self {
            automation,
            config,
            rating_parser: RatingParser::new(),
        }
    }

    /// Extract every candidate in order, skipping the ones whose detail pane cannot be opened
    pub async fn extract_all(&self, candidates: &[CandidateEntry]) -> Vec<Record> {
        let total = candidates.len();
        let mut records = Vec::with_capacity(total);

        for candidate in candidates {
            match self.extract(candidate).await {
                Ok(record) => {
                    info!(
                        "Scraped {}/{}: {} ({} of {} fields)",
                        candidate.index + 1,
                        total,
                        record.name.as_deref().unwrap_or("<unnamed>"),
                        record.present_fields(),
                        Record::FIELDS.len()
                    );
                    records.push(record);
                }
                Err(e) => {
                    warn!(error_category = e.category(), "{}", e);
                }
            }
        }

        records
    }

    /// Open one candidate and read all of its fields
    pub async fn extract(&self, candidate: &CandidateEntry) -> PlaceScrapeResult<Record> {
        self.automation
            .click(&candidate.selector)
            .await
            .map_err(|e| PlaceScrapeError::RecordExtraction {
                index: candidate.index + 1,
                message: format!("{:#}", e),
            })?;
        tokio::time::sleep(self.config.detail_settle()).await;

        let selectors = &self.config.selectors;

        let name = self.text_field("name", &selectors.name).await;
        let address = self.text_field("address", &selectors.address).await;
        let website = self
            .attribute_field("website", &selectors.website, &selectors.website_attribute)
            .await;
        let phone_number = self.text_field("phone_number", &selectors.phone_number).await;
        let rating = self
            .text_field("rating", &selectors.rating)
            .await
            .and_then(|text| {
                let rating = self.rating_parser.parse(&text);
                if rating.is_none() {
                    debug!(field = "rating", text = %text, "Unparsable rating label");
                }
                rating
            });
        let place_type = self.text_field("place_type", &selectors.place_type).await;
        let opens_at = self.text_field("opens_at", &selectors.opens_at).await;
        let introduction = self.text_field("introduction", &selectors.introduction).await;

        Ok(Record {
            name,
            address,
            website,
            phone_number,
            reviews_count: rating.map(|r| r.count),
            reviews_average: rating.map(|r| r.average),
            place_type,
            opens_at,
            introduction,
        })
    }

    async fn text_field(&self, field: &'static str, selector: &str) -> Option<String> {
        match self.automation.read_text(selector).await {
            Ok(text) => text.and_then(non_blank),
            Err(e) => {
                debug!(field, error = %e, "Field not available");
                None
            }
        }
    }

    async fn attribute_field(&self, field: &'static str, selector: &str, attribute: &str) -> Option<String> {
        match self.automation.read_attribute(selector, attribute).await {
            Ok(value) => value.and_then(non_blank),
            Err(e) => {
                debug!(field, error = %e, "Field not available");
                None
            }
        }
    }
}
