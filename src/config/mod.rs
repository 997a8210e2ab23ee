use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub scraping: ScrapingConfig,
    pub jobs: JobsConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

/// Browser driving and timing settings for one extraction run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingConfig {
    pub search_url: String,
    pub headless: bool,
    pub navigation_timeout_ms: u64,
    pub selector_timeout_ms: u64,
    pub page_load_settle_ms: u64,
    pub search_settle_ms: u64,
    pub scroll_settle_ms: u64,
    pub detail_settle_ms: u64,
    pub max_scroll_iterations: usize,
    pub selectors: SelectorConfig,
}

/// CSS selectors for every element the pipeline touches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub search_box: String,
    pub feed: String,
    pub feed_entry: String,
    pub name: String,
    pub address: String,
    pub website: String,
    pub website_attribute: String,
    pub phone_number: String,
    pub rating: String,
    pub place_type: String,
    pub opens_at: String,
    pub introduction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    pub max_concurrent_jobs: usize,
    pub max_queued_jobs: usize,
    pub max_query_length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub results_directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub json_format: bool,
    pub max_files: usize,
    pub log_directory: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = get_data_directory();

        Self {
            scraping: ScrapingConfig::default(),
            jobs: JobsConfig {
                max_concurrent_jobs: 3,
                max_queued_jobs: 100,
                max_query_length: 500,
            },
            storage: StorageConfig {
                backend: StorageBackend::File,
                results_directory: data_dir.join("results"),
            },
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                enable_cors: true,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_enabled: true,
                console_enabled: true,
                json_format: false,
                max_files: 5,
                log_directory: data_dir.join("logs"),
            },
        }
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            search_url: "https://www.google.com/maps".to_string(),
            headless: true,
            navigation_timeout_ms: 60_000,
            selector_timeout_ms: 10_000,
            page_load_settle_ms: 2_000,
            search_settle_ms: 3_000,
            scroll_settle_ms: 2_000,
            detail_settle_ms: 2_000,
            max_scroll_iterations: 50,
            selectors: SelectorConfig::default(),
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            search_box: r#"input[id="searchboxinput"]"#.to_string(),
            feed: r#"div[role="feed"]"#.to_string(),
            feed_entry: r#"div[role="feed"] > div > div > a"#.to_string(),
            name: "h1".to_string(),
            address: r#"button[data-item-id="address"]"#.to_string(),
            website: r#"a[data-item-id="authority"]"#.to_string(),
            website_attribute: "href".to_string(),
            phone_number: r#"button[data-item-id^="phone:tel:"]"#.to_string(),
            rating: "div.F7nice".to_string(),
            place_type: r#"button[jsaction*="category"]"#.to_string(),
            opens_at: r#"button[data-item-id="oh"] div.fontBodyMedium"#.to_string(),
            introduction: "div.WeS02d.fontBodyMedium div.PYvSYb".to_string(),
        }
    }
}

impl ScrapingConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.selector_timeout_ms)
    }

    pub fn page_load_settle(&self) -> Duration {
        Duration::from_millis(self.page_load_settle_ms)
    }

    pub fn search_settle(&self) -> Duration {
        Duration::from_millis(self.search_settle_ms)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }

    pub fn detail_settle(&self) -> Duration {
        Duration::from_millis(self.detail_settle_ms)
    }

    /// Same settings with every settle delay removed
    pub fn without_settle_delays(mut self) -> Self {
        self.page_load_settle_ms = 0;
        self.search_settle_ms = 0;
        self.scroll_settle_ms = 0;
        self.detail_settle_ms = 0;
        self
    }
}

impl SelectorConfig {
    fn entries(&self) -> [(&'static str, &str); 12] {
        [
            ("search_box", self.search_box.as_str()),
            ("feed", self.feed.as_str()),
            ("feed_entry", self.feed_entry.as_str()),
            ("name", self.name.as_str()),
            ("address", self.address.as_str()),
            ("website", self.website.as_str()),
            ("website_attribute", self.website_attribute.as_str()),
            ("phone_number", self.phone_number.as_str()),
            ("rating", self.rating.as_str()),
            ("place_type", self.place_type.as_str()),
            ("opens_at", self.opens_at.as_str()),
            ("introduction", self.introduction.as_str()),
        ]
    }
}

impl AppConfig {
    /// Load configuration from default locations
    pub async fn load() -> Result<Self> {
        let config_path = get_config_path();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path).await?
        } else {
            info!("No configuration file found, using defaults");
            let config = Self::default();
            config.save().await?;
            config
        };

        ConfigOverrides::apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from specific file
    pub async fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to default location
    pub async fn save(&self) -> Result<()> {
        let config_path = get_config_path();

        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(&config_path, content).await?;

        info!("Configuration saved to: {}", config_path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let scraping = &self.scraping;

        url::Url::parse(&scraping.search_url)
            .map_err(|e| anyhow::anyhow!("Scraping search_url is not a valid URL: {}", e))?;

        if scraping.navigation_timeout_ms == 0 || scraping.selector_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Scraping timeouts must be > 0"));
        }

        if scraping.max_scroll_iterations == 0 {
            return Err(anyhow::anyhow!("Scraping max_scroll_iterations must be > 0"));
        }

        for (name, selector) in scraping.selectors.entries() {
            if selector.trim().is_empty() {
                return Err(anyhow::anyhow!("Selector '{}' must not be empty", name));
            }
        }

        if self.jobs.max_concurrent_jobs == 0 {
            return Err(anyhow::anyhow!("Jobs max_concurrent_jobs must be > 0"));
        }

        if self.jobs.max_queued_jobs == 0 {
            return Err(anyhow::anyhow!("Jobs max_queued_jobs must be > 0"));
        }

        if self.jobs.max_query_length == 0 {
            return Err(anyhow::anyhow!("Jobs max_query_length must be > 0"));
        }

        if self.api.port == 0 {
            return Err(anyhow::anyhow!("API port must be > 0"));
        }

        Ok(())
    }

    /// Ensure all required directories exist
    pub async fn ensure_directories(&self) -> Result<()> {
        let mut dirs_to_create = vec![self.logging.log_directory.clone()];
        if self.storage.backend == StorageBackend::File {
            dirs_to_create.push(self.storage.results_directory.clone());
        }

        for dir in dirs_to_create {
            if !dir.exists() {
                tokio::fs::create_dir_all(&dir).await?;
                info!("Created directory: {}", dir.display());
            }
        }

        Ok(())
    }
}

/// Get the default data directory
fn get_data_directory() -> PathBuf {
    directories::ProjectDirs::from("com", "placescrape", "placescrape")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default().join("data"))
}

/// Get the configuration file path
fn get_config_path() -> PathBuf {
    directories::ProjectDirs::from("com", "placescrape", "placescrape")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default().join("config.toml"))
}

/// Environment-based configuration overrides
pub struct ConfigOverrides;

impl ConfigOverrides {
    /// Apply environment variable overrides to configuration
    pub fn apply(config: &mut AppConfig) {
        if let Ok(headless_str) = std::env::var("PLACESCRAPE_HEADLESS") {
            config.scraping.headless = headless_str.to_lowercase() != "false";
        }

        if let Ok(concurrent_str) = std::env::var("PLACESCRAPE_MAX_CONCURRENT_JOBS") {
            if let Ok(concurrent) = concurrent_str.parse::<usize>() {
                config.jobs.max_concurrent_jobs = concurrent;
            }
        }

        if let Ok(results_dir) = std::env::var("PLACESCRAPE_RESULTS_DIR") {
            config.storage.results_directory = PathBuf::from(results_dir);
        }

        if let Ok(api_host) = std::env::var("PLACESCRAPE_API_HOST") {
            config.api.host = api_host;
        }

        // PORT is honoured for parity with common hosting environments
        for key in ["PLACESCRAPE_API_PORT", "PORT"] {
            if let Ok(api_port_str) = std::env::var(key) {
                if let Ok(api_port) = api_port_str.parse::<u16>() {
                    config.api.port = api_port;
                    break;
                }
            }
        }

        if let Ok(log_level) = std::env::var("PLACESCRAPE_LOG_LEVEL") {
            config.logging.level = log_level;
        }

        info!("Applied environment variable overrides");
    }
}
