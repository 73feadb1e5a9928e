//! Configuration types for episode-harvest

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Main configuration for the harvesting pipeline
///
/// Fields are organized into logical sub-configs:
/// - [`timeouts`](TimeoutConfig) - bounds for every navigation and element wait
/// - [`retry`](RetryConfig) - backoff for transient navigation failures
/// - [`resolver`](ResolverConfig) - player and language-selector markup
/// - [`strategies`](ListingStrategy) - ordered episode-listing layouts
/// - [`persistence`](PersistenceConfig) - catalog file location
/// - [`discovery`](DiscoveryConfig) - landing page used to find shows
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Maximum number of new episodes resolved per show per run (default: 10, 0 = unbounded)
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,

    /// Number of shows processed concurrently, each in its own browsing context (default: 1)
    #[serde(default = "default_max_concurrent_shows")]
    pub max_concurrent_shows: usize,

    /// Wait bounds
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Retry behavior for navigation
    #[serde(default)]
    pub retry: RetryConfig,

    /// Source resolution settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Episode listing layouts, tried in order
    #[serde(default = "default_strategies")]
    pub strategies: Vec<ListingStrategy>,

    /// Catalog storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Show discovery
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_batch: default_max_batch(),
            max_concurrent_shows: default_max_concurrent_shows(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            resolver: ResolverConfig::default(),
            strategies: default_strategies(),
            persistence: PersistenceConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl Config {
    /// Check the configuration for values the pipeline cannot work with
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_shows == 0 {
            return Err(config_error(
                "max_concurrent_shows must be at least 1",
                "max_concurrent_shows",
            ));
        }
        if self.strategies.is_empty() {
            return Err(config_error(
                "at least one listing strategy is required",
                "strategies",
            ));
        }
        for strategy in &self.strategies {
            if strategy.container.trim().is_empty() || strategy.item.trim().is_empty() {
                return Err(config_error(
                    format!("strategy '{}' needs container and item selectors", strategy.name),
                    "strategies",
                ));
            }
            if strategy.page_selector.is_some() != strategy.page_option.is_some() {
                return Err(config_error(
                    format!(
                        "strategy '{}' must set page_selector and page_option together",
                        strategy.name
                    ),
                    "strategies",
                ));
            }
        }
        if self.timeouts.poll_interval.is_zero() {
            return Err(config_error(
                "poll_interval must be greater than zero",
                "timeouts.poll_interval",
            ));
        }
        if self.timeouts.poll_interval >= self.timeouts.element {
            return Err(config_error(
                "poll_interval must be shorter than the element timeout",
                "timeouts.poll_interval",
            ));
        }
        if self.resolver.player.trim().is_empty() {
            return Err(config_error(
                "player selector cannot be empty",
                "resolver.player",
            ));
        }
        if self.persistence.catalog_path.as_os_str().is_empty() {
            return Err(config_error(
                "catalog_path cannot be empty",
                "persistence.catalog_path",
            ));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>, key: &str) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.to_string()),
    }
}

/// Bounds for every wait the pipeline performs
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Page navigation bound (default: 60 seconds)
    #[serde(default = "default_navigation_timeout", with = "duration_serde")]
    pub navigation: Duration,

    /// Bound for an element to attach (default: 20 seconds)
    #[serde(default = "default_element_timeout", with = "duration_serde")]
    pub element: Duration,

    /// Bound for the previous listing page to detach after a page switch (default: 15 seconds)
    #[serde(default = "default_page_change_timeout", with = "duration_serde")]
    pub page_change: Duration,

    /// Delay between polls inside a bounded wait (default: 250 milliseconds)
    #[serde(default = "default_poll_interval", with = "millis_serde")]
    pub poll_interval: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation: default_navigation_timeout(),
            element: default_element_timeout(),
            page_change: default_page_change_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

/// Retry configuration with exponential backoff
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 2)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "millis_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "millis_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Player and language-selector markup used by the source resolver
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Selector for player elements carrying the source URL
    #[serde(default = "default_player")]
    pub player: String,

    /// Attribute on the player element that holds the source URL (default: "src")
    #[serde(default = "default_source_attribute")]
    pub source_attribute: String,

    /// Player sources containing any of these substrings are skipped (comment widgets etc.)
    #[serde(default = "default_ignored_sources")]
    pub ignored_sources: Vec<String>,

    /// Selector for the control that opens the language/server menu
    #[serde(default = "default_language_control")]
    pub language_control: String,

    /// Selector for the options inside the opened language menu
    #[serde(default = "default_language_option")]
    pub language_option: String,

    /// Element clicked to dismiss an open menu
    #[serde(default = "default_dismiss_target")]
    pub dismiss_target: String,

    /// Query parameter that carries the language selection (default: "ln")
    #[serde(default = "default_language_param")]
    pub language_param: String,

    /// Player hosts that honor the language parameter
    ///
    /// Sources served from any other host are additionally recorded under the
    /// RAW tag.
    #[serde(default = "default_multi_language_hosts")]
    pub multi_language_hosts: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            player: default_player(),
            source_attribute: default_source_attribute(),
            ignored_sources: default_ignored_sources(),
            language_control: default_language_control(),
            language_option: default_language_option(),
            dismiss_target: default_dismiss_target(),
            language_param: default_language_param(),
            multi_language_hosts: default_multi_language_hosts(),
        }
    }
}

/// One selector scheme for an episode listing layout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingStrategy {
    /// Name used in logs
    pub name: String,

    /// Selector whose presence means the listing has rendered
    pub container: String,

    /// Selector matching each episode item
    pub item: String,

    /// Selector, relative to the item, for the label text (None = item text)
    #[serde(default)]
    pub label: Option<String>,

    /// Selector, relative to the item, for the link element (None = the item itself)
    #[serde(default)]
    pub link: Option<String>,

    /// Attribute holding the episode URL on the link element
    #[serde(default = "default_href_attribute")]
    pub href_attribute: String,

    /// Selector for the page-selector control (None = listing is never paginated)
    #[serde(default)]
    pub page_selector: Option<String>,

    /// Selector for the options of the opened page selector
    #[serde(default)]
    pub page_option: Option<String>,
}

/// Catalog storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Catalog file path (default: "./catalog.json")
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
        }
    }
}

/// Landing-page show discovery configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Site root; watch URIs are joined onto it
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User agent sent with discovery requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout (default: 120 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_max_batch() -> usize {
    10
}

fn default_max_concurrent_shows() -> usize {
    1
}

fn default_navigation_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_element_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_page_change_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_player() -> String {
    "div.player-container iframe".to_string()
}

fn default_source_attribute() -> String {
    "src".to_string()
}

fn default_ignored_sources() -> Vec<String> {
    vec!["disqus".to_string()]
}

fn default_language_control() -> String {
    "div.server-select div.v-select__slot".to_string()
}

fn default_language_option() -> String {
    "div.v-menu__content div.v-list-item__title".to_string()
}

fn default_dismiss_target() -> String {
    "body".to_string()
}

fn default_language_param() -> String {
    "ln".to_string()
}

fn default_multi_language_hosts() -> Vec<String> {
    vec!["krussdomi.com".to_string()]
}

fn default_href_attribute() -> String {
    "href".to_string()
}

fn default_strategies() -> Vec<ListingStrategy> {
    vec![
        ListingStrategy {
            name: "chip-grid".to_string(),
            container: "div.episode-item".to_string(),
            item: "div.episode-item".to_string(),
            label: Some("span.v-chip__content".to_string()),
            link: Some("a".to_string()),
            href_attribute: default_href_attribute(),
            page_selector: Some("div.episode-pages div.v-select__slot".to_string()),
            page_option: Some("div.v-menu__content div.v-list-item__title".to_string()),
        },
        ListingStrategy {
            name: "anchor-list".to_string(),
            container: "ul.episode-list".to_string(),
            item: "ul.episode-list a.episode-link".to_string(),
            label: None,
            link: None,
            href_attribute: default_href_attribute(),
            page_selector: None,
            page_option: None,
        },
    ]
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("./catalog.json")
}

fn default_base_url() -> String {
    "https://kickass-anime.ru".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/91.0.4472.124 Safari/537.36"
        .to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(120)
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
