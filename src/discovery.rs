//! Show discovery
//!
//! Finds which shows to process. The site's landing page embeds its state as
//! a JavaScript object literal; the `latestShow` array in it lists recently
//! updated shows with their English title and watch URI.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::config::DiscoveryConfig;
use crate::enumerator::absolute_url;
use crate::error::{Error, Result};
use crate::types::ShowTarget;

#[allow(clippy::unwrap_used)]
static LATEST_SHOWS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)latestShow:(\[.*?\]),trendingShow").unwrap());

#[allow(clippy::unwrap_used)]
static SHOW_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*?\}").unwrap());

#[allow(clippy::unwrap_used)]
static TITLE_EN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"title_en:"((?:[^"\\]|\\.)*)""#).unwrap());

#[allow(clippy::unwrap_used)]
static WATCH_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"watch_uri:"((?:[^"\\]|\\.)*)""#).unwrap());

/// Source of the shows a run should process
///
/// # Examples
///
/// ```no_run
/// use episode_harvest::config::DiscoveryConfig;
/// use episode_harvest::discovery::{LatestShowDiscovery, ShowDiscovery};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let discovery = LatestShowDiscovery::new(&DiscoveryConfig::default())?;
/// for show in discovery.discover().await? {
///     println!("{} -> {}", show.title, show.url);
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ShowDiscovery: Send + Sync {
    /// List the shows to process, in processing order
    async fn discover(&self) -> Result<Vec<ShowTarget>>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// A fixed list of shows
#[derive(Clone, Debug, Default)]
pub struct FixedShows(pub Vec<ShowTarget>);

#[async_trait]
impl ShowDiscovery for FixedShows {
    async fn discover(&self) -> Result<Vec<ShowTarget>> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Reads the `latestShow` list embedded in the site's landing page
pub struct LatestShowDiscovery {
    http_client: reqwest::Client,
    base_url: String,
}

impl LatestShowDiscovery {
    /// Create a discovery client for the configured site
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &DiscoveryConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl ShowDiscovery for LatestShowDiscovery {
    async fn discover(&self) -> Result<Vec<ShowTarget>> {
        tracing::debug!(url = %self.base_url, "Fetching landing page");

        let response = self.http_client.get(&self.base_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Other(format!(
                "landing page returned HTTP {}: {}",
                status.as_u16(),
                self.base_url
            )));
        }

        let html = response.text().await?;
        let shows = parse_latest_shows(&html, &self.base_url)?;
        tracing::info!(shows = shows.len(), "Discovered shows from landing page");
        Ok(shows)
    }

    fn name(&self) -> &'static str {
        "latest-show"
    }
}

/// Extract the shows listed in the page's `latestShow` array
///
/// Entries missing a title or watch URI are skipped. A title listed twice
/// keeps its first position and its last URI.
///
/// # Errors
///
/// Returns `UnexpectedPageShape` when the page has no `latestShow` array.
pub fn parse_latest_shows(html: &str, base_url: &str) -> Result<Vec<ShowTarget>> {
    let block = LATEST_SHOWS
        .captures(html)
        .and_then(|c| c.get(1))
        .ok_or_else(|| Error::UnexpectedPageShape("no latestShow block in landing page".into()))?;

    let mut shows: Vec<ShowTarget> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for object in SHOW_OBJECT.find_iter(block.as_str()) {
        let field = |re: &Regex| {
            re.captures(object.as_str())
                .and_then(|c| c.get(1))
                .map(|m| unescape_js(m.as_str()).trim().to_string())
        };
        let (Some(title), Some(uri)) = (field(&TITLE_EN), field(&WATCH_URI)) else {
            continue;
        };
        if title.is_empty() || uri.is_empty() {
            continue;
        }

        let show = ShowTarget::new(title, absolute_url(base_url, &uri));
        match positions.get(&show.title) {
            Some(&index) => shows[index] = show,
            None => {
                positions.insert(show.title.clone(), shows.len());
                shows.push(show);
            }
        }
    }

    Ok(shows)
}

/// Decode the escapes of a JavaScript string literal body
fn unescape_js(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
