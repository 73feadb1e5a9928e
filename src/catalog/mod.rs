//! Catalog data model and persistence
//!
//! The catalog maps show titles to their known episodes and each episode's
//! playable sources. Titles are the only identity the site exposes, so they
//! are the key: a show scraped again under the same title merges into the
//! existing record.
//!
//! Episodes inside a show are kept newest first (descending [`sort_key`]).

mod store;

pub use store::CatalogStore;

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::types::ShowTarget;

#[allow(clippy::unwrap_used)]
static FIRST_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

/// Numeric sort key for an episode label
///
/// The key is the number formed by the first run of digits in the label,
/// including a fractional part directly after it ("EP 12.5" → 12.5). A label
/// without digits sorts as 0.
pub fn sort_key(label: &str) -> f64 {
    FIRST_NUMBER
        .find(label)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Tag naming one playback variant of an episode
///
/// Serialized as its upper-case name (`SUB`, `DUB`, `ES`, `RAW`, ...).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum VariantTag {
    /// Original audio with subtitles
    Sub,
    /// Dubbed audio
    Dub,
    /// Another language, by short code (e.g. "ES")
    Language(String),
    /// Host that ignores language selection; stored as served
    Raw,
}

impl VariantTag {
    /// Tag for a language short code
    pub fn language(code: impl Into<String>) -> Self {
        VariantTag::Language(code.into().to_ascii_uppercase())
    }

    /// The serialized name of this tag
    pub fn as_str(&self) -> &str {
        match self {
            VariantTag::Sub => "SUB",
            VariantTag::Dub => "DUB",
            VariantTag::Language(code) => code,
            VariantTag::Raw => "RAW",
        }
    }
}

impl fmt::Display for VariantTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariantTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "SUB" => Ok(VariantTag::Sub),
            "DUB" => Ok(VariantTag::Dub),
            "RAW" => Ok(VariantTag::Raw),
            "" => Err("variant tag cannot be empty".to_string()),
            code => Ok(VariantTag::Language(code.to_string())),
        }
    }
}

impl From<VariantTag> for String {
    fn from(tag: VariantTag) -> Self {
        tag.as_str().to_string()
    }
}

impl TryFrom<String> for VariantTag {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Variant tag → source URL
pub type VariantMap = BTreeMap<VariantTag, String>;

/// One resolved episode
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    /// Episode label as displayed on the site
    pub label: String,
    /// Playable sources by variant
    pub servers: VariantMap,
}

impl Episode {
    /// Create an episode from its label and variants
    pub fn new(label: impl Into<String>, servers: VariantMap) -> Self {
        Self {
            label: label.into(),
            servers,
        }
    }

    /// Numeric sort key of this episode's label
    pub fn sort_key(&self) -> f64 {
        sort_key(&self.label)
    }
}

/// One show and the episodes resolved for it so far
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Show {
    /// Show title (catalog key)
    pub title: String,
    /// Detail page URL
    pub source_url: String,
    /// Episodes, newest first
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

impl Show {
    /// Labels of all episodes already in this show
    pub fn labels(&self) -> HashSet<String> {
        self.episodes.iter().map(|e| e.label.clone()).collect()
    }

    fn sort_episodes(&mut self) {
        self.episodes.sort_by(|a, b| {
            b.sort_key()
                .total_cmp(&a.sort_key())
                .then_with(|| a.label.cmp(&b.label))
        });
    }
}

/// The full set of known shows, keyed by title
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Catalog {
    shows: BTreeMap<String, Show>,
}

impl Catalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from show records
    ///
    /// Records sharing a title are merged. Episodes without any variant are
    /// dropped, so they are picked up again by the next run.
    pub fn from_shows(shows: impl IntoIterator<Item = Show>) -> Self {
        let mut catalog = Self::new();
        for show in shows {
            let target = ShowTarget::new(show.title.clone(), show.source_url.clone());
            let episodes: Vec<Episode> = show
                .episodes
                .into_iter()
                .filter(|episode| {
                    let keep = !episode.servers.is_empty();
                    if !keep {
                        tracing::warn!(
                            show = %show.title,
                            label = %episode.label,
                            "Dropping stored episode without sources"
                        );
                    }
                    keep
                })
                .collect();
            catalog.merge(&target, episodes);
        }
        catalog
    }

    /// Number of shows
    pub fn len(&self) -> usize {
        self.shows.len()
    }

    /// Whether the catalog has no shows
    pub fn is_empty(&self) -> bool {
        self.shows.is_empty()
    }

    /// Look up a show by title
    pub fn get(&self, title: &str) -> Option<&Show> {
        self.shows.get(title)
    }

    /// All shows, sorted by title
    pub fn shows(&self) -> impl Iterator<Item = &Show> {
        self.shows.values()
    }

    /// Labels already resolved for `title` (empty for an unknown show)
    pub fn known_labels(&self, title: &str) -> HashSet<String> {
        self.shows.get(title).map(Show::labels).unwrap_or_default()
    }

    /// Merge newly resolved episodes into the show for `target`
    ///
    /// The show is created if it is not known yet, even with no episodes.
    /// Episodes whose label already exists contribute only the variants the
    /// stored episode lacks. Returns the number of episodes added.
    pub fn merge(&mut self, target: &ShowTarget, episodes: Vec<Episode>) -> usize {
        let show = self
            .shows
            .entry(target.title.clone())
            .or_insert_with(|| Show {
                title: target.title.clone(),
                source_url: target.url.clone(),
                episodes: Vec::new(),
            });

        if !target.url.is_empty() && show.source_url != target.url {
            tracing::debug!(
                show = %target.title,
                old = %show.source_url,
                new = %target.url,
                "Updating show source URL"
            );
            show.source_url = target.url.clone();
        }

        let mut added = 0;
        for episode in episodes {
            match show.episodes.iter_mut().find(|e| e.label == episode.label) {
                Some(existing) => {
                    for (tag, url) in episode.servers {
                        existing.servers.entry(tag).or_insert(url);
                    }
                }
                None => {
                    show.episodes.push(episode);
                    added += 1;
                }
            }
        }

        show.sort_episodes();
        added
    }
}

impl Serialize for Catalog {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(self.shows.values())
    }
}
