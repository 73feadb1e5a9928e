//! Core types for episode-harvest

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::sort_key;

/// A show to process: its catalog key and detail page
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowTarget {
    /// Show title (catalog key)
    pub title: String,
    /// Detail/player page URL
    pub url: String,
}

impl ShowTarget {
    /// Create a new show target
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

/// How to reach an episode's playback context
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationTarget {
    /// The episode has its own URL
    Url(String),
    /// The episode is reached by clicking its item in the show's listing
    Listing {
        /// Show detail page
        show_url: String,
        /// Page option label when the listing is paginated
        page: Option<String>,
        /// Episode label to click
        label: String,
    },
}

/// One episode found by the enumerator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnumeratedEpisode {
    /// Episode label as displayed (e.g. "EP 12")
    pub label: String,
    /// Numeric sort key derived from the label
    pub sort_key: f64,
    /// Where the episode plays
    pub target: NavigationTarget,
}

impl EnumeratedEpisode {
    /// Create an enumerated episode, deriving its sort key from the label
    pub fn new(label: impl Into<String>, target: NavigationTarget) -> Self {
        let label = label.into();
        Self {
            sort_key: sort_key(&label),
            label,
            target,
        }
    }
}

/// Per-show processing stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ShowStage {
    /// Show is known but not yet visited
    Discovered,
    /// Episode listing has been read
    Enumerated,
    /// Episodes to resolve have been selected
    DeltaComputed,
    /// Resolving episode `done + 1` of `total`
    Resolving {
        /// Episodes finished so far
        done: usize,
        /// Episodes selected for this run
        total: usize,
    },
    /// New episodes merged into the catalog
    Merged,
    /// Catalog written to disk
    Persisted,
}

/// Final status of one show in a run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShowStatus {
    /// Every selected episode resolved (including the case of nothing new)
    Complete,
    /// Some selected episodes failed to resolve
    Partial,
    /// The listing could not be read at all
    EnumerationFailed,
    /// The run was cancelled while this show was in progress
    Cancelled,
}

/// An episode that could not be resolved in this run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEpisode {
    /// Episode label
    pub label: String,
    /// Machine-readable error code
    pub code: String,
    /// Error message
    pub message: String,
}

/// Per-show counts for a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShowReport {
    /// Show title
    pub title: String,
    /// Episodes found in the listing
    pub enumerated: usize,
    /// Episodes already in the catalog
    pub skipped_known: usize,
    /// New episodes left for a later run by the batch limit
    pub deferred: usize,
    /// Episodes resolved and merged in this run
    pub resolved: usize,
    /// Episodes that failed to resolve
    pub failed: Vec<FailedEpisode>,
    /// Final status
    pub status: ShowStatus,
}

impl ShowReport {
    /// An empty report for `title`
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            enumerated: 0,
            skipped_known: 0,
            deferred: 0,
            resolved: 0,
            failed: Vec::new(),
            status: ShowStatus::Complete,
        }
    }
}

/// Summary of a whole run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
    /// One report per processed show, in processing order
    pub shows: Vec<ShowReport>,
    /// Whether the run stopped early because of cancellation
    pub cancelled: bool,
}

impl RunSummary {
    /// Episodes resolved across all shows
    pub fn total_resolved(&self) -> usize {
        self.shows.iter().map(|s| s.resolved).sum()
    }

    /// Episodes that failed across all shows
    pub fn total_failed(&self) -> usize {
        self.shows.iter().map(|s| s.failed.len()).sum()
    }
}

/// Event emitted during a run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A run started
    RunStarted {
        /// Number of shows to process
        shows: usize,
    },

    /// A show moved to a new stage
    StageChanged {
        /// Show title
        title: String,
        /// New stage
        stage: ShowStage,
    },

    /// An episode resolved
    EpisodeResolved {
        /// Show title
        title: String,
        /// Episode label
        label: String,
        /// Number of variants found
        variants: usize,
    },

    /// An episode failed to resolve
    EpisodeFailed {
        /// Show title
        title: String,
        /// Episode label
        label: String,
        /// Error message
        error: String,
    },

    /// A show's results were written to the catalog file
    ShowPersisted {
        /// Show title
        title: String,
        /// Episodes added
        added: usize,
    },

    /// The run was cancelled
    Cancelled,

    /// The run finished
    RunFinished {
        /// Episodes resolved across all shows
        resolved: usize,
        /// Episodes that failed across all shows
        failed: usize,
    },
}
