//! Delta selection
//!
//! Picks which enumerated episodes to resolve in this run: the ones whose
//! label is not in the catalog yet, newest first, at most `max_batch` of them.
//! Anything left over is picked up by a later run.

use std::collections::HashSet;

use crate::enumerator::sort_newest_first;
use crate::types::EnumeratedEpisode;

/// Episodes chosen for resolution and what was left out
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Delta {
    /// Episodes to resolve, newest first
    pub selected: Vec<EnumeratedEpisode>,
    /// Enumerated episodes already present in the catalog
    pub skipped_known: usize,
    /// New episodes beyond the batch limit
    pub deferred: usize,
}

impl Delta {
    /// Whether there is nothing to resolve
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

/// Select the episodes of `enumerated` that are not in `known`
///
/// `max_batch == 0` disables the limit.
pub fn select(
    enumerated: Vec<EnumeratedEpisode>,
    known: &HashSet<String>,
    max_batch: usize,
) -> Delta {
    let total = enumerated.len();
    let mut fresh: Vec<_> = enumerated
        .into_iter()
        .filter(|e| !known.contains(&e.label))
        .collect();
    let skipped_known = total - fresh.len();

    sort_newest_first(&mut fresh);

    let deferred = if max_batch > 0 && fresh.len() > max_batch {
        let deferred = fresh.len() - max_batch;
        fresh.truncate(max_batch);
        deferred
    } else {
        0
    };

    Delta {
        selected: fresh,
        skipped_known,
        deferred,
    }
}
