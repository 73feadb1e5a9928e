//! Per-show work: enumerate, pick the delta, resolve each episode.
//!
//! A show task never touches the catalog. It gets the labels already known
//! for its show and hands back a [`ShowOutcome`]; merging and persisting are
//! left to the orchestrating task.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::catalog::Episode;
use crate::delta;
use crate::enumerator::EpisodeEnumerator;
use crate::error::Error;
use crate::resolver::SourceResolver;
use crate::surface::RenderSurface;
use crate::types::{Event, FailedEpisode, ShowReport, ShowStage, ShowStatus, ShowTarget};

/// Everything a show task needs, shareable across spawned tasks
#[derive(Clone)]
pub(crate) struct ShowTaskContext {
    pub(crate) enumerator: Arc<EpisodeEnumerator>,
    pub(crate) resolver: Arc<SourceResolver>,
    pub(crate) max_batch: usize,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) cancel_token: CancellationToken,
}

impl ShowTaskContext {
    fn emit(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    fn stage(&self, title: &str, stage: ShowStage) {
        self.emit(Event::StageChanged {
            title: title.to_string(),
            stage,
        });
    }
}

/// Result of processing one show
#[derive(Debug)]
pub(crate) struct ShowOutcome {
    pub(crate) target: ShowTarget,
    pub(crate) report: ShowReport,
    /// Newly resolved episodes, newest first
    pub(crate) episodes: Vec<Episode>,
    /// Error that must stop the run
    pub(crate) fatal: Option<Error>,
}

impl ShowOutcome {
    fn new(target: ShowTarget) -> Self {
        Self {
            report: ShowReport::new(target.title.clone()),
            target,
            episodes: Vec::new(),
            fatal: None,
        }
    }

    /// Outcome of a show that could not start because the surface is gone
    pub(crate) fn unavailable(target: ShowTarget, error: Error) -> Self {
        let mut outcome = Self::new(target);
        outcome.report.status = ShowStatus::EnumerationFailed;
        outcome.fatal = Some(error);
        outcome
    }
}

/// Process one show on `surface`
pub(crate) async fn run_show_task(
    ctx: &ShowTaskContext,
    surface: &dyn RenderSurface,
    target: ShowTarget,
    known: HashSet<String>,
) -> ShowOutcome {
    let mut outcome = ShowOutcome::new(target);
    let title = outcome.target.title.clone();

    ctx.stage(&title, ShowStage::Discovered);
    tracing::debug!(show = %title, url = %outcome.target.url, surface = surface.name(), "Processing show");

    let enumerated = tokio::select! {
        biased;
        _ = ctx.cancel_token.cancelled() => {
            outcome.report.status = ShowStatus::Cancelled;
            return outcome;
        }
        result = ctx.enumerator.enumerate(surface, &outcome.target) => result,
    };

    let enumerated = match enumerated {
        Ok(episodes) => episodes,
        Err(e) => {
            tracing::warn!(show = %title, error = %e, "Failed to enumerate episodes");
            outcome.report.status = ShowStatus::EnumerationFailed;
            if e.is_fatal() {
                outcome.fatal = Some(e);
            }
            return outcome;
        }
    };
    outcome.report.enumerated = enumerated.len();
    ctx.stage(&title, ShowStage::Enumerated);

    let delta = delta::select(enumerated, &known, ctx.max_batch);
    outcome.report.skipped_known = delta.skipped_known;
    outcome.report.deferred = delta.deferred;
    ctx.stage(&title, ShowStage::DeltaComputed);

    if delta.deferred > 0 {
        tracing::info!(
            show = %title,
            deferred = delta.deferred,
            "Batch limit reached, remaining episodes left for a later run"
        );
    }

    let total = delta.selected.len();
    for (done, episode) in delta.selected.iter().enumerate() {
        if ctx.cancel_token.is_cancelled() {
            outcome.report.status = ShowStatus::Cancelled;
            break;
        }
        ctx.stage(&title, ShowStage::Resolving { done, total });

        let resolved = tokio::select! {
            biased;
            _ = ctx.cancel_token.cancelled() => None,
            result = ctx.resolver.resolve(surface, episode) => Some(result),
        };
        let Some(resolved) = resolved else {
            tracing::info!(show = %title, label = %episode.label, "Abandoned episode on cancellation");
            outcome.report.status = ShowStatus::Cancelled;
            break;
        };

        match resolved {
            Ok(servers) => {
                ctx.emit(Event::EpisodeResolved {
                    title: title.clone(),
                    label: episode.label.clone(),
                    variants: servers.len(),
                });
                outcome
                    .episodes
                    .push(Episode::new(episode.label.clone(), servers));
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(show = %title, label = %episode.label, error = %e, "Render surface lost");
                outcome.fatal = Some(e);
                break;
            }
            Err(e) => {
                tracing::warn!(show = %title, label = %episode.label, error = %e, "Failed to resolve episode");
                ctx.emit(Event::EpisodeFailed {
                    title: title.clone(),
                    label: episode.label.clone(),
                    error: e.to_string(),
                });
                outcome.report.failed.push(FailedEpisode {
                    label: episode.label.clone(),
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    outcome.report.resolved = outcome.episodes.len();
    if outcome.report.status == ShowStatus::Complete
        && (!outcome.report.failed.is_empty() || outcome.fatal.is_some())
    {
        outcome.report.status = ShowStatus::Partial;
    }
    outcome
}
