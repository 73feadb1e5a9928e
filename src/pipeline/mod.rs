//! Pipeline orchestration
//!
//! Runs every show through enumerate → delta → resolve, then merges the new
//! episodes into the catalog and writes it to disk before moving on. The
//! orchestrating task is the only one that mutates or saves the catalog.
//!
//! With `max_concurrent_shows > 1`, shows run in spawned tasks, each on its
//! own browsing context, and report back over a channel.

mod show_task;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::catalog::{Catalog, CatalogStore};
use crate::config::Config;
use crate::discovery::ShowDiscovery;
use crate::enumerator::EpisodeEnumerator;
use crate::error::{Error, Result};
use crate::resolver::SourceResolver;
use crate::surface::SurfaceFactory;
use crate::types::{Event, RunSummary, ShowReport, ShowStage, ShowTarget};

use show_task::{ShowOutcome, ShowTaskContext, run_show_task};

/// Drives harvesting runs
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use episode_harvest::{Config, Pipeline, ShowTarget};
/// # use episode_harvest::surface::SurfaceFactory;
/// # async fn example(factory: Arc<dyn SurfaceFactory>) -> episode_harvest::Result<()> {
/// let pipeline = Pipeline::new(Config::default(), factory)?;
///
/// let mut events = pipeline.subscribe();
/// tokio::spawn(async move {
///     while let Ok(event) = events.recv().await {
///         println!("{event:?}");
///     }
/// });
///
/// let summary = pipeline
///     .run(vec![ShowTarget::new("Demo", "https://kickass-anime.ru/demo-1a2b")])
///     .await?;
/// println!("resolved {} episodes", summary.total_resolved());
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    config: Arc<Config>,
    factory: Arc<dyn SurfaceFactory>,
    store: CatalogStore,
    enumerator: Arc<EpisodeEnumerator>,
    resolver: Arc<SourceResolver>,
    event_tx: broadcast::Sender<Event>,
    cancel_token: CancellationToken,
}

impl Pipeline {
    /// Create a pipeline over the contexts handed out by `factory`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid, or if it asks
    /// for concurrent shows while `factory` cannot isolate contexts.
    pub fn new(config: Config, factory: Arc<dyn SurfaceFactory>) -> Result<Self> {
        config.validate()?;

        if config.max_concurrent_shows > 1 && !factory.isolated() {
            return Err(Error::Config {
                message: "concurrent shows need a surface factory that isolates contexts"
                    .to_string(),
                key: Some("max_concurrent_shows".to_string()),
            });
        }

        let enumerator = EpisodeEnumerator::new(
            config.strategies.clone(),
            config.timeouts.clone(),
            config.retry.clone(),
        );
        let resolver = SourceResolver::new(
            config.resolver.clone(),
            config.strategies.clone(),
            config.timeouts.clone(),
            config.retry.clone(),
        );
        let store = CatalogStore::new(config.persistence.catalog_path.clone());
        let (event_tx, _rx) = broadcast::channel(1000);

        Ok(Self {
            config: Arc::new(config),
            factory,
            store,
            enumerator: Arc::new(enumerator),
            resolver: Arc::new(resolver),
            event_tx,
            cancel_token: CancellationToken::new(),
        })
    }

    /// Subscribe to run events
    ///
    /// Slow receivers may miss events (`RecvError::Lagged`).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that stops the run when cancelled
    ///
    /// Cancellation is observed between shows and between episodes; an episode
    /// being resolved at that moment is abandoned. Finished work is still
    /// merged and saved.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Cancel the current run
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// The catalog store used by this pipeline
    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    /// Discover shows, then run them
    ///
    /// A failed discovery is logged and treated as finding no shows.
    pub async fn run_with_discovery(&self, discovery: &dyn ShowDiscovery) -> Result<RunSummary> {
        let shows = match discovery.discover().await {
            Ok(shows) => shows,
            Err(e) => {
                tracing::warn!(
                    discovery = discovery.name(),
                    error = %e,
                    "Show discovery failed, continuing with no shows"
                );
                Vec::new()
            }
        };
        self.run(shows).await
    }

    /// Process `shows` and persist the results
    ///
    /// Shows with an empty title are skipped; a title listed twice is
    /// processed once.
    ///
    /// # Errors
    ///
    /// Only run-stopping failures are returned: the render surface became
    /// unavailable, or the catalog could not be written. Completed shows are
    /// saved (best effort) before the error is returned.
    pub async fn run(&self, shows: Vec<ShowTarget>) -> Result<RunSummary> {
        let started_at = Utc::now();
        let shows = unique_shows(shows);

        self.emit_event(Event::RunStarted { shows: shows.len() });
        tracing::info!(
            shows = shows.len(),
            catalog = %self.store.path().display(),
            "Starting harvest run"
        );

        let mut catalog = self.store.load().await;

        if shows.is_empty() && !self.store.exists().await {
            tracing::info!("No shows to process, writing empty catalog");
            self.store.save(&catalog).await?;
        }

        let mut reports = Vec::new();
        let result = if self.config.max_concurrent_shows > 1 {
            self.run_parallel(shows, &mut catalog, &mut reports).await
        } else {
            self.run_sequential(shows, &mut catalog, &mut reports).await
        };

        let cancelled = self.cancel_token.is_cancelled();
        if cancelled {
            self.emit_event(Event::Cancelled);
        }

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            shows: reports,
            cancelled,
        };
        self.emit_event(Event::RunFinished {
            resolved: summary.total_resolved(),
            failed: summary.total_failed(),
        });

        result?;

        tracing::info!(
            shows = summary.shows.len(),
            resolved = summary.total_resolved(),
            failed = summary.total_failed(),
            cancelled,
            "Harvest run finished"
        );
        Ok(summary)
    }

    fn task_context(&self, cancel_token: CancellationToken) -> ShowTaskContext {
        ShowTaskContext {
            enumerator: Arc::clone(&self.enumerator),
            resolver: Arc::clone(&self.resolver),
            max_batch: self.config.max_batch,
            event_tx: self.event_tx.clone(),
            cancel_token,
        }
    }

    /// All shows in order on one context
    async fn run_sequential(
        &self,
        shows: Vec<ShowTarget>,
        catalog: &mut Catalog,
        reports: &mut Vec<ShowReport>,
    ) -> Result<()> {
        if shows.is_empty() {
            return Ok(());
        }

        let surface = self.factory.new_context().await?;
        let ctx = self.task_context(self.cancel_token.clone());

        for show in shows {
            if self.cancel_token.is_cancelled() {
                tracing::info!("Run cancelled, skipping remaining shows");
                break;
            }

            let known = catalog.known_labels(&show.title);
            let mut outcome = run_show_task(&ctx, surface.as_ref(), show, known).await;
            let fatal = outcome.fatal.take();

            let committed = self.commit(catalog, outcome).await;
            if let Some(e) = fatal {
                if let Ok(report) = committed {
                    reports.push(report);
                }
                return Err(e);
            }
            reports.push(committed?);
        }

        Ok(())
    }

    /// Shows in spawned tasks, at most `max_concurrent_shows` at once
    async fn run_parallel(
        &self,
        shows: Vec<ShowTarget>,
        catalog: &mut Catalog,
        reports: &mut Vec<ShowReport>,
    ) -> Result<()> {
        // Cancelled by the caller, or by us when the run has to stop
        let run_token = self.cancel_token.child_token();
        let ctx = self.task_context(run_token.clone());
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_shows));
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<ShowOutcome>(shows.len().max(1));
        let mut tasks = JoinSet::new();

        for show in shows {
            let known = catalog.known_labels(&show.title);
            let ctx = ctx.clone();
            let factory = Arc::clone(&self.factory);
            let semaphore = Arc::clone(&semaphore);
            let outcome_tx = outcome_tx.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                if ctx.cancel_token.is_cancelled() {
                    return;
                }

                let outcome = match factory.new_context().await {
                    Ok(surface) => run_show_task(&ctx, surface.as_ref(), show, known).await,
                    Err(e) => ShowOutcome::unavailable(show, e),
                };
                outcome_tx.send(outcome).await.ok();
            });
        }
        drop(outcome_tx);

        let mut first_fatal: Option<Error> = None;
        while let Some(mut outcome) = outcome_rx.recv().await {
            if let Some(e) = outcome.fatal.take() {
                tracing::error!(show = %outcome.target.title, error = %e, "Stopping run");
                run_token.cancel();
                first_fatal.get_or_insert(e);
            }

            match self.commit(catalog, outcome).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    run_token.cancel();
                    first_fatal.get_or_insert(e);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Show task panicked");
            }
        }

        match first_fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Merge one show's outcome into the catalog and save it
    async fn commit(&self, catalog: &mut Catalog, outcome: ShowOutcome) -> Result<ShowReport> {
        let ShowOutcome {
            target,
            report,
            episodes,
            ..
        } = outcome;

        let added = catalog.merge(&target, episodes);
        self.emit_event(Event::StageChanged {
            title: target.title.clone(),
            stage: ShowStage::Merged,
        });

        if let Err(e) = self.store.save(catalog).await {
            tracing::error!(
                show = %target.title,
                path = %self.store.path().display(),
                error = %e,
                "Failed to save catalog"
            );
            return Err(e);
        }

        self.emit_event(Event::StageChanged {
            title: target.title.clone(),
            stage: ShowStage::Persisted,
        });
        self.emit_event(Event::ShowPersisted {
            title: target.title.clone(),
            added,
        });

        tracing::info!(
            show = %target.title,
            added,
            failed = report.failed.len(),
            skipped_known = report.skipped_known,
            deferred = report.deferred,
            status = ?report.status,
            "Show processed"
        );

        Ok(report)
    }
}

/// Drop shows with empty titles and repeated titles, keeping the first
fn unique_shows(shows: Vec<ShowTarget>) -> Vec<ShowTarget> {
    let mut seen = HashSet::new();
    shows
        .into_iter()
        .filter(|show| {
            if show.title.trim().is_empty() {
                tracing::warn!(url = %show.url, "Skipping show with empty title");
                return false;
            }
            if !seen.insert(show.title.clone()) {
                tracing::debug!(show = %show.title, "Skipping repeated show");
                return false;
            }
            true
        })
        .collect()
}
