//! # episode-harvest
//!
//! Incremental catalog builder for an episodic video site.
//!
//! ## Design Philosophy
//!
//! episode-harvest is designed to be:
//! - **Incremental** - Each run only resolves episodes the catalog does not know yet
//! - **Resumable** - The catalog is saved after every show, so a crash loses at most one show
//! - **Library-first** - The browser is supplied by the embedder through [`surface::RenderSurface`]
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use episode_harvest::{Config, LatestShowDiscovery, Pipeline};
//! # use episode_harvest::surface::SurfaceFactory;
//!
//! # async fn example(factory: Arc<dyn SurfaceFactory>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config {
//!     max_batch: 5,
//!     ..Default::default()
//! };
//! let discovery = LatestShowDiscovery::new(&config.discovery)?;
//! let pipeline = Pipeline::new(config, factory)?;
//!
//! // Subscribe to events
//! let mut events = pipeline.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//! });
//!
//! let summary = pipeline.run_with_discovery(&discovery).await?;
//! println!("{} new episodes", summary.total_resolved());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Catalog model and persistence
pub mod catalog;
/// Configuration types
pub mod config;
/// Selection of episodes to resolve
pub mod delta;
/// Show discovery
pub mod discovery;
/// Episode listing enumeration
pub mod enumerator;
/// Error types
pub mod error;
/// Run orchestration
pub mod pipeline;
/// Playback source resolution
pub mod resolver;
/// Retry logic with exponential backoff
pub mod retry;
/// Render surface abstraction
pub mod surface;
/// Core types and events
pub mod types;
/// Bounded waits on the render surface
pub mod wait;

// Re-export commonly used types
pub use catalog::{Catalog, CatalogStore, Episode, Show, VariantMap, VariantTag};
pub use config::{Config, DiscoveryConfig, ResolverConfig, RetryConfig, TimeoutConfig};
pub use discovery::{FixedShows, LatestShowDiscovery, ShowDiscovery};
pub use error::{Error, Result};
pub use pipeline::Pipeline;
pub use surface::{RenderSurface, SingleContext, SurfaceFactory};
pub use types::{
    EnumeratedEpisode, Event, FailedEpisode, NavigationTarget, RunSummary, ShowReport, ShowStage,
    ShowStatus, ShowTarget,
};

/// Helper function to run the pipeline with graceful signal handling.
///
/// Runs `shows` and cancels the run when a termination signal arrives. The
/// show in progress is cut short, but everything finished so far is merged and
/// saved before this returns.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use episode_harvest::{Config, Pipeline, ShowTarget, run_until_signal};
/// # use episode_harvest::surface::SurfaceFactory;
///
/// # async fn example(factory: Arc<dyn SurfaceFactory>) -> Result<(), Box<dyn std::error::Error>> {
/// let pipeline = Pipeline::new(Config::default(), factory)?;
/// let shows = vec![ShowTarget::new("Demo", "https://kickass-anime.ru/demo-1a2b")];
///
/// let summary = run_until_signal(&pipeline, shows).await?;
/// if summary.cancelled {
///     println!("stopped early");
/// }
/// # Ok(())
/// # }
/// ```
pub async fn run_until_signal(
    pipeline: &Pipeline,
    shows: Vec<types::ShowTarget>,
) -> Result<types::RunSummary> {
    let token = pipeline.cancellation_token();
    let watcher = tokio::spawn({
        let token = token.clone();
        async move {
            tokio::select! {
                _ = wait_for_signal() => {
                    tracing::info!("Cancelling run, finished shows will still be saved");
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        }
    });

    let result = pipeline.run(shows).await;
    watcher.abort();
    result
}

/// Resolve on SIGTERM or SIGINT
///
/// Signals that cannot be registered (some containers and test harnesses) are
/// skipped; with neither available, Ctrl+C is used instead.
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    fn register(kind: SignalKind, name: &'static str) -> Option<Signal> {
        signal(kind)
            .inspect_err(|e| tracing::warn!(signal = name, error = %e, "Could not register signal handler"))
            .ok()
    }

    async fn next(stream: &mut Option<Signal>) {
        match stream {
            Some(stream) => {
                stream.recv().await;
            }
            None => std::future::pending().await,
        }
    }

    let mut sigterm = register(SignalKind::terminate(), "SIGTERM");
    let mut sigint = register(SignalKind::interrupt(), "SIGINT");

    if sigterm.is_none() && sigint.is_none() {
        tracing::error!("No signal handlers registered, falling back to ctrl_c");
        tokio::signal::ctrl_c().await.ok();
        return;
    }

    tokio::select! {
        _ = next(&mut sigterm) => tracing::info!(signal = "SIGTERM", "Received shutdown signal"),
        _ = next(&mut sigint) => tracing::info!(signal = "SIGINT", "Received shutdown signal"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C, run can only be cancelled by its token");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C signal");
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::test_helpers::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_until_signal_returns_cancelled_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let site = FakeSite::new()
            .page(
                "https://site.test/demo",
                show_page(&[("EP 1", "/demo/ep-1"), ("EP 2", "/demo/ep-2")]),
            )
            .page(
                "https://site.test/demo/ep-2",
                player_page(&["https://krussdomi.com/p?id=2"]),
            )
            .delay_open("https://site.test/demo/ep-1", Duration::from_secs(5));

        let mut config = Config::default();
        config.timeouts = fast_timeouts();
        config.timeouts.navigation = Duration::from_secs(10);
        config.retry = no_retry();
        config.persistence.catalog_path = path.clone();
        let factory = Arc::new(FakeFactory::new(Arc::new(site)));
        let pipeline = Pipeline::new(config, factory).unwrap();

        let token = pipeline.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(400)).await;
            token.cancel();
        });

        let shows = vec![
            ShowTarget::new("Demo", "https://site.test/demo"),
            ShowTarget::new("Later", "https://site.test/later"),
        ];
        let summary = tokio::time::timeout(Duration::from_secs(4), run_until_signal(&pipeline, shows))
            .await
            .expect("cancellation should end the run")
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.shows.len(), 1);
        assert_eq!(summary.shows[0].status, ShowStatus::Cancelled);
        assert_eq!(summary.shows[0].resolved, 1);

        let catalog = CatalogStore::new(&path).try_load().await.unwrap().unwrap();
        assert_eq!(catalog.len(), 1);
        let labels: Vec<&str> = catalog
            .get("Demo")
            .unwrap()
            .episodes
            .iter()
            .map(|e| e.label.as_str())
            .collect();
        assert_eq!(labels, vec!["EP 2"]);
    }
}
