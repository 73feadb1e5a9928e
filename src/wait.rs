//! Bounded waits
//!
//! Every wait in the pipeline goes through this module. A wait has exactly one
//! bound; when it expires the wait ends with [`Error::NavigationTimeout`] and
//! the caller decides what that means at its scope (zero episodes, one failed
//! episode, ...). Nothing here retries on its own beyond polling.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::surface::{ElementHandle, PageHandle, RenderSurface};

/// Run `fut` with an upper bound
///
/// # Errors
///
/// Returns `NavigationTimeout` naming `what` if `fut` does not finish within
/// `timeout`; otherwise whatever `fut` returns.
pub async fn bounded<T, Fut>(what: &str, timeout: Duration, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(what, timeout)),
    }
}

/// Open `url` on `surface`, bounded by `timeout`
pub async fn open(surface: &dyn RenderSurface, url: &str, timeout: Duration) -> Result<PageHandle> {
    bounded(url, timeout, surface.open(url, timeout)).await
}

/// Click `element`, bounded by `timeout`
pub async fn click(
    surface: &dyn RenderSurface,
    element: ElementHandle,
    timeout: Duration,
) -> Result<()> {
    let what = format!("click on {element}");
    bounded(&what, timeout, surface.click(element)).await
}

/// Poll `check` until it yields a value or `timeout` expires
///
/// The check runs at least once. `Ok(None)` means "not yet" and is retried
/// after `interval`; an `Err` from the check ends the wait immediately.
///
/// # Errors
///
/// Returns `NavigationTimeout` naming `what` when the bound expires, or the
/// first error the check returns.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let polling = async {
        loop {
            if let Some(value) = check().await? {
                return Ok(value);
            }
            tokio::time::sleep(interval).await;
        }
    };
    bounded(what, timeout, polling).await
}

/// Wait until `element` is no longer attached to its document
///
/// An element the surface no longer knows about counts as detached.
pub async fn wait_detached(
    surface: &dyn RenderSurface,
    element: ElementHandle,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    let what = format!("{element} to detach");
    poll_until(&what, timeout, interval, || async move {
        match surface.is_attached(element).await {
            Ok(true) => Ok(None),
            Ok(false) | Err(Error::ElementNotFound { .. }) => Ok(Some(())),
            Err(e) => Err(e),
        }
    })
    .await
}

/// Wait until any of `selectors` matches on `page`
///
/// Returns the index of the first selector (in the given order) that matched
/// on the earliest poll where anything matched.
pub async fn wait_for_any(
    surface: &dyn RenderSurface,
    page: PageHandle,
    selectors: &[&str],
    timeout: Duration,
    interval: Duration,
) -> Result<usize> {
    let what = selectors.join(" | ");
    poll_until(&what, timeout, interval, || async move {
        for (index, selector) in selectors.iter().enumerate() {
            if !surface.query_all(page, selector).await?.is_empty() {
                return Ok(Some(index));
            }
        }
        Ok(None)
    })
    .await
}
