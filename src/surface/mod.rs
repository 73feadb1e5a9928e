//! Render surface capability
//!
//! The pipeline never talks to a browser directly. It drives a
//! [`RenderSurface`]: something that can open pages, query and wait for
//! elements, read attributes and text, and click. Any automation product
//! (a WebDriver session, a CDP client, a recorded fixture) can sit behind it.
//!
//! ## Contexts
//!
//! One surface is one browsing context (its own cookies, storage and pages).
//! Calls against a single context are never issued concurrently by the
//! pipeline. Parallel runs ask a [`SurfaceFactory`] for one context per
//! in-flight show.
//!
//! Handles are opaque ids minted by the implementation; they are only
//! meaningful to the surface that returned them.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

/// Handle to an open page
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageHandle(pub u64);

/// Handle to an element inside a page
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

impl fmt::Display for PageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page#{}", self.0)
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element#{}", self.0)
    }
}

/// Browsing and DOM-inspection capability driven by the pipeline
///
/// Implementations report a bound that expired as
/// [`Error::NavigationTimeout`](crate::Error::NavigationTimeout) and a dead
/// browser as [`Error::SurfaceUnavailable`](crate::Error::SurfaceUnavailable).
#[async_trait]
pub trait RenderSurface: Send + Sync {
    /// Navigate a fresh page to `url`
    async fn open(&self, url: &str, timeout: Duration) -> Result<PageHandle>;

    /// Wait until an element matching `selector` is attached to `page`
    ///
    /// # Errors
    ///
    /// Returns `NavigationTimeout` if nothing matches within `timeout`.
    async fn wait_for(
        &self,
        page: PageHandle,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle>;

    /// All elements currently matching `selector`, in document order
    async fn query_all(&self, page: PageHandle, selector: &str) -> Result<Vec<ElementHandle>>;

    /// First descendant of `element` matching `selector`
    async fn query_within(
        &self,
        element: ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>>;

    /// Attribute value, `None` when absent
    async fn read_attribute(&self, element: ElementHandle, name: &str) -> Result<Option<String>>;

    /// Rendered text content
    async fn read_text(&self, element: ElementHandle) -> Result<String>;

    /// Click the element
    async fn click(&self, element: ElementHandle) -> Result<()>;

    /// Whether the element is still attached to its document
    async fn is_attached(&self, element: ElementHandle) -> Result<bool>;

    /// Close the page
    async fn close(&self, page: PageHandle) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Source of isolated browsing contexts
#[async_trait]
pub trait SurfaceFactory: Send + Sync {
    /// Create a new browsing context
    ///
    /// # Errors
    ///
    /// Failing here is fatal to a run and should be reported as
    /// [`Error::SurfaceUnavailable`](crate::Error::SurfaceUnavailable).
    async fn new_context(&self) -> Result<Arc<dyn RenderSurface>>;

    /// Whether each call to [`new_context`](Self::new_context) yields an
    /// independent context
    fn isolated(&self) -> bool {
        true
    }
}

/// Factory that hands out one existing context
///
/// Suitable for sequential runs (`max_concurrent_shows = 1`). With more
/// concurrency every show would share the same context, which the pipeline
/// refuses.
#[derive(Clone)]
pub struct SingleContext {
    surface: Arc<dyn RenderSurface>,
}

impl SingleContext {
    /// Wrap an existing context
    pub fn new(surface: Arc<dyn RenderSurface>) -> Self {
        Self { surface }
    }
}

#[async_trait]
impl SurfaceFactory for SingleContext {
    async fn new_context(&self) -> Result<Arc<dyn RenderSurface>> {
        Ok(Arc::clone(&self.surface))
    }

    fn isolated(&self) -> bool {
        false
    }
}
