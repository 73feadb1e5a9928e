//! Episode enumeration
//!
//! Reads a show's episode listing into a de-duplicated list of
//! (label, navigation target) pairs, newest first.
//!
//! Listings come in several layouts, described by the ordered
//! [`ListingStrategy`] list in the config. The first strategy whose container
//! shows up within the element bound is used for the whole show. Some layouts
//! paginate behind a page-selector menu; every page is visited in the order the
//! menu lists them.
//!
//! After switching pages the old page's items stay in the DOM for a moment.
//! Reading before they detach returns the old page a second time, so a page
//! switch always waits for the previous first item to go stale before reading.

use std::collections::HashMap;

use crate::config::{ListingStrategy, RetryConfig, TimeoutConfig};
use crate::error::{Error, Result};
use crate::retry::with_retry;
use crate::surface::{ElementHandle, PageHandle, RenderSurface};
use crate::types::{EnumeratedEpisode, NavigationTarget, ShowTarget};
use crate::wait;

/// Sort episodes newest first (descending sort key, then label)
pub fn sort_newest_first(episodes: &mut [EnumeratedEpisode]) {
    episodes.sort_by(|a, b| {
        b.sort_key
            .total_cmp(&a.sort_key)
            .then_with(|| a.label.cmp(&b.label))
    });
}

/// Episodes accumulated across listing pages, keyed by label
///
/// The first sighting of a label wins; later duplicates are dropped.
#[derive(Debug, Default)]
pub struct EpisodeListing {
    episodes: HashMap<String, EnumeratedEpisode>,
}

impl EpisodeListing {
    /// Create an empty listing
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an episode; returns false if the label was already present
    pub fn insert(&mut self, episode: EnumeratedEpisode) -> bool {
        if self.episodes.contains_key(&episode.label) {
            return false;
        }
        self.episodes.insert(episode.label.clone(), episode);
        true
    }

    /// Add several episodes; returns how many were new
    pub fn extend(&mut self, episodes: impl IntoIterator<Item = EnumeratedEpisode>) -> usize {
        let mut added = 0;
        for episode in episodes {
            if self.insert(episode) {
                added += 1;
            }
        }
        added
    }

    /// Number of distinct labels
    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    /// Whether no episode has been added
    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    /// The episodes, newest first
    pub fn into_sorted(self) -> Vec<EnumeratedEpisode> {
        let mut episodes: Vec<_> = self.episodes.into_values().collect();
        sort_newest_first(&mut episodes);
        episodes
    }
}

/// Reads episode listings through a render surface
#[derive(Clone, Debug)]
pub struct EpisodeEnumerator {
    strategies: Vec<ListingStrategy>,
    timeouts: TimeoutConfig,
    retry: RetryConfig,
}

impl EpisodeEnumerator {
    /// Create an enumerator trying `strategies` in order
    pub fn new(strategies: Vec<ListingStrategy>, timeouts: TimeoutConfig, retry: RetryConfig) -> Self {
        Self {
            strategies,
            timeouts,
            retry,
        }
    }

    /// List every episode of `show`, newest first
    ///
    /// A listing that never renders yields an empty list: shows without
    /// published episodes are normal.
    ///
    /// # Errors
    ///
    /// Returns an error if the show page cannot be opened, or the surface
    /// fails while the listing is read.
    pub async fn enumerate(
        &self,
        surface: &dyn RenderSurface,
        show: &ShowTarget,
    ) -> Result<Vec<EnumeratedEpisode>> {
        let navigation = self.timeouts.navigation;
        let page = with_retry(&self.retry, || wait::open(surface, &show.url, navigation)).await?;

        let result = self.read_listing(surface, page, show).await;

        if let Err(e) = surface.close(page).await {
            tracing::debug!(error = %e, %page, "Failed to close listing page");
        }

        let episodes = result?;
        tracing::debug!(
            show = %show.title,
            episodes = episodes.len(),
            "Enumerated episodes"
        );
        Ok(episodes)
    }

    async fn read_listing(
        &self,
        surface: &dyn RenderSurface,
        page: PageHandle,
        show: &ShowTarget,
    ) -> Result<Vec<EnumeratedEpisode>> {
        let containers: Vec<&str> = self.strategies.iter().map(|s| s.container.as_str()).collect();
        let strategy = match wait::wait_for_any(
            surface,
            page,
            &containers,
            self.timeouts.element,
            self.timeouts.poll_interval,
        )
        .await
        {
            Ok(index) => &self.strategies[index],
            Err(Error::NavigationTimeout { .. }) => {
                tracing::info!(show = %show.title, "No episode listing rendered, treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        tracing::debug!(show = %show.title, strategy = %strategy.name, "Listing layout detected");

        let mut listing = EpisodeListing::new();

        let paginated = match (&strategy.page_selector, &strategy.page_option) {
            (Some(control), Some(option)) => {
                let present = !surface.query_all(page, control).await?.is_empty();
                present.then_some((control.as_str(), option.as_str()))
            }
            _ => None,
        };

        match paginated {
            Some((control, option)) => {
                self.read_pages(surface, page, show, strategy, control, option, &mut listing)
                    .await?
            }
            None => {
                let items = self.read_items(surface, page, show, strategy, None).await?;
                listing.extend(items);
            }
        }

        Ok(listing.into_sorted())
    }

    #[allow(clippy::too_many_arguments)]
    async fn read_pages(
        &self,
        surface: &dyn RenderSurface,
        page: PageHandle,
        show: &ShowTarget,
        strategy: &ListingStrategy,
        control: &str,
        option: &str,
        listing: &mut EpisodeListing,
    ) -> Result<()> {
        // The first page is already rendered; read it before touching the menu.
        let mut first_page = self.read_items(surface, page, show, strategy, None).await?;

        let page_labels = match self.open_page_menu(surface, page, control, option).await {
            Ok(labels) => labels,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    show = %show.title,
                    error = %e,
                    "Could not open page selector, keeping the first page only"
                );
                Vec::new()
            }
        };

        if let Some(first_label) = page_labels.first() {
            for episode in &mut first_page {
                if let NavigationTarget::Listing { page, .. } = &mut episode.target {
                    *page = Some(first_label.clone());
                }
            }
        }
        listing.extend(first_page);

        tracing::debug!(show = %show.title, pages = page_labels.len(), "Paginated listing");

        for (index, page_label) in page_labels.iter().enumerate().skip(1) {
            // The menu is still open from reading the labels on the first switch
            let reopen = index > 1;
            match self
                .switch_page(surface, page, strategy, control, option, index, reopen)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        show = %show.title,
                        page = %page_label,
                        error = %e,
                        "Could not switch listing page, keeping pages read so far"
                    );
                    break;
                }
            }

            let items = self
                .read_items(surface, page, show, strategy, Some(page_label))
                .await?;
            let added = listing.extend(items);
            tracing::debug!(show = %show.title, page = %page_label, added, "Read listing page");
        }

        Ok(())
    }

    /// Open the page selector and read its option labels, leaving it open
    async fn open_page_menu(
        &self,
        surface: &dyn RenderSurface,
        page: PageHandle,
        control: &str,
        option: &str,
    ) -> Result<Vec<String>> {
        let element_timeout = self.timeouts.element;
        let control_el = surface.wait_for(page, control, element_timeout).await?;
        wait::click(surface, control_el, element_timeout).await?;
        surface.wait_for(page, option, element_timeout).await?;

        let mut labels = Vec::new();
        for option_el in surface.query_all(page, option).await? {
            labels.push(surface.read_text(option_el).await?.trim().to_string());
        }
        Ok(labels)
    }

    /// Select page `index` and wait until its items replaced the previous ones
    #[allow(clippy::too_many_arguments)]
    async fn switch_page(
        &self,
        surface: &dyn RenderSurface,
        page: PageHandle,
        strategy: &ListingStrategy,
        control: &str,
        option: &str,
        index: usize,
        reopen: bool,
    ) -> Result<()> {
        let element_timeout = self.timeouts.element;
        let previous_first = surface.query_all(page, &strategy.item).await?.first().copied();

        if reopen {
            let control_el = surface.wait_for(page, control, element_timeout).await?;
            wait::click(surface, control_el, element_timeout).await?;
            surface.wait_for(page, option, element_timeout).await?;
        }

        let options = surface.query_all(page, option).await?;
        let option_el = options
            .get(index)
            .copied()
            .ok_or_else(|| Error::not_found(format!("{option} [{index}]")))?;
        wait::click(surface, option_el, element_timeout).await?;

        if let Some(previous) = previous_first {
            wait::wait_detached(
                surface,
                previous,
                self.timeouts.page_change,
                self.timeouts.poll_interval,
            )
            .await?;
        }

        surface
            .wait_for(page, &strategy.container, element_timeout)
            .await?;
        Ok(())
    }

    /// Read every item currently rendered for `strategy`
    ///
    /// Items that vanish or lack a label are skipped; only fatal surface
    /// errors abort the read.
    async fn read_items(
        &self,
        surface: &dyn RenderSurface,
        page: PageHandle,
        show: &ShowTarget,
        strategy: &ListingStrategy,
        page_label: Option<&str>,
    ) -> Result<Vec<EnumeratedEpisode>> {
        let mut episodes = Vec::new();
        for item in surface.query_all(page, &strategy.item).await? {
            match self.read_item(surface, item, show, strategy, page_label).await {
                Ok(Some(episode)) => episodes.push(episode),
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::debug!(show = %show.title, error = %e, "Skipping unreadable episode item");
                }
            }
        }
        Ok(episodes)
    }

    async fn read_item(
        &self,
        surface: &dyn RenderSurface,
        item: ElementHandle,
        show: &ShowTarget,
        strategy: &ListingStrategy,
        page_label: Option<&str>,
    ) -> Result<Option<EnumeratedEpisode>> {
        let label_el = match &strategy.label {
            Some(selector) => surface.query_within(item, selector).await?,
            None => Some(item),
        };
        let Some(label_el) = label_el else {
            return Ok(None);
        };

        let label = surface.read_text(label_el).await?.trim().to_string();
        if label.is_empty() {
            return Ok(None);
        }

        let link_el = match &strategy.link {
            Some(selector) => surface.query_within(item, selector).await?,
            None => Some(item),
        };
        let href = match link_el {
            Some(el) => surface
                .read_attribute(el, &strategy.href_attribute)
                .await?
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty() && !h.starts_with('#')),
            None => None,
        };

        let target = match href {
            Some(href) => NavigationTarget::Url(absolute_url(&show.url, &href)),
            None => NavigationTarget::Listing {
                show_url: show.url.clone(),
                page: page_label.map(str::to_string),
                label: label.clone(),
            },
        };

        Ok(Some(EnumeratedEpisode::new(label, target)))
    }
}

/// Resolve `href` against `base`, falling back to `href` unchanged
pub(crate) fn absolute_url(base: &str, href: &str) -> String {
    url::Url::parse(base)
        .and_then(|base| base.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}
