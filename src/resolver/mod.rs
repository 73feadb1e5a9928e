//! Media-source resolution
//!
//! Drives the render surface to one episode's player and turns what it finds
//! into a [`VariantMap`]. The player page exposes a single source URL; other
//! languages are reached by rewriting the player's language parameter with
//! the locales offered in its language menu.

pub mod vocabulary;

use url::Url;

use crate::catalog::{VariantMap, VariantTag};
use crate::config::{ListingStrategy, ResolverConfig, RetryConfig, TimeoutConfig};
use crate::error::{Error, Result};
use crate::retry::with_retry;
use crate::surface::{ElementHandle, PageHandle, RenderSurface};
use crate::types::{EnumeratedEpisode, NavigationTarget};
use crate::wait;

/// Resolves episodes to their playable sources
#[derive(Clone, Debug)]
pub struct SourceResolver {
    config: ResolverConfig,
    strategies: Vec<ListingStrategy>,
    timeouts: TimeoutConfig,
    retry: RetryConfig,
}

impl SourceResolver {
    /// Create a resolver
    ///
    /// `strategies` are needed to find the episode item when an episode has
    /// no URL of its own and must be clicked in the listing.
    pub fn new(
        config: ResolverConfig,
        strategies: Vec<ListingStrategy>,
        timeouts: TimeoutConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            config,
            strategies,
            timeouts,
            retry,
        }
    }

    /// Resolve every variant of `episode`
    ///
    /// The returned map always has at least one entry.
    ///
    /// # Errors
    ///
    /// Fails if the player never appears, carries no usable source, or its
    /// source cannot be parsed. Such failures concern this episode only unless
    /// [`Error::is_fatal`] says otherwise.
    pub async fn resolve(
        &self,
        surface: &dyn RenderSurface,
        episode: &EnumeratedEpisode,
    ) -> Result<VariantMap> {
        let (page, page_url) = self.navigate(surface, &episode.target).await?;

        let result = self.read_variants(surface, page, &page_url).await;

        if let Err(e) = surface.close(page).await {
            tracing::debug!(error = %e, %page, "Failed to close player page");
        }

        let variants = result?;
        tracing::debug!(
            label = %episode.label,
            variants = variants.len(),
            "Resolved episode"
        );
        Ok(variants)
    }

    /// Open the page where the episode plays; returns the page and its URL
    async fn navigate(
        &self,
        surface: &dyn RenderSurface,
        target: &NavigationTarget,
    ) -> Result<(PageHandle, String)> {
        let navigation = self.timeouts.navigation;
        match target {
            NavigationTarget::Url(url) => {
                let page = with_retry(&self.retry, || wait::open(surface, url, navigation)).await?;
                Ok((page, url.clone()))
            }
            NavigationTarget::Listing {
                show_url,
                page: listing_page,
                label,
            } => {
                let page =
                    with_retry(&self.retry, || wait::open(surface, show_url, navigation)).await?;
                if let Err(e) = self
                    .play_from_listing(surface, page, listing_page.as_deref(), label)
                    .await
                {
                    if let Err(close_err) = surface.close(page).await {
                        tracing::debug!(error = %close_err, %page, "Failed to close listing page");
                    }
                    return Err(e);
                }
                Ok((page, show_url.clone()))
            }
        }
    }

    /// Click the item labelled `label` in the show listing
    async fn play_from_listing(
        &self,
        surface: &dyn RenderSurface,
        page: PageHandle,
        listing_page: Option<&str>,
        label: &str,
    ) -> Result<()> {
        let element_timeout = self.timeouts.element;
        let interval = self.timeouts.poll_interval;

        let containers: Vec<&str> = self.strategies.iter().map(|s| s.container.as_str()).collect();
        let index = wait::wait_for_any(surface, page, &containers, element_timeout, interval).await?;
        let strategy = &self.strategies[index];

        if let (Some(page_label), Some(control), Some(option)) =
            (listing_page, &strategy.page_selector, &strategy.page_option)
        {
            self.select_listing_page(surface, page, control, option, page_label)
                .await?;
        }

        // The previous page's items can linger after a page switch, so poll
        // until the wanted label is rendered.
        let what = format!("episode item {label}");
        let item = wait::poll_until(&what, self.timeouts.page_change, interval, || async move {
            match self.find_item(surface, page, strategy, label).await {
                Err(Error::ElementNotFound { .. }) => Ok(None),
                other => other,
            }
        })
        .await?;

        let previous_player = surface.query_all(page, &self.config.player).await?.first().copied();

        wait::click(surface, item, element_timeout).await?;

        if let Some(previous) = previous_player {
            match wait::wait_detached(surface, previous, self.timeouts.page_change, interval).await
            {
                Ok(()) => {}
                // Already playing this episode
                Err(Error::NavigationTimeout { .. }) => {
                    tracing::debug!(%label, "Player did not change after selecting episode");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    async fn select_listing_page(
        &self,
        surface: &dyn RenderSurface,
        page: PageHandle,
        control: &str,
        option: &str,
        page_label: &str,
    ) -> Result<()> {
        let element_timeout = self.timeouts.element;
        let control_el = surface.wait_for(page, control, element_timeout).await?;
        wait::click(surface, control_el, element_timeout).await?;
        surface.wait_for(page, option, element_timeout).await?;

        for option_el in surface.query_all(page, option).await? {
            if surface.read_text(option_el).await?.trim() == page_label {
                return wait::click(surface, option_el, element_timeout).await;
            }
        }
        Err(Error::not_found(format!("{option} \"{page_label}\"")))
    }

    async fn find_item(
        &self,
        surface: &dyn RenderSurface,
        page: PageHandle,
        strategy: &ListingStrategy,
        label: &str,
    ) -> Result<Option<ElementHandle>> {
        for item in surface.query_all(page, &strategy.item).await? {
            let label_el = match &strategy.label {
                Some(selector) => surface.query_within(item, selector).await?,
                None => Some(item),
            };
            if let Some(label_el) = label_el
                && surface.read_text(label_el).await?.trim() == label
            {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    async fn read_variants(
        &self,
        surface: &dyn RenderSurface,
        page: PageHandle,
        page_url: &str,
    ) -> Result<VariantMap> {
        surface
            .wait_for(page, &self.config.player, self.timeouts.element)
            .await?;
        let discovered = self.player_source(surface, page, page_url).await?;
        let base = base_url(&discovered, &self.config.language_param, &self.config.source_attribute)?;

        let mut variants = VariantMap::new();
        for language in self.language_options(surface, page).await? {
            let Some(known) = vocabulary::recognize(&language) else {
                tracing::debug!(%language, "Unrecognized language option");
                continue;
            };
            let url = variant_url(&base, &self.config.language_param, known.locale);
            variants.entry(known.tag).or_insert(url);
        }

        if variants.is_empty() {
            variants.insert(VariantTag::Sub, discovered.to_string());
        }

        if !self.is_multi_language(&base) {
            variants.insert(VariantTag::Raw, base.to_string());
        }

        Ok(variants)
    }

    /// First player source that is set and not ignored, resolved against the page
    ///
    /// Players often attach before their source is filled in, so this polls
    /// within the element bound.
    async fn player_source(
        &self,
        surface: &dyn RenderSurface,
        page: PageHandle,
        page_url: &str,
    ) -> Result<Url> {
        let attribute = &self.config.source_attribute;
        let what = format!("{} [{attribute}]", self.config.player);
        let found = wait::poll_until(
            &what,
            self.timeouts.element,
            self.timeouts.poll_interval,
            || async move { self.usable_source(surface, page).await },
        )
        .await;

        let src = match found {
            Ok(src) => src,
            Err(Error::NavigationTimeout { .. }) => return Err(Error::not_found(what)),
            Err(e) => return Err(e),
        };

        Url::parse(page_url)
            .and_then(|base| base.join(&src))
            .or_else(|_| Url::parse(&src))
            .map_err(|e| Error::malformed(attribute.as_str(), format!("{src}: {e}")))
    }

    async fn usable_source(
        &self,
        surface: &dyn RenderSurface,
        page: PageHandle,
    ) -> Result<Option<String>> {
        for player in surface.query_all(page, &self.config.player).await? {
            let Some(src) = surface
                .read_attribute(player, &self.config.source_attribute)
                .await?
            else {
                continue;
            };
            let src = src.trim();
            if src.is_empty() || self.config.ignored_sources.iter().any(|n| src.contains(n.as_str())) {
                continue;
            }
            return Ok(Some(src.to_string()));
        }
        Ok(None)
    }

    /// Labels offered by the language menu; empty when the player has none
    ///
    /// # Errors
    ///
    /// Fails when the menu control is present but its options never show.
    async fn language_options(
        &self,
        surface: &dyn RenderSurface,
        page: PageHandle,
    ) -> Result<Vec<String>> {
        let Some(control) = surface
            .query_all(page, &self.config.language_control)
            .await?
            .first()
            .copied()
        else {
            return Ok(Vec::new());
        };

        // An offered menu that cannot be read fails the episode
        let labels = self.read_menu(surface, page, control).await?;

        // Close the menu by clicking outside it
        if let Some(outside) = surface
            .query_all(page, &self.config.dismiss_target)
            .await?
            .first()
            .copied()
            && let Err(e) = wait::click(surface, outside, self.timeouts.element).await
        {
            tracing::debug!(error = %e, "Failed to dismiss language menu");
        }

        Ok(labels)
    }

    async fn read_menu(
        &self,
        surface: &dyn RenderSurface,
        page: PageHandle,
        control: ElementHandle,
    ) -> Result<Vec<String>> {
        wait::click(surface, control, self.timeouts.element).await?;
        surface
            .wait_for(page, &self.config.language_option, self.timeouts.element)
            .await?;

        let mut labels = Vec::new();
        for option in surface.query_all(page, &self.config.language_option).await? {
            let label = surface.read_text(option).await?.trim().to_string();
            if !label.is_empty() {
                labels.push(label);
            }
        }
        Ok(labels)
    }

    fn is_multi_language(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        self.config
            .multi_language_hosts
            .iter()
            .any(|known| host == known || host.ends_with(&format!(".{known}")))
    }
}

/// `url` without its language parameter
///
/// # Errors
///
/// Returns `MalformedAttribute` (naming `attribute`) for URLs without a host.
pub fn base_url(url: &Url, param: &str, attribute: &str) -> Result<Url> {
    if url.host_str().is_none() {
        return Err(Error::malformed(attribute, format!("{url}: no host")));
    }

    let prefix = format!("{param}=");
    let mut base = url.clone();
    let query: String = url
        .query()
        .unwrap_or("")
        .split('&')
        .filter(|pair| !pair.is_empty() && !pair.starts_with(&prefix) && *pair != param)
        .collect::<Vec<_>>()
        .join("&");
    base.set_query((!query.is_empty()).then_some(query.as_str()));
    base.set_fragment(None);
    Ok(base)
}

/// `base` with its language parameter set to `locale`
pub fn variant_url(base: &Url, param: &str, locale: &str) -> String {
    let separator = if base.query().is_some() { '&' } else { '?' };
    format!("{base}{separator}{param}={locale}")
}
