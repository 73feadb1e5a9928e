//! Scripted render surface for tests.
//!
//! A [`FakeSite`] maps URLs to [`FakePage`] descriptions. Each page is made of
//! layers that are shown or hidden by clicking: static nodes, the current
//! listing page, open menus and the active player. Selectors are matched
//! literally against the selector strings a node declares, so fixtures list
//! the exact selectors the code under test queries.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{ElementHandle, PageHandle, RenderSurface, SurfaceFactory};
use crate::config::{RetryConfig, TimeoutConfig};
use crate::error::{Error, Result};

pub(crate) const EPISODE_ITEM: &str = "div.episode-item";
pub(crate) const EPISODE_LABEL: &str = "span.v-chip__content";
pub(crate) const PAGE_CONTROL: &str = "div.episode-pages div.v-select__slot";
pub(crate) const MENU_OPTION: &str = "div.v-menu__content div.v-list-item__title";
pub(crate) const PLAYER: &str = "div.player-container iframe";
pub(crate) const LANGUAGE_CONTROL: &str = "div.server-select div.v-select__slot";

/// What clicking a node does to its page
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Action {
    /// Show the named menu
    OpenMenu(String),
    /// Hide every menu
    CloseMenus,
    /// Close menus and switch the listing to page `n`
    SelectPage(usize),
    /// Show the player registered under this label
    Play(String),
}

/// One element in a fake document
#[derive(Clone, Debug, Default)]
pub(crate) struct FakeNode {
    selectors: Vec<String>,
    text: String,
    attrs: HashMap<String, String>,
    late_attrs: HashMap<String, (String, u64)>,
    children: Vec<FakeNode>,
    on_click: Option<Action>,
}

impl FakeNode {
    pub(crate) fn new(selectors: &[&str]) -> Self {
        Self {
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub(crate) fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub(crate) fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    /// Attribute that only reads as `value` once the page has seen `polls` surface calls
    pub(crate) fn attr_after(mut self, name: &str, value: &str, polls: u64) -> Self {
        self.late_attrs
            .insert(name.to_string(), (value.to_string(), polls));
        self
    }

    fn attribute(&self, name: &str, polls: u64) -> Option<String> {
        match self.late_attrs.get(name) {
            Some((value, after)) if polls >= *after => Some(value.clone()),
            _ => self.attrs.get(name).cloned(),
        }
    }

    pub(crate) fn child(mut self, child: FakeNode) -> Self {
        self.children.push(child);
        self
    }

    pub(crate) fn on_click(mut self, action: Action) -> Self {
        self.on_click = Some(action);
        self
    }

    fn matches(&self, selector: &str) -> bool {
        self.selectors.iter().any(|s| s == selector)
    }
}

/// Description of one URL's document
#[derive(Clone, Debug, Default)]
pub(crate) struct FakePage {
    nodes: Vec<FakeNode>,
    listing: Vec<Vec<FakeNode>>,
    menus: Vec<(String, Vec<FakeNode>)>,
    players: Vec<(String, Vec<FakeNode>)>,
    switch_lag: u32,
}

impl FakePage {
    pub(crate) fn new() -> Self {
        Self::default().node(FakeNode::new(&["body"]).on_click(Action::CloseMenus))
    }

    pub(crate) fn node(mut self, node: FakeNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub(crate) fn listing_page(mut self, items: Vec<FakeNode>) -> Self {
        self.listing.push(items);
        self
    }

    pub(crate) fn menu(mut self, name: &str, options: Vec<FakeNode>) -> Self {
        self.menus.push((name.to_string(), options));
        self
    }

    /// Register a player; the one labelled `""` is visible on open
    pub(crate) fn player(mut self, label: &str, nodes: Vec<FakeNode>) -> Self {
        self.players.push((label.to_string(), nodes));
        self
    }

    /// Number of surface calls a page switch lags behind the click
    pub(crate) fn switch_lag(mut self, polls: u32) -> Self {
        self.switch_lag = polls;
        self
    }

    fn layer(&self, layer: &Layer) -> &[FakeNode] {
        match layer {
            Layer::Static => &self.nodes,
            Layer::Listing(index) => self.listing.get(*index).map(Vec::as_slice).unwrap_or(&[]),
            Layer::Menu(name) => named(&self.menus, name),
            Layer::Player(label) => named(&self.players, label),
        }
    }
}

fn named<'a>(entries: &'a [(String, Vec<FakeNode>)], name: &str) -> &'a [FakeNode] {
    entries
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, nodes)| nodes.as_slice())
        .unwrap_or(&[])
}

/// A set of pages shared by every context created for it
#[derive(Default)]
pub(crate) struct FakeSite {
    pages: HashMap<String, FakePage>,
    blank: FakePage,
    open_failures: Mutex<HashMap<String, u32>>,
    open_delays: HashMap<String, Duration>,
    unavailable: AtomicBool,
}

impl FakeSite {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    /// Fail the first `times` opens of `url` with a navigation timeout
    pub(crate) fn fail_open(mut self, url: &str, times: u32) -> Self {
        self.open_failures
            .get_mut()
            .unwrap()
            .insert(url.to_string(), times);
        self
    }

    /// Make opening `url` take `delay`
    pub(crate) fn delay_open(mut self, url: &str, delay: Duration) -> Self {
        self.open_delays.insert(url.to_string(), delay);
        self
    }

    /// Make every surface call fail as if the browser died
    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn layout(&self, url: &str) -> &FakePage {
        self.pages.get(url).unwrap_or(&self.blank)
    }

    fn take_failure(&self, url: &str) -> bool {
        let mut failures = self.open_failures.lock().unwrap();
        match failures.get_mut(url) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Layer {
    Static,
    Listing(usize),
    Menu(String),
    Player(String),
}

#[derive(Clone, Debug)]
struct ElementRef {
    page: u64,
    layer: Layer,
    generation: u64,
    path: Vec<usize>,
}

#[derive(Debug)]
struct PageState {
    url: String,
    current_page: usize,
    pending: Option<(usize, u32)>,
    polls: u64,
    generation: u64,
    open_menus: HashSet<String>,
    active_player: Option<String>,
}

impl PageState {
    fn new(url: &str, layout: &FakePage) -> Self {
        let active_player = layout
            .players
            .iter()
            .any(|(label, _)| label.is_empty())
            .then(String::new);
        Self {
            url: url.to_string(),
            current_page: 0,
            pending: None,
            polls: 0,
            generation: 0,
            open_menus: HashSet::new(),
            active_player,
        }
    }

    /// Count one surface call and advance a lagging page switch
    fn tick(&mut self) {
        self.polls += 1;
        if let Some((target, remaining)) = self.pending {
            if remaining <= 1 {
                self.switch_to(target);
            } else {
                self.pending = Some((target, remaining - 1));
            }
        }
    }

    fn switch_to(&mut self, page: usize) {
        self.current_page = page;
        self.generation += 1;
        self.pending = None;
    }

    fn apply(&mut self, action: Action, layout: &FakePage) {
        match action {
            Action::OpenMenu(name) => {
                self.open_menus.insert(name);
            }
            Action::CloseMenus => self.open_menus.clear(),
            Action::SelectPage(page) => {
                self.open_menus.clear();
                if layout.switch_lag == 0 {
                    self.switch_to(page);
                } else {
                    self.pending = Some((page, layout.switch_lag));
                }
            }
            Action::Play(label) => self.active_player = Some(label),
        }
    }

    fn visible_layers(&self, layout: &FakePage) -> Vec<Layer> {
        let mut layers = vec![Layer::Static];
        if !layout.listing.is_empty() {
            layers.push(Layer::Listing(self.current_page));
        }
        for (name, _) in &layout.menus {
            if self.open_menus.contains(name) {
                layers.push(Layer::Menu(name.clone()));
            }
        }
        if let Some(label) = &self.active_player {
            layers.push(Layer::Player(label.clone()));
        }
        layers
    }

    fn attached(&self, layout: &FakePage, element: &ElementRef) -> bool {
        let visible = match &element.layer {
            Layer::Static => true,
            Layer::Listing(index) => {
                *index == self.current_page && element.generation == self.generation
            }
            Layer::Menu(name) => self.open_menus.contains(name),
            Layer::Player(label) => self.active_player.as_deref() == Some(label.as_str()),
        };
        visible && node_at(layout.layer(&element.layer), &element.path).is_some()
    }
}

fn node_at<'a>(nodes: &'a [FakeNode], path: &[usize]) -> Option<&'a FakeNode> {
    let (first, rest) = path.split_first()?;
    let node = nodes.get(*first)?;
    if rest.is_empty() {
        Some(node)
    } else {
        node_at(&node.children, rest)
    }
}

fn collect(nodes: &[FakeNode], prefix: &[usize], selector: &str, out: &mut Vec<Vec<usize>>) {
    for (index, node) in nodes.iter().enumerate() {
        let mut path = prefix.to_vec();
        path.push(index);
        if node.matches(selector) {
            out.push(path.clone());
        }
        collect(&node.children, &path, selector, out);
    }
}

#[derive(Debug, Default)]
struct SurfaceState {
    next_id: u64,
    pages: HashMap<u64, PageState>,
    elements: HashMap<u64, ElementRef>,
}

impl SurfaceState {
    fn mint(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn mint_element(&mut self, element: ElementRef) -> ElementHandle {
        let id = self.mint();
        self.elements.insert(id, element);
        ElementHandle(id)
    }
}

/// One scripted browsing context
pub(crate) struct FakeSurface {
    site: Arc<FakeSite>,
    state: Mutex<SurfaceState>,
    opened: Mutex<Vec<String>>,
}

impl FakeSurface {
    pub(crate) fn new(site: Arc<FakeSite>) -> Self {
        Self {
            site,
            state: Mutex::new(SurfaceState::default()),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Every URL passed to `open`, in call order
    pub(crate) fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    /// Pages opened and not yet closed
    pub(crate) fn open_pages(&self) -> usize {
        self.state.lock().unwrap().pages.len()
    }

    fn check(&self) -> Result<()> {
        if self.site.unavailable.load(Ordering::SeqCst) {
            return Err(Error::SurfaceUnavailable("fake browser closed".into()));
        }
        Ok(())
    }

    fn query(&self, page: PageHandle, selector: &str) -> Result<Vec<ElementHandle>> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let page_state = state
            .pages
            .get_mut(&page.0)
            .ok_or_else(|| Error::not_found(page.to_string()))?;
        let layout = self.site.layout(&page_state.url);
        page_state.tick();

        let generation = page_state.generation;
        let mut found = Vec::new();
        for layer in page_state.visible_layers(layout) {
            let mut paths = Vec::new();
            collect(layout.layer(&layer), &[], selector, &mut paths);
            found.extend(paths.into_iter().map(|path| (layer.clone(), path)));
        }

        Ok(found
            .into_iter()
            .map(|(layer, path)| {
                state.mint_element(ElementRef {
                    page: page.0,
                    layer,
                    generation,
                    path,
                })
            })
            .collect())
    }

    /// Look up an attached element's node and pass it to `f`
    fn with_node<T>(
        &self,
        element: ElementHandle,
        f: impl FnOnce(&FakeNode, &ElementRef, &mut PageState, &FakePage) -> T,
    ) -> Result<T> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let element_ref = state
            .elements
            .get(&element.0)
            .cloned()
            .ok_or_else(|| Error::not_found(element.to_string()))?;
        let page_state = state
            .pages
            .get_mut(&element_ref.page)
            .ok_or_else(|| Error::not_found(element.to_string()))?;
        let layout = self.site.layout(&page_state.url);
        if !page_state.attached(layout, &element_ref) {
            return Err(Error::not_found(element.to_string()));
        }
        let node = node_at(layout.layer(&element_ref.layer), &element_ref.path)
            .ok_or_else(|| Error::not_found(element.to_string()))?;
        Ok(f(node, &element_ref, page_state, layout))
    }
}

#[async_trait]
impl RenderSurface for FakeSurface {
    async fn open(&self, url: &str, timeout: Duration) -> Result<PageHandle> {
        self.check()?;
        self.opened.lock().unwrap().push(url.to_string());

        if let Some(delay) = self.site.open_delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        if self.site.take_failure(url) {
            return Err(Error::timeout(url, timeout));
        }

        let mut state = self.state.lock().unwrap();
        let id = state.mint();
        state
            .pages
            .insert(id, PageState::new(url, self.site.layout(url)));
        Ok(PageHandle(id))
    }

    async fn wait_for(
        &self,
        page: PageHandle,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementHandle> {
        let start = Instant::now();
        loop {
            if let Some(element) = self.query(page, selector)?.first() {
                return Ok(*element);
            }
            if start.elapsed() >= timeout {
                return Err(Error::timeout(selector, timeout));
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn query_all(&self, page: PageHandle, selector: &str) -> Result<Vec<ElementHandle>> {
        self.query(page, selector)
    }

    async fn query_within(
        &self,
        element: ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>> {
        let found = self.with_node(element, |node, element_ref, _, _| {
            let mut paths = Vec::new();
            collect(&node.children, &element_ref.path, selector, &mut paths);
            paths.into_iter().next().map(|path| ElementRef {
                path,
                ..element_ref.clone()
            })
        })?;
        Ok(found.map(|element_ref| self.state.lock().unwrap().mint_element(element_ref)))
    }

    async fn read_attribute(&self, element: ElementHandle, name: &str) -> Result<Option<String>> {
        self.with_node(element, |node, _, page_state, _| {
            node.attribute(name, page_state.polls)
        })
    }

    async fn read_text(&self, element: ElementHandle) -> Result<String> {
        self.with_node(element, |node, _, _, _| node.text.clone())
    }

    async fn click(&self, element: ElementHandle) -> Result<()> {
        self.with_node(element, |node, _, page_state, layout| {
            if let Some(action) = node.on_click.clone() {
                page_state.apply(action, layout);
            }
        })
    }

    async fn is_attached(&self, element: ElementHandle) -> Result<bool> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let Some(element_ref) = state.elements.get(&element.0).cloned() else {
            return Ok(false);
        };
        let Some(page_state) = state.pages.get_mut(&element_ref.page) else {
            return Ok(false);
        };
        page_state.tick();
        let layout = self.site.layout(&page_state.url);
        Ok(page_state.attached(layout, &element_ref))
    }

    async fn close(&self, page: PageHandle) -> Result<()> {
        self.state.lock().unwrap().pages.remove(&page.0);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Factory handing out a fresh [`FakeSurface`] per context
pub(crate) struct FakeFactory {
    site: Arc<FakeSite>,
    contexts: AtomicUsize,
    fail: AtomicBool,
    surfaces: Mutex<Vec<Arc<FakeSurface>>>,
}

impl FakeFactory {
    pub(crate) fn new(site: Arc<FakeSite>) -> Self {
        Self {
            site,
            contexts: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            surfaces: Mutex::new(Vec::new()),
        }
    }

    /// Number of contexts created so far
    pub(crate) fn contexts(&self) -> usize {
        self.contexts.load(Ordering::SeqCst)
    }

    /// Make `new_context` fail
    pub(crate) fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// URLs opened across every context
    pub(crate) fn opened(&self) -> Vec<String> {
        self.surfaces
            .lock()
            .unwrap()
            .iter()
            .flat_map(|surface| surface.opened())
            .collect()
    }
}

#[async_trait]
impl SurfaceFactory for FakeFactory {
    async fn new_context(&self) -> Result<Arc<dyn RenderSurface>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::SurfaceUnavailable("cannot launch fake browser".into()));
        }
        self.contexts.fetch_add(1, Ordering::SeqCst);
        let surface = Arc::new(FakeSurface::new(Arc::clone(&self.site)));
        self.surfaces.lock().unwrap().push(Arc::clone(&surface));
        Ok(surface)
    }
}

/// Listing item in the chip-grid layout; `href` of `None` means click-to-play
pub(crate) fn episode_item(label: &str, href: Option<&str>) -> FakeNode {
    let mut item = FakeNode::new(&[EPISODE_ITEM])
        .child(FakeNode::new(&[EPISODE_LABEL]).text(label))
        .on_click(Action::Play(label.to_string()));
    if let Some(href) = href {
        item = item.child(FakeNode::new(&["a"]).attr("href", href));
    }
    item
}

/// Single-page show whose episodes link to their own URLs
pub(crate) fn show_page(episodes: &[(&str, &str)]) -> FakePage {
    FakePage::new().listing_page(
        episodes
            .iter()
            .map(|(label, href)| episode_item(label, Some(href)))
            .collect(),
    )
}

/// Paginated show; each page is (option label, episodes as (label, href))
pub(crate) fn paginated_show_page(pages: &[(&str, Vec<(&str, Option<&str>)>)]) -> FakePage {
    let options = pages
        .iter()
        .enumerate()
        .map(|(index, (label, _))| {
            FakeNode::new(&[MENU_OPTION])
                .text(label)
                .on_click(Action::SelectPage(index))
        })
        .collect();

    let mut page = FakePage::new()
        .node(FakeNode::new(&[PAGE_CONTROL]).on_click(Action::OpenMenu("pages".into())))
        .menu("pages", options);
    for (_, episodes) in pages {
        page = page.listing_page(
            episodes
                .iter()
                .map(|(label, href)| episode_item(label, *href))
                .collect(),
        );
    }
    page
}

fn player_frame(src: &str) -> FakeNode {
    FakeNode::new(&[PLAYER]).attr("src", src)
}

/// Episode page with a visible player and no language selector
pub(crate) fn player_page(sources: &[&str]) -> FakePage {
    FakePage::new().player("", sources.iter().map(|src| player_frame(src)).collect())
}

/// Episode page with a player and a language selector listing `languages`
pub(crate) fn player_page_with_languages(src: &str, languages: &[&str]) -> FakePage {
    let options = languages
        .iter()
        .map(|label| FakeNode::new(&[MENU_OPTION]).text(label))
        .collect();
    player_page(&[src])
        .node(FakeNode::new(&[LANGUAGE_CONTROL]).on_click(Action::OpenMenu("languages".into())))
        .menu("languages", options)
}

/// Short bounds so timeout paths finish quickly
pub(crate) fn fast_timeouts() -> TimeoutConfig {
    TimeoutConfig {
        navigation: Duration::from_millis(500),
        element: Duration::from_millis(60),
        page_change: Duration::from_millis(100),
        poll_interval: Duration::from_millis(2),
    }
}

/// Retry policy that never retries
pub(crate) fn no_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 0,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
        backoff_multiplier: 1.0,
        jitter: false,
    }
}
