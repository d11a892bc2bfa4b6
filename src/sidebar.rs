// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

//! Primary/secondary side panel and the entity detail it shows.
//!
//! Exactly one panel is visible at a time. Populating the secondary panel
//! shows a loading placeholder straight away and renders the detail once the
//! cached detail fetches resolve. Each population takes a render token; a
//! result that arrives after the panel has moved on to another entity is
//! dropped instead of drawn over the newer one.

use crate::cache::{FetchOptions, KvCache, Payload};
use crate::feature::Properties;
use crate::render::{PanelContent, PanelView, SidebarPanel};
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How many times a missing sub-field is requested from its supplementary
/// endpoint before the panel settles for partial content.
pub const INFILL_ATTEMPTS: usize = 3;
pub const INFILL_RETRY_DELAY: Duration = Duration::from_secs(1);

pub fn scroll_key(entity_id: &str) -> String {
    format!("panel-scroll-{}", entity_id)
}

/// Scroll offset of the secondary panel per entity, for the whole session.
/// Last write wins.
#[derive(Debug, Default)]
pub struct ScrollMemory {
    offsets: DashMap<String, f64>,
}

impl ScrollMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity_id: &str) -> Option<f64> {
        self.offsets.get(&scroll_key(entity_id)).map(|v| *v)
    }

    pub fn set(&self, entity_id: &str, offset: f64) {
        self.offsets.insert(scroll_key(entity_id), offset);
    }

    pub fn clear(&self) {
        self.offsets.clear();
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Cache plus HTTP client handed to detail sources.
#[derive(Clone)]
pub struct DetailFetcher {
    pub cache: KvCache,
    pub http: reqwest::Client,
}

impl DetailFetcher {
    pub fn new(cache: KvCache, http: reqwest::Client) -> Self {
        Self { cache, http }
    }

    pub async fn get(&self, url: &str, params: &[(&str, &str)], options: FetchOptions) -> Payload {
        self.cache.fetch_url(&self.http, url, params, options).await
    }
}

/// Result of the primary detail fetch for one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailLoad {
    pub found: bool,
    pub records: Vec<Value>,
    /// Optional sub-fields the detail lacked, to be filled in afterwards.
    pub missing: Vec<String>,
}

/// Per-kind source of sidebar detail.
pub trait DetailSource: Send + Sync {
    fn load<'a>(&'a self, fetcher: &'a DetailFetcher, properties: &'a Properties) -> BoxFuture<'a, DetailLoad>;

    /// One attempt at fetching a missing sub-field. `None` means not
    /// available yet.
    fn infill<'a>(
        &'a self,
        fetcher: &'a DetailFetcher,
        properties: &'a Properties,
        field: &'a str,
    ) -> BoxFuture<'a, Option<Value>>;
}

#[derive(Debug)]
struct SidebarState {
    visible: SidebarPanel,
    current_entity: Option<String>,
    current_token: u64,
}

pub struct Sidebar {
    view: Arc<dyn PanelView>,
    fetcher: DetailFetcher,
    scroll: ScrollMemory,
    state: Mutex<SidebarState>,
    next_token: AtomicU64,
}

impl Sidebar {
    pub fn new(view: Arc<dyn PanelView>, fetcher: DetailFetcher) -> Self {
        view.set_visible(SidebarPanel::Primary, true);
        view.set_visible(SidebarPanel::Secondary, false);

        Self {
            view,
            fetcher,
            scroll: ScrollMemory::new(),
            state: Mutex::new(SidebarState {
                visible: SidebarPanel::Primary,
                current_entity: None,
                current_token: 0,
            }),
            next_token: AtomicU64::new(1),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SidebarState> {
        // state is plain data, a poisoned lock still holds a usable value
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn visible(&self) -> SidebarPanel {
        self.state().visible
    }

    pub fn current_entity(&self) -> Option<String> {
        self.state().current_entity.clone()
    }

    pub fn scroll_memory(&self) -> &ScrollMemory {
        &self.scroll
    }

    pub fn fetcher(&self) -> &DetailFetcher {
        &self.fetcher
    }

    pub fn show_primary(&self) {
        self.show(SidebarPanel::Primary);
    }

    pub fn show_secondary(&self) {
        self.show(SidebarPanel::Secondary);
    }

    fn show(&self, panel: SidebarPanel) {
        let hidden = match panel {
            SidebarPanel::Primary => SidebarPanel::Secondary,
            SidebarPanel::Secondary => SidebarPanel::Primary,
        };
        self.state().visible = panel;
        self.view.set_visible(panel, true);
        self.view.set_visible(hidden, false);
    }

    /// Scroll event from the panel surface. Only remembered while the
    /// secondary panel shows an entity.
    pub fn on_scroll(&self, offset: f64) {
        let state = self.state();
        if state.visible != SidebarPanel::Secondary {
            return;
        }
        if let Some(entity_id) = &state.current_entity {
            self.scroll.set(entity_id, offset);
        }
    }

    /// Full session reset.
    pub fn reset_session(&self) {
        self.scroll.clear();
        let mut state = self.state();
        state.current_entity = None;
        state.current_token = self.next_token.fetch_add(1, Ordering::SeqCst);
    }

    fn is_current(&self, token: u64) -> bool {
        self.state().current_token == token
    }

    /// Opens the secondary panel for an entity and starts filling it in.
    pub fn select(
        self: &Arc<Self>,
        entity_id: String,
        kind: &str,
        properties: Properties,
        source: Arc<dyn DetailSource>,
    ) -> JoinHandle<()> {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.state();
            state.current_entity = Some(entity_id.clone());
            state.current_token = token;
        }

        self.show_secondary();
        self.view.render_secondary(&PanelContent::Loading {
            entity_id: entity_id.clone(),
        });

        let sidebar = Arc::clone(self);
        let kind = kind.to_string();
        tokio::spawn(async move {
            sidebar
                .populate(token, entity_id, kind, properties, source)
                .await;
        })
    }

    async fn populate(
        &self,
        token: u64,
        entity_id: String,
        kind: String,
        mut properties: Properties,
        source: Arc<dyn DetailSource>,
    ) {
        let load = source.load(&self.fetcher, &properties).await;

        if !self.is_current(token) {
            debug!("dropping stale detail for {}", entity_id);
            return;
        }

        if !load.found {
            self.view
                .render_secondary(&PanelContent::NotFound { entity_id });
            return;
        }

        let mut pending = load.missing.clone();
        self.render_detail(&entity_id, &kind, &properties, &load.records, &pending);

        if let Some(offset) = self.scroll.get(&entity_id) {
            self.view.set_scroll_offset(offset);
        }

        for field in load.missing {
            let mut filled = None;

            for attempt in 1..=INFILL_ATTEMPTS {
                filled = source.infill(&self.fetcher, &properties, &field).await;
                if filled.is_some() {
                    break;
                }
                if attempt < INFILL_ATTEMPTS {
                    tokio::time::sleep(INFILL_RETRY_DELAY).await;
                }
            }

            if !self.is_current(token) {
                debug!("dropping stale {} infill for {}", field, entity_id);
                return;
            }

            match filled {
                Some(value) => properties = properties.with(field.as_str(), value),
                None => warn!(
                    "{} still missing for {} after {} attempts",
                    field, entity_id, INFILL_ATTEMPTS
                ),
            }

            pending.retain(|p| *p != field);
            self.render_detail(&entity_id, &kind, &properties, &load.records, &pending);
        }
    }

    fn render_detail(
        &self,
        entity_id: &str,
        kind: &str,
        properties: &Properties,
        records: &[Value],
        pending: &[String],
    ) {
        self.view.render_secondary(&PanelContent::Detail {
            entity_id: entity_id.to_string(),
            kind: kind.to_string(),
            properties: properties.clone(),
            records: records.to_vec(),
            pending: pending.to_vec(),
        });
    }
}
