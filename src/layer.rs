// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

use crate::click::{self, ClickDispatcher, ClickOutcome};
use crate::config::LayerOptions;
use crate::context::MapContext;
use crate::diff::{Reconciliation, ReconciliationEvent, reconcile};
use crate::errors::ConfigError;
use crate::feature::{Feature, HandleId, ListenerId};
use crate::kinds::{LayerKind, LayerStrategy};
use crate::popup::{RefreshQueue, replace_with_continuity};
use crate::registry::FeatureRegistry;
use crate::render::LayerRenderer;
use crate::resolver::{self, Resolution, ResolveOptions, ZoomBounds};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// One rendered layer: its registry, its click listeners and the pipeline
/// that applies each polled snapshot.
pub struct Layer<R: LayerRenderer> {
    name: String,
    strategy: Arc<dyn LayerStrategy>,
    renderer: R,
    registry: FeatureRegistry,
    clicks: ClickDispatcher,
    refresh: RefreshQueue,
    ctx: MapContext,
    options: LayerOptions,
    cycle: u64,
}

impl<R: LayerRenderer> Layer<R> {
    pub fn new(
        name: impl Into<String>,
        strategy: Arc<dyn LayerStrategy>,
        renderer: R,
        ctx: MapContext,
        options: LayerOptions,
    ) -> Result<Self, ConfigError> {
        options.validate()?;

        Ok(Self {
            name: name.into(),
            strategy,
            renderer,
            registry: FeatureRegistry::new(),
            clicks: ClickDispatcher::new(),
            refresh: RefreshQueue::new(),
            ctx,
            options,
            cycle: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> LayerKind {
        self.strategy.kind()
    }

    pub fn strategy(&self) -> &Arc<dyn LayerStrategy> {
        &self.strategy
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn clicks(&self) -> &ClickDispatcher {
        &self.clicks
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn context(&self) -> &MapContext {
        &self.ctx
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Applies one complete snapshot.
    ///
    /// Removed handles are destroyed before new ones are created. Changed
    /// handles are updated in place so their popup and listener survive.
    pub fn apply(&mut self, incoming: Vec<Feature>) -> ReconciliationEvent {
        let Reconciliation {
            added,
            changed,
            removed_ids,
        } = reconcile(&self.registry, incoming, &self.options.change_detector);

        self.cycle += 1;
        debug!(
            "{} cycle {}: {} added, {} changed, {} removed",
            self.name,
            self.cycle,
            added.len(),
            changed.len(),
            removed_ids.len()
        );

        for id in &removed_ids {
            if let Some(entry) = self.registry.remove(id) {
                self.clicks.detach(&mut self.renderer, entry.handle);
                self.refresh.cancel(id);
                self.renderer.destroy(entry.handle);
            }
        }

        let mut update = BTreeMap::new();

        for feature in added {
            let popup = self.strategy.popup(&feature);
            let style = self.strategy.style(&feature);
            let handle = self.renderer.create(&feature, &popup, &style);

            let strategy = &self.strategy;
            self.clicks
                .attach(&mut self.renderer, handle, || strategy.click_context(&feature));

            update.insert(feature.id.clone(), feature.clone());
            if let Some(stale) = self.registry.insert(feature, handle) {
                // reconcile only reports unknown ids as added
                warn!("{} replaced a live handle {:?}", self.name, stale);
                self.clicks.forget(stale);
                self.renderer.destroy(stale);
            }
        }

        let now = Instant::now();

        for feature in changed {
            let Some(handle) = self.registry.replace_feature(feature.clone()) else {
                continue;
            };

            self.renderer.move_to(handle, &feature);

            let popup = self.strategy.popup(&feature);
            let style = self.strategy.style(&feature);
            let outcome = replace_with_continuity(
                &mut self.renderer,
                self.ctx.map.as_ref(),
                handle,
                &popup,
                &style,
            );

            let strategy = &self.strategy;
            self.clicks
                .attach(&mut self.renderer, handle, || strategy.click_context(&feature));

            if outcome.was_open {
                self.refresh.schedule(feature.id.clone(), now);
            }

            update.insert(feature.id.clone(), feature);
        }

        ReconciliationEvent {
            layer: self.name.clone(),
            cycle: self.cycle,
            timestamp_ms: crate::duration_since_unix_epoch().as_millis() as u64,
            features: self
                .registry
                .iter()
                .map(|e| (e.feature.id.clone(), e.feature.clone()))
                .collect(),
            update,
            removed_ids,
        }
    }

    /// Runs the click listener attached to `handle`.
    pub fn click(&mut self, handle: HandleId) -> Option<ClickOutcome> {
        let context = self.clicks.context_for(handle)?.clone();
        Some(click::invoke(
            &context,
            self.strategy.kind().as_str(),
            &self.ctx,
            self.strategy.detail_source(),
        ))
    }

    /// Entry point for the renderer when one of its listeners fires.
    pub fn on_listener(&mut self, listener: ListenerId) -> Option<ClickOutcome> {
        let handle = self.clicks.handle_for_listener(listener)?;
        self.click(handle)
    }

    pub fn click_feature(&mut self, id: &str) -> Option<ClickOutcome> {
        let handle = self.registry.handle_of(id)?;
        self.click(handle)
    }

    /// When the next popup refresh is due, if any.
    pub fn next_refresh_due(&self) -> Option<Instant> {
        self.refresh.next_due()
    }

    /// Replays the click of every feature whose popup was reopened at least
    /// [`crate::popup::POPUP_REFRESH_DELAY`] ago.
    pub fn run_due_refreshes(&mut self, now: Instant) -> Vec<ClickOutcome> {
        self.refresh
            .take_due(now)
            .into_iter()
            .filter_map(|id| self.click_feature(&id))
            .collect()
    }

    /// Reveals and optionally selects the first feature matching `predicate`.
    pub fn resolve<P>(&mut self, predicate: P, options: &ResolveOptions) -> Option<Resolution>
    where
        P: Fn(&Feature) -> bool,
    {
        let bounds = ZoomBounds {
            min: self.options.min_zoom,
            max: self.options.max_zoom,
        };

        let clicks = &self.clicks;
        let ctx = &self.ctx;
        let strategy = &self.strategy;

        resolver::resolve(
            self.ctx.map.as_ref(),
            &mut self.renderer,
            &self.registry,
            bounds,
            predicate,
            options,
            |handle| {
                let context = clicks.context_for(handle)?.clone();
                Some(click::invoke(
                    &context,
                    strategy.kind().as_str(),
                    ctx,
                    strategy.detail_source(),
                ))
            },
        )
    }

    pub fn resolve_entity(&mut self, entity_id: &str, options: &ResolveOptions) -> Option<Resolution> {
        let id_field = self.strategy.id_field().to_string();
        self.resolve(resolver::entity_predicate(&id_field, entity_id), options)
    }

    /// Resolves by the registry id only. Public ids may be shared between
    /// features, registry ids never are.
    pub fn resolve_feature(&mut self, feature_id: &str, options: &ResolveOptions) -> Option<Resolution> {
        self.resolve(|feature| feature.id == feature_id, options)
    }

    /// Destroys every handle. The layer can be reused afterwards.
    pub fn teardown(&mut self) {
        let entries: Vec<_> = self.registry.drain().collect();
        for entry in entries {
            self.clicks.detach(&mut self.renderer, entry.handle);
            self.refresh.cancel(&entry.feature.id);
            self.renderer.destroy(entry.handle);
        }
    }
}

/// Object safe view of a layer, so search and deep links can work across
/// layers drawn by different renderers.
pub trait LayerControl: Send {
    fn name(&self) -> &str;

    fn kind(&self) -> LayerKind;

    fn strategy(&self) -> &Arc<dyn LayerStrategy>;

    fn registry(&self) -> &FeatureRegistry;

    fn resolve_entity(&mut self, entity_id: &str, options: &ResolveOptions) -> Option<Resolution>;

    fn resolve_feature(&mut self, feature_id: &str, options: &ResolveOptions) -> Option<Resolution>;
}

impl<R: LayerRenderer> LayerControl for Layer<R> {
    fn name(&self) -> &str {
        Layer::name(self)
    }

    fn kind(&self) -> LayerKind {
        Layer::kind(self)
    }

    fn strategy(&self) -> &Arc<dyn LayerStrategy> {
        Layer::strategy(self)
    }

    fn registry(&self) -> &FeatureRegistry {
        Layer::registry(self)
    }

    fn resolve_entity(&mut self, entity_id: &str, options: &ResolveOptions) -> Option<Resolution> {
        Layer::resolve_entity(self, entity_id, options)
    }

    fn resolve_feature(&mut self, feature_id: &str, options: &ResolveOptions) -> Option<Resolution> {
        Layer::resolve_feature(self, feature_id, options)
    }
}
