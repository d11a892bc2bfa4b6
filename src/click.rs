// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

use crate::context::MapContext;
use crate::feature::{HandleId, ListenerId, Properties};
use crate::render::LayerRenderer;
use crate::sidebar::DetailSource;
use ahash::AHashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Everything a click needs, captured when the listener is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ClickContext {
    pub feature_id: String,
    pub properties: Properties,
    /// Property used as the public identifier in the deep link.
    pub id_field: String,
    pub stop_propagation: bool,
}

impl ClickContext {
    pub fn new(feature_id: impl Into<String>, properties: Properties, id_field: impl Into<String>) -> Self {
        Self {
            feature_id: feature_id.into(),
            properties,
            id_field: id_field.into(),
            stop_propagation: true,
        }
    }

    /// `properties[id_field]`, falling back to the feature id.
    pub fn entity_id(&self) -> String {
        self.properties
            .get_string(&self.id_field)
            .unwrap_or_else(|| self.feature_id.clone())
    }
}

#[derive(Debug)]
pub struct ClickOutcome {
    pub entity_id: String,
    pub stop_propagation: bool,
    pub deep_link_set: bool,
    /// Asynchronous detail population started for the sidebar.
    pub detail_task: JoinHandle<()>,
}

#[derive(Debug)]
struct AttachedHandler {
    listener: ListenerId,
    context: ClickContext,
}

/// Keeps exactly one live click listener per handle of a layer.
#[derive(Debug, Default)]
pub struct ClickDispatcher {
    next_listener: u64,
    attached: AHashMap<HandleId, AttachedHandler>,
}

impl ClickDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces whatever listener the handle had with a new one bound to a
    /// fresh context.
    pub fn attach<R, F>(&mut self, renderer: &mut R, handle: HandleId, context_factory: F) -> ListenerId
    where
        R: LayerRenderer + ?Sized,
        F: FnOnce() -> ClickContext,
    {
        self.detach(renderer, handle);

        self.next_listener += 1;
        let listener = ListenerId(self.next_listener);

        renderer.attach_click(handle, listener);
        self.attached.insert(
            handle,
            AttachedHandler {
                listener,
                context: context_factory(),
            },
        );

        listener
    }

    pub fn detach<R: LayerRenderer + ?Sized>(&mut self, renderer: &mut R, handle: HandleId) {
        if let Some(previous) = self.attached.remove(&handle) {
            renderer.detach_click(handle, previous.listener);
        }
    }

    /// Forgets a handle the renderer has already destroyed.
    pub fn forget(&mut self, handle: HandleId) {
        self.attached.remove(&handle);
    }

    pub fn context_for(&self, handle: HandleId) -> Option<&ClickContext> {
        self.attached.get(&handle).map(|a| &a.context)
    }

    pub fn listener_for(&self, handle: HandleId) -> Option<ListenerId> {
        self.attached.get(&handle).map(|a| a.listener)
    }

    pub fn handle_for_listener(&self, listener: ListenerId) -> Option<HandleId> {
        self.attached
            .iter()
            .find(|(_, a)| a.listener == listener)
            .map(|(handle, _)| *handle)
    }

    pub fn len(&self) -> usize {
        self.attached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attached.is_empty()
    }
}

/// Runs a click: publishes the deep link then hands the entity to the
/// sidebar. A deep link failure is logged and does not stop the rest.
pub fn invoke(context: &ClickContext, kind: &str, ctx: &MapContext, detail: Arc<dyn DetailSource>) -> ClickOutcome {
    let entity_id = context.entity_id();

    let deep_link_set = match ctx.deep_link.set_fragment(&entity_id) {
        Ok(()) => true,
        Err(e) => {
            warn!("could not set deep link to {}: {}", entity_id, e);
            false
        }
    };

    let detail_task = ctx
        .sidebar
        .select(entity_id.clone(), kind, context.properties.clone(), detail);

    ClickOutcome {
        entity_id,
        stop_propagation: context.stop_propagation,
        deep_link_set,
        detail_task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Feature;
    use crate::render::{LayerRenderer, MarkerStyle, PopupContent};
    use crate::test_support::RecordingRenderer;

    #[test]
    fn attach_replaces_previous_listener() {
        let mut renderer = RecordingRenderer::default();
        let mut dispatcher = ClickDispatcher::new();
        let handle = renderer.create(
            &Feature::new("v1", Properties::new()),
            &PopupContent::default(),
            &MarkerStyle::default(),
        );

        for x in 0..5 {
            let props = Properties::new().with("x", x);
            dispatcher.attach(&mut renderer, handle, || ClickContext::new("v1", props, "vehicle_id"));
        }

        let listeners = renderer.listeners_of(handle);
        assert_eq!(listeners.len(), 1);
        assert_eq!(dispatcher.listener_for(handle), Some(listeners[0]));
        assert_eq!(dispatcher.handle_for_listener(listeners[0]), Some(handle));
        assert_eq!(
            dispatcher.context_for(handle).unwrap().properties.get_string("x").as_deref(),
            Some("4")
        );

        dispatcher.detach(&mut renderer, handle);
        assert!(renderer.listeners_of(handle).is_empty());
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn entity_id_falls_back_to_feature_id() {
        let with_field = ClickContext::new("f1", Properties::new().with("stop_id", "S9"), "stop_id");
        assert_eq!(with_field.entity_id(), "S9");

        let without = ClickContext::new("f1", Properties::new(), "stop_id");
        assert_eq!(without.entity_id(), "f1");
        assert!(without.stop_propagation);
    }
}
