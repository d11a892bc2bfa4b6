// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

//! Recording fakes for the drawing collaborators.

use crate::feature::{Feature, HandleId, LatLng, ListenerId};
use crate::render::{
    LayerRenderer, MapSurface, MarkerStyle, PanelContent, PanelView, PopupContent, SidebarPanel,
};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RecordedHandle {
    pub feature_id: String,
    pub popup: PopupContent,
    pub style: MarkerStyle,
    pub popup_open: bool,
    pub location: Option<LatLng>,
    pub listeners: Vec<ListenerId>,
    pub closes: usize,
}

#[derive(Debug, Default)]
pub struct RecordingRenderer {
    next_handle: u64,
    pub handles: BTreeMap<HandleId, RecordedHandle>,
    /// "create:<id>" / "destroy:<id>" in call order.
    pub events: Vec<String>,
    pub clustering: bool,
    pub clustering_history: Vec<bool>,
}

impl RecordingRenderer {
    pub fn set_location(&mut self, handle: HandleId, location: LatLng) {
        if let Some(h) = self.handles.get_mut(&handle) {
            h.location = Some(location);
        }
    }

    pub fn popup_of(&self, handle: HandleId) -> Option<&PopupContent> {
        self.handles.get(&handle).map(|h| &h.popup)
    }

    pub fn listeners_of(&self, handle: HandleId) -> Vec<ListenerId> {
        self.handles
            .get(&handle)
            .map(|h| h.listeners.clone())
            .unwrap_or_default()
    }

    pub fn close_count(&self, handle: HandleId) -> usize {
        self.handles.get(&handle).map_or(0, |h| h.closes)
    }

    pub fn live_feature_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handles.values().map(|h| h.feature_id.clone()).collect();
        ids.sort();
        ids
    }
}

impl LayerRenderer for RecordingRenderer {
    fn create(&mut self, feature: &Feature, popup: &PopupContent, style: &MarkerStyle) -> HandleId {
        self.next_handle += 1;
        let handle = HandleId(self.next_handle);
        self.handles.insert(
            handle,
            RecordedHandle {
                feature_id: feature.id.clone(),
                popup: popup.clone(),
                style: style.clone(),
                popup_open: false,
                location: feature.anchor(),
                listeners: Vec::new(),
                closes: 0,
            },
        );
        self.events.push(format!("create:{}", feature.id));
        handle
    }

    fn set_content(&mut self, handle: HandleId, popup: &PopupContent, style: &MarkerStyle) {
        if let Some(h) = self.handles.get_mut(&handle) {
            h.popup = popup.clone();
            h.style = style.clone();
        }
    }

    fn move_to(&mut self, handle: HandleId, feature: &Feature) {
        if let Some(h) = self.handles.get_mut(&handle) {
            if let Some(anchor) = feature.anchor() {
                h.location = Some(anchor);
            }
        }
    }

    fn destroy(&mut self, handle: HandleId) {
        if let Some(h) = self.handles.remove(&handle) {
            self.events.push(format!("destroy:{}", h.feature_id));
        }
    }

    fn popup_is_open(&self, handle: HandleId) -> bool {
        self.handles.get(&handle).is_some_and(|h| h.popup_open)
    }

    fn open_popup(&mut self, handle: HandleId) {
        if let Some(h) = self.handles.get_mut(&handle) {
            h.popup_open = true;
        }
    }

    fn close_popup(&mut self, handle: HandleId) {
        if let Some(h) = self.handles.get_mut(&handle) {
            h.popup_open = false;
            h.closes += 1;
        }
    }

    fn location(&self, handle: HandleId) -> Option<LatLng> {
        self.handles.get(&handle).and_then(|h| h.location)
    }

    fn attach_click(&mut self, handle: HandleId, listener: ListenerId) {
        if let Some(h) = self.handles.get_mut(&handle) {
            h.listeners.push(listener);
        }
    }

    fn detach_click(&mut self, handle: HandleId, listener: ListenerId) {
        if let Some(h) = self.handles.get_mut(&handle) {
            h.listeners.retain(|l| *l != listener);
        }
    }

    fn set_clustering(&mut self, enabled: bool) {
        self.clustering = enabled;
        self.clustering_history.push(enabled);
    }
}

#[derive(Debug)]
pub struct RecordingMap {
    view: Mutex<(LatLng, f64)>,
    pub history: Mutex<Vec<(LatLng, f64)>>,
}

impl RecordingMap {
    pub fn new(center: LatLng, zoom: f64) -> Self {
        Self {
            view: Mutex::new((center, zoom)),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn view(&self) -> (LatLng, f64) {
        *self.view.lock().unwrap()
    }
}

impl MapSurface for RecordingMap {
    fn zoom(&self) -> f64 {
        self.view.lock().unwrap().1
    }

    fn center(&self) -> LatLng {
        self.view.lock().unwrap().0
    }

    fn set_view(&self, center: LatLng, zoom: f64) {
        *self.view.lock().unwrap() = (center, zoom);
        self.history.lock().unwrap().push((center, zoom));
    }
}

#[derive(Debug, Default)]
pub struct RecordingPanel {
    pub visible: Mutex<BTreeMap<String, bool>>,
    pub rendered: Mutex<Vec<PanelContent>>,
    pub scroll_offset: Mutex<Option<f64>>,
}

impl RecordingPanel {
    pub fn is_visible(&self, panel: SidebarPanel) -> bool {
        self.visible
            .lock()
            .unwrap()
            .get(&format!("{:?}", panel))
            .copied()
            .unwrap_or(false)
    }

    pub fn last_rendered(&self) -> Option<PanelContent> {
        self.rendered.lock().unwrap().last().cloned()
    }

    pub fn rendered(&self) -> Vec<PanelContent> {
        self.rendered.lock().unwrap().clone()
    }

    pub fn scroll_offset(&self) -> Option<f64> {
        *self.scroll_offset.lock().unwrap()
    }
}

impl PanelView for RecordingPanel {
    fn set_visible(&self, panel: SidebarPanel, visible: bool) {
        self.visible
            .lock()
            .unwrap()
            .insert(format!("{:?}", panel), visible);
    }

    fn render_secondary(&self, content: &PanelContent) {
        self.rendered.lock().unwrap().push(content.clone());
    }

    fn set_scroll_offset(&self, offset: f64) {
        *self.scroll_offset.lock().unwrap() = Some(offset);
    }
}
