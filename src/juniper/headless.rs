// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

// Collaborators with no screen behind them. Everything is traced so the sync
// loop can be watched from a terminal.

use ahash::AHashMap;
use layer_sync::render::{
    LayerRenderer, MapSurface, MarkerStyle, PanelContent, PanelView, PopupContent, SidebarPanel,
};
use layer_sync::{Feature, HandleId, LatLng, ListenerId};
use std::sync::Mutex;
use tracing::{debug, info};

struct Marker {
    feature_id: String,
    location: Option<LatLng>,
    popup_open: bool,
}

#[derive(Default)]
pub struct LogRenderer {
    next: u64,
    markers: AHashMap<HandleId, Marker>,
}

impl LayerRenderer for LogRenderer {
    fn create(&mut self, feature: &Feature, popup: &PopupContent, _style: &MarkerStyle) -> HandleId {
        self.next += 1;
        let handle = HandleId(self.next);
        debug!("create {} as {:?}: {}", feature.id, handle, popup.title);
        self.markers.insert(
            handle,
            Marker {
                feature_id: feature.id.clone(),
                location: feature.anchor(),
                popup_open: false,
            },
        );
        handle
    }

    fn set_content(&mut self, handle: HandleId, popup: &PopupContent, _style: &MarkerStyle) {
        debug!("restyle {:?}: {}", handle, popup.title);
    }

    fn move_to(&mut self, handle: HandleId, feature: &Feature) {
        if let Some(marker) = self.markers.get_mut(&handle) {
            if let Some(anchor) = feature.anchor() {
                marker.location = Some(anchor);
            }
        }
    }

    fn destroy(&mut self, handle: HandleId) {
        if let Some(marker) = self.markers.remove(&handle) {
            debug!("destroy {} ({:?})", marker.feature_id, handle);
        }
    }

    fn popup_is_open(&self, handle: HandleId) -> bool {
        self.markers.get(&handle).is_some_and(|m| m.popup_open)
    }

    fn open_popup(&mut self, handle: HandleId) {
        if let Some(marker) = self.markers.get_mut(&handle) {
            marker.popup_open = true;
        }
    }

    fn close_popup(&mut self, handle: HandleId) {
        if let Some(marker) = self.markers.get_mut(&handle) {
            marker.popup_open = false;
        }
    }

    fn location(&self, handle: HandleId) -> Option<LatLng> {
        self.markers.get(&handle).and_then(|m| m.location)
    }

    fn attach_click(&mut self, _handle: HandleId, _listener: ListenerId) {}

    fn detach_click(&mut self, _handle: HandleId, _listener: ListenerId) {}

    fn set_clustering(&mut self, enabled: bool) {
        debug!("clustering {}", if enabled { "on" } else { "off" });
    }
}

pub struct LogMap {
    view: Mutex<(LatLng, f64)>,
}

impl LogMap {
    pub fn new(center: LatLng, zoom: f64) -> Self {
        Self {
            view: Mutex::new((center, zoom)),
        }
    }
}

impl MapSurface for LogMap {
    fn zoom(&self) -> f64 {
        self.view.lock().unwrap_or_else(|e| e.into_inner()).1
    }

    fn center(&self) -> LatLng {
        self.view.lock().unwrap_or_else(|e| e.into_inner()).0
    }

    fn set_view(&self, center: LatLng, zoom: f64) {
        info!("view {:.5},{:.5} z{:.1}", center.lat, center.lon, zoom);
        *self.view.lock().unwrap_or_else(|e| e.into_inner()) = (center, zoom);
    }
}

pub struct LogPanel;

impl PanelView for LogPanel {
    fn set_visible(&self, panel: SidebarPanel, visible: bool) {
        debug!("{:?} panel visible: {}", panel, visible);
    }

    fn render_secondary(&self, content: &PanelContent) {
        match serde_json::to_string(content) {
            Ok(json) => info!("sidebar {}", json),
            Err(_) => info!("sidebar {:?}", content),
        }
    }

    fn set_scroll_offset(&self, offset: f64) {
        debug!("sidebar scroll {}", offset);
    }
}
