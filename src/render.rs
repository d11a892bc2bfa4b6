// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

//! Contracts for the drawing side of the map.
//!
//! Tiles, clustering, projection and markup live outside this crate. The
//! types here only say what content those collaborators are handed and which
//! operations the synchronisation engine needs from them.

use crate::feature::{Feature, HandleId, LatLng, ListenerId, Properties};
use serde::Serialize;
use serde_json::Value;

/// Content a popup must show for one feature.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PopupContent {
    pub title: String,
    pub rows: Vec<(String, String)>,
}

impl PopupContent {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            rows: Vec::new(),
        }
    }

    /// Adds a row when the value is present.
    pub fn row(mut self, label: &str, value: Option<String>) -> Self {
        if let Some(value) = value {
            self.rows.push((label.to_string(), value));
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MarkerStyle {
    pub icon: String,
    pub color: Option<String>,
    pub rotation_deg: Option<f64>,
    pub label: Option<String>,
}

/// On-screen objects of one layer.
///
/// Every method is synchronous: all mutation happens between the poller's
/// suspension points.
pub trait LayerRenderer: Send {
    fn create(&mut self, feature: &Feature, popup: &PopupContent, style: &MarkerStyle) -> HandleId;

    fn set_content(&mut self, handle: HandleId, popup: &PopupContent, style: &MarkerStyle);

    fn move_to(&mut self, handle: HandleId, feature: &Feature);

    fn destroy(&mut self, handle: HandleId);

    /// `false` when no popup has been bound to the handle yet.
    fn popup_is_open(&self, handle: HandleId) -> bool;

    fn open_popup(&mut self, handle: HandleId);

    fn close_popup(&mut self, handle: HandleId);

    fn location(&self, handle: HandleId) -> Option<LatLng>;

    fn attach_click(&mut self, handle: HandleId, listener: ListenerId);

    fn detach_click(&mut self, handle: HandleId, listener: ListenerId);

    fn set_clustering(&mut self, enabled: bool);
}

/// The shared map viewport.
pub trait MapSurface: Send + Sync {
    fn zoom(&self) -> f64;

    fn center(&self) -> LatLng;

    fn set_view(&self, center: LatLng, zoom: f64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SidebarPanel {
    Primary,
    Secondary,
}

/// What the secondary panel is asked to draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PanelContent {
    Loading {
        entity_id: String,
    },
    Detail {
        entity_id: String,
        kind: String,
        properties: Properties,
        records: Vec<Value>,
        /// Sub-fields still being filled in.
        pending: Vec<String>,
    },
    NotFound {
        entity_id: String,
    },
}

impl PanelContent {
    pub fn entity_id(&self) -> &str {
        match self {
            PanelContent::Loading { entity_id }
            | PanelContent::Detail { entity_id, .. }
            | PanelContent::NotFound { entity_id } => entity_id,
        }
    }
}

/// The side information surface.
pub trait PanelView: Send + Sync {
    fn set_visible(&self, panel: SidebarPanel, visible: bool);

    fn render_secondary(&self, content: &PanelContent);

    fn set_scroll_offset(&self, offset: f64);
}
