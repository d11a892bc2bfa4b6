// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

//! Finds the on-map object for an entity so search results and deep links
//! can reveal and select it.

use crate::click::ClickOutcome;
use crate::feature::{Feature, HandleId, LatLng};
use crate::registry::FeatureRegistry;
use crate::render::{LayerRenderer, MapSurface};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ResolveOptions {
    /// Run the click path on the match.
    pub click: bool,
    pub auto_zoom: bool,
    /// Defaults to the layer's max zoom.
    pub zoom: Option<f64>,
    /// Defaults to the matched handle's location.
    pub center: Option<LatLng>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            click: true,
            auto_zoom: true,
            zoom: None,
            center: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomBounds {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug)]
pub struct Resolution {
    pub handle: HandleId,
    pub feature_id: String,
    pub click: Option<ClickOutcome>,
}

/// Scans `registry` for the first feature matching `predicate`.
///
/// Clustering is switched off and the map zoomed out to `bounds.min` while
/// scanning so clustered markers are reachable. On a miss the viewport is put
/// back exactly as it was. Ambiguous predicates resolve to the first match in
/// registry order.
pub fn resolve<R, P, C>(
    map: &dyn MapSurface,
    renderer: &mut R,
    registry: &FeatureRegistry,
    bounds: ZoomBounds,
    predicate: P,
    options: &ResolveOptions,
    click: C,
) -> Option<Resolution>
where
    R: LayerRenderer + ?Sized,
    P: Fn(&Feature) -> bool,
    C: FnOnce(HandleId) -> Option<ClickOutcome>,
{
    let original_center = map.center();
    let original_zoom = map.zoom();

    map.set_view(original_center, bounds.min);
    renderer.set_clustering(false);

    let found = registry
        .iter()
        .find(|entry| predicate(&entry.feature))
        .map(|entry| (entry.handle, entry.feature.id.clone()));

    let Some((handle, feature_id)) = found else {
        warn!("no feature matched among {} candidates", registry.len());
        map.set_view(original_center, original_zoom);
        renderer.set_clustering(true);
        return None;
    };

    debug!("resolved {} to {:?}", feature_id, handle);

    if options.auto_zoom {
        let center = options
            .center
            .or_else(|| renderer.location(handle))
            .unwrap_or(original_center);
        map.set_view(center, options.zoom.unwrap_or(bounds.max));
    } else {
        map.set_view(original_center, original_zoom);
    }

    let click = if options.click { click(handle) } else { None };

    renderer.set_clustering(true);

    Some(Resolution {
        handle,
        feature_id,
        click,
    })
}

/// Predicate matching an entity id against the public id field, or the
/// feature id itself.
pub fn entity_predicate<'a>(id_field: &'a str, entity_id: &'a str) -> impl Fn(&Feature) -> bool + 'a {
    move |feature| {
        feature.id == entity_id
            || feature
                .properties
                .get_string(id_field)
                .is_some_and(|v| v == entity_id)
    }
}
