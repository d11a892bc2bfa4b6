// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

//! Text search over the features currently on the map.

use crate::kinds::LayerKind;
use crate::layer::LayerControl;
use crate::resolver::{Resolution, ResolveOptions};
use tracing::warn;

pub const DEFAULT_SEARCH_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub layer: String,
    pub kind: LayerKind,
    pub feature_id: String,
    pub entity_id: String,
    pub label: String,
    /// The entity id or the feature id equals the query.
    pub id_match: bool,
    /// One of the searched fields equals the query.
    pub exact: bool,
}

impl SearchHit {
    fn tier(&self) -> u8 {
        match (self.id_match, self.exact) {
            (true, _) => 0,
            (false, true) => 1,
            (false, false) => 2,
        }
    }
}

/// Case-insensitive substring match over each layer's search fields.
///
/// Hits whose id equals the query rank first, then hits where any other
/// searched field equals it, then the rest. Ties are ordered by label.
pub fn search_layers(layers: &[&dyn LayerControl], query: &str, limit: usize) -> Vec<SearchHit> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut hits = Vec::new();

    for layer in layers {
        let strategy = layer.strategy();
        let fields = strategy.search_fields();

        for entry in layer.registry().iter() {
            let feature = &entry.feature;
            let values: Vec<String> = fields
                .iter()
                .filter_map(|f| feature.properties.get_string(f))
                .map(|v| v.to_lowercase())
                .collect();

            if !values.iter().any(|v| v.contains(&needle)) {
                continue;
            }

            let entity_id = feature
                .properties
                .get_string(strategy.id_field())
                .unwrap_or_else(|| feature.id.clone());

            hits.push(SearchHit {
                layer: layer.name().to_string(),
                kind: layer.kind(),
                id_match: entity_id.to_lowercase() == needle || feature.id.to_lowercase() == needle,
                feature_id: feature.id.clone(),
                entity_id,
                label: strategy.label(feature),
                exact: values.iter().any(|v| *v == needle),
            });
        }
    }

    hits.sort_by(|a, b| {
        a.tier()
            .cmp(&b.tier())
            .then_with(|| a.label.cmp(&b.label))
            .then_with(|| a.feature_id.cmp(&b.feature_id))
    });
    hits.truncate(limit);
    hits
}

/// Reveals and selects a search hit on the layer it came from, by its
/// registry id.
pub fn select_hit(
    layers: &mut [&mut dyn LayerControl],
    hit: &SearchHit,
    options: &ResolveOptions,
) -> Option<Resolution> {
    let Some(layer) = layers.iter_mut().find(|l| l.name() == hit.layer) else {
        warn!("search hit refers to unknown layer {}", hit.layer);
        return None;
    };

    layer.resolve_feature(&hit.feature_id, options)
}
