// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

use crate::cache::KvCache;
use crate::deeplink::DeepLink;
use crate::render::{MapSurface, PanelView};
use crate::sidebar::{DetailFetcher, Sidebar};
use std::sync::Arc;

/// Collaborators shared by every layer on one map. Passed to each layer at
/// construction instead of living in globals.
#[derive(Clone)]
pub struct MapContext {
    pub map: Arc<dyn MapSurface>,
    pub deep_link: Arc<dyn DeepLink>,
    pub sidebar: Arc<Sidebar>,
    pub cache: KvCache,
}

impl MapContext {
    pub fn new(
        map: Arc<dyn MapSurface>,
        deep_link: Arc<dyn DeepLink>,
        panel: Arc<dyn PanelView>,
        cache: KvCache,
        http: reqwest::Client,
    ) -> Self {
        let sidebar = Arc::new(Sidebar::new(
            panel,
            DetailFetcher::new(cache.clone(), http),
        ));

        Self {
            map,
            deep_link,
            sidebar,
            cache,
        }
    }
}
