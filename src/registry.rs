// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

use crate::feature::{Feature, HandleId};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub feature: Feature,
    pub handle: HandleId,
}

/// Id to handle mapping for one layer instance.
///
/// At most one handle exists per id. Iteration is ordered by id so a scan for
/// the first match is repeatable between runs.
#[derive(Debug, Default)]
pub struct FeatureRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&RegistryEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn handle_of(&self, id: &str) -> Option<HandleId> {
        self.entries.get(id).map(|e| e.handle)
    }

    pub fn find_by_handle(&self, handle: HandleId) -> Option<&RegistryEntry> {
        self.entries.values().find(|e| e.handle == handle)
    }

    /// Registers a freshly created handle. Returns the handle previously held
    /// for the id, which the caller must destroy.
    pub fn insert(&mut self, feature: Feature, handle: HandleId) -> Option<HandleId> {
        self.entries
            .insert(feature.id.clone(), RegistryEntry { feature, handle })
            .map(|old| old.handle)
    }

    /// Swaps the stored feature while keeping the handle.
    pub fn replace_feature(&mut self, feature: Feature) -> Option<HandleId> {
        let entry = self.entries.get_mut(&feature.id)?;
        entry.feature = feature;
        Some(entry.handle)
    }

    pub fn remove(&mut self, id: &str) -> Option<RegistryEntry> {
        self.entries.remove(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = RegistryEntry> + '_ {
        std::mem::take(&mut self.entries).into_values()
    }
}
