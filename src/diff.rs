// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

use crate::feature::Feature;
use crate::registry::FeatureRegistry;
use ahash::AHashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type ChangePredicate = dyn Fn(&Feature, &Feature) -> bool + Send + Sync;

/// Decides whether a feature present in both snapshots needs its handle
/// updated. `Always` is the default: correctness over saved redraws.
#[derive(Clone, Default)]
pub enum ChangeDetector {
    #[default]
    Always,
    /// Changed when properties or geometry are not equal.
    Content,
    Custom(Arc<ChangePredicate>),
}

impl ChangeDetector {
    pub fn custom(f: impl Fn(&Feature, &Feature) -> bool + Send + Sync + 'static) -> Self {
        ChangeDetector::Custom(Arc::new(f))
    }

    pub fn is_changed(&self, previous: &Feature, incoming: &Feature) -> bool {
        match self {
            ChangeDetector::Always => true,
            ChangeDetector::Content => {
                previous.properties != incoming.properties || previous.geometry != incoming.geometry
            }
            ChangeDetector::Custom(f) => f(previous, incoming),
        }
    }
}

impl fmt::Debug for ChangeDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeDetector::Always => write!(f, "Always"),
            ChangeDetector::Content => write!(f, "Content"),
            ChangeDetector::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Outcome of diffing one snapshot against the registry. No order is promised
/// within each list.
#[derive(Debug, Default, Clone)]
pub struct Reconciliation {
    pub added: Vec<Feature>,
    pub changed: Vec<Feature>,
    pub removed_ids: Vec<String>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed_ids.is_empty()
    }
}

/// Diffs a complete snapshot against what the registry currently holds.
///
/// Any id in the registry that is absent from `incoming` is removed. When
/// `incoming` repeats an id the last occurrence wins.
pub fn reconcile(
    previous: &FeatureRegistry,
    incoming: Vec<Feature>,
    detector: &ChangeDetector,
) -> Reconciliation {
    let mut latest: AHashMap<String, Feature> = AHashMap::with_capacity(incoming.len());
    for feature in incoming {
        latest.insert(feature.id.clone(), feature);
    }

    let removed_ids: Vec<String> = previous
        .ids()
        .filter(|id| !latest.contains_key(*id))
        .map(str::to_string)
        .collect();

    let mut added = Vec::new();
    let mut changed = Vec::new();

    for (_, feature) in latest {
        match previous.get(&feature.id) {
            None => added.push(feature),
            Some(entry) => {
                if detector.is_changed(&entry.feature, &feature) {
                    changed.push(feature);
                }
            }
        }
    }

    Reconciliation {
        added,
        changed,
        removed_ids,
    }
}

/// Published once per applied poll cycle.
#[derive(Debug, Clone)]
pub struct ReconciliationEvent {
    pub layer: String,
    pub cycle: u64,
    pub timestamp_ms: u64,
    /// Everything on screen after the cycle.
    pub features: BTreeMap<String, Feature>,
    /// Only the entries added or changed this cycle.
    pub update: BTreeMap<String, Feature>,
    pub removed_ids: Vec<String>,
}
