// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

//! The navigable fragment naming the selected entity.
//!
//! Fragments are either `<id>` or `<kind>:<id>`, with an optional leading
//! `#`. A prefix that is not a layer kind is treated as part of the id.

use crate::errors::DeepLinkError;
use crate::kinds::LayerKind;
use crate::layer::LayerControl;
use crate::resolver::{Resolution, ResolveOptions};
use std::sync::Mutex;
use tracing::{info, warn};

/// Host surface holding the fragment, such as the page URL.
pub trait DeepLink: Send + Sync {
    fn fragment(&self) -> Option<String>;

    fn set_fragment(&self, fragment: &str) -> Result<(), DeepLinkError>;
}

#[derive(Debug, Default)]
pub struct MemoryDeepLink {
    current: Mutex<Option<String>>,
}

impl MemoryDeepLink {
    pub fn new(initial: Option<String>) -> Self {
        Self {
            current: Mutex::new(initial),
        }
    }
}

impl DeepLink for MemoryDeepLink {
    fn fragment(&self) -> Option<String> {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_fragment(&self, fragment: &str) -> Result<(), DeepLinkError> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(fragment.to_string());
        Ok(())
    }
}

/// A host without a fragment, every write fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableDeepLink;

impl DeepLink for UnavailableDeepLink {
    fn fragment(&self) -> Option<String> {
        None
    }

    fn set_fragment(&self, _fragment: &str) -> Result<(), DeepLinkError> {
        Err(DeepLinkError::Unavailable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepLinkTarget {
    pub kind: Option<LayerKind>,
    pub entity_id: String,
}

pub fn parse_fragment(raw: &str) -> Option<DeepLinkTarget> {
    let trimmed = raw.trim().trim_start_matches('#');
    let decoded = urlencoding::decode(trimmed)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| trimmed.to_string());

    if decoded.is_empty() {
        return None;
    }

    if let Some((prefix, rest)) = decoded.split_once(':') {
        if let Ok(kind) = prefix.parse::<LayerKind>() {
            if rest.is_empty() {
                return None;
            }
            return Some(DeepLinkTarget {
                kind: Some(kind),
                entity_id: rest.to_string(),
            });
        }
    }

    Some(DeepLinkTarget {
        kind: None,
        entity_id: decoded,
    })
}

/// Selects the entity named by the current fragment, trying each layer of
/// the matching kind in order.
pub fn preselect(
    deep_link: &dyn DeepLink,
    layers: &mut [&mut dyn LayerControl],
    options: &ResolveOptions,
) -> Option<Resolution> {
    let raw = deep_link.fragment()?;
    let target = parse_fragment(&raw)?;

    for layer in layers.iter_mut() {
        if target.kind.is_some_and(|k| k != layer.kind()) {
            continue;
        }
        if let Some(resolution) = layer.resolve_entity(&target.entity_id, options) {
            info!("deep link {} resolved in {}", raw, layer.name());
            return Some(resolution);
        }
    }

    warn!("deep link {} did not match any feature", raw);
    None
}
