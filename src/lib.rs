// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

#![deny(
    clippy::mutable_key_type,
    clippy::map_entry,
    clippy::boxed_local,
    clippy::let_unit_value,
    clippy::redundant_allocation,
    clippy::bool_comparison,
    clippy::bind_instead_of_map,
    clippy::vec_box,
    clippy::while_let_loop,
    clippy::useless_asref,
    clippy::repeat_once,
    clippy::deref_addrof,
    clippy::suspicious_map,
    clippy::arc_with_non_send_sync,
    clippy::single_char_pattern,
    clippy::for_kv_map,
    clippy::let_and_return,
    clippy::iter_nth,
    clippy::iter_cloned_collect,
    clippy::bytes_nth,
    clippy::match_result_ok,
    clippy::cmp_owned,
    clippy::cmp_null,
    clippy::op_ref
)]

//! Realtime layer synchronisation for the Catenary map.
//!
//! A layer polls a feature collection, reconciles it against what is already
//! on screen, and keeps the open popup, the click listener of every marker,
//! the sidebar and the deep link coherent across refreshes.

pub mod cache;
pub mod click;
pub mod config;
pub mod context;
pub mod deeplink;
pub mod diff;
pub mod errors;
pub mod feature;
pub mod kinds;
pub mod layer;
pub mod poller;
pub mod popup;
pub mod registry;
pub mod render;
pub mod resolver;
pub mod search;
pub mod sidebar;

#[cfg(test)]
mod test_support;
#[cfg(test)]
mod test_layer_cycles;

use std::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

pub use context::MapContext;
pub use feature::{Feature, HandleId, LatLng, ListenerId, Properties};
pub use layer::Layer;

pub fn duration_since_unix_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

/// Stable hash used for on-disk key names. Unlike ahash this does not change
/// between processes.
pub fn stable_hash(input: &str) -> u64 {
    seahash::hash(input.as_bytes())
}
