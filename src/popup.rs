// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

use crate::feature::HandleId;
use crate::render::{LayerRenderer, MapSurface, MarkerStyle, PopupContent};
use std::time::Duration;
use tokio::time::Instant;

/// Wait between reopening a popup and replaying its click, so the redraw has
/// settled before the sidebar is refreshed. Tunable, not a correctness bound.
pub const POPUP_REFRESH_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuityOutcome {
    pub was_open: bool,
}

/// Replaces the popup content and marker style of `handle`, keeping an open
/// popup open and centred.
///
/// A handle with no popup bound reports closed and is simply restyled.
pub fn replace_with_continuity<R: LayerRenderer + ?Sized>(
    renderer: &mut R,
    map: &dyn MapSurface,
    handle: HandleId,
    popup: &PopupContent,
    style: &MarkerStyle,
) -> ContinuityOutcome {
    let was_open = renderer.popup_is_open(handle);

    if was_open {
        renderer.close_popup(handle);
    }

    renderer.set_content(handle, popup, style);

    if was_open {
        if let Some(location) = renderer.location(handle) {
            map.set_view(location, map.zoom());
        }
        renderer.open_popup(handle);
    }

    ContinuityOutcome { was_open }
}

/// Feature ids whose click should be replayed once the refresh delay passes.
#[derive(Debug, Default)]
pub struct RefreshQueue {
    pending: Vec<(String, Instant)>,
}

impl RefreshQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a replay. A later request for the same id replaces the earlier
    /// one.
    pub fn schedule(&mut self, id: String, now: Instant) {
        self.pending.retain(|(pending_id, _)| *pending_id != id);
        self.pending.push((id, now + POPUP_REFRESH_DELAY));
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.pending.iter().map(|(_, at)| *at).min()
    }

    pub fn take_due(&mut self, now: Instant) -> Vec<String> {
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|(_, at)| *at <= now);
        self.pending = waiting;
        due.into_iter().map(|(id, _)| id).collect()
    }

    pub fn cancel(&mut self, id: &str) {
        self.pending.retain(|(pending_id, _)| pending_id != id);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
