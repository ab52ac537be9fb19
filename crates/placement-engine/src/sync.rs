// Copyright 2025 EventMap Desktop Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Viewport sync reactor: keeps visual anchors derived from geography.
//!
//! Owns the explicit item-id → visual-anchor map the host renders from.
//! After every viewport change (pan, zoom, resize, programmatic recentering)
//! and every store mutation it recomputes each anchor's pixel position from
//! the item's stored geographic coordinate and clears any leftover drag
//! offset. The reactor never writes geographic coordinates — pixel positions
//! here are always derived, never authoritative.

use std::collections::HashMap;

use log::trace;

use crate::error::PlanError;
use crate::geo::{PixelOffset, PixelPoint};
use crate::store::{ItemId, PlacementStore};
use crate::viewport::ViewportAdapter;

/// The visual handle of one placed item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemAnchor {
    /// Pixel position derived from the item's geographic coordinate under
    /// the viewport of the last sync pass. Ephemeral; never persisted.
    pub pixel: PixelPoint,
    /// Transient visual displacement applied by an in-progress drag.
    /// Cleared on every sync pass.
    pub drag_offset: PixelOffset,
}

impl ItemAnchor {
    /// Where the host should draw this item right now.
    #[must_use]
    pub fn render_pixel(&self) -> PixelPoint {
        self.pixel.offset_by(self.drag_offset)
    }
}

/// Recomputes visual anchors whenever the viewport or the store changes.
#[derive(Debug, Default)]
pub struct ViewportSyncReactor {
    anchors: HashMap<ItemId, ItemAnchor>,
    seen_viewport_revision: Option<u64>,
    seen_store_revision: Option<u64>,
}

impl ViewportSyncReactor {
    /// Create an empty reactor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute every anchor from the store snapshot and the current
    /// viewport. Idempotent; drops anchors for items no longer in the store
    /// and clears all drag offsets.
    pub fn sync<V: ViewportAdapter>(
        &mut self,
        viewport: &V,
        store: &PlacementStore,
    ) -> Result<(), PlanError> {
        let projection = viewport.projection()?;

        let mut anchors = HashMap::with_capacity(store.len());
        for item in store.items() {
            anchors.insert(
                item.id,
                ItemAnchor {
                    pixel: projection.geo_to_pixel(item.coordinate),
                    drag_offset: PixelOffset::ZERO,
                },
            );
        }
        self.anchors = anchors;
        self.seen_viewport_revision = Some(viewport.revision());
        self.seen_store_revision = Some(store.revision());
        trace!("Re-anchored {} items", self.anchors.len());
        Ok(())
    }

    /// Run a sync pass only if the viewport or the store moved since the
    /// last one. Returns whether a pass ran.
    pub fn sync_if_changed<V: ViewportAdapter>(
        &mut self,
        viewport: &V,
        store: &PlacementStore,
    ) -> Result<bool, PlanError> {
        let unchanged = self.seen_viewport_revision == Some(viewport.revision())
            && self.seen_store_revision == Some(store.revision());
        if unchanged {
            return Ok(false);
        }
        self.sync(viewport, store)?;
        Ok(true)
    }

    /// Apply a purely visual displacement to one anchor while its item is
    /// being dragged. Does not touch the derived pixel position.
    pub fn nudge(&mut self, id: ItemId, dx: f64, dy: f64) {
        if let Some(anchor) = self.anchors.get_mut(&id) {
            anchor.drag_offset.accumulate(dx, dy);
        }
    }

    /// The anchor for one item.
    #[must_use]
    pub fn anchor(&self, id: ItemId) -> Option<&ItemAnchor> {
        self.anchors.get(&id)
    }

    /// Iterate over all anchors.
    pub fn anchors(&self) -> impl Iterator<Item = (ItemId, &ItemAnchor)> {
        self.anchors.iter().map(|(id, anchor)| (*id, anchor))
    }

    /// Number of anchored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Whether the reactor holds no anchors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}
