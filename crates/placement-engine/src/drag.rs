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

//! Drag/drop coordinator: explicit state machines for the two gestures.
//!
//! Flow A ([`PaletteDrag`]) places a new item: palette entry → ghost follows
//! the pointer → pointer-up over the drop surface converts once and creates
//! a store entry. Flow B ([`ItemDrag`]) repositions an existing item: moves
//! accumulate a purely visual offset, and pointer-up converts once and
//! writes the store — at most one mutation per gesture no matter how many
//! move events arrived.
//!
//! A gesture's pixel-space reference frame is the [`Projection`] snapshot
//! taken at pointer-down. The viewport is never re-sampled mid-gesture, so
//! a pan or zoom while dragging cannot combine stale pixel deltas with a
//! new projection.

use log::debug;

use crate::error::PlanError;
use crate::geo::{PixelOffset, PixelPoint};
use crate::store::{ItemId, ItemKind, PlacementStore};
use crate::viewport::{Projection, ViewportAdapter};

/// Fraction of the dragged element's area that must overlap the drop
/// surface for a release to count as a drop.
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.5;

/// Configuration for the drop surface.
#[derive(Debug, Clone, Copy)]
pub struct DropZoneConfig {
    /// Required overlap fraction in `[0, 1]`.
    pub overlap_threshold: f64,
}

impl Default for DropZoneConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
        }
    }
}

/// The region of the interface that accepts a completed palette drag.
///
/// Tracks the activation and hover state the host uses for visual feedback
/// (the `dropactivate` / `dragenter` / `dragleave` / `dropdeactivate`
/// lifecycle) and owns the overlap-threshold acceptance rule.
#[derive(Debug, Default)]
pub struct DropZone {
    config: DropZoneConfig,
    active: bool,
    hovering: bool,
}

impl DropZone {
    /// Create a drop zone with the given configuration.
    #[must_use]
    pub fn new(config: DropZoneConfig) -> Self {
        Self {
            config,
            active: false,
            hovering: false,
        }
    }

    /// A palette drag started; the zone lights up as a potential target.
    pub fn activate(&mut self) {
        self.active = true;
        debug!("Drop zone activated");
    }

    /// The gesture ended; clears all transient state.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.hovering = false;
        debug!("Drop zone deactivated");
    }

    /// Update the hover state from the current ghost/zone overlap fraction.
    pub fn update_hover(&mut self, overlap: f64) {
        let hovering = self.active && overlap > 0.0;
        if hovering != self.hovering {
            debug!(
                "Drag {} drop zone",
                if hovering { "entered" } else { "left" }
            );
            self.hovering = hovering;
        }
    }

    /// Whether a release with the given overlap fraction counts as a drop.
    #[must_use]
    pub fn accepts(&self, overlap: f64) -> bool {
        self.active && overlap >= self.config.overlap_threshold
    }

    /// Whether a palette drag is currently in progress.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether the ghost currently overlaps the zone.
    #[must_use]
    pub fn is_hovering(&self) -> bool {
        self.hovering
    }
}

/// Outcome of a completed palette drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    /// The release landed on the drop surface; an item was created.
    Dropped(ItemId),
    /// The release landed elsewhere; no store mutation happened.
    Cancelled,
}

/// Flow A: dragging a new item from the tool palette onto the map.
#[derive(Debug, Default)]
pub enum PaletteDrag {
    /// No palette gesture in progress.
    #[default]
    Idle,
    /// A palette entry is being dragged; the host draws the ghost at
    /// `pointer`.
    Dragging { kind: ItemKind, pointer: PixelPoint },
}

impl PaletteDrag {
    /// Pointer-down over a palette entry.
    pub fn begin(&mut self, kind: ItemKind, pointer: PixelPoint, zone: &mut DropZone) {
        debug!("Started dragging {} from palette", kind.as_str());
        zone.activate();
        *self = PaletteDrag::Dragging { kind, pointer };
    }

    /// Pointer moved; the ghost follows.
    pub fn move_to(&mut self, to: PixelPoint, overlap: f64, zone: &mut DropZone) {
        if let PaletteDrag::Dragging { pointer, .. } = self {
            *pointer = to;
            zone.update_hover(overlap);
        }
    }

    /// Pointer-up. Creates an item iff the release is accepted by the drop
    /// zone and a map-local drop point is known; otherwise the gesture
    /// cancels with zero store mutations.
    pub fn finish<V: ViewportAdapter>(
        &mut self,
        overlap: f64,
        map_point: Option<PixelPoint>,
        zone: &mut DropZone,
        viewport: &V,
        store: &mut PlacementStore,
    ) -> Result<DropOutcome, PlanError> {
        let state = std::mem::take(self);
        let accepted = zone.accepts(overlap);
        zone.deactivate();

        let PaletteDrag::Dragging { kind, .. } = state else {
            return Ok(DropOutcome::Cancelled);
        };

        match map_point {
            Some(point) if accepted => {
                let coordinate = viewport.pixel_to_geo(point)?;
                let id = store.create(kind, coordinate);
                Ok(DropOutcome::Dropped(id))
            }
            _ => {
                debug!("Palette drag cancelled outside drop surface");
                Ok(DropOutcome::Cancelled)
            }
        }
    }

    /// The ghost's current pointer position, if a drag is in progress.
    #[must_use]
    pub fn ghost(&self) -> Option<(ItemKind, PixelPoint)> {
        match self {
            PaletteDrag::Idle => None,
            PaletteDrag::Dragging { kind, pointer } => Some((*kind, *pointer)),
        }
    }
}

/// Flow B: repositioning an already-placed item.
#[derive(Debug, Default)]
pub enum ItemDrag {
    /// No item gesture in progress.
    #[default]
    Idle,
    /// An item is being dragged. `frame` is the projection frozen at
    /// pointer-down; `offset` is the purely visual displacement so far.
    Dragging {
        id: ItemId,
        start: PixelPoint,
        offset: PixelOffset,
        frame: Projection,
    },
}

impl ItemDrag {
    /// Pointer-down on a placed item's anchor. Freezes the projection for
    /// the duration of the gesture.
    pub fn begin<V: ViewportAdapter>(
        &mut self,
        id: ItemId,
        start: PixelPoint,
        viewport: &V,
    ) -> Result<(), PlanError> {
        let frame = viewport.projection()?;
        debug!("Started dragging placed item {}", id);
        *self = ItemDrag::Dragging {
            id,
            start,
            offset: PixelOffset::ZERO,
            frame,
        };
        Ok(())
    }

    /// Accumulate a pointer-move delta. Purely visual: no conversions, no
    /// store writes, regardless of how many times this is called.
    pub fn move_by(&mut self, dx: f64, dy: f64) {
        if let ItemDrag::Dragging { offset, .. } = self {
            offset.accumulate(dx, dy);
        }
    }

    /// Pointer-up: the single authoritative write point. Converts the final
    /// pixel position once through the frozen frame and commits it to the
    /// store. Returns the repositioned item's id, or `None` when no gesture
    /// was in progress.
    pub fn commit(&mut self, store: &mut PlacementStore) -> Result<Option<ItemId>, PlanError> {
        let state = std::mem::take(self);
        let ItemDrag::Dragging {
            id,
            start,
            offset,
            frame,
        } = state
        else {
            return Ok(None);
        };

        let coordinate = frame.pixel_to_geo(start.offset_by(offset));
        store.update_position(id, coordinate)?;
        debug!("Finished dragging placed item {}", id);
        Ok(Some(id))
    }

    /// Id of the item being dragged, if any.
    #[must_use]
    pub fn dragged_item(&self) -> Option<ItemId> {
        match self {
            ItemDrag::Idle => None,
            ItemDrag::Dragging { id, .. } => Some(*id),
        }
    }

    /// The dragged item's current visual position (start + offset).
    #[must_use]
    pub fn current_pixel(&self) -> Option<PixelPoint> {
        match self {
            ItemDrag::Idle => None,
            ItemDrag::Dragging { start, offset, .. } => Some(start.offset_by(*offset)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::LatLng;
    use crate::viewport::MercatorViewport;

    fn ready_viewport() -> MercatorViewport {
        let mut viewport = MercatorViewport::new(LatLng::new(54.87157, 23.93421), 15.0);
        viewport.resize(800.0, 600.0);
        viewport
    }

    #[test]
    fn test_palette_drop_creates_one_item() {
        let viewport = ready_viewport();
        let mut store = PlacementStore::new();
        let mut zone = DropZone::default();
        let mut drag = PaletteDrag::default();

        drag.begin(ItemKind::Tent, PixelPoint::new(10.0, 10.0), &mut zone);
        assert!(zone.is_active());
        drag.move_to(PixelPoint::new(300.0, 200.0), 1.0, &mut zone);
        assert!(zone.is_hovering());

        let outcome = drag
            .finish(1.0, Some(PixelPoint::new(300.0, 200.0)), &mut zone, &viewport, &mut store)
            .unwrap();

        let DropOutcome::Dropped(id) = outcome else {
            panic!("expected a drop");
        };
        assert_eq!(store.len(), 1);
        assert!(!zone.is_active());

        // The created coordinate converts back to the drop pixel.
        let pixel = viewport.geo_to_pixel(store.get(id).unwrap().coordinate).unwrap();
        assert!((pixel.x - 300.0).abs() < 1e-6);
        assert!((pixel.y - 200.0).abs() < 1e-6);
    }

    #[test]
    fn test_palette_release_outside_mutates_nothing() {
        let viewport = ready_viewport();
        let mut store = PlacementStore::new();
        let mut zone = DropZone::default();
        let mut drag = PaletteDrag::default();

        drag.begin(ItemKind::Stage, PixelPoint::new(10.0, 10.0), &mut zone);
        let outcome = drag.finish(0.0, None, &mut zone, &viewport, &mut store).unwrap();

        assert_eq!(outcome, DropOutcome::Cancelled);
        assert!(store.is_empty());
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_overlap_threshold_is_configurable() {
        let viewport = ready_viewport();
        let mut store = PlacementStore::new();
        let mut zone = DropZone::new(DropZoneConfig {
            overlap_threshold: 0.9,
        });
        let mut drag = PaletteDrag::default();

        drag.begin(ItemKind::Food, PixelPoint::new(10.0, 10.0), &mut zone);
        let outcome = drag
            .finish(0.5, Some(PixelPoint::new(100.0, 100.0)), &mut zone, &viewport, &mut store)
            .unwrap();

        assert_eq!(outcome, DropOutcome::Cancelled);
        assert!(store.is_empty());
    }

    #[test]
    fn test_item_drag_commits_exactly_once() {
        let viewport = ready_viewport();
        let mut store = PlacementStore::new();
        let id = store.create(ItemKind::Tent, LatLng::new(54.87157, 23.93421));
        let start = viewport.geo_to_pixel(store.get(id).unwrap().coordinate).unwrap();
        let revision_before = store.revision();

        let mut drag = ItemDrag::default();
        drag.begin(id, start, &viewport).unwrap();
        for _ in 0..500 {
            drag.move_by(0.2, 0.1);
        }
        let committed = drag.commit(&mut store).unwrap();

        assert_eq!(committed, Some(id));
        assert_eq!(store.revision(), revision_before + 1);

        let moved = store.get(id).unwrap().coordinate;
        let expected = viewport
            .pixel_to_geo(PixelPoint::new(start.x + 100.0, start.y + 50.0))
            .unwrap();
        assert!((moved.lat - expected.lat).abs() < 1e-9);
        assert!((moved.lng - expected.lng).abs() < 1e-9);
    }

    #[test]
    fn test_item_drag_uses_frame_frozen_at_start() {
        let mut viewport = ready_viewport();
        let mut store = PlacementStore::new();
        let id = store.create(ItemKind::Speaker, LatLng::new(54.87157, 23.93421));
        let start = viewport.geo_to_pixel(store.get(id).unwrap().coordinate).unwrap();
        let frozen = viewport.projection().unwrap();

        let mut drag = ItemDrag::default();
        drag.begin(id, start, &viewport).unwrap();
        drag.move_by(40.0, -25.0);

        // The viewport moves mid-gesture; the commit must not see it.
        viewport.pan_pixels(500.0, 300.0);
        viewport.zoom_by(2.0, None);

        drag.commit(&mut store).unwrap();

        let expected = frozen.pixel_to_geo(PixelPoint::new(start.x + 40.0, start.y - 25.0));
        let moved = store.get(id).unwrap().coordinate;
        assert!((moved.lat - expected.lat).abs() < 1e-9);
        assert!((moved.lng - expected.lng).abs() < 1e-9);
    }

    #[test]
    fn test_commit_without_gesture_is_a_no_op() {
        let mut store = PlacementStore::new();
        let mut drag = ItemDrag::default();
        assert_eq!(drag.commit(&mut store).unwrap(), None);
        assert_eq!(store.revision(), 0);
    }
}
