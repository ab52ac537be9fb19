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

//! Geo-pixel synchronization and placement-state engine.
//!
//! This library keeps labeled markers anchored to geographic coordinates on
//! a pannable, zoomable map and persists them across sessions. It is
//! renderer-agnostic: the host supplies pointer events and a screen size and
//! reads back pixel anchors. The layers can be used independently or wired
//! together through [`PlanningSession`]:
//!
//! - **Viewport layer** (`viewport`): Web Mercator pixel↔geo conversion
//!   behind the [`ViewportAdapter`] seam
//! - **Store layer** (`store`): the canonical list of placed items
//! - **Drag layer** (`drag`): gesture state machines that turn pointer
//!   events into at-most-one store mutation each
//! - **Sync layer** (`sync`): derived pixel anchors, recomputed on every
//!   viewport change
//! - **Persistence layer** (`persist`): one JSON document in one key-value
//!   slot, best-effort
//! - **Geocoding layer** (`geocode`): Nominatim search with
//!   last-issued-wins sequencing
//!
//! # Quick Start
//!
//! ```
//! use placement_engine::{
//!     DropZoneConfig, DropOutcome, ItemKind, LatLng, MemorySlot, MercatorViewport,
//!     PixelPoint, PlanningSession,
//! };
//!
//! let mut viewport = MercatorViewport::new(LatLng::new(54.87157, 23.93421), 15.0);
//! viewport.resize(800.0, 600.0);
//!
//! let mut session = PlanningSession::new(
//!     viewport,
//!     Box::new(MemorySlot::new()),
//!     DropZoneConfig::default(),
//! );
//! session.restore();
//!
//! // Drag a tent from the palette and drop it at the center of the map.
//! session.begin_palette_drag(ItemKind::Tent, PixelPoint::new(20.0, 20.0));
//! session.move_palette_drag(PixelPoint::new(400.0, 300.0), 1.0);
//! let outcome = session.finish_palette_drag(1.0, Some(PixelPoint::new(400.0, 300.0)));
//! assert!(matches!(outcome, DropOutcome::Dropped(_)));
//!
//! // The item's anchor derives from its stored coordinate.
//! session.sync_if_needed();
//! let item = session.store().items()[0];
//! let anchor = session.reactor().anchor(item.id).unwrap();
//! assert!((anchor.pixel.x - 400.0).abs() < 1e-6);
//! ```
//!
//! # Repositioning an item
//!
//! ```
//! use placement_engine::{
//!     DropZoneConfig, ItemKind, LatLng, MemorySlot, MercatorViewport, PlanningSession,
//! };
//!
//! let mut viewport = MercatorViewport::new(LatLng::new(54.87157, 23.93421), 15.0);
//! viewport.resize(800.0, 600.0);
//! let mut session = PlanningSession::new(
//!     viewport,
//!     Box::new(MemorySlot::new()),
//!     DropZoneConfig::default(),
//! );
//!
//! let id = session.store_mut().create(ItemKind::Stage, LatLng::new(54.872, 23.933));
//! session.sync_if_needed();
//!
//! let start = session.reactor().anchor(id).unwrap().pixel;
//! session.begin_item_drag(id, start);
//! for _ in 0..500 {
//!     session.drag_item_by(0.1, 0.05); // purely visual, no store writes
//! }
//! session.commit_item_drag(); // the single store mutation of the gesture
//! ```

pub mod drag;
pub mod error;
pub mod geo;
pub mod geocode;
pub mod persist;
pub mod store;
pub mod sync;
pub mod viewport;

use log::{debug, trace, warn};

pub use drag::{DropOutcome, DropZone, DropZoneConfig, ItemDrag, PaletteDrag};
pub use error::PlanError;
pub use geo::{LatLng, PixelOffset, PixelPoint, ScreenSize};
pub use geocode::{
    GeocodeCandidate, GeocodeClient, GeocodeConfig, SearchSequencer, SearchTicket,
    SEARCH_RESULT_ZOOM,
};
pub use persist::{FileSlot, MemorySlot, PersistenceGateway, SavedState, StorageSlot};
pub use store::{ItemId, ItemKind, PlacedItem, PlacementEvent, PlacementStore};
pub use sync::{ItemAnchor, ViewportSyncReactor};
pub use viewport::{MercatorViewport, Projection, ViewportAdapter, ViewportState};

/// Startup viewport used when no saved state exists.
pub const DEFAULT_CENTER: LatLng = LatLng::new(54.87157, 23.93421);
/// Startup zoom used when no saved state exists.
pub const DEFAULT_ZOOM: f64 = 15.0;

/// The owned planning context: one viewport, one store, one reactor, one
/// persistence gateway, and the two gesture machines.
///
/// Everything the original interaction loop needs lives here — there is no
/// ambient global state. The viewport adapter is a type parameter so the
/// whole session can run against a fake adapter in tests.
pub struct PlanningSession<V: ViewportAdapter> {
    viewport: V,
    store: PlacementStore,
    reactor: ViewportSyncReactor,
    gateway: PersistenceGateway,
    palette_drag: PaletteDrag,
    item_drag: ItemDrag,
    drop_zone: DropZone,
    sequencer: SearchSequencer,
}

impl<V: ViewportAdapter + std::fmt::Debug> std::fmt::Debug for PlanningSession<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanningSession")
            .field("viewport", &self.viewport)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl<V: ViewportAdapter> PlanningSession<V> {
    /// Create a session over the given viewport and storage slot.
    #[must_use]
    pub fn new(
        viewport: V,
        slot: Box<dyn StorageSlot + Send>,
        drop_config: DropZoneConfig,
    ) -> Self {
        Self {
            viewport,
            store: PlacementStore::new(),
            reactor: ViewportSyncReactor::new(),
            gateway: PersistenceGateway::new(slot),
            palette_drag: PaletteDrag::default(),
            item_drag: ItemDrag::default(),
            drop_zone: DropZone::new(drop_config),
            sequencer: SearchSequencer::new(),
        }
    }

    /// Restore persisted state, once at startup. Order matters: the
    /// viewport is set first so later geo→pixel conversions use the right
    /// projection, then the store is replaced, then one sync pass runs.
    /// Missing or corrupt state leaves the empty default session untouched.
    /// Returns whether anything was restored.
    pub fn restore(&mut self) -> bool {
        let Some(saved) = self.gateway.load() else {
            return false;
        };

        if let Err(e) = self.viewport.set_view(saved.viewport.center, saved.viewport.zoom) {
            warn!("Could not restore viewport: {}", e);
        }
        self.store.replace_all(saved.items);
        self.sync_now();
        true
    }

    /// Run a sync pass if the viewport or store changed since the last one.
    /// Hosts call this once per frame. Returns whether anchors moved.
    pub fn sync_if_needed(&mut self) -> bool {
        match self.reactor.sync_if_changed(&self.viewport, &self.store) {
            Ok(changed) => changed,
            Err(PlanError::NotInitialized) => {
                // First frames before the map area has a size; anchors will
                // be computed as soon as it gets one.
                trace!("Sync skipped, viewport not initialized yet");
                false
            }
            Err(e) => {
                warn!("Sync pass failed: {}", e);
                false
            }
        }
    }

    fn sync_now(&mut self) {
        if let Err(e) = self.reactor.sync(&self.viewport, &self.store) {
            match e {
                PlanError::NotInitialized => {
                    trace!("Sync deferred, viewport not initialized yet");
                }
                other => warn!("Sync pass failed: {}", other),
            }
        }
    }

    fn save_checkpoint(&self) {
        match self.viewport.viewport() {
            Ok(state) => self.gateway.save(&self.store, state),
            Err(e) => warn!("Skipping save, viewport unavailable: {}", e),
        }
    }

    // ----- Flow A: palette → map ------------------------------------------

    /// Pointer-down over a palette entry.
    pub fn begin_palette_drag(&mut self, kind: ItemKind, pointer: PixelPoint) {
        self.palette_drag.begin(kind, pointer, &mut self.drop_zone);
    }

    /// Pointer moved during a palette drag. `overlap` is the fraction of
    /// the ghost currently over the map area.
    pub fn move_palette_drag(&mut self, pointer: PixelPoint, overlap: f64) {
        self.palette_drag.move_to(pointer, overlap, &mut self.drop_zone);
    }

    /// Pointer-up ending a palette drag. A successful drop creates the
    /// item, saves a checkpoint, and re-anchors; anything else mutates
    /// nothing.
    pub fn finish_palette_drag(
        &mut self,
        overlap: f64,
        map_point: Option<PixelPoint>,
    ) -> DropOutcome {
        let outcome = self.palette_drag.finish(
            overlap,
            map_point,
            &mut self.drop_zone,
            &self.viewport,
            &mut self.store,
        );
        match outcome {
            Ok(DropOutcome::Dropped(id)) => {
                self.save_checkpoint();
                self.sync_now();
                DropOutcome::Dropped(id)
            }
            Ok(DropOutcome::Cancelled) => DropOutcome::Cancelled,
            Err(e) => {
                warn!("Drop failed, ignoring: {}", e);
                DropOutcome::Cancelled
            }
        }
    }

    /// The palette ghost to draw, if a palette drag is in progress.
    #[must_use]
    pub fn palette_ghost(&self) -> Option<(ItemKind, PixelPoint)> {
        self.palette_drag.ghost()
    }

    // ----- Flow B: reposition an existing item ----------------------------

    /// Pointer-down on a placed item. Freezes the projection for the whole
    /// gesture. Returns whether the drag started.
    pub fn begin_item_drag(&mut self, id: ItemId, start: PixelPoint) -> bool {
        match self.item_drag.begin(id, start, &self.viewport) {
            Ok(()) => true,
            Err(e) => {
                warn!("Item drag not started: {}", e);
                false
            }
        }
    }

    /// Pointer-move during an item drag: accumulates the visual offset on
    /// the gesture and on the item's anchor. No conversions, no store
    /// writes.
    pub fn drag_item_by(&mut self, dx: f64, dy: f64) {
        if let Some(id) = self.item_drag.dragged_item() {
            self.item_drag.move_by(dx, dy);
            self.reactor.nudge(id, dx, dy);
        }
    }

    /// Pointer-up ending an item drag: the single authoritative store write
    /// of the gesture, followed by a save checkpoint and a sync pass that
    /// clears the drag offset.
    pub fn commit_item_drag(&mut self) -> Option<ItemId> {
        match self.item_drag.commit(&mut self.store) {
            Ok(Some(id)) => {
                self.save_checkpoint();
                self.sync_now();
                Some(id)
            }
            Ok(None) => None,
            Err(e) => {
                // A NotFound here is a coordinator bug: log and ignore.
                warn!("Item drag commit failed, ignoring: {}", e);
                self.sync_now();
                None
            }
        }
    }

    /// Id of the item currently being dragged, if any.
    #[must_use]
    pub fn dragged_item(&self) -> Option<ItemId> {
        self.item_drag.dragged_item()
    }

    // ----- Search ---------------------------------------------------------

    /// Register a new location search; supersedes any in-flight one.
    pub fn begin_search(&mut self) -> SearchTicket {
        self.sequencer.issue()
    }

    /// Apply a resolved search result. Recenters at the search zoom only if
    /// the ticket is still the latest; stale results are dropped. Returns
    /// whether the viewport moved.
    pub fn apply_search_result(&mut self, ticket: SearchTicket, coordinate: LatLng) -> bool {
        if !self.sequencer.accept(ticket) {
            debug!("Dropping stale search result for {}", coordinate);
            return false;
        }
        if let Err(e) = self.viewport.set_view(coordinate, SEARCH_RESULT_ZOOM) {
            warn!("Could not apply search result: {}", e);
            return false;
        }
        self.sync_now();
        true
    }

    // ----- Accessors ------------------------------------------------------

    /// The viewport adapter.
    #[must_use]
    pub fn viewport(&self) -> &V {
        &self.viewport
    }

    /// Mutable access for host-driven pan/zoom/resize.
    #[must_use]
    pub fn viewport_mut(&mut self) -> &mut V {
        &mut self.viewport
    }

    /// The placement store.
    #[must_use]
    pub fn store(&self) -> &PlacementStore {
        &self.store
    }

    /// Mutable store access for embedders; interactive mutations normally
    /// go through the gesture methods.
    #[must_use]
    pub fn store_mut(&mut self) -> &mut PlacementStore {
        &mut self.store
    }

    /// The sync reactor holding the visual anchors.
    #[must_use]
    pub fn reactor(&self) -> &ViewportSyncReactor {
        &self.reactor
    }

    /// The drop surface state, for host hover/active feedback.
    #[must_use]
    pub fn drop_zone(&self) -> &DropZone {
        &self.drop_zone
    }

    /// Persist the current state explicitly (e.g. on shutdown).
    pub fn save(&self) {
        self.save_checkpoint();
    }
}
