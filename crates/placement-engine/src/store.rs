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

//! Canonical placement store.
//!
//! The single source of truth for placed items. Geographic coordinates are
//! mutated here and nowhere else: items are created on a successful drop and
//! repositioned at drag-end commit. Pixel positions are not stored — they
//! live in the sync reactor and are derived from the coordinates held here.
//!
//! Mutations emit [`PlacementEvent`]s over a broadcast channel and bump a
//! monotonic revision counter so the reactor and the persistence layer can
//! observe changes without being wired into every call site.

use std::collections::HashMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::PlanError;
use crate::geo::LatLng;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Opaque unique identifier of a placed item. Assigned at creation,
/// immutable, never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    /// Generate a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Palette tool category of a placed item.
///
/// Serialized lowercase to match the persisted document; `Other` absorbs
/// unknown tags from documents written by newer versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Tent,
    Stage,
    Speaker,
    Food,
    Toilet,
    FirstAid,
    #[serde(other)]
    Other,
}

impl ItemKind {
    /// All kinds offered on the tool palette.
    pub const PALETTE: [ItemKind; 6] = [
        ItemKind::Tent,
        ItemKind::Stage,
        ItemKind::Speaker,
        ItemKind::Food,
        ItemKind::Toilet,
        ItemKind::FirstAid,
    ];

    /// The serialized tag for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Tent => "tent",
            ItemKind::Stage => "stage",
            ItemKind::Speaker => "speaker",
            ItemKind::Food => "food",
            ItemKind::Toilet => "toilet",
            ItemKind::FirstAid => "firstaid",
            ItemKind::Other => "other",
        }
    }

    /// Human-readable display name.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            ItemKind::Tent => "Tent",
            ItemKind::Stage => "Stage",
            ItemKind::Speaker => "Speaker",
            ItemKind::Food => "Food stall",
            ItemKind::Toilet => "Toilet",
            ItemKind::FirstAid => "First aid",
            ItemKind::Other => "Marker",
        }
    }
}

/// A labeled marker anchored to a geographic coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedItem {
    /// Unique identifier, immutable.
    pub id: ItemId,
    /// Palette tool category, immutable.
    pub kind: ItemKind,
    /// Authoritative geographic position. Mutated only by the drag
    /// coordinator at drag-end.
    pub coordinate: LatLng,
}

/// Events emitted by the store when its contents change.
#[derive(Debug, Clone)]
pub enum PlacementEvent {
    /// A new item was created from a palette drop.
    Created(ItemId),
    /// An existing item was repositioned at drag-end.
    Moved(ItemId),
    /// The whole store was replaced from persisted state.
    Restored,
}

/// Canonical in-memory collection of placed items.
pub struct PlacementStore {
    items: HashMap<ItemId, PlacedItem>,
    revision: u64,
    event_tx: broadcast::Sender<PlacementEvent>,
}

impl std::fmt::Debug for PlacementStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacementStore")
            .field("item_count", &self.items.len())
            .field("revision", &self.revision)
            .finish()
    }
}

impl Default for PlacementStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PlacementStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            items: HashMap::new(),
            revision: 0,
            event_tx,
        }
    }

    /// Create a new item at the given coordinate and return its id.
    pub fn create(&mut self, kind: ItemKind, coordinate: LatLng) -> ItemId {
        let id = ItemId::new();
        self.items.insert(id, PlacedItem { id, kind, coordinate });
        self.revision += 1;
        info!("Placed {} {} at {}", kind.as_str(), id, coordinate);
        let _ = self.event_tx.send(PlacementEvent::Created(id));
        id
    }

    /// Move an existing item to a new coordinate.
    pub fn update_position(&mut self, id: ItemId, coordinate: LatLng) -> Result<(), PlanError> {
        let item = self.items.get_mut(&id).ok_or(PlanError::NotFound(id))?;
        item.coordinate = coordinate;
        self.revision += 1;
        debug!("Moved {} to {}", id, coordinate);
        let _ = self.event_tx.send(PlacementEvent::Moved(id));
        Ok(())
    }

    /// Owned snapshot of all items, safe to iterate while the store is
    /// later mutated.
    #[must_use]
    pub fn items(&self) -> Vec<PlacedItem> {
        self.items.values().copied().collect()
    }

    /// Look up one item.
    #[must_use]
    pub fn get(&self, id: ItemId) -> Option<&PlacedItem> {
        self.items.get(&id)
    }

    /// Bulk-overwrite the store from persisted state. No merge semantics.
    pub fn replace_all(&mut self, items: Vec<PlacedItem>) {
        info!("Restoring {} placed items", items.len());
        self.items = items.into_iter().map(|item| (item.id, item)).collect();
        self.revision += 1;
        let _ = self.event_tx.send(PlacementEvent::Restored);
    }

    /// Number of placed items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Monotonic change counter; bumped by every mutation.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Subscribe to store change events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PlacementEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_assigns_unique_ids() {
        let mut store = PlacementStore::new();
        let a = store.create(ItemKind::Tent, LatLng::new(54.9, 23.9));
        let b = store.create(ItemKind::Tent, LatLng::new(54.9, 23.9));
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_update_position_unknown_id() {
        let mut store = PlacementStore::new();
        let err = store
            .update_position(ItemId::new(), LatLng::new(0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, PlanError::NotFound(_)));
    }

    #[test]
    fn test_snapshot_is_independent_of_later_mutations() {
        let mut store = PlacementStore::new();
        let id = store.create(ItemKind::Stage, LatLng::new(54.9, 23.9));
        let snapshot = store.items();

        store.update_position(id, LatLng::new(55.0, 24.0)).unwrap();

        assert_eq!(snapshot[0].coordinate, LatLng::new(54.9, 23.9));
        assert_eq!(store.get(id).unwrap().coordinate, LatLng::new(55.0, 24.0));
    }

    #[test]
    fn test_replace_all_overwrites() {
        let mut store = PlacementStore::new();
        store.create(ItemKind::Tent, LatLng::new(1.0, 2.0));

        let replacement = PlacedItem {
            id: ItemId::new(),
            kind: ItemKind::Food,
            coordinate: LatLng::new(54.9, 23.9),
        };
        store.replace_all(vec![replacement]);

        assert_eq!(store.len(), 1);
        assert_eq!(store.items()[0].kind, ItemKind::Food);
    }

    #[test]
    fn test_events_and_revision_track_mutations() {
        let mut store = PlacementStore::new();
        let mut events = store.subscribe();
        let rev = store.revision();

        let id = store.create(ItemKind::Toilet, LatLng::new(54.9, 23.9));
        store.update_position(id, LatLng::new(54.91, 23.91)).unwrap();

        assert_eq!(store.revision(), rev + 2);
        assert!(matches!(events.try_recv(), Ok(PlacementEvent::Created(_))));
        assert!(matches!(events.try_recv(), Ok(PlacementEvent::Moved(_))));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_kind_tags_round_trip() {
        for kind in ItemKind::PALETTE {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            let back: ItemKind = serde_json::from_str(&json).unwrap();
            assert_eq!(back, kind);
        }
        let unknown: ItemKind = serde_json::from_str("\"gazebo\"").unwrap();
        assert_eq!(unknown, ItemKind::Other);
    }
}
