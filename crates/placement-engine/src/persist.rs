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

//! Persistence gateway: one JSON document in one key-value slot.
//!
//! Saves are synchronous and best-effort — a storage failure is logged and
//! never rolls back the in-memory state. Loads are silent — missing or
//! corrupt data degrades to the empty default state rather than surfacing an
//! error. The wire format is fixed:
//!
//! ```json
//! {
//!   "items": [{ "id": "…", "type": "tent", "coordinates": [54.9, 23.9] }],
//!   "currentLocation": { "lat": 54.9, "lng": 23.9, "zoom": 16.0 }
//! }
//! ```

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::geo::LatLng;
use crate::store::{ItemId, ItemKind, PlacedItem, PlacementStore};
use crate::viewport::ViewportState;

/// A single durable key-value slot holding the serialized session document.
pub trait StorageSlot {
    /// Read the stored payload, `None` when nothing was ever written.
    fn read(&self) -> Result<Option<String>, PlanError>;

    /// Overwrite the stored payload.
    fn write(&self, payload: &str) -> Result<(), PlanError>;
}

/// Slot backed by a single JSON file, written atomically (temp file then
/// rename) so a crash mid-write cannot corrupt the previous state.
#[derive(Debug)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    /// Create a slot at the given file path.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The backing file path.
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl StorageSlot for FileSlot {
    fn read(&self) -> Result<Option<String>, PlanError> {
        match fs::read_to_string(&self.path) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PlanError::PersistenceUnavailable(e.to_string())),
        }
    }

    fn write(&self, payload: &str) -> Result<(), PlanError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| PlanError::PersistenceUnavailable(e.to_string()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, payload).map_err(|e| PlanError::PersistenceUnavailable(e.to_string()))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| PlanError::PersistenceUnavailable(e.to_string()))
    }
}

/// In-memory slot for tests and embedders without durable storage.
#[derive(Debug, Default)]
pub struct MemorySlot {
    payload: Mutex<Option<String>>,
}

impl MemorySlot {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a slot pre-seeded with a payload.
    #[must_use]
    pub fn with_payload(payload: &str) -> Self {
        Self {
            payload: Mutex::new(Some(payload.to_string())),
        }
    }
}

impl StorageSlot for MemorySlot {
    fn read(&self) -> Result<Option<String>, PlanError> {
        Ok(self
            .payload
            .lock()
            .map_err(|e| PlanError::PersistenceUnavailable(e.to_string()))?
            .clone())
    }

    fn write(&self, payload: &str) -> Result<(), PlanError> {
        *self
            .payload
            .lock()
            .map_err(|e| PlanError::PersistenceUnavailable(e.to_string()))? =
            Some(payload.to_string());
        Ok(())
    }
}

// Wire-format documents. Field names and shapes are the contract; the
// in-memory types above stay free to evolve independently.

#[derive(Debug, Serialize, Deserialize)]
struct SavedDocument {
    items: Vec<SavedItem>,
    #[serde(rename = "currentLocation")]
    current_location: SavedLocation,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedItem {
    id: ItemId,
    #[serde(rename = "type")]
    kind: ItemKind,
    coordinates: [f64; 2],
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedLocation {
    lat: f64,
    lng: f64,
    zoom: f64,
}

/// State recovered from the slot at startup.
#[derive(Debug, Clone)]
pub struct SavedState {
    pub items: Vec<PlacedItem>,
    pub viewport: ViewportState,
}

/// Serializes and restores the placement store plus viewport state.
pub struct PersistenceGateway {
    slot: Box<dyn StorageSlot + Send>,
}

impl std::fmt::Debug for PersistenceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceGateway").finish_non_exhaustive()
    }
}

impl PersistenceGateway {
    /// Create a gateway over the given slot.
    #[must_use]
    pub fn new(slot: Box<dyn StorageSlot + Send>) -> Self {
        Self { slot }
    }

    /// Persist the current session state. Best-effort: a failure is logged
    /// and the in-memory mutation stands.
    pub fn save(&self, store: &PlacementStore, viewport: ViewportState) {
        match self.try_save(store, viewport) {
            Ok(()) => debug!("State saved ({} items)", store.len()),
            Err(e) => warn!("State save failed, continuing in-memory only: {}", e),
        }
    }

    fn try_save(&self, store: &PlacementStore, viewport: ViewportState) -> Result<(), PlanError> {
        let document = SavedDocument {
            items: store
                .items()
                .into_iter()
                .map(|item| SavedItem {
                    id: item.id,
                    kind: item.kind,
                    coordinates: [item.coordinate.lat, item.coordinate.lng],
                })
                .collect(),
            current_location: SavedLocation {
                lat: viewport.center.lat,
                lng: viewport.center.lng,
                zoom: viewport.zoom,
            },
        };
        let payload = serde_json::to_string(&document)
            .map_err(|e| PlanError::PersistenceUnavailable(e.to_string()))?;
        self.slot.write(&payload)
    }

    /// Load the persisted state, if any. Missing or corrupt data degrades
    /// silently to `None`; this never surfaces an error to the caller.
    #[must_use]
    pub fn load(&self) -> Option<SavedState> {
        let payload = match self.slot.read() {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!("No saved state found, starting empty");
                return None;
            }
            Err(e) => {
                warn!("Saved state unreadable, starting empty: {}", e);
                return None;
            }
        };

        let document: SavedDocument = match serde_json::from_str(&payload) {
            Ok(document) => document,
            Err(e) => {
                warn!("Saved state corrupt, starting empty: {}", e);
                return None;
            }
        };

        let items = document
            .items
            .into_iter()
            .map(|item| PlacedItem {
                id: item.id,
                kind: item.kind,
                coordinate: LatLng::new(item.coordinates[0], item.coordinates[1]),
            })
            .collect::<Vec<_>>();
        let viewport = ViewportState::new(
            LatLng::new(document.current_location.lat, document.current_location.lng),
            document.current_location.zoom,
        );

        info!("State loaded ({} items)", items.len());
        Some(SavedState { items, viewport })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tent_store() -> PlacementStore {
        let mut store = PlacementStore::new();
        store.create(ItemKind::Tent, LatLng::new(54.9, 23.9));
        store
    }

    #[test]
    fn test_save_load_round_trip() {
        let gateway = PersistenceGateway::new(Box::new(MemorySlot::new()));
        let store = tent_store();
        let viewport = ViewportState::new(LatLng::new(54.9, 23.9), 16.0);

        gateway.save(&store, viewport);
        let restored = gateway.load().expect("saved state should load");

        assert_eq!(restored.items.len(), 1);
        assert_eq!(restored.items[0].kind, ItemKind::Tent);
        assert!((restored.items[0].coordinate.lat - 54.9).abs() < 1e-9);
        assert!((restored.items[0].coordinate.lng - 23.9).abs() < 1e-9);
        assert!((restored.viewport.center.lat - 54.9).abs() < 1e-9);
        assert!((restored.viewport.zoom - 16.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_wire_format_matches_contract() {
        let document = SavedDocument {
            items: vec![SavedItem {
                id: ItemId::new(),
                kind: ItemKind::Tent,
                coordinates: [54.9, 23.9],
            }],
            current_location: SavedLocation {
                lat: 54.9,
                lng: 23.9,
                zoom: 16.0,
            },
        };

        let payload = serde_json::to_value(&document).unwrap();
        assert_eq!(payload["items"][0]["type"], "tent");
        assert_eq!(payload["items"][0]["coordinates"][0], 54.9);
        assert_eq!(payload["currentLocation"]["lat"], 54.9);
        assert_eq!(payload["currentLocation"]["zoom"], 16.0);

        // A hand-written document in the same shape loads back.
        let raw = r#"{
            "items": [{"id": "7f1c2a9e-8a52-4f7a-9b2f-0a3f2d6c1e44", "type": "stage", "coordinates": [40.7, -74.0]}],
            "currentLocation": {"lat": 40.7, "lng": -74.0, "zoom": 16.0}
        }"#;
        let gateway = PersistenceGateway::new(Box::new(MemorySlot::with_payload(raw)));
        let restored = gateway.load().expect("document should load");
        assert_eq!(restored.items[0].kind, ItemKind::Stage);
        assert!((restored.items[0].coordinate.lng + 74.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_state_loads_as_none() {
        let gateway = PersistenceGateway::new(Box::new(MemorySlot::new()));
        assert!(gateway.load().is_none());
    }

    #[test]
    fn test_corrupt_state_loads_as_none() {
        for corrupt in ["not json at all", "{\"items\": 42}", "[]"] {
            let gateway = PersistenceGateway::new(Box::new(MemorySlot::with_payload(corrupt)));
            assert!(gateway.load().is_none(), "payload {:?} should be rejected", corrupt);
        }
    }

    #[test]
    fn test_save_failure_does_not_panic() {
        struct BrokenSlot;
        impl StorageSlot for BrokenSlot {
            fn read(&self) -> Result<Option<String>, PlanError> {
                Err(PlanError::PersistenceUnavailable("quota exceeded".into()))
            }
            fn write(&self, _payload: &str) -> Result<(), PlanError> {
                Err(PlanError::PersistenceUnavailable("quota exceeded".into()))
            }
        }

        let gateway = PersistenceGateway::new(Box::new(BrokenSlot));
        gateway.save(&tent_store(), ViewportState::new(LatLng::new(0.0, 0.0), 5.0));
        assert!(gateway.load().is_none());
    }

    #[test]
    fn test_file_slot_round_trip() {
        let dir = std::env::temp_dir().join(format!("placement-engine-test-{}", ItemId::new()));
        let slot = FileSlot::new(dir.join("state.json"));

        assert!(slot.read().unwrap().is_none());
        slot.write("{\"items\":[],\"currentLocation\":{\"lat\":0.0,\"lng\":0.0,\"zoom\":5.0}}")
            .unwrap();
        assert!(slot.read().unwrap().is_some());

        let _ = fs::remove_dir_all(&dir);
    }
}
