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

//! End-to-end tests for the planning session: gestures, sync, persistence,
//! and search, driven without any rendering surface.

use placement_engine::{
    DropOutcome, DropZoneConfig, ItemKind, LatLng, MemorySlot, MercatorViewport, PixelPoint,
    PlacementEvent, PlanError, PlanningSession, Projection, ScreenSize, ViewportAdapter,
    ViewportState,
};

/// Always-initialized fake adapter with a fixed screen: proves the session
/// depends only on the seam, with no rendering surface or resize sequencing.
#[derive(Debug)]
struct FakeViewport {
    state: ViewportState,
    revision: u64,
}

impl FakeViewport {
    fn new() -> Self {
        Self {
            state: ViewportState::new(LatLng::new(0.0, 0.0), 10.0),
            revision: 1,
        }
    }
}

impl ViewportAdapter for FakeViewport {
    fn projection(&self) -> Result<Projection, PlanError> {
        Ok(Projection {
            state: self.state,
            screen: ScreenSize::new(1000.0, 1000.0),
        })
    }

    fn set_view(&mut self, center: LatLng, zoom: f64) -> Result<(), PlanError> {
        self.state = ViewportState::new(center, zoom);
        self.revision += 1;
        Ok(())
    }

    fn viewport(&self) -> Result<ViewportState, PlanError> {
        Ok(self.state)
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}

fn mercator_session() -> PlanningSession<MercatorViewport> {
    let mut viewport = MercatorViewport::new(LatLng::new(54.87157, 23.93421), 15.0);
    viewport.resize(800.0, 600.0);
    PlanningSession::new(viewport, Box::new(MemorySlot::new()), DropZoneConfig::default())
}

#[test]
fn anchors_track_geography_across_pan_zoom_sequences() {
    let mut session = mercator_session();

    session.begin_palette_drag(ItemKind::Tent, PixelPoint::new(5.0, 5.0));
    let DropOutcome::Dropped(tent) =
        session.finish_palette_drag(1.0, Some(PixelPoint::new(250.0, 140.0)))
    else {
        panic!("drop expected");
    };
    session.begin_palette_drag(ItemKind::Stage, PixelPoint::new(5.0, 5.0));
    let DropOutcome::Dropped(stage) =
        session.finish_palette_drag(0.8, Some(PixelPoint::new(520.0, 410.0)))
    else {
        panic!("drop expected");
    };

    // An arbitrary pan/zoom sequence.
    session.viewport_mut().pan_pixels(130.0, -75.0);
    session.viewport_mut().zoom_by(1.0, Some(PixelPoint::new(300.0, 200.0)));
    session.viewport_mut().pan_pixels(-42.0, 260.0);
    session.viewport_mut().zoom_by(-2.0, None);
    session.sync_if_needed();

    // Visual position must be recoverable purely from coordinate + viewport.
    for id in [tent, stage] {
        let coordinate = session.store().get(id).unwrap().coordinate;
        let expected = session.viewport().geo_to_pixel(coordinate).unwrap();
        let anchor = session.reactor().anchor(id).unwrap();
        assert!((anchor.pixel.x - expected.x).abs() < 1e-6);
        assert!((anchor.pixel.y - expected.y).abs() < 1e-6);
        assert!(anchor.drag_offset.is_zero());
    }
}

#[test]
fn item_drag_produces_exactly_one_mutation() {
    let mut session = mercator_session();
    session.begin_palette_drag(ItemKind::Speaker, PixelPoint::new(5.0, 5.0));
    let DropOutcome::Dropped(id) =
        session.finish_palette_drag(1.0, Some(PixelPoint::new(400.0, 300.0)))
    else {
        panic!("drop expected");
    };

    let mut events = session.store().subscribe();
    let start = session.reactor().anchor(id).unwrap().pixel;

    assert!(session.begin_item_drag(id, start));
    for _ in 0..500 {
        session.drag_item_by(0.3, -0.1);
    }
    assert_eq!(session.commit_item_drag(), Some(id));

    // Exactly one Moved event for the whole gesture.
    assert!(matches!(events.try_recv(), Ok(PlacementEvent::Moved(moved)) if moved == id));
    assert!(events.try_recv().is_err());
}

#[test]
fn palette_release_outside_surface_mutates_nothing() {
    let mut session = mercator_session();
    let mut events = session.store().subscribe();

    session.begin_palette_drag(ItemKind::Food, PixelPoint::new(5.0, 5.0));
    session.move_palette_drag(PixelPoint::new(60.0, 80.0), 0.0);
    let outcome = session.finish_palette_drag(0.2, Some(PixelPoint::new(60.0, 80.0)));

    assert_eq!(outcome, DropOutcome::Cancelled);
    assert!(session.store().is_empty());
    assert!(events.try_recv().is_err());
}

#[test]
fn save_then_load_round_trips_items_and_viewport() {
    let mut viewport = MercatorViewport::new(LatLng::new(54.9, 23.9), 16.0);
    viewport.resize(800.0, 600.0);
    let mut session =
        PlanningSession::new(viewport, Box::new(MemorySlot::new()), DropZoneConfig::default());

    session.store_mut().create(ItemKind::Tent, LatLng::new(54.9, 23.9));
    session.save();

    // Wipe the in-memory state, then load back from the slot.
    session.store_mut().replace_all(Vec::new());
    session.viewport_mut().set_view(LatLng::new(0.0, 0.0), 5.0).unwrap();
    assert!(session.restore());

    assert_eq!(session.store().len(), 1);
    let item = session.store().items()[0];
    assert_eq!(item.kind, ItemKind::Tent);
    assert!((item.coordinate.lat - 54.9).abs() < 1e-9);
    assert!((item.coordinate.lng - 23.9).abs() < 1e-9);

    let state = session.viewport().viewport().unwrap();
    assert!((state.center.lat - 54.9).abs() < 1e-9);
    assert!((state.center.lng - 23.9).abs() < 1e-9);
    assert!((state.zoom - 16.0).abs() < f64::EPSILON);
}

#[test]
fn restore_renders_items_after_set_view() {
    // A fresh session over a pre-seeded slot restores viewport first, then
    // items, then anchors.
    let payload = r#"{
        "items": [{"id": "3e0c7f4a-6f2b-4c83-b0d7-5f9a1c2d3e4f", "type": "tent", "coordinates": [54.9, 23.9]}],
        "currentLocation": {"lat": 54.9, "lng": 23.9, "zoom": 16.0}
    }"#;
    let mut viewport = MercatorViewport::new(LatLng::new(0.0, 0.0), 5.0);
    viewport.resize(800.0, 600.0);
    let mut session = PlanningSession::new(
        viewport,
        Box::new(MemorySlot::with_payload(payload)),
        DropZoneConfig::default(),
    );

    assert!(session.restore());
    assert_eq!(session.store().len(), 1);
    let state = session.viewport().viewport().unwrap();
    assert!((state.center.lat - 54.9).abs() < 1e-9);
    assert!((state.zoom - 16.0).abs() < f64::EPSILON);

    // The restored item is anchored at the screen center (it sits at the
    // restored viewport center).
    let item = session.store().items()[0];
    let anchor = session.reactor().anchor(item.id).unwrap();
    assert!((anchor.pixel.x - 400.0).abs() < 1e-6);
    assert!((anchor.pixel.y - 300.0).abs() < 1e-6);
}

#[test]
fn corrupt_storage_degrades_to_empty_default() {
    let mut viewport = MercatorViewport::new(LatLng::new(54.87157, 23.93421), 15.0);
    viewport.resize(800.0, 600.0);
    let mut session = PlanningSession::new(
        viewport,
        Box::new(MemorySlot::with_payload("{{{ definitely not json")),
        DropZoneConfig::default(),
    );

    assert!(!session.restore());
    assert!(session.store().is_empty());
    let state = session.viewport().viewport().unwrap();
    assert!((state.center.lat - 54.87157).abs() < 1e-9);
    assert!((state.zoom - 15.0).abs() < f64::EPSILON);
}

#[test]
fn search_recenters_and_drops_stale_results() {
    let mut session = mercator_session();

    let first = session.begin_search();
    let second = session.begin_search();

    // The second search resolves first and wins.
    assert!(session.apply_search_result(second, LatLng::new(40.7, -74.0)));
    let state = session.viewport().viewport().unwrap();
    assert!((state.center.lat - 40.7).abs() < 1e-9);
    assert!((state.center.lng + 74.0).abs() < 1e-9);
    assert!((state.zoom - 16.0).abs() < f64::EPSILON);

    // The slow first result must not overwrite it.
    assert!(!session.apply_search_result(first, LatLng::new(10.0, 10.0)));
    let state = session.viewport().viewport().unwrap();
    assert!((state.center.lat - 40.7).abs() < 1e-9);
}

#[test]
fn session_runs_against_injected_fake_adapter() {
    let mut session = PlanningSession::new(
        FakeViewport::new(),
        Box::new(MemorySlot::new()),
        DropZoneConfig::default(),
    );

    session.begin_palette_drag(ItemKind::Toilet, PixelPoint::new(1.0, 1.0));
    let outcome = session.finish_palette_drag(1.0, Some(PixelPoint::new(500.0, 500.0)));
    assert!(matches!(outcome, DropOutcome::Dropped(_)));
    assert_eq!(session.store().len(), 1);

    session.sync_if_needed();
    let item = session.store().items()[0];
    let anchor = session.reactor().anchor(item.id).unwrap();
    let expected = session.viewport().geo_to_pixel(item.coordinate).unwrap();
    assert_eq!(anchor.pixel, expected);
}
