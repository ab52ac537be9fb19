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

//! Viewport adapter: Web Mercator projection between geographic and
//! screen-pixel coordinates.
//!
//! The [`ViewportAdapter`] trait is the seam between the engine and whatever
//! renders the map; [`MercatorViewport`] is the concrete implementation the
//! desktop host uses. A [`Projection`] is an immutable snapshot of the
//! conversion at one instant — drag gestures freeze one at pointer-down so a
//! viewport change mid-gesture cannot mix stale pixel deltas with a new
//! projection.
//!
//! Conversion is pure: pixel position is always a function of
//! `(viewport state, screen size, geographic coordinate)` and nothing else.

use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::geo::{LatLng, PixelPoint, ScreenSize};

/// Rendered tile edge length in pixels; one world-tile unit spans this many
/// screen pixels.
pub const TILE_SIZE: f64 = 256.0;

/// Latitude bound of the Web Mercator projection domain.
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_78;

/// Zoom limits matching the tile servers the host renders from.
pub const MIN_ZOOM: f64 = 1.0;
pub const MAX_ZOOM: f64 = 19.0;

/// Convert longitude to a fractional Web Mercator tile X coordinate.
#[must_use]
pub fn lon_to_tile_x(lon: f64, zoom: f64) -> f64 {
    let n = 2_f64.powf(zoom);
    ((lon + 180.0) / 360.0) * n
}

/// Convert latitude to a fractional Web Mercator tile Y coordinate.
#[must_use]
pub fn lat_to_tile_y(lat: f64, zoom: f64) -> f64 {
    let lat = lat.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE);
    let lat_rad = lat.to_radians();
    let n = 2_f64.powf(zoom);
    (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0 * n
}

/// Convert a fractional tile X coordinate back to longitude.
#[must_use]
pub fn tile_x_to_lon(x: f64, zoom: f64) -> f64 {
    let n = 2_f64.powf(zoom);
    x.rem_euclid(n) / n * 360.0 - 180.0
}

/// Convert a fractional tile Y coordinate back to latitude.
#[must_use]
pub fn tile_y_to_lat(y: f64, zoom: f64) -> f64 {
    let n = 2_f64.powf(zoom);
    let y = y.clamp(0.0, n);
    let lat_rad = (std::f64::consts::PI * (1.0 - 2.0 * y / n)).sinh().atan();
    lat_rad.to_degrees()
}

/// The map's current center and zoom, which together define the pixel↔geo
/// projection. Serialized into the persisted state document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    /// Geographic coordinate at the center of the map area.
    pub center: LatLng,
    /// Web Mercator zoom level.
    pub zoom: f64,
}

impl ViewportState {
    /// Create a viewport state, clamping latitude and zoom to the
    /// projection domain.
    #[must_use]
    pub fn new(center: LatLng, zoom: f64) -> Self {
        Self {
            center: LatLng::new(
                center.lat.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE),
                center.lng,
            ),
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
        }
    }
}

/// An immutable pixel↔geo conversion snapshot: one viewport state plus one
/// screen size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub state: ViewportState,
    pub screen: ScreenSize,
}

impl Projection {
    /// Project a geographic coordinate to map-local screen pixels.
    #[must_use]
    pub fn geo_to_pixel(&self, geo: LatLng) -> PixelPoint {
        let zoom = self.state.zoom;
        let center = self.screen.center();
        let dx = lon_to_tile_x(geo.lng, zoom) - lon_to_tile_x(self.state.center.lng, zoom);
        let dy = lat_to_tile_y(geo.lat, zoom) - lat_to_tile_y(self.state.center.lat, zoom);
        PixelPoint::new(center.x + dx * TILE_SIZE, center.y + dy * TILE_SIZE)
    }

    /// Unproject map-local screen pixels back to a geographic coordinate.
    /// Exact inverse of [`Projection::geo_to_pixel`] within floating-point
    /// tolerance.
    #[must_use]
    pub fn pixel_to_geo(&self, pixel: PixelPoint) -> LatLng {
        let zoom = self.state.zoom;
        let center = self.screen.center();
        let tile_x =
            lon_to_tile_x(self.state.center.lng, zoom) + (pixel.x - center.x) / TILE_SIZE;
        let tile_y =
            lat_to_tile_y(self.state.center.lat, zoom) + (pixel.y - center.y) / TILE_SIZE;
        LatLng::new(tile_y_to_lat(tile_y, zoom), tile_x_to_lon(tile_x, zoom))
    }
}

/// The seam between the engine and the map renderer.
///
/// Implementations fail with [`PlanError::NotInitialized`] until the
/// projection has everything it needs (for [`MercatorViewport`], a screen
/// size). Callers must sequence initialization first; there are no retries.
///
/// `revision` is the viewport-changed notification: it increases on every
/// pan, zoom, resize, or programmatic recentering, and the sync reactor
/// re-anchors placed items whenever it moves.
pub trait ViewportAdapter {
    /// Snapshot the current conversion.
    fn projection(&self) -> Result<Projection, PlanError>;

    /// Recenter the view; bumps the revision.
    fn set_view(&mut self, center: LatLng, zoom: f64) -> Result<(), PlanError>;

    /// The current center and zoom.
    fn viewport(&self) -> Result<ViewportState, PlanError>;

    /// Monotonic change counter.
    fn revision(&self) -> u64;

    /// Convert a map-local pixel position to a geographic coordinate.
    fn pixel_to_geo(&self, pixel: PixelPoint) -> Result<LatLng, PlanError> {
        Ok(self.projection()?.pixel_to_geo(pixel))
    }

    /// Convert a geographic coordinate to a map-local pixel position.
    fn geo_to_pixel(&self, geo: LatLng) -> Result<PixelPoint, PlanError> {
        Ok(self.projection()?.geo_to_pixel(geo))
    }
}

/// Web Mercator viewport backing the desktop map area.
///
/// Created with a center and zoom but no screen size; every conversion fails
/// with [`PlanError::NotInitialized`] until the host's first layout pass
/// calls [`MercatorViewport::resize`].
#[derive(Debug, Clone)]
pub struct MercatorViewport {
    state: ViewportState,
    screen: Option<ScreenSize>,
    revision: u64,
}

impl MercatorViewport {
    /// Create an uninitialized viewport at the given center and zoom.
    #[must_use]
    pub fn new(center: LatLng, zoom: f64) -> Self {
        Self {
            state: ViewportState::new(center, zoom),
            screen: None,
            revision: 0,
        }
    }

    /// Update the map area size from the host layout. The first call
    /// initializes the projection; later calls with an unchanged size are
    /// no-ops.
    pub fn resize(&mut self, width: f64, height: f64) {
        let size = ScreenSize::new(width, height);
        if self.screen != Some(size) {
            self.screen = Some(size);
            self.revision += 1;
        }
    }

    /// The current screen size, if initialized.
    #[must_use]
    pub fn screen_size(&self) -> Option<ScreenSize> {
        self.screen
    }

    /// Pan the view by a pointer delta in screen pixels. Dragging content
    /// right moves the center west.
    pub fn pan_pixels(&mut self, dx: f64, dy: f64) {
        if dx == 0.0 && dy == 0.0 {
            return;
        }
        let zoom = self.state.zoom;
        let tile_x = lon_to_tile_x(self.state.center.lng, zoom) - dx / TILE_SIZE;
        let tile_y = lat_to_tile_y(self.state.center.lat, zoom) - dy / TILE_SIZE;
        self.state = ViewportState::new(
            LatLng::new(tile_y_to_lat(tile_y, zoom), tile_x_to_lon(tile_x, zoom)),
            zoom,
        );
        self.revision += 1;
    }

    /// Step the zoom level, keeping the geographic point under `focus`
    /// stationary on screen when a focus point is given.
    pub fn zoom_by(&mut self, step: f64, focus: Option<PixelPoint>) {
        let new_zoom = (self.state.zoom + step).clamp(MIN_ZOOM, MAX_ZOOM);
        if (new_zoom - self.state.zoom).abs() < f64::EPSILON {
            return;
        }

        let anchor = focus
            .and_then(|p| self.projection().ok().map(|proj| (p, proj.pixel_to_geo(p))));

        self.state = ViewportState::new(self.state.center, new_zoom);

        if let (Some((focus, geo)), Some(screen)) = (anchor, self.screen) {
            // Re-center so the anchor geo stays under the focus pixel.
            let center = screen.center();
            let tile_x = lon_to_tile_x(geo.lng, new_zoom) - (focus.x - center.x) / TILE_SIZE;
            let tile_y = lat_to_tile_y(geo.lat, new_zoom) - (focus.y - center.y) / TILE_SIZE;
            self.state = ViewportState::new(
                LatLng::new(
                    tile_y_to_lat(tile_y, new_zoom),
                    tile_x_to_lon(tile_x, new_zoom),
                ),
                new_zoom,
            );
        }
        self.revision += 1;
    }
}

impl ViewportAdapter for MercatorViewport {
    fn projection(&self) -> Result<Projection, PlanError> {
        let screen = self.screen.ok_or(PlanError::NotInitialized)?;
        Ok(Projection {
            state: self.state,
            screen,
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

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_viewport(center: LatLng, zoom: f64) -> MercatorViewport {
        let mut viewport = MercatorViewport::new(center, zoom);
        viewport.resize(800.0, 600.0);
        viewport
    }

    #[test]
    fn test_uninitialized_conversion_fails() {
        let viewport = MercatorViewport::new(LatLng::new(54.87157, 23.93421), 15.0);
        let err = viewport.geo_to_pixel(LatLng::new(54.87, 23.93)).unwrap_err();
        assert!(matches!(err, PlanError::NotInitialized));
    }

    #[test]
    fn test_center_projects_to_screen_center() {
        let center = LatLng::new(54.87157, 23.93421);
        let viewport = ready_viewport(center, 15.0);
        let pixel = viewport.geo_to_pixel(center).unwrap();
        assert!((pixel.x - 400.0).abs() < 1e-9);
        assert!((pixel.y - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_pixel_geo_round_trip() {
        let viewport = ready_viewport(LatLng::new(54.87157, 23.93421), 15.0);
        for &(x, y) in &[(0.0, 0.0), (400.0, 300.0), (799.0, 599.0), (123.4, 456.7)] {
            let pixel = PixelPoint::new(x, y);
            let geo = viewport.pixel_to_geo(pixel).unwrap();
            let back = viewport.geo_to_pixel(geo).unwrap();
            assert!((back.x - pixel.x).abs() < 1e-6, "x mismatch: {} vs {}", back.x, pixel.x);
            assert!((back.y - pixel.y).abs() < 1e-6, "y mismatch: {} vs {}", back.y, pixel.y);
        }
    }

    #[test]
    fn test_latitude_clamped_to_mercator_domain() {
        let viewport = ready_viewport(LatLng::new(0.0, 0.0), 2.0);
        let geo = viewport.pixel_to_geo(PixelPoint::new(400.0, -10_000.0)).unwrap();
        assert!(geo.lat <= MAX_MERCATOR_LATITUDE);

        let state = ViewportState::new(LatLng::new(90.0, 0.0), 5.0);
        assert!((state.center.lat - MAX_MERCATOR_LATITUDE).abs() < 1e-9);
    }

    #[test]
    fn test_pan_shifts_center() {
        let mut viewport = ready_viewport(LatLng::new(54.87157, 23.93421), 15.0);
        let before = viewport.viewport().unwrap();
        let rev_before = viewport.revision();

        viewport.pan_pixels(100.0, 50.0);

        let after = viewport.viewport().unwrap();
        assert!(after.center.lng < before.center.lng); // dragged east content → center west
        assert!(after.center.lat > before.center.lat);
        assert!(viewport.revision() > rev_before);
    }

    #[test]
    fn test_pan_round_trip_restores_projection() {
        let mut viewport = ready_viewport(LatLng::new(54.87157, 23.93421), 15.0);
        let mark = LatLng::new(54.873, 23.931);
        let before = viewport.geo_to_pixel(mark).unwrap();

        viewport.pan_pixels(120.0, -40.0);
        viewport.pan_pixels(-120.0, 40.0);

        let after = viewport.geo_to_pixel(mark).unwrap();
        assert!((after.x - before.x).abs() < 1e-6);
        assert!((after.y - before.y).abs() < 1e-6);
    }

    #[test]
    fn test_zoom_keeps_focus_point_stationary() {
        let mut viewport = ready_viewport(LatLng::new(54.87157, 23.93421), 14.0);
        let focus = PixelPoint::new(250.0, 180.0);
        let geo_at_focus = viewport.pixel_to_geo(focus).unwrap();

        viewport.zoom_by(1.0, Some(focus));

        assert!((viewport.viewport().unwrap().zoom - 15.0).abs() < f64::EPSILON);
        let after = viewport.geo_to_pixel(geo_at_focus).unwrap();
        assert!((after.x - focus.x).abs() < 1e-6);
        assert!((after.y - focus.y).abs() < 1e-6);
    }

    #[test]
    fn test_zoom_clamped_to_limits() {
        let mut viewport = ready_viewport(LatLng::new(0.0, 0.0), 18.0);
        viewport.zoom_by(5.0, None);
        assert!((viewport.viewport().unwrap().zoom - MAX_ZOOM).abs() < f64::EPSILON);

        viewport.zoom_by(-40.0, None);
        assert!((viewport.viewport().unwrap().zoom - MIN_ZOOM).abs() < f64::EPSILON);
    }

    #[test]
    fn test_set_view_bumps_revision() {
        let mut viewport = ready_viewport(LatLng::new(0.0, 0.0), 5.0);
        let rev = viewport.revision();
        viewport.set_view(LatLng::new(40.7, -74.0), 16.0).unwrap();
        assert!(viewport.revision() > rev);
        let state = viewport.viewport().unwrap();
        assert!((state.center.lat - 40.7).abs() < 1e-9);
        assert!((state.center.lng + 74.0).abs() < 1e-9);
        assert!((state.zoom - 16.0).abs() < f64::EPSILON);
    }
}
