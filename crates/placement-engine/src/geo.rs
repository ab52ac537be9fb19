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

//! Primitive coordinate types.
//!
//! Two coordinate spaces exist in this crate and must never be confused:
//!
//! - [`LatLng`] — a geographic coordinate, stable across any viewport.
//! - [`PixelPoint`] — a screen position, valid only for one viewport state.
//!
//! The authoritative position of a placed item is always a [`LatLng`];
//! pixel positions are derived from it, never the other way around.

use serde::{Deserialize, Serialize};

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude in degrees, positive north.
    pub lat: f64,
    /// Longitude in degrees, positive east.
    pub lng: f64,
}

impl LatLng {
    /// Create a new geographic coordinate.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl std::fmt::Display for LatLng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.5}, {:.5})", self.lat, self.lng)
    }
}

/// A position in map-local screen pixels, origin at the top-left corner of
/// the map area.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    /// Create a new pixel position.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// This point translated by an offset.
    #[must_use]
    pub fn offset_by(self, offset: PixelOffset) -> Self {
        Self {
            x: self.x + offset.dx,
            y: self.y + offset.dy,
        }
    }
}

/// An accumulated translation in screen pixels, used for the purely visual
/// displacement of an item while a drag gesture is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelOffset {
    pub dx: f64,
    pub dy: f64,
}

impl PixelOffset {
    /// The zero offset.
    pub const ZERO: Self = Self { dx: 0.0, dy: 0.0 };

    /// Create a new offset.
    #[must_use]
    pub const fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    /// Accumulate a pointer-move delta.
    pub fn accumulate(&mut self, dx: f64, dy: f64) {
        self.dx += dx;
        self.dy += dy;
    }

    /// Whether this offset is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.dx == 0.0 && self.dy == 0.0
    }
}

/// The size of the map area in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenSize {
    pub width: f64,
    pub height: f64,
}

impl ScreenSize {
    /// Create a new screen size.
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// The center of the screen.
    #[must_use]
    pub fn center(&self) -> PixelPoint {
        PixelPoint::new(self.width / 2.0, self.height / 2.0)
    }

    /// Whether a point lies inside the screen rectangle.
    #[must_use]
    pub fn contains(&self, point: PixelPoint) -> bool {
        point.x >= 0.0 && point.x <= self.width && point.y >= 0.0 && point.y <= self.height
    }
}
