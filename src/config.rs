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

//! Application configuration management.
//!
//! Persistent configuration in TOML format via `confy`. Covers the startup
//! viewport, the drop-surface overlap threshold, and search behavior. Every
//! field carries a serde default so configs written by older versions keep
//! loading.

use serde::{Deserialize, Serialize};

use placement_engine::{DEFAULT_CENTER, DEFAULT_ZOOM};

const APP_NAME: &str = "eventmap-desktop";

/// Application configuration stored in TOML format.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    /// Startup latitude when no saved state exists.
    #[serde(default = "default_lat")]
    pub default_lat: f64,

    /// Startup longitude when no saved state exists.
    #[serde(default = "default_lng")]
    pub default_lng: f64,

    /// Startup zoom level when no saved state exists.
    #[serde(default = "default_zoom")]
    pub default_zoom: f64,

    /// Fraction of a dragged palette ghost that must overlap the map for a
    /// release to count as a drop (0.0 - 1.0).
    #[serde(default = "default_drop_overlap")]
    pub drop_overlap_threshold: f64,

    /// Timeout for location search requests, in seconds.
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,

    /// Tool palette panel width in pixels.
    #[serde(default = "default_palette_width")]
    pub palette_width: f32,

    /// Cache downloaded map tiles on disk.
    #[serde(default = "default_true")]
    pub cache_tiles: bool,
}

// Default value functions for serde
fn default_lat() -> f64 {
    DEFAULT_CENTER.lat
}

fn default_lng() -> f64 {
    DEFAULT_CENTER.lng
}

fn default_zoom() -> f64 {
    DEFAULT_ZOOM
}

fn default_drop_overlap() -> f64 {
    0.5
}

fn default_search_timeout() -> u64 {
    10
}

fn default_palette_width() -> f32 {
    180.0
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_lat: default_lat(),
            default_lng: default_lng(),
            default_zoom: default_zoom(),
            drop_overlap_threshold: default_drop_overlap(),
            search_timeout_secs: default_search_timeout(),
            palette_width: default_palette_width(),
            cache_tiles: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults on first run.
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, "config")
    }

    /// Save configuration to disk.
    #[allow(dead_code)]
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, "config", self)
    }

    /// Clamped overlap threshold, safe against hand-edited configs.
    pub fn overlap_threshold(&self) -> f64 {
        self.drop_overlap_threshold.clamp(0.0, 1.0)
    }
}
