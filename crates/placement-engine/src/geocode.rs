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

//! Location search against the OpenStreetMap Nominatim service.
//!
//! One-shot HTTP GET, query string in, JSON candidate array out; the
//! consumer recenters on the first candidate. Requests block, so hosts run
//! them on a background thread and apply the result on the UI thread.
//!
//! Because two searches can be in flight at once and responses arrive in any
//! order, [`SearchSequencer`] hands out monotonic tickets: only the most
//! recently issued search may apply its result, so a slow earlier response
//! can never overwrite a later one.

use std::time::Duration;

use log::warn;
use serde::Deserialize;

use crate::error::PlanError;
use crate::geo::LatLng;

/// Default Nominatim endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Zoom level applied when recentering on a search result.
pub const SEARCH_RESULT_ZOOM: f64 = 16.0;

/// Configuration for the geocoding client.
#[derive(Debug, Clone)]
pub struct GeocodeConfig {
    /// Search endpoint URL.
    pub endpoint: String,
    /// Request timeout.
    pub timeout: Duration,
    /// User-Agent header (Nominatim's usage policy requires one).
    pub user_agent: String,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// One candidate location from a search response.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeCandidate {
    /// The candidate's coordinate.
    pub coordinate: LatLng,
    /// Human-readable place label.
    pub label: String,
}

// Nominatim serializes coordinates as strings.
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

impl NominatimPlace {
    fn into_candidate(self) -> Option<GeocodeCandidate> {
        match (self.lat.parse::<f64>(), self.lon.parse::<f64>()) {
            (Ok(lat), Ok(lon)) => Some(GeocodeCandidate {
                coordinate: LatLng::new(lat, lon),
                label: self.display_name,
            }),
            _ => {
                warn!(
                    "Skipping geocode candidate with unparsable coordinates: {:?}/{:?}",
                    self.lat, self.lon
                );
                None
            }
        }
    }
}

fn candidates_from_places(places: Vec<NominatimPlace>) -> Vec<GeocodeCandidate> {
    places
        .into_iter()
        .filter_map(NominatimPlace::into_candidate)
        .collect()
}

/// Blocking geocoding client.
#[derive(Debug, Clone)]
pub struct GeocodeClient {
    http: reqwest::blocking::Client,
    endpoint: String,
}

impl GeocodeClient {
    /// Build a client from the given configuration.
    pub fn new(config: GeocodeConfig) -> Result<Self, PlanError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| PlanError::GeocodeFailure(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: config.endpoint,
        })
    }

    /// Search for a free-form query. Blocks for up to the configured
    /// timeout; do not call on the UI thread.
    pub fn search(&self, query: &str) -> Result<Vec<GeocodeCandidate>, PlanError> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("format", "json"), ("q", query)])
            .send()
            .map_err(|e| PlanError::GeocodeFailure(e.to_string()))?
            .error_for_status()
            .map_err(|e| PlanError::GeocodeFailure(e.to_string()))?;

        let places: Vec<NominatimPlace> = response
            .json()
            .map_err(|e| PlanError::GeocodeFailure(e.to_string()))?;
        Ok(candidates_from_places(places))
    }
}

/// Ticket identifying one issued search request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchTicket(u64);

/// Last-issued-wins guard for in-flight searches.
#[derive(Debug, Default)]
pub struct SearchSequencer {
    issued: u64,
    applied: u64,
}

impl SearchSequencer {
    /// Create a sequencer with no searches issued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new search; any earlier in-flight search is superseded.
    pub fn issue(&mut self) -> SearchTicket {
        self.issued += 1;
        SearchTicket(self.issued)
    }

    /// Whether the result for `ticket` may be applied. True only for the
    /// most recently issued, not-yet-applied search; stale results are
    /// dropped.
    pub fn accept(&mut self, ticket: SearchTicket) -> bool {
        if ticket.0 == self.issued && ticket.0 > self.applied {
            self.applied = ticket.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nominatim_response_parses_string_coordinates() {
        let body = r#"[
            {"lat": "40.7", "lon": "-74.0", "display_name": "New York"},
            {"lat": "40.8", "lon": "-74.1", "display_name": "Elsewhere"}
        ]"#;
        let places: Vec<NominatimPlace> = serde_json::from_str(body).unwrap();
        let candidates = candidates_from_places(places);

        assert_eq!(candidates.len(), 2);
        assert!((candidates[0].coordinate.lat - 40.7).abs() < 1e-9);
        assert!((candidates[0].coordinate.lng + 74.0).abs() < 1e-9);
        assert_eq!(candidates[0].label, "New York");
    }

    #[test]
    fn test_unparsable_candidates_are_skipped() {
        let body = r#"[
            {"lat": "not-a-number", "lon": "-74.0"},
            {"lat": "40.7", "lon": "-74.0", "display_name": "New York"}
        ]"#;
        let places: Vec<NominatimPlace> = serde_json::from_str(body).unwrap();
        let candidates = candidates_from_places(places);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].label, "New York");
    }

    #[test]
    fn test_empty_response_yields_no_candidates() {
        let places: Vec<NominatimPlace> = serde_json::from_str("[]").unwrap();
        assert!(candidates_from_places(places).is_empty());
    }

    #[test]
    fn test_sequencer_drops_stale_results() {
        let mut sequencer = SearchSequencer::new();
        let first = sequencer.issue();
        let second = sequencer.issue();

        // The slower first response arrives after the second was issued.
        assert!(!sequencer.accept(first));
        assert!(sequencer.accept(second));
        assert!(!sequencer.accept(second));
    }

    #[test]
    fn test_sequencer_accepts_single_search() {
        let mut sequencer = SearchSequencer::new();
        let ticket = sequencer.issue();
        assert!(sequencer.accept(ticket));
    }
}
