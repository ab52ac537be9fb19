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

//! Error taxonomy for the placement engine.
//!
//! Every failure is non-fatal to a running session: the session always
//! prefers degraded operation over crashing the interaction loop. Callers
//! log and continue; none of these variants should escape to a panic.

use thiserror::Error;

use crate::store::ItemId;

/// Errors that can occur in the placement engine.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The viewport adapter was used before it received a screen size.
    /// Indicates a startup-ordering bug at the call site; there is no retry.
    #[error("viewport used before initialization")]
    NotInitialized,

    /// A store mutation referenced an id that is not in the store.
    /// Indicates a coordinator bug; callers log and ignore.
    #[error("no placed item with id {0}")]
    NotFound(ItemId),

    /// Durable storage could not be read or written. The session degrades
    /// to in-memory-only operation.
    #[error("persistent storage unavailable: {0}")]
    PersistenceUnavailable(String),

    /// A geocoding request failed (network, HTTP status, or response shape).
    /// The viewport is left unchanged.
    #[error("geocoding failed: {0}")]
    GeocodeFailure(String),
}
