//! Map rendering and tile management.
//!
//! Tile fetching and caching for the map area. Projection math lives in the
//! placement engine; this module only turns a viewport into a set of
//! OpenStreetMap tiles and screen offsets.

pub mod tiles;

pub use tiles::TileManager;
