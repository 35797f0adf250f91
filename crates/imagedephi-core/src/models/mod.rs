//! Data models for items and their annotations.
//!
//! - `Item`, `TileMetadata`: the image item and its tile pyramid
//! - `GirderKeyspace`, `GeoJson`, `Feature`: redaction annotations stored
//!   in the item's metadata

pub mod item;

pub use item::{
    Feature, GeoJsProperties, GeoJson, Geometry, GirderKeyspace, ImagedephiMetadata, Item,
    TileMetadata,
};
