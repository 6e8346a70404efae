#![forbid(unsafe_code)]

//! Fixed-grid GPU texture atlas with LRU tile caching.
//!
//! A terminal renderer produces a stream of content-addressed tile requests
//! (glyph slices, image fragments, cursor shapes) and needs them satisfied
//! with bounded GPU memory, constant-time lookup, at most one upload per
//! distinct content, and deterministic eviction. This crate is that broker.
//!
//! # How it fits together
//!
//! A [`TextureAtlas`] partitions one GPU texture into a regular grid of
//! same-size tiles. Callers fingerprint their semantic key into a
//! [`StrongHash`](termtile_core::StrongHash) and call
//! [`get_or_emplace`](TextureAtlas::get_or_emplace) with a build function; on
//! a miss the atlas assigns a stable entry index (evicting the
//! least-recently-used tile if full), maps it to a [`TileLocation`], uploads
//! the built bitmap through the borrowed [`AtlasBackend`], and hands back
//! [`TileAttributes`] for the draw call. A reserved prefix of the grid is
//! *direct-mapped*: pinned tiles (ASCII, cursor shapes) that skip hashing and
//! are never evicted.
//!
//! The backend is a sink of three commands (configure, upload, render) and
//! tile content is an opaque bitmap. Everything GPU-specific lives behind the
//! [`AtlasBackend`] trait.

pub mod atlas;
pub mod backend;
pub mod color;
pub mod slicing;

pub use atlas::{
    AtlasError, AtlasProperties, DirectMapping, DirectMappingAllocator, TextureAtlas,
    TileAttributes, TileCreateData,
};
pub use backend::{
    AtlasBackend, AtlasTileId, ConfigureAtlas, Format, ImageSize, NormalizedTileLocation,
    RenderTile, TileLocation, UploadTile,
};
pub use color::{normalize_rgb, normalize_rgba, RgbColor, RgbaColor};
pub use slicing::{sliced, TileSliceIndex};

pub use termtile_core::StrongHash;
