#![forbid(unsafe_code)]

//! The texture atlas: LRU-guarded tile grid over a borrowed backend.
//!
//! An atlas partitions one GPU texture into a fixed grid of same-size tiles
//! and brokers every tile through a get-or-construct protocol: callers
//! address content by [`StrongHash`], misses invoke a caller-supplied build
//! function exactly once, and the resulting bitmap is uploaded to the tile
//! slot derived from the entry's stable index. Eviction is strict LRU over
//! the cached zone; the reserved direct-mapped prefix is never evicted.

use std::fmt;

use termtile_core::{StrongHash, StrongLruTable, TableStats};

use crate::backend::{
    AtlasBackend, ConfigureAtlas, Format, ImageSize, NormalizedTileLocation, TileLocation,
    UploadTile,
};

/// Immutable configuration of an atlas instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AtlasProperties {
    /// Texture pixel format.
    pub format: Format,
    /// Size in pixels of one tile.
    pub tile_size: ImageSize,
    /// Number of cacheable tiles the atlas must hold at least.
    pub tile_count: u32,
    /// Number of reserved direct-mapped tile slots.
    ///
    /// Direct-mapped slots hold hot, bounded-cardinality content (ASCII
    /// glyphs, cursor shapes) that must never be evicted and skips hashing.
    pub direct_mapping_count: u32,
}

/// What a build function yields on a cache miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileCreateData<M> {
    /// Row-major, unpadded pixel data.
    pub bitmap: Vec<u8>,
    pub bitmap_format: Format,
    /// Extent of the bitmap; must fit within the atlas's tile size.
    pub bitmap_size: ImageSize,
    /// Caller payload carried by the cache entry until eviction.
    pub metadata: M,
}

/// What render passes get back: where the tile lives and what the caller
/// stored alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileAttributes<M> {
    pub location: TileLocation,
    /// Size of the bitmap inside the tile.
    pub bitmap_size: ImageSize,
    pub metadata: M,
}

/// Fatal atlas construction/reconfiguration failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtlasError {
    /// The derived grid cannot fit the requested tiles. Also raised for
    /// degenerate tile sizes and for geometries whose texture would exceed
    /// 16-bit tile addressing (`capacity` is reported as 0 in both cases).
    InvalidGeometry { capacity: u32, required: u32 },
    /// `reset` was asked to change properties; geometry is frozen at
    /// construction.
    GeometryChangeUnsupported,
}

impl fmt::Display for AtlasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtlasError::InvalidGeometry { capacity, required } => write!(
                f,
                "atlas geometry cannot fit {required} tiles (grid capacity {capacity})"
            ),
            AtlasError::GeometryChangeUnsupported => {
                f.write_str("atlas geometry is frozen at construction and cannot be changed")
            }
        }
    }
}

impl std::error::Error for AtlasError {}

/// Texture size derived from atlas properties.
///
/// The grid packs `tile_count + direct_mapping_count` tiles, rounded up to a
/// power of two, onto a square-ish grid; each texture axis is independently
/// rounded up to a power of two.
fn compute_atlas_size(properties: &AtlasProperties) -> ImageSize {
    let total_tile_count = properties
        .tile_count
        .saturating_add(properties.direct_mapping_count)
        .max(1)
        .checked_next_power_of_two()
        .unwrap_or(u32::MAX);
    let edge = (f64::from(total_tile_count)).sqrt().ceil() as u64;
    let width = (edge * u64::from(properties.tile_size.width)).next_power_of_two();
    let height = (edge * u64::from(properties.tile_size.height)).next_power_of_two();
    ImageSize::new(width.min(u64::from(u32::MAX)) as u32, height.min(u64::from(u32::MAX)) as u32)
}

/// Tile offsets must stay addressable by the 16-bit [`TileLocation`] axes.
const MAX_ATLAS_EDGE: u32 = 1 << 16;

/// A single GPU texture partitioned into a fixed grid of same-size tiles,
/// with LRU caching for the general zone and a pinned direct-mapped prefix.
///
/// Single-owner and single-threaded; the backend is borrowed for the atlas's
/// lifetime and must outlive it. `M` is the caller's per-tile metadata
/// (glyph baseline offsets, image-fragment info, ...); it is dropped when the
/// carrying entry is evicted.
pub struct TextureAtlas<'b, B: AtlasBackend, M> {
    backend: &'b mut B,
    properties: AtlasProperties,
    atlas_size: ImageSize,
    tiles_in_x: u32,
    tiles_in_y: u32,
    /// Entry index -> tile attributes for the LRU zone.
    tile_cache: StrongLruTable<TileAttributes<M>>,
    /// Precomputed tile index -> pixel location for the whole grid.
    tile_locations: Vec<TileLocation>,
    /// Attributes of the direct-mapped prefix, indexed by mapping index.
    direct_mapping: Vec<TileAttributes<M>>,
}

impl<'b, B: AtlasBackend, M> TextureAtlas<'b, B, M> {
    /// Create an atlas and issue the single `configure_atlas` command.
    ///
    /// The grid capacity derived from `properties` must fit
    /// `tile_count + direct_mapping_count` tiles; otherwise
    /// [`AtlasError::InvalidGeometry`] is returned. Geometry rounding may
    /// leave the cache with more capacity than the requested `tile_count`;
    /// the extra room is used.
    ///
    /// # Panics
    ///
    /// Panics if `properties.tile_count` is zero; an atlas without cacheable
    /// tiles has nothing to broker.
    pub fn new(backend: &'b mut B, properties: AtlasProperties) -> Result<Self, AtlasError>
    where
        M: Default,
    {
        assert!(properties.tile_count > 0, "atlas needs at least one cacheable tile");
        let required = properties.tile_count.saturating_add(properties.direct_mapping_count);
        if properties.tile_size.width == 0 || properties.tile_size.height == 0 {
            return Err(AtlasError::InvalidGeometry { capacity: 0, required });
        }

        let atlas_size = compute_atlas_size(&properties);
        if atlas_size.width > MAX_ATLAS_EDGE || atlas_size.height > MAX_ATLAS_EDGE {
            return Err(AtlasError::InvalidGeometry { capacity: 0, required });
        }

        let tiles_in_x = atlas_size.width / properties.tile_size.width;
        let tiles_in_y = atlas_size.height / properties.tile_size.height;
        let capacity = tiles_in_x * tiles_in_y;
        if capacity < required {
            return Err(AtlasError::InvalidGeometry { capacity, required });
        }

        let tile_locations: Vec<TileLocation> = (0..capacity)
            .map(|tile_index| {
                TileLocation::new(
                    ((tile_index % tiles_in_x) * properties.tile_size.width) as u16,
                    ((tile_index / tiles_in_x) * properties.tile_size.height) as u16,
                )
            })
            .collect();

        let direct_mapping: Vec<TileAttributes<M>> = (0..properties.direct_mapping_count)
            .map(|index| TileAttributes {
                location: tile_locations[index as usize],
                bitmap_size: ImageSize::default(),
                metadata: M::default(),
            })
            .collect();

        let cache_capacity = capacity - properties.direct_mapping_count;
        let tile_cache = StrongLruTable::new(
            cache_capacity as usize,
            cache_capacity as usize,
            "texture-atlas tiles",
        );

        tracing::debug!(
            atlas_size = %atlas_size,
            tile_size = %properties.tile_size,
            tiles_in_x,
            tiles_in_y,
            direct_mapped = properties.direct_mapping_count,
            "configuring texture atlas",
        );
        backend.configure_atlas(ConfigureAtlas {
            size: atlas_size,
            properties,
        });

        Ok(Self {
            backend,
            properties,
            atlas_size,
            tiles_in_x,
            tiles_in_y,
            tile_cache,
            tile_locations,
            direct_mapping,
        })
    }

    /// Whether a cached tile exists for `key`. Does not touch LRU order.
    #[must_use]
    pub fn contains(&self, key: StrongHash) -> bool {
        self.tile_cache.contains(key)
    }

    /// Look up a cached tile, promoting it to most-recently-used on a hit.
    pub fn try_get(&mut self, key: StrongHash) -> Option<&TileAttributes<M>> {
        self.tile_cache.try_get(key)
    }

    /// Return the tile for `key`, building and uploading it on a miss.
    ///
    /// On a miss the build function runs exactly once with the tile's pixel
    /// location and the cache entry index; its bitmap is uploaded before the
    /// attributes are stored. A full cache evicts the least-recently-used
    /// tile first (dropping its metadata) and reuses its slot.
    ///
    /// # Panics
    ///
    /// Panics if the built bitmap exceeds the tile size.
    pub fn get_or_emplace<F>(&mut self, key: StrongHash, create: F) -> &TileAttributes<M>
    where
        F: FnOnce(TileLocation, u32) -> TileCreateData<M>,
    {
        let Self {
            backend,
            properties,
            tile_cache,
            tile_locations,
            ..
        } = self;
        tile_cache.get_or_emplace(key, |entry_index| {
            let location = cached_tile_location(tile_locations, properties, entry_index);
            upload_tile_data(
                &mut **backend,
                properties.tile_size,
                location,
                create(location, entry_index),
            )
        })
    }

    /// Like [`get_or_emplace`](Self::get_or_emplace), but the build function
    /// may decline by returning `None`; on decline nothing is uploaded, no
    /// cache slot is consumed, and no cached tile is evicted even when the
    /// cache is full. The next frame simply retries through the normal
    /// lookup path.
    ///
    /// # Panics
    ///
    /// Panics if the built bitmap exceeds the tile size.
    pub fn get_or_try_emplace<F>(&mut self, key: StrongHash, create: F) -> Option<&TileAttributes<M>>
    where
        F: FnOnce(TileLocation, u32) -> Option<TileCreateData<M>>,
    {
        let Self {
            backend,
            properties,
            tile_cache,
            tile_locations,
            ..
        } = self;
        tile_cache.get_or_try_emplace(key, |entry_index| {
            let location = cached_tile_location(tile_locations, properties, entry_index);
            let data = create(location, entry_index)?;
            Some(upload_tile_data(
                &mut **backend,
                properties.tile_size,
                location,
                data,
            ))
        })
    }

    /// Build and upload unconditionally, replacing any existing tile for
    /// `key`. The replaced entry's metadata is dropped before the build
    /// function runs.
    ///
    /// # Panics
    ///
    /// Panics if the built bitmap exceeds the tile size.
    pub fn emplace<F>(&mut self, key: StrongHash, create: F)
    where
        F: FnOnce(TileLocation, u32) -> TileCreateData<M>,
    {
        let Self {
            backend,
            properties,
            tile_cache,
            tile_locations,
            ..
        } = self;
        tile_cache.emplace(key, |entry_index| {
            let location = cached_tile_location(tile_locations, properties, entry_index);
            upload_tile_data(
                &mut **backend,
                properties.tile_size,
                location,
                create(location, entry_index),
            )
        });
    }

    /// Drop the cached tile for `key`, if any, freeing its slot.
    pub fn remove(&mut self, key: StrongHash) {
        self.tile_cache.remove(key);
    }

    /// Upload into a direct-mapped slot, bypassing the LRU cache.
    ///
    /// Overwriting is allowed and simply re-uploads; the previous metadata is
    /// dropped.
    ///
    /// # Panics
    ///
    /// Panics if `index >= direct_mapping_count` or the bitmap exceeds the
    /// tile size.
    pub fn set_direct_mapping(&mut self, index: u32, data: TileCreateData<M>) {
        assert!(
            (index as usize) < self.direct_mapping.len(),
            "direct-mapping index {index} out of range (count {})",
            self.direct_mapping.len(),
        );
        let location = self.tile_locations[index as usize];
        tracing::trace!(index, %location, "uploading direct-mapped tile");
        let attrs = upload_tile_data(&mut *self.backend, self.properties.tile_size, location, data);
        self.direct_mapping[index as usize] = attrs;
    }

    /// Attributes of a direct-mapped slot. Never touches LRU state.
    ///
    /// # Panics
    ///
    /// Panics if `index >= direct_mapping_count`.
    #[must_use]
    pub fn direct_mapped(&self, index: u32) -> &TileAttributes<M> {
        assert!(
            (index as usize) < self.direct_mapping.len(),
            "direct-mapping index {index} out of range (count {})",
            self.direct_mapping.len(),
        );
        &self.direct_mapping[index as usize]
    }

    /// Whether a direct-mapped zone is reserved.
    #[must_use]
    pub fn is_direct_mapping_enabled(&self) -> bool {
        !self.direct_mapping.is_empty()
    }

    /// Clear the tile cache, keeping geometry and the direct mapping.
    ///
    /// The backing texture is not reconfigured; asking for different
    /// properties fails with [`AtlasError::GeometryChangeUnsupported`].
    pub fn reset(&mut self, properties: AtlasProperties) -> Result<(), AtlasError> {
        if properties != self.properties {
            return Err(AtlasError::GeometryChangeUnsupported);
        }
        self.tile_cache.clear();
        Ok(())
    }

    /// Total number of tiles in the grid (direct-mapped plus cacheable).
    ///
    /// Geometry rounding means this can exceed
    /// `tile_count + direct_mapping_count`; the surplus extends the cache.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tile_locations.len()
    }

    /// Number of live cached tiles (excluding the direct-mapped zone).
    #[must_use]
    pub fn len(&self) -> usize {
        self.tile_cache.len()
    }

    /// Whether the cacheable zone is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tile_cache.is_empty()
    }

    /// Pixel location of a tile by grid index.
    ///
    /// # Panics
    ///
    /// Panics if `tile_index >= capacity()`.
    #[must_use]
    pub fn tile_location(&self, tile_index: u32) -> TileLocation {
        assert!(
            (tile_index as usize) < self.tile_locations.len(),
            "tile index {tile_index} out of range (capacity {})",
            self.tile_locations.len(),
        );
        self.tile_locations[tile_index as usize]
    }

    /// Tiles per texture row.
    #[must_use]
    pub fn tiles_in_x(&self) -> u32 {
        self.tiles_in_x
    }

    /// Tiles per texture column.
    #[must_use]
    pub fn tiles_in_y(&self) -> u32 {
        self.tiles_in_y
    }

    /// Pixel size of the backing texture.
    #[must_use]
    pub fn atlas_size(&self) -> ImageSize {
        self.atlas_size
    }

    /// Pixel size of one tile.
    #[must_use]
    pub fn tile_size(&self) -> ImageSize {
        self.properties.tile_size
    }

    /// The properties the atlas was created with.
    #[must_use]
    pub fn properties(&self) -> &AtlasProperties {
        &self.properties
    }

    /// The borrowed backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &*self.backend
    }

    /// Mutable access to the borrowed backend, e.g. to issue render commands.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut *self.backend
    }

    /// A tile's position and extent in normalized texture coordinates, for
    /// filling [`RenderTile::normalized_location`](crate::RenderTile).
    #[must_use]
    pub fn normalized_location(
        &self,
        location: TileLocation,
        bitmap_size: ImageSize,
    ) -> NormalizedTileLocation {
        NormalizedTileLocation {
            x: f32::from(location.x) / self.atlas_size.width as f32,
            y: f32::from(location.y) / self.atlas_size.height as f32,
            width: bitmap_size.width as f32 / self.atlas_size.width as f32,
            height: bitmap_size.height as f32 / self.atlas_size.height as f32,
        }
    }

    /// Cache behavior counters.
    #[must_use]
    pub fn stats(&self) -> TableStats {
        self.tile_cache.stats()
    }

    /// Write a human-readable dump of the atlas and its cache.
    pub fn inspect(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "TextureAtlas")?;
        writeln!(out, "  atlas size    : {}", self.atlas_size)?;
        writeln!(out, "  tile size     : {}", self.properties.tile_size)?;
        writeln!(out, "  grid          : {}x{}", self.tiles_in_x, self.tiles_in_y)?;
        writeln!(out, "  direct mapped : {}", self.properties.direct_mapping_count)?;
        self.tile_cache.inspect(out)
    }
}

impl<B: AtlasBackend, M> fmt::Debug for TextureAtlas<'_, B, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureAtlas")
            .field("atlas_size", &self.atlas_size)
            .field("tiles_in_x", &self.tiles_in_x)
            .field("tiles_in_y", &self.tiles_in_y)
            .field("cached", &self.tile_cache.len())
            .field("direct_mapped", &self.direct_mapping.len())
            .finish_non_exhaustive()
    }
}

/// Location of the cached tile backing `entry_index`: cache entries occupy
/// the grid after the direct-mapped prefix.
fn cached_tile_location(
    tile_locations: &[TileLocation],
    properties: &AtlasProperties,
    entry_index: u32,
) -> TileLocation {
    tile_locations[(entry_index + properties.direct_mapping_count) as usize]
}

/// Upload a built bitmap and produce the attributes to store for it.
fn upload_tile_data<B: AtlasBackend, M>(
    backend: &mut B,
    tile_size: ImageSize,
    location: TileLocation,
    data: TileCreateData<M>,
) -> TileAttributes<M> {
    assert!(
        data.bitmap_size.fits_within(tile_size),
        "tile bitmap {} exceeds tile size {}",
        data.bitmap_size,
        tile_size,
    );
    backend.upload_tile(UploadTile {
        location,
        bitmap: data.bitmap,
        bitmap_size: data.bitmap_size,
        bitmap_format: data.bitmap_format,
    });
    TileAttributes {
        location,
        bitmap_size: data.bitmap_size,
        metadata: data.metadata,
    }
}

/// A contiguous range of direct-mapped tile indices handed to one consumer.
///
/// Cooperating renderers (text, cursor, decorations) each reserve a range up
/// front via [`DirectMappingAllocator`] and translate their local indices
/// with [`to_tile_index`](DirectMapping::to_tile_index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectMapping {
    pub base_index: u32,
    pub count: u32,
}

impl DirectMapping {
    /// Whether this mapping reserves any slots at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.count != 0
    }

    /// Translate a mapping-local index to a grid tile index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= count`.
    #[must_use]
    pub fn to_tile_index(&self, index: u32) -> u32 {
        assert!(
            index < self.count,
            "direct-mapping local index {index} out of range (count {})",
            self.count,
        );
        self.base_index + index
    }
}

/// Hands out consecutive direct-mapped ranges to cooperating consumers.
///
/// Disabled allocators yield empty mappings, letting callers opt out of
/// direct mapping without changing their code path.
#[derive(Debug, Clone)]
pub struct DirectMappingAllocator {
    allocated: u32,
    pub enabled: bool,
}

impl DirectMappingAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Start allocation at `base`, e.g. to skip slots reserved elsewhere.
    #[must_use]
    pub fn starting_at(base: u32) -> Self {
        Self {
            allocated: base,
            enabled: true,
        }
    }

    /// Reserve the next `count` slots; an empty mapping when disabled.
    pub fn allocate(&mut self, count: u32) -> DirectMapping {
        if !self.enabled {
            return DirectMapping::default();
        }
        let base_index = self.allocated;
        self.allocated += count;
        DirectMapping { base_index, count }
    }

    /// Total slots handed out so far (including any starting offset).
    #[must_use]
    pub fn allocated_count(&self) -> u32 {
        self.allocated
    }
}

impl Default for DirectMappingAllocator {
    fn default() -> Self {
        Self::new()
    }
}
