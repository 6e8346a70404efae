#![forbid(unsafe_code)]

//! The command protocol between the atlas and its GPU backend.
//!
//! The atlas treats the GPU as a sink of three commands: one
//! [`ConfigureAtlas`] per atlas lifetime, then an interleaved stream of
//! [`UploadTile`] and [`RenderTile`] in issue order. For any given tile the
//! upload strictly precedes the first render that samples it; the atlas
//! guarantees that ordering, the backend just executes.
//!
//! Implementations may batch the actual GPU work; that is invisible to the
//! atlas, which considers a command done when the call returns.

use std::fmt;

use crate::atlas::AtlasProperties;

/// Texture pixel format. The discriminant doubles as bytes per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Format {
    /// Single-channel alpha/coverage.
    Red = 1,
    Rgb = 3,
    Rgba = 4,
}

impl Format {
    /// Bytes per pixel in a bitmap of this format.
    #[inline]
    #[must_use]
    pub const fn bytes_per_pixel(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Red => f.write_str("R"),
            Format::Rgb => f.write_str("RGB"),
            Format::Rgba => f.write_str("RGBA"),
        }
    }
}

/// A width/height pair in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    #[inline]
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel count.
    #[inline]
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Whether `self` fits inside `other` on both axes.
    #[inline]
    #[must_use]
    pub const fn fits_within(self, other: ImageSize) -> bool {
        self.width <= other.width && self.height <= other.height
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel offset of a tile's top-left corner in the atlas texture.
///
/// 16 bits per axis: tile grids are addressed within a texture of at most
/// 65536 pixels per edge, which every real atlas stays well under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TileLocation {
    pub x: u16,
    pub y: u16,
}

impl TileLocation {
    #[inline]
    #[must_use]
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for TileLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tile {}x+{}y", self.x, self.y)
    }
}

/// A [`TileLocation`] packed into one 32-bit word: `y` in the high half, `x`
/// in the low half.
///
/// The packing lets callers pass a tile address through narrow channels (a
/// vertex attribute, a wire message) without knowing the atlas's pixel
/// dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AtlasTileId(pub u32);

impl AtlasTileId {
    #[inline]
    #[must_use]
    pub const fn from_location(location: TileLocation) -> Self {
        Self(((location.y as u32) << 16) | location.x as u32)
    }

    #[inline]
    #[must_use]
    pub const fn location(self) -> TileLocation {
        TileLocation::new(self.0 as u16, (self.0 >> 16) as u16)
    }
}

impl From<TileLocation> for AtlasTileId {
    fn from(location: TileLocation) -> Self {
        Self::from_location(location)
    }
}

/// A tile's position and extent in normalized texture coordinates `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NormalizedTileLocation {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Command: (re-)create the backing texture for an atlas.
///
/// Issued exactly once per [`TextureAtlas`](crate::TextureAtlas) lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConfigureAtlas {
    /// Texture size in pixels.
    pub size: ImageSize,
    pub properties: AtlasProperties,
}

/// Command: upload a bitmap into the tile at `location`.
///
/// Bitmap ownership moves into the command; the bytes are row-major,
/// unpadded, top-left origin, `bitmap_format.bytes_per_pixel()` per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UploadTile {
    pub location: TileLocation,
    pub bitmap: Vec<u8>,
    pub bitmap_size: ImageSize,
    pub bitmap_format: Format,
}

/// Command: draw one tile at a target position.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RenderTile {
    /// Target X in pixels (window coordinate system).
    pub x: i32,
    /// Target Y in pixels.
    pub y: i32,
    /// Extent of the bitmap inside the tile; never exceeds the tile size.
    pub bitmap_size: ImageSize,
    /// Normalized RGBA, each component in `[0, 1]`.
    pub color: [f32; 4],
    /// Which tile to sample.
    pub tile_location: TileLocation,
    pub normalized_location: NormalizedTileLocation,
    /// Opaque selector routed to the backend's shader program.
    pub fragment_shader_selector: u32,
}

/// The atlas's only downward dependency: whatever turns atlas commands into
/// GPU operations.
///
/// Borrowed by the atlas and driven from a single thread; implementations
/// need no internal synchronization on the atlas's account.
pub trait AtlasBackend {
    /// Pixel size of the backing texture.
    fn atlas_size(&self) -> ImageSize;

    /// Create the backing texture, destroying any prior one.
    fn configure_atlas(&mut self, command: ConfigureAtlas);

    /// Upload a tile bitmap. Destructive transfer of the bitmap buffer.
    fn upload_tile(&mut self, command: UploadTile);

    /// Draw a tile.
    fn render_tile(&mut self, command: RenderTile);
}
