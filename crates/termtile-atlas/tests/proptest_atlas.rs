//! Property-based invariants for the texture atlas: for arbitrary request
//! sequences the cache stays within capacity, every upload targets a tile
//! inside the texture, and cached tiles never overlap the direct-mapped zone.

use proptest::prelude::*;
use termtile_atlas::{
    AtlasBackend, AtlasProperties, ConfigureAtlas, Format, ImageSize, RenderTile, StrongHash,
    TextureAtlas, TileCreateData, UploadTile,
};

#[derive(Debug, Default)]
struct BoundsCheckingBackend {
    size: ImageSize,
    tile_size: ImageSize,
    uploads: usize,
}

impl AtlasBackend for BoundsCheckingBackend {
    fn atlas_size(&self) -> ImageSize {
        self.size
    }

    fn configure_atlas(&mut self, command: ConfigureAtlas) {
        self.size = command.size;
        self.tile_size = command.properties.tile_size;
    }

    fn upload_tile(&mut self, command: UploadTile) {
        self.uploads += 1;
        assert!(command.bitmap_size.fits_within(self.tile_size));
        assert!(u32::from(command.location.x) + command.bitmap_size.width <= self.size.width);
        assert!(u32::from(command.location.y) + command.bitmap_size.height <= self.size.height);
        assert_eq!(
            command.bitmap.len() as u64,
            command.bitmap_size.area() * u64::from(command.bitmap_format.bytes_per_pixel()),
        );
    }

    fn render_tile(&mut self, _command: RenderTile) {}
}

#[derive(Debug, Clone)]
enum Request {
    GetOrEmplace(u32),
    TryEmplaceDeclining(u32),
    Remove(u32),
    DirectUpload(u32),
}

fn requests() -> impl Strategy<Value = Vec<Request>> {
    let request = prop_oneof![
        5 => (0u32..24).prop_map(Request::GetOrEmplace),
        1 => (0u32..24).prop_map(Request::TryEmplaceDeclining),
        1 => (0u32..24).prop_map(Request::Remove),
        1 => (0u32..4).prop_map(Request::DirectUpload),
    ];
    proptest::collection::vec(request, 0..120)
}

fn tile(metadata: u8, size: ImageSize) -> TileCreateData<u8> {
    TileCreateData {
        bitmap: vec![metadata; size.area() as usize],
        bitmap_format: Format::Red,
        bitmap_size: size,
        metadata,
    }
}

proptest! {
    #[test]
    fn arbitrary_request_sequences_hold_invariants(
        ops in requests(),
        tile_count in 1u32..12,
        direct_mapping_count in 0u32..4,
    ) {
        let properties = AtlasProperties {
            format: Format::Red,
            tile_size: ImageSize::new(8, 16),
            tile_count,
            direct_mapping_count,
        };
        let mut backend = BoundsCheckingBackend::default();
        let mut atlas: TextureAtlas<'_, _, u8> =
            TextureAtlas::new(&mut backend, properties).unwrap();

        let cache_capacity = atlas.capacity() - direct_mapping_count as usize;
        let bitmap_size = ImageSize::new(8, 16);

        for op in ops {
            match op {
                Request::GetOrEmplace(v) => {
                    let attrs = *atlas.get_or_emplace(
                        StrongHash::from_parts(0, 0, 0, v),
                        |_, _| tile(v as u8, bitmap_size),
                    );
                    // Cached tiles live strictly after the direct-mapped zone.
                    let tile_index = u32::from(attrs.location.y) / 16 * atlas.tiles_in_x()
                        + u32::from(attrs.location.x) / 8;
                    prop_assert!(tile_index >= direct_mapping_count);
                }
                Request::TryEmplaceDeclining(v) => {
                    prop_assert!(atlas
                        .get_or_try_emplace(StrongHash::from_parts(0, 0, 0, v), |_, _| None)
                        .map(|a| a.metadata)
                        .map_or(true, |m| u32::from(m) == v));
                }
                Request::Remove(v) => atlas.remove(StrongHash::from_parts(0, 0, 0, v)),
                Request::DirectUpload(i) => {
                    if i < direct_mapping_count {
                        atlas.set_direct_mapping(i, tile(i as u8, bitmap_size));
                        prop_assert_eq!(atlas.direct_mapped(i).metadata, i as u8);
                    }
                }
            }
            prop_assert!(atlas.len() <= cache_capacity);
        }
    }
}
