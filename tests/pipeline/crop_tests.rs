//! Pixel-exact reconstruction tests.
//!
//! Tests verify:
//! - Saved crops reproduce the source pixels at every pyramid level
//! - Misaligned, edge-flush, single-pixel and full-image crops
//! - Concurrent saves against one shared source

use std::sync::Arc;

use ome_slicer::{parse_ome_xml, OmeSlicer};

use super::test_utils::{
    assemble_raster, expected_window_raster, pixel_value, scaled_window, MemorySink,
    PyramidSource, RawCodec,
};

const FACTORS: [u32; 3] = [1, 2, 4];
const TILE: u32 = 16;

/// 200x120 uint8 source with levels 200x120, 100x60 and 50x30.
async fn load_slicer() -> OmeSlicer<PyramidSource> {
    OmeSlicer::load(PyramidSource::new(200, 120, TILE, &FACTORS, &["dapi", "gfp"]))
        .await
        .unwrap()
}

/// Assert the saved tiles reproduce the reference raster for every level
/// and plane of `crop`.
fn assert_reconstruction(sink: &MemorySink, crop: (u32, u32, u32, u32)) {
    for (level, &factor) in FACTORS.iter().enumerate() {
        let (_, _, width, height) = scaled_window(crop.0, crop.1, crop.2, crop.3, factor);
        for plane in 0..2 {
            let got = assemble_raster(&sink.tiles, level, plane, width, height, TILE);
            let want = expected_window_raster(level, plane, crop, factor);
            assert_eq!(got, want, "level {level} plane {plane}");
        }
    }
}

// =============================================================================
// Reconstruction
// =============================================================================

#[tokio::test]
async fn test_misaligned_crop_reproduces_source_pixels_at_every_level() {
    let slicer = load_slicer().await;
    let crop = (13, 9, 70, 50);
    let cropped = slicer.crop(crop.0, crop.1, crop.2, crop.3).unwrap();
    assert_eq!(cropped.dimensions(), (70, 50, 2));

    let mut sink = MemorySink::default();
    cropped.save(Arc::new(RawCodec), &mut sink).await.unwrap();

    assert_reconstruction(&sink, crop);
}

#[tokio::test]
async fn test_crop_flush_with_image_edge_handles_partial_tiles() {
    let slicer = load_slicer().await;
    // Touches the right and bottom image edges, where source tiles are
    // 8 pixels short of the nominal 16.
    let crop = (150, 100, 50, 20);
    let cropped = slicer.crop(crop.0, crop.1, crop.2, crop.3).unwrap();

    let mut sink = MemorySink::default();
    cropped.save(Arc::new(RawCodec), &mut sink).await.unwrap();

    assert_reconstruction(&sink, crop);
}

#[tokio::test]
async fn test_single_pixel_crop_produces_one_pixel_per_level() {
    let slicer = load_slicer().await;
    let cropped = slicer.crop(57, 33, 1, 1).unwrap();
    assert_eq!(cropped.dimensions(), (1, 1, 2));

    let mut sink = MemorySink::default();
    cropped.save(Arc::new(RawCodec), &mut sink).await.unwrap();

    // One 1x1 tile per (level, plane); a 1 pixel extent stays 1 pixel at
    // every scale.
    assert_eq!(sink.tiles.len(), 6);
    for tile in &sink.tiles {
        assert_eq!((tile.width, tile.height), (1, 1));
        let factor = FACTORS[tile.level];
        let want = pixel_value(tile.level, tile.plane, 57 / factor, 33 / factor);
        assert_eq!(tile.data.as_ref(), &[want]);
    }
}

// =============================================================================
// Full-Image Round Trip
// =============================================================================

#[tokio::test]
async fn test_full_image_crop_round_trips_descriptor_and_pixels() {
    let slicer = load_slicer().await;
    let cropped = slicer.crop(0, 0, 200, 120).unwrap();

    assert_eq!(cropped.descriptor(), slicer.descriptor());
    assert_eq!(
        parse_ome_xml(cropped.metadata_text()).unwrap(),
        parse_ome_xml(slicer.metadata_text()).unwrap()
    );

    let mut sink = MemorySink::default();
    cropped.save(Arc::new(RawCodec), &mut sink).await.unwrap();

    assert_reconstruction(&sink, (0, 0, 200, 120));
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_concurrent_saves_share_one_source() {
    let slicer = load_slicer().await;
    let codec = Arc::new(RawCodec);

    let first = slicer.crop(13, 9, 70, 50).unwrap();
    let second = slicer.crop(0, 0, 32, 32).unwrap();

    let mut first_sink = MemorySink::default();
    let mut second_sink = MemorySink::default();
    let (first_result, second_result) = tokio::join!(
        first.save(Arc::clone(&codec), &mut first_sink),
        second.save(Arc::clone(&codec), &mut second_sink),
    );
    first_result.unwrap();
    second_result.unwrap();

    assert_reconstruction(&first_sink, (13, 9, 70, 50));
    assert_reconstruction(&second_sink, (0, 0, 32, 32));
}
