//! Tile-exactness and degenerate-level tests.
//!
//! Tests verify:
//! - A crop reads only the source tiles its scaled windows intersect
//! - Decode cache capacity changes read counts, never output
//! - Levels that cannot supply the scaled window are dropped or, under the
//!   fail policy, abort the crop

use std::sync::atomic::Ordering;
use std::sync::Arc;

use ome_slicer::{
    parse_ome_xml, DegenerateLevelPolicy, GeometryError, OmeSlicer, SliceError, SlicerOptions,
};

use super::test_utils::{
    assemble_raster, expected_window_raster, scaled_window, MemorySink, PyramidSource, RawCodec,
    TrackingSink,
};

// =============================================================================
// Read Patterns
// =============================================================================

#[tokio::test]
async fn test_crop_reads_only_the_tiles_its_windows_intersect() {
    // 20000x15000 slide, 512px tiles, levels 20000x15000, 5000x3750 and
    // 1250x938. The pyramid holds 1200 + 80 + 6 tiles per plane.
    let source = PyramidSource::new(20_000, 15_000, 512, &[1, 4, 16], &["dapi"]);
    let reads = source.read_counter();
    let slicer = OmeSlicer::load(source).await.unwrap();

    let cropped = slicer.crop(10_000, 10_000, 5_000, 5_000).unwrap();
    let dims: Vec<_> = cropped
        .descriptor()
        .levels()
        .iter()
        .map(|level| (level.width, level.height))
        .collect();
    assert_eq!(dims, vec![(5_000, 5_000), (1_250, 1_250), (313, 313)]);

    let mut sink = TrackingSink::default();
    cropped.save(Arc::new(RawCodec), &mut sink).await.unwrap();

    // The scaled windows intersect 11x11, 4x4 and 1x1 source tiles. Each is
    // read exactly once.
    assert_eq!(reads.load(Ordering::SeqCst), 121 + 16 + 1);

    let per_level = |level: usize| sink.addresses.iter().filter(|a| a.0 == level).count();
    assert_eq!(per_level(0), 100);
    assert_eq!(per_level(1), 9);
    assert_eq!(per_level(2), 1);

    let document = parse_ome_xml(sink.finalized.as_deref().unwrap()).unwrap();
    assert_eq!((document.size_x, document.size_y), (5_000, 5_000));
}

#[tokio::test]
async fn test_scaled_windows_read_minimally_at_every_level() {
    let source = PyramidSource::new(64, 64, 16, &[1, 2], &["dapi"]);
    let reads = source.read_counter();
    let slicer = OmeSlicer::load(source).await.unwrap();

    // Tile-aligned at level 0 (2x2 tiles); the level 1 window [8, 24) is
    // misaligned and still touches only 2x2 tiles.
    let cropped = slicer.crop(16, 16, 32, 32).unwrap();
    let mut sink = TrackingSink::default();
    cropped.save(Arc::new(RawCodec), &mut sink).await.unwrap();

    assert_eq!(reads.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn test_small_decode_cache_does_not_change_output() {
    let factors = [1u32, 2, 4];
    let source = PyramidSource::new(200, 120, 16, &factors, &["dapi", "gfp"]);
    let reads = source.read_counter();
    let options = SlicerOptions::new().with_decode_cache_tiles(1);
    let slicer = OmeSlicer::load_with_options(source, options).await.unwrap();

    let crop = (13, 9, 70, 50);
    let cropped = slicer.crop(crop.0, crop.1, crop.2, crop.3).unwrap();
    let mut sink = MemorySink::default();
    cropped.save(Arc::new(RawCodec), &mut sink).await.unwrap();

    // 24 + 6 + 2 unique source tiles per plane would suffice with a full
    // cache; a one-tile cache forces straddled tiles to be re-read. The
    // assembled output must be identical either way.
    assert!(reads.load(Ordering::SeqCst) > 2 * (24 + 6 + 2));
    for (level, &factor) in factors.iter().enumerate() {
        let (_, _, width, height) = scaled_window(crop.0, crop.1, crop.2, crop.3, factor);
        for plane in 0..2 {
            let got = assemble_raster(&sink.tiles, level, plane, width, height, 16);
            let want = expected_window_raster(level, plane, crop, factor);
            assert_eq!(got, want, "level {level} plane {plane}");
        }
    }
}

// =============================================================================
// Degenerate Levels
// =============================================================================

/// 1000x1000 pyramid whose last level declares 62x62 where ceiling division
/// of level 0 would give 63x63.
fn under_declared_source() -> PyramidSource {
    PyramidSource::new(1_000, 1_000, 256, &[1, 4, 16], &["dapi"]).with_level_extent(2, 62, 62)
}

#[tokio::test]
async fn test_degenerate_level_is_dropped_by_default() {
    let slicer = OmeSlicer::load(under_declared_source()).await.unwrap();

    // Level 2 window starts at 976 / 16 = 61 and needs 2x2 pixels; the
    // declared 62x62 extent has only one column left.
    let cropped = slicer.crop(976, 976, 24, 24).unwrap();

    let levels = cropped.descriptor().levels();
    assert_eq!(levels.len(), 2);
    assert_eq!(
        levels
            .iter()
            .map(|level| (level.index, level.factor, level.width, level.height))
            .collect::<Vec<_>>(),
        vec![(0, 1, 24, 24), (1, 4, 6, 6)]
    );

    let mut sink = TrackingSink::default();
    cropped.save(Arc::new(RawCodec), &mut sink).await.unwrap();
    assert_eq!(sink.addresses, vec![(0, 0, 0, 0), (1, 0, 0, 0)]);

    let document = parse_ome_xml(sink.finalized.as_deref().unwrap()).unwrap();
    assert_eq!((document.size_x, document.size_y), (24, 24));
}

#[tokio::test]
async fn test_crop_outside_declared_level_drops_it() {
    let slicer = OmeSlicer::load(under_declared_source()).await.unwrap();

    // Level 2 window starts past the declared extent entirely.
    let cropped = slicer.crop(992, 992, 8, 8).unwrap();
    let dims: Vec<_> = cropped
        .descriptor()
        .levels()
        .iter()
        .map(|level| (level.width, level.height))
        .collect();
    assert_eq!(dims, vec![(8, 8), (2, 2)]);
}

#[tokio::test]
async fn test_degenerate_level_fails_under_fail_policy() {
    let options = SlicerOptions::new().with_degenerate_levels(DegenerateLevelPolicy::Fail);
    let slicer = OmeSlicer::load_with_options(under_declared_source(), options)
        .await
        .unwrap();

    let err = slicer.crop(976, 976, 24, 24).unwrap_err();
    assert!(matches!(
        err,
        SliceError::Geometry(GeometryError::DegenerateLevel { level: 2, .. })
    ));
}
