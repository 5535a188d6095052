//! Tile streaming: lazy, pull-based assembly of output tiles from source
//! tiles, with per-pass decode deduplication.

mod decode_cache;
mod engine;

pub use decode_cache::TileDecodeCache;
pub use engine::{PlanePass, TileStream};
