//! Structured-metadata subsystem.
//!
//! Everything the crate knows about an image that is not pixel bytes lives
//! here: the OME document model, the pyramid-aware image descriptor, the
//! XML codec, and the synchronizer that derives a cropped descriptor.
//!
//! # Components
//!
//! - [`OmeMetadata`]: the modeled fields of the OME-XML document, with
//!   unmodeled attributes preserved opaquely
//! - [`ImageDescriptor`]: document plus resolution pyramid, the load-time
//!   source of truth for all geometry
//! - [`parse_ome_xml`] / [`write_ome_xml`]: event-driven document codec
//! - [`derive_cropped`]: builds the descriptor of a cropped image under a
//!   [`DegenerateLevelPolicy`]

pub mod model;
pub mod ome_xml;
pub mod sync;

pub use model::{
    dense_planes, ChannelDescriptor, ExtraAttrs, ImageDescriptor, OmeMetadata,
    PhysicalCalibration, PhysicalSize, PixelType, PlaneDescriptor, ResolutionLevel,
};
pub use ome_xml::{parse_ome_xml, write_ome_xml};
pub use sync::{derive_cropped, CropDerivation, DegenerateLevelPolicy};
