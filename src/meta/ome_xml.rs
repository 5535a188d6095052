//! OME-XML document parser and writer.
//!
//! OME-XML is the structured-metadata document embedded in an OME-TIFF. The
//! parser extracts the fields the crate models into an [`OmeMetadata`], and
//! the writer regenerates a document from one.
//!
//! # Document Structure
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <OME xmlns="http://www.openmicroscopy.org/Schemas/OME/2016-06">
//!   <Image ID="Image:0" Name="specimen">
//!     <Pixels ID="Pixels:0" DimensionOrder="XYCZT" Type="uint16"
//!             SizeX="20000" SizeY="15000" SizeC="3" SizeZ="1" SizeT="1"
//!             PhysicalSizeX="0.25" PhysicalSizeXUnit="µm">
//!       <Channel ID="Channel:0:0" Name="DAPI" SamplesPerPixel="1"/>
//!       <Plane TheC="0" TheZ="0" TheT="0"/>
//!     </Pixels>
//!   </Image>
//! </OME>
//! ```
//!
//! # Round-Trip Fidelity
//!
//! Attributes of `OME`, `Image`, `Pixels`, `Channel` and `Plane` that the
//! model does not interpret are preserved verbatim and re-emitted. Child
//! elements outside that set (`TiffData`, `Description`, annotations) and
//! any `Image` element after the first are **not** carried through the
//! writer; attribute order is not preserved either. Consumers that need
//! byte-identical documents must keep the original text, which the facade
//! exposes for unmodified images.

use std::io::BufRead;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::MetadataError;
use crate::meta::model::{
    dense_planes, ChannelDescriptor, ExtraAttrs, OmeMetadata, PhysicalCalibration, PhysicalSize,
    PixelType, PlaneDescriptor,
};

fn xml_err(e: impl std::fmt::Display) -> MetadataError {
    MetadataError::Xml(e.to_string())
}

fn parse_u32(field: &'static str, value: &str) -> Result<u32, MetadataError> {
    value.parse().map_err(|_| MetadataError::InvalidField {
        field,
        message: format!("not an unsigned integer: {value:?}"),
    })
}

fn parse_f64(field: &'static str, value: &str) -> Result<f64, MetadataError> {
    value.parse().map_err(|_| MetadataError::InvalidField {
        field,
        message: format!("not a number: {value:?}"),
    })
}

fn require<T>(value: Option<T>, field: &'static str) -> Result<T, MetadataError> {
    value.ok_or(MetadataError::MissingField(field))
}

// =============================================================================
// Parsing
// =============================================================================

/// All attributes of an element as (name, value) pairs, unescaped.
fn collect_attrs(element: &BytesStart<'_>) -> Result<ExtraAttrs, MetadataError> {
    let mut attrs = Vec::new();
    for attr in element.attributes() {
        let attr = attr.map_err(xml_err)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_err)?.into_owned();
        attrs.push((key, value));
    }
    Ok(attrs)
}

/// Accumulates the `Pixels` attributes until the document is fully read.
#[derive(Default)]
struct PixelsFields {
    dimension_order: Option<String>,
    pixel_type: Option<PixelType>,
    size_x: Option<u32>,
    size_y: Option<u32>,
    size_c: Option<u32>,
    size_z: Option<u32>,
    size_t: Option<u32>,
    physical_x: Option<f64>,
    physical_x_unit: Option<String>,
    physical_y: Option<f64>,
    physical_y_unit: Option<String>,
    physical_z: Option<f64>,
    physical_z_unit: Option<String>,
    extra: ExtraAttrs,
}

impl PixelsFields {
    fn from_attrs(attrs: ExtraAttrs) -> Result<Self, MetadataError> {
        let mut fields = Self::default();
        for (key, value) in attrs {
            match key.as_str() {
                "DimensionOrder" => fields.dimension_order = Some(value),
                "Type" => fields.pixel_type = Some(PixelType::from_ome(&value)?),
                "SizeX" => fields.size_x = Some(parse_u32("SizeX", &value)?),
                "SizeY" => fields.size_y = Some(parse_u32("SizeY", &value)?),
                "SizeC" => fields.size_c = Some(parse_u32("SizeC", &value)?),
                "SizeZ" => fields.size_z = Some(parse_u32("SizeZ", &value)?),
                "SizeT" => fields.size_t = Some(parse_u32("SizeT", &value)?),
                "PhysicalSizeX" => fields.physical_x = Some(parse_f64("PhysicalSizeX", &value)?),
                "PhysicalSizeXUnit" => fields.physical_x_unit = Some(value),
                "PhysicalSizeY" => fields.physical_y = Some(parse_f64("PhysicalSizeY", &value)?),
                "PhysicalSizeYUnit" => fields.physical_y_unit = Some(value),
                "PhysicalSizeZ" => fields.physical_z = Some(parse_f64("PhysicalSizeZ", &value)?),
                "PhysicalSizeZUnit" => fields.physical_z_unit = Some(value),
                _ => fields.extra.push((key, value)),
            }
        }
        Ok(fields)
    }
}

fn parse_channel(attrs: ExtraAttrs, pixel_type: PixelType) -> Result<ChannelDescriptor, MetadataError> {
    let mut channel = ChannelDescriptor {
        name: None,
        bits_per_sample: pixel_type.bits(),
        samples_per_pixel: 1,
        extra: Vec::new(),
    };
    for (key, value) in attrs {
        match key.as_str() {
            "Name" => channel.name = Some(value),
            "SamplesPerPixel" => {
                channel.samples_per_pixel = parse_u32("SamplesPerPixel", &value)? as u16;
            }
            _ => channel.extra.push((key, value)),
        }
    }
    Ok(channel)
}

fn parse_plane(attrs: ExtraAttrs) -> Result<PlaneDescriptor, MetadataError> {
    let mut the_c = None;
    let mut the_z = None;
    let mut the_t = None;
    let mut plane = PlaneDescriptor {
        channel: 0,
        z: 0,
        t: 0,
        position_x: None,
        position_y: None,
        position_z: None,
        extra: Vec::new(),
    };
    for (key, value) in attrs {
        match key.as_str() {
            "TheC" => the_c = Some(parse_u32("TheC", &value)?),
            "TheZ" => the_z = Some(parse_u32("TheZ", &value)?),
            "TheT" => the_t = Some(parse_u32("TheT", &value)?),
            "PositionX" => plane.position_x = Some(parse_f64("PositionX", &value)?),
            "PositionY" => plane.position_y = Some(parse_f64("PositionY", &value)?),
            "PositionZ" => plane.position_z = Some(parse_f64("PositionZ", &value)?),
            _ => plane.extra.push((key, value)),
        }
    }
    plane.channel = require(the_c, "TheC")?;
    plane.z = require(the_z, "TheZ")?;
    plane.t = require(the_t, "TheT")?;
    Ok(plane)
}

/// Parse an OME-XML document into the model.
///
/// The first `Image` element is authoritative, matching OME-TIFF readers
/// that treat it as the primary image. The returned document has passed
/// [`OmeMetadata::validate`], so planes reference valid indices and a dense
/// plane list has been synthesized if the document declared none.
pub fn parse_ome_xml(text: &str) -> Result<OmeMetadata, MetadataError> {
    parse_ome_reader(text.as_bytes())
}

fn parse_ome_reader<R: BufRead>(reader: R) -> Result<OmeMetadata, MetadataError> {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut ome_attrs: Option<ExtraAttrs> = None;
    let mut image_attrs: Option<ExtraAttrs> = None;
    let mut pixels: Option<PixelsFields> = None;
    let mut channels: Vec<ChannelDescriptor> = Vec::new();
    let mut planes: Vec<PlaneDescriptor> = Vec::new();

    let mut images_seen = 0usize;
    let mut in_first_image = false;
    let mut in_pixels = false;

    loop {
        let event = xml.read_event_into(&mut buf).map_err(xml_err)?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.local_name().as_ref() {
                    b"OME" => {
                        if ome_attrs.is_none() {
                            ome_attrs = Some(collect_attrs(e)?);
                        }
                    }
                    b"Image" => {
                        images_seen += 1;
                        if images_seen == 1 {
                            image_attrs = Some(collect_attrs(e)?);
                            in_first_image = !is_empty;
                        }
                    }
                    b"Pixels" if in_first_image && pixels.is_none() => {
                        pixels = Some(PixelsFields::from_attrs(collect_attrs(e)?)?);
                        in_pixels = !is_empty;
                    }
                    b"Channel" if in_pixels => {
                        let pixel_type = pixels
                            .as_ref()
                            .and_then(|p| p.pixel_type)
                            .ok_or(MetadataError::MissingField("Type"))?;
                        channels.push(parse_channel(collect_attrs(e)?, pixel_type)?);
                    }
                    b"Plane" if in_pixels => {
                        planes.push(parse_plane(collect_attrs(e)?)?);
                    }
                    _ => {}
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"Image" => in_first_image = false,
                b"Pixels" => in_pixels = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let ome_attrs = require(ome_attrs, "OME")?;
    let image_attrs = require(image_attrs, "Image")?;
    let fields = require(pixels, "Pixels")?;

    let dimension_order = require(fields.dimension_order, "DimensionOrder")?;
    let pixel_type = require(fields.pixel_type, "Type")?;
    let size_x = require(fields.size_x, "SizeX")?;
    let size_y = require(fields.size_y, "SizeY")?;
    let size_c = require(fields.size_c, "SizeC")?;
    let size_z = require(fields.size_z, "SizeZ")?;
    let size_t = require(fields.size_t, "SizeT")?;

    if planes.is_empty() && !channels.is_empty() {
        planes = dense_planes(&dimension_order, channels.len() as u32, size_z, size_t)?;
    }

    let calibration = PhysicalCalibration {
        x: fields.physical_x.map(|value| PhysicalSize {
            value,
            unit: fields.physical_x_unit,
        }),
        y: fields.physical_y.map(|value| PhysicalSize {
            value,
            unit: fields.physical_y_unit,
        }),
        z: fields.physical_z.map(|value| PhysicalSize {
            value,
            unit: fields.physical_z_unit,
        }),
    };

    let meta = OmeMetadata {
        ome_attrs,
        image_attrs,
        pixels_attrs: fields.extra,
        dimension_order,
        pixel_type,
        size_x,
        size_y,
        size_c,
        size_z,
        size_t,
        calibration,
        channels,
        planes,
    };
    meta.validate()?;
    Ok(meta)
}

// =============================================================================
// Writing
// =============================================================================

/// Serialize the model back to an OME-XML document.
///
/// Emits every field the model tracks plus the preserved opaque attributes.
/// See the module docs for what a regenerated document does not carry.
pub fn write_ome_xml(meta: &OmeMetadata) -> Result<String, MetadataError> {
    let mut xml = Writer::new_with_indent(Vec::new(), b' ', 2);

    xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;

    let mut ome = BytesStart::new("OME");
    for (key, value) in &meta.ome_attrs {
        ome.push_attribute((key.as_str(), value.as_str()));
    }
    xml.write_event(Event::Start(ome)).map_err(xml_err)?;

    let mut image = BytesStart::new("Image");
    for (key, value) in &meta.image_attrs {
        image.push_attribute((key.as_str(), value.as_str()));
    }
    xml.write_event(Event::Start(image)).map_err(xml_err)?;

    let mut pixels = BytesStart::new("Pixels");
    for (key, value) in &meta.pixels_attrs {
        pixels.push_attribute((key.as_str(), value.as_str()));
    }
    pixels.push_attribute(("DimensionOrder", meta.dimension_order.as_str()));
    pixels.push_attribute(("Type", meta.pixel_type.as_ome()));
    pixels.push_attribute(("SizeX", meta.size_x.to_string().as_str()));
    pixels.push_attribute(("SizeY", meta.size_y.to_string().as_str()));
    pixels.push_attribute(("SizeC", meta.size_c.to_string().as_str()));
    pixels.push_attribute(("SizeZ", meta.size_z.to_string().as_str()));
    pixels.push_attribute(("SizeT", meta.size_t.to_string().as_str()));
    write_physical(&mut pixels, "PhysicalSizeX", &meta.calibration.x);
    write_physical(&mut pixels, "PhysicalSizeY", &meta.calibration.y);
    write_physical(&mut pixels, "PhysicalSizeZ", &meta.calibration.z);
    xml.write_event(Event::Start(pixels)).map_err(xml_err)?;

    for channel in &meta.channels {
        let mut element = BytesStart::new("Channel");
        for (key, value) in &channel.extra {
            element.push_attribute((key.as_str(), value.as_str()));
        }
        if let Some(ref name) = channel.name {
            element.push_attribute(("Name", name.as_str()));
        }
        element.push_attribute((
            "SamplesPerPixel",
            channel.samples_per_pixel.to_string().as_str(),
        ));
        xml.write_event(Event::Empty(element)).map_err(xml_err)?;
    }

    for plane in &meta.planes {
        let mut element = BytesStart::new("Plane");
        for (key, value) in &plane.extra {
            element.push_attribute((key.as_str(), value.as_str()));
        }
        element.push_attribute(("TheC", plane.channel.to_string().as_str()));
        element.push_attribute(("TheZ", plane.z.to_string().as_str()));
        element.push_attribute(("TheT", plane.t.to_string().as_str()));
        for (name, value) in [
            ("PositionX", plane.position_x),
            ("PositionY", plane.position_y),
            ("PositionZ", plane.position_z),
        ] {
            if let Some(value) = value {
                element.push_attribute((name, value.to_string().as_str()));
            }
        }
        xml.write_event(Event::Empty(element)).map_err(xml_err)?;
    }

    xml.write_event(Event::End(BytesEnd::new("Pixels")))
        .map_err(xml_err)?;
    xml.write_event(Event::End(BytesEnd::new("Image")))
        .map_err(xml_err)?;
    xml.write_event(Event::End(BytesEnd::new("OME")))
        .map_err(xml_err)?;

    String::from_utf8(xml.into_inner()).map_err(xml_err)
}

fn write_physical(pixels: &mut BytesStart<'_>, name: &str, size: &Option<PhysicalSize>) {
    if let Some(size) = size {
        pixels.push_attribute((name, size.value.to_string().as_str()));
        if let Some(ref unit) = size.unit {
            pixels.push_attribute((format!("{name}Unit").as_str(), unit.as_str()));
        }
    }
}
