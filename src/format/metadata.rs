//! Resolution metadata found in TIFF-based slides.
//!
//! Microns per pixel can come from four places, tried in order:
//!
//! - Aperio SVS: the ImageDescription is a pipe-separated list of
//!   `key = value` pairs, one of which is `MPP`
//! - OME-TIFF: the ImageDescription is OME-XML; the `Pixels` element of the
//!   selected `Image` carries `PhysicalSizeX` / `PhysicalSizeY`
//! - Philips TIFF: the ImageDescription is a `DataObject` XML tree whose WSI
//!   pixel data representation carries `DICOM_PIXEL_SPACING` in millimeters
//! - Baseline TIFF: `XResolution` / `YResolution` in pixels per centimeter
//!
//! XML descriptions are parsed with `quick-xml` into a small element tree.

use std::collections::HashMap;

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::slide::Mpp;

/// `ResolutionUnit` value for centimeters.
pub const RESOLUTION_UNIT_CENTIMETER: u32 = 3;

const MICRONS_PER_CENTIMETER: f64 = 1e4;
const MICRONS_PER_MILLIMETER: f64 = 1e3;

// =============================================================================
// Aperio
// =============================================================================

/// Parsed Aperio ImageDescription.
///
/// ```text
/// Aperio Image Library v12.0.15
/// 46000x32914 [0,100 46000x32914] (256x256) JPEG/RGB Q=70|AppMag = 20|MPP = 0.4990
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AperioMetadata {
    pub mpp: Option<f64>,
    pub magnification: Option<f64>,
    pub properties: HashMap<String, String>,
}

impl AperioMetadata {
    /// Parse an ImageDescription. Returns `None` if it is not from Aperio.
    pub fn parse(description: &str) -> Option<Self> {
        if !description.starts_with("Aperio") {
            return None;
        }

        let mut metadata = AperioMetadata::default();
        for part in description.split('|') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "MPP" => metadata.mpp = value.parse().ok(),
                "AppMag" => metadata.magnification = value.parse().ok(),
                _ => {}
            }
            metadata
                .properties
                .insert(key.to_string(), value.to_string());
        }

        Some(metadata)
    }
}

// =============================================================================
// XML Tree
// =============================================================================

/// One element of a parsed XML description. Names are local (namespace
/// prefixes dropped).
#[derive(Debug, Clone, Default, PartialEq)]
struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<XmlElement>,
}

impl XmlElement {
    /// Parse a document and return its root element.
    ///
    /// Returns `None` for malformed XML or text without a root element.
    fn parse(xml: &str) -> Option<XmlElement> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        loop {
            let closed = match reader.read_event() {
                Ok(Event::Start(e)) => {
                    stack.push(XmlElement::from_start(&e));
                    None
                }
                Ok(Event::Empty(e)) => Some(XmlElement::from_start(&e)),
                Ok(Event::End(_)) => stack.pop(),
                Ok(Event::Text(e)) => {
                    if let Some(open) = stack.last_mut() {
                        open.text.push_str(&e.decode().unwrap_or_default());
                    }
                    None
                }
                Ok(Event::GeneralRef(e)) => {
                    if let Some(open) = stack.last_mut() {
                        resolve_reference(&e, &mut open.text);
                    }
                    None
                }
                Ok(Event::CData(e)) => {
                    if let Some(open) = stack.last_mut() {
                        open.text.push_str(&String::from_utf8_lossy(&e));
                    }
                    None
                }
                Ok(Event::Eof) => return None,
                Err(e) => {
                    debug!(error = %e, "ignoring malformed XML description");
                    return None;
                }
                Ok(_) => None,
            };

            if let Some(element) = closed {
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Some(element),
                }
            }
        }
    }

    fn from_start(start: &BytesStart<'_>) -> Self {
        let attributes = start
            .attributes()
            .flatten()
            .map(|a| {
                (
                    String::from_utf8_lossy(a.key.local_name().as_ref()).into_owned(),
                    String::from_utf8_lossy(&a.value).into_owned(),
                )
            })
            .collect();
        XmlElement {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            attributes,
            ..Default::default()
        }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    fn child<'a>(&'a self, name: &'a str) -> Option<&'a XmlElement> {
        self.children_named(name).next()
    }

    /// Philips `<Attribute Name="...">` child with the given name.
    fn named_attribute(&self, name: &str) -> Option<&XmlElement> {
        self.children_named("Attribute")
            .find(|attribute| attribute.attr("Name") == Some(name))
    }

    /// Philips `<DataObject ObjectType="...">` children.
    fn data_objects<'a>(&'a self, object_type: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children_named("DataObject")
            .filter(move |object| object.attr("ObjectType") == Some(object_type))
    }
}

/// Append the character an entity or character reference stands for.
fn resolve_reference(reference: &BytesRef<'_>, text: &mut String) {
    if let Ok(Some(c)) = reference.resolve_char_ref() {
        text.push(c);
        return;
    }
    if let Some(resolved) = reference
        .decode()
        .ok()
        .and_then(|name| resolve_predefined_entity(&name))
    {
        text.push_str(resolved);
    }
}

// =============================================================================
// OME-XML
// =============================================================================

/// Read `PhysicalSizeX` / `PhysicalSizeY` of one series from an OME-XML
/// description.
///
/// `series` indexes the `Image` elements of the document. Sizes are
/// converted to micrometers using `PhysicalSizeXUnit` / `PhysicalSizeYUnit`
/// (micrometers when absent).
pub fn ome_physical_size(description: &str, series: usize) -> Mpp {
    let Some(root) = XmlElement::parse(description).filter(|root| root.name == "OME") else {
        return Mpp::unknown();
    };
    let Some(pixels) = root
        .children_named("Image")
        .nth(series)
        .and_then(|image| image.child("Pixels"))
    else {
        return Mpp::unknown();
    };

    let axis = |size: &str, unit: &str| {
        let value = pixels.attr(size)?.trim().parse::<f64>().ok()?;
        microns(value, pixels.attr(unit))
    };
    Mpp::new(
        axis("PhysicalSizeX", "PhysicalSizeXUnit"),
        axis("PhysicalSizeY", "PhysicalSizeYUnit"),
    )
}

/// Convert an OME length to micrometers. Unknown units give `None`.
fn microns(value: f64, unit: Option<&str>) -> Option<f64> {
    let scale = match unit.map(str::trim) {
        None | Some("µm") | Some("um") => 1.0,
        Some("nm") => 1e-3,
        Some("mm") => MICRONS_PER_MILLIMETER,
        Some("cm") => MICRONS_PER_CENTIMETER,
        Some("m") => 1e6,
        Some(_) => return None,
    };
    let microns = value * scale;
    (microns > 0.0 && microns.is_finite()).then_some(microns)
}

// =============================================================================
// Philips
// =============================================================================

/// Read `DICOM_PIXEL_SPACING` of the WSI image from a Philips description.
///
/// The attribute holds quoted millimeter values, row spacing first:
///
/// ```text
/// <Attribute Name="DICOM_PIXEL_SPACING" Group="0x0028" Element="0x0030" PMSVR="IDoubleArray">"0.000227" "0.000227"</Attribute>
/// ```
pub fn philips_pixel_spacing(description: &str) -> Mpp {
    let Some(root) = XmlElement::parse(description).filter(|root| root.name == "DataObject")
    else {
        return Mpp::unknown();
    };

    let spacing = root
        .named_attribute("PIM_DP_SCANNED_IMAGES")
        .and_then(|images| images.child("Array"))
        .into_iter()
        .flat_map(|array| array.data_objects("DPScannedImage"))
        .find(|image| {
            image
                .named_attribute("PIM_DP_IMAGE_TYPE")
                .is_some_and(|kind| kind.text.trim() == "WSI")
        })
        .and_then(|image| image.named_attribute("PIIM_PIXEL_DATA_REPRESENTATION_SEQUENCE"))
        .and_then(|sequence| sequence.child("Array"))
        .and_then(|array| array.data_objects("PixelDataRepresentation").next())
        .and_then(|representation| representation.named_attribute("DICOM_PIXEL_SPACING"));

    let Some(spacing) = spacing else {
        return Mpp::unknown();
    };
    let values: Option<Vec<f64>> = spacing
        .text
        .split(|c: char| c == '"' || c.is_whitespace())
        .filter(|value| !value.is_empty())
        .map(|value| value.parse::<f64>().ok())
        .map(|mm| mm.and_then(|mm| microns(mm, Some("mm"))))
        .collect();

    match values.as_deref() {
        Some(&[row, column]) => Mpp::new(Some(column), Some(row)),
        Some(&[both]) => Mpp::uniform(both),
        _ => Mpp::unknown(),
    }
}

// =============================================================================
// Resolution tags
// =============================================================================

/// Convert a TIFF resolution (pixels per unit) to microns per pixel.
///
/// Only centimeter units are converted.
pub fn resolution_to_mpp(unit: Option<u32>, resolution: Option<f64>) -> Option<f64> {
    match (unit, resolution) {
        (Some(RESOLUTION_UNIT_CENTIMETER), Some(res)) if res > 0.0 && res.is_finite() => {
            Some(MICRONS_PER_CENTIMETER / res)
        }
        _ => None,
    }
}

/// Microns per pixel from every source, in priority order.
///
/// `series` selects the OME `Image` element; the other sources describe the
/// whole file.
pub fn slide_mpp(
    description: Option<&str>,
    series: usize,
    unit: Option<u32>,
    x_resolution: Option<f64>,
    y_resolution: Option<f64>,
) -> Mpp {
    if let Some(description) = description {
        if let Some(mpp) = AperioMetadata::parse(description).and_then(|m| m.mpp) {
            return Mpp::uniform(mpp);
        }
        let ome = ome_physical_size(description, series);
        if ome.is_known() {
            return ome;
        }
        let philips = philips_pixel_spacing(description);
        if philips.is_known() {
            return philips;
        }
    }
    Mpp::new(
        resolution_to_mpp(unit, x_resolution),
        resolution_to_mpp(unit, y_resolution),
    )
}

// =============================================================================
// Tests
// =============================================================================
