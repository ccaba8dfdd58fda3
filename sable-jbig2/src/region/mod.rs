//! Region and dictionary segment decoding.

pub(crate) mod generic;
pub(crate) mod grayscale;
pub(crate) mod halftone;
pub(crate) mod pattern;
pub(crate) mod refinement;
pub(crate) mod symbol;
pub(crate) mod text;

use crate::bitmap::{Bitmap, CombinationOperator};
use crate::error::{ErrorKind, Result, bail};
use crate::reader::Reader;
use crate::writer::Writer;

/// The template for generic-region style arithmetic coding, shared by
/// generic regions (GBTEMPLATE), symbol dictionaries (SDTEMPLATE), pattern
/// dictionaries (HDTEMPLATE), halftone regions (HTEMPLATE) and gray-scale
/// planes (GSTEMPLATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Template {
    /// 16 context pixels, 4 adaptive (Figure 3).
    Template0 = 0,
    /// 13 context pixels, 1 adaptive (Figure 4).
    Template1 = 1,
    /// 10 context pixels, 1 adaptive (Figure 5).
    Template2 = 2,
    /// 10 context pixels, 1 adaptive (Figure 6).
    Template3 = 3,
}

impl Template {
    pub(crate) fn from_byte(value: u8) -> Self {
        match value & 0x03 {
            0 => Self::Template0,
            1 => Self::Template1,
            2 => Self::Template2,
            _ => Self::Template3,
        }
    }

    /// Number of context bits (6.2.5.3).
    pub(crate) fn context_bits(self) -> usize {
        match self {
            Self::Template0 => 16,
            Self::Template1 => 13,
            Self::Template2 | Self::Template3 => 10,
        }
    }

    /// Number of adaptive template pixels (6.2.5.3).
    pub(crate) fn adaptive_pixel_count(self) -> usize {
        match self {
            Self::Template0 => 4,
            _ => 1,
        }
    }
}

/// The template for refinement coding (6.3.5.3), used by refinement
/// regions (GRTEMPLATE), symbol dictionaries (SDRTEMPLATE) and text
/// regions (SBRTEMPLATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefinementTemplate {
    /// 13 context pixels, 2 adaptive (Figure 12).
    Template0 = 0,
    /// 10 context pixels (Figure 13).
    Template1 = 1,
}

impl RefinementTemplate {
    pub(crate) fn from_byte(value: u8) -> Self {
        if value & 0x01 == 0 {
            Self::Template0
        } else {
            Self::Template1
        }
    }

    pub(crate) fn context_bits(self) -> usize {
        match self {
            Self::Template0 => 13,
            Self::Template1 => 10,
        }
    }
}

/// An adaptive template pixel position (6.2.5.4, Figure 7).
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AdaptivePixel {
    pub(crate) x: i8,
    pub(crate) y: i8,
}

/// Parse the AT pixel positions of a generic-coded header (7.4.6.3).
///
/// Positions must reference already-decoded pixels: above the current row,
/// or strictly to its left within it.
pub(crate) fn parse_adaptive_pixels(
    reader: &mut Reader<'_>,
    template: Template,
) -> Result<Vec<AdaptivePixel>> {
    let count = template.adaptive_pixel_count();
    let mut pixels = Vec::with_capacity(count);

    for _ in 0..count {
        let x = reader.read_byte().ok_or(ErrorKind::IoExhausted)? as i8;
        let y = reader.read_byte().ok_or(ErrorKind::IoExhausted)? as i8;

        if y > 0 || (y == 0 && x >= 0) {
            bail!(ErrorKind::Malformed("adaptive pixel not causal"));
        }

        pixels.push(AdaptivePixel { x, y });
    }

    Ok(pixels)
}

/// Parse the two refinement AT pixels (7.4.7.3); also used by symbol
/// dictionary and text region headers.
pub(crate) fn parse_refinement_adaptive_pixels(
    reader: &mut Reader<'_>,
) -> Result<Vec<AdaptivePixel>> {
    let mut pixels = Vec::with_capacity(2);
    for _ in 0..2 {
        let x = reader.read_byte().ok_or(ErrorKind::IoExhausted)? as i8;
        let y = reader.read_byte().ok_or(ErrorKind::IoExhausted)? as i8;
        pixels.push(AdaptivePixel { x, y });
    }
    Ok(pixels)
}

/// The region segment information field (7.4.1) heading every region
/// segment's data part.
#[derive(Debug, Clone)]
pub(crate) struct RegionSegmentInfo {
    pub(crate) width: u32,
    pub(crate) height: u32,
    /// Offset of the region within the page bitmap.
    pub(crate) x_location: u32,
    pub(crate) y_location: u32,
    /// The external combination operator (bits 0-2 of the flags).
    pub(crate) combination_operator: CombinationOperator,
}

pub(crate) fn parse_region_segment_info(reader: &mut Reader<'_>) -> Result<RegionSegmentInfo> {
    let width = reader.read_u32().ok_or(ErrorKind::IoExhausted)?;
    let height = reader.read_u32().ok_or(ErrorKind::IoExhausted)?;
    let x_location = reader.read_u32().ok_or(ErrorKind::IoExhausted)?;
    let y_location = reader.read_u32().ok_or(ErrorKind::IoExhausted)?;

    let flags = reader.read_byte().ok_or(ErrorKind::IoExhausted)?;
    let combination_operator = CombinationOperator::from_value(flags & 0x07)?;

    if flags & 0xF0 != 0 {
        bail!(ErrorKind::Malformed("reserved region segment flags set"));
    }

    Ok(RegionSegmentInfo {
        width,
        height,
        x_location,
        y_location,
        combination_operator,
    })
}

pub(crate) fn write_region_segment_info(writer: &mut Writer, info: &RegionSegmentInfo) {
    writer.write_u32(info.width);
    writer.write_u32(info.height);
    writer.write_u32(info.x_location);
    writer.write_u32(info.y_location);
    writer.write_byte(info.combination_operator.value());
}

/// A decoded region: the bitmap plus where and how it lands on the page.
#[derive(Debug, Clone)]
pub(crate) struct RegionBitmap {
    pub(crate) bitmap: Bitmap,
    pub(crate) x_location: u32,
    pub(crate) y_location: u32,
    pub(crate) combination_operator: CombinationOperator,
}

impl RegionBitmap {
    pub(crate) fn new(bitmap: Bitmap, info: &RegionSegmentInfo) -> Self {
        Self {
            bitmap,
            x_location: info.x_location,
            y_location: info.y_location,
            combination_operator: info.combination_operator,
        }
    }
}
