//! The page information segment (7.4.8).

use crate::bitmap::CombinationOperator;
use crate::error::{ErrorKind, Result};
use crate::reader::Reader;
use crate::writer::Writer;

/// A parsed page information segment.
#[derive(Debug, Clone)]
pub(crate) struct PageInformation {
    pub width: u32,
    /// 0xFFFFFFFF means the height was unknown when the header was written;
    /// the page must then be striped and its height comes from the last end
    /// of stripe segment.
    pub height: u32,
    /// Pixels per metre; `None` when unknown.
    pub x_resolution: Option<u32>,
    pub y_resolution: Option<u32>,
    pub flags: PageFlags,
    pub striping: PageStriping,
}

/// The page segment flags (7.4.8.5).
#[derive(Debug, Clone)]
pub(crate) struct PageFlags {
    /// The file contains a lossless representation of this page.
    pub is_lossless: bool,
    /// Refinement region segments may be associated with the page.
    pub might_contain_refinements: bool,
    /// The initial value of every page pixel.
    pub default_pixel: u8,
    /// The combination operator regions use unless overriding is allowed.
    pub default_combination_operator: CombinationOperator,
    /// A region segment requiring an auxiliary buffer may be associated.
    pub requires_auxiliary_buffers: bool,
    /// Direct regions may use combination operators other than the default.
    pub combination_operator_overridden: bool,
}

/// The page striping field (7.4.8.6).
#[derive(Debug, Clone)]
pub(crate) struct PageStriping {
    pub is_striped: bool,
    pub max_stripe_size: u16,
}

pub(crate) fn parse_page_information(reader: &mut Reader<'_>) -> Result<PageInformation> {
    let width = reader.read_u32().ok_or(ErrorKind::IoExhausted)?;
    let height = reader.read_u32().ok_or(ErrorKind::IoExhausted)?;

    // Resolutions of zero mean unknown (7.4.8.3, 7.4.8.4).
    let x_resolution = match reader.read_u32().ok_or(ErrorKind::IoExhausted)? {
        0 => None,
        ppm => Some(ppm),
    };
    let y_resolution = match reader.read_u32().ok_or(ErrorKind::IoExhausted)? {
        0 => None,
        ppm => Some(ppm),
    };

    let flags_byte = reader.read_byte().ok_or(ErrorKind::IoExhausted)?;
    let flags = parse_page_flags(flags_byte)?;

    let striping_raw = reader.read_u16().ok_or(ErrorKind::IoExhausted)?;
    let striping = PageStriping {
        is_striped: striping_raw & 0x8000 != 0,
        max_stripe_size: striping_raw & 0x7FFF,
    };

    Ok(PageInformation {
        width,
        height,
        x_resolution,
        y_resolution,
        flags,
        striping,
    })
}

fn parse_page_flags(flags: u8) -> Result<PageFlags> {
    // Bits 3-4 select the default combination operator; REPLACE is not a
    // valid page default.
    let default_combination_operator = CombinationOperator::from_value((flags >> 3) & 0x03)?;

    Ok(PageFlags {
        is_lossless: flags & 0x01 != 0,
        might_contain_refinements: flags & 0x02 != 0,
        default_pixel: (flags >> 2) & 0x01,
        default_combination_operator,
        requires_auxiliary_buffers: flags & 0x20 != 0,
        combination_operator_overridden: flags & 0x40 != 0,
    })
}

/// Emit a page information segment data part.
pub(crate) fn write_page_information(info: &PageInformation) -> Vec<u8> {
    let mut writer = Writer::new();
    writer.write_u32(info.width);
    writer.write_u32(info.height);
    writer.write_u32(info.x_resolution.unwrap_or(0));
    writer.write_u32(info.y_resolution.unwrap_or(0));

    let mut flags = 0_u8;
    flags |= u8::from(info.flags.is_lossless);
    flags |= u8::from(info.flags.might_contain_refinements) << 1;
    flags |= (info.flags.default_pixel & 1) << 2;
    flags |= info.flags.default_combination_operator.value() << 3;
    flags |= u8::from(info.flags.requires_auxiliary_buffers) << 5;
    flags |= u8::from(info.flags.combination_operator_overridden) << 6;
    writer.write_byte(flags);

    let striping =
        (u16::from(info.striping.is_striped) << 15) | (info.striping.max_stripe_size & 0x7FFF);
    writer.write_u16(striping);

    writer.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_the_writer() {
        let info = PageInformation {
            width: 640,
            height: 480,
            x_resolution: Some(3937),
            y_resolution: None,
            flags: PageFlags {
                is_lossless: true,
                might_contain_refinements: false,
                default_pixel: 1,
                default_combination_operator: CombinationOperator::Xor,
                requires_auxiliary_buffers: false,
                combination_operator_overridden: true,
            },
            striping: PageStriping {
                is_striped: true,
                max_stripe_size: 128,
            },
        };

        let bytes = write_page_information(&info);
        let mut reader = Reader::new(&bytes);
        let parsed = parse_page_information(&mut reader).unwrap();

        assert_eq!(parsed.width, 640);
        assert_eq!(parsed.height, 480);
        assert_eq!(parsed.x_resolution, Some(3937));
        assert_eq!(parsed.y_resolution, None);
        assert!(parsed.flags.is_lossless);
        assert_eq!(parsed.flags.default_pixel, 1);
        assert_eq!(
            parsed.flags.default_combination_operator,
            CombinationOperator::Xor
        );
        assert!(parsed.flags.combination_operator_overridden);
        assert!(parsed.striping.is_striped);
        assert_eq!(parsed.striping.max_stripe_size, 128);
    }
}
