//! Pattern dictionary decoding (6.7, 7.4.4): fixed-size tiles decoded as
//! one collective bitmap and split apart.

use crate::arithmetic_decoder::{ArithmeticDecoder, Context};
use crate::bitmap::Bitmap;
use crate::error::{ErrorKind, Result};
use crate::reader::Reader;
use crate::region::generic::{decode_bitmap, decode_bitmap_mmr};
use crate::region::{AdaptivePixel, Template};

/// A decoded pattern dictionary.
#[derive(Debug, Clone)]
pub(crate) struct PatternDictionary {
    pub(crate) patterns: Vec<Bitmap>,
    pub(crate) pattern_width: u32,
    pub(crate) pattern_height: u32,
}

#[derive(Debug, Clone)]
struct PatternDictionaryHeader {
    mmr: bool,
    template: Template,
    /// HDPW and HDPH.
    pattern_width: u8,
    pattern_height: u8,
    /// GRAYMAX: the largest pattern index.
    max_pattern_index: u32,
}

fn parse(reader: &mut Reader<'_>) -> Result<PatternDictionaryHeader> {
    let flags = reader.read_byte().ok_or(ErrorKind::IoExhausted)?;
    let mmr = flags & 0x01 != 0;
    let template = Template::from_byte(flags >> 1);

    let pattern_width = reader
        .read_nonzero_byte()
        .ok_or(ErrorKind::Malformed("zero pattern width"))?;
    let pattern_height = reader
        .read_nonzero_byte()
        .ok_or(ErrorKind::Malformed("zero pattern height"))?;
    let max_pattern_index = reader.read_u32().ok_or(ErrorKind::IoExhausted)?;

    Ok(PatternDictionaryHeader {
        mmr,
        template,
        pattern_width,
        pattern_height,
        max_pattern_index,
    })
}

/// Decode a pattern dictionary segment body (6.7.5).
pub(crate) fn decode_pattern_dictionary(reader: &mut Reader<'_>) -> Result<PatternDictionary> {
    let header = parse(reader)?;

    let pattern_width = header.pattern_width as u32;
    let pattern_height = header.pattern_height as u32;
    let num_patterns = header
        .max_pattern_index
        .checked_add(1)
        .ok_or(ErrorKind::Malformed("pattern count overflow"))?;

    // All patterns are decoded as one collective bitmap of
    // (GRAYMAX + 1) * HDPW columns.
    let collective_width = num_patterns
        .checked_mul(pattern_width)
        .filter(|&w| w <= 1 << 24)
        .ok_or(ErrorKind::Malformed("pattern dictionary too wide"))?;

    let encoded_data = reader.tail().ok_or(ErrorKind::IoExhausted)?;
    let mut collective = Bitmap::new(collective_width, pattern_height)?;

    if header.mmr {
        decode_bitmap_mmr(&mut collective, encoded_data)?;
    } else {
        // Table 27 fixes the adaptive pixels; AT1 points one pattern back.
        let at1_x = (header.pattern_width as i8).wrapping_neg();
        let at_pixels = match header.template {
            Template::Template0 => vec![
                AdaptivePixel { x: at1_x, y: 0 },
                AdaptivePixel { x: -3, y: -1 },
                AdaptivePixel { x: 2, y: -2 },
                AdaptivePixel { x: -2, y: -2 },
            ],
            _ => vec![AdaptivePixel { x: at1_x, y: 0 }],
        };

        let mut decoder = ArithmeticDecoder::new(encoded_data);
        let mut contexts = vec![Context::default(); 1 << header.template.context_bits()];
        decode_bitmap(
            &mut collective,
            &mut decoder,
            &mut contexts,
            header.template,
            false,
            &at_pixels,
        )?;
    }

    // Slice the collective bitmap into the individual patterns.
    let mut patterns = Vec::with_capacity(num_patterns as usize);
    for gray in 0..num_patterns {
        patterns.push(collective.crop(gray * pattern_width, 0, pattern_width, pattern_height)?);
    }

    Ok(PatternDictionary {
        patterns,
        pattern_width,
        pattern_height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_sized_patterns() {
        // Flags 0, pattern width 0.
        let data = [0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x01];
        let mut reader = Reader::new(&data);
        assert!(decode_pattern_dictionary(&mut reader).is_err());
    }
}
