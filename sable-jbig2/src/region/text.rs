//! Text region decoding (6.4, 7.4.3): symbol instances placed strip by
//! strip onto a region bitmap.

use crate::arithmetic_decoder::{ArithmeticDecoder, Context};
use crate::bitmap::{Bitmap, CombinationOperator};
use crate::error::{ErrorKind, Result, bail};
use crate::huffman_table::{
    HuffmanTable, TABLE_A, TABLE_F, TABLE_G, TABLE_H, TABLE_I, TABLE_J, TABLE_K, TABLE_L, TABLE_M,
    TABLE_N, TABLE_O, TableLine,
};
use crate::integer_decoder::IntegerDecoder;
use crate::reader::Reader;
use crate::region::refinement;
use crate::region::{
    AdaptivePixel, RefinementTemplate, RegionBitmap, RegionSegmentInfo,
    parse_refinement_adaptive_pixels, parse_region_segment_info,
};
use crate::symbol_id_decoder::SymbolIdDecoder;

/// Which corner of a symbol instance is placed at its (S, T) coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReferenceCorner {
    BottomLeft,
    TopLeft,
    BottomRight,
    TopRight,
}

impl ReferenceCorner {
    fn from_bits(value: u8) -> Self {
        match value & 0x03 {
            0 => Self::BottomLeft,
            1 => Self::TopLeft,
            2 => Self::BottomRight,
            _ => Self::TopRight,
        }
    }
}

/// The shared integer decoder contexts of a text region decode; symbol
/// dictionaries reuse them across aggregate symbols (6.5.8.2).
pub(crate) struct TextRegionContexts {
    /// IADT: strip delta T (6.4.6).
    pub(crate) iadt: IntegerDecoder,
    /// IAFS: first symbol S coordinate (6.4.7).
    pub(crate) iafs: IntegerDecoder,
    /// IADS: subsequent S coordinates (6.4.8).
    pub(crate) iads: IntegerDecoder,
    /// IAIT: in-strip T coordinate (6.4.9).
    pub(crate) iait: IntegerDecoder,
    /// IAID: symbol IDs (6.4.10).
    pub(crate) iaid: SymbolIdDecoder,
    /// IARI: refinement indicator (6.4.11).
    pub(crate) iari: IntegerDecoder,
    /// IARDW, IARDH, IARDX, IARDY: refinement deltas (6.4.11.1-4).
    pub(crate) iardw: IntegerDecoder,
    pub(crate) iardh: IntegerDecoder,
    pub(crate) iardx: IntegerDecoder,
    pub(crate) iardy: IntegerDecoder,
}

impl TextRegionContexts {
    pub(crate) fn new(symbol_code_length: u32) -> Self {
        Self {
            iadt: IntegerDecoder::new(),
            iafs: IntegerDecoder::new(),
            iads: IntegerDecoder::new(),
            iait: IntegerDecoder::new(),
            iaid: SymbolIdDecoder::new(symbol_code_length),
            iari: IntegerDecoder::new(),
            iardw: IntegerDecoder::new(),
            iardh: IntegerDecoder::new(),
            iardx: IntegerDecoder::new(),
            iardy: IntegerDecoder::new(),
        }
    }
}

/// SBSYMCODELEN: the fixed width of arithmetic symbol IDs (7.4.3.1.1).
pub(crate) fn symbol_code_length(num_symbols: u32) -> u32 {
    (32 - num_symbols.saturating_sub(1).leading_zeros()).max(1)
}

/// The parameters of the text region decoding procedure proper (Table 9);
/// built either from a parsed segment header or from the fixed values of a
/// symbol dictionary's aggregate decode (Table 17).
pub(crate) struct TextRegionParams<'a> {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) num_instances: u32,
    /// SBSTRIPS as a power of two.
    pub(crate) log_strip_size: u8,
    pub(crate) default_pixel: bool,
    pub(crate) combination_operator: CombinationOperator,
    pub(crate) transposed: bool,
    pub(crate) reference_corner: ReferenceCorner,
    pub(crate) delta_s_offset: i32,
    pub(crate) refinement_template: RefinementTemplate,
    pub(crate) refinement_at_pixels: &'a [AdaptivePixel],
}

impl TextRegionParams<'_> {
    fn strip_size(&self) -> u32 {
        1 << self.log_strip_size
    }
}

/// Flags word of a text region segment (7.4.3.1.1).
#[derive(Debug, Clone)]
struct TextRegionFlags {
    use_huffman: bool,
    use_refinement: bool,
    log_strip_size: u8,
    reference_corner: ReferenceCorner,
    transposed: bool,
    combination_operator: CombinationOperator,
    default_pixel: bool,
    delta_s_offset: i8,
    refinement_template: RefinementTemplate,
}

fn parse_text_region_flags(reader: &mut Reader<'_>) -> Result<TextRegionFlags> {
    let flags = reader.read_u16().ok_or(ErrorKind::IoExhausted)?;

    let use_huffman = flags & 0x0001 != 0;
    let use_refinement = flags & 0x0002 != 0;
    let log_strip_size = ((flags >> 2) & 0x03) as u8;
    let reference_corner = ReferenceCorner::from_bits(((flags >> 4) & 0x03) as u8);
    let transposed = flags & 0x0040 != 0;
    let combination_operator = CombinationOperator::from_value(((flags >> 7) & 0x03) as u8)?;
    let default_pixel = flags & 0x0200 != 0;

    // SBDSOFFSET is a 5-bit two's complement field.
    let raw_offset = ((flags >> 10) & 0x1F) as u8;
    let delta_s_offset = if raw_offset & 0x10 != 0 {
        (raw_offset | 0xE0) as i8
    } else {
        raw_offset as i8
    };

    let refinement_template = RefinementTemplate::from_byte((flags >> 15) as u8);

    Ok(TextRegionFlags {
        use_huffman,
        use_refinement,
        log_strip_size,
        reference_corner,
        transposed,
        combination_operator,
        default_pixel,
        delta_s_offset,
        refinement_template,
    })
}

/// Huffman table selectors of a text region segment (7.4.3.1.2).
#[derive(Debug, Clone)]
struct TextRegionHuffmanFlags {
    first_s: u8,
    delta_s: u8,
    delta_t: u8,
    refinement_width: u8,
    refinement_height: u8,
    refinement_x: u8,
    refinement_y: u8,
    refinement_size: u8,
}

fn parse_text_region_huffman_flags(reader: &mut Reader<'_>) -> Result<TextRegionHuffmanFlags> {
    let flags = reader.read_u16().ok_or(ErrorKind::IoExhausted)?;

    Ok(TextRegionHuffmanFlags {
        first_s: (flags & 0x03) as u8,
        delta_s: ((flags >> 2) & 0x03) as u8,
        delta_t: ((flags >> 4) & 0x03) as u8,
        refinement_width: ((flags >> 6) & 0x03) as u8,
        refinement_height: ((flags >> 8) & 0x03) as u8,
        refinement_x: ((flags >> 10) & 0x03) as u8,
        refinement_y: ((flags >> 12) & 0x03) as u8,
        refinement_size: ((flags >> 14) & 0x01) as u8,
    })
}

/// A parsed text region segment data header (7.4.3.1).
struct TextRegionHeader {
    region_info: RegionSegmentInfo,
    flags: TextRegionFlags,
    huffman_flags: Option<TextRegionHuffmanFlags>,
    refinement_at_pixels: Vec<AdaptivePixel>,
    num_instances: u32,
    /// SBSYMCODES, read from the stream in the Huffman variant (7.4.3.1.7).
    symbol_id_table: Option<HuffmanTable>,
}

fn parse(reader: &mut Reader<'_>, num_symbols: u32) -> Result<TextRegionHeader> {
    let region_info = parse_region_segment_info(reader)?;
    let flags = parse_text_region_flags(reader)?;

    let huffman_flags = if flags.use_huffman {
        Some(parse_text_region_huffman_flags(reader)?)
    } else {
        None
    };

    let refinement_at_pixels =
        if flags.use_refinement && flags.refinement_template == RefinementTemplate::Template0 {
            parse_refinement_adaptive_pixels(reader)?
        } else {
            Vec::new()
        };

    let num_instances = reader.read_u32().ok_or(ErrorKind::IoExhausted)?;

    let symbol_id_table = if flags.use_huffman {
        Some(read_symbol_id_table(reader, num_symbols)?)
    } else {
        None
    };

    Ok(TextRegionHeader {
        region_info,
        flags,
        huffman_flags,
        refinement_at_pixels,
        num_instances,
        symbol_id_table,
    })
}

/// Decode a text region segment body, drawing instances of the referred
/// symbols.
pub(crate) fn decode_text_region(
    reader: &mut Reader<'_>,
    symbols: &[&Bitmap],
    referred_tables: &[&HuffmanTable],
) -> Result<RegionBitmap> {
    let header = parse(reader, symbols.len() as u32)?;

    log::trace!(
        "text region {}x{} with {} instances over {} symbols",
        header.region_info.width,
        header.region_info.height,
        header.num_instances,
        symbols.len(),
    );

    let params = TextRegionParams {
        width: header.region_info.width,
        height: header.region_info.height,
        num_instances: header.num_instances,
        log_strip_size: header.flags.log_strip_size,
        default_pixel: header.flags.default_pixel,
        combination_operator: header.flags.combination_operator,
        transposed: header.flags.transposed,
        reference_corner: header.flags.reference_corner,
        delta_s_offset: header.flags.delta_s_offset as i32,
        refinement_template: header.flags.refinement_template,
        refinement_at_pixels: &header.refinement_at_pixels,
    };

    let bitmap = if header.flags.use_huffman {
        decode_huffman(reader, symbols, &header, &params, referred_tables)?
    } else {
        let data = reader.tail().ok_or(ErrorKind::IoExhausted)?;
        let mut decoder = ArithmeticDecoder::new(data);
        let mut contexts = TextRegionContexts::new(symbol_code_length(symbols.len() as u32));
        let mut gr_contexts =
            vec![Context::default(); 1 << params.refinement_template.context_bits()];

        decode_arithmetic(
            &mut decoder,
            symbols,
            &params,
            &mut contexts,
            &mut gr_contexts,
            header.flags.use_refinement,
        )?
    };

    Ok(RegionBitmap::new(bitmap, &header.region_info))
}

/// A symbol instance's bitmap: a plain dictionary reference or a freshly
/// refined copy.
pub(crate) enum InstanceBitmap {
    Reference(usize),
    Owned(Bitmap),
}

/// Decode an arithmetically coded text region (6.4.5), optionally with
/// per-instance refinement. Exposed to the symbol dictionary for its
/// aggregate decodes.
pub(crate) fn decode_arithmetic(
    decoder: &mut ArithmeticDecoder<'_>,
    symbols: &[&Bitmap],
    params: &TextRegionParams<'_>,
    contexts: &mut TextRegionContexts,
    gr_contexts: &mut [Context],
    use_refinement: bool,
) -> Result<Bitmap> {
    decode_with(decoder, symbols, params, contexts, |decoder, id, symbols, contexts| {
        if !use_refinement {
            // With SBREFINE 0 every instance uses its dictionary bitmap.
            return Ok(InstanceBitmap::Reference(id));
        }

        let refine = contexts
            .iari
            .decode(decoder)
            .ok_or(ErrorKind::ArithmeticExhausted)?;
        if refine == 0 {
            return Ok(InstanceBitmap::Reference(id));
        }

        let reference = *symbols
            .get(id)
            .ok_or(ErrorKind::OutOfRange("symbol ID out of range"))?;

        let delta_width = contexts
            .iardw
            .decode(decoder)
            .ok_or(ErrorKind::ArithmeticExhausted)?;
        let delta_height = contexts
            .iardh
            .decode(decoder)
            .ok_or(ErrorKind::ArithmeticExhausted)?;
        let offset_x = contexts
            .iardx
            .decode(decoder)
            .ok_or(ErrorKind::ArithmeticExhausted)?;
        let offset_y = contexts
            .iardy
            .decode(decoder)
            .ok_or(ErrorKind::ArithmeticExhausted)?;

        let refined_width = u32::try_from(reference.width() as i64 + delta_width as i64)
            .map_err(|_| ErrorKind::Malformed("refined width underflow"))?;
        let refined_height = u32::try_from(reference.height() as i64 + delta_height as i64)
            .map_err(|_| ErrorKind::Malformed("refined height underflow"))?;
        let reference_dx = delta_width.div_euclid(2) + offset_x;
        let reference_dy = delta_height.div_euclid(2) + offset_y;

        let mut refined = Bitmap::new(refined_width, refined_height)?;
        refinement::decode_bitmap(
            &mut refined,
            decoder,
            gr_contexts,
            reference,
            reference_dx,
            reference_dy,
            params.refinement_template,
            params.refinement_at_pixels,
            // TPGRON is always 0 inside a text region (Table 12).
            false,
        )?;
        Ok(InstanceBitmap::Owned(refined))
    })
}

/// The placement loop of 6.4.5, generic over how an instance's bitmap is
/// obtained.
fn decode_with<F>(
    decoder: &mut ArithmeticDecoder<'_>,
    symbols: &[&Bitmap],
    params: &TextRegionParams<'_>,
    contexts: &mut TextRegionContexts,
    mut instance_bitmap: F,
) -> Result<Bitmap>
where
    F: FnMut(
        &mut ArithmeticDecoder<'_>,
        usize,
        &[&Bitmap],
        &mut TextRegionContexts,
    ) -> Result<InstanceBitmap>,
{
    let strip_size = params.strip_size();

    // Step 1: fill SBREG with the default pixel.
    let mut region = Bitmap::filled(params.width, params.height, params.default_pixel)?;

    // Step 2: the initial STRIPT is decoded and negated; FIRSTS and the
    // instance counter start at zero.
    let initial = contexts
        .iadt
        .decode(decoder)
        .ok_or(ErrorKind::ArithmeticExhausted)?;
    let mut strip_t = initial.wrapping_mul(strip_size as i32).wrapping_neg();
    let mut first_s: i32 = 0;
    let mut instance_count: u32 = 0;

    while instance_count < params.num_instances {
        // Step 4b: move down by the strip's delta T.
        let delta_t = contexts
            .iadt
            .decode(decoder)
            .ok_or(ErrorKind::ArithmeticExhausted)?;
        strip_t = strip_t.wrapping_add(delta_t.wrapping_mul(strip_size as i32));

        // Step 4c: every instance of the strip.
        let mut first_in_strip = true;
        let mut current_s: i32 = 0;

        loop {
            if first_in_strip {
                let delta_first = contexts
                    .iafs
                    .decode(decoder)
                    .ok_or(ErrorKind::ArithmeticExhausted)?;
                first_s = first_s.wrapping_add(delta_first);
                current_s = first_s;
                first_in_strip = false;
            } else {
                match contexts.iads.decode(decoder) {
                    Some(delta_s) => {
                        current_s = current_s
                            .wrapping_add(delta_s)
                            .wrapping_add(params.delta_s_offset);
                    }
                    // OOB ends the strip.
                    None => break,
                }
            }

            // In-strip T coordinate; zero when SBSTRIPS is 1 (6.4.9).
            let current_t = if strip_size == 1 {
                0
            } else {
                contexts
                    .iait
                    .decode(decoder)
                    .ok_or(ErrorKind::ArithmeticExhausted)?
            };
            let instance_t = strip_t.wrapping_add(current_t);

            let id = contexts.iaid.decode(decoder) as usize;

            let bitmap = instance_bitmap(decoder, id, symbols, contexts)?;
            let (bitmap, width, height): (&Bitmap, i32, i32) = match &bitmap {
                InstanceBitmap::Reference(idx) => {
                    let symbol = *symbols
                        .get(*idx)
                        .ok_or(ErrorKind::OutOfRange("symbol ID out of range"))?;
                    (symbol, symbol.width() as i32, symbol.height() as i32)
                }
                InstanceBitmap::Owned(bitmap) => {
                    (bitmap, bitmap.width() as i32, bitmap.height() as i32)
                }
            };

            draw_instance(
                &mut region,
                bitmap,
                params,
                &mut current_s,
                instance_t,
                width,
                height,
            );

            instance_count += 1;
            if instance_count == params.num_instances {
                break;
            }
        }
    }

    Ok(region)
}

/// Steps 4c vi-xi of 6.4.5: advance CURS around the draw, place the
/// instance by its reference corner and compose it.
fn draw_instance(
    region: &mut Bitmap,
    bitmap: &Bitmap,
    params: &TextRegionParams<'_>,
    current_s: &mut i32,
    instance_t: i32,
    width: i32,
    height: i32,
) {
    use ReferenceCorner::*;

    // Step vi: right/bottom corners advance CURS before the draw.
    if !params.transposed && matches!(params.reference_corner, TopRight | BottomRight) {
        *current_s = current_s.wrapping_add(width - 1);
    } else if params.transposed && matches!(params.reference_corner, BottomLeft | BottomRight) {
        *current_s = current_s.wrapping_add(height - 1);
    }

    let s = *current_s;
    let t = instance_t;

    // Step viii: the (S, T) coordinate pins the chosen corner; transposed
    // regions swap the axes.
    let (x, y) = if !params.transposed {
        match params.reference_corner {
            TopLeft => (s, t),
            TopRight => (s.wrapping_sub(width - 1), t),
            BottomLeft => (s, t.wrapping_sub(height - 1)),
            BottomRight => (s.wrapping_sub(width - 1), t.wrapping_sub(height - 1)),
        }
    } else {
        match params.reference_corner {
            TopLeft => (t, s),
            TopRight => (t.wrapping_sub(width - 1), s),
            BottomLeft => (t, s.wrapping_sub(height - 1)),
            BottomRight => (t.wrapping_sub(width - 1), s.wrapping_sub(height - 1)),
        }
    };

    // Step x: draw with the region's combination operator.
    region.combine_at(bitmap, x, y, params.combination_operator);

    // Step xi: left/top corners advance CURS after the draw.
    if !params.transposed && matches!(params.reference_corner, TopLeft | BottomLeft) {
        *current_s = current_s.wrapping_add(width - 1);
    } else if params.transposed && matches!(params.reference_corner, TopLeft | TopRight) {
        *current_s = current_s.wrapping_add(height - 1);
    }
}

/// Decode a Huffman-coded text region (6.4.5 with SBHUFF = 1).
fn decode_huffman(
    reader: &mut Reader<'_>,
    symbols: &[&Bitmap],
    header: &TextRegionHeader,
    params: &TextRegionParams<'_>,
    referred_tables: &[&HuffmanTable],
) -> Result<Bitmap> {
    let huffman_flags = header
        .huffman_flags
        .as_ref()
        .ok_or(ErrorKind::Malformed("missing text region Huffman flags"))?;
    let tables = select_huffman_tables(huffman_flags, referred_tables)?;
    let symbol_codes = header
        .symbol_id_table
        .as_ref()
        .ok_or(ErrorKind::Malformed("missing symbol ID code table"))?;

    let strip_size = params.strip_size();
    let mut region = Bitmap::filled(params.width, params.height, params.default_pixel)?;

    let initial = tables.delta_t.decode_value(reader)?;
    let mut strip_t = initial.wrapping_mul(strip_size as i32).wrapping_neg();
    let mut first_s: i32 = 0;
    let mut instance_count: u32 = 0;

    while instance_count < params.num_instances {
        let delta_t = tables.delta_t.decode_value(reader)?;
        strip_t = strip_t.wrapping_add(delta_t.wrapping_mul(strip_size as i32));

        let mut first_in_strip = true;
        let mut current_s: i32 = 0;

        loop {
            if first_in_strip {
                first_s = first_s.wrapping_add(tables.first_s.decode_value(reader)?);
                current_s = first_s;
                first_in_strip = false;
            } else {
                match tables.delta_s.decode(reader)? {
                    Some(delta_s) => {
                        current_s = current_s
                            .wrapping_add(delta_s)
                            .wrapping_add(params.delta_s_offset);
                    }
                    None => break,
                }
            }

            // With SBHUFF the in-strip T is read as plain bits (6.4.9).
            let current_t = if strip_size == 1 {
                0
            } else {
                reader
                    .read_bits(params.log_strip_size)
                    .ok_or(ErrorKind::IoExhausted)? as i32
            };
            let instance_t = strip_t.wrapping_add(current_t);

            let id = symbol_codes.decode_value(reader)? as usize;

            let instance = huffman_instance_bitmap(reader, symbols, header, &tables, id)?;
            let (bitmap, width, height): (&Bitmap, i32, i32) = match &instance {
                InstanceBitmap::Reference(idx) => {
                    let symbol = *symbols
                        .get(*idx)
                        .ok_or(ErrorKind::OutOfRange("symbol ID out of range"))?;
                    (symbol, symbol.width() as i32, symbol.height() as i32)
                }
                InstanceBitmap::Owned(bitmap) => {
                    (bitmap, bitmap.width() as i32, bitmap.height() as i32)
                }
            };

            draw_instance(
                &mut region,
                bitmap,
                params,
                &mut current_s,
                instance_t,
                width,
                height,
            );

            instance_count += 1;
            if instance_count == params.num_instances {
                break;
            }
        }
    }

    Ok(region)
}

/// Determine one instance's bitmap in the Huffman variant (6.4.11 with
/// SBHUFF = 1): the refinement indicator is a plain bit and refinement
/// data is length-prefixed and byte-aligned.
fn huffman_instance_bitmap(
    reader: &mut Reader<'_>,
    symbols: &[&Bitmap],
    header: &TextRegionHeader,
    tables: &TextRegionHuffmanTables<'_>,
    id: usize,
) -> Result<InstanceBitmap> {
    if !header.flags.use_refinement {
        return Ok(InstanceBitmap::Reference(id));
    }

    let refine = reader.read_bit().ok_or(ErrorKind::IoExhausted)?;
    if refine == 0 {
        return Ok(InstanceBitmap::Reference(id));
    }

    let reference = *symbols
        .get(id)
        .ok_or(ErrorKind::OutOfRange("symbol ID out of range"))?;

    let delta_width = tables.refinement_width.decode_value(reader)?;
    let delta_height = tables.refinement_height.decode_value(reader)?;
    let offset_x = tables.refinement_x.decode_value(reader)?;
    let offset_y = tables.refinement_y.decode_value(reader)?;
    let data_size = tables.refinement_size.decode_value(reader)?;
    reader.align();

    let refined_width = u32::try_from(reference.width() as i64 + delta_width as i64)
        .map_err(|_| ErrorKind::Malformed("refined width underflow"))?;
    let refined_height = u32::try_from(reference.height() as i64 + delta_height as i64)
        .map_err(|_| ErrorKind::Malformed("refined height underflow"))?;
    let reference_dx = delta_width.div_euclid(2) + offset_x;
    let reference_dy = delta_height.div_euclid(2) + offset_y;

    let data = reader
        .read_bytes(usize::try_from(data_size).map_err(|_| ErrorKind::IoExhausted)?)
        .ok_or(ErrorKind::IoExhausted)?;

    let mut decoder = ArithmeticDecoder::new(data);
    let mut contexts =
        vec![Context::default(); 1 << header.flags.refinement_template.context_bits()];

    let mut refined = Bitmap::new(refined_width, refined_height)?;
    refinement::decode_bitmap(
        &mut refined,
        &mut decoder,
        &mut contexts,
        reference,
        reference_dx,
        reference_dy,
        header.flags.refinement_template,
        &header.refinement_at_pixels,
        false,
    )?;

    Ok(InstanceBitmap::Owned(refined))
}

struct TextRegionHuffmanTables<'a> {
    first_s: &'a HuffmanTable,
    delta_s: &'a HuffmanTable,
    delta_t: &'a HuffmanTable,
    refinement_width: &'a HuffmanTable,
    refinement_height: &'a HuffmanTable,
    refinement_x: &'a HuffmanTable,
    refinement_y: &'a HuffmanTable,
    refinement_size: &'a HuffmanTable,
}

/// Resolve each field's table selector to a standard or referred custom
/// table (7.4.3.1.6); custom tables are consumed in field order.
fn select_huffman_tables<'a>(
    flags: &TextRegionHuffmanFlags,
    referred: &[&'a HuffmanTable],
) -> Result<TextRegionHuffmanTables<'a>> {
    let mut custom_idx = 0;
    let mut next_custom = || -> Result<&'a HuffmanTable> {
        let table = referred
            .get(custom_idx)
            .copied()
            .ok_or(ErrorKind::Malformed("not enough referred Huffman tables"))?;
        custom_idx += 1;
        Ok(table)
    };

    let first_s = match flags.first_s {
        0 => &*TABLE_F,
        1 => &*TABLE_G,
        3 => next_custom()?,
        _ => bail!(ErrorKind::Malformed("invalid Huffman table selection")),
    };
    let delta_s = match flags.delta_s {
        0 => &*TABLE_H,
        1 => &*TABLE_I,
        2 => &*TABLE_J,
        3 => next_custom()?,
        _ => bail!(ErrorKind::Malformed("invalid Huffman table selection")),
    };
    let delta_t = match flags.delta_t {
        0 => &*TABLE_K,
        1 => &*TABLE_L,
        2 => &*TABLE_M,
        3 => next_custom()?,
        _ => bail!(ErrorKind::Malformed("invalid Huffman table selection")),
    };
    let refinement_width = match flags.refinement_width {
        0 => &*TABLE_N,
        1 => &*TABLE_O,
        3 => next_custom()?,
        _ => bail!(ErrorKind::Malformed("invalid Huffman table selection")),
    };
    let refinement_height = match flags.refinement_height {
        0 => &*TABLE_N,
        1 => &*TABLE_O,
        3 => next_custom()?,
        _ => bail!(ErrorKind::Malformed("invalid Huffman table selection")),
    };
    let refinement_x = match flags.refinement_x {
        0 => &*TABLE_N,
        1 => &*TABLE_O,
        3 => next_custom()?,
        _ => bail!(ErrorKind::Malformed("invalid Huffman table selection")),
    };
    let refinement_y = match flags.refinement_y {
        0 => &*TABLE_N,
        1 => &*TABLE_O,
        3 => next_custom()?,
        _ => bail!(ErrorKind::Malformed("invalid Huffman table selection")),
    };
    let refinement_size = match flags.refinement_size {
        0 => &*TABLE_A,
        1 => next_custom()?,
        _ => bail!(ErrorKind::Malformed("invalid Huffman table selection")),
    };

    Ok(TextRegionHuffmanTables {
        first_s,
        delta_s,
        delta_t,
        refinement_width,
        refinement_height,
        refinement_x,
        refinement_y,
        refinement_size,
    })
}

/// Read the symbol ID code table (7.4.3.1.7): 35 run-code lengths, a
/// run-coded list of per-symbol code lengths, then canonical assignment.
fn read_symbol_id_table(reader: &mut Reader<'_>, num_symbols: u32) -> Result<HuffmanTable> {
    let mut runcode_lines = Vec::with_capacity(35);
    for runcode in 0..35 {
        let preflen = reader.read_bits(4).ok_or(ErrorKind::IoExhausted)? as u8;
        runcode_lines.push(TableLine::new(runcode, preflen, 0));
    }
    let runcode_table = HuffmanTable::build(&runcode_lines);

    let mut code_lengths: Vec<u8> = Vec::with_capacity(num_symbols as usize);

    while code_lengths.len() < num_symbols as usize {
        let runcode = runcode_table.decode_value(reader)?;

        // Table 32: 0-31 are literal lengths; 32 repeats the previous
        // length 3-6 times, 33 repeats zero 3-10 times, 34 repeats zero
        // 11-138 times.
        match runcode {
            0..=31 => code_lengths.push(runcode as u8),
            32 => {
                let repeat = reader.read_bits(2).ok_or(ErrorKind::IoExhausted)? as usize + 3;
                let previous = *code_lengths
                    .last()
                    .ok_or(ErrorKind::Malformed("repeat run with no previous length"))?;
                for _ in 0..repeat {
                    if code_lengths.len() >= num_symbols as usize {
                        break;
                    }
                    code_lengths.push(previous);
                }
            }
            33 | 34 => {
                let repeat = if runcode == 33 {
                    reader.read_bits(3).ok_or(ErrorKind::IoExhausted)? as usize + 3
                } else {
                    reader.read_bits(7).ok_or(ErrorKind::IoExhausted)? as usize + 11
                };
                for _ in 0..repeat {
                    if code_lengths.len() >= num_symbols as usize {
                        break;
                    }
                    code_lengths.push(0);
                }
            }
            _ => bail!(ErrorKind::Malformed("invalid symbol length run code")),
        }
    }

    // The decoding procedure itself starts on a byte boundary.
    reader.align();

    let lines: Vec<TableLine> = code_lengths
        .iter()
        .enumerate()
        .map(|(idx, &preflen)| TableLine::new(idx as i32, preflen, 0))
        .collect();
    Ok(HuffmanTable::build(&lines))
}
