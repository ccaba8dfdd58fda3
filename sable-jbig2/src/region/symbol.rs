//! Symbol dictionary decoding (6.5, 7.4.2): height classes of glyph
//! bitmaps, coded directly, by refinement/aggregation, or collectively in
//! the Huffman variant.

use crate::arithmetic_decoder::{ArithmeticDecoder, Context};
use crate::bitmap::{Bitmap, CombinationOperator};
use crate::error::{ErrorKind, Result, bail};
use crate::huffman_table::{HuffmanTable, TABLE_A, TABLE_B, TABLE_C, TABLE_D, TABLE_E};
use crate::integer_decoder::IntegerDecoder;
use crate::reader::Reader;
use crate::region::generic::{decode_bitmap, decode_bitmap_mmr};
use crate::region::text::{
    ReferenceCorner, TextRegionContexts, TextRegionParams, decode_arithmetic,
    symbol_code_length,
};
use crate::region::{
    AdaptivePixel, RefinementTemplate, Template, parse_adaptive_pixels,
    parse_refinement_adaptive_pixels,
};
use crate::region::refinement;

/// A decoded symbol dictionary.
#[derive(Debug, Clone)]
pub(crate) struct SymbolDictionary {
    pub(crate) exported_symbols: Vec<Bitmap>,
}

/// Which Huffman table a dictionary field uses (7.4.2.1.1).
#[derive(Debug, Clone, Copy)]
enum TableSelection {
    Standard(&'static std::sync::LazyLock<HuffmanTable>),
    UserSupplied,
}

/// Parsed symbol dictionary flags (7.4.2.1.1).
#[derive(Debug, Clone)]
struct SymbolDictionaryFlags {
    use_huffman: bool,
    use_refagg: bool,
    delta_height_table: TableSelection,
    delta_width_table: TableSelection,
    bitmap_size_table: TableSelection,
    aggregate_instance_table: TableSelection,
    template: Template,
    refinement_template: RefinementTemplate,
}

/// Parsed symbol dictionary data header (7.4.2.1).
struct SymbolDictionaryHeader {
    flags: SymbolDictionaryFlags,
    at_pixels: Vec<AdaptivePixel>,
    refinement_at_pixels: Vec<AdaptivePixel>,
    num_exported_symbols: u32,
    num_new_symbols: u32,
}

fn parse(reader: &mut Reader<'_>) -> Result<SymbolDictionaryHeader> {
    let flags_word = reader.read_u16().ok_or(ErrorKind::IoExhausted)?;
    let use_huffman = flags_word & 0x0001 != 0;
    let use_refagg = flags_word & 0x0002 != 0;

    let delta_height_table = match (flags_word >> 2) & 0x03 {
        0 => TableSelection::Standard(&TABLE_D),
        1 => TableSelection::Standard(&TABLE_E),
        3 => TableSelection::UserSupplied,
        _ => bail!(ErrorKind::Malformed("invalid Huffman table selection")),
    };
    let delta_width_table = match (flags_word >> 4) & 0x03 {
        0 => TableSelection::Standard(&TABLE_B),
        1 => TableSelection::Standard(&TABLE_C),
        3 => TableSelection::UserSupplied,
        _ => bail!(ErrorKind::Malformed("invalid Huffman table selection")),
    };
    let bitmap_size_table = if flags_word & 0x0040 != 0 {
        TableSelection::UserSupplied
    } else {
        TableSelection::Standard(&TABLE_A)
    };
    let aggregate_instance_table = if flags_word & 0x0080 != 0 {
        TableSelection::UserSupplied
    } else {
        TableSelection::Standard(&TABLE_A)
    };

    let template = Template::from_byte((flags_word >> 10) as u8);
    let refinement_template = RefinementTemplate::from_byte((flags_word >> 12) as u8);

    let flags = SymbolDictionaryFlags {
        use_huffman,
        use_refagg,
        delta_height_table,
        delta_width_table,
        bitmap_size_table,
        aggregate_instance_table,
        template,
        refinement_template,
    };

    let at_pixels = if use_huffman {
        Vec::new()
    } else {
        parse_adaptive_pixels(reader, template)?
    };

    let refinement_at_pixels = if use_refagg
        && refinement_template == RefinementTemplate::Template0
    {
        parse_refinement_adaptive_pixels(reader)?
    } else {
        Vec::new()
    };

    let num_exported_symbols = reader.read_u32().ok_or(ErrorKind::IoExhausted)?;
    let num_new_symbols = reader.read_u32().ok_or(ErrorKind::IoExhausted)?;

    Ok(SymbolDictionaryHeader {
        flags,
        at_pixels,
        refinement_at_pixels,
        num_exported_symbols,
        num_new_symbols,
    })
}

/// An upper bound protecting the decoder from absurd declared counts.
const MAX_SYMBOLS: u32 = 1 << 20;

/// Decode a symbol dictionary segment body.
///
/// `input_symbols` is SDINSYMS: the concatenated exports of the referred
/// dictionaries. `referred_tables` supplies user Huffman tables in order.
pub(crate) fn decode_symbol_dictionary(
    reader: &mut Reader<'_>,
    input_symbols: &[&Bitmap],
    referred_tables: &[&HuffmanTable],
) -> Result<SymbolDictionary> {
    let header = parse(reader)?;

    if header.num_new_symbols > MAX_SYMBOLS || header.num_exported_symbols > MAX_SYMBOLS {
        bail!(ErrorKind::Malformed("symbol dictionary declares too many symbols"));
    }

    log::trace!(
        "symbol dictionary: {} new, {} exported, {} inherited",
        header.num_new_symbols,
        header.num_exported_symbols,
        input_symbols.len(),
    );

    let exported = if header.flags.use_huffman {
        decode_huffman(reader, &header, input_symbols, referred_tables)?
    } else {
        decode_arith(reader, &header, input_symbols)?
    };

    Ok(SymbolDictionary {
        exported_symbols: exported,
    })
}

/// Decode the new symbols with arithmetic coding, directly or by
/// refinement/aggregation, then resolve the exports.
fn decode_arith(
    reader: &mut Reader<'_>,
    header: &SymbolDictionaryHeader,
    input_symbols: &[&Bitmap],
) -> Result<Vec<Bitmap>> {
    let data = reader.tail().ok_or(ErrorKind::IoExhausted)?;
    let mut decoder = ArithmeticDecoder::new(data);

    let mut iadh = IntegerDecoder::new();
    let mut iadw = IntegerDecoder::new();
    let mut iaex = IntegerDecoder::new();
    let mut iaai = IntegerDecoder::new();

    let mut gb_contexts = vec![Context::default(); 1 << header.flags.template.context_bits()];
    let mut gr_contexts =
        vec![Context::default(); 1 << header.flags.refinement_template.context_bits()];

    // SBSYMCODELEN covers inherited plus new symbols (6.5.8.2.3).
    let total_symbols = input_symbols.len() as u32 + header.num_new_symbols;
    let mut text_contexts = TextRegionContexts::new(symbol_code_length(total_symbols));

    let mut new_symbols: Vec<Bitmap> = Vec::with_capacity(header.num_new_symbols as usize);

    // Height classes: each delta height opens a class, each delta width a
    // symbol, OOB closes the class (6.5.5 step 4). A valid stream has at
    // most one class per declared symbol; more means the decoder is
    // running on end-of-stream padding.
    let mut class_height: u32 = 0;
    let mut height_classes: u32 = 0;
    while (new_symbols.len() as u32) < header.num_new_symbols {
        height_classes += 1;
        if height_classes > header.num_new_symbols {
            bail!(ErrorKind::ArithmeticExhausted);
        }

        let delta_height = iadh
            .decode(&mut decoder)
            .ok_or(ErrorKind::ArithmeticExhausted)?;
        class_height = class_height
            .checked_add_signed(delta_height)
            .filter(|&h| h <= 1 << 20)
            .ok_or(ErrorKind::Malformed("invalid symbol height"))?;

        let mut symbol_width: u32 = 0;
        while let Some(delta_width) = iadw.decode(&mut decoder) {
            symbol_width = symbol_width
                .checked_add_signed(delta_width)
                .filter(|&w| w <= 1 << 20)
                .ok_or(ErrorKind::Malformed("invalid symbol width"))?;

            if new_symbols.len() as u32 == header.num_new_symbols {
                bail!(ErrorKind::Malformed("more symbols than declared"));
            }

            let symbol = if header.flags.use_refagg {
                decode_aggregate_symbol(
                    &mut decoder,
                    header,
                    input_symbols,
                    &new_symbols,
                    &mut iaai,
                    &mut text_contexts,
                    &mut gr_contexts,
                    symbol_width,
                    class_height,
                )?
            } else {
                // Direct coding: a generic region decode with TPGDON 0
                // (Table 16), sharing the GB contexts across symbols.
                let mut bitmap = Bitmap::new(symbol_width, class_height)?;
                decode_bitmap(
                    &mut bitmap,
                    &mut decoder,
                    &mut gb_contexts,
                    header.flags.template,
                    false,
                    &header.at_pixels,
                )?;
                bitmap
            };

            new_symbols.push(symbol);
        }
    }

    resolve_exports(
        input_symbols,
        &new_symbols,
        header.num_exported_symbols,
        || {
            iaex.decode(&mut decoder)
                .ok_or_else(|| ErrorKind::ArithmeticExhausted.into())
        },
    )
}

/// Decode one refinement/aggregate symbol (6.5.8.2).
fn decode_aggregate_symbol(
    decoder: &mut ArithmeticDecoder<'_>,
    header: &SymbolDictionaryHeader,
    input_symbols: &[&Bitmap],
    new_symbols: &[Bitmap],
    iaai: &mut IntegerDecoder,
    text_contexts: &mut TextRegionContexts,
    gr_contexts: &mut [Context],
    width: u32,
    height: u32,
) -> Result<Bitmap> {
    // SBSYMS: the inherited symbols followed by those decoded so far
    // (6.5.8.2.4).
    let mut sbsyms: Vec<&Bitmap> = Vec::with_capacity(input_symbols.len() + new_symbols.len());
    sbsyms.extend(input_symbols.iter().copied());
    sbsyms.extend(new_symbols.iter());

    let instances = iaai
        .decode(decoder)
        .ok_or(ErrorKind::ArithmeticExhausted)?;

    if instances == 1 {
        // Single-symbol aggregation decodes directly as a refinement
        // (6.5.8.2.2, Table 18).
        let id = text_contexts.iaid.decode(decoder) as usize;
        let dx = text_contexts
            .iardx
            .decode(decoder)
            .ok_or(ErrorKind::ArithmeticExhausted)?;
        let dy = text_contexts
            .iardy
            .decode(decoder)
            .ok_or(ErrorKind::ArithmeticExhausted)?;

        let reference = *sbsyms
            .get(id)
            .ok_or(ErrorKind::OutOfRange("aggregate symbol ID"))?;

        let mut bitmap = Bitmap::new(width, height)?;
        refinement::decode_bitmap(
            &mut bitmap,
            decoder,
            gr_contexts,
            reference,
            dx,
            dy,
            header.flags.refinement_template,
            &header.refinement_at_pixels,
            false,
        )?;
        Ok(bitmap)
    } else if instances > 1 {
        // Multi-symbol aggregation runs a text region decode with the
        // fixed parameters of Table 17.
        let params = TextRegionParams {
            width,
            height,
            num_instances: instances as u32,
            log_strip_size: 0,
            default_pixel: false,
            combination_operator: CombinationOperator::Or,
            transposed: false,
            reference_corner: ReferenceCorner::TopLeft,
            delta_s_offset: 0,
            refinement_template: header.flags.refinement_template,
            refinement_at_pixels: &header.refinement_at_pixels,
        };

        decode_arithmetic(decoder, &sbsyms, &params, text_contexts, gr_contexts, true)
    } else {
        bail!(ErrorKind::Malformed("non-positive aggregate instance count"))
    }
}

/// Decode the new symbols in the Huffman variant (6.5.5 with SDHUFF = 1):
/// widths accumulate per height class and the class's bitmaps arrive as
/// one collective bitmap.
fn decode_huffman(
    reader: &mut Reader<'_>,
    header: &SymbolDictionaryHeader,
    input_symbols: &[&Bitmap],
    referred_tables: &[&HuffmanTable],
) -> Result<Vec<Bitmap>> {
    if header.flags.use_refagg {
        // Refinement/aggregation under Huffman coding is rare enough that
        // no mainstream encoder emits it.
        bail!(ErrorKind::Unsupported(
            "Huffman-coded refinement/aggregate symbol dictionary"
        ));
    }

    // Resolution order follows the field order of 7.4.2.1.6.
    let mut custom_idx = 0;
    let delta_height_table =
        resolve_table(header.flags.delta_height_table, referred_tables, &mut custom_idx)?;
    let delta_width_table =
        resolve_table(header.flags.delta_width_table, referred_tables, &mut custom_idx)?;
    let bitmap_size_table =
        resolve_table(header.flags.bitmap_size_table, referred_tables, &mut custom_idx)?;
    let _aggregate_table =
        resolve_table(header.flags.aggregate_instance_table, referred_tables, &mut custom_idx)?;

    let mut new_symbols: Vec<Bitmap> = Vec::with_capacity(header.num_new_symbols as usize);
    let mut class_widths: Vec<u32> = Vec::new();

    let mut class_height: u32 = 0;
    while (new_symbols.len() as u32 + class_widths.len() as u32) < header.num_new_symbols {
        let delta_height = delta_height_table.decode_value(reader)?;
        class_height = class_height
            .checked_add_signed(delta_height)
            .filter(|&h| h <= 1 << 20)
            .ok_or(ErrorKind::Malformed("invalid symbol height"))?;

        let mut symbol_width: u32 = 0;
        let mut total_width: u32 = 0;
        class_widths.clear();

        while let Some(delta_width) = delta_width_table.decode(reader)? {
            symbol_width = symbol_width
                .checked_add_signed(delta_width)
                .filter(|&w| w > 0 && w <= 1 << 20)
                .ok_or(ErrorKind::Malformed("invalid symbol width"))?;
            total_width = total_width
                .checked_add(symbol_width)
                .ok_or(ErrorKind::Malformed("height class too wide"))?;

            if new_symbols.len() + class_widths.len() >= header.num_new_symbols as usize {
                bail!(ErrorKind::Malformed("more symbols than declared"));
            }
            class_widths.push(symbol_width);
        }

        if class_widths.is_empty() {
            continue;
        }

        // 6.5.9: the collective bitmap; size zero means it is stored
        // uncompressed, anything else is MMR coded.
        let bitmap_size = bitmap_size_table.decode_value(reader)?;
        reader.align();

        let collective = if bitmap_size == 0 {
            let row_bytes = total_width.div_ceil(8) as usize;
            let mut bitmap = Bitmap::new(total_width, class_height)?;
            for y in 0..class_height {
                let row = reader
                    .read_bytes(row_bytes)
                    .ok_or(ErrorKind::IoExhausted)?;
                for (byte_idx, &byte) in row.iter().enumerate() {
                    for bit in 0..8 {
                        let x = byte_idx as u32 * 8 + bit;
                        if x < total_width && (byte >> (7 - bit)) & 1 != 0 {
                            bitmap.set(x, y, true);
                        }
                    }
                }
            }
            bitmap
        } else {
            let data = reader
                .read_bytes(
                    usize::try_from(bitmap_size).map_err(|_| ErrorKind::IoExhausted)?,
                )
                .ok_or(ErrorKind::IoExhausted)?;
            let mut bitmap = Bitmap::new(total_width, class_height)?;
            decode_bitmap_mmr(&mut bitmap, data)?;
            bitmap
        };

        // Split the collective bitmap left to right.
        let mut x_offset = 0;
        for &width in &class_widths {
            new_symbols.push(collective.crop(x_offset, 0, width, class_height)?);
            x_offset += width;
        }
        class_widths.clear();
    }

    // 6.5.10: the export flags are decoded with Table B.1 runs.
    resolve_exports(
        input_symbols,
        &new_symbols,
        header.num_exported_symbols,
        || TABLE_A.decode_value(reader),
    )
}

/// Resolve a field's table selector to a standard table or the next
/// referred custom table.
fn resolve_table<'a>(
    selection: TableSelection,
    referred: &[&'a HuffmanTable],
    custom_idx: &mut usize,
) -> Result<&'a HuffmanTable> {
    match selection {
        TableSelection::Standard(table) => Ok(&**table),
        TableSelection::UserSupplied => {
            let table = referred
                .get(*custom_idx)
                .copied()
                .ok_or(ErrorKind::Malformed("not enough referred Huffman tables"))?;
            *custom_idx += 1;
            Ok(table)
        }
    }
}

/// Resolve which of the inherited and new symbols are exported (6.5.10):
/// alternating runs of not-exported/exported flags.
fn resolve_exports<F>(
    input_symbols: &[&Bitmap],
    new_symbols: &[Bitmap],
    num_exported: u32,
    mut decode_run: F,
) -> Result<Vec<Bitmap>>
where
    F: FnMut() -> Result<i32>,
{
    let total = input_symbols.len() + new_symbols.len();

    let mut exported_flags = vec![false; total];
    let mut index: usize = 0;
    let mut exporting = false;
    let mut runs = 0_usize;

    while index < total {
        // Zero-length runs flip the flag without advancing; a stream
        // feeding us more runs than symbols is stuck on padding.
        runs += 1;
        if runs > total + 2 {
            bail!(ErrorKind::ArithmeticExhausted);
        }

        let run = decode_run()?;
        if run < 0 {
            bail!(ErrorKind::Malformed("negative export run length"));
        }

        let run = (run as usize).min(total - index);
        if exporting {
            exported_flags[index..index + run].fill(true);
        }
        index += run;
        exporting = !exporting;
    }

    let mut exported = Vec::with_capacity(num_exported as usize);
    for (i, flag) in exported_flags.iter().enumerate() {
        if !flag {
            continue;
        }
        let symbol = if i < input_symbols.len() {
            input_symbols[i].clone()
        } else {
            new_symbols[i - input_symbols.len()].clone()
        };
        exported.push(symbol);
    }

    if exported.len() != num_exported as usize {
        bail!(ErrorKind::Malformed("export count mismatch"));
    }

    Ok(exported)
}
