//! Symbolic-mode encoding: the classifier's template dictionary becomes a
//! global symbol dictionary segment, and each page becomes a text region
//! placing class templates at the classified UL corners.

use std::collections::BTreeMap;

use crate::arithmetic_decoder::Context;
use crate::arithmetic_encoder::ArithmeticEncoder;
use crate::bitmap::{Bitmap, CombinationOperator};
use crate::classify::{Classifier, ClassifierSettings};
use crate::encode::integers::{IntegerEncoder, SymbolIdEncoder};
use crate::encode::{PageSettings, encode_bitmap, write_page_info_segment};
use crate::error::{ErrorKind, Result};
use crate::region::generic::nominal_adaptive_pixels;
use crate::region::text::symbol_code_length;
use crate::region::{RegionSegmentInfo, Template, write_region_segment_info};
use crate::segment::{SegmentType, write_segment};
use crate::writer::Writer;

/// One placed instance: its S coordinate plus the symbol's dictionary
/// index; the T coordinate is the strip key.
struct Instance {
    x: i32,
    symbol: u32,
}

/// Encode all pages through the classifier.
pub(super) fn encode_document(
    writer: &mut Writer,
    next_segment: &mut u32,
    pages: &[(Bitmap, PageSettings)],
    settings: &ClassifierSettings,
) -> Result<()> {
    let mut classifier = Classifier::new(settings.clone())?;
    for (index, (bitmap, _)) in pages.iter().enumerate() {
        classifier.add_page(bitmap, index as u32 + 1, settings.method)?;
    }

    // Dictionary symbols are the unbordered class templates, grouped into
    // height classes and ordered by width within each class.
    let num_classes = classifier.num_classes();
    let mut templates: Vec<Bitmap> = Vec::with_capacity(num_classes);
    for class_id in 0..num_classes {
        templates.push(
            classifier
                .template(class_id)
                .ok_or(ErrorKind::OutOfRange("class ID out of range"))?,
        );
    }

    let mut order: Vec<usize> = (0..num_classes).collect();
    order.sort_by_key(|&id| (templates[id].height(), templates[id].width(), id));

    // class ID -> index in dictionary order, as referenced by IAID.
    let mut symbol_index = vec![0_u32; num_classes];
    for (position, &class_id) in order.iter().enumerate() {
        symbol_index[class_id] = position as u32;
    }

    log::debug!(
        "symbol mode: {} classes over {} components",
        num_classes,
        classifier.num_components()
    );

    let dictionary_segment = *next_segment;
    write_symbol_dictionary_segment(writer, next_segment, &templates, &order);

    for (index, (bitmap, page_settings)) in pages.iter().enumerate() {
        let page_number = index as u32 + 1;
        write_page_info_segment(writer, next_segment, bitmap, page_settings, page_number);

        // This page's instances in (T, S) order.
        let mut strips: BTreeMap<i32, Vec<Instance>> = BTreeMap::new();
        for ((&class_id, &page), &(x, y)) in classifier
            .class_ids()
            .iter()
            .zip(classifier.page_numbers())
            .zip(classifier.ul_corners())
        {
            if page == page_number {
                strips.entry(y).or_default().push(Instance {
                    x,
                    symbol: symbol_index[class_id],
                });
            }
        }
        for instances in strips.values_mut() {
            instances.sort_by_key(|instance| instance.x);
        }

        write_text_region_segment(
            writer,
            next_segment,
            dictionary_segment,
            bitmap,
            page_number,
            &strips,
            &templates,
            &order,
            num_classes as u32,
        );

        write_segment(
            writer,
            *next_segment,
            SegmentType::EndOfPage,
            &[],
            page_number,
            &[],
        );
        *next_segment += 1;
    }

    Ok(())
}

/// Emit the global symbol dictionary: height-class deltas, direct generic
/// coding of each bitmap, and an export run covering every symbol (6.5 in
/// reverse).
fn write_symbol_dictionary_segment(
    writer: &mut Writer,
    next_segment: &mut u32,
    templates: &[Bitmap],
    order: &[usize],
) {
    let template = Template::Template0;
    let at_pixels = nominal_adaptive_pixels(template);

    let mut data = Writer::new();
    // Flags: arithmetic coding, no refinement, template 0.
    data.write_u16(0);
    for at in &at_pixels {
        data.write_byte(at.x as u8);
        data.write_byte(at.y as u8);
    }
    data.write_u32(templates.len() as u32);
    data.write_u32(templates.len() as u32);

    let mut encoder = ArithmeticEncoder::new();
    let mut iadh = IntegerEncoder::new();
    let mut iadw = IntegerEncoder::new();
    let mut iaex = IntegerEncoder::new();
    let mut gb_contexts = vec![Context::default(); 1 << template.context_bits()];

    let mut class_height = 0_i32;
    let mut position = 0;
    while position < order.len() {
        let height = templates[order[position]].height();

        iadh.encode(&mut encoder, Some(height as i32 - class_height));
        class_height = height as i32;

        let mut symbol_width = 0_i32;
        while position < order.len() && templates[order[position]].height() == height {
            let bitmap = &templates[order[position]];
            iadw.encode(&mut encoder, Some(bitmap.width() as i32 - symbol_width));
            symbol_width = bitmap.width() as i32;

            encode_bitmap(
                &mut encoder,
                &mut gb_contexts,
                bitmap,
                template,
                false,
                &at_pixels,
            );
            position += 1;
        }

        // OOB closes the height class.
        iadw.encode(&mut encoder, None);
    }

    // Export flags: a zero-length "not exported" run, then everything.
    if !templates.is_empty() {
        iaex.encode(&mut encoder, Some(0));
        iaex.encode(&mut encoder, Some(templates.len() as i32));
    }
    data.write_bytes(&encoder.flush());

    write_segment(
        writer,
        *next_segment,
        SegmentType::SymbolDictionary,
        &[],
        0,
        &data.into_bytes(),
    );
    *next_segment += 1;
}

/// Emit one page's text region (6.4 in reverse): SBSTRIPS = 1, top-left
/// reference corner, OR composition.
fn write_text_region_segment(
    writer: &mut Writer,
    next_segment: &mut u32,
    dictionary_segment: u32,
    page_bitmap: &Bitmap,
    page_number: u32,
    strips: &BTreeMap<i32, Vec<Instance>>,
    templates: &[Bitmap],
    order: &[usize],
    num_symbols: u32,
) {
    let num_instances: u32 = strips.values().map(|v| v.len() as u32).sum();

    let mut data = Writer::new();
    write_region_segment_info(
        &mut data,
        &RegionSegmentInfo {
            width: page_bitmap.width(),
            height: page_bitmap.height(),
            x_location: 0,
            y_location: 0,
            combination_operator: CombinationOperator::Or,
        },
    );

    // Flags: arithmetic, no refinement, SBSTRIPS 1, REFCORNER TOPLEFT,
    // untransposed, OR, default pixel 0, no DS offset.
    data.write_u16(0x0010);
    data.write_u32(num_instances);

    let mut encoder = ArithmeticEncoder::new();
    let mut iadt = IntegerEncoder::new();
    let mut iafs = IntegerEncoder::new();
    let mut iads = IntegerEncoder::new();
    let mut iaid = SymbolIdEncoder::new(symbol_code_length(num_symbols));

    // The initial strip offset; the decoder negates it.
    iadt.encode(&mut encoder, Some(0));

    let mut strip_t = 0_i32;
    let mut first_s = 0_i32;
    let mut emitted = 0_u32;

    for (&t, instances) in strips {
        iadt.encode(&mut encoder, Some(t - strip_t));
        strip_t = t;

        let mut current_s = 0_i32;
        for (index, instance) in instances.iter().enumerate() {
            if index == 0 {
                iafs.encode(&mut encoder, Some(instance.x - first_s));
                first_s = instance.x;
                current_s = instance.x;
            } else {
                iads.encode(&mut encoder, Some(instance.x - current_s));
            }

            iaid.encode(&mut encoder, instance.symbol);

            // The decoder advances CURS past the drawn instance.
            let width = dictionary_width(templates, order, instance.symbol);
            current_s = instance.x + width - 1;

            emitted += 1;
        }

        // The decoder leaves the final strip after the declared instance
        // count without reading its terminator.
        if emitted < num_instances {
            iads.encode(&mut encoder, None);
        }
    }

    data.write_bytes(&encoder.flush());

    write_segment(
        writer,
        *next_segment,
        SegmentType::ImmediateTextRegion,
        &[dictionary_segment],
        page_number,
        &data.into_bytes(),
    );
    *next_segment += 1;
}

/// The width of the dictionary symbol at `index` in export order.
fn dictionary_width(templates: &[Bitmap], order: &[usize], index: u32) -> i32 {
    templates[order[index as usize]].width() as i32
}
