//! Generic refinement region decoding (6.3, 7.4.7): refine an existing
//! bitmap with a two-row template reaching into the reference.

use crate::arithmetic_decoder::{ArithmeticDecoder, Context};
use crate::bitmap::Bitmap;
use crate::error::{ErrorKind, Result, bail};
use crate::reader::Reader;
use crate::region::{
    AdaptivePixel, RefinementTemplate, RegionBitmap, RegionSegmentInfo,
    parse_refinement_adaptive_pixels, parse_region_segment_info,
};

/// A parsed refinement region segment data header (7.4.7.1).
#[derive(Debug, Clone)]
struct RefinementRegionHeader {
    region_info: RegionSegmentInfo,
    template: RefinementTemplate,
    /// Typical prediction for refinement (TPGRON).
    tpgron: bool,
    adaptive_pixels: Vec<AdaptivePixel>,
}

fn parse(reader: &mut Reader<'_>) -> Result<RefinementRegionHeader> {
    let region_info = parse_region_segment_info(reader)?;
    let flags = reader.read_byte().ok_or(ErrorKind::IoExhausted)?;
    let template = RefinementTemplate::from_byte(flags);
    let tpgron = flags & 0x02 != 0;

    let adaptive_pixels = if template == RefinementTemplate::Template0 {
        parse_refinement_adaptive_pixels(reader)?
    } else {
        Vec::new()
    };

    Ok(RefinementRegionHeader {
        region_info,
        template,
        tpgron,
        adaptive_pixels,
    })
}

/// Decode a refinement region segment body against `reference` (7.4.7.5):
/// the region refines either an intermediate region or the page bitmap
/// area it overlays.
pub(crate) fn decode_refinement_region(
    reader: &mut Reader<'_>,
    reference: &Bitmap,
    reference_x: u32,
    reference_y: u32,
) -> Result<RegionBitmap> {
    let header = parse(reader)?;

    if header.region_info.width > reference.width()
        || header.region_info.height > reference.height()
    {
        bail!(ErrorKind::Malformed("refinement exceeds its reference"));
    }

    let reference_dx = reference_x as i64 - header.region_info.x_location as i64;
    let reference_dy = reference_y as i64 - header.region_info.y_location as i64;
    let (Ok(reference_dx), Ok(reference_dy)) =
        (i32::try_from(reference_dx), i32::try_from(reference_dy))
    else {
        bail!(ErrorKind::OutOfRange("refinement reference offset"));
    };

    let encoded_data = reader.tail().ok_or(ErrorKind::IoExhausted)?;

    let mut decoder = ArithmeticDecoder::new(encoded_data);
    let mut contexts = vec![Context::default(); 1 << header.template.context_bits()];

    let mut bitmap = Bitmap::new(header.region_info.width, header.region_info.height)?;
    decode_bitmap(
        &mut bitmap,
        &mut decoder,
        &mut contexts,
        reference,
        reference_dx,
        reference_dy,
        header.template,
        &header.adaptive_pixels,
        header.tpgron,
    )?;

    Ok(RegionBitmap::new(bitmap, &header.region_info))
}

/// The refinement decoding procedure proper (6.3.5.6), shared with symbol
/// dictionaries and text regions.
pub(crate) fn decode_bitmap(
    bitmap: &mut Bitmap,
    decoder: &mut ArithmeticDecoder<'_>,
    contexts: &mut [Context],
    reference: &Bitmap,
    reference_dx: i32,
    reference_dy: i32,
    template: RefinementTemplate,
    adaptive_pixels: &[AdaptivePixel],
    tpgron: bool,
) -> Result<()> {
    if template == RefinementTemplate::Template0 && adaptive_pixels.len() < 2 {
        bail!(ErrorKind::Malformed("missing refinement adaptive pixels"));
    }

    let width = bitmap.width();
    let height = bitmap.height();

    let mut ltp = false;

    for y in 0..height {
        if tpgron {
            // The pseudo-pixel context toggling LTP (Figures 14, 15).
            let sltp_context: u32 = match template {
                RefinementTemplate::Template0 => 0b0000000010000,
                RefinementTemplate::Template1 => 0b0000001000,
            };
            let sltp = decoder.decode(&mut contexts[sltp_context as usize]);
            ltp = ltp != (sltp != 0);
        }

        for x in 0..width {
            // With LTP set, a pixel whose 3x3 reference neighbourhood is
            // uniform takes that value without consuming a decision.
            if ltp {
                let ref_x = x as i32 - reference_dx;
                let ref_y = y as i32 - reference_dy;
                let centre = reference.get_signed(ref_x, ref_y);

                let mut uniform = true;
                'outer: for dy in -1..=1 {
                    for dx in -1..=1 {
                        if reference.get_signed(ref_x + dx, ref_y + dy) != centre {
                            uniform = false;
                            break 'outer;
                        }
                    }
                }

                if uniform {
                    bitmap.set(x, y, centre != 0);
                    continue;
                }
            }

            let context = gather_context(
                bitmap,
                reference,
                x,
                y,
                reference_dx,
                reference_dy,
                template,
                adaptive_pixels,
            );
            let pixel = decoder.decode(&mut contexts[context as usize]);
            bitmap.set(x, y, pixel != 0);
        }
    }

    Ok(())
}

/// Context formation for refinement coding (6.3.5.3).
fn gather_context(
    bitmap: &Bitmap,
    reference: &Bitmap,
    x: u32,
    y: u32,
    reference_dx: i32,
    reference_dy: i32,
    template: RefinementTemplate,
    at: &[AdaptivePixel],
) -> u32 {
    let x = x as i32;
    let y = y as i32;

    let ref_x = x - reference_dx;
    let ref_y = y - reference_dy;

    match template {
        // 13 pixels: 4 from the bitmap being decoded, 9 from the reference
        // (Figure 12).
        RefinementTemplate::Template0 => {
            let at1 = at[0];
            let at2 = at[1];

            let mut context = 0_u32;

            context = (context << 1) | bitmap.get_signed(x + at1.x as i32, y + at1.y as i32);
            context = (context << 1) | bitmap.get_signed(x, y - 1);
            context = (context << 1) | bitmap.get_signed(x + 1, y - 1);
            context = (context << 1) | bitmap.get_signed(x - 1, y);

            context = (context << 1)
                | reference.get_signed(ref_x + at2.x as i32, ref_y + at2.y as i32);
            context = (context << 1) | reference.get_signed(ref_x, ref_y - 1);
            context = (context << 1) | reference.get_signed(ref_x + 1, ref_y - 1);
            context = (context << 1) | reference.get_signed(ref_x - 1, ref_y);
            context = (context << 1) | reference.get_signed(ref_x, ref_y);
            context = (context << 1) | reference.get_signed(ref_x + 1, ref_y);
            context = (context << 1) | reference.get_signed(ref_x - 1, ref_y + 1);
            context = (context << 1) | reference.get_signed(ref_x, ref_y + 1);
            context = (context << 1) | reference.get_signed(ref_x + 1, ref_y + 1);

            context
        }
        // 10 pixels: 4 from the decoded bitmap, 6 from the reference
        // (Figure 13).
        RefinementTemplate::Template1 => {
            let mut context = 0_u32;

            context = (context << 1) | bitmap.get_signed(x - 1, y - 1);
            context = (context << 1) | bitmap.get_signed(x, y - 1);
            context = (context << 1) | bitmap.get_signed(x + 1, y - 1);
            context = (context << 1) | bitmap.get_signed(x - 1, y);

            context = (context << 1) | reference.get_signed(ref_x, ref_y - 1);
            context = (context << 1) | reference.get_signed(ref_x - 1, ref_y);
            context = (context << 1) | reference.get_signed(ref_x, ref_y);
            context = (context << 1) | reference.get_signed(ref_x + 1, ref_y);
            context = (context << 1) | reference.get_signed(ref_x, ref_y + 1);
            context = (context << 1) | reference.get_signed(ref_x + 1, ref_y + 1);

            context
        }
    }
}
