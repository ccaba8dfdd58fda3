//! Generic region encoding (6.2 in reverse): the mirror image of the
//! decoder's context formation, so decoding the output reproduces the
//! input bit for bit.

use crate::arithmetic_decoder::Context;
use crate::arithmetic_encoder::ArithmeticEncoder;
use crate::bitmap::Bitmap;
use crate::region::generic::gather_context;
use crate::region::{AdaptivePixel, Template};

/// Encode `bitmap` as a generic region bit stream.
///
/// With `tpgdon`, each row identical to the one above costs a single
/// typical-prediction bit instead of a row of pixel decisions, which is
/// the encoder's duplicated-line removal.
pub(crate) fn encode_bitmap(
    encoder: &mut ArithmeticEncoder,
    contexts: &mut [Context],
    bitmap: &Bitmap,
    template: Template,
    tpgdon: bool,
    adaptive_pixels: &[AdaptivePixel],
) {
    let width = bitmap.width();
    let height = bitmap.height();

    let mut ltp = false;

    for y in 0..height {
        // A row is typical when it repeats the previous row; the row above
        // the image counts as all white (matching the decoder, which
        // leaves row 0 untouched under LTP).
        let typical = tpgdon
            && if y == 0 {
                bitmap.row(0).iter().all(|&b| b == 0)
            } else {
                bitmap.row(y) == bitmap.row(y - 1)
            };

        if tpgdon {
            let sltp_context: u32 = match template {
                Template::Template0 => 0b1001101100100101,
                Template::Template1 => 0b0011110010101,
                Template::Template2 => 0b0011100101,
                Template::Template3 => 0b0110010101,
            };
            let sltp = u32::from(typical != ltp);
            encoder.encode(&mut contexts[sltp_context as usize], sltp);
            ltp = typical;
        }

        if ltp {
            continue;
        }

        // The context of each pixel only reaches already-coded positions,
        // so gathering from the finished bitmap is exactly what the
        // decoder reconstructs.
        for x in 0..width {
            let context = gather_context(bitmap, x, y, template, adaptive_pixels);
            let bit = u32::from(bitmap.get(x, y));
            encoder.encode(&mut contexts[context as usize], bit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arithmetic_decoder::ArithmeticDecoder;
    use crate::region::generic::{decode_bitmap, nominal_adaptive_pixels};

    fn round_trip(bitmap: &Bitmap, template: Template, tpgdon: bool) {
        let at_pixels = nominal_adaptive_pixels(template);

        let mut encoder = ArithmeticEncoder::new();
        let mut contexts = vec![Context::default(); 1 << template.context_bits()];
        encode_bitmap(&mut encoder, &mut contexts, bitmap, template, tpgdon, &at_pixels);
        let coded = encoder.flush();

        let mut decoded = Bitmap::new(bitmap.width(), bitmap.height()).unwrap();
        let mut decoder = ArithmeticDecoder::new(&coded);
        let mut contexts = vec![Context::default(); 1 << template.context_bits()];
        decode_bitmap(
            &mut decoded,
            &mut decoder,
            &mut contexts,
            template,
            tpgdon,
            &at_pixels,
        )
        .unwrap();

        assert_eq!(&decoded, bitmap);
    }

    fn rectangle_bitmap() -> Bitmap {
        let mut bitmap = Bitmap::new(64, 48).unwrap();
        for y in 10..40 {
            for x in 5..50 {
                bitmap.set_pixel(x, y, true).unwrap();
            }
        }
        bitmap
    }

    fn textured_bitmap() -> Bitmap {
        let mut bitmap = Bitmap::new(61, 37).unwrap();
        let mut state = 0xDEAD_BEEF_u32;
        for y in 0..37 {
            for x in 0..61 {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                if state >> 30 == 0 {
                    bitmap.set_pixel(x, y, true).unwrap();
                }
            }
        }
        bitmap
    }

    #[test]
    fn rectangle_round_trips_on_all_templates() {
        let bitmap = rectangle_bitmap();
        for template in [
            Template::Template0,
            Template::Template1,
            Template::Template2,
            Template::Template3,
        ] {
            round_trip(&bitmap, template, false);
        }
    }

    #[test]
    fn duplicated_line_removal_round_trips() {
        // The rectangle has long runs of identical rows, so TPGDON elides
        // most of them.
        round_trip(&rectangle_bitmap(), Template::Template0, true);
        round_trip(&textured_bitmap(), Template::Template0, true);
    }

    #[test]
    fn texture_round_trips() {
        round_trip(&textured_bitmap(), Template::Template0, false);
        round_trip(&textured_bitmap(), Template::Template2, false);
    }

    #[test]
    fn all_white_and_all_black_round_trip() {
        round_trip(&Bitmap::new(33, 9).unwrap(), Template::Template0, true);
        round_trip(
            &Bitmap::filled(33, 9, true).unwrap(),
            Template::Template0,
            false,
        );
    }
}
