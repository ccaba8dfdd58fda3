//! Gray-scale image decoding (T.88 Annex C): bit-plane decomposition with
//! gray coding, used by halftone regions to pick pattern indices.

use crate::arithmetic_decoder::{ArithmeticDecoder, Context};
use crate::bitmap::Bitmap;
use crate::error::Result;
use crate::region::generic::{decode_bitmap_mmr, decode_bitmap_skipped, nominal_adaptive_pixels};
use crate::region::Template;

/// The inputs of the gray-scale decoding procedure (Table C.1).
#[derive(Debug, Clone)]
pub(crate) struct GrayScaleParams<'a> {
    /// GSMMR: whether the planes are MMR coded.
    pub(crate) use_mmr: bool,
    /// GSBPP: bits per gray value.
    pub(crate) bits_per_pixel: u32,
    /// GSW and GSH.
    pub(crate) width: u32,
    pub(crate) height: u32,
    /// GSTEMPLATE.
    pub(crate) template: Template,
    /// GSKIP: grid cells that are never coded.
    pub(crate) skip_mask: Option<&'a Bitmap>,
}

/// Decode the gray-scale value array GSVALS (C.5), row-major.
pub(crate) fn decode_gray_scale_image(
    data: &[u8],
    params: &GrayScaleParams<'_>,
) -> Result<Vec<u32>> {
    let width = params.width;
    let height = params.height;
    let bits_per_pixel = params.bits_per_pixel;

    let size = (width as usize) * (height as usize);
    let mut values = vec![0_u32; size];
    if bits_per_pixel == 0 {
        return Ok(values);
    }

    // Shared coding state across all planes.
    let mut mmr_offset = 0_usize;
    let mut arith = if params.use_mmr {
        None
    } else {
        let contexts = vec![Context::default(); 1 << params.template.context_bits()];
        Some((ArithmeticDecoder::new(data), contexts))
    };
    let at_pixels = nominal_adaptive_pixels(params.template);

    let mut decode_plane = |offset: &mut usize| -> Result<Bitmap> {
        let mut plane = Bitmap::new(width, height)?;
        if params.use_mmr {
            *offset += decode_bitmap_mmr(&mut plane, &data[*offset..])?;
        } else {
            let (decoder, contexts) = arith.as_mut().expect("arithmetic state");
            decode_bitmap_skipped(
                &mut plane,
                decoder,
                contexts,
                params.template,
                false,
                &at_pixels,
                params.skip_mask,
            )?;
        }
        Ok(plane)
    };

    // The most significant plane contributes directly (C.5 step 1).
    let mut prev_plane = decode_plane(&mut mmr_offset)?;
    accumulate_plane(&mut values, &prev_plane, bits_per_pixel - 1);

    // Each lower plane is gray-decoded against the plane above it
    // (C.5 step 3c), XOR-ing whole bytes at a time.
    for bit in (0..bits_per_pixel - 1).rev() {
        let mut plane = decode_plane(&mut mmr_offset)?;

        // Gray decoding XORs whole bytes; padding stays zero since both
        // operands keep it zero.
        for (byte, &prev) in plane.data_mut().iter_mut().zip(prev_plane.data()) {
            *byte ^= prev;
        }

        accumulate_plane(&mut values, &plane, bit);
        prev_plane = plane;
    }

    Ok(values)
}

fn accumulate_plane(values: &mut [u32], plane: &Bitmap, bit: u32) {
    for y in 0..plane.height() {
        for x in 0..plane.width() {
            if plane.get(x, y) {
                values[(y * plane.width() + x) as usize] |= 1 << bit;
            }
        }
    }
}
