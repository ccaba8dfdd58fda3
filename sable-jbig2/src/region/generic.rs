//! Generic region decoding (6.2, 7.4.6): template-based arithmetic coding
//! of a bitmap one pixel at a time, or MMR coding via the CCITT codec.

use crate::arithmetic_decoder::{ArithmeticDecoder, Context};
use crate::bitmap::Bitmap;
use crate::error::{ErrorKind, Result, bail};
use crate::reader::Reader;
use crate::region::{
    AdaptivePixel, RegionBitmap, RegionSegmentInfo, Template, parse_adaptive_pixels,
    parse_region_segment_info,
};

/// A parsed generic region segment data header (7.4.6.1).
#[derive(Debug, Clone)]
pub(crate) struct GenericRegionHeader {
    pub(crate) region_info: RegionSegmentInfo,
    pub(crate) mmr: bool,
    pub(crate) template: Template,
    /// Typical prediction for generic direct coding.
    pub(crate) tpgdon: bool,
    pub(crate) adaptive_pixels: Vec<AdaptivePixel>,
}

/// Parse a generic region segment data header (7.4.6.1).
pub(crate) fn parse_generic_region_header(reader: &mut Reader<'_>) -> Result<GenericRegionHeader> {
    let region_info = parse_region_segment_info(reader)?;

    // 7.4.6.2: bit 0 MMR, bits 1-2 GBTEMPLATE, bit 3 TPGDON,
    // bit 4 EXTTEMPLATE, bits 5-7 reserved.
    let flags = reader.read_byte().ok_or(ErrorKind::IoExhausted)?;
    let mmr = flags & 0x01 != 0;
    let template = Template::from_byte(flags >> 1);
    let tpgdon = flags & 0x08 != 0;
    let ext_template = flags & 0x10 != 0;

    if flags & 0xE0 != 0 {
        bail!(ErrorKind::Malformed("reserved generic region flags set"));
    }
    if mmr && template != Template::Template0 {
        bail!(ErrorKind::Malformed("GBTEMPLATE must be 0 when MMR is 1"));
    }
    if ext_template {
        bail!(ErrorKind::Unsupported("12-pixel extended templates"));
    }

    let adaptive_pixels = if mmr {
        Vec::new()
    } else {
        parse_adaptive_pixels(reader, template)?
    };

    Ok(GenericRegionHeader {
        region_info,
        mmr,
        template,
        tpgdon,
        adaptive_pixels,
    })
}

/// Decode a generic region segment body.
///
/// An immediate generic region of unknown length stores the number of rows
/// actually decoded in its last four bytes; `unknown_length` selects that
/// handling (7.4.6.4).
pub(crate) fn decode_generic_region(
    reader: &mut Reader<'_>,
    unknown_length: bool,
) -> Result<RegionBitmap> {
    let mut header = parse_generic_region_header(reader)?;

    let mut encoded_data = reader.tail().ok_or(ErrorKind::IoExhausted)?;

    if unknown_length {
        if encoded_data.len() < 4 {
            bail!(ErrorKind::IoExhausted);
        }
        let row_count_bytes = &encoded_data[encoded_data.len() - 4..];
        let row_count = u32::from_be_bytes(row_count_bytes.try_into().expect("four bytes"));

        if row_count > header.region_info.height {
            bail!(ErrorKind::Malformed("row count exceeds region height"));
        }

        header.region_info.height = row_count;
        encoded_data = &encoded_data[..encoded_data.len() - 4];
    }

    let mut bitmap = Bitmap::new(header.region_info.width, header.region_info.height)?;

    if header.mmr {
        decode_bitmap_mmr(&mut bitmap, encoded_data)?;
    } else {
        let mut decoder = ArithmeticDecoder::new(encoded_data);
        let mut contexts = vec![Context::default(); 1 << header.template.context_bits()];
        decode_bitmap(
            &mut bitmap,
            &mut decoder,
            &mut contexts,
            header.template,
            header.tpgdon,
            &header.adaptive_pixels,
        )?;
    }

    Ok(RegionBitmap::new(bitmap, &header.region_info))
}

/// Writes CCITT-decoded runs into a [`Bitmap`].
struct BitmapSink<'a> {
    bitmap: &'a mut Bitmap,
    x: u32,
    y: u32,
}

impl sable_ccitt::RowSink for BitmapSink<'_> {
    fn push_run(&mut self, black: bool, len: u32) {
        if black {
            for x in self.x..self.x + len {
                self.bitmap.set(x, self.y, true);
            }
        }
        self.x += len;
    }

    fn end_row(&mut self) {
        self.x = 0;
        self.y += 1;
    }
}

/// Decode an MMR-coded bitmap (6.2.6): plain T.6 coding with black as 1,
/// consuming an integral number of bytes. The EOFB may be present but is
/// not required when the byte count is known.
pub(crate) fn decode_bitmap_mmr(bitmap: &mut Bitmap, data: &[u8]) -> Result<usize> {
    let settings = sable_ccitt::Settings {
        columns: bitmap.width(),
        rows: bitmap.height(),
        mode: sable_ccitt::Mode::Group4,
        end_of_line: false,
        encoded_byte_align: false,
        end_of_block: true,
        black_is_one: true,
    };

    let mut sink = BitmapSink { bitmap, x: 0, y: 0 };
    Ok(sable_ccitt::decode(data, &mut sink, &settings)?)
}

/// Decode an arithmetically coded bitmap (6.2.5) into `bitmap`, which
/// carries the region dimensions. Shared by generic regions, symbol
/// bitmaps, pattern dictionaries and gray-scale planes; the context slice
/// persists across calls so dictionaries keep their adaptivity.
pub(crate) fn decode_bitmap(
    bitmap: &mut Bitmap,
    decoder: &mut ArithmeticDecoder<'_>,
    contexts: &mut [Context],
    template: Template,
    tpgdon: bool,
    adaptive_pixels: &[AdaptivePixel],
) -> Result<()> {
    decode_bitmap_skipped(bitmap, decoder, contexts, template, tpgdon, adaptive_pixels, None)
}

/// [`decode_bitmap`] with an optional skip mask (USESKIP/SKIP of 6.2.5.7):
/// masked pixels are never coded and stay white.
pub(crate) fn decode_bitmap_skipped(
    bitmap: &mut Bitmap,
    decoder: &mut ArithmeticDecoder<'_>,
    contexts: &mut [Context],
    template: Template,
    tpgdon: bool,
    adaptive_pixels: &[AdaptivePixel],
    skip: Option<&Bitmap>,
) -> Result<()> {
    if adaptive_pixels.len() < template.adaptive_pixel_count() {
        bail!(ErrorKind::Malformed("missing adaptive template pixels"));
    }

    let width = bitmap.width();
    let height = bitmap.height();

    // LTP starts at 0 (6.2.5.7 step 1).
    let mut ltp = false;

    for y in 0..height {
        // With TPGDON a per-row decision bit toggles LTP; the pseudo-pixel
        // context depends on the template (Figures 8-11).
        if tpgdon {
            let sltp_context: u32 = match template {
                Template::Template0 => 0b1001101100100101,
                Template::Template1 => 0b0011110010101,
                Template::Template2 => 0b0011100101,
                Template::Template3 => 0b0110010101,
            };
            let sltp = decoder.decode(&mut contexts[sltp_context as usize]);
            ltp = ltp != (sltp != 0);
        }

        if ltp {
            // A typical row repeats the row above it; the first row stays
            // white.
            if y > 0 {
                for x in 0..width {
                    let above = bitmap.get(x, y - 1);
                    bitmap.set(x, y, above);
                }
            }
        } else {
            for x in 0..width {
                if let Some(mask) = skip {
                    if mask.get(x, y) {
                        continue;
                    }
                }

                let context = gather_context(bitmap, x, y, template, adaptive_pixels);
                let pixel = decoder.decode(&mut contexts[context as usize]);
                bitmap.set(x, y, pixel != 0);
            }
        }
    }

    Ok(())
}

/// Form the context integer for pixel `(x, y)` from the already-decoded
/// neighbourhood (6.2.5.3, 6.2.5.7). The encoder uses the same formation,
/// which is what makes encode/decode symmetric.
pub(crate) fn gather_context(
    bitmap: &Bitmap,
    x: u32,
    y: u32,
    template: Template,
    at: &[AdaptivePixel],
) -> u32 {
    let x = x as i32;
    let y = y as i32;

    match template {
        Template::Template0 => {
            let at1 = (at[0].x as i32, at[0].y as i32);
            let at2 = (at[1].x as i32, at[1].y as i32);
            let at3 = (at[2].x as i32, at[2].y as i32);
            let at4 = (at[3].x as i32, at[3].y as i32);

            let mut context = 0_u32;

            context = (context << 1) | bitmap.get_signed(x + at4.0, y + at4.1);
            context = (context << 1) | bitmap.get_signed(x - 1, y - 2);
            context = (context << 1) | bitmap.get_signed(x, y - 2);
            context = (context << 1) | bitmap.get_signed(x + 1, y - 2);
            context = (context << 1) | bitmap.get_signed(x + at3.0, y + at3.1);

            context = (context << 1) | bitmap.get_signed(x + at2.0, y + at2.1);
            context = (context << 1) | bitmap.get_signed(x - 2, y - 1);
            context = (context << 1) | bitmap.get_signed(x - 1, y - 1);
            context = (context << 1) | bitmap.get_signed(x, y - 1);
            context = (context << 1) | bitmap.get_signed(x + 1, y - 1);
            context = (context << 1) | bitmap.get_signed(x + 2, y - 1);
            context = (context << 1) | bitmap.get_signed(x + at1.0, y + at1.1);

            context = (context << 1) | bitmap.get_signed(x - 4, y);
            context = (context << 1) | bitmap.get_signed(x - 3, y);
            context = (context << 1) | bitmap.get_signed(x - 2, y);
            context = (context << 1) | bitmap.get_signed(x - 1, y);

            context
        }
        Template::Template1 => {
            let at1 = (at[0].x as i32, at[0].y as i32);

            let mut context = 0_u32;

            context = (context << 1) | bitmap.get_signed(x - 1, y - 2);
            context = (context << 1) | bitmap.get_signed(x, y - 2);
            context = (context << 1) | bitmap.get_signed(x + 1, y - 2);
            context = (context << 1) | bitmap.get_signed(x + 2, y - 2);

            context = (context << 1) | bitmap.get_signed(x - 2, y - 1);
            context = (context << 1) | bitmap.get_signed(x - 1, y - 1);
            context = (context << 1) | bitmap.get_signed(x, y - 1);
            context = (context << 1) | bitmap.get_signed(x + 1, y - 1);
            context = (context << 1) | bitmap.get_signed(x + 2, y - 1);
            context = (context << 1) | bitmap.get_signed(x + at1.0, y + at1.1);

            context = (context << 1) | bitmap.get_signed(x - 3, y);
            context = (context << 1) | bitmap.get_signed(x - 2, y);
            context = (context << 1) | bitmap.get_signed(x - 1, y);

            context
        }
        Template::Template2 => {
            let at1 = (at[0].x as i32, at[0].y as i32);

            let mut context = 0_u32;

            context = (context << 1) | bitmap.get_signed(x - 1, y - 2);
            context = (context << 1) | bitmap.get_signed(x, y - 2);
            context = (context << 1) | bitmap.get_signed(x + 1, y - 2);

            context = (context << 1) | bitmap.get_signed(x - 2, y - 1);
            context = (context << 1) | bitmap.get_signed(x - 1, y - 1);
            context = (context << 1) | bitmap.get_signed(x, y - 1);
            context = (context << 1) | bitmap.get_signed(x + 1, y - 1);
            context = (context << 1) | bitmap.get_signed(x + at1.0, y + at1.1);

            context = (context << 1) | bitmap.get_signed(x - 2, y);
            context = (context << 1) | bitmap.get_signed(x - 1, y);

            context
        }
        Template::Template3 => {
            let at1 = (at[0].x as i32, at[0].y as i32);

            let mut context = 0_u32;

            context = (context << 1) | bitmap.get_signed(x - 3, y - 1);
            context = (context << 1) | bitmap.get_signed(x - 2, y - 1);
            context = (context << 1) | bitmap.get_signed(x - 1, y - 1);
            context = (context << 1) | bitmap.get_signed(x, y - 1);
            context = (context << 1) | bitmap.get_signed(x + 1, y - 1);
            context = (context << 1) | bitmap.get_signed(x + at1.0, y + at1.1);

            context = (context << 1) | bitmap.get_signed(x - 4, y);
            context = (context << 1) | bitmap.get_signed(x - 3, y);
            context = (context << 1) | bitmap.get_signed(x - 2, y);
            context = (context << 1) | bitmap.get_signed(x - 1, y);

            context
        }
    }
}

/// The default adaptive pixel positions for a nominal template, used by the
/// encoder and by gray-scale decoding (Table C.4).
pub(crate) fn nominal_adaptive_pixels(template: Template) -> Vec<AdaptivePixel> {
    match template {
        Template::Template0 => vec![
            AdaptivePixel { x: 3, y: -1 },
            AdaptivePixel { x: -3, y: -1 },
            AdaptivePixel { x: 2, y: -2 },
            AdaptivePixel { x: -2, y: -2 },
        ],
        Template::Template1 => vec![AdaptivePixel { x: 3, y: -1 }],
        Template::Template2 | Template::Template3 => vec![AdaptivePixel { x: 2, y: -1 }],
    }
}
