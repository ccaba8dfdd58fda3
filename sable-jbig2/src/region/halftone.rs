//! Halftone region decoding (6.6, 7.4.5): a grid of gray-scale values
//! selecting patterns from a dictionary, rendered along a possibly skewed
//! lattice.

use crate::bitmap::{Bitmap, CombinationOperator};
use crate::error::{ErrorKind, Result, bail};
use crate::reader::Reader;
use crate::region::grayscale::{GrayScaleParams, decode_gray_scale_image};
use crate::region::pattern::PatternDictionary;
use crate::region::{RegionBitmap, RegionSegmentInfo, Template, parse_region_segment_info};

#[derive(Debug, Clone)]
struct HalftoneRegionHeader {
    region_info: RegionSegmentInfo,
    mmr: bool,
    template: Template,
    enable_skip: bool,
    combination_operator: CombinationOperator,
    /// The initial value of every region pixel.
    default_pixel: bool,
    /// HGW and HGH: the grid dimensions.
    grid_width: u32,
    grid_height: u32,
    /// HGX and HGY: the signed offset of the first grid cell, in 1/256
    /// pixel units already applied by the caller via [`GridCursor`].
    grid_x_offset: i32,
    grid_y_offset: i32,
    /// HRX and HRY: 256 times the grid vector.
    vector_x: u16,
    vector_y: u16,
}

fn parse(reader: &mut Reader<'_>) -> Result<HalftoneRegionHeader> {
    let region_info = parse_region_segment_info(reader)?;

    // 7.4.5.1.1: bit 0 MMR, bits 1-2 HTEMPLATE, bit 3 HENABLESKIP,
    // bits 4-6 HCOMBOP, bit 7 HDEFPIXEL.
    let flags = reader.read_byte().ok_or(ErrorKind::IoExhausted)?;
    let mmr = flags & 0x01 != 0;
    let template = Template::from_byte(flags >> 1);
    let enable_skip = flags & 0x08 != 0;
    let combination_operator = CombinationOperator::from_value((flags >> 4) & 0x07)?;
    let default_pixel = flags & 0x80 != 0;

    let grid_width = reader.read_u32().ok_or(ErrorKind::IoExhausted)?;
    let grid_height = reader.read_u32().ok_or(ErrorKind::IoExhausted)?;
    let grid_x_offset = reader.read_i32().ok_or(ErrorKind::IoExhausted)?;
    let grid_y_offset = reader.read_i32().ok_or(ErrorKind::IoExhausted)?;
    let vector_x = reader.read_u16().ok_or(ErrorKind::IoExhausted)?;
    let vector_y = reader.read_u16().ok_or(ErrorKind::IoExhausted)?;

    Ok(HalftoneRegionHeader {
        region_info,
        mmr,
        template,
        enable_skip,
        combination_operator,
        default_pixel,
        grid_width,
        grid_height,
        grid_x_offset,
        grid_y_offset,
        vector_x,
        vector_y,
    })
}

/// Walks the halftone lattice in 1/256 pixel fixed point (6.6.5.2).
struct GridCursor {
    x: i64,
    y: i64,
    row_x: i64,
    row_y: i64,
    vector_x: i64,
    vector_y: i64,
}

impl GridCursor {
    fn new(header: &HalftoneRegionHeader) -> Self {
        Self {
            x: header.grid_x_offset as i64,
            y: header.grid_y_offset as i64,
            row_x: header.grid_x_offset as i64,
            row_y: header.grid_y_offset as i64,
            vector_x: header.vector_x as i64,
            vector_y: header.vector_y as i64,
        }
    }

    #[inline]
    fn position(&self) -> (i32, i32) {
        ((self.x >> 8) as i32, (self.y >> 8) as i32)
    }

    #[inline]
    fn advance_column(&mut self) {
        self.x += self.vector_x;
        self.y -= self.vector_y;
    }

    #[inline]
    fn advance_row(&mut self) {
        self.row_x += self.vector_y;
        self.row_y += self.vector_x;
        self.x = self.row_x;
        self.y = self.row_y;
    }
}

/// Decode a halftone region segment body (6.6.5) against a previously
/// decoded pattern dictionary.
pub(crate) fn decode_halftone_region(
    reader: &mut Reader<'_>,
    patterns: &PatternDictionary,
) -> Result<RegionBitmap> {
    let header = parse(reader)?;

    if patterns.patterns.is_empty() {
        bail!(ErrorKind::Malformed("empty pattern dictionary"));
    }

    let mut region = Bitmap::filled(
        header.region_info.width,
        header.region_info.height,
        header.default_pixel,
    )?;

    // A degenerate grid selects nothing.
    if header.grid_width == 0 || header.grid_height == 0 {
        return Ok(RegionBitmap::new(region, &header.region_info));
    }

    // HSKIP marks grid cells whose pattern lies entirely outside the
    // region (6.6.5.1).
    let skip_mask = if header.enable_skip {
        Some(compute_skip_mask(&header, patterns)?)
    } else {
        None
    };

    // HBPP = ceil(log2(HNUMPATS)) (6.6.5 step 3).
    let bits_per_pixel = (patterns.patterns.len() as u32)
        .saturating_sub(1)
        .checked_ilog2()
        .map_or(1, |n| n + 1);

    let gray_params = GrayScaleParams {
        use_mmr: header.mmr,
        bits_per_pixel,
        width: header.grid_width,
        height: header.grid_height,
        template: header.template,
        skip_mask: skip_mask.as_ref(),
    };
    let data = reader.tail().ok_or(ErrorKind::IoExhausted)?;
    let gray_values = decode_gray_scale_image(data, &gray_params)?;

    // Render the pattern picked by each gray value along the lattice
    // (6.6.5 step 5).
    let mut cursor = GridCursor::new(&header);
    let mut value_idx = 0;
    for _ in 0..header.grid_height {
        for _ in 0..header.grid_width {
            let (x, y) = cursor.position();

            let pattern_index = gray_values[value_idx] as usize;
            value_idx += 1;

            let pattern = patterns
                .patterns
                .get(pattern_index)
                .ok_or(ErrorKind::Malformed("gray value exceeds pattern count"))?;

            region.combine_at(pattern, x, y, header.combination_operator);

            cursor.advance_column();
        }
        cursor.advance_row();
    }

    Ok(RegionBitmap::new(region, &header.region_info))
}

/// Compute HSKIP (6.6.5.1).
fn compute_skip_mask(
    header: &HalftoneRegionHeader,
    patterns: &PatternDictionary,
) -> Result<Bitmap> {
    let pattern_width = patterns.pattern_width as i32;
    let pattern_height = patterns.pattern_height as i32;
    let region_width = header.region_info.width as i32;
    let region_height = header.region_info.height as i32;

    let mut skip = Bitmap::new(header.grid_width, header.grid_height)?;
    let mut cursor = GridCursor::new(header);

    for m in 0..header.grid_height {
        for n in 0..header.grid_width {
            let (x, y) = cursor.position();

            let outside = x + pattern_width <= 0
                || x >= region_width
                || y + pattern_height <= 0
                || y >= region_height;

            if outside {
                skip.set(n, m, true);
            }

            cursor.advance_column();
        }
        cursor.advance_row();
    }

    Ok(skip)
}
