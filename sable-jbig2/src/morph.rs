//! Binary morphology on [`Bitmap`]s.
//!
//! The classifier dilates its templates with small brick elements before
//! Hausdorff matching, and the component extractor closes glyph gaps before
//! labelling characters and words.

use crate::bitmap::{Bitmap, CombinationOperator};
use crate::error::{ErrorKind, Result, bail};

/// One cell of a structuring element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelCell {
    /// The input pixel must be foreground.
    Hit,
    /// The input pixel must be background (hit-miss transform only).
    Miss,
    /// The input pixel is ignored.
    DontCare,
}

/// A small 2-D mask with an anchor, used by the morphological operators.
#[derive(Debug, Clone)]
pub struct Sel {
    width: u32,
    height: u32,
    cx: u32,
    cy: u32,
    cells: Vec<SelCell>,
}

impl Sel {
    /// Create a structuring element from row-major cells and an anchor.
    pub fn new(width: u32, height: u32, cx: u32, cy: u32, cells: Vec<SelCell>) -> Result<Self> {
        if width == 0 || height == 0 || cells.len() != (width * height) as usize {
            bail!(ErrorKind::OutOfRange("structuring element shape mismatch"));
        }
        if cx >= width || cy >= height {
            bail!(ErrorKind::OutOfRange("structuring element anchor outside"));
        }
        Ok(Self {
            width,
            height,
            cx,
            cy,
            cells,
        })
    }

    /// A solid rectangle of hits with a centred anchor.
    pub fn brick(width: u32, height: u32) -> Result<Self> {
        Self::new(
            width,
            height,
            width / 2,
            height / 2,
            vec![SelCell::Hit; (width * height) as usize],
        )
    }

    /// Iterate the offsets of one cell kind relative to the anchor.
    fn offsets(&self, kind: SelCell) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(move |&(_, &cell)| cell == kind)
            .map(|(i, _)| {
                let dx = (i as u32 % self.width) as i32 - self.cx as i32;
                let dy = (i as u32 / self.width) as i32 - self.cy as i32;
                (dx, dy)
            })
    }
}

/// A copy of `src` translated by `(dx, dy)`, clipped to the original frame.
fn shifted(src: &Bitmap, dx: i32, dy: i32) -> Result<Bitmap> {
    let mut out = Bitmap::new(src.width(), src.height())?;
    out.combine_at(src, dx, dy, CombinationOperator::Or);
    Ok(out)
}

/// Dilate: a hit cell at offset `(dx, dy)` lights the pixel at
/// `(x + dx - cx, y + dy - cy)` for every foreground pixel `(x, y)`.
pub fn dilate(src: &Bitmap, sel: &Sel) -> Result<Bitmap> {
    let mut out = Bitmap::new(src.width(), src.height())?;
    for (dx, dy) in sel.offsets(SelCell::Hit) {
        out.combine_at(src, dx, dy, CombinationOperator::Or);
    }
    Ok(out)
}

/// Erode: a pixel survives iff the whole translated element fits in the
/// foreground. Pixels outside the frame count as background, so erosion
/// shrinks at the borders.
pub fn erode(src: &Bitmap, sel: &Sel) -> Result<Bitmap> {
    let mut out = Bitmap::filled(src.width(), src.height(), true)?;
    for (dx, dy) in sel.offsets(SelCell::Hit) {
        let translated = shifted(src, -dx, -dy)?;
        out.combine_at(&translated, 0, 0, CombinationOperator::And);
    }
    Ok(out)
}

/// Erosion followed by dilation.
pub fn open(src: &Bitmap, sel: &Sel) -> Result<Bitmap> {
    dilate(&erode(src, sel)?, sel)
}

/// Dilation followed by erosion.
pub fn close(src: &Bitmap, sel: &Sel) -> Result<Bitmap> {
    erode(&dilate(src, sel)?, sel)
}

/// Hit-miss transform: hits must be foreground and misses background.
pub fn hit_miss(src: &Bitmap, sel: &Sel) -> Result<Bitmap> {
    let mut out = Bitmap::filled(src.width(), src.height(), true)?;
    for (dx, dy) in sel.offsets(SelCell::Hit) {
        let translated = shifted(src, -dx, -dy)?;
        out.combine_at(&translated, 0, 0, CombinationOperator::And);
    }
    for (dx, dy) in sel.offsets(SelCell::Miss) {
        let mut translated = shifted(src, -dx, -dy)?;
        translated.invert();
        out.combine_at(&translated, 0, 0, CombinationOperator::And);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_pixel(w: u32, h: u32, x: u32, y: u32) -> Bitmap {
        let mut bitmap = Bitmap::new(w, h).unwrap();
        bitmap.set_pixel(x, y, true).unwrap();
        bitmap
    }

    #[test]
    fn dilate_single_pixel_with_brick() {
        let src = single_pixel(7, 7, 3, 3);
        let out = dilate(&src, &Sel::brick(3, 3).unwrap()).unwrap();

        assert_eq!(out.count_ones(), 9);
        for y in 2..5 {
            for x in 2..5 {
                assert_eq!(out.get_pixel(x, y), Ok(true));
            }
        }
    }

    #[test]
    fn erode_undoes_dilation_of_isolated_pixel() {
        let sel = Sel::brick(3, 3).unwrap();
        let src = single_pixel(9, 9, 4, 4);

        let opened = erode(&dilate(&src, &sel).unwrap(), &sel).unwrap();
        assert_eq!(opened, src);
    }

    #[test]
    fn erosion_shrinks_at_borders() {
        let sel = Sel::brick(3, 3).unwrap();
        let src = Bitmap::filled(5, 5, true).unwrap();

        let eroded = erode(&src, &sel).unwrap();
        assert_eq!(eroded.count_ones(), 9);
        assert!(!eroded.get(0, 2));
        assert!(eroded.get(2, 2));
    }

    #[test]
    fn close_bridges_a_one_pixel_gap() {
        let mut src = Bitmap::new(9, 3).unwrap();
        src.set_pixel(2, 1, true).unwrap();
        src.set_pixel(4, 1, true).unwrap();

        let closed = close(&src, &Sel::brick(3, 1).unwrap()).unwrap();
        assert!(closed.get(3, 1));
    }

    #[test]
    fn hit_miss_finds_isolated_pixels() {
        let mut cells = vec![SelCell::Miss; 9];
        cells[4] = SelCell::Hit;
        let sel = Sel::new(3, 3, 1, 1, cells).unwrap();

        let mut src = Bitmap::new(8, 8).unwrap();
        src.set_pixel(2, 2, true).unwrap();
        src.set_pixel(5, 5, true).unwrap();
        src.set_pixel(5, 6, true).unwrap();

        let out = hit_miss(&src, &sel).unwrap();
        assert!(out.get(2, 2));
        assert!(!out.get(5, 5));
        assert!(!out.get(5, 6));
    }
}
