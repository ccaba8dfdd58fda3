//! Connected-component extraction.
//!
//! Components come back in scan order (top-to-bottom, then left-to-right by
//! first foreground pixel), each as a bounding box plus a tightly cropped
//! bitmap. The classifier feeds on these.

use crate::bitmap::Bitmap;
use crate::error::Result;
use crate::morph::{Sel, close};

/// An integer rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// What counts as one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentKind {
    /// Plain 8-connected components.
    #[default]
    ConnComps,
    /// Components after closing small vertical gaps, so broken glyphs and
    /// dotted letters come back in one piece.
    Characters,
    /// Characters additionally merged across small horizontal gaps.
    Words,
}

/// A component: its page-coordinate bounding box and cropped pixels.
#[derive(Debug, Clone)]
pub struct Component {
    /// Bounding box in page coordinates.
    pub bounds: Rect,
    /// The component's pixels, cropped to the bounding box.
    pub bitmap: Bitmap,
}

/// Extract the components of `page`, discarding any wider than `max_width`
/// or taller than `max_height`.
pub fn connected_components(
    page: &Bitmap,
    kind: ComponentKind,
    max_width: u32,
    max_height: u32,
) -> Result<Vec<Component>> {
    let components = match kind {
        ComponentKind::ConnComps => raw_components(page),
        ComponentKind::Characters => {
            let mask = close_unclipped(page, &[Sel::brick(1, 6)?])?;
            masked_components(page, &mask)?
        }
        ComponentKind::Words => {
            let mask = close_unclipped(page, &[Sel::brick(1, 6)?, Sel::brick(10, 1)?])?;
            masked_components(page, &mask)?
        }
    };

    Ok(components
        .into_iter()
        .filter(|c| c.bounds.width <= max_width && c.bounds.height <= max_height)
        .collect())
}

/// Apply a sequence of closings on a bordered copy so the erosion step
/// cannot clip merged coverage at the frame edges, then crop back.
fn close_unclipped(page: &Bitmap, sels: &[Sel]) -> Result<Bitmap> {
    const PAD: u32 = 8;

    let mut mask = page.add_border(PAD, PAD, PAD, PAD)?;
    for sel in sels {
        mask = close(&mask, sel)?;
    }
    mask.crop(PAD, PAD, page.width(), page.height())
}

/// Label the 8-connected components of `bitmap` in scan order.
fn raw_components(bitmap: &Bitmap) -> Vec<Component> {
    let width = bitmap.width();
    let height = bitmap.height();
    let mut visited = vec![false; (width as usize) * (height as usize)];
    let mut components = Vec::new();
    let mut stack: Vec<(u32, u32)> = Vec::new();
    let mut pixels: Vec<(u32, u32)> = Vec::new();

    for y in 0..height {
        for x in 0..width {
            let idx = (y * width + x) as usize;
            if visited[idx] || !bitmap.get(x, y) {
                continue;
            }

            // Flood-fill one component, tracking its bounding box.
            pixels.clear();
            stack.push((x, y));
            visited[idx] = true;
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (x, y, x, y);

            while let Some((px, py)) = stack.pop() {
                pixels.push((px, py));
                min_x = min_x.min(px);
                max_x = max_x.max(px);
                min_y = min_y.min(py);
                max_y = max_y.max(py);

                for dy in -1_i32..=1 {
                    for dx in -1_i32..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = px as i32 + dx;
                        let ny = py as i32 + dy;
                        if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                            continue;
                        }
                        let (nx, ny) = (nx as u32, ny as u32);
                        let nidx = (ny * width + nx) as usize;
                        if !visited[nidx] && bitmap.get(nx, ny) {
                            visited[nidx] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }

            let bounds = Rect {
                x: min_x,
                y: min_y,
                width: max_x - min_x + 1,
                height: max_y - min_y + 1,
            };

            // The fill cannot fail: the bounds are non-degenerate by
            // construction.
            let mut component =
                Bitmap::new(bounds.width, bounds.height).expect("non-empty component bounds");
            for &(px, py) in &pixels {
                component.set(px - min_x, py - min_y, true);
            }

            components.push(Component {
                bounds,
                bitmap: component,
            });
        }
    }

    components
}

/// Label the components of `mask`, then clip each one back to the original
/// pixels so the closing used for merging never leaks into the output.
fn masked_components(page: &Bitmap, mask: &Bitmap) -> Result<Vec<Component>> {
    let merged = raw_components(mask);
    let mut components = Vec::with_capacity(merged.len());

    for region in merged {
        let bounds = region.bounds;
        let mut clipped = page.crop(bounds.x, bounds.y, bounds.width, bounds.height)?;
        // Keep only the page pixels covered by this mask component; a
        // neighbouring component may intrude into the bounding box.
        for y in 0..bounds.height {
            for x in 0..bounds.width {
                if !region.bitmap.get(x, y) {
                    clipped.set(x, y, false);
                }
            }
        }

        if clipped.count_ones() == 0 {
            continue;
        }

        components.push(Component {
            bounds,
            bitmap: clipped,
        });
    }

    Ok(components)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw(bitmap: &mut Bitmap, points: &[(u32, u32)]) {
        for &(x, y) in points {
            bitmap.set_pixel(x, y, true).unwrap();
        }
    }

    #[test]
    fn components_come_back_in_scan_order() {
        let mut page = Bitmap::new(20, 10).unwrap();
        // Three blobs: top-right, middle-left, bottom-centre.
        draw(&mut page, &[(15, 1), (16, 1), (16, 2)]);
        draw(&mut page, &[(2, 4), (3, 5)]);
        draw(&mut page, &[(9, 8)]);

        let comps = connected_components(&page, ComponentKind::ConnComps, 20, 10).unwrap();
        assert_eq!(comps.len(), 3);
        assert_eq!(comps[0].bounds, Rect { x: 15, y: 1, width: 2, height: 2 });
        assert_eq!(comps[1].bounds, Rect { x: 2, y: 4, width: 2, height: 2 });
        assert_eq!(comps[2].bounds, Rect { x: 9, y: 8, width: 1, height: 1 });
    }

    #[test]
    fn diagonal_pixels_are_one_component() {
        let mut page = Bitmap::new(8, 8).unwrap();
        draw(&mut page, &[(1, 1), (2, 2), (3, 3)]);

        let comps = connected_components(&page, ComponentKind::ConnComps, 8, 8).unwrap();
        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].bitmap.count_ones(), 3);
    }

    #[test]
    fn oversized_components_are_discarded() {
        let mut page = Bitmap::new(30, 10).unwrap();
        for x in 0..20 {
            page.set_pixel(x, 2, true).unwrap();
        }
        draw(&mut page, &[(25, 7)]);

        let comps = connected_components(&page, ComponentKind::ConnComps, 10, 10).unwrap();
        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].bounds.x, 25);
    }

    #[test]
    fn characters_merge_a_dotted_glyph() {
        let mut page = Bitmap::new(10, 12).unwrap();
        // A dot two rows above a stem, like an 'i'.
        draw(&mut page, &[(4, 2)]);
        draw(&mut page, &[(4, 5), (4, 6), (4, 7), (4, 8)]);

        let raw = connected_components(&page, ComponentKind::ConnComps, 10, 12).unwrap();
        assert_eq!(raw.len(), 2);

        let chars = connected_components(&page, ComponentKind::Characters, 10, 12).unwrap();
        assert_eq!(chars.len(), 1);
        // The merged component keeps only original pixels.
        assert_eq!(chars[0].bitmap.count_ones(), 5);
    }

    #[test]
    fn words_merge_adjacent_characters() {
        let mut page = Bitmap::new(24, 8).unwrap();
        for x in [3, 4, 9, 10] {
            for y in 2..6 {
                page.set_pixel(x, y, true).unwrap();
            }
        }

        let chars = connected_components(&page, ComponentKind::Characters, 24, 8).unwrap();
        assert_eq!(chars.len(), 2);

        let words = connected_components(&page, ComponentKind::Words, 24, 8).unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].bitmap.count_ones(), 16);
    }
}
