//! Template matching primitives: correlation scoring and the Hausdorff
//! tests used by the classifier.

use crate::bitmap::{Bitmap, CombinationOperator, PIXEL_SUM_TAB};

/// Whether two bitmaps are close enough in shape to be compared at all.
#[inline]
fn size_comparable(a: &Bitmap, b: &Bitmap, max_dw: u32, max_dh: u32) -> bool {
    a.width().abs_diff(b.width()) <= max_dw && a.height().abs_diff(b.height()) <= max_dh
}

/// A copy of `src` translated by `(dx, dy)` into a `width` x `height`
/// frame, everything else white.
fn shifted_into(src: &Bitmap, width: u32, height: u32, dx: i32, dy: i32) -> Bitmap {
    let mut out = Bitmap::new(width, height).expect("frame dimensions are positive");
    out.combine_at(src, dx, dy, CombinationOperator::Or);
    out
}

/// Number of foreground pixels common to `a` and `b` shifted by `(dx, dy)`.
fn intersection_count(a: &Bitmap, b: &Bitmap, dx: i32, dy: i32) -> u32 {
    let b_aligned = shifted_into(b, a.width(), a.height(), dx, dy);
    a.data()
        .iter()
        .zip(b_aligned.data())
        .map(|(&x, &y)| PIXEL_SUM_TAB[(x & y) as usize] as u32)
        .sum()
}

/// Number of foreground pixels of `a` that fall outside `mask` shifted by
/// `(dx, dy)`.
fn outside_count(a: &Bitmap, mask: &Bitmap, dx: i32, dy: i32) -> u32 {
    let mask_aligned = shifted_into(mask, a.width(), a.height(), dx, dy);
    a.data()
        .iter()
        .zip(mask_aligned.data())
        .map(|(&x, &y)| PIXEL_SUM_TAB[(x & !y) as usize] as u32)
        .sum()
}

/// Number of pixels differing between `a` and `b` shifted by `(dx, dy)`
/// into `a`'s frame. Drives the final alignment search of the classifier.
pub(crate) fn xor_count(a: &Bitmap, b: &Bitmap, dx: i32, dy: i32) -> u32 {
    let b_aligned = shifted_into(b, a.width(), a.height(), dx, dy);
    a.data()
        .iter()
        .zip(b_aligned.data())
        .map(|(&x, &y)| PIXEL_SUM_TAB[(x ^ y) as usize] as u32)
        .sum()
}

/// The normalized correlation `|a cap b_shifted|^2 / (area_a * area_b)`.
///
/// Returns 0 when the widths or heights differ by more than the caps or
/// either area is empty.
pub fn correlation_score(
    a: &Bitmap,
    b: &Bitmap,
    area_a: u32,
    area_b: u32,
    dx: i32,
    dy: i32,
    max_dw: u32,
    max_dh: u32,
) -> f32 {
    if !size_comparable(a, b, max_dw, max_dh) || area_a == 0 || area_b == 0 {
        return 0.0;
    }

    let count = intersection_count(a, b, dx, dy) as f32;
    count * count / (area_a as f32 * area_b as f32)
}

/// Decide `correlation_score(..) >= threshold` without always evaluating
/// the full overlap.
///
/// `downcounts` must be `a.row_downcounts()`: after each row the remaining
/// foreground bounds the best achievable count, so a hopeless comparison
/// exits early. The result agrees exactly with comparing the full score.
pub fn correlation_score_thresholded(
    a: &Bitmap,
    b: &Bitmap,
    area_a: u32,
    area_b: u32,
    dx: i32,
    dy: i32,
    max_dw: u32,
    max_dh: u32,
    threshold: f32,
    downcounts: &[u32],
) -> bool {
    if !size_comparable(a, b, max_dw, max_dh) || area_a == 0 || area_b == 0 {
        return false;
    }
    debug_assert_eq!(downcounts.len(), a.height() as usize + 1);

    // score >= threshold  <=>  count^2 >= threshold * area_a * area_b.
    let required = threshold * area_a as f32 * area_b as f32;

    let b_aligned = shifted_into(b, a.width(), a.height(), dx, dy);
    let stride = a.stride() as usize;
    let mut count = 0_u32;

    for y in 0..a.height() {
        let start = y as usize * stride;
        let row_a = &a.data()[start..start + stride];
        let row_b = &b_aligned.data()[start..start + stride];
        count += row_a
            .iter()
            .zip(row_b)
            .map(|(&x, &m)| PIXEL_SUM_TAB[(x & m) as usize] as u32)
            .sum::<u32>();

        // Even matching every remaining pixel of `a` cannot reach the
        // threshold any more.
        let best = (count + downcounts[y as usize + 1]) as f32;
        if best * best < required {
            return false;
        }
    }

    let count = count as f32;
    count * count >= required
}

/// The bidirectional Hausdorff match: every foreground pixel of `a`,
/// shifted by `(dx, dy)`, must lie inside `b_dilated`, and every foreground
/// pixel of `b` inside `a_dilated`.
pub fn haus_test(
    a: &Bitmap,
    a_dilated: &Bitmap,
    b: &Bitmap,
    b_dilated: &Bitmap,
    dx: i32,
    dy: i32,
    max_dw: u32,
    max_dh: u32,
) -> bool {
    if !size_comparable(a, b, max_dw, max_dh) {
        return false;
    }

    outside_count(a, b_dilated, dx, dy) == 0 && outside_count(b, a_dilated, -dx, -dy) == 0
}

/// The rank generalization of [`haus_test`]: at least `rank * area_a` of
/// `a`'s pixels must fall inside `b_dilated`, and symmetrically for `b`.
pub fn rank_haus_test(
    a: &Bitmap,
    a_dilated: &Bitmap,
    b: &Bitmap,
    b_dilated: &Bitmap,
    dx: i32,
    dy: i32,
    max_dw: u32,
    max_dh: u32,
    area_a: u32,
    area_b: u32,
    rank: f32,
) -> bool {
    if !size_comparable(a, b, max_dw, max_dh) {
        return false;
    }

    let allowed_a = ((1.0 - rank) * area_a as f32 + 0.5) as u32;
    if outside_count(a, b_dilated, dx, dy) > allowed_a {
        return false;
    }

    let allowed_b = ((1.0 - rank) * area_b as f32 + 0.5) as u32;
    outside_count(b, a_dilated, -dx, -dy) <= allowed_b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morph::{Sel, dilate};

    fn glyph(points: &[(u32, u32)]) -> Bitmap {
        let mut bitmap = Bitmap::new(8, 8).unwrap();
        for &(x, y) in points {
            bitmap.set_pixel(x, y, true).unwrap();
        }
        bitmap
    }

    #[test]
    fn identical_bitmaps_score_one() {
        let a = glyph(&[(1, 1), (2, 2), (3, 3), (4, 2)]);
        let area = a.count_ones();

        let score = correlation_score(&a, &a, area, area, 0, 0, 2, 2);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn disjoint_bitmaps_score_zero() {
        let a = glyph(&[(1, 1), (2, 1)]);
        let b = glyph(&[(5, 5), (6, 5)]);

        let score = correlation_score(&a, &b, 2, 2, 0, 0, 2, 2);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn size_caps_zero_the_score() {
        let a = Bitmap::filled(4, 4, true).unwrap();
        let b = Bitmap::filled(8, 4, true).unwrap();

        assert_eq!(correlation_score(&a, &b, 16, 32, 0, 0, 2, 2), 0.0);
        assert_ne!(correlation_score(&a, &b, 16, 32, 0, 0, 4, 2), 0.0);
    }

    #[test]
    fn shift_aligns_the_overlap() {
        let a = glyph(&[(2, 2), (3, 2)]);
        let b = glyph(&[(4, 5), (5, 5)]);

        // b shifted by (-2, -3) lands exactly on a.
        let score = correlation_score(&a, &b, 2, 2, -2, -3, 2, 2);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn thresholded_agrees_with_exact_score() {
        let a = glyph(&[(1, 1), (2, 1), (3, 1), (1, 2), (2, 3)]);
        let b = glyph(&[(1, 1), (2, 1), (3, 2), (1, 2), (3, 3)]);
        let (area_a, area_b) = (a.count_ones(), b.count_ones());
        let downs = a.row_downcounts();

        for threshold in [0.4, 0.5, 0.7, 0.9, 0.98] {
            let exact = correlation_score(&a, &b, area_a, area_b, 0, 0, 2, 2) >= threshold;
            let fast = correlation_score_thresholded(
                &a, &b, area_a, area_b, 0, 0, 2, 2, threshold, &downs,
            );
            assert_eq!(exact, fast, "threshold {threshold}");
        }
    }

    #[test]
    fn haus_test_accepts_identical_and_rejects_distant() {
        let sel = Sel::brick(3, 3).unwrap();
        let a = glyph(&[(3, 3), (4, 3), (4, 4)]);
        let a_d = dilate(&a, &sel).unwrap();

        assert!(haus_test(&a, &a_d, &a, &a_d, 0, 0, 2, 2));

        // A glyph far outside the dilation in one direction.
        let b = glyph(&[(3, 3), (4, 3), (7, 7)]);
        let b_d = dilate(&b, &sel).unwrap();
        assert!(!haus_test(&a, &a_d, &b, &b_d, 0, 0, 2, 2));
    }

    #[test]
    fn rank_haus_tolerates_a_fraction_of_outliers() {
        let sel = Sel::brick(3, 3).unwrap();
        // Ten pixels, one of them a distant outlier.
        let mut points: Vec<(u32, u32)> = (0..9).map(|i| (i % 3, i / 3)).collect();
        points.push((7, 7));
        let a = glyph(&points);
        let b = glyph(&points[..9].to_vec());
        let a_d = dilate(&a, &sel).unwrap();
        let b_d = dilate(&b, &sel).unwrap();
        let (area_a, area_b) = (a.count_ones(), b.count_ones());

        assert!(!haus_test(&a, &a_d, &b, &b_d, 0, 0, 2, 2));
        assert!(rank_haus_test(
            &a, &a_d, &b, &b_d, 0, 0, 2, 2, area_a, area_b, 0.85
        ));
        assert!(!rank_haus_test(
            &a, &a_d, &b, &b_d, 0, 0, 2, 2, area_a, area_b, 1.0
        ));
    }
}
