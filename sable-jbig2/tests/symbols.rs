//! Classifier behaviour and symbolic-mode round-trips.

use sable_jbig2::{
    Bitmap, Classifier, ClassifierSettings, Document, EncodeMethod, Encoder, EncoderSettings,
    Method, PageSettings,
};

/// Draw a small 'e'-like glyph with its top-left corner at (x, y).
fn draw_glyph(page: &mut Bitmap, x: u32, y: u32) {
    let strokes: [(u32, u32); 14] = [
        (1, 0),
        (2, 0),
        (0, 1),
        (3, 1),
        (0, 2),
        (1, 2),
        (2, 2),
        (3, 2),
        (0, 3),
        (0, 4),
        (3, 4),
        (1, 5),
        (2, 5),
        (3, 5),
    ];
    for &(dx, dy) in &strokes {
        page.set_pixel(x + dx, y + dy, true).unwrap();
    }
}

/// A page with the same glyph at 50 positions.
fn glyph_page() -> Bitmap {
    let mut page = Bitmap::new(200, 120).unwrap();
    for i in 0..50_u32 {
        let x = 5 + (i % 10) * 19;
        let y = 5 + (i / 10) * 22;
        draw_glyph(&mut page, x, y);
    }
    page
}

fn correlation_settings() -> ClassifierSettings {
    ClassifierSettings {
        method: Method::Correlation,
        threshold: 0.9,
        weight_factor: 0.0,
        ..ClassifierSettings::default()
    }
}

#[test]
fn identical_glyphs_collapse_into_one_class() {
    for method in [Method::Correlation, Method::RankHaus] {
        let settings = ClassifierSettings {
            method,
            threshold: 0.9,
            rank_haus: 1.0,
            weight_factor: 0.0,
            ..ClassifierSettings::default()
        };

        let mut classifier = Classifier::new(settings).unwrap();
        classifier.add_page(&glyph_page(), 1, method).unwrap();

        assert_eq!(classifier.num_classes(), 1, "{method:?}");
        assert_eq!(classifier.num_components(), 50, "{method:?}");
        assert!(classifier.class_ids().iter().all(|&id| id == 0));
    }
}

#[test]
fn classification_is_stable_across_runs() {
    let mut first = Classifier::new(correlation_settings()).unwrap();
    first.add_page(&glyph_page(), 1, Method::Correlation).unwrap();

    let mut second = Classifier::new(correlation_settings()).unwrap();
    second.add_page(&glyph_page(), 1, Method::Correlation).unwrap();

    assert_eq!(first.class_ids(), second.class_ids());
    assert_eq!(first.ul_corners(), second.ul_corners());
}

#[test]
fn distinct_glyphs_get_distinct_classes() {
    let mut page = Bitmap::new(64, 32).unwrap();
    draw_glyph(&mut page, 4, 4);
    // A solid block has nothing in common with the glyph.
    for y in 4..10 {
        for x in 20..26 {
            page.set_pixel(x, y, true).unwrap();
        }
    }

    let mut classifier = Classifier::new(correlation_settings()).unwrap();
    classifier.add_page(&page, 1, Method::Correlation).unwrap();

    assert_eq!(classifier.num_classes(), 2);
    assert_eq!(classifier.num_components(), 2);
}

#[test]
fn ul_corners_match_identical_placements() {
    let mut classifier = Classifier::new(correlation_settings()).unwrap();
    classifier.add_page(&glyph_page(), 1, Method::Correlation).unwrap();

    // Identical glyphs align exactly on their bounding boxes.
    let corners = classifier.ul_corners();
    assert_eq!(corners.len(), 50);
    assert_eq!(corners[0], (5, 5));
    assert_eq!(corners[1], (24, 5));
}

#[test]
fn ll_corners_hang_from_ul_corners() {
    let mut classifier = Classifier::new(correlation_settings()).unwrap();
    classifier.add_page(&glyph_page(), 1, Method::Correlation).unwrap();
    classifier.compute_ll_corners();

    // The glyph is 6 rows tall.
    assert_eq!(classifier.ll_corners()[0], (5, 11));
}

#[test]
fn settings_ranges_are_validated() {
    let bad_threshold = ClassifierSettings {
        threshold: 0.2,
        ..ClassifierSettings::default()
    };
    assert!(Classifier::new(bad_threshold).is_err());

    let bad_haus = ClassifierSettings {
        size_haus: 11,
        ..ClassifierSettings::default()
    };
    assert!(Classifier::new(bad_haus).is_err());

    let bad_rank = ClassifierSettings {
        rank_haus: 0.3,
        ..ClassifierSettings::default()
    };
    assert!(Classifier::new(bad_rank).is_err());
}

#[test]
fn symbolic_mode_round_trips_identical_glyphs() {
    let page = glyph_page();

    let mut encoder = Encoder::new(EncoderSettings {
        file_mode: true,
        method: EncodeMethod::Symbols(correlation_settings()),
    });
    encoder.add_page(page.clone(), PageSettings::default()).unwrap();
    let encoded = encoder.encode().unwrap();

    let mut document = Document::open(&encoded).unwrap();
    let decoded = document.get_page(1).unwrap();

    // Every instance is an exact copy of the single class template, so the
    // lossy path reproduces this page exactly.
    assert_eq!(decoded.bitmap(), &page);
}

#[test]
fn symbolic_mode_round_trips_two_pages_over_one_dictionary() {
    let mut first = Bitmap::new(96, 40).unwrap();
    draw_glyph(&mut first, 8, 8);
    draw_glyph(&mut first, 30, 8);

    let mut second = Bitmap::new(96, 40).unwrap();
    draw_glyph(&mut second, 50, 20);

    let mut encoder = Encoder::new(EncoderSettings {
        file_mode: true,
        method: EncodeMethod::Symbols(correlation_settings()),
    });
    encoder.add_page(first.clone(), PageSettings::default()).unwrap();
    encoder.add_page(second.clone(), PageSettings::default()).unwrap();
    let encoded = encoder.encode().unwrap();

    // Page 2's text region refers to the same global dictionary segment
    // that page 1 used; the retained dictionary serves both.
    let mut document = Document::open(&encoded).unwrap();
    assert_eq!(document.get_page(1).unwrap().bitmap(), &first);
    assert_eq!(document.get_page(2).unwrap().bitmap(), &second);
}
