//! Document-level encode/decode round-trips in generic mode.

use sable_jbig2::{
    Bitmap, CancelToken, DecodeOptions, Document, EncodeMethod, Encoder, EncoderSettings,
    ErrorKind, PageSettings,
};

/// A 256x256 page with a single black rectangle at (10, 20) sized 100x80.
fn rectangle_page() -> Bitmap {
    let mut page = Bitmap::new(256, 256).unwrap();
    for y in 20..100 {
        for x in 10..110 {
            page.set_pixel(x, y, true).unwrap();
        }
    }
    page
}

fn checkerboard_page(width: u32, height: u32) -> Bitmap {
    let mut page = Bitmap::new(width, height).unwrap();
    for y in 0..height {
        for x in 0..width {
            if (x / 3 + y / 2) % 2 == 0 {
                page.set_pixel(x, y, true).unwrap();
            }
        }
    }
    page
}

fn encode_pages(pages: &[Bitmap], duplicated_lines_removal: bool, file_mode: bool) -> Vec<u8> {
    let mut encoder = Encoder::new(EncoderSettings {
        file_mode,
        method: EncodeMethod::Generic,
    });
    for page in pages {
        encoder
            .add_page(
                page.clone(),
                PageSettings {
                    duplicated_lines_removal,
                    ..PageSettings::default()
                },
            )
            .unwrap();
    }
    encoder.encode().unwrap()
}

#[test]
fn generic_region_rectangle_round_trips() {
    let page = rectangle_page();
    let encoded = encode_pages(std::slice::from_ref(&page), false, true);

    let mut document = Document::open(&encoded).unwrap();
    assert_eq!(document.page_count(), 1);
    assert_eq!(document.get_page(1).unwrap().bitmap(), &page);
}

#[test]
fn duplicated_line_removal_round_trips() {
    let page = rectangle_page();
    let plain = encode_pages(std::slice::from_ref(&page), false, true);
    let elided = encode_pages(std::slice::from_ref(&page), true, true);

    // The streams differ (the TPGDON flag alone changes the region header)
    // but both reproduce the page.
    assert_ne!(plain, elided);

    for encoded in [plain, elided] {
        let mut document = Document::open(&encoded).unwrap();
        assert_eq!(document.get_page(1).unwrap().bitmap(), &page);
    }
}

#[test]
fn multi_page_documents_round_trip() {
    let pages = [rectangle_page(), checkerboard_page(97, 55)];
    let encoded = encode_pages(&pages, false, true);

    let mut document = Document::open(&encoded).unwrap();
    assert_eq!(document.page_count(), 2);
    // Decode out of order: page state must not leak between pages.
    assert_eq!(document.get_page(2).unwrap().bitmap(), &pages[1]);
    assert_eq!(document.get_page(1).unwrap().bitmap(), &pages[0]);
}

#[test]
fn embedded_organization_round_trips() {
    let page = checkerboard_page(64, 64);
    let encoded = encode_pages(std::slice::from_ref(&page), false, false);

    // No magic in embedded mode.
    assert!(!encoded.starts_with(&[0x97, 0x4A, 0x42, 0x32, 0x0D, 0x0A, 0x1A, 0x0A]));

    let mut document = Document::open(&encoded).unwrap();
    assert_eq!(document.get_page(1).unwrap().bitmap(), &page);
}

#[test]
fn encoder_output_is_deterministic() {
    let pages = [rectangle_page(), checkerboard_page(33, 77)];
    assert_eq!(encode_pages(&pages, true, true), encode_pages(&pages, true, true));
}

#[test]
fn truncated_stream_reports_io_exhausted_with_segment() {
    let encoded = encode_pages(&[rectangle_page()], false, true);
    let truncated = &encoded[..encoded.len() - 1];

    let err = Document::open(truncated).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoExhausted);
    assert!(err.segment().is_some());
}

#[test]
fn cancellation_stops_a_page_decode() {
    let encoded = encode_pages(&[rectangle_page()], false, true);

    let cancel = CancelToken::new();
    cancel.cancel();

    let mut document = Document::open_with_options(
        &encoded,
        None,
        DecodeOptions {
            cancel,
            strict: false,
        },
    )
    .unwrap();

    let err = document.get_page(1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(err.page(), Some(1));
}

#[test]
fn page_lookup_out_of_range_fails() {
    let encoded = encode_pages(&[rectangle_page()], false, true);
    let mut document = Document::open(&encoded).unwrap();

    assert!(matches!(
        document.get_page(2).unwrap_err().kind(),
        ErrorKind::OutOfRange(_)
    ));
}

#[test]
fn page_reports_its_segments() {
    let encoded = encode_pages(&[rectangle_page()], false, true);
    let mut document = Document::open(&encoded).unwrap();

    let page = document.get_page(1).unwrap();
    assert_eq!(page.segments().len(), 3);

    let region = page
        .segments()
        .iter()
        .find(|info| info.segment_type == sable_jbig2::SegmentType::ImmediateGenericRegion)
        .unwrap();
    assert!(page.segment(region.segment_number).is_some());
}
