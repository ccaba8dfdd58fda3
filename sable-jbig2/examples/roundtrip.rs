//! Encode a synthetic page and decode it back, printing the stream size.

use sable_jbig2::{Bitmap, Document, Encoder, EncoderSettings, PageSettings};

fn main() {
    let mut page = Bitmap::new(256, 256).unwrap();
    for y in 20..80 {
        for x in 10..110 {
            page.set_pixel(x, y, true).unwrap();
        }
    }

    let mut encoder = Encoder::new(EncoderSettings::default());
    encoder
        .add_page(
            page.clone(),
            PageSettings {
                duplicated_lines_removal: true,
                ..PageSettings::default()
            },
        )
        .unwrap();
    let encoded = encoder.encode().unwrap();

    println!("Encoded 256x256 page into {} bytes", encoded.len());

    let mut document = Document::open(&encoded).unwrap();
    let decoded = document.get_page(1).unwrap();
    assert_eq!(decoded.bitmap(), &page);

    println!("Round trip OK");
}
