/*!
A memory-safe JBIG2 codec: decoder, encoder and lossy symbol classifier.

`sable-jbig2` implements the bi-level image compression of ITU-T T.88
(ISO/IEC 14492), the format PDF documents use for scanned text pages.

# Decoding

```rust,no_run
use sable_jbig2::Document;

let data = std::fs::read("scan.jb2").unwrap();
let mut document = Document::open(&data).unwrap();
let page = document.get_page(1).unwrap();

println!("{}x{} page", page.bitmap().width(), page.bitmap().height());
```

Sequential, random-access and embedded organizations are handled; PDF
global streams go through [`Document::open_with_globals`].

# Encoding

[`Encoder`] produces standalone files or embedded streams, either as one
generic region per page (with optional duplicated-line removal) or in
symbolic mode, where the [`Classifier`] matches connected components into
a template dictionary by rank-Hausdorff or correlation scoring and pages
become text regions over a shared symbol dictionary.

# Safety

This crate forbids unsafe code via a crate-level attribute.
*/

#![forbid(unsafe_code)]

mod arithmetic_decoder;
mod arithmetic_encoder;
mod bitmap;
mod cancel;
mod classify;
mod component;
mod document;
mod encode;
mod error;
mod file;
mod huffman_table;
mod integer_decoder;
mod morph;
mod page_info;
mod reader;
mod region;
mod score;
mod segment;
mod symbol_id_decoder;
mod writer;

pub use bitmap::{Bitmap, CombinationOperator};
pub use cancel::CancelToken;
pub use classify::{Classifier, ClassifierSettings, Method};
pub use component::{Component, ComponentKind, Rect, connected_components};
pub use document::{DecodeOptions, Document, Page, SegmentInfo};
pub use encode::{EncodeMethod, Encoder, EncoderSettings, PageSettings};
pub use error::{Error, ErrorKind, Result};
pub use file::FileOrganization;
pub use morph::{Sel, SelCell, close, dilate, erode, hit_miss, open};
pub use score::{correlation_score, correlation_score_thresholded, haus_test, rank_haus_test};
pub use segment::SegmentType;

/// Decode the first page of a standalone JBIG2 stream.
pub fn decode(data: &[u8]) -> Result<Bitmap> {
    let mut document = Document::open(data)?;
    Ok(document.get_page(1)?.bitmap().clone())
}

/// Decode the first page of an embedded JBIG2 stream with optional global
/// segments (the PDF arrangement).
pub fn decode_embedded(data: &[u8], globals: Option<&[u8]>) -> Result<Bitmap> {
    let mut document = match globals {
        Some(globals) => Document::open_with_globals(data, globals)?,
        None => Document::open(data)?,
    };
    Ok(document.get_page(1)?.bitmap().clone())
}

#[cfg(feature = "image")]
impl Bitmap {
    /// Convert to an 8-bit grayscale image: foreground pixels are black.
    pub fn to_gray_image(&self) -> image::GrayImage {
        let mut buffer = Vec::with_capacity((self.width() * self.height()) as usize);
        for y in 0..self.height() {
            for x in 0..self.width() {
                buffer.push(if self.get_pixel(x, y).unwrap_or(false) {
                    0
                } else {
                    255
                });
            }
        }
        image::GrayImage::from_raw(self.width(), self.height(), buffer)
            .expect("buffer sized to the bitmap")
    }
}
