//! The JBIG2 encoder: bi-level pages in, a standards-conforming segment
//! stream out.

mod generic;
mod integers;
mod symbols;

pub(crate) use generic::encode_bitmap;

use crate::arithmetic_decoder::Context;
use crate::arithmetic_encoder::ArithmeticEncoder;
use crate::bitmap::{Bitmap, CombinationOperator};
use crate::classify::ClassifierSettings;
use crate::error::{ErrorKind, Result, bail};
use crate::file::FILE_HEADER_ID;
use crate::page_info::{PageFlags, PageInformation, PageStriping, write_page_information};
use crate::region::generic::nominal_adaptive_pixels;
use crate::region::{RegionSegmentInfo, Template, write_region_segment_info};
use crate::segment::{SegmentType, write_segment};
use crate::writer::Writer;

/// How page content is coded.
#[derive(Debug, Clone)]
pub enum EncodeMethod {
    /// One immediate generic region per page.
    Generic,
    /// Classify components into a shared symbol dictionary and emit one
    /// text region per page.
    Symbols(ClassifierSettings),
}

/// Document-level encoder settings.
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    /// With `file_mode`, the output is a standalone sequential file with
    /// the 8-byte magic and a file header; otherwise it is the embedded
    /// organization (segments only), as stored inside PDF streams.
    pub file_mode: bool,
    /// The coding method.
    pub method: EncodeMethod,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            file_mode: true,
            method: EncodeMethod::Generic,
        }
    }
}

/// Per-page encoder settings.
#[derive(Debug, Clone)]
pub struct PageSettings {
    /// Turn on typical prediction so runs of identical rows cost one bit
    /// per row.
    pub duplicated_lines_removal: bool,
    /// The initial value of every page pixel.
    pub default_pixel: u8,
    /// The operator combining regions onto the page. REPLACE is not a
    /// valid page default.
    pub default_combination_operator: CombinationOperator,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            duplicated_lines_removal: false,
            default_pixel: 0,
            default_combination_operator: CombinationOperator::Or,
        }
    }
}

/// Accumulates pages, then emits the whole stream at once.
///
/// Output is deterministic: identical pages and settings produce
/// byte-identical streams.
pub struct Encoder {
    settings: EncoderSettings,
    pages: Vec<(Bitmap, PageSettings)>,
}

impl Encoder {
    pub fn new(settings: EncoderSettings) -> Self {
        Self {
            settings,
            pages: Vec::new(),
        }
    }

    /// Queue a page for encoding.
    pub fn add_page(&mut self, bitmap: Bitmap, settings: PageSettings) -> Result<()> {
        if settings.default_combination_operator == CombinationOperator::Replace {
            bail!(ErrorKind::OutOfRange("REPLACE is not a page default"));
        }
        self.pages.push((bitmap, settings));
        Ok(())
    }

    /// Encode all queued pages.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new();

        if self.settings.file_mode {
            writer.write_bytes(&FILE_HEADER_ID);
            // Sequential organization, known page count.
            writer.write_byte(0x01);
            writer.write_u32(self.pages.len() as u32);
        }

        log::debug!(
            "encoding {} pages ({})",
            self.pages.len(),
            match self.settings.method {
                EncodeMethod::Generic => "generic regions",
                EncodeMethod::Symbols(_) => "symbol dictionary",
            }
        );

        let mut next_segment = 0_u32;
        match &self.settings.method {
            EncodeMethod::Generic => {
                for (index, (bitmap, page_settings)) in self.pages.iter().enumerate() {
                    let page_number = index as u32 + 1;
                    encode_generic_page(
                        &mut writer,
                        &mut next_segment,
                        bitmap,
                        page_settings,
                        page_number,
                    );
                }
            }
            EncodeMethod::Symbols(classifier_settings) => {
                symbols::encode_document(
                    &mut writer,
                    &mut next_segment,
                    &self.pages,
                    classifier_settings,
                )?;
            }
        }

        if self.settings.file_mode {
            write_segment(&mut writer, next_segment, SegmentType::EndOfFile, &[], 0, &[]);
        }

        Ok(writer.into_bytes())
    }
}

/// Emit a page information segment for one queued page.
pub(crate) fn write_page_info_segment(
    writer: &mut Writer,
    next_segment: &mut u32,
    bitmap: &Bitmap,
    settings: &PageSettings,
    page_number: u32,
) {
    let info = PageInformation {
        width: bitmap.width(),
        height: bitmap.height(),
        x_resolution: None,
        y_resolution: None,
        flags: PageFlags {
            is_lossless: true,
            might_contain_refinements: false,
            default_pixel: settings.default_pixel,
            default_combination_operator: settings.default_combination_operator,
            requires_auxiliary_buffers: false,
            combination_operator_overridden: false,
        },
        striping: PageStriping {
            is_striped: false,
            max_stripe_size: 0,
        },
    };

    let data = write_page_information(&info);
    write_segment(
        writer,
        *next_segment,
        SegmentType::PageInformation,
        &[],
        page_number,
        &data,
    );
    *next_segment += 1;
}

/// Emit one page as page information, an immediate generic region and an
/// end of page segment.
fn encode_generic_page(
    writer: &mut Writer,
    next_segment: &mut u32,
    bitmap: &Bitmap,
    settings: &PageSettings,
    page_number: u32,
) {
    write_page_info_segment(writer, next_segment, bitmap, settings, page_number);

    // The region's data part: region info, flags, AT pixels, coded data.
    let template = Template::Template0;
    let at_pixels = nominal_adaptive_pixels(template);

    let mut data = Writer::new();
    write_region_segment_info(
        &mut data,
        &RegionSegmentInfo {
            width: bitmap.width(),
            height: bitmap.height(),
            x_location: 0,
            y_location: 0,
            combination_operator: settings.default_combination_operator,
        },
    );

    let mut flags = 0_u8;
    if settings.duplicated_lines_removal {
        flags |= 0x08;
    }
    data.write_byte(flags);
    for at in &at_pixels {
        data.write_byte(at.x as u8);
        data.write_byte(at.y as u8);
    }

    let mut encoder = ArithmeticEncoder::new();
    let mut contexts = vec![Context::default(); 1 << template.context_bits()];
    encode_bitmap(
        &mut encoder,
        &mut contexts,
        bitmap,
        template,
        settings.duplicated_lines_removal,
        &at_pixels,
    );
    data.write_bytes(&encoder.flush());

    write_segment(
        writer,
        *next_segment,
        SegmentType::ImmediateGenericRegion,
        &[],
        page_number,
        &data.into_bytes(),
    );
    *next_segment += 1;

    write_segment(
        writer,
        *next_segment,
        SegmentType::EndOfPage,
        &[],
        page_number,
        &[],
    );
    *next_segment += 1;
}
