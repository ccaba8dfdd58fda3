//! The document layer: segment registry, dispatch and page composition.

use crate::bitmap::Bitmap;
use crate::cancel::CancelToken;
use crate::error::{Error, ErrorKind, Result, bail};
use crate::file::{File, FileHeader, parse_embedded_segments, parse_file};
use crate::huffman_table::HuffmanTable;
use crate::page_info::{PageInformation, parse_page_information};
use crate::reader::Reader;
use crate::region::RegionBitmap;
use crate::region::generic::decode_generic_region;
use crate::region::halftone::decode_halftone_region;
use crate::region::pattern::{PatternDictionary, decode_pattern_dictionary};
use crate::region::refinement::decode_refinement_region;
use crate::region::symbol::{SymbolDictionary, decode_symbol_dictionary};
use crate::region::text::decode_text_region;
use crate::segment::{Segment, SegmentType};

/// Options applied while opening and decoding a document.
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// A token polled between segments; decoding returns `Cancelled` once
    /// it fires.
    pub cancel: CancelToken,
    /// With `strict` set, unknown or unhandled segment types abort the
    /// decode instead of being skipped with a warning.
    pub strict: bool,
}

/// A decoded page: its bitmap and the segments that produced it.
#[derive(Debug, Clone)]
pub struct Page {
    number: u32,
    bitmap: Bitmap,
    segments: Vec<SegmentInfo>,
}

impl Page {
    /// The page number (1-based, as associated in the stream).
    pub fn number(&self) -> u32 {
        self.number
    }

    /// The composited page bitmap.
    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    /// The headers of the segments associated with this page, in order.
    pub fn segments(&self) -> &[SegmentInfo] {
        &self.segments
    }

    /// Look up one of this page's segments by number.
    pub fn segment(&self, segment_number: u32) -> Option<&SegmentInfo> {
        self.segments
            .iter()
            .find(|info| info.segment_number == segment_number)
    }
}

/// A public view of a segment header.
#[derive(Debug, Clone)]
pub struct SegmentInfo {
    /// The segment's number.
    pub segment_number: u32,
    /// The segment's type.
    pub segment_type: SegmentType,
    /// The page the segment belongs to; 0 for global segments.
    pub page_association: u32,
    /// The numbers of the segments it refers to.
    pub referred_to_segments: Vec<u32>,
    /// The length of its data part, when declared.
    pub data_length: Option<u32>,
}

/// Dictionaries and intermediate results retained across the document, so
/// later segments (and later pages) can refer to them without redecoding.
#[derive(Debug, Default)]
struct Registry {
    symbol_dictionaries: Vec<(u32, SymbolDictionary)>,
    pattern_dictionaries: Vec<(u32, PatternDictionary)>,
    huffman_tables: Vec<(u32, HuffmanTable)>,
    regions: Vec<(u32, RegionBitmap)>,
    /// Segments whose decode failed; the error replays when referenced.
    failed: Vec<(u32, Error)>,
}

impl Registry {
    fn get<'a, T>(entries: &'a [(u32, T)], segment_number: u32) -> Option<&'a T> {
        entries
            .binary_search_by_key(&segment_number, |(number, _)| *number)
            .ok()
            .map(|idx| &entries[idx].1)
    }

    fn insert<T>(entries: &mut Vec<(u32, T)>, segment_number: u32, value: T) {
        match entries.binary_search_by_key(&segment_number, |(number, _)| *number) {
            Ok(_) => {}
            Err(idx) => entries.insert(idx, (segment_number, value)),
        }
    }

    fn contains(&self, segment_number: u32) -> bool {
        Self::get(&self.symbol_dictionaries, segment_number).is_some()
            || Self::get(&self.pattern_dictionaries, segment_number).is_some()
            || Self::get(&self.huffman_tables, segment_number).is_some()
            || Self::get(&self.regions, segment_number).is_some()
    }
}

/// A parsed JBIG2 document with lazily decoded pages.
#[derive(Debug)]
pub struct Document<'a> {
    header: Option<FileHeader>,
    segments: Vec<Segment<'a>>,
    /// Page numbers present in the stream, ascending.
    page_numbers: Vec<u32>,
    registry: Registry,
    pages: Vec<Page>,
    options: DecodeOptions,
}

impl<'a> Document<'a> {
    /// Open a standalone or embedded JBIG2 stream.
    pub fn open(data: &'a [u8]) -> Result<Self> {
        Self::open_with_options(data, None, DecodeOptions::default())
    }

    /// Open an embedded stream together with its global segments (the PDF
    /// `JBIG2Globals` arrangement).
    pub fn open_with_globals(data: &'a [u8], globals: &'a [u8]) -> Result<Self> {
        Self::open_with_options(data, Some(globals), DecodeOptions::default())
    }

    /// Open with explicit globals and options.
    pub fn open_with_options(
        data: &'a [u8],
        globals: Option<&'a [u8]>,
        options: DecodeOptions,
    ) -> Result<Self> {
        let mut segments = Vec::new();
        if let Some(globals) = globals {
            parse_embedded_segments(globals, &mut segments)?;
        }

        let File {
            header,
            segments: own_segments,
        } = parse_file(data)?;
        segments.extend(own_segments);
        segments.sort_by_key(|seg| seg.header.segment_number);

        let mut page_numbers: Vec<u32> = segments
            .iter()
            .filter(|seg| seg.header.segment_type == SegmentType::PageInformation)
            .map(|seg| seg.header.page_association)
            .filter(|&page| page != 0)
            .collect();
        page_numbers.sort_unstable();
        page_numbers.dedup();

        log::debug!(
            "opened document: {} segments, {} pages",
            segments.len(),
            page_numbers.len()
        );

        Ok(Self {
            header,
            segments,
            page_numbers,
            registry: Registry::default(),
            pages: Vec::new(),
            options,
        })
    }

    /// The file organization, when the stream carried a standalone header;
    /// `None` for embedded streams.
    pub fn organization(&self) -> Option<crate::file::FileOrganization> {
        self.header.as_ref().map(|header| header.organization)
    }

    /// The number of pages: the file header's declaration when present,
    /// otherwise the number of page information segments found.
    pub fn page_count(&self) -> u32 {
        self.header
            .as_ref()
            .and_then(|header| header.number_of_pages)
            .unwrap_or(self.page_numbers.len() as u32)
    }

    /// Decode (or fetch the cached) page `number`, 1-based.
    pub fn get_page(&mut self, number: u32) -> Result<&Page> {
        if !self.page_numbers.contains(&number) {
            bail!(ErrorKind::OutOfRange("page not found"));
        }

        if let Some(idx) = self.pages.iter().position(|page| page.number == number) {
            return Ok(&self.pages[idx]);
        }

        let page = self
            .decode_page(number)
            .map_err(|e| e.on_page(number))?;
        self.pages.push(page);
        Ok(self.pages.last().expect("just pushed"))
    }

    /// The header view of every segment associated with `page`, plus the
    /// globals, in stream order.
    fn segment_infos(&self, page: u32) -> Vec<SegmentInfo> {
        self.segments
            .iter()
            .filter(|seg| seg.header.page_association == page)
            .map(|seg| SegmentInfo {
                segment_number: seg.header.segment_number,
                segment_type: seg.header.segment_type,
                page_association: seg.header.page_association,
                referred_to_segments: seg.header.referred_to_segments.clone(),
                data_length: seg.header.data_length,
            })
            .collect()
    }

    /// Compose one page by evaluating its segments in order.
    fn decode_page(&mut self, number: u32) -> Result<Page> {
        // Stripe heights resolve pages whose declared height is unknown.
        let height_from_stripes = self
            .segments
            .iter()
            .filter(|seg| {
                seg.header.segment_type == SegmentType::EndOfStripe
                    && seg.header.page_association == number
            })
            .filter_map(|seg| {
                let end_row = u32::from_be_bytes(seg.data.get(..4)?.try_into().ok()?);
                end_row.checked_add(1)
            })
            .max();

        let info_idx = self
            .segments
            .iter()
            .position(|seg| {
                seg.header.segment_type == SegmentType::PageInformation
                    && seg.header.page_association == number
            })
            .ok_or(ErrorKind::Malformed("missing page information segment"))?;

        let page_info = {
            let segment = &self.segments[info_idx];
            let mut reader = Reader::new(segment.data);
            parse_page_information(&mut reader).map_err(|e| {
                e.in_segment(segment.header.segment_number, segment.header.segment_type.name())
            })?
        };

        let mut page_bitmap = create_page_bitmap(&page_info, height_from_stripes)?;

        log::debug!(
            "decoding page {number}: {}x{}",
            page_bitmap.width(),
            page_bitmap.height()
        );

        let page_segment_numbers: Vec<u32> = self
            .segments
            .iter()
            .filter(|seg| seg.header.page_association == number)
            .map(|seg| seg.header.segment_number)
            .collect();

        for segment_number in page_segment_numbers {
            self.options.cancel.check()?;

            match self.evaluate_segment(segment_number, Some(&mut page_bitmap)) {
                // End of page.
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    // A broken dictionary only matters if something refers
                    // to it; the recorded error replays at that point.
                    // Anything composing into the page fails the page.
                    let recoverable = e.kind() != ErrorKind::Cancelled
                        && matches!(
                            self.segment_type_of(segment_number),
                            Some(
                                SegmentType::SymbolDictionary
                                    | SegmentType::PatternDictionary
                                    | SegmentType::Tables
                            )
                        );
                    if !recoverable {
                        return Err(e);
                    }
                }
            }
        }

        Ok(Page {
            number,
            bitmap: page_bitmap,
            segments: self.segment_infos(number),
        })
    }

    /// Make sure a referred segment's result is in the registry, decoding
    /// it (and transitively its own references) on demand. A previously
    /// failed segment replays its error.
    fn ensure_referred(&mut self, segment_number: u32) -> Result<()> {
        if self.registry.contains(segment_number) {
            return Ok(());
        }
        if let Some((_, error)) = self
            .registry
            .failed
            .iter()
            .find(|(number, _)| *number == segment_number)
        {
            return Err(*error);
        }

        self.evaluate_segment(segment_number, None)?;
        Ok(())
    }

    fn segment_type_of(&self, segment_number: u32) -> Option<SegmentType> {
        self.segments
            .binary_search_by_key(&segment_number, |seg| seg.header.segment_number)
            .ok()
            .map(|idx| self.segments[idx].header.segment_type)
    }

    /// Evaluate one segment. Immediate regions compose into `page_bitmap`
    /// when one is given and are skipped otherwise. Returns true when an
    /// end of page was reached.
    fn evaluate_segment(
        &mut self,
        segment_number: u32,
        mut page_bitmap: Option<&mut Bitmap>,
    ) -> Result<bool> {
        let Ok(idx) = self
            .segments
            .binary_search_by_key(&segment_number, |seg| seg.header.segment_number)
        else {
            bail!(ErrorKind::Malformed("reference to a missing segment"));
        };

        // Dictionaries resolved on demand by an earlier reference are not
        // decoded again when the page loop reaches them. Immediate regions
        // still compose, so a retried page stays complete.
        if self.registry.contains(segment_number)
            && !self.segments[idx].header.segment_type.is_immediate_region()
        {
            return Ok(false);
        }

        let segment_type = self.segments[idx].header.segment_type;
        let referred = self.segments[idx].header.referred_to_segments.clone();
        let type_name = segment_type.name();

        log::trace!("segment {segment_number}: {type_name}");

        let attach =
            |e: Error| e.in_segment(segment_number, type_name);

        match segment_type {
            SegmentType::SymbolDictionary => {
                for &r in &referred {
                    self.ensure_referred(r).map_err(attach)?;
                }

                let result = {
                    let input_symbols: Vec<&Bitmap> = referred
                        .iter()
                        .filter_map(|&r| Registry::get(&self.registry.symbol_dictionaries, r))
                        .flat_map(|dict| dict.exported_symbols.iter())
                        .collect();
                    let tables: Vec<&HuffmanTable> = referred
                        .iter()
                        .filter_map(|&r| Registry::get(&self.registry.huffman_tables, r))
                        .collect();

                    let mut reader = Reader::new(self.segments[idx].data);
                    decode_symbol_dictionary(&mut reader, &input_symbols, &tables)
                };

                match result {
                    Ok(dictionary) => Registry::insert(
                        &mut self.registry.symbol_dictionaries,
                        segment_number,
                        dictionary,
                    ),
                    Err(e) => return Err(self.record_failure(segment_number, attach(e))),
                }
            }
            SegmentType::PatternDictionary => {
                let mut reader = Reader::new(self.segments[idx].data);
                match decode_pattern_dictionary(&mut reader) {
                    Ok(dictionary) => Registry::insert(
                        &mut self.registry.pattern_dictionaries,
                        segment_number,
                        dictionary,
                    ),
                    Err(e) => return Err(self.record_failure(segment_number, attach(e))),
                }
            }
            SegmentType::Tables => {
                let mut reader = Reader::new(self.segments[idx].data);
                match HuffmanTable::read_custom(&mut reader) {
                    Ok(table) => Registry::insert(
                        &mut self.registry.huffman_tables,
                        segment_number,
                        table,
                    ),
                    Err(e) => return Err(self.record_failure(segment_number, attach(e))),
                }
            }
            SegmentType::IntermediateTextRegion
            | SegmentType::ImmediateTextRegion
            | SegmentType::ImmediateLosslessTextRegion => {
                for &r in &referred {
                    self.ensure_referred(r).map_err(attach)?;
                }

                let region = {
                    let symbols: Vec<&Bitmap> = referred
                        .iter()
                        .filter_map(|&r| Registry::get(&self.registry.symbol_dictionaries, r))
                        .flat_map(|dict| dict.exported_symbols.iter())
                        .collect();
                    let tables: Vec<&HuffmanTable> = referred
                        .iter()
                        .filter_map(|&r| Registry::get(&self.registry.huffman_tables, r))
                        .collect();

                    let mut reader = Reader::new(self.segments[idx].data);
                    decode_text_region(&mut reader, &symbols, &tables).map_err(attach)?
                };

                self.finish_region(segment_number, segment_type, region, &mut page_bitmap);
            }
            SegmentType::IntermediateGenericRegion
            | SegmentType::ImmediateGenericRegion
            | SegmentType::ImmediateLosslessGenericRegion => {
                let unknown_length = self.segments[idx].header.data_length.is_none();
                let mut reader = Reader::new(self.segments[idx].data);
                let region = decode_generic_region(&mut reader, unknown_length).map_err(attach)?;
                self.finish_region(segment_number, segment_type, region, &mut page_bitmap);
            }
            SegmentType::IntermediateHalftoneRegion
            | SegmentType::ImmediateHalftoneRegion
            | SegmentType::ImmediateLosslessHalftoneRegion => {
                for &r in &referred {
                    self.ensure_referred(r).map_err(attach)?;
                }

                let region = {
                    let patterns = referred
                        .iter()
                        .find_map(|&r| Registry::get(&self.registry.pattern_dictionaries, r))
                        .ok_or_else(|| {
                            attach(
                                ErrorKind::Malformed(
                                    "halftone region without a pattern dictionary",
                                )
                                .into(),
                            )
                        })?;

                    let mut reader = Reader::new(self.segments[idx].data);
                    decode_halftone_region(&mut reader, patterns).map_err(attach)?
                };

                self.finish_region(segment_number, segment_type, region, &mut page_bitmap);
            }
            SegmentType::IntermediateRefinementRegion
            | SegmentType::ImmediateRefinementRegion
            | SegmentType::ImmediateLosslessRefinementRegion => {
                for &r in &referred {
                    self.ensure_referred(r).map_err(attach)?;
                }

                // The reference is the first referred region, or the page
                // bitmap itself (7.4.7.5).
                let referred_region = referred
                    .iter()
                    .find_map(|&r| Registry::get(&self.registry.regions, r));

                let region = {
                    let (reference, ref_x, ref_y) = match (&referred_region, &page_bitmap) {
                        (Some(region), _) => {
                            (&region.bitmap, region.x_location, region.y_location)
                        }
                        (None, Some(page)) => (&**page, 0, 0),
                        (None, None) => {
                            bail!(attach(
                                ErrorKind::Malformed(
                                    "refinement region without a reference"
                                )
                                .into()
                            ))
                        }
                    };

                    let mut reader = Reader::new(self.segments[idx].data);
                    decode_refinement_region(&mut reader, reference, ref_x, ref_y)
                        .map_err(attach)?
                };

                self.finish_region(segment_number, segment_type, region, &mut page_bitmap);
            }
            SegmentType::PageInformation | SegmentType::EndOfStripe => {
                // Handled by the page composition loop.
            }
            SegmentType::EndOfPage | SegmentType::EndOfFile => return Ok(true),
            SegmentType::Profiles
            | SegmentType::ColourPalette
            | SegmentType::Extension => {
                if self.options.strict {
                    bail!(attach(ErrorKind::Unsupported("segment type").into()));
                }
                log::warn!("skipping unsupported segment {segment_number} ({type_name})");
            }
        }

        Ok(false)
    }

    /// Store an intermediate region or compose an immediate one.
    fn finish_region(
        &mut self,
        segment_number: u32,
        segment_type: SegmentType,
        region: RegionBitmap,
        page_bitmap: &mut Option<&mut Bitmap>,
    ) {
        if segment_type.is_immediate_region() {
            if let Some(page) = page_bitmap {
                page.combine_at(
                    &region.bitmap,
                    region.x_location as i32,
                    region.y_location as i32,
                    region.combination_operator,
                );
            }
            // An immediate region may still be referred to by a later
            // refinement; retain it either way.
        }
        Registry::insert(&mut self.registry.regions, segment_number, region);
    }

    /// Remember a dictionary failure so later references replay it, and
    /// return it to the current caller.
    fn record_failure(&mut self, segment_number: u32, error: Error) -> Error {
        log::warn!("segment {segment_number} failed: {error}");
        self.registry.failed.push((segment_number, error));
        error
    }
}

/// Create the page bitmap from its information segment (7.4.8.2, 7.4.8.5).
fn create_page_bitmap(
    info: &PageInformation,
    height_from_stripes: Option<u32>,
) -> Result<Bitmap> {
    let height = if info.height == 0xFFFF_FFFF {
        height_from_stripes.ok_or(ErrorKind::Malformed("page height unknown and unstriped"))?
    } else {
        info.height
    };

    let mut bitmap = Bitmap::filled(info.width, height, info.flags.default_pixel != 0)?;
    bitmap.x_resolution = info.x_resolution.unwrap_or(0);
    bitmap.y_resolution = info.y_resolution.unwrap_or(0);
    Ok(bitmap)
}
