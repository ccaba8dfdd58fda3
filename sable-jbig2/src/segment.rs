//! Segment headers: parsing (7.2) and emission.
//!
//! A segment is the unit of the JBIG2 wire format: a header naming its
//! type, the segments it refers to and the page it belongs to, followed by
//! a type-specific data part.

use crate::error::{ErrorKind, Result, bail};
use crate::reader::Reader;
use crate::writer::Writer;

/// The segment type codes of Section 7.3. All other values are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentType {
    /// Symbol dictionary (type 0).
    SymbolDictionary,
    /// Intermediate text region (type 4).
    IntermediateTextRegion,
    /// Immediate text region (type 6).
    ImmediateTextRegion,
    /// Immediate lossless text region (type 7).
    ImmediateLosslessTextRegion,
    /// Pattern dictionary (type 16).
    PatternDictionary,
    /// Intermediate halftone region (type 20).
    IntermediateHalftoneRegion,
    /// Immediate halftone region (type 22).
    ImmediateHalftoneRegion,
    /// Immediate lossless halftone region (type 23).
    ImmediateLosslessHalftoneRegion,
    /// Intermediate generic region (type 36).
    IntermediateGenericRegion,
    /// Immediate generic region (type 38).
    ImmediateGenericRegion,
    /// Immediate lossless generic region (type 39).
    ImmediateLosslessGenericRegion,
    /// Intermediate generic refinement region (type 40).
    IntermediateRefinementRegion,
    /// Immediate generic refinement region (type 42).
    ImmediateRefinementRegion,
    /// Immediate lossless generic refinement region (type 43).
    ImmediateLosslessRefinementRegion,
    /// Page information (type 48).
    PageInformation,
    /// End of page (type 49).
    EndOfPage,
    /// End of stripe (type 50).
    EndOfStripe,
    /// End of file (type 51).
    EndOfFile,
    /// Profiles (type 52).
    Profiles,
    /// Tables (type 53).
    Tables,
    /// Colour palette (type 54).
    ColourPalette,
    /// Extension (type 62).
    Extension,
}

impl SegmentType {
    pub(crate) fn from_type_value(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::SymbolDictionary),
            4 => Ok(Self::IntermediateTextRegion),
            6 => Ok(Self::ImmediateTextRegion),
            7 => Ok(Self::ImmediateLosslessTextRegion),
            16 => Ok(Self::PatternDictionary),
            20 => Ok(Self::IntermediateHalftoneRegion),
            22 => Ok(Self::ImmediateHalftoneRegion),
            23 => Ok(Self::ImmediateLosslessHalftoneRegion),
            36 => Ok(Self::IntermediateGenericRegion),
            38 => Ok(Self::ImmediateGenericRegion),
            39 => Ok(Self::ImmediateLosslessGenericRegion),
            40 => Ok(Self::IntermediateRefinementRegion),
            42 => Ok(Self::ImmediateRefinementRegion),
            43 => Ok(Self::ImmediateLosslessRefinementRegion),
            48 => Ok(Self::PageInformation),
            49 => Ok(Self::EndOfPage),
            50 => Ok(Self::EndOfStripe),
            51 => Ok(Self::EndOfFile),
            52 => Ok(Self::Profiles),
            53 => Ok(Self::Tables),
            54 => Ok(Self::ColourPalette),
            62 => Ok(Self::Extension),
            _ => bail!(ErrorKind::Malformed("unknown or reserved segment type")),
        }
    }

    pub(crate) fn type_value(self) -> u8 {
        match self {
            Self::SymbolDictionary => 0,
            Self::IntermediateTextRegion => 4,
            Self::ImmediateTextRegion => 6,
            Self::ImmediateLosslessTextRegion => 7,
            Self::PatternDictionary => 16,
            Self::IntermediateHalftoneRegion => 20,
            Self::ImmediateHalftoneRegion => 22,
            Self::ImmediateLosslessHalftoneRegion => 23,
            Self::IntermediateGenericRegion => 36,
            Self::ImmediateGenericRegion => 38,
            Self::ImmediateLosslessGenericRegion => 39,
            Self::IntermediateRefinementRegion => 40,
            Self::ImmediateRefinementRegion => 42,
            Self::ImmediateLosslessRefinementRegion => 43,
            Self::PageInformation => 48,
            Self::EndOfPage => 49,
            Self::EndOfStripe => 50,
            Self::EndOfFile => 51,
            Self::Profiles => 52,
            Self::Tables => 53,
            Self::ColourPalette => 54,
            Self::Extension => 62,
        }
    }

    /// A short name for diagnostics and log records.
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::SymbolDictionary => "symbol dictionary",
            Self::IntermediateTextRegion
            | Self::ImmediateTextRegion
            | Self::ImmediateLosslessTextRegion => "text region",
            Self::PatternDictionary => "pattern dictionary",
            Self::IntermediateHalftoneRegion
            | Self::ImmediateHalftoneRegion
            | Self::ImmediateLosslessHalftoneRegion => "halftone region",
            Self::IntermediateGenericRegion
            | Self::ImmediateGenericRegion
            | Self::ImmediateLosslessGenericRegion => "generic region",
            Self::IntermediateRefinementRegion
            | Self::ImmediateRefinementRegion
            | Self::ImmediateLosslessRefinementRegion => "refinement region",
            Self::PageInformation => "page information",
            Self::EndOfPage => "end of page",
            Self::EndOfStripe => "end of stripe",
            Self::EndOfFile => "end of file",
            Self::Profiles => "profiles",
            Self::Tables => "tables",
            Self::ColourPalette => "colour palette",
            Self::Extension => "extension",
        }
    }

    /// Whether this segment composes into a page bitmap directly.
    pub(crate) fn is_immediate_region(self) -> bool {
        matches!(
            self,
            Self::ImmediateTextRegion
                | Self::ImmediateLosslessTextRegion
                | Self::ImmediateHalftoneRegion
                | Self::ImmediateLosslessHalftoneRegion
                | Self::ImmediateGenericRegion
                | Self::ImmediateLosslessGenericRegion
                | Self::ImmediateRefinementRegion
                | Self::ImmediateLosslessRefinementRegion
        )
    }
}

/// A parsed segment header (7.2.1).
#[derive(Debug, Clone)]
pub(crate) struct SegmentHeader {
    /// The segment's number; unique within a document, gaps allowed.
    pub segment_number: u32,
    pub segment_type: SegmentType,
    /// Deferred non-retain flag (bit 7 of the flags byte).
    pub deferred_non_retain: bool,
    /// The page this segment belongs to; 0 means no page (a global
    /// dictionary or table).
    pub page_association: u32,
    /// The numbers of the earlier segments this one refers to.
    pub referred_to_segments: Vec<u32>,
    /// The declared data length; `None` stands for 0xFFFFFFFF (unknown),
    /// valid only for immediate generic regions.
    pub data_length: Option<u32>,
}

/// A parsed segment: header plus borrowed data part.
#[derive(Debug)]
pub(crate) struct Segment<'a> {
    pub header: SegmentHeader,
    pub data: &'a [u8],
}

/// Parse a segment header (7.2).
pub(crate) fn parse_segment_header(reader: &mut Reader<'_>) -> Result<SegmentHeader> {
    // 7.2.2: the segment number.
    let segment_number = reader.read_u32().ok_or(ErrorKind::IoExhausted)?;

    // Whatever fails from here on can at least name the segment.
    parse_segment_header_fields(reader, segment_number)
        .map_err(|e| e.in_segment(segment_number, "segment header"))
}

fn parse_segment_header_fields(
    reader: &mut Reader<'_>,
    segment_number: u32,
) -> Result<SegmentHeader> {
    // 7.2.3: flags byte. Bits 0-5 are the type, bit 6 selects the wide page
    // association field, bit 7 is deferred non-retain.
    let flags = reader.read_byte().ok_or(ErrorKind::IoExhausted)?;
    let segment_type = SegmentType::from_type_value(flags & 0x3F)?;
    let page_association_long = flags & 0x40 != 0;
    let deferred_non_retain = flags & 0x80 != 0;

    // 7.2.4: referred-to segment count and retention flags. A three-bit
    // count of 0..=4 is the short form; 7 selects the long form with a
    // 29-bit count followed by retention bits. 5 and 6 are reserved.
    let count_and_retention = reader.read_byte().ok_or(ErrorKind::IoExhausted)?;
    let short_count = (count_and_retention >> 5) & 0x07;

    if short_count == 5 || short_count == 6 {
        bail!(ErrorKind::Malformed("reserved referred-to segment count"));
    }

    let referred_to_count = if short_count < 7 {
        short_count as u32
    } else {
        let rest = reader.read_bytes(3).ok_or(ErrorKind::IoExhausted)?;
        let count = u32::from_be_bytes([count_and_retention & 0x1F, rest[0], rest[1], rest[2]]);

        // One retention bit per referred segment plus one for this
        // segment, rounded up to whole bytes.
        let retention_bytes = (count as usize + 1).div_ceil(8);
        reader
            .skip_bytes(retention_bytes)
            .ok_or(ErrorKind::IoExhausted)?;

        count
    };

    // 7.2.5: the referred segment numbers are 1, 2 or 4 bytes wide
    // depending on this segment's own number.
    let mut referred_to_segments = Vec::with_capacity(referred_to_count.min(1024) as usize);
    for _ in 0..referred_to_count {
        let referred = if segment_number <= 256 {
            reader.read_byte().ok_or(ErrorKind::IoExhausted)? as u32
        } else if segment_number <= 65536 {
            reader.read_u16().ok_or(ErrorKind::IoExhausted)? as u32
        } else {
            reader.read_u32().ok_or(ErrorKind::IoExhausted)?
        };

        // References always point backwards.
        if referred >= segment_number {
            bail!(ErrorKind::Malformed(
                "segment refers to a later segment number"
            ));
        }

        referred_to_segments.push(referred);
    }

    // 7.2.6: page association, 1 or 4 bytes.
    let page_association = if page_association_long {
        reader.read_u32().ok_or(ErrorKind::IoExhausted)?
    } else {
        reader.read_byte().ok_or(ErrorKind::IoExhausted)? as u32
    };

    // 7.2.7: data length; 0xFFFFFFFF means unknown.
    let data_length_raw = reader.read_u32().ok_or(ErrorKind::IoExhausted)?;
    let data_length = if data_length_raw == 0xFFFF_FFFF {
        if segment_type != SegmentType::ImmediateGenericRegion {
            bail!(ErrorKind::Malformed(
                "unknown data length outside an immediate generic region"
            ));
        }
        None
    } else {
        Some(data_length_raw)
    };

    Ok(SegmentHeader {
        segment_number,
        segment_type,
        deferred_non_retain,
        page_association,
        referred_to_segments,
        data_length,
    })
}

/// Parse a complete segment (header and data).
pub(crate) fn parse_segment<'a>(reader: &mut Reader<'a>) -> Result<Segment<'a>> {
    let header = parse_segment_header(reader)?;
    parse_segment_data(reader, header)
}

/// Read the data part for an already-parsed header.
pub(crate) fn parse_segment_data<'a>(
    reader: &mut Reader<'a>,
    header: SegmentHeader,
) -> Result<Segment<'a>> {
    let data = if let Some(len) = header.data_length {
        reader
            .read_bytes(len as usize)
            .ok_or_else(|| {
                crate::error::Error::new(ErrorKind::IoExhausted)
                    .in_segment(header.segment_number, header.segment_type.name())
            })?
    } else {
        let len = scan_unknown_length_region(reader).map_err(|e| {
            e.in_segment(header.segment_number, header.segment_type.name())
        })?;
        reader.read_bytes(len).ok_or(ErrorKind::IoExhausted)?
    };

    Ok(Segment { header, data })
}

/// Determine the extent of an immediate generic region with unknown length
/// (7.2.7): the data ends with a two-byte end sequence (`FF AC` for
/// arithmetic coding, `00 00` for MMR) followed by a four-byte row count,
/// and the sequences cannot occur before the eighteenth data byte.
///
/// The reader is restored to where the scan started.
fn scan_unknown_length_region(reader: &mut Reader<'_>) -> Result<usize> {
    let mark = reader.mark();
    let start_offset = reader.stream_position();

    let result = scan_for_end_sequence(reader, start_offset);
    reader.reset(mark);
    result
}

fn scan_for_end_sequence(reader: &mut Reader<'_>, start_offset: usize) -> Result<usize> {
    reader.skip_bytes(17).ok_or(ErrorKind::IoExhausted)?;
    let flags = reader.peek_byte().ok_or(ErrorKind::IoExhausted)?;
    reader.skip_bytes(1).ok_or(ErrorKind::IoExhausted)?;
    let uses_mmr = (flags & 1) != 0;

    let end_marker: [u8; 2] = if uses_mmr { [0x00, 0x00] } else { [0xFF, 0xAC] };

    while let Some(bytes) = reader.peek_bytes(6) {
        if bytes[..2] == end_marker {
            return Ok(reader.stream_position() - start_offset + 2 + 4);
        }
        reader.skip_bytes(1).ok_or(ErrorKind::IoExhausted)?;
    }

    bail!(ErrorKind::ArithmeticExhausted)
}

/// Emit a segment header followed by its data part.
pub(crate) fn write_segment(
    writer: &mut Writer,
    segment_number: u32,
    segment_type: SegmentType,
    referred_to_segments: &[u32],
    page_association: u32,
    data: &[u8],
) {
    writer.write_u32(segment_number);

    let mut flags = segment_type.type_value();
    let page_association_long = page_association > 0xFF;
    if page_association_long {
        flags |= 0x40;
    }
    writer.write_byte(flags);

    // Referred-to segment count; retention bits are all zero.
    if referred_to_segments.len() <= 4 {
        writer.write_byte((referred_to_segments.len() as u8) << 5);
    } else {
        let count = referred_to_segments.len() as u32;
        writer.write_u32(0xE000_0000 | count);
        for _ in 0..(count as usize + 1).div_ceil(8) {
            writer.write_byte(0);
        }
    }

    for &referred in referred_to_segments {
        if segment_number <= 256 {
            writer.write_byte(referred as u8);
        } else if segment_number <= 65536 {
            writer.write_u16(referred as u16);
        } else {
            writer.write_u32(referred);
        }
    }

    if page_association_long {
        writer.write_u32(page_association);
    } else {
        writer.write_byte(page_association as u8);
    }

    writer.write_u32(data.len() as u32);
    writer.write_bytes(data);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_example_short_form() {
        // 7.2.8 EXAMPLE 1, plus a data length field.
        let data = [
            0x00, 0x00, 0x00, 0x20, // segment number 32
            0x86, // type 6, 1-byte page association, deferred non-retain
            0x6B, // refers to 3 segments, retention flags
            0x02, 0x1E, 0x05, // referred segments 2, 30, 5
            0x04, // page association 4
            0x00, 0x00, 0x00, 0x10, // data length 16
        ];

        let mut reader = Reader::new(&data);
        let header = parse_segment_header(&mut reader).unwrap();

        assert_eq!(header.segment_number, 32);
        assert_eq!(header.segment_type, SegmentType::ImmediateTextRegion);
        assert!(header.deferred_non_retain);
        assert_eq!(header.referred_to_segments, vec![2, 30, 5]);
        assert_eq!(header.page_association, 4);
        assert_eq!(header.data_length, Some(16));
    }

    #[test]
    fn header_example_long_form() {
        // 7.2.8 EXAMPLE 2, plus a data length field.
        #[rustfmt::skip]
        let data = [
            0x00, 0x00, 0x02, 0x34, // segment number 564
            0x40,                   // type 0, 4-byte page association
            0xE0, 0x00, 0x00, 0x09, // long form, 9 referred segments
            0x02, 0xFD,             // retention flags
            0x01, 0x00,             // referred segment 256
            0x00, 0x02,             // referred segment 2
            0x00, 0x1E,             // referred segment 30
            0x00, 0x05,             // referred segment 5
            0x02, 0x00,             // referred segment 512
            0x02, 0x01,             // referred segment 513
            0x02, 0x02,             // referred segment 514
            0x02, 0x03,             // referred segment 515
            0x02, 0x04,             // referred segment 516
            0x00, 0x00, 0x04, 0x01, // page association 1025
            0x00, 0x00, 0x00, 0x20, // data length 32
        ];

        let mut reader = Reader::new(&data);
        let header = parse_segment_header(&mut reader).unwrap();

        assert_eq!(header.segment_number, 564);
        assert_eq!(header.segment_type, SegmentType::SymbolDictionary);
        assert_eq!(
            header.referred_to_segments,
            vec![256, 2, 30, 5, 512, 513, 514, 515, 516]
        );
        assert_eq!(header.page_association, 1025);
        assert_eq!(header.data_length, Some(32));
    }

    #[test]
    fn forward_references_are_rejected() {
        let data = [
            0x00, 0x00, 0x00, 0x05, // segment number 5
            0x06, // type 6
            0x20, // one referred segment
            0x07, // referred segment 7 (later than 5)
            0x01, // page association
            0x00, 0x00, 0x00, 0x00,
        ];

        let mut reader = Reader::new(&data);
        assert!(parse_segment_header(&mut reader).is_err());
    }

    #[test]
    fn emitted_headers_parse_back() {
        let mut writer = Writer::new();
        write_segment(
            &mut writer,
            7,
            SegmentType::ImmediateTextRegion,
            &[1, 3],
            2,
            &[0xAA, 0xBB, 0xCC],
        );

        let bytes = writer.into_bytes();
        let mut reader = Reader::new(&bytes);
        let segment = parse_segment(&mut reader).unwrap();

        assert_eq!(segment.header.segment_number, 7);
        assert_eq!(
            segment.header.segment_type,
            SegmentType::ImmediateTextRegion
        );
        assert_eq!(segment.header.referred_to_segments, vec![1, 3]);
        assert_eq!(segment.header.page_association, 2);
        assert_eq!(segment.data, &[0xAA, 0xBB, 0xCC]);
    }
}
