//! File-level structure (T.88 Annex D): the magic, the file header and the
//! three organizations a stream can arrive in.

use crate::error::{ErrorKind, Result, bail};
use crate::reader::Reader;
use crate::segment::{
    Segment, SegmentType, parse_segment, parse_segment_data, parse_segment_header,
};

/// The two standalone file organizations (D.1, D.2). Embedded streams (D.3,
/// the PDF case) carry no file header at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOrganization {
    /// Header and data of each segment stored together, in order.
    Sequential,
    /// All segment headers first, then the data parts in the same order.
    RandomAccess,
}

/// This 8-byte sequence opens every standalone JBIG2 file (D.4.1).
pub(crate) const FILE_HEADER_ID: [u8; 8] = [0x97, 0x4A, 0x42, 0x32, 0x0D, 0x0A, 0x1A, 0x0A];

/// A parsed file header (D.4).
#[derive(Debug, Clone)]
pub(crate) struct FileHeader {
    pub organization: FileOrganization,
    /// The page count, when the producer knew it.
    pub number_of_pages: Option<u32>,
    /// Whether any generic region uses the 12-AT-pixel extended templates.
    pub uses_extended_templates: bool,
    /// Whether any region segment is extended to be coloured.
    pub contains_coloured_regions: bool,
}

/// A fully split file: the header (absent for embedded streams) and every
/// segment with its data.
#[derive(Debug)]
pub(crate) struct File<'a> {
    pub header: Option<FileHeader>,
    pub segments: Vec<Segment<'a>>,
}

/// Parse a JBIG2 byte stream in any organization. A missing magic number
/// means the embedded organization.
pub(crate) fn parse_file(data: &[u8]) -> Result<File<'_>> {
    let mut reader = Reader::new(data);

    if data.starts_with(&FILE_HEADER_ID) {
        let header = parse_file_header(&mut reader)?;

        let mut segments = Vec::new();
        match header.organization {
            FileOrganization::Sequential => {
                parse_segments_sequential(&mut reader, &mut segments)?;
            }
            FileOrganization::RandomAccess => {
                parse_segments_random_access(&mut reader, &mut segments)?;
            }
        }

        // The spec mandates ascending segment numbers; sort to be safe.
        segments.sort_by_key(|seg| seg.header.segment_number);

        Ok(File {
            header: Some(header),
            segments,
        })
    } else {
        let mut segments = Vec::new();
        parse_segments_sequential(&mut reader, &mut segments)?;
        segments.sort_by_key(|seg| seg.header.segment_number);

        Ok(File {
            header: None,
            segments,
        })
    }
}

/// Parse additional segments (e.g. a PDF `JBIG2Globals` stream) into an
/// existing segment list.
pub(crate) fn parse_embedded_segments<'a>(
    data: &'a [u8],
    segments: &mut Vec<Segment<'a>>,
) -> Result<()> {
    let mut reader = Reader::new(data);
    parse_segments_sequential(&mut reader, segments)
}

fn parse_file_header(reader: &mut Reader<'_>) -> Result<FileHeader> {
    let id = reader.read_bytes(8).ok_or(ErrorKind::IoExhausted)?;
    debug_assert_eq!(id, FILE_HEADER_ID.as_slice());

    // D.4.2: the flags byte. Bit 0 selects the organization, bit 1 marks an
    // unknown page count, bit 2 extended templates, bit 3 coloured regions.
    let flags = reader.read_byte().ok_or(ErrorKind::IoExhausted)?;

    let organization = if flags & 0x01 != 0 {
        FileOrganization::Sequential
    } else {
        FileOrganization::RandomAccess
    };
    let unknown_page_count = flags & 0x02 != 0;
    let uses_extended_templates = flags & 0x04 != 0;
    let contains_coloured_regions = flags & 0x08 != 0;

    // Bits 4-7 are reserved and must be zero.
    if flags & 0xF0 != 0 {
        bail!(ErrorKind::Malformed("reserved file header flags set"));
    }

    // D.4.3: the page count, only present when known.
    let number_of_pages = if unknown_page_count {
        None
    } else {
        Some(reader.read_u32().ok_or(ErrorKind::IoExhausted)?)
    };

    Ok(FileHeader {
        organization,
        number_of_pages,
        uses_extended_templates,
        contains_coloured_regions,
    })
}

/// Sequential organization (D.1): each header is directly followed by its
/// data.
fn parse_segments_sequential<'a>(
    reader: &mut Reader<'a>,
    segments: &mut Vec<Segment<'a>>,
) -> Result<()> {
    loop {
        if reader.at_end() {
            break;
        }

        let segment = parse_segment(reader)?;

        // An end of file segment must be the last segment (7.4.11).
        let is_eof = matches!(segment.header.segment_type, SegmentType::EndOfFile);
        segments.push(segment);

        if is_eof {
            break;
        }
    }

    Ok(())
}

/// Random-access organization (D.2): every header comes first; each
/// segment's data offset is the accumulated length of its predecessors
/// after the final header.
fn parse_segments_random_access<'a>(
    reader: &mut Reader<'a>,
    segments: &mut Vec<Segment<'a>>,
) -> Result<()> {
    let mut headers = Vec::new();

    loop {
        if reader.at_end() {
            break;
        }

        let header = parse_segment_header(reader)?;

        let is_eof = matches!(header.segment_type, SegmentType::EndOfFile);
        headers.push(header);

        if is_eof {
            break;
        }
    }

    // Data starts here; accumulate the declared lengths to find each part.
    let mut offset = reader.stream_position();
    for header in headers {
        reader.seek(offset);
        let declared = header.data_length;
        let segment = parse_segment_data(reader, header)?;

        offset += match declared {
            Some(len) => len as usize,
            // Unknown lengths are resolved by scanning; the reader is
            // positioned right after the data it found.
            None => segment.data.len(),
        };
        segments.push(segment);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::write_segment;
    use crate::writer::Writer;

    fn file_header(flags: u8, pages: Option<u32>) -> Vec<u8> {
        let mut data = FILE_HEADER_ID.to_vec();
        data.push(flags);
        if let Some(pages) = pages {
            data.extend_from_slice(&pages.to_be_bytes());
        }
        data
    }

    #[test]
    fn sequential_file_with_page_count() {
        let mut data = file_header(0x01, Some(2));
        let mut writer = Writer::new();
        write_segment(&mut writer, 0, SegmentType::EndOfFile, &[], 0, &[]);
        data.extend_from_slice(&writer.into_bytes());

        let file = parse_file(&data).unwrap();
        let header = file.header.unwrap();
        assert_eq!(header.organization, FileOrganization::Sequential);
        assert_eq!(header.number_of_pages, Some(2));
        assert_eq!(file.segments.len(), 1);
    }

    #[test]
    fn unknown_page_count_omits_the_field() {
        let data = file_header(0x03, None);
        let file = parse_file(&data).unwrap();
        assert_eq!(file.header.unwrap().number_of_pages, None);
    }

    #[test]
    fn reserved_flags_are_rejected() {
        let data = file_header(0x11, Some(1));
        assert!(parse_file(&data).is_err());
    }

    #[test]
    fn missing_magic_is_treated_as_embedded() {
        let mut writer = Writer::new();
        write_segment(&mut writer, 3, SegmentType::EndOfPage, &[], 1, &[]);
        let data = writer.into_bytes();

        let file = parse_file(&data).unwrap();
        assert!(file.header.is_none());
        assert_eq!(file.segments.len(), 1);
        assert_eq!(file.segments[0].header.segment_number, 3);
    }

    #[test]
    fn random_access_data_follows_all_headers() {
        let mut data = file_header(0x00, Some(1));

        // Hand-build two headers, then their data parts back to back.
        let mut headers = Writer::new();
        // Segment 1: end of stripe, 4 data bytes.
        headers.write_u32(1);
        headers.write_byte(SegmentType::EndOfStripe.type_value());
        headers.write_byte(0);
        headers.write_byte(1);
        headers.write_u32(4);
        // Segment 2: end of file, no data.
        headers.write_u32(2);
        headers.write_byte(SegmentType::EndOfFile.type_value());
        headers.write_byte(0);
        headers.write_byte(0);
        headers.write_u32(0);

        data.extend_from_slice(&headers.into_bytes());
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x09]);

        let file = parse_file(&data).unwrap();
        assert_eq!(file.segments.len(), 2);
        assert_eq!(file.segments[0].data, &[0x00, 0x00, 0x00, 0x09]);
        assert_eq!(file.segments[1].data.len(), 0);
    }
}
