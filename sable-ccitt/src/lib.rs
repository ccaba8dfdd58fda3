/*!
A CCITT Group 3 / Group 4 fax codec for bi-level rasters.

This crate implements the run-length and two-dimensional coding schemes of
ITU-T Recommendations T.4 (Group 3) and T.6 (Group 4), in both directions.
These encodings are used for facsimile transmission and for bi-level image
streams embedded in PDF documents, and they also serve as the MMR coding
variant inside JBIG2 generic regions.

Decoding goes through [`decode`], which pushes runs of same-coloured pixels
into a caller-supplied [`RowSink`], or through [`decode_packed`], which
collects the output into packed MSB-first rows. Encoding goes through
[`encode`], which takes packed rows and returns the coded byte stream.

The crate is `no_std` compatible but requires an allocator.

# Safety
Unsafe code is forbidden via a crate-level attribute.
*/

#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;

use alloc::vec::Vec;

mod bit_reader;
mod bit_writer;
mod decode;
mod encode;
mod tables;

pub use decode::{decode, decode_packed};
pub use encode::encode;

/// A specialized Result type for CCITT coding operations.
pub type Result<T> = core::result::Result<T, Error>;

/// An error that can occur while coding or decoding a CCITT stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Unexpected end of input while reading bits.
    UnexpectedEof,
    /// An unknown two-dimensional mode code was encountered.
    InvalidTwoDimCode,
    /// One of the two run lengths of a horizontal-mode code was invalid.
    WrongHorizontalCode,
    /// A required end-of-line code was missing or malformed.
    CorruptEol,
    /// The return-to-control sequence at the end of a Group 3 block was
    /// malformed.
    CorruptRtc,
    /// The end-of-facsimile-block sequence at the end of a Group 4 block
    /// was malformed.
    CorruptEofb,
    /// A scanline didn't produce the expected number of pixels.
    LineLengthMismatch,
    /// Arithmetic overflow in a run length or position calculation.
    Overflow,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of input"),
            Self::InvalidTwoDimCode => write!(f, "invalid two-dimensional mode code"),
            Self::WrongHorizontalCode => write!(f, "invalid run length in horizontal mode"),
            Self::CorruptEol => write!(f, "missing or malformed end-of-line code"),
            Self::CorruptRtc => write!(f, "malformed return-to-control sequence"),
            Self::CorruptEofb => write!(f, "malformed end-of-facsimile-block sequence"),
            Self::LineLengthMismatch => write!(f, "scanline length mismatch"),
            Self::Overflow => write!(f, "arithmetic overflow in position calculation"),
        }
    }
}

impl core::error::Error for Error {}

/// The coding scheme applied to every row of the raster.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Group 3 one-dimensional coding (MH).
    Group3OneDim,
    /// Group 3 mixed coding (MR): each block of `k` rows has a
    /// one-dimensionally coded first row, the remaining rows are coded
    /// two-dimensionally.
    Group3Mixed {
        /// The K parameter of T.4 Section 4.2; must be at least 2 for a
        /// mixed stream to contain any two-dimensional rows.
        k: u32,
    },
    /// Group 4 two-dimensional coding (MMR).
    Group4,
}

impl Mode {
    /// Map the conventional `K` selector onto a coding mode.
    ///
    /// `K = 0` selects Group 3 one-dimensional coding, `K > 0` Group 3
    /// mixed coding and `K < 0` Group 4 coding.
    pub fn from_k(k: i32) -> Self {
        if k == 0 {
            Self::Group3OneDim
        } else if k > 0 {
            Self::Group3Mixed { k: k as u32 }
        } else {
            Self::Group4
        }
    }
}

/// The flag space shared by the encoder and the decoder.
#[derive(Copy, Clone, Debug)]
pub struct Settings {
    /// The width of every row in pixels.
    pub columns: u32,
    /// The number of rows. The decoder stops after this many rows unless an
    /// end-of-block marker terminates the stream earlier.
    pub rows: u32,
    /// The coding mode (the `K` parameter; see [`Mode::from_k`]).
    pub mode: Mode,
    /// Whether an end-of-line code precedes each row.
    pub end_of_line: bool,
    /// Whether each row's coded data is padded with zero bits to the next
    /// byte boundary.
    pub encoded_byte_align: bool,
    /// Whether the stream is terminated by an end-of-block marker
    /// (RTC for Group 3, EOFB for Group 4).
    pub end_of_block: bool,
    /// Pixel polarity of the packed representation: if true, a 1 bit is a
    /// black pixel; if false (the PDF default), a 0 bit is black.
    pub black_is_one: bool,
}

impl Settings {
    /// The byte stride of a packed row.
    pub fn stride(&self) -> usize {
        self.columns.div_ceil(8) as usize
    }
}

/// A sink receiving decoded pixel runs, row by row.
///
/// Runs are reported in their semantic colour; the `black_is_one` polarity
/// flag only affects the packed representations.
pub trait RowSink {
    /// Push `len` pixels of one colour onto the current row.
    fn push_run(&mut self, black: bool, len: u32);
    /// Called when a row has been completed.
    fn end_row(&mut self);
}

/// A [`RowSink`] collecting rows into packed MSB-first bytes.
pub(crate) struct PackedSink {
    data: Vec<u8>,
    stride: usize,
    x: u32,
    black_bit: bool,
    row: Vec<u8>,
}

impl PackedSink {
    pub(crate) fn new(settings: &Settings) -> Self {
        Self {
            data: Vec::new(),
            stride: settings.stride(),
            x: 0,
            black_bit: settings.black_is_one,
            row: alloc::vec![0; settings.stride()],
        }
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl RowSink for PackedSink {
    fn push_run(&mut self, black: bool, len: u32) {
        let set = black == self.black_bit;
        if set {
            for i in self.x..self.x + len {
                self.row[(i / 8) as usize] |= 0x80 >> (i % 8);
            }
        }
        self.x += len;
    }

    fn end_row(&mut self) {
        self.data.extend_from_slice(&self.row);
        self.row.iter_mut().for_each(|b| *b = 0);
        self.x = 0;
    }
}
