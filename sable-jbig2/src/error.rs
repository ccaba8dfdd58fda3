//! Error types for JBIG2 coding and decoding.

use core::fmt;

/// The closed set of failure kinds surfaced by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The byte stream cannot be parsed.
    Malformed(&'static str),
    /// An index or parameter violates its stated bounds.
    OutOfRange(&'static str),
    /// A feature declared by the stream is not implemented by this crate.
    Unsupported(&'static str),
    /// The input ended before a declared length was consumed.
    IoExhausted,
    /// The arithmetic decoder reached the end of the coded data before the
    /// expected symbol count.
    ArithmeticExhausted,
    /// An unknown two-dimensional mode code in MMR-coded data.
    InvalidTwoDimCode,
    /// An invalid run length in an MMR horizontal-mode code.
    WrongHorizontalCode,
    /// A missing or malformed end-of-line code in MMR-coded data.
    CorruptEol,
    /// A malformed return-to-control sequence in MMR-coded data.
    CorruptRtc,
    /// A malformed end-of-facsimile-block sequence in MMR-coded data.
    CorruptEofb,
    /// Cooperative cancellation was observed.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(detail) => write!(f, "malformed data: {detail}"),
            Self::OutOfRange(detail) => write!(f, "out of range: {detail}"),
            Self::Unsupported(detail) => write!(f, "unsupported feature: {detail}"),
            Self::IoExhausted => write!(f, "unexpected end of input"),
            Self::ArithmeticExhausted => write!(f, "arithmetic decoder exhausted"),
            Self::InvalidTwoDimCode => write!(f, "invalid two-dimensional mode code"),
            Self::WrongHorizontalCode => write!(f, "invalid run length in horizontal mode"),
            Self::CorruptEol => write!(f, "missing or malformed end-of-line code"),
            Self::CorruptRtc => write!(f, "malformed return-to-control sequence"),
            Self::CorruptEofb => write!(f, "malformed end-of-facsimile-block sequence"),
            Self::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

/// An error together with the context chain it rose through.
///
/// The segment engine attaches the originating segment number and type, the
/// document layer attaches the page number, so the one-line rendering reads
/// e.g. `page 2: segment 5 (text region): unexpected end of input`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    segment: Option<(u32, &'static str)>,
    page: Option<u32>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            segment: None,
            page: None,
        }
    }

    /// The failure kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The number of the segment the error originated in, if attached.
    pub fn segment(&self) -> Option<u32> {
        self.segment.map(|(number, _)| number)
    }

    /// The number of the page the error rose through, if attached.
    pub fn page(&self) -> Option<u32> {
        self.page
    }

    /// Attach the originating segment, keeping the innermost attachment.
    pub(crate) fn in_segment(mut self, number: u32, type_name: &'static str) -> Self {
        self.segment.get_or_insert((number, type_name));
        self
    }

    /// Attach the page number, keeping the innermost attachment.
    pub(crate) fn on_page(mut self, page: u32) -> Self {
        self.page.get_or_insert(page);
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(page) = self.page {
            write!(f, "page {page}: ")?;
        }
        if let Some((number, type_name)) = self.segment {
            write!(f, "segment {number} ({type_name}): ")?;
        }
        write!(f, "{}", self.kind)
    }
}

impl core::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<sable_ccitt::Error> for Error {
    fn from(e: sable_ccitt::Error) -> Self {
        Self::new(ErrorKind::from(e))
    }
}

impl From<sable_ccitt::Error> for ErrorKind {
    fn from(e: sable_ccitt::Error) -> Self {
        match e {
            sable_ccitt::Error::UnexpectedEof => Self::IoExhausted,
            sable_ccitt::Error::InvalidTwoDimCode => Self::InvalidTwoDimCode,
            sable_ccitt::Error::WrongHorizontalCode => Self::WrongHorizontalCode,
            sable_ccitt::Error::CorruptEol => Self::CorruptEol,
            sable_ccitt::Error::CorruptRtc => Self::CorruptRtc,
            sable_ccitt::Error::CorruptEofb => Self::CorruptEofb,
            sable_ccitt::Error::LineLengthMismatch => {
                Self::Malformed("CCITT scanline length mismatch")
            }
            sable_ccitt::Error::Overflow => Self::Malformed("overflow in CCITT position"),
        }
    }
}

/// Result type for JBIG2 coding operations.
pub type Result<T> = core::result::Result<T, Error>;

macro_rules! bail {
    ($err:expr) => {
        return Err($err.into())
    };
}

macro_rules! err {
    ($err:expr) => {
        Err($err.into())
    };
}

pub(crate) use bail;
pub(crate) use err;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_chain_renders_innermost_first() {
        let err = Error::new(ErrorKind::IoExhausted)
            .in_segment(5, "text region")
            .in_segment(9, "outer")
            .on_page(2);

        assert_eq!(err.segment(), Some(5));
        assert_eq!(err.page(), Some(2));
        assert_eq!(
            err.to_string(),
            "page 2: segment 5 (text region): unexpected end of input"
        );
    }
}
