//! Decoding of Group 3 and Group 4 coded streams (T.4 Section 4, T.6
//! Section 2).

use alloc::vec::Vec;

use crate::bit_reader::BitReader;
use crate::tables::{
    BLACK_STATES, EOFB, EOL, INVALID, MODE_STATES, State, TwoDimMode, VALUE_FLAG, VALUE_MASK,
    WHITE_STATES,
};
use crate::{Error, Mode, PackedSink, Result, RowSink, Settings};

/// Pixel colour in a bi-level image. Every run sequence starts white.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Black,
}

impl Color {
    #[inline(always)]
    fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }

    #[inline(always)]
    fn is_white(self) -> bool {
        matches!(self, Self::White)
    }
}

/// A colour change at a specific index in a line.
#[derive(Clone, Copy)]
struct ColorChange {
    idx: u32,
    color: Color,
}

impl BitReader<'_> {
    #[inline(always)]
    fn decode_run_inner(&mut self, states: &[State], invalid: Error) -> Result<u16> {
        let mut total: u16 = 0;
        let mut state: usize = 0;

        loop {
            let bit = self.read_bit()?;

            let transition = if bit == 0 {
                states[state].on_0
            } else {
                states[state].on_1
            };

            if transition == INVALID {
                return Err(invalid);
            } else if transition & VALUE_FLAG != 0 {
                let len = transition & VALUE_MASK;
                total = total.checked_add(len).ok_or(Error::Overflow)?;

                // Run lengths below 64 are terminating codes; larger values
                // are make-up codes followed by more of the same colour.
                if len < 64 {
                    return Ok(total);
                }

                state = 0;
            } else {
                state = transition as usize;
            }
        }
    }

    #[inline(always)]
    fn decode_run(&mut self, color: Color, invalid: Error) -> Result<u16> {
        if color.is_white() {
            self.decode_run_inner(&WHITE_STATES, invalid)
        } else {
            self.decode_run_inner(&BLACK_STATES, invalid)
        }
    }

    #[inline(always)]
    fn decode_two_dim_mode(&mut self) -> Result<TwoDimMode> {
        let mode_id = self.decode_run_inner(&MODE_STATES, Error::InvalidTwoDimCode)?;
        TwoDimMode::from_id(mode_id).ok_or(Error::InvalidTwoDimCode)
    }

    /// Consume consecutive end-of-line codes, returning how many were read.
    #[inline(always)]
    fn count_eols(&mut self) -> usize {
        let mut count = 0;
        while self.peek_bits(12) == Ok(EOL) {
            count += 1;
            let _ = self.read_bits(12);
        }

        count
    }

    /// Consume consecutive `EOL + 1` sequences (the Group 3 2-D row
    /// signalling), returning how many were read.
    #[inline(always)]
    fn count_eol1s(&mut self) -> usize {
        let mut count = 0;
        while self.peek_bits(13) == Ok((EOL << 1) | 1) {
            count += 1;
            let _ = self.read_bits(13);
        }

        count
    }

    /// Require an end-of-line code, tolerating zero fill bits before it
    /// (T.4 Section 4.1.2).
    fn expect_eol(&mut self) -> Result<()> {
        let mut zeros = 0_u32;
        loop {
            match self.read_bit() {
                Ok(0) => zeros += 1,
                Ok(_) => break,
                Err(_) => return Err(Error::CorruptEol),
            }
        }

        if zeros >= 11 { Ok(()) } else { Err(Error::CorruptEol) }
    }
}

/// Decode the given data, pushing runs into `sink`.
///
/// On success, returns the number of bytes consumed. Even when an error is
/// returned, any rows completed before it are already in the sink, so a
/// truncated image can still be used.
pub fn decode(data: &[u8], sink: &mut impl RowSink, settings: &Settings) -> Result<usize> {
    let mut ctx = DecoderContext::new(sink, settings);
    let mut reader = BitReader::new(data);

    match settings.mode {
        Mode::Group4 => decode_group4(&mut ctx, &mut reader)?,
        Mode::Group3OneDim => decode_group3_1d(&mut ctx, &mut reader)?,
        Mode::Group3Mixed { .. } => decode_group3_2d(&mut ctx, &mut reader)?,
    }

    reader.align();
    Ok(reader.byte_pos())
}

/// Decode the given data into packed MSB-first rows with the polarity
/// requested by `settings.black_is_one`.
pub fn decode_packed(data: &[u8], settings: &Settings) -> Result<Vec<u8>> {
    let mut sink = PackedSink::new(settings);
    decode(data, &mut sink, settings)?;
    Ok(sink.into_bytes())
}

/// Group 3 one-dimensional decoding (T.4 Section 4.1).
fn decode_group3_1d<T: RowSink>(
    ctx: &mut DecoderContext<'_, T>,
    reader: &mut BitReader<'_>,
) -> Result<()> {
    loop {
        if ctx.decoded_rows == ctx.settings.rows || reader.at_end() {
            break;
        }

        // The EOL preceding each row. It is required in strict mode, but
        // producers are sloppy with the flag, so one is always accepted.
        if ctx.settings.end_of_line {
            reader.expect_eol()?;
        } else if reader.peek_bits(12) == Ok(EOL) {
            let _ = reader.read_bits(12);
        }

        // A second EOL directly after a row boundary can only be the
        // return-to-control sequence (six EOLs, T.4 Section 4.1.4).
        if ctx.settings.end_of_block && reader.peek_bits(12) == Ok(EOL) {
            if reader.count_eols() < 4 {
                return Err(Error::CorruptRtc);
            }
            break;
        }

        decode_1d_line(ctx, reader)?;
        ctx.next_line(reader)?;
    }

    Ok(())
}

/// Group 3 two-dimensional decoding (T.4 Section 4.2).
///
/// Every row carries a one-bit tag selecting one- or two-dimensional coding
/// for that row; the encoder's K parameter only governs the cadence with
/// which it sets the tag.
fn decode_group3_2d<T: RowSink>(
    ctx: &mut DecoderContext<'_, T>,
    reader: &mut BitReader<'_>,
) -> Result<()> {
    loop {
        if ctx.decoded_rows == ctx.settings.rows || reader.at_end() {
            break;
        }

        if ctx.settings.end_of_line {
            reader.expect_eol()?;
        } else if reader.peek_bits(12) == Ok(EOL) {
            let _ = reader.read_bits(12);
        }

        let tag_bit = reader.read_bit()?;

        // A 1-D tagged row whose data opens with an EOL is the terminator:
        // the return-to-control sequence in 2-D mode is six EOL+1 pairs.
        if tag_bit == 1 && ctx.settings.end_of_block && reader.peek_bits(12) == Ok(EOL) {
            if reader.count_eol1s() < 4 {
                return Err(Error::CorruptRtc);
            }
            break;
        }

        if tag_bit == 1 {
            decode_1d_line(ctx, reader)?;
        } else {
            decode_2d_line(ctx, reader)?;
        }

        ctx.next_line(reader)?;
    }

    Ok(())
}

/// Group 4 decoding (T.6 Section 2).
fn decode_group4<T: RowSink>(
    ctx: &mut DecoderContext<'_, T>,
    reader: &mut BitReader<'_>,
) -> Result<()> {
    loop {
        // A valid two-dimensionally coded row can never start with eleven
        // zero bits, so an EOL prefix here must be the EOFB.
        if ctx.settings.end_of_block && reader.peek_bits(12) == Ok(EOL) {
            if reader.peek_bits(24) != Ok(EOFB) {
                return Err(Error::CorruptEofb);
            }
            let _ = reader.read_bits(24);
            break;
        }

        if ctx.decoded_rows == ctx.settings.rows || reader.at_end() {
            break;
        }

        decode_2d_line(ctx, reader)?;
        ctx.next_line(reader)?;
    }

    Ok(())
}

/// Decode a single 1-D coded line (T.4 Section 4.1.1).
#[inline(always)]
fn decode_1d_line<T: RowSink>(
    ctx: &mut DecoderContext<'_, T>,
    reader: &mut BitReader<'_>,
) -> Result<()> {
    while !ctx.at_eol() {
        // A run of zeros too long to be a code is a premature end-of-line.
        let run_length = reader.decode_run(ctx.color, Error::CorruptEol)?;
        ctx.push_pixels(run_length as u32);
        ctx.color = ctx.color.opposite();
    }

    Ok(())
}

/// Decode a single 2-D coded line (T.4 Section 4.2, T.6 Section 2.2).
#[inline(always)]
fn decode_2d_line<T: RowSink>(
    ctx: &mut DecoderContext<'_, T>,
    reader: &mut BitReader<'_>,
) -> Result<()> {
    while !ctx.at_eol() {
        let mode = reader.decode_two_dim_mode()?;

        match mode {
            // Pass mode (T.6 Section 2.2.3.1): carry the colour through to
            // below b2.
            TwoDimMode::Pass => {
                ctx.push_pixels(ctx.b2() - ctx.a0().unwrap_or(0));
                ctx.update_b();
            }
            // Vertical mode (T.6 Section 2.2.3.2): a1 is coded relative
            // to b1.
            TwoDimMode::Vertical(i) => {
                let b1 = ctx.b1();
                let a1 = if i >= 0 {
                    b1.checked_add(i as u32).ok_or(Error::Overflow)?
                } else {
                    b1.checked_sub((-i) as u32).ok_or(Error::Overflow)?
                };

                let a0 = ctx.a0().unwrap_or(0);

                ctx.push_pixels(a1.checked_sub(a0).ok_or(Error::Overflow)?);
                ctx.color = ctx.color.opposite();

                ctx.update_b();
            }
            // Horizontal mode (T.6 Section 2.2.3.3): two explicit runs.
            TwoDimMode::Horizontal => {
                let a0a1 = reader.decode_run(ctx.color, Error::WrongHorizontalCode)?;
                ctx.push_pixels(a0a1 as u32);
                ctx.color = ctx.color.opposite();

                let a1a2 = reader.decode_run(ctx.color, Error::WrongHorizontalCode)?;
                ctx.push_pixels(a1a2 as u32);
                ctx.color = ctx.color.opposite();

                ctx.update_b();
            }
        }
    }

    Ok(())
}

struct DecoderContext<'a, T: RowSink> {
    /// Colour changes in the reference line (the previous line).
    ref_changes: Vec<ColorChange>,
    /// The minimum index to start from when searching for b1.
    ref_pos: u32,
    /// The current index of b1 within `ref_changes`.
    b1_idx: u32,
    /// Colour changes in the line currently being decoded.
    coding_changes: Vec<ColorChange>,
    /// Number of pixels decoded on the current line.
    pixels_decoded: u32,
    sink: &'a mut T,
    /// The width of a line in pixels.
    line_width: u32,
    /// The colour of the next run to be decoded.
    color: Color,
    decoded_rows: u32,
    settings: &'a Settings,
}

impl<'a, T: RowSink> DecoderContext<'a, T> {
    fn new(sink: &'a mut T, settings: &'a Settings) -> Self {
        Self {
            ref_changes: Vec::new(),
            ref_pos: 0,
            b1_idx: 0,
            coding_changes: Vec::new(),
            pixels_decoded: 0,
            sink,
            line_width: settings.columns,
            // Each line starts with an imaginary white pixel on the left.
            color: Color::White,
            decoded_rows: 0,
            settings,
        }
    }

    /// `a0`: the position reached on the coding line, or `None` before the
    /// first element has been coded.
    fn a0(&self) -> Option<u32> {
        if self.pixels_decoded == 0 {
            None
        } else {
            Some(self.pixels_decoded)
        }
    }

    /// "The first changing element on the reference line to the right of a0
    /// and of opposite colour to a0."
    fn b1(&self) -> u32 {
        self.ref_changes
            .get(self.b1_idx as usize)
            .map_or(self.line_width, |c| c.idx)
    }

    /// "The next changing element to the right of b1, on the reference line."
    fn b2(&self) -> u32 {
        self.ref_changes
            .get(self.b1_idx as usize + 1)
            .map_or(self.line_width, |c| c.idx)
    }

    /// Recompute b1 (and implicitly b2) after a0 moved.
    #[inline(always)]
    fn update_b(&mut self) {
        let target_color = self.color.opposite();
        // b1 must be strictly greater than a0.
        let min_idx = self.a0().map_or(0, |a| a + 1);

        self.b1_idx = self.line_width;

        for i in self.ref_pos..self.ref_changes.len() as u32 {
            let change = &self.ref_changes[i as usize];

            if change.idx < min_idx {
                self.ref_pos = i + 1;
                continue;
            }

            if change.color == target_color {
                self.b1_idx = i;
                break;
            }
        }
    }

    #[inline(always)]
    fn push_pixels(&mut self, count: u32) {
        // Clamp so an invalid file cannot overrun the line.
        let count = count.min(self.line_width - self.pixels_decoded);
        if count == 0 {
            return;
        }

        self.sink.push_run(!self.color.is_white(), count);

        // Record the colour change: at the start of the line only a black
        // run differs from the imaginary white pixel.
        let is_change = self
            .coding_changes
            .last()
            .map_or(!self.color.is_white(), |last| last.color != self.color);
        if is_change {
            self.coding_changes.push(ColorChange {
                idx: self.pixels_decoded,
                color: self.color,
            });
        }
        self.pixels_decoded += count;
    }

    fn at_eol(&self) -> bool {
        self.pixels_decoded == self.line_width
    }

    #[inline(always)]
    fn next_line(&mut self, reader: &mut BitReader<'_>) -> Result<()> {
        if self.pixels_decoded != self.settings.columns {
            return Err(Error::LineLengthMismatch);
        }

        core::mem::swap(&mut self.ref_changes, &mut self.coding_changes);
        self.coding_changes.clear();
        self.pixels_decoded = 0;
        self.ref_pos = 0;
        self.b1_idx = 0;
        self.color = Color::White;
        self.decoded_rows += 1;
        self.sink.end_row();

        if self.settings.encoded_byte_align {
            reader.align();
        }

        self.update_b();

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unusual_byte_groupings)]
mod tests {
    use super::*;

    fn white_run(data: &[u8]) -> Result<u16> {
        BitReader::new(data).decode_run(Color::White, Error::CorruptEol)
    }

    fn black_run(data: &[u8]) -> Result<u16> {
        BitReader::new(data).decode_run(Color::Black, Error::CorruptEol)
    }

    #[test]
    fn white_terminating_codes() {
        // Run length 2: code = 0111 (4 bits).
        assert_eq!(white_run(&[0b0111_0000]), Ok(2));
        // Run length 0: code = 00110101 (8 bits).
        assert_eq!(white_run(&[0b00110101]), Ok(0));
        // Run length 63: code = 00110100 (8 bits).
        assert_eq!(white_run(&[0b00110100]), Ok(63));
    }

    #[test]
    fn black_terminating_codes() {
        // Run length 2: code = 11 (2 bits).
        assert_eq!(black_run(&[0b1100_0000]), Ok(2));
        // Run length 1: code = 010 (3 bits).
        assert_eq!(black_run(&[0b010_00000]), Ok(1));
        // Run length 0: code = 0000110111 (10 bits).
        assert_eq!(black_run(&[0b00001101, 0b11_000000]), Ok(0));
    }

    #[test]
    fn white_makeup_codes() {
        // 64 + 0: makeup 64 = 11011, terminal 0 = 00110101.
        assert_eq!(white_run(&[0b11011_001, 0b10101_000]), Ok(64));
        // 128 + 5: makeup 128 = 10010, terminal 5 = 1100.
        assert_eq!(white_run(&[0b10010_110, 0b0_0000000]), Ok(133));
        // 64 + 64 + 0 chained makeups.
        assert_eq!(white_run(&[0b11011_110, 0b11_001101, 0b01_000000]), Ok(128));
    }

    #[test]
    fn black_makeup_codes() {
        // 64 + 2: makeup 64 = 0000001111, terminal 2 = 11.
        assert_eq!(black_run(&[0b00000011, 0b11_11_0000]), Ok(66));
    }

    #[test]
    fn common_makeup_codes() {
        // 1792 + 0: makeup 1792 = 00000001000 (11 bits), shared by both
        // colours.
        assert_eq!(
            white_run(&[0b00000001, 0b000_00110, 0b101_00000]),
            Ok(1792)
        );
        assert_eq!(
            black_run(&[0b00000001, 0b000_00001, 0b10111_000]),
            Ok(1792)
        );
    }

    #[test]
    fn mode_codes() {
        let mode = |data: &[u8]| BitReader::new(data).decode_two_dim_mode();

        assert_eq!(mode(&[0b1000_0000]), Ok(TwoDimMode::Vertical(0)));
        assert_eq!(mode(&[0b001_00000]), Ok(TwoDimMode::Horizontal));
        assert_eq!(mode(&[0b0001_0000]), Ok(TwoDimMode::Pass));
        assert_eq!(mode(&[0b011_00000]), Ok(TwoDimMode::Vertical(1)));
        assert_eq!(mode(&[0b010_00000]), Ok(TwoDimMode::Vertical(-1)));
        assert_eq!(mode(&[0b000011_00]), Ok(TwoDimMode::Vertical(2)));
        assert_eq!(mode(&[0b000010_00]), Ok(TwoDimMode::Vertical(-2)));
        assert_eq!(mode(&[0b0000011_0]), Ok(TwoDimMode::Vertical(3)));
        assert_eq!(mode(&[0b0000010_0]), Ok(TwoDimMode::Vertical(-3)));
    }

    #[test]
    fn run_decode_at_eof() {
        assert_eq!(white_run(&[]), Err(Error::UnexpectedEof));
        assert_eq!(black_run(&[]), Err(Error::UnexpectedEof));
    }

    #[test]
    fn eol_expectation() {
        // A lone EOL with three fill bits in front.
        let mut reader = BitReader::new(&[0b000_00000, 0b0000_1000]);
        assert_eq!(reader.expect_eol(), Ok(()));

        // Too few zeros is not an EOL.
        let mut reader = BitReader::new(&[0b0001_0000]);
        assert_eq!(reader.expect_eol(), Err(Error::CorruptEol));
    }
}
