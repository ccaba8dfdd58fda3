//! Encoding of bi-level rasters into Group 3 / Group 4 streams (T.4
//! Section 4, T.6 Section 2).
//!
//! The encoder mirrors the decoder's changing-element model: mode selection
//! for two-dimensionally coded rows follows T.6 Section 2.2.3 exactly, so a
//! conforming decoder reconstructs the input bit for bit.

use alloc::vec::Vec;

use crate::bit_writer::BitWriter;
use crate::tables::{EOL, TwoDimMode, makeup_code, terminating_code};
use crate::{Error, Mode, Result, Settings};

/// Encode packed MSB-first rows into a coded byte stream.
///
/// `rows` must hold `settings.rows` rows of `settings.stride()` bytes each,
/// with the polarity declared by `settings.black_is_one`.
pub fn encode(rows: &[u8], settings: &Settings) -> Result<Vec<u8>> {
    let stride = settings.stride();
    let expected = stride
        .checked_mul(settings.rows as usize)
        .ok_or(Error::Overflow)?;
    if settings.columns == 0 || rows.len() != expected {
        return Err(Error::LineLengthMismatch);
    }

    log::trace!(
        "encoding {}x{} raster, mode {:?}",
        settings.columns,
        settings.rows,
        settings.mode
    );

    let mut writer = BitWriter::new();
    // Changing elements of the previous row; empty means the imaginary
    // all-white reference line.
    let mut reference: Vec<u32> = Vec::new();
    let mut current: Vec<u32> = Vec::new();

    for row_idx in 0..settings.rows as usize {
        let row = &rows[row_idx * stride..(row_idx + 1) * stride];
        changing_elements(row, settings, &mut current);

        match settings.mode {
            Mode::Group3OneDim => {
                if settings.end_of_line {
                    writer.write_bits(EOL, 12);
                }
                encode_1d_row(&mut writer, &current, settings.columns);
            }
            Mode::Group3Mixed { k } => {
                if settings.end_of_line {
                    writer.write_bits(EOL, 12);
                }
                // T.4 Section 4.2: at least every Kth row is coded
                // one-dimensionally so transmission errors cannot propagate
                // indefinitely.
                let one_dim = k < 2 || row_idx as u32 % k == 0;
                writer.write_bit(u32::from(one_dim));
                if one_dim {
                    encode_1d_row(&mut writer, &current, settings.columns);
                } else {
                    encode_2d_row(&mut writer, &reference, &current, settings.columns);
                }
            }
            Mode::Group4 => {
                encode_2d_row(&mut writer, &reference, &current, settings.columns);
            }
        }

        if settings.encoded_byte_align {
            writer.align();
        }

        core::mem::swap(&mut reference, &mut current);
    }

    if settings.end_of_block {
        match settings.mode {
            // The return-to-control sequence: six EOLs (T.4 Section 4.1.4).
            Mode::Group3OneDim => {
                for _ in 0..6 {
                    writer.write_bits(EOL, 12);
                }
            }
            // Six EOL+1 pairs in the mixed scheme.
            Mode::Group3Mixed { .. } => {
                for _ in 0..6 {
                    writer.write_bits(EOL, 12);
                    writer.write_bit(1);
                }
            }
            // The end-of-facsimile-block: two EOLs (T.6 Section 2.2.2).
            Mode::Group4 => {
                for _ in 0..2 {
                    writer.write_bits(EOL, 12);
                }
            }
        }
    }

    Ok(writer.into_bytes())
}

/// Collect the changing elements of a packed row: every position whose pixel
/// differs from the one before it, with an imaginary white pixel on the left.
fn changing_elements(row: &[u8], settings: &Settings, out: &mut Vec<u32>) {
    out.clear();
    let mut previous_black = false;

    for x in 0..settings.columns {
        let bit = (row[(x / 8) as usize] >> (7 - x % 8)) & 1;
        let black = (bit == 1) == settings.black_is_one;
        if black != previous_black {
            out.push(x);
            previous_black = black;
        }
    }
}

/// Emit a run of `len` pixels of one colour as terminating plus make-up
/// codes (T.4 Section 4.1.1).
fn encode_run(writer: &mut BitWriter, white: bool, mut len: u32) {
    while len >= 2624 {
        let (bits, code) = makeup_code(white, 2560);
        writer.write_bits(code as u32, bits);
        len -= 2560;
    }
    if len >= 64 {
        let makeup = (len & !63) as u16;
        let (bits, code) = makeup_code(white, makeup);
        writer.write_bits(code as u32, bits);
        len &= 63;
    }
    let (bits, code) = terminating_code(white, len as u16);
    writer.write_bits(code as u32, bits);
}

/// Emit a row as alternating white/black runs, starting with a (possibly
/// empty) white run.
fn encode_1d_row(writer: &mut BitWriter, changes: &[u32], columns: u32) {
    let mut white = true;
    let mut pos = 0_u32;

    for &change in changes {
        encode_run(writer, white, change - pos);
        pos = change;
        white = !white;
    }
    encode_run(writer, white, columns - pos);
}

/// Emit a row relative to the reference row above it (T.6 Section 2.2.3).
fn encode_2d_row(writer: &mut BitWriter, reference: &[u32], current: &[u32], columns: u32) {
    // The position reached on the coding line. A position of zero stands
    // for the imaginary white element just before the row, matching the
    // decoder's notion of a0.
    let mut position = 0_u32;
    // Index of the next changing element to code; even indices start black
    // runs, so the current run colour follows from the parity.
    let mut change_idx = 0_usize;

    while position < columns {
        let white = change_idx % 2 == 0;
        let a1 = current.get(change_idx).copied().unwrap_or(columns);
        let a2 = current.get(change_idx + 1).copied().unwrap_or(columns);

        let (b1, b2) = reference_changes(reference, position, white, columns);

        if b2 < a1 {
            // Pass mode: the colour carries through to below b2.
            let (bits, code) = TwoDimMode::Pass.code();
            writer.write_bits(code as u32, bits);
            position = b2;
        } else if a1.abs_diff(b1) <= 3 {
            // Vertical mode: code a1 relative to b1.
            let delta = a1 as i64 - b1 as i64;
            let (bits, code) = TwoDimMode::Vertical(delta as i8).code();
            writer.write_bits(code as u32, bits);
            position = a1;
            change_idx += 1;
        } else {
            // Horizontal mode: two explicit runs. The decoder always reads
            // both, even when the first one completes the row.
            let (bits, code) = TwoDimMode::Horizontal.code();
            writer.write_bits(code as u32, bits);
            encode_run(writer, white, a1 - position);
            encode_run(writer, !white, a2 - a1);
            position = a2;
            change_idx += 2;
        }
    }
}

/// The (b1, b2) pair for the current position and colour: b1 is the first
/// change on the reference line strictly right of a0 that starts a run of
/// the opposite colour, b2 the change after it.
fn reference_changes(reference: &[u32], position: u32, white: bool, columns: u32) -> (u32, u32) {
    let min = if position > 0 { position + 1 } else { 0 };
    let mut i = reference.partition_point(|&idx| idx < min);

    // Changes alternate white->black, black->white; even indices start
    // black runs.
    let wants_black_start = white;
    loop {
        match reference.get(i) {
            Some(_) => {
                if (i % 2 == 0) == wants_black_start {
                    break;
                }
                i += 1;
            }
            None => return (columns, columns),
        }
    }

    let b1 = reference[i];
    let b2 = reference.get(i + 1).copied().unwrap_or(columns);
    (b1, b2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode_packed;
    use alloc::vec;

    fn settings(mode: Mode, columns: u32, rows: u32) -> Settings {
        Settings {
            columns,
            rows,
            mode,
            end_of_line: false,
            encoded_byte_align: false,
            end_of_block: false,
            black_is_one: true,
        }
    }

    #[test]
    fn one_dimensional_single_row() {
        // 8 white, 8 black, 8 white with black_is_one polarity.
        let row = [0x00, 0xFF, 0x00];
        let settings = settings(Mode::Group3OneDim, 24, 1);

        let encoded = encode(&row, &settings).unwrap();
        let decoded = decode_packed(&encoded, &settings).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn row_starting_black_gets_zero_white_run() {
        let row = [0xF0];
        let settings = settings(Mode::Group3OneDim, 8, 1);

        let encoded = encode(&row, &settings).unwrap();
        let decoded = decode_packed(&encoded, &settings).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn group4_vertical_and_pass_modes() {
        // Three rows exercising vertical coding and a pass over a short
        // black run.
        let rows = vec![
            0b00111100, //
            0b00111100, //
            0b00000000,
        ];
        let settings = settings(Mode::Group4, 8, 3);

        let encoded = encode(&rows, &settings).unwrap();
        let decoded = decode_packed(&encoded, &settings).unwrap();
        assert_eq!(decoded, rows);
    }

    #[test]
    fn run_longer_than_makeup_table() {
        // A single row wider than 2560 pixels forces chained make-up codes.
        let columns = 2600_u32;
        let stride = columns.div_ceil(8) as usize;
        let mut row = vec![0_u8; stride];
        // Black run of 2600 - 16 pixels after 16 white.
        for x in 16..columns {
            row[(x / 8) as usize] |= 0x80 >> (x % 8);
        }
        let settings = settings(Mode::Group3OneDim, columns, 1);

        let encoded = encode(&row, &settings).unwrap();
        let decoded = decode_packed(&encoded, &settings).unwrap();
        assert_eq!(decoded, row);
    }
}
