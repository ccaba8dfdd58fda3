//! Encode/decode round-trips across the whole flag space.

use sable_ccitt::{Mode, Settings, decode_packed, encode};

/// A test raster with runs of varied length, diagonal edges and an empty
/// row, exercising terminating codes, make-up codes and all three 2-D
/// coding modes.
fn test_raster(columns: u32, rows: u32) -> Vec<u8> {
    let stride = columns.div_ceil(8) as usize;
    let mut data = vec![0_u8; stride * rows as usize];

    let mut set = |x: u32, y: u32| {
        data[y as usize * stride + (x / 8) as usize] |= 0x80 >> (x % 8);
    };

    for y in 0..rows {
        if y == rows / 2 {
            // One all-white row in the middle.
            continue;
        }
        // A diagonal edge.
        for x in (y % 17)..(y % 17 + 9).min(columns) {
            set(x, y);
        }
        // A long run in the right half.
        if y % 3 != 0 {
            for x in columns / 2..(columns / 2 + columns / 3) {
                set(x, y);
            }
        }
        // Isolated pixels.
        set(columns - 1 - (y % 5), y);
    }

    data
}

/// Flip every pixel, keeping the padding bits past `columns` zero so the
/// result compares equal to decoder output.
fn invert_raster(data: &[u8], columns: u32) -> Vec<u8> {
    let stride = columns.div_ceil(8) as usize;
    let mut out: Vec<u8> = data.iter().map(|&b| !b).collect();
    let valid = columns % 8;
    if valid != 0 {
        let mask = 0xFF_u8 << (8 - valid);
        for row in out.chunks_mut(stride) {
            *row.last_mut().unwrap() &= mask;
        }
    }
    out
}

#[test]
fn all_flag_combinations_round_trip() {
    let columns = 123;
    let rows = 21;
    let raster = test_raster(columns, rows);

    for k in [0, 4, -1] {
        for end_of_line in [false, true] {
            for encoded_byte_align in [false, true] {
                for end_of_block in [false, true] {
                    for black_is_one in [false, true] {
                        let settings = Settings {
                            columns,
                            rows,
                            mode: Mode::from_k(k),
                            end_of_line,
                            encoded_byte_align,
                            end_of_block,
                            black_is_one,
                        };

                        // The raster is defined in black_is_one polarity;
                        // flip it for the opposite convention.
                        let input: Vec<u8> = if black_is_one {
                            raster.clone()
                        } else {
                            invert_raster(&raster, columns)
                        };

                        let encoded = encode(&input, &settings).unwrap();
                        let decoded = decode_packed(&encoded, &settings).unwrap();
                        assert_eq!(
                            decoded, input,
                            "mismatch for K={k} eol={end_of_line} \
                             align={encoded_byte_align} eob={end_of_block} \
                             black1={black_is_one}"
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn group4_wide_raster_round_trips() {
    // Wide enough to require common make-up codes in horizontal mode.
    let columns = 2560;
    let rows = 8;
    let raster = test_raster(columns, rows);

    let settings = Settings {
        columns,
        rows,
        mode: Mode::from_k(-1),
        end_of_line: false,
        encoded_byte_align: false,
        end_of_block: true,
        black_is_one: true,
    };

    let encoded = encode(&raster, &settings).unwrap();
    let decoded = decode_packed(&encoded, &settings).unwrap();
    assert_eq!(decoded, raster);
}

#[test]
fn truncated_stream_reports_eof() {
    let columns = 64;
    let rows = 16;
    let raster = test_raster(columns, rows);

    let settings = Settings {
        columns,
        rows,
        mode: Mode::from_k(-1),
        end_of_line: false,
        encoded_byte_align: false,
        end_of_block: false,
        black_is_one: true,
    };

    let encoded = encode(&raster, &settings).unwrap();
    // Two bytes is not even a full first row.
    let truncated = &encoded[..2];
    assert!(decode_packed(truncated, &settings).is_err());
}

#[test]
fn garbage_input_fails_cleanly() {
    let settings = Settings {
        columns: 64,
        rows: 4,
        mode: Mode::from_k(0),
        end_of_line: false,
        encoded_byte_align: false,
        end_of_block: false,
        black_is_one: true,
    };

    // An all-zero stream is neither a valid run code nor an EOL.
    assert!(decode_packed(&[0x00; 16], &settings).is_err());
}
