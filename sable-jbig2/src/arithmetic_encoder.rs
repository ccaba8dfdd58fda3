//! The MQ arithmetic encoder (T.88 Annex E).
//!
//! The encoder is the exact inverse of [`crate::arithmetic_decoder`]: the
//! same probability table, the same context adaptivity, plus the BYTEOUT
//! byte-stuffing rule that keeps 0xFF from being followed by anything a
//! decoder could mistake for a marker. [`ArithmeticEncoder::flush`]
//! terminates the coded data with the `FF AC` sequence region decoders
//! expect at the end of every arithmetically coded segment.

use crate::arithmetic_decoder::{Context, QE_TABLE};

/// The encoder state (E.3.1): the C and A registers, the bit counter CT and
/// a one-byte latch `b` that absorbs carries before it is committed.
pub(crate) struct ArithmeticEncoder {
    c: u32,
    a: u32,
    shift_count: u32,
    /// The pending output byte; carries from C propagate into it.
    latch: u8,
    /// Whether `latch` holds a byte yet (the first BYTEOUT has nothing to
    /// commit).
    latch_valid: bool,
    out: Vec<u8>,
}

impl ArithmeticEncoder {
    /// INITENC (E.3.7).
    pub(crate) fn new() -> Self {
        Self {
            c: 0,
            a: 0x8000,
            shift_count: 12,
            latch: 0,
            latch_valid: false,
            out: Vec::new(),
        }
    }

    /// Encode one decision in the given context.
    #[inline(always)]
    pub(crate) fn encode(&mut self, context: &mut Context, bit: u32) {
        if bit == context.mps {
            self.code_mps(context);
        } else {
            self.code_lps(context);
        }
    }

    /// CODEMPS (E.3.2, Figure E.15).
    #[inline(always)]
    fn code_mps(&mut self, context: &mut Context) {
        let qe_entry = &QE_TABLE[context.index as usize];

        self.a -= qe_entry.qe;

        if self.a & 0x8000 == 0 {
            // Conditional exchange: the MPS interval became the smaller one.
            if self.a < qe_entry.qe {
                self.a = qe_entry.qe;
            } else {
                self.c += qe_entry.qe;
            }
            context.index = qe_entry.nmps;
            self.renormalize();
        } else {
            self.c += qe_entry.qe;
        }
    }

    /// CODELPS (E.3.2, Figure E.14).
    #[inline(always)]
    fn code_lps(&mut self, context: &mut Context) {
        let qe_entry = &QE_TABLE[context.index as usize];

        self.a -= qe_entry.qe;

        if self.a < qe_entry.qe {
            // Conditional exchange: code the LPS with the larger interval.
            self.c += qe_entry.qe;
        } else {
            self.a = qe_entry.qe;
        }

        if qe_entry.switch {
            context.mps = 1 - context.mps;
        }
        context.index = qe_entry.nlps;

        self.renormalize();
    }

    /// RENORME (E.3.3, Figure E.7).
    #[inline(always)]
    fn renormalize(&mut self) {
        loop {
            self.a <<= 1;
            self.c <<= 1;
            self.shift_count -= 1;

            if self.shift_count == 0 {
                self.byte_out();
            }

            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    /// BYTEOUT (E.3.4, Figure E.8): commit the latched byte and load the
    /// next one from C, inserting a stuff bit after 0xFF.
    fn byte_out(&mut self) {
        if self.latch == 0xFF && self.latch_valid {
            self.stuffed_out();
            return;
        }

        if self.c < 0x800_0000 {
            self.plain_out();
            return;
        }

        // Propagate the carry into the pending byte.
        self.latch = self.latch.wrapping_add(1);
        if self.latch == 0xFF {
            self.c &= 0x7FF_FFFF;
            self.stuffed_out();
        } else {
            self.plain_out();
        }
    }

    /// Emit the latch and load 8 fresh bits.
    fn plain_out(&mut self) {
        self.commit_latch();
        self.latch = (self.c >> 19) as u8;
        self.c &= 0x7_FFFF;
        self.shift_count = 8;
    }

    /// Emit the latch and load 7 fresh bits, leaving room for the stuff
    /// bit that follows 0xFF.
    fn stuffed_out(&mut self) {
        self.commit_latch();
        self.latch = (self.c >> 20) as u8;
        self.c &= 0xF_FFFF;
        self.shift_count = 7;
    }

    fn commit_latch(&mut self) {
        if self.latch_valid {
            self.out.push(self.latch);
        }
        self.latch_valid = true;
    }

    /// FLUSH (E.3.8): force out the final interval bits and terminate with
    /// `FF AC`.
    pub(crate) fn flush(mut self) -> Vec<u8> {
        // SETBITS: set as many low-order bits of C to 1 as possible without
        // leaving the final interval.
        let upper = self.c + self.a;
        self.c |= 0xFFFF;
        if self.c >= upper {
            self.c -= 0x8000;
        }

        self.c <<= self.shift_count;
        self.byte_out();
        self.c <<= self.shift_count;
        self.byte_out();
        self.commit_latch();

        // The terminator expected at the end of every arithmetically coded
        // segment.
        if self.out.last() != Some(&0xFF) {
            self.out.push(0xFF);
        }
        self.out.push(0xAC);

        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arithmetic_decoder::ArithmeticDecoder;

    fn round_trip(bits: &[u32], contexts: usize, schedule: impl Fn(usize) -> usize) {
        let mut encoder = ArithmeticEncoder::new();
        let mut enc_contexts = vec![Context::default(); contexts];
        for (i, &bit) in bits.iter().enumerate() {
            encoder.encode(&mut enc_contexts[schedule(i)], bit);
        }
        let coded = encoder.flush();

        assert_eq!(&coded[coded.len() - 2..], &[0xFF, 0xAC]);

        let mut decoder = ArithmeticDecoder::new(&coded);
        let mut dec_contexts = vec![Context::default(); contexts];
        for (i, &bit) in bits.iter().enumerate() {
            assert_eq!(decoder.decode(&mut dec_contexts[schedule(i)]), bit, "bit {i}");
        }
    }

    #[test]
    fn round_trips_a_constant_stream() {
        round_trip(&[0; 4096], 1, |_| 0);
        round_trip(&[1; 4096], 1, |_| 0);
    }

    #[test]
    fn round_trips_alternating_bits() {
        let bits: Vec<u32> = (0..2048).map(|i| (i % 2) as u32).collect();
        round_trip(&bits, 1, |_| 0);
    }

    #[test]
    fn round_trips_a_skewed_pseudorandom_stream() {
        // A fixed linear congruential sequence: mostly-zero bits stress the
        // MPS path, the occasional LPS drives state transitions.
        let mut state = 0x1234_5678_u32;
        let bits: Vec<u32> = (0..8192)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                u32::from(state >> 29 == 0)
            })
            .collect();
        round_trip(&bits, 1, |_| 0);
    }

    #[test]
    fn round_trips_across_multiple_contexts() {
        let mut state = 0x8BAD_F00D_u32;
        let bits: Vec<u32> = (0..4096)
            .map(|_| {
                state = state.wrapping_mul(69_069).wrapping_add(1);
                (state >> 31) & 1
            })
            .collect();
        round_trip(&bits, 16, |i| i % 16);
    }

    #[test]
    fn output_is_deterministic() {
        let bits: Vec<u32> = (0..512).map(|i| u32::from(i % 7 == 0)).collect();

        let encode = || {
            let mut encoder = ArithmeticEncoder::new();
            let mut context = Context::default();
            for &bit in &bits {
                encoder.encode(&mut context, bit);
            }
            encoder.flush()
        };

        assert_eq!(encode(), encode());
    }
}
