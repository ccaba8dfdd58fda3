//! Arithmetic integer and symbol ID encoding: the exact inverses of the
//! Annex A decoding procedures.

use crate::arithmetic_decoder::Context;
use crate::arithmetic_encoder::ArithmeticEncoder;

/// The encode side of an IAx procedure (A.2): 512 contexts indexed by the
/// bits emitted so far in the current invocation.
pub(crate) struct IntegerEncoder {
    contexts: Vec<Context>,
}

impl IntegerEncoder {
    pub(crate) fn new() -> Self {
        Self {
            contexts: vec![Context::default(); 512],
        }
    }

    /// Encode one value; `None` emits the out-of-band marker.
    pub(crate) fn encode(&mut self, encoder: &mut ArithmeticEncoder, value: Option<i32>) {
        let mut prev: u32 = 1;

        let (sign, magnitude) = match value {
            // OOB is S = 1, V = 0.
            None => (1, 0_u32),
            Some(v) if v < 0 => (1, v.unsigned_abs()),
            Some(v) => (0, v as u32),
        };

        self.encode_bit(encoder, &mut prev, sign);

        // The value classes of Figure A.1, mirrored: a run of 1 selector
        // bits picks the class, then the offset magnitude follows.
        if magnitude < 4 {
            self.encode_bit(encoder, &mut prev, 0);
            self.encode_bits(encoder, &mut prev, magnitude, 2);
        } else if magnitude < 20 {
            self.encode_bit(encoder, &mut prev, 1);
            self.encode_bit(encoder, &mut prev, 0);
            self.encode_bits(encoder, &mut prev, magnitude - 4, 4);
        } else if magnitude < 84 {
            for bit in [1, 1, 0] {
                self.encode_bit(encoder, &mut prev, bit);
            }
            self.encode_bits(encoder, &mut prev, magnitude - 20, 6);
        } else if magnitude < 340 {
            for bit in [1, 1, 1, 0] {
                self.encode_bit(encoder, &mut prev, bit);
            }
            self.encode_bits(encoder, &mut prev, magnitude - 84, 8);
        } else if magnitude < 4436 {
            for bit in [1, 1, 1, 1, 0] {
                self.encode_bit(encoder, &mut prev, bit);
            }
            self.encode_bits(encoder, &mut prev, magnitude - 340, 12);
        } else {
            for bit in [1, 1, 1, 1, 1] {
                self.encode_bit(encoder, &mut prev, bit);
            }
            self.encode_bits(encoder, &mut prev, magnitude - 4436, 32);
        }
    }

    #[inline]
    fn encode_bit(&mut self, encoder: &mut ArithmeticEncoder, prev: &mut u32, bit: u32) {
        let ctx_idx = (*prev & 0x1FF) as usize;
        encoder.encode(&mut self.contexts[ctx_idx], bit);

        if *prev < 256 {
            *prev = (*prev << 1) | bit;
        } else {
            *prev = (((*prev << 1) | bit) & 511) | 256;
        }
    }

    fn encode_bits(
        &mut self,
        encoder: &mut ArithmeticEncoder,
        prev: &mut u32,
        value: u32,
        count: usize,
    ) {
        for i in (0..count).rev() {
            self.encode_bit(encoder, prev, (value >> i) & 1);
        }
    }
}

/// The encode side of IAID (A.3): fixed-width symbol IDs.
pub(crate) struct SymbolIdEncoder {
    contexts: Vec<Context>,
    code_len: u32,
}

impl SymbolIdEncoder {
    pub(crate) fn new(code_len: u32) -> Self {
        Self {
            contexts: vec![Context::default(); 1_usize << code_len],
            code_len,
        }
    }

    pub(crate) fn encode(&mut self, encoder: &mut ArithmeticEncoder, id: u32) {
        let mut prev = 1_u32;

        for i in (0..self.code_len).rev() {
            let bit = (id >> i) & 1;
            let ctx_mask = (1_u32 << (self.code_len + 1)) - 1;
            let ctx_idx = (prev & ctx_mask) as usize;
            encoder.encode(&mut self.contexts[ctx_idx], bit);
            prev = (prev << 1) | bit;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arithmetic_decoder::ArithmeticDecoder;
    use crate::integer_decoder::IntegerDecoder;
    use crate::symbol_id_decoder::SymbolIdDecoder;

    #[test]
    fn integer_values_round_trip() {
        let values: Vec<Option<i32>> = vec![
            Some(0),
            Some(1),
            Some(-1),
            Some(3),
            Some(4),
            Some(19),
            Some(20),
            Some(83),
            Some(84),
            Some(339),
            Some(340),
            Some(4435),
            Some(4436),
            Some(100_000),
            Some(-100_000),
            None,
            Some(7),
            None,
            Some(-42),
        ];

        let mut encoder = ArithmeticEncoder::new();
        let mut int_encoder = IntegerEncoder::new();
        for &value in &values {
            int_encoder.encode(&mut encoder, value);
        }
        let coded = encoder.flush();

        let mut decoder = ArithmeticDecoder::new(&coded);
        let mut int_decoder = IntegerDecoder::new();
        for (i, &value) in values.iter().enumerate() {
            assert_eq!(int_decoder.decode(&mut decoder), value, "value {i}");
        }
    }

    #[test]
    fn symbol_ids_round_trip() {
        let code_len = 5;
        let ids: Vec<u32> = (0..32).chain([31, 0, 17, 17, 3]).collect();

        let mut encoder = ArithmeticEncoder::new();
        let mut id_encoder = SymbolIdEncoder::new(code_len);
        for &id in &ids {
            id_encoder.encode(&mut encoder, id);
        }
        let coded = encoder.flush();

        let mut decoder = ArithmeticDecoder::new(&coded);
        let mut id_decoder = SymbolIdDecoder::new(code_len);
        for (i, &id) in ids.iter().enumerate() {
            assert_eq!(id_decoder.decode(&mut decoder), id, "id {i}");
        }
    }
}
