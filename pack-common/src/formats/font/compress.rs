//! Glyph bitmap RLE compression.
//!
//! The stream is decoded sample by sample by a three-state machine:
//!
//! - `Single`: read a `bpp`-bit literal. If it equals the previous literal
//!   the decoder enters `Repeat`.
//! - `Repeat`: read one bit. `1` repeats the previous value; the 11th
//!   consecutive `1` is followed by a 6-bit counter `c` and the decoder
//!   emits `c - 1` further repeats before reading the next literal.
//!   `0` is followed by a new literal.
//! - `Counter`: emit the previous value until the counter runs out.
//!
//! With the prefilter enabled each row is XORed with the previous row
//! before encoding, which turns vertical strokes into runs of zeros.

use super::Bpp;
use super::bitstream::{BitReader, BitWriter};

const REPEAT_LIMIT: u32 = 11;
const COUNTER_BITS: u8 = 6;
const COUNTER_MAX: usize = (1 << COUNTER_BITS) - 1;

#[derive(Debug, Clone, Copy)]
enum RleState {
    Single,
    Repeat { count: u32 },
    Counter { count: u32 },
}

/// XOR every row with the previous source row
fn prefilter_rows(samples: &[u8], width: usize) -> Vec<u8> {
    let mut out = samples.to_vec();
    if width == 0 {
        return out;
    }
    for i in (width..samples.len()).rev() {
        out[i] ^= samples[i - width];
    }
    out
}

/// Compress quantized samples of a `width`-wide glyph.
pub fn compress(samples: &[u8], width: usize, bpp: Bpp, prefilter: bool) -> Vec<u8> {
    let values = if prefilter {
        prefilter_rows(samples, width)
    } else {
        samples.to_vec()
    };
    let bits = bpp.bits();

    let mut writer = BitWriter::new();
    let mut state = RleState::Single;
    let mut prev = 0u8;
    let mut i = 0;

    while i < values.len() {
        let value = values[i];
        match state {
            RleState::Single => {
                writer.write(value as u32, bits);
                if i > 0 && value == prev {
                    state = RleState::Repeat { count: 0 };
                }
                prev = value;
                i += 1;
            }
            RleState::Repeat { count } => {
                let count = count + 1;
                if value != prev {
                    writer.write(0, 1);
                    writer.write(value as u32, bits);
                    prev = value;
                    i += 1;
                    state = RleState::Single;
                    continue;
                }

                writer.write(1, 1);
                i += 1;
                if count < REPEAT_LIMIT {
                    state = RleState::Repeat { count };
                    continue;
                }

                // Long run: counter covers the repeats still ahead, the
                // decoder then reads a fresh literal
                let ahead = values[i..].iter().take_while(|&&v| v == prev).count();
                let extra = ahead.min(COUNTER_MAX - 1);
                writer.write(extra as u32 + 1, COUNTER_BITS);
                i += extra;
                if i < values.len() {
                    prev = values[i];
                    writer.write(prev as u32, bits);
                    i += 1;
                }
                state = RleState::Single;
            }
            RleState::Counter { .. } => unreachable!("encoder never enters the counter state"),
        }
    }
    writer.finish()
}

struct RleDecoder<'a> {
    reader: BitReader<'a>,
    bits: u8,
    state: RleState,
    prev: u8,
    first: bool,
}

impl<'a> RleDecoder<'a> {
    fn new(data: &'a [u8], bits: u8) -> Self {
        Self {
            reader: BitReader::new(data),
            bits,
            state: RleState::Single,
            prev: 0,
            first: true,
        }
    }

    fn literal(&mut self) -> Option<u8> {
        let value = self.reader.read(self.bits)? as u8;
        self.prev = value;
        self.state = RleState::Single;
        Some(value)
    }

    fn next(&mut self) -> Option<u8> {
        match self.state {
            RleState::Single => {
                let value = self.reader.read(self.bits)? as u8;
                if !self.first && value == self.prev {
                    self.state = RleState::Repeat { count: 0 };
                }
                self.first = false;
                self.prev = value;
                Some(value)
            }
            RleState::Repeat { count } => {
                let count = count + 1;
                if self.reader.read(1)? == 0 {
                    return self.literal();
                }
                if count < REPEAT_LIMIT {
                    self.state = RleState::Repeat { count };
                    return Some(self.prev);
                }
                let counter = self.reader.read(COUNTER_BITS)?;
                if counter == 0 {
                    return self.literal();
                }
                self.state = RleState::Counter { count: counter };
                Some(self.prev)
            }
            RleState::Counter { count } => {
                let count = count - 1;
                if count == 0 {
                    return self.literal();
                }
                self.state = RleState::Counter { count };
                Some(self.prev)
            }
        }
    }
}

/// Decompress a glyph stream back into `width * height` quantized samples.
///
/// Returns `None` if the stream ends early.
pub fn decompress(
    data: &[u8],
    width: usize,
    height: usize,
    bpp: Bpp,
    prefilter: bool,
) -> Option<Vec<u8>> {
    let mut decoder = RleDecoder::new(data, bpp.bits());
    let mut out = Vec::with_capacity(width * height);
    for i in 0..width * height {
        let mut value = decoder.next()?;
        if prefilter && i >= width {
            value ^= out[i - width];
        }
        out.push(value);
    }
    Some(out)
}
