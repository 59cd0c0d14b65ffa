//! MSB-first bit packing used by glyph bitmaps.

#[derive(Debug, Default)]
pub(crate) struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append the low `bits` bits of `value`, most significant first
    pub(crate) fn write(&mut self, value: u32, bits: u8) {
        for i in (0..bits).rev() {
            let bit = (value >> i) & 1;
            if self.bit_len % 8 == 0 {
                self.bytes.push(0);
            }
            if bit != 0 {
                let last = self.bytes.len() - 1;
                self.bytes[last] |= 0x80 >> (self.bit_len % 8);
            }
            self.bit_len += 1;
        }
    }

    /// Packed bytes, zero-padded to a byte boundary
    pub(crate) fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

#[derive(Debug)]
pub(crate) struct BitReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Read `bits` bits, most significant first; `None` past the end
    pub(crate) fn read(&mut self, bits: u8) -> Option<u32> {
        let mut value = 0u32;
        for _ in 0..bits {
            let byte = *self.bytes.get(self.pos / 8)?;
            let bit = (byte >> (7 - self.pos % 8)) & 1;
            value = (value << 1) | bit as u32;
            self.pos += 1;
        }
        Some(value)
    }
}

/// Pack samples of `bits` width into a continuous bitstream
pub(crate) fn pack_samples(samples: &[u8], bits: u8) -> Vec<u8> {
    let mut writer = BitWriter::new();
    for &s in samples {
        writer.write(s as u32, bits);
    }
    writer.finish()
}

/// Unpack `count` samples of `bits` width
pub(crate) fn unpack_samples(bytes: &[u8], bits: u8, count: usize) -> Option<Vec<u8>> {
    let mut reader = BitReader::new(bytes);
    (0..count).map(|_| reader.read(bits).map(|v| v as u8)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msb_first() {
        let mut w = BitWriter::new();
        w.write(0b1, 1);
        w.write(0b01, 2);
        w.write(0b1111, 4);
        assert_eq!(w.finish(), vec![0b1011_1110]);
    }

    #[test]
    fn test_pack_4bpp() {
        assert_eq!(pack_samples(&[0xA, 0x5, 0xF], 4), vec![0xA5, 0xF0]);
    }

    #[test]
    fn test_pack_3bpp_crosses_bytes() {
        // 7, 0, 7 -> 111 000 11|1 -> 0xE3, 0x80
        assert_eq!(pack_samples(&[7, 0, 7], 3), vec![0xE3, 0x80]);
        assert_eq!(unpack_samples(&[0xE3, 0x80], 3, 3).unwrap(), vec![7, 0, 7]);
    }

    #[test]
    fn test_reader_past_end() {
        let mut r = BitReader::new(&[0xFF]);
        assert_eq!(r.read(8), Some(0xFF));
        assert_eq!(r.read(1), None);
    }
}
