//! Bit writer for packet headers (ISO/IEC 15444-1 B.10.1).
//!
//! Bits are packed MSB first. After a 0xFF byte the next byte only carries
//! seven bits so no marker code can appear inside a header.

pub struct J2kBitWriter {
    data: Vec<u8>,
    // the low byte is being filled, the high byte is the last one emitted
    buffer: u16,
    free_bits: u8,
}

impl Default for J2kBitWriter {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            buffer: 0,
            free_bits: 8,
        }
    }
}

impl J2kBitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn byte_out(&mut self) {
        self.buffer <<= 8;
        self.free_bits = if self.buffer == 0xFF00 { 7 } else { 8 };
        self.data.push((self.buffer >> 8) as u8);
    }

    pub fn write_bit(&mut self, bit: u8) {
        if self.free_bits == 0 {
            self.byte_out();
        }
        self.free_bits -= 1;
        self.buffer |= u16::from(bit & 1) << self.free_bits;
    }

    /// Writes the `count` low bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u32, count: u32) {
        for i in (0..count).rev() {
            self.write_bit(((value >> i) & 1) as u8);
        }
    }

    /// Comma code: `n` ones followed by a zero.
    pub fn write_comma_code(&mut self, n: u32) {
        for _ in 0..n {
            self.write_bit(1);
        }
        self.write_bit(0);
    }

    /// Emits the pending byte, plus a stuffing byte if it was 0xFF.
    pub fn finish(mut self) -> Vec<u8> {
        self.byte_out();
        if self.free_bits == 7 {
            self.byte_out();
        }
        self.data
    }
}
