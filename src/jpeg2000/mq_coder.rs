//! MQ Arithmetic Coder (ISO/IEC 15444-1 Annex C), encoder side.

#[derive(Clone, Copy)]
struct MqContextState {
    pub qe: u32,
    pub nmps: u8,
    pub nlps: u8,
    pub switch: u8,
}

const fn st(qe: u32, nmps: u8, nlps: u8, switch: u8) -> MqContextState {
    MqContextState { qe, nmps, nlps, switch }
}

// Table C.2
const MQ_TABLE: [MqContextState; 47] = [
    st(0x5601, 1, 1, 1),
    st(0x3401, 2, 6, 0),
    st(0x1801, 3, 9, 0),
    st(0x0AC1, 4, 12, 0),
    st(0x0521, 5, 29, 0),
    st(0x0221, 38, 33, 0),
    st(0x5601, 7, 6, 1),
    st(0x5401, 8, 14, 0),
    st(0x4801, 9, 14, 0),
    st(0x3801, 10, 14, 0),
    st(0x3001, 11, 17, 0),
    st(0x2401, 12, 18, 0),
    st(0x1C01, 13, 20, 0),
    st(0x1601, 29, 21, 0),
    st(0x5601, 15, 14, 1),
    st(0x5401, 16, 14, 0),
    st(0x5101, 17, 15, 0),
    st(0x4801, 18, 16, 0),
    st(0x3801, 19, 17, 0),
    st(0x3401, 20, 18, 0),
    st(0x3001, 21, 19, 0),
    st(0x2801, 22, 19, 0),
    st(0x2401, 23, 20, 0),
    st(0x2201, 24, 21, 0),
    st(0x1C01, 25, 22, 0),
    st(0x1801, 26, 23, 0),
    st(0x1601, 27, 24, 0),
    st(0x1401, 28, 25, 0),
    st(0x1201, 29, 26, 0),
    st(0x1101, 30, 27, 0),
    st(0x0AC1, 31, 28, 0),
    st(0x09C1, 32, 29, 0),
    st(0x08A1, 33, 30, 0),
    st(0x0521, 34, 31, 0),
    st(0x0441, 35, 32, 0),
    st(0x02A1, 36, 33, 0),
    st(0x0221, 37, 34, 0),
    st(0x0141, 38, 35, 0),
    st(0x0111, 39, 36, 0),
    st(0x0085, 40, 37, 0),
    st(0x0049, 41, 38, 0),
    st(0x0025, 42, 39, 0),
    st(0x0015, 43, 40, 0),
    st(0x0009, 44, 41, 0),
    st(0x0005, 45, 42, 0),
    st(0x0001, 45, 43, 0),
    st(0x5601, 46, 46, 0),
];

/// Number of contexts used by the bit-plane coder.
pub const CONTEXT_COUNT: usize = 19;
/// Run-length (aggregation) context.
pub const CTX_AGG: usize = 17;
/// Uniform context.
pub const CTX_UNI: usize = 18;

pub struct MqCoder {
    a: u32,
    c: u32,
    ct: u8,
    // out[0] is a placeholder that absorbs a carry before the first byte
    out: Vec<u8>,
    // (state index, mps) per context
    contexts: [(u8, u8); CONTEXT_COUNT],
}

impl Default for MqCoder {
    fn default() -> Self {
        let mut coder = Self {
            a: 0x8000,
            c: 0,
            ct: 12,
            out: vec![0],
            contexts: [(0, 0); CONTEXT_COUNT],
        };
        coder.reset_contexts();
        coder
    }
}

impl MqCoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial states of Table D.7.
    pub fn reset_contexts(&mut self) {
        self.contexts = [(0, 0); CONTEXT_COUNT];
        self.set_context(0, 4, 0);
        self.set_context(CTX_AGG, 3, 0);
        self.set_context(CTX_UNI, 46, 0);
    }

    pub fn set_context(&mut self, cx: usize, state_idx: u8, mps: u8) {
        if let Some(context) = self.contexts.get_mut(cx) {
            *context = (state_idx, mps & 1);
        }
    }

    /// Codes decision `d` in context `cx` (C.2.2).
    pub fn encode(&mut self, d: u8, cx: usize) {
        let (idx, mps) = self.contexts[cx];
        let state = MQ_TABLE[idx as usize];
        let qe = state.qe;

        self.a -= qe;
        if (d & 1) == mps {
            // CODEMPS
            if self.a & 0x8000 == 0 {
                if self.a < qe {
                    self.a = qe;
                } else {
                    self.c += qe;
                }
                self.contexts[cx].0 = state.nmps;
                self.renormalize();
            } else {
                self.c += qe;
            }
        } else {
            // CODELPS
            if self.a < qe {
                self.c += qe;
            } else {
                self.a = qe;
            }
            if state.switch == 1 {
                self.contexts[cx].1 = 1 - mps;
            }
            self.contexts[cx].0 = state.nlps;
            self.renormalize();
        }
    }

    fn renormalize(&mut self) {
        loop {
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.ct == 0 {
                self.byte_out();
            }
            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    fn last(&mut self) -> &mut u8 {
        let end = self.out.len() - 1;
        &mut self.out[end]
    }

    // C.2.5 BYTEOUT with carry propagation and bit stuffing
    fn byte_out(&mut self) {
        if *self.last() == 0xFF {
            self.out.push((self.c >> 20) as u8);
            self.c &= 0xF_FFFF;
            self.ct = 7;
        } else if self.c & 0x800_0000 == 0 {
            self.out.push((self.c >> 19) as u8);
            self.c &= 0x7_FFFF;
            self.ct = 8;
        } else {
            *self.last() += 1;
            if *self.last() == 0xFF {
                self.c &= 0x7FF_FFFF;
                self.out.push((self.c >> 20) as u8);
                self.c &= 0xF_FFFF;
                self.ct = 7;
            } else {
                self.out.push((self.c >> 19) as u8);
                self.c &= 0x7_FFFF;
                self.ct = 8;
            }
        }
    }

    /// Bytes that can no longer change. The last emitted byte may still
    /// receive a carry and is not counted.
    pub fn bytes_committed(&self) -> usize {
        self.out.len().saturating_sub(2)
    }

    /// Upper bound for the length of the codeword if it were terminated now.
    pub fn rate_estimate(&self) -> usize {
        self.bytes_committed() + 3
    }

    /// Terminates the codeword (C.2.9) and returns it. A trailing 0xFF is
    /// never part of the result.
    pub fn flush(mut self) -> Vec<u8> {
        // SETBITS
        let temp = self.c + self.a;
        self.c |= 0xFFFF;
        if self.c >= temp {
            self.c -= 0x8000;
        }

        self.c <<= self.ct;
        self.byte_out();
        self.c <<= self.ct;
        self.byte_out();

        if *self.last() == 0xFF {
            self.out.pop();
        }
        self.out.remove(0);
        self.out
    }
}
