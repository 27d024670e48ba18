//! IMA ADPCM (4-bit) encoder and decoder
//!
//! Tables are bit-exact with the paired server so both ends adapt
//! identically. The encoder packs two samples per byte: first sample in the
//! low nibble, second in the high nibble.

/// Step index adjustment per 4-bit code
pub const INDEX_TABLE: [i8; 16] = [-1, -1, -1, -1, 2, 4, 6, 8, -1, -1, -1, -1, 2, 4, 6, 8];

/// Quantizer step sizes
pub const STEP_TABLE: [i32; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408,
    449, 494, 544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3326, 3658, 4024, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630,
    9493, 10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794,
    32767,
];

/// Highest valid step index
pub const MAX_INDEX: u8 = 88;

/// Adaptation state for one stream direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdpcmState {
    predicted: i32,
    index: u8,
}

impl AdpcmState {
    /// Fresh state: predicted sample 0, step index 0
    #[must_use]
    pub const fn new() -> Self {
        Self {
            predicted: 0,
            index: 0,
        }
    }

    /// Return to the initial state
    pub const fn reset(&mut self) {
        self.predicted = 0;
        self.index = 0;
    }

    /// Last reconstructed sample
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn predicted(&self) -> i16 {
        // Always clamped to the i16 range by `adapt`
        self.predicted as i16
    }

    /// Current step index (0..=88)
    #[must_use]
    pub const fn step_index(&self) -> u8 {
        self.index
    }

    const fn step(&self) -> i32 {
        STEP_TABLE[self.index as usize]
    }

    /// Shared adaptation rule for encoder and decoder
    fn adapt(&mut self, code: u8, diffq: i32) {
        if code & 8 == 0 {
            self.predicted += diffq;
        } else {
            self.predicted -= diffq;
        }
        self.predicted = self
            .predicted
            .clamp(i32::from(i16::MIN), i32::from(i16::MAX));

        let index = i16::from(self.index) + i16::from(INDEX_TABLE[usize::from(code & 0x0F)]);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            self.index = index.clamp(0, i16::from(MAX_INDEX)) as u8;
        }
    }
}

/// Decode one 4-bit code (upper bits ignored)
pub fn decode(code: u8, state: &mut AdpcmState) -> i16 {
    let code = code & 0x0F;
    let step = state.step();

    let mut diffq = step >> 3;
    if code & 4 != 0 {
        diffq += step;
    }
    if code & 2 != 0 {
        diffq += step >> 1;
    }
    if code & 1 != 0 {
        diffq += step >> 2;
    }

    state.adapt(code, diffq);
    state.predicted()
}

/// Quantize one sample, returning its 4-bit code
fn encode_sample(sample: i16, state: &mut AdpcmState) -> u8 {
    let mut diff = i32::from(sample) - state.predicted;
    let sign = if diff < 0 { 8 } else { 0 };
    diff = diff.abs();

    let step = state.step();
    let mut delta = 0u8;
    let mut vpdiff = step >> 3;

    if diff >= step {
        delta |= 4;
        diff -= step;
        vpdiff += step;
    }
    if diff >= step >> 1 {
        delta |= 2;
        diff -= step >> 1;
        vpdiff += step >> 1;
    }
    if diff >= step >> 2 {
        delta |= 1;
        vpdiff += step >> 2;
    }

    let code = delta | sign;
    state.adapt(code, vpdiff);
    code
}

/// Encode two consecutive samples into one byte
pub fn encode(sample1: i16, sample2: i16, state: &mut AdpcmState) -> u8 {
    let low = encode_sample(sample1, state);
    let high = encode_sample(sample2, state);
    low | (high << 4)
}

/// Decode one byte into its two samples, low nibble first
pub fn decode_byte(byte: u8, state: &mut AdpcmState) -> [i16; 2] {
    let first = decode(byte & 0x0F, state);
    let second = decode(byte >> 4, state);
    [first, second]
}

/// Encode a block of samples pairwise, appending to `out`
///
/// An odd trailing sample is paired with a silent sample.
pub fn encode_block(samples: &[i16], state: &mut AdpcmState, out: &mut Vec<u8>) {
    out.reserve(samples.len().div_ceil(2));
    for pair in samples.chunks(2) {
        let second = pair.get(1).copied().unwrap_or(0);
        out.push(encode(pair[0], second, state));
    }
}

/// Decode a whole ADPCM buffer into mono samples
#[must_use]
pub fn decode_all(data: &[u8], state: &mut AdpcmState) -> Vec<i16> {
    let mut samples = Vec::with_capacity(data.len() * 2);
    for &byte in data {
        samples.extend_from_slice(&decode_byte(byte, state));
    }
    samples
}
