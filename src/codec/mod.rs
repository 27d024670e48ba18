//! Audio codecs
//!
//! IMA ADPCM is the only on-air format; WAV is used for local inspection of
//! recordings.

pub mod adpcm;
mod wav;

pub use adpcm::{AdpcmState, decode, decode_all, decode_byte, encode, encode_block};
pub use wav::{adpcm_to_wav, samples_to_wav};
