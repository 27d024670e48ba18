//! WAV export for recordings

use crate::codec::adpcm::{AdpcmState, decode_all};
use crate::{Error, Result};

/// Encode 16-bit mono samples as WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Decode an ADPCM recording from a fresh state and wrap it as WAV
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn adpcm_to_wav(adpcm: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    let mut state = AdpcmState::new();
    let samples = decode_all(adpcm, &mut state);
    samples_to_wav(&samples, sample_rate)
}
