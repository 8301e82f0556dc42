use anyhow::{anyhow, Result};
use std::io::{Cursor, Write};

pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

const BITS_PER_SAMPLE: u16 = 16;
const CHANNELS: u16 = 1;

/// Encodes mono float samples (-1.0..=1.0) as a 16-bit PCM WAV file in memory.
pub fn encode_wav_mono(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    if sample_rate == 0 {
        return Err(anyhow!("Sample rate must be positive"));
    }

    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate
        .checked_mul(block_align as u32)
        .ok_or_else(|| anyhow!("Sample rate {} too high for a WAV file", sample_rate))?;
    let too_long = || anyhow!("Recording too long for a WAV file");
    let data_size = samples
        .len()
        .checked_mul(block_align as usize)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(too_long)?;
    let riff_size = data_size.checked_add(36).ok_or_else(too_long)?;

    let mut out = Cursor::new(Vec::with_capacity(44 + data_size as usize));

    out.write_all(b"RIFF")?;
    out.write_all(&riff_size.to_le_bytes())?;
    out.write_all(b"WAVE")?;

    out.write_all(b"fmt ")?;
    out.write_all(&16u32.to_le_bytes())?;
    out.write_all(&1u16.to_le_bytes())?; // PCM
    out.write_all(&CHANNELS.to_le_bytes())?;
    out.write_all(&sample_rate.to_le_bytes())?;
    out.write_all(&byte_rate.to_le_bytes())?;
    out.write_all(&block_align.to_le_bytes())?;
    out.write_all(&BITS_PER_SAMPLE.to_le_bytes())?;

    out.write_all(b"data")?;
    out.write_all(&data_size.to_le_bytes())?;
    for &s in samples {
        let clamped = if s.is_nan() { 0.0 } else { s.clamp(-1.0, 1.0) };
        let value = (clamped * i16::MAX as f32).round() as i16;
        out.write_all(&value.to_le_bytes())?;
    }

    Ok(out.into_inner())
}

/// Approximate length of an encoded recording.
pub fn recording_seconds(samples: usize, sample_rate: u32) -> f32 {
    if sample_rate == 0 {
        return 0.0;
    }
    samples as f32 / sample_rate as f32
}
