use std::io::Cursor;

/// Convert one model sample to 16-bit PCM.
///
/// Non-finite values become silence and the input is clamped to [-1, 1]
/// before scaling, so full-scale samples cannot wrap.
pub fn to_pcm16(sample: f32) -> i16 {
    if !sample.is_finite() {
        return 0;
    }
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Encode PCM f32 samples as a mono 16-bit PCM WAV (RIFF) container.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    // WAV header (44 bytes) + 2 bytes per sample
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            writer.write_sample(to_pcm16(s))?;
        }
        // finalize() patches the RIFF/data sizes into the header
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Clip length in seconds for `num_samples` mono samples.
pub fn duration_secs(num_samples: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    num_samples as f64 / sample_rate as f64
}
