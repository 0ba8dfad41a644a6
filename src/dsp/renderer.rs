//! WAV renderer: bounces buffers and engine output to WAV bytes.

use std::io::Cursor;

use super::buffer::AudioBuffer;
use crate::engine::AudioEffectsEngine;

/// Encode a buffer as 16-bit PCM WAV.
pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>, hound::Error> {
    let channels = buffer.number_of_channels().max(1);
    let spec = hound::WavSpec {
        channels: channels as u16,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + buffer.frames() * channels * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for i in 0..buffer.frames() {
            for ch in 0..channels {
                let s = buffer.channel(ch).get(i).copied().unwrap_or(0.0);
                writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
            }
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Render `seconds` of engine output into a stereo buffer.
pub fn render_buffer(engine: &mut AudioEffectsEngine, seconds: f64) -> AudioBuffer {
    let frames = (seconds.max(0.0) * engine.sample_rate() as f64).round() as usize;
    let mut interleaved = vec![0.0_f32; frames * 2];
    engine.render(&mut interleaved);
    AudioBuffer::from_interleaved(&interleaved, 2, engine.sample_rate())
}

/// Render `seconds` of engine output to WAV bytes (16-bit stereo PCM).
pub fn render_wav(engine: &mut AudioEffectsEngine, seconds: f64) -> Result<Vec<u8>, hound::Error> {
    encode_wav(&render_buffer(engine, seconds))
}
