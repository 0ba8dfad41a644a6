//! Decoded PCM buffers and the decode primitive that produces them.
//!
//! An [`AudioBuffer`] is immutable once built and is shared behind an `Arc`
//! by every player reading from it.

use std::io::Cursor;

use crate::error::DecodeError;
use crate::media::AudioDecoder;

/// Planar f32 PCM at a fixed sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Build from planar channel data. Channels are truncated to the shortest.
    pub fn new(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for ch in &mut channels {
            ch.truncate(frames);
        }
        AudioBuffer {
            channels,
            sample_rate,
        }
    }

    /// Build from interleaved samples.
    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: u32) -> Self {
        let channel_count = channel_count.max(1);
        let mut channels = vec![Vec::with_capacity(samples.len() / channel_count); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (ch, &s) in channels.iter_mut().zip(frame) {
                ch.push(s);
            }
        }
        AudioBuffer::new(channels, sample_rate)
    }

    /// Create from 16-bit signed interleaved PCM.
    pub fn from_i16(pcm: &[i16], channel_count: usize, sample_rate: u32) -> Self {
        let samples: Vec<f32> = pcm.iter().map(|&s| s as f32 / 32768.0).collect();
        Self::from_interleaved(&samples, channel_count, sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn number_of_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Read a sample with linear interpolation at a fractional frame position.
    pub fn read_interpolated(&self, channel: usize, position: f64) -> f32 {
        let Some(data) = self.channels.get(channel) else {
            return 0.0;
        };
        if data.is_empty() || position < 0.0 {
            return 0.0;
        }

        let idx = position as usize;
        if idx >= data.len() - 1 {
            return if idx < data.len() { data[idx] } else { 0.0 };
        }

        let frac = (position - idx as f64) as f32;
        data[idx] * (1.0 - frac) + data[idx + 1] * frac
    }

    /// Stereo frame at a fractional position. Mono buffers feed both sides.
    pub fn read_frame(&self, position: f64) -> (f32, f32) {
        let left = self.read_interpolated(0, position);
        let right = if self.channels.len() > 1 {
            self.read_interpolated(1, position)
        } else {
            left
        };
        (left, right)
    }
}

/// Decodes RIFF/WAVE with `hound` and MPEG audio with `minimp3`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PcmDecoder;

impl PcmDecoder {
    fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer, DecodeError> {
        let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()?
            }
        };
        if samples.is_empty() {
            return Err(DecodeError::NoSamples);
        }
        Ok(AudioBuffer::from_interleaved(
            &samples,
            spec.channels as usize,
            spec.sample_rate,
        ))
    }

    fn decode_mp3(bytes: &[u8]) -> Result<AudioBuffer, DecodeError> {
        let mut decoder = minimp3::Decoder::new(Cursor::new(bytes));
        let mut pcm: Vec<i16> = Vec::new();
        let mut format: Option<(usize, u32)> = None;
        loop {
            match decoder.next_frame() {
                Ok(frame) => {
                    let (channels, _) = *format.get_or_insert((frame.channels, frame.sample_rate as u32));
                    // A stream that changes layout mid-way is truncated at the change.
                    if frame.channels != channels {
                        break;
                    }
                    pcm.extend_from_slice(&frame.data);
                }
                Err(minimp3::Error::Eof) => break,
                Err(minimp3::Error::SkippedData) => continue,
                Err(e) => return Err(DecodeError::Mp3(format!("{e:?}"))),
            }
        }
        match format {
            Some((channels, sample_rate)) if !pcm.is_empty() => {
                Ok(AudioBuffer::from_i16(&pcm, channels, sample_rate))
            }
            _ => Err(DecodeError::NoSamples),
        }
    }
}

impl AudioDecoder for PcmDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
            return Self::decode_wav(bytes);
        }
        Self::decode_mp3(bytes)
    }
}
