//! Buffer players: read a shared [`AudioBuffer`] at a playback rate.
//!
//! A player is one-shot: it can be started once, and once stopped it stays
//! silent. Resuming from a pause means building a fresh player at the frozen
//! offset. Rate changes resample, so pitch moves with speed.

use std::sync::Arc;

use super::buffer::AudioBuffer;
use super::mixer::StereoBlock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Built but not started; renders silence.
    Armed,
    Playing,
    /// Stopped explicitly or ran off the end of the buffer.
    Finished,
}

#[derive(Debug, Clone)]
pub struct BufferPlayer {
    buffer: Arc<AudioBuffer>,
    /// Playback rate (1.0 = original speed).
    rate: f64,
    looping: bool,
    /// Current read position in buffer frames (fractional).
    position: f64,
    state: PlayerState,
}

impl BufferPlayer {
    pub fn new(buffer: Arc<AudioBuffer>, rate: f64) -> Self {
        BufferPlayer {
            buffer,
            rate,
            looping: false,
            position: 0.0,
            state: PlayerState::Armed,
        }
    }

    /// A player that wraps around at the end of the buffer until stopped.
    pub fn looping(buffer: Arc<AudioBuffer>) -> Self {
        BufferPlayer {
            looping: true,
            ..Self::new(buffer, 1.0)
        }
    }

    /// Start playback at `offset` seconds into the buffer.
    ///
    /// Returns `false` if the player was already started; a one-shot player
    /// never restarts.
    pub fn start(&mut self, offset: f64) -> bool {
        if self.state != PlayerState::Armed {
            return false;
        }
        let frames = self.buffer.frames() as f64;
        self.position = (offset.max(0.0) * self.buffer.sample_rate() as f64).min(frames);
        self.state = if self.position >= frames && !self.looping {
            PlayerState::Finished
        } else {
            PlayerState::Playing
        };
        true
    }

    /// Stop playback. Stopping a stopped or never-started player is a no-op.
    pub fn stop(&mut self) {
        self.state = PlayerState::Finished;
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayerState::Playing
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn buffer(&self) -> &Arc<AudioBuffer> {
        &self.buffer
    }

    /// Read position in seconds of buffer time.
    pub fn position(&self) -> f64 {
        self.position / self.buffer.sample_rate().max(1) as f64
    }

    /// Render one block at the given output sample rate.
    pub fn render(&mut self, out: &mut StereoBlock, output_rate: f64) {
        if self.state != PlayerState::Playing {
            return;
        }
        let frames = self.buffer.frames() as f64;
        if frames == 0.0 {
            self.state = PlayerState::Finished;
            return;
        }
        let step = self.rate * self.buffer.sample_rate() as f64 / output_rate;
        for i in 0..out.frames() {
            if self.position >= frames {
                if self.looping {
                    self.position %= frames;
                } else {
                    self.state = PlayerState::Finished;
                    break;
                }
            }
            let (l, r) = self.buffer.read_frame(self.position);
            out.left[i] += l;
            out.right[i] += r;
            self.position += step;
        }
        if !self.looping && self.position >= frames {
            self.state = PlayerState::Finished;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, sample_rate: u32) -> Arc<AudioBuffer> {
        let data: Vec<f32> = (0..frames).map(|i| i as f32 / frames as f32).collect();
        Arc::new(AudioBuffer::new(vec![data], sample_rate))
    }

    #[test]
    fn armed_player_is_silent() {
        let mut p = BufferPlayer::new(ramp(1000, 8000), 1.0);
        let mut out = StereoBlock::silent(128);
        p.render(&mut out, 8000.0);
        assert!(out.is_silent());
        assert_eq!(p.state(), PlayerState::Armed);
    }

    #[test]
    fn start_is_one_shot() {
        let mut p = BufferPlayer::new(ramp(1000, 8000), 1.0);
        assert!(p.start(0.0));
        assert!(!p.start(0.0), "second start must be refused");
        p.stop();
        assert!(!p.start(0.0), "stopped player cannot restart");
        p.stop();
        assert_eq!(p.state(), PlayerState::Finished);
    }

    #[test]
    fn position_advances_with_rate() {
        let mut p = BufferPlayer::new(ramp(8000, 8000), 0.5);
        p.start(0.25);
        let mut out = StereoBlock::silent(800);
        p.render(&mut out, 8000.0);
        // 800 output frames at half speed = 400 buffer frames = 0.05s
        assert!((p.position() - 0.30).abs() < 1e-9, "got {}", p.position());
    }

    #[test]
    fn sample_rate_ratio_is_respected() {
        let mut p = BufferPlayer::new(ramp(16000, 16000), 1.0);
        p.start(0.0);
        let mut out = StereoBlock::silent(800);
        p.render(&mut out, 8000.0);
        assert!((p.position() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn finishes_at_end_of_buffer() {
        let mut p = BufferPlayer::new(ramp(100, 8000), 1.0);
        p.start(0.0);
        let mut out = StereoBlock::silent(128);
        p.render(&mut out, 8000.0);
        assert_eq!(p.state(), PlayerState::Finished);
        assert_eq!(out.left[120], 0.0);
    }

    #[test]
    fn looping_wraps_around() {
        let buf = Arc::new(AudioBuffer::new(vec![vec![0.5; 100]], 8000));
        let mut p = BufferPlayer::looping(buf);
        p.start(0.0);
        let mut out = StereoBlock::silent(1000);
        p.render(&mut out, 8000.0);
        assert!(p.is_playing(), "looping player should keep playing");
        assert!(out.left.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }
}
