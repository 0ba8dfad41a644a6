//! Mixer: stereo render quanta and the summing bus feeding the output sink.

/// Frames processed per graph pull.
pub const RENDER_QUANTUM: usize = 128;

/// One quantum of planar stereo audio.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoBlock {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl StereoBlock {
    pub fn silent(frames: usize) -> Self {
        StereoBlock {
            left: vec![0.0; frames],
            right: vec![0.0; frames],
        }
    }

    pub fn frames(&self) -> usize {
        self.left.len()
    }

    /// Sum another block into this one, sample by sample.
    pub fn accumulate(&mut self, other: &StereoBlock) {
        for (d, s) in self.left.iter_mut().zip(&other.left) {
            *d += s;
        }
        for (d, s) in self.right.iter_mut().zip(&other.right) {
            *d += s;
        }
    }

    /// Peak absolute amplitude over both channels.
    pub fn peak(&self) -> f32 {
        self.left
            .iter()
            .chain(&self.right)
            .fold(0.0_f32, |m, &s| m.max(s.abs()))
    }

    pub fn is_silent(&self) -> bool {
        self.peak() == 0.0
    }
}

/// Summing bus that accumulates every block routed to the sink.
#[derive(Debug, Clone)]
pub struct Mixer {
    buffer: StereoBlock,
}

impl Mixer {
    pub fn new() -> Self {
        Mixer {
            buffer: StereoBlock::silent(0),
        }
    }

    /// Prepare a buffer of `frames` filled with zeros.
    pub fn clear(&mut self, frames: usize) {
        self.buffer.left.clear();
        self.buffer.left.resize(frames, 0.0);
        self.buffer.right.clear();
        self.buffer.right.resize(frames, 0.0);
    }

    pub fn add(&mut self, block: &StereoBlock) {
        self.buffer.accumulate(block);
    }

    /// The mixed output with soft clipping applied.
    pub fn output(&self) -> StereoBlock {
        StereoBlock {
            left: self.buffer.left.iter().map(|&s| soft_clip(s)).collect(),
            right: self.buffer.right.iter().map(|&s| soft_clip(s)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.frames()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.frames() == 0
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

/// Soft clipper using tanh to prevent harsh digital clipping.
fn soft_clip(x: f32) -> f32 {
    x.tanh()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer() {
        let mut m = Mixer::new();
        m.clear(RENDER_QUANTUM);
        let out = m.output();
        assert_eq!(out.frames(), RENDER_QUANTUM);
        assert!(out.is_silent());
    }

    #[test]
    fn accumulates_blocks() {
        let mut m = Mixer::new();
        m.clear(4);
        let mut a = StereoBlock::silent(4);
        a.left[0] = 0.5;
        a.right[1] = 0.25;
        let mut b = StereoBlock::silent(4);
        b.left[0] = 0.3;
        m.add(&a);
        m.add(&b);
        let out = m.output();
        assert!((out.left[0] - soft_clip(0.8)).abs() < 1e-6);
        assert!((out.right[1] - soft_clip(0.25)).abs() < 1e-6);
        assert_eq!(out.left[2], 0.0);
    }

    #[test]
    fn soft_clip_prevents_overflow() {
        let mut m = Mixer::new();
        m.clear(1);
        let mut hot = StereoBlock::silent(1);
        hot.left[0] = 100.0;
        hot.right[0] = -100.0;
        m.add(&hot);
        let out = m.output();
        assert!(out.peak() <= 1.0, "Soft clip should keep output <= 1.0, got {}", out.peak());
    }
}
