//! Convolution node: uniformly partitioned FFT convolution.
//!
//! The impulse response is cut into partitions of one render quantum, each
//! transformed once up front. Every input block is transformed, pushed into a
//! frequency-domain delay line and multiplied against all partitions; a single
//! inverse transform plus overlap-add yields the output block. Latency is zero
//! and the cost per block grows linearly with the impulse length.

use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use super::buffer::AudioBuffer;
use super::mixer::{StereoBlock, RENDER_QUANTUM};

/// Single channel partitioned convolver.
struct ConvolutionChannel {
    /// IR partitions in frequency domain.
    partitions: Vec<Vec<Complex<f32>>>,
    /// Spectra of past input blocks, newest at `fdl_pos`.
    fdl: Vec<Vec<Complex<f32>>>,
    fdl_pos: usize,
    /// Second half of the previous inverse transform.
    overlap: Vec<f32>,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    time_scratch: Vec<f32>,
    freq_scratch: Vec<Complex<f32>>,
    accum: Vec<Complex<f32>>,
}

impl ConvolutionChannel {
    fn new(ir: &[f32], planner: &mut RealFftPlanner<f32>) -> Self {
        let size = RENDER_QUANTUM;
        let fft_size = size * 2;
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);

        let partitions: Vec<Vec<Complex<f32>>> = ir
            .chunks(size)
            .map(|segment| {
                let mut padded = forward.make_input_vec();
                padded[..segment.len()].copy_from_slice(segment);
                let mut spectrum = forward.make_output_vec();
                // Lengths come from the plan itself, so this cannot fail.
                let _ = forward.process(&mut padded, &mut spectrum);
                spectrum
            })
            .collect();

        let bins = fft_size / 2 + 1;
        let fdl = vec![vec![Complex::new(0.0, 0.0); bins]; partitions.len().max(1)];

        ConvolutionChannel {
            partitions,
            fdl,
            fdl_pos: 0,
            overlap: vec![0.0; size],
            time_scratch: forward.make_input_vec(),
            freq_scratch: forward.make_output_vec(),
            accum: vec![Complex::new(0.0, 0.0); bins],
            forward,
            inverse,
        }
    }

    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let size = RENDER_QUANTUM;
        let fft_size = size * 2;
        if self.partitions.is_empty() {
            output.fill(0.0);
            return;
        }

        self.time_scratch[..size].copy_from_slice(&input[..size]);
        self.time_scratch[size..].fill(0.0);
        let _ = self
            .forward
            .process(&mut self.time_scratch, &mut self.fdl[self.fdl_pos]);

        self.accum.fill(Complex::new(0.0, 0.0));
        let slots = self.fdl.len();
        for (k, partition) in self.partitions.iter().enumerate() {
            let spectrum = &self.fdl[(self.fdl_pos + slots - k) % slots];
            for ((acc, x), h) in self.accum.iter_mut().zip(spectrum).zip(partition) {
                *acc += x * h;
            }
        }
        self.fdl_pos = (self.fdl_pos + 1) % slots;

        self.freq_scratch.copy_from_slice(&self.accum);
        // DC and Nyquist of a real signal are real.
        self.freq_scratch[0].im = 0.0;
        self.freq_scratch[fft_size / 2].im = 0.0;
        let _ = self
            .inverse
            .process(&mut self.freq_scratch, &mut self.time_scratch);

        let norm = 1.0 / fft_size as f32;
        for i in 0..size {
            output[i] = self.time_scratch[i] * norm + self.overlap[i];
            self.overlap[i] = self.time_scratch[size + i] * norm;
        }
    }
}

/// Stereo convolution node. Without an impulse response it renders silence.
pub struct Convolver {
    impulse: Option<Arc<AudioBuffer>>,
    left: Option<ConvolutionChannel>,
    right: Option<ConvolutionChannel>,
}

impl Convolver {
    pub fn new() -> Self {
        Convolver {
            impulse: None,
            left: None,
            right: None,
        }
    }

    /// Install an impulse response. Channel 0 convolves the left input and
    /// channel 1 (or channel 0 again for mono) the right.
    pub fn set_impulse(&mut self, impulse: Arc<AudioBuffer>) {
        let mut planner = RealFftPlanner::<f32>::new();
        let left_ir = impulse.channel(0);
        let right_ir = if impulse.number_of_channels() > 1 {
            impulse.channel(1)
        } else {
            left_ir
        };
        self.left = Some(ConvolutionChannel::new(left_ir, &mut planner));
        self.right = Some(ConvolutionChannel::new(right_ir, &mut planner));
        self.impulse = Some(impulse);
    }

    pub fn impulse(&self) -> Option<&Arc<AudioBuffer>> {
        self.impulse.as_ref()
    }

    pub fn has_impulse(&self) -> bool {
        self.impulse.is_some()
    }

    /// Convolve one render quantum.
    pub fn process(&mut self, input: &StereoBlock) -> StereoBlock {
        let mut out = StereoBlock::silent(input.frames());
        if input.frames() != RENDER_QUANTUM {
            return out;
        }
        if let (Some(left), Some(right)) = (self.left.as_mut(), self.right.as_mut()) {
            left.process(&input.left, &mut out.left);
            right.process(&input.right, &mut out.right);
        }
        out
    }
}

impl Default for Convolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Convolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Convolver")
            .field("impulse_frames", &self.impulse.as_ref().map(|b| b.frames()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse_block(at: usize) -> StereoBlock {
        let mut b = StereoBlock::silent(RENDER_QUANTUM);
        b.left[at] = 1.0;
        b.right[at] = 1.0;
        b
    }

    /// Direct-form reference convolution.
    fn direct(input: &[f32], ir: &[f32]) -> Vec<f32> {
        let mut out = vec![0.0; input.len()];
        for n in 0..input.len() {
            for (k, &h) in ir.iter().enumerate() {
                if k <= n {
                    out[n] += input[n - k] * h;
                }
            }
        }
        out
    }

    #[test]
    fn silent_without_impulse() {
        let mut c = Convolver::new();
        let out = c.process(&impulse_block(0));
        assert!(out.is_silent());
        assert!(!c.has_impulse());
    }

    #[test]
    fn unit_impulse_passes_through() {
        let mut c = Convolver::new();
        c.set_impulse(Arc::new(AudioBuffer::new(vec![vec![1.0]], 8000)));
        let out = c.process(&impulse_block(5));
        assert!((out.left[5] - 1.0).abs() < 1e-4);
        assert!((out.right[5] - 1.0).abs() < 1e-4);
        assert!(out.left[6].abs() < 1e-4);
    }

    #[test]
    fn matches_direct_convolution_across_partitions() {
        let ir: Vec<f32> = (0..300).map(|i| ((i * 7 % 13) as f32 - 6.0) / 10.0).collect();
        let input: Vec<f32> = (0..RENDER_QUANTUM * 4)
            .map(|i| ((i * 5 % 11) as f32 - 5.0) / 8.0)
            .collect();
        let expected = direct(&input, &ir);

        let mut c = Convolver::new();
        c.set_impulse(Arc::new(AudioBuffer::new(vec![ir.clone(), ir], 8000)));
        let mut got = Vec::new();
        for chunk in input.chunks(RENDER_QUANTUM) {
            let block = StereoBlock {
                left: chunk.to_vec(),
                right: chunk.to_vec(),
            };
            got.extend(c.process(&block).left);
        }
        for (i, (g, e)) in got.iter().zip(&expected).enumerate() {
            assert!((g - e).abs() < 1e-3, "sample {i}: got {g}, expected {e}");
        }
    }

    #[test]
    fn tail_continues_after_input_stops() {
        let mut c = Convolver::new();
        let ir = vec![0.5_f32; RENDER_QUANTUM * 2];
        c.set_impulse(Arc::new(AudioBuffer::new(vec![ir], 8000)));
        c.process(&impulse_block(0));
        let tail = c.process(&StereoBlock::silent(RENDER_QUANTUM));
        assert!((tail.left[10] - 0.5).abs() < 1e-4, "got {}", tail.left[10]);
        let after = c.process(&StereoBlock::silent(RENDER_QUANTUM));
        assert!(after.peak() < 1e-4, "tail should end with the impulse");
    }
}
