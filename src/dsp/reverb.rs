//! Reverb impulse synthesis.
//!
//! No recorded room is shipped; the convolution stage runs on a noise burst
//! shaped by a quadratic decay, with extra energy in the first part of the
//! tail standing in for early reflections.

use rand::Rng;

use super::buffer::AudioBuffer;
use crate::config::ReverbConfig;

/// Synthesize the full-quality stereo impulse response.
///
/// Sample `i` of `n` is `U(-1, 1) * ((n - i) / n)^2`, plus a half-amplitude
/// extra noise term over the first `early_fraction` of the buffer, all scaled
/// by `mix`.
pub fn synthesize_impulse<R: Rng>(
    sample_rate: u32,
    config: &ReverbConfig,
    rng: &mut R,
) -> AudioBuffer {
    let length = (sample_rate as f64 * config.seconds).round().max(1.0) as usize;
    let early_end = length as f64 * config.early_fraction;
    let mix = config.mix as f32;

    let channels = (0..2)
        .map(|_| {
            (0..length)
                .map(|i| {
                    let remaining = (length - i) as f32 / length as f32;
                    let decay = remaining * remaining;
                    let noise = rng.random_range(-1.0_f32..1.0) * decay;
                    let early = if (i as f64) < early_end {
                        rng.random_range(-1.0_f32..1.0) * decay * 0.5
                    } else {
                        0.0
                    };
                    (noise + early) * mix
                })
                .collect()
        })
        .collect();

    AudioBuffer::new(channels, sample_rate)
}

/// Cheaper, degraded impulse used when the full one could not be built in time:
/// shorter, linear decay and a lower level.
pub fn synthesize_fallback_impulse<R: Rng>(
    sample_rate: u32,
    config: &ReverbConfig,
    rng: &mut R,
) -> AudioBuffer {
    let length = (sample_rate as f64 * config.fallback_seconds).round().max(1.0) as usize;
    let mix = config.fallback_mix as f32;

    let channels = (0..2)
        .map(|_| {
            (0..length)
                .map(|i| {
                    let decay = 1.0 - i as f32 / length as f32;
                    rng.random_range(-1.0_f32..1.0) * decay * mix
                })
                .collect()
        })
        .collect();

    AudioBuffer::new(channels, sample_rate)
}

/// Root-mean-square level of consecutive windows of one channel.
pub fn windowed_rms(samples: &[f32], windows: usize) -> Vec<f32> {
    let windows = windows.max(1);
    let size = (samples.len() / windows).max(1);
    samples
        .chunks(size)
        .take(windows)
        .map(|w| (w.iter().map(|s| s * s).sum::<f32>() / w.len() as f32).sqrt())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn impulse_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let ir = synthesize_impulse(8000, &ReverbConfig::default(), &mut rng);
        assert_eq!(ir.number_of_channels(), 2);
        assert_eq!(ir.frames(), 16000);
        assert_eq!(ir.sample_rate(), 8000);
        assert!(
            ir.channel(0).iter().all(|s| s.abs() <= 0.45 + 1e-6),
            "scaled impulse must stay within mix * 1.5"
        );
    }

    #[test]
    fn energy_decays_monotonically() {
        for seed in [1_u64, 2, 3] {
            let mut rng = StdRng::seed_from_u64(seed);
            let ir = synthesize_impulse(8000, &ReverbConfig::default(), &mut rng);
            for ch in 0..2 {
                let rms = windowed_rms(ir.channel(ch), 10);
                assert!(
                    rms.windows(2).all(|w| w[1] < w[0]),
                    "windowed RMS should fall across the buffer: {rms:?}"
                );
            }
        }
    }

    #[test]
    fn channels_are_decorrelated() {
        let mut rng = StdRng::seed_from_u64(11);
        let ir = synthesize_impulse(8000, &ReverbConfig::default(), &mut rng);
        assert_ne!(ir.channel(0), ir.channel(1));
    }

    #[test]
    fn fallback_is_shorter_and_quieter() {
        let cfg = ReverbConfig::default();
        let mut rng = StdRng::seed_from_u64(3);
        let full = synthesize_impulse(8000, &cfg, &mut rng);
        let fallback = synthesize_fallback_impulse(8000, &cfg, &mut rng);
        assert_eq!(fallback.frames(), 8000);
        assert!(fallback.frames() < full.frames());
        assert!(fallback.channel(0).iter().all(|s| s.abs() <= 0.2 + 1e-6));
        let rms = windowed_rms(fallback.channel(0), 5);
        assert!(rms.windows(2).all(|w| w[1] < w[0]), "{rms:?}");
    }
}
