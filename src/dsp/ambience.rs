//! Synthetic ambience: a rain-like noise loop used when no recording loads.

use rand::Rng;

use super::buffer::AudioBuffer;
use crate::config::AmbienceConfig;

/// Synthesize a stereo loop of summed octave-scaled noise.
///
/// Each sample sums `octaves` uniform noise terms with halving amplitude,
/// then rides a slow, randomly jittered sinusoidal envelope around 0.5
/// before scaling down to `amplitude`.
pub fn synthesize_ambience<R: Rng>(
    sample_rate: u32,
    config: &AmbienceConfig,
    rng: &mut R,
) -> AudioBuffer {
    let length = (sample_rate as f64 * config.seconds).round().max(1.0) as usize;
    let amplitude = config.amplitude;

    let channels = (0..2)
        .map(|_| {
            (0..length)
                .map(|i| {
                    let mut noise = 0.0_f64;
                    let mut weight = 1.0_f64;
                    for _ in 0..config.octaves {
                        noise += rng.random_range(-1.0_f64..1.0) * weight;
                        weight *= 0.5;
                    }
                    let t = i as f64 / sample_rate as f64;
                    let swell = (t * 0.5).sin() * rng.random_range(0.0_f64..1.0);
                    let envelope = 0.5 + 0.3 * swell;
                    (noise * envelope * amplitude) as f32
                })
                .collect()
        })
        .collect();

    AudioBuffer::new(channels, sample_rate)
}

/// Worst-case peak of a synthesized loop for the given settings.
pub fn peak_bound(config: &AmbienceConfig) -> f64 {
    let noise_peak = 2.0 * (1.0 - 0.5_f64.powi(config.octaves as i32));
    noise_peak * 0.8 * config.amplitude
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn short_config() -> AmbienceConfig {
        AmbienceConfig {
            seconds: 1.0,
            ..AmbienceConfig::default()
        }
    }

    #[test]
    fn loop_length_and_channels() {
        let mut rng = StdRng::seed_from_u64(5);
        let buf = synthesize_ambience(8000, &short_config(), &mut rng);
        assert_eq!(buf.number_of_channels(), 2);
        assert_eq!(buf.frames(), 8000);
    }

    #[test]
    fn stays_within_safe_amplitude() {
        let cfg = short_config();
        let mut rng = StdRng::seed_from_u64(9);
        let buf = synthesize_ambience(8000, &cfg, &mut rng);
        let bound = peak_bound(&cfg) as f32;
        let peak = buf
            .channel(0)
            .iter()
            .chain(buf.channel(1))
            .fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak <= bound + 1e-6, "peak {peak} above bound {bound}");
        assert!(peak > 0.01, "ambience should not be silent");
    }

    #[test]
    fn no_octaves_means_silence() {
        let cfg = AmbienceConfig {
            octaves: 0,
            ..short_config()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let buf = synthesize_ambience(8000, &cfg, &mut rng);
        assert!(buf.channel(0).iter().all(|&s| s == 0.0));
    }
}
