//! Engine configuration.
//!
//! Every field has a default, so a partial JSON document only needs to name
//! what it overrides. The boost and envelope constants are tuned by ear and
//! kept configurable rather than derived.

use serde::{Deserialize, Serialize};

/// Whether the platform lets the processing context start without a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoplayPolicy {
    Allowed,
    RequiresGesture,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    pub autoplay: AutoplayPolicy,
    /// Rates closer than this to 1.0 stay on the native element.
    pub rate_epsilon: f64,
    pub min_rate: f64,
    pub max_rate: f64,
    /// Wet gain multiplier applied on top of the reverb percentage.
    pub wet_boost: f64,
    /// Smoothing time constant (seconds) for dry, wet and master gains.
    pub gain_time_constant: f64,
    /// Smoothing time constant (seconds) for the ambience gain.
    pub ambience_time_constant: f64,
    /// Master volume percentage set when media is connected.
    pub initial_volume: f64,
    pub reverb: ReverbConfig,
    pub ambience: AmbienceConfig,
    /// Seed for noise synthesis. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            autoplay: AutoplayPolicy::RequiresGesture,
            rate_epsilon: 0.05,
            min_rate: 0.25,
            max_rate: 4.0,
            wet_boost: 5.0,
            gain_time_constant: 0.05,
            ambience_time_constant: 0.1,
            initial_volume: 70.0,
            reverb: ReverbConfig::default(),
            ambience: AmbienceConfig::default(),
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON, filling unspecified fields with defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// True when `rate` needs the pitch-shifting (buffered) engine.
    pub fn is_pitch_shifting(&self, rate: f64) -> bool {
        (rate - 1.0).abs() >= self.rate_epsilon
    }
}

/// Impulse response synthesis parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbConfig {
    /// Impulse length in seconds.
    pub seconds: f64,
    /// Output scale keeping the impulse within a safe amplitude.
    pub mix: f64,
    /// Fraction of the impulse that receives extra early reflections.
    pub early_fraction: f64,
    /// Length of the degraded fallback impulse.
    pub fallback_seconds: f64,
    pub fallback_mix: f64,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        Self {
            seconds: 2.0,
            mix: 0.3,
            early_fraction: 0.1,
            fallback_seconds: 1.0,
            fallback_mix: 0.2,
        }
    }
}

/// Ambience bus parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbienceConfig {
    /// Pre-recorded loop fetched through the media fetcher.
    pub asset_url: String,
    /// Length of the synthetic fallback loop.
    pub seconds: f64,
    pub octaves: u32,
    pub amplitude: f64,
    /// Level used when toggling ambience on from silence.
    pub toggle_percent: f64,
}

impl Default for AmbienceConfig {
    fn default() -> Self {
        Self {
            asset_url: "/rain.mp3".to_string(),
            seconds: 10.0,
            octaves: 8,
            amplitude: 0.15,
            toggle_percent: 30.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = EngineConfig::from_json(r#"{"sample_rate": 8000, "reverb": {"seconds": 0.5}}"#)
            .unwrap();
        assert_eq!(cfg.sample_rate, 8000);
        assert!((cfg.reverb.seconds - 0.5).abs() < 1e-12);
        assert!((cfg.reverb.mix - 0.3).abs() < 1e-12);
        assert!((cfg.wet_boost - 5.0).abs() < 1e-12);
        assert_eq!(cfg.ambience.asset_url, "/rain.mp3");
    }

    #[test]
    fn autoplay_policy_names() {
        let cfg = EngineConfig::from_json(r#"{"autoplay": "allowed"}"#).unwrap();
        assert_eq!(cfg.autoplay, AutoplayPolicy::Allowed);
    }

    #[test]
    fn pitch_shift_threshold() {
        let cfg = EngineConfig::default();
        assert!(!cfg.is_pitch_shifting(1.0));
        assert!(!cfg.is_pitch_shifting(0.96));
        assert!(!cfg.is_pitch_shifting(1.049));
        assert!(cfg.is_pitch_shifting(0.95));
        assert!(cfg.is_pitch_shifting(0.6));
        assert!(cfg.is_pitch_shifting(1.5));
    }
}
