pub mod config;
pub mod context;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod media;
pub mod preset;

pub use config::EngineConfig;
pub use engine::{AudioEffectsEngine, EngineMode, EngineSnapshot, RateOutcome};
pub use error::EngineError;
pub use media::{MediaElement, MediaEvent, MediaSource};
pub use preset::{Preset, PresetTable};

use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the atmos-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: names of the built-in presets, in display order.
#[wasm_bindgen]
pub fn preset_names() -> Result<JsValue, JsValue> {
    let table = PresetTable::builtin();
    serde_wasm_bindgen::to_value(&table.names()).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: a built-in preset as `{rate, reverbPercent, ambiencePercent,
/// volumePercent}`, or `null` if there is none by that name.
#[wasm_bindgen]
pub fn preset_json(name: &str) -> Result<JsValue, JsValue> {
    match PresetTable::builtin().get(name) {
        Some(preset) => serde_wasm_bindgen::to_value(preset)
            .map_err(|e| JsValue::from_str(&format!("{e}"))),
        None => Ok(JsValue::NULL),
    }
}

/// WASM-exposed: whether `rate` needs the pitch-shifting buffered engine.
#[wasm_bindgen]
pub fn is_pitch_shifting(rate: f64) -> bool {
    EngineConfig::default().is_pitch_shifting(rate)
}

/// WASM-exposed: check a source URL before asking the resolver for it.
#[wasm_bindgen]
pub fn is_valid_source(url: &str) -> bool {
    MediaSource::parse(url).is_ok()
}

/// WASM-exposed: synthesize the default reverb impulse as interleaved
/// stereo f32 samples, ready to load into a platform convolver.
#[wasm_bindgen]
pub fn reverb_impulse(sample_rate: u32) -> Vec<f32> {
    let config = EngineConfig::default();
    let impulse = dsp::reverb::synthesize_impulse(sample_rate, &config.reverb, &mut rand::rng());
    impulse
        .channel(0)
        .iter()
        .zip(impulse.channel(1))
        .flat_map(|(&l, &r)| [l, r])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_shift_threshold() {
        assert!(!is_pitch_shifting(1.0));
        assert!(!is_pitch_shifting(0.97));
        assert!(is_pitch_shifting(0.6));
        assert!(is_pitch_shifting(1.25));
    }

    #[test]
    fn preset_exports_return_js_results() {
        // Type-checked only; calling into JsValue needs a wasm host.
        let _: fn() -> std::result::Result<JsValue, JsValue> = preset_names;
        let _: fn(&str) -> std::result::Result<JsValue, JsValue> = preset_json;
        assert_eq!(PresetTable::builtin().names().len(), 5);
    }

    #[test]
    fn source_validation() {
        assert!(is_valid_source("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(!is_valid_source("ftp://example.com/song.mp3"));
    }

    #[test]
    fn impulse_is_interleaved_stereo() {
        let samples = reverb_impulse(4000);
        assert_eq!(samples.len(), 4000 * 2 * 2, "2 seconds of stereo");
    }
}
