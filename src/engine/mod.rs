//! The audio effects engine.
//!
//! [`AudioEffectsEngine`] owns the processing context, the signal graph and
//! every buffer. User intents arrive through the setters; only a rate change
//! can move the source between the native element and the decoded buffer.
//! Gain writes glide on long-lived nodes and are valid at any time.
//!
//! Fetching and decoding are the only asynchronous steps. They are issued as
//! [`AssetLoad`]s and run without borrowing the engine; `load_track` and
//! `load_ambience` await them in place for hosts that can lend `&mut self`.

pub mod ambience;
pub mod builder;
pub mod loader;
pub mod switcher;

use std::sync::Arc;

use log::{debug, error, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::context::{ContextState, DeferredTask, ProcessingContext, Readiness};
use crate::dsp::ambience::synthesize_ambience;
use crate::dsp::buffer::AudioBuffer;
use crate::dsp::graph::{RenderContext, SignalGraph};
use crate::dsp::mixer::RENDER_QUANTUM;
use crate::dsp::reverb::{synthesize_fallback_impulse, synthesize_impulse};
use crate::error::{EngineError, Result};
use crate::media::{AudioDecoder, MediaElement, MediaEvent, MediaFetcher};
use crate::preset::{Preset, PresetTable};

pub use ambience::{AmbienceLoop, AmbienceOrigin};
pub use builder::{MixNodes, Stage};
pub use loader::{AssetKind, AssetLoad, LoadedAsset};
pub use switcher::{EngineMode, SourceEngine, SourceSwitcher};

// ── Public state types ──────────────────────────────────────

/// What a rate request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateOutcome {
    /// The source moved to the other engine.
    Switched,
    /// The active source took the new rate in place.
    Updated,
    /// Remembered until media or the decoded track is available.
    Deferred,
}

/// Which impulse the convolver holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReverbQuality {
    Full,
    Fallback,
}

/// The user-facing control percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Levels {
    pub reverb_percent: f64,
    pub ambience_percent: f64,
    pub volume_percent: f64,
}

/// Target values of the four gain stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GainTargets {
    pub dry: f64,
    pub wet: f64,
    pub master: f64,
    pub ambience: f64,
}

/// Serializable view of the engine for debugging.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub mode: Option<EngineMode>,
    pub paused: bool,
    pub position: Option<f64>,
    pub rate: f64,
    pub pending_rate: Option<f64>,
    pub context: ContextState,
    pub context_time: f64,
    pub producers: usize,
    pub gains: GainTargets,
    pub levels: Levels,
    pub element_paused: Option<bool>,
    pub element_time: Option<f64>,
    pub track_loaded: bool,
    pub ambience_playing: bool,
    pub ambience_origin: Option<AmbienceOrigin>,
    pub reverb: Option<ReverbQuality>,
    /// The element plays while the buffered engine is active.
    pub double_playback: bool,
}

// ── Engine ──────────────────────────────────────────────────

pub struct AudioEffectsEngine {
    config: EngineConfig,
    context: ProcessingContext,
    stage: Stage,
    switcher: SourceSwitcher,
    ambience: AmbienceLoop,
    presets: PresetTable,
    levels: Levels,
    reverb: Option<ReverbQuality>,
    /// Latest rate that could not be applied yet.
    pending_rate: Option<f64>,
    track_generation: u64,
    ambience_generation: u64,
    fetcher: Arc<dyn MediaFetcher>,
    decoder: Arc<dyn AudioDecoder>,
    rng: StdRng,
    /// Interleaved output of the last rendered quantum.
    carry: Vec<f32>,
    carry_pos: usize,
}

impl AudioEffectsEngine {
    pub fn new(
        config: EngineConfig,
        fetcher: Arc<dyn MediaFetcher>,
        decoder: Arc<dyn AudioDecoder>,
    ) -> Result<Self> {
        let mut context = ProcessingContext::new(config.sample_rate, config.autoplay);
        context.initialize();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let stage = Stage::new(&config)?;
        let levels = Levels {
            reverb_percent: 0.0,
            ambience_percent: 0.0,
            volume_percent: config.initial_volume.clamp(0.0, 100.0),
        };

        let mut engine = AudioEffectsEngine {
            config,
            context,
            stage,
            switcher: SourceSwitcher::new(),
            ambience: AmbienceLoop::new(),
            presets: PresetTable::builtin(),
            levels,
            reverb: None,
            pending_rate: None,
            track_generation: 0,
            ambience_generation: 0,
            fetcher,
            decoder,
            rng,
            carry: Vec::new(),
            carry_pos: 0,
        };
        engine.prepare_reverb();
        Ok(engine)
    }

    // ── Context ─────────────────────────────────────────────

    /// Resume the context from a user gesture and run deferred work.
    pub fn resume(&mut self) -> Result<()> {
        self.context.resume()?;
        self.run_deferred();
        Ok(())
    }

    pub fn context_state(&self) -> ContextState {
        self.context.state()
    }

    /// Context time in seconds.
    pub fn now(&self) -> f64 {
        self.context.current_time()
    }

    fn check_open(&self) -> Result<()> {
        if self.context.state() == ContextState::Closed {
            return Err(EngineError::ContextClosed);
        }
        Ok(())
    }

    fn run_deferred(&mut self) {
        for task in self.context.take_ready() {
            match task {
                DeferredTask::BuildReverb => self.build_reverb(),
            }
        }
    }

    // ── Reverb ──────────────────────────────────────────────

    fn prepare_reverb(&mut self) {
        match self.context.ensure_running() {
            Readiness::Ready => self.build_reverb(),
            Readiness::NotReady => {
                debug!("reverb: context not running, impulse deferred");
                self.context.defer(DeferredTask::BuildReverb);
            }
        }
    }

    fn build_reverb(&mut self) {
        let impulse =
            synthesize_impulse(self.config.sample_rate, &self.config.reverb, &mut self.rng);
        info!("reverb: impulse ready ({:.1}s)", impulse.duration());
        builder::set_impulse(&mut self.stage.graph, &self.stage.mix, Arc::new(impulse));
        self.reverb = Some(ReverbQuality::Full);
    }

    /// Guarantee the convolver has some impulse before it is wired.
    fn ensure_impulse(&mut self) {
        if self.reverb.is_some() {
            return;
        }
        warn!("reverb: full impulse unavailable, using fallback");
        let impulse = synthesize_fallback_impulse(
            self.config.sample_rate,
            &self.config.reverb,
            &mut self.rng,
        );
        builder::set_impulse(&mut self.stage.graph, &self.stage.mix, Arc::new(impulse));
        self.reverb = Some(ReverbQuality::Fallback);
    }

    pub fn reverb_quality(&self) -> Option<ReverbQuality> {
        self.reverb
    }

    // ── Media ───────────────────────────────────────────────

    /// Attach the host's media element and start on the native engine.
    ///
    /// Replaces any previous element. Levels return to their initial values.
    pub fn connect_media(&mut self, element: Box<dyn MediaElement>) -> Result<()> {
        self.check_open()?;
        self.context.try_resume();
        self.run_deferred();
        self.ensure_impulse();

        self.switcher.detach(&mut self.stage);
        self.ambience.stop(&mut self.stage.graph);
        let position = element.current_time();
        let playing = !element.is_paused();
        info!("engine: connecting media '{}'", element.src());
        self.stage.element = Some(element);

        let mix = self.stage.mix;
        self.stage.jump(mix.dry, 1.0);
        self.stage.jump(mix.wet, 0.0);
        self.stage
            .jump(mix.master, builder::unit_gain(self.config.initial_volume.clamp(0.0, 100.0)));
        self.stage.jump(mix.ambience, 0.0);
        self.levels = Levels {
            reverb_percent: 0.0,
            ambience_percent: 0.0,
            volume_percent: self.config.initial_volume.clamp(0.0, 100.0),
        };

        let now = self.now();
        self.switcher
            .switch_to(&mut self.stage, EngineMode::Native, 1.0, position, playing, now)?;

        if let Some(rate) = self.pending_rate.take() {
            self.set_playback_rate(rate)?;
        }
        Ok(())
    }

    /// Start loading the decoded copy of the track. Supersedes earlier loads.
    ///
    /// The previous buffer is dropped unless the buffered engine is playing
    /// from it; then it stays until the new one installs.
    pub fn begin_track_load(&mut self, url: impl Into<String>) -> AssetLoad {
        self.track_generation += 1;
        if self.switcher.mode() != Some(EngineMode::Buffered) {
            self.stage.track = None;
        }
        AssetLoad::new(
            AssetKind::Track,
            url,
            self.track_generation,
            Arc::clone(&self.fetcher),
            Arc::clone(&self.decoder),
        )
    }

    /// Install a finished track load. Returns true if the buffer was taken.
    ///
    /// Failures leave pitch-shifted playback unavailable; they are logged,
    /// not returned.
    pub fn install_track(&mut self, loaded: LoadedAsset) -> bool {
        if loaded.kind != AssetKind::Track || loaded.generation != self.track_generation {
            debug!("engine: ignoring stale load of {}", loaded.url);
            return false;
        }
        match loaded.result {
            Ok(buffer) => {
                self.accept_track(buffer);
                true
            }
            Err(e) => {
                warn!("engine: track {} unavailable for buffered playback: {e}", loaded.url);
                false
            }
        }
    }

    /// Install an already decoded track, superseding any in-flight load.
    pub fn set_track_buffer(&mut self, buffer: AudioBuffer) {
        self.track_generation += 1;
        self.accept_track(buffer);
    }

    fn accept_track(&mut self, buffer: AudioBuffer) {
        info!("engine: decoded track ready ({:.1}s)", buffer.duration());
        self.stage.track = Some(Arc::new(buffer));
        if self.switcher.mode() == Some(EngineMode::Buffered) {
            // Move the active player onto the new buffer at the same offset.
            let now = self.now();
            let rebuilt = self.switcher.position(&self.stage, now).and_then(|position| {
                let playing = !self.switcher.is_paused(&self.stage);
                let rate = self.switcher.rate();
                self.switcher.switch_to(
                    &mut self.stage,
                    EngineMode::Buffered,
                    rate,
                    position,
                    playing,
                    now,
                )
            });
            if let Err(e) = rebuilt {
                warn!("engine: could not move buffered playback to the new track: {e}");
            }
        }
        if let Some(rate) = self.pending_rate.take() {
            if let Err(e) = self.set_playback_rate(rate) {
                warn!("engine: deferred rate {rate} could not be applied: {e}");
            }
        }
    }

    pub async fn load_track(&mut self, url: impl Into<String>) -> bool {
        let loaded = self.begin_track_load(url).run().await;
        self.install_track(loaded)
    }

    pub fn has_track(&self) -> bool {
        self.stage.track.is_some()
    }

    // ── Ambience ────────────────────────────────────────────

    /// Start loading the recorded ambience loop.
    pub fn begin_ambience_load(&mut self) -> AssetLoad {
        self.ambience_generation += 1;
        AssetLoad::new(
            AssetKind::Ambience,
            self.config.ambience.asset_url.clone(),
            self.ambience_generation,
            Arc::clone(&self.fetcher),
            Arc::clone(&self.decoder),
        )
    }

    /// Install a finished ambience load, synthesizing a loop if it failed.
    /// Returns `None` for a stale load.
    pub fn install_ambience(&mut self, loaded: LoadedAsset) -> Result<Option<AmbienceOrigin>> {
        if loaded.kind != AssetKind::Ambience || loaded.generation != self.ambience_generation {
            debug!("engine: ignoring stale load of {}", loaded.url);
            return Ok(None);
        }
        let (buffer, origin) = match loaded.result {
            Ok(buffer) => (buffer, AmbienceOrigin::Recorded),
            Err(e) => {
                warn!("ambience: {} unavailable ({e}), synthesizing", loaded.url);
                (self.synthesize_ambience(), AmbienceOrigin::Synthesized)
            }
        };
        let gain = self.stage.mix.ambience;
        self.ambience
            .install(&mut self.stage.graph, gain, Arc::new(buffer), origin)?;
        Ok(Some(origin))
    }

    /// Install a synthesized loop without trying the recorded asset.
    pub fn use_synthetic_ambience(&mut self) -> Result<()> {
        self.ambience_generation += 1;
        let buffer = self.synthesize_ambience();
        let gain = self.stage.mix.ambience;
        self.ambience.install(
            &mut self.stage.graph,
            gain,
            Arc::new(buffer),
            AmbienceOrigin::Synthesized,
        )
    }

    pub async fn load_ambience(&mut self) -> Result<AmbienceOrigin> {
        let loaded = self.begin_ambience_load().run().await;
        let origin = self.install_ambience(loaded)?;
        Ok(origin.unwrap_or(AmbienceOrigin::Synthesized))
    }

    fn synthesize_ambience(&mut self) -> AudioBuffer {
        synthesize_ambience(self.config.sample_rate, &self.config.ambience, &mut self.rng)
    }

    pub fn ambience_playing(&self) -> bool {
        self.ambience.is_playing()
    }

    // ── Controls ────────────────────────────────────────────

    fn validate_rate(&self, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate < self.config.min_rate || rate > self.config.max_rate {
            return Err(EngineError::InvalidParameter { name: "rate", value: rate });
        }
        Ok(())
    }

    /// Request a playback rate, switching engines when the rate class changes.
    pub fn set_playback_rate(&mut self, rate: f64) -> Result<RateOutcome> {
        self.check_open()?;
        self.validate_rate(rate)?;
        let target = if self.config.is_pitch_shifting(rate) {
            EngineMode::Buffered
        } else {
            EngineMode::Native
        };

        let Some(current) = self.switcher.mode() else {
            debug!("engine: no media yet, holding rate {rate}");
            self.pending_rate = Some(rate);
            return Ok(RateOutcome::Deferred);
        };
        if target == EngineMode::Buffered && self.stage.track.is_none() {
            warn!("engine: decoded track not ready, rate {rate} deferred");
            self.pending_rate = Some(rate);
            return Ok(RateOutcome::Deferred);
        }
        self.pending_rate = None;

        let now = self.now();
        if current == target {
            self.switcher.update_rate(&mut self.stage, rate, now)?;
            return Ok(RateOutcome::Updated);
        }
        let position = self.switcher.position(&self.stage, now)?;
        let playing = !self.switcher.is_paused(&self.stage);
        self.switcher
            .switch_to(&mut self.stage, target, rate, position, playing, now)?;
        Ok(RateOutcome::Switched)
    }

    pub fn playback_rate(&self) -> f64 {
        self.switcher.rate()
    }

    pub fn pending_rate(&self) -> Option<f64> {
        self.pending_rate
    }

    /// Reverb amount in percent. Dry stays at unity; wet is boosted.
    pub fn set_reverb(&mut self, percent: f64) -> Result<()> {
        self.check_open()?;
        let percent = builder::clamp_percent("reverb", percent)?;
        let now = self.now();
        let wet = builder::wet_gain(percent, self.config.wet_boost);
        let mix = self.stage.mix;
        self.stage.ramp(mix.wet, wet, now, self.config.gain_time_constant);
        self.levels.reverb_percent = percent;
        debug!("engine: reverb {percent}% (wet {wet:.2})");
        Ok(())
    }

    pub fn set_volume(&mut self, percent: f64) -> Result<()> {
        self.check_open()?;
        let percent = builder::clamp_percent("volume", percent)?;
        let now = self.now();
        let mix = self.stage.mix;
        self.stage.ramp(
            mix.master,
            builder::unit_gain(percent),
            now,
            self.config.gain_time_constant,
        );
        self.levels.volume_percent = percent;
        debug!("engine: volume {percent}%");
        Ok(())
    }

    /// Ambience level in percent. Zero stops the loop, anything else starts it.
    pub fn set_ambience(&mut self, percent: f64) -> Result<()> {
        self.check_open()?;
        let percent = builder::clamp_percent("ambience", percent)?;
        let now = self.now();
        let mix = self.stage.mix;
        self.stage.ramp(
            mix.ambience,
            builder::unit_gain(percent),
            now,
            self.config.ambience_time_constant,
        );
        if percent > 0.0 {
            self.ambience.start(&mut self.stage.graph, mix.ambience)?;
        } else {
            self.ambience.stop(&mut self.stage.graph);
        }
        self.levels.ambience_percent = percent;
        debug!("engine: ambience {percent}%");
        Ok(())
    }

    /// Flip ambience between off and the toggle level. Returns whether it is
    /// now on.
    pub fn toggle_ambience(&mut self) -> Result<bool> {
        let target = if self.levels.ambience_percent > 0.0 {
            0.0
        } else {
            self.config.ambience.toggle_percent
        };
        self.set_ambience(target)?;
        Ok(self.ambience.is_wanted())
    }

    pub fn levels(&self) -> Levels {
        self.levels
    }

    pub fn gains(&self) -> GainTargets {
        let mix = self.stage.mix;
        GainTargets {
            dry: self.stage.gain_target(mix.dry),
            wet: self.stage.gain_target(mix.wet),
            master: self.stage.gain_target(mix.master),
            ambience: self.stage.gain_target(mix.ambience),
        }
    }

    // ── Presets ─────────────────────────────────────────────

    pub fn presets(&self) -> &PresetTable {
        &self.presets
    }

    pub fn presets_mut(&mut self) -> &mut PresetTable {
        &mut self.presets
    }

    /// Apply a named preset. Returns `None` if no preset has that name.
    pub fn apply_preset(&mut self, name: &str) -> Result<Option<RateOutcome>> {
        let Some(preset) = self.presets.get(name).copied() else {
            debug!("engine: no preset named '{name}'");
            return Ok(None);
        };
        info!("engine: applying preset '{name}'");
        self.apply(preset).map(Some)
    }

    /// Apply all four controls. Every value is validated before any is set.
    pub fn apply(&mut self, preset: Preset) -> Result<RateOutcome> {
        self.check_open()?;
        self.validate_rate(preset.rate)?;
        builder::clamp_percent("reverb", preset.reverb_percent)?;
        builder::clamp_percent("ambience", preset.ambience_percent)?;
        builder::clamp_percent("volume", preset.volume_percent)?;

        self.set_reverb(preset.reverb_percent)?;
        self.set_ambience(preset.ambience_percent)?;
        self.set_volume(preset.volume_percent)?;
        self.set_playback_rate(preset.rate)
    }

    // ── Transport ───────────────────────────────────────────

    fn no_media() -> EngineError {
        EngineError::PlaybackRejected("no media connected".to_string())
    }

    pub fn play(&mut self) -> Result<()> {
        self.check_open()?;
        let now = self.now();
        match self.switcher.mode() {
            None => Err(Self::no_media()),
            Some(EngineMode::Native) => self
                .stage
                .element
                .as_deref_mut()
                .ok_or_else(Self::no_media)?
                .play(),
            Some(EngineMode::Buffered) => {
                if !self.switcher.is_paused(&self.stage) {
                    return Ok(());
                }
                let position = self.switcher.position(&self.stage, now)?;
                let rate = self.switcher.rate();
                self.switcher
                    .switch_to(&mut self.stage, EngineMode::Buffered, rate, position, true, now)
            }
        }
    }

    pub fn pause(&mut self) -> Result<()> {
        self.check_open()?;
        let now = self.now();
        match self.switcher.mode() {
            None => Err(Self::no_media()),
            Some(EngineMode::Native) => {
                if let Some(element) = self.stage.element.as_deref_mut() {
                    element.pause();
                }
                Ok(())
            }
            Some(EngineMode::Buffered) => {
                if self.switcher.is_paused(&self.stage) {
                    return Ok(());
                }
                let position = self.switcher.position(&self.stage, now)?;
                let rate = self.switcher.rate();
                self.switcher
                    .switch_to(&mut self.stage, EngineMode::Buffered, rate, position, false, now)
            }
        }
    }

    /// Jump to `seconds`. The buffered engine has no seek of its own, so it
    /// is rebuilt at the new offset.
    pub fn seek(&mut self, seconds: f64) -> Result<()> {
        self.check_open()?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(EngineError::InvalidParameter {
                name: "position",
                value: seconds,
            });
        }
        let now = self.now();
        match self.switcher.mode() {
            None => Err(Self::no_media()),
            Some(EngineMode::Native) => {
                if let Some(element) = self.stage.element.as_deref_mut() {
                    element.set_current_time(seconds);
                }
                Ok(())
            }
            Some(EngineMode::Buffered) => {
                let playing = !self.switcher.is_paused(&self.stage);
                let rate = self.switcher.rate();
                self.switcher
                    .switch_to(&mut self.stage, EngineMode::Buffered, rate, seconds, playing, now)
            }
        }
    }

    /// Mirror transport events from the element's own controls. Only the
    /// buffered engine needs them; the native one already follows its element.
    pub fn handle_media_event(&mut self, event: MediaEvent) -> Result<()> {
        self.check_open()?;
        if self.switcher.mode() != Some(EngineMode::Buffered) {
            return Ok(());
        }
        debug!("engine: element {event:?} while buffered");
        match event {
            MediaEvent::Play => {
                self.switcher.silence_element(&mut self.stage);
                self.play()
            }
            MediaEvent::Pause => {
                if self.switcher.take_self_paused() {
                    return Ok(());
                }
                self.pause()
            }
            MediaEvent::Seeked => {
                let Some(target) = self.stage.element.as_ref().map(|e| e.current_time()) else {
                    return Ok(());
                };
                self.seek(target)
            }
        }
    }

    /// Elapsed track position in seconds.
    pub fn position(&self) -> Result<f64> {
        self.switcher
            .position(&self.stage, self.now())
            .inspect_err(|e| error!("engine: position read with no producer: {e}"))
    }

    pub fn is_paused(&self) -> bool {
        self.switcher.is_paused(&self.stage)
    }

    pub fn mode(&self) -> Option<EngineMode> {
        self.switcher.mode()
    }

    // ── Rendering ───────────────────────────────────────────

    /// Fill `out` with interleaved stereo output. Silent while the context
    /// is not running.
    pub fn render(&mut self, out: &mut [f32]) {
        let mut written = 0;
        while written < out.len() {
            if self.carry_pos >= self.carry.len() {
                self.render_quantum();
            }
            let n = (out.len() - written).min(self.carry.len() - self.carry_pos);
            out[written..written + n]
                .copy_from_slice(&self.carry[self.carry_pos..self.carry_pos + n]);
            written += n;
            self.carry_pos += n;
        }
    }

    fn render_quantum(&mut self) {
        self.carry.clear();
        self.carry_pos = 0;
        if !self.context.is_running() {
            self.carry.resize(RENDER_QUANTUM * 2, 0.0);
            return;
        }

        let mut rc = RenderContext {
            time: self.context.current_time(),
            sample_rate: self.config.sample_rate as f64,
            frames: RENDER_QUANTUM,
            element: self
                .stage
                .element
                .as_deref_mut()
                .map(|e| e as &mut dyn MediaElement),
        };
        let block = self.stage.graph.render(&mut rc);
        for (l, r) in block.left.iter().zip(&block.right) {
            self.carry.push(*l);
            self.carry.push(*r);
        }
        self.context.advance(RENDER_QUANTUM);

        let now = self.now();
        if let Err(e) = self.switcher.settle_finished(&mut self.stage, now) {
            error!("engine: could not settle finished track: {e}");
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn graph(&self) -> &SignalGraph {
        &self.stage.graph
    }

    /// Sources feeding the dry/wet split. Never more than one.
    pub fn producer_count(&self) -> usize {
        self.stage.producer_count()
    }

    // ── Diagnostics ─────────────────────────────────────────

    pub fn snapshot(&self) -> EngineSnapshot {
        let mode = self.switcher.mode();
        let element_paused = self.stage.element.as_ref().map(|e| e.is_paused());
        let double_playback = mode == Some(EngineMode::Buffered) && element_paused == Some(false);
        if double_playback {
            warn!("engine: element and buffered engine both playing");
        }
        EngineSnapshot {
            mode,
            paused: self.is_paused(),
            position: self.switcher.position(&self.stage, self.now()).ok(),
            rate: self.switcher.rate(),
            pending_rate: self.pending_rate,
            context: self.context.state(),
            context_time: self.now(),
            producers: self.producer_count(),
            gains: self.gains(),
            levels: self.levels,
            element_paused,
            element_time: self.stage.element.as_ref().map(|e| e.current_time()),
            track_loaded: self.has_track(),
            ambience_playing: self.ambience.is_playing(),
            ambience_origin: self.ambience.origin(),
            reverb: self.reverb,
            double_playback,
        }
    }

    /// Stop everything and close the context. Idempotent.
    pub fn dispose(&mut self) {
        if self.context.state() == ContextState::Closed {
            return;
        }
        self.ambience.stop(&mut self.stage.graph);
        self.switcher.detach(&mut self.stage);
        if let Some(element) = self.stage.element.as_deref_mut() {
            element.pause();
        }
        self.pending_rate = None;
        self.context.close();
        info!("engine: disposed");
    }
}
