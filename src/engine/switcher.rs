//! Source switching between the native element and the decoded buffer.
//!
//! Exactly one [`SourceEngine`] variant is live. A switch tears the outgoing
//! producer down completely before the incoming one is wired, so the mix
//! never sees two producers. Everything here is synchronous; `&mut` access
//! to the switcher is what serializes transitions.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use super::builder::{self, Stage};
use crate::dsp::graph::{Node, NodeId};
use crate::dsp::player::{BufferPlayer, PlayerState};
use crate::error::{EngineError, GraphError, Result};

/// Which playback engine produces the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// The media element; rate changes keep pitch.
    Native,
    /// A one-shot player over the decoded track; pitch follows rate.
    Buffered,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceEngine {
    /// Nothing connected yet, or torn down for good.
    Detached,
    Native {
        node: NodeId,
    },
    Buffered {
        node: NodeId,
        /// Track position when the current player started or froze.
        base_position: f64,
        /// Context time the current player started at.
        start_clock: f64,
        playing: bool,
    },
}

#[derive(Debug)]
pub struct SourceSwitcher {
    engine: SourceEngine,
    rate: f64,
    /// Set when the switcher paused a playing element, so the pause event the
    /// element raises for it is not mistaken for a user pause.
    self_paused: bool,
}

impl SourceSwitcher {
    pub fn new() -> Self {
        SourceSwitcher {
            engine: SourceEngine::Detached,
            rate: 1.0,
            self_paused: false,
        }
    }

    pub fn engine(&self) -> SourceEngine {
        self.engine
    }

    pub fn mode(&self) -> Option<EngineMode> {
        match self.engine {
            SourceEngine::Detached => None,
            SourceEngine::Native { .. } => Some(EngineMode::Native),
            SourceEngine::Buffered { .. } => Some(EngineMode::Buffered),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn active_node(&self) -> Option<NodeId> {
        match self.engine {
            SourceEngine::Detached => None,
            SourceEngine::Native { node } | SourceEngine::Buffered { node, .. } => Some(node),
        }
    }

    /// Elapsed track position in seconds.
    pub fn position(&self, stage: &Stage, now: f64) -> Result<f64> {
        match self.engine {
            SourceEngine::Detached => Err(GraphError::NoActiveProducer.into()),
            SourceEngine::Native { .. } => stage
                .element
                .as_ref()
                .map(|e| e.current_time())
                .ok_or_else(|| GraphError::NoActiveProducer.into()),
            SourceEngine::Buffered {
                base_position,
                start_clock,
                playing,
                ..
            } => {
                let position = if playing {
                    base_position + (now - start_clock) * self.rate
                } else {
                    base_position
                };
                let duration = stage.track.as_ref().map_or(f64::INFINITY, |t| t.duration());
                Ok(position.min(duration))
            }
        }
    }

    pub fn is_paused(&self, stage: &Stage) -> bool {
        match self.engine {
            SourceEngine::Detached => true,
            SourceEngine::Native { .. } => stage.element.as_ref().is_none_or(|e| e.is_paused()),
            SourceEngine::Buffered { playing, .. } => !playing,
        }
    }

    /// Move to `target` at `position`, playing or armed.
    ///
    /// Switching to the mode already active still rebuilds the producer; the
    /// caller uses [`SourceSwitcher::update_rate`] when only the rate moves.
    pub fn switch_to(
        &mut self,
        stage: &mut Stage,
        target: EngineMode,
        rate: f64,
        position: f64,
        playing: bool,
        now: f64,
    ) -> Result<()> {
        // Validate before tearing anything down.
        let track = match target {
            EngineMode::Native => None,
            EngineMode::Buffered => Some(
                stage
                    .track
                    .clone()
                    .ok_or(GraphError::NoActiveProducer)?,
            ),
        };
        if stage.element.is_none() {
            return Err(GraphError::NoActiveProducer.into());
        }

        self.teardown(stage);

        let node = match track {
            None => {
                let Some(element) = stage.element.as_deref_mut() else {
                    return Err(GraphError::NoActiveProducer.into());
                };
                element.set_playback_rate(rate);
                element.set_current_time(position);
                let node = stage.graph.add(Node::MediaElementSource);
                builder::wire(&mut stage.graph, &stage.mix, node)?;
                self.engine = SourceEngine::Native { node };
                self.rate = rate;
                // Any pause we caused is superseded; element events now
                // belong to the user again.
                self.self_paused = false;
                if playing {
                    element.play()?;
                }
                node
            }
            Some(track) => {
                self.silence_element(stage);
                let position = position.clamp(0.0, track.duration());
                let mut player = BufferPlayer::new(Arc::clone(&track), rate);
                if playing && !player.start(position) {
                    return Err(EngineError::PlaybackRejected(
                        "fresh player refused to start".to_string(),
                    ));
                }
                let node = stage.graph.add(Node::BufferSource(player));
                builder::wire(&mut stage.graph, &stage.mix, node)?;
                self.engine = SourceEngine::Buffered {
                    node,
                    base_position: position,
                    start_clock: now,
                    playing,
                };
                node
            }
        };

        self.rate = rate;
        info!(
            "switcher: {:?} at {position:.2}s, rate {rate}, {} ({node:?})",
            target,
            if playing { "playing" } else { "paused" }
        );
        Ok(())
    }

    /// Change the rate on the active producer without a rebuild.
    pub fn update_rate(&mut self, stage: &mut Stage, rate: f64, now: f64) -> Result<()> {
        let position = self.position(stage, now)?;
        match &mut self.engine {
            SourceEngine::Detached => return Err(GraphError::NoActiveProducer.into()),
            SourceEngine::Native { .. } => {
                if let Some(element) = stage.element.as_deref_mut() {
                    element.set_playback_rate(rate);
                }
            }
            SourceEngine::Buffered {
                node,
                base_position,
                start_clock,
                ..
            } => {
                *base_position = position;
                *start_clock = now;
                let node = *node;
                match stage.graph.player_mut(node) {
                    Some(player) => player.set_rate(rate),
                    None => return Err(GraphError::UnknownNode(node).into()),
                }
            }
        }
        debug!("switcher: rate {} -> {rate}", self.rate);
        self.rate = rate;
        Ok(())
    }

    /// Stop and disconnect the active producer and the main mix path.
    /// Safe to call with nothing connected.
    pub fn teardown(&mut self, stage: &mut Stage) {
        if let Some(node) = self.active_node() {
            if let Some(player) = stage.graph.player_mut(node) {
                player.stop();
            }
            stage.graph.remove(node);
            debug!("switcher: removed producer {node:?}");
        }
        builder::unwire(&mut stage.graph, &stage.mix);
        self.engine = SourceEngine::Detached;
    }

    /// Freeze the buffered transport at the end of the track once its player
    /// has run out. Returns true if it did.
    pub fn settle_finished(&mut self, stage: &mut Stage, now: f64) -> Result<bool> {
        let SourceEngine::Buffered {
            node,
            playing: true,
            ..
        } = self.engine
        else {
            return Ok(false);
        };
        let finished = stage
            .graph
            .player(node)
            .is_none_or(|p| p.state() == PlayerState::Finished);
        if !finished {
            return Ok(false);
        }
        let end = stage.track.as_ref().map_or(0.0, |t| t.duration());
        info!("switcher: buffered track ended at {end:.2}s");
        self.switch_to(stage, EngineMode::Buffered, self.rate, end, false, now)?;
        Ok(true)
    }

    /// Pause the element if it plays, remembering that the pause was ours.
    pub fn silence_element(&mut self, stage: &mut Stage) {
        if let Some(element) = stage.element.as_deref_mut() {
            if !element.is_paused() {
                element.pause();
                self.self_paused = true;
            }
        }
    }

    /// Consume a pending self-inflicted pause marker.
    pub fn take_self_paused(&mut self) -> bool {
        std::mem::take(&mut self.self_paused)
    }

    /// Forget everything, leaving the switcher detached with no producer.
    pub fn detach(&mut self, stage: &mut Stage) {
        if self.active_node().is_some() {
            warn!("switcher: detaching active producer");
        }
        self.teardown(stage);
        self.self_paused = false;
    }
}

impl Default for SourceSwitcher {
    fn default() -> Self {
        Self::new()
    }
}
