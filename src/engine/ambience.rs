//! Ambient loop manager.
//!
//! Owns the ambience buffer and the looping player that feeds the ambience
//! gain. Start and stop are idempotent and independent of the main
//! transport. A start requested before any buffer exists is remembered and
//! honored when one is installed.

use std::sync::Arc;

use log::{debug, info};
use serde::Serialize;

use crate::dsp::buffer::AudioBuffer;
use crate::dsp::graph::{Node, NodeId, SignalGraph};
use crate::dsp::player::BufferPlayer;
use crate::error::Result;

/// Where the installed ambience came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbienceOrigin {
    Recorded,
    Synthesized,
}

#[derive(Debug, Default)]
pub struct AmbienceLoop {
    buffer: Option<Arc<AudioBuffer>>,
    origin: Option<AmbienceOrigin>,
    /// The looping player, while one runs.
    node: Option<NodeId>,
    wanted: bool,
}

impl AmbienceLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a loop buffer, replacing any previous one. A running loop is
    /// restarted on the new buffer.
    pub fn install(
        &mut self,
        graph: &mut SignalGraph,
        gain: NodeId,
        buffer: Arc<AudioBuffer>,
        origin: AmbienceOrigin,
    ) -> Result<()> {
        info!(
            "ambience: installed {origin:?} loop ({:.1}s)",
            buffer.duration()
        );
        self.buffer = Some(buffer);
        self.origin = Some(origin);
        if self.wanted {
            self.halt(graph);
            self.start(graph, gain)?;
        }
        Ok(())
    }

    /// Start looping. Returns true if a new loop began.
    pub fn start(&mut self, graph: &mut SignalGraph, gain: NodeId) -> Result<bool> {
        self.wanted = true;
        if self.node.is_some() {
            return Ok(false);
        }
        let Some(buffer) = &self.buffer else {
            debug!("ambience: start requested before a buffer is ready");
            return Ok(false);
        };
        let mut player = BufferPlayer::looping(Arc::clone(buffer));
        player.start(0.0);
        let node = graph.add(Node::BufferSource(player));
        if let Err(e) = graph.connect(node, gain) {
            graph.remove(node);
            return Err(e.into());
        }
        self.node = Some(node);
        info!("ambience: started");
        Ok(true)
    }

    /// Stop looping. Returns true if a loop was running.
    pub fn stop(&mut self, graph: &mut SignalGraph) -> bool {
        self.wanted = false;
        let stopped = self.halt(graph);
        if stopped {
            info!("ambience: stopped");
        }
        stopped
    }

    fn halt(&mut self, graph: &mut SignalGraph) -> bool {
        let Some(node) = self.node.take() else {
            return false;
        };
        if let Some(player) = graph.player_mut(node) {
            player.stop();
        }
        graph.remove(node);
        true
    }

    pub fn is_playing(&self) -> bool {
        self.node.is_some()
    }

    /// True once started and not stopped, whether or not a buffer exists yet.
    pub fn is_wanted(&self) -> bool {
        self.wanted
    }

    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn origin(&self) -> Option<AmbienceOrigin> {
        self.origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::graph::NodeKind;
    use crate::dsp::param::AudioParam;

    fn setup() -> (SignalGraph, NodeId) {
        let mut graph = SignalGraph::new();
        let gain = graph.add(Node::Gain(AudioParam::new(1.0)));
        graph.connect(gain, graph.destination()).unwrap();
        (graph, gain)
    }

    fn noise() -> Arc<AudioBuffer> {
        Arc::new(AudioBuffer::new(vec![vec![0.1; 800], vec![-0.1; 800]], 8000))
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let (mut graph, gain) = setup();
        let mut amb = AmbienceLoop::new();
        amb.install(&mut graph, gain, noise(), AmbienceOrigin::Synthesized)
            .unwrap();
        assert!(amb.start(&mut graph, gain).unwrap());
        assert!(!amb.start(&mut graph, gain).unwrap());
        assert_eq!(graph.count_kind(NodeKind::BufferSource), 1, "no duplicate loops");
        assert!(amb.stop(&mut graph));
        assert!(!amb.stop(&mut graph));
        assert_eq!(graph.count_kind(NodeKind::BufferSource), 0);
    }

    #[test]
    fn start_before_buffer_is_honored_on_install() {
        let (mut graph, gain) = setup();
        let mut amb = AmbienceLoop::new();
        assert!(!amb.start(&mut graph, gain).unwrap());
        assert!(amb.is_wanted());
        assert!(!amb.is_playing());
        amb.install(&mut graph, gain, noise(), AmbienceOrigin::Recorded)
            .unwrap();
        assert!(amb.is_playing());
        assert_eq!(amb.origin(), Some(AmbienceOrigin::Recorded));
    }

    #[test]
    fn stop_before_install_cancels_pending_start() {
        let (mut graph, gain) = setup();
        let mut amb = AmbienceLoop::new();
        amb.start(&mut graph, gain).unwrap();
        amb.stop(&mut graph);
        amb.install(&mut graph, gain, noise(), AmbienceOrigin::Synthesized)
            .unwrap();
        assert!(!amb.is_playing());
    }

    #[test]
    fn reinstall_swaps_running_loop() {
        let (mut graph, gain) = setup();
        let mut amb = AmbienceLoop::new();
        amb.install(&mut graph, gain, noise(), AmbienceOrigin::Synthesized)
            .unwrap();
        amb.start(&mut graph, gain).unwrap();
        amb.install(&mut graph, gain, noise(), AmbienceOrigin::Recorded)
            .unwrap();
        assert!(amb.is_playing());
        assert_eq!(graph.count_kind(NodeKind::BufferSource), 1);
    }
}
