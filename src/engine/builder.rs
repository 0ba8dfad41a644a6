//! Signal graph wiring.
//!
//! ```text
//! source ──┬──────────────── dry ──┐
//!          └─ convolver ──── wet ──┴── master ──┐
//!                                               ├── destination
//! ambience loop ─────────── ambience gain ──────┘
//! ```
//!
//! The gain and convolver nodes live as long as the engine. Only the source
//! changes between rebuilds, so wiring is safe to repeat: edges are a set.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::dsp::buffer::AudioBuffer;
use crate::dsp::convolver::Convolver;
use crate::dsp::graph::{Node, NodeId, SignalGraph};
use crate::dsp::param::AudioParam;
use crate::error::{EngineError, GraphError, Result};
use crate::media::MediaElement;

// ── Mix nodes ───────────────────────────────────────────────

/// Long-lived nodes of the mix. Parameter writes target these, so they are
/// valid at any time, including in the middle of a source switch.
#[derive(Debug, Clone, Copy)]
pub struct MixNodes {
    pub dry: NodeId,
    pub convolver: NodeId,
    pub wet: NodeId,
    pub master: NodeId,
    pub ambience: NodeId,
}

impl MixNodes {
    /// Nodes a producer feeds. At most one source may have edges into these.
    pub fn split(&self) -> [NodeId; 2] {
        [self.dry, self.convolver]
    }
}

/// Create the persistent nodes with the initial levels: dry at unity, wet
/// and ambience silent, master at the configured volume.
pub fn create_mix(graph: &mut SignalGraph, config: &EngineConfig) -> Result<MixNodes> {
    let mix = MixNodes {
        dry: graph.add(Node::Gain(AudioParam::new(1.0))),
        convolver: graph.add(Node::Convolver(Convolver::new())),
        wet: graph.add(Node::Gain(AudioParam::new(0.0))),
        master: graph.add(Node::Gain(AudioParam::new(unit_gain(
            config.initial_volume.clamp(0.0, 100.0),
        )))),
        ambience: graph.add(Node::Gain(AudioParam::new(0.0))),
    };
    graph.connect(mix.ambience, graph.destination())?;
    Ok(mix)
}

/// Connect `source` through the dry and wet paths into the sink.
pub fn wire(graph: &mut SignalGraph, mix: &MixNodes, source: NodeId) -> Result<()> {
    let destination = graph.destination();
    graph.connect(source, mix.dry)?;
    graph.connect(source, mix.convolver)?;
    graph.connect(mix.convolver, mix.wet)?;
    graph.connect(mix.dry, mix.master)?;
    graph.connect(mix.wet, mix.master)?;
    graph.connect(mix.master, destination)?;

    let producers = graph.sources_into(&mix.split()).len();
    if producers > 1 {
        return Err(GraphError::MultipleProducers(producers).into());
    }
    Ok(())
}

/// Disconnect every node on the main path. The ambience bus is untouched.
pub fn unwire(graph: &mut SignalGraph, mix: &MixNodes) {
    for node in [mix.dry, mix.convolver, mix.wet, mix.master] {
        graph.disconnect(node);
    }
}

pub fn set_impulse(graph: &mut SignalGraph, mix: &MixNodes, impulse: Arc<AudioBuffer>) {
    if let Some(convolver) = graph.convolver_mut(mix.convolver) {
        convolver.set_impulse(impulse);
    }
}

// ── Stage ───────────────────────────────────────────────────

/// Everything a source switch operates on.
pub struct Stage {
    pub graph: SignalGraph,
    pub mix: MixNodes,
    /// The host's media element, once connected.
    pub element: Option<Box<dyn MediaElement>>,
    /// Decoded PCM of the current track.
    pub track: Option<Arc<AudioBuffer>>,
}

impl Stage {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let mut graph = SignalGraph::new();
        let mix = create_mix(&mut graph, config)?;
        Ok(Stage {
            graph,
            mix,
            element: None,
            track: None,
        })
    }

    /// Sources currently feeding the dry/wet split.
    pub fn producer_count(&self) -> usize {
        self.graph.sources_into(&self.mix.split()).len()
    }

    /// Glide a gain node toward `target`.
    pub fn ramp(&mut self, node: NodeId, target: f64, now: f64, time_constant: f64) {
        if let Some(param) = self.graph.param_mut(node) {
            param.set_target_at_time(target, now, time_constant);
        }
    }

    /// Jump a gain node to `value`.
    pub fn jump(&mut self, node: NodeId, value: f64) {
        if let Some(param) = self.graph.param_mut(node) {
            param.set_value(value);
        }
    }

    pub fn gain_target(&self, node: NodeId) -> f64 {
        self.graph.param(node).map_or(0.0, AudioParam::target)
    }
}

// ── Gain mapping ────────────────────────────────────────────

/// Validate a control percentage, clamping it into `[0, 100]`.
pub fn clamp_percent(name: &'static str, value: f64) -> Result<f64> {
    if value.is_nan() {
        return Err(EngineError::InvalidParameter { name, value });
    }
    Ok(value.clamp(0.0, 100.0))
}

/// Percentage to a linear gain.
pub fn unit_gain(percent: f64) -> f64 {
    percent / 100.0
}

/// Reverb percentage to wet gain. The boost makes low-level convolution
/// audible; it is tuned, not derived.
pub fn wet_gain(percent: f64, boost: f64) -> f64 {
    percent / 100.0 * boost
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::graph::NodeKind;

    fn stage() -> Stage {
        Stage::new(&EngineConfig::default()).unwrap()
    }

    #[test]
    fn initial_levels() {
        let s = stage();
        assert_eq!(s.gain_target(s.mix.dry), 1.0);
        assert_eq!(s.gain_target(s.mix.wet), 0.0);
        assert!((s.gain_target(s.mix.master) - 0.7).abs() < 1e-12);
        assert_eq!(s.gain_target(s.mix.ambience), 0.0);
        assert!(s.graph.is_connected(s.mix.ambience, s.graph.destination()));
    }

    #[test]
    fn rewiring_does_not_duplicate_edges() {
        let mut s = stage();
        let src = s.graph.add(Node::MediaElementSource);
        wire(&mut s.graph, &s.mix, src).unwrap();
        let edges = s.graph.edge_count();
        wire(&mut s.graph, &s.mix, src).unwrap();
        assert_eq!(s.graph.edge_count(), edges);
        assert_eq!(edges, 7, "six main-path edges plus the ambience bus");
    }

    #[test]
    fn unwire_keeps_ambience_bus() {
        let mut s = stage();
        let src = s.graph.add(Node::MediaElementSource);
        wire(&mut s.graph, &s.mix, src).unwrap();
        s.graph.remove(src);
        unwire(&mut s.graph, &s.mix);
        unwire(&mut s.graph, &s.mix);
        assert_eq!(s.graph.edge_count(), 1);
        assert_eq!(s.producer_count(), 0);
    }

    #[test]
    fn second_producer_is_a_fault() {
        let mut s = stage();
        let a = s.graph.add(Node::MediaElementSource);
        let b = s.graph.add(Node::MediaElementSource);
        wire(&mut s.graph, &s.mix, a).unwrap();
        let err = wire(&mut s.graph, &s.mix, b).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Graph(GraphError::MultipleProducers(2))
        ));
        assert_eq!(s.graph.count_kind(NodeKind::Convolver), 1);
    }

    #[test]
    fn gain_mapping() {
        assert!((wet_gain(70.0, 5.0) - 3.5).abs() < 1e-12);
        assert_eq!(unit_gain(30.0), 0.3);
        assert_eq!(clamp_percent("volume", 140.0).unwrap(), 100.0);
        assert_eq!(clamp_percent("volume", -3.0).unwrap(), 0.0);
        assert!(clamp_percent("volume", f64::NAN).is_err());
    }
}
