//! Signal graph: an arena of processing nodes joined by directed edges.
//!
//! The graph owns every node. Edges live in a set, so connecting the same
//! pair twice leaves one edge, and disconnecting a node that has no edges
//! does nothing. Removed slots are recycled, but each reuse bumps the slot's
//! generation, so an id held past `remove` simply stops resolving.
//!
//! Rendering pulls one quantum from the destination, evaluating each
//! reachable node once and summing its inputs first.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::debug;

use super::convolver::Convolver;
use super::mixer::{Mixer, StereoBlock};
use super::param::AudioParam;
use super::player::BufferPlayer;
use crate::error::GraphError;
use crate::media::MediaElement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

#[derive(Debug)]
pub enum Node {
    /// Audio pulled from the host's media element.
    MediaElementSource,
    BufferSource(BufferPlayer),
    Gain(AudioParam),
    Convolver(Convolver),
    /// The output sink.
    Destination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    MediaElementSource,
    BufferSource,
    Gain,
    Convolver,
    Destination,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::MediaElementSource => NodeKind::MediaElementSource,
            Node::BufferSource(_) => NodeKind::BufferSource,
            Node::Gain(_) => NodeKind::Gain,
            Node::Convolver(_) => NodeKind::Convolver,
            Node::Destination => NodeKind::Destination,
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, Node::MediaElementSource | Node::BufferSource(_))
    }
}

/// Per-quantum inputs the graph needs from its owner.
pub struct RenderContext<'a> {
    /// Context time at the first frame of the quantum.
    pub time: f64,
    pub sample_rate: f64,
    pub frames: usize,
    pub element: Option<&'a mut dyn MediaElement>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Debug)]
pub struct SignalGraph {
    slots: Vec<Slot>,
    /// Indices of empty slots, reused before the arena grows.
    free: Vec<usize>,
    edges: BTreeSet<(NodeId, NodeId)>,
    destination: NodeId,
}

impl SignalGraph {
    pub fn new() -> Self {
        SignalGraph {
            slots: vec![Slot {
                generation: 0,
                node: Some(Node::Destination),
            }],
            free: Vec::new(),
            edges: BTreeSet::new(),
            destination: NodeId {
                index: 0,
                generation: 0,
            },
        }
    }

    pub fn destination(&self) -> NodeId {
        self.destination
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        let kind = node.kind();
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        };
        debug!("graph: add {kind:?} as {id:?}");
        id
    }

    /// Drop a node and every edge touching it.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        if id == self.destination {
            return None;
        }
        let slot = self
            .slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.edges.retain(|&(from, to)| from != id && to != id);
        debug!("graph: removed {id:?}");
        Some(node)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn player_mut(&mut self, id: NodeId) -> Option<&mut BufferPlayer> {
        match self.node_mut(id) {
            Some(Node::BufferSource(p)) => Some(p),
            _ => None,
        }
    }

    pub fn player(&self, id: NodeId) -> Option<&BufferPlayer> {
        match self.node(id) {
            Some(Node::BufferSource(p)) => Some(p),
            _ => None,
        }
    }

    pub fn param_mut(&mut self, id: NodeId) -> Option<&mut AudioParam> {
        match self.node_mut(id) {
            Some(Node::Gain(p)) => Some(p),
            _ => None,
        }
    }

    pub fn param(&self, id: NodeId) -> Option<&AudioParam> {
        match self.node(id) {
            Some(Node::Gain(p)) => Some(p),
            _ => None,
        }
    }

    pub fn convolver_mut(&mut self, id: NodeId) -> Option<&mut Convolver> {
        match self.node_mut(id) {
            Some(Node::Convolver(c)) => Some(c),
            _ => None,
        }
    }

    pub fn convolver(&self, id: NodeId) -> Option<&Convolver> {
        match self.node(id) {
            Some(Node::Convolver(c)) => Some(c),
            _ => None,
        }
    }

    /// Connect `from` into `to`. Returns whether a new edge was made.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<bool, GraphError> {
        if !self.contains(from) {
            return Err(GraphError::UnknownNode(from));
        }
        if !self.contains(to) {
            return Err(GraphError::UnknownNode(to));
        }
        if from == to || self.reaches(to, from) {
            return Err(GraphError::Cycle { from, to });
        }
        let added = self.edges.insert((from, to));
        if added {
            debug!("graph: connect {from:?} -> {to:?}");
        }
        Ok(added)
    }

    /// Remove every outgoing edge of `from`. Returns how many were removed.
    pub fn disconnect(&mut self, from: NodeId) -> usize {
        let before = self.edges.len();
        self.edges.retain(|&(src, _)| src != from);
        before - self.edges.len()
    }

    pub fn is_connected(&self, from: NodeId, to: NodeId) -> bool {
        self.edges.contains(&(from, to))
    }

    pub fn inputs(&self, id: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|&&(_, to)| to == id)
            .map(|&(from, _)| from)
            .collect()
    }

    pub fn outputs(&self, id: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|&&(from, _)| from == id)
            .map(|&(_, to)| to)
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_count(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    /// Arena capacity in slots, live or free.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn count_kind(&self, kind: NodeKind) -> usize {
        self.slots
            .iter()
            .filter_map(|s| s.node.as_ref())
            .filter(|n| n.kind() == kind)
            .count()
    }

    /// Distinct source nodes with an edge into any of `targets`.
    pub fn sources_into(&self, targets: &[NodeId]) -> Vec<NodeId> {
        let mut found: BTreeSet<NodeId> = BTreeSet::new();
        for &(from, to) in &self.edges {
            if targets.contains(&to) && self.node(from).is_some_and(Node::is_source) {
                found.insert(from);
            }
        }
        found.into_iter().collect()
    }

    /// True if `to` is reachable from `from` along edges.
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if seen.insert(id) {
                stack.extend(self.outputs(id));
            }
        }
        false
    }

    /// Render one quantum at the destination.
    pub fn render(&mut self, ctx: &mut RenderContext<'_>) -> StereoBlock {
        let mut cache = HashMap::new();
        self.pull(self.destination, ctx, &mut cache)
    }

    fn pull(
        &mut self,
        id: NodeId,
        ctx: &mut RenderContext<'_>,
        cache: &mut HashMap<NodeId, StereoBlock>,
    ) -> StereoBlock {
        if let Some(done) = cache.get(&id) {
            return done.clone();
        }

        let inputs = self.inputs(id);
        let mut mixed = StereoBlock::silent(ctx.frames);
        let mut bus = Mixer::new();
        let is_sink = id == self.destination;
        if is_sink {
            bus.clear(ctx.frames);
        }
        for input in inputs {
            let block = self.pull(input, ctx, cache);
            if is_sink {
                bus.add(&block);
            } else {
                mixed.accumulate(&block);
            }
        }

        let out = match self.node_mut(id) {
            None => StereoBlock::silent(ctx.frames),
            Some(Node::Destination) => bus.output(),
            Some(Node::MediaElementSource) => {
                let mut block = StereoBlock::silent(ctx.frames);
                if let Some(element) = ctx.element.as_deref_mut() {
                    element.render(&mut block, ctx.sample_rate);
                }
                block
            }
            Some(Node::BufferSource(player)) => {
                let mut block = StereoBlock::silent(ctx.frames);
                player.render(&mut block, ctx.sample_rate);
                block
            }
            Some(Node::Gain(param)) => {
                let mut gains = vec![0.0_f32; ctx.frames];
                param.fill(ctx.time, ctx.sample_rate, &mut gains);
                for (i, g) in gains.iter().enumerate() {
                    mixed.left[i] *= g;
                    mixed.right[i] *= g;
                }
                mixed
            }
            Some(Node::Convolver(convolver)) => convolver.process(&mixed),
        };

        cache.insert(id, out.clone());
        out
    }
}

impl Default for SignalGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dsp::buffer::AudioBuffer;
    use crate::dsp::mixer::RENDER_QUANTUM;

    fn unknown(index: usize) -> NodeId {
        NodeId {
            index,
            generation: 0,
        }
    }

    fn ctx() -> RenderContext<'static> {
        RenderContext {
            time: 0.0,
            sample_rate: 8000.0,
            frames: RENDER_QUANTUM,
            element: None,
        }
    }

    fn constant_player(level: f32) -> BufferPlayer {
        let buf = Arc::new(AudioBuffer::new(vec![vec![level; 8000]], 8000));
        let mut p = BufferPlayer::new(buf, 1.0);
        p.start(0.0);
        p
    }

    #[test]
    fn connect_is_idempotent() {
        let mut g = SignalGraph::new();
        let gain = g.add(Node::Gain(AudioParam::new(1.0)));
        assert_eq!(g.connect(gain, g.destination()), Ok(true));
        assert_eq!(g.connect(gain, g.destination()), Ok(false));
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut g = SignalGraph::new();
        let gain = g.add(Node::Gain(AudioParam::new(1.0)));
        g.connect(gain, g.destination()).unwrap();
        assert_eq!(g.disconnect(gain), 1);
        assert_eq!(g.disconnect(gain), 0);
        assert_eq!(g.disconnect(unknown(999)), 0, "unknown node disconnect is a no-op");
    }

    #[test]
    fn rejects_cycles_and_unknown_nodes() {
        let mut g = SignalGraph::new();
        let a = g.add(Node::Gain(AudioParam::new(1.0)));
        let b = g.add(Node::Gain(AudioParam::new(1.0)));
        g.connect(a, b).unwrap();
        assert_eq!(g.connect(b, a), Err(GraphError::Cycle { from: b, to: a }));
        assert_eq!(g.connect(a, a), Err(GraphError::Cycle { from: a, to: a }));
        assert_eq!(
            g.connect(a, unknown(42)),
            Err(GraphError::UnknownNode(unknown(42)))
        );
    }

    #[test]
    fn removed_ids_stay_dead() {
        let mut g = SignalGraph::new();
        let a = g.add(Node::Gain(AudioParam::new(1.0)));
        g.connect(a, g.destination()).unwrap();
        assert!(g.remove(a).is_some());
        assert!(g.remove(a).is_none());
        assert_eq!(g.edge_count(), 0);
        let b = g.add(Node::Gain(AudioParam::new(1.0)));
        assert_ne!(a, b, "a recycled slot gets a fresh id");
        assert!(!g.contains(a));
        assert!(g.contains(b));
        assert!(g.remove(a).is_none(), "stale id must not remove the new tenant");
        assert_eq!(g.connect(a, g.destination()), Err(GraphError::UnknownNode(a)));
        assert!(g.remove(g.destination()).is_none(), "destination is permanent");
    }

    #[test]
    fn churn_reuses_slots() {
        let mut g = SignalGraph::new();
        let gain = g.add(Node::Gain(AudioParam::new(1.0)));
        g.connect(gain, g.destination()).unwrap();
        for _ in 0..1000 {
            let src = g.add(Node::BufferSource(constant_player(0.1)));
            g.connect(src, gain).unwrap();
            g.remove(src);
        }
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.slot_count(), 3);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn renders_through_gain() {
        let mut g = SignalGraph::new();
        let src = g.add(Node::BufferSource(constant_player(0.5)));
        let gain = g.add(Node::Gain(AudioParam::new(0.5)));
        g.connect(src, gain).unwrap();
        g.connect(gain, g.destination()).unwrap();
        let out = g.render(&mut ctx());
        let expected = (0.25_f32).tanh();
        assert!((out.left[10] - expected).abs() < 1e-6);
        assert!((out.right[10] - expected).abs() < 1e-6);
    }

    #[test]
    fn shared_source_is_pulled_once() {
        let mut g = SignalGraph::new();
        let src = g.add(Node::BufferSource(constant_player(0.1)));
        let a = g.add(Node::Gain(AudioParam::new(1.0)));
        let b = g.add(Node::Gain(AudioParam::new(1.0)));
        g.connect(src, a).unwrap();
        g.connect(src, b).unwrap();
        g.connect(a, g.destination()).unwrap();
        g.connect(b, g.destination()).unwrap();
        g.render(&mut ctx());
        let pos = g.player(src).unwrap().position();
        assert!(
            (pos - RENDER_QUANTUM as f64 / 8000.0).abs() < 1e-9,
            "fan-out must not advance the source twice, got {pos}"
        );
    }

    #[test]
    fn unconnected_nodes_are_not_pulled() {
        let mut g = SignalGraph::new();
        let src = g.add(Node::BufferSource(constant_player(0.5)));
        let out = g.render(&mut ctx());
        assert!(out.is_silent());
        assert_eq!(g.player(src).unwrap().position(), 0.0);
    }

    #[test]
    fn sources_into_counts_distinct_producers() {
        let mut g = SignalGraph::new();
        let s1 = g.add(Node::BufferSource(constant_player(0.1)));
        let s2 = g.add(Node::MediaElementSource);
        let dry = g.add(Node::Gain(AudioParam::new(1.0)));
        let conv = g.add(Node::Convolver(Convolver::new()));
        g.connect(s1, dry).unwrap();
        g.connect(s1, conv).unwrap();
        assert_eq!(g.sources_into(&[dry, conv]), vec![s1]);
        g.connect(s2, dry).unwrap();
        assert_eq!(g.sources_into(&[dry, conv]).len(), 2);
    }
}
