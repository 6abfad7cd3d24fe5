// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! An arena of audio nodes rendered in dependency order.
//!
//! Nodes are owned by the graph and addressed by [`NodeId`]. Signal connections carry stereo
//! audio from node to node; parameter connections sum a node's output onto another node's
//! automatable parameter. Buffer sources remove themselves, along with anything registered to
//! be disposed with them, once they finish playing.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use super::clock::{AudioClock, ClockDriver};
use super::nodes::Processor;
use super::param::AudioParam;

pub use super::nodes::{NodeKind, ParamName};

pub type NodeId = u64;

/// The final output of the graph. Always present.
pub const DESTINATION: NodeId = 0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("no node with id {0}")]
    UnknownNode(NodeId),
    #[error("node {node} ({kind}) has no {param:?} parameter")]
    NoSuchParam {
        node: NodeId,
        kind: &'static str,
        param: ParamName,
    },
    #[error("connecting {from} to {to} would create a cycle")]
    Cycle { from: NodeId, to: NodeId },
    #[error("node {node} ({kind}) cannot be started or stopped")]
    NotSchedulable { node: NodeId, kind: &'static str },
    #[error("the effect chain has already been built for this session")]
    AlreadyBuilt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Target {
    Node(NodeId),
    Param(NodeId, ParamName),
}

impl Target {
    fn node(&self) -> NodeId {
        match self {
            Target::Node(id) | Target::Param(id, _) => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Edge {
    from: NodeId,
    to: Target,
}

struct Node {
    processor: Processor,
    owner: Option<u64>,
    dispose_with: Vec<NodeId>,
}

/// Precomputed render step for one node.
struct Step {
    id: NodeId,
    inputs: Vec<NodeId>,
    modulators: Vec<NodeId>,
}

/// The audio graph. Shared behind a lock between the control side and the render thread.
pub struct AudioGraph {
    sample_rate: u32,
    next_id: NodeId,
    nodes: HashMap<NodeId, Node>,
    edges: HashSet<Edge>,
    plan: Vec<Step>,
    dirty: bool,
    frames_rendered: u64,
    clock: ClockDriver,
    clock_reader: AudioClock,
    outputs: HashMap<NodeId, Vec<[f32; 2]>>,
    input: Vec<[f32; 2]>,
    modulation: Vec<f32>,
}

impl AudioGraph {
    /// Creates an empty graph holding only the destination.
    pub fn new(sample_rate: u32) -> AudioGraph {
        let (clock, clock_reader) = AudioClock::new(sample_rate);
        let mut nodes = HashMap::new();
        nodes.insert(
            DESTINATION,
            Node {
                processor: Processor::Destination,
                owner: None,
                dispose_with: Vec::new(),
            },
        );

        AudioGraph {
            sample_rate,
            next_id: DESTINATION + 1,
            nodes,
            edges: HashSet::new(),
            plan: Vec::new(),
            dirty: true,
            frames_rendered: 0,
            clock,
            clock_reader,
            outputs: HashMap::new(),
            input: Vec::new(),
            modulation: Vec::new(),
        }
    }

    /// A clock that follows this graph's rendering.
    pub fn clock(&self) -> AudioClock {
        self.clock_reader.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Audio time of the next frame to be rendered, in seconds.
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    /// Adds a node and returns its id.
    pub fn add(&mut self, kind: NodeKind) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                processor: kind.into(),
                owner: None,
                dispose_with: Vec::new(),
            },
        );
        self.dirty = true;
        id
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of nodes, including the destination.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.nodes.get_mut(&id).ok_or(GraphError::UnknownNode(id))
    }

    fn ensure(&self, id: NodeId) -> Result<(), GraphError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(GraphError::UnknownNode(id))
        }
    }

    /// Whether `to` can already reach `from`, in which case `from -> to` would close a loop.
    fn reaches(&self, start: NodeId, goal: NodeId) -> bool {
        let mut pending = vec![start];
        let mut seen = HashSet::new();
        while let Some(id) = pending.pop() {
            if id == goal {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            pending.extend(
                self.edges
                    .iter()
                    .filter(|edge| edge.from == id)
                    .map(|edge| edge.to.node()),
            );
        }
        false
    }

    fn add_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        self.ensure(edge.from)?;
        let to = edge.to.node();
        self.ensure(to)?;
        if self.reaches(to, edge.from) {
            return Err(GraphError::Cycle {
                from: edge.from,
                to,
            });
        }
        if self.edges.insert(edge) {
            self.dirty = true;
        }
        Ok(())
    }

    /// Routes the output of `from` into the input of `to`.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        self.add_edge(Edge {
            from,
            to: Target::Node(to),
        })
    }

    /// Sums the output of `from` onto a parameter of `to`.
    pub fn connect_param(
        &mut self,
        from: NodeId,
        to: NodeId,
        param: ParamName,
    ) -> Result<(), GraphError> {
        self.param_mut(to, param)?;
        self.add_edge(Edge {
            from,
            to: Target::Param(to, param),
        })
    }

    /// Removes a node, its connections, and anything disposed along with it.
    /// Returns the number of nodes removed.
    pub fn remove(&mut self, id: NodeId) -> usize {
        if id == DESTINATION {
            return 0;
        }
        let Some(node) = self.nodes.remove(&id) else {
            return 0;
        };
        self.edges
            .retain(|edge| edge.from != id && edge.to.node() != id);
        self.outputs.remove(&id);
        self.dirty = true;

        1 + node
            .dispose_with
            .into_iter()
            .map(|other| self.remove(other))
            .sum::<usize>()
    }

    /// Mutable access to an automatable parameter.
    pub fn param_mut(
        &mut self,
        id: NodeId,
        param: ParamName,
    ) -> Result<&mut AudioParam, GraphError> {
        let node = self.node_mut(id)?;
        let kind = node.processor.name();
        node.processor
            .param_mut(param)
            .ok_or(GraphError::NoSuchParam {
                node: id,
                kind,
                param,
            })
    }

    /// The automated value of a node's parameter at `time`.
    pub fn param_value_at(
        &self,
        id: NodeId,
        param: ParamName,
        time: f64,
    ) -> Result<f32, GraphError> {
        let node = self.nodes.get(&id).ok_or(GraphError::UnknownNode(id))?;
        match node.processor.param() {
            Some((name, value)) if name == param => Ok(value.value_at(time)),
            _ => Err(GraphError::NoSuchParam {
                node: id,
                kind: node.processor.name(),
                param,
            }),
        }
    }

    /// Starts a source node at `time`.
    pub fn start(&mut self, id: NodeId, time: f64) -> Result<(), GraphError> {
        let node = self.node_mut(id)?;
        if node.processor.start(time) {
            Ok(())
        } else {
            Err(GraphError::NotSchedulable {
                node: id,
                kind: node.processor.name(),
            })
        }
    }

    /// Stops a buffer source at `time`.
    pub fn stop(&mut self, id: NodeId, time: f64) -> Result<(), GraphError> {
        let node = self.node_mut(id)?;
        if node.processor.stop(time) {
            Ok(())
        } else {
            Err(GraphError::NotSchedulable {
                node: id,
                kind: node.processor.name(),
            })
        }
    }

    /// Removes `other` whenever `id` is removed, including when a finished source cleans itself up.
    pub fn dispose_with(&mut self, id: NodeId, other: NodeId) -> Result<(), GraphError> {
        self.ensure(other)?;
        self.node_mut(id)?.dispose_with.push(other);
        Ok(())
    }

    /// Marks a node as belonging to `owner`.
    pub fn set_owner(&mut self, id: NodeId, owner: u64) -> Result<(), GraphError> {
        self.node_mut(id)?.owner = Some(owner);
        Ok(())
    }

    /// Number of live nodes belonging to `owner`.
    pub fn owned_count(&self, owner: u64) -> usize {
        self.nodes
            .values()
            .filter(|node| node.owner == Some(owner))
            .count()
    }

    /// Removes every node belonging to `owner`. Returns the number removed.
    pub fn remove_owned(&mut self, owner: u64) -> usize {
        let owned: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.owner == Some(owner))
            .map(|(id, _)| *id)
            .collect();
        owned.into_iter().map(|id| self.remove(id)).sum()
    }

    fn rebuild_plan(&mut self) {
        let mut indegree: HashMap<NodeId, usize> = self.nodes.keys().map(|id| (*id, 0)).collect();
        let mut downstream: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut inputs: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut modulators: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

        for edge in &self.edges {
            let to = edge.to.node();
            *indegree.entry(to).or_default() += 1;
            downstream.entry(edge.from).or_default().push(to);
            match edge.to {
                Target::Node(_) => inputs.entry(to).or_default().push(edge.from),
                Target::Param(..) => modulators.entry(to).or_default().push(edge.from),
            }
        }

        let mut ready: VecDeque<NodeId> = indegree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut plan = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_front() {
            for next in downstream.get(&id).into_iter().flatten() {
                if let Some(degree) = indegree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(*next);
                    }
                }
            }
            plan.push(Step {
                id,
                inputs: inputs.remove(&id).unwrap_or_default(),
                modulators: modulators.remove(&id).unwrap_or_default(),
            });
        }

        self.plan = plan;
        self.dirty = false;
    }

    /// Renders `frames` stereo frames of the destination's output and advances the clock.
    pub fn render_block(&mut self, frames: usize) -> Vec<[f32; 2]> {
        let mut block = vec![[0.0; 2]; frames];
        self.render_stereo(&mut block);
        block
    }

    fn render_stereo(&mut self, block: &mut [[f32; 2]]) {
        let frames = block.len();
        if self.dirty {
            self.rebuild_plan();
        }
        let start_time = self.current_time();
        self.input.resize(frames, [0.0; 2]);
        self.modulation.resize(frames, 0.0);

        for step in &self.plan {
            self.input.iter_mut().for_each(|frame| *frame = [0.0; 2]);
            for source in &step.inputs {
                if let Some(output) = self.outputs.get(source) {
                    for (sum, frame) in self.input.iter_mut().zip(output) {
                        sum[0] += frame[0];
                        sum[1] += frame[1];
                    }
                }
            }

            self.modulation.iter_mut().for_each(|value| *value = 0.0);
            for source in &step.modulators {
                if let Some(output) = self.outputs.get(source) {
                    for (sum, frame) in self.modulation.iter_mut().zip(output) {
                        *sum += frame[0];
                    }
                }
            }

            let mut output = self.outputs.remove(&step.id).unwrap_or_default();
            output.resize(frames, [0.0; 2]);
            if let Some(node) = self.nodes.get_mut(&step.id) {
                node.processor.process(
                    &self.input,
                    &self.modulation,
                    start_time,
                    self.sample_rate,
                    &mut output,
                );
            }
            self.outputs.insert(step.id, output);
        }

        if let Some(output) = self.outputs.get(&DESTINATION) {
            block.copy_from_slice(&output[..frames]);
        }

        self.frames_rendered += frames as u64;
        let now = self.current_time();
        let ended: Vec<NodeId> = self
            .nodes
            .iter_mut()
            .filter_map(|(id, node)| {
                node.processor.prune(now);
                node.processor.has_ended().then_some(*id)
            })
            .collect();
        for id in ended {
            let removed = self.remove(id);
            debug!(node = id, removed, "Disposed finished source");
        }

        self.clock.publish(self.frames_rendered);
    }

    /// Renders into an interleaved device buffer with `channels` channels.
    /// Mono outputs get a downmix; channels past the second are silent.
    pub fn render_interleaved(&mut self, data: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = data.len() / channels;
        let mut block = vec![[0.0; 2]; frames];
        self.render_stereo(&mut block);

        for (frame, out) in block.iter().zip(data.chunks_exact_mut(channels)) {
            if channels == 1 {
                out[0] = (frame[0] + frame[1]) * 0.5;
            } else {
                out[0] = frame[0];
                out[1] = frame[1];
                out[2..].fill(0.0);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::buffer::DecodedBuffer;

    #[test]
    fn test_gain_chain() -> Result<(), GraphError> {
        let mut graph = AudioGraph::new(4);
        let source = graph.add(NodeKind::BufferSource {
            buffer: DecodedBuffer::new(vec![1.0; 8], 1, 4),
            playback_rate: 1.0,
        });
        let gain = graph.add(NodeKind::Gain { gain: 0.5 });
        graph.connect(source, gain)?;
        graph.connect(gain, DESTINATION)?;
        graph.start(source, 0.0)?;

        let block = graph.render_block(4);
        assert!(block.iter().all(|frame| *frame == [0.5, 0.5]));
        assert!(graph.contains(source));
        assert_eq!(1.0, graph.current_time());
        Ok(())
    }

    #[test]
    fn test_cycle_rejected() -> Result<(), GraphError> {
        let mut graph = AudioGraph::new(4);
        let a = graph.add(NodeKind::Gain { gain: 1.0 });
        let b = graph.add(NodeKind::Gain { gain: 1.0 });
        graph.connect(a, b)?;
        assert_eq!(Err(GraphError::Cycle { from: b, to: a }), graph.connect(b, a));
        assert_eq!(
            Err(GraphError::Cycle { from: a, to: a }),
            graph.connect_param(a, a, ParamName::Gain)
        );
        Ok(())
    }

    #[test]
    fn test_param_errors() {
        let mut graph = AudioGraph::new(4);
        let gain = graph.add(NodeKind::Gain { gain: 1.0 });
        assert!(matches!(
            graph.param_mut(gain, ParamName::Pan),
            Err(GraphError::NoSuchParam { .. })
        ));
        assert_eq!(
            Err(GraphError::UnknownNode(99)),
            graph.connect(gain, 99)
        );
        assert!(matches!(
            graph.start(gain, 0.0),
            Err(GraphError::NotSchedulable { .. })
        ));
    }

    #[test]
    fn test_param_modulation() -> Result<(), GraphError> {
        let mut graph = AudioGraph::new(4);
        let source = graph.add(NodeKind::BufferSource {
            buffer: DecodedBuffer::new(vec![1.0; 16], 1, 4),
            playback_rate: 1.0,
        });
        let offset = graph.add(NodeKind::BufferSource {
            buffer: DecodedBuffer::new(vec![0.25; 16], 1, 4),
            playback_rate: 1.0,
        });
        let gain = graph.add(NodeKind::Gain { gain: 0.5 });
        graph.connect(source, gain)?;
        graph.connect_param(offset, gain, ParamName::Gain)?;
        graph.connect(gain, DESTINATION)?;
        graph.start(source, 0.0)?;
        graph.start(offset, 0.0)?;

        let block = graph.render_block(2);
        assert_eq!([0.75, 0.75], block[0]);
        Ok(())
    }

    #[test]
    fn test_finished_sources_are_disposed() -> Result<(), GraphError> {
        let mut graph = AudioGraph::new(4);
        let source = graph.add(NodeKind::BufferSource {
            buffer: DecodedBuffer::new(vec![1.0; 2], 1, 4),
            playback_rate: 1.0,
        });
        let envelope = graph.add(NodeKind::Gain { gain: 1.0 });
        graph.connect(source, envelope)?;
        graph.connect(envelope, DESTINATION)?;
        graph.dispose_with(source, envelope)?;
        graph.start(source, 0.0)?;

        graph.render_block(2);
        assert!(graph.contains(source));
        graph.render_block(2);
        assert!(!graph.contains(source));
        assert!(!graph.contains(envelope));
        assert_eq!(1, graph.node_count());
        Ok(())
    }

    #[test]
    fn test_owned_nodes() -> Result<(), GraphError> {
        let mut graph = AudioGraph::new(4);
        let a = graph.add(NodeKind::Gain { gain: 1.0 });
        let b = graph.add(NodeKind::Gain { gain: 1.0 });
        let c = graph.add(NodeKind::Gain { gain: 1.0 });
        graph.set_owner(a, 7)?;
        graph.set_owner(b, 7)?;
        graph.set_owner(c, 8)?;
        graph.connect(a, c)?;
        assert_eq!(2, graph.owned_count(7));
        assert_eq!(2, graph.remove_owned(7));
        assert_eq!(0, graph.owned_count(7));
        assert!(graph.contains(c));
        assert_eq!(0, graph.remove(DESTINATION));
        Ok(())
    }

    #[test]
    fn test_interleaved_channel_layouts() -> Result<(), GraphError> {
        let mut graph = AudioGraph::new(4);
        let source = graph.add(NodeKind::BufferSource {
            buffer: DecodedBuffer::new(vec![1.0, 0.0, 1.0, 0.0], 2, 4),
            playback_rate: 1.0,
        });
        graph.connect(source, DESTINATION)?;
        graph.start(source, 0.0)?;

        let mut mono = [9.0; 1];
        graph.render_interleaved(&mut mono, 1);
        assert_eq!([0.5], mono);

        let mut quad = [9.0; 4];
        graph.render_interleaved(&mut quad, 4);
        assert_eq!([1.0, 0.0, 0.0, 0.0], quad);
        Ok(())
    }

    #[tokio::test]
    async fn test_render_advances_clock() {
        let mut graph = AudioGraph::new(100);
        let clock = graph.clock();
        graph.render_block(50);
        assert_eq!(0.5, clock.now());
        assert!(clock.sleep_until(0.5).await);
    }
}
