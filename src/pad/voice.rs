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
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use parking_lot::Mutex;

use super::scheduler::RepeatingTask;
use crate::audio::{AudioGraph, NodeId};
use crate::notes::Note;
use crate::params::Layer;

/// Iterations remembered per voice.
const HISTORY_LEN: usize = 32;

/// Global counter for voice ids. Ids double as graph node owners.
static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

pub(super) fn next_voice_id() -> u64 {
    NEXT_VOICE_ID.fetch_add(1, Ordering::Relaxed)
}

/// What one loop iteration scheduled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationRecord {
    /// Audio time the three layers start.
    pub start: f64,
    pub base_layer: Layer,
    pub playback_rate: f64,
    /// Iteration length after rate adjustment.
    pub length: f64,
    pub crossfade: f64,
}

impl IterationRecord {
    /// When the following iteration begins.
    pub fn next_start(&self) -> f64 {
        self.start + self.length - self.crossfade
    }
}

#[derive(Debug, Default)]
pub(super) struct LoopState {
    iterations: u64,
    history: VecDeque<IterationRecord>,
    /// Sources of the newest iteration.
    live: Vec<NodeId>,
}

impl LoopState {
    pub(super) fn record(&mut self, record: IterationRecord, sources: Vec<NodeId>) {
        self.iterations += 1;
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(record);
        self.live = sources;
    }
}

/// One sounding (or fading) instance of a note.
pub struct Voice {
    pub(super) id: u64,
    pub(super) note: Note,
    pub(super) output: NodeId,
    pub(super) mix_bus: NodeId,
    pub(super) task: RepeatingTask,
    pub(super) state: Arc<Mutex<LoopState>>,
    pub(super) graph: Weak<Mutex<AudioGraph>>,
}

impl Voice {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn note(&self) -> Note {
        self.note
    }

    /// The per-voice envelope gain.
    pub fn output(&self) -> NodeId {
        self.output
    }

    /// The gain the texture layers are summed through.
    pub fn mix_bus(&self) -> NodeId {
        self.mix_bus
    }

    /// Stops future iterations. Audio already scheduled keeps playing.
    pub fn cancel(&self) {
        self.task.cancel();
    }

    /// A read-only view that outlives the voice.
    pub fn monitor(&self) -> VoiceMonitor {
        VoiceMonitor {
            id: self.id,
            note: self.note,
            running: self.task.running_flag(),
            state: self.state.clone(),
            graph: self.graph.clone(),
        }
    }
}

/// Observes a voice's loop.
#[derive(Clone)]
pub struct VoiceMonitor {
    id: u64,
    note: Note,
    running: Arc<std::sync::atomic::AtomicBool>,
    state: Arc<Mutex<LoopState>>,
    graph: Weak<Mutex<AudioGraph>>,
}

impl VoiceMonitor {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn note(&self) -> Note {
        self.note
    }

    /// Whether the loop will schedule more iterations.
    pub fn is_looping(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Iterations scheduled so far.
    pub fn iterations(&self) -> u64 {
        self.state.lock().iterations
    }

    /// The most recent iterations, oldest first.
    pub fn history(&self) -> Vec<IterationRecord> {
        self.state.lock().history.iter().copied().collect()
    }

    /// Sources of the newest iteration that are still in the graph.
    pub fn live_sources(&self) -> Vec<NodeId> {
        let Some(graph) = self.graph.upgrade() else {
            return Vec::new();
        };
        let live = self.state.lock().live.clone();
        let graph = graph.lock();
        live.into_iter().filter(|id| graph.contains(*id)).collect()
    }

    /// Graph nodes still belonging to the voice. Zero once the graph is gone.
    pub fn live_nodes(&self) -> usize {
        self.graph
            .upgrade()
            .map_or(0, |graph| graph.lock().owned_count(self.id))
    }
}
