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

//! Overlap-add looping of a note's layers.
//!
//! Each iteration plays all three layers once, from fresh one-shot sources, under an envelope
//! that fades in over the crossfade, holds, and fades out over the crossfade. The next
//! iteration starts one crossfade before the current one ends, so consecutive iterations
//! overlap exactly where one fades out and the other fades in.
//!
//! The loop is a task that sleeps on the audio clock until shortly before the next start,
//! then schedules the iteration at its exact start time.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, span, warn, Instrument, Level};

use super::voice::{next_voice_id, IterationRecord, LoopState, Voice};
use crate::audio::{
    param::AudioParam, AudioClock, AudioGraph, GraphError, NodeId, NodeKind, ParamName,
};
use crate::notes::Note;
use crate::params::{Layer, ParameterBus};
use crate::samples::NoteBuffers;

/// Gain treated as silence. Envelopes ramp to and from this rather than to zero.
pub const NEAR_ZERO: f32 = 1e-4;

/// A loop that keeps running until cancelled. Cancelling clears the continue flag and aborts
/// whatever wait is pending.
pub struct RepeatingTask {
    running: Arc<AtomicBool>,
    handle: AbortHandle,
}

impl RepeatingTask {
    /// Spawns the loop. It receives the continue flag and must stop once it reads false.
    pub fn spawn<F, Fut>(body: F) -> RepeatingTask
    where
        F: FnOnce(Arc<AtomicBool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(body(running.clone())).abort_handle();
        RepeatingTask { running, handle }
    }

    pub fn cancel(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.handle.abort();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.handle.is_finished()
    }

    pub(super) fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Iteration length and crossfade for a buffer played at a rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopTiming {
    pub length: f64,
    pub crossfade: f64,
}

impl LoopTiming {
    /// The crossfade never exceeds half the iteration, so every iteration starts after the
    /// previous one.
    pub fn new(duration: f64, playback_rate: f64, fade: f64) -> LoopTiming {
        let length = duration / playback_rate;
        LoopTiming {
            length,
            crossfade: fade.min(length / 2.0),
        }
    }

    pub fn next_start(&self, start: f64) -> f64 {
        start + self.length - self.crossfade
    }
}

/// Near-silent at `start`, unity after `crossfade`, unity until `crossfade` before the end,
/// near-silent at `start + length`.
pub fn schedule_envelope(param: &mut AudioParam, start: f64, length: f64, crossfade: f64) {
    param.set_value_at(NEAR_ZERO, start);
    param.linear_ramp_to(1.0, start + crossfade);
    param.linear_ramp_to(1.0, start + length - crossfade);
    param.linear_ramp_to(NEAR_ZERO, start + length);
}

/// Everything a voice needs to keep looping.
pub struct VoiceSetup {
    pub note: Note,
    pub buffers: NoteBuffers,
    pub playback_rate: f64,
    /// Where the voice output connects.
    pub destination: NodeId,
    pub params: ParameterBus,
    pub graph: Arc<Mutex<AudioGraph>>,
    pub clock: AudioClock,
    /// How far ahead of its start an iteration is scheduled.
    pub lookahead: Duration,
}

struct LoopContext {
    voice: u64,
    buffers: NoteBuffers,
    playback_rate: f64,
    output: NodeId,
    mix_bus: NodeId,
    params: ParameterBus,
    state: Arc<Mutex<LoopState>>,
}

impl LoopContext {
    /// Schedules one iteration at `start` with the current base layer and fade time.
    fn schedule(&self, graph: &mut AudioGraph, start: f64) -> Result<LoopTiming, GraphError> {
        let params = self.params.snapshot();
        let base = params.base_layer;
        let rate = self.playback_rate;
        let timing = LoopTiming::new(
            self.buffers.layer(base).duration_secs(),
            rate,
            params.fade_seconds(),
        );

        let mut sources = Vec::with_capacity(Layer::ALL.len());
        for layer in Layer::ALL {
            let buffer = self.buffers.layer(layer).clone();
            let length = (buffer.duration_secs() / rate).min(timing.length);
            let crossfade = timing.crossfade.min(length / 2.0);

            let source = graph.add(NodeKind::BufferSource {
                buffer,
                playback_rate: rate,
            });
            let envelope = graph.add(NodeKind::Gain { gain: NEAR_ZERO });
            schedule_envelope(
                graph.param_mut(envelope, ParamName::Gain)?,
                start,
                length,
                crossfade,
            );

            graph.connect(source, envelope)?;
            let target = if layer == base {
                self.output
            } else {
                self.mix_bus
            };
            graph.connect(envelope, target)?;
            graph.dispose_with(source, envelope)?;
            graph.set_owner(source, self.voice)?;
            graph.set_owner(envelope, self.voice)?;
            graph.start(source, start)?;
            graph.stop(source, start + timing.length)?;
            sources.push(source);
        }

        self.state.lock().record(
            IterationRecord {
                start,
                base_layer: base,
                playback_rate: rate,
                length: timing.length,
                crossfade: timing.crossfade,
            },
            sources,
        );
        debug!(
            voice = self.voice,
            start,
            base = base.index(),
            length = timing.length,
            crossfade = timing.crossfade,
            "Scheduled iteration"
        );
        Ok(timing)
    }

    /// Schedules the iteration due at `next` unless the loop was cancelled. Runs under the
    /// graph lock so a cancel issued under the same lock is always observed.
    fn step(&self, graph: &Mutex<AudioGraph>, running: &AtomicBool, next: f64) -> Option<f64> {
        let mut graph = graph.lock();
        if !running.load(Ordering::SeqCst) {
            return None;
        }
        // Running late: start now rather than in the past.
        let start = next.max(graph.current_time());
        match self.schedule(&mut graph, start) {
            Ok(timing) => Some(timing.next_start(start)),
            Err(e) => {
                warn!(voice = self.voice, err = %e, "Unable to schedule iteration");
                None
            }
        }
    }
}

/// Builds the voice's gains, schedules the first iteration at the current audio time and
/// starts the loop. The output gain fades in over the fade time.
pub fn start_voice(graph: &mut AudioGraph, setup: VoiceSetup) -> Result<Voice, GraphError> {
    let id = next_voice_id();
    let params = setup.params.snapshot();
    let now = graph.current_time();

    let output = graph.add(NodeKind::Gain { gain: NEAR_ZERO });
    {
        let gain = graph.param_mut(output, ParamName::Gain)?;
        gain.set_value_at(NEAR_ZERO, now);
        gain.linear_ramp_to(1.0, now + params.fade_seconds());
    }
    let mix_bus = graph.add(NodeKind::Gain {
        gain: params.mix_gain(),
    });
    graph.connect(mix_bus, output)?;
    graph.connect(output, setup.destination)?;
    graph.set_owner(output, id)?;
    graph.set_owner(mix_bus, id)?;

    let state = Arc::new(Mutex::new(LoopState::default()));
    let context = LoopContext {
        voice: id,
        buffers: setup.buffers,
        playback_rate: setup.playback_rate,
        output,
        mix_bus,
        params: setup.params,
        state: state.clone(),
    };
    let first = context.schedule(graph, now)?;

    let shared = setup.graph.clone();
    let clock = setup.clock;
    let lookahead = setup.lookahead.as_secs_f64();
    let mut next = first.next_start(now);
    let span = span!(Level::DEBUG, "voice loop", voice = id, note = %setup.note);
    let task = RepeatingTask::spawn(move |running| {
        async move {
            loop {
                if !clock.sleep_until(next - lookahead).await {
                    debug!("Audio clock stopped");
                    return;
                }
                match context.step(&shared, &running, next) {
                    Some(following) => next = following,
                    None => return,
                }
            }
        }
        .instrument(span)
    });

    Ok(Voice {
        id,
        note: setup.note,
        output,
        mix_bus,
        task,
        state,
        graph: Arc::downgrade(&setup.graph),
    })
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use parking_lot::Mutex;

    use super::*;
    use crate::audio::{mock, AudioSession, DecodedBuffer, DESTINATION};
    use crate::config;
    use crate::params::ParameterSet;
    use crate::samples::{LayerSource, SampleError, SampleKey, SampleStore, SynthSource};

    struct Rig {
        device: Arc<mock::Device>,
        session: AudioSession,
        params: ParameterBus,
        store: SampleStore,
    }

    fn rig(params: ParameterSet, length: f64) -> Rig {
        rig_with(params, Arc::new(SynthSource::with_length(length)))
    }

    fn rig_with(params: ParameterSet, source: Arc<dyn LayerSource>) -> Rig {
        let device = Arc::new(mock::Device::get(
            &config::Audio::new("offline")
                .with_sample_rate(1000)
                .with_buffer_size(20),
        ));
        let session = AudioSession::open(device.clone()).unwrap();
        let store = SampleStore::new(source, 1000);
        Rig {
            device,
            session,
            params: ParameterBus::new(params),
            store,
        }
    }

    impl Rig {
        async fn start(&self, note: Note, playback_rate: f64) -> Voice {
            let buffers = self.store.ensure_loaded(note).await.unwrap();
            let setup = VoiceSetup {
                note,
                buffers,
                playback_rate,
                destination: DESTINATION,
                params: self.params.clone(),
                graph: self.session.shared_graph(),
                clock: self.session.clock(),
                lookahead: Duration::from_millis(100),
            };
            start_voice(&mut self.session.graph(), setup).unwrap()
        }

        async fn render(&self, seconds: f64) {
            self.device
                .render(Duration::from_secs_f64(seconds))
                .await
                .unwrap();
        }
    }

    fn with_fade(fade_time: f32) -> ParameterSet {
        ParameterSet {
            fade_time,
            ..ParameterSet::default()
        }
    }

    #[test]
    fn test_loop_timing() {
        let timing = LoopTiming::new(8.0, 1.0, 2.0);
        assert_eq!(6.0, timing.next_start(0.0));

        // Faster playback shortens the iteration.
        let timing = LoopTiming::new(8.0, 2.0, 2.0);
        assert_eq!(4.0, timing.length);
        assert_eq!(2.0, timing.next_start(0.0));

        // The crossfade is clamped to half an iteration.
        let timing = LoopTiming::new(4.0, 1.0, 5.0);
        assert_eq!(2.0, timing.crossfade);
        assert_eq!(12.0, timing.next_start(10.0));
    }

    #[test]
    fn test_envelope_shape() {
        let mut param = AudioParam::new(NEAR_ZERO);
        schedule_envelope(&mut param, 10.0, 8.0, 2.0);
        assert_eq!(NEAR_ZERO, param.value_at(10.0));
        assert!((param.value_at(11.0) - 0.5).abs() < 1e-3);
        assert_eq!(1.0, param.value_at(12.0));
        assert_eq!(1.0, param.value_at(15.0));
        assert!((param.value_at(17.0) - 0.5).abs() < 1e-3);
        assert_eq!(NEAR_ZERO, param.value_at(18.0));

        // Overlapping iterations sum to unity across the seam.
        let mut next = AudioParam::new(NEAR_ZERO);
        schedule_envelope(&mut next, 16.0, 8.0, 2.0);
        for t in [16.0, 16.5, 17.0, 17.5, 18.0] {
            assert!((param.value_at(t) + next.value_at(t) - 1.0).abs() < 1e-3);
        }
    }

    #[tokio::test]
    async fn test_iterations_are_seamless() {
        let rig = rig(with_fade(1.0), 3.0);
        let voice = rig.start(Note::C, 1.0).await;
        let monitor = voice.monitor();
        assert_eq!(1, monitor.iterations());
        assert_eq!(3, monitor.live_sources().len());

        rig.render(9.0).await;

        let history = monitor.history();
        assert!(history.len() >= 4, "only {} iterations", history.len());
        assert_eq!(0.0, history[0].start);
        for pair in history.windows(2) {
            let expected = pair[0].start + pair[0].length - pair[0].crossfade;
            assert!((pair[1].start - expected).abs() < 1e-9);
            assert!((pair[1].start - pair[0].start - 2.0).abs() < 1e-9);
        }
        assert!(monitor.is_looping());
        drop(voice);
    }

    #[tokio::test]
    async fn test_playback_rate_shortens_iterations() {
        let rig = rig(with_fade(1.0), 4.0);
        let voice = rig.start(Note::G, 2.0).await;
        rig.render(3.0).await;

        let history = voice.monitor().history();
        assert!(history.len() >= 2);
        assert_eq!(2.0, history[0].length);
        assert_eq!(1.0, history[0].crossfade);
        assert_eq!(1.0, history[1].start);
        assert_eq!(2.0, history[1].playback_rate);
    }

    #[tokio::test]
    async fn test_finished_iterations_are_disposed() {
        let rig = rig(with_fade(1.0), 2.0);
        let voice = rig.start(Note::E, 1.0).await;
        let monitor = voice.monitor();
        // output + mix bus + 3 sources + 3 envelopes
        assert_eq!(8, monitor.live_nodes());

        rig.render(5.0).await;
        let iterations = monitor.iterations() as usize;
        assert!(iterations >= 4);
        // Two overlapping iterations plus the one scheduled ahead.
        assert!(monitor.live_nodes() <= 2 + 3 * 6);
    }

    /// A three second base layer under two second texture layers.
    struct UnevenLayers;

    impl LayerSource for UnevenLayers {
        fn load(&self, key: SampleKey, sample_rate: u32) -> Result<DecodedBuffer, SampleError> {
            let seconds = if key.layer == Layer::default() { 3 } else { 2 };
            let frames = seconds * sample_rate as usize;
            Ok(DecodedBuffer::new(vec![0.5; frames * 2], 2, sample_rate))
        }
    }

    #[tokio::test]
    async fn test_shorter_texture_layers_end_early() -> Result<(), GraphError> {
        let rig = rig_with(with_fade(1.0), Arc::new(UnevenLayers));
        let voice = rig.start(Note::F, 1.0).await;
        let monitor = voice.monitor();
        let sources = monitor.live_sources();
        assert_eq!(3, sources.len());
        // Sources are scheduled in layer order, each followed by its envelope.
        let (base, textures) = (sources[0], &sources[1..]);

        {
            let graph = rig.session.graph();
            for texture in textures {
                let envelope = texture + 1;
                assert_eq!(1.0, graph.param_value_at(envelope, ParamName::Gain, 1.0)?);
                assert_eq!(NEAR_ZERO, graph.param_value_at(envelope, ParamName::Gain, 2.0)?);
            }
            assert_eq!(1.0, graph.param_value_at(base + 1, ParamName::Gain, 2.0)?);
            assert_eq!(NEAR_ZERO, graph.param_value_at(base + 1, ParamName::Gain, 3.0)?);
        }

        // The textures have played out; the base layer is still sounding.
        rig.render(2.2).await;
        {
            let graph = rig.session.graph();
            assert!(graph.contains(base));
            for texture in textures {
                assert!(!graph.contains(*texture));
                assert!(!graph.contains(texture + 1));
            }
        }

        rig.render(1.0).await;
        assert!(!rig.session.graph().contains(base));
        let history = monitor.history();
        assert_eq!(3.0, history[0].length);
        assert_eq!(2.0, history[1].start);
        Ok(())
    }

    #[tokio::test]
    async fn test_base_layer_applies_to_next_iteration() {
        let rig = rig(with_fade(1.0), 3.0);
        let voice = rig.start(Note::A, 1.0).await;
        let monitor = voice.monitor();

        rig.params.set(crate::params::Knob::BaseLayer, 2.0).unwrap();
        assert_eq!(Layer::default(), monitor.history()[0].base_layer);

        rig.render(2.5).await;
        let history = monitor.history();
        assert_eq!(Layer::default(), history[0].base_layer);
        assert_eq!(Layer::new(2).unwrap(), history[1].base_layer);
    }

    #[tokio::test]
    async fn test_cancel_stops_future_iterations() {
        let rig = rig(with_fade(1.0), 3.0);
        let voice = rig.start(Note::D, 1.0).await;
        let monitor = voice.monitor();

        rig.render(0.5).await;
        voice.cancel();
        assert!(!monitor.is_looping());
        let iterations = monitor.iterations();

        rig.render(6.0).await;
        assert_eq!(iterations, monitor.iterations());
        // In-flight sources played out and cleaned up after themselves.
        assert!(monitor.live_sources().is_empty());
        // The voice's own gains stay until the voice is torn down.
        assert_eq!(2, monitor.live_nodes());
    }

    #[tokio::test]
    async fn test_repeating_task() {
        let counter = Arc::new(Mutex::new(0));
        let task = {
            let counter = counter.clone();
            RepeatingTask::spawn(move |running| async move {
                while running.load(Ordering::SeqCst) {
                    *counter.lock() += 1;
                    tokio::task::yield_now().await;
                }
            })
        };
        tokio::task::yield_now().await;
        assert!(task.is_running());
        task.cancel();
        let seen = *counter.lock();
        tokio::task::yield_now().await;
        assert_eq!(seen, *counter.lock());
        assert!(!task.is_running());
    }
}
