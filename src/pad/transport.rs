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
use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::scheduler::NEAR_ZERO;
use super::voice::Voice;
use crate::audio::{AudioClock, AudioGraph, ParamName};
use crate::notes::Note;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Sounding(Note),
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Idle => write!(f, "idle"),
            TransportState::Sounding(note) => write!(f, "sounding {}", note),
        }
    }
}

/// Owns the one active voice. Voices it lets go of fade out and are torn down once silent.
pub struct Transport {
    active: Option<Voice>,
    graph: Arc<Mutex<AudioGraph>>,
    clock: AudioClock,
}

impl Transport {
    pub fn new(graph: Arc<Mutex<AudioGraph>>, clock: AudioClock) -> Transport {
        Transport {
            active: None,
            graph,
            clock,
        }
    }

    pub fn state(&self) -> TransportState {
        match &self.active {
            Some(voice) => TransportState::Sounding(voice.note()),
            None => TransportState::Idle,
        }
    }

    pub fn active(&self) -> Option<&Voice> {
        self.active.as_ref()
    }

    /// Makes a freshly started voice the active one and retires the previous voice. The caller
    /// holds the graph lock across starting the new voice and this call, so the new voice's
    /// fade-in and the old voice's fade-out begin at the same audio time.
    pub fn switch_to(&mut self, graph: &mut AudioGraph, voice: Voice, fade: f64) {
        info!(note = %voice.note(), voice = voice.id(), "Switching voice");
        if let Some(previous) = self.active.replace(voice) {
            self.retire(graph, previous, fade);
        }
    }

    /// Fades out the active voice. Returns false if nothing was sounding.
    pub fn stop(&mut self, graph: &mut AudioGraph, fade: f64) -> bool {
        match self.active.take() {
            Some(voice) => {
                info!(note = %voice.note(), "Stopping");
                self.retire(graph, voice, fade);
                true
            }
            None => {
                debug!("Transport is idle, nothing to stop.");
                false
            }
        }
    }

    /// Removes the active voice at once, without a fade. Used when the session is closing and
    /// the clock will not advance again.
    pub fn clear(&mut self, graph: &mut AudioGraph) -> bool {
        match self.active.take() {
            Some(voice) => {
                voice.cancel();
                let removed = graph.remove_owned(voice.id());
                debug!(voice = voice.id(), removed, "Voice cleared");
                true
            }
            None => false,
        }
    }

    /// Stops the voice's loop, ramps its output to silence and removes its nodes once the fade
    /// has played out.
    fn retire(&self, graph: &mut AudioGraph, voice: Voice, fade: f64) {
        voice.cancel();
        let now = graph.current_time();
        match graph.param_mut(voice.output(), ParamName::Gain) {
            Ok(gain) => gain.ramp_from_now(NEAR_ZERO, now, fade),
            Err(e) => {
                warn!(voice = voice.id(), err = %e, "Unable to fade voice, removing it now");
                graph.remove_owned(voice.id());
                return;
            }
        }

        // Weak, so a session closed mid-fade drops its graph and ends the wait.
        let graph = Arc::downgrade(&self.graph);
        let clock = self.clock.clone();
        tokio::spawn(async move {
            if !clock.sleep_until(now + fade).await {
                debug!(voice = voice.id(), "Audio graph dropped before the fade finished");
                return;
            }
            if let Some(graph) = graph.upgrade() {
                let removed = graph.lock().remove_owned(voice.id());
                debug!(voice = voice.id(), removed, "Voice torn down");
            }
        });
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::audio::{mock, AudioSession, DESTINATION};
    use crate::config;
    use crate::pad::scheduler::{start_voice, VoiceSetup};
    use crate::params::{ParameterBus, ParameterSet};
    use crate::samples::{SampleStore, SynthSource};

    async fn voice(session: &AudioSession, store: &SampleStore, note: Note) -> Voice {
        let params = ParameterSet {
            fade_time: 1.0,
            ..ParameterSet::default()
        };
        let setup = VoiceSetup {
            note,
            buffers: store.ensure_loaded(note).await.unwrap(),
            playback_rate: 1.0,
            destination: DESTINATION,
            params: ParameterBus::new(params),
            graph: session.shared_graph(),
            clock: session.clock(),
            lookahead: Duration::from_millis(100),
        };
        start_voice(&mut session.graph(), setup).unwrap()
    }

    #[tokio::test]
    async fn test_switch_and_stop() {
        let device = Arc::new(mock::Device::get(
            &config::Audio::new("offline")
                .with_sample_rate(1000)
                .with_buffer_size(50),
        ));
        let session = AudioSession::open(device.clone()).unwrap();
        let store = SampleStore::new(Arc::new(SynthSource::with_length(4.0)), 1000);
        let mut transport = Transport::new(session.shared_graph(), session.clock());
        assert_eq!(TransportState::Idle, transport.state());
        assert!(!transport.stop(&mut session.graph(), 1.0));

        let first = voice(&session, &store, Note::A).await;
        let first_monitor = first.monitor();
        transport.switch_to(&mut session.graph(), first, 1.0);
        assert_eq!(TransportState::Sounding(Note::A), transport.state());

        let second = voice(&session, &store, Note::B).await;
        let second_monitor = second.monitor();
        transport.switch_to(&mut session.graph(), second, 1.0);
        assert_eq!(TransportState::Sounding(Note::B), transport.state());
        assert!(!first_monitor.is_looping());
        assert!(second_monitor.is_looping());

        device.render(Duration::from_millis(1500)).await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(0, first_monitor.live_nodes());
        assert!(second_monitor.live_nodes() > 0);

        assert!(transport.stop(&mut session.graph(), 1.0));
        assert_eq!(TransportState::Idle, transport.state());
        assert!(!transport.stop(&mut session.graph(), 1.0));

        device.render(Duration::from_millis(1500)).await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(0, second_monitor.live_nodes());
    }

    #[test]
    fn test_display() {
        assert_eq!("idle", TransportState::Idle.to_string());
        assert_eq!("sounding C#", TransportState::Sounding(Note::CSharp).to_string());
    }
}
