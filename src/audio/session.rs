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
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::{Mutex, MutexGuard};
use tracing::info;

use super::{AudioClock, AudioError, AudioGraph, Device, GraphError, SupportedEffects};

/// A running audio graph bound to an output device.
pub struct AudioSession {
    graph: Arc<Mutex<AudioGraph>>,
    clock: AudioClock,
    device: Arc<dyn Device>,
    effects: SupportedEffects,
    chain_built: AtomicBool,
}

impl AudioSession {
    /// Creates a graph at the device's rate and starts the device rendering it.
    pub fn open(device: Arc<dyn Device>) -> Result<AudioSession, AudioError> {
        let graph = AudioGraph::new(device.sample_rate());
        let clock = graph.clock();
        let graph = Arc::new(Mutex::new(graph));
        device.start(graph.clone())?;

        let effects = SupportedEffects::probe(device.channels());
        info!(
            device = device.name(),
            sample_rate = device.sample_rate(),
            stereo_panner = effects.stereo_panner,
            "Audio session opened."
        );

        Ok(AudioSession {
            graph,
            clock,
            device,
            effects,
            chain_built: AtomicBool::new(false),
        })
    }

    /// Locks the graph for editing.
    pub fn graph(&self) -> MutexGuard<'_, AudioGraph> {
        self.graph.lock()
    }

    /// A shared handle to the graph, for tasks that outlive a borrow of the session.
    pub fn shared_graph(&self) -> Arc<Mutex<AudioGraph>> {
        self.graph.clone()
    }

    pub fn clock(&self) -> AudioClock {
        self.clock.clone()
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub fn supported_effects(&self) -> SupportedEffects {
        self.effects
    }

    /// Claims the right to build the effect chain. Succeeds once per session.
    pub fn claim_chain(&self) -> Result<(), GraphError> {
        if self.chain_built.swap(true, Ordering::SeqCst) {
            Err(GraphError::AlreadyBuilt)
        } else {
            Ok(())
        }
    }

    /// Stops the device. The graph stays intact but time no longer advances.
    pub fn close(&self) {
        self.device.stop();
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::audio::mock;
    use crate::config;

    #[test]
    fn test_open_and_claim() -> Result<(), Box<dyn std::error::Error>> {
        let device = Arc::new(mock::Device::get(&config::Audio::new("offline").with_channels(1)));
        let session = AudioSession::open(device.clone())?;
        assert!(device.is_running());
        assert!(!session.supported_effects().stereo_panner);

        session.claim_chain()?;
        assert_eq!(Err(GraphError::AlreadyBuilt), session.claim_chain());

        // The device only renders one graph at a time.
        assert!(matches!(
            AudioSession::open(device.clone()),
            Err(AudioError::AlreadyStarted(_))
        ));

        drop(session);
        assert!(!device.is_running());
        Ok(())
    }
}
