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
use std::{fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{AudioError, AudioGraph};
use crate::config;

/// An offline device. Nothing is played; audio is rendered only when asked for, which makes
/// the clock fully deterministic.
#[derive(Clone)]
pub struct Device {
    name: String,
    channels: u16,
    sample_rate: u32,
    block_frames: usize,
    graph: Arc<Mutex<Option<Arc<Mutex<AudioGraph>>>>>,
}

impl Device {
    /// Gets the given offline device.
    pub fn get(config: &config::Audio) -> Device {
        Device {
            name: config.device().to_string(),
            channels: config.channels().unwrap_or(2).max(1),
            sample_rate: config.sample_rate(),
            block_frames: config.buffer_size(),
            graph: Arc::new(Mutex::new(None)),
        }
    }

    /// Whether a graph is attached.
    pub fn is_running(&self) -> bool {
        self.graph.lock().is_some()
    }

    /// Renders `duration` worth of audio block by block, letting other tasks run between
    /// blocks so scheduled work observes the clock as it advances. Returns interleaved samples.
    pub async fn render(&self, duration: Duration) -> Result<Vec<f32>, AudioError> {
        let graph = self
            .graph
            .lock()
            .clone()
            .ok_or_else(|| AudioError::Backend(format!("{} is not running", self.name)))?;

        let channels = self.channels as usize;
        let total = (duration.as_secs_f64() * self.sample_rate as f64).round() as usize;
        let mut output = vec![0.0f32; total * channels];

        for block in output.chunks_mut(self.block_frames * channels) {
            graph.lock().render_interleaved(block, channels);
            tokio::task::yield_now().await;
        }

        debug!(device = self.name, frames = total, "Rendered offline audio");
        Ok(output)
    }
}

impl super::Device for Device {
    fn name(&self) -> &str {
        &self.name
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&self, graph: Arc<Mutex<AudioGraph>>) -> Result<(), AudioError> {
        let mut current = self.graph.lock();
        if current.is_some() {
            return Err(AudioError::AlreadyStarted(self.name.clone()));
        }
        info!(device = self.name, "Offline output started.");
        *current = Some(graph);
        Ok(())
    }

    fn stop(&self) {
        if self.graph.lock().take().is_some() {
            info!(device = self.name, "Offline output stopped.");
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Offline, Channels={})", self.name, self.channels)
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use parking_lot::Mutex;

    use crate::audio::{
        buffer::DecodedBuffer, graph::DESTINATION, AudioGraph, Device as _, NodeKind,
    };
    use crate::config;

    #[tokio::test]
    async fn test_render() -> Result<(), Box<dyn std::error::Error>> {
        let device = super::Device::get(
            &config::Audio::new("offline")
                .with_sample_rate(100)
                .with_buffer_size(10),
        );
        assert!(device.render(Duration::from_secs(1)).await.is_err());

        let mut graph = AudioGraph::new(100);
        let clock = graph.clock();
        let source = graph.add(NodeKind::BufferSource {
            buffer: DecodedBuffer::new(vec![0.5; 50], 1, 100),
            playback_rate: 1.0,
        });
        graph.connect(source, DESTINATION)?;
        graph.start(source, 0.0)?;

        device.start(Arc::new(Mutex::new(graph)))?;
        assert!(device.is_running());

        let output = device.render(Duration::from_secs(1)).await?;
        assert_eq!(200, output.len());
        assert_eq!(0.5, output[0]);
        assert_eq!(0.0, output[199]);
        assert_eq!(1.0, clock.now());

        device.stop();
        assert!(!device.is_running());
        Ok(())
    }
}
