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
use std::{error::Error, fmt, sync::Arc};

use parking_lot::Mutex;

use crate::config;

pub mod buffer;
pub mod clock;
pub mod cpal;
pub mod graph;
pub mod mock;
mod nodes;
pub mod param;
pub mod session;
pub mod thread_priority;

pub use buffer::DecodedBuffer;
pub use clock::AudioClock;
pub use graph::{AudioGraph, GraphError, NodeId, NodeKind, ParamName, DESTINATION};
pub use session::AudioSession;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no audio output device named {0:?}")]
    DeviceNotFound(String),
    #[error("no default audio output device")]
    NoDefaultDevice,
    #[error("audio output {0} is already running")]
    AlreadyStarted(String),
    #[error("audio backend error: {0}")]
    Backend(String),
}

/// Effects the output can actually realize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedEffects {
    /// Stereo panning needs at least two output channels.
    pub stereo_panner: bool,
}

impl SupportedEffects {
    /// Probes what an output with the given channel count supports.
    pub fn probe(channels: u16) -> SupportedEffects {
        SupportedEffects {
            stereo_panner: channels >= 2,
        }
    }
}

/// An audio output that pulls rendered audio from a graph.
pub trait Device: fmt::Display + Send + Sync {
    /// The device name.
    fn name(&self) -> &str;

    /// Output channel count.
    fn channels(&self) -> u16;

    /// Render sample rate.
    fn sample_rate(&self) -> u32;

    /// Starts rendering the graph. From here on the device drives the graph's clock.
    fn start(&self, graph: Arc<Mutex<AudioGraph>>) -> Result<(), AudioError>;

    /// Stops rendering. Safe to call more than once.
    fn stop(&self);
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets the device named in the configuration.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, AudioError> {
    let device = config.device();
    if device.starts_with("offline") || device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(config)));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}
