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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::ConfigError;

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_BUFFER_SIZE: usize = 512;
const DEFAULT_LOOKAHEAD: Duration = Duration::from_millis(100);

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Audio {
    /// The audio device: "default", a device name, or "offline" for a deviceless session.
    device: String,

    /// Render sample rate in Hz (default: 44100)
    sample_rate: Option<u32>,

    /// Frames rendered per block on the render thread (default: 512)
    buffer_size: Option<usize>,

    /// Output channels. Defaults to the device's preferred layout, or stereo when offline.
    channels: Option<u16>,

    /// How far ahead of the audio clock each loop iteration is scheduled (default: 100ms).
    lookahead: Option<String>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            sample_rate: None,
            buffer_size: None,
            channels: None,
            lookahead: None,
        }
    }

    /// Returns a copy that renders at the given rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Audio {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Returns a copy that renders the given number of output channels.
    pub fn with_channels(mut self, channels: u16) -> Audio {
        self.channels = Some(channels);
        self
    }

    /// Returns a copy that renders blocks of the given size.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Audio {
        self.buffer_size = Some(buffer_size);
        self
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the render sample rate (default: 44100)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the frames per render block (default: 512)
    pub fn buffer_size(&self) -> usize {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE).max(1)
    }

    /// Returns the configured output channel count, if any.
    pub fn channels(&self) -> Option<u16> {
        self.channels
    }

    /// Returns the scheduling lookahead.
    pub fn lookahead(&self) -> Result<Duration, ConfigError> {
        match &self.lookahead {
            Some(lookahead) => Ok(DurationString::from_string(lookahead.clone())
                .map_err(|cause| ConfigError::InvalidDuration {
                    field: "lookahead",
                    value: lookahead.clone(),
                    cause: cause.to_string(),
                })?
                .into()),
            None => Ok(DEFAULT_LOOKAHEAD),
        }
    }
}
