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
use std::path::PathBuf;

use serde::Deserialize;

use super::ConfigError;
use crate::notes::Note;
use crate::pad::SourceMode;
use crate::params::{Layer, ParameterSet};

const DEFAULT_SAMPLES_PATH: &str = "samples";

/// Initial knob positions. Anything unset keeps the built-in default.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Parameters {
    volume: Option<f32>,
    cutoff: Option<f32>,
    mix: Option<f32>,
    motion: Option<f32>,
    ambience: Option<f32>,
    fade_time: Option<f32>,
    base_layer: Option<u8>,
}

impl Parameters {
    pub fn to_parameter_set(&self) -> Result<ParameterSet, ConfigError> {
        let defaults = ParameterSet::default();
        Ok(ParameterSet {
            volume: self.volume.unwrap_or(defaults.volume),
            cutoff: self.cutoff.unwrap_or(defaults.cutoff),
            mix: self.mix.unwrap_or(defaults.mix),
            motion: self.motion.unwrap_or(defaults.motion),
            ambience: self.ambience.unwrap_or(defaults.ambience),
            fade_time: self.fade_time.unwrap_or(defaults.fade_time),
            base_layer: match self.base_layer {
                Some(index) => Layer::new(index)?,
                None => defaults.base_layer,
            },
        }
        .clamped())
    }
}

/// A YAML representation of the pad configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Pad {
    /// Directory holding the `<Note> Pad.wav` sample sets.
    samples: Option<String>,

    /// "direct", "pitch_shifted" or "synth" (default: direct).
    mode: Option<String>,

    /// The recorded note used in pitch-shifted mode (default: C).
    reference_note: Option<String>,

    /// Load every note before accepting input.
    preload: Option<bool>,

    /// Initial knob positions.
    parameters: Option<Parameters>,

    /// A JSON presets file to use instead of the built-in presets.
    presets: Option<String>,
}

impl Pad {
    /// Returns the samples directory.
    pub fn samples_path(&self) -> PathBuf {
        PathBuf::from(self.samples.as_deref().unwrap_or(DEFAULT_SAMPLES_PATH))
    }

    /// Returns the sample source mode.
    pub fn mode(&self) -> Result<SourceMode, ConfigError> {
        let reference = match self.reference_note.as_deref() {
            Some(note) => note.parse::<Note>()?,
            None => Note::C,
        };

        match self
            .mode
            .as_deref()
            .map(|mode| mode.trim().to_lowercase())
            .as_deref()
        {
            None | Some("direct") => Ok(SourceMode::Direct),
            Some("pitch_shifted") | Some("pitch-shifted") | Some("modulation") => {
                Ok(SourceMode::PitchShifted { reference })
            }
            Some("synth") => Ok(SourceMode::Synth),
            Some(other) => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }

    /// Whether to load every note at startup (default: false).
    pub fn preload(&self) -> bool {
        self.preload.unwrap_or(false)
    }

    /// Returns the initial parameters.
    pub fn parameters(&self) -> Result<ParameterSet, ConfigError> {
        self.parameters.clone().unwrap_or_default().to_parameter_set()
    }

    /// Returns the presets file, if one is configured.
    pub fn presets_path(&self) -> Option<PathBuf> {
        self.presets.as_ref().map(PathBuf::from)
    }
}
