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

//! The live knobs of the pad and how their UI scale maps onto the graph.

use std::{fmt, sync::Arc};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Lowest cutoff frequency reachable by the cutoff knob.
pub const MIN_CUTOFF_HZ: f32 = 80.0;
/// Highest cutoff frequency reachable by the cutoff knob.
pub const MAX_CUTOFF_HZ: f32 = 18_000.0;
/// Filter LFO depth at full motion, in Hz.
pub const MAX_MOTION_DEPTH_HZ: f32 = 1800.0;
/// Shortest allowed crossfade.
pub const MIN_FADE_TIME: f32 = 1.0;
/// Longest allowed crossfade.
pub const MAX_FADE_TIME: f32 = 10.0;

/// Which of the three sample layers is routed outside the mix bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Layer(u8);

impl Layer {
    pub const ALL: [Layer; 3] = [Layer(1), Layer(2), Layer(3)];

    /// Creates a layer from its 1-based index.
    pub fn new(index: u8) -> Result<Layer, ParameterError> {
        if (1..=3).contains(&index) {
            Ok(Layer(index))
        } else {
            Err(ParameterError::InvalidLayer(index))
        }
    }

    /// The 1-based layer index.
    pub fn index(&self) -> u8 {
        self.0
    }

    /// Position of this layer in a 3-element array.
    pub fn slot(&self) -> usize {
        (self.0 - 1) as usize
    }
}

impl Default for Layer {
    fn default() -> Self {
        Layer(1)
    }
}

impl TryFrom<u8> for Layer {
    type Error = ParameterError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Layer::new(value)
    }
}

impl From<Layer> for u8 {
    fn from(layer: Layer) -> Self {
        layer.0
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer {}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterError {
    #[error("base layer must be 1, 2 or 3, got {0}")]
    InvalidLayer(u8),
    #[error("unknown parameter {0:?}")]
    UnknownParameter(String),
}

/// The full set of pad knobs, in UI units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSet {
    pub volume: f32,
    pub cutoff: f32,
    pub mix: f32,
    pub motion: f32,
    pub ambience: f32,
    pub fade_time: f32,
    pub base_layer: Layer,
}

impl Default for ParameterSet {
    fn default() -> Self {
        ParameterSet {
            volume: 70.0,
            cutoff: 80.0,
            mix: 50.0,
            motion: 20.0,
            ambience: 30.0,
            fade_time: 5.0,
            base_layer: Layer::default(),
        }
    }
}

fn percent(value: f32) -> f32 {
    value.clamp(0.0, 100.0) / 100.0
}

impl ParameterSet {
    /// Returns a copy with every knob pulled into its legal range.
    pub fn clamped(mut self) -> ParameterSet {
        self.volume = self.volume.clamp(0.0, 100.0);
        self.cutoff = self.cutoff.clamp(0.0, 100.0);
        self.mix = self.mix.clamp(0.0, 100.0);
        self.motion = self.motion.clamp(0.0, 100.0);
        self.ambience = self.ambience.clamp(0.0, 100.0);
        self.fade_time = clamp_fade_time(self.fade_time);
        self
    }

    /// Linear master gain.
    pub fn master_gain(&self) -> f32 {
        percent(self.volume)
    }

    /// Lowpass cutoff in Hz, mapped exponentially across the audible range.
    pub fn cutoff_hz(&self) -> f32 {
        MIN_CUTOFF_HZ * (MAX_CUTOFF_HZ / MIN_CUTOFF_HZ).powf(percent(self.cutoff))
    }

    /// Linear gain of the texture mix bus.
    pub fn mix_gain(&self) -> f32 {
        percent(self.mix)
    }

    /// Filter LFO depth in Hz.
    pub fn motion_depth(&self) -> f32 {
        percent(self.motion) * MAX_MOTION_DEPTH_HZ
    }

    /// Pan LFO depth, where 1.0 swings hard left to hard right.
    pub fn ambience_depth(&self) -> f32 {
        percent(self.ambience)
    }

    /// Crossfade length in seconds.
    pub fn fade_seconds(&self) -> f64 {
        clamp_fade_time(self.fade_time) as f64
    }
}

fn clamp_fade_time(seconds: f32) -> f32 {
    if seconds.is_nan() {
        return MIN_FADE_TIME;
    }
    seconds.clamp(MIN_FADE_TIME, MAX_FADE_TIME)
}

/// A knob that can be turned at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Knob {
    Volume,
    Cutoff,
    Mix,
    Motion,
    Ambience,
    FadeTime,
    BaseLayer,
}

impl std::str::FromStr for Knob {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "volume" => Ok(Knob::Volume),
            "cutoff" => Ok(Knob::Cutoff),
            "mix" => Ok(Knob::Mix),
            "motion" => Ok(Knob::Motion),
            "ambience" => Ok(Knob::Ambience),
            "fade" | "fade_time" | "fadetime" => Ok(Knob::FadeTime),
            "base" | "base_layer" | "baselayer" => Ok(Knob::BaseLayer),
            _ => Err(ParameterError::UnknownParameter(s.to_string())),
        }
    }
}

/// Shared, live parameter state. Readers always see a consistent snapshot.
#[derive(Clone, Default)]
pub struct ParameterBus {
    current: Arc<RwLock<ParameterSet>>,
}

impl ParameterBus {
    pub fn new(initial: ParameterSet) -> ParameterBus {
        ParameterBus {
            current: Arc::new(RwLock::new(initial.clamped())),
        }
    }

    /// A copy of the current values.
    pub fn snapshot(&self) -> ParameterSet {
        *self.current.read()
    }

    /// Replaces every value at once.
    pub fn replace(&self, values: ParameterSet) -> ParameterSet {
        let values = values.clamped();
        *self.current.write() = values;
        values
    }

    /// Sets one knob and returns the resulting snapshot.
    pub fn set(&self, knob: Knob, value: f32) -> Result<ParameterSet, ParameterError> {
        let mut current = self.current.write();
        match knob {
            Knob::Volume => current.volume = value,
            Knob::Cutoff => current.cutoff = value,
            Knob::Mix => current.mix = value,
            Knob::Motion => current.motion = value,
            Knob::Ambience => current.ambience = value,
            Knob::FadeTime => current.fade_time = value,
            Knob::BaseLayer => current.base_layer = Layer::new(value.round() as u8)?,
        }
        *current = current.clamped();
        Ok(*current)
    }
}
