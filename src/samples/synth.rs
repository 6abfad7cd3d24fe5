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

//! Layers generated from the note frequency table instead of recordings.

use std::f32::consts::TAU;

use super::{LayerSource, SampleError, SampleKey};
use crate::audio::DecodedBuffer;

/// Length of every generated layer.
pub const SYNTH_SECONDS: f64 = 8.0;

/// Short fade at each edge of a generated layer.
const EDGE_SECONDS: f64 = 0.05;

/// Peak level of each generated layer.
const LEVEL: f32 = 0.25;

/// Generates the three layers of a note in-process.
#[derive(Debug, Clone, Copy)]
pub struct SynthSource {
    seconds: f64,
}

impl SynthSource {
    pub fn new() -> SynthSource {
        SynthSource {
            seconds: SYNTH_SECONDS,
        }
    }

    /// Generates layers of the given length.
    pub fn with_length(seconds: f64) -> SynthSource {
        SynthSource { seconds }
    }
}

impl Default for SynthSource {
    fn default() -> Self {
        SynthSource::new()
    }
}

fn saw(phase: f32) -> f32 {
    2.0 * (phase - phase.floor()) - 1.0
}

fn triangle(phase: f32) -> f32 {
    2.0 * saw(phase).abs() - 1.0
}

impl LayerSource for SynthSource {
    fn load(&self, key: SampleKey, sample_rate: u32) -> Result<DecodedBuffer, SampleError> {
        let frequency = key.note.frequency();
        let rate = sample_rate as f32;
        let frames = (self.seconds * sample_rate as f64).round() as usize;
        let edge = ((EDGE_SECONDS * sample_rate as f64) as usize).max(1);

        let data = (0..frames)
            .map(|frame| {
                let t = frame as f32 / rate;
                let sample = match key.layer.index() {
                    // Detuned sawtooth pair, an octave apart.
                    1 => 0.5 * (saw(frequency * 1.003 * t) + saw(frequency * 0.5 * t)),
                    2 => triangle(frequency * 2.0 * t),
                    _ => (TAU * frequency * t).sin(),
                };
                let fade = (frame.min(frames - 1 - frame) as f32 / edge as f32).min(1.0);
                sample * LEVEL * fade
            })
            .collect();

        Ok(DecodedBuffer::new(data, 1, sample_rate))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::notes::Note;
    use crate::params::Layer;

    #[test]
    fn test_layers_share_length() -> Result<(), SampleError> {
        let source = SynthSource::with_length(2.0);
        let lengths = Layer::ALL
            .iter()
            .map(|layer| {
                source
                    .load(SampleKey::new(Note::A, *layer), 1000)
                    .map(|buffer| buffer.frames())
            })
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(vec![2000, 2000, 2000], lengths);
        Ok(())
    }

    #[test]
    fn test_edges_are_silent() -> Result<(), SampleError> {
        let buffer =
            SynthSource::with_length(1.0).load(SampleKey::new(Note::C, Layer::default()), 8000)?;
        assert_eq!([0.0, 0.0], buffer.frame_at(0.0));
        assert_eq!([0.0, 0.0], buffer.frame_at(7999.0));
        let peak = (0..8000)
            .map(|frame| buffer.frame_at(frame as f64)[0].abs())
            .fold(0.0f32, f32::max);
        assert!(peak > 0.1 && peak <= LEVEL);
        Ok(())
    }

    #[test]
    fn test_waveforms() {
        assert_eq!(-1.0, saw(0.0));
        assert_eq!(0.0, saw(0.5));
        assert_eq!(1.0, triangle(0.0));
        assert_eq!(-1.0, triangle(0.5));
    }
}
