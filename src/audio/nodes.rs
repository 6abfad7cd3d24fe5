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

//! Per-node signal processing. Everything here runs on the render thread.

use std::f64::consts::PI;

use super::buffer::DecodedBuffer;
use super::param::AudioParam;

/// The automatable parameter a modulation input can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamName {
    Gain,
    Frequency,
    Pan,
}

/// What to create when adding a node to the graph.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Multiplies its input by an automatable gain.
    Gain { gain: f32 },
    /// Second-order lowpass.
    Lowpass { frequency: f32, q: f32 },
    /// Equal-power stereo panner, pan in [-1, 1].
    StereoPanner { pan: f32 },
    /// Sine oscillator. Silent until started.
    Oscillator { frequency: f32 },
    /// One-shot playback of a shared buffer. Silent until started, removed once finished.
    BufferSource {
        buffer: DecodedBuffer,
        playback_rate: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlaybackState {
    Pending,
    Playing,
    Ended,
}

pub(crate) struct BufferPlayback {
    buffer: DecodedBuffer,
    rate: f64,
    position: f64,
    start: Option<f64>,
    stop: Option<f64>,
    state: PlaybackState,
}

#[derive(Default)]
struct BiquadState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

/// RBJ cookbook lowpass with per-channel state.
pub(crate) struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    tuned_to: f32,
    state: [BiquadState; 2],
}

impl Biquad {
    fn new() -> Biquad {
        Biquad {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            tuned_to: f32::NAN,
            state: Default::default(),
        }
    }

    fn tune(&mut self, frequency: f32, q: f32, sample_rate: u32) {
        // Small LFO steps don't need new coefficients.
        if (frequency - self.tuned_to).abs() < 0.5 {
            return;
        }
        self.tuned_to = frequency;

        let w0 = 2.0 * PI * frequency as f64 / sample_rate as f64;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q.max(0.01) as f64);
        let a0 = 1.0 + alpha;

        self.b0 = ((1.0 - cos) / 2.0 / a0) as f32;
        self.b1 = ((1.0 - cos) / a0) as f32;
        self.b2 = self.b0;
        self.a1 = (-2.0 * cos / a0) as f32;
        self.a2 = ((1.0 - alpha) / a0) as f32;
    }

    #[inline]
    fn process(&mut self, input: [f32; 2]) -> [f32; 2] {
        let mut output = [0.0; 2];
        for (channel, state) in self.state.iter_mut().enumerate() {
            let x = input[channel];
            let y = self.b0 * x + self.b1 * state.x1 + self.b2 * state.x2
                - self.a1 * state.y1
                - self.a2 * state.y2;
            state.x2 = state.x1;
            state.x1 = x;
            state.y2 = state.y1;
            state.y1 = y;
            output[channel] = y;
        }
        output
    }
}

pub(crate) enum Processor {
    Gain {
        gain: AudioParam,
    },
    Lowpass {
        frequency: AudioParam,
        q: f32,
        filter: Biquad,
    },
    StereoPanner {
        pan: AudioParam,
    },
    Oscillator {
        frequency: f32,
        phase: f64,
        start: Option<f64>,
    },
    BufferSource(BufferPlayback),
    Destination,
}

impl From<NodeKind> for Processor {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Gain { gain } => Processor::Gain {
                gain: AudioParam::new(gain),
            },
            NodeKind::Lowpass { frequency, q } => Processor::Lowpass {
                frequency: AudioParam::new(frequency),
                q,
                filter: Biquad::new(),
            },
            NodeKind::StereoPanner { pan } => Processor::StereoPanner {
                pan: AudioParam::new(pan),
            },
            NodeKind::Oscillator { frequency } => Processor::Oscillator {
                frequency,
                phase: 0.0,
                start: None,
            },
            NodeKind::BufferSource {
                buffer,
                playback_rate,
            } => Processor::BufferSource(BufferPlayback {
                buffer,
                rate: playback_rate,
                position: 0.0,
                start: None,
                stop: None,
                state: PlaybackState::Pending,
            }),
        }
    }
}

/// Equal-power pan of a stereo frame, following the Web Audio stereo panner.
#[inline]
pub(crate) fn pan_stereo(input: [f32; 2], pan: f32) -> [f32; 2] {
    let pan = pan.clamp(-1.0, 1.0);
    let x = if pan <= 0.0 { pan + 1.0 } else { pan };
    let angle = x * std::f32::consts::FRAC_PI_2;
    let (gain_r, gain_l) = angle.sin_cos();
    if pan <= 0.0 {
        [input[0] + input[1] * gain_l, input[1] * gain_r]
    } else {
        [input[0] * gain_l, input[1] + input[0] * gain_r]
    }
}

impl Processor {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Processor::Gain { .. } => "gain",
            Processor::Lowpass { .. } => "lowpass",
            Processor::StereoPanner { .. } => "stereo panner",
            Processor::Oscillator { .. } => "oscillator",
            Processor::BufferSource(_) => "buffer source",
            Processor::Destination => "destination",
        }
    }

    pub(crate) fn param(&self) -> Option<(ParamName, &AudioParam)> {
        match self {
            Processor::Gain { gain } => Some((ParamName::Gain, gain)),
            Processor::Lowpass { frequency, .. } => Some((ParamName::Frequency, frequency)),
            Processor::StereoPanner { pan } => Some((ParamName::Pan, pan)),
            _ => None,
        }
    }

    pub(crate) fn param_mut(&mut self, name: ParamName) -> Option<&mut AudioParam> {
        match (self, name) {
            (Processor::Gain { gain }, ParamName::Gain) => Some(gain),
            (Processor::Lowpass { frequency, .. }, ParamName::Frequency) => Some(frequency),
            (Processor::StereoPanner { pan }, ParamName::Pan) => Some(pan),
            _ => None,
        }
    }

    /// Schedules a source to start. Returns false for nodes that can't be started.
    pub(crate) fn start(&mut self, time: f64) -> bool {
        match self {
            Processor::Oscillator { start, .. } => {
                *start = Some(time);
                true
            }
            Processor::BufferSource(playback) => {
                playback.start = Some(time);
                true
            }
            _ => false,
        }
    }

    /// Schedules a buffer source to stop. Returns false for nodes that can't be stopped.
    pub(crate) fn stop(&mut self, time: f64) -> bool {
        match self {
            Processor::BufferSource(playback) => {
                playback.stop = Some(time);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn has_ended(&self) -> bool {
        matches!(
            self,
            Processor::BufferSource(BufferPlayback {
                state: PlaybackState::Ended,
                ..
            })
        )
    }

    pub(crate) fn prune(&mut self, now: f64) {
        match self {
            Processor::Gain { gain } => gain.prune(now),
            Processor::Lowpass { frequency, .. } => frequency.prune(now),
            Processor::StereoPanner { pan } => pan.prune(now),
            _ => {}
        }
    }

    /// Renders one block. `modulation` is summed onto the node's parameter.
    pub(crate) fn process(
        &mut self,
        input: &[[f32; 2]],
        modulation: &[f32],
        start_time: f64,
        sample_rate: u32,
        output: &mut [[f32; 2]],
    ) {
        let period = 1.0 / sample_rate as f64;
        match self {
            Processor::Gain { gain } => {
                for (i, frame) in output.iter_mut().enumerate() {
                    let value = gain.value_at(start_time + i as f64 * period) + modulation[i];
                    *frame = [input[i][0] * value, input[i][1] * value];
                }
            }
            Processor::Lowpass {
                frequency,
                q,
                filter,
            } => {
                let nyquist = sample_rate as f32 / 2.0;
                for (i, frame) in output.iter_mut().enumerate() {
                    let cutoff = (frequency.value_at(start_time + i as f64 * period)
                        + modulation[i])
                        .clamp(10.0, nyquist * 0.95);
                    filter.tune(cutoff, *q, sample_rate);
                    *frame = filter.process(input[i]);
                }
            }
            Processor::StereoPanner { pan } => {
                for (i, frame) in output.iter_mut().enumerate() {
                    let value = pan.value_at(start_time + i as f64 * period) + modulation[i];
                    *frame = pan_stereo(input[i], value);
                }
            }
            Processor::Oscillator {
                frequency,
                phase,
                start,
            } => {
                let step = *frequency as f64 / sample_rate as f64;
                for (i, frame) in output.iter_mut().enumerate() {
                    let now = start_time + i as f64 * period;
                    if !start.is_some_and(|start| now >= start) {
                        *frame = [0.0; 2];
                        continue;
                    }
                    let value = (2.0 * PI * *phase).sin() as f32;
                    *phase = (*phase + step).fract();
                    *frame = [value, value];
                }
            }
            Processor::BufferSource(playback) => {
                for (i, frame) in output.iter_mut().enumerate() {
                    *frame = playback.next_frame(start_time + i as f64 * period);
                }
            }
            Processor::Destination => output.copy_from_slice(input),
        }
    }
}

impl BufferPlayback {
    #[inline]
    fn next_frame(&mut self, now: f64) -> [f32; 2] {
        if self.state == PlaybackState::Pending {
            match self.start {
                Some(start) if now >= start => self.state = PlaybackState::Playing,
                _ => return [0.0; 2],
            }
        }
        if self.state == PlaybackState::Ended {
            return [0.0; 2];
        }
        let stopped = self.stop.is_some_and(|stop| now >= stop);
        if stopped || self.position >= self.buffer.frames() as f64 {
            self.state = PlaybackState::Ended;
            return [0.0; 2];
        }
        let frame = self.buffer.frame_at(self.position);
        self.position += self.rate;
        frame
    }
}
