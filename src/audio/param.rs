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

//! Sample-accurate parameter automation.
//!
//! A parameter has an intrinsic value plus a timeline of automation events expressed in
//! audio clock seconds. Ramps start from the previous event on the timeline.

#[derive(Debug, Clone, Copy, PartialEq)]
enum Automation {
    /// Jump to `value` at `time`.
    Set { time: f64, value: f32 },
    /// Arrive at `value` at `time`, moving linearly from the previous event.
    LinearRamp { time: f64, value: f32 },
}

impl Automation {
    fn time(&self) -> f64 {
        match self {
            Automation::Set { time, .. } | Automation::LinearRamp { time, .. } => *time,
        }
    }

    fn value(&self) -> f32 {
        match self {
            Automation::Set { value, .. } | Automation::LinearRamp { value, .. } => *value,
        }
    }
}

/// An automatable node parameter.
#[derive(Debug, Clone)]
pub struct AudioParam {
    value: f32,
    events: Vec<Automation>,
}

impl AudioParam {
    pub fn new(value: f32) -> AudioParam {
        AudioParam {
            value,
            events: Vec::new(),
        }
    }

    /// Drops all automation and holds `value` from now on.
    pub fn set_value(&mut self, value: f32) {
        self.events.clear();
        self.value = value;
    }

    /// Jumps to `value` at `time`.
    pub fn set_value_at(&mut self, value: f32, time: f64) {
        self.insert(Automation::Set { time, value });
    }

    /// Ramps linearly from the previous event to `value`, arriving at `time`.
    pub fn linear_ramp_to(&mut self, value: f32, time: f64) {
        self.insert(Automation::LinearRamp { time, value });
    }

    /// Removes every event after `time` and pins the value it had at `time`.
    pub fn cancel_and_hold(&mut self, time: f64) {
        let held = self.value_at(time);
        self.events.retain(|event| event.time() <= time);
        self.insert(Automation::Set { time, value: held });
    }

    /// Ramps from wherever the parameter is at `now` to `value` over `duration` seconds.
    pub fn ramp_from_now(&mut self, value: f32, now: f64, duration: f64) {
        self.cancel_and_hold(now);
        self.linear_ramp_to(value, now + duration);
    }

    fn insert(&mut self, event: Automation) {
        // Events at equal times keep insertion order.
        let index = self
            .events
            .iter()
            .position(|existing| existing.time() > event.time())
            .unwrap_or(self.events.len());
        self.events.insert(index, event);
    }

    /// The automated value at `time`.
    pub fn value_at(&self, time: f64) -> f32 {
        let mut previous: Option<(f64, f32)> = None;
        for event in &self.events {
            match *event {
                Automation::Set { time: at, value } => {
                    if time < at {
                        break;
                    }
                    previous = Some((at, value));
                }
                Automation::LinearRamp { time: end, value } => {
                    if time < end {
                        return match previous {
                            Some((start, from)) if end > start => {
                                let progress = ((time - start) / (end - start)) as f32;
                                from + (value - from) * progress
                            }
                            // A ramp with nothing before it has no start point to move from.
                            _ => previous.map(|(_, from)| from).unwrap_or(self.value),
                        };
                    }
                    previous = Some((end, value));
                }
            }
        }
        previous.map(|(_, value)| value).unwrap_or(self.value)
    }

    /// Folds events that finished before `now` into the intrinsic value.
    pub fn prune(&mut self, now: f64) {
        while self.events.len() >= 2 && self.events[1].time() <= now {
            self.events.remove(0);
        }
        if self.events.len() == 1 && self.events[0].time() <= now {
            self.value = self.events[0].value();
            self.events.clear();
        }
    }

    /// The intrinsic value, ignoring automation.
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Whether any automation is still pending.
    pub fn is_automated(&self) -> bool {
        !self.events.is_empty()
    }
}
