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

/// Fully decoded PCM audio held in memory. Immutable once built; voices share it by `Arc`.
#[derive(Clone)]
pub struct DecodedBuffer {
    /// Interleaved f32 samples.
    data: Arc<Vec<f32>>,
    /// 1 (mono) or 2 (stereo).
    channel_count: u16,
    sample_rate: u32,
}

impl DecodedBuffer {
    /// Wraps interleaved samples. Anything beyond stereo is folded down to the first two channels.
    pub fn new(data: Vec<f32>, channel_count: u16, sample_rate: u32) -> DecodedBuffer {
        let (data, channel_count) = if channel_count > 2 {
            let channels = channel_count as usize;
            let folded = data
                .chunks_exact(channels)
                .flat_map(|frame| [frame[0], frame[1]])
                .collect();
            (folded, 2)
        } else {
            (data, channel_count.max(1))
        };

        DecodedBuffer {
            data: Arc::new(data),
            channel_count,
            sample_rate,
        }
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.data.len() / self.channel_count as usize
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs())
    }

    /// Returns the stereo frame at a fractional position, linearly interpolated.
    /// Positions outside the buffer are silent.
    #[inline]
    pub fn frame_at(&self, position: f64) -> [f32; 2] {
        let frames = self.frames();
        if position < 0.0 || frames == 0 {
            return [0.0; 2];
        }
        let index = position.floor() as usize;
        if index >= frames {
            return [0.0; 2];
        }
        let frac = (position - index as f64) as f32;
        let current = self.frame(index);
        let next = if index + 1 < frames {
            self.frame(index + 1)
        } else {
            current
        };
        [
            current[0] + (next[0] - current[0]) * frac,
            current[1] + (next[1] - current[1]) * frac,
        ]
    }

    #[inline]
    fn frame(&self, index: usize) -> [f32; 2] {
        if self.channel_count == 1 {
            let sample = self.data[index];
            [sample, sample]
        } else {
            let base = index * 2;
            [self.data[base], self.data[base + 1]]
        }
    }

    /// Memory used by the sample data, in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

impl fmt::Debug for DecodedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedBuffer")
            .field("channel_count", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frames())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::DecodedBuffer;

    #[test]
    fn test_mono_interpolation() {
        let buffer = DecodedBuffer::new(vec![0.0, 1.0, 0.5], 1, 4);
        assert_eq!(3, buffer.frames());
        assert_eq!(0.75, buffer.duration_secs());
        assert_eq!([0.5, 0.5], buffer.frame_at(0.5));
        assert_eq!([0.75, 0.75], buffer.frame_at(1.5));
        assert_eq!([0.5, 0.5], buffer.frame_at(2.0));
        assert_eq!([0.0, 0.0], buffer.frame_at(3.0));
        assert_eq!([0.0, 0.0], buffer.frame_at(-1.0));
    }

    #[test]
    fn test_multichannel_folded() {
        let buffer = DecodedBuffer::new(vec![0.1, 0.2, 0.9, 0.3, 0.4, 0.9], 3, 8);
        assert_eq!(2, buffer.channel_count());
        assert_eq!(2, buffer.frames());
        assert_eq!([0.3, 0.4], buffer.frame_at(1.0));
    }
}
