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
use tokio::sync::watch;

/// Monotonic audio time, derived from the number of frames the graph has rendered.
#[derive(Clone)]
pub struct AudioClock {
    frames: watch::Receiver<u64>,
    sample_rate: u32,
}

/// The writing half of the clock, advanced by the renderer.
pub(crate) struct ClockDriver {
    frames: watch::Sender<u64>,
}

impl ClockDriver {
    pub(crate) fn publish(&self, frames: u64) {
        self.frames.send_replace(frames);
    }
}

impl AudioClock {
    pub(crate) fn new(sample_rate: u32) -> (ClockDriver, AudioClock) {
        let (tx, rx) = watch::channel(0);
        (
            ClockDriver { frames: tx },
            AudioClock {
                frames: rx,
                sample_rate,
            },
        )
    }

    /// Frames rendered so far.
    pub fn frames(&self) -> u64 {
        *self.frames.borrow()
    }

    /// Current audio time in seconds.
    pub fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Waits until audio time reaches `time`. Returns false if the graph driving the clock
    /// has been dropped.
    pub async fn sleep_until(&self, time: f64) -> bool {
        let target = (time.max(0.0) * self.sample_rate as f64).ceil() as u64;
        let mut frames = self.frames.clone();
        let reached = frames.wait_for(|rendered| *rendered >= target).await.is_ok();
        reached
    }
}

#[cfg(test)]
mod test {
    use super::AudioClock;

    #[tokio::test]
    async fn test_sleep_until() {
        let (driver, clock) = AudioClock::new(100);
        assert_eq!(0.0, clock.now());

        let waiter = {
            let clock = clock.clone();
            tokio::spawn(async move { clock.sleep_until(0.5).await })
        };

        driver.publish(20);
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        driver.publish(50);
        assert!(waiter.await.unwrap());
        assert_eq!(0.5, clock.now());
    }

    #[tokio::test]
    async fn test_sleep_until_past_time() {
        let (driver, clock) = AudioClock::new(100);
        driver.publish(300);
        assert!(clock.sleep_until(1.0).await);
    }

    #[tokio::test]
    async fn test_stopped_clock() {
        let (driver, clock) = AudioClock::new(100);
        drop(driver);
        assert!(!clock.sleep_until(10.0).await);
    }
}
