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
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{error, info, span, Instrument, Level};

use crate::notes::Note;
use crate::pad::{Pad, PadError};
use crate::params::Knob;

pub mod keyboard;

/// Controller events that will trigger behavior on the pad.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Plays the note, or stops it if it is already sounding.
    Note(Note),

    /// Fades out the sounding note. If nothing is sounding, does nothing.
    Stop,

    /// Turns a knob.
    Set(Knob, f32),

    /// Applies a named preset.
    Preset(String),

    /// Silences the pad and stops the controller.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Drives a pad from a driver's events.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(pad: Arc<Pad>, driver: Arc<dyn Driver>) -> Controller {
        let span = span!(Level::INFO, "controller");
        Controller {
            handle: tokio::spawn(Controller::trigger_events(pad, driver).instrument(span)),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Triggers pad behavior by watching the driver and getting events from it.
    async fn trigger_events(pad: Arc<Pad>, driver: Arc<dyn Driver>) {
        let (events_tx, mut events_rx) = mpsc::channel(1);
        let join_handle = driver.monitor_events(events_tx);
        let status = pad.events();

        info!(mode = ?pad.mode(), "Controller started.");

        while let Some(event) = events_rx.recv().await {
            info!(event = ?event, "Received event.");

            let result: Result<(), PadError> = match event {
                Event::Note(note) => pad.on_note_click(note).await.map(|_| ()),
                Event::Stop => {
                    pad.stop().await;
                    Ok(())
                }
                Event::Set(knob, value) => pad.set(knob, value).map(|_| ()),
                Event::Preset(name) => pad.apply_preset(&name).map(|_| ()),
                Event::Quit => break,
            };
            if let Err(e) = result {
                error!(err = %e, "Error talking to pad");
            }

            for event in status.try_iter() {
                info!(status = %event, "Pad status");
            }
        }

        info!("Controller closing.");
        pad.shutdown().await;
        // The driver may be parked on input; it is not waited for after a quit.
        if join_handle.is_finished() {
            if let Err(e) = join_handle.await {
                error!("Error waiting for event monitor to stop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::{io, sync::Arc};

    use parking_lot::Mutex;
    use tokio::{
        sync::mpsc::{self, Receiver, Sender},
        task::JoinHandle,
    };

    use super::{Controller, Driver, Event};
    use crate::audio::mock;
    use crate::config;
    use crate::notes::Note;
    use crate::pad::{Pad, TransportState};
    use crate::params::Knob;
    use crate::presets;
    use crate::testutil::eventually_async;

    /// Forwards whatever the test sends.
    struct TestDriver {
        rx: Mutex<Option<Receiver<Event>>>,
    }

    impl Driver for TestDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
            let rx = self.rx.lock().take();
            tokio::spawn(async move {
                if let Some(mut rx) = rx {
                    while let Some(event) = rx.recv().await {
                        if events_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                }
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_controller() -> Result<(), Box<dyn std::error::Error>> {
        let player = config::parse(concat!(
            "audio:\n  device: offline\n  sample_rate: 1000\n  buffer_size: 50\n",
            "pad:\n  mode: synth\n",
        ))?;
        let device = Arc::new(mock::Device::get(player.audio()));
        let pad = Arc::new(Pad::with_device(&player, device.clone())?);

        let (tx, rx) = mpsc::channel(4);
        let driver = Arc::new(TestDriver {
            rx: Mutex::new(Some(rx)),
        });
        let mut controller = Controller::new(pad.clone(), driver);
        let view: &Pad = &pad;

        tx.send(Event::Note(Note::A)).await?;
        eventually_async(
            || async move { view.state() == TransportState::Sounding(Note::A) },
            "A never started sounding",
        )
        .await;
        assert!(device.is_running());

        tx.send(Event::Set(Knob::Volume, 20.0)).await?;
        eventually_async(
            || async move { view.parameters().volume == 20.0 },
            "Volume never changed",
        )
        .await;

        tx.send(Event::Stop).await?;
        eventually_async(
            || async move { view.state() == TransportState::Idle },
            "A never stopped",
        )
        .await;

        tx.send(Event::Preset("ambient swell".to_string())).await?;
        // Unknown presets are logged, not fatal.
        tx.send(Event::Preset("missing".to_string())).await?;
        tx.send(Event::Quit).await?;
        controller.join().await?;

        let expected = presets::find(&presets::defaults(), "Ambient Swell")?.values;
        assert_eq!(expected, pad.parameters());
        assert!(!device.is_running());
        Ok(())
    }
}
