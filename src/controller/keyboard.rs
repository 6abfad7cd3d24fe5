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

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;
use crate::notes::Note;
use crate::params::Knob;

const STOP: &str = "stop";
const PRESET: &str = "preset";
const QUIT: &str = "quit";

/// A controller that plays the pad from typed commands.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Turns one line of input into an event.
    fn parse(input: &str) -> Option<Event> {
        let mut words = input.split_whitespace();
        let command = words.next()?;
        let rest: Vec<&str> = words.collect();

        match command.to_lowercase().as_str() {
            STOP => return Some(Event::Stop),
            QUIT | "exit" => return Some(Event::Quit),
            PRESET if !rest.is_empty() => return Some(Event::Preset(rest.join(" "))),
            _ => {}
        }

        if let Ok(knob) = command.parse::<Knob>() {
            let value = rest.first()?.parse::<f32>().ok()?;
            return Some(Event::Set(knob, value));
        }
        command.parse::<Note>().ok().map(Event::Note)
    }

    /// Reads one command. Returns false once input is exhausted or the user quits.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command (<note>, {}, <knob> <value>, {} <name>, {}): ",
            STOP, PRESET, QUIT,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            events_tx
                .blocking_send(Event::Quit)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            return Ok(false);
        }

        match Driver::parse(&input) {
            Some(event) => {
                let quit = event == Event::Quit;
                events_tx
                    .blocking_send(event)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                Ok(!quit)
            }
            None => {
                warn!(input = input.trim(), "Unrecognized input");
                Ok(true)
            }
        }
    }
}

impl Default for Driver {
    fn default() -> Self {
        Driver::new()
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            info!("Keyboard driver stopped.");
            Ok(())
        })
    }
}
