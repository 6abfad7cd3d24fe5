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
use std::fmt;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::debug;

use crate::notes::Note;
use crate::params::Layer;

/// Events older than this many unread ones are dropped.
const EVENT_BACKLOG: usize = 256;

/// Status updates for whoever is presenting the pad.
#[derive(Debug, Clone, PartialEq)]
pub enum PadEvent {
    Loading(Note),
    Loaded(Note),
    Sounding(Note),
    Stopped,
    SampleUnavailable {
        note: Note,
        layer: Layer,
        message: String,
    },
    AudioUnavailable(String),
    EffectUnsupported(&'static str),
    PreloadProgress {
        done: usize,
        total: usize,
    },
}

impl fmt::Display for PadEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PadEvent::Loading(note) => write!(f, "loading {}", note),
            PadEvent::Loaded(note) => write!(f, "{} ready", note),
            PadEvent::Sounding(note) => write!(f, "playing {}", note),
            PadEvent::Stopped => write!(f, "stopped"),
            PadEvent::SampleUnavailable { note, message, .. } => {
                write!(f, "{} is unavailable: {}", note, message)
            }
            PadEvent::AudioUnavailable(message) => write!(f, "audio unavailable: {}", message),
            PadEvent::EffectUnsupported(effect) => {
                write!(f, "{} is not supported by this output", effect)
            }
            PadEvent::PreloadProgress { done, total } => write!(f, "loaded {}/{}", done, total),
        }
    }
}

/// A bounded event feed. Publishing never blocks.
#[derive(Clone)]
pub(crate) struct EventFeed {
    tx: Sender<PadEvent>,
    rx: Receiver<PadEvent>,
}

impl EventFeed {
    pub(crate) fn new() -> EventFeed {
        let (tx, rx) = crossbeam_channel::bounded(EVENT_BACKLOG);
        EventFeed { tx, rx }
    }

    pub(crate) fn publish(&self, event: PadEvent) {
        if let Err(TrySendError::Full(event)) = self.tx.try_send(event) {
            // Make room by discarding the oldest unread event.
            let _ = self.rx.try_recv();
            if self.tx.try_send(event).is_err() {
                debug!("Dropped pad event");
            }
        }
    }

    pub(crate) fn subscribe(&self) -> Receiver<PadEvent> {
        self.rx.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_feed_drops_oldest() {
        let feed = EventFeed::new();
        for done in 0..EVENT_BACKLOG + 2 {
            feed.publish(PadEvent::PreloadProgress { done, total: 0 });
        }
        let events = feed.subscribe();
        assert_eq!(EVENT_BACKLOG, events.len());
        assert_eq!(
            Ok(PadEvent::PreloadProgress { done: 2, total: 0 }),
            events.try_recv()
        );
    }

    #[test]
    fn test_display() {
        assert_eq!("playing F#", PadEvent::Sounding(Note::FSharp).to_string());
        assert_eq!(
            "Eb is unavailable: 404",
            PadEvent::SampleUnavailable {
                note: Note::EFlat,
                layer: Layer::default(),
                message: "404".to_string()
            }
            .to_string()
        );
    }
}
