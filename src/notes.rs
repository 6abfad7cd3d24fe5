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

//! The twelve pitch classes a pad can sound.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// A pitch class. Ordered by its semitone offset from C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Note {
    C,
    CSharp,
    D,
    EFlat,
    E,
    F,
    FSharp,
    G,
    AFlat,
    A,
    BFlat,
    B,
}

impl Note {
    /// Every note, in semitone order.
    pub const ALL: [Note; 12] = [
        Note::C,
        Note::CSharp,
        Note::D,
        Note::EFlat,
        Note::E,
        Note::F,
        Note::FSharp,
        Note::G,
        Note::AFlat,
        Note::A,
        Note::BFlat,
        Note::B,
    ];

    /// Semitones above C, 0 through 11.
    pub fn semitone(&self) -> i32 {
        *self as i32
    }

    /// The frequency of this note in the third octave, used by the synthesized source.
    pub fn frequency(&self) -> f32 {
        match self {
            Note::C => 130.81,
            Note::CSharp => 138.59,
            Note::D => 146.83,
            Note::EFlat => 155.56,
            Note::E => 164.81,
            Note::F => 174.61,
            Note::FSharp => 185.00,
            Note::G => 196.00,
            Note::AFlat => 207.65,
            Note::A => 220.00,
            Note::BFlat => 233.08,
            Note::B => 246.94,
        }
    }

    /// The label shown to players.
    pub fn label(&self) -> &'static str {
        match self {
            Note::C => "C",
            Note::CSharp => "C#",
            Note::D => "D",
            Note::EFlat => "Eb",
            Note::E => "E",
            Note::F => "F",
            Note::FSharp => "F#",
            Note::G => "G",
            Note::AFlat => "Ab",
            Note::A => "A",
            Note::BFlat => "Bb",
            Note::B => "B",
        }
    }

    /// The sharp spelling used by sample file names.
    pub fn sharp_name(&self) -> &'static str {
        match self {
            Note::EFlat => "D#",
            Note::AFlat => "G#",
            Note::BFlat => "A#",
            other => other.label(),
        }
    }

    /// Signed semitone distance from `reference` to this note.
    pub fn semitones_from(&self, reference: Note) -> i32 {
        self.semitone() - reference.semitone()
    }
}

/// Playback rate that transposes a recording by the given number of semitones.
pub fn playback_rate(semitones: i32) -> f64 {
    2f64.powf(semitones as f64 / 12.0)
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Returned when a label names no known pitch class.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown note {0:?}")]
pub struct UnknownNote(pub String);

impl FromStr for Note {
    type Err = UnknownNote;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let letter = chars
            .next()
            .map(|c| c.to_ascii_uppercase())
            .ok_or_else(|| UnknownNote(s.to_string()))?;
        let accidental: String = chars.collect();

        let natural = match letter {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(UnknownNote(s.to_string())),
        };
        let offset = match accidental.as_str() {
            "" => 0,
            "#" | "s" | "sharp" => 1,
            "b" | "flat" => -1,
            _ => return Err(UnknownNote(s.to_string())),
        };

        Ok(Note::ALL[(natural + offset + 12) as usize % 12])
    }
}

impl TryFrom<String> for Note {
    type Error = UnknownNote;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Note> for String {
    fn from(note: Note) -> Self {
        note.label().to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_semitone_order() {
        for (i, note) in Note::ALL.iter().enumerate() {
            assert_eq!(i as i32, note.semitone());
        }
        assert!(Note::C < Note::CSharp);
        assert!(Note::BFlat < Note::B);
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!(Ok(Note::C), "C".parse());
        assert_eq!(Ok(Note::CSharp), "C#".parse());
        assert_eq!(Ok(Note::CSharp), "Db".parse());
        assert_eq!(Ok(Note::EFlat), "D#".parse());
        assert_eq!(Ok(Note::EFlat), "eb".parse());
        assert_eq!(Ok(Note::AFlat), "G#".parse());
        assert_eq!(Ok(Note::BFlat), "A#".parse());
        assert_eq!(Ok(Note::B), "Cb".parse());
        assert!("H".parse::<Note>().is_err());
        assert!("C##".parse::<Note>().is_err());
        assert!("".parse::<Note>().is_err());
    }

    #[test]
    fn test_sharp_spelling() {
        assert_eq!("D#", Note::EFlat.sharp_name());
        assert_eq!("G#", Note::AFlat.sharp_name());
        assert_eq!("A#", Note::BFlat.sharp_name());
        assert_eq!("C#", Note::CSharp.sharp_name());
        assert_eq!("F", Note::F.sharp_name());
    }

    #[test]
    fn test_playback_rate() {
        assert_eq!(1.0, playback_rate(0));
        assert_eq!(2.0, playback_rate(12));
        assert_eq!(0.5, playback_rate(-12));
        assert!((playback_rate(7) - 1.498307).abs() < 1e-6);
        assert_eq!(7, Note::G.semitones_from(Note::C));
        assert_eq!(-7, Note::C.semitones_from(Note::G));
    }

    #[test]
    fn test_serde_label() {
        let json = serde_json::to_string(&Note::FSharp).unwrap();
        assert_eq!("\"F#\"", json);
        let note: Note = serde_json::from_str("\"Bb\"").unwrap();
        assert_eq!(Note::BFlat, note);
    }
}
