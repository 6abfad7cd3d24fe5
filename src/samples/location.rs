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
use std::{
    fmt,
    path::{Path, PathBuf},
};

use super::SampleKey;

/// Where one layer of one note lives in a sample set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleLocation {
    key: SampleKey,
}

impl SampleLocation {
    pub fn new(key: SampleKey) -> SampleLocation {
        SampleLocation { key }
    }

    pub fn key(&self) -> SampleKey {
        self.key
    }

    /// The file name, e.g. `D# Pad2.wav`. Flats use their sharp spelling.
    pub fn file_name(&self) -> String {
        let suffix = match self.key.layer.index() {
            1 => String::new(),
            index => index.to_string(),
        };
        format!("{} Pad{}.wav", self.key.note.sharp_name(), suffix)
    }

    /// The path of this layer under a sample directory.
    pub fn path(&self, base: &Path) -> PathBuf {
        base.join(self.file_name())
    }

    /// The addressable form under a base URL. `#` would start a fragment, so it is escaped.
    pub fn url(&self, base: &str) -> String {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            self.file_name().replace('#', "%23")
        )
    }
}

impl fmt::Display for SampleLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use super::*;
    use crate::notes::Note;
    use crate::params::Layer;

    fn location(note: Note, layer: u8) -> SampleLocation {
        SampleLocation::new(SampleKey::new(note, Layer::new(layer).unwrap()))
    }

    #[test]
    fn test_file_names() {
        assert_eq!("C Pad.wav", location(Note::C, 1).file_name());
        assert_eq!("C Pad2.wav", location(Note::C, 2).file_name());
        assert_eq!("F# Pad3.wav", location(Note::FSharp, 3).file_name());
    }

    #[test]
    fn test_flats_use_sharp_names() {
        assert_eq!("D# Pad.wav", location(Note::EFlat, 1).file_name());
        assert_eq!("G# Pad2.wav", location(Note::AFlat, 2).file_name());
        assert_eq!("A# Pad3.wav", location(Note::BFlat, 3).file_name());
    }

    #[test]
    fn test_url_escapes_sharps() {
        assert_eq!(
            "https://pads.example/set/D%23 Pad2.wav",
            location(Note::EFlat, 2).url("https://pads.example/set/")
        );
        assert_eq!("pads/E Pad.wav", location(Note::E, 1).url("pads"));
    }

    #[test]
    fn test_path() {
        assert_eq!(
            PathBuf::from("/srv/pads/C# Pad.wav"),
            location(Note::CSharp, 1).path(Path::new("/srv/pads"))
        );
    }
}
