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
use std::path::Path;

use config::{Config, File, FileFormat};
use serde::Deserialize;

pub mod audio;
mod error;
pub mod pad;

pub use audio::Audio;
pub use error::ConfigError;
pub use pad::Pad;

/// The configuration for the pad player.
#[derive(Deserialize, Clone, Debug)]
pub struct Player {
    /// The audio output configuration.
    audio: Audio,
    /// The pad configuration.
    #[serde(default)]
    pad: Pad,
}

impl Player {
    pub fn new(audio: Audio, pad: Pad) -> Player {
        Player { audio, pad }
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn pad(&self) -> &Pad {
        &self.pad
    }
}

/// Loads the player configuration from a YAML file.
pub fn load(path: &Path) -> Result<Player, ConfigError> {
    Ok(Config::builder()
        .add_source(File::from(path).format(FileFormat::Yaml))
        .build()?
        .try_deserialize()?)
}

/// Parses the player configuration from a YAML string.
pub fn parse(yaml: &str) -> Result<Player, ConfigError> {
    Ok(Config::builder()
        .add_source(File::from_str(yaml, FileFormat::Yaml))
        .build()?
        .try_deserialize()?)
}

#[cfg(test)]
mod test {
    use std::{fs, path::PathBuf};

    use super::*;
    use crate::pad::SourceMode;

    #[test]
    fn test_load_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("ambipad.yaml");
        fs::write(
            &path,
            r#"
audio:
  device: offline
  sample_rate: 22050
pad:
  samples: pads
  mode: synth
"#,
        )?;

        let player = load(&path)?;
        assert_eq!("offline", player.audio().device());
        assert_eq!(22050, player.audio().sample_rate());
        assert_eq!(PathBuf::from("pads"), player.pad().samples_path());
        assert_eq!(SourceMode::Synth, player.pad().mode()?);
        Ok(())
    }

    #[test]
    fn test_pad_section_optional() -> Result<(), ConfigError> {
        let player = parse("audio:\n  device: default\n")?;
        assert_eq!(SourceMode::Direct, player.pad().mode()?);
        Ok(())
    }

    #[test]
    fn test_missing_audio() {
        assert!(matches!(parse("pad:\n  mode: synth\n"), Err(ConfigError::Load(_))));
    }
}
