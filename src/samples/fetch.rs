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
use std::{fs, io, path::PathBuf};

use tracing::debug;

use super::location::SampleLocation;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{location}: {source}")]
    Io {
        location: String,
        #[source]
        source: io::Error,
    },
}

/// Retrieves the raw bytes of a sample resource. Implementations block.
pub trait SampleFetcher: Send + Sync {
    fn fetch(&self, location: &SampleLocation) -> Result<Vec<u8>, FetchError>;
}

/// Reads sample sets from a directory.
pub struct FileFetcher {
    base: PathBuf,
}

impl FileFetcher {
    pub fn new(base: impl Into<PathBuf>) -> FileFetcher {
        FileFetcher { base: base.into() }
    }
}

impl SampleFetcher for FileFetcher {
    fn fetch(&self, location: &SampleLocation) -> Result<Vec<u8>, FetchError> {
        let path = location.path(&self.base);
        debug!(path = ?path, "Reading sample");
        fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => FetchError::NotFound(path.display().to_string()),
            _ => FetchError::Io {
                location: path.display().to_string(),
                source,
            },
        })
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;
    use crate::notes::Note;
    use crate::params::Layer;
    use crate::samples::SampleKey;

    #[test]
    fn test_file_fetcher() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("A# Pad.wav"), b"bytes")?;

        let fetcher = FileFetcher::new(dir.path());
        let found = SampleLocation::new(SampleKey::new(Note::BFlat, Layer::default()));
        assert_eq!(b"bytes".to_vec(), fetcher.fetch(&found)?);

        let missing = SampleLocation::new(SampleKey::new(Note::B, Layer::default()));
        assert!(matches!(
            fetcher.fetch(&missing),
            Err(FetchError::NotFound(_))
        ));
        Ok(())
    }
}
