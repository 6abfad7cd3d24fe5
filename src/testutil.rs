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
    collections::HashSet,
    error::Error,
    fs,
    io::Cursor,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};

use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;

use crate::notes::Note;
use crate::params::Layer;
use crate::samples::{FetchError, FileFetcher, SampleFetcher, SampleKey, SampleLocation};

/// Wait for the given async predicate to return true or fail.
pub async fn eventually_async<F, Fut>(mut predicate: F, error_msg: &str)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed().expect("System time error");
        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate().await {
            return;
        }
        tokio::time::sleep(tick).await;
    }
}

/// Encodes interleaved samples as a 16 bit WAV file in memory.
pub fn wav_bytes(
    samples: &[f32],
    channels: u16,
    sample_rate: u32,
) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut bytes = Vec::new();
    {
        let mut writer = WavWriter::new(
            Cursor::new(&mut bytes),
            WavSpec {
                channels,
                sample_rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
        )?;
        for sample in samples {
            writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(bytes)
}

/// Writes all three stereo layers of a note into `dir`, each `seconds` long.
pub fn write_note_set(
    dir: &Path,
    note: Note,
    seconds: f64,
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    let frames = (seconds * sample_rate as f64).round() as usize;
    for layer in Layer::ALL {
        let level = 0.1 * layer.index() as f32;
        let samples: Vec<f32> = (0..frames)
            .flat_map(|frame| {
                let value = if frame % 2 == 0 { level } else { -level };
                [value, value]
            })
            .collect();
        let location = SampleLocation::new(SampleKey::new(note, layer));
        fs::write(location.path(dir), wav_bytes(&samples, 2, sample_rate)?)?;
    }
    Ok(())
}

/// Reads from a directory, except for layers it has been told to fail as missing.
#[derive(Clone)]
pub struct FlakyFetcher {
    files: Arc<FileFetcher>,
    failing: Arc<Mutex<HashSet<SampleKey>>>,
}

impl FlakyFetcher {
    pub fn new(dir: &Path) -> FlakyFetcher {
        FlakyFetcher {
            files: Arc::new(FileFetcher::new(PathBuf::from(dir))),
            failing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn fail(&self, key: SampleKey) {
        self.failing.lock().insert(key);
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
    }
}

impl SampleFetcher for FlakyFetcher {
    fn fetch(&self, location: &SampleLocation) -> Result<Vec<u8>, FetchError> {
        if self.failing.lock().contains(&location.key()) {
            return Err(FetchError::NotFound(location.to_string()));
        }
        self.files.fetch(location)
    }
}
