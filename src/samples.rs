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

//! Per-note, per-layer sample loading and caching.
//!
//! Every note is made of three layers. A layer is fetched and decoded once and then held in
//! memory for the rest of the session. Layers that fail are never cached, so asking for the
//! note again retries exactly the layers that are still missing.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::audio::DecodedBuffer;
use crate::notes::Note;
use crate::params::Layer;

pub mod decode;
pub mod fetch;
pub mod location;
pub mod sources;
pub mod synth;

pub use fetch::{FetchError, FileFetcher, SampleFetcher};
pub use location::SampleLocation;
pub use synth::SynthSource;

/// Layer durations further apart than this are reported as out of step.
const DURATION_TOLERANCE_SECS: f64 = 0.01;

/// Shortest layer accepted. A loop iteration is never shorter than its base layer at the
/// playback rate.
pub const MIN_LAYER_SECS: f64 = 0.1;

/// Cache key for one decoded layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleKey {
    pub note: Note,
    pub layer: Layer,
}

impl SampleKey {
    pub fn new(note: Note, layer: Layer) -> SampleKey {
        SampleKey { note, layer }
    }
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.note, self.layer)
    }
}

/// A layer of a note could not be made available.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SampleError {
    #[error("could not fetch {layer} of {note}: {cause}")]
    FetchFailed {
        note: Note,
        layer: Layer,
        cause: String,
    },
    #[error("could not decode {layer} of {note}: {cause}")]
    DecodeFailed {
        note: Note,
        layer: Layer,
        cause: String,
    },
}

impl SampleError {
    pub fn note(&self) -> Note {
        match self {
            SampleError::FetchFailed { note, .. } | SampleError::DecodeFailed { note, .. } => *note,
        }
    }

    pub fn layer(&self) -> Layer {
        match self {
            SampleError::FetchFailed { layer, .. } | SampleError::DecodeFailed { layer, .. } => {
                *layer
            }
        }
    }

    pub fn cause(&self) -> &str {
        match self {
            SampleError::FetchFailed { cause, .. } | SampleError::DecodeFailed { cause, .. } => {
                cause
            }
        }
    }
}

/// Produces one decoded layer. Implementations may block.
pub trait LayerSource: Send + Sync {
    fn load(&self, key: SampleKey, sample_rate: u32) -> Result<DecodedBuffer, SampleError>;
}

/// Layers fetched as WAV files and decoded in memory.
pub struct FetchedLayers<F: SampleFetcher> {
    fetcher: F,
    fetches: AtomicUsize,
}

impl<F: SampleFetcher> FetchedLayers<F> {
    pub fn new(fetcher: F) -> FetchedLayers<F> {
        FetchedLayers {
            fetcher,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Number of fetches issued so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl<F: SampleFetcher> LayerSource for FetchedLayers<F> {
    fn load(&self, key: SampleKey, sample_rate: u32) -> Result<DecodedBuffer, SampleError> {
        let location = SampleLocation::new(key);
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let bytes = self
            .fetcher
            .fetch(&location)
            .map_err(|e| SampleError::FetchFailed {
                note: key.note,
                layer: key.layer,
                cause: e.to_string(),
            })?;

        decode::decode(bytes, "wav", sample_rate).map_err(|e| SampleError::DecodeFailed {
            note: key.note,
            layer: key.layer,
            cause: format!("{}: {}", location, e),
        })
    }
}

/// The three decoded layers of a note.
#[derive(Clone)]
pub struct NoteBuffers {
    note: Note,
    layers: [DecodedBuffer; 3],
}

impl NoteBuffers {
    pub fn note(&self) -> Note {
        self.note
    }

    pub fn layer(&self, layer: Layer) -> &DecodedBuffer {
        &self.layers[layer.slot()]
    }

    pub fn layers(&self) -> &[DecodedBuffer; 3] {
        &self.layers
    }
}

impl fmt::Debug for NoteBuffers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoteBuffers")
            .field("note", &self.note)
            .field(
                "durations",
                &self
                    .layers
                    .iter()
                    .map(|layer| layer.duration_secs())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// How much of a note is resident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    NotLoaded,
    Partial { missing: Vec<Layer> },
    Loaded,
}

/// Caches decoded layers by (note, layer).
pub struct SampleStore {
    source: Arc<dyn LayerSource>,
    sample_rate: u32,
    cache: RwLock<HashMap<SampleKey, DecodedBuffer>>,
    /// One gate per note so concurrent requests for a note share a single load.
    loading: Mutex<HashMap<Note, Arc<tokio::sync::Mutex<()>>>>,
}

impl SampleStore {
    /// Creates a store decoding everything to `sample_rate`.
    pub fn new(source: Arc<dyn LayerSource>, sample_rate: u32) -> SampleStore {
        SampleStore {
            source,
            sample_rate,
            cache: RwLock::new(HashMap::new()),
            loading: Mutex::new(HashMap::new()),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the note's layers if all three are cached.
    pub fn get(&self, note: Note) -> Option<NoteBuffers> {
        let cache = self.cache.read();
        let [first, second, third] =
            Layer::ALL.map(|layer| cache.get(&SampleKey::new(note, layer)).cloned());
        Some(NoteBuffers {
            note,
            layers: [first?, second?, third?],
        })
    }

    pub fn status(&self, note: Note) -> LoadStatus {
        let missing = self.missing(note);
        match missing.len() {
            0 => LoadStatus::Loaded,
            3 => LoadStatus::NotLoaded,
            _ => LoadStatus::Partial { missing },
        }
    }

    fn missing(&self, note: Note) -> Vec<Layer> {
        let cache = self.cache.read();
        Layer::ALL
            .into_iter()
            .filter(|layer| !cache.contains_key(&SampleKey::new(note, *layer)))
            .collect()
    }

    fn gate(&self, note: Note) -> Arc<tokio::sync::Mutex<()>> {
        self.loading.lock().entry(note).or_default().clone()
    }

    /// Makes every layer of the note resident. Cached layers are never fetched again; on
    /// failure the layers that did load stay cached and the first failure is returned.
    pub async fn ensure_loaded(&self, note: Note) -> Result<NoteBuffers, SampleError> {
        if let Some(buffers) = self.get(note) {
            debug!(note = %note, "Using cached samples");
            return Ok(buffers);
        }

        let gate = self.gate(note);
        let _loading = gate.lock().await;
        if let Some(buffers) = self.get(note) {
            return Ok(buffers);
        }

        let missing = self.missing(note);
        info!(note = %note, layers = missing.len(), "Loading samples");

        let source = self.source.clone();
        let sample_rate = self.sample_rate;
        let first_missing = missing.first().copied().unwrap_or_default();
        let results = tokio::task::spawn_blocking(move || {
            missing
                .into_par_iter()
                .map(|layer| {
                    let key = SampleKey::new(note, layer);
                    (layer, source.load(key, sample_rate).and_then(|b| long_enough(key, b)))
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| SampleError::FetchFailed {
            note,
            layer: first_missing,
            cause: e.to_string(),
        })?;

        let mut failures = Vec::new();
        {
            let mut cache = self.cache.write();
            for (layer, result) in results {
                match result {
                    Ok(buffer) => {
                        debug!(
                            note = %note,
                            %layer,
                            duration_ms = buffer.duration().as_millis(),
                            memory_kb = buffer.memory_size() / 1024,
                            "Layer loaded"
                        );
                        cache.insert(SampleKey::new(note, layer), buffer);
                    }
                    Err(e) => {
                        warn!(note = %note, %layer, err = %e, "Layer unavailable");
                        failures.push(e);
                    }
                }
            }
        }

        failures.sort_by_key(|e| e.layer());
        if let Some(failure) = failures.into_iter().next() {
            return Err(failure);
        }

        let buffers = self.get(note).ok_or_else(|| SampleError::FetchFailed {
            note,
            layer: first_missing,
            cause: "layer missing from cache after loading".to_string(),
        })?;
        check_durations(&buffers);
        info!(note = %note, "Samples loaded");
        Ok(buffers)
    }

    /// Loads the given notes one after another, reporting (done, total) after each.
    /// Returns every failure; a failed note does not stop the others.
    pub async fn preload<P>(&self, notes: &[Note], mut progress: P) -> Vec<SampleError>
    where
        P: FnMut(usize, usize),
    {
        let mut failures = Vec::new();
        for (done, note) in notes.iter().enumerate() {
            if let Err(e) = self.ensure_loaded(*note).await {
                failures.push(e);
            }
            progress(done + 1, notes.len());
        }
        failures
    }

    /// Memory held by cached layers, in bytes.
    pub fn memory_usage(&self) -> usize {
        self.cache
            .read()
            .values()
            .map(|buffer| buffer.memory_size())
            .sum()
    }
}

impl fmt::Debug for SampleStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleStore")
            .field("cached_layers", &self.cache.read().len())
            .field("sample_rate", &self.sample_rate)
            .field("memory_kb", &(self.memory_usage() / 1024))
            .finish()
    }
}

fn long_enough(key: SampleKey, buffer: DecodedBuffer) -> Result<DecodedBuffer, SampleError> {
    if buffer.duration_secs() < MIN_LAYER_SECS {
        return Err(SampleError::DecodeFailed {
            note: key.note,
            layer: key.layer,
            cause: format!(
                "layer is {:.3}s long, shorter than the {}s minimum",
                buffer.duration_secs(),
                MIN_LAYER_SECS
            ),
        });
    }
    Ok(buffer)
}

/// Layers of one note are expected to share a length. Loops are timed from the base layer,
/// so longer texture layers are cut short and shorter ones leave a gap before the next
/// iteration.
fn check_durations(buffers: &NoteBuffers) {
    let durations = buffers.layers().each_ref().map(|layer| layer.duration_secs());
    let longest = durations.iter().copied().fold(f64::MIN, f64::max);
    let shortest = durations.iter().copied().fold(f64::MAX, f64::min);
    if longest - shortest > DURATION_TOLERANCE_SECS {
        warn!(
            note = %buffers.note(),
            ?durations,
            "Layer durations differ; texture layers are trimmed to the base layer"
        );
    }
}
