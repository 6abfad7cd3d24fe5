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
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use tracing::{error, info, span, warn, Level, Span};

use crate::audio::{self, AudioError, AudioSession, GraphError, ParamName};
use crate::config;
use crate::notes::{self, Note};
use crate::params::{Knob, Layer, ParameterBus, ParameterError, ParameterSet};
use crate::presets::{self, Preset, PresetError};
use crate::samples::{
    FetchedLayers, FileFetcher, LayerSource, SampleError, SampleStore, SynthSource,
};

pub mod chain;
pub mod events;
pub mod scheduler;
pub mod transport;
pub mod voice;

use chain::{EffectChain, PARAMETER_GLIDE_SECS};
pub use events::PadEvent;
use events::EventFeed;
use scheduler::{start_voice, VoiceSetup};
use transport::Transport;
pub use transport::TransportState;
pub use voice::{IterationRecord, VoiceMonitor};

/// Where a note's layers come from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceMode {
    /// Every note has its own recorded set, played at its natural rate.
    Direct,
    /// One recorded set, transposed to every other note by playback rate.
    PitchShifted { reference: Note },
    /// Layers generated in-process from the note's frequency.
    Synth,
}

impl SourceMode {
    /// The note whose layers to load for `note`, and the rate to play them at.
    pub fn resolve(&self, note: Note) -> (Note, f64) {
        match self {
            SourceMode::PitchShifted { reference } => (
                *reference,
                notes::playback_rate(note.semitones_from(*reference)),
            ),
            SourceMode::Direct | SourceMode::Synth => (note, 1.0),
        }
    }

    /// Every note whose layers this mode may need.
    pub fn notes_to_load(&self) -> Vec<Note> {
        match self {
            SourceMode::PitchShifted { reference } => vec![*reference],
            SourceMode::Direct | SourceMode::Synth => Note::ALL.to_vec(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PadError {
    #[error("audio output is unavailable: {0}")]
    AudioContextUnavailable(String),
    #[error(transparent)]
    SampleUnavailable(#[from] SampleError),
    #[error("audio graph error: {0}")]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error(transparent)]
    Preset(#[from] PresetError),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

/// Opens the audio session on the first note.
pub type SessionOpener = Box<dyn Fn() -> Result<AudioSession, AudioError> + Send + Sync>;

/// Everything that exists once audio is running.
struct Engine {
    session: AudioSession,
    chain: EffectChain,
    transport: Mutex<Transport>,
}

/// The pad instrument: the playback control surface over the sample store, the effect chain
/// and the one sounding voice.
pub struct Pad {
    params: ParameterBus,
    store: Arc<SampleStore>,
    mode: SourceMode,
    lookahead: Duration,
    opener: SessionOpener,
    /// Created on the first note.
    engine: Mutex<Option<Arc<Engine>>>,
    /// Serializes note clicks and note-offs.
    control: tokio::sync::Mutex<()>,
    events: EventFeed,
    audio_failure_reported: AtomicBool,
    presets: RwLock<Vec<Preset>>,
    span: Span,
}

impl Pad {
    /// Creates a pad that plays through the configured output device.
    pub fn from_config(config: &config::Player) -> Result<Pad, PadError> {
        let audio_config = config.audio().clone();
        let opener: SessionOpener = Box::new(move || {
            let device = audio::get_device(&audio_config)?;
            AudioSession::open(device)
        });
        Pad::new(config, Pad::layer_source(config)?, opener)
    }

    /// Creates a pad that plays through an already chosen device.
    pub fn with_device(
        config: &config::Player,
        device: Arc<dyn audio::Device>,
    ) -> Result<Pad, PadError> {
        let opener: SessionOpener = Box::new(move || AudioSession::open(device.clone()));
        Pad::new(config, Pad::layer_source(config)?, opener)
    }

    fn layer_source(config: &config::Player) -> Result<Arc<dyn LayerSource>, PadError> {
        let source: Arc<dyn LayerSource> = match config.pad().mode()? {
            SourceMode::Synth => Arc::new(SynthSource::new()),
            SourceMode::Direct | SourceMode::PitchShifted { .. } => Arc::new(FetchedLayers::new(
                FileFetcher::new(config.pad().samples_path()),
            )),
        };
        Ok(source)
    }

    /// Creates a pad with an explicit layer source and session opener. Nothing is loaded and no
    /// audio is opened until asked for.
    pub fn new(
        config: &config::Player,
        source: Arc<dyn LayerSource>,
        opener: SessionOpener,
    ) -> Result<Pad, PadError> {
        let presets = match config.pad().presets_path() {
            Some(path) => presets::load(&path)?,
            None => presets::defaults(),
        };

        Ok(Pad {
            params: ParameterBus::new(config.pad().parameters()?),
            store: Arc::new(SampleStore::new(source, config.audio().sample_rate())),
            mode: config.pad().mode()?,
            lookahead: config.audio().lookahead()?,
            opener,
            engine: Mutex::new(None),
            control: tokio::sync::Mutex::new(()),
            events: EventFeed::new(),
            audio_failure_reported: AtomicBool::new(false),
            presets: RwLock::new(presets),
            span: span!(Level::INFO, "pad"),
        })
    }

    /// Returns the running engine, opening audio and building the effect chain on first use.
    fn engine(&self) -> Result<Arc<Engine>, PadError> {
        let mut engine = self.engine.lock();
        if let Some(engine) = engine.as_ref() {
            return Ok(engine.clone());
        }

        let session = match (self.opener)() {
            Ok(session) => session,
            Err(e) => {
                if !self.audio_failure_reported.swap(true, Ordering::SeqCst) {
                    error!(err = %e, "Unable to open audio output");
                    self.events.publish(PadEvent::AudioUnavailable(e.to_string()));
                }
                return Err(PadError::AudioContextUnavailable(e.to_string()));
            }
        };

        let chain = EffectChain::build(&session, &self.params.snapshot())?;
        if !chain.supports_ambience() {
            self.events.publish(PadEvent::EffectUnsupported("ambience"));
        }
        let transport = Transport::new(session.shared_graph(), session.clock());
        let built = Arc::new(Engine {
            session,
            chain,
            transport: Mutex::new(transport),
        });
        *engine = Some(built.clone());
        Ok(built)
    }

    /// Plays `note`, switching away from whatever is sounding. Clicking the sounding note stops
    /// it. A note whose samples cannot be loaded leaves the current state untouched.
    pub async fn on_note_click(&self, note: Note) -> Result<TransportState, PadError> {
        let _control = self.control.lock().await;
        let engine = self.engine()?;

        let current = engine.transport.lock().state();
        if current == TransportState::Sounding(note) {
            self.stop_engine(&engine);
            return Ok(TransportState::Idle);
        }

        let (source, playback_rate) = self.mode.resolve(note);
        self.events.publish(PadEvent::Loading(note));
        let buffers = match self.store.ensure_loaded(source).await {
            Ok(buffers) => buffers,
            Err(e) => {
                warn!(parent: &self.span, note = %note, err = %e, "Note is unavailable");
                self.events.publish(PadEvent::SampleUnavailable {
                    note,
                    layer: e.layer(),
                    message: e.to_string(),
                });
                return Err(e.into());
            }
        };
        self.events.publish(PadEvent::Loaded(note));

        let state = {
            let mut transport = engine.transport.lock();
            let mut graph = engine.session.graph();
            let voice = start_voice(
                &mut graph,
                VoiceSetup {
                    note,
                    buffers,
                    playback_rate,
                    destination: engine.chain.input(),
                    params: self.params.clone(),
                    graph: engine.session.shared_graph(),
                    clock: engine.session.clock(),
                    lookahead: self.lookahead,
                },
            )?;
            transport.switch_to(&mut graph, voice, self.params.snapshot().fade_seconds());
            transport.state()
        };

        info!(parent: &self.span, note = %note, playback_rate, "Sounding");
        self.events.publish(PadEvent::Sounding(note));
        Ok(state)
    }

    /// Fades out the sounding note. Does nothing when idle.
    pub async fn note_off(&self) -> bool {
        let _control = self.control.lock().await;
        let engine = self.engine.lock().clone();
        match engine {
            Some(engine) => self.stop_engine(&engine),
            None => false,
        }
    }

    /// The stop button. Same as [`Pad::note_off`].
    pub async fn stop(&self) -> bool {
        self.note_off().await
    }

    fn stop_engine(&self, engine: &Engine) -> bool {
        let mut transport = engine.transport.lock();
        let mut graph = engine.session.graph();
        let stopped = transport.stop(&mut graph, self.params.snapshot().fade_seconds());
        if stopped {
            self.events.publish(PadEvent::Stopped);
        }
        stopped
    }

    /// Turns one knob. Changes glide on the live graph; fade time and base layer take effect
    /// from the next loop iteration.
    pub fn set(&self, knob: Knob, value: f32) -> Result<ParameterSet, PadError> {
        let params = self.params.set(knob, value)?;
        self.apply(&[knob], &params)?;
        Ok(params)
    }

    pub fn set_volume(&self, value: f32) -> Result<ParameterSet, PadError> {
        self.set(Knob::Volume, value)
    }

    pub fn set_cutoff(&self, value: f32) -> Result<ParameterSet, PadError> {
        self.set(Knob::Cutoff, value)
    }

    pub fn set_mix(&self, value: f32) -> Result<ParameterSet, PadError> {
        self.set(Knob::Mix, value)
    }

    pub fn set_motion(&self, value: f32) -> Result<ParameterSet, PadError> {
        self.set(Knob::Motion, value)
    }

    pub fn set_ambience(&self, value: f32) -> Result<ParameterSet, PadError> {
        self.set(Knob::Ambience, value)
    }

    pub fn set_fade_time(&self, seconds: f32) -> Result<ParameterSet, PadError> {
        self.set(Knob::FadeTime, seconds)
    }

    pub fn set_base_layer(&self, layer: Layer) -> Result<ParameterSet, PadError> {
        self.set(Knob::BaseLayer, layer.index() as f32)
    }

    /// Replaces every knob with the named preset's values.
    pub fn apply_preset(&self, name: &str) -> Result<ParameterSet, PadError> {
        let values = presets::find(&self.presets.read(), name)?.values;
        let params = self.params.replace(values);
        self.apply(
            &[
                Knob::Volume,
                Knob::Cutoff,
                Knob::Mix,
                Knob::Motion,
                Knob::Ambience,
            ],
            &params,
        )?;
        info!(parent: &self.span, preset = name, "Applied preset");
        Ok(params)
    }

    fn apply(&self, knobs: &[Knob], params: &ParameterSet) -> Result<(), PadError> {
        let Some(engine) = self.engine.lock().clone() else {
            return Ok(());
        };
        let transport = engine.transport.lock();
        let mut graph = engine.session.graph();
        for knob in knobs {
            engine.chain.apply(&mut graph, *knob, params)?;
        }

        // The texture mix lives on the active voice only.
        if let (true, Some(voice)) = (knobs.contains(&Knob::Mix), transport.active()) {
            let now = graph.current_time();
            graph.param_mut(voice.mix_bus(), ParamName::Gain)?.ramp_from_now(
                params.mix_gain(),
                now,
                PARAMETER_GLIDE_SECS,
            );
        }
        Ok(())
    }

    pub fn parameters(&self) -> ParameterSet {
        self.params.snapshot()
    }

    pub fn presets(&self) -> Vec<Preset> {
        self.presets.read().clone()
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    pub fn state(&self) -> TransportState {
        match self.engine.lock().as_ref() {
            Some(engine) => engine.transport.lock().state(),
            None => TransportState::Idle,
        }
    }

    /// A view of the sounding voice's loop.
    pub fn monitor(&self) -> Option<VoiceMonitor> {
        let engine = self.engine.lock().clone()?;
        let transport = engine.transport.lock();
        transport.active().map(|voice| voice.monitor())
    }

    /// Status events, oldest first.
    pub fn events(&self) -> Receiver<PadEvent> {
        self.events.subscribe()
    }

    /// Loads every note the source mode can play. Returns the notes that failed.
    pub async fn preload(&self) -> Vec<SampleError> {
        let notes = self.mode.notes_to_load();
        let failures = self
            .store
            .preload(&notes, |done, total| {
                self.events.publish(PadEvent::PreloadProgress { done, total })
            })
            .await;
        for failure in &failures {
            self.events.publish(PadEvent::SampleUnavailable {
                note: failure.note(),
                layer: failure.layer(),
                message: failure.to_string(),
            });
        }
        info!(
            parent: &self.span,
            notes = notes.len(),
            failed = failures.len(),
            memory_kb = self.store.memory_usage() / 1024,
            "Preload finished"
        );
        failures
    }

    /// Silences everything and closes the audio session. The next note opens a new one.
    pub async fn shutdown(&self) {
        let _control = self.control.lock().await;
        let Some(engine) = self.engine.lock().take() else {
            return;
        };
        let cleared = {
            let mut transport = engine.transport.lock();
            let mut graph = engine.session.graph();
            transport.clear(&mut graph)
        };
        engine.session.close();
        if cleared {
            self.events.publish(PadEvent::Stopped);
        }
        info!(parent: &self.span, "Pad shut down");
    }
}
