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
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ambipad::audio::{self, mock, Device as _};
use ambipad::config;
use ambipad::controller::{keyboard, Controller};
use ambipad::notes::Note;
use ambipad::pad::Pad;
use ambipad::presets;
use ambipad::samples::sources::SampleSources;
use clap::{crate_version, Parser, Subcommand};
use hound::{SampleFormat, WavSpec, WavWriter};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A looping ambient pad."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Plays the pad from keyboard commands.
    Play {
        /// The path to the player config.
        player_path: String,
    },
    /// Loads every note the config can play and reports the ones that are missing.
    Check {
        /// The path to the player config.
        player_path: String,
    },
    /// Renders a note offline to a WAV file.
    Render {
        /// The path to the player config.
        player_path: String,
        /// The note to play, e.g. C, F# or Bb.
        note: String,
        /// How many seconds to render.
        seconds: f64,
        /// The WAV file to write.
        output: String,
    },
    /// Imports and exports presets.
    Presets {
        #[clap(subcommand)]
        command: PresetCommands,
    },
    /// Prints the availability request for a per-note sample id file.
    Sources {
        /// The JSON file mapping notes to remote sample ids.
        path: String,
    },
}

#[derive(Subcommand)]
enum PresetCommands {
    /// Writes the built-in presets to a JSON file.
    Export {
        /// The file to write.
        path: String,
    },
    /// Validates a JSON presets file and lists its presets.
    Import {
        /// The file to read.
        path: String,
    },
}

// Offline rendering relies on scheduled loop tasks running between render blocks.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play { player_path } => {
            let player = config::load(&PathBuf::from(player_path))?;
            let pad = Arc::new(Pad::from_config(&player)?);
            if player.pad().preload() {
                let failures = pad.preload().await;
                for failure in failures {
                    println!("- {}", failure);
                }
            }

            let mut controller = Controller::new(pad, Arc::new(keyboard::Driver::new()));
            controller.join().await?;
        }
        Commands::Check { player_path } => {
            let player = config::load(&PathBuf::from(player_path))?;
            let pad = Pad::from_config(&player)?;
            let notes = pad.mode().notes_to_load();
            let failures = pad.preload().await;

            println!(
                "Checked {} notes ({:?}), {} unavailable:",
                notes.len(),
                pad.mode(),
                failures.len()
            );
            for failure in failures {
                println!("- {}", failure);
            }
            println!("{:?}", pad.store());
        }
        Commands::Render {
            player_path,
            note,
            seconds,
            output,
        } => {
            let player = config::load(&PathBuf::from(player_path))?;
            let note: Note = note.parse()?;
            let device = Arc::new(mock::Device::get(player.audio()));
            let pad = Pad::with_device(&player, device.clone())?;

            pad.on_note_click(note).await?;
            let samples = device.render(Duration::from_secs_f64(seconds)).await?;
            pad.shutdown().await;

            let mut writer = WavWriter::create(
                &output,
                WavSpec {
                    channels: device.channels(),
                    sample_rate: device.sample_rate(),
                    bits_per_sample: 32,
                    sample_format: SampleFormat::Float,
                },
            )?;
            for sample in samples {
                writer.write_sample(sample)?;
            }
            writer.finalize()?;
            println!("Rendered {} seconds of {} to {}", seconds, note, output);
        }
        Commands::Presets { command } => match command {
            PresetCommands::Export { path } => {
                let defaults = presets::defaults();
                presets::save(&PathBuf::from(&path), &defaults)?;
                println!("Exported {} presets to {}", defaults.len(), path);
            }
            PresetCommands::Import { path } => {
                let imported = presets::load(&PathBuf::from(&path))?;
                println!("Presets (count: {}):", imported.len());
                for preset in imported {
                    println!("- {}", preset.name);
                }
            }
        },
        Commands::Sources { path } => {
            let sources = SampleSources::from_json(&fs::read_to_string(&path)?)?;
            for note in Note::ALL {
                println!("- {}: {}", note, sources.get(note).unwrap_or("(not set)"));
            }
            println!("{}", serde_json::to_string_pretty(&sources.availability_request())?);
        }
    }

    Ok(())
}
