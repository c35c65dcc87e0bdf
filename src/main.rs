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

use clap::{crate_version, Parser, Subcommand};
use isokey::config::KeyboardConfig;
use isokey::controller::{keyboard, Controller};
use isokey::tuning::{resolve_pitch, Coord, Scale, TuningConfig};
use isokey::{audio, harmony, midi};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "An isomorphic microtonal keyboard."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolves a grid coordinate to a pitch.
    Resolve {
        /// Steps along the right axis.
        #[arg(allow_negative_numbers = true)]
        r: i32,
        /// Steps along the up-right axis.
        #[arg(allow_negative_numbers = true)]
        ur: i32,
        /// A keyboard config to take the tuning from.
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Parses a scale definition file and prints its degrees.
    ParseScale {
        /// The path to the scale definition.
        path: String,
    },
    /// Names the chord formed by the given steps.
    Chord {
        /// The chord system to analyze with.
        #[arg(short, long, default_value = "12edo")]
        system: String,
        /// Steps above the system's origin, in any order.
        #[arg(allow_negative_numbers = true)]
        steps: Vec<i64>,
    },
    /// Lists the built in chord systems.
    Systems {},
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available MIDI output devices.
    MidiDevices {},
    /// Starts the keyboard, reading commands from standard input.
    Start {
        /// The path to the keyboard config.
        config_path: String,
    },
}

fn tuning_from(config: Option<String>) -> Result<TuningConfig, Box<dyn Error>> {
    match config {
        Some(path) => Ok(KeyboardConfig::deserialize(&PathBuf::from(path))?
            .tuning()
            .to_tuning_config()),
        None => Ok(TuningConfig::default()),
    }
}

fn print_list(devices: Vec<String>) {
    if devices.is_empty() {
        println!("No devices found.");
        return;
    }

    println!("Devices:");
    for device in devices {
        println!("- {}", device);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve { r, ur, config } => {
            let tuning = tuning_from(config)?;
            let coord = Coord::new(r, ur);
            let pitch = resolve_pitch(coord, &tuning);
            println!("{}", coord);
            println!("- degree: {} of {}", pitch.reduced_step, tuning.scale.len());
            println!("- octave: {}", pitch.octave);
            println!("- cents: {:.3}", pitch.cents);
            println!("- frequency: {:.3} Hz", tuning.frequency(&pitch));
            match tuning.midi_note(&pitch) {
                Some(note) => println!("- MIDI note: {}", note),
                None => println!("- MIDI note: out of range"),
            }
        }
        Commands::ParseScale { path } => {
            let scale = Scale::parse(&fs::read_to_string(&path)?);
            println!(
                "Scale (degrees: {}, equivalence: {:.3} cents):",
                scale.len(),
                scale.equivalence()
            );
            for (degree, cents) in scale.degrees().iter().enumerate() {
                println!("- {}: {:.3}", degree, cents);
            }
            match harmony::system_for_scale(&scale) {
                Some(system) => println!("Chord system: {}", system.name()),
                None => println!("Chord system: none"),
            }
        }
        Commands::Chord { system, steps } => {
            let system: Arc<harmony::ChordSystem> = harmony::system(&system)
                .ok_or_else(|| format!("unknown chord system {}", system))?;
            let analysis = harmony::analyze(&system, &steps);
            println!("{}", analysis);
        }
        Commands::Systems {} => {
            println!("Chord systems:");
            for system in harmony::systems() {
                println!("- {}", system);
            }
        }
        Commands::Devices {} => print_list(audio::list_devices()?),
        Commands::MidiDevices {} => print_list(midi::list_devices()?),
        Commands::Start { config_path } => {
            let controller = Controller::init_from_config(&PathBuf::from(config_path))?;
            controller
                .run(Arc::new(keyboard::Driver::new()))
                .await?;
        }
    }

    Ok(())
}
