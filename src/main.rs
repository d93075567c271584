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
mod bridge;
mod bus;
mod config;
mod hostmap;
mod keys;
mod lui;
mod midi;
mod settings;
mod storage;
mod tempo;
mod trigger;
mod voices;

use std::error::Error;
use std::path::PathBuf;

use clap::{crate_version, Parser, Subcommand};

use crate::storage::BankStorage;
use crate::voices::{BankRef, Voice};

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=drum machine bridge

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-/etc/default/drumbridge
ExecStart=/usr/local/bin/drumbridge start "$DRUMBRIDGE_CONFIG"
ExecReload=/bin/kill -HUP $MAINPID

[Install]
WantedBy=multi-user.target
Alias=drumbridge.service
"#;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A drum machine bus bridge."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available MIDI input/output devices.
    MidiDevices {},
    /// Lists the voice banks found in a storage directory.
    Banks {
        /// The root of the bank storage directory.
        storage_path: String,
    },
    /// Loads a voice bank into the drum machine and exits.
    LoadBank {
        /// The path to the bridge config.
        config_path: String,
        /// The bank number to load (0-99).
        bank: u8,
    },
    /// Start will start the bridge.
    Start {
        /// The path to the bridge config.
        config_path: String,
    },
    /// Prints a systemd service definition to stdout.
    Systemd {},
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Banks { storage_path } => {
            let storage = BankStorage::new(&storage_path);

            let mut found = false;
            for bank in (0..=99).map(BankRef::Bank).chain([BankRef::Staging]) {
                let voices = Voice::ALL
                    .iter()
                    .filter(|voice| storage.first_sample(bank, **voice).is_some())
                    .count();
                let name = storage.bank_name(bank);
                if voices == 0 && name.is_none() {
                    continue;
                }
                found = true;
                println!(
                    "- {:?}: {} ({} voices)",
                    bank,
                    name.unwrap_or_else(|| String::from("<unnamed>")),
                    voices
                );
            }

            if !found {
                println!("No banks found in {}.", storage_path);
            }
        }
        Commands::LoadBank { config_path, bank } => {
            if bank > 99 {
                return Err("bank must be 0-99".into());
            }
            let mut bridge = config::init_bridge(&PathBuf::from(config_path))?;
            bridge.load_voice_bank(bank)?;
            println!("Loaded bank {:02}.", bank);
        }
        Commands::Start { config_path } => {
            let mut bridge = config::init_bridge(&PathBuf::from(config_path))?;
            bridge.boot();
            bridge.run()?;
        }
        Commands::Systemd {} => {
            println!("{}", SYSTEMD_SERVICE)
        }
    }

    Ok(())
}
