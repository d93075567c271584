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
use std::time::Duration;

use serde::Deserialize;

use crate::bus::{self, Arbiter};
use crate::midi;
use crate::settings::Settings;
use crate::storage::BankStorage;
use crate::trigger;

/// The default bus acquisition timeout if the config doesn't name one.
const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 100;

/// The bridge configuration.
#[derive(Debug, Deserialize)]
pub struct Bridge {
    /// The name of the host bus device.
    pub bus_device: String,
    /// The name of the pad-status port.
    pub pad_device: Option<String>,
    /// How long to wait for the host to acknowledge a bus request.
    pub acquire_timeout_ms: Option<u64>,
    /// The DIN5 MIDI device name, if one is attached.
    pub din5_midi_device: Option<String>,
    /// The USB MIDI device name, if one is attached.
    pub usb_midi_device: Option<String>,
    /// The root directory for bank storage.
    pub storage: String,
    /// The path of the settings file.
    pub settings: String,
}

/// Parses a bridge configuration from a YAML file.
pub fn parse_bridge(file: &PathBuf) -> Result<Bridge, Box<dyn Error>> {
    match serde_yml::from_str(&fs::read_to_string(file)?) {
        Ok(config) => Ok(config),
        Err(e) => Err(format!("error parsing file {}: {}", file.display(), e).into()),
    }
}

/// Initializes the bridge from the given config file. The bridge owns every
/// collaborator and can be run until it exits. Realistically, the bridge is
/// not expected to exit.
pub fn init_bridge(file: &PathBuf) -> Result<crate::bridge::Bridge, Box<dyn Error>> {
    let config = parse_bridge(file)?;

    let pins = bus::get_pins(&config.bus_device)?;
    let acquire_timeout = Duration::from_millis(
        config
            .acquire_timeout_ms
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_MS),
    );
    let arbiter = Arbiter::new(pins, acquire_timeout);

    let pad = trigger::get_pad_port(config.pad_device.as_deref().unwrap_or("mock"))?;

    let din5 = config
        .din5_midi_device
        .as_ref()
        .map(midi::get_device)
        .map_or(Ok(None), |result| result.map(Some))?;
    let usb = config
        .usb_midi_device
        .as_ref()
        .map(midi::get_device)
        .map_or(Ok(None), |result| result.map(Some))?;

    let settings = Settings::open(&config.settings);
    let storage = BankStorage::new(&config.storage);

    Ok(crate::bridge::Bridge::new(
        arbiter, pad, din5, usb, settings, storage,
    ))
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_parse_bridge() {
        let mut file = tempfile::NamedTempFile::new().expect("unable to create tempfile");
        write!(
            file,
            r#"
bus_device: mock
acquire_timeout_ms: 250
din5_midi_device: UM-ONE
storage: /var/lib/drumbridge/banks
settings: /var/lib/drumbridge/settings.bin
"#
        )
        .expect("unable to write config");

        let config = parse_bridge(&file.path().to_path_buf()).expect("parse failed");
        assert_eq!("mock", config.bus_device);
        assert_eq!(Some(250), config.acquire_timeout_ms);
        assert_eq!(Some("UM-ONE".to_string()), config.din5_midi_device);
        assert_eq!(None, config.usb_midi_device);
        assert_eq!(None, config.pad_device);
    }

    #[test]
    fn test_init_bridge_with_mocks() {
        let dir = tempfile::tempdir().expect("unable to create tempdir");
        let config_path = dir.path().join("bridge.yaml");
        fs::write(
            &config_path,
            format!(
                "bus_device: mock\nstorage: {}\nsettings: {}\n",
                dir.path().join("banks").display(),
                dir.path().join("settings.bin").display()
            ),
        )
        .expect("unable to write config");

        assert!(init_bridge(&config_path).is_ok());
    }
}
