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

//! Persisted device settings.
//!
//! A small byte store modeled on the EEPROM it replaces: single-byte keys at
//! fixed offsets, 0xff meaning "never written", and the device serial number
//! off on its own at a fixed offset. Every write is flushed to the backing
//! file immediately.

use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::midi::{Route, Routes};

pub const KEY_FAN_MODE: usize = 0;
pub const KEY_BOOT_SCREEN: usize = 1;
pub const KEY_MIDI_CHANNEL: usize = 2;
pub const KEY_NOTE_OUT_ROUTE: usize = 3;
pub const KEY_NOTE_IN_ROUTE: usize = 4;
pub const KEY_CLOCK_OUT_ROUTE: usize = 5;
pub const KEY_CLOCK_IN_ROUTE: usize = 6;
pub const KEY_SYSEX_ROUTE: usize = 7;
pub const KEY_SOFT_THRU: usize = 8;
pub const KEY_HONOR_START_STOP: usize = 9;

const SERIAL_OFFSET: usize = 512;
const SERIAL_LEN: usize = 8;
const STORE_LEN: usize = SERIAL_OFFSET + SERIAL_LEN;

const UNSET: u8 = 0xff;

/// The persisted settings store.
pub struct Settings {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl Settings {
    /// Opens the store at the given path. A missing or short file reads as
    /// unset keys, never an error.
    pub fn open(path: impl Into<PathBuf>) -> Settings {
        let path = path.into();
        let mut bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = ?path, err = %e, "No settings file, using defaults.");
                Vec::new()
            }
        };
        bytes.resize(STORE_LEN, UNSET);
        Settings { path, bytes }
    }

    /// Reads a key, None if it has never been written.
    pub fn get(&self, key: usize) -> Option<u8> {
        match self.bytes.get(key) {
            Some(&UNSET) | None => None,
            Some(&byte) => Some(byte),
        }
    }

    /// Writes a key and flushes the store.
    pub fn set(&mut self, key: usize, value: u8) -> io::Result<()> {
        if key >= SERIAL_OFFSET {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "key out of range",
            ));
        }
        self.bytes[key] = value;
        self.flush()
    }

    /// The device serial number.
    pub fn serial(&self) -> [u8; SERIAL_LEN] {
        let mut serial = [0u8; SERIAL_LEN];
        serial.copy_from_slice(&self.bytes[SERIAL_OFFSET..SERIAL_OFFSET + SERIAL_LEN]);
        serial
    }

    pub fn set_serial(&mut self, serial: [u8; SERIAL_LEN]) -> io::Result<()> {
        self.bytes[SERIAL_OFFSET..SERIAL_OFFSET + SERIAL_LEN].copy_from_slice(&serial);
        self.flush()
    }

    pub fn fan_mode(&self) -> bool {
        self.get(KEY_FAN_MODE) == Some(1)
    }

    pub fn boot_screen(&self) -> bool {
        // Shown unless explicitly disabled.
        self.get(KEY_BOOT_SCREEN) != Some(0)
    }

    pub fn midi_channel(&self) -> u8 {
        match self.get(KEY_MIDI_CHANNEL) {
            Some(channel) if (1..=16).contains(&channel) => channel,
            _ => 1,
        }
    }

    pub fn honor_start_stop(&self) -> bool {
        self.get(KEY_HONOR_START_STOP) != Some(0)
    }

    /// The full routing configuration, with defaults for unset keys.
    pub fn routes(&self) -> Routes {
        let defaults = Routes::default();
        Routes {
            note_out: self.route(KEY_NOTE_OUT_ROUTE, defaults.note_out),
            note_in: self.route(KEY_NOTE_IN_ROUTE, defaults.note_in),
            clock_out: self.route(KEY_CLOCK_OUT_ROUTE, defaults.clock_out),
            clock_in: self.route(KEY_CLOCK_IN_ROUTE, defaults.clock_in),
            sysex: self.route(KEY_SYSEX_ROUTE, defaults.sysex),
            soft_thru: self.get(KEY_SOFT_THRU) == Some(1),
        }
    }

    fn route(&self, key: usize, default: Route) -> Route {
        match self.get(key) {
            Some(byte) => match Route::from_encoding(byte) {
                Some(route) => route,
                None => {
                    warn!(key, byte, "Invalid stored route, using default.");
                    default
                }
            },
            None => default,
        }
    }

    fn flush(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, &self.bytes)
    }
}
