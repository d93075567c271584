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

//! The front-panel keyboard scanner.
//!
//! The host's key matrix is read through six memory-mapped row registers.
//! The scanner debounces by requiring a row to read identically on
//! consecutive scans before accepting it, then reports edges only.

use tracing::trace;

use crate::bus::{Arbiter, BusError};
use crate::hostmap::KB_ROWS;

/// Consecutive identical reads required before a row change is accepted.
const DEBOUNCE_SCANS: u8 = 3;

/// Keycodes for the keys the command interface cares about. A keycode is
/// `row * 8 + bit`, so the digit keys 0-9 land on 0x00-0x09.
pub const KEY_DIGIT_0: u8 = 0x00;
pub const KEY_DIGIT_9: u8 = 0x09;
pub const KEY_LEFT_ARROW: u8 = 0x12;
pub const KEY_PLAY_STOP: u8 = 0x17;
pub const KEY_STORE: u8 = 0x19;

/// The highest keycode the matrix can produce.
pub const MAX_KEYCODE: u8 = (KB_ROWS.len() as u8) * 8 - 1;

/// A debounced key edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: u8,
    pub pressed: bool,
}

/// Scans and debounces the host's key matrix.
pub struct KeyScanner {
    debounced: [u8; KB_ROWS.len()],
    candidate: [u8; KB_ROWS.len()],
    stable: [u8; KB_ROWS.len()],
}

impl Default for KeyScanner {
    fn default() -> KeyScanner {
        KeyScanner::new()
    }
}

impl KeyScanner {
    pub fn new() -> KeyScanner {
        KeyScanner {
            debounced: [0; KB_ROWS.len()],
            candidate: [0; KB_ROWS.len()],
            stable: [0; KB_ROWS.len()],
        }
    }

    /// True if the key is currently held, as of the last accepted scan.
    pub fn is_pressed(&self, code: u8) -> bool {
        let row = (code / 8) as usize;
        if row >= KB_ROWS.len() {
            return false;
        }
        self.debounced[row] & (1 << (code % 8)) != 0
    }

    /// Performs one scan pass over all rows and returns the key edges it
    /// produced. A row must read identically for [`DEBOUNCE_SCANS`]
    /// consecutive passes before its changes are reported.
    pub fn scan(&mut self, arbiter: &mut Arbiter) -> Result<Vec<KeyEvent>, BusError> {
        let mut raw = [0u8; KB_ROWS.len()];
        {
            let mut txn = arbiter.transaction()?;
            for (row, addr) in KB_ROWS.iter().enumerate() {
                raw[row] = txn.read(*addr);
            }
        }

        let mut events = Vec::new();
        for row in 0..KB_ROWS.len() {
            if raw[row] == self.candidate[row] {
                self.stable[row] = self.stable[row].saturating_add(1);
            } else {
                self.candidate[row] = raw[row];
                self.stable[row] = 1;
            }

            if self.stable[row] < DEBOUNCE_SCANS || self.candidate[row] == self.debounced[row] {
                continue;
            }

            let changed = self.candidate[row] ^ self.debounced[row];
            for bit in 0..8 {
                if changed & (1 << bit) == 0 {
                    continue;
                }
                let event = KeyEvent {
                    code: (row as u8) * 8 + bit,
                    pressed: self.candidate[row] & (1 << bit) != 0,
                };
                trace!(code = event.code, pressed = event.pressed, "Key edge.");
                events.push(event);
            }
            self.debounced[row] = self.candidate[row];
        }
        Ok(events)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::bus::test::{pair, HostHandle};
    use crate::bus::Arbiter;

    use super::*;

    fn setup() -> (KeyScanner, Arbiter, HostHandle) {
        let (pins, host) = pair();
        let arbiter = Arbiter::new(Box::new(pins), Duration::from_millis(50));
        (KeyScanner::new(), arbiter, host)
    }

    fn settle(scanner: &mut KeyScanner, arbiter: &mut Arbiter) -> Vec<KeyEvent> {
        let mut events = Vec::new();
        for _ in 0..DEBOUNCE_SCANS {
            events.extend(scanner.scan(arbiter).expect("scan failed"));
        }
        events
    }

    #[test]
    fn test_bounce_is_suppressed() {
        let (mut scanner, mut arbiter, host) = setup();

        // A key that reads down for a single scan is a bounce.
        host.set_key_row(3, 0x01);
        assert!(scanner.scan(&mut arbiter).expect("scan failed").is_empty());
        host.set_key_row(3, 0x00);
        assert!(settle(&mut scanner, &mut arbiter).is_empty());
        assert!(!scanner.is_pressed(0x18));
    }

    #[test]
    fn test_press_and_release_edges() {
        let (mut scanner, mut arbiter, host) = setup();

        // Row 2 bit 2 is keycode 0x12.
        host.set_key_row(2, 0x04);
        let events = settle(&mut scanner, &mut arbiter);
        assert_eq!(
            vec![KeyEvent {
                code: KEY_LEFT_ARROW,
                pressed: true
            }],
            events
        );
        assert!(scanner.is_pressed(KEY_LEFT_ARROW));

        // Holding produces no further edges.
        assert!(settle(&mut scanner, &mut arbiter).is_empty());

        host.set_key_row(2, 0x00);
        let events = settle(&mut scanner, &mut arbiter);
        assert_eq!(
            vec![KeyEvent {
                code: KEY_LEFT_ARROW,
                pressed: false
            }],
            events
        );
        assert!(!scanner.is_pressed(KEY_LEFT_ARROW));
    }

    #[test]
    fn test_multiple_keys_in_one_row() {
        let (mut scanner, mut arbiter, host) = setup();

        host.set_key_row(0, 0x03);
        let events = settle(&mut scanner, &mut arbiter);
        assert_eq!(2, events.len());
        assert!(events.iter().all(|event| event.pressed));
        assert!(scanner.is_pressed(KEY_DIGIT_0));
        assert!(scanner.is_pressed(0x01));
    }

    #[test]
    fn test_named_keycodes_fit_the_matrix() {
        for code in [KEY_DIGIT_0, KEY_DIGIT_9, KEY_LEFT_ARROW, KEY_PLAY_STOP, KEY_STORE] {
            assert!(code <= MAX_KEYCODE);
        }
    }
}
