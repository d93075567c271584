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

//! The local command interface.
//!
//! Repurposes the host's front panel as a tiny command console: STORE opens
//! the console, two digits pick a command, PLAY/STOP confirms, two more
//! digits supply an argument where the command takes one. The state machine
//! only consumes debounced key edges; it touches no hardware itself, and
//! hands completed commands back to the mainline for execution.

use tracing::{debug, info};

use crate::keys::{KeyEvent, KEY_DIGIT_9, KEY_LEFT_ARROW, KEY_PLAY_STOP, KEY_STORE};
use crate::midi::Route;
use crate::voices::Voice;

/// Command numbers, as entered on the digit keys.
const CMD_LOAD_VOICE_BANK: u8 = 10;
const CMD_STORE_VOICE_BANK: u8 = 11;
const CMD_SAVE_RAM_BANK: u8 = 20;
const CMD_LOAD_RAM_BANK: u8 = 21;
const CMD_COPY_VOICE: u8 = 30;
const CMD_REVERSE_VOICE: u8 = 31;
const CMD_MIDI_CHANNEL: u8 = 40;
const CMD_NOTE_OUT_ROUTE: u8 = 41;
const CMD_NOTE_IN_ROUTE: u8 = 42;
const CMD_CLOCK_OUT_ROUTE: u8 = 43;
const CMD_CLOCK_IN_ROUTE: u8 = 44;
const CMD_SYSEX_ROUTE: u8 = 45;
const CMD_FAN_MODE: u8 = 50;
const CMD_BOOT_SCREEN: u8 = 51;
const CMD_REBOOT_HOST: u8 = 99;

/// Where the console is in its entry sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Inactive,
    GetCmd,
    GotCmd,
    GetVal,
    GotVal,
    CmdComplete,
}

/// A fully-entered, validated console command, ready for execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    LoadVoiceBank(u8),
    StoreVoiceBank(u8),
    SaveRamBank(u8),
    LoadRamBank(u8),
    CopyVoice { src: Voice, dst: Voice },
    ReverseVoice(Voice),
    SetMidiChannel(u8),
    SetNoteOutRoute(Route),
    SetNoteInRoute(Route),
    SetClockOutRoute(Route),
    SetClockInRoute(Route),
    SetSysexRoute(Route),
    SetFanMode(bool),
    SetBootScreen(bool),
    RebootHost,
}

/// The console state machine.
pub struct LocalUi {
    phase: Phase,
    digits: Vec<u8>,
    command: u8,
    completed: Option<Command>,
}

impl Default for LocalUi {
    fn default() -> LocalUi {
        LocalUi::new()
    }
}

impl LocalUi {
    pub fn new() -> LocalUi {
        LocalUi {
            phase: Phase::Inactive,
            digits: Vec::with_capacity(2),
            command: 0,
            completed: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase != Phase::Inactive
    }

    /// The digits entered so far, as a 0-99 number, for display echo.
    pub fn entry(&self) -> u8 {
        self.digits
            .iter()
            .fold(0, |value, digit| value * 10 + digit)
    }

    /// Takes the completed command, if one is ready, returning the console
    /// to idle.
    pub fn take_command(&mut self) -> Option<Command> {
        if self.phase == Phase::CmdComplete {
            self.reset();
        }
        self.completed.take()
    }

    /// Feeds one debounced key edge into the console. Key releases and
    /// unrelated keys are ignored.
    pub fn on_key(&mut self, event: KeyEvent) {
        if !event.pressed {
            return;
        }

        match event.code {
            KEY_STORE => self.toggle(),
            code if code <= KEY_DIGIT_9 => self.on_digit(code),
            KEY_LEFT_ARROW => self.on_backspace(),
            KEY_PLAY_STOP => self.on_confirm(),
            _ => {}
        }
    }

    fn toggle(&mut self) {
        if self.is_active() {
            debug!("Console cancelled.");
            self.reset();
        } else {
            debug!("Console opened.");
            self.phase = Phase::GetCmd;
        }
    }

    fn on_digit(&mut self, digit: u8) {
        match self.phase {
            Phase::GetCmd | Phase::GetVal => {
                self.digits.push(digit);
                if self.digits.len() == 2 {
                    self.phase = match self.phase {
                        Phase::GetCmd => Phase::GotCmd,
                        _ => Phase::GotVal,
                    };
                }
            }
            _ => {}
        }
    }

    fn on_backspace(&mut self) {
        match self.phase {
            Phase::GetCmd | Phase::GetVal => {
                self.digits.pop();
            }
            Phase::GotCmd => {
                self.digits.pop();
                self.phase = Phase::GetCmd;
            }
            Phase::GotVal => {
                self.digits.pop();
                self.phase = Phase::GetVal;
            }
            _ => {}
        }
    }

    fn on_confirm(&mut self) {
        match self.phase {
            Phase::GotCmd => {
                let command = self.entry();
                if !known_command(command) {
                    // Unknown command number: stay in entry.
                    debug!(command, "Unknown console command.");
                    self.digits.clear();
                    self.phase = Phase::GetCmd;
                    return;
                }
                self.command = command;
                self.digits.clear();
                if command_takes_value(command) {
                    self.phase = Phase::GetVal;
                } else {
                    self.complete(build_command(command, 0));
                }
            }
            Phase::GotVal => {
                let value = self.entry();
                self.digits.clear();
                match build_command(self.command, value) {
                    Some(command) => self.complete(Some(command)),
                    None => {
                        // Out-of-range argument: stay in value entry.
                        debug!(command = self.command, value, "Invalid console argument.");
                        self.phase = Phase::GetVal;
                    }
                }
            }
            _ => {}
        }
    }

    fn complete(&mut self, command: Option<Command>) {
        if let Some(command) = command {
            info!(?command, "Console command complete.");
            self.completed = Some(command);
            self.phase = Phase::CmdComplete;
        }
    }

    fn reset(&mut self) {
        self.phase = Phase::Inactive;
        self.digits.clear();
        self.command = 0;
    }
}

fn known_command(command: u8) -> bool {
    matches!(
        command,
        CMD_LOAD_VOICE_BANK
            | CMD_STORE_VOICE_BANK
            | CMD_SAVE_RAM_BANK
            | CMD_LOAD_RAM_BANK
            | CMD_COPY_VOICE
            | CMD_REVERSE_VOICE
            | CMD_MIDI_CHANNEL
            | CMD_NOTE_OUT_ROUTE
            | CMD_NOTE_IN_ROUTE
            | CMD_CLOCK_OUT_ROUTE
            | CMD_CLOCK_IN_ROUTE
            | CMD_SYSEX_ROUTE
            | CMD_FAN_MODE
            | CMD_BOOT_SCREEN
            | CMD_REBOOT_HOST
    )
}

fn command_takes_value(command: u8) -> bool {
    command != CMD_REBOOT_HOST
}

/// Builds a command from its number and argument, or None when the argument
/// is out of range.
fn build_command(command: u8, value: u8) -> Option<Command> {
    match command {
        CMD_LOAD_VOICE_BANK if value <= 99 => Some(Command::LoadVoiceBank(value)),
        CMD_STORE_VOICE_BANK if value <= 99 => Some(Command::StoreVoiceBank(value)),
        CMD_SAVE_RAM_BANK if value <= 99 => Some(Command::SaveRamBank(value)),
        CMD_LOAD_RAM_BANK if value <= 99 => Some(Command::LoadRamBank(value)),
        // Copy encodes both voices in one entry: tens digit is the source
        // selector, units the destination.
        CMD_COPY_VOICE => {
            let src = Voice::from_selector(value / 10)?;
            let dst = Voice::from_selector(value % 10)?;
            if src == dst {
                return None;
            }
            Some(Command::CopyVoice { src, dst })
        }
        CMD_REVERSE_VOICE => Voice::from_selector(value).map(Command::ReverseVoice),
        CMD_MIDI_CHANNEL if (1..=16).contains(&value) => Some(Command::SetMidiChannel(value)),
        CMD_NOTE_OUT_ROUTE => Route::from_encoding(value).map(Command::SetNoteOutRoute),
        CMD_NOTE_IN_ROUTE => Route::from_encoding(value).map(Command::SetNoteInRoute),
        CMD_CLOCK_OUT_ROUTE => Route::from_encoding(value).map(Command::SetClockOutRoute),
        CMD_CLOCK_IN_ROUTE => Route::from_encoding(value).map(Command::SetClockInRoute),
        CMD_SYSEX_ROUTE => Route::from_encoding(value).map(Command::SetSysexRoute),
        CMD_FAN_MODE if value <= 1 => Some(Command::SetFanMode(value == 1)),
        CMD_BOOT_SCREEN if value <= 1 => Some(Command::SetBootScreen(value == 1)),
        CMD_REBOOT_HOST => Some(Command::RebootHost),
        _ => None,
    }
}
