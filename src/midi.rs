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
use std::{error::Error, fmt, sync::Arc};

use crossbeam_channel::Sender;
use midly::{
    live::{LiveEvent, SystemCommon, SystemRealtime},
    num::u7,
    MidiMessage,
};
use tracing::warn;

mod midir;
mod mock;
pub mod sysex;

/// A MIDI device that can emit events and listen for inputs.
pub trait Device: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Returns the name of the device.
    fn name(&self) -> String;

    /// Watches MIDI input for events and sends them to the given sender.
    fn watch_events(&self, sender: Sender<Vec<u8>>) -> Result<(), Box<dyn Error>>;

    /// Stops watching events.
    fn stop_watch_events(&self);

    /// Emits an event.
    fn emit(&self, event: LiveEvent<'_>) -> Result<(), Box<dyn Error>>;
}

/// Lists devices known to midir.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    midir::list()
}

/// Gets a device with the given name.
pub fn get_device(name: &String) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(name)));
    };

    Ok(Arc::new(midir::get(name)?))
}

/// Which physical ports a class of traffic uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    None = 0x00,
    Din5 = 0x01,
    Usb = 0x02,
    Din5Usb = 0x03,
}

impl Route {
    /// The persisted encoding.
    pub fn encoding(&self) -> u8 {
        *self as u8
    }

    pub fn from_encoding(byte: u8) -> Option<Route> {
        match byte {
            0x00 => Some(Route::None),
            0x01 => Some(Route::Din5),
            0x02 => Some(Route::Usb),
            0x03 => Some(Route::Din5Usb),
            _ => None,
        }
    }

    pub fn uses(&self, port: Port) -> bool {
        match port {
            Port::Din5 => matches!(self, Route::Din5 | Route::Din5Usb),
            Port::Usb => matches!(self, Route::Usb | Route::Din5Usb),
        }
    }
}

/// One of the two physical MIDI ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    Din5,
    Usb,
}

impl Port {
    pub const ALL: [Port; 2] = [Port::Din5, Port::Usb];
}

/// Per-class routing configuration.
#[derive(Debug, Clone, Copy)]
pub struct Routes {
    pub note_out: Route,
    pub note_in: Route,
    pub clock_out: Route,
    pub clock_in: Route,
    pub sysex: Route,
    pub soft_thru: bool,
}

impl Default for Routes {
    fn default() -> Routes {
        Routes {
            note_out: Route::Din5Usb,
            note_in: Route::Din5Usb,
            clock_out: Route::Din5Usb,
            clock_in: Route::Din5Usb,
            sysex: Route::Din5Usb,
            soft_thru: false,
        }
    }
}

/// Fans outgoing events to the DIN5 and USB devices according to per-class
/// routes, and filters incoming events the same way. An emit failure on one
/// port never stops delivery to the other.
pub struct Router {
    din5: Option<Arc<dyn Device>>,
    usb: Option<Arc<dyn Device>>,
    routes: Routes,
    channel: u8,
}

impl Router {
    pub fn new(din5: Option<Arc<dyn Device>>, usb: Option<Arc<dyn Device>>) -> Router {
        Router {
            din5,
            usb,
            routes: Routes::default(),
            channel: 1,
        }
    }

    pub fn routes(&self) -> Routes {
        self.routes
    }

    pub fn set_routes(&mut self, routes: Routes) {
        self.routes = routes;
    }

    /// The 1-16 MIDI channel for note traffic.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn set_channel(&mut self, channel: u8) {
        self.channel = channel.clamp(1, 16);
    }

    /// True if note input arriving on the port should be played.
    pub fn accepts_notes(&self, port: Port) -> bool {
        self.routes.note_in.uses(port)
    }

    /// True if realtime clock arriving on the port should drive the tempo.
    pub fn accepts_clock(&self, port: Port) -> bool {
        self.routes.clock_in.uses(port)
    }

    /// True if sysex arriving on the port should be decoded.
    pub fn accepts_sysex(&self, port: Port) -> bool {
        self.routes.sysex.uses(port)
    }

    pub fn send_note_on(&self, note: u8, velocity: u8) {
        self.send(self.routes.note_out, self.note_event(note, velocity, true));
    }

    pub fn send_note_off(&self, note: u8) {
        self.send(self.routes.note_out, self.note_event(note, 0, false));
    }

    /// Announces a bank change on the note-out route.
    pub fn send_program_change(&self, program: u8) {
        self.send(
            self.routes.note_out,
            LiveEvent::Midi {
                channel: midly::num::u4::from_int_lossy(self.channel - 1),
                message: MidiMessage::ProgramChange {
                    program: u7::from_int_lossy(program),
                },
            },
        );
    }

    pub fn send_clock(&self) {
        self.send(
            self.routes.clock_out,
            LiveEvent::Realtime(SystemRealtime::TimingClock),
        );
    }

    pub fn send_start(&self) {
        self.send(
            self.routes.clock_out,
            LiveEvent::Realtime(SystemRealtime::Start),
        );
    }

    pub fn send_continue(&self) {
        self.send(
            self.routes.clock_out,
            LiveEvent::Realtime(SystemRealtime::Continue),
        );
    }

    pub fn send_stop(&self) {
        self.send(
            self.routes.clock_out,
            LiveEvent::Realtime(SystemRealtime::Stop),
        );
    }

    /// Sends a sysex body (without framing bytes) on the sysex route.
    pub fn send_sysex(&self, body: &[u8]) -> Result<(), Box<dyn Error>> {
        let body = u7::slice_try_from_int(body)
            .ok_or("sysex body contains bytes above 0x7f")?;
        self.send(
            self.routes.sysex,
            LiveEvent::Common(SystemCommon::SysEx(body)),
        );
        Ok(())
    }

    /// Re-emits a raw inbound event on the note-out route, for soft thru.
    pub fn soft_thru(&self, raw: &[u8]) {
        if !self.routes.soft_thru {
            return;
        }
        if let Ok(event) = LiveEvent::parse(raw) {
            self.send(self.routes.note_out, event);
        }
    }

    fn note_event(&self, note: u8, velocity: u8, on: bool) -> LiveEvent<'static> {
        let key = u7::from_int_lossy(note);
        let vel = u7::from_int_lossy(velocity);
        let message = if on {
            MidiMessage::NoteOn { key, vel }
        } else {
            MidiMessage::NoteOff { key, vel }
        };
        LiveEvent::Midi {
            channel: midly::num::u4::from_int_lossy(self.channel - 1),
            message,
        }
    }

    fn send(&self, route: Route, event: LiveEvent<'_>) {
        for port in Port::ALL {
            if !route.uses(port) {
                continue;
            }
            let device = match port {
                Port::Din5 => &self.din5,
                Port::Usb => &self.usb,
            };
            if let Some(device) = device {
                if let Err(e) = device.emit(event.clone()) {
                    warn!(device = device.name(), err = %e, "Error emitting MIDI event.");
                }
            }
        }
    }
}
