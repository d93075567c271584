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

//! The drum trigger pipeline.
//!
//! Bridges physical pad hits to outgoing MIDI notes and incoming MIDI notes
//! to drum strobes, without either path blocking the other. Pad status is
//! read through a dedicated port with its own lines, so the interrupt path
//! never contends for the host bus; it only defers while a full
//! bus-ownership transfer is in flight.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::bus::{Arbiter, BusError, TriggerGate};
use crate::voices::Voice;

/// The note map used by the Kenton LM-1 MIDI retrofit kit: a contiguous
/// chromatic run from C1. Several notes share a physical voice (open/closed
/// hi-hat, tom and conga up/down), so the 13-note range folds onto the ten
/// selectors.
pub const MIDI_NOTE_BASS: u8 = 36;
pub const MIDI_NOTE_CLAVE: u8 = 48;

pub const MIDI_VEL_LOUD: u8 = 127;
pub const MIDI_VEL_SOFT: u8 = 63;

/// Strobe data bits (D[2:0] to the drum generators) for loud and soft hits.
const STROBE_LOUD: u8 = 0x07;
const STROBE_SOFT: u8 = 0x03;

/// Capacity of the interrupt-to-mainline event queue.
const EVENT_QUEUE_LEN: usize = 64;

/// Maps a MIDI note to the voice it triggers.
pub fn voice_for_note(note: u8) -> Option<Voice> {
    match note {
        36 => Some(Voice::Bass),
        37 => Some(Voice::Snare),
        38 | 39 => Some(Voice::Hihat),
        40 => Some(Voice::Claps),
        41 => Some(Voice::Cabasa),
        42 => Some(Voice::Tamb),
        43 | 44 => Some(Voice::Toms),
        45 | 46 => Some(Voice::Congas),
        47 => Some(Voice::Cowbell),
        48 => Some(Voice::Clave),
        _ => None,
    }
}

/// Maps a voice to the note sent for its pad hits (the canonical note where
/// several fold onto one voice).
pub fn note_for_voice(voice: Voice) -> u8 {
    match voice {
        Voice::Bass => 36,
        Voice::Snare => 37,
        Voice::Hihat => 38,
        Voice::Claps => 40,
        Voice::Cabasa => 41,
        Voice::Tamb => 42,
        Voice::Toms => 43,
        Voice::Congas => 45,
        Voice::Cowbell => 47,
        Voice::Clave => 48,
    }
}

/// The dedicated pad-status port serviced by the trigger interrupt. Bit i of
/// the status word is an asserted hit on voice i.
pub trait PadPort: Send {
    fn read_status(&mut self) -> Result<u16, BusError>;
}

/// Gets a pad port with the given name.
pub fn get_pad_port(name: &str) -> Result<Box<dyn PadPort>, Box<dyn Error>> {
    if name.starts_with("mock") {
        return Ok(Box::new(MockPadPort::default()));
    }
    Err(format!("no pad port found with name {}", name).into())
}

/// A mock pad port with a settable status word and failure mode.
#[derive(Clone, Default)]
pub struct MockPadPort {
    state: Arc<Mutex<(u16, bool)>>,
}

impl MockPadPort {
    pub fn set_status(&self, status: u16) {
        self.state.lock().0 = status;
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().1 = failing;
    }
}

impl PadPort for MockPadPort {
    fn read_status(&mut self) -> Result<u16, BusError> {
        let state = self.state.lock();
        if state.1 {
            return Err(BusError::AcquireTimeout(Duration::from_millis(1)));
        }
        Ok(state.0)
    }
}

/// An event produced by the inbound (hardware to MIDI) path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
}

/// Bridges pad hits and MIDI notes in both directions.
pub struct TriggerPipeline {
    pad: Box<dyn PadPort>,
    gate: TriggerGate,
    events_tx: Sender<TriggerEvent>,
    events_rx: Receiver<TriggerEvent>,
    errors: u64,
    deferred: u64,
}

impl TriggerPipeline {
    /// Creates a pipeline over the given pad port, honoring the arbiter's
    /// handover gate.
    pub fn new(pad: Box<dyn PadPort>, gate: TriggerGate) -> TriggerPipeline {
        let (events_tx, events_rx) = bounded(EVENT_QUEUE_LEN);
        TriggerPipeline {
            pad,
            gate,
            events_tx,
            events_rx,
            errors: 0,
            deferred: 0,
        }
    }

    /// The consumer side of the event queue, drained by the mainline on
    /// every loop iteration.
    pub fn events(&self) -> Receiver<TriggerEvent> {
        self.events_rx.clone()
    }

    /// Count of pad reads that failed. A failed read drops the hit; it never
    /// crashes the handler.
    pub fn error_count(&self) -> u64 {
        self.errors
    }

    /// Count of interrupts deferred because a bus handover was in flight.
    pub fn deferred_count(&self) -> u64 {
        self.deferred
    }

    /// Services the pad-hit interrupt: reads the status port, maps asserted
    /// bits to notes, and enqueues note-on/note-off pairs. Runs to
    /// completion without blocking; the producer side never waits.
    pub fn service_interrupt(&mut self) {
        if self.gate.is_held() {
            // The bus is mid-handover; reading now could tear.
            self.deferred += 1;
            return;
        }

        let status = match self.pad.read_status() {
            Ok(status) => status,
            Err(e) => {
                self.errors += 1;
                warn!(err = %e, "Pad status read failed, hit dropped.");
                return;
            }
        };

        for voice in Voice::ALL {
            if status & (1 << voice.index()) == 0 {
                continue;
            }
            let note = note_for_voice(voice);
            // The pad port reports hits without intensity; send the default.
            self.enqueue(TriggerEvent::NoteOn {
                note,
                velocity: MIDI_VEL_LOUD,
            });
            self.enqueue(TriggerEvent::NoteOff { note });
        }
    }

    fn enqueue(&mut self, event: TriggerEvent) {
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.errors += 1;
                warn!(?event, "Trigger event queue full, hit dropped.");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Plays an incoming MIDI note as a drum strobe. Unmapped notes are
    /// dropped silently; note-offs are ignored because percussion voices are
    /// not sustained. Returns true if a strobe was pulsed.
    pub fn play_note(&mut self, arbiter: &mut Arbiter, note: u8, velocity: u8) -> bool {
        let Some(voice) = voice_for_note(note) else {
            debug!(note, "Ignoring unmapped MIDI note.");
            return false;
        };
        if velocity == 0 {
            // Running-status note-off.
            return false;
        }

        let data = if velocity > MIDI_VEL_SOFT {
            STROBE_LOUD
        } else {
            STROBE_SOFT
        };

        match arbiter.transaction() {
            Ok(mut txn) => {
                txn.strobe(voice.strobe(), data);
                true
            }
            Err(e) => {
                self.errors += 1;
                warn!(err = %e, note, "Bus unavailable for drum strobe, hit dropped.");
                false
            }
        }
    }
}

#[cfg(test)]
pub mod test {
    pub use super::MockPadPort;

    use crate::bus::test::{pair, HostHandle};

    use super::*;

    fn setup() -> (TriggerPipeline, MockPadPort, Arbiter, HostHandle) {
        let (pins, host) = pair();
        let arbiter = Arbiter::new(Box::new(pins), Duration::from_millis(50));
        let pad = MockPadPort::default();
        let pipeline = TriggerPipeline::new(Box::new(pad.clone()), arbiter.trigger_gate());
        (pipeline, pad, arbiter, host)
    }

    #[test]
    fn test_note_map_covers_13_notes_onto_10_voices() {
        // Every note in the documented range maps, and nothing outside does.
        for note in MIDI_NOTE_BASS..=MIDI_NOTE_CLAVE {
            assert!(voice_for_note(note).is_some(), "note {} unmapped", note);
        }
        assert_eq!(None, voice_for_note(MIDI_NOTE_BASS - 1));
        assert_eq!(None, voice_for_note(MIDI_NOTE_CLAVE + 1));

        // The canonical note for each voice maps back to that voice.
        for voice in Voice::ALL {
            assert_eq!(Some(voice), voice_for_note(note_for_voice(voice)));
        }
    }

    #[test]
    fn test_outbound_note_pulses_exactly_one_strobe() {
        let (mut pipeline, _pad, mut arbiter, host) = setup();

        for note in MIDI_NOTE_BASS..=MIDI_NOTE_CLAVE {
            let voice = voice_for_note(note).expect("note must map");
            let before: Vec<u32> = (0..10).map(|v| host.strobe_count(v)).collect();

            assert!(pipeline.play_note(&mut arbiter, note, MIDI_VEL_LOUD));

            for v in 0..10 {
                let expected = before[v] + u32::from(v == voice.index());
                assert_eq!(expected, host.strobe_count(v), "note {} voice {}", note, v);
            }
        }
    }

    #[test]
    fn test_outbound_drops_unmapped_and_note_off() {
        let (mut pipeline, _pad, mut arbiter, host) = setup();

        assert!(!pipeline.play_note(&mut arbiter, 35, MIDI_VEL_LOUD));
        assert!(!pipeline.play_note(&mut arbiter, 49, MIDI_VEL_LOUD));
        // Velocity zero is a note-off in disguise.
        assert!(!pipeline.play_note(&mut arbiter, MIDI_NOTE_BASS, 0));

        assert_eq!(0, (0..10).map(|v| host.strobe_count(v)).sum::<u32>());
        // Unmapped input is not an error.
        assert_eq!(0, pipeline.error_count());
    }

    #[test]
    fn test_inbound_hit_enqueues_note_on_then_off() {
        let (mut pipeline, pad, _arbiter, _host) = setup();
        let events = pipeline.events();

        pad.set_status(1 << Voice::Bass.index() | 1 << Voice::Clave.index());
        pipeline.service_interrupt();

        assert_eq!(
            TriggerEvent::NoteOn {
                note: 36,
                velocity: MIDI_VEL_LOUD
            },
            events.try_recv().expect("expected note on")
        );
        assert_eq!(
            TriggerEvent::NoteOff { note: 36 },
            events.try_recv().expect("expected note off")
        );
        assert_eq!(
            TriggerEvent::NoteOn {
                note: 48,
                velocity: MIDI_VEL_LOUD
            },
            events.try_recv().expect("expected note on")
        );
        assert_eq!(
            TriggerEvent::NoteOff { note: 48 },
            events.try_recv().expect("expected note off")
        );
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_inbound_defers_during_bus_handover() {
        let (mut pipeline, pad, mut arbiter, _host) = setup();
        let events = pipeline.events();
        pad.set_status(1);

        arbiter.acquire().expect("acquire failed");
        pipeline.service_interrupt();
        assert_eq!(1, pipeline.deferred_count());
        assert!(events.try_recv().is_err());

        arbiter.release().expect("release failed");
        pipeline.service_interrupt();
        assert!(events.try_recv().is_ok());
    }

    #[test]
    fn test_inbound_read_failure_counts_and_drops() {
        let (mut pipeline, pad, _arbiter, _host) = setup();
        let events = pipeline.events();

        pad.set_failing(true);
        pipeline.service_interrupt();
        assert_eq!(1, pipeline.error_count());
        assert!(events.try_recv().is_err());
    }
}
