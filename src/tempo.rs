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

//! Tempo clock synchronization.
//!
//! Reconciles three clock domains - the host's internal tempo oscillator,
//! the tape FSK clock, and MIDI realtime - into one transport state and one
//! derived output pulse stream. Whichever source is currently producing
//! edges is authoritative.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

/// If this long passes without an edge from the selected external source,
/// the transport stops and the no-clock flag is raised for display.
pub const NO_CLOCK_TIMEOUT: Duration = Duration::from_millis(500);

/// MIDI clock resolution.
pub const PULSES_PER_QUARTER: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    Internal,
    TapeFsk,
    Midi,
}

/// The tempo clock synchronizer. Edge handlers run in interrupt context in
/// spirit: they only flip flags and timestamps, and pulse emission is left
/// to the mainline consumer of the pending-send flag.
pub struct TempoSync {
    transport: Transport,
    source: ClockSource,
    last_edge: Option<Instant>,
    no_clock: bool,
    pulse_count: u32,
    /// Set by edge handlers when a MIDI Clock byte should go out; consumed
    /// by the MIDI-out path. The single piece of cross-context state.
    pending_clock: Arc<AtomicBool>,
    honor_start_stop: bool,
    echo_clock: bool,
}

impl Default for TempoSync {
    fn default() -> TempoSync {
        TempoSync::new()
    }
}

impl TempoSync {
    pub fn new() -> TempoSync {
        TempoSync {
            transport: Transport::Stopped,
            source: ClockSource::Internal,
            last_edge: None,
            no_clock: false,
            pulse_count: 0,
            pending_clock: Arc::new(AtomicBool::new(false)),
            honor_start_stop: true,
            echo_clock: true,
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn is_running(&self) -> bool {
        self.transport == Transport::Running
    }

    pub fn source(&self) -> ClockSource {
        self.source
    }

    /// True when the selected external source has gone quiet. Surfaced as
    /// state for display, recoverable the instant a new edge arrives.
    pub fn no_clock(&self) -> bool {
        self.no_clock
    }

    /// The 24 PPQN pulse counter since the last Start.
    pub fn pulse_count(&self) -> u32 {
        self.pulse_count
    }

    /// Time since the last received clock edge.
    pub fn since_last_edge(&self, now: Instant) -> Option<Duration> {
        self.last_edge.map(|edge| now.duration_since(edge))
    }

    /// Controls whether MIDI Start/Stop/Continue move the transport.
    pub fn set_honor_start_stop(&mut self, honor: bool) {
        self.honor_start_stop = honor;
    }

    pub fn honor_start_stop(&self) -> bool {
        self.honor_start_stop
    }

    /// Controls whether external source edges generate outgoing MIDI clock.
    pub fn set_echo_clock(&mut self, echo: bool) {
        self.echo_clock = echo;
    }

    /// A shared handle to the pending-send flag, for producers that live in
    /// interrupt context.
    pub fn pending_clock_handle(&self) -> Arc<AtomicBool> {
        self.pending_clock.clone()
    }

    /// Consumes the pending-send flag. Called by the MIDI-out path on every
    /// mainline iteration.
    pub fn take_pending_clock(&self) -> bool {
        self.pending_clock.swap(false, Ordering::AcqRel)
    }

    /// Handles a decoded tape FSK edge. The first edge starts the song.
    pub fn on_fsk_edge(&mut self, now: Instant) {
        if self.source != ClockSource::TapeFsk {
            debug!("Tape FSK clock is now authoritative.");
        }
        self.source = ClockSource::TapeFsk;
        self.last_edge = Some(now);
        self.no_clock = false;
        if self.transport == Transport::Stopped {
            info!("Tape FSK clock detected, transport running.");
            self.transport = Transport::Running;
        }
        if self.echo_clock {
            self.pending_clock.store(true, Ordering::Release);
        }
    }

    /// Handles an edge from the host's internal tempo oscillator. Internal
    /// edges generate output pulses only while no external source is live.
    pub fn on_internal_tick(&mut self, now: Instant) {
        if self.external_live() {
            return;
        }
        self.source = ClockSource::Internal;
        self.last_edge = Some(now);
        if self.echo_clock {
            self.pending_clock.store(true, Ordering::Release);
        }
    }

    /// Handles an incoming MIDI Clock tick.
    pub fn on_midi_clock(&mut self, now: Instant) {
        self.source = ClockSource::Midi;
        self.last_edge = Some(now);
        self.no_clock = false;
        if self.transport == Transport::Running {
            self.pulse_count += 1;
        }
    }

    /// MIDI Start: reset position and run.
    pub fn on_midi_start(&mut self, now: Instant) {
        if !self.honor_start_stop {
            return;
        }
        info!("MIDI Start.");
        self.source = ClockSource::Midi;
        self.last_edge = Some(now);
        self.no_clock = false;
        self.pulse_count = 0;
        self.transport = Transport::Running;
    }

    /// MIDI Continue: run without resetting position.
    pub fn on_midi_continue(&mut self, now: Instant) {
        if !self.honor_start_stop {
            return;
        }
        info!("MIDI Continue.");
        self.source = ClockSource::Midi;
        self.last_edge = Some(now);
        self.no_clock = false;
        self.transport = Transport::Running;
    }

    /// MIDI Stop.
    pub fn on_midi_stop(&mut self) {
        if !self.honor_start_stop {
            return;
        }
        info!("MIDI Stop.");
        self.transport = Transport::Stopped;
    }

    /// Transport control for the internal source (host play/stop).
    pub fn set_transport(&mut self, transport: Transport) {
        self.transport = transport;
    }

    /// Watchdog, called on every mainline iteration: stops the transport and
    /// raises the no-clock flag when the selected external source has been
    /// quiet for [`NO_CLOCK_TIMEOUT`].
    pub fn poll(&mut self, now: Instant) {
        if self.source == ClockSource::Internal {
            return;
        }
        let Some(last_edge) = self.last_edge else {
            return;
        };
        if now.duration_since(last_edge) > NO_CLOCK_TIMEOUT && !self.no_clock {
            info!(source = ?self.source, "Tempo clock lost, transport stopped.");
            self.no_clock = true;
            self.transport = Transport::Stopped;
        }
    }

    /// Pulls the elapsed-edge timer back to now without a transition. Called
    /// after the synchronizer has been starved of scheduling time (a long
    /// bus-ownership hold) so the gap is not misread as clock loss.
    pub fn reset_clock_check(&mut self, now: Instant) {
        if self.last_edge.is_some() {
            self.last_edge = Some(now);
        }
    }

    fn external_live(&self) -> bool {
        self.source != ClockSource::Internal && !self.no_clock
    }
}
