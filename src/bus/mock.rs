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

//! A simulated host side of the bus.
//!
//! Models the host CPU's 64K address space, the BUSRQ/BUSAK handshake, the
//! drum strobe latches, and the voice-board sample SRAM with its per-voice
//! address-counter wrap. Used by the test suite and when the configured bus
//! device is `mock`.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::hostmap::{LedSet2, KB_ROWS, LED_SET_2, STB_BASE, STB_CLICK};

/// The voice boards decode bus addresses below this in load mode.
const VOICE_WINDOW: u16 = 0x8000;

/// The largest per-voice sample SRAM.
const VOICE_SRAM_LEN: usize = 32 * 1024;

struct HostState {
    mem: Vec<u8>,
    // Handshake.
    bus_request: bool,
    ack_enabled: bool,
    ack_delay_polls: u32,
    polls: u32,
    host_reset: bool,
    // Pin latches.
    addr: u16,
    data: u8,
    // Voice board.
    load_mode: bool,
    selected_voice: Option<usize>,
    voice_len: [usize; 10],
    voice_sram: Vec<Vec<u8>>,
    strobes: [u32; 10],
    click_strobes: u32,
    hihat_resets: u32,
    // Inputs and counters.
    key_rows: [u8; 6],
    write_count: u64,
}

impl HostState {
    fn new() -> HostState {
        HostState {
            mem: vec![0; 0x10000],
            bus_request: false,
            ack_enabled: true,
            ack_delay_polls: 2,
            polls: 0,
            host_reset: false,
            addr: 0,
            data: 0,
            load_mode: false,
            selected_voice: None,
            voice_len: [VOICE_SRAM_LEN; 10],
            voice_sram: vec![vec![0; VOICE_SRAM_LEN]; 10],
            strobes: [0; 10],
            click_strobes: 0,
            hihat_resets: 0,
            key_rows: [0; 6],
            write_count: 0,
        }
    }

    fn drums_enabled(&self) -> bool {
        // DRUM_DO_ENABLE is active low: bit clear passes D[2:0] through to
        // the drum generators.
        !LedSet2::from_bits_retain(self.mem[LED_SET_2 as usize]).contains(LedSet2::DRUM_DO_ENABLE)
    }

    fn commit_write(&mut self) {
        let (addr, data) = (self.addr, self.data);
        self.write_count += 1;

        if (STB_BASE..STB_BASE + 10).contains(&addr) {
            let voice = (addr - STB_BASE) as usize;
            self.selected_voice = Some(voice);
            if self.load_mode {
                // In load mode the strobe write latches the size class,
                // which is also the address-counter wrap point.
                self.voice_len[voice] = match data & 0x03 {
                    0x00 => 2 * 1024,
                    0x01 => 4 * 1024,
                    0x02 => 8 * 1024,
                    _ => 32 * 1024,
                };
            } else if self.drums_enabled() {
                self.strobes[voice] += 1;
            }
            return;
        }

        if addr == STB_CLICK {
            self.click_strobes += 1;
            return;
        }

        if self.load_mode && addr < VOICE_WINDOW {
            if let Some(voice) = self.selected_voice {
                let len = self.voice_len[voice];
                self.voice_sram[voice][addr as usize % len] = data;
                return;
            }
        }

        self.mem[addr as usize] = data;
    }

    fn commit_read(&mut self) {
        let addr = self.addr;

        if let Some(row) = KB_ROWS.iter().position(|a| *a == addr) {
            self.data = self.key_rows[row];
            return;
        }

        if self.load_mode && addr < VOICE_WINDOW {
            if let Some(voice) = self.selected_voice {
                let len = self.voice_len[voice];
                self.data = self.voice_sram[voice][addr as usize % len];
                return;
            }
        }

        self.data = self.mem[addr as usize];
    }
}

/// The pin side of the simulated host. Implements [`super::Pins`].
pub struct MockPins {
    state: Arc<Mutex<HostState>>,
}

/// An inspection handle onto the simulated host, shared with the pins.
#[derive(Clone)]
pub struct HostHandle {
    state: Arc<Mutex<HostState>>,
}

/// Creates a simulated host and returns its pin side and inspection handle.
pub fn pair() -> (MockPins, HostHandle) {
    let state = Arc::new(Mutex::new(HostState::new()));
    (
        MockPins {
            state: state.clone(),
        },
        HostHandle { state },
    )
}

impl super::Pins for MockPins {
    fn set_addr(&mut self, addr: u16) {
        self.state.lock().addr = addr;
    }

    fn drive_addr(&mut self, _drive: bool) {}

    fn set_data(&mut self, data: u8) {
        self.state.lock().data = data;
    }

    fn data(&self) -> u8 {
        self.state.lock().data
    }

    fn drive_data(&mut self, _drive: bool) {}

    fn set_bus_request(&mut self, active: bool) {
        let mut state = self.state.lock();
        state.bus_request = active;
        if !active {
            state.polls = 0;
        }
    }

    fn bus_ack(&self) -> bool {
        let mut state = self.state.lock();
        if !state.bus_request || !state.ack_enabled {
            return false;
        }
        state.polls += 1;
        state.polls > state.ack_delay_polls
    }

    fn set_mreq(&mut self, _active: bool) {}

    fn set_rd(&mut self, active: bool) {
        if active {
            self.state.lock().commit_read();
        }
    }

    fn set_wr(&mut self, active: bool) {
        if active {
            self.state.lock().commit_write();
        }
    }

    fn set_host_reset(&mut self, active: bool) {
        self.state.lock().host_reset = active;
    }

    fn set_load_mode(&mut self, load: bool) {
        self.state.lock().load_mode = load;
    }

    fn pulse_hihat_reset(&mut self) {
        self.state.lock().hihat_resets += 1;
    }

    fn settle(&self) {}
}

impl HostHandle {
    /// Reads a byte of simulated host memory.
    pub fn memory(&self, addr: u16) -> u8 {
        self.state.lock().mem[addr as usize]
    }

    /// Writes a byte of simulated host memory directly, bypassing the bus.
    pub fn set_memory(&self, addr: u16, data: u8) {
        self.state.lock().mem[addr as usize] = data;
    }

    /// Returns the number of strobe pulses delivered to the given voice.
    pub fn strobe_count(&self, voice: usize) -> u32 {
        self.state.lock().strobes[voice]
    }

    /// Returns the number of click strobe pulses.
    pub fn click_count(&self) -> u32 {
        self.state.lock().click_strobes
    }

    /// Returns the number of hi-hat address counter resets.
    pub fn hihat_resets(&self) -> u32 {
        self.state.lock().hihat_resets
    }

    /// Sets the raw bits read back for a keyboard matrix row.
    pub fn set_key_row(&self, row: usize, bits: u8) {
        self.state.lock().key_rows[row] = bits;
    }

    /// Controls whether the host acknowledges bus requests at all.
    pub fn set_ack_enabled(&self, enabled: bool) {
        self.state.lock().ack_enabled = enabled;
    }

    /// Returns true while the request line is asserted.
    pub fn bus_request_asserted(&self) -> bool {
        self.state.lock().bus_request
    }

    /// Returns true while the host CPU is held in reset.
    pub fn host_in_reset(&self) -> bool {
        self.state.lock().host_reset
    }

    /// Returns a copy of a voice's sample SRAM, truncated to its configured
    /// window length.
    pub fn voice_sram(&self, voice: usize) -> Vec<u8> {
        let state = self.state.lock();
        state.voice_sram[voice][..state.voice_len[voice]].to_vec()
    }

    /// Returns a voice's configured window length.
    pub fn voice_window_len(&self, voice: usize) -> usize {
        self.state.lock().voice_len[voice]
    }

    /// Returns the total number of committed bus write cycles.
    pub fn write_count(&self) -> u64 {
        self.state.lock().write_count
    }
}
