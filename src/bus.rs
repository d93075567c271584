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

//! Host bus control.
//!
//! The bridge shares an 8-bit address/data bus with the host CPU. Mastership
//! is transferred through a request/acknowledge handshake ([`Arbiter`]) and
//! individual bus cycles are sequenced by [`Transaction`]. The raw pin
//! interface is behind the [`Pins`] trait so that a hardware port and the
//! simulated host can be swapped without touching the engine.

use std::error::Error;
use std::time::Duration;

mod arbiter;
mod mock;
mod transactor;

pub use arbiter::{Arbiter, Ownership, TriggerGate};
pub use transactor::Transaction;

/// The raw pin interface to the host bus.
///
/// Implementations drive real GPIO on hardware ports; [`mock`] simulates the
/// host side of the bus for tests and for running without hardware.
pub trait Pins: Send {
    /// Drives the address lines. Only meaningful while the address bus
    /// direction is output.
    fn set_addr(&mut self, addr: u16);

    /// Switches the address lines between output (true) and floating.
    fn drive_addr(&mut self, drive: bool);

    /// Drives the data lines. Only meaningful while the data bus direction
    /// is output.
    fn set_data(&mut self, data: u8);

    /// Reads the data lines.
    fn data(&self) -> u8;

    /// Switches the data lines between output (true) and floating.
    fn drive_data(&mut self, drive: bool);

    /// Asserts or deasserts the bus request line to the host CPU.
    fn set_bus_request(&mut self, active: bool);

    /// Samples the bus acknowledge line from the host CPU.
    fn bus_ack(&self) -> bool;

    /// Asserts or deasserts the memory request strobe.
    fn set_mreq(&mut self, active: bool);

    /// Asserts or deasserts the read strobe.
    fn set_rd(&mut self, active: bool);

    /// Asserts or deasserts the write strobe.
    fn set_wr(&mut self, active: bool);

    /// Holds the host CPU in reset (true) or lets it run.
    fn set_host_reset(&mut self, active: bool);

    /// Selects the voice-board addressing mode: load (true) maps the selected
    /// voice's sample SRAM onto the bus, play (false) restores normal
    /// triggering.
    fn set_load_mode(&mut self, load: bool);

    /// Pulses the hi-hat address counter reset line.
    fn pulse_hihat_reset(&mut self);

    /// Waits one bus settle delay.
    fn settle(&self);
}

/// Errors for bus arbitration and cycle sequencing.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The host CPU did not acknowledge the bus request in time. A stuck or
    /// absent host is an operator-visible hardware fault; the operation is
    /// reported upward and never retried automatically.
    #[error("bus acknowledge did not arrive within {0:?}")]
    AcquireTimeout(Duration),

    /// A second acquire while the bridge already owns the bus. This is a
    /// programming error, not a contention case.
    #[error("bus is already owned by the bridge")]
    AlreadyOwned,

    /// A release or transaction without ownership.
    #[error("bus is not owned by the bridge")]
    NotOwned,
}

/// Gets the pins for the named bus device.
pub fn get_pins(name: &str) -> Result<Box<dyn Pins>, Box<dyn Error>> {
    if name.starts_with("mock") {
        let (pins, _) = mock::pair();
        return Ok(Box::new(pins));
    }

    Err(format!("no bus device available with name {}", name).into())
}

#[cfg(test)]
pub mod test {
    pub use super::mock::{pair, HostHandle, MockPins};
}
