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

//! Bus mastership arbitration.
//!
//! Exactly one of the host CPU and the bridge owns the bus at any instant.
//! Address/data pins are driven as outputs only while the bridge owns it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{BusError, Pins, Transaction};

/// How often the acknowledge line is polled while a request is pending.
const ACK_POLL_INTERVAL: Duration = Duration::from_micros(10);

/// Bus ownership state. Mutated only by the arbiter; everyone else reads
/// snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    HostOwns,
    Requesting,
    McuOwns,
    Releasing,
}

/// A flag shared with interrupt-context bus readers (the trigger pipeline's
/// expedited pad-status read). The arbiter holds it for the full duration of
/// an ownership transfer so that no interrupt-side read can observe the bus
/// mid-handover.
#[derive(Clone, Default)]
pub struct TriggerGate {
    held: Arc<AtomicBool>,
}

impl TriggerGate {
    pub fn new() -> TriggerGate {
        TriggerGate::default()
    }

    /// Returns true while a full bus-ownership hold is in progress.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    fn hold(&self) {
        self.held.store(true, Ordering::Release);
    }

    fn release(&self) {
        self.held.store(false, Ordering::Release);
    }
}

/// Owns the request/acknowledge handshake that transfers bus mastership
/// between the host CPU and the bridge.
pub struct Arbiter {
    pub(super) pins: Box<dyn Pins>,
    ownership: Ownership,
    acquire_timeout: Duration,
    trigger_gate: TriggerGate,
    host_in_reset: bool,
    /// Count of completed bus write cycles, for callers that need to verify
    /// an operation performed no writes.
    pub(super) writes: u64,
    /// Parking spot for the LED_SET_2 shadow while the bridge is playing
    /// with the register.
    pub(super) saved_led_set_2: Option<u8>,
}

impl Arbiter {
    /// Creates an arbiter over the given pins. The host starts out owning
    /// the bus.
    pub fn new(pins: Box<dyn Pins>, acquire_timeout: Duration) -> Arbiter {
        Arbiter {
            pins,
            ownership: Ownership::HostOwns,
            acquire_timeout,
            trigger_gate: TriggerGate::new(),
            host_in_reset: false,
            writes: 0,
            saved_led_set_2: None,
        }
    }

    /// Returns a snapshot of the current ownership state.
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Returns a clone of the gate interrupt-context readers must check.
    pub fn trigger_gate(&self) -> TriggerGate {
        self.trigger_gate.clone()
    }

    /// Returns the number of completed bus write cycles.
    pub fn bus_writes(&self) -> u64 {
        self.writes
    }

    /// Requests bus mastership from the host CPU. On success the address
    /// lines are driven and bus cycles may be issued. Fails with
    /// [`BusError::AlreadyOwned`] (without side effects) if the bridge
    /// already owns the bus, and with [`BusError::AcquireTimeout`] if the
    /// host does not acknowledge in time.
    pub fn acquire(&mut self) -> Result<(), BusError> {
        match self.ownership {
            Ownership::HostOwns => {}
            _ => return Err(BusError::AlreadyOwned),
        }

        // No interrupt-side reads while the bus changes hands.
        self.trigger_gate.hold();
        self.ownership = Ownership::Requesting;
        self.pins.set_bus_request(true);

        let deadline = Instant::now() + self.acquire_timeout;
        while !self.pins.bus_ack() {
            if Instant::now() >= deadline {
                self.pins.set_bus_request(false);
                self.ownership = Ownership::HostOwns;
                self.trigger_gate.release();
                warn!(timeout = ?self.acquire_timeout, "Host CPU did not acknowledge bus request.");
                return Err(BusError::AcquireTimeout(self.acquire_timeout));
            }
            spin_sleep::sleep(ACK_POLL_INTERVAL);
        }

        // Data lines stay floating until a write cycle needs them.
        self.pins.drive_addr(true);
        self.ownership = Ownership::McuOwns;
        debug!("Bus acquired.");
        Ok(())
    }

    /// Releases bus mastership back to the host CPU. Must be called exactly
    /// once for every successful [`Arbiter::acquire`].
    pub fn release(&mut self) -> Result<(), BusError> {
        if self.ownership != Ownership::McuOwns {
            return Err(BusError::NotOwned);
        }

        self.ownership = Ownership::Releasing;
        self.pins.drive_data(false);
        self.pins.drive_addr(false);
        self.pins.set_bus_request(false);
        self.ownership = Ownership::HostOwns;
        self.trigger_gate.release();
        debug!("Bus released.");
        Ok(())
    }

    /// Acquires the bus and returns a transaction guard that releases it on
    /// drop.
    pub fn transaction(&mut self) -> Result<Transaction<'_>, BusError> {
        self.acquire()?;
        Ok(Transaction::new(self))
    }

    /// Holds the host CPU in reset or lets it run. Reset is a dedicated
    /// line, not a bus cycle, so no ownership is required.
    pub fn set_host_reset(&mut self, in_reset: bool) {
        self.host_in_reset = in_reset;
        self.pins.set_host_reset(in_reset);
    }

    /// Returns true while the host CPU is held in reset.
    pub fn host_in_reset(&self) -> bool {
        self.host_in_reset
    }
}

#[cfg(test)]
mod test {
    use super::super::test::pair;
    use super::*;

    fn arbiter() -> Arbiter {
        let (pins, _) = pair();
        Arbiter::new(Box::new(pins), Duration::from_millis(50))
    }

    #[test]
    fn test_acquire_release_pairing() {
        let mut arbiter = arbiter();
        assert_eq!(Ownership::HostOwns, arbiter.ownership());

        arbiter.acquire().expect("acquire failed");
        assert_eq!(Ownership::McuOwns, arbiter.ownership());

        // A second acquire while owning is a programming error and must not
        // disturb the current ownership.
        assert!(matches!(arbiter.acquire(), Err(BusError::AlreadyOwned)));
        assert_eq!(Ownership::McuOwns, arbiter.ownership());

        arbiter.release().expect("release failed");
        assert_eq!(Ownership::HostOwns, arbiter.ownership());

        // Release without ownership is rejected too.
        assert!(matches!(arbiter.release(), Err(BusError::NotOwned)));
    }

    #[test]
    fn test_acquire_timeout() {
        let (pins, host) = pair();
        host.set_ack_enabled(false);
        let mut arbiter = Arbiter::new(Box::new(pins), Duration::from_millis(5));

        assert!(matches!(
            arbiter.acquire(),
            Err(BusError::AcquireTimeout(_))
        ));
        assert_eq!(Ownership::HostOwns, arbiter.ownership());
        // The request line must not be left asserted after a failed acquire.
        assert!(!host.bus_request_asserted());
    }

    #[test]
    fn test_trigger_gate_tracks_ownership() {
        let mut arbiter = arbiter();
        let gate = arbiter.trigger_gate();

        assert!(!gate.is_held());
        arbiter.acquire().expect("acquire failed");
        assert!(gate.is_held());
        arbiter.release().expect("release failed");
        assert!(!gate.is_held());
    }

    #[test]
    fn test_transaction_releases_on_drop() {
        let mut arbiter = arbiter();
        {
            let _txn = arbiter.transaction().expect("transaction failed");
        }
        assert_eq!(Ownership::HostOwns, arbiter.ownership());
    }

    #[test]
    fn test_host_reset_line() {
        let (pins, host) = pair();
        let mut arbiter = Arbiter::new(Box::new(pins), Duration::from_millis(50));

        arbiter.set_host_reset(true);
        assert!(arbiter.host_in_reset());
        assert!(host.host_in_reset());
        arbiter.set_host_reset(false);
        assert!(!host.host_in_reset());
    }
}
