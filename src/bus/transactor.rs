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

//! Bus cycle sequencing.
//!
//! A [`Transaction`] is handed out by the arbiter once the bridge owns the
//! bus, and releases the bus when dropped. There is no hardware burst mode;
//! a block copy is one fully sequenced cycle per byte.

use std::time::Duration;

use tracing::debug;

use crate::hostmap::{
    self, InputJacks, LedSet2, INPUT_JACKS, LED_SET_2, LED_SET_2_SHADOW, LINK_DISPLAY,
    PATT_DISPLAY, RAM_BASE, RAM_LEN, ROM_BASE, ROM_LEN,
};

use super::Arbiter;

/// Minimum strobe pulse width, derived from the host CPU's timing spec.
const STROBE_PULSE: Duration = Duration::from_micros(1);

/// A live bus transaction. All cycles are synchronous and blocking; nothing
/// may alter pin direction mid-cycle.
pub struct Transaction<'a> {
    arbiter: &'a mut Arbiter,
}

impl<'a> Transaction<'a> {
    pub(super) fn new(arbiter: &'a mut Arbiter) -> Transaction<'a> {
        Transaction { arbiter }
    }

    /// Performs one write cycle: drive address, settle, drive data, assert
    /// the write strobe for the minimum pulse width, deassert, float data.
    pub fn write(&mut self, addr: u16, data: u8) {
        let pins = &mut self.arbiter.pins;
        pins.set_addr(addr);
        pins.settle();
        pins.drive_data(true);
        pins.set_data(data);
        pins.set_mreq(true);
        pins.set_wr(true);
        spin_sleep::sleep(STROBE_PULSE);
        pins.set_wr(false);
        pins.set_mreq(false);
        pins.drive_data(false);
        self.arbiter.writes += 1;
    }

    /// Performs one read cycle. Data lines are never driven.
    pub fn read(&mut self, addr: u16) -> u8 {
        let pins = &mut self.arbiter.pins;
        pins.set_addr(addr);
        pins.settle();
        pins.set_mreq(true);
        pins.set_rd(true);
        pins.settle();
        let data = pins.data();
        pins.set_rd(false);
        pins.set_mreq(false);
        data
    }

    /// Copies a buffer to a contiguous host address range, one cycle per
    /// byte.
    pub fn copy_to_host(&mut self, addr: u16, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.write(addr.wrapping_add(i as u16), *byte);
        }
    }

    /// Copies a contiguous host address range into a new buffer.
    pub fn copy_from_host(&mut self, addr: u16, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| self.read(addr.wrapping_add(i as u16)))
            .collect()
    }

    /// A strobe is a momentary write to a fixed address that triggers a
    /// physical event (drum hit, size-class latch in load mode).
    pub fn strobe(&mut self, addr: u16, data: u8) {
        self.write(addr, data);
    }

    /// Selects the voice-board addressing mode.
    pub fn set_load_mode(&mut self, load: bool) {
        self.arbiter.pins.set_load_mode(load);
    }

    /// Pulses the hi-hat address counter reset line.
    pub fn pulse_hihat_reset(&mut self) {
        self.arbiter.pins.pulse_hihat_reset();
    }

    /// Reads the input jack status register.
    pub fn input_jacks(&mut self) -> InputJacks {
        InputJacks::from_bits_retain(self.read(INPUT_JACKS))
    }

    /// Reads the host RAM shadow of the write-only LED_SET_2 register.
    pub fn led_set_2(&mut self) -> LedSet2 {
        LedSet2::from_bits_retain(self.read(LED_SET_2_SHADOW))
    }

    /// Writes LED_SET_2 and keeps the host's RAM shadow coherent.
    pub fn write_led_set_2(&mut self, value: LedSet2) {
        self.write(LED_SET_2, value.bits());
        self.write(LED_SET_2_SHADOW, value.bits());
    }

    /// Sets bits in LED_SET_2 through the shadow.
    pub fn set_led_set_2(&mut self, bits: LedSet2) {
        let value = self.led_set_2() | bits;
        self.write_led_set_2(value);
    }

    /// Clears bits in LED_SET_2 through the shadow.
    pub fn clear_led_set_2(&mut self, bits: LedSet2) {
        let value = self.led_set_2() - bits;
        self.write_led_set_2(value);
    }

    /// Parks the current LED_SET_2 shadow so the register can be restored
    /// after the bridge is done playing with it.
    pub fn save_led_set_2(&mut self) {
        let value = self.read(LED_SET_2_SHADOW);
        self.arbiter.saved_led_set_2 = Some(value);
    }

    /// Restores the LED_SET_2 value parked by [`Transaction::save_led_set_2`].
    pub fn restore_led_set_2(&mut self) {
        if let Some(value) = self.arbiter.saved_led_set_2.take() {
            self.write_led_set_2(LedSet2::from_bits_retain(value));
        }
    }

    /// Shows a 0-99 value on the pattern display.
    pub fn show_pattern(&mut self, value: u8) {
        self.write(PATT_DISPLAY, hostmap::to_bcd(value));
    }

    /// Shows a 0-99 value on the link display.
    pub fn show_link(&mut self, value: u8) {
        self.write(LINK_DISPLAY, hostmap::to_bcd(value));
    }

    /// Copies a ROM image into the host's ROM window. The host CPU should be
    /// held in reset while its ROM changes underneath it.
    pub fn load_rom(&mut self, image: &[u8]) {
        let len = image.len().min(ROM_LEN);
        debug!(len, "Loading host ROM image.");
        self.copy_to_host(ROM_BASE, &image[..len]);
    }

    /// Copies an image into the host's pattern RAM window.
    pub fn load_ram(&mut self, image: &[u8]) {
        let len = image.len().min(RAM_LEN);
        debug!(len, "Loading host RAM image.");
        self.copy_to_host(RAM_BASE, &image[..len]);
    }

    /// Snapshots the host's pattern RAM window.
    pub fn dump_ram(&mut self) -> Vec<u8> {
        self.copy_from_host(RAM_BASE, RAM_LEN)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        // The guard exists only while ownership is held, so this cannot fail.
        let _ = self.arbiter.release();
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::bus::test::pair;
    use crate::bus::Arbiter;
    use crate::hostmap::{
        InputJacks, LedSet2, INPUT_JACKS, LED_SET_2, LED_SET_2_SHADOW, PATT_DISPLAY, RAM_BASE,
    };

    fn arbiter() -> (Arbiter, crate::bus::test::HostHandle) {
        let (pins, host) = pair();
        (Arbiter::new(Box::new(pins), Duration::from_millis(50)), host)
    }

    #[test]
    fn test_single_byte_cycles() {
        let (mut arbiter, host) = arbiter();
        let mut txn = arbiter.transaction().expect("transaction failed");

        txn.write(0xa100, 0x5a);
        assert_eq!(0x5a, txn.read(0xa100));
        drop(txn);

        assert_eq!(0x5a, host.memory(0xa100));
        assert_eq!(1, arbiter.bus_writes());
    }

    #[test]
    fn test_block_copy_round_trip() {
        let (mut arbiter, _host) = arbiter();
        let mut txn = arbiter.transaction().expect("transaction failed");

        let data: Vec<u8> = (0..64).map(|i| i as u8 ^ 0xa5).collect();
        txn.copy_to_host(RAM_BASE, &data);
        assert_eq!(data, txn.copy_from_host(RAM_BASE, data.len()));
    }

    #[test]
    fn test_led_shadow_stays_coherent() {
        let (mut arbiter, host) = arbiter();
        let mut txn = arbiter.transaction().expect("transaction failed");

        txn.write_led_set_2(LedSet2::LED_STORE | LedSet2::DRUM_DO_ENABLE);
        txn.set_led_set_2(LedSet2::LED_PLAY_STOP);
        txn.clear_led_set_2(LedSet2::LED_STORE);

        let expected = (LedSet2::LED_PLAY_STOP | LedSet2::DRUM_DO_ENABLE).bits();
        assert_eq!(expected, txn.led_set_2().bits());
        drop(txn);
        assert_eq!(expected, host.memory(LED_SET_2));
        assert_eq!(expected, host.memory(LED_SET_2_SHADOW));
    }

    #[test]
    fn test_save_restore_led_set_2() {
        let (mut arbiter, host) = arbiter();
        let mut txn = arbiter.transaction().expect("transaction failed");

        txn.write_led_set_2(LedSet2::LED_VERIFY);
        txn.save_led_set_2();
        txn.write_led_set_2(LedSet2::BEEP_OUT | LedSet2::LED_LOAD);
        txn.restore_led_set_2();
        drop(txn);

        assert_eq!(LedSet2::LED_VERIFY.bits(), host.memory(LED_SET_2));
    }

    #[test]
    fn test_input_jack_read() {
        let (mut arbiter, host) = arbiter();
        host.set_memory(INPUT_JACKS, (InputJacks::TAPE_FSK | InputJacks::FOOTSWITCH).bits());

        let mut txn = arbiter.transaction().expect("transaction failed");
        let jacks = txn.input_jacks();
        assert!(jacks.contains(InputJacks::TAPE_FSK));
        assert!(!jacks.contains(InputJacks::TEMPO_CLK));
    }

    #[test]
    fn test_bcd_display_write() {
        let (mut arbiter, host) = arbiter();
        let mut txn = arbiter.transaction().expect("transaction failed");
        txn.show_pattern(42);
        drop(txn);
        assert_eq!(0x42, host.memory(PATT_DISPLAY));
    }
}
