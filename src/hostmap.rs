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

//! The host CPU's memory map.
//!
//! Every register the bridge touches lives at a fixed 16-bit address on the
//! host bus. The map is not configurable; it describes one machine.

use bitflags::bitflags;

/// Pattern number display, two BCD digits.
pub const PATT_DISPLAY: u16 = 0xd800;
/// Link number display, two BCD digits.
pub const LINK_DISPLAY: u16 = 0xd801;

/// The primary LED/control register. Write-only on the host; a shadow of the
/// last written value is kept in host RAM at [`LED_SET_2_SHADOW`].
pub const LED_SET_2: u16 = 0xd802;

/// Host RAM shadow of the write-only LED_SET_2 register. Maintained by the
/// host ROM (v3.1); other ROM revisions may place it elsewhere.
pub const LED_SET_2_SHADOW: u16 = 0xa016;

/// Input jack status register.
pub const INPUT_JACKS: u16 = 0xd803;

/// Secondary LED register: shuffle and quantize display selects.
pub const LED_SET_1: u16 = 0xd80f;

/// The click (metronome) strobe.
pub const STB_CLICK: u16 = 0xd80e;

/// First of the ten drum strobe addresses (0xd804..=0xd80d).
pub const STB_BASE: u16 = 0xd804;

/// Host ROM window (SRAM on real hardware, loaded by the bridge at boot).
pub const ROM_BASE: u16 = 0x0000;
pub const ROM_LEN: usize = 0x1800;

/// Host pattern RAM window.
pub const RAM_BASE: u16 = 0xa000;
pub const RAM_LEN: usize = 0x2000;

/// Keyboard matrix row-select addresses. The row select is one-hot in the low
/// address byte.
pub const KB_ROWS: [u16; 6] = [0xdc01, 0xdc02, 0xdc04, 0xdc08, 0xdc10, 0xdc20];

bitflags! {
    /// Bits of the LED_SET_2 control register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LedSet2: u8 {
        const LED_STORE      = 0x01;
        const LED_VERIFY     = 0x02;
        const LED_LOAD       = 0x04;
        const LED_PLAY_STOP  = 0x08;
        const BEEP_OUT       = 0x10;
        const CLOCK_OUT      = 0x20;
        const TAPE_FSK_OUT   = 0x40;
        /// Active-low enable for D[2:0] to the drum generators. While clear,
        /// drum strobe writes carry their low three data bits to the voice
        /// boards; while set, strobes are inhibited.
        const DRUM_DO_ENABLE = 0x80;
    }
}

bitflags! {
    /// Bits of the INPUT_JACKS status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InputJacks: u8 {
        const TEMPO_CLK  = 0x01;
        const FOOTSWITCH = 0x02;
        const REC_SAFE   = 0x04;
        const TAPE_FSK   = 0x08;
        const CLK_SW_4   = 0x10;
        const CLK_SW_5   = 0x20;
        const CLK_SW_6   = 0x40;
        const CLK_SW_7   = 0x80;
    }
}

/// Shuffle display select occupies the low three bits of LED_SET_1.
pub const SHUFFLE_MASK: u8 = 0x07;
pub const SHUFFLE_SHIFT: u8 = 0;

/// Quantize display select occupies bits 5..=3 of LED_SET_1.
pub const QUANTIZE_MASK: u8 = 0x38;
pub const QUANTIZE_SHIFT: u8 = 3;

/// Encodes a value 0-99 as two BCD digits for the pattern/link displays.
pub fn to_bcd(value: u8) -> u8 {
    let value = value % 100;
    ((value / 10) << 4) | (value % 10)
}

/// Decodes two BCD digits into a value 0-99.
pub fn from_bcd(bcd: u8) -> u8 {
    (bcd >> 4) * 10 + (bcd & 0x0f)
}
