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

//! The ten drum voices and their sample data.

use crate::bus::BusError;
use crate::hostmap::STB_BASE;

mod loader;

pub use loader::Loader;

/// Sample names are capped at 24 characters, matching the storage
/// collaborator's file name limit.
pub const MAX_NAME_LEN: usize = 24;

/// Errors for voice loading and bank operations.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// The sample is larger than the slot's configured size class. Rejected
    /// before any bus activity.
    #[error("sample of {len} bytes exceeds the {class:?} window")]
    OversizeSample { len: usize, class: SizeClass },

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// The requested bank has no sample for the voice.
    #[error("no sample found for {voice:?} in {bank:?}")]
    StorageMiss { bank: BankRef, voice: Voice },
}

/// One of the ten drum-sound channels. The discriminant order matches the
/// strobe address order on the host bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Voice {
    Bass,
    Snare,
    Hihat,
    Claps,
    Cabasa,
    Tamb,
    Toms,
    Congas,
    Cowbell,
    Clave,
}

impl Voice {
    pub const ALL: [Voice; 10] = [
        Voice::Bass,
        Voice::Snare,
        Voice::Hihat,
        Voice::Claps,
        Voice::Cabasa,
        Voice::Tamb,
        Voice::Toms,
        Voice::Congas,
        Voice::Cowbell,
        Voice::Clave,
    ];

    /// The voice's index into the slot table and the sysex drum selector.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// The voice's memory-mapped strobe address.
    pub fn strobe(&self) -> u16 {
        STB_BASE + self.index() as u16
    }

    /// Maps a sysex drum selector back to a voice.
    pub fn from_selector(selector: u8) -> Option<Voice> {
        Voice::ALL.get(selector as usize).copied()
    }

    /// The voice's directory name in bank storage.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Voice::Bass => "BASS",
            Voice::Snare => "SNARE",
            Voice::Hihat => "HIHAT",
            Voice::Claps => "CLAPS",
            Voice::Cabasa => "CABASA",
            Voice::Tamb => "TAMB",
            Voice::Toms => "TOMS",
            Voice::Congas => "CONGAS",
            Voice::Cowbell => "COWBELL",
            Voice::Clave => "CLAVE",
        }
    }
}

/// A voice's sample-length class. The encoding both reserves the SRAM window
/// length and configures the voice's address-counter wrap point, so it must
/// be latched before a sample load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SizeClass {
    K2 = 0x00,
    K4 = 0x01,
    K8 = 0x02,
    K32 = 0x03,
}

impl SizeClass {
    /// The wire encoding latched through the voice's strobe in load mode.
    pub fn encoding(&self) -> u8 {
        *self as u8
    }

    /// The window length in bytes.
    pub fn bytes(&self) -> usize {
        match self {
            SizeClass::K2 => 2 * 1024,
            SizeClass::K4 => 4 * 1024,
            SizeClass::K8 => 8 * 1024,
            SizeClass::K32 => 32 * 1024,
        }
    }

    /// The smallest class whose window fits a sample of the given length.
    pub fn fitting(len: usize) -> Option<SizeClass> {
        [SizeClass::K2, SizeClass::K4, SizeClass::K8, SizeClass::K32]
            .into_iter()
            .find(|class| len <= class.bytes())
    }
}

/// Identifies where a sample or bank came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankRef {
    /// A numbered persistent bank, 0-99.
    Bank(u8),
    /// The reserved staging bank.
    Staging,
    /// The current SRAM content (the 0xff sentinel on the wire).
    Active,
}

impl BankRef {
    /// The wire byte used in sysex messages, where 0xff means "currently
    /// active SRAM content".
    pub fn to_sysex_byte(&self) -> u8 {
        match self {
            BankRef::Bank(n) => *n,
            BankRef::Staging | BankRef::Active => 0xff,
        }
    }

    pub fn from_sysex_byte(byte: u8) -> BankRef {
        if byte <= 99 {
            BankRef::Bank(byte)
        } else {
            BankRef::Active
        }
    }
}

/// An owned sample: bytes, a display name, and where it came from.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    pub name: String,
    pub source: BankRef,
    pub data: Vec<u8>,
}

impl SampleBuffer {
    /// Creates a sample buffer. The name is truncated to [`MAX_NAME_LEN`];
    /// data larger than the largest size class is rejected.
    pub fn new(name: &str, source: BankRef, data: Vec<u8>) -> Result<SampleBuffer, VoiceError> {
        if data.len() > SizeClass::K32.bytes() {
            return Err(VoiceError::OversizeSample {
                len: data.len(),
                class: SizeClass::K32,
            });
        }
        let mut name = name.to_string();
        name.truncate(MAX_NAME_LEN);
        Ok(SampleBuffer { name, source, data })
    }
}

/// A named collection of ten staged samples plus a dirty flag.
#[derive(Debug, Clone, Default)]
pub struct VoiceBank {
    pub name: String,
    pub dirty: bool,
    entries: [Option<SampleBuffer>; 10],
}

impl VoiceBank {
    pub fn entry(&self, voice: Voice) -> Option<&SampleBuffer> {
        self.entries[voice.index()].as_ref()
    }

    pub fn set_entry(&mut self, voice: Voice, sample: Option<SampleBuffer>) {
        self.entries[voice.index()] = sample;
        self.dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_voice_strobes_are_contiguous() {
        for (i, voice) in Voice::ALL.iter().enumerate() {
            assert_eq!(STB_BASE + i as u16, voice.strobe());
            assert_eq!(Some(*voice), Voice::from_selector(i as u8));
        }
        assert_eq!(None, Voice::from_selector(10));
    }

    #[test]
    fn test_size_class_fitting() {
        assert_eq!(Some(SizeClass::K2), SizeClass::fitting(0));
        assert_eq!(Some(SizeClass::K2), SizeClass::fitting(2048));
        assert_eq!(Some(SizeClass::K4), SizeClass::fitting(2049));
        assert_eq!(Some(SizeClass::K8), SizeClass::fitting(8192));
        assert_eq!(Some(SizeClass::K32), SizeClass::fitting(8193));
        assert_eq!(None, SizeClass::fitting(32 * 1024 + 1));
    }

    #[test]
    fn test_sample_buffer_limits() {
        let long_name = "a".repeat(40);
        let sample = SampleBuffer::new(&long_name, BankRef::Bank(0), vec![0; 16]).unwrap();
        assert_eq!(MAX_NAME_LEN, sample.name.len());

        assert!(SampleBuffer::new("too big", BankRef::Active, vec![0; 32 * 1024 + 1]).is_err());
    }
}
