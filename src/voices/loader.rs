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

//! Voice sample loading.
//!
//! Sequences sample bytes into the voice boards' SRAM through the bus, and
//! stages/commits full ten-voice banks against the storage collaborator.

use tracing::{info, warn};

use crate::bus::{Arbiter, Transaction};
use crate::hostmap::LedSet2;
use crate::storage::BankStorage;
use crate::voices::{BankRef, SampleBuffer, SizeClass, Voice, VoiceBank, VoiceError};

/// The voice boards map the selected voice's SRAM window at the bottom of
/// the bus address space while in load mode.
const LOAD_WINDOW_BASE: u16 = 0x0000;

/// Loads drum voice samples and manages the staging and active banks.
pub struct Loader {
    classes: [SizeClass; 10],
    dirty: [bool; 10],
    staging: VoiceBank,
    active: VoiceBank,
}

impl Default for Loader {
    fn default() -> Loader {
        Loader::new()
    }
}

impl Loader {
    pub fn new() -> Loader {
        Loader {
            // The largest window is the safe default until a class is set.
            classes: [SizeClass::K32; 10],
            dirty: [false; 10],
            staging: VoiceBank::default(),
            active: VoiceBank::default(),
        }
    }

    /// Sets the size class latched for the voice on its next load.
    pub fn set_size_class(&mut self, voice: Voice, class: SizeClass) {
        self.classes[voice.index()] = class;
    }

    pub fn size_class(&self, voice: Voice) -> SizeClass {
        self.classes[voice.index()]
    }

    /// The bank currently loaded into SRAM.
    pub fn active_bank(&self) -> &VoiceBank {
        &self.active
    }

    /// The in-progress edit bank.
    pub fn staging_bank(&self) -> &VoiceBank {
        &self.staging
    }

    /// Loads a sample into the voice's SRAM window: select the voice's
    /// strobe, present load addressing, copy the bytes, return to play
    /// addressing. Oversize samples are rejected before any bus activity.
    pub fn load_sample(
        &mut self,
        arbiter: &mut Arbiter,
        voice: Voice,
        sample: &SampleBuffer,
    ) -> Result<(), VoiceError> {
        let class = self.classes[voice.index()];
        if sample.data.len() > class.bytes() {
            return Err(VoiceError::OversizeSample {
                len: sample.data.len(),
                class,
            });
        }

        let mut txn = arbiter.transaction()?;
        enter_load_mode(&mut txn, voice, class);
        txn.copy_to_host(LOAD_WINDOW_BASE, &sample.data);
        exit_load_mode(&mut txn);
        drop(txn);

        info!(
            voice = ?voice,
            name = sample.name,
            len = sample.data.len(),
            "Loaded sample."
        );
        self.dirty[voice.index()] = true;
        self.active.set_entry(voice, Some(sample.clone()));
        Ok(())
    }

    /// Reads the voice's SRAM window back through the bus.
    pub fn read_back(&mut self, arbiter: &mut Arbiter, voice: Voice) -> Result<Vec<u8>, VoiceError> {
        let class = self.classes[voice.index()];
        let mut txn = arbiter.transaction()?;
        enter_load_mode(&mut txn, voice, class);
        let data = txn.copy_from_host(LOAD_WINDOW_BASE, class.bytes());
        exit_load_mode(&mut txn);
        Ok(data)
    }

    /// Loads all ten voices from a bank into the staging area without
    /// disturbing the active bank. Missing voices stay empty; this is used
    /// for inspection and sysex export. Returns the number staged.
    pub fn stage_bank(&mut self, storage: &BankStorage, bank: BankRef) -> usize {
        let mut staged = 0;
        for voice in Voice::ALL {
            match storage.first_sample(bank, voice) {
                Some((name, data)) => match SampleBuffer::new(&name, bank, data) {
                    Ok(sample) => {
                        self.staging.set_entry(voice, Some(sample));
                        staged += 1;
                    }
                    Err(e) => {
                        warn!(voice = ?voice, err = %e, "Skipping unloadable sample.");
                        self.staging.set_entry(voice, None);
                    }
                },
                None => self.staging.set_entry(voice, None),
            }
        }
        self.staging.name = storage.bank_name(bank).unwrap_or_default();
        self.staging.clear_dirty();
        info!(bank = ?bank, staged, "Staged voice bank.");
        staged
    }

    /// Commits the staging bank: writes it to the named persistent bank,
    /// then loads it into SRAM as the active bank.
    ///
    /// This is one conceptual transaction with a best-effort policy: if a
    /// voice write fails partway, the active bank is not guaranteed
    /// self-consistent. There is no secondary copy of SRAM to roll back to.
    pub fn commit_bank(
        &mut self,
        arbiter: &mut Arbiter,
        storage: &BankStorage,
        bank_num: u8,
    ) -> Result<(), VoiceError> {
        let bank = BankRef::Bank(bank_num);
        for voice in Voice::ALL {
            if let Some(sample) = self.staging.entry(voice) {
                storage.replace_sample(bank, voice, &sample.name, &sample.data)?;
            }
        }
        storage.set_bank_name(bank, &self.staging.name)?;

        for voice in Voice::ALL {
            if let Some(sample) = self.staging.entry(voice).cloned() {
                if let Some(class) = SizeClass::fitting(sample.data.len()) {
                    self.set_size_class(voice, class);
                }
                self.load_sample(arbiter, voice, &sample)?;
            }
        }

        self.active.name = self.staging.name.clone();
        self.active.clear_dirty();
        self.staging.clear_dirty();
        self.dirty = [false; 10];
        info!(bank = bank_num, "Committed voice bank.");
        Ok(())
    }

    /// Places a sample into the staging bank without touching hardware.
    pub fn stage_sample(&mut self, voice: Voice, sample: SampleBuffer) {
        self.staging.set_entry(voice, Some(sample));
    }

    /// Reverses the voice's sample end-to-start and reloads it.
    pub fn reverse(
        &mut self,
        arbiter: &mut Arbiter,
        voice: Voice,
    ) -> Result<(), VoiceError> {
        let mut sample = self.staged_or_read_back(arbiter, voice)?;
        sample.data.reverse();
        self.load_sample(arbiter, voice, &sample)?;
        self.staging.set_entry(voice, Some(sample));
        Ok(())
    }

    /// Duplicates one voice's staged sample into another and loads it.
    pub fn copy(
        &mut self,
        arbiter: &mut Arbiter,
        src: Voice,
        dst: Voice,
    ) -> Result<(), VoiceError> {
        let sample = self.staged_or_read_back(arbiter, src)?;
        if let Some(class) = SizeClass::fitting(sample.data.len()) {
            self.set_size_class(dst, class);
        }
        self.load_sample(arbiter, dst, &sample)?;
        self.staging.set_entry(dst, Some(sample));
        Ok(())
    }

    /// Pulls a voice's sample into a buffer without loading hardware: from
    /// storage for a numbered or staging bank, or read back from SRAM for
    /// the active bank. Used for sysex export.
    pub fn get_voice(
        &mut self,
        arbiter: &mut Arbiter,
        storage: &BankStorage,
        bank: BankRef,
        voice: Voice,
    ) -> Result<SampleBuffer, VoiceError> {
        match bank {
            BankRef::Active => {
                let data = self.read_back(arbiter, voice)?;
                let name = self
                    .active
                    .entry(voice)
                    .map(|sample| sample.name.clone())
                    .unwrap_or_else(|| voice.dir_name().to_string());
                SampleBuffer::new(&name, BankRef::Active, data)
            }
            _ => match storage.first_sample(bank, voice) {
                Some((name, data)) => SampleBuffer::new(&name, bank, data),
                None => Err(VoiceError::StorageMiss { bank, voice }),
            },
        }
    }

    fn staged_or_read_back(
        &mut self,
        arbiter: &mut Arbiter,
        voice: Voice,
    ) -> Result<SampleBuffer, VoiceError> {
        if let Some(sample) = self.staging.entry(voice) {
            return Ok(sample.clone());
        }
        let data = self.read_back(arbiter, voice)?;
        let name = self
            .active
            .entry(voice)
            .map(|sample| sample.name.clone())
            .unwrap_or_else(|| voice.dir_name().to_string());
        SampleBuffer::new(&name, BankRef::Active, data)
    }
}

/// Load prologue: inhibit drum strobing, present load addressing, select the
/// voice and latch its size class. The hi-hat's address counters get an
/// explicit reset because its voice board free-runs them during play.
fn enter_load_mode(txn: &mut Transaction<'_>, voice: Voice, class: SizeClass) {
    txn.save_led_set_2();
    txn.set_led_set_2(LedSet2::DRUM_DO_ENABLE);
    txn.set_load_mode(true);
    txn.strobe(voice.strobe(), class.encoding());
    if voice == Voice::Hihat {
        txn.pulse_hihat_reset();
    }
}

/// Load epilogue: return to play addressing and put the LED register back.
fn exit_load_mode(txn: &mut Transaction<'_>) {
    txn.set_load_mode(false);
    txn.restore_led_set_2();
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::bus::test::{pair, HostHandle};
    use crate::bus::Arbiter;

    use super::*;

    fn setup() -> (Arbiter, HostHandle, Loader) {
        let (pins, host) = pair();
        (
            Arbiter::new(Box::new(pins), Duration::from_millis(50)),
            host,
            Loader::new(),
        )
    }

    fn sample(len: usize) -> SampleBuffer {
        let data: Vec<u8> = (0..len).map(|i| (i * 7 + 3) as u8).collect();
        SampleBuffer::new("TEST", BankRef::Active, data).expect("sample too big")
    }

    #[test]
    fn test_load_round_trip_at_class_boundaries() {
        let (mut arbiter, _host, mut loader) = setup();

        for class in [SizeClass::K2, SizeClass::K4, SizeClass::K8, SizeClass::K32] {
            let voice = Voice::Snare;
            loader.set_size_class(voice, class);
            let sample = sample(class.bytes());

            loader
                .load_sample(&mut arbiter, voice, &sample)
                .expect("load failed");
            let read_back = loader.read_back(&mut arbiter, voice).expect("read failed");
            assert_eq!(sample.data, read_back, "mismatch for {:?}", class);
        }
    }

    #[test]
    fn test_oversize_sample_performs_no_bus_writes() {
        let (mut arbiter, host, mut loader) = setup();
        loader.set_size_class(Voice::Bass, SizeClass::K2);

        let oversize = sample(SizeClass::K2.bytes() + 1);
        let before = host.write_count();
        let result = loader.load_sample(&mut arbiter, Voice::Bass, &oversize);

        assert!(matches!(
            result,
            Err(VoiceError::OversizeSample { len, .. }) if len == 2049
        ));
        assert_eq!(before, host.write_count());
        assert_eq!(0, arbiter.bus_writes());
    }

    #[test]
    fn test_size_class_configures_wrap_point() {
        let (mut arbiter, host, mut loader) = setup();
        loader.set_size_class(Voice::Toms, SizeClass::K4);
        loader
            .load_sample(&mut arbiter, Voice::Toms, &sample(16))
            .expect("load failed");
        assert_eq!(SizeClass::K4.bytes(), host.voice_window_len(Voice::Toms.index()));
    }

    #[test]
    fn test_load_restores_play_mode_and_leds() {
        let (mut arbiter, host, mut loader) = setup();
        loader.set_size_class(Voice::Bass, SizeClass::K2);

        loader
            .load_sample(&mut arbiter, Voice::Bass, &sample(64))
            .expect("load failed");

        // Loading must not leave the drum generators inhibited: a strobe
        // after the load lands as a drum hit.
        let mut txn = arbiter.transaction().expect("transaction failed");
        txn.strobe(Voice::Bass.strobe(), 0);
        drop(txn);
        assert_eq!(1, host.strobe_count(Voice::Bass.index()));
    }

    #[test]
    fn test_hihat_load_resets_address_counters() {
        let (mut arbiter, host, mut loader) = setup();
        loader.set_size_class(Voice::Hihat, SizeClass::K4);
        loader
            .load_sample(&mut arbiter, Voice::Hihat, &sample(64))
            .expect("load failed");
        assert_eq!(1, host.hihat_resets());
    }

    #[test]
    fn test_reverse_twice_restores_original() {
        let (mut arbiter, _host, mut loader) = setup();
        loader.set_size_class(Voice::Clave, SizeClass::K2);
        let original = sample(100);
        loader.stage_sample(Voice::Clave, original.clone());

        loader.reverse(&mut arbiter, Voice::Clave).expect("reverse failed");
        loader.reverse(&mut arbiter, Voice::Clave).expect("reverse failed");

        let staged = loader
            .staging_bank()
            .entry(Voice::Clave)
            .expect("expected staged sample");
        assert_eq!(original.data, staged.data);
    }

    #[test]
    fn test_stage_and_commit_bank() {
        let (mut arbiter, host, mut loader) = setup();
        let dir = tempfile::tempdir().expect("unable to create tempdir");
        let storage = BankStorage::new(dir.path());

        storage
            .replace_sample(BankRef::Bank(5), Voice::Bass, "KICK", &[1; 2048])
            .expect("replace failed");
        storage
            .replace_sample(BankRef::Bank(5), Voice::Snare, "CRACK", &[2; 4096])
            .expect("replace failed");
        storage
            .set_bank_name(BankRef::Bank(5), "TIGHT KIT")
            .expect("set name failed");

        // Staging pulls from storage without touching the bus.
        let before = host.write_count();
        assert_eq!(2, loader.stage_bank(&storage, BankRef::Bank(5)));
        assert_eq!(before, host.write_count());
        assert_eq!("TIGHT KIT", loader.staging_bank().name);

        // Committing to a new bank persists and loads into SRAM.
        loader
            .commit_bank(&mut arbiter, &storage, 6)
            .expect("commit failed");
        assert!(storage.first_sample(BankRef::Bank(6), Voice::Bass).is_some());
        assert_eq!(vec![1u8; 2048], host.voice_sram(Voice::Bass.index()));
        assert_eq!("TIGHT KIT", loader.active_bank().name);
        assert!(!loader.active_bank().dirty);
    }

    #[test]
    fn test_copy_voice() {
        let (mut arbiter, host, mut loader) = setup();
        loader.set_size_class(Voice::Bass, SizeClass::K2);
        let original = sample(2048);
        loader
            .load_sample(&mut arbiter, Voice::Bass, &original)
            .expect("load failed");

        loader
            .copy(&mut arbiter, Voice::Bass, Voice::Toms)
            .expect("copy failed");
        assert_eq!(original.data, host.voice_sram(Voice::Toms.index()));
    }

    #[test]
    fn test_get_voice_storage_miss() {
        let (mut arbiter, _host, mut loader) = setup();
        let dir = tempfile::tempdir().expect("unable to create tempdir");
        let storage = BankStorage::new(dir.path());

        let result = loader.get_voice(&mut arbiter, &storage, BankRef::Bank(12), Voice::Tamb);
        assert!(matches!(result, Err(VoiceError::StorageMiss { .. })));
    }
}
