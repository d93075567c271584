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

//! Bank file storage.
//!
//! A directory-of-files abstraction keyed by bank number (00-99) plus the
//! reserved staging bank. The engine asks for "the first file in this bank
//! directory" and "write this buffer as this bank's file"; naming and
//! checksumming live here, not in the engine.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::voices::{BankRef, Voice, MAX_NAME_LEN};

/// The file that carries a voice bank's display name.
const BANK_NAME_FILE: &str = "BANKNAME.TXT";

/// Bank file storage rooted at a directory.
pub struct BankStorage {
    root: PathBuf,
}

impl BankStorage {
    pub fn new(root: impl Into<PathBuf>) -> BankStorage {
        BankStorage { root: root.into() }
    }

    fn bank_dir(&self, kind: &str, bank: BankRef) -> Option<PathBuf> {
        let dir = match bank {
            BankRef::Bank(n) if n <= 99 => format!("{:02}", n),
            BankRef::Staging => "STAGING".to_string(),
            // Active SRAM content has no backing directory.
            _ => return None,
        };
        Some(self.root.join(kind).join(dir))
    }

    /// Returns the first sample file in the bank's directory for the voice,
    /// as (name, bytes). A missing bank or voice directory is a miss, not an
    /// error.
    pub fn first_sample(&self, bank: BankRef, voice: Voice) -> Option<(String, Vec<u8>)> {
        let dir = self.bank_dir("voices", bank)?.join(voice.dir_name());
        let (name, path) = first_file(&dir)?;
        match fs::read(&path) {
            Ok(data) => Some((name, data)),
            Err(e) => {
                warn!(path = ?path, err = %e, "Error reading sample file.");
                None
            }
        }
    }

    /// Replaces the bank's sample file for the voice: any existing files in
    /// the voice directory are deleted first.
    pub fn replace_sample(
        &self,
        bank: BankRef,
        voice: Voice,
        name: &str,
        data: &[u8],
    ) -> io::Result<()> {
        let Some(dir) = self.bank_dir("voices", bank) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "bank has no backing directory",
            ));
        };
        let dir = dir.join(voice.dir_name());
        fs::create_dir_all(&dir)?;
        delete_files_in(&dir)?;

        let mut name = name.to_string();
        name.truncate(MAX_NAME_LEN);
        if name.is_empty() {
            name = voice.dir_name().to_string();
        }
        fs::write(dir.join(format!("{}.BIN", name)), data)
    }

    /// Returns the bank's display name, if one has been stored.
    pub fn bank_name(&self, bank: BankRef) -> Option<String> {
        let path = self.bank_dir("voices", bank)?.join(BANK_NAME_FILE);
        fs::read_to_string(path)
            .ok()
            .map(|name| name.trim().to_string())
    }

    /// Stores the bank's display name.
    pub fn set_bank_name(&self, bank: BankRef, name: &str) -> io::Result<()> {
        let Some(dir) = self.bank_dir("voices", bank) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "bank has no backing directory",
            ));
        };
        fs::create_dir_all(&dir)?;
        let mut name = name.to_string();
        name.truncate(MAX_NAME_LEN);
        fs::write(dir.join(BANK_NAME_FILE), name)
    }

    /// Saves a pattern RAM image, named by its checksum.
    pub fn save_ram_image(&self, bank: BankRef, data: &[u8]) -> io::Result<PathBuf> {
        let Some(dir) = self.bank_dir("ram", bank) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "bank has no backing directory",
            ));
        };
        fs::create_dir_all(&dir)?;
        delete_files_in(&dir)?;

        let path = dir.join(format!("RAM_{:04X}.BIN", checksum(data)));
        fs::write(&path, data)?;
        Ok(path)
    }

    /// Loads the first pattern RAM image stored for the bank.
    pub fn load_ram_image(&self, bank: BankRef) -> Option<Vec<u8>> {
        let dir = self.bank_dir("ram", bank)?;
        let (_, path) = first_file(&dir)?;
        fs::read(path).ok()
    }
}

/// A 16-bit checksum used for naming RAM image files.
pub fn checksum(data: &[u8]) -> u16 {
    data.iter()
        .fold(0u16, |sum, byte| sum.wrapping_add(*byte as u16))
}

/// Finds the first regular file in a directory, sorted by name for a stable
/// pick. Returns (file stem, full path).
fn first_file(dir: &Path) -> Option<(String, PathBuf)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => {
            debug!(dir = ?dir, "Bank directory not present.");
            return None;
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.file_name().is_some_and(|name| name != BANK_NAME_FILE))
        .collect();
    files.sort();

    let path = files.into_iter().next()?;
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("UNNAMED")
        .to_string();
    Some((name, path))
}

fn delete_files_in(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            fs::remove_file(path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sample_replace_and_first() {
        let dir = tempfile::tempdir().expect("unable to create tempdir");
        let storage = BankStorage::new(dir.path());

        // A missing bank is a miss, not an error.
        assert!(storage
            .first_sample(BankRef::Bank(3), Voice::Bass)
            .is_none());

        storage
            .replace_sample(BankRef::Bank(3), Voice::Bass, "THUMP", &[1, 2, 3])
            .expect("replace failed");
        let (name, data) = storage
            .first_sample(BankRef::Bank(3), Voice::Bass)
            .expect("expected a sample");
        assert_eq!("THUMP", name);
        assert_eq!(vec![1, 2, 3], data);

        // Replacing removes the previous file.
        storage
            .replace_sample(BankRef::Bank(3), Voice::Bass, "BOOM", &[9])
            .expect("replace failed");
        let (name, data) = storage
            .first_sample(BankRef::Bank(3), Voice::Bass)
            .expect("expected a sample");
        assert_eq!("BOOM", name);
        assert_eq!(vec![9], data);
    }

    #[test]
    fn test_bank_names() {
        let dir = tempfile::tempdir().expect("unable to create tempdir");
        let storage = BankStorage::new(dir.path());

        assert!(storage.bank_name(BankRef::Bank(7)).is_none());
        storage
            .set_bank_name(BankRef::Bank(7), "FUNK KIT")
            .expect("set name failed");
        assert_eq!(Some("FUNK KIT".to_string()), storage.bank_name(BankRef::Bank(7)));

        // The name file must not shadow sample lookups.
        assert!(storage
            .first_sample(BankRef::Bank(7), Voice::Snare)
            .is_none());
    }

    #[test]
    fn test_ram_images_named_by_checksum() {
        let dir = tempfile::tempdir().expect("unable to create tempdir");
        let storage = BankStorage::new(dir.path());

        let image = vec![0x12u8; 64];
        let path = storage
            .save_ram_image(BankRef::Bank(0), &image)
            .expect("save failed");
        assert!(path
            .file_name()
            .and_then(|name| name.to_str())
            .expect("expected file name")
            .starts_with("RAM_"));
        assert_eq!(Some(image), storage.load_ram_image(BankRef::Bank(0)));
    }

    #[test]
    fn test_active_bank_has_no_directory() {
        let dir = tempfile::tempdir().expect("unable to create tempdir");
        let storage = BankStorage::new(dir.path());
        assert!(storage.first_sample(BankRef::Active, Voice::Clave).is_none());
        assert!(storage.replace_sample(BankRef::Active, Voice::Clave, "X", &[]).is_err());
    }

    #[test]
    fn test_checksum() {
        assert_eq!(0, checksum(&[]));
        assert_eq!(6, checksum(&[1, 2, 3]));
        // Wraps at 16 bits.
        assert_eq!(0x00fe, checksum(&vec![0xffu8; 0x102]));
    }
}
