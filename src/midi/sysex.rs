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

//! The vendor sysex dialect.
//!
//! Samples and pattern RAM images travel as sysex under the educational
//! manufacturer ID. Payloads are 8-bit data packed into 7-bit bytes, seven
//! data bytes per eight wire bytes with the stolen high bits gathered in a
//! leading byte, so bank sentinels and raw sample bytes survive the MIDI
//! framing rules.

use crate::voices::{BankRef, Voice, MAX_NAME_LEN};

/// The educational/prototyping manufacturer ID.
pub const VENDOR_ID: u8 = 0x7d;

const CMD_SAMPLE_DUMP: u8 = 0x01;
const CMD_RAM_IMAGE: u8 = 0x02;
const CMD_SAMPLE_REQUEST: u8 = 0x03;
const CMD_RAM_REQUEST: u8 = 0x04;

#[derive(Debug, thiserror::Error)]
pub enum SysexError {
    /// The message carries some other vendor's ID.
    #[error("not our vendor ID")]
    NotOurs,

    #[error("unknown sysex command {0:#04x}")]
    UnknownCommand(u8),

    #[error("truncated sysex message")]
    Truncated,

    #[error("invalid drum selector {0:#04x}")]
    BadSelector(u8),
}

/// A decoded vendor message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A complete sample for one voice slot of a bank.
    SampleDump {
        bank: BankRef,
        voice: Voice,
        name: String,
        data: Vec<u8>,
    },
    /// A pattern RAM image.
    RamImage { bank: BankRef, data: Vec<u8> },
    /// A request to send the sample for a voice slot.
    SampleRequest { bank: BankRef, voice: Voice },
    /// A request to send a pattern RAM image.
    RamRequest { bank: BankRef },
}

impl Message {
    /// Encodes the message as a sysex body, without the 0xf0/0xf7 framing
    /// bytes.
    pub fn encode(&self) -> Vec<u8> {
        let (cmd, payload) = match self {
            Message::SampleDump {
                bank,
                voice,
                name,
                data,
            } => {
                let mut payload = Vec::with_capacity(2 + MAX_NAME_LEN + data.len());
                payload.push(bank.to_sysex_byte());
                payload.push(voice.index() as u8);
                payload.extend_from_slice(&padded_name(name));
                payload.extend_from_slice(data);
                (CMD_SAMPLE_DUMP, payload)
            }
            Message::RamImage { bank, data } => {
                let mut payload = Vec::with_capacity(1 + data.len());
                payload.push(bank.to_sysex_byte());
                payload.extend_from_slice(data);
                (CMD_RAM_IMAGE, payload)
            }
            Message::SampleRequest { bank, voice } => {
                (CMD_SAMPLE_REQUEST, vec![bank.to_sysex_byte(), voice.index() as u8])
            }
            Message::RamRequest { bank } => (CMD_RAM_REQUEST, vec![bank.to_sysex_byte()]),
        };

        let mut body = Vec::with_capacity(2 + payload.len() * 8 / 7 + 1);
        body.push(VENDOR_ID);
        body.push(cmd);
        body.extend(pack(&payload));
        body
    }

    /// Decodes a sysex body. Accepts the body with or without the
    /// 0xf0/0xf7 framing bytes.
    pub fn decode(body: &[u8]) -> Result<Message, SysexError> {
        let body = body.strip_prefix(&[0xf0]).unwrap_or(body);
        let body = body.strip_suffix(&[0xf7]).unwrap_or(body);

        let (&vendor, rest) = body.split_first().ok_or(SysexError::Truncated)?;
        if vendor != VENDOR_ID {
            return Err(SysexError::NotOurs);
        }
        let (&cmd, rest) = rest.split_first().ok_or(SysexError::Truncated)?;
        let payload = unpack(rest);

        match cmd {
            CMD_SAMPLE_DUMP => {
                if payload.len() < 2 + MAX_NAME_LEN {
                    return Err(SysexError::Truncated);
                }
                let bank = BankRef::from_sysex_byte(payload[0]);
                let voice = decode_selector(payload[1])?;
                let name = decode_name(&payload[2..2 + MAX_NAME_LEN]);
                let data = payload[2 + MAX_NAME_LEN..].to_vec();
                Ok(Message::SampleDump {
                    bank,
                    voice,
                    name,
                    data,
                })
            }
            CMD_RAM_IMAGE => {
                let (&bank, data) = payload.split_first().ok_or(SysexError::Truncated)?;
                Ok(Message::RamImage {
                    bank: BankRef::from_sysex_byte(bank),
                    data: data.to_vec(),
                })
            }
            CMD_SAMPLE_REQUEST => {
                if payload.len() < 2 {
                    return Err(SysexError::Truncated);
                }
                Ok(Message::SampleRequest {
                    bank: BankRef::from_sysex_byte(payload[0]),
                    voice: decode_selector(payload[1])?,
                })
            }
            CMD_RAM_REQUEST => {
                let (&bank, _) = payload.split_first().ok_or(SysexError::Truncated)?;
                Ok(Message::RamRequest {
                    bank: BankRef::from_sysex_byte(bank),
                })
            }
            cmd => Err(SysexError::UnknownCommand(cmd)),
        }
    }
}

/// Packs 8-bit data into 7-bit wire bytes: each group of up to seven data
/// bytes becomes one byte of gathered high bits followed by the low seven
/// bits of each.
pub fn pack(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 7 + 1);
    for group in data.chunks(7) {
        let mut msbs = 0u8;
        for (i, byte) in group.iter().enumerate() {
            if byte & 0x80 != 0 {
                msbs |= 1 << i;
            }
        }
        out.push(msbs);
        out.extend(group.iter().map(|byte| byte & 0x7f));
    }
    out
}

/// Reverses [`pack`]. A trailing partial group is accepted.
pub fn unpack(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for group in data.chunks(8) {
        let Some((&msbs, rest)) = group.split_first() else {
            continue;
        };
        for (i, byte) in rest.iter().enumerate() {
            let high = if msbs & (1 << i) != 0 { 0x80 } else { 0x00 };
            out.push(byte | high);
        }
    }
    out
}

fn padded_name(name: &str) -> [u8; MAX_NAME_LEN] {
    let mut padded = [0u8; MAX_NAME_LEN];
    for (slot, byte) in padded.iter_mut().zip(name.bytes()) {
        *slot = byte;
    }
    padded
}

fn decode_name(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

fn decode_selector(selector: u8) -> Result<Voice, SysexError> {
    Voice::from_selector(selector).ok_or(SysexError::BadSelector(selector))
}
