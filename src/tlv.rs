// src/tlv.rs
use serde::Serialize;

use crate::error::{Diagnosed, Error, Result};
use crate::types::PAGE_SIZE;

pub const NULL_TLV: u8 = 0x00;
pub const LOCK_CONTROL_TLV: u8 = 0x01;
pub const MEMORY_CONTROL_TLV: u8 = 0x02;
pub const NDEF_TLV: u8 = 0x03;
pub const TERMINATOR_TLV: u8 = 0xFE;

/// Largest value a single length byte may announce.
pub const MAX_SHORT_LENGTH: usize = 254;

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TlvEntry {
    Null,
    LockControl { value: Vec<u8> },
    MemoryControl { value: Vec<u8> },
    NdefMessage { value: Vec<u8> },
    Proprietary { tag: u8, value: Vec<u8> },
    Terminator,
    /// Length byte missing or pointing past the buffer; `value` is what was actually there.
    Malformed {
        tag: u8,
        declared: Option<usize>,
        value: Vec<u8>,
    },
    Invalid { tag: u8 },
}

impl TlvEntry {
    pub fn name(&self) -> &'static str {
        match self {
            TlvEntry::Null => "NULL/Padding",
            TlvEntry::LockControl { .. } => "Lock Control",
            TlvEntry::MemoryControl { .. } => "Memory Control",
            TlvEntry::NdefMessage { .. } => "NDEF Message",
            TlvEntry::Proprietary { .. } => "Proprietary TLV",
            TlvEntry::Terminator => "Terminator",
            TlvEntry::Malformed { .. } => "Malformed TLV",
            TlvEntry::Invalid { .. } => "Invalid TLV type",
        }
    }

    /// The diagnostic carried by a malformed entry.
    pub fn issue(&self, offset: usize) -> Option<Error> {
        match self {
            TlvEntry::Malformed {
                tag,
                declared,
                value,
            } => Some(Error::MalformedTlv {
                offset,
                tag: *tag,
                declared: *declared,
                available: value.len(),
            }),
            _ => None,
        }
    }
}

/// Lazy walk over the TLV blocks of a data area. Cloning it restarts from the
/// same position.
#[derive(Debug, Clone)]
pub struct TlvReader<'a> {
    buffer: &'a [u8],
    offset: usize,
    done: bool,
}

pub fn decode(buffer: &[u8], start_offset: usize) -> TlvReader<'_> {
    TlvReader {
        buffer,
        offset: start_offset,
        done: false,
    }
}

impl TlvReader<'_> {
    // Err carries (declared length, bytes actually available)
    fn read_value(&mut self, at: usize) -> std::result::Result<Vec<u8>, (Option<usize>, Vec<u8>)> {
        let Some(&len) = self.buffer.get(at + 1) else {
            return Err((None, Vec::new()));
        };
        let len = len as usize;
        let start = at + 2;
        let end = start + len;
        if end > self.buffer.len() {
            return Err((Some(len), self.buffer[start.min(self.buffer.len())..].to_vec()));
        }
        self.offset = end;
        Ok(self.buffer[start..end].to_vec())
    }
}

impl Iterator for TlvReader<'_> {
    type Item = (usize, TlvEntry);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.buffer.len() {
            return None;
        }

        let offset = self.offset;
        let tag = self.buffer[offset];
        let entry = match tag {
            NULL_TLV => {
                self.offset += 1;
                TlvEntry::Null
            }
            TERMINATOR_TLV => {
                self.done = true;
                TlvEntry::Terminator
            }
            0x01..=0xFD => match self.read_value(offset) {
                Ok(value) => match tag {
                    LOCK_CONTROL_TLV => TlvEntry::LockControl { value },
                    MEMORY_CONTROL_TLV => TlvEntry::MemoryControl { value },
                    NDEF_TLV => TlvEntry::NdefMessage { value },
                    _ => TlvEntry::Proprietary { tag, value },
                },
                Err((declared, value)) => {
                    self.done = true;
                    TlvEntry::Malformed {
                        tag,
                        declared,
                        value,
                    }
                }
            },
            _ => {
                self.offset += 1;
                TlvEntry::Invalid { tag }
            }
        };

        Some((offset, entry))
    }
}

/// Page number and byte-in-page for a data area offset.
pub fn page_position(start_page: usize, offset: usize) -> (usize, usize) {
    (start_page + offset / PAGE_SIZE, offset % PAGE_SIZE)
}

/// First NDEF message in the buffer. A truncated NDEF TLV still yields the bytes present.
pub fn find_ndef(buffer: &[u8]) -> Option<Diagnosed<Vec<u8>>> {
    decode(buffer, 0).find_map(|(offset, entry)| match entry {
        TlvEntry::NdefMessage { value } => Some(Diagnosed::clean(value)),
        TlvEntry::Malformed {
            tag: NDEF_TLV,
            declared,
            value,
        } => {
            let issue = Error::MalformedTlv {
                offset,
                tag: NDEF_TLV,
                declared,
                available: value.len(),
            };
            Some(Diagnosed::with_issue(value, issue))
        }
        _ => None,
    })
}

/// [0x03, len, message..., 0xFE], zero padded to a whole number of pages.
pub fn wrap_in_tlv(ndef_bytes: &[u8]) -> Result<Vec<u8>> {
    if ndef_bytes.len() > MAX_SHORT_LENGTH {
        return Err(Error::UnsupportedLength(ndef_bytes.len()));
    }

    let mut tlv = Vec::with_capacity(ndef_bytes.len() + 2 + PAGE_SIZE);
    tlv.push(NDEF_TLV); // T
    tlv.push(ndef_bytes.len() as u8); // L
    tlv.extend_from_slice(ndef_bytes); // V
    tlv.push(TERMINATOR_TLV);

    while tlv.len() % PAGE_SIZE != 0 {
        tlv.push(0x00);
    }
    Ok(tlv)
}
