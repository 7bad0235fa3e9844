// src/text.rs
use serde::Serialize;

use crate::error::{Error, Result};

const UTF16_FLAG: u8 = 0x80;
const LANG_LEN_MASK: u8 = 0x3F;

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct TextRecord {
    pub utf16: bool,
    pub language: String,
    pub text: Vec<u8>,
}

impl TextRecord {
    pub fn encoding(&self) -> &'static str {
        if self.utf16 { "UTF-16" } else { "UTF-8" }
    }

    /// Text as a string. UTF-16 is big-endian unless a byte order mark says otherwise.
    pub fn text(&self) -> String {
        if !self.utf16 {
            return String::from_utf8_lossy(&self.text).into_owned();
        }

        let (little_endian, body) = match self.text.as_slice() {
            [0xFF, 0xFE, rest @ ..] => (true, rest),
            [0xFE, 0xFF, rest @ ..] => (false, rest),
            other => (false, other),
        };
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| {
                if little_endian {
                    u16::from_le_bytes([pair[0], pair[1]])
                } else {
                    u16::from_be_bytes([pair[0], pair[1]])
                }
            })
            .collect();
        String::from_utf16_lossy(&units)
    }
}

/// Text Record: [Status Byte] + [Lang Code] + [Text]
pub fn decode_text(payload: &[u8]) -> Result<TextRecord> {
    let (&status, rest) = payload
        .split_first()
        .ok_or_else(|| Error::InvalidTextRecord("empty payload".into()))?;

    let lang_len = (status & LANG_LEN_MASK) as usize;
    if lang_len > rest.len() {
        return Err(Error::InvalidTextRecord(format!(
            "language code of {} bytes, {} available",
            lang_len,
            rest.len()
        )));
    }

    let (language, text) = rest.split_at(lang_len);
    Ok(TextRecord {
        utf16: status & UTF16_FLAG != 0,
        language: String::from_utf8_lossy(language).into_owned(),
        text: text.to_vec(),
    })
}

/// UTF-8 text payload. Bit 7 of the status byte stays clear, bits 0-5 carry the language length.
pub fn encode_text(language: &str, text: &str) -> Result<Vec<u8>> {
    if language.len() > LANG_LEN_MASK as usize {
        return Err(Error::InvalidTextRecord(format!(
            "language code of {} bytes exceeds {}",
            language.len(),
            LANG_LEN_MASK
        )));
    }

    let mut payload = Vec::with_capacity(1 + language.len() + text.len());
    payload.push(language.len() as u8);
    payload.extend_from_slice(language.as_bytes());
    payload.extend_from_slice(text.as_bytes());
    Ok(payload)
}
