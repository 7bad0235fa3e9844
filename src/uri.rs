// src/uri.rs
use serde::Serialize;

use crate::error::{Error, Result};

/// URI identifier codes 0x00..=0x23, indexed by code.
const URI_PREFIXES: [&str; 36] = [
    "",
    "http://www.",
    "https://www.",
    "http://",
    "https://",
    "tel:",
    "mailto:",
    "ftp://anonymous:anonymous@",
    "ftp://ftp.",
    "ftps://",
    "sftp://",
    "smb://",
    "nfs://",
    "ftp://",
    "dav://",
    "news:",
    "telnet://",
    "imap:",
    "rtsp://",
    "urn:",
    "pop:",
    "sip:",
    "sips:",
    "tftp:",
    "btspp://",
    "btl2cap://",
    "btgoep://",
    "tcpobex://",
    "irdaobex://",
    "file://",
    "urn:epc:id:",
    "urn:epc:tag:",
    "urn:epc:pat:",
    "urn:epc:raw:",
    "urn:epc:",
    "urn:nfc:",
];

pub const UNKNOWN_PREFIX: &str = "Unknown prefix";
pub const HTTPS_CODE: u8 = 0x04;

pub fn prefix(code: u8) -> Option<&'static str> {
    URI_PREFIXES.get(code as usize).copied()
}

pub fn prefix_count() -> usize {
    URI_PREFIXES.len()
}

/// How `encode_uri_with` picks the identifier code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UriEncoding {
    /// Always 0x04, dropping a leading "https://" or "http://".
    #[default]
    FixedHttps,
    /// Longest table prefix that matches; code 0x00 when none does.
    LongestPrefix,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct UriRecord {
    pub prefix_code: u8,
    pub suffix: String,
}

impl UriRecord {
    pub fn prefix(&self) -> &'static str {
        prefix(self.prefix_code).unwrap_or(UNKNOWN_PREFIX)
    }

    pub fn has_known_prefix(&self) -> bool {
        prefix(self.prefix_code).is_some()
    }

    pub fn to_uri(&self) -> String {
        format!("{}{}", self.prefix(), self.suffix)
    }
}

pub fn decode_uri(payload: &[u8]) -> Result<UriRecord> {
    let (&prefix_code, suffix) = payload.split_first().ok_or(Error::EmptyUriPayload)?;
    Ok(UriRecord {
        prefix_code,
        suffix: String::from_utf8_lossy(suffix).into_owned(),
    })
}

pub fn decode_uri_string(payload: &[u8]) -> Result<String> {
    decode_uri(payload).map(|record| record.to_uri())
}

/// URL Record payload: [Prefix Code] + [rest of the URI]
pub fn encode_uri(uri: &str) -> Vec<u8> {
    encode_uri_with(uri, UriEncoding::FixedHttps)
}

pub fn encode_uri_with(uri: &str, encoding: UriEncoding) -> Vec<u8> {
    let (code, suffix) = match encoding {
        UriEncoding::FixedHttps => {
            let suffix = uri
                .strip_prefix("https://")
                .or_else(|| uri.strip_prefix("http://"))
                .unwrap_or(uri);
            (HTTPS_CODE, suffix)
        }
        UriEncoding::LongestPrefix => URI_PREFIXES
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, p)| uri.starts_with(*p))
            .max_by_key(|(_, p)| p.len())
            .map(|(code, p)| (code as u8, &uri[p.len()..]))
            .unwrap_or((0x00, uri)),
    };

    let mut payload = Vec::with_capacity(1 + suffix.len());
    payload.push(code);
    payload.extend_from_slice(suffix.as_bytes());
    payload
}
