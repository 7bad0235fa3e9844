// src/types.rs
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::report::TagReport;

pub type PageAddress = u8;
pub type PageData = [u8; PAGE_SIZE];

pub const PAGE_SIZE: usize = 4;
pub const FIRST_DATA_PAGE: PageAddress = 0x04;

// Header bits of an NDEF record
pub const FLAG_MB: u8 = 0x80; // Message Begin
pub const FLAG_ME: u8 = 0x40; // Message End
pub const FLAG_CF: u8 = 0x20; // Chunk Flag
pub const FLAG_SR: u8 = 0x10; // Short Record
pub const FLAG_IL: u8 = 0x08; // ID Length present
pub const TNF_MASK: u8 = 0x07;

#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecordFlags {
    pub mb: bool,
    pub me: bool,
    pub cf: bool,
    pub sr: bool,
    pub il: bool,
}

impl RecordFlags {
    pub fn from_header(header: u8) -> Self {
        Self {
            mb: header & FLAG_MB != 0,
            me: header & FLAG_ME != 0,
            cf: header & FLAG_CF != 0,
            sr: header & FLAG_SR != 0,
            il: header & FLAG_IL != 0,
        }
    }

    pub fn bits(&self) -> u8 {
        let mut header = 0;
        for (set, bit) in [
            (self.mb, FLAG_MB),
            (self.me, FLAG_ME),
            (self.cf, FLAG_CF),
            (self.sr, FLAG_SR),
            (self.il, FLAG_IL),
        ] {
            if set {
                header |= bit;
            }
        }
        header
    }
}

/// Type Name Format (How to interpret the type)
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Tnf {
    #[default]
    Empty,
    WellKnown,
    Media,
    AbsoluteUri,
    External,
    Unknown,
    Unchanged,
    Reserved,
}

impl Tnf {
    pub fn from_bits(bits: u8) -> Self {
        match bits & TNF_MASK {
            0x00 => Tnf::Empty,
            0x01 => Tnf::WellKnown,
            0x02 => Tnf::Media,
            0x03 => Tnf::AbsoluteUri,
            0x04 => Tnf::External,
            0x05 => Tnf::Unknown,
            0x06 => Tnf::Unchanged,
            _ => Tnf::Reserved,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn description(self) -> &'static str {
        match self {
            Tnf::Empty => "Empty",
            Tnf::WellKnown => "Well-known",
            Tnf::Media => "Media type",
            Tnf::AbsoluteUri => "Absolute URI",
            Tnf::External => "External",
            Tnf::Unknown => "Unknown",
            Tnf::Unchanged => "Unchanged",
            Tnf::Reserved => "Reserved",
        }
    }
}

#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct NdefRecord {
    pub flags: RecordFlags,
    pub tnf: Tnf,
    pub record_type: Vec<u8>,
    pub id: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

impl NdefRecord {
    /// A short record with no ID; MB/ME are filled in when the message is built.
    pub fn new(tnf: Tnf, record_type: &[u8], payload: Vec<u8>) -> Self {
        Self {
            flags: RecordFlags {
                sr: true,
                ..Default::default()
            },
            tnf,
            record_type: record_type.to_vec(),
            id: None,
            payload,
        }
    }

    pub fn with_id(mut self, id: &[u8]) -> Self {
        self.flags.il = true;
        self.id = Some(id.to_vec());
        self
    }

    pub fn is_well_known(&self, record_type: &[u8]) -> bool {
        self.tnf == Tnf::WellKnown && self.record_type == record_type
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UidFormat {
    #[default]
    Hex,
    HexReversed,
    Decimal,
}

impl UidFormat {
    pub fn format(self, uid: &[u8]) -> String {
        match self {
            UidFormat::Hex => hex::encode_upper(uid),
            UidFormat::HexReversed => {
                let reversed: Vec<u8> = uid.iter().rev().copied().collect();
                hex::encode_upper(reversed)
            }
            // Only short UIDs fit a u32, longer ones fall back to hex
            UidFormat::Decimal if uid.len() <= 4 => uid
                .iter()
                .fold(0u32, |acc, &b| (acc << 8) | b as u32)
                .to_string(),
            UidFormat::Decimal => hex::encode_upper(uid),
        }
    }
}

// Messages sent TO the WebSocket client (Frontend)
#[derive(Serialize, Clone, Debug)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutgoingMessage {
    ReaderStatus {
        success: bool,
    },
    CardStatus {
        success: bool,
        message: String,
        uid: Option<String>,
    },
    TagAnalysis {
        report: Box<TagReport>,
    },
    DataWriteSuccess {
        message: String,
        url: Option<String>,
    },
    DataWriteError {
        error: String,
    },
    ReaderError {
        error: String,
    },
}

// Messages received FROM the WebSocket client
#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncomingMessage {
    GetReaderStatus,
    AnalyzeTag,
    FormatTag,
    WriteUrl { url: String },
    ProvisionTag,
}

// Internal commands sent from WS Server -> NFC Thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NfcCommand {
    CheckReaderStatus,
    Tag(TagAction),
}

/// Work done against whichever tag is on the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagAction {
    Analyze,
    Format,
    WriteUrl(String),
    Provision,
    Uid,
}

impl From<IncomingMessage> for NfcCommand {
    fn from(msg: IncomingMessage) -> Self {
        match msg {
            IncomingMessage::GetReaderStatus => NfcCommand::CheckReaderStatus,
            IncomingMessage::AnalyzeTag => NfcCommand::Tag(TagAction::Analyze),
            IncomingMessage::FormatTag => NfcCommand::Tag(TagAction::Format),
            IncomingMessage::WriteUrl { url } => NfcCommand::Tag(TagAction::WriteUrl(url)),
            IncomingMessage::ProvisionTag => NfcCommand::Tag(TagAction::Provision),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_flags_round_trip() {
        let flags = RecordFlags::from_header(0xD1);
        assert!(flags.mb && flags.me && flags.sr);
        assert!(!flags.cf && !flags.il);
        assert_eq!(flags.bits() | Tnf::from_bits(0xD1).bits(), 0xD1);
    }

    #[test]
    fn tnf_uses_low_three_bits() {
        assert_eq!(Tnf::from_bits(0xD1), Tnf::WellKnown);
        assert_eq!(Tnf::from_bits(0x0F), Tnf::Reserved);
        assert_eq!(Tnf::External.description(), "External");
    }

    #[test]
    fn uid_formats() {
        let uid = [0x04, 0xA1, 0xB2, 0xC3];
        assert_eq!(UidFormat::Hex.format(&uid), "04A1B2C3");
        assert_eq!(UidFormat::HexReversed.format(&uid), "C3B2A104");
        assert_eq!(UidFormat::Decimal.format(&uid), "77705923");

        let long_uid = [0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
        assert_eq!(UidFormat::Decimal.format(&long_uid), "04112233445566");
    }

    #[test]
    fn incoming_messages_parse_from_json() {
        let msg: IncomingMessage =
            serde_json::from_str(r#"{"type":"WRITE_URL","url":"https://example.com"}"#).unwrap();
        assert_eq!(
            NfcCommand::from(msg),
            NfcCommand::Tag(TagAction::WriteUrl("https://example.com".into()))
        );

        let msg: IncomingMessage = serde_json::from_str(r#"{"type":"GET_READER_STATUS"}"#).unwrap();
        assert_eq!(NfcCommand::from(msg), NfcCommand::CheckReaderStatus);
    }
}
