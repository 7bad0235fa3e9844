// src/report.rs
use std::fmt;

use serde::Serialize;

use crate::cards::{DataArea, ScannedNdef};
use crate::cc::CapabilityContainer;
use crate::error::TransportError;
use crate::lock::LockState;
use crate::ndef::{self, RecordPayload};
use crate::tlv::{self, TlvEntry};
use crate::topology::TagProfile;
use crate::types::{FIRST_DATA_PAGE, NdefRecord, PageAddress, PageData};

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PageDump {
    pub page: PageAddress,
    pub data: Option<PageData>,
    pub error: Option<String>,
}

impl PageDump {
    pub fn read(page: PageAddress, result: Result<PageData, TransportError>) -> Self {
        match result {
            Ok(data) => Self {
                page,
                data: Some(data),
                error: None,
            },
            Err(err) => Self {
                page,
                data: None,
                error: Some(err.to_string()),
            },
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct TlvItem {
    pub offset: usize,
    pub page: usize,
    pub byte: usize,
    pub entry: TlvEntry,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RecordReport {
    pub record: NdefRecord,
    pub payload: Option<RecordPayload>,
    pub payload_error: Option<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct MessageReport {
    pub records: Vec<RecordReport>,
    pub issues: Vec<String>,
}

impl MessageReport {
    /// Decode a message and interpret every record it yields, keeping partial results.
    pub fn decode(bytes: &[u8]) -> Self {
        let decoded = ndef::decode_message(bytes);
        let records = decoded
            .value
            .into_iter()
            .map(|record| {
                let (payload, payload_error) = match ndef::interpret(&record) {
                    Ok(payload) => (Some(payload), None),
                    Err(err) => (None, Some(err.to_string())),
                };
                RecordReport {
                    record,
                    payload,
                    payload_error,
                }
            })
            .collect();

        Self {
            records,
            issues: decoded.issues.iter().map(ToString::to_string).collect(),
        }
    }

    /// URIs carried by the message, fully expanded.
    pub fn uris(&self) -> Vec<String> {
        self.records
            .iter()
            .filter_map(|r| match &r.payload {
                Some(RecordPayload::Uri(uri)) => Some(uri.to_uri()),
                _ => None,
            })
            .collect()
    }
}

/// Everything learned about one tag, ready to log or send to a client.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct TagReport {
    pub uid: String,
    pub profile: TagProfile,
    pub header: Vec<PageDump>,
    pub capability: Option<CapabilityContainer>,
    pub data_area: DataArea,
    pub tlvs: Vec<TlvItem>,
    pub messages: Vec<MessageReport>,
    pub scanned: Option<ScannedNdef>,
    pub locks: Option<LockState>,
    pub config_pages: Vec<PageDump>,
    pub diagnostics: Vec<String>,
}

impl TagReport {
    pub fn uris(&self) -> Vec<String> {
        self.messages.iter().flat_map(MessageReport::uris).collect()
    }
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn write_page(f: &mut fmt::Formatter<'_>, dump: &PageDump) -> fmt::Result {
    match (&dump.data, &dump.error) {
        (Some(data), _) => write!(f, "Page {:02X}: {}", dump.page, hex_bytes(data)),
        (None, Some(err)) => write!(f, "Page {:02X}: Error: {}", dump.page, err),
        (None, None) => write!(f, "Page {:02X}: (not read)", dump.page),
    }
}

fn write_message(f: &mut fmt::Formatter<'_>, message: &MessageReport) -> fmt::Result {
    for (i, report) in message.records.iter().enumerate() {
        let record = &report.record;
        let flags = record.flags;
        writeln!(f, "    --- Record {} ---", i + 1)?;
        writeln!(
            f,
            "      MB={} ME={} CF={} SR={} IL={} TNF={} ({})",
            flags.mb,
            flags.me,
            flags.cf,
            flags.sr,
            flags.il,
            record.tnf.bits(),
            record.tnf.description()
        )?;
        writeln!(
            f,
            "      Type: {} ({})",
            String::from_utf8_lossy(&record.record_type),
            hex_bytes(&record.record_type)
        )?;
        if let Some(id) = &record.id {
            writeln!(f, "      ID: {}", String::from_utf8_lossy(id))?;
        }
        writeln!(
            f,
            "      Payload ({} bytes): {}",
            record.payload.len(),
            hex_bytes(&record.payload)
        )?;
        match (&report.payload, &report.payload_error) {
            (Some(RecordPayload::Uri(uri)), _) => {
                writeln!(f, "        URI: {}", uri.to_uri())?;
                writeln!(f, "        Prefix Code: 0x{:02X} ({})", uri.prefix_code, uri.prefix())?;
            }
            (Some(RecordPayload::Text(text)), _) => {
                writeln!(f, "        Text: {}", text.text())?;
                writeln!(f, "        Language: {}", text.language)?;
                writeln!(f, "        Encoding: {}", text.encoding())?;
            }
            (_, Some(err)) => writeln!(f, "        Error: {}", err)?,
            _ => {}
        }
    }
    for issue in &message.issues {
        writeln!(f, "    Warning: {}", issue)?;
    }
    Ok(())
}

impl fmt::Display for TagReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "NFC TAG ANALYSIS")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Tag UID: {}", self.uid)?;
        writeln!(f, "Tag Type: {}", self.profile.family.name())?;
        writeln!(
            f,
            "Memory Layout: {} pages (0x00 to 0x{:02X})",
            self.profile.page_count(),
            self.profile.top_page
        )?;

        // --- HEADER SECTION ---
        writeln!(f, "\n=== HEADER PAGES (0-3) ===")?;
        for dump in &self.header {
            write_page(f, dump)?;
            if let Some(data) = dump.data {
                match dump.page {
                    0x00 => write!(f, " (UID part 1, manufacturer {:02X})", data[0])?,
                    0x01 => write!(f, " (UID part 2)")?,
                    0x02 => write!(f, " (UID part 3 + Lock bytes: {:02X} {:02X})", data[2], data[3])?,
                    _ => write!(f, " (Capability Container - CC)")?,
                }
            }
            writeln!(f)?;
        }
        if let Some(cc) = &self.capability {
            writeln!(
                f,
                "    Magic: {:02X} {:02X}, Size: {:02X} (data area = {} bytes), Access: {:02X}",
                cc.magic,
                cc.version,
                cc.size_unit,
                cc.data_area_bytes(),
                cc.access
            )?;
            writeln!(f, "    {}", cc.describe())?;
        }

        // --- DATA AREA SECTION ---
        writeln!(f, "\n=== NDEF DATA AREA (Pages {}+) ===", FIRST_DATA_PAGE)?;
        for dump in &self.data_area.pages {
            write_page(f, dump)?;
            writeln!(f)?;
        }
        writeln!(f, "  (stopped: {:?})", self.data_area.stop)?;

        writeln!(f, "\n=== NDEF TLV STRUCTURE ===")?;
        for item in &self.tlvs {
            write!(
                f,
                "Page {:02}, Byte {}: {}",
                item.page,
                item.byte,
                item.entry.name()
            )?;
            match &item.entry {
                TlvEntry::NdefMessage { value }
                | TlvEntry::LockControl { value }
                | TlvEntry::MemoryControl { value }
                | TlvEntry::Proprietary { value, .. } => {
                    writeln!(f, ", {} bytes: {}", value.len(), hex_bytes(value))?
                }
                TlvEntry::Malformed {
                    declared, value, ..
                } => writeln!(
                    f,
                    ", declared {:?} bytes, {} present: {}",
                    declared,
                    value.len(),
                    hex_bytes(value)
                )?,
                TlvEntry::Invalid { tag } => writeln!(f, " (0x{:02X})", tag)?,
                TlvEntry::Null | TlvEntry::Terminator => writeln!(f)?,
            }
        }
        for message in &self.messages {
            writeln!(f, "  === NDEF MESSAGE ===")?;
            write_message(f, message)?;
        }
        if let Some(scanned) = &self.scanned {
            writeln!(
                f,
                "Found NDEF TLV at page {:02X}, byte {} (length: {})",
                scanned.page, scanned.byte, scanned.declared
            )?;
        }

        // --- LOCK SECTION ---
        if let Some(locks) = &self.locks {
            writeln!(f, "\n=== LOCK BYTES ===")?;
            let statics = locks.static_locks;
            writeln!(
                f,
                "Static Lock Bytes (Page 2, bytes 2-3): {:02X} {:02X}",
                statics.lock0, statics.lock1
            )?;
            let locked = statics.locked_pages();
            if locked.is_empty() {
                writeln!(f, "  No pages locked by static lock bytes")?;
            } else {
                let pages: Vec<String> = locked.iter().map(|p| p.to_string()).collect();
                writeln!(f, "  Locked pages: {}", pages.join(", "))?;
            }
            if let Some(dynamic) = locks.dynamic_lock_bytes {
                writeln!(f, "Dynamic Lock Bytes: {}", hex_bytes(&dynamic))?;
            }
            if let Some(cfg) = locks.config {
                writeln!(
                    f,
                    "  MIRROR: {:02X}  RFUI: {:02X}  MIRROR_PAGE: {:02X}  AUTH0: {:02X}",
                    cfg.mirror, cfg.rfui, cfg.mirror_page, cfg.auth0
                )?;
                match cfg.protection_start() {
                    None => writeln!(f, "  (password protection disabled)")?,
                    Some(page) => writeln!(f, "  (password protection starts at page {})", page)?,
                }
            }
        }

        if !self.config_pages.is_empty() {
            writeln!(f, "\n=== NTAG CONFIGURATION PAGES ===")?;
            let dynamic_page = self.profile.family.dynamic_lock_page();
            for dump in &self.config_pages {
                write_page(f, dump)?;
                match dynamic_page.map(|p| dump.page as i16 - p as i16) {
                    Some(0) => writeln!(f, " (Dynamic Lock)")?,
                    Some(1) => writeln!(f, " (Configuration)")?,
                    Some(2) => writeln!(f, " (Password)")?,
                    _ => writeln!(f)?,
                }
            }
        }

        if !self.diagnostics.is_empty() {
            writeln!(f, "\n=== DIAGNOSTICS ===")?;
            for diagnostic in &self.diagnostics {
                writeln!(f, "- {}", diagnostic)?;
            }
        }
        writeln!(f, "{rule}")
    }
}

/// TLV walk with page/byte positions relative to `start_page`.
pub fn locate_tlvs(bytes: &[u8], start_page: PageAddress) -> Vec<TlvItem> {
    tlv::decode(bytes, 0)
        .map(|(offset, entry)| {
            let (page, byte) = tlv::page_position(start_page as usize, offset);
            TlvItem {
                offset,
                page,
                byte,
                entry,
            }
        })
        .collect()
}
