// src/cards.rs
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;

use crate::cc::{CC_PAGE, CapabilityContainer};
use crate::error::{Error, Result};
use crate::format;
use crate::lock;
use crate::ndef;
use crate::page_store::PageStore;
use crate::report::{self, MessageReport, PageDump, TagReport};
use crate::tlv::{self, NDEF_TLV, TlvEntry};
use crate::topology;
use crate::types::{FIRST_DATA_PAGE, PAGE_SIZE, PageAddress};

// Three failed pages in a row, or one close to the top, means we ran off the end of memory
pub const MAX_CONSECUTIVE_ERRORS: usize = 3;
pub const BOUNDARY_MARGIN: PageAddress = 5;

/// Pause between formatting and writing the NDEF message.
pub const FORMAT_SETTLE: Duration = Duration::from_millis(200);

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Terminator,
    ReadErrors,
    MemoryBoundary,
    TopOfMemory,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct DataArea {
    pub start_page: PageAddress,
    pub bytes: Vec<u8>,
    pub pages: Vec<PageDump>,
    pub stop: StopReason,
}

/// An NDEF TLV found outside the standard data area.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ScannedNdef {
    pub page: PageAddress,
    pub byte: usize,
    pub declared: usize,
    pub value: Vec<u8>,
}

// A 0xFE value or length byte is not a Terminator; only the TLV walk can tell
fn ends_at_terminator(bytes: &[u8]) -> bool {
    tlv::decode(bytes, 0).any(|(_, entry)| entry == TlvEntry::Terminator)
}

/// Read the data area from page 4 until the TLV walk reaches a Terminator.
pub fn read_data_area<S: PageStore + ?Sized>(store: &mut S, top_page: PageAddress) -> DataArea {
    let mut bytes = Vec::new();
    let mut pages = Vec::new();
    let mut consecutive_errors = 0;

    let stop = 'scan: {
        for page in FIRST_DATA_PAGE..=top_page {
            let result = store.read_page_fallback(page);
            pages.push(PageDump::read(page, result));

            match result {
                Ok(data) => {
                    consecutive_errors = 0;
                    bytes.extend_from_slice(&data);
                    if ends_at_terminator(&bytes) {
                        break 'scan StopReason::Terminator;
                    }
                }
                Err(err) => {
                    debug!("Page {:02X} unreadable: {}", page, err);
                    consecutive_errors += 1;
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        break 'scan StopReason::ReadErrors;
                    }
                    if page > top_page.saturating_sub(BOUNDARY_MARGIN) {
                        break 'scan StopReason::MemoryBoundary;
                    }
                }
            }
        }
        StopReason::TopOfMemory
    };

    DataArea {
        start_page: FIRST_DATA_PAGE,
        bytes,
        pages,
        stop,
    }
}

/// Look through every page for an NDEF TLV start and collect its value,
/// following it across pages.
pub fn scan_for_ndef<S: PageStore + ?Sized>(
    store: &mut S,
    top_page: PageAddress,
) -> Option<ScannedNdef> {
    for page in 0..=top_page {
        let Ok(data) = store.read_page_fallback(page) else {
            continue;
        };
        let Some(byte) = (0..PAGE_SIZE - 1).find(|&i| data[i] == NDEF_TLV) else {
            continue;
        };

        let declared = data[byte + 1] as usize;
        let mut value: Vec<u8> = data[byte + 2..].iter().copied().take(declared).collect();
        let mut next = page;
        while value.len() < declared && next < top_page {
            next += 1;
            match store.read_page_fallback(next) {
                Ok(more) => {
                    let take = (declared - value.len()).min(PAGE_SIZE);
                    value.extend_from_slice(&more[..take]);
                }
                Err(_) => break,
            }
        }

        info!("Found NDEF TLV at page {:02X}, byte {} (length: {})", page, byte, declared);
        return Some(ScannedNdef {
            page,
            byte,
            declared,
            value,
        });
    }
    None
}

/// Full read-only analysis of the tag on `store`. Only a missing UID is fatal;
/// everything else is reported inside the result.
pub fn analyze_tag<S: PageStore + ?Sized>(store: &mut S) -> Result<TagReport> {
    let uid = hex::encode_upper(store.uid()?);
    let profile = topology::detect(store);
    info!("Tag {} classified as {}", uid, profile.family.name());

    let mut diagnostics = Vec::new();
    if let Err(err) = profile.known_family() {
        diagnostics.push(format!("{}, assuming {} pages", err, profile.page_count()));
    }

    let header: Vec<PageDump> = (0..=CC_PAGE)
        .map(|page| PageDump::read(page, store.read_page_fallback(page)))
        .collect();
    let capability = header
        .last()
        .and_then(|dump| dump.data)
        .map(CapabilityContainer::parse);

    if let Some(cc) = &capability {
        if !cc.is_ndef() {
            diagnostics.push(cc.describe());
        }
    }

    let data_area = read_data_area(store, profile.top_page);
    let tlvs = report::locate_tlvs(&data_area.bytes, data_area.start_page);

    let mut messages = Vec::new();
    for item in &tlvs {
        if let Some(issue) = item.entry.issue(item.offset) {
            diagnostics.push(issue.to_string());
        }
        match &item.entry {
            TlvEntry::NdefMessage { value }
            | TlvEntry::Malformed {
                tag: NDEF_TLV,
                value,
                ..
            } => messages.push(MessageReport::decode(value)),
            _ => {}
        }
    }

    let mut scanned = None;
    if data_area.bytes.is_empty() {
        diagnostics.push("No NDEF data found in standard location (pages 4+)".to_string());
        scanned = scan_for_ndef(store, profile.top_page);
        match &scanned {
            Some(found) => messages.push(MessageReport::decode(&found.value)),
            None => diagnostics.push("No NDEF data found anywhere on the tag".to_string()),
        }
    } else if messages.is_empty() {
        diagnostics.push("No NDEF TLV found in data area".to_string());
    }

    let locks = match lock::analyze_locks(store, profile.family) {
        Ok(locks) => Some(locks),
        Err(err) => {
            diagnostics.push(format!("Lock bytes unreadable: {}", err));
            None
        }
    };

    // The page before the dynamic lock page through the password page
    let config_pages = match profile.family.dynamic_lock_page() {
        Some(dynamic) => (dynamic - 1..=dynamic + 2)
            .filter(|&page| page <= profile.top_page)
            .map(|page| PageDump::read(page, store.read_page(page)))
            .collect(),
        None => Vec::new(),
    };

    Ok(TagReport {
        uid,
        profile,
        header,
        capability,
        data_area,
        tlvs,
        messages,
        scanned,
        locks,
        config_pages,
        diagnostics,
    })
}

/// Format the tag, then write a single URI record from page 4.
/// Not atomic: a failure part way leaves whatever was already written.
pub fn write_url<S: PageStore + ?Sized>(store: &mut S, url: &str, settle: Duration) -> Result<()> {
    // Build and size-check first so an oversized URL never touches the tag
    let message = ndef::build_uri_record(url)?;
    let tlv_len = tlv::wrap_in_tlv(&message)?.len();

    let profile = topology::detect(store);
    let capacity = profile.family.data_area_bytes();
    if tlv_len > capacity {
        return Err(Error::DataAreaTooSmall {
            needed: tlv_len,
            available: capacity,
        });
    }

    info!("Formatting tag as NFC Forum Type 2...");
    format::format_tag(store)?;
    if !settle.is_zero() {
        std::thread::sleep(settle);
    }

    format::write_ndef(store, &message)?;
    info!("Wrote URL to tag: {}", url);
    Ok(())
}

/// `<base_url>/r/<UID_HEX>` for the tag on `store`.
pub fn tag_url<S: PageStore + ?Sized>(store: &mut S, base_url: &str) -> Result<String> {
    let uid = hex::encode_upper(store.uid()?);
    Ok(format!("{}/r/{}", base_url.trim_end_matches('/'), uid))
}

/// Write the tag's own URL to it and return what was written.
pub fn provision_url<S: PageStore + ?Sized>(
    store: &mut S,
    base_url: &str,
    settle: Duration,
) -> Result<String> {
    let url = tag_url(store, base_url)?;
    if let Err(err) = write_url(store, &url, settle) {
        warn!("Provisioning {} failed: {}", url, err);
        return Err(err);
    }
    Ok(url)
}
