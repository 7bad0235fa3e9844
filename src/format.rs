// src/format.rs
use log::{debug, warn};

use crate::cc::{CC_PAGE, CapabilityContainer};
use crate::error::Result;
use crate::lock::STATIC_LOCK_PAGE;
use crate::page_store::PageStore;
use crate::tlv;
use crate::types::{FIRST_DATA_PAGE, PAGE_SIZE, PageAddress, PageData};

/// NULL TLVs followed by a Terminator: a formatted but empty data area.
pub const EMPTY_DATA_AREA: PageData = [0x00, 0x00, 0x00, 0xFE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWrite {
    pub step: &'static str,
    pub page: PageAddress,
    pub data: PageData,
}

/// Initialise a blank tag: unlock, write the CC, empty the data area.
pub fn format_plan() -> [PageWrite; 3] {
    [
        // Pages 0-1 are the UID and stay untouched. Page 2 bytes 2-3 are the lock bytes
        PageWrite {
            step: "write lock bytes",
            page: STATIC_LOCK_PAGE,
            data: [0x00; 4],
        },
        PageWrite {
            step: "write capability container",
            page: CC_PAGE,
            data: CapabilityContainer::FORMATTED.to_page(),
        },
        PageWrite {
            step: "write initial NDEF area",
            page: FIRST_DATA_PAGE,
            data: EMPTY_DATA_AREA,
        },
    ]
}

/// Page writes for TLV bytes starting at page 4. The last page is zero padded.
pub fn data_area_plan(tlv_bytes: &[u8]) -> Vec<PageWrite> {
    tlv_bytes
        .chunks(PAGE_SIZE)
        .enumerate()
        .map(|(i, chunk)| {
            let mut data = [0u8; PAGE_SIZE];
            data[..chunk.len()].copy_from_slice(chunk);
            PageWrite {
                step: "write NDEF data",
                page: FIRST_DATA_PAGE + i as PageAddress,
                data,
            }
        })
        .collect()
}

/// Run the writes in order. The first failure stops the plan; pages already
/// written stay written.
pub fn execute_plan<S: PageStore + ?Sized>(store: &mut S, plan: &[PageWrite]) -> Result<()> {
    for (done, write) in plan.iter().enumerate() {
        debug!("{} (page {:02X}): {:02X?}", write.step, write.page, write.data);
        if let Err(err) = store.write_page(write.page, write.data) {
            warn!(
                "{} failed at page {:02X} after {} of {} writes: {}",
                write.step,
                write.page,
                done,
                plan.len(),
                err
            );
            return Err(err.into());
        }
    }
    Ok(())
}

pub fn format_tag<S: PageStore + ?Sized>(store: &mut S) -> Result<()> {
    execute_plan(store, &format_plan())
}

/// Wrap an NDEF message in its TLV and write it from page 4.
pub fn write_ndef<S: PageStore + ?Sized>(store: &mut S, ndef_bytes: &[u8]) -> Result<()> {
    let tlv_bytes = tlv::wrap_in_tlv(ndef_bytes)?;
    execute_plan(store, &data_area_plan(&tlv_bytes))
}
