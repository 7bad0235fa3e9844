#![allow(dead_code)]

use type2_tag::page_store::MemoryTag;
use type2_tag::types::PageData;

pub const NXP_UID: [u8; 7] = [0x04, 0xA2, 0x4B, 0x1A, 0x6C, 0x5D, 0x80];
pub const NXP_UID_HEX: &str = "04A24B1A6C5D80";

// Readable page counts; the first unreadable page is the family's probe boundary
pub const NTAG213_PAGES: usize = 0x2C;
pub const NTAG215_PAGES: usize = 0x86;
pub const NTAG216_PAGES: usize = 0xE8;

pub fn ntag213() -> MemoryTag {
    MemoryTag::new(NXP_UID, NTAG213_PAGES)
}

pub fn ntag215() -> MemoryTag {
    MemoryTag::new(NXP_UID, NTAG215_PAGES)
}

pub fn ntag216() -> MemoryTag {
    MemoryTag::new(NXP_UID, NTAG216_PAGES)
}

/// NTAG213 whose pages from 3 on hold `image`, as if already formatted and written.
pub fn ntag213_with(cc: PageData, data_area: &[u8]) -> MemoryTag {
    let mut tag = ntag213();
    tag.set_page(3, cc);
    tag.load(4, data_area);
    tag
}
