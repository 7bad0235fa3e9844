// src/topology.rs
use log::debug;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::page_store::PageStore;
use crate::types::{FIRST_DATA_PAGE, PAGE_SIZE, PageAddress};

pub const NXP_MANUFACTURER: u8 = 0x04;

// First page that does not exist on the smaller part
pub const NTAG213_BOUNDARY: PageAddress = 0x2C;
pub const NTAG215_BOUNDARY: PageAddress = 0x86;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagFamily {
    Ntag213,
    Ntag215,
    Ntag216,
    GenericType2,
    Unknown,
}

/// Per-family constants. The families only differ in these numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyLayout {
    pub family: TagFamily,
    pub name: &'static str,
    pub top_page: PageAddress,
    pub total_bytes: usize,
    pub dynamic_lock_page: Option<PageAddress>,
}

const LAYOUTS: [FamilyLayout; 5] = [
    FamilyLayout {
        family: TagFamily::Ntag213,
        name: "NTAG213",
        top_page: 0x2C,
        total_bytes: 180,
        dynamic_lock_page: Some(0x2A),
    },
    FamilyLayout {
        family: TagFamily::Ntag215,
        name: "NTAG215",
        top_page: 0x86,
        total_bytes: 540,
        dynamic_lock_page: Some(0x82),
    },
    FamilyLayout {
        family: TagFamily::Ntag216,
        name: "NTAG216",
        top_page: 0xE7,
        total_bytes: 930,
        dynamic_lock_page: Some(0xE2),
    },
    FamilyLayout {
        family: TagFamily::GenericType2,
        name: "Type2-compatible",
        top_page: 0x10,
        total_bytes: 68,
        dynamic_lock_page: None,
    },
    FamilyLayout {
        family: TagFamily::Unknown,
        name: "unknown",
        top_page: 0x10,
        total_bytes: 68,
        dynamic_lock_page: None,
    },
];

impl TagFamily {
    pub fn layout(self) -> &'static FamilyLayout {
        match self {
            TagFamily::Ntag213 => &LAYOUTS[0],
            TagFamily::Ntag215 => &LAYOUTS[1],
            TagFamily::Ntag216 => &LAYOUTS[2],
            TagFamily::GenericType2 => &LAYOUTS[3],
            TagFamily::Unknown => &LAYOUTS[4],
        }
    }

    pub fn name(self) -> &'static str {
        self.layout().name
    }

    pub fn is_ntag(self) -> bool {
        self.layout().dynamic_lock_page.is_some()
    }

    pub fn top_page(self) -> PageAddress {
        self.layout().top_page
    }

    /// Dynamic lock bytes live here on NTAG parts.
    pub fn dynamic_lock_page(self) -> Option<PageAddress> {
        self.layout().dynamic_lock_page
    }

    /// Bytes writable from page 4: up to the dynamic lock page on NTAG parts,
    /// up to the top page otherwise.
    pub fn data_area_bytes(self) -> usize {
        let end = match self.dynamic_lock_page() {
            Some(page) => page as usize,
            None => self.top_page() as usize + 1,
        };
        (end - FIRST_DATA_PAGE as usize) * PAGE_SIZE
    }

    /// CFG page holding MIRROR / MIRROR_PAGE / AUTH0, right after the dynamic lock page.
    pub fn config_page(self) -> Option<PageAddress> {
        self.dynamic_lock_page().map(|page| page + 1)
    }
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagProfile {
    pub manufacturer: Option<u8>,
    pub family: TagFamily,
    pub top_page: PageAddress,
}

impl TagProfile {
    pub fn known_family(&self) -> Result<TagFamily> {
        match self.family {
            TagFamily::Unknown => Err(Error::UnknownTagFamily),
            family => Ok(family),
        }
    }

    pub fn page_count(&self) -> usize {
        self.top_page as usize + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Start,
    Ntag213Boundary,
    Ntag215Boundary,
    Classified(TagFamily),
}

/// Classify a tag by probing pages that only exist on the larger parts.
///
/// A failed probe is read as "no such page". A flaky link can therefore make a
/// large tag look small; no retry happens here.
pub fn detect<S: PageStore + ?Sized>(store: &mut S) -> TagProfile {
    let mut state = ProbeState::Start;
    let mut manufacturer = None;

    let family = loop {
        state = match state {
            ProbeState::Start => match store.read_page(0x00) {
                Ok(page0) => {
                    manufacturer = Some(page0[0]);
                    if page0[0] == NXP_MANUFACTURER {
                        ProbeState::Ntag213Boundary
                    } else {
                        ProbeState::Classified(TagFamily::GenericType2)
                    }
                }
                Err(err) => {
                    debug!("Page 0 unreadable: {}", err);
                    ProbeState::Classified(TagFamily::Unknown)
                }
            },
            ProbeState::Ntag213Boundary => match store.read_page(NTAG213_BOUNDARY) {
                Ok(_) => ProbeState::Ntag215Boundary,
                Err(_) => ProbeState::Classified(TagFamily::Ntag213),
            },
            ProbeState::Ntag215Boundary => match store.read_page(NTAG215_BOUNDARY) {
                Ok(_) => ProbeState::Classified(TagFamily::Ntag216),
                Err(_) => ProbeState::Classified(TagFamily::Ntag215),
            },
            ProbeState::Classified(family) => break family,
        };
        debug!("Topology probe -> {:?}", state);
    };

    TagProfile {
        manufacturer,
        family,
        top_page: family.top_page(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_store::{MemoryTag, Operation};

    const NXP_UID: [u8; 7] = [0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66];

    #[test]
    fn classifies_by_boundary_reads() {
        let cases = [
            (0x2C, TagFamily::Ntag213),
            (0x86, TagFamily::Ntag215),
            (0xE8, TagFamily::Ntag216),
        ];
        for (pages, expected) in cases {
            let mut tag = MemoryTag::new(NXP_UID, pages);
            let profile = detect(&mut tag);
            assert_eq!(profile.family, expected);
            assert_eq!(profile.manufacturer, Some(NXP_MANUFACTURER));
        }
    }

    #[test]
    fn ntag215_probe_sequence() {
        let mut tag = MemoryTag::new(NXP_UID, 0x86);
        let profile = detect(&mut tag);
        assert_eq!(profile.family, TagFamily::Ntag215);
        assert_eq!(profile.top_page, 0x86);
        assert_eq!(
            tag.operations,
            vec![
                Operation::Read(0x00),
                Operation::Read(0x2C),
                Operation::Read(0x86)
            ]
        );
    }

    #[test]
    fn other_manufacturers_are_generic() {
        let mut uid = NXP_UID;
        uid[0] = 0x05;
        let mut tag = MemoryTag::new(uid, 0xE8);
        let profile = detect(&mut tag);
        assert_eq!(profile.family, TagFamily::GenericType2);
        assert_eq!(tag.operations.len(), 1);
        assert!(!profile.family.is_ntag());
    }

    #[test]
    fn unreadable_tag_is_unknown() {
        let mut tag = MemoryTag::new(NXP_UID, 0xE8).with_fault(0);
        let profile = detect(&mut tag);
        assert_eq!(profile.family, TagFamily::Unknown);
        assert_eq!(profile.manufacturer, None);
        assert_eq!(profile.known_family(), Err(Error::UnknownTagFamily));
    }

    #[test]
    fn family_table() {
        assert_eq!(TagFamily::Ntag213.dynamic_lock_page(), Some(0x2A));
        assert_eq!(TagFamily::Ntag213.config_page(), Some(0x2B));
        assert_eq!(TagFamily::Ntag215.config_page(), Some(0x83));
        assert_eq!(TagFamily::Ntag216.dynamic_lock_page(), Some(0xE2));
        assert_eq!(TagFamily::Ntag216.config_page(), Some(0xE3));
        assert_eq!(TagFamily::GenericType2.config_page(), None);
        assert_eq!(TagFamily::Ntag216.name(), "NTAG216");
        assert_eq!(TagFamily::Ntag213.data_area_bytes(), 152);
        assert_eq!(TagFamily::Ntag215.data_area_bytes(), 504);
        assert_eq!(TagFamily::Ntag216.data_area_bytes(), 888);
        assert_eq!(TagFamily::GenericType2.data_area_bytes(), 52);
    }
}
