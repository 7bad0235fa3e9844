// src/cc.rs
use serde::Serialize;

use crate::types::{PageAddress, PageData};

pub const CC_PAGE: PageAddress = 0x03;
pub const NDEF_MAGIC: u8 = 0xE1;
pub const TYPE2_VERSION: u8 = 0x10;
pub const TYPE4_VERSION: u8 = 0x11;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CcKind {
    Type2,
    Type4,
    NonStandardVersion(u8),
    Blank,
    Invalid,
}

/// Page 3: magic, version, data area size in 8-byte units, access conditions.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapabilityContainer {
    pub magic: u8,
    pub version: u8,
    pub size_unit: u8,
    pub access: u8,
}

impl CapabilityContainer {
    /// What the formatter writes: NDEF, version 1.0, 0x3F * 8 = 504 bytes, read/write.
    pub const FORMATTED: Self = Self {
        magic: NDEF_MAGIC,
        version: TYPE2_VERSION,
        size_unit: 0x3F,
        access: 0x00,
    };

    pub fn parse(page: PageData) -> Self {
        let [magic, version, size_unit, access] = page;
        Self {
            magic,
            version,
            size_unit,
            access,
        }
    }

    pub fn to_page(self) -> PageData {
        [self.magic, self.version, self.size_unit, self.access]
    }

    pub fn kind(&self) -> CcKind {
        match (self.magic, self.version) {
            (NDEF_MAGIC, TYPE2_VERSION) => CcKind::Type2,
            (NDEF_MAGIC, TYPE4_VERSION) => CcKind::Type4,
            (NDEF_MAGIC, version) => CcKind::NonStandardVersion(version),
            _ if self.to_page() == [0; 4] => CcKind::Blank,
            _ => CcKind::Invalid,
        }
    }

    pub fn is_ndef(&self) -> bool {
        self.magic == NDEF_MAGIC
    }

    pub fn data_area_bytes(&self) -> usize {
        self.size_unit as usize * 8
    }

    pub fn describe(&self) -> String {
        match self.kind() {
            CcKind::Type2 => "Valid NDEF CC (Type 2 Tag)".to_string(),
            CcKind::Type4 => "Valid NDEF CC (Type 4 Tag)".to_string(),
            CcKind::NonStandardVersion(v) => format!("NDEF CC with non-standard version ({:02X})", v),
            CcKind::Blank => "Invalid or non-NDEF CC (appears to be empty/unformatted)".to_string(),
            CcKind::Invalid => "Invalid or non-NDEF CC".to_string(),
        }
    }
}
