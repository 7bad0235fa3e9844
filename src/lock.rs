// src/lock.rs
use log::warn;
use serde::Serialize;

use crate::error::Result;
use crate::page_store::PageStore;
use crate::topology::TagFamily;
use crate::types::{PageAddress, PageData};

pub const STATIC_LOCK_PAGE: PageAddress = 0x02;
/// Page covered by bit 0 of the static lock field.
pub const FIRST_STATIC_LOCKED_PAGE: PageAddress = 0x03;
pub const AUTH0_DISABLED: u8 = 0xFF;

/// Static lock bytes, page 2 bytes 2-3.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StaticLocks {
    pub lock0: u8,
    pub lock1: u8,
}

impl StaticLocks {
    pub fn from_page(page2: PageData) -> Self {
        Self {
            lock0: page2[2],
            lock1: page2[3],
        }
    }

    /// Bit i covers page 3 + i.
    pub fn bits(&self) -> u16 {
        u16::from_le_bytes([self.lock0, self.lock1])
    }

    pub fn is_locked(&self, page: PageAddress) -> bool {
        match page.checked_sub(FIRST_STATIC_LOCKED_PAGE) {
            Some(bit) if bit < 16 => self.bits() & (1 << bit) != 0,
            _ => false,
        }
    }

    pub fn locked_pages(&self) -> Vec<PageAddress> {
        (0..16u8)
            .filter(|&bit| self.bits() & (1 << bit) != 0)
            .map(|bit| FIRST_STATIC_LOCKED_PAGE + bit)
            .collect()
    }
}

/// NTAG configuration page: MIRROR, RFUI, MIRROR_PAGE, AUTH0.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct NtagConfig {
    pub mirror: u8,
    pub rfui: u8,
    pub mirror_page: u8,
    pub auth0: u8,
}

impl NtagConfig {
    pub fn from_page(page: PageData) -> Self {
        let [mirror, rfui, mirror_page, auth0] = page;
        Self {
            mirror,
            rfui,
            mirror_page,
            auth0,
        }
    }

    /// First password protected page, or None when AUTH0 is 0xFF.
    pub fn protection_start(&self) -> Option<PageAddress> {
        (self.auth0 != AUTH0_DISABLED).then_some(self.auth0)
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct LockState {
    pub static_locks: StaticLocks,
    pub dynamic_lock_bytes: Option<PageData>,
    pub config: Option<NtagConfig>,
}

impl LockState {
    pub fn auth0(&self) -> Option<u8> {
        self.config.map(|cfg| cfg.auth0)
    }
}

/// Read page 2 and, on NTAG parts, the dynamic lock and configuration pages.
/// Page 2 must be readable; the family pages are reported as absent when they are not.
pub fn analyze_locks<S: PageStore + ?Sized>(store: &mut S, family: TagFamily) -> Result<LockState> {
    let static_locks = StaticLocks::from_page(store.read_page(STATIC_LOCK_PAGE)?);

    let dynamic_lock_bytes = family
        .dynamic_lock_page()
        .and_then(|page| match store.read_page(page) {
            Ok(data) => Some(data),
            Err(err) => {
                warn!("Dynamic lock page {:02X} unreadable: {}", page, err);
                None
            }
        });

    let config = family.config_page().and_then(|page| match store.read_page(page) {
        Ok(data) => Some(NtagConfig::from_page(data)),
        Err(err) => {
            warn!("Configuration page {:02X} unreadable: {}", page, err);
            None
        }
    });

    Ok(LockState {
        static_locks,
        dynamic_lock_bytes,
        config,
    })
}
