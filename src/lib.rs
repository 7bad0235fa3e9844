// src/lib.rs
//! NFC Forum Type 2 tag toolkit: TLV and NDEF codecs, tag topology and lock
//! analysis, formatting, and a PC/SC reader service.

pub mod apdu;
pub mod cards;
pub mod cc;
pub mod config;
pub mod error;
pub mod format;
pub mod lock;
pub mod ndef;
pub mod nfc_service;
pub mod page_store;
pub mod report;
pub mod text;
pub mod tlv;
pub mod topology;
pub mod types;
pub mod uri;
pub mod ws;

pub use error::{Diagnosed, Error, Result, TransportError};
pub use page_store::{MemoryTag, PageStore};
