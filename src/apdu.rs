// src/apdu.rs
use log::debug;
use pcsc::Card;

use crate::error::TransportError;
use crate::page_store::PageStore;
use crate::types::{PAGE_SIZE, PageAddress, PageData};

// Send an APDU and strip the status word. 0x90 0x00 is Success
pub fn transmit(card: &Card, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
    let mut recv_buffer = [0u8; 256];
    let resp = card.transmit(apdu, &mut recv_buffer)?;

    if resp.len() < 2 {
        return Err(TransportError::ShortResponse);
    }
    let (data, sw) = resp.split_at(resp.len() - 2);
    if sw != [0x90, 0x00] {
        return Err(TransportError::Status {
            sw1: sw[0],
            sw2: sw[1],
        });
    }
    Ok(data.to_vec())
}

// Get UID: FF CA 00 00 00
pub fn get_uid(card: &Card) -> Result<Vec<u8>, TransportError> {
    transmit(card, &[0xFF, 0xCA, 0x00, 0x00, 0x00])
}

// Read: FF B0 00 Page Len
pub fn read_binary(card: &Card, page: PageAddress, length: u8) -> Result<Vec<u8>, TransportError> {
    transmit(card, &[0xFF, 0xB0, 0x00, page, length])
}

// Write: FF D6 00 Page Len [Data]
pub fn update_binary(card: &Card, page: PageAddress, data: &[u8]) -> Result<(), TransportError> {
    let mut apdu = vec![0xFF, 0xD6, 0x00, page, data.len() as u8];
    apdu.extend_from_slice(data);
    transmit(card, &apdu).map(|_| ())
}

// Some readers answer a 4-byte read with 16 bytes (four pages), only the first page is ours
fn first_page(data: &[u8]) -> Result<PageData, TransportError> {
    data.get(..PAGE_SIZE)
        .and_then(|page| page.try_into().ok())
        .ok_or(TransportError::ShortResponse)
}

/// Type 2 tag on a PC/SC reader, addressed with ACR-style pseudo-APDUs.
pub struct PcscTag<'a> {
    card: &'a Card,
}

impl<'a> PcscTag<'a> {
    pub fn new(card: &'a Card) -> Self {
        Self { card }
    }
}

impl PageStore for PcscTag<'_> {
    fn read_page(&mut self, page: PageAddress) -> Result<PageData, TransportError> {
        first_page(&read_binary(self.card, page, PAGE_SIZE as u8)?)
    }

    fn write_page(&mut self, page: PageAddress, data: PageData) -> Result<(), TransportError> {
        debug!("Writing page {:02X}: {:02X?}", page, data);
        update_binary(self.card, page, &data)
    }

    fn uid(&mut self) -> Result<Vec<u8>, TransportError> {
        get_uid(self.card)
    }

    fn read_page_fallback(&mut self, page: PageAddress) -> Result<PageData, TransportError> {
        // 1. Standard 4-byte read
        let err = match self.read_page(page) {
            Ok(data) => return Ok(data),
            Err(err) => err,
        };
        debug!("Page {:02X} standard read failed ({}), trying alternatives", page, err);

        // 2. Same read asking for 16 bytes
        if let Ok(data) = read_binary(self.card, page, 0x10) {
            return first_page(&data);
        }

        // 3. No length byte at all
        if let Ok(data) = transmit(self.card, &[0xFF, 0xB0, 0x00, page]) {
            return first_page(&data);
        }

        Err(err)
    }
}
