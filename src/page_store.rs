// src/page_store.rs
use crate::error::TransportError;
use crate::types::{PageAddress, PageData};

/// Page-level access to a Type 2 tag. Each call is one blocking request/response;
/// retries and timeouts belong to the implementation, not to callers here.
pub trait PageStore {
    fn read_page(&mut self, page: PageAddress) -> Result<PageData, TransportError>;

    fn write_page(&mut self, page: PageAddress, data: PageData) -> Result<(), TransportError>;

    fn uid(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Read that may try other command forms before giving up.
    fn read_page_fallback(&mut self, page: PageAddress) -> Result<PageData, TransportError> {
        self.read_page(page)
    }
}

impl<S: PageStore + ?Sized> PageStore for &mut S {
    fn read_page(&mut self, page: PageAddress) -> Result<PageData, TransportError> {
        (**self).read_page(page)
    }

    fn write_page(&mut self, page: PageAddress, data: PageData) -> Result<(), TransportError> {
        (**self).write_page(page, data)
    }

    fn uid(&mut self) -> Result<Vec<u8>, TransportError> {
        (**self).uid()
    }

    fn read_page_fallback(&mut self, page: PageAddress) -> Result<PageData, TransportError> {
        (**self).read_page_fallback(page)
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Operation {
    Read(PageAddress),
    Write(PageAddress, PageData),
    Uid,
}

// What an ACR-style reader answers when the tag does not respond
const NO_RESPONSE: TransportError = TransportError::Status {
    sw1: 0x63,
    sw2: 0x00,
};

/// Tag image held in memory. Pages past the end do not answer, which is what the
/// topology probes look for.
#[derive(Debug, Clone)]
pub struct MemoryTag {
    pages: Vec<PageData>,
    uid: Vec<u8>,
    pub fail_after_operation: usize,
    pub operations: Vec<Operation>,
}

impl MemoryTag {
    /// Blank tag with `page_count` pages and the 7-byte UID laid out over pages 0-2.
    pub fn new(uid: [u8; 7], page_count: usize) -> Self {
        let mut pages = vec![[0u8; 4]; page_count.max(3)];
        let bcc0 = 0x88 ^ uid[0] ^ uid[1] ^ uid[2];
        let bcc1 = uid[3] ^ uid[4] ^ uid[5] ^ uid[6];
        pages[0] = [uid[0], uid[1], uid[2], bcc0];
        pages[1] = [uid[3], uid[4], uid[5], uid[6]];
        pages[2] = [bcc1, 0x48, 0x00, 0x00];

        Self {
            pages,
            uid: uid.to_vec(),
            fail_after_operation: usize::MAX,
            operations: Vec::new(),
        }
    }

    pub fn with_fault(mut self, fail_after_operation: usize) -> Self {
        self.fail_after_operation = fail_after_operation;
        self
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, page: PageAddress) -> Option<PageData> {
        self.pages.get(page as usize).copied()
    }

    /// Direct image edit, not recorded as an operation.
    pub fn set_page(&mut self, page: PageAddress, data: PageData) {
        if let Some(slot) = self.pages.get_mut(page as usize) {
            *slot = data;
        }
    }

    pub fn load(&mut self, start: PageAddress, bytes: &[u8]) {
        for (i, chunk) in bytes.chunks(4).enumerate() {
            let mut data = [0u8; 4];
            data[..chunk.len()].copy_from_slice(chunk);
            self.set_page(start.saturating_add(i as u8), data);
        }
    }

    pub fn writes(&self) -> Vec<(PageAddress, PageData)> {
        self.operations
            .iter()
            .filter_map(|op| match op {
                Operation::Write(page, data) => Some((*page, *data)),
                _ => None,
            })
            .collect()
    }

    fn record(&mut self, op: Operation) -> Result<(), TransportError> {
        if self.operations.len() >= self.fail_after_operation {
            return Err(NO_RESPONSE);
        }
        self.operations.push(op);
        Ok(())
    }
}

impl PageStore for MemoryTag {
    fn read_page(&mut self, page: PageAddress) -> Result<PageData, TransportError> {
        self.record(Operation::Read(page))?;
        self.page(page).ok_or(NO_RESPONSE)
    }

    fn write_page(&mut self, page: PageAddress, data: PageData) -> Result<(), TransportError> {
        self.record(Operation::Write(page, data))?;
        let slot = self.pages.get_mut(page as usize).ok_or(NO_RESPONSE)?;
        *slot = data;
        Ok(())
    }

    fn uid(&mut self) -> Result<Vec<u8>, TransportError> {
        self.record(Operation::Uid)?;
        Ok(self.uid.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UID: [u8; 7] = [0x04, 0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6];

    #[test]
    fn uid_is_laid_out_with_check_bytes() {
        let tag = MemoryTag::new(UID, 16);
        assert_eq!(tag.page(0), Some([0x04, 0xA1, 0xB2, 0x88 ^ 0x04 ^ 0xA1 ^ 0xB2]));
        assert_eq!(tag.page(1), Some([0xC3, 0xD4, 0xE5, 0xF6]));
        assert_eq!(tag.page(2).unwrap()[0], 0xC3 ^ 0xD4 ^ 0xE5 ^ 0xF6);
    }

    #[test]
    fn reads_past_the_end_fail() {
        let mut tag = MemoryTag::new(UID, 16);
        assert!(tag.read_page(15).is_ok());
        assert_eq!(tag.read_page(16), Err(NO_RESPONSE));
        assert_eq!(tag.operations, vec![Operation::Read(15), Operation::Read(16)]);
    }

    #[test]
    fn fault_injection_stops_all_operations() {
        let mut tag = MemoryTag::new(UID, 16).with_fault(1);
        assert!(tag.write_page(4, [1, 2, 3, 4]).is_ok());
        assert!(tag.write_page(5, [1, 2, 3, 4]).is_err());
        assert!(tag.uid().is_err());
        assert_eq!(tag.page(5), Some([0; 4]));
    }

    #[test]
    fn load_splits_into_pages() {
        let mut tag = MemoryTag::new(UID, 16);
        tag.load(4, &[1, 2, 3, 4, 5, 6]);
        assert_eq!(tag.page(4), Some([1, 2, 3, 4]));
        assert_eq!(tag.page(5), Some([5, 6, 0, 0]));
        assert!(tag.operations.is_empty());
    }
}
