//! Opus Challenger RAM disc.
//!
//! The RAM is seen through a 256-byte window at `&FD00-&FDFF`; the page
//! shown there is a 16-bit number split across `&FCFE` (high byte) and
//! `&FCFF` (low byte).
//!
//! Storage is split into 8 KiB chunks shared between clones, so taking a
//! snapshot of the machine costs one pointer per chunk until something is
//! written.

use std::sync::Arc;

use emu_core::{Bus, Observable, Value};

use crate::DiscInterfaceError;

pub const CHALLENGER_CHUNK_SIZE: usize = 8192;

pub const PAGE_HIGH_ADDR: u16 = 0xFCFE;
pub const PAGE_LOW_ADDR: u16 = 0xFCFF;
pub const WINDOW_ADDR: u16 = 0xFD00;

type Chunk = [u8; CHALLENGER_CHUNK_SIZE];

#[derive(Debug, Clone)]
pub struct ChallengerRam {
    page: u16,
    chunks: Vec<Arc<Chunk>>,
}

impl ChallengerRam {
    /// Zeroed RAM of `size` bytes, which must be a non-zero multiple of
    /// [`CHALLENGER_CHUNK_SIZE`].
    pub fn new(size: usize) -> Result<Self, DiscInterfaceError> {
        if size == 0 || size % CHALLENGER_CHUNK_SIZE != 0 {
            return Err(DiscInterfaceError::BadRamSize(size));
        }
        let zero = Arc::new([0; CHALLENGER_CHUNK_SIZE]);
        Ok(Self {
            page: 0,
            chunks: vec![zero; size / CHALLENGER_CHUNK_SIZE],
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len() * CHALLENGER_CHUNK_SIZE
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[must_use]
    pub fn page(&self) -> u16 {
        self.page
    }

    pub fn set_page(&mut self, page: u16) {
        self.page = page;
    }

    /// Chunk index and offset of byte `lsb` of the current page.
    fn locate(&self, lsb: u8) -> Option<(usize, usize)> {
        let addr = usize::from(self.page) << 8 | usize::from(lsb);
        let index = addr / CHALLENGER_CHUNK_SIZE;
        (index < self.chunks.len()).then_some((index, addr % CHALLENGER_CHUNK_SIZE))
    }

    /// Byte `lsb` of the window. Past the end of the RAM the bus floats to
    /// 0 on even addresses and &FF on odd ones.
    #[must_use]
    pub fn read_window(&self, lsb: u8) -> u8 {
        match self.locate(lsb) {
            Some((index, offset)) => self.chunks[index][offset],
            None if lsb & 1 != 0 => 0xFF,
            None => 0,
        }
    }

    pub fn write_window(&mut self, lsb: u8, value: u8) {
        let Some((index, offset)) = self.locate(lsb) else {
            return;
        };
        // Leave shared chunks shared if nothing changes.
        if self.chunks[index][offset] == value {
            return;
        }
        Arc::make_mut(&mut self.chunks[index])[offset] = value;
    }

    /// Byte at absolute offset `addr`, for debuggers.
    #[must_use]
    pub fn peek(&self, addr: usize) -> Option<u8> {
        self.chunks
            .get(addr / CHALLENGER_CHUNK_SIZE)
            .map(|chunk| chunk[addr % CHALLENGER_CHUNK_SIZE])
    }

    /// How many chunks are the same allocation in both.
    #[must_use]
    pub fn shared_chunks(&self, other: &Self) -> usize {
        self.chunks
            .iter()
            .zip(&other.chunks)
            .filter(|(a, b)| Arc::ptr_eq(a, b))
            .count()
    }
}

impl Bus for ChallengerRam {
    fn read(&mut self, address: u16) -> u8 {
        match address {
            PAGE_HIGH_ADDR => (self.page >> 8) as u8,
            PAGE_LOW_ADDR => self.page as u8,
            0xFD00..=0xFDFF => self.read_window(address as u8),
            _ => 0xFF,
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            PAGE_HIGH_ADDR => self.page = self.page & 0x00FF | u16::from(value) << 8,
            PAGE_LOW_ADDR => self.page = self.page & 0xFF00 | u16::from(value),
            0xFD00..=0xFDFF => self.write_window(address as u8, value),
            _ => {}
        }
    }
}

impl Observable for ChallengerRam {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "page" => Some(self.page.into()),
            "size" => Some((self.len() as u64).into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["page", "size"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_must_be_whole_chunks() {
        assert!(ChallengerRam::new(256 * 1024).is_ok());
        assert!(matches!(
            ChallengerRam::new(1000),
            Err(DiscInterfaceError::BadRamSize(1000))
        ));
        assert!(matches!(
            ChallengerRam::new(0),
            Err(DiscInterfaceError::BadRamSize(0))
        ));
    }

    #[test]
    fn paging_registers_read_back() {
        let mut ram = ChallengerRam::new(256 * 1024).expect("ram");
        ram.write(PAGE_HIGH_ADDR, 0x03);
        ram.write(PAGE_LOW_ADDR, 0xFF);
        assert_eq!(ram.page(), 0x03FF);
        assert_eq!(ram.read(PAGE_HIGH_ADDR), 0x03);
        assert_eq!(ram.read(PAGE_LOW_ADDR), 0xFF);
    }

    #[test]
    fn window_addresses_the_paged_ram() {
        let mut ram = ChallengerRam::new(256 * 1024).expect("ram");
        ram.set_page(0x0123);
        ram.write(0xFD45, 0x99);
        assert_eq!(ram.peek(0x12345), Some(0x99));
        ram.set_page(0);
        assert_eq!(ram.read(0xFD45), 0);
    }

    #[test]
    fn past_the_end() {
        let mut ram = ChallengerRam::new(256 * 1024).expect("ram");
        // 256K is pages 0-&3FF.
        ram.set_page(0x0400);
        ram.write(0xFD00, 0x12);
        assert_eq!(ram.read(0xFD00), 0x00);
        assert_eq!(ram.read(0xFD01), 0xFF);
        assert_eq!(ram.peek(0x40000), None);
    }
}
