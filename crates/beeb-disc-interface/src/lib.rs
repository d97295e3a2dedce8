//! BBC Micro 1770 disc interface boards.
//!
//! Every board pairs a WD1770 or 1772 with a control latch that selects
//! the drive, side and density and can hold the FDC in reset.
//! The boards differ in where they decode and in how the latch bits are
//! arranged:
//!
//! | Board                | FDC     | Control | Notes                    |
//! |----------------------|---------|---------|--------------------------|
//! | Acorn 1770           | `&FE84` | `&FE80` | B+ and B+128 too         |
//! | Watford DDB2         | `&FE84` | `&FE80` |                          |
//! | Watford DDB3         | `&FE84` | `&FE80` | Acorn-compatible latch   |
//! | Opus 1770            | `&FE80` | `&FE84` | no reset bit             |
//! | Opus Challenger      | `&FCF8` | `&FCFC` | no INTRQ, 256K/512K RAM  |
//! | Master 128           | `&FE28` | `&FE24` | 1772                     |
//!
//! [`DiscController`] puts the FDC and latch behind one [`emu_core::Bus`];
//! the Challenger's RAM disc is a separate [`ChallengerRam`] device in
//! pages `&FC` and `&FD`.

mod challenger;
mod controller;
mod interface;

use thiserror::Error;

pub use challenger::{
    CHALLENGER_CHUNK_SIZE, ChallengerRam, PAGE_HIGH_ADDR, PAGE_LOW_ADDR, WINDOW_ADDR,
};
pub use controller::{DiscController, DiscDrives};
pub use interface::{DiscControl, DiscInterfaceFlags, DiscInterfaceKind};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiscInterfaceError {
    #[error("unknown disc interface: {0}")]
    UnknownInterface(String),
    #[error("Challenger RAM size {0} is not a whole number of 8 KiB chunks")]
    BadRamSize(usize),
}

impl DiscInterfaceKind {
    /// The board's RAM disc, if it has one.
    pub fn create_ram(self) -> Result<Option<ChallengerRam>, DiscInterfaceError> {
        self.ram_size().map(ChallengerRam::new).transpose()
    }
}
