use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use wd_1770::{Wd1770Config, Wd1770Variant};

use crate::DiscInterfaceError;

/// Board properties that affect how the machine wires it up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DiscInterfaceFlags(u8);

impl DiscInterfaceFlags {
    pub const NONE: Self = Self(0);
    /// INTRQ isn't connected.
    pub const NO_INTRQ: Self = Self(1 << 0);
    /// Fitted with a 1772 rather than a 1770.
    pub const WD1772: Self = Self(1 << 1);
    /// Lives in page &FC, so can't coexist with other 1 MHz bus hardware.
    pub const USES_1MHZ_BUS: Self = Self(1 << 2);
    /// The control latch can't be read back.
    pub const CONTROL_IS_READ_ONLY: Self = Self(1 << 3);

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DiscInterfaceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// The control latch decoded into what it does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscControl {
    /// `None` when no drive select bit is set.
    pub drive: Option<u8>,
    /// Double density.
    pub dden: bool,
    pub side: bool,
    /// The FDC's reset line is asserted.
    pub reset: bool,
}

/// The supported disc interface boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscInterfaceKind {
    #[serde(rename = "acorn_1770")]
    Acorn1770,
    #[serde(rename = "watford_ddb2")]
    WatfordDdb2,
    #[serde(rename = "watford_ddb3")]
    WatfordDdb3,
    #[serde(rename = "opus_1770")]
    Opus1770,
    #[serde(rename = "challenger_256k")]
    Challenger256K,
    #[serde(rename = "challenger_512k")]
    Challenger512K,
    #[serde(rename = "master_128")]
    Master128,
}

impl DiscInterfaceKind {
    pub const ALL: [Self; 7] = [
        Self::Acorn1770,
        Self::WatfordDdb2,
        Self::WatfordDdb3,
        Self::Opus1770,
        Self::Challenger256K,
        Self::Challenger512K,
        Self::Master128,
    ];

    /// The boards that fit a model B. The Master's controller is built in.
    pub const MODEL_B: [Self; 6] = [
        Self::Acorn1770,
        Self::WatfordDdb2,
        Self::WatfordDdb3,
        Self::Opus1770,
        Self::Challenger256K,
        Self::Challenger512K,
    ];

    /// Name used in config files.
    #[must_use]
    pub fn config_name(self) -> &'static str {
        match self {
            Self::Acorn1770 => "acorn_1770",
            Self::WatfordDdb2 => "watford_ddb2",
            Self::WatfordDdb3 => "watford_ddb3",
            Self::Opus1770 => "opus_1770",
            Self::Challenger256K => "challenger_256k",
            Self::Challenger512K => "challenger_512k",
            Self::Master128 => "master_128",
        }
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Acorn1770 => "Acorn 1770",
            Self::WatfordDdb2 => "Watford 1770 (DDB2)",
            Self::WatfordDdb3 => "Watford 1770 (DDB3)",
            Self::Opus1770 => "Opus 1770",
            Self::Challenger256K => "Opus CHALLENGER 256K",
            Self::Challenger512K => "Opus CHALLENGER 512K",
            Self::Master128 => "Master 128",
        }
    }

    /// Filing system ROM the board ships with. The Master's DFS is part of
    /// the MOS.
    #[must_use]
    pub fn fs_rom(self) -> Option<&'static str> {
        match self {
            Self::Acorn1770 => Some("DFS-2.26.rom"),
            Self::WatfordDdb2 => Some("DDFS-1.53.rom"),
            Self::WatfordDdb3 => Some("DDFS-1.54T.rom"),
            Self::Opus1770 => Some("OPUS-DDOS-3.45.rom"),
            Self::Challenger256K | Self::Challenger512K => Some("challenger-1.01.rom"),
            Self::Master128 => None,
        }
    }

    /// Base of the FDC's four registers.
    #[must_use]
    pub fn fdc_addr(self) -> u16 {
        match self {
            Self::Acorn1770 | Self::WatfordDdb2 | Self::WatfordDdb3 => 0xFE84,
            Self::Opus1770 => 0xFE80,
            Self::Challenger256K | Self::Challenger512K => 0xFCF8,
            Self::Master128 => 0xFE28,
        }
    }

    #[must_use]
    pub fn control_addr(self) -> u16 {
        match self {
            Self::Acorn1770 | Self::WatfordDdb2 | Self::WatfordDdb3 => 0xFE80,
            Self::Opus1770 => 0xFE84,
            Self::Challenger256K | Self::Challenger512K => 0xFCFC,
            Self::Master128 => 0xFE24,
        }
    }

    #[must_use]
    pub fn flags(self) -> DiscInterfaceFlags {
        match self {
            Self::Challenger256K | Self::Challenger512K => {
                DiscInterfaceFlags::NO_INTRQ | DiscInterfaceFlags::USES_1MHZ_BUS
            }
            Self::Master128 => DiscInterfaceFlags::WD1772,
            _ => DiscInterfaceFlags::NONE,
        }
    }

    /// Size of the board's RAM disc, if it has one.
    #[must_use]
    pub fn ram_size(self) -> Option<usize> {
        match self {
            Self::Challenger256K => Some(256 * 1024),
            Self::Challenger512K => Some(512 * 1024),
            _ => None,
        }
    }

    /// FDC setup implied by the flags.
    #[must_use]
    pub fn wd1770_config(self) -> Wd1770Config {
        let flags = self.flags();
        Wd1770Config {
            variant: if flags.contains(DiscInterfaceFlags::WD1772) {
                Wd1770Variant::Wd1772
            } else {
                Wd1770Variant::Wd1770
            },
            no_intrq: flags.contains(DiscInterfaceFlags::NO_INTRQ),
        }
    }

    /// Decode a byte written to the control latch.
    #[must_use]
    pub fn control_from_byte(self, value: u8) -> DiscControl {
        match self {
            // DFS 2.26 polls `LDA &FE80: AND #3: BEQ` waiting for a drive,
            // so with neither bit set the selection is indeterminate.
            Self::Acorn1770 | Self::WatfordDdb3 => DiscControl {
                drive: select_bits(value, 0x01, 0x02),
                dden: value & 0x08 == 0,
                side: value & 0x04 != 0,
                reset: value & 0x20 == 0,
            },
            Self::WatfordDdb2 => DiscControl {
                drive: Some(u8::from(value & 0x04 != 0)),
                dden: value & 0x01 == 0,
                side: value & 0x02 != 0,
                reset: value & 0x08 == 0,
            },
            Self::Opus1770 => DiscControl {
                drive: Some(value & 0x01),
                dden: value & 0x40 != 0,
                side: value & 0x02 != 0,
                reset: false,
            },
            Self::Challenger256K | Self::Challenger512K => DiscControl {
                drive: select_bits(value, 0x02, 0x04),
                dden: value & 0x20 == 0,
                side: value & 0x01 != 0,
                reset: false,
            },
            Self::Master128 => DiscControl {
                drive: select_bits(value, 0x01, 0x02),
                dden: value & 0x20 == 0,
                side: value & 0x10 != 0,
                reset: value & 0x04 == 0,
            },
        }
    }

    /// What reading the control latch gives back for `control`. Bits the
    /// board doesn't latch read as 0.
    #[must_use]
    pub fn byte_from_control(self, control: DiscControl) -> u8 {
        let mut value = 0;
        match self {
            // Both bits clear would fail the DFS's detection loop, so
            // anything other than drive 0 reads back as drive 1. The
            // density bit reads back inverted.
            Self::Acorn1770 | Self::WatfordDdb3 => {
                if control.dden {
                    value |= 0x08;
                }
                if control.side {
                    value |= 0x04;
                }
                value |= if control.drive == Some(0) { 0x01 } else { 0x02 };
            }
            Self::WatfordDdb2 => {
                if !control.dden {
                    value |= 0x01;
                }
                if control.side {
                    value |= 0x02;
                }
                if control.drive.is_some_and(|drive| drive != 0) {
                    value |= 0x04;
                }
            }
            Self::Opus1770 => {
                if control.dden {
                    value |= 0x40;
                }
                if control.side {
                    value |= 0x02;
                }
                if control.drive.is_some_and(|drive| drive != 0) {
                    value |= 0x01;
                }
            }
            Self::Challenger256K | Self::Challenger512K => {
                if !control.dden {
                    value |= 0x20;
                }
                if control.side {
                    value |= 0x01;
                }
                match control.drive {
                    Some(0) => value |= 0x02,
                    Some(1) => value |= 0x04,
                    _ => {}
                }
            }
            Self::Master128 => {
                if !control.dden {
                    value |= 0x20;
                }
                if control.side {
                    value |= 0x10;
                }
                match control.drive {
                    Some(0) => value |= 0x01,
                    Some(1) => value |= 0x02,
                    _ => {}
                }
            }
        }
        value
    }
}

/// Drive 0 if `drive0` is set, else drive 1 if `drive1` is set.
fn select_bits(value: u8, drive0: u8, drive1: u8) -> Option<u8> {
    if value & drive0 != 0 {
        Some(0)
    } else if value & drive1 != 0 {
        Some(1)
    } else {
        None
    }
}

impl fmt::Display for DiscInterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for DiscInterfaceKind {
    type Err = DiscInterfaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.config_name() == s)
            .ok_or_else(|| DiscInterfaceError::UnknownInterface(s.to_owned()))
    }
}
