//! Western Digital WD1770/1772 floppy disc controller.
//!
//! Used by the Acorn 1770 DFS board, the Master 128 and most third-party
//! BBC double density interfaces. The chip is advanced one microsecond at
//! a time with [`Wd1770::update`]; the drive is whatever implements
//! [`Wd1770Handler`].
//!
//! # Registers ($0-$3)
//!
//! | Reg | Read                       | Write                       |
//! |-----|----------------------------|-----------------------------|
//! | $0  | Status (clears INTRQ)      | Command                     |
//! | $1  | Track                      | Track                       |
//! | $2  | Sector                     | Sector                      |
//! | $3  | Data (clears DRQ)          | Data (clears DRQ)           |
//!
//! # Commands
//!
//! | Top nibble | Type | Command                 |
//! |------------|------|-------------------------|
//! | $0         | I    | Restore                 |
//! | $1         | I    | Seek (to data register) |
//! | $2/$3      | I    | Step (last direction)   |
//! | $4/$5      | I    | Step In                 |
//! | $6/$7      | I    | Step Out                |
//! | $8/$9      | II   | Read Sector             |
//! | $A/$B      | II   | Write Sector            |
//! | $C         | III  | Read Address            |
//! | $D         | IV   | Force Interrupt         |
//! | $E         | III  | Read Track              |
//! | $F         | III  | Write Track             |
//!
//! While busy only Force Interrupt is accepted. Errors never leave the
//! chip: they show up as status bits when the command finishes.

mod config;
mod handler;
mod trace;

use std::fmt::{self, Write as _};

use beeb_trace::TraceHandle;
use emu_core::{Bus, InterruptSource, Observable, Value};

pub use config::{Wd1770Config, Wd1770Variant};
pub use handler::{SectorDetails, Wd1770Handler};

// Status register bits. Several mean different things for Type I commands.
pub const STATUS_BUSY: u8 = 0x01;
/// DRQ for Type II/III, index pulse for Type I.
pub const STATUS_DRQ_OR_INDEX: u8 = 0x02;
/// Lost data for Type II/III, track 0 for Type I.
pub const STATUS_LOST_OR_TRACK0: u8 = 0x04;
pub const STATUS_CRC_ERROR: u8 = 0x08;
pub const STATUS_RNF: u8 = 0x10;
/// Deleted data mark for Type II/III, spin-up complete for Type I.
pub const STATUS_DELETED_OR_SPINUP: u8 = 0x20;
pub const STATUS_WRITE_PROTECT: u8 = 0x40;
pub const STATUS_MOTOR_ON: u8 = 0x80;

// Command bits
const CMD_STEP_RATE: u8 = 0x03;
const CMD_VERIFY: u8 = 0x04;
const CMD_NO_SPIN_UP: u8 = 0x08;
const CMD_UPDATE_TRACK: u8 = 0x10;
const CMD_SETTLE_DELAY: u8 = 0x04;
const CMD_MULTIPLE: u8 = 0x10;
const CMD_FORCE_ON_INDEX: u8 = 0x04;
const CMD_FORCE_IMMEDIATE: u8 = 0x08;

const SETTLE_US: u32 = 30_000;

/// Time between bytes of a sector.
const US_PER_BYTE: u32 = 64;

/// One revolution at 300 RPM.
const INDEX_PULSE_US: u32 = 200_000;

/// Gap between finding a sector and its first byte. Watford DDFS stops
/// multi-sector reads with a Force Interrupt about 240us after the last
/// byte, so this has to be a bit longer than that.
const SECTOR_FIND_US: u32 = 300;

/// Largest sector the controller will transfer.
const MAX_SECTOR_SIZE: usize = 1024;

const REGISTER_TRACE_LEN: usize = 1000;
const SECTOR_TRACE_LEN: usize = 16384;

/// Controller state. Each [`Wd1770::update`] call runs the current state
/// once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wd1770State {
    /// Spin down after 10 revolutions if the motor is on.
    BeginIdle,
    IdleWithMotorOff,
    SpinDown,
    /// Count down the wait, then go to the next state.
    Wait,
    /// As `Wait`, then flag spin-up complete.
    WaitForSpinUp,
    /// Track 0 status, then the settle delay if verifying.
    FinishTypeI,
    RecordNotFound,
    /// Clear busy and raise INTRQ.
    FinishCommand,
    /// Step out until track 0.
    Restore,
    Seek,
    /// Account for the step just made, then carry on seeking.
    Seek2,
    /// Step command: one step in the last direction.
    Step,
    /// Issue one step pulse and wait the step rate.
    StepOnce,
    FinishStep,
    StepIn,
    StepOut,
    ReadSector,
    ReadSectorFindSector,
    ReadSectorReadByte,
    ReadSectorNextByte,
    WriteSector,
    WriteSectorFindSector,
    WriteSectorSetFirstDrq,
    WriteSectorReceiveFirstDataByte,
    WriteSectorWriteByte,
    WriteSectorNextByte,
    ReadAddressFindSector,
    ReadAddressNextByte,
    ForceInterrupt,
    ReadTrack,
    WriteTrack,
    /// Report RNF and CRC error.
    UnsupportedCommand,
    WriteProtectError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    In,
    Out,
}

/// Output pins after an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Wd1770Pins {
    pub drq: bool,
    pub intrq: bool,
}

/// WD1770/1772 floppy disc controller driving a `H`.
pub struct Wd1770<H> {
    handler: H,
    config: Wd1770Config,

    status: u8,
    command: u8,
    track: u8,
    sector: u8,
    data: u8,

    dden: bool,
    pins: Wd1770Pins,

    direction: Direction,
    restore_count: u8,
    /// Byte position in the sector or address field.
    offset: usize,
    sector_size: usize,
    address: [u8; 6],

    state: Wd1770State,
    next_state: Wd1770State,
    wait_us: u32,
    state_time: u32,

    /// The sector being transferred, for the trace dump.
    sector_data: [u8; MAX_SECTOR_SIZE],
    trace: Option<TraceHandle>,
}

impl<H: Wd1770Handler> Wd1770<H> {
    #[must_use]
    pub fn new(handler: H, config: Wd1770Config) -> Self {
        Self {
            handler,
            config,
            status: 0,
            command: 0,
            track: 0,
            sector: 0,
            data: 0,
            dden: false,
            pins: Wd1770Pins::default(),
            direction: Direction::In,
            restore_count: 0,
            offset: 0,
            sector_size: 0,
            address: [0; 6],
            state: Wd1770State::BeginIdle,
            next_state: Wd1770State::BeginIdle,
            wait_us: 0,
            state_time: 0,
            sector_data: [0; MAX_SECTOR_SIZE],
            trace: None,
        }
    }

    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    #[must_use]
    pub fn config(&self) -> Wd1770Config {
        self.config
    }

    pub fn set_config(&mut self, config: Wd1770Config) {
        self.config = config;
        if config.no_intrq {
            self.pins.intrq = false;
        }
    }

    /// Select double density (the DDEN pin is active low on the chip;
    /// `true` here means double).
    pub fn set_dden(&mut self, dden: bool) {
        self.dden = dden;
    }

    #[must_use]
    pub fn dden(&self) -> bool {
        self.dden
    }

    /// Record register state and sector dumps into `trace`.
    pub fn attach_trace(&mut self, trace: TraceHandle) {
        self.trace = Some(trace);
    }

    pub fn detach_trace(&mut self) {
        self.trace = None;
    }

    /// Master reset. Track and sector registers and the motor survive.
    pub fn reset(&mut self) {
        self.reset_status();
        self.command = 0;
        self.data = 0;
        self.pins = Wd1770Pins::default();
        self.set_state(Wd1770State::BeginIdle);
        tracing::debug!("1770 reset");
    }

    #[must_use]
    pub fn status(&self) -> u8 {
        self.status
    }

    #[must_use]
    pub fn track(&self) -> u8 {
        self.track
    }

    #[must_use]
    pub fn sector(&self) -> u8 {
        self.sector
    }

    #[must_use]
    pub fn data(&self) -> u8 {
        self.data
    }

    #[must_use]
    pub fn command(&self) -> u8 {
        self.command
    }

    #[must_use]
    pub fn state(&self) -> Wd1770State {
        self.state
    }

    #[must_use]
    pub fn pins(&self) -> Wd1770Pins {
        self.pins
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.status & STATUS_BUSY != 0
    }

    /// Advance by one microsecond.
    pub fn update(&mut self) -> Wd1770Pins {
        let old_state = self.state;

        match self.state {
            Wd1770State::BeginIdle => {
                if self.status & STATUS_MOTOR_ON != 0 {
                    self.wait(10 * INDEX_PULSE_US, Wd1770State::SpinDown);
                } else {
                    self.state = Wd1770State::IdleWithMotorOff;
                }
            }

            Wd1770State::IdleWithMotorOff => {}

            Wd1770State::SpinDown => {
                self.spin_down();
                self.state = Wd1770State::IdleWithMotorOff;
            }

            Wd1770State::Restore => {
                let count = self.restore_count;
                self.restore_count = count.wrapping_add(1);
                if count == 255 && self.command & CMD_VERIFY != 0 {
                    self.set_state(Wd1770State::RecordNotFound);
                } else if self.handler.is_track0() {
                    self.track = 0;
                    self.set_state(Wd1770State::FinishTypeI);
                } else {
                    self.direction = Direction::Out;
                    self.next_state = Wd1770State::Restore;
                    self.set_state(Wd1770State::StepOnce);
                }
            }

            Wd1770State::Seek | Wd1770State::Seek2 => {
                if self.state == Wd1770State::Seek2 {
                    self.track = match self.direction {
                        Direction::In => self.track.wrapping_add(1),
                        Direction::Out => self.track.wrapping_sub(1),
                    };
                }

                if self.track == self.data {
                    self.set_state(Wd1770State::FinishTypeI);
                } else {
                    self.direction = if self.track < self.data {
                        Direction::In
                    } else {
                        Direction::Out
                    };
                    self.set_state(Wd1770State::StepOnce);
                    self.next_state = Wd1770State::Seek2;
                }
            }

            Wd1770State::Step => {
                self.set_state(Wd1770State::StepOnce);
                self.next_state = Wd1770State::FinishStep;
            }

            Wd1770State::StepIn => {
                self.direction = Direction::In;
                self.set_state(Wd1770State::StepOnce);
                self.next_state = Wd1770State::FinishStep;
            }

            Wd1770State::StepOut => {
                self.direction = Direction::Out;
                self.set_state(Wd1770State::StepOnce);
                self.next_state = Wd1770State::FinishStep;
            }

            Wd1770State::FinishStep => {
                if self.command & CMD_UPDATE_TRACK != 0 {
                    self.track = match self.direction {
                        Direction::In => self.track.saturating_add(1),
                        Direction::Out => self.track.saturating_sub(1),
                    };
                }
                self.set_state(Wd1770State::FinishTypeI);
            }

            Wd1770State::StepOnce => {
                let rate_ms = self.step_rate_ms();
                match self.direction {
                    Direction::In => self.handler.step_in(rate_ms),
                    Direction::Out => self.handler.step_out(rate_ms),
                }
                self.wait(rate_ms * 1000, self.next_state);
            }

            Wd1770State::RecordNotFound => {
                // CRC as well: the error was in the ID field.
                self.status |= STATUS_RNF | STATUS_CRC_ERROR;
                self.set_state(Wd1770State::FinishCommand);
            }

            Wd1770State::Wait | Wd1770State::WaitForSpinUp => {
                self.state_time += 1;
                if self.state_time >= self.wait_us {
                    let next = self.next_state;
                    self.set_state(next);
                    self.next_state = Wd1770State::BeginIdle;
                    if old_state == Wd1770State::WaitForSpinUp {
                        self.status |= STATUS_DELETED_OR_SPINUP;
                    }
                }
            }

            Wd1770State::FinishTypeI => {
                self.update_track0_status();
                if self.command & CMD_VERIFY != 0 {
                    self.wait(SETTLE_US, Wd1770State::FinishCommand);
                } else {
                    self.state = Wd1770State::FinishCommand;
                }
            }

            Wd1770State::ForceInterrupt => {
                self.reset_status();
                self.update_track0_status();
                self.set_intrq(self.command & (CMD_FORCE_IMMEDIATE | CMD_FORCE_ON_INDEX) != 0);
                self.set_state(Wd1770State::BeginIdle);
            }

            Wd1770State::FinishCommand => {
                debug_assert!(self.is_busy(), "finishing a command while not busy");
                self.status &= !STATUS_BUSY;
                self.set_intrq(true);
                self.trace_state("");
                self.set_state(Wd1770State::BeginIdle);
            }

            Wd1770State::ReadSector => {
                self.settle_delay(Wd1770State::ReadSectorFindSector);
            }

            Wd1770State::ReadSectorFindSector => {
                if self.find_sector() {
                    self.wait(SECTOR_FIND_US, Wd1770State::ReadSectorReadByte);
                }
            }

            Wd1770State::ReadSectorReadByte => {
                match self.handler.get_byte(self.sector, self.offset) {
                    Some(value) => {
                        self.data = value;
                        if self.pins.drq {
                            // Nobody took the last byte.
                            self.status |= STATUS_LOST_OR_TRACK0;
                        }
                        self.sector_data[self.offset] = value;
                        self.set_drq(true);
                        self.wait(US_PER_BYTE, Wd1770State::ReadSectorNextByte);
                    }
                    None => self.set_state(Wd1770State::RecordNotFound),
                }
            }

            Wd1770State::ReadSectorNextByte => {
                self.next_byte(
                    Wd1770State::ReadSectorReadByte,
                    Wd1770State::ReadSectorFindSector,
                );
            }

            Wd1770State::WriteSector => {
                self.settle_delay(Wd1770State::WriteSectorFindSector);
            }

            Wd1770State::WriteSectorFindSector => {
                if self.handler.is_write_protected() {
                    self.state = Wd1770State::WriteProtectError;
                } else if self.find_sector() {
                    self.wait(SECTOR_FIND_US, Wd1770State::WriteSectorSetFirstDrq);
                }
            }

            Wd1770State::WriteSectorSetFirstDrq => {
                self.set_drq(true);
                self.wait(9 * US_PER_BYTE, Wd1770State::WriteSectorReceiveFirstDataByte);
            }

            Wd1770State::WriteSectorReceiveFirstDataByte => {
                if self.pins.drq {
                    // Underrun before the first byte: give up.
                    self.status |= STATUS_LOST_OR_TRACK0;
                    self.set_state(Wd1770State::FinishCommand);
                } else {
                    self.wait(US_PER_BYTE, Wd1770State::WriteSectorWriteByte);
                }
            }

            Wd1770State::WriteSectorWriteByte => {
                let value = if self.pins.drq {
                    self.status |= STATUS_LOST_OR_TRACK0;
                    0
                } else {
                    self.data
                };
                self.sector_data[self.offset] = value;
                if !self.handler.set_byte(self.sector, self.offset, value) {
                    self.status |= STATUS_LOST_OR_TRACK0;
                }
                self.next_byte(
                    Wd1770State::WriteSectorNextByte,
                    Wd1770State::WriteSectorFindSector,
                );
            }

            Wd1770State::WriteSectorNextByte => {
                self.set_drq(true);
                self.wait(US_PER_BYTE, Wd1770State::WriteSectorWriteByte);
            }

            Wd1770State::ReadAddressFindSector => self.find_address(),

            Wd1770State::ReadAddressNextByte => {
                if self.pins.drq {
                    self.status |= STATUS_LOST_OR_TRACK0;
                }
                if self.offset == self.address.len() {
                    self.state = Wd1770State::FinishCommand;
                } else {
                    self.data = self.address[self.offset];
                    self.set_drq(true);
                    self.offset += 1;
                    self.wait(US_PER_BYTE, Wd1770State::ReadAddressNextByte);
                }
            }

            Wd1770State::ReadTrack | Wd1770State::WriteTrack => {
                self.settle_delay(Wd1770State::UnsupportedCommand);
            }

            Wd1770State::UnsupportedCommand => {
                self.status |= STATUS_CRC_ERROR | STATUS_RNF;
                self.state = Wd1770State::FinishCommand;
            }

            Wd1770State::WriteProtectError => {
                self.status |= STATUS_WRITE_PROTECT;
                self.state = Wd1770State::FinishCommand;
            }
        }

        if self.state != old_state {
            tracing::trace!(from = ?old_state, to = ?self.state, "1770 state change");
        }

        self.pins
    }

    fn write_command(&mut self, value: u8) {
        if self.is_busy() && value & 0xF0 != 0xD0 {
            tracing::debug!(command = value, "1770 busy, refusing command");
            return;
        }

        self.command = value;
        self.set_intrq(false);

        match value & 0xF0 {
            0x00 => {
                self.restore_count = 0;
                self.begin_type_i(Wd1770State::Restore);
            }
            0x10 => self.begin_type_i(Wd1770State::Seek),
            0x20 | 0x30 => self.begin_type_i(Wd1770State::Step),
            0x40 | 0x50 => self.begin_type_i(Wd1770State::StepIn),
            0x60 | 0x70 => self.begin_type_i(Wd1770State::StepOut),
            0x80 | 0x90 => self.begin_type_ii(Wd1770State::ReadSector),
            0xA0 | 0xB0 => self.begin_type_ii(Wd1770State::WriteSector),
            0xC0 => self.begin_type_iii(Wd1770State::ReadAddressFindSector),
            0xD0 => self.begin_type_iv(),
            0xE0 => self.begin_type_iii(Wd1770State::ReadTrack),
            _ => self.begin_type_iii(Wd1770State::WriteTrack),
        }

        tracing::debug!(command = value, state = ?self.state, track = self.track, sector = self.sector, "1770 command");
        self.trace_state("Write Command Register: ");
    }

    fn begin_type_i(&mut self, state: Wd1770State) {
        self.status |= STATUS_BUSY;
        self.status &= !(STATUS_CRC_ERROR | STATUS_RNF);
        self.spin_up_then(state);
    }

    fn begin_type_ii(&mut self, state: Wd1770State) {
        self.status |= STATUS_BUSY;
        self.set_drq(false);
        self.status &= !(STATUS_LOST_OR_TRACK0
            | STATUS_RNF
            | STATUS_DELETED_OR_SPINUP
            | STATUS_WRITE_PROTECT
            | STATUS_CRC_ERROR);
        self.set_intrq(false);
        self.offset = 0;
        self.spin_up_then(state);
    }

    fn begin_type_iii(&mut self, state: Wd1770State) {
        self.reset_status();
        self.status |= STATUS_BUSY;
        self.set_drq(false);
        self.spin_up_then(state);
    }

    fn begin_type_iv(&mut self) {
        if self.is_busy() {
            self.status &= !STATUS_BUSY;
            self.set_state(Wd1770State::BeginIdle);
        } else if self.command & CMD_FORCE_IMMEDIATE != 0 {
            self.set_state(Wd1770State::ForceInterrupt);
        } else if self.command & CMD_FORCE_ON_INDEX != 0 {
            self.wait(INDEX_PULSE_US, Wd1770State::ForceInterrupt);
        } else if self.command & 0x0F == 0 {
            self.set_state(Wd1770State::ForceInterrupt);
        }
    }

    /// Wait 6 revolutions for the motor unless it's already on or the
    /// command's `h` bit says not to.
    fn spin_up_then(&mut self, state: Wd1770State) {
        if self.command & CMD_NO_SPIN_UP == 0 && self.status & STATUS_MOTOR_ON == 0 {
            self.handler.spin_up();
            self.status |= STATUS_MOTOR_ON;
            self.status &= !STATUS_DELETED_OR_SPINUP;
            self.wait_us = 6 * INDEX_PULSE_US;
            self.set_state(Wd1770State::WaitForSpinUp);
            self.next_state = state;
        } else {
            self.status |= STATUS_DELETED_OR_SPINUP;
            self.set_state(state);
        }
    }

    fn spin_down(&mut self) {
        self.handler.spin_down();
        self.status &= !STATUS_MOTOR_ON;
    }

    /// The 30ms E delay for Type II/III commands, if asked for.
    fn settle_delay(&mut self, next_state: Wd1770State) {
        self.sector_data.fill(0);
        if self.command & CMD_SETTLE_DELAY != 0 {
            self.wait(SETTLE_US, next_state);
        } else {
            self.state = next_state;
        }
    }

    /// Look up the current sector. If it's missing, on another track or
    /// too big, spend 6 revolutions looking and then report RNF.
    fn find_sector(&mut self) -> bool {
        let found = self
            .handler
            .get_sector_details(self.sector, self.dden)
            .filter(|details| details.track == self.track && details.size <= MAX_SECTOR_SIZE);

        match found {
            Some(details) => {
                self.sector_size = details.size;
                self.status &= !STATUS_DELETED_OR_SPINUP;
                true
            }
            None => {
                self.wait(6 * INDEX_PULSE_US, Wd1770State::RecordNotFound);
                false
            }
        }
    }

    /// Read Address takes whichever ID field comes round next, which is
    /// always taken to be sector 0's.
    fn find_address(&mut self) {
        let Some(details) = self.handler.get_sector_details(0, self.dden) else {
            self.set_state(Wd1770State::RecordNotFound);
            return;
        };
        let size_code = match details.size {
            128 => 0,
            256 => 1,
            512 => 2,
            1024 => 3,
            _ => {
                self.state = Wd1770State::RecordNotFound;
                return;
            }
        };

        // CRC bytes are not modelled.
        self.address = [details.track, details.side, 0, size_code, 0, 0];
        self.sector = details.track;
        self.offset = 0;
        self.status &= !STATUS_DELETED_OR_SPINUP;
        self.trace_text(format_args!(
            "1770 - Read Address: Track={}, Side={}, Sector=0, Size={size_code} ({} bytes), CRC1=0, CRC2=0",
            details.track, details.side, details.size,
        ));
        self.state = Wd1770State::ReadAddressNextByte;
    }

    /// Move on a byte. At the end of the sector, carry on with the next
    /// sector for multi-sector commands or finish.
    fn next_byte(&mut self, next_byte_state: Wd1770State, next_sector_state: Wd1770State) {
        self.offset += 1;
        if self.offset < self.sector_size {
            self.set_state(next_byte_state);
            return;
        }

        self.offset = 0;
        self.trace_sector();
        if self.command & CMD_MULTIPLE != 0 {
            self.sector = self.sector.wrapping_add(1);
            self.set_state(next_sector_state);
        } else {
            self.set_state(Wd1770State::FinishCommand);
        }
    }

    fn step_rate_ms(&self) -> u32 {
        self.config.variant.step_rates_ms()[usize::from(self.command & CMD_STEP_RATE)]
    }

    fn update_track0_status(&mut self) {
        if self.handler.is_track0() {
            self.status |= STATUS_LOST_OR_TRACK0;
        } else {
            self.status &= !STATUS_LOST_OR_TRACK0;
        }
    }

    fn reset_status(&mut self) {
        self.status &= STATUS_MOTOR_ON;
    }

    fn set_state(&mut self, state: Wd1770State) {
        self.state = state;
        self.state_time = 0;
    }

    fn wait(&mut self, us: u32, next_state: Wd1770State) {
        self.wait_us = us;
        self.set_state(Wd1770State::Wait);
        self.next_state = next_state;
    }

    fn set_drq(&mut self, drq: bool) {
        self.pins.drq = drq;
        if drq {
            self.status |= STATUS_DRQ_OR_INDEX;
            self.trace_state("SetDRQ: ");
        } else {
            self.status &= !STATUS_DRQ_OR_INDEX;
        }
    }

    fn set_intrq(&mut self, intrq: bool) {
        self.pins.intrq = intrq && !self.config.no_intrq;
    }

    fn write_registers<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        write!(
            out,
            "{:?} T{:02} S{:02} +{:03} (+0x{:02X}); Cmd: 0x{:02X}; Status: 0x{:02X}",
            self.state, self.track, self.sector, self.offset, self.offset, self.command, self.status,
        )?;
        if self.status != 0 {
            write!(out, " ({})", trace::status_bit_names(self.status))?;
        }
        write!(out, "; Data: {} (0x{:02X}", self.data, self.data)?;
        if self.data.is_ascii_graphic() || self.data == b' ' {
            write!(out, "; '{}'", char::from(self.data))?;
        }
        write!(
            out,
            "); DRQ={} INTRQ={}",
            u8::from(self.pins.drq),
            u8::from(self.pins.intrq)
        )
    }

    fn trace_state(&self, what: &str) {
        let Some(trace) = &self.trace else {
            return;
        };
        let mut trace = trace.borrow_mut();
        if let Some(mut log) = trace.log_writer(REGISTER_TRACE_LEN) {
            let _ = write!(log, "1770 - {what}");
            let _ = self.write_registers(&mut log);
            let _ = log.finish();
        }
    }

    fn trace_sector(&self) {
        let Some(trace) = &self.trace else {
            return;
        };
        let mut trace = trace.borrow_mut();
        if let Some(mut log) = trace.log_writer(SECTOR_TRACE_LEN) {
            let _ = log.write_str("1770 - got sector: ");
            let _ = self.write_registers(&mut log);
            let _ = log.write_char('\n');
            let _ = trace::hex_dump(&mut log, &self.sector_data[..self.sector_size]);
            let _ = log.finish();
        }
    }

    fn trace_text(&self, args: fmt::Arguments<'_>) {
        if let Some(trace) = &self.trace {
            trace.borrow_mut().alloc_fmt(args);
        }
    }
}

impl<H: Wd1770Handler> Bus for Wd1770<H> {
    fn read(&mut self, address: u16) -> u8 {
        match address & 3 {
            0 => {
                self.set_intrq(false);
                self.status
            }
            1 => self.track,
            2 => self.sector,
            _ => {
                self.set_drq(false);
                self.data
            }
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        match address & 3 {
            0 => self.write_command(value),
            1 => {
                self.track = value;
                self.trace_state("Write Track Register: ");
            }
            2 => {
                self.sector = value;
                self.trace_state("Write Sector Register: ");
            }
            _ => {
                self.set_drq(false);
                self.data = value;
            }
        }
    }
}

/// On the BBC INTRQ goes to the CPU's NMI.
impl<H> InterruptSource for Wd1770<H> {
    fn irq(&self) -> bool {
        false
    }

    fn nmi(&self) -> bool {
        self.pins.intrq
    }
}

impl<H> Observable for Wd1770<H> {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "state" => Some(format!("{:?}", self.state).as_str().into()),
            "status" => Some(self.status.into()),
            "command" => Some(self.command.into()),
            "track" => Some(self.track.into()),
            "sector" => Some(self.sector.into()),
            "data" => Some(self.data.into()),
            "drq" => Some(self.pins.drq.into()),
            "intrq" => Some(self.pins.intrq.into()),
            "dden" => Some(self.dden.into()),
            "motor" => Some((self.status & STATUS_MOTOR_ON != 0).into()),
            "offset" => Some((self.offset as u64).into()),
            "wait_us" => Some(u64::from(self.wait_us.saturating_sub(self.state_time)).into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "state", "status", "command", "track", "sector", "data", "drq", "intrq", "dden",
            "motor", "offset", "wait_us",
        ]
    }
}
