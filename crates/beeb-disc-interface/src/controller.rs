use std::fmt::Write;

use beeb_trace::TraceHandle;
use emu_core::{Bus, InterruptSource, Observable, Value};
use wd_1770::{Wd1770, Wd1770Handler, Wd1770Pins};

use crate::{DiscControl, DiscInterfaceFlags, DiscInterfaceKind};

/// The drives behind an interface board.
pub trait DiscDrives: Wd1770Handler {
    /// The control latch changed. `drive` is `None` when no drive is
    /// selected; sector accesses should then fail.
    fn select(&mut self, drive: Option<u8>, side: bool);
}

impl<T: DiscDrives + ?Sized> DiscDrives for &mut T {
    fn select(&mut self, drive: Option<u8>, side: bool) {
        (**self).select(drive, side);
    }
}

/// An interface board: the FDC plus its drive control latch, decoded at
/// the board's addresses.
pub struct DiscController<H> {
    kind: DiscInterfaceKind,
    fdc: Wd1770<H>,
    control: DiscControl,
    trace: Option<TraceHandle>,
}

impl<H: DiscDrives> DiscController<H> {
    #[must_use]
    pub fn new(kind: DiscInterfaceKind, drives: H) -> Self {
        Self {
            kind,
            fdc: Wd1770::new(drives, kind.wd1770_config()),
            control: DiscControl::default(),
            trace: None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> DiscInterfaceKind {
        self.kind
    }

    #[must_use]
    pub fn fdc(&self) -> &Wd1770<H> {
        &self.fdc
    }

    pub fn fdc_mut(&mut self) -> &mut Wd1770<H> {
        &mut self.fdc
    }

    #[must_use]
    pub fn drives(&self) -> &H {
        self.fdc.handler()
    }

    pub fn drives_mut(&mut self) -> &mut H {
        self.fdc.handler_mut()
    }

    #[must_use]
    pub fn control(&self) -> DiscControl {
        self.control
    }

    /// Trace control writes and everything the FDC does.
    pub fn attach_trace(&mut self, trace: TraceHandle) {
        self.fdc.attach_trace(trace.clone());
        self.trace = Some(trace);
    }

    pub fn detach_trace(&mut self) {
        self.fdc.detach_trace();
        self.trace = None;
    }

    /// Advance the FDC by 1 µs.
    pub fn update(&mut self) -> Wd1770Pins {
        self.fdc.update()
    }

    /// Machine reset: the FDC is reset and the latch cleared.
    pub fn reset(&mut self) {
        self.control = DiscControl::default();
        self.fdc.reset();
        self.fdc.set_dden(false);
    }

    /// Does `address` belong to this board?
    #[must_use]
    pub fn decodes(&self, address: u16) -> bool {
        self.fdc_register(address).is_some() || address == self.kind.control_addr()
    }

    fn fdc_register(&self, address: u16) -> Option<u16> {
        let offset = address.wrapping_sub(self.kind.fdc_addr());
        (offset < 4).then_some(offset)
    }

    fn read_control(&self) -> u8 {
        if self.kind.flags().contains(DiscInterfaceFlags::CONTROL_IS_READ_ONLY) {
            return 0xFF;
        }
        self.kind.byte_from_control(self.control)
    }

    fn write_control(&mut self, value: u8) {
        let control = self.kind.control_from_byte(value);
        self.control = control;

        tracing::debug!(
            value,
            reset = control.reset,
            dden = control.dden,
            drive = ?control.drive,
            side = control.side,
            "disc control write"
        );
        if let Some(trace) = &self.trace {
            let mut trace = trace.borrow_mut();
            if let Some(mut log) = trace.log_writer(100) {
                let _ = write!(
                    log,
                    "1770 - Control Register: Reset={}; DDEN={}; drive={}, side={}",
                    u8::from(control.reset),
                    u8::from(control.dden),
                    control.drive.map_or(-1, i16::from),
                    u8::from(control.side),
                );
                let _ = log.finish();
            }
        }

        if control.reset {
            self.fdc.reset();
        }
        self.fdc.set_dden(control.dden);
        self.fdc.handler_mut().select(control.drive, control.side);
    }
}

impl<H: DiscDrives> Bus for DiscController<H> {
    fn read(&mut self, address: u16) -> u8 {
        match self.fdc_register(address) {
            Some(register) => self.fdc.read(register),
            None if address == self.kind.control_addr() => self.read_control(),
            None => 0xFF,
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        match self.fdc_register(address) {
            Some(register) => self.fdc.write(register, value),
            None if address == self.kind.control_addr() => self.write_control(value),
            None => {}
        }
    }
}

impl<H> InterruptSource for DiscController<H> {
    fn irq(&self) -> bool {
        false
    }

    fn nmi(&self) -> bool {
        self.fdc.nmi()
    }
}

impl<H> Observable for DiscController<H> {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "interface" => Some(self.kind.config_name().into()),
            "control.drive" => Some(self.control.drive.unwrap_or(0xFF).into()),
            "control.dden" => Some(self.control.dden.into()),
            "control.side" => Some(self.control.side.into()),
            "control.reset" => Some(self.control.reset.into()),
            _ => self.fdc.query(path.strip_prefix("fdc.")?),
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "interface",
            "control.drive",
            "control.dden",
            "control.side",
            "control.reset",
            "fdc.state",
            "fdc.status",
            "fdc.command",
            "fdc.track",
            "fdc.sector",
            "fdc.data",
            "fdc.drq",
            "fdc.intrq",
            "fdc.dden",
            "fdc.motor",
            "fdc.offset",
            "fdc.wait_us",
        ]
    }
}
