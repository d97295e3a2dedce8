//! Acorn Tube ULA.
//!
//! Four byte channels between the host BBC Micro and a second processor,
//! each with a status latch on both sides. The host sees the ULA at
//! `&FEE0-&FEE7` and the parasite at `&FEF8-&FEFF`; both use the low three
//! address bits:
//!
//! | Reg | Read                          | Write (host)  | Write (parasite) |
//! |-----|-------------------------------|---------------|------------------|
//! | 0   | FIFO1 status + control bits   | Control       | -                |
//! | 1   | FIFO1 data                    | FIFO1 data    | FIFO1 data       |
//! | 2   | FIFO2 status                  | -             | -                |
//! | 3   | FIFO2 data                    | FIFO2 data    | FIFO2 data       |
//! | 4   | FIFO3 status                  | -             | -                |
//! | 5   | FIFO3 data                    | FIFO3 data    | FIFO3 data       |
//! | 6   | FIFO4 status                  | -             | -                |
//! | 7   | FIFO4 data                    | FIFO4 data    | FIFO4 data       |
//!
//! Status bytes have bit 7 set when there is data to read and bit 6 set
//! when there is room to write.
//!
//! # Control register
//!
//! Bits 0-6 are Q, I, J, M, V, P, T. Writing with bit 7 set sets the
//! selected bits, writing with it clear clears them.
//!
//! - Q: host IRQ when FIFO4 has data for the host.
//! - I, J: parasite IRQ when FIFO1 / FIFO4 have data for the parasite.
//! - M: parasite NMI from FIFO3.
//! - V: FIFO3 holds 2 bytes instead of 1.
//! - P: hold the parasite in reset.
//! - T: clear the FIFOs.
//!
//! P and T act through [`Tube::service_control`], which the machine calls
//! once per parasite cycle.

mod trace;

use std::collections::VecDeque;

use beeb_trace::TraceHandle;
use emu_core::{Bus, InterruptSource, Observable, Value};

pub use trace::{TubeEventFormatter, TubeTraceEvents};

/// Depth of the parasite-to-host side of FIFO1.
pub const FIFO1_QUEUE_LEN: usize = 24;

/// FIFO3 read by the host while empty.
pub const FIFO3_HOST_EMPTY_VALUE: u8 = 0xE4;
/// FIFO3 read by the parasite while empty.
pub const FIFO3_PARASITE_EMPTY_VALUE: u8 = 0x96;

// Control register bits
pub const STATUS_Q: u8 = 0x01;
pub const STATUS_I: u8 = 0x02;
pub const STATUS_J: u8 = 0x04;
pub const STATUS_M: u8 = 0x08;
pub const STATUS_V: u8 = 0x10;
pub const STATUS_P: u8 = 0x20;
pub const STATUS_T: u8 = 0x40;
const STATUS_SET: u8 = 0x80;

// FIFO status register bits
pub const FIFO_NOT_FULL: u8 = 0x40;
pub const FIFO_AVAILABLE: u8 = 0x80;

/// One side's view of one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FifoStatus {
    not_full: bool,
    available: bool,
}

impl FifoStatus {
    const EMPTY: Self = Self {
        not_full: true,
        available: false,
    };

    fn value(self) -> u8 {
        let mut value = 0;
        if self.not_full {
            value |= FIFO_NOT_FULL;
        }
        if self.available {
            value |= FIFO_AVAILABLE;
        }
        value
    }
}

/// Consumer side took the byte: producer may write again.
fn update_latch_for_read(this: &mut FifoStatus, other: &mut FifoStatus) {
    if this.available {
        this.available = false;
        other.not_full = true;
    }
}

/// Producer side wrote a byte: consumer has something to read.
fn update_latch_for_write(this: &mut FifoStatus, other: &mut FifoStatus) {
    this.not_full = false;
    other.available = true;
}

/// A FIFO3 direction: up to two bytes and a count.
#[derive(Debug, Clone, Copy, Default)]
struct Fifo3 {
    bytes: [u8; 2],
    n: u8,
}

impl Fifo3 {
    fn read(
        &mut self,
        two_byte: bool,
        this: &mut FifoStatus,
        other: &mut FifoStatus,
        empty_value: u8,
    ) -> u8 {
        let value = if self.n == 0 {
            empty_value
        } else {
            self.bytes[0]
        };
        self.bytes[0] = self.bytes[1];
        self.n = self.n.saturating_sub(1);
        if self.n == 0 || !two_byte {
            this.not_full = true;
            other.available = false;
        }
        value
    }

    fn write(&mut self, two_byte: bool, this: &mut FifoStatus, other: &mut FifoStatus, value: u8) {
        if two_byte {
            if self.n < 2 {
                self.bytes[usize::from(self.n)] = value;
                self.n += 1;
            }
            if self.n == 2 {
                this.not_full = false;
                other.available = true;
            }
        } else {
            self.bytes[0] = value;
            self.n = 1;
            this.not_full = false;
            other.available = true;
        }
    }
}

/// What [`Tube::service_control`] found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TubeControl {
    /// T was set, so the FIFOs were cleared.
    pub cleared: bool,
    /// P is set: the parasite should be held in reset (and boot from its
    /// ROM again afterwards).
    pub parasite_reset: bool,
}

/// Which side of the Tube an access comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TubeSide {
    Host,
    Parasite,
}

struct Tracer {
    trace: TraceHandle,
    events: TubeTraceEvents,
}

/// Acorn Tube ULA.
pub struct Tube {
    status: u8,

    hirq: bool,
    pirq: bool,
    pnmi: bool,

    hstatus1: FifoStatus,
    pstatus1: FifoStatus,
    h2p1: u8,
    p2h1: VecDeque<u8>,

    hstatus2: FifoStatus,
    pstatus2: FifoStatus,
    h2p2: u8,
    p2h2: u8,

    hstatus3: FifoStatus,
    pstatus3: FifoStatus,
    h2p3: Fifo3,
    p2h3: Fifo3,

    hstatus4: FifoStatus,
    pstatus4: FifoStatus,
    h2p4: u8,
    p2h4: u8,

    tracer: Option<Tracer>,
}

impl Tube {
    #[must_use]
    pub fn new() -> Self {
        let mut tube = Self {
            status: 0,
            hirq: false,
            pirq: false,
            pnmi: false,
            hstatus1: FifoStatus::EMPTY,
            pstatus1: FifoStatus::EMPTY,
            h2p1: 0,
            p2h1: VecDeque::with_capacity(FIFO1_QUEUE_LEN),
            hstatus2: FifoStatus::EMPTY,
            pstatus2: FifoStatus::EMPTY,
            h2p2: 0,
            p2h2: 0,
            hstatus3: FifoStatus::EMPTY,
            pstatus3: FifoStatus::EMPTY,
            h2p3: Fifo3::default(),
            p2h3: Fifo3::default(),
            hstatus4: FifoStatus::EMPTY,
            pstatus4: FifoStatus::EMPTY,
            h2p4: 0,
            p2h4: 0,
            tracer: None,
        };
        tube.reset();
        tube
    }

    /// Empty every channel and drop the interrupt lines. The control
    /// register and trace survive.
    pub fn reset(&mut self) {
        self.hirq = false;
        self.pirq = false;
        self.pnmi = false;

        self.hstatus1 = FifoStatus::EMPTY;
        self.pstatus1 = FifoStatus::EMPTY;
        self.h2p1 = 0;
        self.p2h1.clear();

        self.hstatus2 = FifoStatus::EMPTY;
        self.pstatus2 = FifoStatus::EMPTY;
        self.h2p2 = 0;
        self.p2h2 = 0;

        // FIFO3 comes out of reset with the host side showing data; the
        // client ROM relies on it.
        self.hstatus3 = FifoStatus {
            not_full: false,
            available: true,
        };
        self.pstatus3 = FifoStatus {
            not_full: false,
            available: false,
        };
        self.h2p3 = Fifo3::default();
        self.p2h3 = Fifo3::default();

        self.hstatus4 = FifoStatus::EMPTY;
        self.pstatus4 = FifoStatus::EMPTY;
        self.h2p4 = 0;
        self.p2h4 = 0;
    }

    /// Act on the T and P control bits. T stays set until the host clears
    /// it, so the FIFOs are cleared on every call until then.
    pub fn service_control(&mut self) -> TubeControl {
        let cleared = self.status & STATUS_T != 0;
        if cleared {
            self.reset();
            tracing::trace!("Tube registers cleared");
        }
        let parasite_reset = self.status & STATUS_P != 0;
        if parasite_reset {
            tracing::trace!("Tube holding parasite in reset");
        }
        TubeControl {
            cleared,
            parasite_reset,
        }
    }

    /// Record FIFO traffic and control writes into `trace`.
    pub fn attach_trace(&mut self, trace: TraceHandle, events: TubeTraceEvents) {
        self.tracer = Some(Tracer { trace, events });
    }

    pub fn detach_trace(&mut self) {
        self.tracer = None;
    }

    /// The control register, bits 0-6.
    #[must_use]
    pub fn status(&self) -> u8 {
        self.status
    }

    /// Host IRQ.
    #[must_use]
    pub fn hirq(&self) -> bool {
        self.hirq
    }

    /// Parasite IRQ.
    #[must_use]
    pub fn pirq(&self) -> bool {
        self.pirq
    }

    /// Parasite NMI.
    #[must_use]
    pub fn pnmi(&self) -> bool {
        self.pnmi
    }

    /// Bytes queued in FIFO1 for the host.
    #[must_use]
    pub fn fifo1_queue_len(&self) -> usize {
        self.p2h1.len()
    }

    /// Register access from the host side.
    #[must_use]
    pub fn host(&mut self) -> HostTube<'_> {
        HostTube(self)
    }

    /// Register access from the parasite side.
    #[must_use]
    pub fn parasite(&mut self) -> ParasiteTube<'_> {
        ParasiteTube(self)
    }

    pub fn host_read(&mut self, address: u16) -> u8 {
        match address & 7 {
            0 => self.hstatus1.value() | (self.status & 0x3F),
            1 => {
                let value = self.read_fifo1_queue();
                self.trace_fifo(TubeSide::Host, false, 1, value);
                value
            }
            2 => self.hstatus2.value(),
            3 => {
                update_latch_for_read(&mut self.hstatus2, &mut self.pstatus2);
                self.trace_fifo(TubeSide::Host, false, 2, self.p2h2);
                self.p2h2
            }
            4 => self.hstatus3.value(),
            5 => {
                let two_byte = self.status & STATUS_V != 0;
                let value = self.p2h3.read(
                    two_byte,
                    &mut self.hstatus3,
                    &mut self.pstatus3,
                    FIFO3_HOST_EMPTY_VALUE,
                );
                self.update_pnmi();
                self.trace_fifo(TubeSide::Host, false, 3, value);
                value
            }
            6 => self.hstatus4.value(),
            _ => {
                update_latch_for_read(&mut self.hstatus4, &mut self.pstatus4);
                self.update_hirq();
                self.trace_fifo(TubeSide::Host, false, 4, self.p2h4);
                self.p2h4
            }
        }
    }

    pub fn host_write(&mut self, address: u16, value: u8) {
        match address & 7 {
            0 => self.write_status(value),
            1 => {
                self.h2p1 = value;
                update_latch_for_write(&mut self.hstatus1, &mut self.pstatus1);
                self.update_pirq();
                self.trace_fifo(TubeSide::Host, true, 1, value);
            }
            3 => {
                self.h2p2 = value;
                update_latch_for_write(&mut self.hstatus2, &mut self.pstatus2);
                self.trace_fifo(TubeSide::Host, true, 2, value);
            }
            5 => {
                let two_byte = self.status & STATUS_V != 0;
                self.h2p3
                    .write(two_byte, &mut self.hstatus3, &mut self.pstatus3, value);
                self.update_pnmi();
                self.trace_fifo(TubeSide::Host, true, 3, value);
            }
            7 => {
                self.h2p4 = value;
                update_latch_for_write(&mut self.hstatus4, &mut self.pstatus4);
                self.update_pirq();
                self.trace_fifo(TubeSide::Host, true, 4, value);
            }
            _ => {}
        }
    }

    pub fn parasite_read(&mut self, address: u16) -> u8 {
        match address & 7 {
            0 => self.pstatus1.value() | (self.status & 0x3F),
            1 => {
                update_latch_for_read(&mut self.pstatus1, &mut self.hstatus1);
                self.update_pirq();
                self.trace_fifo(TubeSide::Parasite, false, 1, self.h2p1);
                self.h2p1
            }
            2 => self.pstatus2.value(),
            3 => {
                update_latch_for_read(&mut self.pstatus2, &mut self.hstatus2);
                self.trace_fifo(TubeSide::Parasite, false, 2, self.h2p2);
                self.h2p2
            }
            4 => self.pstatus3.value(),
            5 => {
                let two_byte = self.status & STATUS_V != 0;
                let value = self.h2p3.read(
                    two_byte,
                    &mut self.pstatus3,
                    &mut self.hstatus3,
                    FIFO3_PARASITE_EMPTY_VALUE,
                );
                self.update_pnmi();
                self.trace_fifo(TubeSide::Parasite, false, 3, value);
                value
            }
            6 => self.pstatus4.value(),
            _ => {
                update_latch_for_read(&mut self.pstatus4, &mut self.hstatus4);
                self.update_pirq();
                self.trace_fifo(TubeSide::Parasite, false, 4, self.h2p4);
                self.h2p4
            }
        }
    }

    pub fn parasite_write(&mut self, address: u16, value: u8) {
        match address & 7 {
            1 => self.write_fifo1_queue(value),
            3 => {
                self.p2h2 = value;
                update_latch_for_write(&mut self.pstatus2, &mut self.hstatus2);
                self.trace_fifo(TubeSide::Parasite, true, 2, value);
            }
            5 => {
                let two_byte = self.status & STATUS_V != 0;
                self.p2h3
                    .write(two_byte, &mut self.pstatus3, &mut self.hstatus3, value);
                self.update_pnmi();
                self.trace_fifo(TubeSide::Parasite, true, 3, value);
            }
            7 => {
                self.p2h4 = value;
                update_latch_for_write(&mut self.pstatus4, &mut self.hstatus4);
                self.update_hirq();
                self.trace_fifo(TubeSide::Parasite, true, 4, value);
            }
            _ => {}
        }
    }

    fn write_status(&mut self, value: u8) {
        if value & STATUS_SET != 0 {
            self.status |= value & !STATUS_SET;
        } else {
            self.status &= !value;
        }

        self.update_hirq();
        self.update_pirq();
        self.update_pnmi();

        if let Some(tracer) = &self.tracer {
            let payload = trace::status_payload(self);
            tracer
                .trace
                .borrow_mut()
                .write_event(tracer.events.write_status, &payload);
        }
    }

    fn read_fifo1_queue(&mut self) -> u8 {
        let Some(value) = self.p2h1.pop_front() else {
            return 0;
        };
        self.pstatus1.not_full = true;
        if self.p2h1.is_empty() {
            self.hstatus1.available = false;
        }
        self.trace_fifo1_queue("read");
        value
    }

    fn write_fifo1_queue(&mut self, value: u8) {
        if self.p2h1.len() < FIFO1_QUEUE_LEN {
            self.p2h1.push_back(value);
            if self.p2h1.len() == FIFO1_QUEUE_LEN {
                self.pstatus1.not_full = false;
            }
            self.hstatus1.available = true;
            self.trace_fifo1_queue("write");
        }
        self.trace_fifo(TubeSide::Parasite, true, 1, value);
    }

    fn update_hirq(&mut self) {
        self.hirq = self.status & STATUS_Q != 0 && self.hstatus4.available;
    }

    fn update_pirq(&mut self) {
        self.pirq = (self.status & STATUS_I != 0 && self.pstatus1.available)
            || (self.status & STATUS_J != 0 && self.pstatus4.available);
    }

    fn update_pnmi(&mut self) {
        self.pnmi = if self.status & STATUS_M == 0 {
            false
        } else if self.status & STATUS_V != 0 {
            self.h2p3.n == 2 || self.p2h3.n == 0
        } else {
            self.h2p3.n > 0 || self.p2h3.n == 0
        };
    }

    /// Both sides' status latches for `channel` (1-4).
    fn channel_status(&self, channel: u8) -> (FifoStatus, FifoStatus) {
        match channel {
            1 => (self.hstatus1, self.pstatus1),
            2 => (self.hstatus2, self.pstatus2),
            3 => (self.hstatus3, self.pstatus3),
            _ => (self.hstatus4, self.pstatus4),
        }
    }

    fn trace_fifo(&self, side: TubeSide, write: bool, channel: u8, value: u8) {
        if let Some(tracer) = &self.tracer {
            let event_type = tracer.events.fifo_event(side, write);
            let payload = trace::fifo_payload(self, channel, value);
            tracer.trace.borrow_mut().write_event(event_type, &payload);
        }
    }

    fn trace_fifo1_queue(&self, op: &str) {
        if let Some(tracer) = &self.tracer {
            trace::write_fifo1_queue(&mut tracer.trace.borrow_mut(), op, &self.p2h1);
        }
    }
}

impl Default for Tube {
    fn default() -> Self {
        Self::new()
    }
}

/// The host's view of the Tube: `&FEE0-&FEE7`, driving the host IRQ.
pub struct HostTube<'a>(&'a mut Tube);

impl Bus for HostTube<'_> {
    fn read(&mut self, address: u16) -> u8 {
        self.0.host_read(address)
    }

    fn write(&mut self, address: u16, value: u8) {
        self.0.host_write(address, value);
    }
}

impl InterruptSource for HostTube<'_> {
    fn irq(&self) -> bool {
        self.0.hirq
    }
}

/// The parasite's view of the Tube, driving the parasite IRQ and NMI.
pub struct ParasiteTube<'a>(&'a mut Tube);

impl Bus for ParasiteTube<'_> {
    fn read(&mut self, address: u16) -> u8 {
        self.0.parasite_read(address)
    }

    fn write(&mut self, address: u16, value: u8) {
        self.0.parasite_write(address, value);
    }
}

impl InterruptSource for ParasiteTube<'_> {
    fn irq(&self) -> bool {
        self.0.pirq
    }

    fn nmi(&self) -> bool {
        self.0.pnmi
    }
}

impl Observable for Tube {
    fn query(&self, path: &str) -> Option<Value> {
        let value: Value = match path {
            "status" => self.status.into(),
            "hirq" => self.hirq.into(),
            "pirq" => self.pirq.into(),
            "pnmi" => self.pnmi.into(),
            "fifo1.h_status" => self.hstatus1.value().into(),
            "fifo1.p_status" => self.pstatus1.value().into(),
            "fifo1.h2p" => self.h2p1.into(),
            "fifo1.p2h_n" => (self.p2h1.len() as u64).into(),
            "fifo2.h_status" => self.hstatus2.value().into(),
            "fifo2.p_status" => self.pstatus2.value().into(),
            "fifo2.h2p" => self.h2p2.into(),
            "fifo2.p2h" => self.p2h2.into(),
            "fifo3.h_status" => self.hstatus3.value().into(),
            "fifo3.p_status" => self.pstatus3.value().into(),
            "fifo3.h2p_n" => self.h2p3.n.into(),
            "fifo3.p2h_n" => self.p2h3.n.into(),
            "fifo4.h_status" => self.hstatus4.value().into(),
            "fifo4.p_status" => self.pstatus4.value().into(),
            "fifo4.h2p" => self.h2p4.into(),
            "fifo4.p2h" => self.p2h4.into(),
            _ => return None,
        };
        Some(value)
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "status",
            "hirq",
            "pirq",
            "pnmi",
            "fifo1.h_status",
            "fifo1.p_status",
            "fifo1.h2p",
            "fifo1.p2h_n",
            "fifo2.h_status",
            "fifo2.p_status",
            "fifo2.h2p",
            "fifo2.p2h",
            "fifo3.h_status",
            "fifo3.p_status",
            "fifo3.h2p_n",
            "fifo3.p2h_n",
            "fifo4.h_status",
            "fifo4.p_status",
            "fifo4.h2p",
            "fifo4.p2h",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_on_status() {
        let mut tube = Tube::new();
        assert_eq!(tube.host_read(0), FIFO_NOT_FULL);
        assert_eq!(tube.host_read(2), FIFO_NOT_FULL);
        assert_eq!(tube.host_read(4), FIFO_AVAILABLE);
        assert_eq!(tube.host_read(6), FIFO_NOT_FULL);
        assert_eq!(tube.parasite_read(0), FIFO_NOT_FULL);
        assert_eq!(tube.parasite_read(4), 0);
    }

    #[test]
    fn status_write_sets_and_clears() {
        let mut tube = Tube::new();
        tube.host_write(0, 0x80 | STATUS_Q | STATUS_M | STATUS_V);
        assert_eq!(tube.status(), STATUS_Q | STATUS_M | STATUS_V);
        tube.host_write(0, STATUS_M);
        assert_eq!(tube.status(), STATUS_Q | STATUS_V);
        assert_eq!(tube.host_read(0) & 0x3F, STATUS_Q | STATUS_V);
    }

    #[test]
    fn status_write_recomputes_interrupts() {
        let mut tube = Tube::new();
        tube.parasite_write(7, 0x42);
        assert!(!tube.hirq());

        tube.host_write(0, 0x80 | STATUS_Q);
        assert!(tube.hirq());
        tube.host_write(0, STATUS_Q);
        assert!(!tube.hirq());

        tube.host_write(1, 0x01);
        assert!(!tube.pirq());
        tube.host_write(0, 0x80 | STATUS_I);
        assert!(tube.pirq());

        // M with both FIFO3 directions empty: parasite may write.
        tube.host_write(0, 0x80 | STATUS_M);
        assert!(tube.pnmi());
    }

    #[test]
    fn fifo1_queue_holds_24_bytes() {
        let mut tube = Tube::new();
        for i in 0..30 {
            tube.parasite_write(1, i);
        }
        assert_eq!(tube.fifo1_queue_len(), FIFO1_QUEUE_LEN);
        assert_eq!(tube.parasite_read(0) & FIFO_NOT_FULL, 0);
        assert_ne!(tube.host_read(0) & FIFO_AVAILABLE, 0);

        let drained: Vec<u8> = (0..FIFO1_QUEUE_LEN).map(|_| tube.host_read(1)).collect();
        assert_eq!(drained, (0..24).collect::<Vec<u8>>());
        assert_eq!(tube.host_read(0) & FIFO_AVAILABLE, 0);
        assert_ne!(tube.parasite_read(0) & FIFO_NOT_FULL, 0);
        assert_eq!(tube.host_read(1), 0);
    }

    #[test]
    fn fifo3_two_byte_mode() {
        let mut tube = Tube::new();
        tube.host_write(0, 0x80 | STATUS_V | STATUS_M);

        tube.host_write(5, 0x11);
        assert_eq!(tube.parasite_read(4) & FIFO_AVAILABLE, 0);
        tube.host_write(5, 0x22);
        assert_ne!(tube.parasite_read(4) & FIFO_AVAILABLE, 0);
        assert_eq!(tube.host_read(4) & FIFO_NOT_FULL, 0);
        assert!(tube.pnmi());

        assert_eq!(tube.parasite_read(5), 0x11);
        // Still one byte to go.
        assert_ne!(tube.parasite_read(4) & FIFO_AVAILABLE, 0);
        assert_eq!(tube.parasite_read(5), 0x22);
        assert_eq!(tube.parasite_read(4) & FIFO_AVAILABLE, 0);
        assert_ne!(tube.host_read(4) & FIFO_NOT_FULL, 0);
    }

    #[test]
    fn fifo3_one_byte_mode_nmi() {
        let mut tube = Tube::new();
        // Parasite fills its side so only the host direction matters.
        tube.parasite_write(5, 0x99);
        tube.host_write(0, 0x80 | STATUS_M);
        assert!(!tube.pnmi());

        tube.host_write(5, 0x33);
        assert!(tube.pnmi());
        assert_eq!(tube.parasite_read(5), 0x33);
        assert!(!tube.pnmi());
    }

    #[test]
    fn t_bit_clears_until_released() {
        let mut tube = Tube::new();
        tube.host_write(1, 0x55);
        tube.parasite_write(1, 0x66);
        tube.host_write(0, 0x80 | STATUS_T | STATUS_P);

        let control = tube.service_control();
        assert!(control.cleared);
        assert!(control.parasite_reset);
        assert_eq!(tube.fifo1_queue_len(), 0);
        assert_eq!(tube.parasite_read(0) & FIFO_AVAILABLE, 0);
        assert_eq!(tube.status(), STATUS_T | STATUS_P);

        tube.host_write(0, STATUS_T | STATUS_P);
        assert_eq!(tube.service_control(), TubeControl::default());
    }

    #[test]
    fn views_forward_to_the_tube() {
        let mut tube = Tube::new();
        tube.host().write(0, 0x80 | STATUS_Q);
        tube.parasite().write(7, 0xAB);
        assert!(tube.host().irq());
        assert_eq!(tube.host().read(7), 0xAB);
        assert!(!tube.host().irq());
        assert!(!tube.parasite().irq());
        assert!(!tube.parasite().nmi());
    }

    #[test]
    fn queries() {
        let tube = Tube::new();
        assert_eq!(tube.query("fifo3.h_status"), Some(Value::U8(FIFO_AVAILABLE)));
        for path in tube.query_paths() {
            assert!(tube.query(path).is_some(), "{path}");
        }
        assert_eq!(tube.query("fifo5.h2p"), None);
    }
}
