//! MOS 6522 Versatile Interface Adapter (VIA).
//!
//! The 6522 provides two 8-bit I/O ports with handshake lines, two 16-bit
//! timers, a serial shift register and an interrupt controller. The BBC
//! Micro has a system VIA (keyboard, sound, addressable latch) and a user
//! VIA (printer and user port); a second processor or a disc interface may
//! bring more.
//!
//! # Registers ($0-$F)
//!
//! | Reg | Name | Description                                   |
//! |-----|------|-----------------------------------------------|
//! | $0  | ORB  | Port B data (handshake on write)              |
//! | $1  | ORA  | Port A data (handshake on read and write)     |
//! | $2  | DDRB | Port B data direction (1 = output)            |
//! | $3  | DDRA | Port A data direction (1 = output)            |
//! | $4  | T1CL | Timer 1 counter low (read clears T1 IRQ)      |
//! | $5  | T1CH | Timer 1 counter high (write starts T1)        |
//! | $6  | T1LL | Timer 1 latch low                             |
//! | $7  | T1LH | Timer 1 latch high (write clears T1 IRQ)      |
//! | $8  | T2CL | Timer 2 counter low (read clears T2 IRQ)      |
//! | $9  | T2CH | Timer 2 counter high (write starts T2)        |
//! | $A  | SR   | Shift register                                |
//! | $B  | ACR  | Auxiliary control register                    |
//! | $C  | PCR  | Peripheral control register                   |
//! | $D  | IFR  | Interrupt flag register                       |
//! | $E  | IER  | Interrupt enable register                     |
//! | $F  | ORA  | Port A data (no handshake)                    |
//!
//! # Timing
//!
//! The chip is stepped twice per 1 MHz cycle. The trailing edge of phi2
//! does the Cx1/Cx2 edge detection and moves the timer counters; a timeout
//! found there only reaches the IFR on the following leading edge. Both
//! entry points return `IER & IFR & $7F`, non-zero meaning IRQ.

mod trace;

use beeb_trace::TraceHandle;
use emu_core::{Bus, InterruptSource, Observable, Value};

pub use trace::{ViaEventFormatter, ViaTraceEvents, irq_flag_names};

// IFR/IER bit masks
pub const IRQ_CA2: u8 = 0x01;
pub const IRQ_CA1: u8 = 0x02;
pub const IRQ_SR: u8 = 0x04;
pub const IRQ_CB2: u8 = 0x08;
pub const IRQ_CB1: u8 = 0x10;
pub const IRQ_T2: u8 = 0x20;
pub const IRQ_T1: u8 = 0x40;

// ACR bits
const ACR_PA_LATCHING: u8 = 0x01;
const ACR_PB_LATCHING: u8 = 0x02;
const ACR_T2_COUNT_PB6: u8 = 0x20;
const ACR_T1_CONTINUOUS: u8 = 0x40;
const ACR_T1_OUTPUT_PB7: u8 = 0x80;

// PCR Cx2 modes (3 bits, above the Cx1 edge bit)
const CX2_INPUT_NEG_EDGE: u8 = 0;
const CX2_INDEPENDENT_NEG_EDGE: u8 = 1;
const CX2_INPUT_POS_EDGE: u8 = 2;
const CX2_INDEPENDENT_POS_EDGE: u8 = 3;
const CX2_HANDSHAKE: u8 = 4;
const CX2_PULSE: u8 = 5;
const CX2_LOW: u8 = 6;
const CX2_HIGH: u8 = 7;

/// One side of the chip: data lines plus the two control lines.
#[derive(Debug, Clone)]
struct Port {
    or: u8,
    ddr: u8,
    /// Levels driven onto the pins from outside.
    input: u8,
    /// Pin levels: outputs from OR, inputs from outside.
    p: u8,
    p_latch: u8,
    c1: bool,
    old_c1: bool,
    c2: bool,
    old_c2: bool,
    /// Half-cycles left on a Cx2 output pulse.
    pulse: u8,
}

impl Port {
    fn new() -> Self {
        Self {
            or: 0,
            ddr: 0,
            input: 0xFF,
            p: 0xFF,
            p_latch: 0xFF,
            c1: false,
            old_c1: false,
            c2: false,
            old_c2: false,
            pulse: 0,
        }
    }

    fn update_pins(&mut self) {
        self.p = (self.input & !self.ddr) | (self.or & self.ddr);
    }

    fn input_value(&self, latching: bool) -> u8 {
        if latching { self.p_latch } else { self.p }
    }
}

struct Tracer {
    trace: TraceHandle,
    events: ViaTraceEvents,
    timer_ticks: bool,
}

/// MOS 6522 Versatile Interface Adapter.
pub struct Via6522 {
    a: Port,
    b: Port,

    /// Interrupt flags, bit 7 clear.
    ifr: u8,
    /// Interrupt enables, bit 7 clear.
    ier: u8,

    t1: u16,
    t1ll: u8,
    t1lh: u8,
    /// Load T1 from its latch on the next trailing edge instead of counting.
    t1_reload: bool,
    /// Next T1 timeout sets the IFR.
    t1_pending: bool,
    /// T1 ran out on the last trailing edge.
    t1_timeout: bool,
    /// T1-driven level for PB7 (bit 7 only).
    t1_pb7: u8,

    t2: u16,
    t2ll: u8,
    t2lh: u8,
    t2_reload: bool,
    t2_pending: bool,
    t2_timeout: bool,
    /// Whether T2 counts on the next trailing edge. Always true unless
    /// counting PB6 pulses.
    t2_count: bool,

    sr: u8,
    acr: u8,
    pcr: u8,

    /// Port B pins as of the last leading edge, for PB6 pulse counting.
    old_pb: u8,

    id: u8,
    name: &'static str,
    tracer: Option<Tracer>,
}

impl Via6522 {
    /// Create a new VIA in its power-on state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            a: Port::new(),
            b: Port::new(),
            ifr: 0,
            ier: 0,
            t1: 0,
            t1ll: 250,
            t1lh: 202,
            t1_reload: false,
            t1_pending: false,
            t1_timeout: false,
            t1_pb7: 0,
            t2: 0,
            t2ll: 0,
            t2lh: 0,
            t2_reload: false,
            t2_pending: false,
            t2_timeout: false,
            t2_count: true,
            sr: 0,
            acr: 0,
            pcr: 0,
            old_pb: 0,
            id: 0,
            name: "VIA",
            tracer: None,
        }
    }

    /// Create a VIA with the given identity. See [`Via6522::set_id`].
    #[must_use]
    pub fn with_id(id: u8, name: &'static str) -> Self {
        let mut via = Self::new();
        via.set_id(id, name);
        via
    }

    /// Set the ID used in trace events and the name used in trace text.
    ///
    /// # Panics
    ///
    /// If `id` doesn't fit in 4 bits.
    pub fn set_id(&mut self, id: u8, name: &'static str) {
        assert!(id < 16, "VIA id {id} out of range");
        self.id = id;
        self.name = name;
    }

    #[must_use]
    pub fn id(&self) -> u8 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Return to the power-on state, keeping ID, name and trace.
    pub fn reset(&mut self) {
        let id = self.id;
        let name = self.name;
        let tracer = self.tracer.take();
        *self = Self::new();
        self.id = id;
        self.name = name;
        self.tracer = tracer;
        tracing::debug!(via = name, "reset");
    }

    /// Record IRQ state (and, if `timer_ticks`, every timer step) into
    /// `trace`.
    pub fn attach_trace(&mut self, trace: TraceHandle, events: ViaTraceEvents, timer_ticks: bool) {
        self.tracer = Some(Tracer {
            trace,
            events,
            timer_ticks,
        });
    }

    pub fn detach_trace(&mut self) {
        self.tracer = None;
    }

    /// First half of a cycle: timeouts from the previous trailing edge
    /// reach the IFR, and PB6 is sampled for T2 pulse counting.
    pub fn update_phi2_leading_edge(&mut self) -> u8 {
        if self.t1_timeout {
            self.t1_timeout = false;
            if self.t1_pending {
                self.ifr |= IRQ_T1;
                if self.acr & ACR_T1_CONTINUOUS != 0 {
                    self.t1_pb7 ^= 0x80;
                } else {
                    self.t1_pending = false;
                    self.t1_pb7 = 0x80;
                }
                self.trace_text(format_args!(
                    "{} - T1 timed out (continuous={}). T1 new value: {} (${:04X})",
                    self.name,
                    u8::from(self.acr & ACR_T1_CONTINUOUS != 0),
                    self.t1,
                    self.t1
                ));
            }
        }

        if self.t2_timeout {
            self.t2_timeout = false;
            if self.t2_pending {
                self.ifr |= IRQ_T2;
                self.t2_pending = false;
                self.trace_text(format_args!("{} - T2 timed out.", self.name));
            }
        }

        self.t2_count = if self.acr & ACR_T2_COUNT_PB6 != 0 {
            self.old_pb & 0x40 != 0 && self.b.p & 0x40 == 0
        } else {
            true
        };
        self.old_pb = self.b.p;

        self.irq_mask()
    }

    /// Second half of a cycle: control line edges and timer counting.
    pub fn update_phi2_trailing_edge(&mut self) -> u8 {
        tick_control(
            &mut self.a,
            &mut self.ifr,
            self.acr & ACR_PA_LATCHING != 0,
            self.pcr,
            IRQ_CA2,
        );
        tick_control(
            &mut self.b,
            &mut self.ifr,
            self.acr & ACR_PB_LATCHING != 0,
            self.pcr >> 4,
            IRQ_CB2,
        );

        let mut t1_ticked = false;
        if self.t1_reload {
            self.t1 = self.t1_latch();
            self.t1_reload = false;
        } else {
            self.t1 = self.t1.wrapping_sub(1);
            t1_ticked = true;
            if self.t1 == 0xFFFF {
                self.t1_timeout = true;
                self.t1_reload = true;
            }
        }

        let mut t2_ticked = false;
        if self.t2_reload {
            self.t2 = u16::from(self.t2ll) | u16::from(self.t2lh) << 8;
            self.t2_reload = false;
        } else if self.t2_count {
            self.t2 = self.t2.wrapping_sub(1);
            t2_ticked = true;
            if self.t2 == 0xFFFF {
                self.t2_timeout = true;
            }
        }

        let mask = self.irq_mask();

        if let Some(tracer) = &self.tracer {
            let mut trace = tracer.trace.borrow_mut();
            if mask != 0 {
                let payload = trace::irq_payload(self.id, self.ifr, self.ier);
                trace.write_event(tracer.events.irq, &payload);
            }
            if tracer.timer_ticks {
                let payload =
                    trace::timer_tick_payload(self.id, self.t1, self.t2, t1_ticked, t2_ticked);
                trace.write_event(tracer.events.timer_tick, &payload);
            }
        }

        mask
    }

    // --- External pins ---

    /// Drive the port A pins from outside. Only input bits are seen.
    pub fn set_port_a_input(&mut self, value: u8) {
        self.a.input = value;
        self.a.update_pins();
    }

    pub fn set_port_b_input(&mut self, value: u8) {
        self.b.input = value;
        self.b.update_pins();
    }

    /// Port A pin levels.
    #[must_use]
    pub fn port_a_pins(&self) -> u8 {
        self.a.p
    }

    /// Port B pin levels, with PB7 driven by T1 when ACR bit 7 is set.
    #[must_use]
    pub fn port_b_pins(&self) -> u8 {
        self.with_t1_pb7(self.b.p)
    }

    /// Port A output value (output register masked by DDR).
    #[must_use]
    pub fn port_a_output(&self) -> u8 {
        self.a.or & self.a.ddr
    }

    /// Port B output value, PB7 timer override applied.
    #[must_use]
    pub fn port_b_output(&self) -> u8 {
        self.with_t1_pb7(self.b.or & self.b.ddr)
    }

    /// Set the CA1 input level. Edges are seen on the next trailing edge.
    pub fn set_ca1(&mut self, level: bool) {
        self.a.c1 = level;
    }

    /// Set the CA2 level; only meaningful in the input modes.
    pub fn set_ca2(&mut self, level: bool) {
        self.a.c2 = level;
    }

    pub fn set_cb1(&mut self, level: bool) {
        self.b.c1 = level;
    }

    pub fn set_cb2(&mut self, level: bool) {
        self.b.c2 = level;
    }

    /// CA2 level, as driven by the chip in the output modes.
    #[must_use]
    pub fn ca2(&self) -> bool {
        self.a.c2
    }

    #[must_use]
    pub fn cb2(&self) -> bool {
        self.b.c2
    }

    // --- Side-effect-free getters ---

    #[must_use]
    pub fn ifr(&self) -> u8 {
        self.ifr
    }

    #[must_use]
    pub fn ier(&self) -> u8 {
        self.ier
    }

    #[must_use]
    pub fn acr(&self) -> u8 {
        self.acr
    }

    #[must_use]
    pub fn pcr(&self) -> u8 {
        self.pcr
    }

    #[must_use]
    pub fn timer1_counter(&self) -> u16 {
        self.t1
    }

    #[must_use]
    pub fn timer1_latch(&self) -> u16 {
        self.t1_latch()
    }

    #[must_use]
    pub fn timer2_counter(&self) -> u16 {
        self.t2
    }

    /// IRQ output: enabled flags that are set.
    #[must_use]
    pub fn irq_mask(&self) -> u8 {
        self.ifr & self.ier & 0x7F
    }

    // --- Internal helpers ---

    fn t1_latch(&self) -> u16 {
        u16::from(self.t1ll) | u16::from(self.t1lh) << 8
    }

    fn with_t1_pb7(&self, value: u8) -> u8 {
        if self.acr & ACR_T1_OUTPUT_PB7 != 0 {
            (value & 0x7F) | self.t1_pb7
        } else {
            value
        }
    }

    fn read_ira(&self) -> u8 {
        self.a.input_value(self.acr & ACR_PA_LATCHING != 0)
    }

    fn read_irb(&self) -> u8 {
        let input = self.b.input_value(self.acr & ACR_PB_LATCHING != 0);
        self.with_t1_pb7((self.b.or & self.b.ddr) | (input & !self.b.ddr))
    }

    /// A T1 IFR clear loses to a timeout found on the last trailing edge.
    fn clear_t1_irq(&mut self) {
        if !self.t1_timeout {
            self.ifr &= !IRQ_T1;
        }
    }

    fn clear_t2_irq(&mut self) {
        if !self.t2_timeout {
            self.ifr &= !IRQ_T2;
        }
    }

    fn trace_text(&self, args: std::fmt::Arguments<'_>) {
        if let Some(tracer) = &self.tracer {
            tracer.trace.borrow_mut().alloc_fmt(args);
        }
    }
}

impl Default for Via6522 {
    fn default() -> Self {
        Self::new()
    }
}

/// Cx1 edge detection and Cx2 mode handling for one port.
fn tick_control(port: &mut Port, ifr: &mut u8, latching: bool, pcr_bits: u8, cx2_mask: u8) {
    // PCR0 old c1  res
    //  0    0   0   0
    //  0    0   1   0
    //  0    1   0   1
    //  0    1   1   0
    //  1    0   0   0
    //  1    0   1   1
    //  1    1   0   0
    //  1    1   1   0
    let code = (u8::from(port.c1) | u8::from(port.old_c1) << 1 | pcr_bits << 2) & 7;
    let cx2_mode = (pcr_bits >> 1) & 7;

    if code == 2 || code == 5 {
        *ifr |= cx2_mask << 1;
        if latching {
            port.p_latch = port.p;
        }
        if cx2_mode == CX2_HANDSHAKE {
            port.c2 = true;
        }
    }
    port.old_c1 = port.c1;

    match cx2_mode {
        CX2_INPUT_NEG_EDGE | CX2_INDEPENDENT_NEG_EDGE => {
            if port.old_c2 && !port.c2 {
                *ifr |= cx2_mask;
            }
        }
        CX2_INPUT_POS_EDGE | CX2_INDEPENDENT_POS_EDGE => {
            if !port.old_c2 && port.c2 {
                *ifr |= cx2_mask;
            }
        }
        CX2_HANDSHAKE => {}
        CX2_PULSE => {
            if port.pulse > 0 {
                port.pulse -= 1;
                if port.pulse == 0 {
                    port.c2 = true;
                }
            }
        }
        CX2_LOW => port.c2 = false,
        _ => port.c2 = true,
    }
    port.old_c2 = port.c2;
}

/// Data register access side effects: Cx1 always clears; Cx2 clears
/// except in the independent-interrupt input modes. `drive_c2` starts the
/// handshake or pulse output.
fn port_handshake(port: &mut Port, ifr: &mut u8, pcr_bits: u8, cx2_mask: u8, drive_c2: bool) {
    *ifr &= !(cx2_mask << 1);

    match (pcr_bits >> 1) & 7 {
        CX2_INDEPENDENT_NEG_EDGE | CX2_INDEPENDENT_POS_EDGE => {}
        CX2_HANDSHAKE => {
            *ifr &= !cx2_mask;
            if drive_c2 {
                port.c2 = false;
            }
        }
        CX2_PULSE => {
            *ifr &= !cx2_mask;
            if drive_c2 {
                port.c2 = false;
                port.pulse = 2;
            }
        }
        _ => *ifr &= !cx2_mask,
    }
}

impl Bus for Via6522 {
    fn read(&mut self, address: u16) -> u8 {
        match address & 0x0F {
            0x00 => {
                port_handshake(&mut self.b, &mut self.ifr, self.pcr >> 4, IRQ_CB2, false);
                self.read_irb()
            }
            0x01 => {
                port_handshake(&mut self.a, &mut self.ifr, self.pcr, IRQ_CA2, true);
                self.read_ira()
            }
            0x02 => self.b.ddr,
            0x03 => self.a.ddr,
            0x04 => {
                self.clear_t1_irq();
                self.t1 as u8
            }
            0x05 => (self.t1 >> 8) as u8,
            0x06 => self.t1ll,
            0x07 => self.t1lh,
            0x08 => {
                self.clear_t2_irq();
                self.t2 as u8
            }
            0x09 => (self.t2 >> 8) as u8,
            0x0A => self.sr,
            0x0B => self.acr,
            0x0C => self.pcr,
            0x0D => {
                if self.irq_mask() != 0 {
                    self.ifr | 0x80
                } else {
                    self.ifr
                }
            }
            0x0E => self.ier | 0x80,
            _ => self.read_ira(),
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        match address & 0x0F {
            0x00 => {
                self.b.or = value;
                port_handshake(&mut self.b, &mut self.ifr, self.pcr >> 4, IRQ_CB2, true);
                self.b.update_pins();
            }
            0x01 => {
                self.a.or = value;
                port_handshake(&mut self.a, &mut self.ifr, self.pcr, IRQ_CA2, true);
                self.a.update_pins();
            }
            0x02 => {
                self.b.ddr = value;
                self.b.update_pins();
            }
            0x03 => {
                self.a.ddr = value;
                self.a.update_pins();
            }
            0x04 | 0x06 => self.t1ll = value,
            0x05 => {
                self.t1lh = value;
                self.t1_reload = true;
                self.t1_pending = true;
                self.t1_pb7 = 0;
                self.clear_t1_irq();
                self.trace_text(format_args!(
                    "{} - Write T1C-H. Latch=${:04X}",
                    self.name,
                    self.t1_latch()
                ));
            }
            0x07 => {
                self.t1lh = value;
                self.clear_t1_irq();
                self.trace_text(format_args!(
                    "{} - Write T1L-H. IFR:{}",
                    self.name,
                    irq_flag_names(self.ifr)
                ));
            }
            0x08 => self.t2ll = value,
            0x09 => {
                self.t2lh = value;
                self.t2_reload = true;
                self.t2_pending = true;
                self.clear_t2_irq();
                self.trace_text(format_args!(
                    "{} - Write T2C-H. Latch=${:02X}{:02X}",
                    self.name, self.t2lh, self.t2ll
                ));
            }
            0x0A => self.sr = value,
            0x0B => {
                // Leaving continuous mode mid-count abandons the pending IRQ.
                if self.acr & ACR_T1_CONTINUOUS != 0 && value & ACR_T1_CONTINUOUS == 0 {
                    self.t1_pending = false;
                }
                self.acr = value;
            }
            0x0C => self.pcr = value,
            0x0D => {
                self.ifr &= !value & 0x7F;
                self.trace_text(format_args!(
                    "{} - Write IFR. IFR:{}",
                    self.name,
                    irq_flag_names(self.ifr)
                ));
            }
            0x0E => {
                if value & 0x80 != 0 {
                    self.ier |= value & 0x7F;
                } else {
                    self.ier &= !value & 0x7F;
                }
                self.trace_text(format_args!(
                    "{} - Write IER. IER:{}",
                    self.name,
                    irq_flag_names(self.ier)
                ));
            }
            _ => {
                self.a.or = value;
                self.a.update_pins();
            }
        }
    }
}

impl InterruptSource for Via6522 {
    fn irq(&self) -> bool {
        self.irq_mask() != 0
    }
}

impl Observable for Via6522 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "name" => Some(self.name.into()),
            "id" => Some(self.id.into()),
            "ora" => Some(self.a.or.into()),
            "orb" => Some(self.b.or.into()),
            "ddra" => Some(self.a.ddr.into()),
            "ddrb" => Some(self.b.ddr.into()),
            "pa" => Some(self.port_a_pins().into()),
            "pb" => Some(self.port_b_pins().into()),
            "ca1" => Some(self.a.c1.into()),
            "ca2" => Some(self.a.c2.into()),
            "cb1" => Some(self.b.c1.into()),
            "cb2" => Some(self.b.c2.into()),
            "t1" => Some(self.t1.into()),
            "t1_latch" => Some(self.t1_latch().into()),
            "t1_pending" => Some(self.t1_pending.into()),
            "t2" => Some(self.t2.into()),
            "t2_latch" => Some((u16::from(self.t2ll) | u16::from(self.t2lh) << 8).into()),
            "t2_pending" => Some(self.t2_pending.into()),
            "sr" => Some(self.sr.into()),
            "acr" => Some(self.acr.into()),
            "pcr" => Some(self.pcr.into()),
            "ifr" => Some(self.ifr.into()),
            "ier" => Some(self.ier.into()),
            "irq" => Some(self.irq().into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "name",
            "id",
            "ora",
            "orb",
            "ddra",
            "ddrb",
            "pa",
            "pb",
            "ca1",
            "ca2",
            "cb1",
            "cb2",
            "t1",
            "t1_latch",
            "t1_pending",
            "t2",
            "t2_latch",
            "t2_pending",
            "sr",
            "acr",
            "pcr",
            "ifr",
            "ier",
            "irq",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One full cycle: trailing edge then leading edge.
    fn cycle(via: &mut Via6522) -> u8 {
        via.update_phi2_trailing_edge();
        via.update_phi2_leading_edge()
    }

    #[test]
    fn timer1_reloads_on_the_first_trailing_edge_after_start() {
        let mut via = Via6522::new();
        via.write(0x04, 0x34);
        via.write(0x05, 0x12);

        via.update_phi2_trailing_edge();
        assert_eq!(via.t1, 0x1234);
        via.update_phi2_leading_edge();
        via.update_phi2_trailing_edge();
        assert_eq!(via.t1, 0x1233);
    }

    #[test]
    fn timer1_one_shot_fires_once() {
        let mut via = Via6522::new();
        via.write(0x04, 2);
        via.write(0x05, 0);

        // Load, 1, 0, $FFFF (timeout), then IFR on the leading edge.
        for _ in 0..3 {
            cycle(&mut via);
            assert_eq!(via.ifr & IRQ_T1, 0);
        }
        cycle(&mut via);
        assert_ne!(via.ifr & IRQ_T1, 0);
        assert!(!via.t1_pending);

        via.write(0x0D, IRQ_T1);
        for _ in 0..10 {
            cycle(&mut via);
        }
        assert_eq!(via.ifr & IRQ_T1, 0);
    }

    #[test]
    fn timer1_continuous_period_is_latch_plus_two() {
        let mut via = Via6522::new();
        via.write(0x0B, ACR_T1_CONTINUOUS);
        via.write(0x04, 3);
        via.write(0x05, 0);

        let mut fired = Vec::new();
        for n in 0..20 {
            cycle(&mut via);
            if via.ifr & IRQ_T1 != 0 {
                fired.push(n);
                via.write(0x0D, IRQ_T1);
            }
        }
        assert_eq!(fired, vec![4, 9, 14, 19]);
    }

    #[test]
    fn reading_t1_low_clears_t1_but_not_during_a_timeout() {
        let mut via = Via6522::new();
        via.ifr = IRQ_T1;
        let _ = via.read(0x04);
        assert_eq!(via.ifr & IRQ_T1, 0);

        via.ifr = IRQ_T1;
        via.t1_timeout = true;
        let _ = via.read(0x04);
        assert_ne!(via.ifr & IRQ_T1, 0);
    }

    #[test]
    fn latch_high_write_clears_t1_without_touching_the_counter() {
        let mut via = Via6522::new();
        via.t1 = 0x4000;
        via.ifr = IRQ_T1;
        via.write(0x07, 0x55);
        assert_eq!(via.ifr & IRQ_T1, 0);
        assert_eq!(via.t1, 0x4000);
        assert_eq!(via.t1lh, 0x55);
        assert!(!via.t1_reload);
    }

    #[test]
    fn leaving_continuous_mode_cancels_a_pending_t1() {
        let mut via = Via6522::new();
        via.write(0x0B, ACR_T1_CONTINUOUS);
        via.write(0x04, 4);
        via.write(0x05, 0);
        cycle(&mut via);
        via.write(0x0B, 0);
        for _ in 0..20 {
            cycle(&mut via);
        }
        assert_eq!(via.ifr & IRQ_T1, 0);
    }

    #[test]
    fn timer2_one_shot() {
        let mut via = Via6522::new();
        via.write(0x08, 3);
        via.write(0x09, 0);

        for _ in 0..4 {
            cycle(&mut via);
            assert_eq!(via.ifr & IRQ_T2, 0);
        }
        cycle(&mut via);
        assert_ne!(via.ifr & IRQ_T2, 0);
        assert!(!via.t2_pending);

        // T2 keeps counting down from $FFFF without firing again.
        via.write(0x0D, IRQ_T2);
        cycle(&mut via);
        assert_eq!(via.t2, 0xFFFE);
    }

    #[test]
    fn timer2_counts_pb6_falling_edges() {
        let mut via = Via6522::new();
        via.write(0x0B, ACR_T2_COUNT_PB6);
        via.write(0x08, 2);
        via.write(0x09, 0);
        cycle(&mut via);
        assert_eq!(via.t2, 2);

        for _ in 0..5 {
            cycle(&mut via);
        }
        assert_eq!(via.t2, 2, "no pulses, no counting");

        for _ in 0..3 {
            via.set_port_b_input(0x40);
            cycle(&mut via);
            via.set_port_b_input(0x00);
            cycle(&mut via);
            cycle(&mut via);
        }
        assert_ne!(via.ifr & IRQ_T2, 0);
    }

    #[test]
    fn ifr_write_clears_only_named_flags() {
        let mut via = Via6522::new();
        via.ifr = IRQ_T1 | IRQ_T2 | IRQ_CA1;
        via.write(0x0D, 0x80 | IRQ_T1 | IRQ_CA1);
        assert_eq!(via.ifr, IRQ_T2);
    }

    #[test]
    fn ier_set_and_clear() {
        let mut via = Via6522::new();
        via.write(0x0E, 0x80 | IRQ_T1 | IRQ_CB1);
        assert_eq!(via.ier, IRQ_T1 | IRQ_CB1);
        via.write(0x0E, IRQ_T1);
        assert_eq!(via.ier, IRQ_CB1);
        assert_eq!(via.read(0x0E), 0x80 | IRQ_CB1);
    }

    #[test]
    fn cb1_positive_edge_sets_flag_on_trailing_edge() {
        let mut via = Via6522::new();
        via.write(0x0C, 0x10);
        via.set_cb1(true);
        assert_eq!(via.ifr & IRQ_CB1, 0);
        via.update_phi2_trailing_edge();
        assert_ne!(via.ifr & IRQ_CB1, 0);
    }

    #[test]
    fn ca1_negative_edge_ignores_rising() {
        let mut via = Via6522::new();
        via.set_ca1(true);
        via.update_phi2_trailing_edge();
        assert_eq!(via.ifr & IRQ_CA1, 0);
        via.set_ca1(false);
        via.update_phi2_trailing_edge();
        assert_ne!(via.ifr & IRQ_CA1, 0);
    }

    #[test]
    fn ca1_edge_latches_port_a_when_enabled() {
        let mut via = Via6522::new();
        via.write(0x0B, ACR_PA_LATCHING);
        via.write(0x0C, 0x01);
        via.set_port_a_input(0x5A);
        via.set_ca1(true);
        via.update_phi2_trailing_edge();
        via.set_port_a_input(0xFF);
        assert_eq!(via.read(0x0F), 0x5A);
    }

    #[test]
    fn port_reads_mix_output_and_input_bits() {
        let mut via = Via6522::new();
        via.write(0x02, 0x0F);
        via.write(0x00, 0xAB);
        via.set_port_b_input(0xC0);
        assert_eq!(via.read(0x00), 0xCB);
    }

    #[test]
    fn port_a_reads_pins() {
        let mut via = Via6522::new();
        via.write(0x03, 0xF0);
        via.write(0x0F, 0xA5);
        via.set_port_a_input(0x3C);
        assert_eq!(via.read(0x0F), 0xAC);
    }

    #[test]
    fn ora_without_handshake_leaves_flags() {
        let mut via = Via6522::new();
        via.ifr = IRQ_CA1 | IRQ_CA2;
        let _ = via.read(0x0F);
        via.write(0x0F, 0);
        assert_eq!(via.ifr, IRQ_CA1 | IRQ_CA2);
    }

    #[test]
    fn ca2_pulse_mode_pulses_low_after_a_read() {
        let mut via = Via6522::new();
        via.write(0x0C, CX2_PULSE << 1);
        via.update_phi2_trailing_edge();
        via.set_ca2(true);

        let _ = via.read(0x01);
        assert!(!via.ca2());
        via.update_phi2_trailing_edge();
        assert!(!via.ca2());
        via.update_phi2_trailing_edge();
        assert!(via.ca2());
    }

    #[test]
    fn ca2_handshake_goes_low_on_read_and_high_on_ca1() {
        let mut via = Via6522::new();
        via.write(0x0C, CX2_HANDSHAKE << 1);
        via.set_ca2(true);
        let _ = via.read(0x01);
        assert!(!via.ca2());

        via.set_ca1(true);
        via.update_phi2_trailing_edge();
        via.set_ca1(false);
        via.update_phi2_trailing_edge();
        assert!(via.ca2());
    }

    #[test]
    fn cb2_handshake_is_write_only() {
        let mut via = Via6522::new();
        via.write(0x0C, CX2_HANDSHAKE << 5);
        via.set_cb2(true);
        let _ = via.read(0x00);
        assert!(via.cb2());
        via.write(0x00, 0);
        assert!(!via.cb2());
    }

    #[test]
    fn output_modes_drive_cx2() {
        let mut via = Via6522::new();
        via.write(0x0C, CX2_HIGH << 1 | CX2_LOW << 5);
        via.set_cb2(true);
        via.update_phi2_trailing_edge();
        assert!(via.ca2());
        assert!(!via.cb2());
    }

    #[test]
    fn pb7_follows_timer1_when_enabled() {
        let mut via = Via6522::new();
        via.write(0x02, 0xFF);
        via.write(0x00, 0x80);
        assert_eq!(via.port_b_pins() & 0x80, 0x80);

        via.write(0x0B, ACR_T1_OUTPUT_PB7 | ACR_T1_CONTINUOUS);
        via.write(0x04, 1);
        via.write(0x05, 0);
        assert_eq!(via.port_b_pins() & 0x80, 0);
        assert_eq!(via.read(0x00) & 0x80, 0);

        // Load, 0, $FFFF: toggles on the third leading edge.
        cycle(&mut via);
        cycle(&mut via);
        assert_eq!(via.port_b_output() & 0x80, 0);
        cycle(&mut via);
        assert_eq!(via.port_b_output() & 0x80, 0x80);
    }

    #[test]
    fn reset_keeps_identity() {
        let mut via = Via6522::with_id(1, "UserVIA");
        via.write(0x0E, 0xFF);
        via.write(0x0B, 0xC0);
        via.reset();
        assert_eq!(via.id(), 1);
        assert_eq!(via.name(), "UserVIA");
        assert_eq!(via.ier(), 0);
        assert_eq!(via.acr(), 0);
        assert_eq!(via.port_a_pins(), 0xFF);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn ids_are_four_bits() {
        let _ = Via6522::with_id(16, "Bad");
    }

    #[test]
    fn queries_have_no_side_effects() {
        let mut via = Via6522::new();
        via.ifr = IRQ_CA1;
        via.ier = IRQ_CA1;
        assert_eq!(via.query("ifr"), Some(Value::U8(IRQ_CA1)));
        assert_eq!(via.query("irq"), Some(Value::Bool(true)));
        assert_eq!(via.ifr, IRQ_CA1);
        assert!(via.query("bogus").is_none());
        for path in via.query_paths() {
            assert!(via.query(path).is_some(), "{path}");
        }
    }
}
