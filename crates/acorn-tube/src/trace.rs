//! Tube trace events and their text form.

use std::collections::VecDeque;
use std::fmt::Write;

use beeb_trace::{
    EventFormatter, SaveContext, Trace, TraceEvent, TraceEventRegistry, TraceEventSource,
    TraceEventType,
};

use crate::{Tube, TubeSide};

const FIFO_EVENT_SIZE: usize = 3;
const STATUS_EVENT_SIZE: usize = 3;

// FIFO event flag bits
const H_NOT_FULL: u8 = 0x01;
const H_AVAILABLE: u8 = 0x02;
const P_NOT_FULL: u8 = 0x04;
const P_AVAILABLE: u8 = 0x08;
const HIRQ: u8 = 0x10;
const PIRQ: u8 = 0x20;
const PNMI: u8 = 0x40;

const CONTROL_NAMES: [&str; 7] = ["Q", "I", "J", "M", "V", "P", "T"];

/// Event types the Tube records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TubeTraceEvents {
    /// `[status, fifo3 counts, irq bits]`.
    pub write_status: TraceEventType,
    /// `[channel, value, flags]` for each of the four below.
    pub host_write: TraceEventType,
    pub host_read: TraceEventType,
    pub parasite_write: TraceEventType,
    pub parasite_read: TraceEventType,
}

impl TubeTraceEvents {
    #[must_use]
    pub fn register(registry: &mut TraceEventRegistry) -> Self {
        Self {
            write_status: registry.register(
                "TubeWriteStatusEvent",
                STATUS_EVENT_SIZE,
                TraceEventSource::Host,
            ),
            host_write: registry.register(
                "TubeHostWriteEvent",
                FIFO_EVENT_SIZE,
                TraceEventSource::Host,
            ),
            host_read: registry.register(
                "TubeHostReadEvent",
                FIFO_EVENT_SIZE,
                TraceEventSource::Host,
            ),
            parasite_write: registry.register(
                "TubeParasiteWriteEvent",
                FIFO_EVENT_SIZE,
                TraceEventSource::Parasite,
            ),
            parasite_read: registry.register(
                "TubeParasiteReadEvent",
                FIFO_EVENT_SIZE,
                TraceEventSource::Parasite,
            ),
        }
    }

    pub(crate) fn fifo_event(&self, side: TubeSide, write: bool) -> TraceEventType {
        match (side, write) {
            (TubeSide::Host, true) => self.host_write,
            (TubeSide::Host, false) => self.host_read,
            (TubeSide::Parasite, true) => self.parasite_write,
            (TubeSide::Parasite, false) => self.parasite_read,
        }
    }

    fn fifo_side(&self, event_type: TraceEventType) -> Option<(TubeSide, bool)> {
        [
            (self.host_write, TubeSide::Host, true),
            (self.host_read, TubeSide::Host, false),
            (self.parasite_write, TubeSide::Parasite, true),
            (self.parasite_read, TubeSide::Parasite, false),
        ]
        .into_iter()
        .find(|(ty, _, _)| *ty == event_type)
        .map(|(_, side, write)| (side, write))
    }
}

fn irq_bits(tube: &Tube) -> u8 {
    let mut bits = 0;
    if tube.hirq {
        bits |= HIRQ;
    }
    if tube.pirq {
        bits |= PIRQ;
    }
    if tube.pnmi {
        bits |= PNMI;
    }
    bits
}

pub(crate) fn fifo_payload(tube: &Tube, channel: u8, value: u8) -> [u8; FIFO_EVENT_SIZE] {
    let (h, p) = tube.channel_status(channel);
    let mut flags = irq_bits(tube);
    if h.not_full {
        flags |= H_NOT_FULL;
    }
    if h.available {
        flags |= H_AVAILABLE;
    }
    if p.not_full {
        flags |= P_NOT_FULL;
    }
    if p.available {
        flags |= P_AVAILABLE;
    }
    [channel, value, flags]
}

pub(crate) fn status_payload(tube: &Tube) -> [u8; STATUS_EVENT_SIZE] {
    [
        tube.status,
        tube.h2p3.n | tube.p2h3.n << 2,
        irq_bits(tube) >> 4,
    ]
}

fn char_column(value: u8) -> &'static str {
    match value {
        b'\t' => "\\t",
        b'\n' => "\\n",
        b'\r' => "\\r",
        _ => "",
    }
}

/// Log the parasite-to-host FIFO1 queue as index, decimal, hex and ASCII
/// rows.
pub(crate) fn write_fifo1_queue(trace: &mut Trace, op: &str, queue: &VecDeque<u8>) {
    let mut index = String::new();
    let mut dec = String::new();
    let mut hex = String::new();
    let mut chars = String::new();
    for (i, &value) in queue.iter().enumerate() {
        let _ = write!(index, "{i:3} ");
        let _ = write!(dec, "{value:3} ");
        let _ = write!(hex, "${value:02x} ");
        // Four columns per entry.
        if (32..=126).contains(&value) {
            let _ = write!(chars, "{:<4}", char::from(value));
        } else {
            let _ = write!(chars, "{:<4}", char_column(value));
        }
    }

    trace.alloc_fmt(format_args!("{op} FIFO1"));
    trace.alloc_fmt(format_args!("Index: {index}"));
    trace.alloc_fmt(format_args!("Dec  : {dec}"));
    trace.alloc_fmt(format_args!("Hex  : {hex}"));
    trace.alloc_fmt(format_args!("ASCII: {chars}"));
}

fn printable(value: u8) -> char {
    if (32..=126).contains(&value) {
        char::from(value)
    } else {
        '?'
    }
}

/// Renders Tube FIFO traffic and control register writes.
#[derive(Debug)]
pub struct TubeEventFormatter {
    events: TubeTraceEvents,
}

impl TubeEventFormatter {
    #[must_use]
    pub fn new(events: TubeTraceEvents) -> Self {
        Self { events }
    }

    /// Types this formatter handles, for [`beeb_trace::TraceSaver::with_formatter`].
    #[must_use]
    pub fn event_types(&self) -> [TraceEventType; 5] {
        [
            self.events.write_status,
            self.events.host_write,
            self.events.host_read,
            self.events.parasite_write,
            self.events.parasite_read,
        ]
    }

    fn format_status(event: &TraceEvent<'_>, out: &mut String) {
        let [status, fifo3, irqs] = [event.data[0], event.data[1], event.data[2]];
        let names: Vec<&str> = CONTROL_NAMES
            .iter()
            .enumerate()
            .filter(|(bit, _)| status & 1 << bit != 0)
            .map(|(_, name)| *name)
            .collect();

        let _ = writeln!(
            out,
            "Tube status: ${status:02x} ({}); FIFO3 h->p n={} p->h n={}; HIRQ={} PIRQ={} PNMI={}",
            if names.is_empty() {
                "-".to_owned()
            } else {
                names.join(" ")
            },
            fifo3 & 3,
            fifo3 >> 2 & 3,
            irqs & 1,
            irqs >> 1 & 1,
            irqs >> 2 & 1,
        );
    }

    fn format_fifo(side: TubeSide, write: bool, event: &TraceEvent<'_>, out: &mut String) {
        let [channel, value, flags] = [event.data[0], event.data[1], event.data[2]];
        // Writes go away from the writer, reads come towards the reader.
        let direction = match (side, write) {
            (TubeSide::Host, true) | (TubeSide::Parasite, false) => "h->p",
            (TubeSide::Parasite, true) | (TubeSide::Host, false) => "p->h",
        };
        let bit = |mask: u8| u8::from(flags & mask != 0);

        let _ = writeln!(
            out,
            "{direction} FIFO{channel} {}={value} (0x{value:02X}, '{}') \
             H not full={} available={}; P not full={} available={}; \
             HIRQ={} PIRQ={} PNMI={}",
            if write { "write" } else { "read" },
            printable(value),
            bit(H_NOT_FULL),
            bit(H_AVAILABLE),
            bit(P_NOT_FULL),
            bit(P_AVAILABLE),
            bit(HIRQ),
            bit(PIRQ),
            bit(PNMI),
        );
    }
}

impl EventFormatter for TubeEventFormatter {
    fn format(&mut self, event: &TraceEvent<'_>, ctx: &mut SaveContext, out: &mut String) {
        out.push_str(ctx.time_prefix());
        if event.event_type == self.events.write_status {
            Self::format_status(event, out);
        } else if let Some((side, write)) = self.events.fifo_side(event.event_type) {
            Self::format_fifo(side, write, event, out);
        }
    }
}
