//! VIA trace events and their text form.

use beeb_trace::{
    EventFormatter, SaveContext, TraceEvent, TraceEventRegistry, TraceEventSource, TraceEventType,
};
use emu_core::Ticks;

const IRQ_EVENT_SIZE: usize = 3;
const TIMER_TICK_EVENT_SIZE: usize = 5;

const T1_TICKED: u8 = 0x10;
const T2_TICKED: u8 = 0x20;

/// Event types the VIA records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViaTraceEvents {
    /// `[id, ifr, ier]`, each cycle the IRQ output is asserted.
    pub irq: TraceEventType,
    /// `[t1 lo, t1 hi, t2 lo, t2 hi, id | ticked bits]`.
    pub timer_tick: TraceEventType,
}

impl ViaTraceEvents {
    #[must_use]
    pub fn register(registry: &mut TraceEventRegistry) -> Self {
        Self {
            irq: registry.register("R6522IRQEvent", IRQ_EVENT_SIZE, TraceEventSource::Host),
            timer_tick: registry.register(
                "R6522TimerTickEvent",
                TIMER_TICK_EVENT_SIZE,
                TraceEventSource::Host,
            ),
        }
    }
}

pub(crate) fn irq_payload(id: u8, ifr: u8, ier: u8) -> [u8; IRQ_EVENT_SIZE] {
    [id, ifr, ier]
}

pub(crate) fn timer_tick_payload(
    id: u8,
    t1: u16,
    t2: u16,
    t1_ticked: bool,
    t2_ticked: bool,
) -> [u8; TIMER_TICK_EVENT_SIZE] {
    let [t1_lo, t1_hi] = t1.to_le_bytes();
    let [t2_lo, t2_hi] = t2.to_le_bytes();
    let mut bits = id & 0x0F;
    if t1_ticked {
        bits |= T1_TICKED;
    }
    if t2_ticked {
        bits |= T2_TICKED;
    }
    [t1_lo, t1_hi, t2_lo, t2_hi, bits]
}

/// The set IFR/IER bits as ` t1 t2 cb1 cb2 sr ca1 ca2`, or ` -` if none.
#[must_use]
pub fn irq_flag_names(value: u8) -> String {
    const NAMES: [(u8, &str); 7] = [
        (crate::IRQ_T1, " t1"),
        (crate::IRQ_T2, " t2"),
        (crate::IRQ_CB1, " cb1"),
        (crate::IRQ_CB2, " cb2"),
        (crate::IRQ_SR, " sr"),
        (crate::IRQ_CA1, " ca1"),
        (crate::IRQ_CA2, " ca2"),
    ];

    if value & 0x7F == 0 {
        return " -".to_owned();
    }
    NAMES
        .iter()
        .filter(|(mask, _)| value & mask != 0)
        .map(|(_, name)| *name)
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct LastIrq {
    time: Ticks,
    ifr: u8,
    ier: u8,
}

/// Renders VIA IRQ state and timer events.
///
/// IRQ state is printed every cycle the IRQ is asserted, which floods the
/// output while interrupts are masked. A line is skipped when nothing has
/// changed and no instruction has executed since the last one printed for
/// that VIA.
#[derive(Debug)]
pub struct ViaEventFormatter {
    events: ViaTraceEvents,
    names: [String; 16],
    last: [Option<LastIrq>; 16],
}

impl ViaEventFormatter {
    #[must_use]
    pub fn new(events: ViaTraceEvents) -> Self {
        Self {
            events,
            names: std::array::from_fn(|id| format!("VIA{id}")),
            last: [None; 16],
        }
    }

    /// Name printed for the VIA with the given ID.
    #[must_use]
    pub fn with_name(mut self, id: u8, name: impl Into<String>) -> Self {
        self.names[usize::from(id & 0x0F)] = name.into();
        self
    }

    /// Types this formatter handles, for [`beeb_trace::TraceSaver::with_formatter`].
    #[must_use]
    pub fn event_types(&self) -> [TraceEventType; 2] {
        [self.events.irq, self.events.timer_tick]
    }

    fn format_irq(&mut self, event: &TraceEvent<'_>, ctx: &SaveContext, out: &mut String) {
        let [id, ifr, ier] = [event.data[0], event.data[1], event.data[2]];
        let slot = &mut self.last[usize::from(id & 0x0F)];

        let last_instruction = ctx.last_instruction_time().unwrap_or(Ticks::ZERO);
        let unchanged = slot.is_some_and(|last| {
            last.time > last_instruction && last.ifr == ifr && last.ier == ier
        });
        if unchanged {
            return;
        }
        *slot = Some(LastIrq {
            time: event.time,
            ifr,
            ier,
        });

        let prefix = ctx.time_prefix();
        out.push_str(prefix);
        out.push_str(&self.names[usize::from(id & 0x0F)]);
        out.push_str(" - IRQ state: ");
        push_irq_line(out, "IFR", ifr);
        out.extend(std::iter::repeat_n(' ', prefix.len()));
        push_irq_line(out, "IER", ier);
    }

    fn format_timer_tick(&self, event: &TraceEvent<'_>, ctx: &SaveContext, out: &mut String) {
        let t1 = u16::from_le_bytes([event.data[0], event.data[1]]);
        let t2 = u16::from_le_bytes([event.data[2], event.data[3]]);
        let bits = event.data[4];

        out.push_str(ctx.time_prefix());
        out.push_str(&format!(
            "{} - T1=${t1:04X}{} T2=${t2:04X}{}\n",
            self.names[usize::from(bits & 0x0F)],
            if bits & T1_TICKED != 0 { " (ticked)" } else { "" },
            if bits & T2_TICKED != 0 { " (ticked)" } else { "" },
        ));
    }
}

fn push_irq_line(out: &mut String, label: &str, value: u8) {
    out.push_str(&format!("{label}: ${value:02x} (%{value:08b})"));
    if value != 0 {
        out.push(':');
        out.push_str(&irq_flag_names(value));
    }
    out.push('\n');
}

impl EventFormatter for ViaEventFormatter {
    fn format(&mut self, event: &TraceEvent<'_>, ctx: &mut SaveContext, out: &mut String) {
        if event.event_type == self.events.irq {
            self.format_irq(event, ctx, out);
        } else if event.event_type == self.events.timer_tick {
            self.format_timer_tick(event, ctx, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_names_in_bit_order_from_the_top() {
        assert_eq!(irq_flag_names(0), " -");
        assert_eq!(irq_flag_names(0x80), " -");
        assert_eq!(irq_flag_names(0x41), " t1 ca2");
        assert_eq!(irq_flag_names(0x7F), " t1 t2 cb1 cb2 sr ca1 ca2");
    }

    #[test]
    fn timer_tick_payload_packs_id_and_flags() {
        assert_eq!(
            timer_tick_payload(3, 0x1234, 0xABCD, true, false),
            [0x34, 0x12, 0xCD, 0xAB, 0x13]
        );
    }

    #[test]
    fn irq_line_format() {
        let mut s = String::new();
        push_irq_line(&mut s, "IFR", 0x42);
        assert_eq!(s, "IFR: $42 (%01000010): t1 ca1\n");

        s.clear();
        push_irq_line(&mut s, "IER", 0);
        assert_eq!(s, "IER: $00 (%00000000)\n");
    }
}
