//! Rendering a trace as text.
//!
//! Each event becomes one or more lines, optionally prefixed with its time
//! in cycles and, when a second processor has logged anything, an `H`/`P`
//! column for the side it came from. Chips supply [`EventFormatter`]s for
//! their own event types; text events are handled here and anything
//! without a formatter gets a generic `EVENT: type=...; size=...` line.

use std::io::{self, Write};
use std::ops::{BitOr, BitOrAssign};
use std::sync::atomic::{AtomicU64, Ordering};

use emu_core::Ticks;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::{TraceEventSource, TraceEventType};
use crate::trace::{Trace, TraceEvent};

/// What to include in saved output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceOutputFlags(u32);

impl TraceOutputFlags {
    pub const NONE: Self = Self(0);
    /// Spell out register names in state dumps.
    pub const REGISTER_NAMES: Self = Self(1 << 0);
    /// Prefix lines with the event time.
    pub const CYCLES: Self = Self(1 << 1);
    /// Times count from zero rather than from the first event.
    pub const ABSOLUTE_CYCLES: Self = Self(1 << 2);

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & 7)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for TraceOutputFlags {
    fn default() -> Self {
        Self::CYCLES | Self::REGISTER_NAMES
    }
}

impl BitOr for TraceOutputFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TraceOutputFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Error)]
pub enum SaveTraceError {
    #[error("failed to write trace output: {0}")]
    Io(#[from] io::Error),
}

/// How a save ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Completed,
    Canceled,
}

/// Counters another thread can poll while a save runs.
#[derive(Debug, Default)]
pub struct SaveProgress {
    bytes_written: AtomicU64,
    events_handled: AtomicU64,
    num_events: AtomicU64,
}

impl SaveProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn events_handled(&self) -> u64 {
        self.events_handled.load(Ordering::Acquire)
    }

    /// Records in the trace when the save started.
    #[must_use]
    pub fn num_events(&self) -> u64 {
        self.num_events.load(Ordering::Acquire)
    }
}

/// State shared by the formatters during one save.
#[derive(Debug)]
pub struct SaveContext {
    flags: TraceOutputFlags,
    time_prefix: String,
    last_instruction_time: Option<Ticks>,
}

impl SaveContext {
    #[must_use]
    pub fn flags(&self) -> TraceOutputFlags {
        self.flags
    }

    /// Time column for the current event, including trailing spaces.
    /// Empty when cycles aren't being printed.
    #[must_use]
    pub fn time_prefix(&self) -> &str {
        &self.time_prefix
    }

    /// Called by instruction formatters so state formatters can tell
    /// whether the CPU has moved on since they last printed.
    pub fn note_instruction(&mut self, time: Ticks) {
        self.last_instruction_time = Some(time);
    }

    #[must_use]
    pub fn last_instruction_time(&self) -> Option<Ticks> {
        self.last_instruction_time
    }
}

/// Turns events of some set of types into text.
pub trait EventFormatter {
    /// Append the text for `event` to `out`, ending with a newline.
    fn format(&mut self, event: &TraceEvent<'_>, ctx: &mut SaveContext, out: &mut String);
}

/// Text events: the prefix, then the text with continuation lines lined
/// up under the first.
struct StringFormatter;

impl EventFormatter for StringFormatter {
    fn format(&mut self, event: &TraceEvent<'_>, ctx: &mut SaveContext, out: &mut String) {
        let prefix = ctx.time_prefix();
        out.push_str(prefix);

        let text = event.text();
        let mut lines = text.split('\n').peekable();
        let mut first = true;
        while let Some(line) = lines.next() {
            if lines.peek().is_none() && line.is_empty() && !first {
                break;
            }
            if !first {
                out.extend(std::iter::repeat_n(' ', prefix.len()));
            }
            out.push_str(line);
            out.push('\n');
            first = false;
        }
    }
}

/// Writes a trace out as text.
pub struct TraceSaver<'a> {
    trace: &'a Trace,
    flags: TraceOutputFlags,
    formatters: Vec<Box<dyn EventFormatter + 'a>>,
    by_type: [Option<usize>; 256],
}

impl<'a> TraceSaver<'a> {
    #[must_use]
    pub fn new(trace: &'a Trace, flags: TraceOutputFlags) -> Self {
        let string = trace.registry().string_event();
        Self {
            trace,
            flags,
            formatters: Vec::new(),
            by_type: [None; 256],
        }
        .with_formatter(&[string], StringFormatter)
    }

    /// Use `formatter` for events of the given types.
    ///
    /// # Panics
    ///
    /// If any of the types already has a formatter.
    #[must_use]
    pub fn with_formatter(
        mut self,
        types: &[TraceEventType],
        formatter: impl EventFormatter + 'a,
    ) -> Self {
        let index = self.formatters.len();
        for event_type in types {
            let slot = &mut self.by_type[usize::from(event_type.id())];
            assert!(
                slot.is_none(),
                "event type {} already has a formatter",
                self.trace.registry().name(*event_type)
            );
            *slot = Some(index);
        }
        self.formatters.push(Box::new(formatter));
        self
    }

    /// Format every event into `out`.
    ///
    /// `was_canceled` is polled after each event; once it returns true the
    /// output is ended with a note saying so. A write failure stops the
    /// save and is returned.
    pub fn save<W, C>(
        &mut self,
        out: &mut W,
        mut was_canceled: C,
        progress: Option<&SaveProgress>,
    ) -> Result<SaveOutcome, SaveTraceError>
    where
        W: Write + ?Sized,
        C: FnMut() -> bool,
    {
        let stats = self.trace.stats();
        if let Some(progress) = progress {
            progress.num_events.store(stats.num_events, Ordering::Release);
            progress.events_handled.store(0, Ordering::Release);
            progress.bytes_written.store(0, Ordering::Release);
        }

        let base = if self.flags.contains(TraceOutputFlags::ABSOLUTE_CYCLES) {
            Ticks::ZERO
        } else {
            self.first_event_time()
        };
        let place = initial_place_value(stats.max_time - base);
        let show_source = self.has_parasite_events();

        let mut ctx = SaveContext {
            flags: self.flags,
            time_prefix: String::with_capacity(24),
            last_instruction_time: None,
        };
        let mut text = String::with_capacity(256);
        let mut error = None;
        let by_type = &self.by_type;
        let formatters = &mut self.formatters;

        let completed = self.trace.for_each_event(|event| {
            ctx.time_prefix.clear();
            if ctx.flags.contains(TraceOutputFlags::CYCLES) {
                push_time(&mut ctx.time_prefix, event.time - base, place);
            }
            if show_source {
                ctx.time_prefix.push_str(match event.source {
                    TraceEventSource::Host => "H  ",
                    TraceEventSource::Parasite => "P  ",
                    TraceEventSource::None => "   ",
                });
            }

            text.clear();
            match by_type[usize::from(event.event_type.id())] {
                Some(index) => formatters[index].format(event, &mut ctx, &mut text),
                None => {
                    text.push_str("EVENT: type=");
                    text.push_str(event.name);
                    text.push_str("; size=");
                    text.push_str(&event.data.len().to_string());
                    text.push('\n');
                }
            }

            if let Err(e) = out.write_all(text.as_bytes()) {
                error = Some(e);
                return false;
            }
            if let Some(progress) = progress {
                progress
                    .bytes_written
                    .fetch_add(text.len() as u64, Ordering::AcqRel);
            }

            if was_canceled() {
                return false;
            }

            if let Some(progress) = progress {
                progress.events_handled.fetch_add(1, Ordering::AcqRel);
            }
            true
        });

        if let Some(e) = error {
            return Err(e.into());
        }

        let outcome = if completed {
            SaveOutcome::Completed
        } else {
            tracing::debug!(
                handled = progress.map(SaveProgress::events_handled),
                "trace save canceled"
            );
            out.write_all(b"(trace file output was canceled)\n")?;
            SaveOutcome::Canceled
        };
        out.flush()?;
        Ok(outcome)
    }

    /// With a second processor in the trace, lines get a column saying
    /// which side they came from.
    fn has_parasite_events(&self) -> bool {
        !self
            .trace
            .for_each_event(|event| event.source != TraceEventSource::Parasite)
    }

    fn first_event_time(&self) -> Ticks {
        let mut first = Ticks::ZERO;
        self.trace.for_each_event(|event| {
            first = event.time;
            false
        });
        first
    }
}

/// Largest power of ten not above `span`, and at least 1.
fn initial_place_value(span: u64) -> u64 {
    let mut place = 1;
    while place <= span / 10 {
        place *= 10;
    }
    place
}

/// Right-aligned decimal time followed by two spaces.
fn push_time(out: &mut String, value: u64, place: u64) {
    let mut fill = ' ';
    let mut place = place;
    while place != 0 {
        let digit = value / place % 10;
        if digit != 0 || place == 1 {
            out.push(char::from(b'0' + digit as u8));
            fill = '0';
        } else {
            out.push(fill);
        }
        place /= 10;
    }
    out.push_str("  ");
}
