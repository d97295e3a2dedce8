//! Emulated-time event log shared by the peripheral chips.
//!
//! Chips append small binary records to a [`Trace`] while the machine runs;
//! a [`TraceSaver`] turns the log into text afterwards. Recording has to be
//! cheap enough to leave on at full speed, so each record is a 2-byte
//! header plus a payload:
//!
//! | byte | contents |
//! |------|----------|
//! | 0    | event type id |
//! | 1    | bits 0-6: cycles since previous event, bit 7: canceled |
//! | 2-3  | payload size, little endian (variable-size types only) |
//!
//! Event types are handed out by a [`TraceEventRegistry`] built before the
//! trace. Deltas that don't fit in 7 bits are preceded by a discontinuity
//! record carrying the absolute time.

mod registry;
mod save;
mod trace;

pub use registry::{TraceEventRegistry, TraceEventSource, TraceEventType};
pub use save::{
    EventFormatter, SaveContext, SaveOutcome, SaveProgress, SaveTraceError, TraceOutputFlags,
    TraceSaver,
};
pub use trace::{
    DEFAULT_CHUNK_SIZE, EventId, LogWriter, MAX_EVENT_SIZE, MAX_STRING_FORMAT_LEN, MAX_TIME_DELTA,
    Trace, TraceConfig, TraceEvent, TraceHandle, TraceStats,
};
