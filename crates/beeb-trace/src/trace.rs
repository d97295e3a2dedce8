//! Chunked, delta-timed event storage.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use emu_core::Ticks;
use serde::{Deserialize, Serialize};

use crate::registry::{
    DISCONTINUITY_PAYLOAD_SIZE, TraceEventRegistry, TraceEventSource, TraceEventType,
};

/// Largest payload a single event can carry.
pub const MAX_EVENT_SIZE: usize = 65535;

/// Largest time delta a record header can hold.
pub const MAX_TIME_DELTA: u64 = 127;

pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Output limit for [`Trace::alloc_fmt`].
pub const MAX_STRING_FORMAT_LEN: usize = 1024;

const HEADER_SIZE: usize = 2;
const SIZED_HEADER_SIZE: usize = 4;
const DISCONTINUITY_RECORD_SIZE: usize = HEADER_SIZE + DISCONTINUITY_PAYLOAD_SIZE;

const DELTA_MASK: u8 = 0x7F;
const CANCELED: u8 = 0x80;

/// How chips share a trace. The step loop is single threaded.
pub type TraceHandle = Rc<RefCell<Trace>>;

/// Memory limits for a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Allocation budget. Once exceeded, the oldest chunk is dropped
    /// whenever a new one is needed, unless it is the only chunk.
    pub max_bytes: usize,
    /// Capacity of each chunk. Events larger than this get a chunk of
    /// their own.
    pub chunk_size: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            max_bytes: usize::MAX,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceStats {
    /// Records held, including canceled ones and discontinuities.
    pub num_events: u64,
    pub num_used_bytes: usize,
    pub num_allocated_bytes: usize,
    /// Latest time any event was recorded at.
    pub max_time: Ticks,
}

/// Where an event lives, for filling in or canceling it after allocation.
///
/// Ids outlive the chunk they point into; once that chunk has been evicted
/// the id resolves to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId {
    chunk: u64,
    offset: usize,
}

/// One event as seen during playback.
#[derive(Debug, Clone, Copy)]
pub struct TraceEvent<'a> {
    pub event_type: TraceEventType,
    pub name: &'a str,
    pub source: TraceEventSource,
    pub time: Ticks,
    pub data: &'a [u8],
}

impl TraceEvent<'_> {
    /// Payload as text, for string events.
    #[must_use]
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.data)
    }
}

#[derive(Debug)]
struct Chunk {
    serial: u64,
    data: Vec<u8>,
    capacity: usize,
    num_events: u64,
    initial_time: Ticks,
    last_time: Ticks,
}

impl Chunk {
    fn remaining(&self) -> usize {
        self.capacity - self.data.len()
    }
}

/// Append-only log of emulated-time events.
#[derive(Debug)]
pub struct Trace {
    registry: Arc<TraceEventRegistry>,
    config: TraceConfig,
    chunks: VecDeque<Chunk>,
    next_serial: u64,
    stats: TraceStats,
    /// Time of the newest record.
    last_time: Ticks,
    /// Time new records are stamped with.
    now: Ticks,
}

impl Trace {
    #[must_use]
    pub fn new(registry: Arc<TraceEventRegistry>, config: TraceConfig) -> Self {
        Self {
            registry,
            config,
            chunks: VecDeque::new(),
            next_serial: 0,
            stats: TraceStats::default(),
            last_time: Ticks::ZERO,
            now: Ticks::ZERO,
        }
    }

    #[must_use]
    pub fn into_handle(self) -> TraceHandle {
        Rc::new(RefCell::new(self))
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<TraceEventRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> TraceConfig {
        self.config
    }

    #[must_use]
    pub fn stats(&self) -> TraceStats {
        self.stats
    }

    /// Number of chunks currently held.
    #[must_use]
    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Set the time subsequent events are recorded at.
    pub fn set_time(&mut self, now: Ticks) {
        self.now = now;
    }

    #[must_use]
    pub fn time(&self) -> Ticks {
        self.now
    }

    /// Allocate a zero-filled fixed-size event; fill it in through
    /// [`Trace::payload_mut`].
    ///
    /// Returns `None` if memory for it could not be allocated.
    ///
    /// # Panics
    ///
    /// If `event_type` is variable-size.
    pub fn alloc_event(&mut self, event_type: TraceEventType) -> Option<EventId> {
        assert!(
            !event_type.is_variable(),
            "alloc_event on variable-size type {}",
            self.registry.name(event_type)
        );
        self.append(event_type, event_type.size(), 0)
    }

    /// Allocate a zero-filled variable-size event of `size` bytes.
    ///
    /// # Panics
    ///
    /// If `event_type` is fixed-size.
    pub fn alloc_event_with_size(
        &mut self,
        event_type: TraceEventType,
        size: usize,
    ) -> Option<EventId> {
        assert!(
            event_type.is_variable(),
            "alloc_event_with_size on fixed-size type {}",
            self.registry.name(event_type)
        );
        if size > MAX_EVENT_SIZE {
            return None;
        }
        self.append(event_type, size, 0)
    }

    /// Record an event with the given payload.
    ///
    /// # Panics
    ///
    /// If `event_type` is fixed-size and `data` is the wrong length.
    pub fn write_event(&mut self, event_type: TraceEventType, data: &[u8]) -> Option<EventId> {
        let id = if event_type.is_variable() {
            self.alloc_event_with_size(event_type, data.len())?
        } else {
            assert_eq!(
                data.len(),
                event_type.size(),
                "payload size for {}",
                self.registry.name(event_type)
            );
            self.alloc_event(event_type)?
        };
        self.payload_mut(id)?.copy_from_slice(data);
        Some(id)
    }

    /// Record a text event.
    pub fn alloc_string(&mut self, text: &str) -> Option<EventId> {
        let string = self.registry.string_event();
        self.write_event(string, text.as_bytes())
    }

    /// Record formatted text, truncated to [`MAX_STRING_FORMAT_LEN`] bytes.
    pub fn alloc_fmt(&mut self, args: fmt::Arguments<'_>) -> Option<EventId> {
        let mut writer = self.log_writer(MAX_STRING_FORMAT_LEN)?;
        // Truncation is silent; the writer never reports an error.
        let _ = fmt::Write::write_fmt(&mut writer, args);
        Some(writer.finish())
    }

    /// Start a text event that grows as it is written to, up to `max_len`
    /// bytes.
    pub fn log_writer(&mut self, max_len: usize) -> Option<LogWriter<'_>> {
        let max_len = max_len.min(MAX_EVENT_SIZE);
        let string = self.registry.string_event();
        let id = self.append(string, 0, max_len)?;
        Some(LogWriter {
            trace: self,
            id,
            len: 0,
            max_len,
        })
    }

    /// Mutable payload of an event that is still held.
    pub fn payload_mut(&mut self, id: EventId) -> Option<&mut [u8]> {
        let registry = Arc::clone(&self.registry);
        let chunk = self.chunk_mut(id.chunk)?;
        let (start, size) = record_extent(&registry, &chunk.data, id.offset);
        chunk.data.get_mut(start..start + size)
    }

    /// Mark an event so playback skips it. Its bytes stay where they are.
    pub fn cancel_event(&mut self, id: EventId) {
        if let Some(chunk) = self.chunk_mut(id.chunk) {
            chunk.data[id.offset + 1] |= CANCELED;
        }
    }

    /// Play back every live event in recording order with its absolute
    /// time. Returns `false` if `f` stopped playback early.
    ///
    /// # Panics
    ///
    /// If a record names a type the registry doesn't know, which means the
    /// log is corrupt.
    pub fn for_each_event<F>(&self, mut f: F) -> bool
    where
        F: FnMut(&TraceEvent<'_>) -> bool,
    {
        let discontinuity = self.registry.discontinuity_event();

        for chunk in &self.chunks {
            let data = chunk.data.as_slice();
            let mut time = chunk.initial_time;
            let mut offset = 0;

            while offset < data.len() {
                let Some(event_type) = self.registry.get(data[offset]) else {
                    panic!("trace record with unregistered type {}", data[offset]);
                };
                let flags = data[offset + 1];
                let (start, size) = record_extent(&self.registry, data, offset);
                let payload = &data[start..start + size];
                offset = start + size;

                time += u64::from(flags & DELTA_MASK);

                if event_type == discontinuity {
                    let mut bytes = [0; DISCONTINUITY_PAYLOAD_SIZE];
                    bytes.copy_from_slice(payload);
                    time = Ticks(u64::from_le_bytes(bytes));
                    continue;
                }

                if flags & CANCELED != 0 {
                    continue;
                }

                let event = TraceEvent {
                    event_type,
                    name: self.registry.name(event_type),
                    source: self.registry.source(event_type),
                    time,
                    data: payload,
                };
                if !f(&event) {
                    return false;
                }
            }
        }

        true
    }

    fn chunk_mut(&mut self, serial: u64) -> Option<&mut Chunk> {
        let first = self.chunks.front()?.serial;
        let index = usize::try_from(serial.checked_sub(first)?).ok()?;
        self.chunks.get_mut(index)
    }

    fn needs_discontinuity(&self) -> bool {
        self.now
            .since(self.last_time)
            .is_none_or(|delta| delta > MAX_TIME_DELTA)
    }

    /// Append one record of `size` payload bytes, leaving `extra` bytes of
    /// room after it in the same chunk.
    fn append(&mut self, event_type: TraceEventType, size: usize, extra: usize) -> Option<EventId> {
        let discontinuity = self.needs_discontinuity();
        let header = if event_type.is_variable() {
            SIZED_HEADER_SIZE
        } else {
            HEADER_SIZE
        };
        let mut needed = header + size + extra;
        if discontinuity {
            needed += DISCONTINUITY_RECORD_SIZE;
        }
        self.ensure_room(needed)?;

        if self.now > self.stats.max_time {
            self.stats.max_time = self.now;
        }

        if discontinuity {
            self.last_time = self.now;
            let time = self.now.get().to_le_bytes();
            self.push_record(self.registry.discontinuity_event(), &time);
        }

        Some(self.push_zeroed(event_type, size))
    }

    fn push_record(&mut self, event_type: TraceEventType, payload: &[u8]) -> EventId {
        let id = self.push_zeroed(event_type, payload.len());
        if let Some(chunk) = self.chunks.back_mut() {
            let start = chunk.data.len() - payload.len();
            chunk.data[start..].copy_from_slice(payload);
        }
        id
    }

    /// Caller has made room in the last chunk.
    fn push_zeroed(&mut self, event_type: TraceEventType, size: usize) -> EventId {
        let delta = (self.now - self.last_time) as u8 & DELTA_MASK;
        let Some(chunk) = self.chunks.back_mut() else {
            unreachable!("push_zeroed without a chunk");
        };

        let offset = chunk.data.len();
        chunk.data.push(event_type.id());
        chunk.data.push(delta);
        if event_type.is_variable() {
            chunk.data.extend_from_slice(&(size as u16).to_le_bytes());
        }
        chunk.data.resize(chunk.data.len() + size, 0);

        chunk.num_events += 1;
        chunk.last_time = self.now;

        self.stats.num_events += 1;
        self.stats.num_used_bytes += chunk.data.len() - offset;
        self.last_time = self.now;

        EventId {
            chunk: chunk.serial,
            offset,
        }
    }

    fn ensure_room(&mut self, needed: usize) -> Option<()> {
        if self
            .chunks
            .back()
            .is_some_and(|chunk| chunk.remaining() >= needed)
        {
            return Some(());
        }

        let capacity = self.config.chunk_size.max(needed);
        let mut data = Vec::new();
        if let Err(error) = data.try_reserve_exact(capacity) {
            tracing::warn!(capacity, %error, "trace chunk allocation failed; event dropped");
            return None;
        }

        let over_budget = self.stats.num_allocated_bytes.saturating_add(capacity) > self.config.max_bytes;
        if over_budget && self.chunks.len() > 1 {
            if let Some(oldest) = self.chunks.pop_front() {
                self.stats.num_used_bytes -= oldest.data.len();
                self.stats.num_allocated_bytes -= oldest.capacity;
                self.stats.num_events -= oldest.num_events;
                tracing::debug!(
                    serial = oldest.serial,
                    events = oldest.num_events,
                    first = oldest.initial_time.get(),
                    last = oldest.last_time.get(),
                    "evicted oldest trace chunk"
                );
            }
        }

        self.chunks.push_back(Chunk {
            serial: self.next_serial,
            data,
            capacity,
            num_events: 0,
            initial_time: self.last_time,
            last_time: self.last_time,
        });
        self.next_serial += 1;
        self.stats.num_allocated_bytes += capacity;

        Some(())
    }
}

/// Payload start and size of the record at `offset`.
fn record_extent(registry: &TraceEventRegistry, data: &[u8], offset: usize) -> (usize, usize) {
    let Some(event_type) = registry.get(data[offset]) else {
        panic!("trace record with unregistered type {}", data[offset]);
    };
    if event_type.is_variable() {
        let size = u16::from_le_bytes([data[offset + 2], data[offset + 3]]);
        (offset + SIZED_HEADER_SIZE, usize::from(size))
    } else {
        (offset + HEADER_SIZE, event_type.size())
    }
}

/// A text event being written in place.
///
/// Holding the writer borrows the trace, so the event is always the last
/// record and can grow or shrink without disturbing anything else.
pub struct LogWriter<'a> {
    trace: &'a mut Trace,
    id: EventId,
    len: usize,
    max_len: usize,
}

impl LogWriter<'_> {
    #[must_use]
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Keep the text written so far.
    #[must_use = "the id is the only way to refer to the event later"]
    pub fn finish(self) -> EventId {
        self.id
    }

    /// Drop the text and mark the event canceled.
    pub fn cancel(self) {
        let offset = self.id.offset;
        if let Some(chunk) = self.trace.chunks.back_mut() {
            chunk.data.truncate(offset + SIZED_HEADER_SIZE);
            chunk.data[offset + 1] |= CANCELED;
            chunk.data[offset + 2..offset + 4].copy_from_slice(&0u16.to_le_bytes());
        }
        self.trace.stats.num_used_bytes -= self.len;
    }
}

impl fmt::Write for LogWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.max_len - self.len;
        let mut take = s.len().min(room);
        while !s.is_char_boundary(take) {
            take -= 1;
        }
        if take == 0 {
            return Ok(());
        }

        let offset = self.id.offset;
        if let Some(chunk) = self.trace.chunks.back_mut() {
            chunk.data.extend_from_slice(&s.as_bytes()[..take]);
            self.len += take;
            chunk.data[offset + 2..offset + 4].copy_from_slice(&(self.len as u16).to_le_bytes());
        }
        self.trace.stats.num_used_bytes += take;
        Ok(())
    }
}

impl fmt::Debug for LogWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogWriter")
            .field("id", &self.id)
            .field("len", &self.len)
            .field("max_len", &self.max_len)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Write as _;

    use super::*;

    fn registry_with(size: usize) -> (Arc<TraceEventRegistry>, TraceEventType) {
        let mut registry = TraceEventRegistry::new();
        let ty = registry.register("test", size, TraceEventSource::Host);
        (Arc::new(registry), ty)
    }

    fn collect(trace: &Trace) -> Vec<(String, u64, Vec<u8>)> {
        let mut events = Vec::new();
        trace.for_each_event(|e| {
            events.push((e.name.to_owned(), e.time.get(), e.data.to_vec()));
            true
        });
        events
    }

    #[test]
    fn fixed_events_play_back_with_times() {
        let (registry, ty) = registry_with(2);
        let mut trace = Trace::new(registry, TraceConfig::default());

        trace.set_time(Ticks(5));
        trace.write_event(ty, &[1, 2]).expect("alloc");
        trace.set_time(Ticks(9));
        let id = trace.alloc_event(ty).expect("alloc");
        trace.payload_mut(id).expect("payload")[1] = 7;

        let events = collect(&trace);
        assert_eq!(
            events,
            vec![
                ("test".to_owned(), 5, vec![1, 2]),
                ("test".to_owned(), 9, vec![0, 7]),
            ]
        );
        assert_eq!(trace.stats().num_events, 2);
        assert_eq!(trace.stats().num_used_bytes, 8);
        assert_eq!(trace.stats().max_time, Ticks(9));
    }

    #[test]
    fn large_and_backward_jumps_insert_discontinuities() {
        let (registry, ty) = registry_with(1);
        let mut trace = Trace::new(registry, TraceConfig::default());

        trace.set_time(Ticks(1000));
        trace.write_event(ty, &[1]).expect("alloc");
        trace.set_time(Ticks(10));
        trace.write_event(ty, &[2]).expect("alloc");

        let times: Vec<u64> = collect(&trace).iter().map(|e| e.1).collect();
        assert_eq!(times, vec![1000, 10]);
        // Two events, each preceded by a discontinuity.
        assert_eq!(trace.stats().num_events, 4);
        assert_eq!(trace.stats().max_time, Ticks(1000));
    }

    #[test]
    fn delta_of_exactly_127_needs_no_discontinuity() {
        let (registry, ty) = registry_with(1);
        let mut trace = Trace::new(registry, TraceConfig::default());

        trace.write_event(ty, &[0]).expect("alloc");
        trace.set_time(Ticks(127));
        trace.write_event(ty, &[0]).expect("alloc");
        assert_eq!(trace.stats().num_events, 2);

        trace.set_time(Ticks(255));
        trace.write_event(ty, &[0]).expect("alloc");
        assert_eq!(trace.stats().num_events, 4);
    }

    #[test]
    fn canceled_events_are_skipped() {
        let (registry, ty) = registry_with(1);
        let mut trace = Trace::new(registry, TraceConfig::default());

        let id = trace.write_event(ty, &[1]).expect("alloc");
        trace.write_event(ty, &[2]).expect("alloc");
        trace.cancel_event(id);

        let data: Vec<Vec<u8>> = collect(&trace).into_iter().map(|e| e.2).collect();
        assert_eq!(data, vec![vec![2]]);
        assert_eq!(trace.stats().num_events, 2);
    }

    #[test]
    fn playback_can_stop_early() {
        let (registry, ty) = registry_with(1);
        let mut trace = Trace::new(registry, TraceConfig::default());
        for i in 0..5 {
            trace.write_event(ty, &[i]).expect("alloc");
        }

        let mut seen = 0;
        let completed = trace.for_each_event(|_| {
            seen += 1;
            seen < 3
        });
        assert!(!completed);
        assert_eq!(seen, 3);
    }

    #[test]
    fn strings_and_formatting() {
        let (registry, _) = registry_with(1);
        let mut trace = Trace::new(registry, TraceConfig::default());

        trace.alloc_string("hello").expect("alloc");
        trace
            .alloc_fmt(format_args!("value=${:02X}", 0x3c))
            .expect("alloc");

        let text: Vec<Vec<u8>> = collect(&trace).into_iter().map(|e| e.2).collect();
        assert_eq!(text, vec![b"hello".to_vec(), b"value=$3C".to_vec()]);
    }

    #[test]
    fn formatted_strings_are_truncated() {
        let (registry, _) = registry_with(1);
        let mut trace = Trace::new(registry, TraceConfig::default());

        let long = "x".repeat(MAX_STRING_FORMAT_LEN + 100);
        trace.alloc_fmt(format_args!("{long}")).expect("alloc");

        let events = collect(&trace);
        assert_eq!(events[0].2.len(), MAX_STRING_FORMAT_LEN);
    }

    #[test]
    fn log_writer_grows_in_place_and_stops_at_its_limit() {
        let (registry, _) = registry_with(1);
        let mut trace = Trace::new(registry, TraceConfig::default());

        let mut writer = trace.log_writer(7).expect("alloc");
        write!(writer, "abc").expect("write");
        write!(writer, "def").expect("write");
        write!(writer, "éx").expect("write");
        // "é" straddles the limit and is dropped whole.
        assert_eq!(writer.len(), 6);
        let _ = writer.finish();

        let events = collect(&trace);
        assert_eq!(events[0].2, b"abcdef");
        assert_eq!(trace.stats().num_used_bytes, SIZED_HEADER_SIZE + 6);
    }

    #[test]
    fn canceling_a_log_writer_releases_its_bytes() {
        let (registry, ty) = registry_with(1);
        let mut trace = Trace::new(registry, TraceConfig::default());
        trace.write_event(ty, &[1]).expect("alloc");

        let mut writer = trace.log_writer(64).expect("alloc");
        write!(writer, "0123456789").expect("write");
        writer.cancel();
        let used_after_cancel = trace.stats().num_used_bytes;
        assert_eq!(used_after_cancel, HEADER_SIZE + 1 + SIZED_HEADER_SIZE);

        trace.write_event(ty, &[2]).expect("alloc");
        let data: Vec<Vec<u8>> = collect(&trace).into_iter().map(|e| e.2).collect();
        assert_eq!(data, vec![vec![1], vec![2]]);
    }

    #[test]
    fn oldest_chunk_is_evicted_over_budget() {
        let (registry, ty) = registry_with(8);
        let config = TraceConfig {
            max_bytes: 20,
            chunk_size: 10,
        };
        let mut trace = Trace::new(registry, config);

        for i in 0..4 {
            trace.set_time(Ticks(i));
            trace.write_event(ty, &[i as u8; 8]).expect("alloc");
        }

        // Each event fills a chunk; the budget holds two plus the new one
        // until an eviction brings it back.
        assert_eq!(trace.num_chunks(), 2);
        assert_eq!(trace.stats().num_events, 2);
        assert_eq!(trace.stats().num_allocated_bytes, 20);
        let times: Vec<u64> = collect(&trace).iter().map(|e| e.1).collect();
        assert_eq!(times, vec![2, 3]);
    }

    #[test]
    fn a_single_oversized_chunk_is_kept() {
        let (registry, _) = registry_with(1);
        let config = TraceConfig {
            max_bytes: 4,
            chunk_size: 4,
        };
        let mut trace = Trace::new(registry, config);

        trace.alloc_string("much longer than the budget").expect("alloc");
        assert_eq!(trace.num_chunks(), 1);
        assert_eq!(collect(&trace).len(), 1);
    }

    #[test]
    fn ids_into_evicted_chunks_resolve_to_nothing() {
        let (registry, ty) = registry_with(8);
        let config = TraceConfig {
            max_bytes: 10,
            chunk_size: 10,
        };
        let mut trace = Trace::new(registry, config);

        let first = trace.write_event(ty, &[0; 8]).expect("alloc");
        for _ in 0..3 {
            trace.write_event(ty, &[1; 8]).expect("alloc");
        }
        assert!(trace.payload_mut(first).is_none());
        trace.cancel_event(first);
    }

    #[test]
    fn oversized_variable_events_are_refused() {
        let (registry, _) = registry_with(1);
        let mut trace = Trace::new(Arc::clone(&registry), TraceConfig::default());
        let string = registry.string_event();
        assert!(trace.alloc_event_with_size(string, MAX_EVENT_SIZE + 1).is_none());
        assert!(trace.alloc_event_with_size(string, MAX_EVENT_SIZE).is_some());
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: TraceConfig = serde_json::from_str(r#"{"max_bytes": 1024}"#).expect("json");
        assert_eq!(config.max_bytes, 1024);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }
}
