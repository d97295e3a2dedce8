//! Event type registration.

use serde::{Deserialize, Serialize};

use crate::trace::MAX_EVENT_SIZE;

/// Size of the discontinuity payload: the new absolute time.
pub(crate) const DISCONTINUITY_PAYLOAD_SIZE: usize = 8;

/// Which processor an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TraceEventSource {
    #[default]
    None,
    Host,
    Parasite,
}

/// Handle for a registered event type.
///
/// A size of zero marks a variable-size type, whose records carry their own
/// 16-bit size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceEventType {
    id: u8,
    size: u16,
}

impl TraceEventType {
    #[must_use]
    pub const fn id(self) -> u8 {
        self.id
    }

    /// Fixed payload size, or 0 for variable-size types.
    #[must_use]
    pub const fn size(self) -> usize {
        self.size as usize
    }

    #[must_use]
    pub const fn is_variable(self) -> bool {
        self.size == 0
    }
}

#[derive(Debug, Clone)]
struct TypeInfo {
    name: String,
    event_type: TraceEventType,
    source: TraceEventSource,
}

/// Table of event types known to a trace.
///
/// Build one at startup, register every chip's events, then share it
/// (usually behind an `Arc`) with the traces that use it. Type ids are
/// allocated in registration order; there is room for 256.
#[derive(Debug, Clone)]
pub struct TraceEventRegistry {
    types: Vec<TypeInfo>,
    string: TraceEventType,
    discontinuity: TraceEventType,
}

impl TraceEventRegistry {
    /// A registry holding only the built-in string and discontinuity types.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            types: Vec::with_capacity(32),
            string: TraceEventType { id: 0, size: 0 },
            discontinuity: TraceEventType { id: 0, size: 0 },
        };
        registry.string = registry.register("_string", 0, TraceEventSource::None);
        registry.discontinuity = registry.register(
            "_discontinuity",
            DISCONTINUITY_PAYLOAD_SIZE,
            TraceEventSource::None,
        );
        registry
    }

    /// Register a new event type. `size` 0 means variable-size.
    ///
    /// # Panics
    ///
    /// If the registry already holds 256 types or `size` exceeds
    /// [`MAX_EVENT_SIZE`]. Both are programming errors.
    pub fn register(
        &mut self,
        name: &str,
        size: usize,
        source: TraceEventSource,
    ) -> TraceEventType {
        assert!(size <= MAX_EVENT_SIZE, "event type {name}: size {size} too large");
        assert!(self.types.len() < 256, "event type {name}: registry full");

        let event_type = TraceEventType {
            id: self.types.len() as u8,
            size: size as u16,
        };
        self.types.push(TypeInfo {
            name: name.to_owned(),
            event_type,
            source,
        });
        event_type
    }

    /// Look up a type by its record id.
    #[must_use]
    pub fn get(&self, id: u8) -> Option<TraceEventType> {
        self.types.get(usize::from(id)).map(|info| info.event_type)
    }

    #[must_use]
    pub fn name(&self, event_type: TraceEventType) -> &str {
        self.types
            .get(usize::from(event_type.id))
            .map_or("?", |info| info.name.as_str())
    }

    #[must_use]
    pub fn source(&self, event_type: TraceEventType) -> TraceEventSource {
        self.types
            .get(usize::from(event_type.id))
            .map_or(TraceEventSource::None, |info| info.source)
    }

    /// Find a type by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<TraceEventType> {
        self.types
            .iter()
            .find(|info| info.name == name)
            .map(|info| info.event_type)
    }

    /// Free-form text events.
    #[must_use]
    pub fn string_event(&self) -> TraceEventType {
        self.string
    }

    /// Time jumps too large (or backwards) for a delta.
    #[must_use]
    pub fn discontinuity_event(&self) -> TraceEventType {
        self.discontinuity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for TraceEventRegistry {
    fn default() -> Self {
        Self::new()
    }
}
