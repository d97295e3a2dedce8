//! Side-effect-free state queries.
//!
//! Debuggers and trace viewers inspect chips through this trait. Register
//! reads on the bus can clear flags or pop FIFOs; queries never do.

use std::fmt;

/// A dynamically-typed query result.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    /// Pin or flag state.
    Bool(bool),
    /// 8-bit register.
    U8(u8),
    /// 16-bit counter or address.
    U16(u16),
    /// Wide counter (wait times, cycle counts).
    U64(u64),
    /// State names and other text.
    String(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", u8::from(*v)),
            Value::U8(v) => write!(f, "${v:02X}"),
            Value::U16(v) => write!(f, "${v:04X}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::U8(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::U16(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::U64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

/// A chip whose state can be inspected without disturbing it.
pub trait Observable {
    /// Query one property by dotted path, e.g. `"ifr"` or `"fifo3.h2p_n"`.
    ///
    /// Returns `None` for unknown paths.
    fn query(&self, path: &str) -> Option<Value>;

    /// Every path `query` answers.
    fn query_paths(&self) -> &'static [&'static str];
}
