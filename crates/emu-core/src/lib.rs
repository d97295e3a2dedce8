//! Shared primitives for the peripheral chips.
//!
//! Every chip is a passive state machine: the machine owning it decodes
//! addresses, forwards register accesses through [`Bus`], advances the
//! chip once per clock edge and ORs the chip's interrupt outputs into the
//! CPU. Time is counted in [`Ticks`] of the machine's cycle clock.

mod bus;
mod observable;
mod ticks;

pub use bus::{Bus, InterruptSource};
pub use observable::{Observable, Value};
pub use ticks::Ticks;
