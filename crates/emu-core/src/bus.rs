//! Register access and interrupt line interfaces.

/// Byte-wide register access.
///
/// Peripherals implement this with themselves as the receiver. The full
/// 16-bit address is passed through; most chips only decode the low bits,
/// and selecting which chip sees the access is the caller's job.
pub trait Bus {
    /// Read a byte. Reads may have side effects (flag clearing, FIFO pops).
    fn read(&mut self, address: u16) -> u8;

    /// Write a byte.
    fn write(&mut self, address: u16, value: u8);
}

/// A chip that drives the CPU's interrupt lines.
///
/// Each source reports only its own line state. Combining the sources into
/// the CPU's IRQ and NMI inputs is done by whoever owns the chips.
pub trait InterruptSource {
    /// Whether this source is asserting IRQ.
    fn irq(&self) -> bool;

    /// Whether this source is asserting NMI.
    fn nmi(&self) -> bool {
        false
    }
}
