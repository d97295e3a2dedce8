//! Text forms used in trace output.

use std::fmt::{self, Write};

const STATUS_BIT_NAMES: [&str; 8] = ["Bu", "D/I", "L/0", "CRC", "RNF", "R/S", "WP", "Mo"];

const DUMP_COLUMNS: usize = 16;

/// Short names of the set status bits, lowest first, e.g. `Bu D/I Mo`.
pub(crate) fn status_bit_names(status: u8) -> String {
    STATUS_BIT_NAMES
        .iter()
        .enumerate()
        .filter(|(bit, _)| status & 1 << bit != 0)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(" ")
}

/// 16 bytes per row: offset, hex, then printable ASCII.
pub(crate) fn hex_dump<W: Write>(out: &mut W, data: &[u8]) -> fmt::Result {
    if data.is_empty() {
        return out.write_str("<<no data>>\n");
    }

    for (row, bytes) in data.chunks(DUMP_COLUMNS).enumerate() {
        write!(out, "0x{:08X}: ", row * DUMP_COLUMNS)?;
        for column in 0..DUMP_COLUMNS {
            match bytes.get(column) {
                Some(byte) => write!(out, "{byte:02X} ")?,
                None => out.write_str("   ")?,
            }
        }
        out.write_char(' ')?;
        for &byte in bytes {
            out.write_char(if (32..=126).contains(&byte) {
                char::from(byte)
            } else {
                '.'
            })?;
        }
        out.write_char('\n')?;
    }
    Ok(())
}
