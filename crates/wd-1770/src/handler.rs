//! The drive side of the controller.

/// Where a sector lives and how big it is, as found in its ID field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorDetails {
    pub track: u8,
    pub side: u8,
    /// Data field size in bytes.
    pub size: usize,
}

/// The disc drive (or drives) the controller talks to.
///
/// Sector access always refers to the track the head is currently on.
/// Stepping is reported with the step rate in milliseconds so that drive
/// sounds or head timing can follow along.
pub trait Wd1770Handler {
    /// Whether the head is on track 0.
    fn is_track0(&mut self) -> bool;

    /// Step towards track 0.
    fn step_out(&mut self, step_rate_ms: u32);

    /// Step away from track 0.
    fn step_in(&mut self, step_rate_ms: u32);

    /// Switch the motor on.
    fn spin_up(&mut self);

    /// Switch the motor off.
    fn spin_down(&mut self);

    fn is_write_protected(&mut self) -> bool;

    /// Byte `offset` of `sector`, or `None` if there is no such byte.
    fn get_byte(&mut self, sector: u8, offset: usize) -> Option<u8>;

    /// Store byte `offset` of `sector`. Returns `false` if it couldn't be
    /// stored.
    fn set_byte(&mut self, sector: u8, offset: usize, value: u8) -> bool;

    /// ID field for `sector` in the given density, or `None` if the
    /// sector can't be found.
    fn get_sector_details(&mut self, sector: u8, double_density: bool) -> Option<SectorDetails>;
}

impl<T: Wd1770Handler + ?Sized> Wd1770Handler for &mut T {
    fn is_track0(&mut self) -> bool {
        (**self).is_track0()
    }

    fn step_out(&mut self, step_rate_ms: u32) {
        (**self).step_out(step_rate_ms);
    }

    fn step_in(&mut self, step_rate_ms: u32) {
        (**self).step_in(step_rate_ms);
    }

    fn spin_up(&mut self) {
        (**self).spin_up();
    }

    fn spin_down(&mut self) {
        (**self).spin_down();
    }

    fn is_write_protected(&mut self) -> bool {
        (**self).is_write_protected()
    }

    fn get_byte(&mut self, sector: u8, offset: usize) -> Option<u8> {
        (**self).get_byte(sector, offset)
    }

    fn set_byte(&mut self, sector: u8, offset: usize, value: u8) -> bool {
        (**self).set_byte(sector, offset, value)
    }

    fn get_sector_details(&mut self, sector: u8, double_density: bool) -> Option<SectorDetails> {
        (**self).get_sector_details(sector, double_density)
    }
}
