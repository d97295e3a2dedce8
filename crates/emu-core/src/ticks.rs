//! Emulated time.

/// A count of machine cycles.
///
/// Trace events are stamped with this, and the chips' own waits are
/// expressed relative to it by their owners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ticks(pub u64);

impl Ticks {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(count: u64) -> Self {
        Self(count)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Cycles elapsed since `earlier`, or `None` if time went backwards.
    #[must_use]
    pub const fn since(self, earlier: Self) -> Option<u64> {
        self.0.checked_sub(earlier.0)
    }
}

impl core::ops::Add<u64> for Ticks {
    type Output = Self;

    fn add(self, rhs: u64) -> Self {
        Self(self.0.wrapping_add(rhs))
    }
}

impl core::ops::AddAssign<u64> for Ticks {
    fn add_assign(&mut self, rhs: u64) {
        self.0 = self.0.wrapping_add(rhs);
    }
}

impl core::ops::Sub for Ticks {
    type Output = u64;

    fn sub(self, rhs: Self) -> u64 {
        self.0.saturating_sub(rhs.0)
    }
}

impl From<u64> for Ticks {
    fn from(count: u64) -> Self {
        Self(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_detects_backwards_time() {
        assert_eq!(Ticks(10).since(Ticks(3)), Some(7));
        assert_eq!(Ticks(3).since(Ticks(10)), None);
    }

    #[test]
    fn arithmetic() {
        let mut t = Ticks::ZERO + 5;
        t += 3;
        assert_eq!(t.get(), 8);
        assert_eq!(t - Ticks(2), 6);
        assert_eq!(Ticks(2) - t, 0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_as_a_bare_count() {
        let json = serde_json::to_string(&Ticks(4_000_000)).expect("serialize");
        assert_eq!(json, "4000000");
        let back: Ticks = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, Ticks(4_000_000));
    }
}
