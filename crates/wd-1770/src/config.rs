use serde::{Deserialize, Serialize};

/// Which part is fitted. The two differ only in step rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wd1770Variant {
    #[default]
    Wd1770,
    Wd1772,
}

impl Wd1770Variant {
    /// Step rates in milliseconds, indexed by the command's `r` bits.
    #[must_use]
    pub fn step_rates_ms(self) -> [u32; 4] {
        match self {
            Self::Wd1770 => [6, 12, 20, 30],
            // The data sheet says 2, 3, 5, 6; everything else says this.
            Self::Wd1772 => [2, 3, 6, 12],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Wd1770Config {
    pub variant: Wd1770Variant,
    /// The INTRQ pin isn't wired up, so it never goes high.
    pub no_intrq: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_rates() {
        assert_eq!(Wd1770Variant::Wd1770.step_rates_ms(), [6, 12, 20, 30]);
        assert_eq!(Wd1770Variant::Wd1772.step_rates_ms(), [2, 3, 6, 12]);
    }
}
