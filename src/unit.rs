//! Utilities for working with raw byte units.

use core::fmt;

/// `1 KiB`
pub const KIB: usize = 1 << 10;
/// `1 MiB`
pub const MIB: usize = 1 << 20;
/// `1 GiB`
pub const GIB: usize = 1 << 30;

/// Wrapper around a number of bytes that pretty-prints
/// them using the [`Display`](core::fmt::Display)
/// implementation.
#[derive(Debug, Clone, Copy)]
pub struct ByteUnit(pub usize);

/// Create a [`ByteUnit`] for the given number of pages.
pub fn pages(count: usize) -> ByteUnit {
    ByteUnit(count.saturating_mul(crate::PAGE_SIZE))
}

impl fmt::Display for ByteUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.0 as f64;

        if self.0 < KIB {
            write!(f, "{} B", self.0)
        } else if self.0 < MIB {
            write!(f, "{:.2} KiB", count / KIB as f64)
        } else if self.0 < GIB {
            write!(f, "{:.2} MiB", count / MIB as f64)
        } else {
            write!(f, "{:.2} GiB", count / GIB as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_picks_largest_unit() {
        assert_eq!(ByteUnit(12).to_string(), "12 B");
        assert_eq!(ByteUnit(4 * KIB).to_string(), "4.00 KiB");
        assert_eq!(ByteUnit(256 * MIB).to_string(), "256.00 MiB");
        assert_eq!(pages(1 << 16).to_string(), "256.00 MiB");
    }
}
