//! Speed to path-cost tables.
//!
//! Two tables exist: the 32-bit 802.1t table used in extend mode, derived
//! from `20_000_000_000 / speed_in_kbps`, and the 16-bit 802.1D-1998 table
//! kept for backward compatibility.

/// Minimum configurable path cost (both modes).
pub const MIN_PATH_COST: u32 = 1;

/// Maximum configurable path cost in extend mode.
pub const MAX_PATH_COST: u32 = 200_000_000;

/// Maximum configurable path cost in legacy mode.
pub const LEGACY_MAX_PATH_COST: u32 = 65_535;

/// Fallback when the port speed is unknown (10 Mb entry).
pub const DEFAULT_SPEED_MBPS: u32 = 10;

/// Returns the configurable bounds for the given mode.
pub const fn bounds(extend: bool) -> (u32, u32) {
    if extend {
        (MIN_PATH_COST, MAX_PATH_COST)
    } else {
        (MIN_PATH_COST, LEGACY_MAX_PATH_COST)
    }
}

/// Path cost for a link speed in Mb/s.
///
/// Speeds between table entries use the next lower entry, matching how the
/// origin maps auto-negotiated speeds.
pub const fn for_speed(speed_mbps: u32, extend: bool) -> u32 {
    if extend {
        match speed_mbps {
            0..=10 => 2_000_000,
            11..=100 => 200_000,
            101..=1_000 => 20_000,
            1_001..=10_000 => 2_000,
            10_001..=25_000 => 800,
            25_001..=40_000 => 500,
            40_001..=100_000 => 200,
            _ => 50,
        }
    } else {
        match speed_mbps {
            0..=10 => 100,
            11..=100 => 19,
            101..=1_000 => 4,
            1_001..=10_000 => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extend_table() {
        assert_eq!(for_speed(10, true), 2_000_000);
        assert_eq!(for_speed(100, true), 200_000);
        assert_eq!(for_speed(1_000, true), 20_000);
        assert_eq!(for_speed(10_000, true), 2_000);
        assert_eq!(for_speed(25_000, true), 800);
        assert_eq!(for_speed(40_000, true), 500);
        assert_eq!(for_speed(100_000, true), 200);
        assert_eq!(for_speed(400_000, true), 50);
    }

    #[test]
    fn test_legacy_table() {
        assert_eq!(for_speed(10, false), 100);
        assert_eq!(for_speed(100, false), 19);
        assert_eq!(for_speed(1_000, false), 4);
        assert_eq!(for_speed(10_000, false), 2);
        assert_eq!(for_speed(25_000, false), 1);
        assert_eq!(for_speed(400_000, false), 1);
    }

    #[test]
    fn test_bounds() {
        assert_eq!(bounds(true), (1, 200_000_000));
        assert_eq!(bounds(false), (1, 65_535));
    }
}
