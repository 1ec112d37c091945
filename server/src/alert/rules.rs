//! Level policy (§4.4 "Level policy") — pure functions, no I/O.

use crate::constants::alerts::{CERT_CRITICAL_DAYS, CERT_WARNING_DAYS, LEVEL_INFO_MAX_DIFF, LEVEL_WARNING_MAX_DIFF};
use crate::database::AlertLevel;

/// Resource rules (cpu/memory/disk/network): `diff = value - threshold`.
pub fn resource_level(value: f64, threshold: f64) -> AlertLevel {
    let diff = value - threshold;
    if diff < LEVEL_INFO_MAX_DIFF {
        AlertLevel::Info
    } else if diff < LEVEL_WARNING_MAX_DIFF {
        AlertLevel::Warning
    } else {
        AlertLevel::Critical
    }
}

pub fn cert_level(days_left: i64) -> AlertLevel {
    if days_left <= CERT_CRITICAL_DAYS {
        AlertLevel::Critical
    } else if days_left <= CERT_WARNING_DAYS {
        AlertLevel::Warning
    } else {
        AlertLevel::Info
    }
}

/// Service-down / agent-offline rules are always critical.
pub fn always_critical() -> AlertLevel {
    AlertLevel::Critical
}

/// Traffic level derives from which usage bucket fired.
pub fn traffic_level(bucket: u8) -> AlertLevel {
    match bucket {
        100 => AlertLevel::Critical,
        90 => AlertLevel::Warning,
        _ => AlertLevel::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_level_boundaries() {
        assert!(matches!(resource_level(85.0, 80.0), AlertLevel::Info)); // diff=5
        assert!(matches!(resource_level(105.0, 80.0), AlertLevel::Warning)); // diff=25
        assert!(matches!(resource_level(135.0, 80.0), AlertLevel::Critical)); // diff=55
    }

    #[test]
    fn cert_level_boundaries() {
        assert!(matches!(cert_level(7), AlertLevel::Critical));
        assert!(matches!(cert_level(8), AlertLevel::Warning));
        assert!(matches!(cert_level(30), AlertLevel::Warning));
        assert!(matches!(cert_level(31), AlertLevel::Info));
    }
}
