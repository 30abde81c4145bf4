//! Optimization hints: presets for `max_workers` / `target_points_per_partition`
//! plus the real-time short-circuit.

use std::time::Duration;

/// A named dispatch preset, tuning how aggressively a range gets split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionHints {
    pub max_workers: usize,
    pub target_points_per_partition: u64,
    pub preserve_order: bool,
    /// Ranges with total duration at or under this threshold are not split at all.
    /// Only `for_real_time()` sets this; other presets leave it at zero (disabled).
    pub real_time_short_circuit: Option<Duration>,
}

impl PartitionHints {
    /// Small fixed windows, few workers, and a short-circuit for ranges of an hour
    /// or less: queries of total duration <= 1 hour are not split.
    pub fn for_real_time() -> Self {
        Self {
            max_workers: 2,
            target_points_per_partition: 10_000,
            preserve_order: true,
            real_time_short_circuit: Some(Duration::from_secs(3_600)),
        }
    }

    /// Many workers, large target batch, no short-circuit.
    pub fn for_analytics() -> Self {
        Self {
            max_workers: 16,
            target_points_per_partition: 1_000_000,
            preserve_order: false,
            real_time_short_circuit: None,
        }
    }

    /// Balanced default.
    pub fn historical() -> Self {
        Self {
            max_workers: 8,
            target_points_per_partition: 250_000,
            preserve_order: false,
            real_time_short_circuit: None,
        }
    }
}

impl Default for PartitionHints {
    fn default() -> Self {
        Self::historical()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_time_hint_carries_the_one_hour_short_circuit() {
        assert_eq!(PartitionHints::for_real_time().real_time_short_circuit, Some(Duration::from_secs(3_600)));
        assert!(PartitionHints::for_analytics().real_time_short_circuit.is_none());
        assert!(PartitionHints::historical().real_time_short_circuit.is_none());
    }
}
