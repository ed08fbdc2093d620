// Homewatt - Household energy telemetry collector and process supervisor
//
// Copyright 2026 The Homewatt Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use std::ops::Sub;

/// Consumption derived from a cumulative counter relative to a baseline reading.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DailyDelta<T> {
    pub value: T,
    /// The counter went backwards (replaced meter, firmware reset). The value
    /// is clamped to zero when this is set.
    pub reset: bool,
}

/// Compute the consumption since `baseline` for a cumulative counter.
///
/// Without a baseline (first reading of the day) the delta is zero. A current
/// value lower than the baseline means the counter was reset: the delta is
/// clamped to zero and flagged instead of going negative.
pub fn daily_delta<T>(current: T, baseline: Option<T>) -> DailyDelta<T>
where
    T: Copy + Default + PartialOrd + Sub<Output = T>,
{
    match baseline {
        None => DailyDelta {
            value: T::default(),
            reset: false,
        },
        Some(base) if current < base => DailyDelta {
            value: T::default(),
            reset: true,
        },
        Some(base) => DailyDelta {
            value: current - base,
            reset: false,
        },
    }
}

#[cfg(test)]
mod test {
    use super::{daily_delta, DailyDelta};

    #[test]
    fn test_delta_no_baseline() {
        assert_eq!(DailyDelta { value: 0.0, reset: false }, daily_delta(42.0, None));
    }

    #[test]
    fn test_delta_from_baseline() {
        let delta = daily_delta(42.0, Some(40.0));
        assert!((delta.value - 2.0f64).abs() < 1e-9);
        assert!(!delta.reset);
    }

    #[test]
    fn test_delta_equal_to_baseline() {
        assert_eq!(DailyDelta { value: 0, reset: false }, daily_delta(1200i64, Some(1200)));
    }

    #[test]
    fn test_delta_counter_reset_clamped() {
        assert_eq!(DailyDelta { value: 0.0, reset: true }, daily_delta(3.5, Some(40.0)));
        assert_eq!(DailyDelta { value: 0, reset: true }, daily_delta(10i64, Some(11)));
    }

    #[test]
    fn test_delta_never_negative() {
        for (current, base) in [(0.0, 0.0), (1.0, 0.5), (0.5, 1.0), (100.25, 99.0), (7.0, 1e6)] {
            let delta = daily_delta(current, Some(base));
            assert!(delta.value >= 0.0, "negative delta for {} - {}", current, base);
            assert_eq!(current < base, delta.reset);
        }
    }
}
