//! Level classification of accumulated skill points

/// Highest level a skill can reach.
pub const MAX_LEVEL: i16 = 5;

/// Inclusive upper bound of points for levels 0 through 4.
/// Anything above the last bound is level 5.
pub const LEVEL_CEILINGS: [i64; 5] = [0, 10, 25, 50, 100];

/// Map a points total to a level in `0..=5`.
///
/// | points   | level |
/// |----------|-------|
/// | 0        | 0     |
/// | 1..=10   | 1     |
/// | 11..=25  | 2     |
/// | 26..=50  | 3     |
/// | 51..=100 | 4     |
/// | > 100    | 5     |
///
/// Totals are never negative in practice; a negative input classifies as 0.
pub fn level_for_points(total_points: i64) -> i16 {
    LEVEL_CEILINGS
        .iter()
        .position(|&ceiling| total_points <= ceiling)
        .map(|level| level as i16)
        .unwrap_or(MAX_LEVEL)
}

/// Points still needed to reach the next level, `None` once at the top.
pub fn points_to_next_level(total_points: i64) -> Option<i64> {
    let level = level_for_points(total_points);
    if level >= MAX_LEVEL {
        return None;
    }
    let ceiling = LEVEL_CEILINGS[level as usize];
    Some(ceiling + 1 - total_points.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_boundaries() {
        let cases = [
            (0, 0),
            (1, 1),
            (10, 1),
            (11, 2),
            (25, 2),
            (26, 3),
            (50, 3),
            (51, 4),
            (100, 4),
            (101, 5),
            (10_000, 5),
        ];
        for (points, level) in cases {
            assert_eq!(level_for_points(points), level, "points = {}", points);
        }
    }

    #[test]
    fn test_negative_points_are_level_zero() {
        assert_eq!(level_for_points(-3), 0);
    }

    #[test]
    fn test_points_to_next_level() {
        assert_eq!(points_to_next_level(0), Some(1));
        assert_eq!(points_to_next_level(5), Some(6));
        assert_eq!(points_to_next_level(10), Some(1));
        assert_eq!(points_to_next_level(11), Some(15));
        assert_eq!(points_to_next_level(100), Some(1));
        assert_eq!(points_to_next_level(101), None);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_level_is_monotonic(a in 0i64..1_000, b in 0i64..1_000) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(level_for_points(low) <= level_for_points(high));
        }

        #[test]
        fn prop_level_in_range(points in any::<i64>()) {
            let level = level_for_points(points);
            prop_assert!((0..=MAX_LEVEL).contains(&level));
        }

        #[test]
        fn prop_reaching_next_level_raises_level(points in 0i64..=100) {
            let needed = points_to_next_level(points);
            prop_assert!(needed.is_some());
            let needed = needed.unwrap_or_default();
            prop_assert!(needed > 0);
            prop_assert_eq!(level_for_points(points + needed), level_for_points(points) + 1);
            prop_assert_eq!(level_for_points(points + needed - 1), level_for_points(points));
        }
    }
}
