// Circular angle arithmetic
//
// Every wrap-around comparison in the crate goes through here so the
// boundary rules (PI maps to -PI, a quarter turn exactly is not inverted)
// are the same for offset correction, optimization and actuator adapters.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Wrap `value` into the half-open range `[min, max)`
pub fn wrap_into(value: f64, min: f64, max: f64) -> f64 {
    let span = max - min;
    let wrapped = (value - min).rem_euclid(span) + min;
    // rem_euclid can round up to exactly `span` for tiny negative inputs
    if wrapped >= max { min } else { wrapped }
}

/// Normalize an angle into `[-PI, PI)`
pub fn normalize(angle: f64) -> f64 {
    wrap_into(angle, -PI, PI)
}

/// Signed shortest rotation taking `from` onto `to`, in `[-PI, PI)`
pub fn shortest_difference(to: f64, from: f64) -> f64 {
    normalize(to - from)
}

/// Result of the continuous-rotation optimization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Optimized {
    pub speed: f64,
    pub angle: f64,
    pub inverted: bool,
}

/// Choose between `angle` and `angle + PI` (with the speed negated) so the
/// steering move from `current` is at most a quarter turn.
///
/// A difference of exactly PI/2 keeps the non-inverted path. The returned
/// angle is always normalized into `[-PI, PI)`.
pub fn optimize(speed: f64, angle: f64, current: f64) -> Optimized {
    let delta = shortest_difference(angle, current);
    if delta.abs() > FRAC_PI_2 {
        Optimized {
            speed: -speed,
            angle: normalize(angle + PI),
            inverted: true,
        }
    } else {
        Optimized {
            speed,
            angle: normalize(angle),
            inverted: false,
        }
    }
}

/// Convert a rotation count (1.0 == one turn) to radians
pub fn rotations_to_radians(rotations: f64) -> f64 {
    rotations * TAU
}

#[cfg(test)]
pub(crate) fn assert_angle_eq(actual: f64, expected: f64) {
    let err = shortest_difference(actual, expected).abs();
    assert!(
        err < 1e-9,
        "angle {} differs from expected {} by {}",
        actual,
        expected,
        err
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_4;

    #[test]
    fn test_normalize_range() {
        assert_eq!(normalize(0.0), 0.0);
        assert_eq!(normalize(PI), -PI);
        assert_eq!(normalize(-PI), -PI);
        assert_angle_eq(normalize(3.0 * PI), PI);
        assert!((normalize(TAU + 0.5) - 0.5).abs() < 1e-12);
        assert!((normalize(-TAU - 0.5) + 0.5).abs() < 1e-12);

        for i in -50..50 {
            let a = normalize(i as f64 * 0.37);
            assert!((-PI..PI).contains(&a), "{} out of range", a);
        }
    }

    #[test]
    fn test_wrap_into_custom_range() {
        assert!((wrap_into(370.0, 0.0, 360.0) - 10.0).abs() < 1e-12);
        assert!((wrap_into(-10.0, 0.0, 360.0) - 350.0).abs() < 1e-12);
        assert_eq!(wrap_into(360.0, 0.0, 360.0), 0.0);
    }

    #[test]
    fn test_shortest_difference_crosses_boundary() {
        // 170° to -170° is a 20° move, not 340°
        let d = shortest_difference(-170f64.to_radians(), 170f64.to_radians());
        assert!((d - 20f64.to_radians()).abs() < 1e-9);
    }

    #[test]
    fn test_optimize_inverts_half_turn() {
        let out = optimize(1.5, PI, 0.0);
        assert!(out.inverted);
        assert_eq!(out.speed, -1.5);
        assert_angle_eq(out.angle, 0.0);
    }

    #[test]
    fn test_optimize_keeps_small_moves() {
        let out = optimize(2.0, FRAC_PI_4, 0.0);
        assert!(!out.inverted);
        assert_eq!(out.speed, 2.0);
        assert_angle_eq(out.angle, FRAC_PI_4);
    }

    #[test]
    fn test_optimize_quarter_turn_is_not_inverted() {
        let out = optimize(1.0, FRAC_PI_2, 0.0);
        assert!(!out.inverted);
        assert_eq!(out.speed, 1.0);

        let out = optimize(1.0, -FRAC_PI_2, 0.0);
        assert!(!out.inverted);
    }

    #[test]
    fn test_optimize_never_exceeds_quarter_turn() {
        for c in -12..12 {
            for d in -12..12 {
                let current = c as f64 * 0.29;
                let desired = d as f64 * 0.31;
                let out = optimize(1.0, desired, current);
                let travel = shortest_difference(out.angle, current).abs();
                assert!(travel <= FRAC_PI_2 + 1e-12);
                if out.inverted {
                    assert_eq!(out.speed, -1.0);
                    assert_angle_eq(out.angle, desired + PI);
                } else {
                    assert_eq!(out.speed, 1.0);
                    assert_angle_eq(out.angle, desired);
                }
            }
        }
    }
}
