//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Clamp a value between two bounds, given in any order.
pub fn clamp<T>(value: T, bound_a: T, bound_b: T) -> T 
where
    T: Float
{
    let (min, max) = if bound_a <= bound_b { (bound_a, bound_b) } else { (bound_b, bound_a) };

    value.max(min).min(max)
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
/// 
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()` if `lhs` is much smaller than `rhs.abs()` in
/// magnitude and `lhs < 0.0`.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

/// Wrap an angle into the half-open range `(-period/2, period/2]`.
pub fn wrap_half<T>(value: T, period: T) -> T
where
    T: Float
{
    let half = period / (T::one() + T::one());
    let w = half - rem_euclid(half - value, period);

    // rem_euclid can round up to `period`, which would give -half
    if w <= -half { w + period } else { w }
}

/// Wrap an angle in radians into `(-pi, pi]`.
pub fn wrap_pi<T>(value: T) -> T
where
    T: Float
{
    wrap_half(value, T::from(std::f64::consts::TAU).unwrap_or_else(T::nan))
}

/// Unwrap a periodic reading against a previous continuous value.
///
/// Of all the candidates `reading + k * period`, the one nearest to
/// `previous` is returned.
pub fn unwrap_nearest<T>(reading: T, previous: T, period: T) -> T
where
    T: Float
{
    previous + wrap_half(reading - previous, period)
}

/// Minimum jerk interpolation coefficient for a normalised time `tau`.
///
/// `tau` is clamped to `[0, 1]`; the returned value goes from 0 to 1 with
/// zero velocity and acceleration at both ends.
pub fn min_jerk<T>(tau: T) -> T
where
    T: Float
{
    let t = clamp(tau, T::zero(), T::one());
    let c = |v: f64| T::from(v).unwrap_or_else(T::nan);

    t.powi(3) * (c(10.0) - c(15.0) * t + c(6.0) * t.powi(2))
}

/// Arithmetic mean of a slice, or `None` if it is empty.
pub fn mean<T>(values: &[T]) -> Option<T>
where
    T: Float
{
    if values.is_empty() {
        return None;
    }

    let sum = values.iter().fold(T::zero(), |acc, v| acc + *v);
    T::from(values.len()).map(|n| sum / n)
}

#[cfg(test)]
mod test {
    use super::*;

    const PI: f64 = std::f64::consts::PI;
    const TAU: f64 = std::f64::consts::TAU;

    #[test]
    fn test_wrap_pi() {
        assert!((wrap_pi(0.5f64) - 0.5).abs() < 1e-12);
        assert!((wrap_pi(PI + 0.5) - (0.5 - PI)).abs() < 1e-12);
        assert!((wrap_pi(-PI - 0.5) - (PI - 0.5)).abs() < 1e-12);
        assert!((wrap_pi(PI) - PI).abs() < 1e-12);
        assert!((wrap_pi(-PI) - PI).abs() < 1e-12);
        assert!((wrap_pi(3.0 * TAU + 1.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unwrap_nearest() {
        // Reading just past the wrap point continues upwards
        assert!((unwrap_nearest(-170f64, 170.0, 360.0) - 190.0).abs() < 1e-9);

        // Several turns away from the previous value
        assert!((unwrap_nearest(10f64, 1090.0, 360.0) - 1090.0).abs() < 1e-9);
        assert!((unwrap_nearest(20f64, 1070.0, 360.0) - 1100.0).abs() < 1e-9);
        assert!((unwrap_nearest(-20f64, -700.0, 360.0) - -740.0).abs() < 1e-9);
    }

    #[test]
    fn test_min_jerk() {
        assert_eq!(min_jerk(0f64), 0.0);
        assert_eq!(min_jerk(1f64), 1.0);
        assert_eq!(min_jerk(2f64), 1.0);
        assert!((min_jerk(0.5f64) - 0.5).abs() < 1e-12);
        assert!(min_jerk(0.25f64) < 0.25);
    }

    #[test]
    fn test_mean_and_clamp() {
        assert_eq!(mean::<f64>(&[]), None);
        assert_eq!(mean(&[1f64, 2.0, 3.0]), Some(2.0));
        assert_eq!(clamp(5f64, 3.0, -3.0), 3.0);
        assert_eq!(clamp(-5f64, -3.0, 3.0), -3.0);
    }
}
