//! Linear algebra aliases for the inertial side of the pipeline.
//!
//! The speed filter itself is scalar; vectors only appear on the way in,
//! where raw device-frame acceleration and angular rate are reduced to
//! magnitudes or projected onto a forward axis.

use nalgebra::{Unit, Vector3};

/// Device-frame 3-vector (acceleration in g, angular rate in rad/s).
pub type Vec3 = Vector3<f64>;

/// Unit direction in the device frame.
pub type Axis3 = Unit<Vector3<f64>>;

/// Standard gravity (m/s² per g).
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Normalize a raw `[x, y, z]` direction. Returns `None` for zero-length or
/// non-finite input.
pub fn axis_from_components(components: [f64; 3]) -> Option<Axis3> {
    let v = Vec3::from(components);
    if !v.iter().all(|c| c.is_finite()) {
        return None;
    }
    Unit::try_new(v, 1e-9)
}

/// True if every component is finite.
pub fn is_finite_vec(v: &Vec3) -> bool {
    v.iter().all(|c| c.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_axis_normalized() {
        let axis = axis_from_components([0.0, 3.0, 4.0]).unwrap();
        assert_abs_diff_eq!(axis.norm(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(axis.y, 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_axis_rejects_degenerate() {
        assert!(axis_from_components([0.0, 0.0, 0.0]).is_none());
        assert!(axis_from_components([f64::NAN, 1.0, 0.0]).is_none());
    }
}
