//! Mathematical utilities and type definitions.
//!
//! This module provides fundamental types used throughout the workspace.

use nalgebra::{Isometry3, Matrix3, Point2, Point3, UnitQuaternion, Vector2, Vector3};

/// Scalar type used throughout the library (currently `f64`).
pub type Real = f64;

/// 2D vector with [`Real`] components.
pub type Vec2 = Vector2<Real>;
/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 2D point with [`Real`] coordinates.
pub type Pt2 = Point2<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// Unit quaternion rotation using [`Real`].
pub type Quat = UnitQuaternion<Real>;
/// 3D rigid transform (SE(3)) using [`Real`].
pub type Iso3 = Isometry3<Real>;

/// Interpolate between two rigid transforms.
///
/// Rotation uses spherical interpolation, translation is linear. `alpha = 0`
/// returns `a`, `alpha = 1` returns `b`.
pub fn interpolate_iso3(a: &Iso3, b: &Iso3, alpha: Real) -> Iso3 {
    let rotation = a
        .rotation
        .try_slerp(&b.rotation, alpha, 1.0e-12)
        .unwrap_or(a.rotation);
    let translation = a.translation.vector.lerp(&b.translation.vector, alpha);
    Iso3::from_parts(translation.into(), rotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Translation3;

    #[test]
    fn interpolate_endpoints_and_midpoint() {
        let a = Iso3::identity();
        let b = Iso3::from_parts(
            Translation3::new(2.0, 0.0, -4.0),
            Quat::from_scaled_axis(Vec3::new(0.0, 0.0, 0.6)),
        );

        let start = interpolate_iso3(&a, &b, 0.0);
        let end = interpolate_iso3(&a, &b, 1.0);
        let mid = interpolate_iso3(&a, &b, 0.5);

        assert!((start.translation.vector - a.translation.vector).norm() < 1e-12);
        assert!((end.translation.vector - b.translation.vector).norm() < 1e-12);
        assert!((mid.translation.vector - Vec3::new(1.0, 0.0, -2.0)).norm() < 1e-12);
        assert!((mid.rotation.angle() - 0.3).abs() < 1e-12);
    }
}
