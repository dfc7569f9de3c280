//! Minimal projection helpers shared by factors.

use nalgebra::{RealField, Vector2, Vector3};

/// Default epsilon added to depth for numerical stability.
pub const PROJECTION_EPS: f64 = 1.0e-9;

/// Apply Brown-Conrady distortion `[k1, k2, k3, p1, p2]` to normalized coordinates.
pub fn distort_brown_conrady<T: RealField>(n: Vector2<T>, dist: [f64; 5]) -> Vector2<T> {
    let k1 = T::from_f64(dist[0]).unwrap();
    let k2 = T::from_f64(dist[1]).unwrap();
    let k3 = T::from_f64(dist[2]).unwrap();
    let p1 = T::from_f64(dist[3]).unwrap();
    let p2 = T::from_f64(dist[4]).unwrap();
    let two = T::from_f64(2.0).unwrap();

    let x = n.x.clone();
    let y = n.y.clone();
    let r2 = x.clone() * x.clone() + y.clone() * y.clone();
    let r4 = r2.clone() * r2.clone();
    let r6 = r4.clone() * r2.clone();
    let radial = T::one() + k1 * r2.clone() + k2 * r4 + k3 * r6;

    let xy = x.clone() * y.clone();
    let x_tan = two.clone() * p1.clone() * xy.clone()
        + p2.clone() * (r2.clone() + two.clone() * x.clone() * x.clone());
    let y_tan = p1 * (r2 + two.clone() * y.clone() * y.clone()) + two * p2 * xy;

    Vector2::new(x * radial.clone() + x_tan, y * radial + y_tan)
}

/// Project a 3D point in camera coordinates with pinhole intrinsics
/// `[fx, fy, cx, cy]` and Brown-Conrady distortion.
pub fn project_pinhole_dist<T: RealField>(
    intrinsics: [f64; 4],
    dist: [f64; 5],
    pc: Vector3<T>,
) -> Vector2<T> {
    let eps = T::from_f64(PROJECTION_EPS).unwrap();
    let z = pc.z.clone() + eps;
    let n = Vector2::new(pc.x.clone() / z.clone(), pc.y.clone() / z);
    let d = distort_brown_conrady(n, dist);
    let fx = T::from_f64(intrinsics[0]).unwrap();
    let fy = T::from_f64(intrinsics[1]).unwrap();
    let cx = T::from_f64(intrinsics[2]).unwrap();
    let cy = T::from_f64(intrinsics[3]).unwrap();
    Vector2::new(fx * d.x.clone() + cx, fy * d.y.clone() + cy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imucam_core::{BrownConrady5, CameraIntrinsics, Pt3};

    #[test]
    fn matches_core_camera_model() {
        let camera = CameraIntrinsics {
            distortion: BrownConrady5 {
                k1: -0.2,
                k2: 0.05,
                k3: 0.0,
                p1: 1e-3,
                p2: -5e-4,
            },
            ..CameraIntrinsics::pinhole(600.0, 610.0, 320.0, 240.0, 640, 480)
        };
        let p = Pt3::new(0.2, -0.1, 1.5);
        let expected = camera.project(&p).unwrap();
        let ours = project_pinhole_dist(camera.k_array(), camera.distortion.to_array(), p.coords);
        assert!((ours - expected).norm() < 1e-6);
    }
}
