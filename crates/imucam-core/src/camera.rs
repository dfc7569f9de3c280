use crate::{Pt3, Real, Vec2};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Brown-Conrady distortion with radial `k1, k2, k3` and tangential `p1, p2`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady5 {
    pub k1: Real,
    pub k2: Real,
    pub k3: Real,
    pub p1: Real,
    pub p2: Real,
}

impl BrownConrady5 {
    /// Apply distortion to normalized coordinates.
    pub fn distort(&self, n: &Vec2) -> Vec2 {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;

        Vector2::new(x * radial + x_tan, y * radial + y_tan)
    }

    /// Coefficients packed as `[k1, k2, k3, p1, p2]`.
    pub fn to_array(&self) -> [Real; 5] {
        [self.k1, self.k2, self.k3, self.p1, self.p2]
    }

    pub fn is_zero(&self) -> bool {
        self.to_array().iter().all(|c| *c == 0.0)
    }
}

/// Fixed camera intrinsics used for reprojection.
///
/// The calibrator treats intrinsics as known: they come from a previous
/// intrinsics calibration and stay constant during the spline solve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: Real,
    pub fy: Real,
    pub cx: Real,
    pub cy: Real,
    #[serde(default)]
    pub distortion: BrownConrady5,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels (rolling shutter row count).
    pub height: u32,
}

impl CameraIntrinsics {
    /// Pinhole intrinsics without distortion.
    pub fn pinhole(fx: Real, fy: Real, cx: Real, cy: Real, width: u32, height: u32) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            distortion: BrownConrady5::default(),
            width,
            height,
        }
    }

    /// Intrinsics packed as `[fx, fy, cx, cy]`.
    pub fn k_array(&self) -> [Real; 4] {
        [self.fx, self.fy, self.cx, self.cy]
    }

    /// Project a point given in camera coordinates to pixels.
    ///
    /// Returns `None` for points on or behind the image plane.
    pub fn project(&self, p_cam: &Pt3) -> Option<Vec2> {
        if p_cam.z <= 0.0 {
            return None;
        }
        let n = Vector2::new(p_cam.x / p_cam.z, p_cam.y / p_cam.z);
        let d = self.distortion.distort(&n);
        Some(Vector2::new(self.fx * d.x + self.cx, self.fy * d.y + self.cy))
    }

    /// Check whether a pixel lies inside the image bounds.
    pub fn contains(&self, uv: &Vec2) -> bool {
        uv.x >= 0.0 && uv.y >= 0.0 && uv.x < self.width as Real && uv.y < self.height as Real
    }
}
