use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Identifier for a parameter block in the IR.
///
/// This is stable within a `ProblemIR` instance and is used by residual blocks
/// to reference their parameter dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(pub usize);

/// Supported manifold types for parameter blocks.
///
/// Each variant implies an expected ambient parameter dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifoldKind {
    /// Standard Euclidean vector space.
    Euclidean,
    /// SE(3) pose stored as `[qx, qy, qz, qw, tx, ty, tz]`.
    SE3,
    /// SO(3) rotation stored as quaternion `[qx, qy, qz, qw]`.
    SO3,
}

impl ManifoldKind {
    /// Returns `true` if the given ambient dimension matches the manifold storage.
    pub fn compatible_dim(self, dim: usize) -> bool {
        match self {
            ManifoldKind::Euclidean => true,
            ManifoldKind::SE3 => dim == 7,
            ManifoldKind::SO3 => dim == 4,
        }
    }
}

/// Bounds for a single parameter index.
///
/// Bounds are applied after each update in backends that support them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound {
    pub idx: usize,
    pub lower: f64,
    pub upper: f64,
}

/// Fixed parameter mask for a block.
///
/// Backends interpret this as per-index fixing for Euclidean blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedMask {
    fixed_indices: HashSet<usize>,
}

impl FixedMask {
    /// Creates a mask with no fixed indices.
    pub fn all_free() -> Self {
        Self {
            fixed_indices: HashSet::new(),
        }
    }

    /// Creates a mask with all indices fixed.
    pub fn all_fixed(dim: usize) -> Self {
        Self {
            fixed_indices: (0..dim).collect(),
        }
    }

    /// Returns `true` if the index is fixed.
    pub fn is_fixed(&self, idx: usize) -> bool {
        self.fixed_indices.contains(&idx)
    }

    /// Returns `true` if all indices `[0, dim)` are fixed.
    pub fn is_all_fixed(&self, dim: usize) -> bool {
        self.fixed_indices.len() == dim
    }

    /// Iterates over fixed indices.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.fixed_indices.iter().copied()
    }

    /// Returns `true` if no indices are fixed.
    pub fn is_empty(&self) -> bool {
        self.fixed_indices.is_empty()
    }
}

/// Robust loss applied to a residual block.
///
/// Each residual block has its own loss; per-corner robustification is
/// achieved by using one residual block per observation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RobustLoss {
    #[default]
    None,
    Huber {
        scale: f64,
    },
    Cauchy {
        scale: f64,
    },
    Arctan {
        scale: f64,
    },
}

/// Position of a sample inside one uniform spline segment.
///
/// `u` is the normalised segment time and `inv_dt` the inverse knot spacing,
/// needed to turn `d/du` into time derivatives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentSample {
    pub u: f64,
    pub inv_dt: f64,
}

/// Backend-agnostic factor kinds.
///
/// Each factor kind implies its parameter layout and residual dimension.
#[derive(Debug, Clone, PartialEq)]
pub enum FactorKind {
    /// Rolling-shutter reprojection of a known target point.
    ///
    /// Parameters: `[so3 x4, r3 x4, imu_se3_camera, line_delay]`.
    /// The pose is evaluated at `t + row * line_delay`; `so3.u` and `r3.u`
    /// hold the segment offset of the unadjusted capture time `t`.
    /// Intrinsics and distortion are known constants.
    SplineReprojRs {
        pw: [f64; 3],
        uv: [f64; 2],
        row: f64,
        so3: SegmentSample,
        r3: SegmentSample,
        intrinsics: [f64; 4],
        distortion: [f64; 5],
        w: f64,
    },
    /// Gyroscope residual against the rotation spline's body rate.
    ///
    /// Parameters: `[so3 x4]` or `[so3 x4, gyro_bias]` when `with_bias`.
    SplineGyro {
        meas: [f64; 3],
        so3: SegmentSample,
        w: f64,
        with_bias: bool,
    },
    /// Accelerometer residual against the predicted specific force.
    ///
    /// Parameters: `[so3 x4, r3 x4, gravity]` or
    /// `[so3 x4, r3 x4, gravity, accel_bias]` when `with_bias`.
    SplineAccel {
        meas: [f64; 3],
        so3: SegmentSample,
        r3: SegmentSample,
        w: f64,
        with_bias: bool,
    },
}

impl FactorKind {
    /// Residual dimension implied by the factor.
    pub fn residual_dim(&self) -> usize {
        match self {
            FactorKind::SplineReprojRs { .. } => 2,
            FactorKind::SplineGyro { .. } => 3,
            FactorKind::SplineAccel { .. } => 3,
        }
    }

    /// Number of parameter blocks implied by the factor.
    pub fn num_params(&self) -> usize {
        match self {
            FactorKind::SplineReprojRs { .. } => 10,
            FactorKind::SplineGyro { with_bias, .. } => 4 + usize::from(*with_bias),
            FactorKind::SplineAccel { with_bias, .. } => 9 + usize::from(*with_bias),
        }
    }
}

/// Parameter block definition in the IR.
///
/// This describes the storage layout and constraints for a single variable.
#[derive(Debug, Clone)]
pub struct ParamBlock {
    pub id: ParamId,
    pub name: String,
    pub dim: usize,
    pub manifold: ManifoldKind,
    pub fixed: FixedMask,
    pub bounds: Option<Vec<Bound>>,
}

/// Residual block definition in the IR.
///
/// The order of `params` must match the factor's expected parameter order.
#[derive(Debug, Clone)]
pub struct ResidualBlock {
    pub params: Vec<ParamId>,
    pub loss: RobustLoss,
    pub factor: FactorKind,
    pub residual_dim: usize,
}

/// Backend-agnostic optimization problem representation.
///
/// Backends compile this IR into solver-specific problems.
#[derive(Debug, Default, Clone)]
pub struct ProblemIR {
    pub params: Vec<ParamBlock>,
    pub residuals: Vec<ResidualBlock>,
}

impl ProblemIR {
    /// Creates an empty IR.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter block and returns its `ParamId`.
    pub fn add_param_block(
        &mut self,
        name: impl Into<String>,
        dim: usize,
        manifold: ManifoldKind,
        fixed: FixedMask,
        bounds: Option<Vec<Bound>>,
    ) -> ParamId {
        let id = ParamId(self.params.len());
        self.params.push(ParamBlock {
            id,
            name: name.into(),
            dim,
            manifold,
            fixed,
            bounds,
        });
        id
    }

    /// Adds a residual block to the IR.
    pub fn add_residual_block(&mut self, residual: ResidualBlock) {
        self.residuals.push(residual);
    }

    /// Finds a parameter by name.
    pub fn param_by_name(&self, name: &str) -> Option<ParamId> {
        self.params.iter().find(|p| p.name == name).map(|p| p.id)
    }

    /// Counts residual blocks whose factor matches `pred`.
    pub fn count_residuals(&self, pred: impl Fn(&FactorKind) -> bool) -> usize {
        self.residuals.iter().filter(|r| pred(&r.factor)).count()
    }

    /// Validates internal consistency and factor expectations.
    pub fn validate(&self) -> Result<()> {
        for (idx, param) in self.params.iter().enumerate() {
            ensure!(
                param.id.0 == idx,
                "param id mismatch: expected {}, got {:?}",
                idx,
                param.id
            );
            ensure!(
                param.manifold.compatible_dim(param.dim),
                "param {} manifold {:?} incompatible with dim {}",
                param.name,
                param.manifold,
                param.dim
            );
            for fixed_idx in param.fixed.iter() {
                ensure!(
                    fixed_idx < param.dim,
                    "param {} fixed index {} out of range",
                    param.name,
                    fixed_idx
                );
            }
            if let Some(bounds) = &param.bounds {
                for bound in bounds {
                    ensure!(
                        bound.idx < param.dim,
                        "param {} bound index {} out of range",
                        param.name,
                        bound.idx
                    );
                    ensure!(
                        bound.lower <= bound.upper,
                        "param {} bound lower {} > upper {}",
                        param.name,
                        bound.lower,
                        bound.upper
                    );
                }
            }
        }

        for (r_idx, residual) in self.residuals.iter().enumerate() {
            ensure!(
                residual.residual_dim == residual.factor.residual_dim(),
                "residual {} dim {} does not match factor expectation {}",
                r_idx,
                residual.residual_dim,
                residual.factor.residual_dim()
            );
            ensure!(
                residual.params.len() == residual.factor.num_params(),
                "residual {} has {} params, factor expects {}",
                r_idx,
                residual.params.len(),
                residual.factor.num_params()
            );
            for param in &residual.params {
                ensure!(
                    param.0 < self.params.len(),
                    "residual {} references missing param {:?}",
                    r_idx,
                    param
                );
            }

            match &residual.factor {
                FactorKind::SplineReprojRs { .. } => {
                    self.expect_knots(r_idx, &residual.params[0..4], 4, ManifoldKind::SO3)?;
                    self.expect_knots(r_idx, &residual.params[4..8], 3, ManifoldKind::Euclidean)?;
                    self.expect_block(r_idx, residual.params[8], 7, ManifoldKind::SE3, "extrinsics")?;
                    self.expect_block(
                        r_idx,
                        residual.params[9],
                        1,
                        ManifoldKind::Euclidean,
                        "line delay",
                    )?;
                }
                FactorKind::SplineGyro { with_bias, .. } => {
                    self.expect_knots(r_idx, &residual.params[0..4], 4, ManifoldKind::SO3)?;
                    if *with_bias {
                        self.expect_block(
                            r_idx,
                            residual.params[4],
                            3,
                            ManifoldKind::Euclidean,
                            "gyro bias",
                        )?;
                    }
                }
                FactorKind::SplineAccel { with_bias, .. } => {
                    self.expect_knots(r_idx, &residual.params[0..4], 4, ManifoldKind::SO3)?;
                    self.expect_knots(r_idx, &residual.params[4..8], 3, ManifoldKind::Euclidean)?;
                    self.expect_block(r_idx, residual.params[8], 3, ManifoldKind::Euclidean, "gravity")?;
                    if *with_bias {
                        self.expect_block(
                            r_idx,
                            residual.params[9],
                            3,
                            ManifoldKind::Euclidean,
                            "accel bias",
                        )?;
                    }
                }
            }
        }

        Ok(())
    }

    fn expect_knots(
        &self,
        r_idx: usize,
        ids: &[ParamId],
        dim: usize,
        manifold: ManifoldKind,
    ) -> Result<()> {
        for id in ids {
            self.expect_block(r_idx, *id, dim, manifold, "spline knot")?;
        }
        Ok(())
    }

    fn expect_block(
        &self,
        r_idx: usize,
        id: ParamId,
        dim: usize,
        manifold: ManifoldKind,
        what: &str,
    ) -> Result<()> {
        let block = &self.params[id.0];
        ensure!(
            block.dim == dim && block.manifold == manifold,
            "residual {} expects {}D {:?} {} for {}, got dim={} manifold={:?}",
            r_idx,
            dim,
            manifold,
            what,
            block.name,
            block.dim,
            block.manifold
        );
        Ok(())
    }
}
