use crate::backend::{BackendSolution, BackendSolveOptions};
use crate::factors::inertial::{accel_residual_generic, gyro_residual_generic};
use crate::factors::spline_reprojection::{rs_reproj_residual_generic, RsCornerData};
use crate::ir::{FactorKind, ManifoldKind, ProblemIR, ResidualBlock, RobustLoss, SegmentSample};
use anyhow::{anyhow, ensure, Result};
use log::debug;
use nalgebra::DVector;
use std::collections::HashMap;
use std::sync::Arc;
use tiny_solver::factors::Factor;
use tiny_solver::loss_functions::{ArctanLoss, CauchyLoss, HuberLoss, Loss};
use tiny_solver::manifold::se3::SE3Manifold;
use tiny_solver::manifold::so3::QuaternionManifold;
use tiny_solver::optimizer::{Optimizer, OptimizerOptions};
use tiny_solver::problem::Problem;
use tiny_solver::LevenbergMarquardtOptimizer;

/// Compile `ir` and run Levenberg-Marquardt from `initial`.
///
/// `initial` may hold more entries than the IR references; only the IR's
/// parameter blocks are handed to the solver.
pub fn solve(
    ir: &ProblemIR,
    initial: &HashMap<String, DVector<f64>>,
    opts: &BackendSolveOptions,
) -> Result<BackendSolution> {
    let (problem, initial_map) = compile(ir, initial)?;
    let initial_cost = evaluate_cost(&problem, &initial_map);

    let optimizer = LevenbergMarquardtOptimizer::default();
    let solution = optimizer
        .optimize(&problem, &initial_map, Some(to_optimizer_options(opts)))
        .ok_or_else(|| anyhow!("tiny-solver failed to converge"))?;
    let final_cost = evaluate_cost(&problem, &solution);

    Ok(BackendSolution {
        params: solution,
        initial_cost,
        final_cost,
    })
}

fn compile(
    ir: &ProblemIR,
    initial: &HashMap<String, DVector<f64>>,
) -> Result<(Problem, HashMap<String, DVector<f64>>)> {
    ir.validate()?;

    let mut problem = Problem::new();
    let mut initial_map = HashMap::with_capacity(ir.params.len());

    for param in &ir.params {
        let init = initial.get(&param.name).ok_or_else(|| {
            anyhow!(
                "initial values missing parameter {} (id {:?})",
                param.name,
                param.id
            )
        })?;
        ensure!(
            init.len() == param.dim,
            "initial dimension mismatch for {}: expected {}, got {}",
            param.name,
            param.dim,
            init.len()
        );
        initial_map.insert(param.name.clone(), init.clone());

        match param.manifold {
            ManifoldKind::Euclidean => {}
            ManifoldKind::SE3 | ManifoldKind::SO3 => {
                if !param.fixed.is_empty() && !param.fixed.is_all_fixed(param.dim) {
                    return Err(anyhow!(
                        "tiny-solver cannot partially fix {:?} manifold {}",
                        param.manifold,
                        param.name
                    ));
                }
                if param.fixed.is_empty() {
                    if param.manifold == ManifoldKind::SE3 {
                        problem.set_variable_manifold(&param.name, Arc::new(SE3Manifold));
                    } else {
                        problem
                            .set_variable_manifold(&param.name, Arc::new(QuaternionManifold));
                    }
                }
            }
        }

        for idx in param.fixed.iter() {
            problem.fix_variable(&param.name, idx);
        }

        if let Some(bounds) = &param.bounds {
            for bound in bounds {
                problem.set_variable_bounds(&param.name, bound.idx, bound.lower, bound.upper);
            }
        }
    }

    for residual in &ir.residuals {
        let (factor, loss) = compile_factor(residual)?;
        let param_names: Vec<&str> = residual
            .params
            .iter()
            .map(|id| ir.params[id.0].name.as_str())
            .collect();
        problem.add_residual_block(residual.residual_dim, &param_names, factor, loss);
    }

    debug!(
        "compiled tiny-solver problem: {} parameter blocks, {} residual blocks",
        ir.params.len(),
        ir.residuals.len()
    );
    Ok((problem, initial_map))
}

fn evaluate_cost(problem: &Problem, values: &HashMap<String, DVector<f64>>) -> f64 {
    let param_blocks = problem.initialize_parameter_blocks(values);
    let residuals = problem.compute_residuals(&param_blocks, true);
    0.5 * residuals.as_ref().squared_norm_l2()
}

fn to_optimizer_options(opts: &BackendSolveOptions) -> OptimizerOptions {
    OptimizerOptions {
        max_iteration: opts.max_iters,
        verbosity_level: opts.verbosity,
        min_abs_error_decrease_threshold: opts.min_abs_decrease,
        min_rel_error_decrease_threshold: opts.min_rel_decrease,
        min_error_threshold: opts.min_error,
        ..OptimizerOptions::default()
    }
}

fn compile_loss(loss: RobustLoss) -> Result<Option<Box<dyn Loss + Send>>> {
    match loss {
        RobustLoss::None => Ok(None),
        RobustLoss::Huber { scale } => {
            ensure!(scale > 0.0, "Huber scale must be positive");
            Ok(Some(Box::new(HuberLoss::new(scale))))
        }
        RobustLoss::Cauchy { scale } => {
            ensure!(scale > 0.0, "Cauchy scale must be positive");
            Ok(Some(Box::new(CauchyLoss::new(scale))))
        }
        RobustLoss::Arctan { scale } => {
            ensure!(scale > 0.0, "Arctan scale must be positive");
            Ok(Some(Box::new(ArctanLoss::new(scale))))
        }
    }
}

type CompiledFactor = (
    Box<dyn tiny_solver::factors::FactorImpl + Send>,
    Option<Box<dyn Loss + Send>>,
);

fn compile_factor(residual: &ResidualBlock) -> Result<CompiledFactor> {
    let loss = compile_loss(residual.loss)?;
    match &residual.factor {
        FactorKind::SplineReprojRs {
            pw,
            uv,
            row,
            so3,
            r3,
            intrinsics,
            distortion,
            w,
        } => {
            let factor = TinySplineReprojFactor {
                obs: RsCornerData {
                    pw: *pw,
                    uv: *uv,
                    row: *row,
                    so3: *so3,
                    r3: *r3,
                    intrinsics: *intrinsics,
                    distortion: *distortion,
                    w: *w,
                },
            };
            Ok((Box::new(factor), loss))
        }
        FactorKind::SplineGyro {
            meas,
            so3,
            w,
            with_bias,
        } => {
            let factor = TinySplineGyroFactor {
                meas: *meas,
                so3: *so3,
                w: *w,
                with_bias: *with_bias,
            };
            Ok((Box::new(factor), loss))
        }
        FactorKind::SplineAccel {
            meas,
            so3,
            r3,
            w,
            with_bias,
        } => {
            let factor = TinySplineAccelFactor {
                meas: *meas,
                so3: *so3,
                r3: *r3,
                w: *w,
                with_bias: *with_bias,
            };
            Ok((Box::new(factor), loss))
        }
    }
}

#[derive(Debug, Clone)]
struct TinySplineReprojFactor {
    obs: RsCornerData,
}

impl<T: nalgebra::RealField> Factor<T> for TinySplineReprojFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        debug_assert_eq!(
            params.len(),
            10,
            "expected [so3 x4, r3 x4, extr, line_delay] parameter blocks"
        );
        let r = rs_reproj_residual_generic(params, &self.obs);
        DVector::from_row_slice(r.as_slice())
    }
}

#[derive(Debug, Clone)]
struct TinySplineGyroFactor {
    meas: [f64; 3],
    so3: SegmentSample,
    w: f64,
    with_bias: bool,
}

impl<T: nalgebra::RealField> Factor<T> for TinySplineGyroFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        let r = gyro_residual_generic(params, self.meas, self.so3, self.w, self.with_bias);
        DVector::from_row_slice(r.as_slice())
    }
}

#[derive(Debug, Clone)]
struct TinySplineAccelFactor {
    meas: [f64; 3],
    so3: SegmentSample,
    r3: SegmentSample,
    w: f64,
    with_bias: bool,
}

impl<T: nalgebra::RealField> Factor<T> for TinySplineAccelFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        let r = accel_residual_generic(
            params,
            self.meas,
            self.so3,
            self.r3,
            self.w,
            self.with_bias,
        );
        DVector::from_row_slice(r.as_slice())
    }
}
