//! Compilation of the problem IR into tiny-solver and its LM solve.

mod tiny_solver_backend;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use tiny_solver_backend::solve;

/// Stopping criteria for one trajectory solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSolveOptions {
    pub max_iters: usize,
    /// tiny-solver verbosity level.
    pub verbosity: usize,
    /// Stop once an iteration lowers the cost by less than this.
    pub min_abs_decrease: f64,
    pub min_rel_decrease: f64,
    /// Stop once the cost drops below this.
    pub min_error: f64,
}

impl Default for BackendSolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            verbosity: 0,
            min_abs_decrease: 1e-5,
            min_rel_decrease: 1e-5,
            min_error: 1e-10,
        }
    }
}

/// Refined parameter blocks keyed by IR name, with the cost on both ends.
#[derive(Debug, Clone)]
pub struct BackendSolution {
    pub params: HashMap<String, DVector<f64>>,
    /// `0.5 * |r|^2` at the initial values, robust loss applied.
    pub initial_cost: f64,
    pub final_cost: f64,
}
