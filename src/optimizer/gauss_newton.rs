//! Gauss-Newton optimization algorithm implementation
//!
//! The Gauss-Newton algorithm is an iterative method for solving non-linear least squares problems.
//! It approximates the Hessian using only first-order derivatives and takes the full
//! step `J^T J dx = -J^T r` every iteration.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::core::{Problem, Values};
use crate::linalg::{compute_gradient, create_linear_solver};
use crate::optimizer::{
    ConvergenceInfo, OptimizationStatus, OptimizerConfig, OptimizerResult, Solver, SolverResult,
    cost_converged, step_converged,
};

/// Summary statistics for the Gauss-Newton optimization process.
#[derive(Debug, Clone)]
pub struct GaussNewtonSummary {
    pub initial_cost: f64,
    pub final_cost: f64,
    pub iterations: usize,
    /// Whether the last iteration increased the cost and was undone
    pub rolled_back: bool,
    pub final_gradient_norm: f64,
    pub total_time: Duration,
}

impl fmt::Display for GaussNewtonSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Gauss-Newton Optimization Summary ===")?;
        writeln!(f, "Initial cost:          {:.6e}", self.initial_cost)?;
        writeln!(f, "Final cost:            {:.6e}", self.final_cost)?;
        writeln!(f, "Total iterations:      {}", self.iterations)?;
        writeln!(f, "Last step rolled back: {}", self.rolled_back)?;
        writeln!(f, "Final gradient norm:   {:.6e}", self.final_gradient_norm)?;
        writeln!(f, "Total time:            {:?}", self.total_time)?;
        Ok(())
    }
}

/// Gauss-Newton solver for nonlinear least squares optimization.
#[derive(Debug, Clone, Default)]
pub struct GaussNewton {
    config: OptimizerConfig,
    last_summary: Option<GaussNewtonSummary>,
}

impl GaussNewton {
    /// Create a new Gauss-Newton solver with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Gauss-Newton solver with the given configuration.
    pub fn with_config(config: OptimizerConfig) -> Self {
        Self {
            config,
            last_summary: None,
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Summary of the most recent solve
    pub fn last_summary(&self) -> Option<&GaussNewtonSummary> {
        self.last_summary.as_ref()
    }
}

impl Solver for GaussNewton {
    fn optimize(
        &mut self,
        problem: &Problem,
        initial_values: &Values,
    ) -> OptimizerResult<SolverResult<Values>> {
        self.config.validate()?;
        let start_time = Instant::now();

        let layout = problem.variable_layout(initial_values)?;
        let mut values = initial_values.clone();
        let initial_cost = problem.compute_cost(&values)?;
        let mut current_cost = initial_cost;
        let mut cost_evaluations = 1;
        let mut jacobian_evaluations = 0;
        let mut final_gradient_norm = 0.0;
        let mut final_parameter_update_norm = 0.0;
        let mut iteration = 0;
        let mut rolled_back = false;
        let mut linear_solver = create_linear_solver(self.config.linear_solver_type);

        if self.config.verbose {
            info!(
                "Starting Gauss-Newton: {} variables ({} dims), initial cost {:.6e}",
                layout.len(),
                layout.total_dimension(),
                initial_cost
            );
        }

        let status = if layout.is_empty() {
            OptimizationStatus::Converged
        } else {
            loop {
                if let Some(timeout) = self.config.timeout
                    && start_time.elapsed() >= timeout
                {
                    break OptimizationStatus::Timeout;
                }
                if iteration >= self.config.max_iterations {
                    break OptimizationStatus::MaxIterationsReached;
                }

                let (residuals, jacobian) = problem.compute_residual_and_jacobian(&values, &layout)?;
                jacobian_evaluations += 1;
                final_gradient_norm = compute_gradient(&residuals, &jacobian).norm_l2();
                if final_gradient_norm <= self.config.gradient_tolerance {
                    break OptimizationStatus::GradientToleranceReached;
                }

                iteration += 1;
                let step = match linear_solver.solve_normal_equation(&residuals, &jacobian) {
                    Ok(step) => step,
                    Err(e) => {
                        warn!("Gauss-Newton linear solve failed: {}", e);
                        break OptimizationStatus::NumericalFailure;
                    }
                };
                final_parameter_update_norm = step.norm_l2();

                let new_values = values.apply_step(&layout, &step);
                let new_cost = problem.compute_cost(&new_values)?;
                cost_evaluations += 1;
                debug!(
                    "GN iteration {}: cost {:.6e} -> {:.6e}, step {:.3e}",
                    iteration, current_cost, new_cost, final_parameter_update_norm
                );

                if !new_cost.is_finite() {
                    break OptimizationStatus::NumericalFailure;
                }
                if new_cost > current_cost && self.config.final_iter_no_increase {
                    rolled_back = true;
                    break OptimizationStatus::CostIncreased;
                }

                let previous_cost = current_cost;
                values = new_values;
                current_cost = new_cost;
                if let Some(status) = cost_converged(previous_cost, current_cost, &self.config) {
                    break status;
                }
                if step_converged(final_parameter_update_norm, &values, &self.config) {
                    break OptimizationStatus::ParameterToleranceReached;
                }
            }
        };

        let elapsed = start_time.elapsed();
        let summary = GaussNewtonSummary {
            initial_cost,
            final_cost: current_cost,
            iterations: iteration,
            rolled_back,
            final_gradient_norm,
            total_time: elapsed,
        };
        if self.config.verbose {
            info!("{}", summary);
        }
        self.last_summary = Some(summary);

        Ok(SolverResult {
            parameters: values,
            status,
            init_cost: initial_cost,
            final_cost: current_cost,
            iterations: iteration,
            elapsed_time: elapsed,
            convergence_info: Some(ConvergenceInfo {
                final_gradient_norm,
                final_parameter_update_norm,
                cost_evaluations,
                jacobian_evaluations,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::core::VariableId;
    use crate::optimizer::test_problems::{linear_chain, rosenbrock};

    #[test]
    fn test_linear_problem_solves_in_one_step() {
        let (problem, values) = linear_chain();
        let mut solver = GaussNewton::new();
        let result = solver.optimize(&problem, &values).unwrap();
        assert_eq!(result.iterations, 1);
        assert_eq!(result.status, OptimizationStatus::Converged);
        let v0 = result.parameters.get(VariableId(1)).unwrap();
        assert!((v0[0] - 1.0).abs() < 1e-9 && (v0[1] + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_rosenbrock_without_rollback() {
        // the first step overshoots in y, the second lands on the minimum
        let (problem, values) = rosenbrock(1.0, 1.0);
        let mut solver = GaussNewton::with_config(
            OptimizerConfig::new()
                .with_max_iterations(50)
                .with_final_iter_no_increase(false),
        );
        let result = solver.optimize(&problem, &values).unwrap();
        assert!(result.final_cost < 1e-12);
        assert_eq!(result.iterations, 2);
        assert!(!solver.last_summary().unwrap().rolled_back);
    }

    #[test]
    fn test_cost_increase_is_rolled_back() {
        let (problem, values) = rosenbrock(1.0, 1.0);
        let mut solver = GaussNewton::new();
        let result = solver.optimize(&problem, &values).unwrap();
        assert_eq!(result.status, OptimizationStatus::CostIncreased);
        assert!(!result.status.is_converged());
        assert_eq!(result.parameters, values);
        assert!((result.final_cost - result.init_cost).abs() < 1e-15);
        let summary = solver.last_summary().unwrap();
        assert!(summary.rolled_back);
        assert!(summary.to_string().contains("rolled back: true"));
    }

    #[test]
    fn test_max_iterations_status() {
        let (problem, values) = rosenbrock(1.0, 100.0);
        let mut solver = GaussNewton::with_config(
            OptimizerConfig::new()
                .with_max_iterations(1)
                .with_final_iter_no_increase(false),
        );
        let result = solver.optimize(&problem, &values).unwrap();
        assert_eq!(result.iterations, 1);
        assert_eq!(result.status, OptimizationStatus::MaxIterationsReached);
    }
}
