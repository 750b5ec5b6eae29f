//! Levenberg-Marquardt algorithm implementation.
//!
//! The Levenberg-Marquardt algorithm is a popular optimization method for
//! nonlinear least squares problems. It interpolates between the Gauss-Newton
//! algorithm and gradient descent by adding a damping parameter.
//!
//! This implementation includes:
//! - Adaptive damping parameter adjustment driven by the step quality ratio
//! - Rejection of steps that do not decrease the cost
//! - Support for both sparse Cholesky and QR factorizations

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::core::{Problem, Values};
use crate::linalg::{compute_gradient, create_linear_solver};
use crate::optimizer::{
    ConvergenceInfo, OptimizationStatus, OptimizerConfig, OptimizerResult, Solver, SolverResult,
    cost_converged, predicted_reduction, step_converged, step_quality,
};

/// Summary statistics for the Levenberg-Marquardt optimization process.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardtSummary {
    /// Initial cost value
    pub initial_cost: f64,
    /// Final cost value
    pub final_cost: f64,
    /// Total number of iterations performed
    pub iterations: usize,
    /// Number of successful steps (cost decreased)
    pub successful_steps: usize,
    /// Number of unsuccessful steps (cost increased, damping increased)
    pub unsuccessful_steps: usize,
    /// Final damping parameter value
    pub final_damping: f64,
    /// Maximum gradient norm encountered
    pub max_gradient_norm: f64,
    /// Final gradient norm
    pub final_gradient_norm: f64,
    /// Final parameter update norm
    pub final_parameter_update_norm: f64,
    /// Total time elapsed
    pub total_time: Duration,
}

impl fmt::Display for LevenbergMarquardtSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Levenberg-Marquardt Optimization Summary ===")?;
        writeln!(f, "Initial cost:              {:.6e}", self.initial_cost)?;
        writeln!(f, "Final cost:                {:.6e}", self.final_cost)?;
        writeln!(
            f,
            "Cost reduction:            {:.6e} ({:.2}%)",
            self.initial_cost - self.final_cost,
            100.0 * (self.initial_cost - self.final_cost) / self.initial_cost.max(1e-12)
        )?;
        writeln!(f, "Total iterations:          {}", self.iterations)?;
        writeln!(
            f,
            "Successful steps:          {} ({:.1}%)",
            self.successful_steps,
            100.0 * self.successful_steps as f64 / self.iterations.max(1) as f64
        )?;
        writeln!(
            f,
            "Unsuccessful steps:        {} ({:.1}%)",
            self.unsuccessful_steps,
            100.0 * self.unsuccessful_steps as f64 / self.iterations.max(1) as f64
        )?;
        writeln!(f, "Final damping parameter:   {:.6e}", self.final_damping)?;
        writeln!(f, "Max gradient norm:         {:.6e}", self.max_gradient_norm)?;
        writeln!(f, "Final gradient norm:       {:.6e}", self.final_gradient_norm)?;
        writeln!(
            f,
            "Final param update norm:   {:.6e}",
            self.final_parameter_update_norm
        )?;
        writeln!(f, "Total time:                {:?}", self.total_time)?;
        Ok(())
    }
}

/// Levenberg-Marquardt solver for nonlinear least squares optimization.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    config: OptimizerConfig,
    initial_damping: f64,
    damping: f64,
    damping_min: f64,
    damping_max: f64,
    damping_increase_factor: f64,
    damping_decrease_factor: f64,
    min_step_quality: f64,
    good_step_quality: f64,
    last_summary: Option<LevenbergMarquardtSummary>,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt solver with default configuration.
    pub fn new() -> Self {
        Self::with_config(OptimizerConfig::default())
    }

    /// Create a new Levenberg-Marquardt solver with the given configuration.
    pub fn with_config(config: OptimizerConfig) -> Self {
        Self {
            config,
            initial_damping: 1e-3,
            damping: 1e-3,
            damping_min: 1e-12,
            damping_max: 1e12,
            damping_increase_factor: 10.0,
            damping_decrease_factor: 0.3,
            min_step_quality: 0.0,
            good_step_quality: 0.75,
            last_summary: None,
        }
    }

    /// Set the initial damping parameter.
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.initial_damping = damping;
        self.damping = damping;
        self
    }

    /// Set the damping parameter bounds.
    pub fn with_damping_bounds(mut self, min: f64, max: f64) -> Self {
        self.damping_min = min;
        self.damping_max = max;
        self
    }

    /// Set the damping adjustment factors.
    pub fn with_damping_factors(mut self, increase: f64, decrease: f64) -> Self {
        self.damping_increase_factor = increase;
        self.damping_decrease_factor = decrease;
        self
    }

    /// Set the step quality thresholds for rejecting and rewarding steps.
    pub fn with_step_quality(mut self, min_quality: f64, good_quality: f64) -> Self {
        self.min_step_quality = min_quality;
        self.good_step_quality = good_quality;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Summary of the most recent solve
    pub fn last_summary(&self) -> Option<&LevenbergMarquardtSummary> {
        self.last_summary.as_ref()
    }

    /// Update damping parameter based on step quality
    fn update_damping(&mut self, rho: f64) -> bool {
        if rho > self.good_step_quality {
            // Good step, decrease damping
            self.damping = (self.damping * self.damping_decrease_factor).max(self.damping_min);
            true
        } else if rho <= self.min_step_quality {
            // Poor step, increase damping
            self.damping = (self.damping * self.damping_increase_factor).min(self.damping_max);
            false
        } else {
            // Acceptable step, keep damping unchanged
            true
        }
    }
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver for LevenbergMarquardt {
    fn optimize(
        &mut self,
        problem: &Problem,
        initial_values: &Values,
    ) -> OptimizerResult<SolverResult<Values>> {
        self.config.validate()?;
        let start_time = Instant::now();
        self.damping = self.initial_damping;

        let layout = problem.variable_layout(initial_values)?;
        let mut values = initial_values.clone();
        let initial_cost = problem.compute_cost(&values)?;
        let mut current_cost = initial_cost;
        let mut cost_evaluations = 1;
        let mut jacobian_evaluations = 0;
        let mut successful_steps = 0;
        let mut unsuccessful_steps = 0;
        let mut max_gradient_norm: f64 = 0.0;
        let mut final_gradient_norm = 0.0;
        let mut final_parameter_update_norm = 0.0;
        let mut iteration = 0;
        let mut linear_solver = create_linear_solver(self.config.linear_solver_type);

        if self.config.verbose {
            info!(
                "Starting Levenberg-Marquardt: {} variables ({} dims), {} residuals, initial cost {:.6e}",
                layout.len(),
                layout.total_dimension(),
                problem.total_residual_dimension,
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
                let gradient = compute_gradient(&residuals, &jacobian);
                let gradient_norm = gradient.norm_l2();
                max_gradient_norm = max_gradient_norm.max(gradient_norm);
                final_gradient_norm = gradient_norm;
                if gradient_norm <= self.config.gradient_tolerance {
                    break OptimizationStatus::GradientToleranceReached;
                }

                iteration += 1;
                let step = match linear_solver.solve_augmented_equation(&residuals, &jacobian, self.damping) {
                    Ok(step) => step,
                    Err(e) => {
                        warn!("Levenberg-Marquardt linear solve failed: {}", e);
                        break OptimizationStatus::NumericalFailure;
                    }
                };
                let step_norm = step.norm_l2();
                final_parameter_update_norm = step_norm;

                let predicted = predicted_reduction(&gradient, &jacobian, &step);
                let new_values = values.apply_step(&layout, &step);
                let new_cost = problem.compute_cost(&new_values)?;
                cost_evaluations += 1;

                let rho = if new_cost.is_finite() {
                    step_quality(current_cost, new_cost, predicted)
                } else {
                    f64::NEG_INFINITY
                };

                if self.update_damping(rho) {
                    let previous_cost = current_cost;
                    values = new_values;
                    current_cost = new_cost;
                    successful_steps += 1;
                    debug!(
                        "LM iteration {}: cost {:.6e}, damping {:.3e}, step {:.3e}, rho {:.3} [accepted]",
                        iteration, current_cost, self.damping, step_norm, rho
                    );
                    if let Some(status) = cost_converged(previous_cost, current_cost, &self.config) {
                        break status;
                    }
                    if step_converged(step_norm, &values, &self.config) {
                        break OptimizationStatus::ParameterToleranceReached;
                    }
                } else {
                    unsuccessful_steps += 1;
                    debug!(
                        "LM iteration {}: cost {:.6e}, damping {:.3e}, step {:.3e}, rho {:.3} [rejected]",
                        iteration, current_cost, self.damping, step_norm, rho
                    );
                    if self.damping >= self.damping_max {
                        // no damping makes the model agree with the cost any more
                        break OptimizationStatus::Converged;
                    }
                }
            }
        };

        let elapsed = start_time.elapsed();
        let summary = LevenbergMarquardtSummary {
            initial_cost,
            final_cost: current_cost,
            iterations: iteration,
            successful_steps,
            unsuccessful_steps,
            final_damping: self.damping,
            max_gradient_norm,
            final_gradient_norm,
            final_parameter_update_norm,
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
    use crate::optimizer::test_problems::rosenbrock;

    #[test]
    fn test_levenberg_marquardt_creation() {
        let solver = LevenbergMarquardt::new();
        assert!(solver.damping > 0.0);
        assert!(solver.last_summary().is_none());
    }

    #[test]
    fn test_damping_configuration() {
        let solver = LevenbergMarquardt::new()
            .with_damping(1e-6)
            .with_damping_bounds(1e-15, 1e15);

        assert_eq!(solver.damping, 1e-6);
        assert_eq!(solver.damping_min, 1e-15);
        assert_eq!(solver.damping_max, 1e15);
    }

    #[test]
    fn test_damping_update_rules() {
        let mut solver = LevenbergMarquardt::new().with_damping(1.0);
        assert!(solver.update_damping(0.9));
        assert!((solver.damping - 0.3).abs() < 1e-12);
        assert!(solver.update_damping(0.5));
        assert!((solver.damping - 0.3).abs() < 1e-12);
        assert!(!solver.update_damping(-1.0));
        assert!((solver.damping - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_rosenbrock_optimization() {
        let (problem, values) = rosenbrock(1.0, 100.0);
        let mut solver = LevenbergMarquardt::with_config(
            OptimizerConfig::new()
                .with_max_iterations(200)
                .with_cost_tolerance(1e-14)
                .with_absolute_cost_tolerance(1e-16),
        );
        let result = solver.optimize(&problem, &values).unwrap();
        let x = result.parameters.get(VariableId(0)).unwrap();
        assert!(result.final_cost < 1e-8, "final cost {}", result.final_cost);
        assert!((x[0] - 1.0).abs() < 1e-3 && (x[1] - 1.0).abs() < 1e-3);
        assert!(result.final_cost <= result.init_cost);

        let summary = solver.last_summary().unwrap();
        assert_eq!(summary.iterations, result.iterations);
        assert!(summary.to_string().contains("Levenberg-Marquardt"));
    }

    #[test]
    fn test_cost_never_increases() {
        let (problem, values) = rosenbrock(1.0, 10.0);
        let mut solver = LevenbergMarquardt::with_config(OptimizerConfig::new().with_max_iterations(3));
        let result = solver.optimize(&problem, &values).unwrap();
        assert!(result.final_cost <= result.init_cost);
        assert!(result.iterations <= 3);
    }
}
