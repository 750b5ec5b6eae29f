//! Dog Leg optimization algorithm implementation.
//!
//! The Dog Leg algorithm is a trust region method that combines the Gauss-Newton
//! direction with the steepest descent direction to find an optimal step within
//! a trust region.

use std::fmt;
use std::time::{Duration, Instant};

use faer::Mat;
use tracing::{debug, info, warn};

use crate::core::{Problem, Values};
use crate::linalg::{compute_gradient, create_linear_solver, dot, sparse_mul_vec};
use crate::optimizer::{
    ConvergenceInfo, OptimizationStatus, OptimizerConfig, OptimizerResult, Solver, SolverResult,
    cost_converged, predicted_reduction, step_converged, step_quality,
};

/// Which segment of the dog leg path the step came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    GaussNewton,
    SteepestDescent,
    Blended,
}

/// Summary statistics for the Dog Leg optimization process.
#[derive(Debug, Clone)]
pub struct DogLegSummary {
    pub initial_cost: f64,
    pub final_cost: f64,
    pub iterations: usize,
    pub successful_steps: usize,
    pub unsuccessful_steps: usize,
    pub final_trust_region_radius: f64,
    pub final_gradient_norm: f64,
    pub total_time: Duration,
}

impl fmt::Display for DogLegSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Dog Leg Optimization Summary ===")?;
        writeln!(f, "Initial cost:         {:.6e}", self.initial_cost)?;
        writeln!(f, "Final cost:           {:.6e}", self.final_cost)?;
        writeln!(f, "Total iterations:     {}", self.iterations)?;
        writeln!(f, "Successful steps:     {}", self.successful_steps)?;
        writeln!(f, "Unsuccessful steps:   {}", self.unsuccessful_steps)?;
        writeln!(
            f,
            "Trust region radius:  {:.6e}",
            self.final_trust_region_radius
        )?;
        writeln!(f, "Final gradient norm:  {:.6e}", self.final_gradient_norm)?;
        writeln!(f, "Total time:           {:?}", self.total_time)?;
        Ok(())
    }
}

/// Dog Leg solver for nonlinear least squares optimization.
#[derive(Debug, Clone)]
pub struct DogLeg {
    config: OptimizerConfig,
    initial_trust_region_radius: f64,
    trust_region_radius: f64,
    trust_region_min: f64,
    trust_region_max: f64,
    trust_region_increase_factor: f64,
    trust_region_decrease_factor: f64,
    last_summary: Option<DogLegSummary>,
}

impl DogLeg {
    /// Create a new Dog Leg solver with default configuration.
    pub fn new() -> Self {
        Self::with_config(OptimizerConfig::default())
    }

    /// Create a new Dog Leg solver with the given configuration.
    pub fn with_config(config: OptimizerConfig) -> Self {
        Self {
            config,
            initial_trust_region_radius: 1.0,
            trust_region_radius: 1.0,
            trust_region_min: 1e-12,
            trust_region_max: 1e12,
            trust_region_increase_factor: 2.0,
            trust_region_decrease_factor: 0.5,
            last_summary: None,
        }
    }

    /// Set the initial trust region radius.
    pub fn with_trust_region_radius(mut self, radius: f64) -> Self {
        self.initial_trust_region_radius = radius;
        self.trust_region_radius = radius;
        self
    }

    /// Set the trust region radius bounds.
    pub fn with_trust_region_bounds(mut self, min: f64, max: f64) -> Self {
        self.trust_region_min = min;
        self.trust_region_max = max;
        self
    }

    /// Set the trust region adjustment factors.
    pub fn with_trust_region_factors(mut self, increase: f64, decrease: f64) -> Self {
        self.trust_region_increase_factor = increase;
        self.trust_region_decrease_factor = decrease;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Summary of the most recent solve
    pub fn last_summary(&self) -> Option<&DogLegSummary> {
        self.last_summary.as_ref()
    }

    /// Update trust region radius based on step quality
    fn update_trust_region(&mut self, rho: f64, step_norm: f64) {
        if rho > 0.75 {
            // Good step, increase trust region
            self.trust_region_radius = (self.trust_region_radius
                .max(self.trust_region_increase_factor * step_norm))
            .min(self.trust_region_max);
        } else if rho < 0.25 {
            // Poor step, decrease trust region
            self.trust_region_radius =
                (step_norm * self.trust_region_decrease_factor).max(self.trust_region_min);
        }
    }

    /// Combine the Gauss-Newton and Cauchy steps inside the trust region.
    fn dog_leg_step(&self, gauss_newton: &Mat<f64>, cauchy: &Mat<f64>) -> (Mat<f64>, StepKind) {
        let radius = self.trust_region_radius;
        let gn_norm = gauss_newton.norm_l2();
        if gn_norm <= radius {
            return (gauss_newton.clone(), StepKind::GaussNewton);
        }
        let sd_norm = cauchy.norm_l2();
        if sd_norm >= radius {
            return (scaled(cauchy, radius / sd_norm), StepKind::SteepestDescent);
        }
        // |sd + beta (gn - sd)| = radius, 0 < beta < 1
        let diff = gauss_newton - cauchy;
        let a = dot(&diff, &diff);
        let b = 2.0 * dot(cauchy, &diff);
        let c = sd_norm * sd_norm - radius * radius;
        let beta = (-b + (b * b - 4.0 * a * c).max(0.0).sqrt()) / (2.0 * a);
        (cauchy + &scaled(&diff, beta), StepKind::Blended)
    }
}

fn scaled(v: &Mat<f64>, k: f64) -> Mat<f64> {
    Mat::from_fn(v.nrows(), v.ncols(), |i, j| k * v[(i, j)])
}

impl Default for DogLeg {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver for DogLeg {
    fn optimize(
        &mut self,
        problem: &Problem,
        initial_values: &Values,
    ) -> OptimizerResult<SolverResult<Values>> {
        self.config.validate()?;
        let start_time = Instant::now();
        self.trust_region_radius = self.initial_trust_region_radius;

        let layout = problem.variable_layout(initial_values)?;
        let mut values = initial_values.clone();
        let initial_cost = problem.compute_cost(&values)?;
        let mut current_cost = initial_cost;
        let mut cost_evaluations = 1;
        let mut jacobian_evaluations = 0;
        let mut successful_steps = 0;
        let mut unsuccessful_steps = 0;
        let mut final_gradient_norm = 0.0;
        let mut final_parameter_update_norm = 0.0;
        let mut iteration = 0;
        let mut linear_solver = create_linear_solver(self.config.linear_solver_type);

        if self.config.verbose {
            info!(
                "Starting Dog Leg: {} variables ({} dims), initial cost {:.6e}, radius {:.3e}",
                layout.len(),
                layout.total_dimension(),
                initial_cost,
                self.trust_region_radius
            );
        }

        // Linearization is reused while steps keep being rejected.
        let mut linearization = None;

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

                if linearization.is_none() {
                    let (residuals, jacobian) =
                        problem.compute_residual_and_jacobian(&values, &layout)?;
                    jacobian_evaluations += 1;
                    let gradient = compute_gradient(&residuals, &jacobian);
                    let gauss_newton = match linear_solver.solve_normal_equation(&residuals, &jacobian) {
                        Ok(step) => step,
                        Err(e) => {
                            warn!("Dog Leg linear solve failed: {}", e);
                            break OptimizationStatus::NumericalFailure;
                        }
                    };
                    // Cauchy point: minimizer of the model along -g
                    let j_gradient = sparse_mul_vec(&jacobian, &gradient);
                    let curvature = dot(&j_gradient, &j_gradient);
                    let gradient_sq = dot(&gradient, &gradient);
                    let alpha = if curvature > 0.0 { gradient_sq / curvature } else { 0.0 };
                    let cauchy = scaled(&gradient, -alpha);
                    linearization = Some((jacobian, gradient, gauss_newton, cauchy));
                }
                let Some((jacobian, gradient, gauss_newton, cauchy)) = linearization.as_ref() else {
                    break OptimizationStatus::Failed("missing linearization".to_string());
                };

                final_gradient_norm = gradient.norm_l2();
                if final_gradient_norm <= self.config.gradient_tolerance {
                    break OptimizationStatus::GradientToleranceReached;
                }

                iteration += 1;
                let (step, kind) = self.dog_leg_step(gauss_newton, cauchy);
                let step_norm = step.norm_l2();
                final_parameter_update_norm = step_norm;

                let predicted = predicted_reduction(gradient, jacobian, &step);
                let new_values = values.apply_step(&layout, &step);
                let new_cost = problem.compute_cost(&new_values)?;
                cost_evaluations += 1;
                let rho = if new_cost.is_finite() {
                    step_quality(current_cost, new_cost, predicted)
                } else {
                    f64::NEG_INFINITY
                };
                self.update_trust_region(rho, step_norm);

                if rho > 0.0 && new_cost <= current_cost {
                    let previous_cost = current_cost;
                    values = new_values;
                    current_cost = new_cost;
                    successful_steps += 1;
                    linearization = None;
                    debug!(
                        "DL iteration {}: cost {:.6e}, radius {:.3e}, {:?} step {:.3e}, rho {:.3} [accepted]",
                        iteration, current_cost, self.trust_region_radius, kind, step_norm, rho
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
                        "DL iteration {}: cost {:.6e}, radius {:.3e}, {:?} step {:.3e}, rho {:.3} [rejected]",
                        iteration, current_cost, self.trust_region_radius, kind, step_norm, rho
                    );
                    if self.trust_region_radius <= self.trust_region_min {
                        break OptimizationStatus::Converged;
                    }
                }
            }
        };

        let elapsed = start_time.elapsed();
        let summary = DogLegSummary {
            initial_cost,
            final_cost: current_cost,
            iterations: iteration,
            successful_steps,
            unsuccessful_steps,
            final_trust_region_radius: self.trust_region_radius,
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
