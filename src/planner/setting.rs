//! Planning configuration.
//!
//! [`SettingParams`] is a plain record with defaults that callers edit freely;
//! [`TrajOptimizerSetting::new`] validates it once and freezes it, deriving the
//! noise models every graph built from it shares.

use nalgebra::{DMatrix, DVector};

use crate::error::{PlannerError, PlannerResult};
use crate::factors::GaussianNoise;
use crate::gp::qc_inverse;
use crate::linalg::LinearSolverType;
use crate::optimizer::{AnySolver, OptimizerConfig, OptimizerType};

/// How boundary states (start, goal, fixed states) are enforced
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryConstraint {
    /// Tight Gaussian priors with the configured sigmas
    #[default]
    Soft,
    /// Variables removed from the optimization and held at their value
    Hard,
}

/// Joint position limits, charged from `thresh` inside each bound
#[derive(Debug, Clone, PartialEq)]
pub struct JointLimits {
    pub down: DVector<f64>,
    pub up: DVector<f64>,
    pub thresh: DVector<f64>,
    pub sigma: f64,
}

/// Symmetric joint velocity limits `|v_i| <= limits_i`
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityLimits {
    pub limits: DVector<f64>,
    pub thresh: DVector<f64>,
    pub sigma: f64,
}

/// Editable planning parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingParams {
    pub dof: usize,
    /// Number of intervals; the trajectory has `total_step + 1` states
    pub total_step: usize,
    pub total_time: f64,
    /// Safety distance added to every sphere radius
    pub epsilon: f64,
    /// Standard deviation of the obstacle hinge residuals
    pub cost_sigma: f64,
    /// Interpolated collision checks per interval; 0 disables them
    pub obs_check_inter: usize,
    /// Relative cost decrease that stops the optimizer
    pub rel_thresh: f64,
    pub max_iter: usize,
    pub conf_prior_sigma: f64,
    pub vel_prior_sigma: f64,
    /// GP power spectral density
    pub qc: DMatrix<f64>,
    pub optimizer_type: OptimizerType,
    pub linear_solver_type: LinearSolverType,
    pub boundary: BoundaryConstraint,
    pub joint_limits: Option<JointLimits>,
    pub velocity_limits: Option<VelocityLimits>,
    pub final_iter_no_increase: bool,
    pub verbose: bool,
}

impl SettingParams {
    pub fn new(dof: usize) -> Self {
        Self {
            dof,
            total_step: 10,
            total_time: 1.0,
            epsilon: 0.1,
            cost_sigma: 0.1,
            obs_check_inter: 0,
            rel_thresh: 1e-2,
            max_iter: 50,
            conf_prior_sigma: 1e-4,
            vel_prior_sigma: 1e-4,
            qc: DMatrix::identity(dof, dof),
            optimizer_type: OptimizerType::DogLeg,
            linear_solver_type: LinearSolverType::SparseCholesky,
            boundary: BoundaryConstraint::Soft,
            joint_limits: None,
            velocity_limits: None,
            final_iter_no_increase: true,
            verbose: false,
        }
    }

    pub fn with_total_step(mut self, total_step: usize) -> Self {
        self.total_step = total_step;
        self
    }

    pub fn with_total_time(mut self, total_time: f64) -> Self {
        self.total_time = total_time;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_cost_sigma(mut self, cost_sigma: f64) -> Self {
        self.cost_sigma = cost_sigma;
        self
    }

    pub fn with_obs_check_inter(mut self, obs_check_inter: usize) -> Self {
        self.obs_check_inter = obs_check_inter;
        self
    }

    pub fn with_rel_thresh(mut self, rel_thresh: f64) -> Self {
        self.rel_thresh = rel_thresh;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_prior_sigmas(mut self, conf_prior_sigma: f64, vel_prior_sigma: f64) -> Self {
        self.conf_prior_sigma = conf_prior_sigma;
        self.vel_prior_sigma = vel_prior_sigma;
        self
    }

    pub fn with_qc(mut self, qc: DMatrix<f64>) -> Self {
        self.qc = qc;
        self
    }

    pub fn with_optimizer_type(mut self, optimizer_type: OptimizerType) -> Self {
        self.optimizer_type = optimizer_type;
        self
    }

    pub fn with_linear_solver_type(mut self, linear_solver_type: LinearSolverType) -> Self {
        self.linear_solver_type = linear_solver_type;
        self
    }

    pub fn with_boundary(mut self, boundary: BoundaryConstraint) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_joint_limits(mut self, joint_limits: JointLimits) -> Self {
        self.joint_limits = Some(joint_limits);
        self
    }

    pub fn with_velocity_limits(mut self, velocity_limits: VelocityLimits) -> Self {
        self.velocity_limits = Some(velocity_limits);
        self
    }

    pub fn with_final_iter_no_increase(mut self, enabled: bool) -> Self {
        self.final_iter_no_increase = enabled;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Validated, immutable planning configuration.
#[derive(Debug, Clone)]
pub struct TrajOptimizerSetting {
    params: SettingParams,
    conf_prior_model: GaussianNoise,
    vel_prior_model: GaussianNoise,
}

fn invalid(message: String) -> PlannerError {
    PlannerError::InvalidInput(message)
}

fn check_positive(name: &str, value: f64) -> PlannerResult<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid(format!("{name} must be positive, got {value}")));
    }
    Ok(())
}

fn check_len(name: &str, v: &DVector<f64>, dof: usize) -> PlannerResult<()> {
    if v.len() != dof {
        return Err(invalid(format!(
            "{name} has {} entries, expected {dof}",
            v.len()
        )));
    }
    Ok(())
}

impl TrajOptimizerSetting {
    /// # Errors
    /// `InvalidInput` naming the first field that is out of range.
    pub fn new(params: SettingParams) -> PlannerResult<Self> {
        let dof = params.dof;
        if dof == 0 {
            return Err(invalid("dof must be at least 1".to_string()));
        }
        if params.total_step == 0 {
            return Err(invalid("total_step must be at least 1".to_string()));
        }
        check_positive("total_time", params.total_time)?;
        if !(params.epsilon.is_finite() && params.epsilon >= 0.0) {
            return Err(invalid(format!(
                "epsilon must be non-negative, got {}",
                params.epsilon
            )));
        }
        check_positive("cost_sigma", params.cost_sigma)?;
        check_positive("conf_prior_sigma", params.conf_prior_sigma)?;
        check_positive("vel_prior_sigma", params.vel_prior_sigma)?;
        if params.max_iter == 0 {
            return Err(invalid("max_iter must be at least 1".to_string()));
        }
        if !(params.rel_thresh.is_finite() && params.rel_thresh >= 0.0) {
            return Err(invalid(format!(
                "rel_thresh must be non-negative, got {}",
                params.rel_thresh
            )));
        }
        if params.qc.nrows() != dof || params.qc.ncols() != dof {
            return Err(invalid(format!(
                "Qc is {}x{}, expected {dof}x{dof}",
                params.qc.nrows(),
                params.qc.ncols()
            )));
        }
        qc_inverse(&params.qc)?;
        if let Some(limits) = &params.joint_limits {
            check_len("joint limit down", &limits.down, dof)?;
            check_len("joint limit up", &limits.up, dof)?;
            check_len("joint limit thresh", &limits.thresh, dof)?;
            check_positive("joint limit sigma", limits.sigma)?;
        }
        if let Some(limits) = &params.velocity_limits {
            check_len("velocity limits", &limits.limits, dof)?;
            check_len("velocity limit thresh", &limits.thresh, dof)?;
            check_positive("velocity limit sigma", limits.sigma)?;
        }

        let conf_prior_model = GaussianNoise::isotropic(dof, params.conf_prior_sigma)?;
        let vel_prior_model = GaussianNoise::isotropic(dof, params.vel_prior_sigma)?;
        Ok(Self {
            params,
            conf_prior_model,
            vel_prior_model,
        })
    }

    pub fn params(&self) -> &SettingParams {
        &self.params
    }

    pub fn dof(&self) -> usize {
        self.params.dof
    }

    pub fn total_step(&self) -> usize {
        self.params.total_step
    }

    pub fn total_time(&self) -> f64 {
        self.params.total_time
    }

    /// Time between consecutive support states
    pub fn delta_t(&self) -> f64 {
        self.params.total_time / self.params.total_step as f64
    }

    pub fn epsilon(&self) -> f64 {
        self.params.epsilon
    }

    pub fn cost_sigma(&self) -> f64 {
        self.params.cost_sigma
    }

    pub fn obs_check_inter(&self) -> usize {
        self.params.obs_check_inter
    }

    pub fn rel_thresh(&self) -> f64 {
        self.params.rel_thresh
    }

    pub fn max_iter(&self) -> usize {
        self.params.max_iter
    }

    pub fn qc(&self) -> &DMatrix<f64> {
        &self.params.qc
    }

    pub fn optimizer_type(&self) -> OptimizerType {
        self.params.optimizer_type
    }

    pub fn boundary(&self) -> BoundaryConstraint {
        self.params.boundary
    }

    pub fn joint_limits(&self) -> Option<&JointLimits> {
        self.params.joint_limits.as_ref()
    }

    pub fn velocity_limits(&self) -> Option<&VelocityLimits> {
        self.params.velocity_limits.as_ref()
    }

    pub fn final_iter_no_increase(&self) -> bool {
        self.params.final_iter_no_increase
    }

    pub fn conf_prior_model(&self) -> &GaussianNoise {
        &self.conf_prior_model
    }

    pub fn vel_prior_model(&self) -> &GaussianNoise {
        &self.vel_prior_model
    }

    /// Stopping rules of the nonlinear solve
    pub fn optimizer_config(&self) -> OptimizerConfig {
        OptimizerConfig::new()
            .with_linear_solver_type(self.params.linear_solver_type)
            .with_max_iterations(self.params.max_iter)
            .with_cost_tolerance(self.params.rel_thresh)
            .with_final_iter_no_increase(self.params.final_iter_no_increase)
            .with_verbose(self.params.verbose)
    }

    /// Optimizer of the configured type
    pub fn build_solver(&self) -> AnySolver {
        AnySolver::new(self.params.optimizer_type, self.optimizer_config())
    }
}
