//! Joint position and velocity limits as hinge costs.
//!
//! Each coordinate is charged only once it comes within `thresh` of its limit,
//! so a trajectory well inside the limits is unaffected.

use nalgebra::{DMatrix, DVector};

use super::{Factor, FactorError, FactorKind, FactorResult, GaussianNoise, check_params};

/// Hinge cost of a scalar against `[down + thresh, up - thresh]`, with its derivative.
pub fn hinge_loss_limit_cost(value: f64, down: f64, up: f64, thresh: f64) -> (f64, f64) {
    if value < down + thresh {
        (down + thresh - value, -1.0)
    } else if value <= up - thresh {
        (0.0, 0.0)
    } else {
        (value - up + thresh, 1.0)
    }
}

fn limit_linearize(
    value: &DVector<f64>,
    down: &DVector<f64>,
    up: &DVector<f64>,
    thresh: &DVector<f64>,
    noise: &GaussianNoise,
    compute_jacobian: bool,
) -> (DVector<f64>, Option<DMatrix<f64>>) {
    let n = value.len();
    let mut error = DVector::zeros(n);
    let mut slope = DVector::zeros(n);
    for i in 0..n {
        let (e, d) = hinge_loss_limit_cost(value[i], down[i], up[i], thresh[i]);
        error[i] = e;
        slope[i] = d;
    }
    let jacobian = compute_jacobian.then(|| noise.whiten_jacobian(&DMatrix::from_diagonal(&slope)));
    (noise.whiten(&error), jacobian)
}

fn check_limits(down: &DVector<f64>, up: &DVector<f64>, thresh: &DVector<f64>) -> FactorResult<()> {
    for v in [up, thresh] {
        if v.len() != down.len() {
            return Err(FactorError::InvalidDimension {
                expected: down.len(),
                actual: v.len(),
            });
        }
    }
    for i in 0..down.len() {
        if down[i] > up[i] || thresh[i] < 0.0 {
            return Err(FactorError::InvalidParameters(format!(
                "limit {i}: down {} up {} thresh {}",
                down[i], up[i], thresh[i]
            )));
        }
    }
    Ok(())
}

/// Keeps a configuration inside `[down, up]`.
#[derive(Debug, Clone)]
pub struct JointLimitFactor {
    down: DVector<f64>,
    up: DVector<f64>,
    thresh: DVector<f64>,
    noise: GaussianNoise,
}

impl JointLimitFactor {
    pub fn new(
        down: DVector<f64>,
        up: DVector<f64>,
        thresh: DVector<f64>,
        noise: GaussianNoise,
    ) -> FactorResult<Self> {
        check_limits(&down, &up, &thresh)?;
        if noise.dim() != down.len() {
            return Err(FactorError::InvalidDimension {
                expected: down.len(),
                actual: noise.dim(),
            });
        }
        Ok(Self {
            down,
            up,
            thresh,
            noise,
        })
    }
}

impl Factor for JointLimitFactor {
    fn linearize(
        &self,
        params: &[DVector<f64>],
        compute_jacobian: bool,
    ) -> FactorResult<(DVector<f64>, Option<DMatrix<f64>>)> {
        check_params(params, &[self.down.len()])?;
        Ok(limit_linearize(
            &params[0],
            &self.down,
            &self.up,
            &self.thresh,
            &self.noise,
            compute_jacobian,
        ))
    }

    fn get_dimension(&self) -> usize {
        self.down.len()
    }

    fn kind(&self) -> FactorKind {
        FactorKind::JointLimit
    }
}

/// Keeps every velocity component inside `[-limit, limit]`.
#[derive(Debug, Clone)]
pub struct VelocityLimitFactor {
    limits: DVector<f64>,
    neg_limits: DVector<f64>,
    thresh: DVector<f64>,
    noise: GaussianNoise,
}

impl VelocityLimitFactor {
    pub fn new(limits: DVector<f64>, thresh: DVector<f64>, noise: GaussianNoise) -> FactorResult<Self> {
        let neg_limits = -&limits;
        check_limits(&neg_limits, &limits, &thresh)?;
        if noise.dim() != limits.len() {
            return Err(FactorError::InvalidDimension {
                expected: limits.len(),
                actual: noise.dim(),
            });
        }
        Ok(Self {
            limits,
            neg_limits,
            thresh,
            noise,
        })
    }
}

impl Factor for VelocityLimitFactor {
    fn linearize(
        &self,
        params: &[DVector<f64>],
        compute_jacobian: bool,
    ) -> FactorResult<(DVector<f64>, Option<DMatrix<f64>>)> {
        check_params(params, &[self.limits.len()])?;
        Ok(limit_linearize(
            &params[0],
            &self.neg_limits,
            &self.limits,
            &self.thresh,
            &self.noise,
            compute_jacobian,
        ))
    }

    fn get_dimension(&self) -> usize {
        self.limits.len()
    }

    fn kind(&self) -> FactorKind {
        FactorKind::VelocityLimit
    }
}
