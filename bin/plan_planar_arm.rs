use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use gpmp_solver::init_logger;
use gpmp_solver::io::{SdfLoader, write_trajectory};
use gpmp_solver::kinematics::{Arm, ArmModel, BodySphere};
use gpmp_solver::linalg::LinearSolverType;
use gpmp_solver::obstacle::PlanarSdf;
use gpmp_solver::optimizer::OptimizerType;
use gpmp_solver::planner::{
    SettingParams, TrajOptimizerSetting, batch_traj_optimize_2d_arm, collision_cost,
    init_arm_traj_straight_line, interpolate_arm_traj,
};
use nalgebra::{DMatrix, DVector, Vector2, Vector3};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "plan_planar_arm")]
#[command(about = "Plan a collision-free trajectory for a 2-link planar arm")]
struct Args {
    /// Planar SDF file; a field with one disc obstacle is generated when omitted
    #[arg(long)]
    sdf: Option<PathBuf>,

    /// Start joint angles, comma separated
    #[arg(long, default_value = "0.0,0.0", value_delimiter = ',')]
    start: Vec<f64>,

    /// Goal joint angles, comma separated
    #[arg(long, default_value = "1.5707963,0.0", value_delimiter = ',')]
    goal: Vec<f64>,

    /// Optimizer type: "lm" (Levenberg-Marquardt), "gn" (Gauss-Newton) or "dl" (Dog Leg)
    #[arg(short, long, default_value = "lm")]
    optimizer: String,

    /// Use sparse QR instead of sparse Cholesky
    #[arg(long)]
    qr: bool,

    /// Number of trajectory intervals
    #[arg(long, default_value = "10")]
    total_step: usize,

    /// Trajectory duration in seconds
    #[arg(long, default_value = "10.0")]
    total_time: f64,

    /// Safety distance added to every body sphere
    #[arg(long, default_value = "0.05")]
    epsilon: f64,

    /// Obstacle cost standard deviation
    #[arg(long, default_value = "0.01")]
    cost_sigma: f64,

    /// Interpolated collision checks per interval
    #[arg(long, default_value = "5")]
    obs_check_inter: usize,

    /// Maximum number of optimization iterations
    #[arg(short, long, default_value = "100")]
    max_iterations: usize,

    /// States inserted per interval in the written trajectory
    #[arg(long, default_value = "0")]
    output_inter_step: usize,

    /// Optional path to save the optimized trajectory
    #[arg(long)]
    save_output: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn planar_arm() -> Result<ArmModel, Box<dyn std::error::Error>> {
    let arm = Arm::new(
        2,
        DVector::from_vec(vec![0.5, 0.5]),
        DVector::zeros(2),
        DVector::zeros(2),
    )?;
    let mut spheres = Vec::new();
    for link in 0..2 {
        for k in 0..5 {
            let x = -0.5 + 0.125 * k as f64;
            spheres.push(BodySphere::new(link, 0.05, Vector3::new(x, 0.0, 0.0)));
        }
    }
    Ok(ArmModel::new(arm, spheres)?)
}

/// 3 x 3 m field around the base with one disc obstacle of radius 0.05.
fn disc_field() -> Result<PlanarSdf, Box<dyn std::error::Error>> {
    let origin = Vector2::new(-1.5, -1.5);
    let cell = 0.01;
    let angle = 40.5_f64.to_radians();
    let center = Vector2::new(0.95 * angle.cos(), 0.95 * angle.sin());
    let data = DMatrix::from_fn(301, 301, |r, c| {
        let p = origin + Vector2::new(c as f64, r as f64) * cell;
        (p - center).norm() - 0.05
    });
    Ok(PlanarSdf::new(origin, cell, data)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let args = Args::parse();

    let arm = Arc::new(planar_arm()?);
    let field = Arc::new(match &args.sdf {
        Some(path) => {
            info!("Loading SDF from {}", path.display());
            SdfLoader::load_planar(path)?
        }
        None => disc_field()?,
    });

    let optimizer: OptimizerType = args.optimizer.parse()?;
    let linear_solver = if args.qr {
        LinearSolverType::SparseQR
    } else {
        LinearSolverType::SparseCholesky
    };
    let setting = TrajOptimizerSetting::new(
        SettingParams::new(2)
            .with_total_step(args.total_step)
            .with_total_time(args.total_time)
            .with_epsilon(args.epsilon)
            .with_cost_sigma(args.cost_sigma)
            .with_obs_check_inter(args.obs_check_inter)
            .with_max_iter(args.max_iterations)
            .with_optimizer_type(optimizer)
            .with_linear_solver_type(linear_solver)
            .with_verbose(args.verbose),
    )?;

    let start = DVector::from_vec(args.start.clone());
    let goal = DVector::from_vec(args.goal.clone());
    let rest = DVector::zeros(2);
    let init = init_arm_traj_straight_line(&start, &goal, args.total_step, args.total_time)?;
    let init_collision = collision_cost(arm.clone(), field.clone(), &init, &setting)?;
    info!("Straight-line collision cost: {:.6e}", init_collision);

    let result = batch_traj_optimize_2d_arm(
        arm.clone(),
        field.clone(),
        &start,
        &rest,
        &goal,
        &rest,
        &init,
        &setting,
    )?;
    let final_collision = collision_cost(arm, field, &result.trajectory, &setting)?;
    info!(
        "{} after {} iterations: cost {:.6e} -> {:.6e}, collision cost {:.6e}, {:?}",
        result.status,
        result.iterations,
        result.initial_cost,
        result.final_cost,
        final_collision,
        result.elapsed_time
    );
    if !result.is_converged() {
        warn!("Optimizer did not converge; writing best estimate");
    }

    if let Some(path) = &args.save_output {
        let dense = interpolate_arm_traj(&result.trajectory, setting.qc(), args.output_inter_step)?;
        write_trajectory(&dense, path)?;
        info!("Wrote {} states to {}", dense.len(), path.display());
    }
    Ok(())
}
