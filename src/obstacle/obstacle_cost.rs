use nalgebra::Vector3;

use super::DistanceField;

/// Hinge loss of a point against a distance field.
///
/// Returns `max(0, eps - sdf(point))` together with its gradient with respect to
/// the point. Beyond the safety margin the cost and its gradient are zero.
pub fn hinge_loss_obstacle_cost<F: DistanceField + ?Sized>(
    point: &Vector3<f64>,
    field: &F,
    eps: f64,
) -> (f64, Vector3<f64>) {
    let (distance, gradient) = field.distance_and_gradient(point);
    if distance > eps {
        (0.0, Vector3::zeros())
    } else {
        (eps - distance, -gradient)
    }
}
