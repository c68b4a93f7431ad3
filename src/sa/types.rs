//! Core trait for Simulated Annealing.

use rand::Rng;

/// Defines a Simulated Annealing problem.
///
/// The implementor provides cost evaluation and neighbour generation.
/// The engine handles the schedule, the acceptance criterion and
/// incumbent tracking.
///
/// # Minimization
///
/// SA minimizes the cost function. Costs must be non-negative and finite.
///
/// # Examples
///
/// ```ignore
/// struct Parabola;
///
/// impl SaProblem for Parabola {
///     type Solution = f64;
///
///     fn cost(&self, x: &f64) -> f64 {
///         x * x
///     }
///
///     fn neighbor<R: Rng>(&self, x: &f64, rng: &mut R) -> f64 {
///         x + rng.random_range(-1.0..1.0)
///     }
/// }
/// ```
pub trait SaProblem: Send + Sync {
    /// The solution representation type.
    type Solution: Clone + Send;

    /// Computes the cost of a solution. Lower is better.
    fn cost(&self, solution: &Self::Solution) -> f64;

    /// Generates a neighbour of the current solution.
    ///
    /// The neighbour must be valid; invalid proposals are the
    /// implementor's to reject and retry.
    fn neighbor<R: Rng>(&self, solution: &Self::Solution, rng: &mut R) -> Self::Solution;
}
