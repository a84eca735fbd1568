//! A solver for the Variable Placement with Separation Constraints (VPSC)
//! problem.
//!
//! Given one-dimensional variables, each with a desired position and a
//! positive weight, and separation constraints `right - left >= gap`
//! (optionally `== gap`), the solver finds positions minimizing the
//! weighted sum of squared deviations from the desired positions subject
//! to every constraint.
//!
//! # Algorithm
//!
//! This is an active-set quadratic program solver specialized to
//! separation constraints. It maintains a partition of the variables into
//! **blocks**: connected components under constraints currently held
//! tight, each positioned at its weighted centroid. Feasibility is reached
//! by merging blocks across violated constraints (most violated first);
//! optimality by splitting blocks across active constraints whose Lagrange
//! multipliers have gone negative, i.e. constraints the objective would
//! rather relax.
//!
//! Two drivers are provided:
//!
//! - [`Solver`]: batch `satisfy()` + `refine()` for one-shot solves.
//! - [`IncSolver`]: warm-start solver that reuses the block structure
//!   after the caller updates desired positions, for the outer loop of an
//!   iterative layout engine.
//!
//! # Example
//!
//! ```
//! use vpsc_core::{Constraint, Solver, Variable};
//!
//! // Two unit-weight variables that both want position 0, kept 1 apart.
//! let vars = vec![Variable::new(0.0), Variable::new(0.0)];
//! let cs = vec![Constraint::new(0, 1, 1.0)];
//!
//! let mut solver = Solver::new(vars, cs)?;
//! solver.solve()?;
//!
//! let positions = solver.positions();
//! assert!((positions[0] + 0.5).abs() < 1e-6);
//! assert!((positions[1] - 0.5).abs() < 1e-6);
//! # Ok::<(), vpsc_core::VpscError>(())
//! ```
//!
//! Infeasible inputs (a cycle of inequalities whose gaps sum positive)
//! surface as [`VpscError::UnsatisfiedConstraint`] from the batch solver;
//! the incremental solver instead flags the offending constraints
//! `unsatisfiable` and solves the rest of the system.

mod block;
mod blocks;
pub mod error;
pub mod incremental;
pub mod problem;
pub mod solver;

pub use error::{VpscError, VpscResult};
pub use incremental::IncSolver;
pub use problem::{Constraint, SolverSettings, Variable};
pub use solver::{SolveStats, Solver};
