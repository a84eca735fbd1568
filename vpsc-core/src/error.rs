//! Error types for the VPSC solver.

use thiserror::Error;

/// Errors that can occur while constructing or running a solver.
#[derive(Error, Debug)]
pub enum VpscError {
    /// Problem validation failed
    #[error("Invalid problem: {0}")]
    InvalidProblem(String),

    /// Feasibility verification failed: a constraint not marked
    /// unsatisfiable still has negative slack after solving.
    #[error("Unsatisfied constraint {constraint} (slack {slack:e})")]
    UnsatisfiedConstraint {
        /// Index of the offending constraint
        constraint: usize,
        /// Its slack at the time of verification
        slack: f64,
    },
}

/// Result type for solver operations.
pub type VpscResult<T> = Result<T, VpscError>;
