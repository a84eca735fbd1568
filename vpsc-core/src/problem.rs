//! Problem data structures and validation.
//!
//! A VPSC instance is a set of one-dimensional variables, each with a
//! desired position and a positive weight, and a set of separation
//! constraints `right - left >= gap` (or `right - left == gap` for the
//! equality flavor). The solver minimizes the weighted sum of squared
//! deviations from desired positions subject to all constraints.
//!
//! Variables and constraints refer to each other by index: a constraint
//! stores the indices of its two endpoint variables, and the caller keeps
//! the same indices to read results back after a solve.

use std::fmt;

use crate::error::{VpscError, VpscResult};

/// A one-dimensional point variable.
///
/// The caller-facing fields are `desired_position`, `weight` and (after a
/// solve) `final_position`. The remaining fields are solver working state:
/// `offset` is the variable's position within its block's local frame,
/// `block` is the index of the owning block in the solver's arena, and the
/// adjacency lists are rebuilt from the constraint vector on solver
/// construction.
#[derive(Debug, Clone)]
pub struct Variable {
    /// Position this variable would take with no constraints
    pub desired_position: f64,

    /// Weight of this variable's term in the objective, must be positive
    pub weight: f64,

    /// Result of the last solve
    pub final_position: f64,

    /// Offset from the owning block's position
    pub(crate) offset: f64,

    /// Index of the owning block in the solver's block arena
    pub(crate) block: usize,

    /// Constraints where this variable is the right endpoint
    pub(crate) in_constraints: Vec<usize>,

    /// Constraints where this variable is the left endpoint
    pub(crate) out_constraints: Vec<usize>,
}

impl Variable {
    /// Create a unit-weight variable.
    pub fn new(desired_position: f64) -> Self {
        Self::with_weight(desired_position, 1.0)
    }

    /// Create a variable with an explicit weight.
    pub fn with_weight(desired_position: f64, weight: f64) -> Self {
        Self {
            desired_position,
            weight,
            final_position: desired_position,
            offset: 0.0,
            block: 0,
            in_constraints: Vec::new(),
            out_constraints: Vec::new(),
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(d={}, w={})", self.desired_position, self.weight)
    }
}

/// A separation constraint between two variables.
///
/// Reads as `right - left >= gap`, or `right - left == gap` when
/// `equality` is set. `active` marks the constraint as a tree edge inside
/// some block; the Lagrange multiplier is valid immediately after a
/// multiplier pass over that tree (e.g. at the end of a solve).
#[derive(Debug, Clone)]
pub struct Constraint {
    /// Index of the left endpoint variable
    pub left: usize,

    /// Index of the right endpoint variable
    pub right: usize,

    /// Minimum (or exact, for equalities) separation
    pub gap: f64,

    /// Whether the separation must hold exactly
    pub equality: bool,

    /// Set by the incremental solver when activating this constraint would
    /// close a cycle, or when no beneficial split exists to satisfy it.
    /// Flagged constraints are exempt from feasibility verification.
    pub unsatisfiable: bool,

    pub(crate) active: bool,

    pub(crate) lm: f64,
}

impl Constraint {
    /// Create an inequality constraint `right - left >= gap`.
    pub fn new(left: usize, right: usize, gap: f64) -> Self {
        Self {
            left,
            right,
            gap,
            equality: false,
            unsatisfiable: false,
            active: false,
            lm: 0.0,
        }
    }

    /// Create an equality constraint `right - left == gap`.
    pub fn new_equality(left: usize, right: usize, gap: f64) -> Self {
        Self {
            equality: true,
            ..Self::new(left, right, gap)
        }
    }

    /// Whether this constraint is currently held tight inside a block.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Lagrange multiplier from the most recent multiplier pass.
    pub fn lagrange_multiplier(&self) -> f64 {
        self.lm
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rel = if self.equality { "==" } else { "<=" };
        write!(f, "v{} + {} {} v{}", self.left, self.gap, rel, self.right)?;
        if self.unsatisfiable {
            write!(f, " (unsatisfiable)")?;
        }
        Ok(())
    }
}

/// Solver settings.
#[derive(Debug, Clone)]
pub struct SolverSettings {
    /// Maximum number of refinement passes in the batch solver. Refinement
    /// normally converges long before this; the cap guards against
    /// pathological oscillation. Reaching it is not an error: the solver
    /// returns the best solution found.
    pub max_refine_iterations: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_refine_iterations: 100,
        }
    }
}

/// Validate problem dimensions and constraint endpoints.
pub(crate) fn validate(vars: &[Variable], cs: &[Constraint]) -> VpscResult<()> {
    if vars.is_empty() {
        return Err(VpscError::InvalidProblem(
            "at least one variable is required".to_string(),
        ));
    }

    for (i, v) in vars.iter().enumerate() {
        if !v.weight.is_finite() || v.weight <= 0.0 {
            return Err(VpscError::InvalidProblem(format!(
                "variable {} has nonpositive or nonfinite weight {}",
                i, v.weight
            )));
        }
        if !v.desired_position.is_finite() {
            return Err(VpscError::InvalidProblem(format!(
                "variable {} has nonfinite desired position {}",
                i, v.desired_position
            )));
        }
    }

    for (i, c) in cs.iter().enumerate() {
        if c.left >= vars.len() || c.right >= vars.len() {
            return Err(VpscError::InvalidProblem(format!(
                "constraint {} references variable out of range (n={})",
                i,
                vars.len()
            )));
        }
        if c.left == c.right {
            return Err(VpscError::InvalidProblem(format!(
                "constraint {} has identical endpoints v{}",
                i, c.left
            )));
        }
        if !c.gap.is_finite() {
            return Err(VpscError::InvalidProblem(format!(
                "constraint {} has nonfinite gap {}",
                i, c.gap
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_simple_problem() {
        let vars = vec![Variable::new(0.0), Variable::with_weight(1.0, 2.0)];
        let cs = vec![Constraint::new(0, 1, 1.0)];
        assert!(validate(&vars, &cs).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_variables() {
        assert!(matches!(
            validate(&[], &[]),
            Err(VpscError::InvalidProblem(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_weight() {
        let vars = vec![Variable::with_weight(0.0, 0.0)];
        assert!(validate(&vars, &[]).is_err());

        let vars = vec![Variable::with_weight(0.0, f64::NAN)];
        assert!(validate(&vars, &[]).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_constraints() {
        let vars = vec![Variable::new(0.0), Variable::new(0.0)];

        // Out-of-range endpoint
        assert!(validate(&vars, &[Constraint::new(0, 2, 1.0)]).is_err());
        // Self-loop
        assert!(validate(&vars, &[Constraint::new(1, 1, 1.0)]).is_err());
        // Nonfinite gap
        assert!(validate(&vars, &[Constraint::new(0, 1, f64::INFINITY)]).is_err());
    }

    #[test]
    fn test_constraint_display() {
        assert_eq!(Constraint::new(0, 1, 2.0).to_string(), "v0 + 2 <= v1");
        assert_eq!(Constraint::new_equality(3, 4, 0.5).to_string(), "v3 + 0.5 == v4");
    }
}
