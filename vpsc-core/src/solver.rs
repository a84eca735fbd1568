//! Batch solver: satisfy then refine.
//!
//! `satisfy` produces a feasible assignment by sweeping the variables in a
//! topological order of the constraint graph and merging blocks across
//! violated constraints, most violated first. `refine` then drives the
//! feasible point to the optimum by repeatedly splitting blocks across the
//! active tree edge with the most negative Lagrange multiplier, until a
//! full pass finds nothing to split.

use crate::blocks::BlockSet;
use crate::error::{VpscError, VpscResult};
use crate::problem::{self, Constraint, SolverSettings, Variable};

/// Slack above this bound counts as feasible; marginally negative slack is
/// numeric drift, not a violation.
pub(crate) const ZERO_UPPERBOUND: f64 = -1e-10;

/// A Lagrange multiplier below this bound marks an active constraint worth
/// splitting on.
pub(crate) const LAGRANGIAN_TOLERANCE: f64 = -1e-4;

/// Counters describing the work done by a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolveStats {
    /// Block merges performed
    pub merges: usize,
    /// Block splits performed
    pub splits: usize,
    /// Live blocks in the current partition
    pub blocks: usize,
}

/// Batch VPSC solver.
pub struct Solver {
    pub(crate) vars: Vec<Variable>,
    pub(crate) cs: Vec<Constraint>,
    pub(crate) bs: BlockSet,
    pub(crate) settings: SolverSettings,
}

impl Solver {
    /// Build a solver over the given problem with default settings.
    ///
    /// Validates the input, rebuilds each variable's constraint adjacency
    /// from the constraint vector (overwriting any prior content), and
    /// places every variable in its own block at its desired position.
    pub fn new(vars: Vec<Variable>, cs: Vec<Constraint>) -> VpscResult<Self> {
        Self::with_settings(vars, cs, SolverSettings::default())
    }

    /// Build a solver with explicit settings.
    pub fn with_settings(
        mut vars: Vec<Variable>,
        cs: Vec<Constraint>,
        settings: SolverSettings,
    ) -> VpscResult<Self> {
        problem::validate(&vars, &cs)?;
        for v in vars.iter_mut() {
            v.in_constraints.clear();
            v.out_constraints.clear();
        }
        for (ci, c) in cs.iter().enumerate() {
            vars[c.left].out_constraints.push(ci);
            vars[c.right].in_constraints.push(ci);
        }
        let bs = BlockSet::new(&mut vars);
        Ok(Self {
            vars,
            cs,
            bs,
            settings,
        })
    }

    /// Produce a feasible (though not necessarily optimal) solution.
    ///
    /// Sweeps the blocks in the partial order defined by the constraint
    /// graph, merging across violated incoming constraints so that every
    /// constraint to the left of the current block holds when its turn
    /// comes. Returns whether any constraint ended up active, or
    /// [`VpscError::UnsatisfiedConstraint`] if a violation survives the
    /// sweep (which only happens for cyclic inputs).
    pub fn satisfy(&mut self) -> VpscResult<bool> {
        let order = BlockSet::total_order(&self.vars, &self.cs);
        for v in order {
            let b = self.vars[v].block;
            if !self.bs.blocks[b].deleted {
                self.bs.merge_left(b, &mut self.vars, &mut self.cs);
            }
        }
        self.bs.cleanup(&mut self.vars);

        let active = self.cs.iter().any(|c| c.is_active());
        self.verify_feasibility()?;
        self.copy_result();
        Ok(active)
    }

    /// Refine a feasible solution to optimality.
    ///
    /// Each pass recomputes block boundary structures and Lagrange
    /// multipliers; a block whose minimum multiplier falls below the split
    /// tolerance is split and the pass restarts. Stops when a complete
    /// pass finds no split, or after `max_refine_iterations` passes.
    pub fn refine(&mut self) -> VpscResult<()> {
        let mut solved = false;
        let mut tries = self.settings.max_refine_iterations;
        while !solved && tries > 0 {
            solved = true;
            tries -= 1;
            for b in 0..self.bs.blocks.len() {
                if self.bs.blocks[b].deleted {
                    continue;
                }
                let (vars, cs) = (&self.vars, &self.cs);
                self.bs.blocks[b].set_up_in_constraints(vars, cs);
                self.bs.blocks[b].set_up_out_constraints(vars, cs);
            }
            for b in 0..self.bs.blocks.len() {
                if self.bs.blocks[b].deleted {
                    continue;
                }
                let min = self.bs.blocks[b].find_min_lm(&self.vars, &mut self.cs);
                if let Some(c) = min {
                    if self.cs[c].lm < LAGRANGIAN_TOLERANCE {
                        log::debug!("refine: split on {} (lm {:e})", self.cs[c], self.cs[c].lm);
                        self.bs.split(b, c, &mut self.vars, &mut self.cs);
                        self.bs.cleanup(&mut self.vars);
                        // The split altered the block set; restart the pass.
                        solved = false;
                        break;
                    }
                }
            }
        }
        self.verify_feasibility()
    }

    /// Calculate the optimal solution: `satisfy` followed by `refine`.
    ///
    /// Returns true iff some variables are coupled by active constraints
    /// (the number of blocks is less than the number of variables).
    pub fn solve(&mut self) -> VpscResult<bool> {
        self.satisfy()?;
        self.refine()?;
        self.copy_result();
        Ok(self.bs.size() != self.vars.len())
    }

    /// The variables, with `final_position` valid after a solve.
    pub fn variables(&self) -> &[Variable] {
        &self.vars
    }

    /// The constraints; check `unsatisfiable` here after an incremental
    /// solve.
    pub fn constraints(&self) -> &[Constraint] {
        &self.cs
    }

    /// Final positions in variable order.
    pub fn positions(&self) -> Vec<f64> {
        self.vars.iter().map(|v| v.final_position).collect()
    }

    /// Update a variable's desired position; observed by the next solve.
    pub fn set_desired_position(&mut self, v: usize, position: f64) {
        self.vars[v].desired_position = position;
    }

    /// Work counters for the solve so far.
    pub fn stats(&self) -> SolveStats {
        SolveStats {
            merges: self.bs.merges,
            splits: self.bs.splits,
            blocks: self.bs.size(),
        }
    }

    /// Whether the directed constraint graph over the variables contains a
    /// cycle. A cyclic inequality system with positive total gap has no
    /// feasible solution; this probe lets callers check inputs up front
    /// instead of waiting for an unsatisfied-constraint error.
    pub fn constraint_graph_is_cyclic(&self) -> bool {
        let mut indegree = vec![0usize; self.vars.len()];
        for c in &self.cs {
            indegree[c.right] += 1;
        }
        let mut stack: Vec<usize> = (0..self.vars.len())
            .filter(|&v| indegree[v] == 0)
            .collect();
        let mut seen = 0;
        while let Some(v) = stack.pop() {
            seen += 1;
            for &ci in &self.vars[v].out_constraints {
                let w = self.cs[ci].right;
                indegree[w] -= 1;
                if indegree[w] == 0 {
                    stack.push(w);
                }
            }
        }
        seen != self.vars.len()
    }

    /// Whether the graph of blocks linked by boundary constraints contains
    /// a cycle. Rebuilds the boundary lists of every live block.
    pub fn block_graph_is_cyclic(&mut self) -> bool {
        let n = self.bs.blocks.len();
        for b in 0..n {
            if self.bs.blocks[b].deleted {
                continue;
            }
            let (vars, cs) = (&self.vars, &self.cs);
            self.bs.blocks[b].set_up_in_constraints(vars, cs);
            self.bs.blocks[b].set_up_out_constraints(vars, cs);
        }

        let mut indegree = vec![0usize; n];
        let mut live = 0;
        for b in 0..n {
            if self.bs.blocks[b].deleted {
                continue;
            }
            live += 1;
            for &ci in &self.bs.blocks[b].in_list {
                if self.vars[self.cs[ci].left].block != self.vars[self.cs[ci].right].block {
                    indegree[b] += 1;
                }
            }
        }
        let mut stack: Vec<usize> = (0..n)
            .filter(|&b| !self.bs.blocks[b].deleted && indegree[b] == 0)
            .collect();
        let mut seen = 0;
        while let Some(b) = stack.pop() {
            seen += 1;
            for &ci in &self.bs.blocks[b].out_list {
                let left = self.vars[self.cs[ci].left].block;
                let right = self.vars[self.cs[ci].right].block;
                if left == right {
                    continue;
                }
                indegree[right] -= 1;
                if indegree[right] == 0 {
                    stack.push(right);
                }
            }
        }
        seen != live
    }

    /// Check that every constraint not marked unsatisfiable holds within
    /// tolerance at the current block positions.
    pub(crate) fn verify_feasibility(&self) -> VpscResult<()> {
        for ci in 0..self.cs.len() {
            let slack = self.bs.slack(&self.vars, &self.cs, ci);
            if slack < ZERO_UPPERBOUND {
                log::warn!("unsatisfied constraint: {}", self.cs[ci]);
                return Err(VpscError::UnsatisfiedConstraint {
                    constraint: ci,
                    slack,
                });
            }
        }
        Ok(())
    }

    /// Store each variable's current position in its `final_position`.
    pub(crate) fn copy_result(&mut self) {
        for v in 0..self.vars.len() {
            let position = self.bs.position(&self.vars, v);
            debug_assert!(position.is_finite());
            self.vars[v].final_position = position;
        }
    }
}
