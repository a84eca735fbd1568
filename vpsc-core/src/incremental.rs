//! Incremental (warm-start) solver.
//!
//! Designed for the outer loop of a gradient-projection layout driver:
//! the caller updates desired positions between solves and the solver
//! re-converges while reusing the block structure it already has. Each
//! `satisfy` first moves every block rigidly to its cost-minimizing
//! position and splits blocks whose internal multipliers say an active
//! constraint has become counterproductive, then merges across violated
//! constraints until none remain.
//!
//! A constraint that cannot be satisfied (its activation would close a
//! directed cycle, or no edge on the relevant tree path can be relaxed)
//! is flagged `unsatisfiable` and thereafter ignored; callers should
//! inspect the flags after solving.

use crate::error::VpscResult;
use crate::problem::{Constraint, SolverSettings, Variable};
use crate::solver::{SolveStats, Solver, LAGRANGIAN_TOLERANCE, ZERO_UPPERBOUND};

/// Cost change below which repeated satisfy passes are considered
/// converged.
const CONVERGENCE_TOLERANCE: f64 = 1e-4;

/// Incremental VPSC solver.
pub struct IncSolver {
    solver: Solver,
    /// Constraints not currently active in any block's tree
    inactive: Vec<usize>,
}

impl IncSolver {
    /// Build an incremental solver with default settings.
    pub fn new(vars: Vec<Variable>, cs: Vec<Constraint>) -> VpscResult<Self> {
        Self::with_settings(vars, cs, SolverSettings::default())
    }

    /// Build an incremental solver with explicit settings.
    pub fn with_settings(
        vars: Vec<Variable>,
        cs: Vec<Constraint>,
        settings: SolverSettings,
    ) -> VpscResult<Self> {
        let mut solver = Solver::with_settings(vars, cs, settings)?;
        for c in solver.cs.iter_mut() {
            c.active = false;
        }
        let inactive = (0..solver.cs.len()).collect();
        Ok(Self { solver, inactive })
    }

    /// Solve to convergence: satisfy, then repeat satisfy until the total
    /// cost stops changing. Returns true iff some variables are coupled by
    /// active constraints.
    pub fn solve(&mut self) -> VpscResult<bool> {
        self.satisfy()?;
        let mut last_cost = f64::MAX;
        let mut cost = self.solver.bs.cost(&self.solver.vars);
        while (last_cost - cost).abs() > CONVERGENCE_TOLERANCE {
            self.satisfy()?;
            last_cost = cost;
            cost = self.solver.bs.cost(&self.solver.vars);
            log::trace!(
                "incremental solve: blocks={}, cost={}",
                self.solver.bs.size(),
                cost
            );
        }
        self.solver.copy_result();
        Ok(self.solver.bs.size() != self.solver.vars.len())
    }

    /// One warm-start pass: move and split blocks, then merge across the
    /// most violated constraint until no violation remains.
    ///
    /// When the most violated constraint lies inside a single block the
    /// block must first be split across an active constraint on the path
    /// between the two variables; if the violated constraint is still
    /// violated afterwards the two halves are merged back across it.
    pub fn satisfy(&mut self) -> VpscResult<bool> {
        self.split_blocks();

        while let Some(ci) = self.most_violated() {
            let (equality, active) = {
                let c = &self.solver.cs[ci];
                (c.equality, c.active)
            };
            let slack = self.solver.bs.slack(&self.solver.vars, &self.solver.cs, ci);
            if !(equality || (slack < ZERO_UPPERBOUND && !active)) {
                break;
            }
            debug_assert!(!active);

            let Solver { vars, cs, bs, .. } = &mut self.solver;
            let lb = vars[cs[ci].left].block;
            let rb = vars[cs[ci].right].block;
            if lb != rb {
                bs.merge_across(ci, vars, cs);
            } else {
                if bs.blocks[lb].is_active_directed_path_between(cs[ci].right, cs[ci].left, vars, cs)
                {
                    // Activating ci would close a cycle; relax it instead.
                    log::debug!("cycle: relaxing {}", cs[ci]);
                    cs[ci].unsatisfiable = true;
                    continue;
                }
                match bs.split_between(lb, cs[ci].left, cs[ci].right, vars, cs) {
                    Some((sc, _l_ix, _r_ix)) => {
                        debug_assert!(!cs[sc].active);
                        self.inactive.push(sc);
                        if bs.slack(vars, cs, ci) >= 0.0 {
                            // The split satisfied ci; leave both halves in
                            // place and reconsider ci later.
                            debug_assert!(!cs[ci].active);
                            self.inactive.push(ci);
                        } else {
                            bs.merge_across(ci, vars, cs);
                        }
                    }
                    None => {
                        log::debug!("no beneficial split: relaxing {}", cs[ci]);
                        cs[ci].unsatisfiable = true;
                        continue;
                    }
                }
            }
            self.solver.bs.cleanup(&mut self.solver.vars);
        }
        self.solver.bs.cleanup(&mut self.solver.vars);

        let active = self.solver.cs.iter().any(|c| c.is_active());
        self.solver.verify_feasibility()?;
        self.solver.copy_result();
        Ok(active)
    }

    /// Refine the current solution by splitting blocks whose multipliers
    /// have gone negative; see [`Solver::refine`].
    pub fn refine(&mut self) -> VpscResult<()> {
        self.solver.refine()
    }

    /// Move every live block rigidly to its cost-minimizing position.
    pub(crate) fn move_blocks(&mut self) {
        for b in self.solver.bs.blocks.iter_mut() {
            if !b.deleted {
                b.update_weighted_position(&self.solver.vars);
            }
        }
    }

    /// Move blocks, then split any block whose minimum internal multiplier
    /// indicates an active constraint is holding its members together
    /// against the objective. Split constraints return to the inactive
    /// list.
    pub(crate) fn split_blocks(&mut self) {
        self.move_blocks();
        let Solver { vars, cs, bs, .. } = &mut self.solver;
        let n = bs.blocks.len();
        for b in 0..n {
            if bs.blocks[b].deleted {
                continue;
            }
            let Some(v) = bs.blocks[b].find_min_lm(vars, cs) else {
                continue;
            };
            if cs[v].lm < LAGRANGIAN_TOLERANCE {
                debug_assert!(!cs[v].equality);
                log::debug!("split point: {} (lm {:e})", cs[v], cs[v].lm);
                let (l_ix, r_ix) = bs.split(b, v, vars, cs);
                bs.blocks[l_ix].update_weighted_position(vars);
                bs.blocks[r_ix].update_weighted_position(vars);
                debug_assert!(!cs[v].active);
                self.inactive.push(v);
            }
        }
        bs.cleanup(vars);
    }

    /// Most violated inactive constraint, or the first equality
    /// constraint encountered. The selected constraint is removed from the
    /// inactive list only when it is an equality or a true violation.
    /// Returns `None` on an empty list; a satisfied minimum is returned
    /// but kept in the list, and the satisfy loop's entry condition stops
    /// on it.
    fn most_violated(&mut self) -> Option<usize> {
        let Solver { vars, cs, bs, .. } = &self.solver;
        let mut min_slack = f64::MAX;
        let mut found: Option<usize> = None;
        let mut delete_point = 0;
        for (i, &ci) in self.inactive.iter().enumerate() {
            let slack = bs.slack(vars, cs, ci);
            if cs[ci].equality || slack < min_slack {
                min_slack = slack;
                found = Some(ci);
                delete_point = i;
                if cs[ci].equality {
                    break;
                }
            }
        }
        if let Some(ci) = found {
            if (min_slack < ZERO_UPPERBOUND && !cs[ci].active) || cs[ci].equality {
                self.inactive.swap_remove(delete_point);
            }
        }
        found
    }

    /// The variables, with `final_position` valid after a solve.
    pub fn variables(&self) -> &[Variable] {
        self.solver.variables()
    }

    /// The constraints; check `unsatisfiable` here after a solve.
    pub fn constraints(&self) -> &[Constraint] {
        self.solver.constraints()
    }

    /// Final positions in variable order.
    pub fn positions(&self) -> Vec<f64> {
        self.solver.positions()
    }

    /// Update a variable's desired position; observed by the next solve.
    pub fn set_desired_position(&mut self, v: usize, position: f64) {
        self.solver.set_desired_position(v, position);
    }

    /// Work counters for the solve so far.
    pub fn stats(&self) -> SolveStats {
        self.solver.stats()
    }
}
