//! Blocks of variables whose relative positions are fixed by active
//! constraints.
//!
//! A block is a connected subtree of variables joined by active separation
//! constraints held tight. Each member variable keeps an `offset` in the
//! block's local frame; the block's `posn` places the whole frame, so a
//! member's position is `posn + offset`. The block tracks its total weight
//! and the cached weighted-position sum `wposn = sum(w_i * (desired_i -
//! offset_i))`, whose quotient `wposn / weight` is the cost-minimizing
//! position for the block's current internal layout.
//!
//! Traversals of the active-constraint tree (multiplier passes, path
//! searches, component discovery) walk the member variables' adjacency
//! lists filtered on the `active` flag; an active constraint always has
//! both endpoints in the same block, so traversal never escapes it.

use crate::problem::{Constraint, Variable};
use crate::solver::LAGRANGIAN_TOLERANCE;

/// A connected subtree of variables under active constraints.
#[derive(Debug, Clone, Default)]
pub(crate) struct Block {
    /// Member variable indices; the first insertion defines the local
    /// origin with offset zero.
    pub(crate) vars: Vec<usize>,

    /// Position of the block's local frame
    pub(crate) posn: f64,

    /// Sum of member weights
    pub(crate) weight: f64,

    /// Cached weighted-position sum
    pub(crate) wposn: f64,

    /// Active constraints forming the spanning tree over `vars`
    pub(crate) active: Vec<usize>,

    /// Tombstone bit; deleted blocks are skipped by iteration and removed
    /// by the arena's compaction pass
    pub(crate) deleted: bool,

    /// Boundary constraints entering the block, rebuilt lazily and scanned
    /// for the minimum slack
    pub(crate) in_list: Vec<usize>,

    /// Boundary constraints leaving the block
    pub(crate) out_list: Vec<usize>,
}

impl Block {
    /// Add a member, keeping `weight`, `wposn` and `posn` exact.
    pub(crate) fn add_variable(&mut self, v: usize, block_ix: usize, vars: &mut [Variable]) {
        vars[v].block = block_ix;
        self.weight += vars[v].weight;
        self.wposn += vars[v].weight * (vars[v].desired_position - vars[v].offset);
        self.posn = self.wposn / self.weight;
        self.vars.push(v);
    }

    /// Recompute `wposn` from the members and move the block to its
    /// cost-minimizing position `wposn / weight`.
    pub(crate) fn update_weighted_position(&mut self, vars: &[Variable]) {
        self.wposn = self
            .vars
            .iter()
            .map(|&v| vars[v].weight * (vars[v].desired_position - vars[v].offset))
            .sum();
        self.posn = self.wposn / self.weight;
    }

    /// Weighted squared deviation of the members from their desired
    /// positions.
    pub(crate) fn cost(&self, vars: &[Variable]) -> f64 {
        self.vars
            .iter()
            .map(|&v| {
                let d = self.posn + vars[v].offset - vars[v].desired_position;
                vars[v].weight * d * d
            })
            .sum()
    }

    /// Rebuild the list of boundary constraints entering this block.
    pub(crate) fn set_up_in_constraints(&mut self, vars: &[Variable], cs: &[Constraint]) {
        self.in_list.clear();
        for &v in &self.vars {
            for &ci in &vars[v].in_constraints {
                if vars[cs[ci].left].block != vars[v].block {
                    self.in_list.push(ci);
                }
            }
        }
    }

    /// Rebuild the list of boundary constraints leaving this block.
    pub(crate) fn set_up_out_constraints(&mut self, vars: &[Variable], cs: &[Constraint]) {
        self.out_list.clear();
        for &v in &self.vars {
            for &ci in &vars[v].out_constraints {
                if vars[cs[ci].right].block != vars[v].block {
                    self.out_list.push(ci);
                }
            }
        }
    }

    /// Compute Lagrange multipliers for every active tree edge.
    ///
    /// Each variable contributes `dfdv = 2 * w * (position - desired)`;
    /// a postorder pass over the tree rooted at `root` assigns each edge
    /// the signed sum of `dfdv` over the subtree on its child side
    /// (positive when the child is the edge's right endpoint). Returns the
    /// traversal as `(variable, parent edge)` pairs with children after
    /// their parents, for reuse by path searches.
    fn compute_lagrangians(
        &self,
        root: usize,
        vars: &[Variable],
        cs: &mut [Constraint],
    ) -> Vec<(usize, Option<(usize, usize)>)> {
        for &ci in &self.active {
            cs[ci].lm = 0.0;
        }

        let mut order: Vec<(usize, Option<(usize, usize)>)> = Vec::with_capacity(self.vars.len());
        let mut visited = vec![false; vars.len()];
        let mut stack: Vec<(usize, Option<(usize, usize)>)> = vec![(root, None)];
        visited[root] = true;
        while let Some((v, parent)) = stack.pop() {
            order.push((v, parent));
            for &ci in &vars[v].out_constraints {
                let w = cs[ci].right;
                if cs[ci].active && !visited[w] {
                    visited[w] = true;
                    stack.push((w, Some((ci, v))));
                }
            }
            for &ci in &vars[v].in_constraints {
                let w = cs[ci].left;
                if cs[ci].active && !visited[w] {
                    visited[w] = true;
                    stack.push((w, Some((ci, v))));
                }
            }
        }
        debug_assert_eq!(order.len(), self.vars.len());

        let mut dfdv = vec![0.0; vars.len()];
        for &(v, _) in &order {
            dfdv[v] = 2.0 * vars[v].weight * (self.posn + vars[v].offset - vars[v].desired_position);
        }
        for &(v, parent) in order.iter().rev() {
            if let Some((ci, p)) = parent {
                let subtree = dfdv[v];
                cs[ci].lm = if cs[ci].right == v { subtree } else { -subtree };
                dfdv[p] += subtree;
            }
        }

        order
    }

    /// Active tree edge with the smallest Lagrange multiplier, excluding
    /// equality constraints (which are never split candidates). `None` for
    /// a singleton block.
    pub(crate) fn find_min_lm(&self, vars: &[Variable], cs: &mut [Constraint]) -> Option<usize> {
        if self.active.is_empty() {
            return None;
        }
        self.compute_lagrangians(self.vars[0], vars, cs);
        let mut min: Option<usize> = None;
        for &ci in &self.active {
            if cs[ci].equality {
                continue;
            }
            match min {
                Some(m) if cs[ci].lm >= cs[m].lm => {}
                _ => min = Some(ci),
            }
        }
        min
    }

    /// Best constraint to split on so that the subtree containing `rv` can
    /// move right relative to the subtree containing `lv`.
    ///
    /// Searches the tree path from `lv` to `rv` for the most negative
    /// multiplier among edges oriented along the path (an edge traversed
    /// right-to-left points the wrong way: deactivating it only lets the
    /// two sides separate further in the unhelpful direction). Returns
    /// `None` when no candidate is below the split tolerance, in which
    /// case the violated constraint that prompted the search cannot be
    /// satisfied by restructuring this block.
    pub(crate) fn find_min_lm_between(
        &self,
        lv: usize,
        rv: usize,
        vars: &[Variable],
        cs: &mut [Constraint],
    ) -> Option<usize> {
        let order = self.compute_lagrangians(lv, vars, cs);
        let mut parent: Vec<Option<(usize, usize)>> = vec![None; vars.len()];
        for &(v, p) in &order {
            parent[v] = p;
        }

        let mut min: Option<usize> = None;
        let mut v = rv;
        while v != lv {
            let Some((ci, p)) = parent[v] else {
                return None;
            };
            // Walking up from rv, the path direction at this edge is
            // parent-to-child, so the edge is forward iff the child is its
            // right endpoint.
            if cs[ci].right == v && !cs[ci].equality && cs[ci].lm < LAGRANGIAN_TOLERANCE {
                match min {
                    Some(m) if cs[ci].lm >= cs[m].lm => {}
                    _ => min = Some(ci),
                }
            }
            v = p;
        }
        min
    }

    /// Whether the active tree, restricted to directed edges, contains a
    /// path from `from` to `to`. Used to detect cycles before activating a
    /// new constraint between two members.
    pub(crate) fn is_active_directed_path_between(
        &self,
        from: usize,
        to: usize,
        vars: &[Variable],
        cs: &[Constraint],
    ) -> bool {
        if from == to {
            return true;
        }
        let mut visited = vec![false; vars.len()];
        let mut stack = vec![from];
        visited[from] = true;
        while let Some(v) = stack.pop() {
            for &ci in &vars[v].out_constraints {
                if !cs[ci].active {
                    continue;
                }
                let w = cs[ci].right;
                if w == to {
                    return true;
                }
                if !visited[w] {
                    visited[w] = true;
                    stack.push(w);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{Constraint, Variable};

    /// Two variables held one apart in a single block, positioned so that
    /// the block sits at its weighted centroid.
    fn two_var_block(d0: f64, d1: f64) -> (Vec<Variable>, Vec<Constraint>, Block) {
        let mut vars = vec![Variable::new(d0), Variable::new(d1)];
        let mut cs = vec![Constraint::new(0, 1, 1.0)];
        cs[0].active = true;
        vars[0].out_constraints.push(0);
        vars[1].in_constraints.push(0);
        vars[1].offset = 1.0;

        let mut b = Block::default();
        b.active.push(0);
        b.add_variable(0, 0, &mut vars);
        b.add_variable(1, 0, &mut vars);
        (vars, cs, b)
    }

    #[test]
    fn test_add_variable_tracks_centroid() {
        let (vars, _cs, b) = two_var_block(0.0, 0.0);
        assert_eq!(b.weight, 2.0);
        // wposn = 1*(0-0) + 1*(0-1) = -1, posn = -0.5
        assert!((b.posn + 0.5).abs() < 1e-12);
        // positions -0.5 and 0.5, cost = 0.25 + 0.25
        assert!((b.cost(&vars) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_update_weighted_position_matches_incremental() {
        let (vars, _cs, mut b) = two_var_block(3.0, -1.0);
        let incremental = b.posn;
        b.update_weighted_position(&vars);
        assert!((b.posn - incremental).abs() < 1e-12);
    }

    #[test]
    fn test_lagrange_multiplier_sign() {
        // Both want 0: the constraint genuinely binds, multiplier positive.
        let (vars, mut cs, b) = two_var_block(0.0, 0.0);
        let min = b.find_min_lm(&vars, &mut cs);
        assert_eq!(min, Some(0));
        assert!(cs[0].lm > 0.0, "binding constraint must have lm > 0, got {}", cs[0].lm);

        // Left wants 0, right wants 10: the pair would satisfy the gap on
        // its own, so holding it tight has a negative multiplier.
        let (vars, mut cs, b) = two_var_block(0.0, 10.0);
        let min = b.find_min_lm(&vars, &mut cs);
        assert_eq!(min, Some(0));
        assert!(cs[0].lm < 0.0, "removable constraint must have lm < 0, got {}", cs[0].lm);
    }

    #[test]
    fn test_find_min_lm_skips_equalities() {
        let (vars, mut cs, b) = two_var_block(0.0, 10.0);
        cs[0].equality = true;
        assert_eq!(b.find_min_lm(&vars, &mut cs), None);
    }

    #[test]
    fn test_directed_path_detection() {
        let (vars, cs, b) = two_var_block(0.0, 0.0);
        assert!(b.is_active_directed_path_between(0, 1, &vars, &cs));
        assert!(!b.is_active_directed_path_between(1, 0, &vars, &cs));
    }
}
