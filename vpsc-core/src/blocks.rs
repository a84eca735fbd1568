//! The block arena: the dynamic partition of variables into blocks.
//!
//! Blocks live in a `Vec` arena addressed by index; `Variable::block`
//! holds the owning index. Merge and split tombstone the blocks they
//! retire instead of removing them, because the surrounding sweeps may
//! still be iterating the arena; `cleanup` compacts the tombstones away
//! and rewrites the member back-references. Iteration over the arena must
//! skip deleted blocks.

use crate::block::Block;
use crate::problem::{Constraint, Variable};

/// The set of blocks partitioning the variables.
#[derive(Debug, Default)]
pub(crate) struct BlockSet {
    pub(crate) blocks: Vec<Block>,

    /// Number of merges performed since construction
    pub(crate) merges: usize,

    /// Number of splits performed since construction
    pub(crate) splits: usize,
}

impl BlockSet {
    /// One block per variable. Clears any stale offsets left over from a
    /// previous solve and seeds each block's boundary lists from the
    /// variable's adjacency (every constraint crosses a boundary when all
    /// blocks are singletons).
    pub(crate) fn new(vars: &mut [Variable]) -> Self {
        let mut blocks = Vec::with_capacity(vars.len());
        for v in 0..vars.len() {
            let ix = blocks.len();
            vars[v].offset = 0.0;
            let mut b = Block::default();
            b.add_variable(v, ix, vars);
            b.in_list = vars[v].in_constraints.clone();
            b.out_list = vars[v].out_constraints.clone();
            blocks.push(b);
        }
        Self {
            blocks,
            merges: 0,
            splits: 0,
        }
    }

    /// Add a block to the arena, returning its index.
    pub(crate) fn insert(&mut self, b: Block) -> usize {
        let ix = self.blocks.len();
        self.blocks.push(b);
        ix
    }

    /// Number of live (non-deleted) blocks.
    pub(crate) fn size(&self) -> usize {
        self.blocks.iter().filter(|b| !b.deleted).count()
    }

    /// Remove tombstoned blocks and rewrite the member back-references of
    /// the survivors. Must not be called while a caller is iterating the
    /// arena.
    pub(crate) fn cleanup(&mut self, vars: &mut [Variable]) {
        self.blocks.retain(|b| !b.deleted);
        for (ix, b) in self.blocks.iter().enumerate() {
            for &v in &b.vars {
                vars[v].block = ix;
            }
        }
    }

    /// Total weighted cost over live blocks.
    pub(crate) fn cost(&self, vars: &[Variable]) -> f64 {
        self.blocks
            .iter()
            .filter(|b| !b.deleted)
            .map(|b| b.cost(vars))
            .sum()
    }

    /// Current position of a variable: its block's position plus its
    /// offset in the block frame.
    pub(crate) fn position(&self, vars: &[Variable], v: usize) -> f64 {
        self.blocks[vars[v].block].posn + vars[v].offset
    }

    /// Slack of a constraint at the current positions.
    ///
    /// Unsatisfiable constraints report infinite slack so that violation
    /// scans and feasibility verification skip them without special cases;
    /// equalities report the negated absolute deviation so that any
    /// deviation counts as a violation.
    pub(crate) fn slack(&self, vars: &[Variable], cs: &[Constraint], ci: usize) -> f64 {
        let c = &cs[ci];
        if c.unsatisfiable {
            return f64::INFINITY;
        }
        let s = self.position(vars, c.right) - self.position(vars, c.left) - c.gap;
        if c.equality {
            -s.abs()
        } else {
            s
        }
    }

    /// Linear ordering of all variables consistent with the directed
    /// constraint graph (reverse DFS postorder over `left -> right`
    /// edges). With a cyclic input this still terminates and returns some
    /// ordering; the cycle surfaces later as an unsatisfied constraint.
    pub(crate) fn total_order(vars: &[Variable], cs: &[Constraint]) -> Vec<usize> {
        let mut order = Vec::with_capacity(vars.len());
        let mut visited = vec![false; vars.len()];
        for root in 0..vars.len() {
            if visited[root] {
                continue;
            }
            visited[root] = true;
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            while let Some(top) = stack.last_mut() {
                let (v, cursor) = *top;
                if cursor < vars[v].out_constraints.len() {
                    top.1 += 1;
                    let w = cs[vars[v].out_constraints[cursor]].right;
                    if !visited[w] {
                        visited[w] = true;
                        stack.push((w, 0));
                    }
                } else {
                    order.push(v);
                    stack.pop();
                }
            }
        }
        order.reverse();
        order
    }

    /// Most violated boundary constraint entering block `b`, with slack
    /// computed fresh at scan time. Entries whose endpoints have since
    /// ended up in the same block are skipped (they became internal
    /// through an earlier merge).
    fn find_min_in_constraint(
        &self,
        b: usize,
        vars: &[Variable],
        cs: &[Constraint],
    ) -> Option<usize> {
        let mut min: Option<(usize, f64)> = None;
        for &ci in &self.blocks[b].in_list {
            if vars[cs[ci].left].block == vars[cs[ci].right].block {
                continue;
            }
            let slack = self.slack(vars, cs, ci);
            match min {
                Some((_, best)) if slack >= best => {}
                _ => min = Some((ci, slack)),
            }
        }
        min.map(|(ci, _)| ci)
    }

    /// Merge `incoming` into `survivor` across constraint `ci`, shifting
    /// the incoming members' offsets by `d`. Activates `ci`, tombstones
    /// `incoming`, and leaves the survivor at the combined weighted
    /// centroid.
    fn merge_blocks(
        &mut self,
        survivor: usize,
        incoming: usize,
        ci: usize,
        d: f64,
        vars: &mut [Variable],
        cs: &mut [Constraint],
    ) {
        cs[ci].active = true;

        let inc_vars = std::mem::take(&mut self.blocks[incoming].vars);
        let inc_active = std::mem::take(&mut self.blocks[incoming].active);
        let inc_in = std::mem::take(&mut self.blocks[incoming].in_list);
        let inc_out = std::mem::take(&mut self.blocks[incoming].out_list);
        let inc_weight = self.blocks[incoming].weight;
        let inc_wposn = self.blocks[incoming].wposn;
        self.blocks[incoming].deleted = true;

        for &v in &inc_vars {
            vars[v].block = survivor;
            vars[v].offset += d;
        }

        let b = &mut self.blocks[survivor];
        b.wposn += inc_wposn - d * inc_weight;
        b.weight += inc_weight;
        b.posn = b.wposn / b.weight;
        b.vars.extend(inc_vars);
        b.active.extend(inc_active);
        b.active.push(ci);
        b.in_list.extend(inc_in);
        b.out_list.extend(inc_out);

        self.merges += 1;
    }

    /// Merge across a violated constraint whose endpoints lie in two
    /// different blocks; the left endpoint's block survives. Returns the
    /// surviving index.
    pub(crate) fn merge_across(
        &mut self,
        ci: usize,
        vars: &mut [Variable],
        cs: &mut [Constraint],
    ) -> usize {
        let lb = vars[cs[ci].left].block;
        let rb = vars[cs[ci].right].block;
        debug_assert_ne!(lb, rb);
        let d = vars[cs[ci].left].offset + cs[ci].gap - vars[cs[ci].right].offset;
        self.merge_blocks(lb, rb, ci, d, vars, cs);
        lb
    }

    /// Batch construction sweep: repeatedly merge block `b` with the block
    /// on the other side of its most violated incoming constraint until no
    /// incoming violation remains. The larger block survives each merge.
    pub(crate) fn merge_left(
        &mut self,
        mut b: usize,
        vars: &mut [Variable],
        cs: &mut [Constraint],
    ) {
        while let Some(ci) = self.find_min_in_constraint(b, vars, cs) {
            if self.slack(vars, cs, ci) >= 0.0 {
                break;
            }
            let l = vars[cs[ci].left].block;
            debug_assert_ne!(l, b);
            let (survivor, incoming, d) = if self.blocks[b].vars.len() >= self.blocks[l].vars.len()
            {
                // Survivor holds the right endpoint; shift the left side so
                // that right.offset - left.offset == gap.
                let d = vars[cs[ci].right].offset - cs[ci].gap - vars[cs[ci].left].offset;
                (b, l, d)
            } else {
                let d = vars[cs[ci].left].offset + cs[ci].gap - vars[cs[ci].right].offset;
                (l, b, d)
            };
            log::trace!(
                "merge across {} (slack {:e})",
                cs[ci],
                self.slack(vars, cs, ci)
            );
            self.merge_blocks(survivor, incoming, ci, d, vars, cs);
            b = survivor;
        }
    }

    /// Variables reachable from `start` along active constraints.
    fn connected_component(
        start: usize,
        vars: &[Variable],
        cs: &[Constraint],
    ) -> Vec<usize> {
        let mut members = Vec::new();
        let mut visited = vec![false; vars.len()];
        let mut stack = vec![start];
        visited[start] = true;
        while let Some(v) = stack.pop() {
            members.push(v);
            for &ci in &vars[v].out_constraints {
                let w = cs[ci].right;
                if cs[ci].active && !visited[w] {
                    visited[w] = true;
                    stack.push(w);
                }
            }
            for &ci in &vars[v].in_constraints {
                let w = cs[ci].left;
                if cs[ci].active && !visited[w] {
                    visited[w] = true;
                    stack.push(w);
                }
            }
        }
        members
    }

    /// Split block `b` across the active tree edge `ci`.
    ///
    /// Deactivating the edge disconnects the tree into the component
    /// reachable from the edge's left endpoint and the component reachable
    /// from its right endpoint; offsets within each side stay unchanged.
    /// Both children are pushed into the arena at their weighted centroid
    /// and the parent is tombstoned. Returns `(left_ix, right_ix)`.
    pub(crate) fn split(
        &mut self,
        b: usize,
        ci: usize,
        vars: &mut [Variable],
        cs: &mut [Constraint],
    ) -> (usize, usize) {
        debug_assert!(cs[ci].active);
        cs[ci].active = false;

        let left_side = Self::connected_component(cs[ci].left, vars, cs);
        let right_side = Self::connected_component(cs[ci].right, vars, cs);
        debug_assert_eq!(
            left_side.len() + right_side.len(),
            self.blocks[b].vars.len()
        );

        let parent_active = std::mem::take(&mut self.blocks[b].active);
        self.blocks[b].deleted = true;

        let l_ix = self.populate_split_block(&left_side, vars);
        let r_ix = self.populate_split_block(&right_side, vars);

        for ac in parent_active {
            if ac == ci {
                continue;
            }
            if vars[cs[ac].left].block == l_ix {
                self.blocks[l_ix].active.push(ac);
            } else {
                self.blocks[r_ix].active.push(ac);
            }
        }
        self.blocks[l_ix].set_up_in_constraints(vars, cs);
        self.blocks[l_ix].set_up_out_constraints(vars, cs);
        self.blocks[r_ix].set_up_in_constraints(vars, cs);
        self.blocks[r_ix].set_up_out_constraints(vars, cs);

        self.splits += 1;
        (l_ix, r_ix)
    }

    fn populate_split_block(&mut self, members: &[usize], vars: &mut [Variable]) -> usize {
        let ix = self.blocks.len();
        let mut b = Block::default();
        for &v in members {
            b.add_variable(v, ix, vars);
        }
        self.insert(b)
    }

    /// Split the block containing both endpoints of a violated constraint
    /// across the best edge on the tree path between them. Returns the
    /// split constraint and the two children, or `None` when no edge on
    /// the path can be beneficially relaxed.
    pub(crate) fn split_between(
        &mut self,
        b: usize,
        lv: usize,
        rv: usize,
        vars: &mut [Variable],
        cs: &mut [Constraint],
    ) -> Option<(usize, usize, usize)> {
        let sc = self.blocks[b].find_min_lm_between(lv, rv, vars, cs)?;
        log::trace!("split on {} (lm {:e})", cs[sc], cs[sc].lm);
        let (l_ix, r_ix) = self.split(b, sc, vars, cs);
        Some((sc, l_ix, r_ix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{Constraint, Variable};

    fn wire(vars: &mut [Variable], cs: &[Constraint]) {
        for v in vars.iter_mut() {
            v.in_constraints.clear();
            v.out_constraints.clear();
        }
        for (ci, c) in cs.iter().enumerate() {
            vars[c.left].out_constraints.push(ci);
            vars[c.right].in_constraints.push(ci);
        }
    }

    #[test]
    fn test_total_order_is_topological() {
        let mut vars: Vec<Variable> = (0..4).map(|_| Variable::new(0.0)).collect();
        let cs = vec![
            Constraint::new(0, 1, 2.0),
            Constraint::new(0, 2, 2.0),
            Constraint::new(1, 3, 2.0),
            Constraint::new(2, 3, 2.0),
        ];
        wire(&mut vars, &cs);

        let order = BlockSet::total_order(&vars, &cs);
        assert_eq!(order.len(), 4);
        let rank = |v: usize| order.iter().position(|&x| x == v).unwrap();
        for c in &cs {
            assert!(
                rank(c.left) < rank(c.right),
                "v{} must precede v{}",
                c.left,
                c.right
            );
        }
    }

    #[test]
    fn test_merge_across_activates_and_aligns() {
        let mut vars = vec![Variable::new(0.0), Variable::new(0.0)];
        let mut cs = vec![Constraint::new(0, 1, 1.0)];
        wire(&mut vars, &cs);
        let mut bs = BlockSet::new(&mut vars);

        let survivor = bs.merge_across(0, &mut vars, &mut cs);
        assert_eq!(survivor, 0);
        assert!(cs[0].is_active());
        assert!(bs.blocks[1].deleted);
        assert_eq!(vars[1].block, 0);
        assert!((vars[1].offset - vars[0].offset - 1.0).abs() < 1e-12);
        // Combined centroid of two unit weights wanting 0, held 1 apart.
        assert!((bs.position(&vars, 0) + 0.5).abs() < 1e-12);
        assert!((bs.position(&vars, 1) - 0.5).abs() < 1e-12);
        assert!((bs.slack(&vars, &cs, 0)).abs() < 1e-12);
    }

    #[test]
    fn test_split_restores_partition() {
        let mut vars = vec![Variable::new(0.0), Variable::new(0.0), Variable::new(0.0)];
        let mut cs = vec![Constraint::new(0, 1, 1.0), Constraint::new(1, 2, 1.0)];
        wire(&mut vars, &cs);
        let mut bs = BlockSet::new(&mut vars);
        bs.merge_across(0, &mut vars, &mut cs);
        bs.merge_across(1, &mut vars, &mut cs);
        bs.cleanup(&mut vars);
        assert_eq!(bs.size(), 1);

        let parent = vars[0].block;
        let (l_ix, r_ix) = bs.split(parent, 1, &mut vars, &mut cs);
        assert!(!cs[1].is_active());
        assert!(bs.blocks[parent].deleted);
        let mut members: Vec<usize> = bs.blocks[l_ix]
            .vars
            .iter()
            .chain(bs.blocks[r_ix].vars.iter())
            .copied()
            .collect();
        members.sort_unstable();
        assert_eq!(members, vec![0, 1, 2]);
        assert_eq!(bs.blocks[l_ix].vars.len() + bs.blocks[r_ix].vars.len(), 3);

        bs.cleanup(&mut vars);
        assert_eq!(bs.size(), 2);
        for (ix, b) in bs.blocks.iter().enumerate() {
            for &v in &b.vars {
                assert_eq!(vars[v].block, ix);
            }
        }
    }

    #[test]
    fn test_slack_encodings() {
        let mut vars = vec![Variable::new(0.0), Variable::new(5.0)];
        let mut cs = vec![Constraint::new(0, 1, 2.0), Constraint::new_equality(0, 1, 2.0)];
        wire(&mut vars, &cs);
        let bs = BlockSet::new(&mut vars);

        // Inequality: 5 - 0 - 2 = 3.
        assert!((bs.slack(&vars, &cs, 0) - 3.0).abs() < 1e-12);
        // Equality: any deviation is a violation.
        assert!((bs.slack(&vars, &cs, 1) + 3.0).abs() < 1e-12);

        cs[0].unsatisfiable = true;
        assert_eq!(bs.slack(&vars, &cs, 0), f64::INFINITY);
    }
}
