//! End-to-end tests for the incremental (warm-start) solver.

use approx::assert_abs_diff_eq;
use vpsc_core::{Constraint, IncSolver, Solver, Variable};

fn unit_vars(desired: &[f64]) -> Vec<Variable> {
    desired.iter().map(|&d| Variable::new(d)).collect()
}

fn weighted_cost(vars: &[Variable]) -> f64 {
    vars.iter()
        .map(|v| {
            let d = v.final_position - v.desired_position;
            v.weight * d * d
        })
        .sum()
}

fn max_violation(solver: &IncSolver) -> f64 {
    let pos = solver.positions();
    solver
        .constraints()
        .iter()
        .filter(|c| !c.unsatisfiable)
        .map(|c| {
            let s = pos[c.right] - pos[c.left] - c.gap;
            if c.equality {
                s.abs()
            } else {
                (-s).max(0.0)
            }
        })
        .fold(0.0, f64::max)
}

#[test]
fn test_matches_batch_solver_on_chain() {
    let desired = [0.0, 0.0, 0.0];
    let cs = || vec![Constraint::new(0, 1, 1.0), Constraint::new(1, 2, 1.0)];

    let mut batch = Solver::new(unit_vars(&desired), cs()).unwrap();
    batch.solve().unwrap();
    let mut inc = IncSolver::new(unit_vars(&desired), cs()).unwrap();
    assert!(inc.solve().unwrap());

    for (a, b) in batch.positions().iter().zip(inc.positions().iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }
}

#[test]
fn test_matches_batch_solver_on_skewed_diamond() {
    let desired = [0.0, 0.0, 0.0, 10.0];
    let cs = || {
        vec![
            Constraint::new(0, 1, 2.0),
            Constraint::new(0, 2, 2.0),
            Constraint::new(1, 3, 2.0),
            Constraint::new(2, 3, 2.0),
        ]
    };

    let mut batch = Solver::new(unit_vars(&desired), cs()).unwrap();
    batch.solve().unwrap();
    let mut inc = IncSolver::new(unit_vars(&desired), cs()).unwrap();
    inc.solve().unwrap();

    for (a, b) in batch.positions().iter().zip(inc.positions().iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }
    assert_abs_diff_eq!(max_violation(&inc), 0.0, epsilon = 1e-9);
}

#[test]
fn test_already_satisfied_stays_put() {
    let mut inc =
        IncSolver::new(unit_vars(&[0.0, 10.0]), vec![Constraint::new(0, 1, 1.0)]).unwrap();
    let coupled = inc.solve().unwrap();
    assert!(!coupled);
    let pos = inc.positions();
    assert_abs_diff_eq!(pos[0], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(pos[1], 10.0, epsilon = 1e-12);
}

#[test]
fn test_warm_restart_follows_desired_positions() {
    let cs = vec![Constraint::new(0, 1, 1.0), Constraint::new(1, 2, 1.0)];
    let mut inc = IncSolver::new(unit_vars(&[0.0, 0.0, 0.0]), cs).unwrap();
    inc.solve().unwrap();
    let pos = inc.positions();
    assert_abs_diff_eq!(pos[0], -1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(pos[2], 1.0, epsilon = 1e-9);

    // Shift the whole chain: the merged block moves rigidly.
    inc.set_desired_position(0, 10.0);
    inc.set_desired_position(1, 10.0);
    inc.set_desired_position(2, 10.0);
    inc.solve().unwrap();
    let pos = inc.positions();
    assert_abs_diff_eq!(pos[0], 9.0, epsilon = 1e-9);
    assert_abs_diff_eq!(pos[1], 10.0, epsilon = 1e-9);
    assert_abs_diff_eq!(pos[2], 11.0, epsilon = 1e-9);
}

#[test]
fn test_warm_restart_splits_released_block() {
    let mut inc =
        IncSolver::new(unit_vars(&[0.0, 0.0]), vec![Constraint::new(0, 1, 1.0)]).unwrap();
    inc.solve().unwrap();
    assert!(inc.constraints()[0].is_active());

    // Pull the pair far apart; the constraint no longer binds and the
    // block must split so each variable reaches its desired position.
    inc.set_desired_position(0, -5.0);
    inc.set_desired_position(1, 5.0);
    let coupled = inc.solve().unwrap();
    assert!(!coupled);
    assert!(!inc.constraints()[0].is_active());
    let pos = inc.positions();
    assert_abs_diff_eq!(pos[0], -5.0, epsilon = 1e-9);
    assert_abs_diff_eq!(pos[1], 5.0, epsilon = 1e-9);
}

#[test]
fn test_warm_restart_matches_fresh_solve() {
    let desired0 = [0.0, 3.0, 1.0, 7.0];
    let desired1 = [4.0, -2.0, 6.0, 0.0];
    let cs = || {
        vec![
            Constraint::new(0, 1, 1.5),
            Constraint::new(1, 2, 1.5),
            Constraint::new(0, 3, 2.0),
            Constraint::new(2, 3, 1.0),
        ]
    };

    let mut inc = IncSolver::new(unit_vars(&desired0), cs()).unwrap();
    inc.solve().unwrap();
    for (v, &d) in desired1.iter().enumerate() {
        inc.set_desired_position(v, d);
    }
    inc.solve().unwrap();

    let mut fresh = IncSolver::new(unit_vars(&desired1), cs()).unwrap();
    fresh.solve().unwrap();

    for (a, b) in inc.positions().iter().zip(fresh.positions().iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
    }
    assert_abs_diff_eq!(max_violation(&inc), 0.0, epsilon = 1e-9);
}

#[test]
fn test_converged_cost_is_stable() {
    let cs = vec![
        Constraint::new(0, 1, 2.0),
        Constraint::new(0, 2, 2.0),
        Constraint::new(1, 3, 2.0),
        Constraint::new(2, 3, 2.0),
    ];
    let mut inc = IncSolver::new(unit_vars(&[0.0, 0.0, 0.0, 10.0]), cs).unwrap();
    inc.solve().unwrap();
    let first = weighted_cost(inc.variables());
    inc.solve().unwrap();
    let second = weighted_cost(inc.variables());
    assert!(
        (first - second).abs() < 1e-4,
        "converged cost moved: {} -> {}",
        first,
        second
    );
}

#[test]
fn test_cycle_marks_constraint_unsatisfiable() {
    let cs = vec![Constraint::new(0, 1, 1.0), Constraint::new(1, 0, 1.0)];
    let mut inc = IncSolver::new(unit_vars(&[0.0, 0.0]), cs).unwrap();
    // The incremental path relaxes the cyclic constraint instead of
    // failing outright.
    inc.solve().unwrap();

    let flagged: Vec<_> = inc
        .constraints()
        .iter()
        .filter(|c| c.unsatisfiable)
        .collect();
    assert_eq!(flagged.len(), 1);
    // The other constraint holds exactly.
    assert_abs_diff_eq!(max_violation(&inc), 0.0, epsilon = 1e-9);
}

#[test]
fn test_equality_through_incremental_path() {
    let cs = vec![Constraint::new_equality(0, 1, 1.0)];
    let mut inc = IncSolver::new(unit_vars(&[5.0, 0.0]), cs).unwrap();
    assert!(inc.solve().unwrap());
    let pos = inc.positions();
    assert_abs_diff_eq!(pos[0], 2.0, epsilon = 1e-9);
    assert_abs_diff_eq!(pos[1], 3.0, epsilon = 1e-9);
    assert!(inc.constraints()[0].is_active());
}

#[test]
fn test_equality_tracks_desired_updates() {
    let cs = vec![Constraint::new_equality(0, 1, 2.0)];
    let mut inc = IncSolver::new(unit_vars(&[0.0, 2.0]), cs).unwrap();
    inc.solve().unwrap();
    let pos = inc.positions();
    assert_abs_diff_eq!(pos[1] - pos[0], 2.0, epsilon = 1e-9);

    inc.set_desired_position(0, 8.0);
    inc.set_desired_position(1, 4.0);
    inc.solve().unwrap();
    let pos = inc.positions();
    // Equalities are never split: the pair moves rigidly to the centroid
    // of the new desired positions.
    assert_abs_diff_eq!(pos[1] - pos[0], 2.0, epsilon = 1e-9);
    assert_abs_diff_eq!(pos[0], 5.0, epsilon = 1e-9);
    assert_abs_diff_eq!(pos[1], 7.0, epsilon = 1e-9);
}
