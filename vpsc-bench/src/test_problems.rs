//! Shared synthetic problem definitions for smoke runs and benchmarking.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vpsc_core::{Constraint, Variable};

/// Named synthetic problem.
pub struct TestProblem {
    pub name: &'static str,
    pub builder: fn() -> (Vec<Variable>, Vec<Constraint>),
    /// Weighted cost of the known optimum, where one is known in closed
    /// form
    pub expected_cost: Option<f64>,
}

fn build_pair() -> (Vec<Variable>, Vec<Constraint>) {
    let vars = vec![Variable::new(0.0), Variable::new(0.0)];
    let cs = vec![Constraint::new(0, 1, 1.0)];
    (vars, cs)
}

fn build_chain_100() -> (Vec<Variable>, Vec<Constraint>) {
    chain(100, 1.0)
}

fn build_diamond() -> (Vec<Variable>, Vec<Constraint>) {
    let vars = (0..4).map(|_| Variable::new(0.0)).collect();
    let cs = vec![
        Constraint::new(0, 1, 2.0),
        Constraint::new(0, 2, 2.0),
        Constraint::new(1, 3, 2.0),
        Constraint::new(2, 3, 2.0),
    ];
    (vars, cs)
}

fn build_equality_ladder() -> (Vec<Variable>, Vec<Constraint>) {
    let vars = vec![
        Variable::new(5.0),
        Variable::new(0.0),
        Variable::new(3.0),
        Variable::new(-2.0),
    ];
    let cs = vec![
        Constraint::new_equality(0, 1, 1.0),
        Constraint::new(1, 2, 1.0),
        Constraint::new_equality(2, 3, 1.0),
    ];
    (vars, cs)
}

/// All variables want position 0, each consecutive pair `gap` apart.
pub fn chain(n: usize, gap: f64) -> (Vec<Variable>, Vec<Constraint>) {
    let vars = (0..n).map(|_| Variable::new(0.0)).collect();
    let cs = (1..n).map(|i| Constraint::new(i - 1, i, gap)).collect();
    (vars, cs)
}

/// Random DAG instance: desired positions drawn uniformly, constraints
/// between index-ordered pairs so the graph is acyclic by construction.
pub fn random_dag(n: usize, m: usize, seed: u64) -> (Vec<Variable>, Vec<Constraint>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let vars = (0..n)
        .map(|_| Variable::new(rng.gen_range(0.0..100.0)))
        .collect();
    let cs = (0..m)
        .map(|_| {
            let a = rng.gen_range(0..n - 1);
            let b = rng.gen_range(a + 1..n);
            Constraint::new(a, b, rng.gen_range(0.5..5.0))
        })
        .collect();
    (vars, cs)
}

/// Registry of the fixed smoke problems.
pub fn synthetic_problems() -> Vec<TestProblem> {
    vec![
        TestProblem {
            name: "PAIR",
            builder: build_pair,
            expected_cost: Some(0.5),
        },
        TestProblem {
            name: "CHAIN_100",
            builder: build_chain_100,
            // Chain of n unit variables all wanting 0 with unit gaps ends
            // centered: cost = sum of k^2 over the symmetric offsets.
            expected_cost: Some((0..100).map(|i| (i as f64 - 49.5).powi(2)).sum()),
        },
        TestProblem {
            name: "DIAMOND",
            builder: build_diamond,
            expected_cost: Some(8.0),
        },
        TestProblem {
            name: "EQUALITY_LADDER",
            builder: build_equality_ladder,
            expected_cost: None,
        },
    ]
}
