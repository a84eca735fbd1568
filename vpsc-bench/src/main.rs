//! Benchmarking CLI for the vpsc solver.

mod test_problems;

use std::time::Instant;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use vpsc_core::{Constraint, IncSolver, Solver, Variable};

#[derive(Parser)]
#[command(name = "vpsc-bench")]
#[command(about = "Benchmarking CLI for the vpsc solver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fixed synthetic smoke problems
    Suite,
    /// Solve a separation chain of the given length
    Chain {
        /// Number of variables
        #[arg(long, default_value = "10000")]
        n: usize,
        /// Gap between consecutive variables
        #[arg(long, default_value = "1.0")]
        gap: f64,
    },
    /// Solve a random acyclic instance
    Random {
        /// Number of variables
        #[arg(long, default_value = "1000")]
        n: usize,
        /// Number of constraints
        #[arg(long, default_value = "2000")]
        m: usize,
        /// RNG seed
        #[arg(long, default_value = "7")]
        seed: u64,
        /// Use the incremental solver
        #[arg(long)]
        incremental: bool,
    },
    /// Compare batch and incremental solvers on the same random instance
    Compare {
        #[arg(long, default_value = "1000")]
        n: usize,
        #[arg(long, default_value = "2000")]
        m: usize,
        #[arg(long, default_value = "7")]
        seed: u64,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    match Cli::parse().command {
        Commands::Suite => run_suite(),
        Commands::Chain { n, gap } => {
            let (vars, cs) = test_problems::chain(n, gap);
            run_batch("CHAIN", vars, cs)
        }
        Commands::Random {
            n,
            m,
            seed,
            incremental,
        } => {
            let (vars, cs) = test_problems::random_dag(n, m, seed);
            if incremental {
                run_incremental("RANDOM", vars, cs)
            } else {
                run_batch("RANDOM", vars, cs)
            }
        }
        Commands::Compare { n, m, seed } => run_compare(n, m, seed),
    }
}

fn weighted_cost(vars: &[Variable]) -> f64 {
    vars.iter()
        .map(|v| {
            let d = v.final_position - v.desired_position;
            v.weight * d * d
        })
        .sum()
}

fn max_violation(vars: &[Variable], cs: &[Constraint]) -> f64 {
    cs.iter()
        .filter(|c| !c.unsatisfiable)
        .map(|c| {
            let s = vars[c.right].final_position - vars[c.left].final_position - c.gap;
            if c.equality {
                s.abs()
            } else {
                (-s).max(0.0)
            }
        })
        .fold(0.0, f64::max)
}

fn run_suite() -> Result<()> {
    println!(
        "{:<16} {:>10} {:>10} {:>8} {:>8} {:>12}",
        "problem", "cost", "violation", "merges", "splits", "time"
    );
    for problem in test_problems::synthetic_problems() {
        let (vars, cs) = (problem.builder)();
        let mut solver = Solver::new(vars, cs)?;
        let start = Instant::now();
        solver.solve()?;
        let elapsed = start.elapsed();

        let cost = weighted_cost(solver.variables());
        let violation = max_violation(solver.variables(), solver.constraints());
        let stats = solver.stats();
        println!(
            "{:<16} {:>10.3} {:>10.2e} {:>8} {:>8} {:>10.2?}",
            problem.name, cost, violation, stats.merges, stats.splits, elapsed
        );

        if violation > 1e-6 {
            bail!("{}: violation {:e} exceeds tolerance", problem.name, violation);
        }
        if let Some(expected) = problem.expected_cost {
            if (cost - expected).abs() > 1e-6 * expected.max(1.0) {
                bail!(
                    "{}: cost {} differs from expected {}",
                    problem.name,
                    cost,
                    expected
                );
            }
        }
    }
    Ok(())
}

fn run_batch(name: &str, vars: Vec<Variable>, cs: Vec<Constraint>) -> Result<()> {
    let (n, m) = (vars.len(), cs.len());
    let mut solver = Solver::new(vars, cs)?;
    let start = Instant::now();
    let coupled = solver.solve()?;
    let elapsed = start.elapsed();

    let stats = solver.stats();
    println!("{}: n={} m={} coupled={}", name, n, m, coupled);
    println!(
        "  cost={:.3} violation={:.2e} merges={} splits={} blocks={} time={:.2?}",
        weighted_cost(solver.variables()),
        max_violation(solver.variables(), solver.constraints()),
        stats.merges,
        stats.splits,
        stats.blocks,
        elapsed
    );
    Ok(())
}

fn run_incremental(name: &str, vars: Vec<Variable>, cs: Vec<Constraint>) -> Result<()> {
    let (n, m) = (vars.len(), cs.len());
    let mut solver = IncSolver::new(vars, cs)?;
    let start = Instant::now();
    let coupled = solver.solve()?;
    let elapsed = start.elapsed();

    let stats = solver.stats();
    let unsatisfiable = solver
        .constraints()
        .iter()
        .filter(|c| c.unsatisfiable)
        .count();
    println!("{} (incremental): n={} m={} coupled={}", name, n, m, coupled);
    println!(
        "  cost={:.3} violation={:.2e} merges={} splits={} blocks={} unsatisfiable={} time={:.2?}",
        weighted_cost(solver.variables()),
        max_violation(solver.variables(), solver.constraints()),
        stats.merges,
        stats.splits,
        stats.blocks,
        unsatisfiable,
        elapsed
    );
    Ok(())
}

fn run_compare(n: usize, m: usize, seed: u64) -> Result<()> {
    let (vars, cs) = test_problems::random_dag(n, m, seed);

    let mut batch = Solver::new(vars.clone(), cs.clone())?;
    let start = Instant::now();
    batch.solve()?;
    let batch_time = start.elapsed();
    let batch_cost = weighted_cost(batch.variables());

    let mut inc = IncSolver::new(vars, cs)?;
    let start = Instant::now();
    inc.solve()?;
    let inc_time = start.elapsed();
    let inc_cost = weighted_cost(inc.variables());

    println!("compare: n={} m={} seed={}", n, m, seed);
    println!("  batch:       cost={:.6} time={:.2?}", batch_cost, batch_time);
    println!("  incremental: cost={:.6} time={:.2?}", inc_cost, inc_time);
    let rel = (batch_cost - inc_cost).abs() / batch_cost.max(1.0);
    if rel > 1e-3 {
        bail!("solvers disagree: relative cost difference {:e}", rel);
    }
    Ok(())
}
