#![cfg(test)]

//! End-to-end scenarios and boundary cases, run through the public API
//! rather than through any module's own unit tests.

use imdp::ambiguity::IntervalAmbiguitySet;
use imdp::model::{FactoredModel, FlatModel, Marginal, Model};
use imdp::problem::{ControlSynthesisProblemBuilder, Property, VerificationProblemBuilder};
use imdp::strategy::Strategy;
use imdp::types::{Direction, SatisfactionMode, StrategyMode};
use imdp::vi::{self, Horizon, Kernel, TerminalRule, VIConfig};
use imdp::workers::WorkerPool;

fn box_set(n: usize, m: usize, lower: Vec<f64>, upper: Vec<f64>) -> IntervalAmbiguitySet {
    IntervalAmbiguitySet::new(n, m, lower, upper).unwrap()
}

/// Scenario 2: a single state with two actions, each a 3-target interval
/// column. Reported per-action rather than reduced by a max over actions,
/// so this only exercises `bellman`'s per-column O-max, same as scenario 1.
#[test]
fn two_action_pessimistic_maximize_matches_hand_computed_values() {
    let lower = vec![
        0.0, 1.0 / 10.0, 1.0 / 5.0, // action 1
        1.0 / 2.0, 3.0 / 10.0, 1.0 / 10.0, // action 2
    ];
    let upper = vec![1.0 / 2.0, 3.0 / 5.0, 7.0 / 10.0, 7.0 / 10.0, 1.0 / 2.0, 3.0 / 10.0];
    let ambiguity = box_set(3, 2, lower, upper);
    let v = vec![1.0, 2.0, 3.0];

    // Pessimistic-Maximize resolves the interval axis against the verifier.
    let result = vi::bellman(&v, &ambiguity, SatisfactionMode::Pessimistic.interval_direction(StrategyMode::Maximize)).unwrap();
    assert!((result[0] - 2.7).abs() < 1e-9, "action 1: got {}", result[0]);
    assert!((result[1] - 1.7).abs() < 1e-9, "action 2: got {}", result[1]);
}

fn forward_chain_marginal() -> IntervalAmbiguitySet {
    // Single action per source value; column j is source state j. Each
    // state prefers to advance toward 2, which is absorbing.
    let lower = vec![
        0.2, 0.5, 0.0, // s = 0: stay in [0.2, 0.4], advance in [0.5, 0.7]
        0.0, 0.2, 0.5, // s = 1: stay in [0.2, 0.4], advance in [0.5, 0.7]
        0.0, 0.0, 1.0, // s = 2: absorbing
    ];
    let upper = vec![0.4, 0.7, 0.0, 0.0, 0.4, 0.7, 0.0, 0.0, 1.0];
    box_set(3, 3, lower, upper)
}

fn forward_chain_factored_model() -> FactoredModel {
    let marginal = |i: usize| Marginal {
        state_deps: vec![i],
        action_deps: vec![],
        source_shape: vec![3],
        action_shape: vec![],
        target_card: 3,
        ambiguity: forward_chain_marginal(),
    };
    FactoredModel {
        state_values: vec![3, 3, 3],
        action_values: vec![1],
        marginals: vec![marginal(0), marginal(1), marginal(2)],
        initial_states: None,
    }
    .validate()
    .unwrap()
}

/// Builds the explicit joint kernel of [`forward_chain_factored_model`] as a
/// flat 27-state Markov chain, `lower`/`upper` at each joint coordinate
/// being the product of the three marginals' own bounds (the same
/// outer-product construction used to cross-check disjoint factoring
/// elsewhere in this crate).
fn forward_chain_flat_kronecker() -> FlatModel {
    let marginal = forward_chain_marginal();
    let mut lower = vec![0.0; 27 * 27];
    let mut upper = vec![0.0; 27 * 27];
    for s0 in 0..3 {
        for s1 in 0..3 {
            for s2 in 0..3 {
                let col = (s0 * 3 + s1) * 3 + s2;
                for t0 in 0..3 {
                    for t1 in 0..3 {
                        for t2 in 0..3 {
                            let row = (t0 * 3 + t1) * 3 + t2;
                            let idx = col * 27 + row;
                            lower[idx] = marginal.lower(s0, t0) * marginal.lower(s1, t1) * marginal.lower(s2, t2);
                            upper[idx] = marginal.upper(s0, t0) * marginal.upper(s1, t1) * marginal.upper(s2, t2);
                        }
                    }
                }
            }
        }
    }
    let ambiguity = box_set(27, 27, lower, upper);
    FlatModel::markov_chain(ambiguity).unwrap()
}

/// Spec scenario 3 plus testable property 6: a 3x3x3 factored reach-to-corner
/// problem, cross-checked against its explicit flat Kronecker product.
#[test]
fn factored_reach_to_corner_matches_explicit_kronecker_product() {
    let factored = forward_chain_factored_model();
    let corner = factored.flatten_state(&[2, 2, 2]);
    let mut factored_targets = vec![false; factored.num_states()];
    factored_targets[corner] = true;

    let factored_problem = VerificationProblemBuilder::default()
        .model(Model::Factored(factored.clone()))
        .property(Property::FiniteTimeReachability { targets: factored_targets, horizon: 10 })
        .build()
        .unwrap();
    let factored_outcome = factored_problem.solve().unwrap();

    assert!(
        (factored_outcome.value[corner] - 1.0).abs() < 0.1,
        "corner value should approach 1, got {}",
        factored_outcome.value[corner]
    );
    assert!(factored_outcome.value.iter().all(|&v| (0.0..=1.0).contains(&v)));

    let flat = forward_chain_flat_kronecker();
    let mut flat_targets = vec![false; flat.num_states()];
    flat_targets[26] = true; // (2,2,2) flattened row-major is 2*9+2*3+2 = 26
    let flat_problem = VerificationProblemBuilder::default()
        .model(Model::Flat(flat))
        .property(Property::FiniteTimeReachability { targets: flat_targets, horizon: 10 })
        .build()
        .unwrap();
    let flat_outcome = flat_problem.solve().unwrap();

    assert!(
        (flat_outcome.value[26] - 1.0).abs() < 0.1,
        "flat corner value should approach 1, got {}",
        flat_outcome.value[26]
    );

    // Disjoint dependencies: the factored backup must be exact, not merely
    // a sound bound, so factored and flat agree pointwise.
    for s0 in 0..3 {
        for s1 in 0..3 {
            for s2 in 0..3 {
                let f_idx = factored.flatten_state(&[s0, s1, s2]);
                let flat_idx = (s0 * 3 + s1) * 3 + s2;
                assert!(
                    (factored_outcome.value[f_idx] - flat_outcome.value[flat_idx]).abs() < 1e-6,
                    "mismatch at ({s0},{s1},{s2}): factored={}, flat={}",
                    factored_outcome.value[f_idx],
                    flat_outcome.value[flat_idx]
                );
                assert!(factored_outcome.value[f_idx] >= flat_outcome.value[flat_idx] - 1e-9);
            }
        }
    }
}

/// Testable property 2: the O-max result equals the maximum (or minimum)
/// of `<p, V>` over the finite set of vertices a box ambiguity set
/// enumerates, cross-checked against the combinatorial oracle.
#[test]
fn omax_matches_the_combinatorial_vertex_oracle() {
    let lower = vec![0.1, 0.0, 0.2, 0.0];
    let upper = vec![0.4, 0.3, 0.5, 0.2];
    let ambiguity = box_set(4, 1, lower, upper);
    let v = vec![3.0, 1.0, 4.0, 2.0];

    for dir in [Direction::Max, Direction::Min] {
        let got = vi::bellman(&v, &ambiguity, dir).unwrap()[0];
        let oracle = ambiguity
            .enumerate_vertices(0)
            .into_iter()
            .map(|p| p.iter().zip(v.iter()).map(|(pi, vj)| pi * vj).sum::<f64>())
            .fold(None, |acc: Option<f64>, x| {
                Some(match (acc, dir) {
                    (None, _) => x,
                    (Some(a), Direction::Max) => a.max(x),
                    (Some(a), Direction::Min) => a.min(x),
                })
            })
            .unwrap();
        assert!((got - oracle).abs() < 1e-9, "{dir:?}: omax={got}, oracle={oracle}");
    }
}

/// Testable property 3: VI is pointwise nondecreasing for reachability and
/// pointwise nonincreasing for safety.
#[test]
fn safety_value_iteration_is_monotone_nonincreasing() {
    let lower = vec![0.5, 0.5, 0.1, 0.9];
    let upper = lower.clone();
    let ambiguity = box_set(2, 2, lower, upper);
    let model = Model::Flat(FlatModel::markov_chain(ambiguity).unwrap());
    let kernel = Kernel::Stationary(model);
    let workers = WorkerPool::with_workers(1);

    let mut prev = vec![f64::MAX; 2];
    for h in 1..=6 {
        let config = VIConfig {
            kernel: &kernel,
            satisfaction_mode: SatisfactionMode::Pessimistic,
            strategy_mode: StrategyMode::Minimize,
            horizon: Horizon::Finite(h),
            terminal: TerminalRule::Safety { avoid: vec![false, true] },
            capture_strategy: false,
            workers: &workers,
            cancel: None,
        };
        let outcome = vi::run(&config).unwrap();
        assert!(outcome.value[0] <= prev[0] + 1e-12, "safety value not nonincreasing at horizon {h}");
        assert!((0.0..=1.0).contains(&outcome.value[0]));
        prev = outcome.value;
    }
}

/// Testable property 7: a time-varying run of horizon 1 over a single
/// kernel equals one stationary Bellman step with that same kernel.
#[test]
fn time_varying_horizon_one_matches_one_stationary_step() {
    let lower = vec![0.2, 0.3, 0.5, 0.4, 0.3, 0.3];
    let upper = vec![0.3, 0.4, 0.6, 0.5, 0.3, 0.4];
    let ambiguity = box_set(3, 3, lower, upper);
    let model = Model::Flat(FlatModel::markov_chain(ambiguity).unwrap());
    let workers = WorkerPool::with_workers(1);
    let terminal = TerminalRule::Reachability { targets: vec![false, false, true], absorbing: true };

    let stationary_kernel = Kernel::Stationary(model.clone());
    let stationary_config = VIConfig {
        kernel: &stationary_kernel,
        satisfaction_mode: SatisfactionMode::Pessimistic,
        strategy_mode: StrategyMode::Maximize,
        horizon: Horizon::Finite(1),
        terminal: terminal.clone(),
        capture_strategy: false,
        workers: &workers,
        cancel: None,
    };
    let stationary = vi::run(&stationary_config).unwrap();

    let time_varying_kernel = Kernel::TimeVarying(vec![model]);
    let time_varying_config = VIConfig {
        kernel: &time_varying_kernel,
        satisfaction_mode: SatisfactionMode::Pessimistic,
        strategy_mode: StrategyMode::Maximize,
        horizon: Horizon::Finite(1),
        terminal,
        capture_strategy: false,
        workers: &workers,
        cancel: None,
    };
    let time_varying = vi::run(&time_varying_config).unwrap();

    for s in 0..3 {
        assert!((stationary.value[s] - time_varying.value[s]).abs() < 1e-12);
    }
}

/// Testable property 5: a strategy produced by `ControlSynthesisProblem`,
/// baked into a reduced (one action per state) Markov chain and re-verified,
/// reproduces the same value the synthesis run reported.
#[test]
fn synthesized_strategy_round_trips_through_verification() {
    // State 0 has two actions; state 1 is the absorbing target.
    let lower = vec![
        0.7, 0.3, // action A at state 0: mostly self-loop
        0.2, 0.8, // action B at state 0: mostly advance
        0.0, 1.0, // state 1's only action: absorbing
    ];
    let upper = lower.clone();
    let ambiguity = box_set(2, 3, lower, upper);
    let base = FlatModel::new(2, vec![0, 2, 3], ambiguity).unwrap();
    let model = Model::Flat(base.clone());

    let synthesis = ControlSynthesisProblemBuilder::default()
        .model(model.clone())
        .property(Property::InfiniteTimeReachability { targets: vec![false, true], epsilon: 1e-10 })
        .strategy_mode(StrategyMode::Maximize)
        .build()
        .unwrap();
    let synth_outcome = synthesis.solve().unwrap();
    let Some(Strategy::Stationary(actions)) = &synth_outcome.strategy else {
        panic!("expected a stationary strategy");
    };
    assert_eq!(actions[0], 1, "action B dominates action A for reaching state 1");

    // Bake the chosen action per state into a one-action-per-state chain.
    let mut reduced_lower = Vec::with_capacity(4);
    let mut reduced_upper = Vec::with_capacity(4);
    for s in 0..2 {
        let col = base.actions(s).start + actions[s];
        for i in 0..2 {
            reduced_lower.push(base.ambiguity().lower(col, i));
            reduced_upper.push(base.ambiguity().upper(col, i));
        }
    }
    let reduced_ambiguity = box_set(2, 2, reduced_lower, reduced_upper);
    let reduced_model = Model::Flat(FlatModel::markov_chain(reduced_ambiguity).unwrap());

    let verification = VerificationProblemBuilder::default()
        .model(reduced_model)
        .property(Property::InfiniteTimeReachability { targets: vec![false, true], epsilon: 1e-10 })
        .build()
        .unwrap();
    let verify_outcome = verification.solve().unwrap();

    assert!((verify_outcome.value[0] - synth_outcome.value[0]).abs() < 1e-6);
}

/// Boundary: an empty reach set never accumulates any value.
#[test]
fn empty_reach_set_gives_value_identically_zero() {
    let lower = vec![0.5, 0.5, 0.3, 0.7];
    let upper = lower.clone();
    let ambiguity = box_set(2, 2, lower, upper);
    let model = Model::Flat(FlatModel::markov_chain(ambiguity).unwrap());
    let problem = VerificationProblemBuilder::default()
        .model(model)
        .property(Property::FiniteTimeReachability { targets: vec![false, false], horizon: 5 })
        .build()
        .unwrap();
    let outcome = problem.solve().unwrap();
    assert!(outcome.value.iter().all(|&v| v == 0.0));
}

/// Boundary: reaching the set of all states is trivially satisfied after
/// one backup.
#[test]
fn reach_all_states_gives_value_one_at_first_iteration() {
    let lower = vec![0.5, 0.5, 0.3, 0.7];
    let upper = lower.clone();
    let ambiguity = box_set(2, 2, lower, upper);
    let model = Model::Flat(FlatModel::markov_chain(ambiguity).unwrap());
    let problem = VerificationProblemBuilder::default()
        .model(model)
        .property(Property::FiniteTimeReachability { targets: vec![true, true], horizon: 1 })
        .build()
        .unwrap();
    let outcome = problem.solve().unwrap();
    assert!(outcome.value.iter().all(|&v| (v - 1.0).abs() < 1e-12));
}

/// Boundary: a `gap = 0` column is a deterministic kernel, so O-max just
/// evaluates the inner product with the fixed `lower` distribution.
#[test]
fn deterministic_kernel_omax_equals_inner_product_with_lower() {
    let lower = vec![0.2, 0.3, 0.5];
    let upper = lower.clone();
    let ambiguity = box_set(3, 1, lower.clone(), upper);
    let v = vec![10.0, 20.0, 30.0];
    let got = vi::bellman(&v, &ambiguity, Direction::Max).unwrap();
    let want: f64 = lower.iter().zip(v.iter()).map(|(l, v)| l * v).sum();
    assert!((got[0] - want).abs() < 1e-9);
}

/// Boundary: a fully unconstrained column (`lower ≡ 0`, `upper ≡ 1`) lets
/// O-max put all mass on the single best (`Max`) or worst (`Min`) state.
#[test]
fn unconstrained_box_omax_selects_the_extreme_value() {
    let lower = vec![0.0, 0.0, 0.0];
    let upper = vec![1.0, 1.0, 1.0];
    let ambiguity = box_set(3, 1, lower, upper);
    let v = vec![10.0, 30.0, 20.0];
    let max_result = vi::bellman(&v, &ambiguity, Direction::Max).unwrap();
    let min_result = vi::bellman(&v, &ambiguity, Direction::Min).unwrap();
    assert!((max_result[0] - 30.0).abs() < 1e-9);
    assert!((min_result[0] - 10.0).abs() < 1e-9);
}
