// Copyright 2020 Xavier Gillard
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! The value-iteration driver: the fixed-point loop that repeatedly applies
//! the robust Bellman operator (O-max for flat models, the factored/
//! McCormick tensor contraction for factored ones), checks termination,
//! and optionally captures a strategy.

use dashmap::DashMap;
use fxhash::FxBuildHasher;

use crate::ambiguity::IntervalAmbiguitySet;
use crate::error::{Error, Result};
use crate::factored_bellman::factored_backup;
use crate::model::{FactoredModel, Model};
use crate::omax::backup_range;
use crate::ordering::Ordering;
use crate::strategy::{Strategy, StrategyCache};
use crate::types::{Direction, SatisfactionMode, StrategyMode};
use crate::workers::WorkerPool;

/// Concurrent "distinct states touched" tally, written from worker threads
/// during a backup and summarized into one debug-level log line per run; it
/// never feeds back into the backup itself.
type ExploredStates = DashMap<usize, (), FxBuildHasher>;

/// How many backups to run, and on which kernel(s).
#[derive(Debug, Clone)]
pub enum Horizon {
    /// Run exactly `h` backups (`h > 0`).
    Finite(usize),
    /// Run until the sup-norm residual drops below `epsilon` (`epsilon >
    /// 0`), always running at least one backup.
    Infinite { epsilon: f64 },
}

/// The kernel a VI run operates over: one model for the whole run, or one
/// per calendar step.
#[derive(Debug, Clone)]
pub enum Kernel {
    Stationary(Model),
    /// `kernels[t]` is the transition kernel active at calendar step `t`
    /// (`0`-indexed), i.e. `kernels.len()` must equal the horizon.
    TimeVarying(Vec<Model>),
}

impl Kernel {
    fn num_states(&self) -> usize {
        match self {
            Kernel::Stationary(m) => m.num_states(),
            Kernel::TimeVarying(models) => models[0].num_states(),
        }
    }

    /// The model active at 1-indexed iteration `i` of an `h`-step
    /// finite-horizon run (spec §4.F: iteration `i` uses `K_{h-i+1}`).
    fn model_for_iteration(&self, i: usize, h: usize) -> &Model {
        match self {
            Kernel::Stationary(m) => m,
            Kernel::TimeVarying(models) => &models[h - i],
        }
    }
}

/// How the Bellman backup forces (or leaves alone) terminal states at the
/// end of every iteration, and how `V^0` is seeded (spec §4.F step 4, §6's
/// property taxonomy).
#[derive(Debug, Clone)]
pub enum TerminalRule {
    /// Reachability to `targets`. `absorbing = true` makes `targets`
    /// absorbing (re-forced to `1` every iteration): this is plain
    /// (finite- or infinite-time) reachability. `absorbing = false` leaves
    /// `targets` alone after the initial indicator: this is
    /// `ExactTimeReachability`, where passing through a target state
    /// early does not count.
    Reachability { targets: Vec<bool>, absorbing: bool },
    /// Reach-avoid: `targets` forced to `1`, `avoid` forced to `0`, every
    /// iteration.
    ReachAvoid { targets: Vec<bool>, avoid: Vec<bool> },
    /// Safety: `avoid` forced to `0` every iteration; every other state
    /// starts at `1` and decreases via ordinary backups.
    Safety { avoid: Vec<bool> },
    /// Discounted reward accumulation: `V^{k+1}[s] = reward[s] +
    /// discount * backup(V^k)[s]`, except at `absorbing` states, which are
    /// held at `0` (used by `ExpectedExitTime`'s implicit absorption into
    /// the avoid set, and by any reward problem with designated sinks).
    Reward { reward: Vec<f64>, discount: f64, absorbing: Vec<bool> },
}

impl TerminalRule {
    fn initial_value(&self, n: usize) -> Vec<f64> {
        match self {
            TerminalRule::Reachability { targets, .. } | TerminalRule::ReachAvoid { targets, .. } => {
                (0..n).map(|s| if targets[s] { 1.0 } else { 0.0 }).collect()
            }
            TerminalRule::Safety { avoid } => (0..n).map(|s| if avoid[s] { 0.0 } else { 1.0 }).collect(),
            TerminalRule::Reward { .. } => vec![0.0; n],
        }
    }

    fn is_probability_property(&self) -> bool {
        !matches!(self, TerminalRule::Reward { .. })
    }

    /// Applies the forcing rule to one freshly-computed backup, in place.
    fn apply(&self, raw: &mut [f64]) {
        match self {
            TerminalRule::Reachability { targets, absorbing: true } => {
                for (s, &t) in targets.iter().enumerate() {
                    if t {
                        raw[s] = 1.0;
                    }
                }
            }
            TerminalRule::Reachability { absorbing: false, .. } => {}
            TerminalRule::ReachAvoid { targets, avoid } => {
                for s in 0..raw.len() {
                    if targets[s] {
                        raw[s] = 1.0;
                    } else if avoid[s] {
                        raw[s] = 0.0;
                    }
                }
            }
            TerminalRule::Safety { avoid } => {
                for (s, &a) in avoid.iter().enumerate() {
                    if a {
                        raw[s] = 0.0;
                    }
                }
            }
            TerminalRule::Reward { reward, discount, absorbing } => {
                for s in 0..raw.len() {
                    raw[s] = if absorbing[s] { 0.0 } else { reward[s] + *discount * raw[s] };
                }
            }
        }
    }
}

/// The parameters of one value-iteration run.
pub struct VIConfig<'a> {
    pub kernel: &'a Kernel,
    pub satisfaction_mode: SatisfactionMode,
    pub strategy_mode: StrategyMode,
    pub horizon: Horizon,
    pub terminal: TerminalRule,
    pub capture_strategy: bool,
    pub workers: &'a WorkerPool,
    /// Polled between iterations; if it returns `true` the run stops and
    /// reports [`Error::Cancelled`] alongside the last completed iterate.
    pub cancel: Option<&'a dyn Fn() -> bool>,
}

/// The result of a completed (or cancelled) value-iteration run.
pub struct VIOutcome {
    pub value: Vec<f64>,
    pub iterations: usize,
    pub residual: f64,
    pub strategy: Option<Strategy>,
}

/// Runs value iteration per `config`, driving either the flat O-max
/// primitive or the factored tensor contraction depending on the active
/// model's kind.
pub fn run(config: &VIConfig<'_>) -> Result<VIOutcome> {
    if let (Kernel::TimeVarying(_), Horizon::Infinite { .. }) = (config.kernel, &config.horizon) {
        return Err(Error::InvalidSpecification("an infinite-horizon problem cannot use a time-varying kernel".into()));
    }
    let n = config.kernel.num_states();
    log::debug!(
        "starting value iteration over {n} states, satisfaction={:?}, strategy={:?}, capture_strategy={}",
        config.satisfaction_mode,
        config.strategy_mode,
        config.capture_strategy
    );
    let mut value = config.terminal.initial_value(n);
    let action_dir = config.strategy_mode.action_direction();
    let interval_dir = config.satisfaction_mode.interval_direction(config.strategy_mode);

    let mut per_step_strategy: Option<Vec<Vec<usize>>> = None;
    let mut last_stationary: Option<StrategyCache> = None;
    let mut iterations = 0usize;
    let mut residual = 0.0f64;
    let explored: ExploredStates = DashMap::default();

    let max_iterations = match config.horizon {
        Horizon::Finite(h) => h,
        Horizon::Infinite { .. } => usize::MAX,
    };
    if let Horizon::Finite(0) = config.horizon {
        return Err(Error::InvalidSpecification("horizon must be positive".into()));
    }
    if let Horizon::Infinite { epsilon } = config.horizon {
        if epsilon <= 0.0 {
            return Err(Error::InvalidSpecification("convergence tolerance must be positive".into()));
        }
    }
    if let Kernel::TimeVarying(models) = config.kernel {
        if let Horizon::Finite(h) = config.horizon {
            if models.len() != h {
                return Err(Error::InvalidSpecification(format!(
                    "time-varying kernel has {} steps, horizon is {h}",
                    models.len()
                )));
            }
        }
    }

    for k in 0..max_iterations {
        if let Some(cancel) = config.cancel {
            if cancel() {
                log::info!("verification cancelled after {iterations} iteration(s)");
                return Err(Error::Cancelled { iterations });
            }
        }
        let i = k + 1;
        let h = match config.horizon {
            Horizon::Finite(h) => h,
            Horizon::Infinite { .. } => i,
        };
        let model = config.kernel.model_for_iteration(i, h);
        let mut cache = StrategyCache::new(n, config.capture_strategy);

        let mut raw = backup_once(model, &value, action_dir, interval_dir, config.workers, &mut cache, &explored)?;
        config.terminal.apply(&mut raw);
        if config.terminal.is_probability_property() {
            for v in &mut raw {
                *v = v.clamp(0.0, 1.0);
            }
        }

        residual = raw.iter().zip(value.iter()).map(|(a, b)| (a - b).abs()).fold(0.0, f64::max).max(0.0);
        value = raw;
        iterations = i;
        log::trace!("iteration {i} done, residual={residual}");

        if config.capture_strategy {
            if matches!(config.horizon, Horizon::Finite(_)) {
                let snap = cache.snapshot().unwrap_or_default();
                let steps = per_step_strategy.get_or_insert_with(|| vec![Vec::new(); h]);
                steps[h - i] = snap;
            } else {
                last_stationary = Some(cache);
            }
        }

        if let Horizon::Infinite { epsilon } = config.horizon {
            if residual < epsilon {
                break;
            }
        }
    }

    let strategy = if config.capture_strategy {
        match config.horizon {
            Horizon::Finite(_) => per_step_strategy.map(Strategy::TimeVarying),
            Horizon::Infinite { .. } => last_stationary.and_then(StrategyCache::into_stationary),
        }
    } else {
        None
    };

    log::debug!(
        "value iteration converged after {iterations} iteration(s), residual={residual}, {} distinct states touched",
        explored.len()
    );
    Ok(VIOutcome { value, iterations, residual, strategy })
}

fn backup_once(
    model: &Model,
    value: &[f64],
    action_dir: Direction,
    interval_dir: Direction,
    workers: &WorkerPool,
    cache: &mut StrategyCache,
    explored: &ExploredStates,
) -> Result<Vec<f64>> {
    match model {
        Model::Flat(flat) => {
            let mut ordering = Ordering::for_ambiguity(flat.num_states(), flat.ambiguity());
            ordering.sort_states(value, interval_dir);
            let ambiguity = flat.ambiguity();
            let n = flat.num_states();
            let flat_ref = flat;
            let chunks = workers.try_map_chunks(n, |range| -> Result<Vec<(f64, usize)>> {
                range
                    .map(|s| {
                        explored.insert(s, ());
                        let backup = backup_range(ambiguity, flat_ref.actions(s), value, &ordering, action_dir)?;
                        Ok((backup.value, backup.column - flat_ref.actions(s).start))
                    })
                    .collect()
            })?;
            let mut raw = Vec::with_capacity(n);
            for chunk in chunks {
                for (v, a) in chunk {
                    raw.push(v);
                    if cache.is_active() {
                        cache.record(raw.len() - 1, a);
                    }
                }
            }
            Ok(raw)
        }
        Model::Factored(fm) => backup_factored(fm, value, action_dir, interval_dir, workers, cache, explored),
    }
}

fn decompose(values: &[usize], mut flat: usize) -> Vec<usize> {
    let mut out = vec![0usize; values.len()];
    for d in (0..values.len()).rev() {
        let card = values[d];
        out[d] = flat % card;
        flat /= card;
    }
    out
}

fn backup_factored(
    fm: &FactoredModel,
    value: &[f64],
    action_dir: Direction,
    interval_dir: Direction,
    workers: &WorkerPool,
    cache: &mut StrategyCache,
    explored: &ExploredStates,
) -> Result<Vec<f64>> {
    let n = fm.num_states();
    let num_actions = fm.num_actions();
    let chunks = workers.try_map_chunks(n, |range| -> Result<Vec<(f64, usize)>> {
        range
            .map(|s| {
                explored.insert(s, ());
                let source = fm.decompose_state(s);
                let mut best: Option<(f64, usize)> = None;
                for a in 0..num_actions {
                    let action = decompose(&fm.action_values, a);
                    let v = factored_backup(fm, value, &source, &action, interval_dir)?;
                    let take = match (&best, action_dir) {
                        (None, _) => true,
                        (Some((bv, _)), Direction::Max) => v > *bv,
                        (Some((bv, _)), Direction::Min) => v < *bv,
                    };
                    if take {
                        best = Some((v, a));
                    }
                }
                Ok(best.expect("a state must have at least one action"))
            })
            .collect()
    })?;
    let mut raw = Vec::with_capacity(n);
    for chunk in chunks {
        for (v, a) in chunk {
            raw.push(v);
            if cache.is_active() {
                cache.record(raw.len() - 1, a);
            }
        }
    }
    Ok(raw)
}

/// One-shot application of the O-max primitive over every column of
/// `ambiguity`, independent of any `stateptr`/model structure (spec §6:
/// `bellman(V, ambiguity, direction) -> V'`, the entry point for tests that
/// want a single Bellman step without building a full model/problem).
pub fn bellman(value: &[f64], ambiguity: &IntervalAmbiguitySet, direction: Direction) -> Result<Vec<f64>> {
    let mut ordering = Ordering::for_ambiguity(value.len(), ambiguity);
    ordering.sort_states(value, direction);
    (0..ambiguity.num_columns())
        .map(|j| crate::omax::omax(ambiguity.column(j), value, ordering.perm_for(j)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FlatModel;

    fn chain_set() -> IntervalAmbiguitySet {
        let lower = vec![0.0, 0.1, 0.2, 0.5, 0.3, 0.1, 0.0, 0.0, 1.0];
        let upper = vec![0.5, 0.6, 0.7, 0.7, 0.5, 0.3, 0.0, 0.0, 1.0];
        IntervalAmbiguitySet::new(3, 3, lower, upper).unwrap()
    }

    #[test]
    fn one_shot_bellman_matches_spec_scenario_one() {
        let set = chain_set();
        let v = bellman(&[1.0, 2.0, 3.0], &set, Direction::Min).unwrap();
        assert!((v[0] - 1.7).abs() < 1e-9);
        assert!((v[1] - 1.5).abs() < 1e-9);
        assert!((v[2] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn reachability_is_monotone_nondecreasing() {
        // A simple 2-state chain, state 1 is the reach target and absorbing
        // from state 0's perspective (gap = 0, deterministic 50/50 split).
        let lower = vec![0.5, 0.5, 0.0, 1.0];
        let upper = lower.clone();
        let ambiguity = IntervalAmbiguitySet::new(2, 2, lower, upper).unwrap();
        let model = Model::Flat(FlatModel::markov_chain(ambiguity).unwrap());
        let kernel = Kernel::Stationary(model);
        let workers = WorkerPool::with_workers(1);
        let mut prev = vec![f64::MIN; 2];
        for h in 1..=5 {
            let config = VIConfig {
                kernel: &kernel,
                satisfaction_mode: SatisfactionMode::Pessimistic,
                strategy_mode: StrategyMode::Maximize,
                horizon: Horizon::Finite(h),
                terminal: TerminalRule::Reachability { targets: vec![false, true], absorbing: true },
                capture_strategy: false,
                workers: &workers,
                cancel: None,
            };
            let outcome = run(&config).unwrap();
            assert!(outcome.value[0] >= prev[0] - 1e-12, "V not nondecreasing at horizon {h}");
            assert!(outcome.value[0] >= 0.0 && outcome.value[0] <= 1.0);
            prev = outcome.value;
        }
    }

    #[test]
    fn finite_time_dfa_style_two_state_converges_to_one() {
        let lower = vec![0.0, 1.0, 0.0, 1.0];
        let upper = lower.clone();
        let ambiguity = IntervalAmbiguitySet::new(2, 2, lower, upper).unwrap();
        let model = Model::Flat(FlatModel::markov_chain(ambiguity).unwrap());
        let kernel = Kernel::Stationary(model);
        let workers = WorkerPool::with_workers(2);
        let config = VIConfig {
            kernel: &kernel,
            satisfaction_mode: SatisfactionMode::Pessimistic,
            strategy_mode: StrategyMode::Maximize,
            horizon: Horizon::Finite(3),
            terminal: TerminalRule::Reachability { targets: vec![false, true], absorbing: true },
            capture_strategy: false,
            workers: &workers,
            cancel: None,
        };
        let outcome = run(&config).unwrap();
        assert!((outcome.value[1] - 1.0).abs() < 1e-12);
    }
}
