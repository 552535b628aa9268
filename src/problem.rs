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

//! Bundles a model (or a model lifted through a product process) with a
//! named property into a problem that can be handed straight to [`solve`].
//! This is the layer that translates the property taxonomy into the
//! [`TerminalRule`]/[`Horizon`]/[`Kernel`] triple the value-iteration driver
//! actually consumes.

use derive_builder::Builder;

use crate::error::{Error, Result};
use crate::model::Model;
use crate::product::ProductProcess;
use crate::types::{SatisfactionMode, StrategyMode};
use crate::vi::{self, Horizon, Kernel, TerminalRule, VIConfig, VIOutcome};
use crate::workers::WorkerPool;

/// The closed taxonomy of properties this engine verifies or synthesizes
/// strategies for.
#[derive(Debug, Clone)]
pub enum Property {
    FiniteTimeReachability { targets: Vec<bool>, horizon: usize },
    InfiniteTimeReachability { targets: Vec<bool>, epsilon: f64 },
    /// Reachability where passing through a target early does not count:
    /// `targets` is only forced into the indicator at `V^0`, never
    /// re-forced by later backups.
    ExactTimeReachability { targets: Vec<bool>, horizon: usize },
    FiniteTimeReachAvoid { targets: Vec<bool>, avoid: Vec<bool>, horizon: usize },
    InfiniteTimeReachAvoid { targets: Vec<bool>, avoid: Vec<bool>, epsilon: f64 },
    FiniteTimeSafety { avoid: Vec<bool>, horizon: usize },
    InfiniteTimeSafety { avoid: Vec<bool>, epsilon: f64 },
    FiniteTimeReward { reward: Vec<f64>, discount: f64, absorbing: Vec<bool>, horizon: usize },
    InfiniteTimeReward { reward: Vec<f64>, discount: f64, absorbing: Vec<bool>, epsilon: f64 },
    /// Expected number of steps until entering `avoid`, modelled as a
    /// discount-`1.0` reward problem with `reward = 1` everywhere and
    /// `avoid` as the absorbing (zero-valued) set.
    ExpectedExitTime { avoid: Vec<bool>, epsilon: f64 },
    /// Reachability to an automaton's accepting states over a
    /// [`ProductProcess`]; the per-state target/avoid sets come from the
    /// automaton, not from the caller.
    FiniteTimeDFAReachability { horizon: usize },
    InfiniteTimeDFAReachability { epsilon: f64 },
}

impl Property {
    fn is_dfa(&self) -> bool {
        matches!(self, Property::FiniteTimeDFAReachability { .. } | Property::InfiniteTimeDFAReachability { .. })
    }

    fn validate(&self, num_states: usize) -> Result<()> {
        let check_set = |name: &str, set: &[bool]| -> Result<()> {
            if set.len() != num_states {
                return Err(Error::InvalidSpecification(format!(
                    "{name} has {} entries, model has {num_states} states",
                    set.len()
                )));
            }
            Ok(())
        };
        let check_disjoint = |targets: &[bool], avoid: &[bool]| -> Result<()> {
            if targets.iter().zip(avoid.iter()).any(|(&t, &a)| t && a) {
                return Err(Error::InvalidSpecification("target and avoid sets must be disjoint".into()));
            }
            Ok(())
        };
        let check_horizon = |h: usize| -> Result<()> {
            if h == 0 {
                return Err(Error::InvalidSpecification("horizon must be positive".into()));
            }
            Ok(())
        };
        let check_epsilon = |e: f64| -> Result<()> {
            if e <= 0.0 {
                return Err(Error::InvalidSpecification("convergence tolerance must be positive".into()));
            }
            Ok(())
        };

        match self {
            Property::FiniteTimeReachability { targets, horizon } | Property::ExactTimeReachability { targets, horizon } => {
                check_set("targets", targets)?;
                check_horizon(*horizon)
            }
            Property::InfiniteTimeReachability { targets, epsilon } => {
                check_set("targets", targets)?;
                check_epsilon(*epsilon)
            }
            Property::FiniteTimeReachAvoid { targets, avoid, horizon } => {
                check_set("targets", targets)?;
                check_set("avoid", avoid)?;
                check_disjoint(targets, avoid)?;
                check_horizon(*horizon)
            }
            Property::InfiniteTimeReachAvoid { targets, avoid, epsilon } => {
                check_set("targets", targets)?;
                check_set("avoid", avoid)?;
                check_disjoint(targets, avoid)?;
                check_epsilon(*epsilon)
            }
            Property::FiniteTimeSafety { avoid, horizon } => {
                check_set("avoid", avoid)?;
                check_horizon(*horizon)
            }
            Property::InfiniteTimeSafety { avoid, epsilon } => {
                check_set("avoid", avoid)?;
                check_epsilon(*epsilon)
            }
            Property::FiniteTimeReward { reward, absorbing, discount, horizon } => {
                check_set("absorbing", absorbing)?;
                if reward.len() != num_states {
                    return Err(Error::InvalidSpecification(format!(
                        "reward has {} entries, model has {num_states} states",
                        reward.len()
                    )));
                }
                if *discount <= 0.0 {
                    return Err(Error::InvalidSpecification("discount must be strictly positive".into()));
                }
                check_horizon(*horizon)
            }
            Property::InfiniteTimeReward { reward, absorbing, discount, epsilon } => {
                check_set("absorbing", absorbing)?;
                if reward.len() != num_states {
                    return Err(Error::InvalidSpecification(format!(
                        "reward has {} entries, model has {num_states} states",
                        reward.len()
                    )));
                }
                if !(*discount > 0.0 && *discount < 1.0) {
                    return Err(Error::InvalidSpecification("discount must lie in the open interval (0, 1)".into()));
                }
                check_epsilon(*epsilon)
            }
            Property::ExpectedExitTime { avoid, epsilon } => {
                check_set("avoid", avoid)?;
                check_epsilon(*epsilon)
            }
            Property::FiniteTimeDFAReachability { horizon } => check_horizon(*horizon),
            Property::InfiniteTimeDFAReachability { epsilon } => check_epsilon(*epsilon),
        }
    }

    fn terminal_rule(&self) -> TerminalRule {
        match self.clone() {
            Property::FiniteTimeReachability { targets, .. } | Property::InfiniteTimeReachability { targets, .. } => {
                TerminalRule::Reachability { targets, absorbing: true }
            }
            Property::ExactTimeReachability { targets, .. } => TerminalRule::Reachability { targets, absorbing: false },
            Property::FiniteTimeReachAvoid { targets, avoid, .. } | Property::InfiniteTimeReachAvoid { targets, avoid, .. } => {
                TerminalRule::ReachAvoid { targets, avoid }
            }
            Property::FiniteTimeSafety { avoid, .. } | Property::InfiniteTimeSafety { avoid, .. } => TerminalRule::Safety { avoid },
            Property::FiniteTimeReward { reward, discount, absorbing, .. } | Property::InfiniteTimeReward { reward, discount, absorbing, .. } => {
                TerminalRule::Reward { reward, discount, absorbing }
            }
            Property::ExpectedExitTime { avoid, .. } => TerminalRule::Reward {
                reward: avoid.iter().map(|&a| if a { 0.0 } else { 1.0 }).collect(),
                discount: 1.0,
                absorbing: avoid,
            },
            Property::FiniteTimeDFAReachability { .. } | Property::InfiniteTimeDFAReachability { .. } => {
                unreachable!("DFA properties are resolved against the product process's own accepting targets")
            }
        }
    }

    fn horizon(&self) -> Horizon {
        match self {
            Property::FiniteTimeReachability { horizon, .. }
            | Property::ExactTimeReachability { horizon, .. }
            | Property::FiniteTimeReachAvoid { horizon, .. }
            | Property::FiniteTimeSafety { horizon, .. }
            | Property::FiniteTimeReward { horizon, .. }
            | Property::FiniteTimeDFAReachability { horizon } => Horizon::Finite(*horizon),
            Property::InfiniteTimeReachability { epsilon, .. }
            | Property::InfiniteTimeReachAvoid { epsilon, .. }
            | Property::InfiniteTimeSafety { epsilon, .. }
            | Property::InfiniteTimeReward { epsilon, .. }
            | Property::ExpectedExitTime { epsilon, .. }
            | Property::InfiniteTimeDFAReachability { epsilon } => Horizon::Infinite { epsilon: *epsilon },
        }
    }
}

/// A verification problem: a model, the property to check it against, the
/// satisfaction mode the interval ambiguity is resolved under, and the
/// direction actions are read in (defaults to `Maximize`, the usual "does
/// some controller satisfy this" reading; set `Minimize` to check a property
/// against the worst action instead of asking for a witness strategy).
#[derive(Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct VerificationProblem {
    model: Model,
    /// Present only for [`Property::FiniteTimeDFAReachability`] /
    /// [`Property::InfiniteTimeDFAReachability`]; `model` must be the flat
    /// base model the product is built over.
    #[builder(default)]
    product: Option<ProductProcess>,
    property: Property,
    #[builder(default = "SatisfactionMode::Pessimistic")]
    satisfaction_mode: SatisfactionMode,
    #[builder(default = "StrategyMode::Maximize")]
    strategy_mode: StrategyMode,
    #[builder(default = "WorkerPool::new()")]
    workers: WorkerPool,
}

impl VerificationProblemBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        let model = self.model.as_ref().ok_or("model is required")?;
        let property = self.property.as_ref().ok_or("property is required")?;
        let product = self.product.clone().flatten();
        let num_states = match &product {
            Some(p) => p.num_states(),
            None => model.num_states(),
        };
        if property.is_dfa() != product.is_some() {
            return Err("a DFA-valued property requires a product process, and vice versa".into());
        }
        property.validate(num_states).map_err(|e| e.to_string())?;
        log::debug!("built verification problem over {num_states} states, property={property:?}");
        Ok(())
    }
}

impl VerificationProblem {
    /// Runs value iteration to completion and returns the resulting value
    /// array (and, incidentally, residual/iteration bookkeeping), without
    /// capturing a strategy.
    pub fn solve(&self) -> Result<VIOutcome> {
        solve_inner(&self.model, self.product.as_ref(), &self.property, self.satisfaction_mode, self.strategy_mode, &self.workers, false)
    }
}

/// A control-synthesis problem: a [`VerificationProblem`] plus the
/// direction actions are optimized in, whose solution also yields a
/// [`Strategy`].
#[derive(Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct ControlSynthesisProblem {
    model: Model,
    #[builder(default)]
    product: Option<ProductProcess>,
    property: Property,
    #[builder(default = "SatisfactionMode::Pessimistic")]
    satisfaction_mode: SatisfactionMode,
    strategy_mode: StrategyMode,
    #[builder(default = "WorkerPool::new()")]
    workers: WorkerPool,
}

impl ControlSynthesisProblemBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        let model = self.model.as_ref().ok_or("model is required")?;
        let property = self.property.as_ref().ok_or("property is required")?;
        if self.strategy_mode.is_none() {
            return Err("strategy_mode is required".into());
        }
        let product = self.product.clone().flatten();
        let num_states = match &product {
            Some(p) => p.num_states(),
            None => model.num_states(),
        };
        if property.is_dfa() != product.is_some() {
            return Err("a DFA-valued property requires a product process, and vice versa".into());
        }
        property.validate(num_states).map_err(|e| e.to_string())?;
        log::debug!("built control synthesis problem over {num_states} states, property={property:?}");
        Ok(())
    }
}

impl ControlSynthesisProblem {
    /// Runs value iteration to completion, capturing a [`Strategy`]
    /// alongside the converged value array.
    pub fn solve(&self) -> Result<VIOutcome> {
        solve_inner(&self.model, self.product.as_ref(), &self.property, self.satisfaction_mode, self.strategy_mode, &self.workers, true)
    }
}

fn solve_inner(
    model: &Model,
    product: Option<&ProductProcess>,
    property: &Property,
    satisfaction_mode: SatisfactionMode,
    strategy_mode: StrategyMode,
    workers: &WorkerPool,
    capture_strategy: bool,
) -> Result<VIOutcome> {
    if let Some(process) = product {
        let Model::Flat(base) = model else {
            return Err(Error::IncompatibleModelAndProperty("a product process can only lift a flat base model".into()));
        };
        return crate::product::run(process, base, satisfaction_mode, strategy_mode, property.horizon(), capture_strategy, workers, None);
    }

    let kernel = Kernel::Stationary(model.clone());
    let config = VIConfig {
        kernel: &kernel,
        satisfaction_mode,
        strategy_mode,
        horizon: property.horizon(),
        terminal: property.terminal_rule(),
        capture_strategy,
        workers,
        cancel: None,
    };
    vi::run(&config)
}

/// Re-export of the one-shot O-max entry point (spec §6's `bellman(V,
/// ambiguity, direction) -> V'`), so callers that only need a single
/// Bellman step don't have to reach into `vi` directly.
pub use crate::vi::bellman;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ambiguity::IntervalAmbiguitySet;
    use crate::model::FlatModel;
    use crate::strategy::Strategy;

    fn two_state_chain() -> Model {
        let lower = vec![0.5, 0.5, 0.0, 1.0];
        let upper = lower.clone();
        let ambiguity = IntervalAmbiguitySet::new(2, 2, lower, upper).unwrap();
        Model::Flat(FlatModel::markov_chain(ambiguity).unwrap())
    }

    #[test]
    fn reachability_problem_solves_and_matches_direct_vi_call() {
        let model = two_state_chain();
        let problem = VerificationProblemBuilder::default()
            .model(model)
            .property(Property::FiniteTimeReachability { targets: vec![false, true], horizon: 3 })
            .build()
            .unwrap();
        let outcome = problem.solve().unwrap();
        assert!((outcome.value[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn reach_avoid_rejects_overlapping_sets() {
        let model = two_state_chain();
        let err = VerificationProblemBuilder::default()
            .model(model)
            .property(Property::FiniteTimeReachAvoid { targets: vec![true, false], avoid: vec![true, false], horizon: 3 })
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn dfa_property_without_a_product_process_is_rejected() {
        let model = two_state_chain();
        let err = VerificationProblemBuilder::default()
            .model(model)
            .property(Property::FiniteTimeDFAReachability { horizon: 3 })
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn synthesis_problem_captures_a_strategy() {
        let model = two_state_chain();
        let problem = ControlSynthesisProblemBuilder::default()
            .model(model)
            .property(Property::InfiniteTimeReachability { targets: vec![false, true], epsilon: 1e-10 })
            .strategy_mode(StrategyMode::Maximize)
            .build()
            .unwrap();
        let outcome = problem.solve().unwrap();
        assert!(outcome.strategy.is_some());
        assert!(matches!(outcome.strategy, Some(Strategy::Stationary(_))));
    }
}
