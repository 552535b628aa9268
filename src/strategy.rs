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

//! The strategy cache written during value iteration, and the two shapes a
//! captured strategy can take once VI is done.

/// A captured control strategy: which action to take at each state.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// One action index per state, valid at every time step. Captured from
    /// the last completed iteration of an infinite-horizon (or
    /// infinite-horizon-equivalent) run.
    Stationary(Vec<usize>),
    /// One action index per state, per time step, indexed in calendar order
    /// (`actions[0]` is the action taken at the first step). Captured from
    /// a finite-horizon run over a possibly time-varying kernel.
    TimeVarying(Vec<Vec<usize>>),
}

impl Strategy {
    /// The action prescribed at `state`, for a stationary strategy, or at
    /// `state` at calendar step `step` for a time-varying one.
    pub fn action_at(&self, state: usize, step: usize) -> usize {
        match self {
            Strategy::Stationary(actions) => actions[state],
            Strategy::TimeVarying(per_step) => per_step[step][state],
        }
    }
}

/// The write side of strategy capture during a backup: disjoint per-state
/// writes from worker threads land here. A no-op when the problem being
/// solved isn't a synthesis problem, so a verification-only run pays
/// nothing for it.
#[derive(Debug, Clone)]
pub(crate) struct StrategyCache {
    actions: Option<Vec<usize>>,
}

impl StrategyCache {
    pub fn new(num_states: usize, capture: bool) -> Self {
        Self { actions: capture.then(|| vec![0; num_states]) }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.actions.is_some()
    }

    /// Records that `action` (a column index within the model's own action
    /// numbering, not the ambiguity set's flat column index) was chosen for
    /// `state`. A no-op if capture wasn't requested.
    #[inline]
    pub fn record(&mut self, state: usize, action: usize) {
        if let Some(actions) = &mut self.actions {
            actions[state] = action;
        }
    }

    /// Takes a snapshot of the current actions, for a finite-horizon run
    /// that needs one per calendar step. Returns `None` if capture wasn't
    /// requested.
    pub fn snapshot(&self) -> Option<Vec<usize>> {
        self.actions.clone()
    }

    /// Consumes the cache into a stationary strategy, for an
    /// infinite-horizon run that only needs the last iteration's actions.
    pub fn into_stationary(self) -> Option<Strategy> {
        self.actions.map(Strategy::Stationary)
    }
}
