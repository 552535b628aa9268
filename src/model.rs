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

//! The two model representations this engine understands: a flat
//! `(source, action) -> ambiguity set` IMDP indexed by a CSC-style
//! `stateptr` offset array, and a factored model in which the transition
//! kernel is a tensor product of per-variable marginals.
//!
//! Both are concrete, closed representations (see spec §9's note on
//! dispatching over a tagged enum rather than open polymorphism): the rest
//! of the engine matches on [`Model`] rather than being generic over a
//! user-supplied trait.

use crate::ambiguity::IntervalAmbiguitySet;
use crate::error::{Error, Result};

/// The classification tag used to route a model to the right Bellman
/// kernel (plain O-max for `Imdp`/`Rmdp`, the factored/McCormick backup for
/// the `Factored*` variants).
///
/// This crate implements the interval ambiguity class exactly (spec §1);
/// its ambiguity sets are always boxes, so `Rmdp`/`FactoredRmdp` are not
/// reachable from any constructor in this crate today. They are kept in
/// the tag so that a future general box-and-linear ambiguity class (the
/// "robust" case mentioned in the glossary) has somewhere to land without
/// a breaking change to this enum; see DESIGN.md.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ModelKind {
    Imdp,
    Rmdp,
    FactoredImdp,
    FactoredRmdp,
}

/// A flat interval MDP (or interval Markov chain, the special case where
/// every state has exactly one action): all `(source, action)` columns
/// stored contiguously in one [`IntervalAmbiguitySet`], sliced per source
/// state by a CSC-style offset array.
#[derive(Debug, Clone)]
pub struct FlatModel {
    num_states: usize,
    /// `stateptr[s] .. stateptr[s + 1]` are the column indices of the
    /// actions available at source state `s`. Length `num_states + 1`,
    /// strictly increasing, `stateptr[0] == 0`, `stateptr[num_states] ==
    /// ambiguity.num_columns()`.
    stateptr: Vec<usize>,
    ambiguity: IntervalAmbiguitySet,
}

impl FlatModel {
    /// Builds a flat model from a pre-assembled ambiguity set and
    /// `stateptr`, checking the invariants of spec §3.
    pub fn new(num_states: usize, stateptr: Vec<usize>, ambiguity: IntervalAmbiguitySet) -> Result<Self> {
        if stateptr.len() != num_states + 1 {
            return Err(Error::DimensionMismatch(format!(
                "stateptr must have length num_states + 1 = {}, got {}",
                num_states + 1,
                stateptr.len()
            )));
        }
        if stateptr[0] != 0 {
            return Err(Error::DimensionMismatch("stateptr[0] must be 0".into()));
        }
        if stateptr[num_states] != ambiguity.num_columns() {
            return Err(Error::DimensionMismatch(format!(
                "stateptr[num_states] = {} must equal the ambiguity set's column count {}",
                stateptr[num_states],
                ambiguity.num_columns()
            )));
        }
        for w in stateptr.windows(2) {
            if w[1] <= w[0] {
                return Err(Error::DimensionMismatch(
                    "stateptr must be strictly increasing: every state needs at least one action".into(),
                ));
            }
        }
        if ambiguity.num_targets() != num_states {
            return Err(Error::DimensionMismatch(format!(
                "ambiguity set targets {} states, model declares {num_states}",
                ambiguity.num_targets()
            )));
        }
        Ok(Self { num_states, stateptr, ambiguity })
    }

    /// Builds the Markov-chain special case: one action per state,
    /// `stateptr[s] = s`.
    pub fn markov_chain(ambiguity: IntervalAmbiguitySet) -> Result<Self> {
        let n = ambiguity.num_targets();
        if ambiguity.num_columns() != n {
            return Err(Error::DimensionMismatch(format!(
                "a Markov chain needs exactly one column per state: {n} states, {} columns",
                ambiguity.num_columns()
            )));
        }
        let stateptr = (0..=n).collect();
        Self::new(n, stateptr, ambiguity)
    }

    #[inline]
    pub fn num_states(&self) -> usize {
        self.num_states
    }

    #[inline]
    pub fn ambiguity(&self) -> &IntervalAmbiguitySet {
        &self.ambiguity
    }

    #[inline]
    pub fn stateptr(&self) -> &[usize] {
        &self.stateptr
    }

    /// The column range of the action block belonging to source state `s`.
    #[inline]
    pub fn actions(&self, s: usize) -> std::ops::Range<usize> {
        self.stateptr[s]..self.stateptr[s + 1]
    }

    #[inline]
    pub fn num_actions(&self, s: usize) -> usize {
        self.actions(s).len()
    }
}

/// Concatenates one [`IntervalAmbiguitySet`] per source state into a single
/// set plus a `stateptr` offset array, in source order.
///
/// This is the `interval_prob_hcat` utility referenced by spec §9's open
/// question (b): stack the per-source columns in order, and emit the
/// cumulative action counts as `stateptr`, starting at `0` (the Rust
/// equivalent of the original's "prepend a 1" in a 1-indexed language).
pub fn interval_prob_hcat(per_state: Vec<IntervalAmbiguitySet>) -> Result<(IntervalAmbiguitySet, Vec<usize>)> {
    if per_state.is_empty() {
        return Err(Error::DimensionMismatch("interval_prob_hcat needs at least one state".into()));
    }
    let n = per_state[0].num_targets();
    let mut lower = Vec::new();
    let mut gap = Vec::new();
    let mut stateptr = Vec::with_capacity(per_state.len() + 1);
    stateptr.push(0);
    for (s, set) in per_state.iter().enumerate() {
        if set.num_targets() != n {
            return Err(Error::DimensionMismatch(format!(
                "state {s} targets {} states, expected {n}",
                set.num_targets()
            )));
        }
        for j in 0..set.num_columns() {
            for i in 0..n {
                lower.push(set.lower(j, i));
                gap.push(set.gap(j, i));
            }
        }
        stateptr.push(stateptr[s] + set.num_columns());
    }
    let m = *stateptr.last().unwrap();
    let merged = IntervalAmbiguitySet::from_parts_unchecked(n, m, lower, gap);
    Ok((merged, stateptr))
}

/// One marginal of a factored model: the transition kernel of state
/// variable `i`, conditioned on a subset of the global state and action
/// variables.
#[derive(Debug, Clone)]
pub struct Marginal {
    /// Indices, into the model's global state-variable list, that this
    /// marginal's ambiguity set is conditioned on.
    pub state_deps: Vec<usize>,
    /// Indices, into the model's global action-variable list, that this
    /// marginal's ambiguity set is conditioned on.
    pub action_deps: Vec<usize>,
    /// Cardinalities along `state_deps`, in the same order. A value
    /// smaller than the corresponding global cardinality designates an
    /// implicit-sink truncation: source values beyond this shape are
    /// terminal and skip the O-max reduction (spec §4.E).
    pub source_shape: Vec<usize>,
    /// Cardinalities along `action_deps`, in the same order.
    pub action_shape: Vec<usize>,
    /// The cardinality of this marginal's own (target) state variable.
    /// Becomes the length of axis `i` of the joint value tensor.
    pub target_card: usize,
    /// One column per joint value of `(action_deps, state_deps)`, laid out
    /// row-major with the action axis innermost (§4.E): column index is
    /// `linearize(source_shape, source_values) * product(action_shape) +
    /// linearize(action_shape, action_values)`.
    pub ambiguity: IntervalAmbiguitySet,
}

impl Marginal {
    /// The number of columns this marginal's ambiguity set must have:
    /// `product(action_shape) * product(source_shape)`.
    pub fn expected_columns(&self) -> usize {
        let actions: usize = self.action_shape.iter().product::<usize>().max(1);
        let states: usize = self.source_shape.iter().product::<usize>().max(1);
        actions * states
    }

    /// Linearizes a joint `(action_values, source_values)` pair into the
    /// column index of this marginal's ambiguity set, row-major with
    /// actions innermost.
    pub fn column_index(&self, action_values: &[usize], source_values: &[usize]) -> usize {
        let mut s_idx = 0usize;
        for (&val, &card) in source_values.iter().zip(self.source_shape.iter()) {
            s_idx = s_idx * card + val;
        }
        let mut a_idx = 0usize;
        let mut action_card = 1usize;
        for (&val, &card) in action_values.iter().zip(self.action_shape.iter()) {
            a_idx = a_idx * card + val;
            action_card *= card;
        }
        s_idx * action_card + a_idx
    }

    /// Whether `source_value` (this marginal's own coordinate along its
    /// (sole) state dependency) falls outside the declared `source_shape`
    /// and is therefore an implicit sink.
    ///
    /// Only meaningful when `state_deps` has exactly one entry, which is
    /// the common case (and the only one spec §4.E gives sink semantics
    /// for); multi-dependency marginals never treat any slice as a sink.
    pub fn is_implicit_sink(&self, source_value: usize) -> bool {
        self.state_deps.len() == 1 && self.source_shape.len() == 1 && source_value >= self.source_shape[0]
    }
}

/// A factored model: an ordered tuple of marginals, one per state
/// variable, whose product forms the joint transition kernel (spec §3).
#[derive(Debug, Clone)]
pub struct FactoredModel {
    /// Cardinality of each state variable (global, not truncated by any
    /// marginal's sink shape).
    pub state_values: Vec<usize>,
    /// Cardinality of each action variable (global).
    pub action_values: Vec<usize>,
    /// One marginal per state variable, `marginals[i]` governs axis `i` of
    /// the joint value tensor.
    pub marginals: Vec<Marginal>,
    /// Optional list of admissible initial joint states, each a tuple of
    /// per-variable values.
    pub initial_states: Option<Vec<Vec<usize>>>,
}

impl FactoredModel {
    /// Validates the bookkeeping invariants of spec §4.D and returns
    /// `self` unchanged on success.
    pub fn validate(self) -> Result<Self> {
        if self.state_values.is_empty() {
            return Err(Error::DimensionMismatch("a factored model needs at least one state variable".into()));
        }
        if self.state_values.iter().any(|&c| c == 0) || self.action_values.iter().any(|&c| c == 0) {
            return Err(Error::DimensionMismatch("state/action variable counts must be positive".into()));
        }
        if self.marginals.len() != self.state_values.len() {
            return Err(Error::DimensionMismatch(format!(
                "expected one marginal per state variable ({}), got {}",
                self.state_values.len(),
                self.marginals.len()
            )));
        }
        for (i, m) in self.marginals.iter().enumerate() {
            if m.target_card != self.state_values[i] {
                return Err(Error::DimensionMismatch(format!(
                    "marginal {i}'s target cardinality {} does not match the global cardinality {}",
                    m.target_card, self.state_values[i]
                )));
            }
            for (&dep, &shape) in m.state_deps.iter().zip(m.source_shape.iter()) {
                let global = *self.state_values.get(dep).ok_or_else(|| {
                    Error::DimensionMismatch(format!("marginal {i} depends on unknown state variable {dep}"))
                })?;
                if shape > global {
                    return Err(Error::DimensionMismatch(format!(
                        "marginal {i}'s source_shape ({shape}) for state variable {dep} exceeds its global cardinality ({global})"
                    )));
                }
            }
            for &dep in &m.action_deps {
                if dep >= self.action_values.len() {
                    return Err(Error::DimensionMismatch(format!(
                        "marginal {i} depends on unknown action variable {dep}"
                    )));
                }
            }
            if m.ambiguity.num_columns() != m.expected_columns() {
                return Err(Error::DimensionMismatch(format!(
                    "marginal {i} has {} columns, expected product(action_dims) * product(source_dims) = {}",
                    m.ambiguity.num_columns(),
                    m.expected_columns()
                )));
            }
            if m.ambiguity.num_targets() != m.target_card {
                return Err(Error::DimensionMismatch(format!(
                    "marginal {i}'s ambiguity set targets {} states, declared target_card is {}",
                    m.ambiguity.num_targets(),
                    m.target_card
                )));
            }
        }
        if let Some(inits) = &self.initial_states {
            for (k, tuple) in inits.iter().enumerate() {
                if tuple.len() != self.state_values.len() {
                    return Err(Error::InvalidState(format!(
                        "initial state {k} has {} components, expected {}",
                        tuple.len(),
                        self.state_values.len()
                    )));
                }
                for (d, (&val, &card)) in tuple.iter().zip(self.state_values.iter()).enumerate() {
                    if val >= card {
                        return Err(Error::InvalidState(format!(
                            "initial state {k}, dimension {d}: value {val} out of range for cardinality {card}"
                        )));
                    }
                }
            }
        }
        Ok(self)
    }

    #[inline]
    pub fn num_states(&self) -> usize {
        self.state_values.iter().product()
    }

    #[inline]
    pub fn num_actions(&self) -> usize {
        self.action_values.iter().product::<usize>().max(1)
    }

    /// Decomposes a flat joint-state index into per-variable coordinates,
    /// row-major (last variable fastest-varying).
    pub fn decompose_state(&self, mut flat: usize) -> Vec<usize> {
        let mut out = vec![0usize; self.state_values.len()];
        for d in (0..self.state_values.len()).rev() {
            let card = self.state_values[d];
            out[d] = flat % card;
            flat /= card;
        }
        out
    }

    /// Inverse of [`Self::decompose_state`].
    pub fn flatten_state(&self, coords: &[usize]) -> usize {
        let mut idx = 0usize;
        for (&val, &card) in coords.iter().zip(self.state_values.iter()) {
            idx = idx * card + val;
        }
        idx
    }

    /// Whether every marginal's dependencies partition the state
    /// variables (no variable read by more than one marginal), the
    /// condition under which the factored Bellman backup (§4.E) is exact
    /// rather than a sound over/under-approximation.
    pub fn has_disjoint_dependencies(&self) -> bool {
        let mut seen = vec![false; self.state_values.len()];
        for m in &self.marginals {
            for &dep in &m.state_deps {
                if dep >= seen.len() || seen[dep] {
                    return false;
                }
                seen[dep] = true;
            }
        }
        true
    }
}

/// The closed set of model representations the engine dispatches over.
#[derive(Debug, Clone)]
pub enum Model {
    Flat(FlatModel),
    Factored(FactoredModel),
}

impl Model {
    pub fn kind(&self) -> ModelKind {
        match self {
            Model::Flat(_) => ModelKind::Imdp,
            Model::Factored(_) => ModelKind::FactoredImdp,
        }
    }

    pub fn num_states(&self) -> usize {
        match self {
            Model::Flat(m) => m.num_states(),
            Model::Factored(m) => m.num_states(),
        }
    }
}
