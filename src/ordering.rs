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

//! Permutation ordering: amortizes the "sort target indices by the current
//! value vector" step that [`crate::omax`] needs once per backup instead of
//! once per source.
//!
//! A single global permutation `pi` of the target indices, sorted by the
//! current value vector, is computed once per backup. For models whose
//! ambiguity columns only ever mention a handful of the `n` target states,
//! [`SparseOrdering`] additionally maintains, per source column, the subset
//! of `pi` that is relevant to that column -- so the O-max walk never has to
//! skip over irrelevant indices.

use crate::ambiguity::IntervalAmbiguitySet;
use crate::types::Direction;

/// Sorts `0..values.len()` by `values` in `direction`. `pub(crate)` so that
/// [`crate::factored_bellman`] can reuse it for the small per-fiber sorts
/// its tensor contraction needs, without pulling in the full ordering
/// machinery meant for flat models with large `n`.
pub(crate) fn argsort(values: &[f64], direction: Direction) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..values.len()).collect();
    perm.sort_unstable_by(|&a, &b| {
        let ord = values[a].partial_cmp(&values[b]).unwrap_or(std::cmp::Ordering::Equal);
        match direction {
            Direction::Max => ord.reverse(),
            Direction::Min => ord,
        }
    });
    perm
}

/// The dense ordering strategy: a single array `pi: [n]`, recomputed fresh
/// on every call to [`DenseOrdering::sort_states`]. Every source reads the
/// full permutation and is responsible for skipping indices it doesn't
/// care about.
#[derive(Debug, Clone)]
pub struct DenseOrdering {
    perm: Vec<usize>,
}

impl DenseOrdering {
    pub fn new(n: usize) -> Self {
        Self { perm: (0..n).collect() }
    }

    /// Recomputes `pi = argsort(values, direction)` in place. `O(n log n)`.
    pub fn sort_states(&mut self, values: &[f64], direction: Direction) {
        self.perm = argsort(values, direction);
    }

    #[inline]
    pub fn perm(&self) -> &[usize] {
        &self.perm
    }
}

/// The sparse ordering strategy: a global permutation plus, per source
/// column, a pre-sized buffer holding the subset of the permutation that
/// appears in that column, maintained in lock-step with the global sort.
#[derive(Debug, Clone)]
pub struct SparseOrdering {
    perm: Vec<usize>,
    /// For target index `i`, the list of source columns whose ambiguity set
    /// has a non-zero entry at `i`.
    state_to_subset: Vec<Vec<usize>>,
    /// Per source column, the positions of `perm` that appear in that
    /// column, reordered consistently with `perm` by [`Self::populate_subsets`].
    subsets: Vec<Vec<usize>>,
}

impl SparseOrdering {
    /// Builds the `state_to_subset` index from an ambiguity set's
    /// per-column non-zero rows (see [`IntervalAmbiguitySet::nonzero_rows`]).
    pub fn new(n: usize, ambiguity: &IntervalAmbiguitySet) -> Self {
        let m = ambiguity.num_columns();
        let mut state_to_subset = vec![Vec::new(); n];
        let mut subsets = Vec::with_capacity(m);
        for j in 0..m {
            let nz = ambiguity.nonzero_rows(j);
            for &i in nz {
                state_to_subset[i].push(j);
            }
            subsets.push(Vec::with_capacity(nz.len()));
        }
        Self { perm: (0..n).collect(), state_to_subset, subsets }
    }

    /// Recomputes the global permutation. `O(n log n)`, single-threaded.
    pub fn sort_states(&mut self, values: &[f64], direction: Direction) {
        self.perm = argsort(values, direction);
    }

    /// Scans `pi` once and, for each `i = pi[k]`, appends `i` to every
    /// `subsets[j]` with `j` in `state_to_subset[i]`. The result is that
    /// iterating `subsets[j]` yields exactly the non-zero target indices of
    /// source `j`, ordered by the current value vector. `O(total nonzeros)`.
    pub fn populate_subsets(&mut self) {
        for s in &mut self.subsets {
            s.clear();
        }
        for &i in &self.perm {
            for &j in &self.state_to_subset[i] {
                self.subsets[j].push(i);
            }
        }
    }

    /// The ordered, non-zero target indices of source column `j`.
    #[inline]
    pub fn perm_for(&self, j: usize) -> &[usize] {
        &self.subsets[j]
    }
}

/// Selects between the dense and sparse ordering strategies based on how
/// densely the ambiguity set's columns are populated, so that callers don't
/// need to choose by hand. Mirrors how the teacher picks between a pooled
/// and a vector-based decision-diagram implementation behind one type.
#[derive(Debug, Clone)]
pub enum Ordering {
    Dense(DenseOrdering),
    Sparse(SparseOrdering),
}

/// Below this average column fill ratio (`nnz / n`), the sparse bookkeeping
/// pays for itself.
const SPARSE_THRESHOLD: f64 = 0.5;

impl Ordering {
    /// Picks a dense or sparse ordering for `ambiguity` depending on its
    /// average column fill ratio.
    pub fn for_ambiguity(n: usize, ambiguity: &IntervalAmbiguitySet) -> Self {
        let m = ambiguity.num_columns();
        if n == 0 || m == 0 {
            return Ordering::Dense(DenseOrdering::new(n));
        }
        let total_nnz: usize = (0..m).map(|j| ambiguity.nonzero_rows(j).len()).sum();
        let fill = total_nnz as f64 / (n as f64 * m as f64);
        if fill < SPARSE_THRESHOLD {
            Ordering::Sparse(SparseOrdering::new(n, ambiguity))
        } else {
            Ordering::Dense(DenseOrdering::new(n))
        }
    }

    pub fn sort_states(&mut self, values: &[f64], direction: Direction) {
        match self {
            Ordering::Dense(d) => d.sort_states(values, direction),
            Ordering::Sparse(s) => {
                s.sort_states(values, direction);
                s.populate_subsets();
            }
        }
    }

    /// The ordered target indices relevant to source column `j`. For the
    /// dense strategy this is the full global permutation (the caller
    /// filters out indices that don't belong to `j` itself, e.g. by reading
    /// zero gap/lower as "no contribution"); for the sparse strategy it is
    /// already filtered down to `j`'s non-zero rows.
    pub fn perm_for(&self, j: usize) -> &[usize] {
        match self {
            Ordering::Dense(d) => d.perm(),
            Ordering::Sparse(s) => s.perm_for(j),
        }
    }
}
