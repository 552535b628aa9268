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

//! Interval ambiguity sets: a collection of columns, each constraining a
//! probability distribution over `n` target states to lie in a box
//! `[lower, lower + gap]` that also sums to one.
//!
//! This is the data structure described as component A of the engine: it
//! owns the `lower`/`gap` matrices, validates the invariants of the data
//! model once at construction, and precomputes the per-column budget that
//! the O-max primitive (`crate::omax`) consumes on every backup.

use crate::error::{Error, Result};

/// Absolute tolerance used when checking the feasibility invariants. Interval
/// bounds loaded from any upstream source (files, solvers, generators) will
/// carry floating-point noise; this keeps legitimate boxes with a budget of
/// `-1e-9` (rather than exactly `0`) from being rejected.
const FEASIBILITY_EPS: f64 = 1e-9;

/// A finite collection of interval-ambiguity columns, stored dense and
/// column-major: `lower[j * n + i]` is the lower bound on coordinate `i` of
/// column `j`, and likewise for `gap`.
///
/// Each column `j` constrains a distribution `p` over `n` target indices to
/// `lower[.,j] <= p <= lower[.,j] + gap[.,j]` and `sum(p) = 1`. The slack
/// `budget[j] = 1 - sum(lower[.,j])` is cached at construction.
#[derive(Debug, Clone)]
pub struct IntervalAmbiguitySet {
    n: usize,
    m: usize,
    lower: Vec<f64>,
    gap: Vec<f64>,
    budget: Vec<f64>,
    /// Row indices with non-zero `lower` or `gap`, per column. Exists purely
    /// to let the ordering component (`crate::ordering`) amortize over the
    /// subset of indices that actually matter for a given source, without
    /// requiring the physical storage itself to be a sparse format.
    nonzero: Vec<Vec<usize>>,
}

impl IntervalAmbiguitySet {
    /// Builds and validates an ambiguity set from flat, column-major
    /// `lower`/`upper` matrices of shape `n x m`.
    ///
    /// Returns [`Error::InvalidAmbiguitySet`] identifying the first column
    /// and invariant that is violated, per spec §3:
    /// - every bound lies in `[0, 1]`,
    /// - `lower + gap <= 1`,
    /// - `sum(lower) <= 1 <= sum(upper)` (the box intersects the simplex).
    ///
    /// # Examples
    /// ```
    /// use imdp::ambiguity::IntervalAmbiguitySet;
    /// let lower = vec![0.0, 0.1, 0.2];
    /// let upper = vec![0.5, 0.6, 0.7];
    /// let set = IntervalAmbiguitySet::new(3, 1, lower, upper).unwrap();
    /// assert_eq!(1, set.num_columns());
    /// ```
    pub fn new(n: usize, m: usize, lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
        if lower.len() != n * m || upper.len() != n * m {
            return Err(Error::DimensionMismatch(format!(
                "expected lower/upper of length {} (n={n}, m={m}), got {}/{}",
                n * m,
                lower.len(),
                upper.len()
            )));
        }
        let mut gap = vec![0.0; n * m];
        for k in 0..n * m {
            gap[k] = upper[k] - lower[k];
        }
        let set = Self::from_parts_unchecked(n, m, lower, gap);
        set.validate()?;
        Ok(set)
    }

    /// Builds an ambiguity set from already-separated `lower`/`gap`
    /// matrices without validating the invariants of spec §3.
    ///
    /// This is the internal fast path used when an operation (strategy
    /// projection, the factored-model builder assembling already-validated
    /// per-marginal columns) is known to preserve the invariants and the
    /// cost of re-checking them would be pure overhead. It is `pub(crate)`
    /// because upholding the invariant is this crate's responsibility, not
    /// a caller's.
    pub(crate) fn from_parts_unchecked(n: usize, m: usize, lower: Vec<f64>, gap: Vec<f64>) -> Self {
        let mut budget = Vec::with_capacity(m);
        let mut nonzero = Vec::with_capacity(m);
        for j in 0..m {
            let mut sum_lower = 0.0;
            let mut nz = Vec::new();
            for i in 0..n {
                let l = lower[j * n + i];
                let g = gap[j * n + i];
                sum_lower += l;
                if l > 0.0 || g > 0.0 {
                    nz.push(i);
                }
            }
            budget.push(1.0 - sum_lower);
            nonzero.push(nz);
        }
        Self { n, m, lower, gap, budget, nonzero }
    }

    /// Re-validates every column against the invariants of spec §3. Called
    /// once by [`Self::new`]; exposed so that callers who assembled a set via
    /// [`Self::from_parts_unchecked`] (e.g. after hand-editing bounds in a
    /// test) can still ask for the check.
    pub fn validate(&self) -> Result<()> {
        for j in 0..self.m {
            let mut sum_lower = 0.0;
            let mut sum_upper = 0.0;
            for i in 0..self.n {
                let l = self.lower[j * self.n + i];
                let g = self.gap[j * self.n + i];
                if l < -FEASIBILITY_EPS || g < -FEASIBILITY_EPS {
                    return Err(Error::InvalidAmbiguitySet(format!(
                        "column {j}, row {i}: lower and gap must be non-negative (lower={l}, gap={g})"
                    )));
                }
                if l + g > 1.0 + FEASIBILITY_EPS {
                    return Err(Error::InvalidAmbiguitySet(format!(
                        "column {j}, row {i}: lower + gap = {} exceeds 1",
                        l + g
                    )));
                }
                sum_lower += l;
                sum_upper += l + g;
            }
            if sum_lower > 1.0 + FEASIBILITY_EPS {
                return Err(Error::InvalidAmbiguitySet(format!(
                    "column {j}: sum of lower bounds {sum_lower} exceeds 1"
                )));
            }
            if sum_upper < 1.0 - FEASIBILITY_EPS {
                return Err(Error::InvalidAmbiguitySet(format!(
                    "column {j}: sum of upper bounds {sum_upper} is below 1 (box does not meet the simplex)"
                )));
            }
        }
        Ok(())
    }

    /// Number of target states (`n` in spec §3).
    #[inline]
    pub fn num_targets(&self) -> usize {
        self.n
    }

    /// Number of columns (`m` in spec §3): one per `(source, action)` pair.
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.m
    }

    #[inline]
    pub fn lower(&self, j: usize, i: usize) -> f64 {
        self.lower[j * self.n + i]
    }

    #[inline]
    pub fn gap(&self, j: usize, i: usize) -> f64 {
        self.gap[j * self.n + i]
    }

    #[inline]
    pub fn upper(&self, j: usize, i: usize) -> f64 {
        self.lower(j, i) + self.gap(j, i)
    }

    /// The slack `1 - sum(lower[.,j])` available to distribute across
    /// coordinates of column `j`, up to each coordinate's gap.
    #[inline]
    pub fn budget(&self, j: usize) -> f64 {
        self.budget[j]
    }

    /// Row indices of column `j` with a non-zero lower bound or gap, in
    /// ascending order. Consumed by [`crate::ordering`] to filter the
    /// global value-order permutation down to the indices that matter for
    /// this particular column.
    #[inline]
    pub fn nonzero_rows(&self, j: usize) -> &[usize] {
        &self.nonzero[j]
    }

    /// A read-only view over column `j`, bundling the accessors above
    /// behind a single handle (mirrors the teacher's by-reference
    /// `SubProblem`/node-view style).
    #[inline]
    pub fn column(&self, j: usize) -> Column<'_> {
        Column { set: self, j }
    }

    /// Enumerates every extreme point of `{ p : lower <= p <= lower + gap,
    /// sum(p) = 1 }` for column `j`.
    ///
    /// The algorithm sorts indices by each of the `n!` permutations and
    /// greedily allocates the budget in that order, saturating each
    /// position to its gap until the budget is exhausted. Every permutation
    /// yields exactly one vertex (duplicates are possible when several
    /// permutations agree on the order of the indices that actually end up
    /// splitting the budget, they are not deduplicated here).
    ///
    /// This only exists to serve as a combinatorial oracle for the test
    /// suite (spec §8 invariants 1 and 2) and is not on any hot path: it is
    /// exponential in `n` and should never be called with a realistic
    /// target-state count.
    pub fn enumerate_vertices(&self, j: usize) -> Vec<Vec<f64>> {
        let n = self.n;
        let mut indices: Vec<usize> = (0..n).collect();
        let mut out = Vec::new();
        permute(&mut indices, 0, &mut |order| {
            out.push(self.vertex_for_order(j, order));
        });
        out
    }

    /// Computes the single vertex reached by water-filling the budget of
    /// column `j` in the order given by `order` (a permutation of `0..n`,
    /// highest priority first).
    fn vertex_for_order(&self, j: usize, order: &[usize]) -> Vec<f64> {
        let mut p: Vec<f64> = (0..self.n).map(|i| self.lower(j, i)).collect();
        let mut remaining = self.budget(j);
        for &i in order {
            if remaining <= 0.0 {
                break;
            }
            let take = remaining.min(self.gap(j, i));
            p[i] += take;
            remaining -= take;
        }
        p
    }
}

/// Recursively emits every permutation of `items[start..]` to `visit`,
/// keeping the prefix `items[..start]` fixed. Used only by
/// [`IntervalAmbiguitySet::enumerate_vertices`].
fn permute(items: &mut [usize], start: usize, visit: &mut dyn FnMut(&[usize])) {
    if start == items.len() {
        visit(items);
        return;
    }
    for k in start..items.len() {
        items.swap(start, k);
        permute(items, start + 1, visit);
        items.swap(start, k);
    }
}

/// A read-only view over a single column of an [`IntervalAmbiguitySet`].
#[derive(Copy, Clone)]
pub struct Column<'a> {
    set: &'a IntervalAmbiguitySet,
    j: usize,
}

impl<'a> Column<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.set.num_targets()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn lower(&self, i: usize) -> f64 {
        self.set.lower(self.j, i)
    }

    #[inline]
    pub fn upper(&self, i: usize) -> f64 {
        self.set.upper(self.j, i)
    }

    #[inline]
    pub fn gap(&self, i: usize) -> f64 {
        self.set.gap(self.j, i)
    }

    #[inline]
    pub fn budget(&self) -> f64 {
        self.set.budget(self.j)
    }

    #[inline]
    pub fn nonzero_rows(&self) -> &'a [usize] {
        self.set.nonzero_rows(self.j)
    }
}
