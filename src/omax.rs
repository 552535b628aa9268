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

//! The O-max primitive: the heart of the engine. Computes
//! `opt_dir <p, V> s.t. lower <= p <= lower + gap, sum(p) = 1` for a single
//! ambiguity-set column, in `O(n)` once the target indices are sorted by
//! `V` (see [`crate::ordering`]).
//!
//! The algorithm is exact: the extremum of a linear objective over a
//! box-constrained simplex is attained at a vertex characterized by a total
//! order, and greedily filling the budget in the order induced by `V`
//! realizes exactly that vertex. No LP solver is involved.

use crate::ambiguity::Column;
use crate::error::{Error, Result};
use crate::ordering::Ordering;
use crate::types::Direction;

/// Absolute tolerance used when checking that a column's budget was fully
/// distributed by the end of the walk.
const BUDGET_EPS: f64 = 1e-9;

/// Computes `<p, V>` for the vertex reached by water-filling `column`'s
/// budget along `perm` (the target indices relevant to this column, already
/// sorted by the value vector in the direction the caller wants).
///
/// `perm` is expected to come from [`Ordering::perm_for`]: for a dense
/// ordering it is the full `0..n` permutation; for a sparse ordering it is
/// already filtered to the column's non-zero rows. Either way, indices with
/// `lower == gap == 0` contribute nothing and can be safely skipped or kept.
///
/// Returns [`Error::Infeasible`] if the column's budget could not be fully
/// distributed by the end of the walk -- which can only happen if the
/// column's own feasibility invariant (checked once at construction by
/// [`crate::ambiguity::IntervalAmbiguitySet::validate`]) was violated.
pub fn omax(column: Column<'_>, values: &[f64], perm: &[usize]) -> Result<f64> {
    let mut value = 0.0;
    let mut remaining = column.budget();
    for &i in perm {
        let l = column.lower(i);
        value += l * values[i];
        if remaining > 0.0 {
            let take = remaining.min(column.gap(i));
            value += take * values[i];
            remaining -= take;
        }
    }
    if remaining > BUDGET_EPS {
        return Err(Error::Infeasible(format!(
            "column exhausted before its budget was distributed (remaining={remaining})"
        )));
    }
    Ok(value)
}

/// Like [`omax`] but also returns the extremal distribution `p` itself.
/// Used by tests that need to cross-check against
/// [`crate::ambiguity::IntervalAmbiguitySet::enumerate_vertices`], and by
/// callers that want the realized transition distribution for a strategy,
/// not just its value.
pub fn omax_with_vertex(column: Column<'_>, values: &[f64], perm: &[usize]) -> Result<(f64, Vec<f64>)> {
    let n = column.len();
    let mut p: Vec<f64> = (0..n).map(|i| column.lower(i)).collect();
    let mut remaining = column.budget();
    for &i in perm {
        if remaining <= 0.0 {
            break;
        }
        let take = remaining.min(column.gap(i));
        p[i] += take;
        remaining -= take;
    }
    if remaining > BUDGET_EPS {
        return Err(Error::Infeasible(format!(
            "column exhausted before its budget was distributed (remaining={remaining})"
        )));
    }
    let value = p.iter().zip(values.iter()).map(|(pi, vi)| pi * vi).sum();
    Ok((value, p))
}

/// The outcome of a batched O-max over a range of action columns belonging
/// to one source state: the extremal value after reducing over both the
/// interval axis (inside each column) and the action axis (across columns),
/// plus the action (if any) that realized it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Backup {
    pub value: f64,
    /// The column index (within the ambiguity set) that realized `value`.
    pub column: usize,
}

/// Computes the batched O-max over the action columns `cols` of a single
/// source state: runs [`omax`] per column (using `ordering` to fetch each
/// column's perm), then reduces across columns by `action_dir`
/// (`Maximize`/`Minimize` over the action axis, see
/// [`crate::types::StrategyMode`]).
///
/// This is the entry point the value-iteration driver calls once per
/// source state per backup; it is also safe to call directly over a
/// `[j, j+1)` singleton range from tests that just want the one-column
/// O-max behavior of §6's `bellman` entry point.
pub fn backup_range(
    ambiguity: &crate::ambiguity::IntervalAmbiguitySet,
    cols: std::ops::Range<usize>,
    values: &[f64],
    ordering: &Ordering,
    action_dir: Direction,
) -> Result<Backup> {
    debug_assert!(!cols.is_empty(), "a state must have at least one action column");
    let mut best: Option<Backup> = None;
    for j in cols {
        let column = ambiguity.column(j);
        let perm = ordering.perm_for(j);
        let v = omax(column, values, perm)?;
        let take = match (&best, action_dir) {
            (None, _) => true,
            (Some(b), Direction::Max) => v > b.value,
            (Some(b), Direction::Min) => v < b.value,
        };
        if take {
            best = Some(Backup { value: v, column: j });
        }
    }
    Ok(best.expect("cols was non-empty"))
}
