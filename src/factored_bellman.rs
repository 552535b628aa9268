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

//! Lifts the O-max primitive to a factored (tensor-product) transition
//! kernel without ever materializing the joint kernel.
//!
//! The joint O-max over an `N`-fold product of box ambiguity sets against a
//! value tensor that does not itself factor is, in general, a nonconvex
//! problem. This module instead contracts the value tensor one axis at a
//! time, from the last marginal to the first, applying the 1-D O-max
//! primitive per fiber. When the marginals' dependencies partition the
//! state variables this contraction is exact (iterated extremization over
//! independent domains always equals the joint extremum); when
//! dependencies overlap it is still a sound bound (`>=` the true joint max,
//! `<=` the true joint min) but no longer tight, which is what spec calls
//! the "binary-tree McCormick relaxation" -- every reduction step is itself
//! exact, the looseness only enters through the fixed descending traversal
//! order when two marginals read the same state variable.

use crate::ambiguity::Column;
use crate::error::{Error, Result};
use crate::model::FactoredModel;
use crate::ordering::argsort;
use crate::types::Direction;

/// Reduces the last axis of a row-major tensor of `shape` via the O-max
/// primitive, one column per fiber.
fn reduce_with_omax(shape: &[usize], tensor: &[f64], column: Column<'_>, dir: Direction) -> Result<(Vec<usize>, Vec<f64>)> {
    let last = *shape.last().expect("tensor must have at least one axis to reduce");
    let prefix: usize = shape[..shape.len() - 1].iter().product::<usize>().max(1);
    let mut out = Vec::with_capacity(prefix);
    for p in 0..prefix {
        let fiber = &tensor[p * last..(p + 1) * last];
        let perm = argsort(fiber, dir);
        out.push(crate::omax::omax(column, fiber, &perm)?);
    }
    Ok((shape[..shape.len() - 1].to_vec(), out))
}

/// Reduces the last axis of a row-major tensor by selecting a fixed slice
/// `t` from every fiber, the implicit-sink passthrough of spec §4.E: the
/// axis's value is carried through unchanged rather than extremized.
fn reduce_with_identity(shape: &[usize], tensor: &[f64], t: usize) -> (Vec<usize>, Vec<f64>) {
    let last = *shape.last().expect("tensor must have at least one axis to reduce");
    let prefix: usize = shape[..shape.len() - 1].iter().product::<usize>().max(1);
    let mut out = Vec::with_capacity(prefix);
    for p in 0..prefix {
        out.push(tensor[p * last + t]);
    }
    (shape[..shape.len() - 1].to_vec(), out)
}

/// Computes the joint O-max of a factored model's kernel at a fixed
/// `(source, action)` joint state/action tuple against the current value
/// tensor `value` (flat, row-major, shape `model.state_values`).
///
/// Contracts axes `N-1, N-2, ..., 0` in turn (spec §4.E's descending axis
/// order, 0-indexed): each step reduces away the tensor's current last
/// axis, which by construction is always the axis owned by the marginal
/// being processed, using either the 1-D O-max primitive against that
/// marginal's column, or -- if the marginal declares this source value an
/// implicit sink -- a direct passthrough of the corresponding slice.
pub fn factored_backup(model: &FactoredModel, value: &[f64], source: &[usize], action: &[usize], dir: Direction) -> Result<f64> {
    let n = model.state_values.len();
    if value.len() != model.num_states() {
        return Err(Error::DimensionMismatch(format!(
            "value tensor has {} entries, model has {} joint states",
            value.len(),
            model.num_states()
        )));
    }
    if source.len() != n {
        return Err(Error::DimensionMismatch(format!("source tuple has {} entries, expected {n}", source.len())));
    }
    if action.len() != model.action_values.len() {
        return Err(Error::DimensionMismatch(format!(
            "action tuple has {} entries, expected {}",
            action.len(),
            model.action_values.len()
        )));
    }

    let mut shape = model.state_values.clone();
    let mut tensor = value.to_vec();

    for i in (0..n).rev() {
        let marginal = &model.marginals[i];
        let sink = if marginal.state_deps.len() == 1 {
            let s_val = source[marginal.state_deps[0]];
            marginal.is_implicit_sink(s_val).then_some(s_val)
        } else {
            None
        };
        let (new_shape, new_tensor) = if let Some(t) = sink {
            reduce_with_identity(&shape, &tensor, t)
        } else {
            let action_vals: Vec<usize> = marginal.action_deps.iter().map(|&d| action[d]).collect();
            let state_vals: Vec<usize> = marginal.state_deps.iter().map(|&d| source[d]).collect();
            let col = marginal.column_index(&action_vals, &state_vals);
            reduce_with_omax(&shape, &tensor, marginal.ambiguity.column(col), dir)?
        };
        shape = new_shape;
        tensor = new_tensor;
    }

    debug_assert!(tensor.len() == 1, "a fully reduced tensor must be a scalar");
    Ok(tensor[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ambiguity::IntervalAmbiguitySet;
    use crate::model::Marginal;

    fn box_set(n: usize, m: usize, lower: Vec<f64>, upper: Vec<f64>) -> IntervalAmbiguitySet {
        IntervalAmbiguitySet::new(n, m, lower, upper).unwrap()
    }

    /// A 2x2 factored model with disjoint dependencies: marginal 0 reads
    /// state variable 0 only, marginal 1 reads state variable 1 only. Its
    /// flat equivalent is the Kronecker product of the two marginals, and
    /// the factored backup must agree with a direct O-max on that product.
    fn disjoint_model() -> FactoredModel {
        let m0 = Marginal {
            state_deps: vec![0],
            action_deps: vec![],
            source_shape: vec![2],
            action_shape: vec![],
            target_card: 2,
            ambiguity: box_set(2, 2, vec![0.0, 1.0, 1.0, 0.0], vec![0.0, 1.0, 1.0, 0.0]),
        };
        let m1 = Marginal {
            state_deps: vec![1],
            action_deps: vec![],
            source_shape: vec![2],
            action_shape: vec![],
            target_card: 2,
            ambiguity: box_set(2, 2, vec![0.2, 0.3, 0.3, 0.2], vec![0.6, 0.7, 0.7, 0.6]),
        };
        FactoredModel {
            state_values: vec![2, 2],
            action_values: vec![1],
            marginals: vec![m0, m1],
            initial_states: None,
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn disjoint_factoring_matches_explicit_kronecker_product() {
        let model = disjoint_model();
        let value = vec![1.0, 2.0, 3.0, 4.0]; // shape (2,2), row-major
        let got = factored_backup(&model, &value, &[0, 0], &[0], Direction::Max).unwrap();

        // Explicit joint kernel for source (0,0): outer product of marginal
        // 0's column 0 (axis 0) and marginal 1's column 0 (axis 1).
        let mut flat_lower = vec![0.0; 4];
        let mut flat_upper = vec![0.0; 4];
        for t0 in 0..2 {
            for t1 in 0..2 {
                let idx = t0 * 2 + t1;
                let l0 = model.marginals[0].ambiguity.lower(0, t0);
                let u0 = model.marginals[0].ambiguity.upper(0, t0);
                let l1 = model.marginals[1].ambiguity.lower(0, t1);
                let u1 = model.marginals[1].ambiguity.upper(0, t1);
                flat_lower[idx] = l0 * l1;
                flat_upper[idx] = u0 * u1;
            }
        }
        let joint = IntervalAmbiguitySet::new(4, 1, flat_lower, flat_upper).unwrap();
        let perm = argsort(&value, Direction::Max);
        let want = crate::omax::omax(joint.column(0), &value, &perm).unwrap();
        assert!((got - want).abs() < 1e-9, "got {got}, want {want}");
    }

    #[test]
    fn implicit_sink_carries_value_through_unchanged() {
        let sink_marginal = Marginal {
            state_deps: vec![0],
            action_deps: vec![],
            source_shape: vec![1], // only source value 0 has real dynamics
            action_shape: vec![],
            target_card: 2,
            ambiguity: box_set(2, 1, vec![0.5, 0.5], vec![0.5, 0.5]),
        };
        let model = FactoredModel {
            state_values: vec![2],
            action_values: vec![1],
            marginals: vec![sink_marginal],
            initial_states: None,
        }
        .validate()
        .unwrap();
        let value = vec![10.0, 20.0];
        // source state 1 is beyond source_shape(0)=1: implicit sink, value
        // passes through unchanged (slice at index 1 -> 20.0).
        let got = factored_backup(&model, &value, &[1], &[0], Direction::Max).unwrap();
        assert!((got - 20.0).abs() < 1e-9);
    }
}
