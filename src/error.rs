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

//! This module defines the tagged error type returned by every fallible
//! constructor in the crate. All validation happens at construction time;
//! the value-iteration hot path assumes its input has already been
//! validated and never returns one of these once it has started.

use thiserror::Error;

/// The result type used throughout the public API.
pub type Result<T> = std::result::Result<T, Error>;

/// The reasons a model, specification or problem can be rejected, or a
/// running solve can be cut short.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Matrix shapes, offset arrays or marginal cardinalities are
    /// inconsistent with the declared state/action counts.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// An ambiguity set column violates `0 <= lower`, `lower + gap <= 1`,
    /// or `sum(lower) <= 1 <= sum(lower + gap)`.
    #[error("invalid ambiguity set: {0}")]
    InvalidAmbiguitySet(String),

    /// A target/avoid state index is out of range, or has the wrong
    /// dimensionality for the model it is checked against.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The specification itself is malformed: non-positive horizon,
    /// non-positive convergence tolerance, a discount outside the
    /// admissible range, overlapping reach/avoid sets, a time-varying
    /// model used with an infinite horizon, or a time-varying strategy
    /// whose length does not match the horizon.
    #[error("invalid specification: {0}")]
    InvalidSpecification(String),

    /// The property and the model it is checked against do not agree,
    /// e.g. a DFA-valued property against a non-product model, or a
    /// flat-state property against a product model.
    #[error("incompatible model and property: {0}")]
    IncompatibleModelAndProperty(String),

    /// The caller's cancellation flag was observed between iterations.
    /// The value array returned alongside this error is the last
    /// completed iterate, not a partial one.
    #[error("verification cancelled after {iterations} iteration(s)")]
    Cancelled { iterations: usize },

    /// An ambiguity-set column's budget could not be exhausted by the time
    /// every coordinate had been saturated. This can only happen if the
    /// column's feasibility invariant was violated, which the validated
    /// constructor already rejects; it is kept as a distinct, narrow
    /// variant so that a corrupted `from_parts_unchecked` column fails
    /// loudly on the hot path instead of silently under-filling the budget.
    #[error("infeasible ambiguity set column: {0}")]
    Infeasible(String),
}
