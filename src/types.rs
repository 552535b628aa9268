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

//! This module defines the most basic types that are used throughout all the
//! code of this engine: the numeric type the Bellman backup is generic over,
//! the small index types used to name states and actions, and the closed
//! enumerations that select the direction of each axis of a backup.

/// The numeric type a value-iteration run is carried out in.
///
/// Everything in this crate is written against `Scalar` rather than directly
/// against `f64` so that the driver can, in principle, be instantiated over
/// `f32` for a cheaper but less precise run. Every public entry point in this
/// crate is monomorphized over `f64`; see DESIGN.md for why an exact-rational
/// instantiation is out of scope.
pub trait Scalar:
    Copy
    + Clone
    + PartialOrd
    + PartialEq
    + std::fmt::Debug
    + std::fmt::Display
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::Mul<Output = Self>
    + std::ops::Div<Output = Self>
    + std::ops::Neg<Output = Self>
    + Send
    + Sync
{
    /// The additive identity.
    const ZERO: Self;
    /// The multiplicative identity.
    const ONE: Self;
    /// Absolute value.
    fn abs(self) -> Self;
    /// Pointwise maximum (NaN-safe: `self` wins over a NaN `other`).
    fn fmax(self, other: Self) -> Self;
    /// Pointwise minimum (NaN-safe: `self` wins over a NaN `other`).
    fn fmin(self, other: Self) -> Self;
    /// Lossy conversion from an `f64` literal (bounds, constants, ...).
    fn from_f64(v: f64) -> Self;
    /// Lossy conversion back to `f64`, used by residual reporting.
    fn to_f64(self) -> f64;
    /// Whether this value is NaN.
    fn is_nan(self) -> bool;
}

impl Scalar for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    fn abs(self) -> Self {
        f64::abs(self)
    }
    fn fmax(self, other: Self) -> Self {
        if other.is_nan() || self >= other {
            self
        } else {
            other
        }
    }
    fn fmin(self, other: Self) -> Self {
        if other.is_nan() || self <= other {
            self
        } else {
            other
        }
    }
    fn from_f64(v: f64) -> Self {
        v
    }
    fn to_f64(self) -> f64 {
        self
    }
    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }
}

impl Scalar for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    fn abs(self) -> Self {
        f32::abs(self)
    }
    fn fmax(self, other: Self) -> Self {
        if other.is_nan() || self >= other {
            self
        } else {
            other
        }
    }
    fn fmin(self, other: Self) -> Self {
        if other.is_nan() || self <= other {
            self
        } else {
            other
        }
    }
    fn from_f64(v: f64) -> Self {
        v as f32
    }
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn is_nan(self) -> bool {
        f32::is_nan(self)
    }
}

// ----------------------------------------------------------------------------
// --- STATE / ACTION INDICES --------------------------------------------------
// ----------------------------------------------------------------------------

/// The index of a state in some flat or factored state space.
///
/// In a factored model, a `StateIndex` names the state's position in the
/// row-major linearization of the joint state tuple, not a single axis.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct StateIndex(pub usize);

impl StateIndex {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// The index of an action, analogous to [`StateIndex`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ActionIndex(pub usize);

impl ActionIndex {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

// ----------------------------------------------------------------------------
// --- DIRECTIONS ---------------------------------------------------------------
// ----------------------------------------------------------------------------

/// The direction of a single extremization: which way the O-max primitive
/// (§4.C) walks the sorted permutation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    Max,
    Min,
}

/// Whether the interval ambiguity is resolved against the verifier (worst
/// case, `Pessimistic`) or in its favor (best case, `Optimistic`).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SatisfactionMode {
    Pessimistic,
    Optimistic,
}

/// Whether the action axis of the Bellman backup is reduced by `max`
/// (`Maximize`, synthesizing a maximizing strategy) or `min` (`Minimize`).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum StrategyMode {
    Maximize,
    Minimize,
}

impl SatisfactionMode {
    /// The direction the interval axis of the backup is extremized in, once
    /// combined with the action-axis `StrategyMode`, per spec §4.F:
    /// Pessimistic-Maximize uses `min` against the adversary, Optimistic-Maximize
    /// uses `max`, and symmetrically for `Minimize`.
    pub fn interval_direction(self, strategy: StrategyMode) -> Direction {
        use Direction::*;
        use SatisfactionMode::*;
        use StrategyMode::*;
        match (self, strategy) {
            (Pessimistic, Maximize) => Min,
            (Optimistic, Maximize) => Max,
            (Pessimistic, Minimize) => Max,
            (Optimistic, Minimize) => Min,
        }
    }
}

impl StrategyMode {
    /// The direction actions are reduced in.
    pub fn action_direction(self) -> Direction {
        match self {
            StrategyMode::Maximize => Direction::Max,
            StrategyMode::Minimize => Direction::Min,
        }
    }
}
