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

//! # imdp
//! `imdp` verifies temporal-logic-style properties against Interval Markov
//! Decision Processes and, where the property asks for one, synthesizes a
//! controller. An IMDP generalizes an MDP by replacing each `(source,
//! action)`'s transition distribution with a *box* of admissible
//! distributions -- independent lower/upper bounds per target state -- so
//! that a single model can stand in for every member of an uncertainty set
//! at once. Checking a property then means solving a robust Bellman
//! fixed-point: at every backup, the adversary (nature, or a disturbance)
//! picks the worst (or best) distribution inside the box, and the
//! controller picks the best (or worst) action in response.
//!
//! The crate is organized around two independent axes:
//! - *which ambiguity class and layout* ([`model`]): a flat, CSC-indexed
//!   interval model, or a factored model whose joint kernel is a tensor
//!   product of small per-variable marginals.
//! - *which property* ([`problem`]): reachability, reach-avoid, safety,
//!   discounted reward, expected exit time, or reachability to an
//!   automaton's accepting states over a [`product`] lift.
//!
//! Both axes bottom out in the same primitive: [`omax::omax`], the
//! order-based water-filling procedure that solves the per-column interval
//! LP in `O(n log n)` instead of invoking a general LP solver.
//!
//! ## Quick example
//! ```
//! use imdp::ambiguity::IntervalAmbiguitySet;
//! use imdp::model::{FlatModel, Model};
//! use imdp::problem::{Property, VerificationProblemBuilder};
//!
//! // A 3-state chain; column j gives the box of distributions leaving state j.
//! let lower = vec![0.0, 0.1, 0.2,  0.5, 0.3, 0.1,  0.0, 0.0, 1.0];
//! let upper = vec![0.5, 0.6, 0.7,  0.7, 0.5, 0.3,  0.0, 0.0, 1.0];
//! let ambiguity = IntervalAmbiguitySet::new(3, 3, lower, upper).unwrap();
//! let model = Model::Flat(FlatModel::markov_chain(ambiguity).unwrap());
//!
//! let problem = VerificationProblemBuilder::default()
//!     .model(model)
//!     .property(Property::FiniteTimeReachability { targets: vec![false, false, true], horizon: 5 })
//!     .build()
//!     .unwrap();
//! let outcome = problem.solve().unwrap();
//! assert!(outcome.value[2] > outcome.value[0]);
//! ```
//!
//! ## Going further
//! Start with [`ambiguity::IntervalAmbiguitySet`] and [`model::Model`] to
//! see how a problem instance is represented, then [`problem::Property`]
//! and [`vi`] to see how a property turns into a value-iteration run.
//! [`product`] covers automaton-lifted properties, and [`workers`] /
//! [`workspace`] cover how a backup is parallelized.

pub mod ambiguity;
pub mod error;
pub mod factored_bellman;
pub mod model;
pub mod omax;
pub mod ordering;
pub mod problem;
pub mod product;
pub mod strategy;
pub mod types;
pub mod vi;
pub mod workers;
pub mod workspace;

pub use error::{Error, Result};
pub use model::Model;
pub use problem::{ControlSynthesisProblem, ControlSynthesisProblemBuilder, Property, VerificationProblem, VerificationProblemBuilder};
pub use types::{Direction, SatisfactionMode, StrategyMode};
