//! Matching and collateral engine
//!
//! The engine owns the object store and executes inbound operations
//! against it: limit order placement and cancellation, debt position
//! adjustments, feed publication, force settlements and global
//! settlement. Execution is single-threaded and deterministic; every
//! operation is applied atomically under a store checkpoint.
//!
//! Module map:
//! - `engine`: the `Engine` facade, chain parameters, operation dispatch
//! - `matching`: order matching, margin-call sweep, fills and cancels
//! - `fees`: market fees, referral sharing, force-settle fees
//! - `settlement`: global settlement, revival, queue housekeeping
//! - `evaluators`: per-operation validation and application
//! - `audit`: global invariant checks used by the test suite

pub mod audit;
pub mod engine;
mod evaluators;
mod fees;
mod matching;
mod settlement;

pub use engine::{ChainParams, Engine};
