//! In-memory object store for the exchange engine
//!
//! All chain state lives here: accounts, assets, orders, debt positions
//! and settle requests, each in an id-keyed table with ordered secondary
//! indices. Mutation goes through `modify_*` methods which re-index the
//! object whenever an indexed key changes, so iteration helpers never see
//! a stale key.
//!
//! The whole store is a plain value: cloning it yields a checkpoint, and
//! assigning the clone back restores every table and index bit-for-bit.
//! The engine wraps each top-level operation in such a checkpoint, which
//! is what makes failed operations atomic.

pub mod indices;
pub mod store;

pub use indices::{BookKey, CollateralKey};
pub use store::Store;
