//! Entity contract and value types shared by sessions and factories.
//!
//! # Responsibility
//! - Define the column value and parameter map types.
//! - Define the `Model` trait persisted entities implement.
//!
//! # Invariants
//! - Model construction is side-effect free.

pub mod record;
pub mod value;
