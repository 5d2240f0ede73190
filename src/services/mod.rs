//! Rotation business logic over [`RotationDb`](crate::db::RotationDb).
//!
//! Every public operation here runs inside one transaction; nested calls join
//! the caller's transaction.

pub mod guard;
pub mod ledger;
pub mod queue;
pub mod resolver;
pub mod swaps;
