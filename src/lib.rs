//! Weekly on-call rotation engine.
//!
//! Participants are assigned to Monday-anchored weeks by round robin. Skips,
//! admin overrides and peer swaps layer on top, and no one covers two weeks
//! in a row without both their own and an administrator's approval. State
//! lives in SQLite (see [`db`]); business rules live in [`services`];
//! [`commands`] adds the authorization checks of a chat front end.

pub mod commands;
pub mod db;
pub mod error;
mod migrations;
pub mod reminder;
pub mod services;
pub mod state;
pub mod types;
pub mod week;
