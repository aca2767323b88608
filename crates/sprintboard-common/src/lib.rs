//! Shared domain types for the Sprintboard client.
//!
//! These are the normalized view models the stores hold and the CLI renders.
//! Wire-level request/response schemas live in the `sprintboard` crate's
//! `api` module and convert into these types.

pub mod dates;
pub mod models;

pub use models::*;
