//! Core modules for Baton's coordination machinery.
//!
//! Leaf-first: `location` resolves who is writing, `handoff` and `catalogue`
//! are the two mergeable stores, `reconcile` builds the pickup view, and
//! `session` ties them together behind the CLI.

pub mod catalogue;
pub mod error;
pub mod handoff;
pub mod location;
pub mod output;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod time;
