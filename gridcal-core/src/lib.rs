//! Core engine for the gridcal ecosystem.
//!
//! Turns irregular, human-authored schedule spreadsheets into canonical
//! recurring-event records and computes the minimal create/update/delete set
//! needed to reconcile a remote event store with the newly parsed state:
//! - `grid` / `interpret`: raw cells -> typed schedule fragments
//! - `normalize`: fragments -> canonical events (parity merging, exceptions)
//! - `identity` / `diff` / `state`: stable keys, minimal diffs, prior state
//! - `pipeline`: the per-source run state machine

pub mod config;
pub mod diagnostics;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod fragment;
pub mod grid;
pub mod identity;
pub mod interpret;
pub mod normalize;
pub mod pipeline;
pub mod state;

pub use error::{GridCalError, GridCalResult};
