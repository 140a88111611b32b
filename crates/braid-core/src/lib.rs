// SPDX-License-Identifier: Apache-2.0
//! braid-core: deterministic behavioral-programming synchronization engine.
//!
//! Independent b-threads declare what they request, wait for, block, and are
//! interrupted by at explicit synchronization points; the scheduler
//! arbitrates those declarations into a single, reproducible event stream.
//! Everything runs synchronously on the caller's thread: registering threads
//! or triggering an event drains the program to quiescence before returning.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::option_if_let_else,
    clippy::use_self,
    clippy::cognitive_complexity,
    clippy::significant_drop_tightening,
    clippy::doc_markdown,
    clippy::too_many_lines,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::similar_names,
    clippy::multiple_crate_versions
)]

mod error;
mod event;
mod program;
mod publisher;
mod rules;
mod snapshot;
/// Winner-selection strategies over filtered candidates.
pub mod strategy;

// Re-exports for stable public API
/// Error taxonomy for the public surface.
pub use error::BProgramError;
/// Events, listeners, and request forms.
pub use event::{Event, EventTemplate, Listener, Predicate, Request, RequestSource};
/// The program itself plus its boundary handles.
pub use program::{
    Actions, BProgram, CandidateBid, Subscription, ThreadId, ThreadStatus, Trigger,
};
/// Synchronization primitives.
pub use rules::{repeat, repeat_while, sync, thread, BThread, RuleSet, ThreadFactory};
/// Introspection stream payloads.
pub use snapshot::{BidSnapshot, CandidateSnapshot, SnapshotMessage, StepSnapshot};
/// Strategy alias and the default.
pub use strategy::{priority_strategy, Strategy};
