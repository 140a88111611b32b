// SPDX-License-Identifier: Apache-2.0
//! Error taxonomy for the engine's public surface.
//!
//! Only API misuse is an error. A superstep that selects no winner is a
//! valid terminal outcome and never surfaces here.

use thiserror::Error;

/// Errors emitted by the behavioral program API.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BProgramError {
    /// `thread`/`repeat` was called with an empty fragment list. An empty
    /// composition would either be a silent no-op or spin the advance phase
    /// forever, so it is rejected at construction.
    #[error("thread composition requires at least one fragment")]
    EmptyThread,
    /// `trigger` was called with an event whose `type` is empty.
    #[error("event type must be a non-empty string")]
    InvalidEventType,
    /// A `Trigger` handle outlived its behavioral program.
    #[error("behavioral program no longer exists")]
    ProgramDropped,
    /// `trigger` or `register_threads` was called from inside a b-thread
    /// body while the scheduler was advancing it. Only feedback handlers may
    /// re-enter the program.
    #[error("re-entry from a b-thread body is not allowed; trigger from a feedback handler instead")]
    ReentrantStep,
}
