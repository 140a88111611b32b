// SPDX-License-Identifier: Apache-2.0
//! Synchronization primitives: rule sets and the composable b-thread forms.
//!
//! A b-thread is any resumable computation yielding [`RuleSet`]s. The three
//! constructors mirror the canonical idioms:
//! - [`sync`] yields one rule set and completes,
//! - [`thread`] runs fragments sequentially,
//! - [`repeat`]/[`repeat_while`] re-run a sequence, re-evaluating the guard
//!   before every repetition.
//!
//! Fragments are factories, not instances: every repetition (and every
//! re-registration) gets a fresh, independent instance.

use std::rc::Rc;

use crate::error::BProgramError;
use crate::event::{Listener, Request};

/// The declaration a b-thread yields at one synchronization point.
///
/// All four idiom sets are plain sequences; singular values are normalized
/// here at the primitives boundary via the builder methods, so the scheduler
/// never branches on shape.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    /// Events the thread proposes and wants to be granted.
    pub request: Vec<Request>,
    /// Events the thread wants to be notified of without proposing.
    pub wait_for: Vec<Listener>,
    /// Events the thread forbids from being selected this step.
    pub block: Vec<Listener>,
    /// Events that terminate the thread if selected.
    pub interrupt: Vec<Listener>,
}

impl RuleSet {
    /// An empty declaration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a requested event.
    pub fn request(mut self, request: impl Into<Request>) -> Self {
        self.request.push(request.into());
        self
    }

    /// Appends a wait-for listener.
    pub fn wait_for(mut self, listener: impl Into<Listener>) -> Self {
        self.wait_for.push(listener.into());
        self
    }

    /// Appends a block listener.
    pub fn block(mut self, listener: impl Into<Listener>) -> Self {
        self.block.push(listener.into());
        self
    }

    /// Appends an interrupt listener.
    pub fn interrupt(mut self, listener: impl Into<Listener>) -> Self {
        self.interrupt.push(listener.into());
        self
    }
}

/// A resumable strand of behavior.
///
/// The scheduler is the only caller of [`next_rules`](Self::next_rules): a
/// yielded rule set suspends the thread until a matching event wins a step,
/// and `None` completes it permanently.
pub trait BThread {
    /// Resumes the thread to its next synchronization point.
    fn next_rules(&mut self) -> Option<RuleSet>;
}

/// Hand-rolled state machines are first-class: any `FnMut` yielding rule
/// sets is a b-thread.
impl<F> BThread for F
where
    F: FnMut() -> Option<RuleSet>,
{
    fn next_rules(&mut self) -> Option<RuleSet> {
        self()
    }
}

/// Zero-argument factory producing a fresh b-thread instance per call.
pub type ThreadFactory = Rc<dyn Fn() -> Box<dyn BThread>>;

/// One-shot synchronization point: yields `rules` exactly once.
pub fn sync(rules: RuleSet) -> ThreadFactory {
    Rc::new(move || {
        let mut slot = Some(rules.clone());
        Box::new(move || slot.take()) as Box<dyn BThread>
    })
}

/// Sequential composition: runs each fragment's full sequence in order.
///
/// # Errors
/// Returns [`BProgramError::EmptyThread`] for an empty fragment list; an
/// empty composition is an undefined protocol, not a no-op.
pub fn thread(fragments: Vec<ThreadFactory>) -> Result<ThreadFactory, BProgramError> {
    if fragments.is_empty() {
        return Err(BProgramError::EmptyThread);
    }
    Ok(Rc::new(move || {
        Box::new(Sequence::new(fragments.clone())) as Box<dyn BThread>
    }))
}

/// Indefinite repetition of a fragment sequence.
///
/// # Errors
/// Returns [`BProgramError::EmptyThread`] for an empty fragment list; a
/// guardless empty loop would never yield and would spin the advance phase
/// forever.
pub fn repeat(fragments: Vec<ThreadFactory>) -> Result<ThreadFactory, BProgramError> {
    repeat_while(fragments, || true)
}

/// Repetition guarded by `while_`, evaluated before each repetition. The
/// thread completes when the guard first returns false.
///
/// # Errors
/// Returns [`BProgramError::EmptyThread`] for an empty fragment list.
pub fn repeat_while(
    fragments: Vec<ThreadFactory>,
    while_: impl Fn() -> bool + 'static,
) -> Result<ThreadFactory, BProgramError> {
    if fragments.is_empty() {
        return Err(BProgramError::EmptyThread);
    }
    let guard: Rc<dyn Fn() -> bool> = Rc::new(while_);
    Ok(Rc::new(move || {
        Box::new(Repetition {
            fragments: fragments.clone(),
            guard: Rc::clone(&guard),
            sequence: None,
        }) as Box<dyn BThread>
    }))
}

struct Sequence {
    fragments: Vec<ThreadFactory>,
    index: usize,
    current: Option<Box<dyn BThread>>,
}

impl Sequence {
    fn new(fragments: Vec<ThreadFactory>) -> Self {
        Self {
            fragments,
            index: 0,
            current: None,
        }
    }
}

impl BThread for Sequence {
    fn next_rules(&mut self) -> Option<RuleSet> {
        loop {
            if self.current.is_none() {
                let factory = self.fragments.get(self.index)?;
                self.current = Some(factory());
            }
            if let Some(rules) = self.current.as_mut().and_then(|active| active.next_rules()) {
                return Some(rules);
            }
            self.current = None;
            self.index += 1;
        }
    }
}

struct Repetition {
    fragments: Vec<ThreadFactory>,
    guard: Rc<dyn Fn() -> bool>,
    sequence: Option<Sequence>,
}

impl BThread for Repetition {
    fn next_rules(&mut self) -> Option<RuleSet> {
        loop {
            if self.sequence.is_none() {
                if !(self.guard)() {
                    return None;
                }
                self.sequence = Some(Sequence::new(self.fragments.clone()));
            }
            if let Some(rules) = self.sequence.as_mut().and_then(|active| active.next_rules()) {
                return Some(rules);
            }
            self.sequence = None;
        }
    }
}
