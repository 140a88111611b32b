// SPDX-License-Identifier: Apache-2.0
//! Scheduler core: the run-to-completion superstep loop and the public
//! [`BProgram`] surface.
//!
//! One superstep: advance every runnable thread to its next synchronization
//! point, collect requested candidates in priority order, discard blocked
//! ones, let the strategy pick a winner, publish a snapshot, then mark every
//! pending thread whose wait/request/interrupt matches the winner as
//! runnable again. The loop repeats until no thread is runnable
//! (quiescence). Selected events and snapshots are dispatched with the core
//! unborrowed, so feedback handlers may trigger or register reentrantly;
//! b-thread bodies may not.

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::BProgramError;
use crate::event::{Event, EventTemplate, Listener};
use crate::publisher::{Callback, Publisher};
use crate::rules::{BThread, RuleSet, ThreadFactory};
use crate::snapshot::{self, SnapshotMessage};
use crate::strategy::{priority_strategy, Strategy};

/// Identity of a bid inside the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadId {
    /// A thread registered under a caller-chosen name.
    Named(String),
    /// An ephemeral thread created by an external trigger.
    Trigger {
        /// Type of the injected event.
        ty: String,
        /// Injection sequence number, for telling repeated triggers apart.
        seq: u64,
    },
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Trigger { ty, seq } => write!(f, "trigger:{ty}#{seq}"),
        }
    }
}

/// A thread that will be advanced at the next superstep.
struct RunningBid {
    id: ThreadId,
    priority: u32,
    is_trigger: bool,
    /// Set when a selected event matched the thread's interrupt set; the
    /// thread is dropped instead of advanced.
    interrupted: bool,
    thread: Box<dyn BThread>,
}

/// A thread suspended at a synchronization point, waiting for a matching
/// event.
pub(crate) struct PendingBid {
    pub(crate) id: ThreadId,
    pub(crate) priority: u32,
    pub(crate) is_trigger: bool,
    pub(crate) rules: RuleSet,
    pub(crate) thread: Box<dyn BThread>,
}

/// One requested event, as presented to the selection strategy.
#[derive(Clone)]
pub struct CandidateBid {
    /// Proposing thread.
    pub thread: ThreadId,
    /// Proposing bid's priority (lower is stronger; 0 for triggers).
    pub priority: u32,
    /// The concrete proposed event.
    pub event: Event,
    /// Whether the proposing bid came from an external trigger.
    pub is_trigger: bool,
    pub(crate) template: Option<EventTemplate>,
}

impl fmt::Debug for CandidateBid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateBid")
            .field("thread", &self.thread)
            .field("priority", &self.priority)
            .field("event", &self.event)
            .field("is_trigger", &self.is_trigger)
            .finish_non_exhaustive()
    }
}

impl CandidateBid {
    #[cfg(test)]
    pub(crate) fn for_tests(thread: ThreadId, priority: u32, event: Event) -> Self {
        Self {
            thread,
            priority,
            event,
            is_trigger: false,
            template: None,
        }
    }
}

/// Where a named thread currently sits in the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreadStatus {
    /// The thread will be advanced at the next superstep.
    pub running: bool,
    /// The thread is suspended at a synchronization point.
    pub pending: bool,
}

struct Core {
    running: Vec<RunningBid>,
    pending: Vec<PendingBid>,
    next_priority: u32,
    trigger_seq: u64,
    strategy: Strategy,
    last_selected: Option<Event>,
    actions: Publisher<Event>,
    snapshots: Publisher<SnapshotMessage>,
}

/// Everything a superstep produced that must be dispatched with the core
/// unborrowed.
struct PassOutcome {
    snapshot: Option<(SnapshotMessage, Vec<Callback<SnapshotMessage>>)>,
    selected: Option<(Event, Vec<Callback<Event>>)>,
}

impl Core {
    fn new(strategy: Strategy) -> Self {
        Self {
            running: Vec::new(),
            pending: Vec::new(),
            // Priority 0 is reserved for trigger threads.
            next_priority: 1,
            trigger_seq: 0,
            strategy,
            last_selected: None,
            actions: Publisher::new(),
            snapshots: Publisher::new(),
        }
    }

    /// Moves every runnable thread to its next synchronization point.
    /// Interrupted and completed threads are dropped here.
    fn advance(&mut self) {
        let running = mem::take(&mut self.running);
        for mut bid in running {
            if bid.interrupted {
                tracing::debug!(thread = %bid.id, "thread interrupted");
                continue;
            }
            match bid.thread.next_rules() {
                Some(rules) => self.pending.push(PendingBid {
                    id: bid.id,
                    priority: bid.priority,
                    is_trigger: bid.is_trigger,
                    rules,
                    thread: bid.thread,
                }),
                None => tracing::debug!(thread = %bid.id, "thread completed"),
            }
        }
    }

    /// Runs one superstep. The woken threads land back in `running`; the
    /// caller dispatches the outcome and loops while `running` is non-empty.
    fn pass(&mut self) -> PassOutcome {
        self.advance();

        let mut candidates: Vec<CandidateBid> = Vec::new();
        for bid in &self.pending {
            for request in &bid.rules.request {
                let (event, template) = request.realize();
                candidates.push(CandidateBid {
                    thread: bid.id.clone(),
                    priority: bid.priority,
                    event,
                    is_trigger: bid.is_trigger,
                    template,
                });
            }
        }

        let filtered: Vec<CandidateBid> = candidates
            .iter()
            .filter(|candidate| {
                !self.pending.iter().any(|bid| {
                    bid.rules
                        .block
                        .iter()
                        .any(|listener| listener.matches(&candidate.event))
                })
            })
            .cloned()
            .collect();

        let winner = match (self.strategy)(&filtered) {
            Some(index) if index < filtered.len() => Some(filtered[index].clone()),
            Some(index) => {
                tracing::warn!(
                    index,
                    candidates = filtered.len(),
                    "selection strategy returned an out-of-range index; step idles"
                );
                None
            }
            None => None,
        };

        let snapshot = if self.snapshots.is_empty() {
            None
        } else {
            Some((
                SnapshotMessage::Step(snapshot::format_step(
                    &self.pending,
                    &candidates,
                    winner.as_ref(),
                )),
                self.snapshots.listeners(),
            ))
        };

        let selected = winner.map(|winner| {
            tracing::debug!(event = %winner.event.ty, thread = %winner.thread, "event selected");
            self.wake(&winner);
            self.last_selected = Some(winner.event.clone());
            (winner.event, self.actions.listeners())
        });

        PassOutcome { snapshot, selected }
    }

    /// Moves every pending thread whose declaration matches the winner back
    /// to `running`. Interrupt matches win over wait/request matches and
    /// mark the thread for termination.
    fn wake(&mut self, winner: &CandidateBid) {
        let pending = mem::take(&mut self.pending);
        for bid in pending {
            let interrupted = bid
                .rules
                .interrupt
                .iter()
                .any(|listener| listener.matches(&winner.event));
            let woken = interrupted
                || bid
                    .rules
                    .wait_for
                    .iter()
                    .any(|listener| listener.matches(&winner.event))
                || bid
                    .rules
                    .request
                    .iter()
                    .any(|request| request.matches_selected(&winner.event, winner.template.as_ref()));
            if woken {
                self.running.push(RunningBid {
                    id: bid.id,
                    priority: bid.priority,
                    is_trigger: bid.is_trigger,
                    interrupted,
                    thread: bid.thread,
                });
            } else {
                self.pending.push(bid);
            }
        }
    }
}

/// Drains the program to quiescence. Must be called with the core
/// unborrowed; listener dispatch happens between borrows, so handlers may
/// re-enter (their nested drain simply empties the run queue before this
/// loop observes it again).
fn run(core: &Rc<RefCell<Core>>) {
    loop {
        let outcome = {
            let mut guard = core.borrow_mut();
            if guard.running.is_empty() {
                return;
            }
            guard.pass()
        };
        if let Some((message, listeners)) = outcome.snapshot {
            for listener in listeners {
                listener(&message);
            }
        }
        if let Some((event, handlers)) = outcome.selected {
            for handler in handlers {
                handler(&event);
            }
        }
    }
}

fn emit_snapshot(core: &Rc<RefCell<Core>>, message: &SnapshotMessage) {
    let listeners = core.borrow().snapshots.listeners();
    for listener in listeners {
        listener(message);
    }
}

/// Injects an external event as an ephemeral priority-0 thread and drains
/// the program.
fn inject(core: &Rc<RefCell<Core>>, event: Event) -> Result<(), BProgramError> {
    if event.ty.is_empty() {
        return Err(BProgramError::InvalidEventType);
    }
    let notice = SnapshotMessage::Trigger {
        ty: event.ty.clone(),
        detail: event.detail.clone(),
    };
    {
        let mut guard = core
            .try_borrow_mut()
            .map_err(|_| BProgramError::ReentrantStep)?;
        let seq = guard.trigger_seq;
        guard.trigger_seq += 1;
        let id = ThreadId::Trigger {
            ty: event.ty.clone(),
            seq,
        };
        tracing::debug!(thread = %id, "external trigger");
        // The always-true waitFor retires the trigger as soon as any event
        // is selected, so a blocked trigger cannot re-request forever.
        let mut slot = Some(
            RuleSet::new()
                .request(event)
                .wait_for(Listener::when(|_| true)),
        );
        guard.running.push(RunningBid {
            id,
            priority: 0,
            is_trigger: true,
            interrupted: false,
            thread: Box::new(move || slot.take()),
        });
    }
    emit_snapshot(core, &notice);
    run(core);
    Ok(())
}

/// A behavioral program: a set of named b-threads arbitrated into one
/// deterministic event stream.
///
/// Single-threaded by design. All scheduling happens synchronously inside
/// [`register_threads`](Self::register_threads) and
/// [`trigger`](Self::trigger) calls; when they return the program is
/// quiescent.
pub struct BProgram {
    core: Rc<RefCell<Core>>,
}

impl fmt::Debug for BProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BProgram").finish_non_exhaustive()
    }
}

impl Default for BProgram {
    fn default() -> Self {
        Self::new()
    }
}

impl BProgram {
    /// Creates a program with the default priority strategy.
    pub fn new() -> Self {
        Self::with_strategy(Rc::new(priority_strategy))
    }

    /// Creates a program with a caller-supplied selection strategy.
    pub fn with_strategy(strategy: Strategy) -> Self {
        Self {
            core: Rc::new(RefCell::new(Core::new(strategy))),
        }
    }

    /// Registers named b-threads and immediately drains the program.
    ///
    /// Priorities follow registration order (earlier is stronger).
    /// Re-registering an existing name replaces the old thread wholesale:
    /// the previous instance is discarded mid-flight, the new one gets a
    /// fresh priority at the back of the order, and a
    /// [`SnapshotMessage::ThreadReplaced`] notice is published.
    ///
    /// # Errors
    /// [`BProgramError::ReentrantStep`] when called from inside a b-thread
    /// body.
    pub fn register_threads<N, I>(&self, threads: I) -> Result<(), BProgramError>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, ThreadFactory)>,
    {
        let replaced = {
            let mut guard = self
                .core
                .try_borrow_mut()
                .map_err(|_| BProgramError::ReentrantStep)?;
            let mut replaced = Vec::new();
            for (name, factory) in threads {
                let id = ThreadId::Named(name.into());
                let existed = guard.running.iter().any(|bid| bid.id == id)
                    || guard.pending.iter().any(|bid| bid.id == id);
                if existed {
                    guard.running.retain(|bid| bid.id != id);
                    guard.pending.retain(|bid| bid.id != id);
                    if let ThreadId::Named(name) = &id {
                        tracing::warn!(thread = %name, "replacing registered thread");
                        replaced.push(name.clone());
                    }
                }
                let priority = guard.next_priority;
                guard.next_priority += 1;
                guard.running.push(RunningBid {
                    id,
                    priority,
                    is_trigger: false,
                    interrupted: false,
                    thread: factory(),
                });
            }
            replaced
        };
        for thread in replaced {
            emit_snapshot(&self.core, &SnapshotMessage::ThreadReplaced { thread });
        }
        run(&self.core);
        Ok(())
    }

    /// Injects an external event and drains the program.
    ///
    /// # Errors
    /// [`BProgramError::InvalidEventType`] for an empty event type;
    /// [`BProgramError::ReentrantStep`] when called from inside a b-thread
    /// body.
    pub fn trigger(&self, event: Event) -> Result<(), BProgramError> {
        inject(&self.core, event)
    }

    /// A cloneable trigger handle that does not keep the program alive.
    pub fn trigger_handle(&self) -> Trigger {
        Trigger {
            core: Rc::downgrade(&self.core),
        }
    }

    /// Subscribes type-keyed feedback handlers to the selected-event stream.
    ///
    /// Dropping the returned [`Subscription`] does not unsubscribe; call
    /// [`Subscription::unsubscribe`] to detach.
    pub fn feedback(&self, actions: Actions) -> Subscription {
        let handlers = actions.handlers;
        let callback: Callback<Event> = Rc::new(move |event: &Event| {
            if let Some(handler) = handlers.get(&event.ty) {
                handler(event.detail.as_ref());
            }
        });
        let id = self.core.borrow_mut().actions.subscribe(callback);
        Subscription {
            core: Rc::downgrade(&self.core),
            channel: Channel::Actions,
            id,
        }
    }

    /// Subscribes a listener to the introspection stream.
    ///
    /// Dropping the returned [`Subscription`] does not unsubscribe; call
    /// [`Subscription::unsubscribe`] to detach.
    pub fn use_snapshot(&self, listener: impl Fn(&SnapshotMessage) + 'static) -> Subscription {
        let id = self.core.borrow_mut().snapshots.subscribe(Rc::new(listener));
        Subscription {
            core: Rc::downgrade(&self.core),
            channel: Channel::Snapshots,
            id,
        }
    }

    /// The most recently selected event, if any step has selected one.
    pub fn last_selected(&self) -> Option<Event> {
        self.core.borrow().last_selected.clone()
    }

    /// Where the named thread currently sits. Both fields false means the
    /// thread completed, was interrupted, or was never registered.
    pub fn thread_status(&self, name: &str) -> ThreadStatus {
        let guard = self.core.borrow();
        let id = ThreadId::Named(name.to_owned());
        ThreadStatus {
            running: guard.running.iter().any(|bid| bid.id == id),
            pending: guard.pending.iter().any(|bid| bid.id == id),
        }
    }
}

/// Cloneable handle for injecting events, typically captured by feedback
/// handlers or UI callbacks. Holds only a weak reference.
#[derive(Clone)]
pub struct Trigger {
    core: Weak<RefCell<Core>>,
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger").finish_non_exhaustive()
    }
}

impl Trigger {
    /// Injects an event through the handle.
    ///
    /// # Errors
    /// [`BProgramError::ProgramDropped`] when the program no longer exists;
    /// otherwise as [`BProgram::trigger`].
    pub fn send(&self, event: Event) -> Result<(), BProgramError> {
        let core = self.core.upgrade().ok_or(BProgramError::ProgramDropped)?;
        inject(&core, event)
    }
}

/// Builder mapping event types to feedback handlers. Each handler receives
/// the selected event's payload.
#[derive(Default)]
pub struct Actions {
    handlers: FxHashMap<String, Rc<dyn Fn(Option<&Value>)>>,
}

impl fmt::Debug for Actions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actions")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Actions {
    /// An empty handler map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events of type `ty`. A later handler for the
    /// same type replaces the earlier one.
    pub fn on(mut self, ty: impl Into<String>, handler: impl Fn(Option<&Value>) + 'static) -> Self {
        self.handlers.insert(ty.into(), Rc::new(handler));
        self
    }
}

enum Channel {
    Actions,
    Snapshots,
}

/// Detachable registration on the selected-event or introspection stream.
pub struct Subscription {
    core: Weak<RefCell<Core>>,
    channel: Channel,
    id: u64,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Detaches the listener. A no-op when the program is already gone.
    /// Dispatch in flight completes: the step that is currently publishing
    /// works from a snapshot of the subscriber list.
    pub fn unsubscribe(self) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        let Ok(mut guard) = core.try_borrow_mut() else {
            return;
        };
        match self.channel {
            Channel::Actions => guard.actions.unsubscribe(self.id),
            Channel::Snapshots => guard.snapshots.unsubscribe(self.id),
        }
    }
}
