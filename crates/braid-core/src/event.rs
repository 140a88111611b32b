// SPDX-License-Identifier: Apache-2.0
//! Event and idiom value types.
//!
//! Matching rules:
//! - A [`Listener`] either matches an exact event type or delegates the whole
//!   decision to a predicate. The two modes are a tagged enum so the
//!   scheduler handles both exhaustively.
//! - A [`Request`] proposes a concrete event (or a template evaluated lazily
//!   at each synchronization pass). When deciding whether the requesting
//!   thread saw its own request win, an optional `assert` predicate takes
//!   precedence, then template identity, then exact type equality.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The unit of communication between b-threads: a `type` tag plus an opaque
/// JSON payload. Immutable once constructed; crosses every engine boundary
/// (trigger input, selected-event output, feedback payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// String identifier used for matching and dispatch.
    #[serde(rename = "type")]
    pub ty: String,
    /// Optional payload associated with the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl Event {
    /// Creates an event with no payload.
    pub fn new(ty: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            detail: None,
        }
    }

    /// Creates an event carrying a payload.
    pub fn with_detail(ty: impl Into<String>, detail: Value) -> Self {
        Self {
            ty: ty.into(),
            detail: Some(detail),
        }
    }
}

/// Pattern-match rule over candidate events.
pub type Predicate = Rc<dyn Fn(&Event) -> bool>;

/// Factory producing a fresh [`Event`] each time a synchronization pass
/// collects candidates, so payloads can be computed at selection time rather
/// than at thread definition time.
pub type EventTemplate = Rc<dyn Fn() -> Event>;

/// Match rule used inside `wait_for`, `block`, and `interrupt` sets.
#[derive(Clone)]
pub enum Listener {
    /// Matches events whose `type` equals the given string exactly.
    Type(String),
    /// The predicate alone decides the match.
    Predicate(Predicate),
}

impl Listener {
    /// Exact-type listener.
    pub fn ty(ty: impl Into<String>) -> Self {
        Self::Type(ty.into())
    }

    /// Predicate listener.
    pub fn when(f: impl Fn(&Event) -> bool + 'static) -> Self {
        Self::Predicate(Rc::new(f))
    }

    /// Returns true when this listener matches the event.
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Self::Type(ty) => *ty == event.ty,
            Self::Predicate(assert) => assert(event),
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(ty) => f.debug_tuple("Type").field(ty).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for Listener {
    fn from(ty: &str) -> Self {
        Self::Type(ty.to_owned())
    }
}

impl From<String> for Listener {
    fn from(ty: String) -> Self {
        Self::Type(ty)
    }
}

/// The concrete event a [`Request`] proposes.
#[derive(Clone)]
pub enum RequestSource {
    /// A fixed event, known when the rule set was built.
    Literal(Event),
    /// A template evaluated at every candidate-collection pass.
    Template(EventTemplate),
}

impl fmt::Debug for RequestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(event) => f.debug_tuple("Literal").field(event).finish(),
            Self::Template(_) => f.write_str("Template(..)"),
        }
    }
}

/// A proposed event plus an optional wake-match override.
///
/// Without `assert`, the requesting thread is woken when the winning event
/// came from the same template, or failing that when the types are equal.
/// With `assert`, the predicate alone decides.
#[derive(Clone)]
pub struct Request {
    /// What the request proposes.
    pub source: RequestSource,
    /// Optional predicate pattern-matching the winning event in place of the
    /// default identity/type check.
    pub assert: Option<Predicate>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("source", &self.source)
            .field("assert", &self.assert.as_ref().map(|_| "Predicate(..)"))
            .finish()
    }
}

impl Request {
    /// Requests a fixed event.
    pub fn event(event: Event) -> Self {
        Self {
            source: RequestSource::Literal(event),
            assert: None,
        }
    }

    /// Requests a lazily-computed event.
    pub fn template(f: impl Fn() -> Event + 'static) -> Self {
        Self {
            source: RequestSource::Template(Rc::new(f)),
            assert: None,
        }
    }

    /// Overrides the wake match with a predicate on the winning event.
    pub fn with_assert(mut self, f: impl Fn(&Event) -> bool + 'static) -> Self {
        self.assert = Some(Rc::new(f));
        self
    }

    /// Produces the concrete candidate event for this pass, plus the template
    /// handle (when any) used for identity comparison at wake time.
    pub(crate) fn realize(&self) -> (Event, Option<EventTemplate>) {
        match &self.source {
            RequestSource::Literal(event) => (event.clone(), None),
            RequestSource::Template(template) => (template(), Some(Rc::clone(template))),
        }
    }

    /// Whether the winning event counts as this request being granted.
    pub(crate) fn matches_selected(
        &self,
        winner: &Event,
        winner_template: Option<&EventTemplate>,
    ) -> bool {
        if let Some(assert) = &self.assert {
            return assert(winner);
        }
        match &self.source {
            RequestSource::Template(template) => {
                winner_template.is_some_and(|w| Rc::ptr_eq(template, w))
            }
            RequestSource::Literal(event) => event.ty == winner.ty,
        }
    }
}

impl From<Event> for Request {
    fn from(event: Event) -> Self {
        Self::event(event)
    }
}
