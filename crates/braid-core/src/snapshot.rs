// SPDX-License-Identifier: Apache-2.0
//! Introspection stream for tooling: per-pass step snapshots, external
//! trigger notices, and thread-replacement notices.
//!
//! The stream is a strict observer. Formatting cost is paid only when at
//! least one listener is subscribed, and nothing here feeds back into
//! selection.

use serde_json::Value;

use crate::program::{CandidateBid, PendingBid};

/// One message on the introspection stream.
#[derive(Debug, Clone)]
pub enum SnapshotMessage {
    /// Emitted once per selection pass (including idle passes).
    Step(StepSnapshot),
    /// Emitted whenever an external trigger is injected.
    Trigger {
        /// Type of the injected event.
        ty: String,
        /// Payload of the injected event.
        detail: Option<Value>,
    },
    /// Emitted when re-registration replaced an existing thread
    /// (last write wins).
    ThreadReplaced {
        /// Name of the replaced thread.
        thread: String,
    },
}

/// The engine's state at one selection pass.
#[derive(Debug, Clone)]
pub struct StepSnapshot {
    /// Every pending bid after the advance phase, in insertion order.
    pub bids: Vec<BidSnapshot>,
    /// Every candidate produced this pass (blocked ones included), sorted by
    /// priority with flattening order preserved among equals.
    pub candidates: Vec<CandidateSnapshot>,
    /// Deduplicated event types blocked by exact-type listeners this pass.
    /// Predicate blocks have no nameable type and are visible only through
    /// per-candidate `blocked_by` attribution.
    pub blocked: Vec<String>,
}

/// A pending bid as seen by tooling.
#[derive(Debug, Clone)]
pub struct BidSnapshot {
    /// Thread identity.
    pub thread: String,
    /// Priority assigned at registration (0 for trigger threads).
    pub priority: u32,
    /// Whether this bid came from an external trigger.
    pub trigger: bool,
}

/// A candidate event as seen by tooling.
#[derive(Debug, Clone)]
pub struct CandidateSnapshot {
    /// Proposing thread.
    pub thread: String,
    /// Candidate event type.
    pub ty: String,
    /// Candidate payload.
    pub detail: Option<Value>,
    /// Proposing bid's priority.
    pub priority: u32,
    /// Whether this candidate won the pass.
    pub selected: bool,
    /// Whether the proposing bid came from an external trigger.
    pub trigger: bool,
    /// Name of the first pending thread blocking this candidate, if any.
    pub blocked_by: Option<String>,
    /// Name of the first pending thread this candidate would interrupt,
    /// if any.
    pub interrupts: Option<String>,
}

/// Formats one selection pass. `winner` is `None` for idle passes.
pub(crate) fn format_step(
    pending: &[PendingBid],
    candidates: &[CandidateBid],
    winner: Option<&CandidateBid>,
) -> StepSnapshot {
    let bids = pending
        .iter()
        .map(|bid| BidSnapshot {
            thread: bid.id.to_string(),
            priority: bid.priority,
            trigger: bid.is_trigger,
        })
        .collect();

    let mut formatted: Vec<CandidateSnapshot> = candidates
        .iter()
        .map(|candidate| {
            let blocked_by = pending
                .iter()
                .find(|bid| bid.rules.block.iter().any(|l| l.matches(&candidate.event)))
                .map(|bid| bid.id.to_string());
            let interrupts = pending
                .iter()
                .find(|bid| {
                    bid.rules
                        .interrupt
                        .iter()
                        .any(|l| l.matches(&candidate.event))
                })
                .map(|bid| bid.id.to_string());
            CandidateSnapshot {
                thread: candidate.thread.to_string(),
                ty: candidate.event.ty.clone(),
                detail: candidate.event.detail.clone(),
                priority: candidate.priority,
                selected: winner.is_some_and(|w| {
                    w.thread == candidate.thread && w.event.ty == candidate.event.ty
                }),
                trigger: candidate.is_trigger,
                blocked_by,
                interrupts,
            }
        })
        .collect();
    formatted.sort_by_key(|candidate| candidate.priority);

    let mut blocked: Vec<String> = Vec::new();
    for bid in pending {
        for listener in &bid.rules.block {
            if let crate::event::Listener::Type(ty) = listener {
                if !blocked.contains(ty) {
                    blocked.push(ty.clone());
                }
            }
        }
    }

    StepSnapshot {
        bids,
        candidates: formatted,
        blocked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, Listener};
    use crate::program::ThreadId;
    use crate::rules::RuleSet;
    use serde_json::json;

    fn pending_bid(name: &str, priority: u32, rules: RuleSet) -> PendingBid {
        PendingBid {
            id: ThreadId::Named(name.to_owned()),
            priority,
            is_trigger: false,
            rules,
            thread: Box::new(|| None::<RuleSet>),
        }
    }

    #[test]
    fn attributes_blocking_and_selection() {
        let pending = vec![
            pending_bid("guard", 1, RuleSet::new().wait_for("X").block("O")),
            pending_bid(
                "o-player",
                2,
                RuleSet::new().request(Event::with_detail("O", json!({ "square": 4 }))),
            ),
            pending_bid("x-player", 3, RuleSet::new().request(Event::new("X"))),
        ];
        let candidates = vec![
            CandidateBid::for_tests(
                ThreadId::Named("o-player".to_owned()),
                2,
                Event::with_detail("O", json!({ "square": 4 })),
            ),
            CandidateBid::for_tests(ThreadId::Named("x-player".to_owned()), 3, Event::new("X")),
        ];
        let snapshot = format_step(&pending, &candidates, Some(&candidates[1]));

        assert_eq!(snapshot.bids.len(), 3);
        assert_eq!(snapshot.blocked, vec!["O".to_owned()]);

        let o_entry = &snapshot.candidates[0];
        assert_eq!(o_entry.ty, "O");
        assert_eq!(o_entry.blocked_by.as_deref(), Some("guard"));
        assert!(!o_entry.selected);
        assert_eq!(o_entry.detail, Some(json!({ "square": 4 })));

        let x_entry = &snapshot.candidates[1];
        assert_eq!(x_entry.ty, "X");
        assert!(x_entry.selected);
        assert_eq!(x_entry.blocked_by, None);
    }

    #[test]
    fn dedupes_blocked_types_and_skips_predicates() {
        let pending = vec![
            pending_bid("a", 1, RuleSet::new().block("O").block("O")),
            pending_bid(
                "b",
                2,
                RuleSet::new().block(Listener::when(|e| e.ty == "P")),
            ),
        ];
        let snapshot = format_step(&pending, &[], None);
        assert_eq!(snapshot.blocked, vec!["O".to_owned()]);
        assert!(snapshot.candidates.is_empty());
    }
}
