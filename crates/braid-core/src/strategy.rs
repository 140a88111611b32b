// SPDX-License-Identifier: Apache-2.0
//! Pluggable winner selection.
//!
//! A strategy sees only the block-filtered candidate list and returns the
//! index of the winner, or `None` to leave the step (and the whole run) idle.
//! Strategies must be pure: the same candidate list always yields the same
//! choice, which is what makes whole runs reproducible.

use std::rc::Rc;

use crate::program::CandidateBid;

/// Winner-selection function over the filtered candidates.
pub type Strategy = Rc<dyn Fn(&[CandidateBid]) -> Option<usize>>;

/// Default strategy: the candidate with the numerically smallest priority
/// wins (lowest = highest precedence, reflecting registration order with
/// ephemeral trigger threads at the front). Ties are broken by flattening
/// order: the first candidate produced wins.
pub fn priority_strategy(candidates: &[CandidateBid]) -> Option<usize> {
    let mut winner: Option<usize> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        match winner {
            Some(best) if candidates[best].priority <= candidate.priority => {}
            _ => winner = Some(index),
        }
    }
    winner
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::program::ThreadId;

    fn candidate(name: &str, priority: u32, ty: &str) -> CandidateBid {
        CandidateBid::for_tests(ThreadId::Named(name.to_owned()), priority, Event::new(ty))
    }

    #[test]
    fn empty_candidate_list_is_idle() {
        assert_eq!(priority_strategy(&[]), None);
    }

    #[test]
    fn lowest_priority_wins() {
        let candidates = [
            candidate("late", 3, "C"),
            candidate("early", 1, "A"),
            candidate("middle", 2, "B"),
        ];
        assert_eq!(priority_strategy(&candidates), Some(1));
    }

    #[test]
    fn ties_break_by_flattening_order() {
        let candidates = [
            candidate("first", 2, "A"),
            candidate("second", 2, "B"),
            candidate("third", 2, "C"),
        ];
        assert_eq!(priority_strategy(&candidates), Some(0));
    }
}
