// SPDX-License-Identifier: Apache-2.0
//! End-to-end scenario: tic-tac-toe rules expressed as independent b-threads.
//!
//! Square exclusivity, turn enforcement, and win detection are each their
//! own thread; none of them knows about the others. The scheduler's
//! request/wait/block arbitration is what makes the combined behavior legal.

#![allow(missing_docs)]

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{json, Value};

use braid_core::{
    repeat, sync, thread, Actions, BProgram, Event, Listener, RuleSet, ThreadFactory,
};

const WINS: [[u64; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

fn mv(player: &str, square: u64) -> Event {
    Event::with_detail(player, json!({ "square": square }))
}

fn square_of(event: &Event) -> Option<u64> {
    event
        .detail
        .as_ref()
        .and_then(|d| d.get("square"))
        .and_then(Value::as_u64)
}

/// Matches any move (X or O) on the given square.
fn any_move_on(square: u64) -> Listener {
    Listener::when(move |e| {
        (e.ty == "X" || e.ty == "O") && square_of(e) == Some(square)
    })
}

/// Matches a move by `player` on any square of `set`.
fn player_move_in(player: &'static str, set: [u64; 3]) -> Listener {
    Listener::when(move |e| {
        e.ty == player && square_of(e).is_some_and(|s| set.contains(&s))
    })
}

fn composed(fragments: Vec<ThreadFactory>) -> ThreadFactory {
    let Ok(factory) = thread(fragments) else {
        unreachable!("non-empty composition");
    };
    factory
}

/// One thread per square: once taken, block it forever.
fn square_exclusivity() -> Vec<(String, ThreadFactory)> {
    (0..9)
        .map(|square| {
            let factory = composed(vec![
                sync(RuleSet::new().wait_for(any_move_on(square))),
                sync(RuleSet::new().block(any_move_on(square))),
            ]);
            (format!("square-{square}-taken"), factory)
        })
        .collect()
}

/// X and O alternate, X first.
fn enforce_turns() -> (String, ThreadFactory) {
    let Ok(factory) = repeat(vec![
        sync(RuleSet::new().wait_for("X").block("O")),
        sync(RuleSet::new().wait_for("O").block("X")),
    ]) else {
        unreachable!("non-empty composition");
    };
    ("enforce-turns".to_owned(), factory)
}

/// One thread per player per winning line: after three in-line moves,
/// autonomously request the win event.
fn win_detection(player: &'static str) -> Vec<(String, ThreadFactory)> {
    WINS.iter()
        .enumerate()
        .map(|(index, &line)| {
            let factory = composed(vec![
                sync(RuleSet::new().wait_for(player_move_in(player, line))),
                sync(RuleSet::new().wait_for(player_move_in(player, line))),
                sync(RuleSet::new().wait_for(player_move_in(player, line))),
                sync(RuleSet::new().request(Event::with_detail(
                    format!("{player}Win"),
                    json!({ "line": line.to_vec() }),
                ))),
            ]);
            (format!("{player}-wins-line-{index}"), factory)
        })
        .collect()
}

fn log_moves(program: &BProgram) -> Rc<RefCell<Vec<(String, Option<u64>)>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut actions = Actions::new();
    for ty in ["X", "O", "XWin", "OWin"] {
        let sink = Rc::clone(&log);
        actions = actions.on(ty, move |detail| {
            let square = detail.and_then(|d| d.get("square")).and_then(Value::as_u64);
            sink.borrow_mut().push((ty.to_owned(), square));
        });
    }
    let _keep = program.feedback(actions);
    log
}

fn play(program: &BProgram, player: &str, square: u64) {
    let Ok(()) = program.trigger(mv(player, square)) else {
        unreachable!("trigger from the test body never re-enters");
    };
}

#[test]
fn taken_squares_reject_repeat_moves() {
    let program = BProgram::new();
    let log = log_moves(&program);
    let Ok(()) = program.register_threads(square_exclusivity()) else {
        unreachable!("registration");
    };
    play(&program, "X", 4);
    play(&program, "O", 4);
    // The second move on square 4 is blocked forever.
    assert_eq!(*log.borrow(), vec![("X".to_owned(), Some(4))]);
    assert_eq!(program.last_selected(), Some(mv("X", 4)));
    play(&program, "O", 5);
    assert_eq!(log.borrow().len(), 2);
}

#[test]
fn turns_alternate_and_out_of_turn_moves_idle() {
    let program = BProgram::new();
    let log = log_moves(&program);
    let mut threads = square_exclusivity();
    threads.push(enforce_turns());
    let Ok(()) = program.register_threads(threads) else {
        unreachable!("registration");
    };
    play(&program, "O", 0); // O cannot open
    play(&program, "X", 0);
    play(&program, "X", 1); // X cannot move twice
    play(&program, "O", 1);
    let entries = log.borrow();
    let selected: Vec<&str> = entries.iter().map(|(ty, _)| ty.as_str()).collect();
    // Each out-of-turn trigger idles while blocked and is retired unselected
    // as soon as the legal move is granted.
    assert_eq!(selected, vec!["X", "O"]);
    assert_eq!(
        *log.borrow(),
        vec![("X".to_owned(), Some(0)), ("O".to_owned(), Some(1))]
    );
}

#[test]
fn three_in_a_row_wins_autonomously() {
    let program = BProgram::new();
    let log = log_moves(&program);
    let mut threads = square_exclusivity();
    threads.push(enforce_turns());
    threads.extend(win_detection("X"));
    threads.extend(win_detection("O"));
    let Ok(()) = program.register_threads(threads) else {
        unreachable!("registration");
    };
    // X takes the top row; O trails on the middle row.
    play(&program, "X", 0);
    play(&program, "O", 3);
    play(&program, "X", 1);
    play(&program, "O", 4);
    play(&program, "X", 2);
    let last = log.borrow().last().cloned();
    assert_eq!(last, Some(("XWin".to_owned(), None)));
    let Some(event) = program.last_selected() else {
        unreachable!("a win was selected");
    };
    assert_eq!(event.ty, "XWin");
    assert_eq!(event.detail, Some(json!({ "line": [0, 1, 2] })));
}

#[test]
fn win_lines_do_not_fire_across_players() {
    let program = BProgram::new();
    let log = log_moves(&program);
    let mut threads = square_exclusivity();
    threads.extend(win_detection("X"));
    threads.extend(win_detection("O"));
    let Ok(()) = program.register_threads(threads) else {
        unreachable!("registration");
    };
    // Mixed ownership of the top row: no one wins it.
    play(&program, "X", 0);
    play(&program, "O", 1);
    play(&program, "X", 2);
    let entries = log.borrow();
    let types: Vec<&str> = entries.iter().map(|(ty, _)| ty.as_str()).collect();
    assert_eq!(types, vec!["X", "O", "X"]);
}
