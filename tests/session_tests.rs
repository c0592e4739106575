//! External tests for the session state machine: turn flow, erase, the
//! undo/redo law, and event application from the turn client.

use fable_stream::client::{Interruption, TurnEvent};
use fable_stream::modes::Mode;
use fable_stream::session::{
    AuthoringContext, Line, Phase, Rejection, Session, Speaker, Submitted, FALLBACK_OPENING,
};
use proptest::prelude::*;

fn session_with(lines: Vec<Line>) -> Session {
    Session::initialize(lines, AuthoringContext::default())
}

fn finish_turn(session: &mut Session, reply: &str) {
    session.apply_event(TurnEvent::Started);
    for piece in reply.split_inclusive(' ') {
        session.apply_event(TurnEvent::Delta(piece.to_string()));
    }
    session.apply_event(TurnEvent::Completed);
}

// -- properties listed for the state machine --------------------------------

#[test]
fn test_initialize_empty_has_single_fallback_line() {
    let s = session_with(vec![]);
    assert_eq!(s.transcript().len(), 1);
    assert_eq!(s.transcript()[0].speaker, Speaker::Narrator);
    assert_eq!(s.transcript()[0].text, FALLBACK_OPENING);
}

#[test]
fn test_whitespace_speech_is_rejected() {
    let mut s = session_with(vec![Line::narrator("Welcome")]);
    assert_eq!(s.submit_turn(Mode::Speak, "  "), Err(Rejection::EmptyInput));
    assert_eq!(s.transcript(), &[Line::narrator("Welcome")]);
    assert_eq!(s.phase(), Phase::Idle);
}

#[test]
fn test_act_appends_exactly_one_line() {
    let mut s = session_with(vec![Line::narrator("Welcome")]);
    s.submit_turn(Mode::Act, "open the door").unwrap();
    assert_eq!(s.transcript().len(), 2);
    let line = &s.transcript()[1];
    assert_eq!(line.speaker, Speaker::User);
    assert_eq!(line.text, "You attempt: open the door");
}

#[test]
fn test_erase_scenario() {
    let mut s = session_with(vec![
        Line::narrator("Welcome"),
        Line::user("You attempt: open the door"),
        Line::narrator("The door creaks open."),
    ]);
    s.erase_last_turn().unwrap();
    assert_eq!(s.transcript(), &[Line::narrator("Welcome")]);
}

#[test]
fn test_cancel_after_one_delta_keeps_partial_line() {
    let mut s = session_with(vec![Line::narrator("Welcome")]);
    s.submit_turn(Mode::Act, "open the door").unwrap();
    s.apply_event(TurnEvent::Started);
    s.apply_event(TurnEvent::Delta("The hinges".to_string()));
    s.apply_event(TurnEvent::Interrupted(Interruption::Aborted));
    let tail: Vec<&Line> = s.transcript().iter().rev().take(2).collect();
    assert_eq!(tail, vec![&Line::narrator("(stream aborted)"), &Line::narrator("The hinges")]);
}

// -- full turn flows ---------------------------------------------------------

#[test]
fn test_turn_flow_phases() {
    let mut s = session_with(vec![Line::narrator("Welcome")]);
    assert_eq!(s.phase(), Phase::Idle);
    s.submit_turn(Mode::Think, "something is wrong").unwrap();
    assert_eq!(s.phase(), Phase::AwaitingReply);
    assert!(s.is_busy());
    assert!(!s.is_streaming());
    s.apply_event(TurnEvent::Started);
    assert_eq!(s.phase(), Phase::Streaming);
    assert!(s.is_streaming());
    s.apply_event(TurnEvent::Delta("A chill.".to_string()));
    s.apply_event(TurnEvent::Completed);
    assert_eq!(s.phase(), Phase::Idle);
    assert_eq!(s.transcript().last(), Some(&Line::narrator("A chill.")));
}

#[test]
fn test_controls_locked_while_streaming() {
    let mut s = session_with(vec![Line::narrator("Welcome")]);
    s.submit_turn(Mode::Act, "run").unwrap();
    s.apply_event(TurnEvent::Started);
    assert!(!s.can_undo());
    assert!(!s.can_redo());
    assert_eq!(s.submit_turn(Mode::ContinueTurn, ""), Err(Rejection::TurnInFlight));
    assert_eq!(s.erase_last_turn(), Err(Rejection::TurnInFlight));
    s.apply_event(TurnEvent::Completed);
    assert!(s.can_undo());
}

#[test]
fn test_continue_then_undo_restores_prior_story() {
    let mut s = session_with(vec![Line::narrator("Welcome")]);
    s.submit_turn(Mode::ContinueTurn, "").unwrap();
    finish_turn(&mut s, "The sea stills.");
    assert_eq!(s.transcript().len(), 2);
    s.undo().unwrap();
    assert_eq!(s.transcript(), &[Line::narrator("Welcome")]);
}

#[test]
fn test_submit_erase_mode_needs_no_input() {
    let mut s = session_with(vec![Line::narrator("Welcome")]);
    s.submit_turn(Mode::Act, "wave").unwrap();
    finish_turn(&mut s, "Nobody waves back.");
    assert_eq!(s.submit_turn(Mode::Erase, ""), Ok(Submitted::Erased { removed: true }));
    assert_eq!(s.transcript(), &[Line::narrator("Welcome")]);
}

#[test]
fn test_streamed_deltas_concatenate_in_order() {
    let mut s = session_with(vec![Line::narrator("Welcome")]);
    s.submit_turn(Mode::Speak, "who goes there").unwrap();
    finish_turn(&mut s, "A lantern swings toward you out of the dark.");
    assert_eq!(
        s.transcript().last(),
        Some(&Line::narrator("A lantern swings toward you out of the dark."))
    );
}

// -- undo/redo law ------------------------------------------------------------

#[derive(Debug, Clone)]
enum Action {
    Turn(usize, String),
    Continue,
    Erase,
    Undo,
    Redo,
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0usize..4, "[a-z]{1,8}").prop_map(|(m, t)| Action::Turn(m, t)),
        Just(Action::Continue),
        Just(Action::Erase),
        Just(Action::Undo),
        Just(Action::Redo),
    ]
}

fn apply(session: &mut Session, action: &Action, step: usize) {
    match action {
        Action::Turn(m, text) => {
            session.submit_turn(Mode::STICKY[*m], text).unwrap();
            finish_turn(session, &format!("reply {step}"));
        }
        Action::Continue => {
            session.submit_turn(Mode::ContinueTurn, "").unwrap();
            finish_turn(session, &format!("more {step}"));
        }
        Action::Erase => {
            session.erase_last_turn().unwrap();
        }
        Action::Undo => {
            session.undo().unwrap();
        }
        Action::Redo => {
            session.redo().unwrap();
        }
    }
}

proptest! {
    #[test]
    fn prop_redo_then_undo_round_trips(actions in prop::collection::vec(action_strategy(), 0..24)) {
        let mut s = session_with(vec![Line::narrator("Welcome")]);
        for (i, action) in actions.iter().enumerate() {
            apply(&mut s, action, i);
            prop_assert!(s.history_len() >= 1);
            prop_assert_eq!(s.phase(), Phase::Idle);
        }
        if s.can_redo() {
            let before = s.transcript().to_vec();
            prop_assert!(s.redo().unwrap());
            prop_assert!(s.undo().unwrap());
            prop_assert_eq!(s.transcript(), before.as_slice());
        }
    }

    #[test]
    fn prop_undo_enabled_only_with_more_than_one_snapshot(
        actions in prop::collection::vec(action_strategy(), 0..24)
    ) {
        let mut s = session_with(vec![]);
        for (i, action) in actions.iter().enumerate() {
            apply(&mut s, action, i);
            prop_assert_eq!(s.can_undo(), s.history_len() > 1);
        }
    }

    #[test]
    fn prop_blank_input_never_changes_transcript(
        mode in 0usize..4,
        blank in "[ \t\n]{0,6}",
    ) {
        let mut s = session_with(vec![Line::narrator("Welcome")]);
        let before = s.transcript().to_vec();
        prop_assert_eq!(s.submit_turn(Mode::STICKY[mode], &blank), Err(Rejection::EmptyInput));
        prop_assert_eq!(s.transcript(), before.as_slice());
    }
}
