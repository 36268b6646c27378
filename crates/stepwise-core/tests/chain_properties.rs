//! Integration tests for suspension, completion and propagation across a
//! three-level chain.
//!
//! Every test drives the engine by hand, the way a polling loop would: one
//! `begin` per frame per tick, then a `suspend` or `end` on the way out.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use stepwise_core::config::EngineConfig;
use stepwise_core::{Engine, EngineError, FrameEvent, ManualClock, Outcome, Step};

fn engine() -> Engine<ManualClock> {
    Engine::with_clock(EngineConfig::default(), ManualClock::new(1_000))
}

fn s(code: u8) -> Step {
    Step::new(code)
}

#[test]
fn test_resume_twice_returns_same_step() {
    let mut engine = engine();
    engine.begin("root", s(1)).unwrap();
    engine.suspend(s(4)).unwrap();

    assert_eq!(engine.begin("root", s(1)).unwrap(), s(4));
    assert_eq!(engine.begin("root", s(1)).unwrap(), s(4));
    assert_eq!(engine.frame_count(), 1);
}

#[test]
fn test_other_child_discards_unfinished_one() {
    let mut engine = engine();
    engine.begin("root", s(1)).unwrap();
    engine.begin("a", s(1)).unwrap();
    engine.suspend(s(2)).unwrap();

    // root now asks for a different child while "a" sits at step 2
    assert_eq!(engine.begin("b", s(1)).unwrap(), s(1));
    assert_eq!(engine.current_name(), Some("b"));
    engine.suspend(s(3)).unwrap();
    engine.suspend(s(9)).unwrap();
    assert_eq!(engine.frame_count(), 2);

    // next tick "a" starts over instead of resuming at step 2
    engine.begin("root", s(1)).unwrap();
    assert_eq!(engine.begin("a", s(1)).unwrap(), s(1));
}

#[test]
fn test_failure_climbs_one_level_per_call() {
    let mut engine = engine();
    engine.begin("root", s(1)).unwrap();
    engine.begin("mid", s(1)).unwrap();
    engine.begin("leaf", s(1)).unwrap();

    assert!(!engine.end(false).unwrap());
    assert_eq!(engine.current_name(), Some("mid"));
    assert_eq!(engine.status(), Step::FAILURE);
    assert_eq!(engine.chain()[0].current_step, s(1));

    // mid tries to carry on, but a failed frame stays failed
    assert!(!engine.suspend(s(2)).unwrap());
    assert_eq!(engine.current_name(), Some("root"));
    assert_eq!(engine.status(), Step::FAILURE);

    assert!(!engine.suspend(s(2)).unwrap());
    assert_eq!(engine.outcome(), Outcome::Failed);
    assert_eq!(engine.frame_count(), 1);
}

#[test]
fn test_leaf_success_advances_mid_to_stored_step() {
    let mut engine = engine();

    // tick 1: leaf waits, mid records where to go next
    engine.begin("root", s(1)).unwrap();
    engine.begin("mid", s(1)).unwrap();
    engine.begin("leaf", s(1)).unwrap();
    engine.suspend(s(2)).unwrap();
    engine.suspend(s(7)).unwrap();
    engine.suspend(s(3)).unwrap();

    // tick 2: leaf finishes
    engine.begin("root", s(1)).unwrap();
    assert_eq!(engine.begin("mid", s(1)).unwrap(), s(1));
    assert_eq!(engine.begin("leaf", s(1)).unwrap(), s(2));
    assert!(engine.end(true).unwrap());

    assert_eq!(engine.current_name(), Some("mid"));
    assert_eq!(engine.status(), s(7));
    assert_eq!(engine.frame_count(), 2);
}

#[test]
fn test_leaf_delay_surfaces_at_root_once() {
    let mut engine = engine();
    engine.begin("root", s(1)).unwrap();
    engine.begin("mid", s(1)).unwrap();
    engine.begin("leaf", s(1)).unwrap();
    engine.suspend_for(s(2), Duration::from_millis(500)).unwrap();
    engine.suspend(s(3)).unwrap();
    engine.suspend(s(4)).unwrap();

    assert_eq!(engine.current_name(), Some("root"));
    assert_eq!(engine.reset_delay().unwrap(), Duration::from_millis(500));
    assert_eq!(engine.reset_delay().unwrap(), Duration::ZERO);
}

#[test]
fn test_delay_shrinks_as_time_passes() {
    let clock = ManualClock::new(0);
    let mut engine = Engine::with_clock(EngineConfig::default(), clock.clone());
    engine.begin("root", s(1)).unwrap();
    engine.suspend_same_for(Duration::from_millis(300)).unwrap();

    clock.advance(Duration::from_millis(120));
    assert_eq!(engine.reset_delay().unwrap(), Duration::from_millis(180));
}

#[test]
fn test_childless_suspend_sets_step() {
    let mut engine = engine();
    engine.begin("root", s(1)).unwrap();
    assert!(engine.suspend(s(5)).unwrap());
    assert_eq!(engine.status(), s(5));
    assert_eq!(engine.outcome(), Outcome::Running(s(5)));
}

#[test]
fn test_child_success_then_parent_suspend() {
    let mut engine = engine();
    assert_eq!(engine.begin("root", s(1)).unwrap(), s(1));
    assert_eq!(engine.begin("listen", s(1)).unwrap(), s(1));
    assert!(engine.end(true).unwrap());
    assert!(engine.suspend(s(2)).unwrap());

    assert_eq!(engine.status(), s(2));
    assert_eq!(engine.reset_delay().unwrap(), Duration::ZERO);
    assert_eq!(engine.frame_count(), 1);
}

#[test]
fn test_frame_limit_leaves_chain_intact() {
    let mut engine = Engine::with_clock(
        EngineConfig::default().max_frames(2),
        ManualClock::new(0),
    );
    engine.begin("root", s(1)).unwrap();
    engine.begin("a", s(1)).unwrap();

    let err = engine.begin("b", s(1)).unwrap_err();
    assert_eq!(err, EngineError::FrameLimit { limit: 2 });
    assert_eq!(engine.current_name(), Some("a"));
    assert_eq!(engine.frame_count(), 2);
    assert_eq!(engine.chain().len(), 2);
}

#[test]
fn test_failed_frame_refuses_new_child() {
    let mut engine = engine();
    engine.begin("root", s(1)).unwrap();
    engine.begin("a", s(1)).unwrap();
    engine.end(false).unwrap();
    assert_eq!(engine.status(), Step::FAILURE);

    // the same step goes on to its second child
    let err = engine.begin("b", s(1)).unwrap_err();
    assert_eq!(
        err,
        EngineError::ParentFinished {
            parent: "root".to_string(),
            requested: "b".to_string(),
        }
    );
    assert_eq!(engine.frame_count(), 1);
    assert_eq!(engine.current_name(), Some("root"));

    assert!(!engine.suspend(s(2)).unwrap());
    assert_eq!(engine.outcome(), Outcome::Failed);
}

#[test]
fn test_succeeded_frame_refuses_new_child() {
    let mut engine = engine();
    engine.begin("root", s(1)).unwrap();
    engine.end(true).unwrap();

    assert!(matches!(
        engine.begin("late", s(1)),
        Err(EngineError::ParentFinished { .. })
    ));
    assert_eq!(engine.outcome(), Outcome::Succeeded);
}

#[test]
fn test_huge_delay_saturates() {
    let mut engine = engine();
    engine.begin("root", s(1)).unwrap();
    engine.suspend_same_for(Duration::MAX).unwrap();
    assert_eq!(engine.chain()[0].wake_at, Some(u64::MAX));
}

#[test]
fn test_reject_policy_keeps_unfinished_child() {
    let mut engine = Engine::with_clock(EngineConfig::strict(), ManualClock::new(0));
    engine.begin("root", s(1)).unwrap();
    engine.begin("a", s(1)).unwrap();
    engine.suspend(s(2)).unwrap();

    let err = engine.begin("b", s(1)).unwrap_err();
    assert_eq!(
        err,
        EngineError::ChildBusy {
            current: "a".to_string(),
            requested: "b".to_string(),
        }
    );
    assert_eq!(engine.current_name(), Some("root"));
    assert_eq!(engine.begin("a", s(1)).unwrap(), s(2));
}

#[test]
fn test_chain_snapshot() {
    let mut engine = engine();
    engine.begin("root", s(1)).unwrap();
    engine.begin("mid", s(3)).unwrap();
    engine.begin("leaf", s(5)).unwrap();
    engine.suspend_for(s(6), Duration::from_millis(50)).unwrap();

    let chain = engine.chain();
    let names: Vec<&str> = chain.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["root", "mid", "leaf"]);
    assert_eq!(chain[2].current_step, s(6));
    assert_eq!(chain[1].wake_at, Some(1_050));
    assert!(chain[1].is_current);
    assert_eq!(chain[2].depth, 2);
}

#[test]
fn test_observer_sees_lifecycle() {
    let events: Rc<RefCell<Vec<FrameEvent>>> = Rc::default();
    let sink = Rc::clone(&events);

    let mut engine = engine();
    engine.set_observer(move |event: &FrameEvent| sink.borrow_mut().push(event.clone()));

    engine.begin("root", s(1)).unwrap();
    engine.begin("child", s(1)).unwrap();
    engine.end(true).unwrap();
    engine.suspend(s(2)).unwrap();
    engine.reset();

    let events = events.borrow();
    assert_eq!(
        events[0],
        FrameEvent::Created {
            name: "root".into(),
            step: s(1),
            depth: 0,
        }
    );
    assert_eq!(
        events[1],
        FrameEvent::Created {
            name: "child".into(),
            step: s(1),
            depth: 1,
        }
    );
    assert!(events.contains(&FrameEvent::Transition {
        name: "root".into(),
        child: "child".into(),
        from: s(1),
        to: Step::IDLE,
    }));
    assert!(events.contains(&FrameEvent::Destroyed {
        name: "child".into()
    }));
    assert_eq!(events.last(), Some(&FrameEvent::Reset { frames: 1 }));
}

#[test]
fn test_no_events_without_observer() {
    let events: Rc<RefCell<Vec<FrameEvent>>> = Rc::default();
    let sink = Rc::clone(&events);

    let mut engine = engine();
    engine.set_observer(move |event: &FrameEvent| sink.borrow_mut().push(event.clone()));
    engine.clear_observer();
    engine.begin("root", s(1)).unwrap();
    engine.end(true).unwrap();

    assert!(events.borrow().is_empty());
}
