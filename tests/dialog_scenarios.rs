//! 对话场景集成测试

mod common;

use std::sync::Arc;

use bee_frames::config::DialogSection;
use bee_frames::engine::SchedulerState;
use bee_frames::nlu::NotationConverter;
use bee_frames::session::{MemorySessionStore, Session, SessionStore};
use bee_frames::{DialogService, TurnOutput};
use common::{has_log, log_kinds, texts, Harness};

#[test]
fn test_greeting_asks_for_name() {
    let mut h = Harness::new();
    let out = h.say("Hi");
    assert_eq!(texts(&out), vec!["What is your name?"]);
    assert_eq!(h.state(), SchedulerState::PostAsk);

    let exp = h.session.expectations();
    assert_eq!(exp.frame_type.as_deref(), Some("demo.Person"));
    assert_eq!(exp.attribute.as_deref(), Some("name"));
}

#[test]
fn test_out_of_order_slot_is_kept_and_asked_later() {
    let mut h = Harness::new();
    h.say("Hi");

    let out = h.say("age=30");
    assert!(has_log(&out, "FillAction", &["age", "30"]));
    assert_eq!(texts(&out), vec!["What is your name?"]);

    let out = h.say("Joe");
    assert_eq!(texts(&out), vec!["Nice to meet you, Joe!"]);
    assert_eq!(h.state(), SchedulerState::Init);
    assert!(h.session.main.is_empty());

    let done = &h.session.finished[0];
    assert_eq!(done.intent_type, "demo.Hi");
    assert!(!done.aborted);
    assert!(done.values.iter().any(|v| v.attribute == "age" && v.value == "30"));
    assert!(h.session.events.all().iter().all(|e| !e.is_active()));
}

#[test]
fn test_list_grows_on_yes_and_closes_on_no() {
    let mut h = Harness::new();
    assert_eq!(texts(&h.say("demo.Order(items=tea)")), vec!["Anything else?"]);
    assert_eq!(texts(&h.say("yes; coffee")), vec!["Anything else?"]);
    assert_eq!(texts(&h.say("no")), vec!["Ordered tea, coffee."]);
    assert_eq!(h.state(), SchedulerState::Init);
}

#[test]
fn test_list_value_implies_has_more() {
    let mut h = Harness::new();
    h.say("demo.Order(items=tea)");
    let out = h.say("milk");
    assert!(has_log(&out, "FillAction", &["HasMore", "true"]));
    assert!(has_log(&out, "FillAction", &["items", "milk"]));
    assert_eq!(texts(&out), vec!["Anything else?"]);
}

#[test]
fn test_list_overflow_discards_extra_values() {
    let mut h = Harness::new();
    let out = h.say("demo.Order(items=tea, items=coffee, items=milk, items=juice)");
    assert_eq!(
        texts(&out),
        vec![
            "You can only give 3 items, I will keep the first ones.",
            "Ordered tea, coffee, milk.",
        ]
    );
    assert!(log_kinds(&out).contains(&"ListOverflowAction".to_string()));
    assert!(h.used_flags().iter().all(|u| *u));
}

#[test]
fn test_value_check_failure_cleans_up_and_refocuses() {
    let mut h = Harness::new();
    let out = h.say("demo.Book(start=5, end=3)");
    assert_eq!(
        texts(&out),
        vec!["The end must be after the start.", "Which day do you start?"]
    );
    let kinds = log_kinds(&out);
    let cleanup = kinds.iter().position(|k| k == "CleanupAction").expect("cleanup logged");
    let refocus = kinds.iter().position(|k| k == "RefocusAction").expect("refocus logged");
    assert!(cleanup < refocus);
    assert!(has_log(&out, "CleanupAction", &["start", "end"]));
    assert_eq!(h.session.expectations().attribute.as_deref(), Some("start"));

    assert_eq!(texts(&h.say("1")), vec!["Which day do you leave?"]);
    assert_eq!(texts(&h.say("4")), vec!["Booked from day 1 to day 4."]);
}

#[test]
fn test_abort_innermost_intent_resumes_parent() {
    let mut h = Harness::new();
    assert_eq!(texts(&h.say("demo.Book")), vec!["Which day do you start?"]);
    assert_eq!(texts(&h.say("Weather")), vec!["Which city?"]);
    assert_eq!(h.session.side.len(), 1);

    let out = h.say("abort");
    assert_eq!(texts(&out), vec!["Ok, Weather is aborted.", "Which day do you start?"]);
    assert!(h.session.side.is_empty());
    let last = h.session.finished.last().expect("aborted intent recorded");
    assert_eq!(last.intent_type, "demo.Weather");
    assert!(last.aborted);
    assert_eq!(h.session.active_intents(), vec!["demo.Book".to_string()]);
}

#[test]
fn test_refocus_replaces_filled_slot_and_keeps_root() {
    let mut h = Harness::new();
    h.say("Hi");
    assert_eq!(texts(&h.say("Joe")), vec!["How old are you?"]);
    let root = h.session.main.stack[0];

    let out = h.say("demo.Person(name=Bob)");
    assert!(has_log(&out, "RefocusAction", &["Replace", "name"]));
    assert!(has_log(&out, "FillAction", &["name", "Bob"]));
    assert_eq!(texts(&out), vec!["How old are you?"]);
    assert_eq!(h.session.main.stack[0], root);

    assert_eq!(texts(&h.say("41")), vec!["Nice to meet you, Bob!"]);
}

#[test]
fn test_same_value_is_only_consumed() {
    let mut h = Harness::new();
    h.say("Hi");
    h.say("Joe");
    let out = h.say("demo.Person(name=Joe)");
    assert!(has_log(&out, "RefocusAction", &["Revisit", "name"]));
    assert!(texts(&out).is_empty());
    assert_eq!(h.state(), SchedulerState::PostAsk);
    assert_eq!(h.session.expectations().attribute.as_deref(), Some("age"));
}

#[test]
fn test_unconsumed_input_is_rejected_once() {
    let mut h = Harness::new();
    h.say("Hi");
    let out = h.say("demo.Person(shoe=42)");
    assert_eq!(
        texts(&out),
        vec!["Sorry, I did not understand that.", "What is your name?"]
    );
    assert!(!out[0].success);
    assert_eq!(h.state(), SchedulerState::PostAsk);
}

#[test]
fn test_invalid_value_is_asked_again() {
    let mut h = Harness::new();
    h.say("Hi");
    h.say("Joe");
    let out = h.say("abc");
    assert_eq!(texts(&out), vec!["'abc' is not a number", "How old are you?"]);
    assert_eq!(h.state(), SchedulerState::PostAsk);
}

#[test]
fn test_dont_care_completes_slot() {
    let mut h = Harness::new();
    h.say("Hi");
    h.say("Joe");
    assert_eq!(texts(&h.say("age=*")), vec!["Nice to meet you, Joe!"]);
}

#[test]
fn test_context_value_comes_from_history() {
    let mut h = Harness::new();
    assert_eq!(texts(&h.say("demo.Weather(city=Oslo)")), vec!["It is sunny in Oslo."]);
    assert_eq!(texts(&h.say("demo.Weather(city=_context)")), vec!["It is sunny in Oslo."]);
}

#[test]
fn test_unknown_intent_does_not_break_turn() {
    let mut h = Harness::new();
    let out = h.say("demo.Missing(a=1)");
    assert!(!out[0].success);
    assert!(!out[0].logs[0].testable);
    assert_eq!(h.state(), SchedulerState::Init);
}

#[test]
fn test_consumption_is_monotone() {
    let mut h = Harness::new();
    let script = ["Hi", "age=30", "demo.Person(shoe=1)", "Joe", "demo.Book(start=5, end=3)", "1", "Weather", "abort"];
    for line in script {
        let before = h.used_flags();
        h.say(line);
        let after = h.used_flags();
        for (i, used) in before.iter().enumerate() {
            assert!(!used || after[i], "event flag {i} was reused after '{line}'");
        }
    }
}

#[test]
fn test_every_turn_ends_in_legal_state() {
    let mut h = Harness::new();
    for line in ["demo.Order", "tea", "coffee", "yes", "milk", "juice", "no", "hello there", "Weather", "Bergen"] {
        h.say(line);
        assert!(matches!(
            h.state(),
            SchedulerState::Init | SchedulerState::PostAsk | SchedulerState::Recover
        ));
    }
}

#[test]
fn test_clear_is_idempotent() {
    let mut h = Harness::new();
    h.say("demo.Book(start=5)");
    let root = h.session.main.stack[0];

    h.ctx.dialog(&mut h.session).clear(root).unwrap();
    let once = h.session.clone();
    h.ctx.dialog(&mut h.session).clear(root).unwrap();
    assert_eq!(h.session, once);
}

#[test]
fn test_restored_session_makes_same_decisions() {
    let mut h = Harness::new();
    h.say("demo.Book(start=5)");

    let json = h.session.to_json().unwrap();
    let mut restored = Session::from_json(&json).unwrap();
    assert_eq!(restored, h.session);

    let converter = NotationConverter::new(h.ctx.registry.clone());
    let events = converter.parse("7", &restored.expectations());
    let replay = h.ctx.dialog(&mut restored).run_turn(events).unwrap();
    let live = h.say("7");

    assert_eq!(replay, live);
    assert_eq!(restored.main.stack, h.session.main.stack);
    assert_eq!(restored.finished, h.session.finished);
}

#[tokio::test]
async fn test_service_round_trips_through_store() {
    let registry = Arc::new(common::demo_registry());
    let ctx = Arc::new(bee_frames::engine::DialogContext::new(
        registry.clone(),
        bee_frames::config::DialogSection::default(),
    ));
    let store = Arc::new(MemorySessionStore::new());
    let service = DialogService::new(ctx, store.clone(), Arc::new(NotationConverter::new(registry)));

    let out: TurnOutput = service.handle("u1", "Hi").await.unwrap();
    assert_eq!(out.acts[0].text(), "What is your name?");
    assert_eq!(out.state, SchedulerState::PostAsk);

    let out = service.handle("u1", "Joe").await.unwrap();
    assert_eq!(out.acts[0].text(), "How old are you?");

    let out = service.handle("u1", "hmm what").await.unwrap();
    assert_eq!(out.acts[0].text(), "'hmm what' is not a number");
    assert_eq!(out.acts.last().map(|a| a.text()), Some("How old are you?"));
    assert_eq!(store.len().await, 1);

    let saved = store.load("u1").await.unwrap().unwrap();
    assert_eq!(saved.expectations().attribute.as_deref(), Some("age"));
}

#[test]
fn test_recursive_list_nests_children() {
    let mut h = Harness::new();
    assert_eq!(texts(&h.say("demo.Tree")), vec!["Label?"]);
    assert_eq!(texts(&h.say("a")), vec!["More children of a?"]);
    assert_eq!(texts(&h.say("yes")), vec!["Label?"]);
    assert_eq!(texts(&h.say("b")), vec!["More children of b?"]);
    assert_eq!(texts(&h.say("no")), vec!["More children of a?"]);
    assert_eq!(texts(&h.say("no")), vec!["Tree rooted at a."]);
    assert_eq!(h.session.consecutive_failures, 0);
}

#[test]
fn test_too_deep_element_closes_slot_and_keeps_session() {
    let mut h = Harness::with_settings(DialogSection {
        max_build_depth: 2,
        ..DialogSection::default()
    });
    assert_eq!(texts(&h.say("demo.Tree")), vec!["Label?"]);
    assert_eq!(texts(&h.say("a")), vec!["More children of a?"]);

    // 第 3 层无法构建：列表被关闭，意图照常完成
    let out = h.say("yes");
    assert!(log_kinds(&out).iter().any(|k| k == "BuildFailedAction"));
    assert!(out.iter().any(|r| !r.success));
    assert_eq!(texts(&out), vec!["Tree rooted at a."]);
    assert_eq!(h.state(), SchedulerState::Init);
    assert_eq!(h.session.consecutive_failures, 0);
    assert_eq!(h.session.arena.live_count(), 0);

    assert_eq!(texts(&h.say("Hi")), vec!["What is your name?"]);
}

#[test]
fn test_update_to_paused_intent_applies_after_side_intent() {
    let mut h = Harness::new();
    assert_eq!(texts(&h.say("demo.Book(start=2)")), vec!["Which day do you leave?"]);
    assert_eq!(texts(&h.say("Weather")), vec!["Which city?"]);

    let out = h.say("demo.Book(start=4)");
    assert!(log_kinds(&out).iter().any(|k| k == "RefocusAction"));
    assert!(texts(&out).is_empty());
    assert!(h.used_flags().iter().all(|u| *u));

    assert_eq!(
        texts(&h.say("Oslo")),
        vec!["It is sunny in Oslo.", "Which day do you leave?"]
    );
    assert_eq!(texts(&h.say("9")), vec!["Booked from day 4 to day 9."]);
}

#[test]
fn test_unknown_slot_for_active_intent_is_rejected() {
    let mut h = Harness::new();
    h.say("demo.Book(start=2)");
    h.say("Weather");
    let out = h.say("demo.Book(shoe=1)");
    assert_eq!(
        texts(&out),
        vec!["Sorry, I did not understand that.", "Which city?"]
    );
    assert!(out.iter().any(|r| !r.success));
    assert_eq!(h.state(), SchedulerState::PostAsk);
}

#[test]
fn test_abort_target_ignores_case() {
    let mut h = Harness::new();
    h.say("demo.Book");
    h.say("Weather");
    let out = h.say("abort weather");
    assert_eq!(texts(&out), vec!["Ok, Weather is aborted.", "Which day do you start?"]);
    assert!(h.session.side.is_empty());
}

#[test]
fn test_finished_intents_leave_no_arena_nodes() {
    let mut h = Harness::new();
    h.say("demo.Book(start=2, end=9)");
    h.say("demo.Weather(city=Oslo)");
    assert_eq!(h.session.arena.live_count(), 0);
    let restored = Session::from_json(&h.session.to_json().unwrap()).unwrap();
    assert_eq!(restored.arena, h.session.arena);
}
