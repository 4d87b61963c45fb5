//! 槽位策略与意图生命周期的集成测试

mod common;

use std::sync::Arc;

use bee_frames::config::DialogSection;
use bee_frames::engine::{DialogContext, SchedulerState};
use bee_frames::event::FrameEvent;
use bee_frames::nlu::NotationConverter;
use bee_frames::session::{MemorySessionStore, SessionStore};
use bee_frames::DialogService;
use common::{has_log, offers, texts, Harness};

#[test]
fn test_interface_type_is_asked_then_variant_filled() {
    let mut h = Harness::new();
    assert_eq!(texts(&h.say("demo.Checkout")), vec!["Card or cash?"]);
    let out = h.say("card");
    assert!(has_log(&out, "FillAction", &["__type", "demo.Card"]));
    assert_eq!(texts(&out), vec!["Card number?"]);
    assert_eq!(texts(&h.say("1234")), vec!["Card 1234 charged."]);
}

#[test]
fn test_interface_resolved_from_variant_event() {
    let mut h = Harness::new();
    let out = h.say("demo.Checkout(demo.Card(number=77))");
    assert_eq!(texts(&out), vec!["Card 77 charged."]);
    assert!(h.used_flags().iter().all(|u| *u));
}

#[test]
fn test_unknown_variant_is_asked_again() {
    let mut h = Harness::new();
    h.say("demo.Checkout");
    let out = h.say("cheque");
    assert_eq!(texts(&out), vec!["'cheque' is not one of the options.", "Card or cash?"]);
    assert_eq!(h.state(), SchedulerState::PostAsk);
}

#[test]
fn test_recommendation_pages_and_wraps() {
    let mut h = Harness::new();
    let out = h.say("demo.Drink");
    assert_eq!(texts(&out), vec!["We have:"]);
    assert_eq!(offers(&out), vec![vec!["tea".to_string(), "coffee".to_string()]]);

    let out = h.say("next");
    assert_eq!(offers(&out), vec![vec!["milk".to_string()]]);

    // 最后一页之后回到第一页
    let out = h.say("next");
    assert_eq!(offers(&out), vec![vec!["tea".to_string(), "coffee".to_string()]]);

    assert_eq!(texts(&h.say("milk")), vec!["One milk."]);
}

#[test]
fn test_hard_recommendation_rejects_unoffered_value() {
    let mut h = Harness::new();
    h.say("demo.Drink");
    let out = h.say("juice");
    assert_eq!(texts(&out), vec!["'juice' is not one of the suggestions.", "We have:"]);
    assert!(out.iter().any(|r| !r.success));
    assert_eq!(texts(&h.say("coffee")), vec!["One coffee."]);
}

#[test]
fn test_explicit_confirm_no_asks_again() {
    let mut h = Harness::new();
    assert_eq!(texts(&h.say("demo.Room")), vec!["Which room?"]);
    assert_eq!(texts(&h.say("single")), vec!["A single room, right?"]);

    let out = h.say("no");
    assert!(has_log(&out, "FillAction", &["Confirm", "false"]));
    assert_eq!(texts(&out), vec!["Which room?"]);

    assert_eq!(texts(&h.say("double")), vec!["A double room, right?"]);
    assert_eq!(texts(&h.say("yes")), vec!["Room double booked."]);
}

#[test]
fn test_implicit_confirm_informs_without_asking() {
    let mut h = Harness::new();
    let out = h.say("demo.Greet(name=Ann)");
    assert_eq!(texts(&out), vec!["Got it, Ann.", "Hello Ann."]);
    assert_eq!(h.state(), SchedulerState::Init);
}

#[test]
fn test_bool_gate_skips_on_no() {
    let mut h = Harness::new();
    assert_eq!(texts(&h.say("demo.Feedback")), vec!["Any comment?"]);
    assert_eq!(texts(&h.say("no")), vec!["Thanks []"]);
}

#[test]
fn test_bool_gate_asks_slot_on_yes() {
    let mut h = Harness::new();
    h.say("demo.Feedback");
    assert_eq!(texts(&h.say("yes")), vec!["Your comment?"]);
    assert_eq!(texts(&h.say("great")), vec!["Thanks [great]"]);
}

#[test]
fn test_bool_gate_bypassed_by_direct_value() {
    let mut h = Harness::new();
    assert_eq!(texts(&h.say("demo.Feedback(comment=fine)")), vec!["Thanks [fine]"]);
}

#[test]
fn test_never_conditional_and_recover_only_slots_are_not_asked() {
    let mut h = Harness::new();
    assert_eq!(texts(&h.say("demo.Ticket")), vec!["Title?"]);
    assert_eq!(texts(&h.say("bug")), vec!["Ticket bug tag= priority= reason=."]);
}

#[test]
fn test_conditional_slot_asked_when_condition_holds() {
    let mut h = Harness::new();
    assert_eq!(texts(&h.say("demo.Ticket(title=urgent)")), vec!["Priority?"]);
    assert_eq!(texts(&h.say("high")), vec!["Ticket urgent tag= priority=high reason=."]);
}

#[test]
fn test_unasked_slots_accept_direct_values() {
    let mut h = Harness::new();
    let out = h.say("demo.Ticket(title=x, tag=red, reason=dup)");
    assert_eq!(texts(&out), vec!["Ticket x tag=red priority= reason=dup."]);
}

#[test]
fn test_external_slot_ignores_user_value() {
    let mut h = Harness::new();
    let out = h.say("demo.Pay(amount=5, code=typed)");
    assert!(texts(&out).is_empty());
    assert!(!has_log(&out, "FillAction", &["code", "typed"]));
    assert_eq!(h.session.active_intents(), vec!["demo.Pay".to_string()]);
    assert_eq!(h.state(), SchedulerState::Init);

    let out = h.deliver(vec![FrameEvent::new("demo.Pay").with_slot("code", "A1").external()]);
    assert!(has_log(&out, "FillAction", &["code", "A1"]));
    assert_eq!(texts(&out), vec!["Paid 5 with A1."]);
}

#[test]
fn test_external_slot_waits_while_other_slots_are_asked() {
    let mut h = Harness::new();
    assert_eq!(texts(&h.say("demo.Pay")), vec!["How much?"]);
    assert!(texts(&h.say("7")).is_empty());
    let out = h.deliver(vec![FrameEvent::new("demo.Pay").with_slot("code", "Z9").external()]);
    assert_eq!(texts(&out), vec!["Paid 7 with Z9."]);
}

#[test]
fn test_externally_triggered_intent_waits_for_trigger() {
    let mut h = Harness::new();
    assert!(texts(&h.say("demo.Deploy(env=prod)")).is_empty());
    assert_eq!(h.state(), SchedulerState::Init);

    // 用户自己说出类型不算触发
    assert!(texts(&h.say("demo.Deploy")).is_empty());
    assert_eq!(h.session.active_intents(), vec!["demo.Deploy".to_string()]);

    let out = h.deliver(vec![FrameEvent::new("demo.Deploy").external()]);
    assert_eq!(texts(&out), vec!["Deployed to prod."]);
    assert!(h.session.active_intents().is_empty());
}

#[test]
fn test_slot_init_from_const_global_and_context() {
    let mut h = Harness::new();
    assert_eq!(texts(&h.say("demo.Profile(city=Oslo)")), vec!["Saved Oslo."]);
    assert!(h.session.globals.contains_key("demo.Profile"));
    assert_eq!(texts(&h.say("demo.Book(start=2, end=9)")), vec!["Booked from day 2 to day 9."]);

    let out = h.say("demo.Trip");
    assert!(has_log(&out, "UpdateSlotAction", &["from", "Oslo"]));
    assert!(has_log(&out, "UpdateSlotAction", &["to", "Paris"]));
    assert!(has_log(&out, "UpdateSlotAction", &["when", "2"]));
    assert_eq!(texts(&out), vec!["Trip Oslo to Paris on day 2."]);
}

#[test]
fn test_slot_init_without_source_falls_back_to_asking() {
    let mut h = Harness::new();
    assert_eq!(texts(&h.say("demo.Trip")), vec!["From where?"]);
    assert_eq!(texts(&h.say("Rome")), vec!["Which day?"]);
    assert_eq!(texts(&h.say("3")), vec!["Trip Rome to Paris on day 3."]);
}

#[test]
fn test_on_done_notifies_before_response() {
    let mut h = Harness::new();
    let out = h.say("demo.Note(text=hey)");
    assert_eq!(texts(&out), vec!["Noted hey.", "Done."]);
    assert!(h.session.active_intents().is_empty());
}

#[test]
fn test_finished_side_intent_resumes_parent_question() {
    let mut h = Harness::new();
    h.say("demo.Book");
    h.say("Weather");
    let out = h.say("Oslo");
    assert_eq!(texts(&out), vec!["It is sunny in Oslo.", "Which day do you start?"]);
    assert!(h.session.side.is_empty());
    assert_eq!(h.state(), SchedulerState::PostAsk);
}

#[test]
fn test_turn_starting_in_recover_resumes_dialog() {
    let mut h = Harness::new();
    h.say("Hi");
    h.session.current_mut().state = SchedulerState::Recover;
    let out = h.say("Joe");
    assert_eq!(
        texts(&out),
        vec!["Sorry, something went wrong. Let us pick up where we were.", "How old are you?"]
    );
    assert_eq!(h.state(), SchedulerState::PostAsk);
}

#[tokio::test]
async fn test_service_resets_session_after_repeated_failures() {
    let registry = Arc::new(common::demo_registry());
    let settings = DialogSection {
        max_turn_steps: 1,
        ..DialogSection::default()
    };
    let ctx = Arc::new(DialogContext::new(registry.clone(), settings));
    let store = Arc::new(MemorySessionStore::new());
    let service = DialogService::new(ctx, store.clone(), Arc::new(NotationConverter::new(registry)));

    // 第一次失败：保留会话，等待恢复
    let out = service.handle("u1", "Hi").await.unwrap();
    assert!(out.acts.is_empty());
    assert_eq!(out.state, SchedulerState::Recover);
    let saved = store.load("u1").await.unwrap().unwrap();
    assert_eq!(saved.consecutive_failures, 1);

    // 连续第二次失败：重置
    let out = service.handle("u1", "Hi").await.unwrap();
    assert_eq!(
        out.acts[0].text(),
        "Sorry, something went wrong. Let us pick up where we were."
    );
    assert_eq!(out.state, SchedulerState::Init);
    let saved = store.load("u1").await.unwrap().unwrap();
    assert!(saved.active_intents().is_empty());
    assert_eq!(saved.consecutive_failures, 0);
    assert_eq!(saved.turn_id, 2);
}
