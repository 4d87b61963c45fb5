//! 集成测试共用的示例 schema 与对话驱动

#![allow(dead_code)]

use std::sync::Arc;

use bee_frames::action::{ActionResult, DialogAct, LogPayload};
use bee_frames::config::DialogSection;
use bee_frames::engine::{DialogContext, SchedulerState};
use bee_frames::event::FrameEvent;
use bee_frames::nlu::NotationConverter;
use bee_frames::schema::{
    AskStrategy, Condition, Confirmation, EntitySpec, FrameSpec, Recommendation, Registry, SlotSpec, SlotType,
    SlotValues, StaticCandidates, ValueCheck, ValueInit, Validator,
};
use bee_frames::session::Session;

fn day(values: &SlotValues, key: &str) -> Option<i64> {
    values.get(key)?.parse().ok()
}

pub fn demo_registry() -> Registry {
    let mut reg = Registry::with_system_frames();
    reg.register_entity(EntitySpec::new("demo.Name", Validator::Any));
    reg.register_entity(EntitySpec::new("demo.Age", Validator::range(0, 150)));
    reg.register_entity(EntitySpec::new("demo.City", Validator::Any));
    reg.register_entity(EntitySpec::new("demo.Day", Validator::range(1, 31)));
    reg.register_entity(EntitySpec::new(
        "demo.Item",
        Validator::one_of(["tea", "coffee", "milk", "juice"]),
    ));
    reg.register_predicate("end_after_start", |values: &SlotValues| {
        matches!((day(values, "start"), day(values, "end")), (Some(s), Some(e)) if e > s)
    });

    reg.register_frame(
        FrameSpec::frame("demo", "Person")
            .slot(SlotSpec::entity("name", "demo.Name").prompt("What is your name?"))
            .slot(SlotSpec::entity("age", "demo.Age").prompt("How old are you?")),
    );
    reg.register_frame(
        FrameSpec::intent("demo", "Hi")
            .slot(SlotSpec::frame("person", "demo.Person"))
            .response("Nice to meet you, {person.name}!"),
    );
    reg.register_frame(
        FrameSpec::intent("demo", "Order")
            .slot(
                SlotSpec::new("items", SlotType::bounded_list(SlotType::Entity("demo.Item".to_string()), 1, Some(3)))
                    .prompt("What would you like?")
                    .has_more_prompt("Anything else?"),
            )
            .response("Ordered {items}."),
    );
    reg.register_frame(
        FrameSpec::intent("demo", "Book")
            .slot(SlotSpec::entity("start", "demo.Day").prompt("Which day do you start?"))
            .slot(
                SlotSpec::entity("end", "demo.Day")
                    .prompt("Which day do you leave?")
                    .check(
                        ValueCheck::new(Condition::named("end_after_start"), "The end must be after the start.")
                            .cleanup(["start", "end"]),
                    ),
            )
            .response("Booked from day {start} to day {end}."),
    );
    reg.register_frame(
        FrameSpec::intent("demo", "Weather")
            .slot(SlotSpec::entity("city", "demo.City").prompt("Which city?"))
            .response("It is sunny in {city}."),
    );
    register_policy_frames(&mut reg);
    reg
}

/// 覆盖各类槽位策略的意图
fn register_policy_frames(reg: &mut Registry) {
    reg.register_entity(EntitySpec::new("demo.RoomKind", Validator::one_of(["single", "double"])));
    reg.register_entity(EntitySpec::new("demo.Code", Validator::Any));
    reg.register_source(
        "drinks",
        StaticCandidates(["tea", "coffee", "milk"].map(String::from).to_vec()),
    );

    reg.register_frame(FrameSpec::frame("demo", "Card").slot(SlotSpec::entity("number", "demo.Code").prompt("Card number?")));
    reg.register_frame(FrameSpec::frame("demo", "Cash"));
    reg.register_frame(FrameSpec::interface("demo", "Payment", ["demo.Card", "demo.Cash"]).type_prompt("Card or cash?"));
    reg.register_frame(
        FrameSpec::intent("demo", "Checkout")
            .slot(SlotSpec::interface("payment", "demo.Payment"))
            .response("Card {payment.number} charged."),
    );

    reg.register_frame(
        FrameSpec::intent("demo", "Drink")
            .slot(
                SlotSpec::entity("choice", "demo.Item")
                    .recommend(Recommendation::new("drinks", "We have:").page_size(2).hard()),
            )
            .response("One {choice}."),
    );

    reg.register_frame(
        FrameSpec::intent("demo", "Room")
            .slot(
                SlotSpec::entity("kind", "demo.RoomKind")
                    .prompt("Which room?")
                    .confirm(Confirmation::explicit("A {value} room, right?")),
            )
            .response("Room {kind} booked."),
    );
    reg.register_frame(
        FrameSpec::intent("demo", "Greet")
            .slot(SlotSpec::entity("name", "demo.Name").confirm(Confirmation::implicit("Got it, {value}.")))
            .response("Hello {name}."),
    );
    reg.register_frame(
        FrameSpec::intent("demo", "Note")
            .slot(SlotSpec::entity("text", "demo.Name").on_done("Noted {value}."))
            .response("Done."),
    );

    reg.register_frame(
        FrameSpec::intent("demo", "Feedback")
            .slot(
                SlotSpec::entity("comment", "demo.Name")
                    .prompt("Your comment?")
                    .ask(AskStrategy::BoolGate {
                        prompt: "Any comment?".to_string(),
                    }),
            )
            .response("Thanks [{comment}]"),
    );
    reg.register_frame(
        FrameSpec::intent("demo", "Ticket")
            .slot(SlotSpec::entity("title", "demo.Name").prompt("Title?"))
            .slot(SlotSpec::entity("tag", "demo.Name").ask(AskStrategy::NeverAsk))
            .slot(
                SlotSpec::entity("priority", "demo.Name")
                    .prompt("Priority?")
                    .ask(AskStrategy::ConditionalAsk(Condition::equals("title", "urgent"))),
            )
            .slot(SlotSpec::entity("reason", "demo.Name").ask(AskStrategy::RecoverOnly))
            .response("Ticket {title} tag={tag} priority={priority} reason={reason}."),
    );
    reg.register_frame(
        FrameSpec::intent("demo", "Pay")
            .slot(SlotSpec::entity("amount", "demo.Day").prompt("How much?"))
            .slot(SlotSpec::entity("code", "demo.Code").ask(AskStrategy::ExternalEvent))
            .response("Paid {amount} with {code}."),
    );
    reg.register_frame(
        FrameSpec::intent("demo", "Deploy")
            .slot(SlotSpec::entity("env", "demo.Name").prompt("Which environment?"))
            .response("Deployed to {env}.")
            .externally_triggered(),
    );

    reg.register_frame(
        FrameSpec::intent("demo", "Profile")
            .slot(SlotSpec::entity("city", "demo.City"))
            .response("Saved {city}.")
            .singleton(),
    );
    reg.register_frame(
        FrameSpec::intent("demo", "Trip")
            .slot(
                SlotSpec::entity("from", "demo.City")
                    .prompt("From where?")
                    .init(ValueInit::Global {
                        frame: "demo.Profile".to_string(),
                        attribute: "city".to_string(),
                    }),
            )
            .slot(SlotSpec::entity("to", "demo.City").init(ValueInit::Const("Paris".to_string())))
            .slot(SlotSpec::entity("when", "demo.Day").prompt("Which day?").init(ValueInit::Context))
            .response("Trip {from} to {to} on day {when}."),
    );

    // 递归 schema：子节点列表按需展开
    reg.register_frame(
        FrameSpec::frame("demo", "Node")
            .slot(SlotSpec::entity("label", "demo.Name").prompt("Label?"))
            .slot(
                SlotSpec::new("kids", SlotType::bounded_list(SlotType::Frame("demo.Node".to_string()), 0, None))
                    .has_more_prompt("More children of {label}?"),
            ),
    );
    reg.register_frame(
        FrameSpec::intent("demo", "Tree")
            .slot(SlotSpec::frame("root", "demo.Node"))
            .response("Tree rooted at {root.label}."),
    );
}

/// 单会话对话驱动：文本经记法转换器变成事件后执行一个回合
pub struct Harness {
    pub ctx: DialogContext,
    pub session: Session,
    converter: NotationConverter,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(DialogSection::default())
    }

    pub fn with_settings(settings: DialogSection) -> Self {
        let registry = Arc::new(demo_registry());
        registry.validate().expect("demo schema is valid");
        Self {
            ctx: DialogContext::new(registry.clone(), settings),
            session: Session::new("tester"),
            converter: NotationConverter::new(registry),
        }
    }

    pub fn say(&mut self, text: &str) -> Vec<ActionResult> {
        let expectations = self.session.expectations();
        let events = self.converter.parse(text, &expectations);
        self.deliver(events)
    }

    /// 直接投递事件（外部系统、触发帧）
    pub fn deliver(&mut self, events: Vec<FrameEvent>) -> Vec<ActionResult> {
        let results = self
            .ctx
            .dialog(&mut self.session)
            .run_turn(events)
            .expect("turn should succeed");
        assert!(self.state().is_turn_end(), "turn ended in {:?}", self.state());
        results
    }

    pub fn state(&self) -> SchedulerState {
        self.session.current().state
    }

    /// 每个事件（含嵌套）的类型与槽位消费标记，按固定顺序展开
    pub fn used_flags(&self) -> Vec<bool> {
        fn walk(f: &bee_frames::event::FrameEvent, out: &mut Vec<bool>) {
            out.push(f.type_used);
            out.extend(f.slots.iter().map(|s| s.used));
            for sub in &f.frames {
                walk(sub, out);
            }
        }
        let mut out = Vec::new();
        for f in self.session.events.all() {
            walk(f, &mut out);
        }
        out
    }
}

pub fn texts(results: &[ActionResult]) -> Vec<String> {
    results
        .iter()
        .flat_map(|r| r.messages.iter().map(|m| m.text().to_string()))
        .collect()
}

/// 每个推荐行为的候选列表
pub fn offers(results: &[ActionResult]) -> Vec<Vec<String>> {
    results
        .iter()
        .flat_map(|r| r.messages.iter())
        .filter_map(|m| match m {
            DialogAct::Offer { candidates, .. } => Some(candidates.clone()),
            _ => None,
        })
        .collect()
}

pub fn log_kinds(results: &[ActionResult]) -> Vec<String> {
    results
        .iter()
        .flat_map(|r| r.logs.iter().map(|l| l.kind.clone()))
        .collect()
}

pub fn has_log(results: &[ActionResult], kind: &str, items: &[&str]) -> bool {
    let want: Vec<String> = items.iter().map(|s| s.to_string()).collect();
    results
        .iter()
        .flat_map(|r| r.logs.iter())
        .any(|l| l.kind == kind && l.payload == LogPayload::Array(want.clone()))
}
