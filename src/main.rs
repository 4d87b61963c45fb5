//! Bee Frames - 控制台示例机器人
//!
//! 入口：初始化日志、加载配置、注册示例 schema，然后逐行读取标准输入并打印对话行为。
//! 输入支持记法 `demo.Book(start=5, end=9)`、关键字 `yes` / `no` / `next` / `abort`，
//! 以及针对当前提问的裸值。

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use bee_frames::action::DialogAct;
use bee_frames::config::{load_config, StoreSection};
use bee_frames::engine::DialogContext;
use bee_frames::nlu::NotationConverter;
use bee_frames::schema::{
    Condition, Confirmation, EntitySpec, FrameSpec, Recommendation, Registry, SlotSpec, SlotType, SlotValues,
    StaticCandidates, ValueCheck, Validator,
};
use bee_frames::session::{MemorySessionStore, SessionStore};
use bee_frames::DialogService;
use tokio::io::{AsyncBufReadExt, BufReader};

fn sample_registry() -> anyhow::Result<Registry> {
    let mut reg = Registry::with_system_frames();
    reg.register_entity(EntitySpec::new("demo.Name", Validator::Any));
    reg.register_entity(EntitySpec::new("demo.Age", Validator::range(0, 150)));
    reg.register_entity(EntitySpec::new("demo.Dish", Validator::Any));
    reg.register_entity(EntitySpec::new("demo.Day", Validator::range(1, 31)));
    reg.register_entity(EntitySpec::new(
        "demo.Room",
        Validator::pattern(r"^(?i)(single|double|suite)$").context("Invalid room pattern")?,
    ));
    reg.register_source(
        "dishes",
        StaticCandidates(["noodles", "dumplings", "fried rice", "hot pot", "baozi"].map(String::from).to_vec()),
    );
    reg.register_predicate("end_after_start", |values: &SlotValues| {
        let day = |k: &str| values.get(k).and_then(|v| v.parse::<i64>().ok());
        matches!((day("start"), day("end")), (Some(s), Some(e)) if e > s)
    });

    reg.register_frame(
        FrameSpec::frame("demo", "Person")
            .slot(SlotSpec::entity("name", "demo.Name").prompt("What is your name?"))
            .slot(
                SlotSpec::entity("age", "demo.Age")
                    .prompt("How old are you, {name}?")
                    .confirm(Confirmation::implicit("Got it, {value}.")),
            ),
    );
    reg.register_frame(
        FrameSpec::intent("demo", "Hi")
            .slot(SlotSpec::frame("person", "demo.Person"))
            .response("Nice to meet you, {person.name}!")
            .singleton(),
    );
    reg.register_frame(
        FrameSpec::intent("demo", "Order")
            .slot(
                SlotSpec::new("dishes", SlotType::bounded_list(SlotType::Entity("demo.Dish".to_string()), 1, Some(4)))
                    .prompt("What would you like to eat?")
                    .has_more_prompt("Anything else?")
                    .recommend(Recommendation::new("dishes", "Today we have:").page_size(2)),
            )
            .response("Your order: {dishes}."),
    );
    reg.register_frame(
        FrameSpec::intent("demo", "Book")
            .slot(SlotSpec::entity("start", "demo.Day").prompt("Which day do you arrive?"))
            .slot(
                SlotSpec::entity("end", "demo.Day")
                    .prompt("Which day do you leave?")
                    .check(
                        ValueCheck::new(Condition::named("end_after_start"), "You must leave after day {start}.")
                            .cleanup(["start", "end"]),
                    ),
            )
            .slot(
                SlotSpec::entity("room", "demo.Room")
                    .prompt("Single, double or suite?")
                    .confirm(Confirmation::explicit("A {value} room, right?")),
            )
            .response("Booked a {room} room from day {start} to day {end}."),
    );
    reg.validate().context("Sample schema is inconsistent")?;
    Ok(reg)
}

#[cfg(feature = "async-sqlite")]
async fn open_store(section: &StoreSection) -> anyhow::Result<Arc<dyn SessionStore>> {
    let Some(path) = &section.sqlite_path else {
        return Ok(Arc::new(MemorySessionStore::new()));
    };
    let store = bee_frames::session::SqliteSessionStore::new(path, section.session_ttl_secs)
        .await
        .context("Failed to open session database")?;
    tracing::info!("Sessions persisted to {}", path.display());
    Ok(Arc::new(store))
}

#[cfg(not(feature = "async-sqlite"))]
async fn open_store(section: &StoreSection) -> anyhow::Result<Arc<dyn SessionStore>> {
    if section.sqlite_path.is_some() {
        tracing::warn!("sqlite_path is set but the async-sqlite feature is off, using memory store");
    }
    Ok(Arc::new(MemorySessionStore::new()))
}

fn print_act(label: &str, act: &DialogAct) {
    match act {
        DialogAct::Offer {
            prompt,
            candidates,
            page,
            ..
        } => println!("{label}: {prompt} {} (page {})", candidates.join(" / "), page + 1),
        other => println!("{label}: {}", other.text()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    bee_frames::observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let registry = Arc::new(sample_registry()?);
    let ctx = Arc::new(DialogContext::new(registry.clone(), cfg.dialog.clone()));
    let store = open_store(&cfg.store).await?;
    let service = DialogService::new(ctx, store, Arc::new(NotationConverter::new(registry)));

    let label = cfg.app.bot_label.clone();
    println!("{label}: Hello! Try 'Hi', 'Order' or 'Book'. Ctrl-D to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().context("Failed to flush stdout")?;
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match service.handle("console", line).await {
            Ok(out) => {
                for act in &out.acts {
                    print_act(&label, act);
                }
                tracing::debug!("Turn ended in {:?}", out.state);
            }
            Err(e) => tracing::error!("Turn failed: {}", e),
        }
    }
    Ok(())
}
