//! 自然语言理解边界
//!
//! Converter 把一句用户输入转换为一组 FrameEvent。引擎本身不关心文本，
//! 只消费事件；NotationConverter 是一个确定性的规则实现，支持紧凑记法：
//!
//! ```text
//! demo.Person(name=Joe, age=*); yes
//! ```
//!
//! - `Type(attr=value, ...)`：帧事件，value 为 `*` 表示「都行」，`_context` 表示从上下文取值，
//!   value 也可以是嵌套的 `Type(...)`
//! - `yes` / `no` / `next` / `abort [Intent]`：系统帧
//! - 裸值或 `attr=value`：按当前期待（焦点帧类型与属性）生成槽位赋值

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;

use crate::event::{EntityEvent, FrameEvent};
use crate::schema::{system, Registry};

/// 当前焦点，供 NLU 消歧
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expectations {
    pub frame_type: Option<String>,
    pub attribute: Option<String>,
    /// 焦点是一个是 / 否问题
    pub decision: bool,
}

/// 文本 -> 帧事件
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, user_key: &str, text: &str, expectations: &Expectations) -> Vec<FrameEvent>;
}

static TYPED_RE: OnceLock<Regex> = OnceLock::new();
static ASSIGN_RE: OnceLock<Regex> = OnceLock::new();

fn typed_re() -> &'static Regex {
    TYPED_RE.get_or_init(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_.]*)\s*\((.*)\)$").unwrap())
}

fn assign_re() -> &'static Regex {
    ASSIGN_RE.get_or_init(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.*)$").unwrap())
}

/// 规则记法转换器
#[derive(Debug, Clone)]
pub struct NotationConverter {
    registry: Arc<Registry>,
}

impl NotationConverter {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// 同步解析，`;` 分隔多个事件
    pub fn parse(&self, text: &str, expectations: &Expectations) -> Vec<FrameEvent> {
        split_top_level(text, ';')
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|segment| self.parse_segment(segment, expectations))
            .collect()
    }

    fn parse_segment(&self, segment: &str, expectations: &Expectations) -> Option<FrameEvent> {
        if let Some(event) = keyword(segment) {
            return Some(event);
        }
        if let Some(event) = parse_typed(segment) {
            return Some(event);
        }
        if let Some(caps) = assign_re().captures(segment) {
            let frame_type = expectations.frame_type.as_ref()?;
            return Some(
                FrameEvent::new(frame_type.clone())
                    .with_entity(entity(&caps[1], caps[2].trim()))
                    .inferred(),
            );
        }

        let bare = FrameEvent::new(segment);
        if let Some(spec) = self.registry.find_by_event(&bare) {
            return Some(FrameEvent::new(spec.qualified()));
        }
        match (&expectations.frame_type, &expectations.attribute) {
            (Some(frame_type), Some(attribute)) => {
                Some(FrameEvent::new(frame_type.clone()).with_entity(entity(attribute, segment)).inferred())
            }
            _ => {
                tracing::debug!("Dropped segment without expectation: {}", segment);
                None
            }
        }
    }
}

#[async_trait]
impl Converter for NotationConverter {
    async fn convert(&self, user_key: &str, text: &str, expectations: &Expectations) -> Vec<FrameEvent> {
        let events = self.parse(text, expectations);
        tracing::debug!("Converted input of {} into {} events", user_key, events.len());
        events
    }
}

/// 是 / 否 / 翻页 / 中止
fn keyword(segment: &str) -> Option<FrameEvent> {
    let lower = segment.to_lowercase();
    match lower.as_str() {
        "yes" | "y" | "yeah" | "sure" | "ok" => return Some(FrameEvent::new(system::YES)),
        "no" | "n" | "nope" => return Some(FrameEvent::new(system::NO)),
        "next" | "more" => return Some(FrameEvent::new(system::NEXT_PAGE)),
        _ => {}
    }
    let rest = lower
        .strip_prefix("abort")
        .or_else(|| lower.strip_prefix("cancel"))?;
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    let target = segment
        .get(segment.len().saturating_sub(rest.len())..)
        .unwrap_or_default()
        .trim();
    let mut event = FrameEvent::new(system::ABORT_INTENT);
    if !target.is_empty() {
        event = event.with_slot(system::ABORT_TARGET, target);
    }
    Some(event)
}

/// `Type(attr=value, ...)`，允许嵌套
fn parse_typed(segment: &str) -> Option<FrameEvent> {
    let caps = typed_re().captures(segment)?;
    let mut event = FrameEvent::new(&caps[1]);
    for arg in split_top_level(&caps[2], ',') {
        let arg = arg.trim();
        if arg.is_empty() {
            continue;
        }
        if let Some(sub) = parse_typed(arg) {
            event = event.with_frame(sub);
            continue;
        }
        let (attribute, value) = arg.split_once('=')?;
        let value = value.trim();
        match parse_typed(value) {
            Some(sub) => event = event.with_frame(sub),
            None => event = event.with_entity(entity(attribute.trim(), value)),
        }
    }
    Some(event)
}

fn entity(attribute: &str, value: &str) -> EntityEvent {
    if value == "*" {
        EntityEvent::dont_care(attribute)
    } else {
        EntityEvent::new(attribute, value)
    }
}

/// 只在括号深度为 0 处切分
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FrameSpec;

    fn converter() -> NotationConverter {
        let mut registry = Registry::with_system_frames();
        registry.register_frame(FrameSpec::intent("demo", "Hi"));
        NotationConverter::new(Arc::new(registry))
    }

    #[test]
    fn test_typed_notation() {
        let events = converter().parse("demo.Person(name=Joe, age=*)", &Expectations::default());
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.type_name, "demo.Person");
        assert_eq!(e.slots[0].value, "Joe");
        assert!(e.slots[1].dont_care);
    }

    #[test]
    fn test_nested_and_multiple_segments() {
        let events = converter().parse("demo.Order(item=demo.Item(name=tea)); yes", &Expectations::default());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].frames[0].slots[0].value, "tea");
        assert_eq!(events[1].type_name, system::YES);
    }

    #[test]
    fn test_bare_value_uses_expectation() {
        let exp = Expectations {
            frame_type: Some("demo.Person".to_string()),
            attribute: Some("name".to_string()),
            decision: false,
        };
        let events = converter().parse("Joe", &exp);
        assert_eq!(events[0].type_name, "demo.Person");
        assert_eq!(events[0].slots[0].attribute, "name");
        assert!(events[0].inferred_from);
        assert!(!converter().parse("demo.Person(name=Joe)", &exp)[0].inferred_from);

        let events = converter().parse("age=3", &exp);
        assert_eq!(events[0].slots[0].attribute, "age");
    }

    #[test]
    fn test_known_frame_name_and_dropped_text() {
        let events = converter().parse("Hi", &Expectations::default());
        assert_eq!(events[0].type_name, "demo.Hi");
        assert!(converter().parse("hello there", &Expectations::default()).is_empty());
    }

    #[test]
    fn test_abort_keyword() {
        let events = converter().parse("abort Person", &Expectations::default());
        assert_eq!(events[0].type_name, system::ABORT_INTENT);
        assert_eq!(events[0].slots[0].value, "Person");
        let events = converter().parse("Abort", &Expectations::default());
        assert!(events[0].slots.is_empty());
        assert!(keyword("abortion").is_none());
    }
}
