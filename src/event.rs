//! 帧事件模型
//!
//! EntityEvent 是一次槽位赋值候选，FrameEvent 是同一类型下的一组赋值（可嵌套）。
//! 事件在会话内累积（EventLog），只有尚未用尽的事件参与匹配；事件一旦被消费就不会再被使用。

use serde::{Deserialize, Serialize};

/// 上下文填充哨兵值：在已填写的帧中查找同类型实体
pub const CONTEXT_VALUE: &str = "_context";

/// 事件来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    #[default]
    User,
    /// 外部系统投递（ExternalEventStrategy 槽位只接受这类事件）
    External,
    System,
}

/// 单个槽位赋值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEvent {
    pub value: String,
    pub attribute: String,
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub used: bool,
    #[serde(default)]
    pub dont_care: bool,
    /// 指代（"it"、"that"）而非字面值
    #[serde(default)]
    pub reference: bool,
}

impl EntityEvent {
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            attribute: attribute.into(),
            type_name: None,
            used: false,
            dont_care: false,
            reference: false,
        }
    }

    pub fn dont_care(attribute: impl Into<String>) -> Self {
        Self {
            dont_care: true,
            ..Self::new(attribute, "")
        }
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// 空值或 don't-care：满足槽位但不赋真实值
    pub fn accepts_anything(&self) -> bool {
        self.dont_care || self.value.is_empty()
    }

    pub fn is_context_ref(&self) -> bool {
        self.value == CONTEXT_VALUE
    }
}

/// 一次结构化理解结果：类型 + 槽位赋值 + 嵌套帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameEvent {
    pub type_name: String,
    #[serde(default)]
    pub package: Option<String>,
    #[serde(default)]
    pub slots: Vec<EntityEvent>,
    #[serde(default)]
    pub frames: Vec<FrameEvent>,
    #[serde(default)]
    pub triggered: bool,
    #[serde(default)]
    pub type_used: bool,
    #[serde(default)]
    pub inferred_from: bool,
    #[serde(default)]
    pub refocused: bool,
    #[serde(default)]
    pub turn_id: u64,
    #[serde(default)]
    pub source: EventSource,
}

impl FrameEvent {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            package: None,
            slots: Vec::new(),
            frames: Vec::new(),
            triggered: false,
            type_used: false,
            inferred_from: false,
            refocused: false,
            turn_id: 0,
            source: EventSource::User,
        }
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn with_slot(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.slots.push(EntityEvent::new(attribute, value));
        self
    }

    pub fn with_entity(mut self, entity: EntityEvent) -> Self {
        self.slots.push(entity);
        self
    }

    pub fn with_frame(mut self, frame: FrameEvent) -> Self {
        self.frames.push(frame);
        self
    }

    /// 帧类型由当前焦点推断，而非用户明说
    pub fn inferred(mut self) -> Self {
        self.inferred_from = true;
        self
    }

    /// 外部触发（ExternalEvent 槽位、外部触发帧）
    pub fn external(mut self) -> Self {
        self.triggered = true;
        self.source = EventSource::External;
        self
    }

    pub fn qualified_type(&self) -> String {
        match &self.package {
            Some(p) if !self.type_name.contains('.') => format!("{}.{}", p, self.type_name),
            _ => self.type_name.clone(),
        }
    }

    /// 与注册表中的限定类型名（`pkg.Name`）比较；事件可只带简单名
    pub fn matches_type(&self, qualified: &str) -> bool {
        if self.qualified_type() == qualified {
            return true;
        }
        if self.type_name.contains('.') {
            return false;
        }
        let (package, name) = split_qualified(qualified);
        self.type_name == name && self.package.as_deref().map_or(true, |p| p == package)
    }

    pub fn is_bare(&self) -> bool {
        self.slots.is_empty() && self.frames.is_empty()
    }

    /// 所有槽位与子帧均已使用；无内容的事件以类型被消费为准
    pub fn used_up(&self) -> bool {
        if self.is_bare() {
            self.type_used
        } else {
            self.slots.iter().all(|s| s.used) && self.frames.iter().all(FrameEvent::used_up)
        }
    }

    pub fn is_active(&self) -> bool {
        !self.used_up()
    }

    /// 事件中没有任何部分被消费过
    pub fn untouched(&self) -> bool {
        !self.type_used
            && self.slots.iter().all(|s| !s.used)
            && self.frames.iter().all(FrameEvent::untouched)
    }

    pub fn has_unused_slot(&self) -> bool {
        self.slots.iter().any(|s| !s.used) || self.frames.iter().any(FrameEvent::has_unused_slot)
    }

    pub fn mark_used(&mut self) {
        self.type_used = true;
        for s in &mut self.slots {
            s.used = true;
        }
        for f in &mut self.frames {
            f.mark_used();
        }
    }

    fn stamp(&mut self, turn_id: u64) {
        self.turn_id = turn_id;
        for f in &mut self.frames {
            f.stamp(turn_id);
        }
    }
}

/// 拆分 `pkg.Name`；无包名时包名为空串
pub fn split_qualified(qualified: &str) -> (&str, &str) {
    match qualified.rfind('.') {
        Some(idx) => (&qualified[..idx], &qualified[idx + 1..]),
        None => ("", qualified),
    }
}

/// 事件句柄：顶层下标 + 嵌套下标路径，可选指向其中一个槽位
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRef {
    pub path: Vec<usize>,
    pub slot: Option<usize>,
}

impl EventRef {
    pub fn frame(path: Vec<usize>) -> Self {
        Self { path, slot: None }
    }

    pub fn entity(path: Vec<usize>, slot: usize) -> Self {
        Self {
            path,
            slot: Some(slot),
        }
    }
}

/// 匹配范围：全部活跃事件，或只看某一回合的新事件；External* 只看外部投递的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventScope {
    Active,
    Turn(u64),
    External,
    ExternalTurn(u64),
}

impl EventScope {
    /// 同一回合范围内收窄到外部来源
    pub fn external_only(self) -> Self {
        match self {
            EventScope::Active | EventScope::External => EventScope::External,
            EventScope::Turn(t) | EventScope::ExternalTurn(t) => EventScope::ExternalTurn(t),
        }
    }

    /// 按顶层事件判断
    pub fn admits(self, f: &FrameEvent) -> bool {
        match self {
            EventScope::Active => true,
            EventScope::Turn(t) => f.turn_id == t,
            EventScope::External => f.source == EventSource::External,
            EventScope::ExternalTurn(t) => f.turn_id == t && f.source == EventSource::External,
        }
    }
}

/// 会话内累积的事件日志
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    frames: Vec<FrameEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一回合的事件并打上回合号
    pub fn append(&mut self, events: Vec<FrameEvent>, turn_id: u64) {
        for mut e in events {
            e.stamp(turn_id);
            self.frames.push(e);
        }
    }

    pub fn all(&self) -> &[FrameEvent] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn frame(&self, r: &EventRef) -> Option<&FrameEvent> {
        let (first, rest) = r.path.split_first()?;
        let mut cur = self.frames.get(*first)?;
        for idx in rest {
            cur = cur.frames.get(*idx)?;
        }
        Some(cur)
    }

    pub fn frame_mut(&mut self, r: &EventRef) -> Option<&mut FrameEvent> {
        let (first, rest) = r.path.split_first()?;
        let mut cur = self.frames.get_mut(*first)?;
        for idx in rest {
            cur = cur.frames.get_mut(*idx)?;
        }
        Some(cur)
    }

    pub fn entity(&self, r: &EventRef) -> Option<&EntityEvent> {
        self.frame(r)?.slots.get(r.slot?)
    }

    pub fn entity_mut(&mut self, r: &EventRef) -> Option<&mut EntityEvent> {
        let slot = r.slot?;
        self.frame_mut(r)?.slots.get_mut(slot)
    }

    /// 标记已使用：槽位句柄只标记该槽位，帧句柄标记类型
    pub fn mark_used(&mut self, r: &EventRef) {
        match r.slot {
            Some(_) => {
                if let Some(e) = self.entity_mut(r) {
                    e.used = true;
                }
            }
            None => {
                if let Some(f) = self.frame_mut(r) {
                    f.type_used = true;
                }
            }
        }
    }

    /// 展开所有活跃帧（含嵌套），按出现顺序返回 (路径, 帧)
    pub fn active_frames(&self, scope: EventScope) -> Vec<(Vec<usize>, &FrameEvent)> {
        let mut out = Vec::new();
        for (i, f) in self.frames.iter().enumerate() {
            if !scope.admits(f) {
                continue;
            }
            collect_active(f, vec![i], &mut out);
        }
        out
    }

    /// 指定回合的顶层事件
    pub fn turn_frames(&self, turn_id: u64) -> impl Iterator<Item = (usize, &FrameEvent)> {
        self.frames
            .iter()
            .enumerate()
            .filter(move |(_, f)| f.turn_id == turn_id)
    }
}

fn collect_active<'a>(f: &'a FrameEvent, path: Vec<usize>, out: &mut Vec<(Vec<usize>, &'a FrameEvent)>) {
    if !f.is_active() {
        return;
    }
    for (j, sub) in f.frames.iter().enumerate() {
        let mut p = path.clone();
        p.push(j);
        collect_active(sub, p, out);
    }
    out.push((path, f));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_event_used_up_by_type() {
        let mut e = FrameEvent::new("Hi");
        assert!(e.is_active());
        e.type_used = true;
        assert!(e.used_up());
    }

    #[test]
    fn test_event_with_slots_needs_all_slots() {
        let mut e = FrameEvent::new("Person").with_slot("name", "Joe").with_slot("age", "30");
        e.type_used = true;
        assert!(e.is_active());
        e.slots[0].used = true;
        assert!(e.is_active());
        e.slots[1].used = true;
        assert!(e.used_up());
    }

    #[test]
    fn test_matches_type_simple_and_qualified() {
        let e = FrameEvent::new("Hi");
        assert!(e.matches_type("demo.Hi"));
        let e = FrameEvent::new("Hi").with_package("other");
        assert!(!e.matches_type("demo.Hi"));
        let e = FrameEvent::new("demo.Hi");
        assert!(e.matches_type("demo.Hi"));
        assert!(!e.matches_type("demo.Bye"));
    }

    #[test]
    fn test_event_log_nested_refs() {
        let mut log = EventLog::new();
        log.append(
            vec![FrameEvent::new("Hi").with_frame(FrameEvent::new("Person").with_slot("name", "Joe"))],
            3,
        );
        let active = log.active_frames(EventScope::Turn(3));
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].0, vec![0, 0]);
        let r = EventRef::entity(vec![0, 0], 0);
        assert_eq!(log.entity(&r).unwrap().value, "Joe");
        log.mark_used(&r);
        assert!(log.active_frames(EventScope::Turn(3)).iter().all(|(p, _)| p != &vec![0, 0]));
        assert!(log.active_frames(EventScope::Turn(4)).is_empty());
    }

    #[test]
    fn test_external_scope_skips_user_events() {
        let mut log = EventLog::new();
        log.append(
            vec![
                FrameEvent::new("Pay").with_slot("code", "typed"),
                FrameEvent::new("Pay").with_slot("code", "A1").external(),
            ],
            2,
        );
        assert_eq!(log.active_frames(EventScope::Active).len(), 2);
        let external = log.active_frames(EventScope::Turn(2).external_only());
        assert_eq!(external.len(), 1);
        assert_eq!(external[0].0, vec![1]);
        assert!(log.active_frames(EventScope::ExternalTurn(3)).is_empty());
    }
}
