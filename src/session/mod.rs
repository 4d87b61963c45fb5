//! 会话：一个用户与机器人之间的对话聚合根
//!
//! 拥有事件日志、Scheduler 栈（主线 + 旁支意图）、填充器 arena、全局单例与已完成意图历史。
//! 整体可序列化为 JSON，由 SessionStore 负责加载 / 保存。

pub mod store;

pub use store::{MemorySessionStore, SessionStore};
#[cfg(feature = "async-sqlite")]
pub use store::SqliteSessionStore;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::DialogError;
use crate::engine::Scheduler;
use crate::event::EventLog;
use crate::filler::{FillerArena, FillerId, FillerKind};
use crate::nlu::Expectations;

/// 带实体类型的已填写值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotValue {
    pub attribute: String,
    pub entity_type: String,
    pub value: String,
}

/// 已结束（完成或中止）的意图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedIntent {
    pub intent_type: String,
    pub values: Vec<SlotValue>,
    pub turn_id: u64,
    pub aborted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_key: String,
    pub events: EventLog,
    /// 主线 Scheduler，永远存在
    pub main: Scheduler,
    /// 旁支意图的 Scheduler，后进先出
    pub side: Vec<Scheduler>,
    pub arena: FillerArena,
    /// 单例帧类型 -> 最近一次完成时的值
    pub globals: BTreeMap<String, Vec<SlotValue>>,
    pub finished: Vec<FinishedIntent>,
    pub turn_id: u64,
    /// 已发出过输入拒绝的回合
    pub rejected_turn: Option<u64>,
    pub consecutive_failures: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_key: user_key.into(),
            events: EventLog::new(),
            main: Scheduler::new(),
            side: Vec::new(),
            arena: FillerArena::new(),
            globals: BTreeMap::new(),
            finished: Vec::new(),
            turn_id: 0,
            rejected_turn: None,
            consecutive_failures: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// 清空对话状态，保留身份与回合计数
    pub fn cleanup(&mut self) {
        let fresh = Session {
            id: self.id,
            user_key: std::mem::take(&mut self.user_key),
            created_at: self.created_at,
            turn_id: self.turn_id,
            ..Session::new("")
        };
        *self = fresh;
        tracing::info!("Session {} reset", self.id);
    }

    /// 当前 Scheduler（最内层旁支，没有则为主线）
    pub fn current(&self) -> &Scheduler {
        self.side.last().unwrap_or(&self.main)
    }

    pub fn current_mut(&mut self) -> &mut Scheduler {
        match self.side.last_mut() {
            Some(s) => s,
            None => &mut self.main,
        }
    }

    pub fn schedulers(&self) -> impl Iterator<Item = &Scheduler> {
        std::iter::once(&self.main).chain(self.side.iter())
    }

    pub(crate) fn schedulers_mut(&mut self) -> impl Iterator<Item = &mut Scheduler> {
        std::iter::once(&mut self.main).chain(self.side.iter_mut())
    }

    pub(crate) fn push_side(&mut self, scheduler: Scheduler) {
        self.side.push(scheduler);
    }

    /// 丢弃已清空的旁支；返回是否丢弃过
    pub(crate) fn drain_side_schedulers(&mut self) -> bool {
        let mut drained = false;
        while self.side.last().is_some_and(Scheduler::is_empty) {
            self.side.pop();
            drained = true;
        }
        drained
    }

    /// 栈上出现已删除的句柄时，从第一个失效处截断
    pub(crate) fn prune_dead(&mut self) {
        let arena = &self.arena;
        let cut: Vec<Option<usize>> = std::iter::once(&self.main)
            .chain(self.side.iter())
            .map(|s| s.stack.iter().position(|id| !arena.contains(*id)))
            .collect();
        for (s, cut) in self.schedulers_mut().zip(cut) {
            if let Some(len) = cut {
                s.truncate(len);
            }
        }
    }

    /// 当前焦点对应的 (帧类型, 属性)
    pub fn focus_slot(&self) -> Option<(String, String)> {
        let top = self.current().top()?;
        let node = self.arena.get(top)?;
        let owner = self.arena.owner(top)?;
        let owner_type = match &self.arena.get(owner)?.kind {
            FillerKind::Frame(f) => f.frame_type.clone(),
            FillerKind::Interface(i) => i.interface_type.clone(),
            _ => return None,
        };
        Some((owner_type, node.attribute.clone()))
    }

    /// 供 NLU 使用的当前期待
    pub fn expectations(&self) -> Expectations {
        let top = self.current().top();
        let decision = top
            .and_then(|id| self.arena.get(id))
            .is_some_and(|n| matches!(n.kind, FillerKind::Decision(_)));
        match self.focus_slot() {
            Some((frame_type, attribute)) => Expectations {
                frame_type: Some(frame_type),
                attribute: Some(attribute),
                decision,
            },
            None => Expectations::default(),
        }
    }

    /// 上下文查找：先活跃填充器（新到旧），再已完成意图，最后全局单例
    pub fn search_context(&self, entity_type: &str, exclude: Option<FillerId>) -> Option<String> {
        let ids: Vec<FillerId> = self.arena.ids().collect();
        for id in ids.into_iter().rev() {
            if Some(id) == exclude {
                continue;
            }
            if let Some(e) = self.arena.entity(id) {
                if e.entity_type == entity_type {
                    if let Some(v) = &e.value {
                        return Some(v.clone());
                    }
                }
            }
        }
        let finished = self.finished.iter().rev().flat_map(|f| f.values.iter());
        let globals = self.globals.values().flat_map(|v| v.iter());
        finished
            .chain(globals)
            .find(|v| v.entity_type == entity_type)
            .map(|v| v.value.clone())
    }

    pub fn global_value(&self, frame: &str, attribute: &str) -> Option<String> {
        self.globals
            .get(frame)?
            .iter()
            .find(|v| v.attribute == attribute)
            .map(|v| v.value.clone())
    }

    /// 当前活跃的意图类型（所有 Scheduler 的栈底）
    pub fn active_intents(&self) -> Vec<String> {
        self.schedulers()
            .filter_map(|s| s.stack.first())
            .filter_map(|id| self.arena.wrapper(*id))
            .map(|w| w.slot.frame_type.clone())
            .collect()
    }

    pub fn to_json(&self) -> Result<String, DialogError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, DialogError> {
        Ok(serde_json::from_str(json)?)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
