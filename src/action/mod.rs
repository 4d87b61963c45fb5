//! Action 层：kernel step 的输出
//!
//! 每个 Action 属于四类之一（构造填充树、修改状态、schema / 响应、组合），`run` 修改会话并返回
//! `{messages, logs, success}`。组合动作（Seq）对子动作的 success 取与，消息和日志顺序拼接。

mod prompt;
mod run;

pub use prompt::render;

use serde::{Deserialize, Serialize};

use crate::engine::RefocusPlan;
use crate::event::EventRef;
use crate::filler::{Fill, FillerId};

/// Action 所属的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionRole {
    /// 构造或改写填充树 / Scheduler 栈
    Chart,
    /// 修改填充器状态
    State,
    /// 产出面向用户的内容
    Response,
    Composite,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// 从事件启动意图；side 为 true 时放到新的旁支 Scheduler
    StartIntent { intent: String, event: EventRef, side: bool },
    Refocus(RefocusPlan),
    /// 中止目标意图（缺省为最内层）
    AbortIntent { target: Option<String>, event: EventRef },
    Commit { filler: FillerId, fill: Fill },
    UpdateSlot { wrapper: FillerId },
    Cleanup { targets: Vec<FillerId> },
    Ask { filler: FillerId },
    Respond { wrapper: FillerId },
    ImplicitConfirm { wrapper: FillerId },
    NotifyDone { wrapper: FillerId },
    CheckValue { check: FillerId },
    /// 本回合没有被任何部分消费的顶层事件
    Reject { events: Vec<usize> },
    ListOverflow { list: FillerId, event: EventRef },
    /// 按需构建子树失败：关闭该 Wrapper，会话继续
    BuildFailed { wrapper: FillerId, reason: String },
    Recover,
    Seq(Vec<Action>),
}

impl Action {
    /// 结构化日志里的动作名
    pub fn name(&self) -> &'static str {
        match self {
            Action::StartIntent { .. } => "StartIntentAction",
            Action::Refocus(_) => "RefocusAction",
            Action::AbortIntent { .. } => "AbortIntentAction",
            Action::Commit { .. } => "FillAction",
            Action::UpdateSlot { .. } => "UpdateSlotAction",
            Action::Cleanup { .. } => "CleanupAction",
            Action::Ask { .. } => "SlotAskAction",
            Action::Respond { .. } => "RespondAction",
            Action::ImplicitConfirm { .. } => "ConfirmAction",
            Action::NotifyDone { .. } => "SlotDoneAction",
            Action::CheckValue { .. } => "ValueCheckAction",
            Action::Reject { .. } => "RejectAction",
            Action::ListOverflow { .. } => "ListOverflowAction",
            Action::BuildFailed { .. } => "BuildFailedAction",
            Action::Recover => "RecoverAction",
            Action::Seq(_) => "SeqAction",
        }
    }

    pub fn role(&self) -> ActionRole {
        match self {
            Action::StartIntent { .. }
            | Action::Refocus(_)
            | Action::AbortIntent { .. }
            | Action::Cleanup { .. }
            | Action::BuildFailed { .. }
            | Action::Recover => ActionRole::Chart,
            Action::Commit { .. }
            | Action::UpdateSlot { .. }
            | Action::CheckValue { .. }
            | Action::ListOverflow { .. } => ActionRole::State,
            Action::Ask { .. }
            | Action::Respond { .. }
            | Action::ImplicitConfirm { .. }
            | Action::NotifyDone { .. }
            | Action::Reject { .. } => ActionRole::Response,
            Action::Seq(_) => ActionRole::Composite,
        }
    }
}

/// 可渲染的对话行为；最终文本渲染由外部负责
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "act", rename_all = "snake_case")]
pub enum DialogAct {
    Ask { slot: String, prompt: String },
    Confirm { slot: String, prompt: String },
    Offer {
        slot: String,
        prompt: String,
        candidates: Vec<String>,
        page: usize,
    },
    Inform { text: String },
    Reject { text: String },
}

impl DialogAct {
    pub fn text(&self) -> &str {
        match self {
            DialogAct::Ask { prompt, .. } | DialogAct::Confirm { prompt, .. } | DialogAct::Offer { prompt, .. } => {
                prompt
            }
            DialogAct::Inform { text } | DialogAct::Reject { text } => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogPayload {
    Text(String),
    Array(Vec<String>),
}

/// 回归比对用的结构化日志
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: String,
    pub payload: LogPayload,
    pub testable: bool,
}

impl LogEntry {
    pub fn text(kind: &str, text: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            payload: LogPayload::Text(text.into()),
            testable: true,
        }
    }

    pub fn array<I, S>(kind: &str, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: kind.to_string(),
            payload: LogPayload::Array(items.into_iter().map(Into::into).collect()),
            testable: true,
        }
    }

    /// 诊断信息，不参与回归比对
    pub fn untestable(mut self) -> Self {
        self.testable = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub messages: Vec<DialogAct>,
    pub logs: Vec<LogEntry>,
    pub success: bool,
}

impl Default for ActionResult {
    fn default() -> Self {
        Self::ok()
    }
}

impl ActionResult {
    pub fn ok() -> Self {
        Self {
            messages: Vec::new(),
            logs: Vec::new(),
            success: true,
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            ..Self::ok()
        }
    }

    pub fn with_message(mut self, act: DialogAct) -> Self {
        self.messages.push(act);
        self
    }

    pub fn with_log(mut self, entry: LogEntry) -> Self {
        self.logs.push(entry);
        self
    }

    /// 组合：success 取与，消息与日志拼接
    pub fn merge(mut self, other: ActionResult) -> Self {
        self.success &= other.success;
        self.messages.extend(other.messages);
        self.logs.extend(other.logs);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_ands_success() {
        let a = ActionResult::ok().with_log(LogEntry::text("CleanupAction", "start"));
        let b = ActionResult::failed().with_message(DialogAct::Inform { text: "x".to_string() });
        let merged = a.merge(b);
        assert!(!merged.success);
        assert_eq!(merged.logs.len(), 1);
        assert_eq!(merged.messages.len(), 1);
    }

    #[test]
    fn test_log_payload_serializes_untagged() {
        let entry = LogEntry::array("FillAction", ["name", "Joe"]);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["payload"], serde_json::json!(["name", "Joe"]));
        let act = DialogAct::Ask {
            slot: "name".to_string(),
            prompt: "What is your name?".to_string(),
        };
        assert_eq!(serde_json::to_value(&act).unwrap()["act"], "ask");
    }

    #[test]
    fn test_action_names_and_roles() {
        assert_eq!(Action::Recover.name(), "RecoverAction");
        assert_eq!(Action::Seq(vec![]).role(), ActionRole::Composite);
        assert_eq!(Action::Cleanup { targets: vec![] }.role(), ActionRole::Chart);
    }
}
