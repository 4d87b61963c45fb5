//! Scheduler：一条对话焦点线程的显式状态栈

use serde::{Deserialize, Serialize};

use crate::filler::FillerId;

/// 回合引擎状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulerState {
    /// 没有焦点
    #[default]
    Init,
    /// 焦点需要值且没有可用事件
    Ask,
    /// 已提问，等待回答
    PostAsk,
    /// 结构已变化，需要弹出完成节点并生长新栈顶
    Reschedule,
    /// 焦点意图已填满，等待响应
    Respond,
    /// 回合中途失败
    Recover,
}

impl SchedulerState {
    /// 回合只能停在这三个状态
    pub fn is_turn_end(self) -> bool {
        matches!(
            self,
            SchedulerState::Init | SchedulerState::PostAsk | SchedulerState::Recover
        )
    }
}

/// 从根到焦点的填充器栈
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scheduler {
    pub stack: Vec<FillerId>,
    pub state: SchedulerState,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn top(&self) -> Option<FillerId> {
        self.stack.last().copied()
    }

    pub fn push(&mut self, id: FillerId) {
        self.stack.push(id);
    }

    pub fn pop(&mut self) -> Option<FillerId> {
        self.stack.pop()
    }

    pub fn truncate(&mut self, len: usize) {
        self.stack.truncate(len);
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn position(&self, id: FillerId) -> Option<usize> {
        self.stack.iter().position(|x| *x == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_end_states() {
        assert!(SchedulerState::Init.is_turn_end());
        assert!(SchedulerState::PostAsk.is_turn_end());
        assert!(SchedulerState::Recover.is_turn_end());
        assert!(!SchedulerState::Ask.is_turn_end());
        assert!(!SchedulerState::Reschedule.is_turn_end());
        assert!(!SchedulerState::Respond.is_turn_end());
    }

    #[test]
    fn test_stack_ops() {
        let mut s = Scheduler::new();
        s.push(FillerId(1));
        s.push(FillerId(4));
        assert_eq!(s.top(), Some(FillerId(4)));
        assert_eq!(s.position(FillerId(1)), Some(0));
        s.truncate(1);
        assert_eq!(s.len(), 1);
        assert_eq!(s.pop(), Some(FillerId(1)));
        assert!(s.is_empty());
    }
}
