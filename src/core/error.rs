//! 对话引擎错误类型
//!
//! 与 RecoveryEngine 配合：可恢复错误留在回合内处理，致命错误把 Scheduler 置为 RECOVER 并抛给调用方。

use thiserror::Error;

use crate::engine::SchedulerState;

/// 回合执行过程中可能出现的错误（构建失败、不变量破坏、预算耗尽、存储等）
#[derive(Error, Debug)]
pub enum DialogError {
    /// 意图或帧无法构建（schema 缺失、嵌套过深）
    #[error("Construction failed: {0}")]
    Construction(String),

    #[error("Unknown frame type: {0}")]
    UnknownFrame(String),

    /// 填充树或 Scheduler 的内部不变量被破坏（悬空句柄、非法栈结构）
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// 回合结束时 Scheduler 停在 INIT / POST_ASK / RECOVER 之外的状态
    #[error("Turn ended in illegal state: {0:?}")]
    IllegalEndState(SchedulerState),

    #[error("No progress after {0} steps")]
    BudgetExhausted(usize),

    #[error("Session store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DialogError {
    /// 致命错误：当前回合作废，需要调用方恢复或重置会话
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DialogError::InvariantViolation(_)
                | DialogError::IllegalEndState(_)
                | DialogError::BudgetExhausted(_)
        )
    }
}

/// 恢复引擎根据错误给出的处理方案
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryPlan {
    /// 非致命，无需处理
    Continue,
    /// 保留会话，下一回合从 RECOVER 开始并提示用户
    Recover(String),
    /// 会话无法自愈，调用方应执行 Session::cleanup()
    Reset,
}
