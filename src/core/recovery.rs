//! 错误恢复引擎
//!
//! 根据 DialogError 与会话连续失败次数返回 RecoveryPlan，供 DialogService 决定是保留会话、提示用户还是重置。

use crate::core::{DialogError, RecoveryPlan};

/// 同一会话连续致命失败达到此次数后直接重置
const MAX_CONSECUTIVE_FAILURES: u32 = 2;

/// 语义化错误恢复：将错误映射为可执行方案
#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    recover_prompt: String,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new("Sorry, something went wrong. Let us pick up where we were.")
    }
}

impl RecoveryEngine {
    pub fn new(recover_prompt: impl Into<String>) -> Self {
        Self {
            recover_prompt: recover_prompt.into(),
        }
    }

    /// consecutive_failures 为包含本次在内的连续致命失败次数
    pub fn handle(&self, err: &DialogError, consecutive_failures: u32) -> RecoveryPlan {
        match err {
            DialogError::Store(_) | DialogError::Serialization(_) => RecoveryPlan::Reset,
            _ if consecutive_failures >= MAX_CONSECUTIVE_FAILURES => RecoveryPlan::Reset,
            DialogError::Construction(_) | DialogError::UnknownFrame(_) => RecoveryPlan::Continue,
            _ => RecoveryPlan::Recover(self.recover_prompt.clone()),
        }
    }
}
