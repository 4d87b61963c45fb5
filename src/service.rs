//! 对话服务：按用户处理一句输入
//!
//! 加载或创建会话 -> 按当前期待转换输入 -> 执行回合 -> 失败时交给 RecoveryEngine -> 保存。
//! 同一用户的回合由调用方串行提交。

use std::sync::Arc;

use serde::Serialize;

use crate::action::{DialogAct, LogEntry};
use crate::core::{DialogError, RecoveryEngine, RecoveryPlan};
use crate::engine::{DialogContext, SchedulerState};
use crate::nlu::Converter;
use crate::session::SessionStore;

/// 一个回合的对外输出
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutput {
    pub acts: Vec<DialogAct>,
    pub logs: Vec<LogEntry>,
    /// 回合结束时当前 Scheduler 的状态
    pub state: SchedulerState,
}

pub struct DialogService {
    ctx: Arc<DialogContext>,
    store: Arc<dyn SessionStore>,
    converter: Arc<dyn Converter>,
    recovery: RecoveryEngine,
}

impl DialogService {
    pub fn new(ctx: Arc<DialogContext>, store: Arc<dyn SessionStore>, converter: Arc<dyn Converter>) -> Self {
        let recovery = RecoveryEngine::new(ctx.settings.recover_prompt.clone());
        Self {
            ctx,
            store,
            converter,
            recovery,
        }
    }

    pub fn context(&self) -> &DialogContext {
        &self.ctx
    }

    pub async fn handle(&self, user_key: &str, text: &str) -> Result<TurnOutput, DialogError> {
        let mut session = match self.store.load(user_key).await? {
            Some(s) => s,
            None => self.store.create(user_key).await?,
        };

        let expectations = session.expectations();
        let events = self.converter.convert(user_key, text, &expectations).await;
        if events.is_empty() {
            tracing::debug!("No events for {}, answering with fallback", user_key);
            return Ok(TurnOutput {
                acts: vec![DialogAct::Reject {
                    text: self.ctx.settings.fallback_prompt.clone(),
                }],
                logs: Vec::new(),
                state: session.current().state,
            });
        }

        let outcome = self.ctx.dialog(&mut session).run_turn(events);
        let output = match outcome {
            Ok(results) => {
                let mut acts = Vec::new();
                let mut logs = Vec::new();
                for r in results {
                    acts.extend(r.messages);
                    logs.extend(r.logs);
                }
                TurnOutput {
                    acts,
                    logs,
                    state: session.current().state,
                }
            }
            Err(e) => {
                let plan = self.recovery.handle(&e, session.consecutive_failures);
                tracing::warn!("Turn for {} failed: {} -> {:?}", user_key, e, plan);
                let log = LogEntry::text("TurnFailed", e.to_string()).untestable();
                match plan {
                    RecoveryPlan::Continue | RecoveryPlan::Recover(_) => TurnOutput {
                        acts: Vec::new(),
                        logs: vec![log],
                        state: session.current().state,
                    },
                    RecoveryPlan::Reset => {
                        session.cleanup();
                        TurnOutput {
                            acts: vec![DialogAct::Reject {
                                text: self.ctx.settings.recover_prompt.clone(),
                            }],
                            logs: vec![log],
                            state: session.current().state,
                        }
                    }
                }
            }
        };

        self.store.save(&session).await?;
        Ok(output)
    }

    /// 丢弃某个用户的会话
    pub async fn reset(&self, user_key: &str) -> Result<(), DialogError> {
        self.store.remove(user_key).await
    }
}
