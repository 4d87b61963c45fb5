//! 回合循环：追加事件，反复执行 kernel step 直到静止
//!
//! 每次迭代前先丢弃已清空的旁支 Scheduler；迭代次数有上限以保证终止。任何错误都把当前 Scheduler
//! 置为 RECOVER 并返回给调用方。回合只能停在 INIT / POST_ASK / RECOVER。

use super::{Dialog, SchedulerState};
use crate::action::ActionResult;
use crate::core::DialogError;
use crate::event::FrameEvent;

impl<'a> Dialog<'a> {
    pub fn run_turn(&mut self, events: Vec<FrameEvent>) -> Result<Vec<ActionResult>, DialogError> {
        self.session.turn_id += 1;
        let turn = self.session.turn_id;
        tracing::debug!("Turn {} with {} events", turn, events.len());
        self.session.events.append(events, turn);
        self.session.touch();

        let budget = self.settings().max_turn_steps;
        let mut results = Vec::new();
        for _ in 0..budget {
            self.resume_parent();
            let action = match self.kernel_step() {
                Ok(action) => action,
                Err(e) => return Err(self.fail(e)),
            };
            let Some(action) = action else {
                if self.resume_parent() {
                    continue;
                }
                let state = self.state();
                if !state.is_turn_end() {
                    return Err(self.fail(DialogError::IllegalEndState(state)));
                }
                self.session.consecutive_failures = 0;
                return Ok(results);
            };
            tracing::debug!("Run {} ({:?}) in {:?}", action.name(), action.role(), self.state());
            match action.run(self) {
                Ok(result) => results.push(result),
                Err(e) => return Err(self.fail(e)),
            }
        }
        Err(self.fail(DialogError::BudgetExhausted(budget)))
    }

    /// 旁支结束后让等待中的父 Scheduler 重新发出提问
    fn resume_parent(&mut self) -> bool {
        if !self.session.drain_side_schedulers() {
            return false;
        }
        if self.state() == SchedulerState::PostAsk {
            self.set_state(SchedulerState::Reschedule);
        }
        true
    }

    fn fail(&mut self, err: DialogError) -> DialogError {
        self.session.current_mut().state = SchedulerState::Recover;
        self.session.consecutive_failures += 1;
        tracing::warn!(
            "Turn {} failed ({} in a row): {}",
            self.session.turn_id,
            self.session.consecutive_failures,
            err
        );
        err
    }
}
