//! Kernel step：按当前 Scheduler 状态做一次决策，至多返回一个 Action
//!
//! 不产出 Action 的状态迁移（RESCHEDULE 中的压栈 / 弹栈、进入 ASK 等）在本函数内部继续推进，
//! 直到得到一个 Action 或当前回合无事可做。

use super::{dangling, Dialog, SchedulerState};
use crate::action::Action;
use crate::core::DialogError;
use crate::event::{EventRef, EventScope};
use crate::filler::{FillerId, FillerKind, Grow, WrapperRole};
use crate::schema::system;
use crate::session::FinishedIntent;

impl<'a> Dialog<'a> {
    pub fn kernel_step(&mut self) -> Result<Option<Action>, DialogError> {
        // 单次决策内的状态迁移上限，正常情况下远小于树的节点数
        let guard = self.settings().max_turn_steps.max(16) * 8;
        let mut rescheduled_from_init = false;

        for _ in 0..guard {
            match self.state() {
                SchedulerState::Init => {
                    if let Some(top) = self.top() {
                        if self.pending_init(top)? {
                            return Ok(Some(Action::UpdateSlot { wrapper: top }));
                        }
                        if let Some(fill) = self.find_fill(top, EventScope::Active)? {
                            return Ok(Some(Action::Commit { filler: top, fill }));
                        }
                    }
                    if let Some(plan) = self.find_refocus()? {
                        return Ok(Some(Action::Refocus(plan)));
                    }
                    if let Some(action) = self.find_new_intent() {
                        return Ok(Some(action));
                    }
                    if !self.session.current().is_empty() && !rescheduled_from_init {
                        rescheduled_from_init = true;
                        self.set_state(SchedulerState::Reschedule);
                        continue;
                    }
                    return Ok(self.find_reject());
                }
                SchedulerState::Ask => {
                    let Some(top) = self.top() else {
                        self.set_state(SchedulerState::Init);
                        continue;
                    };
                    if let Some(fill) = self.find_fill(top, EventScope::Active)? {
                        return Ok(Some(Action::Commit { filler: top, fill }));
                    }
                    return Ok(Some(Action::Ask { filler: top }));
                }
                SchedulerState::PostAsk => {
                    if let Some(top) = self.top() {
                        if let Some(fill) = self.find_fill(top, EventScope::Active)? {
                            return Ok(Some(Action::Commit { filler: top, fill }));
                        }
                    }
                    if let Some(plan) = self.find_refocus()? {
                        return Ok(Some(Action::Refocus(plan)));
                    }
                    if let Some(action) = self.find_new_intent() {
                        return Ok(Some(action));
                    }
                    return Ok(self.find_reject());
                }
                SchedulerState::Reschedule => {
                    if let Some(action) = self.reschedule_step()? {
                        return Ok(Some(action));
                    }
                }
                SchedulerState::Respond => match self.top() {
                    Some(top) if self.is_root(top) => return Ok(Some(Action::Respond { wrapper: top })),
                    _ => self.set_state(SchedulerState::Reschedule),
                },
                SchedulerState::Recover => return Ok(Some(Action::Recover)),
            }
        }
        Err(DialogError::BudgetExhausted(guard))
    }

    /// RESCHEDULE 的一步：弹出完成的栈顶，或让栈顶生长；只在需要 Action 时返回
    fn reschedule_step(&mut self) -> Result<Option<Action>, DialogError> {
        let Some(top) = self.top() else {
            self.set_state(SchedulerState::Init);
            return Ok(None);
        };
        if self.is_done(top)? {
            if let Some(w) = self.session.arena.wrapper(top) {
                if !w.done_notified && self.policy(top)?.on_done.is_some() {
                    return Ok(Some(Action::NotifyDone { wrapper: top }));
                }
            }
            self.pop_done(top)?;
            return Ok(None);
        }
        let grow = match self.grow(top) {
            Ok(grow) => grow,
            // 列表元素 / 接口实现构建失败不影响会话其余部分
            Err(e @ (DialogError::Construction(_) | DialogError::UnknownFrame(_))) => {
                let wrapper = match self.session.arena.wrapper(top) {
                    Some(_) => top,
                    None => self.session.arena.parent_wrapper(top).ok_or_else(|| dangling(top))?,
                };
                return Ok(Some(Action::BuildFailed {
                    wrapper,
                    reason: e.to_string(),
                }));
            }
            Err(e) => return Err(e),
        };
        tracing::debug!("Grow {} -> {:?}", top, grow);
        Ok(match grow {
            Grow::Push(child) => {
                self.session.current_mut().push(child);
                None
            }
            Grow::Ask => {
                self.set_state(SchedulerState::Ask);
                None
            }
            Grow::Commit(fill) => Some(Action::Commit { filler: top, fill }),
            Grow::Update(wrapper) => Some(Action::UpdateSlot { wrapper }),
            Grow::RunCheck(check) => Some(Action::CheckValue { check }),
            Grow::ImplicitConfirm(wrapper) => Some(Action::ImplicitConfirm { wrapper }),
            Grow::Respond(_) => {
                self.set_state(SchedulerState::Respond);
                None
            }
            Grow::Overflow { list, event } => Some(Action::ListOverflow { list, event }),
            Grow::Blocked => {
                self.set_state(SchedulerState::Init);
                None
            }
        })
    }

    fn is_root(&self, id: FillerId) -> bool {
        self.session
            .arena
            .wrapper(id)
            .is_some_and(|w| w.role == WrapperRole::Root)
    }

    /// 弹出完成的栈顶；意图根出栈即记录历史并释放子树
    fn pop_done(&mut self, top: FillerId) -> Result<(), DialogError> {
        self.session.current_mut().pop();
        if self.is_root(top) {
            self.finish_intent(top, false)?;
        }
        if self.session.current().is_empty() {
            self.set_state(SchedulerState::Init);
        }
        Ok(())
    }

    /// 记录已结束的意图；单例意图的值另存为全局
    pub(crate) fn finish_intent(&mut self, root: FillerId, aborted: bool) -> Result<(), DialogError> {
        let w = self.wrapper_state(root)?;
        let intent_type = w.slot.frame_type.clone();
        let values = self.typed_values(w.target);
        if !aborted && self.registry().frame(&intent_type).is_some_and(|s| s.singleton) {
            self.session.globals.insert(intent_type.clone(), values.clone());
        }
        self.session.finished.push(FinishedIntent {
            intent_type: intent_type.clone(),
            values,
            turn_id: self.session.turn_id,
            aborted,
        });
        self.session.arena.remove_tree(root);
        self.session.prune_dead();
        if aborted {
            tracing::info!("Intent {} aborted", intent_type);
        } else {
            tracing::info!("Intent {} finished", intent_type);
        }
        Ok(())
    }

    fn pending_init(&self, top: FillerId) -> Result<bool, DialogError> {
        let Some(w) = self.session.arena.wrapper(top) else {
            return Ok(false);
        };
        Ok(!w.init_applied && self.policy(top)?.init.is_some() && !self.is_filled(top)?)
    }

    /// 未消费的顶层事件中第一个能启动意图（或中止意图）的；由焦点推断出的事件不启动意图
    fn find_new_intent(&self) -> Option<Action> {
        let side = !self.session.current().is_empty();
        for (i, f) in self.session.events.all().iter().enumerate() {
            if f.type_used || f.inferred_from || !f.is_active() {
                continue;
            }
            let event = EventRef::frame(vec![i]);
            if f.matches_type(system::ABORT_INTENT) {
                let target = f
                    .slots
                    .iter()
                    .find(|s| s.attribute == system::ABORT_TARGET && !s.value.is_empty())
                    .map(|s| s.value.clone());
                return Some(Action::AbortIntent { target, event });
            }
            match self.registry().find_by_event(f) {
                Some(spec) if spec.is_intent() => {
                    return Some(Action::StartIntent {
                        intent: spec.qualified(),
                        event,
                        side,
                    })
                }
                Some(_) => continue,
                // 未注册的类型交给 StartIntent 报告构建失败
                None => {
                    return Some(Action::StartIntent {
                        intent: f.qualified_type(),
                        event,
                        side,
                    })
                }
            }
        }
        None
    }

    /// 本回合完全没被消费的事件，每回合至多拒绝一次
    fn find_reject(&self) -> Option<Action> {
        let turn = self.session.turn_id;
        if self.session.rejected_turn == Some(turn) {
            return None;
        }
        let events: Vec<usize> = self
            .session
            .events
            .turn_frames(turn)
            .filter(|(_, f)| f.untouched() && !f.refocused)
            .map(|(i, _)| i)
            .collect();
        if events.is_empty() {
            None
        } else {
            Some(Action::Reject { events })
        }
    }

    /// 栈上最内层的意图 Wrapper 位置：(Scheduler 下标, 栈下标)，Scheduler 下标 0 为主线
    pub(crate) fn find_intent_on_stacks(&self, target: Option<&str>) -> Result<Option<(usize, usize)>, DialogError> {
        let schedulers: Vec<Vec<FillerId>> = self.session.schedulers().map(|s| s.stack.clone()).collect();
        for (si, stack) in schedulers.iter().enumerate().rev() {
            for (pos, id) in stack.iter().enumerate().rev() {
                if !matches!(self.node(*id)?.kind, FillerKind::Wrapper(_)) {
                    continue;
                }
                let Some(intent) = self.intent_type_of(*id)? else {
                    continue;
                };
                let hit = match target {
                    None => true,
                    Some(t) => {
                        intent == t || intent.rsplit('.').next().is_some_and(|name| name.eq_ignore_ascii_case(t))
                    }
                };
                if hit {
                    return Ok(Some((si, pos)));
                }
            }
        }
        Ok(None)
    }
}
