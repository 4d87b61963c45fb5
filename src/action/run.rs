//! Action 执行

use super::{render, Action, ActionResult, DialogAct, LogEntry};
use crate::core::DialogError;
use crate::engine::{dangling, Dialog, RefocusMode, RefocusPlan, Scheduler, SchedulerState};
use crate::event::EventRef;
use crate::filler::{CommitOutcome, Fill, FillerId, WrapperRole};
use crate::schema::SlotValues;

impl Action {
    pub fn run(&self, dialog: &mut Dialog<'_>) -> Result<ActionResult, DialogError> {
        match self {
            Action::StartIntent { intent, event, side } => dialog.start_intent(intent, event, *side),
            Action::Refocus(plan) => dialog.apply_refocus(plan),
            Action::AbortIntent { target, event } => dialog.abort_intent(target.as_deref(), event),
            Action::Commit { filler, fill } => dialog.run_commit(*filler, fill),
            Action::UpdateSlot { wrapper } => dialog.update_slot(*wrapper),
            Action::Cleanup { targets } => dialog.cleanup(targets),
            Action::Ask { filler } => dialog.ask(*filler),
            Action::Respond { wrapper } => dialog.respond(*wrapper),
            Action::ImplicitConfirm { wrapper } => dialog.implicit_confirm(*wrapper),
            Action::NotifyDone { wrapper } => dialog.notify_done(*wrapper),
            Action::CheckValue { check } => dialog.check_value(*check),
            Action::Reject { events } => dialog.reject(events),
            Action::ListOverflow { list, event } => dialog.list_overflow(*list, event),
            Action::BuildFailed { wrapper, reason } => dialog.build_failed(*wrapper, reason),
            Action::Recover => dialog.recover(),
            Action::Seq(actions) => {
                let mut result = ActionResult::ok();
                for a in actions {
                    result = result.merge(a.run(dialog)?);
                }
                Ok(result)
            }
        }
    }
}

impl<'a> Dialog<'a> {
    fn start_intent(&mut self, intent: &str, event: &EventRef, side: bool) -> Result<ActionResult, DialogError> {
        self.session.events.mark_used(event);
        if self.session.active_intents().iter().any(|t| t == intent) {
            return self.update_active_intent(intent, event);
        }
        let root = match self.build_root(intent) {
            Ok(root) => root,
            Err(e @ (DialogError::Construction(_) | DialogError::UnknownFrame(_))) => {
                tracing::warn!("Cannot start intent {}: {}", intent, e);
                return Ok(ActionResult::failed()
                    .with_log(LogEntry::array("StartIntentAction", [intent.to_string(), e.to_string()]).untestable()));
            }
            Err(e) => return Err(e),
        };
        if side {
            let mut scheduler = Scheduler::new();
            scheduler.push(root);
            scheduler.state = SchedulerState::Reschedule;
            self.session.push_side(scheduler);
        } else {
            self.session.current_mut().push(root);
            self.set_state(SchedulerState::Reschedule);
        }
        tracing::info!("Intent {} started{}", intent, if side { " as side intent" } else { "" });
        Ok(ActionResult::ok().with_log(LogEntry::text("StartIntentAction", intent)))
    }

    /// 已在进行的意图再次被提及：当前 Scheduler 中的槽位由正常生长消费；
    /// 暂停中的父意图则重聚焦到对应槽位，等旁支结束后填写；都消费不了时拒绝
    fn update_active_intent(&mut self, intent: &str, event: &EventRef) -> Result<ActionResult, DialogError> {
        let log = LogEntry::array("StartIntentAction", [intent, "active"]);
        let has_slots = self.session.events.frame(event).is_some_and(|f| f.has_unused_slot());
        if !has_slots {
            tracing::debug!("Intent {} already active", intent);
            return Ok(ActionResult::ok().with_log(log));
        }
        let current = self.session.schedulers().count() - 1;
        let paused = self
            .find_intent_on_stacks(Some(intent))?
            .map(|(si, _)| si)
            .filter(|si| *si != current);
        match paused {
            Some(si) => {
                if let Some(plan) = self.find_refocus_in(Some(si))? {
                    tracing::info!("Intent {} is paused, updating it in place", intent);
                    return Ok(ActionResult::ok().with_log(log).merge(self.apply_refocus(&plan)?));
                }
            }
            None if self.state() == SchedulerState::Init => {
                self.set_state(SchedulerState::Reschedule);
                return Ok(ActionResult::ok().with_log(log));
            }
            // 提问之后：焦点与重聚焦都没能用上这些槽位
            None => {}
        }
        tracing::warn!("Update for active intent {} matches no slot", intent);
        if let Some(f) = self.session.events.frame_mut(event) {
            f.mark_used();
        }
        self.session.rejected_turn = Some(self.session.turn_id);
        if self.state() == SchedulerState::PostAsk {
            self.set_state(SchedulerState::Ask);
        }
        let text = self.settings().fallback_prompt.clone();
        Ok(ActionResult::failed()
            .with_log(log)
            .with_log(LogEntry::text("RejectAction", text.clone()))
            .with_message(DialogAct::Reject { text }))
    }

    fn refocus_scheduler(&mut self, which: Option<usize>) -> Result<&mut Scheduler, DialogError> {
        match which {
            Some(si) => self
                .session
                .schedulers_mut()
                .nth(si)
                .ok_or_else(|| DialogError::InvariantViolation(format!("no scheduler {si}"))),
            None => Ok(self.session.current_mut()),
        }
    }

    pub(crate) fn apply_refocus(&mut self, plan: &RefocusPlan) -> Result<ActionResult, DialogError> {
        let attribute = self.node(plan.target)?.attribute.clone();
        let log = LogEntry::array("RefocusAction", [format!("{:?}", plan.mode), attribute.clone()]);
        if plan.mode == RefocusMode::Revisit {
            if let Some(event) = &plan.event {
                self.session.events.mark_used(event);
            }
            return Ok(ActionResult::ok().with_log(log));
        }

        let scheduler = self.refocus_scheduler(plan.scheduler)?;
        scheduler.truncate(plan.keep);
        for id in &plan.path {
            scheduler.push(*id);
        }
        match plan.mode {
            RefocusMode::Replace => {
                self.clear(plan.target)?;
                self.recheck(plan.target);
            }
            RefocusMode::Append => {
                let list = self.wrapper_state(plan.target)?.target;
                self.reopen_list(list)?;
            }
            RefocusMode::Reenter | RefocusMode::Revisit => {}
        }
        self.wrapper_state_mut(plan.target)?.recover_enabled = true;
        if let Some(event) = &plan.event {
            if let Some(f) = self.session.events.frame_mut(event) {
                f.refocused = true;
            }
        }
        self.refocus_scheduler(plan.scheduler)?.state = SchedulerState::Reschedule;
        tracing::info!("Refocus to {} ({:?})", attribute, plan.mode);
        Ok(ActionResult::ok().with_log(log))
    }

    fn abort_intent(&mut self, target: Option<&str>, event: &EventRef) -> Result<ActionResult, DialogError> {
        if let Some(f) = self.session.events.frame_mut(event) {
            f.mark_used();
        }
        let Some((si, pos)) = self.find_intent_on_stacks(target)? else {
            let name = target.unwrap_or("intent");
            return Ok(ActionResult::failed()
                .with_message(DialogAct::Reject {
                    text: format!("There is no {name} to abort."),
                })
                .with_log(LogEntry::text("AbortIntentAction", name)));
        };
        let wrapper = match self.session.schedulers().nth(si).and_then(|s| s.stack.get(pos)) {
            Some(id) => *id,
            None => return Err(DialogError::InvariantViolation(format!("no stack entry {si}:{pos}"))),
        };
        let intent = self.intent_type_of(wrapper)?.unwrap_or_default();
        let role = self.wrapper_state(wrapper)?.role;
        if role == WrapperRole::Root {
            if let Some(scheduler) = self.session.schedulers_mut().nth(si) {
                scheduler.truncate(pos);
            }
            self.finish_intent(wrapper, true)?;
            // 中止的旁支若已清空，立即回到父 Scheduler
            if si > 0 && self.session.side[si - 1].is_empty() {
                self.session.side.remove(si - 1);
            }
        } else {
            self.wrapper_state_mut(wrapper)?.closed = true;
        }
        let next = if self.session.current().is_empty() {
            SchedulerState::Init
        } else {
            SchedulerState::Reschedule
        };
        self.set_state(next);
        let name = crate::event::split_qualified(&intent).1.to_string();
        Ok(ActionResult::ok()
            .with_message(DialogAct::Inform {
                text: format!("Ok, {name} is aborted."),
            })
            .with_log(LogEntry::text("AbortIntentAction", intent)))
    }

    fn run_commit(&mut self, filler: FillerId, fill: &Fill) -> Result<ActionResult, DialogError> {
        let outcome = self.commit(filler, fill)?;
        let result = match &outcome {
            CommitOutcome::Filled { attribute, value } => {
                self.set_state(SchedulerState::Reschedule);
                ActionResult::ok().with_log(LogEntry::array(
                    "FillAction",
                    [attribute.clone(), value.clone().unwrap_or_else(|| "*".to_string())],
                ))
            }
            CommitOutcome::Rejected {
                attribute,
                value,
                reason,
            } => {
                tracing::warn!("Rejected {} = {:?}: {}", attribute, value, reason);
                self.set_state(SchedulerState::Ask);
                ActionResult::failed()
                    .with_message(DialogAct::Reject { text: reason.clone() })
                    .with_log(LogEntry::array("FillAction", [attribute.clone(), value.clone(), reason.clone()]))
            }
            CommitOutcome::Answered { purpose, answer } => {
                self.set_state(SchedulerState::Reschedule);
                ActionResult::ok().with_log(LogEntry::array(
                    "FillAction",
                    [format!("{purpose:?}"), answer.to_string()],
                ))
            }
            CommitOutcome::Paged => {
                self.set_state(SchedulerState::Ask);
                ActionResult::ok().with_log(LogEntry::text("FillAction", "next page"))
            }
            CommitOutcome::Triggered => {
                self.set_state(SchedulerState::Reschedule);
                ActionResult::ok().with_log(LogEntry::text("FillAction", "triggered"))
            }
        };
        Ok(result)
    }

    fn update_slot(&mut self, wrapper: FillerId) -> Result<ActionResult, DialogError> {
        let attribute = self.node(wrapper)?.attribute.clone();
        let value = self.apply_init(wrapper)?;
        self.set_state(SchedulerState::Reschedule);
        Ok(ActionResult::ok().with_log(LogEntry::array(
            "UpdateSlotAction",
            [attribute, value.unwrap_or_default()],
        )))
    }

    /// 清空槽位并允许恢复式进入
    fn cleanup(&mut self, targets: &[FillerId]) -> Result<ActionResult, DialogError> {
        let mut names = Vec::with_capacity(targets.len());
        for target in targets {
            self.clear(*target)?;
            self.wrapper_state_mut(*target)?.recover_enabled = true;
            names.push(self.node(*target)?.attribute.clone());
        }
        self.set_state(SchedulerState::Reschedule);
        Ok(ActionResult::ok().with_log(LogEntry::array("CleanupAction", names)))
    }

    fn ask(&mut self, filler: FillerId) -> Result<ActionResult, DialogError> {
        let act = self.ask_act(filler)?;
        self.set_state(SchedulerState::PostAsk);
        let log = LogEntry::text("SlotAskAction", act.text());
        Ok(ActionResult::ok().with_message(act).with_log(log))
    }

    fn respond(&mut self, wrapper: FillerId) -> Result<ActionResult, DialogError> {
        let target = self.wrapper_state(wrapper)?.target;
        let intent = self.wrapper_state(wrapper)?.slot.frame_type.clone();
        let values = self.frame_values(target)?;
        self.wrapper_state_mut(wrapper)?.responded = true;
        self.set_state(SchedulerState::Reschedule);
        let mut result = ActionResult::ok().with_log(LogEntry::text("RespondAction", intent.clone()));
        if let Some(template) = self.registry().frame(&intent).and_then(|s| s.response.as_ref()) {
            result = result.with_message(DialogAct::Inform {
                text: render(template, &values, None),
            });
        }
        Ok(result)
    }

    fn implicit_confirm(&mut self, wrapper: FillerId) -> Result<ActionResult, DialogError> {
        let values = self.owner_values(wrapper)?;
        let value = self.wrapper_entity_value(wrapper)?;
        let prompt = self
            .policy(wrapper)?
            .confirm
            .map(|c| c.prompt.clone())
            .unwrap_or_else(|| "Ok, {value}.".to_string());
        self.wrapper_state_mut(wrapper)?.implicit_confirmed = true;
        self.set_state(SchedulerState::Reschedule);
        let text = render(&prompt, &values, value.as_deref());
        Ok(ActionResult::ok()
            .with_log(LogEntry::text("ConfirmAction", text.clone()))
            .with_message(DialogAct::Inform { text }))
    }

    fn notify_done(&mut self, wrapper: FillerId) -> Result<ActionResult, DialogError> {
        let values = self.owner_values(wrapper)?;
        let value = self.wrapper_entity_value(wrapper)?;
        let template = self.policy(wrapper)?.on_done.unwrap_or_default();
        self.wrapper_state_mut(wrapper)?.done_notified = true;
        let text = render(template, &values, value.as_deref());
        Ok(ActionResult::ok()
            .with_log(LogEntry::text("SlotDoneAction", text.clone()))
            .with_message(DialogAct::Inform { text }))
    }

    /// 检查通过则放行；失败时提示、清理相关槽位并重新进入第一个
    fn check_value(&mut self, check: FillerId) -> Result<ActionResult, DialogError> {
        let wrapper = self.node(check)?.parent.ok_or_else(|| dangling(check))?;
        let Some(rule) = self.policy(wrapper)?.check else {
            if let Some(c) = self.session.arena.check_mut(check) {
                c.passed = true;
            }
            self.set_state(SchedulerState::Reschedule);
            return Ok(ActionResult::ok());
        };
        let attribute = self.node(wrapper)?.attribute.clone();
        let values: SlotValues = self.owner_values(wrapper)?;
        if rule.rule.eval(&values, self.registry()) {
            if let Some(c) = self.session.arena.check_mut(check) {
                c.passed = true;
            }
            self.set_state(SchedulerState::Reschedule);
            return Ok(ActionResult::ok().with_log(LogEntry::array("ValueCheckAction", [attribute, "pass".to_string()])));
        }

        tracing::warn!("Value check failed on {}: {}", attribute, rule.message);
        let mut targets = Vec::new();
        if let Some(frame) = self.session.arena.owning_frame(wrapper) {
            for name in &rule.cleanup {
                if let Some(w) = self.session.arena.slot_of(frame, name) {
                    targets.push(w);
                }
            }
        }
        if targets.is_empty() {
            targets.push(wrapper);
        }
        let reenter = self.reenter_plan(targets[0]);
        let head = ActionResult::failed()
            .with_message(DialogAct::Reject {
                text: render(&rule.message, &values, values.get(&attribute).map(String::as_str)),
            })
            .with_log(LogEntry::array("ValueCheckAction", [attribute, "fail".to_string()]));
        let follow = Action::Seq(vec![Action::Cleanup { targets }, Action::Refocus(reenter)]).run(self)?;
        Ok(head.merge(follow))
    }

    /// 输入拒绝：消费这些事件，并重新发出待回答的提问
    fn reject(&mut self, events: &[usize]) -> Result<ActionResult, DialogError> {
        for i in events {
            if let Some(f) = self.session.events.frame_mut(&EventRef::frame(vec![*i])) {
                f.mark_used();
            }
        }
        self.session.rejected_turn = Some(self.session.turn_id);
        if self.state() == SchedulerState::PostAsk {
            self.set_state(SchedulerState::Ask);
        }
        let text = self.settings().fallback_prompt.clone();
        tracing::warn!("Rejected {} unconsumed events", events.len());
        Ok(ActionResult::failed()
            .with_log(LogEntry::text("RejectAction", text.clone()))
            .with_message(DialogAct::Reject { text }))
    }

    /// 列表已满：丢弃多出的元素并提示
    fn list_overflow(&mut self, list: FillerId, event: &EventRef) -> Result<ActionResult, DialogError> {
        self.session.events.mark_used(event);
        let attribute = self.node(list)?.attribute.clone();
        let max = self
            .session
            .arena
            .list(list)
            .and_then(|l| l.max)
            .unwrap_or_default();
        let mut values = SlotValues::new();
        values.insert("max".to_string(), max.to_string());
        values.insert("attribute".to_string(), attribute.clone());
        let text = render(&self.settings().list_overflow_prompt, &values, None);
        tracing::warn!("List {} is full, dropped one value", attribute);
        Ok(ActionResult::ok()
            .with_log(LogEntry::array("ListOverflowAction", [attribute, max.to_string()]))
            .with_message(DialogAct::Inform { text }))
    }

    /// 关闭构建失败的 Wrapper 并把栈退回到它，让它按完成出栈
    fn build_failed(&mut self, wrapper: FillerId, reason: &str) -> Result<ActionResult, DialogError> {
        let attribute = self.node(wrapper)?.attribute.clone();
        self.wrapper_state_mut(wrapper)?.closed = true;
        let scheduler = self.session.current_mut();
        if let Some(pos) = scheduler.position(wrapper) {
            scheduler.truncate(pos + 1);
        }
        self.set_state(SchedulerState::Reschedule);
        tracing::warn!("Closed slot {} after build failure: {}", attribute, reason);
        Ok(ActionResult::failed()
            .with_log(LogEntry::array("BuildFailedAction", [attribute, reason.to_string()]).untestable()))
    }

    fn recover(&mut self) -> Result<ActionResult, DialogError> {
        let text = self.settings().recover_prompt.clone();
        self.set_state(SchedulerState::Reschedule);
        Ok(ActionResult::ok()
            .with_log(LogEntry::text("RecoverAction", text.clone()))
            .with_message(DialogAct::Inform { text }))
    }
}
