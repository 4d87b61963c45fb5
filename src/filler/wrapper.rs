//! Wrapper：包在每个槽位外面的横切策略装饰器
//!
//! 按槽位策略惰性展开辅助子节点。grow 的顺序：门控 -> 待执行的初始化 -> 推荐 -> 原始填写 ->
//! （填写后）检查 -> 确认 -> result 槽位 -> 意图响应。
//! 「已填写」与「完成」不同：forced_filled 让 Wrapper 视为已填写，但检查和确认仍会执行；closed 无条件完成。

use super::build::AuxKind;
use super::{CommitOutcome, Fill, FillerId, FillerKind, Grow, WrapperRole};
use crate::core::DialogError;
use crate::engine::{dangling, Dialog};
use crate::event::{EventRef, EventScope};
use crate::schema::{AskStrategy, Confirmation, Recommendation, ValueCheck, ValueInit, RESULT_SLOT};

/// 按角色生效的槽位策略
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Policy<'s> {
    /// None 等价于 AlwaysAsk
    pub ask: Option<&'s AskStrategy>,
    pub recommend: Option<&'s Recommendation>,
    pub check: Option<&'s ValueCheck>,
    pub confirm: Option<&'s Confirmation>,
    pub init: Option<&'s ValueInit>,
    pub on_done: Option<&'s str>,
}

impl<'a> Dialog<'a> {
    /// 意图根没有策略；列表元素只继承推荐；帧槽位全部生效，推荐和初始化只作用于实体
    pub(crate) fn policy(&self, id: FillerId) -> Result<Policy<'a>, DialogError> {
        let w = self.wrapper_state(id)?;
        let Some(spec) = self.slot_spec(id)? else {
            return Ok(Policy::default());
        };
        let target_is_entity = matches!(self.node(w.target)?.kind, FillerKind::Entity(_));
        Ok(match w.role {
            WrapperRole::Root => Policy::default(),
            WrapperRole::Element => Policy {
                recommend: spec.recommend.as_ref().filter(|_| target_is_entity),
                ..Policy::default()
            },
            WrapperRole::Slot => Policy {
                ask: Some(&spec.ask),
                recommend: spec.recommend.as_ref().filter(|_| target_is_entity),
                check: spec.check.as_ref(),
                confirm: spec.confirm.as_ref(),
                init: spec.init.as_ref().filter(|_| target_is_entity),
                on_done: spec.on_done.as_deref(),
            },
        })
    }

    /// 目标结构已完成，或被祖先强制视为已填写
    pub(crate) fn is_filled(&self, id: FillerId) -> Result<bool, DialogError> {
        let w = self.wrapper_state(id)?;
        Ok(w.forced_filled || self.is_done(w.target)?)
    }

    /// ExternalEvent 槽位及其下的所有节点只匹配外部投递的事件
    pub(crate) fn scope_for(&self, id: FillerId, scope: EventScope) -> EventScope {
        let arena = &self.session.arena;
        let mut cur = Some(id);
        while let Some(n) = cur {
            if let Some(w) = arena.wrapper(n) {
                let external = w.role == WrapperRole::Slot
                    && self
                        .registry()
                        .slot(&w.slot.frame_type, &w.slot.attribute)
                        .is_some_and(|s| matches!(s.ask, AskStrategy::ExternalEvent));
                if external {
                    return scope.external_only();
                }
            }
            cur = arena.get(n).and_then(|node| node.parent);
        }
        scope
    }

    /// 本 Wrapper 能被某个事件直接进入
    pub(crate) fn has_direct_event(&self, id: FillerId, scope: EventScope) -> Result<bool, DialogError> {
        let scope = self.scope_for(id, scope);
        let target = self.wrapper_state(id)?.target;
        let found = match &self.node(target)?.kind {
            FillerKind::Entity(_) => self.entity_fill(target, scope)?.is_some(),
            FillerKind::List(_) => self.list_pending_event(target, scope)?.is_some(),
            FillerKind::Frame(f) => {
                self.find_frame_event(&f.frame_type, scope).is_some() || self.frame_fill(target, scope)?.is_some()
            }
            FillerKind::Interface(i) => self
                .registry()
                .variants_of(&i.interface_type)
                .iter()
                .any(|v| self.find_variant_event(v, scope).is_some()),
            _ => false,
        };
        Ok(found)
    }

    /// 针对非实体槽位的「都行」赋值
    pub(crate) fn dont_care_event(&self, id: FillerId, scope: EventScope) -> Result<Option<EventRef>, DialogError> {
        let w = self.wrapper_state(id)?;
        if w.role == WrapperRole::Root || matches!(self.node(w.target)?.kind, FillerKind::Entity(_)) {
            return Ok(None);
        }
        let scope = self.scope_for(id, scope);
        for (path, f) in self.session.events.active_frames(scope) {
            if !f.matches_type(&w.slot.frame_type) {
                continue;
            }
            if let Some(i) = f
                .slots
                .iter()
                .position(|s| !s.used && s.attribute == w.slot.attribute && s.accepts_anything())
            {
                return Ok(Some(EventRef::entity(path, i)));
            }
        }
        Ok(None)
    }

    fn condition_holds(&self, id: FillerId, ask: &AskStrategy) -> Result<bool, DialogError> {
        let AskStrategy::ConditionalAsk(cond) = ask else {
            return Ok(true);
        };
        let values = match self.session.arena.owning_frame(id) {
            Some(frame) => self.frame_values(frame)?,
            None => Default::default(),
        };
        Ok(cond.eval(&values, self.registry()))
    }

    /// 未填写时是否允许进入
    pub(crate) fn is_enterable(&self, id: FillerId) -> Result<bool, DialogError> {
        let w = self.wrapper_state(id)?;
        if w.closed || w.skipped {
            return Ok(false);
        }
        let recover_enabled = w.recover_enabled;
        let policy = self.policy(id)?;
        let Some(ask) = policy.ask else {
            return Ok(true);
        };
        let allowed = match ask {
            AskStrategy::NeverAsk => false,
            AskStrategy::ConditionalAsk(_) => self.condition_holds(id, ask)?,
            AskStrategy::RecoverOnly => recover_enabled,
            AskStrategy::AlwaysAsk | AskStrategy::ExternalEvent | AskStrategy::BoolGate { .. } => true,
        };
        Ok(allowed || self.has_direct_event(id, EventScope::Active)?)
    }

    pub(crate) fn is_wrapper_done(&self, id: FillerId) -> Result<bool, DialogError> {
        let w = self.wrapper_state(id)?;
        if w.closed || w.skipped {
            return Ok(true);
        }
        if !self.is_filled(id)? {
            return Ok(!self.is_enterable(id)?);
        }
        let policy = self.policy(id)?;
        if policy.check.is_some() && !w.check.is_some_and(|c| self.check_passed(c)) {
            return Ok(false);
        }
        if let Some(confirm) = policy.confirm {
            let confirmed = if confirm.implicit {
                w.implicit_confirmed
            } else {
                w.confirm.and_then(|d| self.decision_answer(d)) == Some(true)
            };
            if !confirmed {
                return Ok(false);
            }
        }
        if self.pending_result_slot(id)?.is_some() {
            return Ok(false);
        }
        Ok(w.role != WrapperRole::Root || w.responded)
    }

    /// 目标帧的 result 槽位在其它槽位都完成后才推进
    fn pending_result_slot(&self, id: FillerId) -> Result<Option<FillerId>, DialogError> {
        let target = self.wrapper_state(id)?.target;
        let Some(result) = self.session.arena.slot_of(target, RESULT_SLOT) else {
            return Ok(None);
        };
        if self.is_done(result)? {
            Ok(None)
        } else {
            Ok(Some(result))
        }
    }

    pub(crate) fn grow_wrapper(&mut self, id: FillerId) -> Result<Grow, DialogError> {
        let w = self.wrapper_state(id)?.clone();
        if w.closed || w.skipped {
            return Ok(Grow::Blocked);
        }
        let policy = self.policy(id)?;

        if !self.is_filled(id)? {
            if let Some(event) = self.dont_care_event(id, EventScope::Active)? {
                return Ok(Grow::Commit(Fill::Event(event)));
            }
            // 直接兼容的事件跳过门控与推荐
            if self.has_direct_event(id, EventScope::Active)? {
                return Ok(Grow::Push(w.target));
            }
            match policy.ask {
                Some(AskStrategy::ExternalEvent) => return Ok(Grow::Blocked),
                Some(AskStrategy::BoolGate { .. }) => {
                    let gate = self.ensure_aux(id, AuxKind::Gate)?;
                    if self.decision_answer(gate).is_none() {
                        return Ok(Grow::Push(gate));
                    }
                }
                _ => {}
            }
            if policy.init.is_some() && !w.init_applied {
                return Ok(Grow::Update(id));
            }
            if policy.recommend.is_some() {
                let rec = self.ensure_aux(id, AuxKind::Recommend)?;
                if !self.is_done(rec)? {
                    if self.recommend_candidates(id)?.is_empty() {
                        if let Some(r) = self.session.arena.recommend_mut(rec) {
                            r.exhausted = true;
                        }
                    } else {
                        return Ok(Grow::Push(rec));
                    }
                }
            }
            return Ok(Grow::Push(w.target));
        }

        if policy.check.is_some() {
            let check = self.ensure_aux(id, AuxKind::Check)?;
            if !self.check_passed(check) {
                return Ok(Grow::Push(check));
            }
        }
        if let Some(confirm) = policy.confirm {
            if confirm.implicit {
                if !w.implicit_confirmed {
                    return Ok(Grow::ImplicitConfirm(id));
                }
            } else {
                let decision = self.ensure_aux(id, AuxKind::Confirm)?;
                match self.decision_answer(decision) {
                    Some(true) => {}
                    Some(false) => {
                        // 上次否认后值已重新填写，再确认一次
                        self.reset_decision(decision);
                        return Ok(Grow::Push(decision));
                    }
                    None => return Ok(Grow::Push(decision)),
                }
            }
        }
        if let Some(result) = self.pending_result_slot(id)? {
            return Ok(Grow::Push(result));
        }
        if w.role == WrapperRole::Root && !w.responded {
            return Ok(Grow::Respond(id));
        }
        Ok(Grow::Blocked)
    }

    /// 「都行」直接让 Wrapper 视为已填写
    pub(crate) fn commit_wrapper(&mut self, id: FillerId, event: &EventRef) -> Result<CommitOutcome, DialogError> {
        self.session.events.mark_used(event);
        let attribute = self.node(id)?.attribute.clone();
        self.wrapper_state_mut(id)?.forced_filled = true;
        Ok(CommitOutcome::Filled { attribute, value: None })
    }

    /// 执行初始化：常量、全局单例或上下文
    pub(crate) fn apply_init(&mut self, id: FillerId) -> Result<Option<String>, DialogError> {
        let policy = self.policy(id)?;
        let target = self.wrapper_state(id)?.target;
        self.wrapper_state_mut(id)?.init_applied = true;
        let Some(init) = policy.init else {
            return Ok(None);
        };
        let entity_type = self
            .session
            .arena
            .entity(target)
            .ok_or_else(|| dangling(target))?
            .entity_type
            .clone();
        let value = match init {
            ValueInit::Const(v) => Some(v.clone()),
            ValueInit::Global { frame, attribute } => self.session.global_value(frame, attribute),
            ValueInit::Context => self.session.search_context(&entity_type, Some(target)),
        };
        if let Some(v) = &value {
            if let Some(e) = self.session.arena.entity_mut(target) {
                e.value = Some(v.clone());
                e.dont_care = false;
            }
        }
        Ok(value)
    }

    /// 清空目标与全部辅助状态；初始化只执行一次，不随清理重置
    pub(crate) fn clear_wrapper(&mut self, id: FillerId) -> Result<(), DialogError> {
        let w = self.wrapper_state(id)?.clone();
        self.clear(w.target)?;
        for aux in [w.gate, w.recommend, w.check, w.confirm].into_iter().flatten() {
            self.clear(aux)?;
        }
        let w = self.wrapper_state_mut(id)?;
        w.implicit_confirmed = false;
        w.responded = false;
        w.skipped = false;
        w.forced_filled = false;
        w.closed = false;
        w.done_notified = false;
        Ok(())
    }

    /// 被否认后重新打开：清掉值与检查 / 推荐，确认节点保留 false 等值重新填写后再问
    pub(crate) fn reopen_wrapper(&mut self, id: FillerId) -> Result<(), DialogError> {
        let w = self.wrapper_state(id)?.clone();
        self.clear(w.target)?;
        for aux in [w.recommend, w.check].into_iter().flatten() {
            self.clear(aux)?;
        }
        let w = self.wrapper_state_mut(id)?;
        w.forced_filled = false;
        w.implicit_confirmed = false;
        w.recover_enabled = true;
        Ok(())
    }

    /// 沿祖先链找到意图 Wrapper（目标为意图帧）
    pub(crate) fn intent_type_of(&self, wrapper: FillerId) -> Result<Option<String>, DialogError> {
        let target = self.wrapper_state(wrapper)?.target;
        let Some(f) = self.session.arena.frame(target) else {
            return Ok(None);
        };
        Ok(self
            .registry()
            .frame(&f.frame_type)
            .filter(|s| s.is_intent())
            .map(|s| s.qualified()))
    }

    pub(crate) fn wrapper_entity_value(&self, id: FillerId) -> Result<Option<String>, DialogError> {
        let target = self.wrapper_state(id)?.target;
        Ok(self.session.arena.entity(target).and_then(|e| e.value.clone()))
    }
}
