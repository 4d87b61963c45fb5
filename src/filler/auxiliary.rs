//! 辅助子节点：是 / 否决策（门控、确认、has-more）、取值检查、分页推荐

use super::{DecisionPurpose, Fill, FillerId, FillerKind, Grow};
use crate::core::DialogError;
use crate::engine::{dangling, Dialog};
use crate::event::{EventRef, EventScope};
use crate::schema::system;

/// 一次提交的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// value 为 None 表示「都行」
    Filled { attribute: String, value: Option<String> },
    /// 候选值未通过校验，事件已消费，需要重新询问
    Rejected {
        attribute: String,
        value: String,
        reason: String,
    },
    Answered { purpose: DecisionPurpose, answer: bool },
    /// 推荐翻页
    Paged,
    Triggered,
}

impl CommitOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, CommitOutcome::Rejected { .. })
    }
}

impl<'a> Dialog<'a> {
    pub(crate) fn decision_answer(&self, id: FillerId) -> Option<bool> {
        match &self.session.arena.get(id)?.kind {
            FillerKind::Decision(d) => d.answer,
            _ => None,
        }
    }

    pub(crate) fn reset_decision(&mut self, id: FillerId) {
        if let Some(d) = self.session.arena.decision_mut(id) {
            d.answer = None;
            d.inferred = false;
        }
    }

    pub(crate) fn check_passed(&self, id: FillerId) -> bool {
        matches!(self.session.arena.get(id).map(|n| &n.kind), Some(FillerKind::Check(c)) if c.passed)
    }

    /// 未被消费的 bee.Yes / bee.No
    fn find_yes_no(&self, scope: EventScope) -> Option<(EventRef, bool)> {
        self.session
            .events
            .active_frames(scope)
            .into_iter()
            .filter(|(_, f)| !f.type_used)
            .find_map(|(path, f)| {
                if f.matches_type(system::YES) {
                    Some((EventRef::frame(path), true))
                } else if f.matches_type(system::NO) {
                    Some((EventRef::frame(path), false))
                } else {
                    None
                }
            })
    }

    /// 明确的是 / 否；has-more 在本回合有新元素时推断为「是」
    pub(crate) fn decision_fill(&self, id: FillerId, scope: EventScope) -> Result<Option<Fill>, DialogError> {
        let FillerKind::Decision(d) = &self.node(id)?.kind else {
            return Ok(None);
        };
        if let Some((event, _)) = self.find_yes_no(scope) {
            return Ok(Some(Fill::Event(event)));
        }
        if d.purpose == DecisionPurpose::HasMore {
            let list = self.node(id)?.parent.ok_or_else(|| dangling(id))?;
            let fresh = EventScope::Turn(self.session.turn_id);
            if self.list_pending_event(list, fresh)?.is_some() {
                return Ok(Some(Fill::Infer(true)));
            }
        }
        Ok(None)
    }

    pub(crate) fn commit_decision(&mut self, id: FillerId, fill: &Fill) -> Result<CommitOutcome, DialogError> {
        let (answer, inferred) = match fill {
            Fill::Infer(b) => (*b, true),
            Fill::Event(event) => {
                let frame = self
                    .session
                    .events
                    .frame(event)
                    .ok_or_else(|| DialogError::InvariantViolation(format!("stale event handle {:?}", event.path)))?;
                let yes = frame.matches_type(system::YES);
                self.session.events.mark_used(event);
                (yes, false)
            }
        };
        let purpose = {
            let d = self.session.arena.decision_mut(id).ok_or_else(|| dangling(id))?;
            d.answer = Some(answer);
            d.inferred = inferred;
            d.purpose
        };
        let parent = self.node(id)?.parent.ok_or_else(|| dangling(id))?;
        match (purpose, answer) {
            (DecisionPurpose::Gate, false) => {
                self.wrapper_state_mut(parent)?.skipped = true;
            }
            (DecisionPurpose::Confirm, false) => {
                self.reopen_wrapper(parent)?;
            }
            _ => {}
        }
        tracing::debug!("Decision {:?} on {} answered {}", purpose, parent, answer);
        Ok(CommitOutcome::Answered { purpose, answer })
    }

    /// 推荐节点：接受目标实体的值，或翻页
    pub(crate) fn recommend_fill(&self, id: FillerId, scope: EventScope) -> Result<Option<Fill>, DialogError> {
        let wrapper = self.node(id)?.parent.ok_or_else(|| dangling(id))?;
        let target = self.wrapper_state(wrapper)?.target;
        if let Some(fill) = self.entity_fill(target, scope)? {
            return Ok(Some(fill));
        }
        Ok(self
            .session
            .events
            .active_frames(scope)
            .into_iter()
            .find(|(_, f)| !f.type_used && f.matches_type(system::NEXT_PAGE))
            .map(|(path, _)| Fill::Event(EventRef::frame(path))))
    }

    pub(crate) fn commit_recommend(&mut self, id: FillerId, event: &EventRef) -> Result<CommitOutcome, DialogError> {
        if event.slot.is_none() {
            let next_page = self
                .session
                .events
                .frame(event)
                .is_some_and(|f| f.matches_type(system::NEXT_PAGE));
            if next_page {
                self.session.events.mark_used(event);
                let r = self.session.arena.recommend_mut(id).ok_or_else(|| dangling(id))?;
                r.page += 1;
                r.offered = false;
                return Ok(CommitOutcome::Paged);
            }
        }
        let wrapper = self.node(id)?.parent.ok_or_else(|| dangling(id))?;
        let target = self.wrapper_state(wrapper)?.target;
        let outcome = self.commit_entity(target, event)?;
        if matches!(outcome, CommitOutcome::Filled { .. }) {
            if let Some(r) = self.session.arena.recommend_mut(id) {
                r.chosen = true;
            }
        }
        Ok(outcome)
    }

    /// 当前页的候选（越界时回到第一页）
    pub(crate) fn recommend_page(&mut self, id: FillerId) -> Result<(Vec<String>, usize), DialogError> {
        let wrapper = self.node(id)?.parent.ok_or_else(|| dangling(id))?;
        let size = self
            .policy(wrapper)?
            .recommend
            .and_then(|r| r.page_size)
            .unwrap_or(self.settings().default_page_size)
            .max(1);
        let all = self.recommend_candidates(wrapper)?;
        let pages = all.len().div_ceil(size).max(1);
        let r = self.session.arena.recommend_mut(id).ok_or_else(|| dangling(id))?;
        if r.page >= pages {
            r.page = 0;
        }
        r.offered = true;
        let page = r.page;
        Ok((all.into_iter().skip(page * size).take(size).collect(), page))
    }

    pub(crate) fn grow_leaf(&self, id: FillerId) -> Result<Grow, DialogError> {
        Ok(match self.find_fill(id, EventScope::Active)? {
            Some(fill) => Grow::Commit(fill),
            None => Grow::Ask,
        })
    }

    pub(crate) fn clear_aux(&mut self, id: FillerId) -> Result<(), DialogError> {
        match &mut self.node_mut(id)?.kind {
            FillerKind::Decision(d) => {
                d.answer = None;
                d.inferred = false;
            }
            FillerKind::Check(c) => c.passed = false,
            FillerKind::Recommend(r) => {
                r.page = 0;
                r.offered = false;
                r.chosen = false;
                r.exhausted = false;
            }
            _ => {}
        }
        Ok(())
    }
}
