//! 列表填充器：元素逐个收集，has-more 决策控制是否继续

use super::{FillerId, Grow};
use crate::core::DialogError;
use crate::engine::{dangling, Dialog};
use crate::event::{EventRef, EventScope};

impl<'a> Dialog<'a> {
    /// 能作为新元素的待处理事件
    pub(crate) fn list_pending_event(&self, list: FillerId, scope: EventScope) -> Result<Option<EventRef>, DialogError> {
        let wrapper = self.node(list)?.parent.ok_or_else(|| dangling(list))?;
        let Some(slot) = self.slot_spec(wrapper)? else {
            return Ok(None);
        };
        let owner = &self.wrapper_state(wrapper)?.slot.frame_type;
        let scope = self.scope_for(list, scope);
        Ok(self.find_slot_event(owner, &slot.attribute, &slot.slot_type, scope))
    }

    fn last_in_progress(&self, list: FillerId) -> Result<Option<FillerId>, DialogError> {
        let l = self.session.arena.list(list).ok_or_else(|| dangling(list))?;
        match l.items.last() {
            Some(last) if !self.is_done(*last)? => Ok(Some(*last)),
            _ => Ok(None),
        }
    }

    fn has_more_answer(&self, list: FillerId) -> Result<Option<bool>, DialogError> {
        let l = self.session.arena.list(list).ok_or_else(|| dangling(list))?;
        Ok(self.decision_answer(l.has_more))
    }

    fn max_reached(&self, list: FillerId) -> Result<bool, DialogError> {
        let l = self.session.arena.list(list).ok_or_else(|| dangling(list))?;
        Ok(l.max.is_some_and(|m| l.items.len() >= m))
    }

    pub(crate) fn is_list_done(&self, id: FillerId) -> Result<bool, DialogError> {
        if self.last_in_progress(id)?.is_some() {
            return Ok(false);
        }
        if self.has_more_answer(id)? == Some(false) {
            return Ok(true);
        }
        Ok(self.max_reached(id)? && self.list_pending_event(id, EventScope::Active)?.is_none())
    }

    pub(crate) fn grow_list(&mut self, id: FillerId) -> Result<Grow, DialogError> {
        if let Some(last) = self.last_in_progress(id)? {
            return Ok(Grow::Push(last));
        }
        let pending = self.list_pending_event(id, EventScope::Active)?;
        if self.max_reached(id)? {
            return Ok(match pending {
                Some(event) => Grow::Overflow { list: id, event },
                None => Grow::Blocked,
            });
        }
        let (len, min, has_more) = {
            let l = self.session.arena.list(id).ok_or_else(|| dangling(id))?;
            (l.items.len(), l.min, l.has_more)
        };
        if len < min {
            return Ok(Grow::Push(self.build_element(id)?));
        }
        match self.decision_answer(has_more) {
            Some(true) => {
                self.reset_decision(has_more);
                Ok(Grow::Push(self.build_element(id)?))
            }
            Some(false) => Ok(Grow::Blocked),
            None if pending.is_some() => Ok(Grow::Push(self.build_element(id)?)),
            None => Ok(Grow::Push(has_more)),
        }
    }

    /// 重新打开列表以追加元素
    pub(crate) fn reopen_list(&mut self, id: FillerId) -> Result<(), DialogError> {
        let has_more = self.session.arena.list(id).ok_or_else(|| dangling(id))?.has_more;
        self.reset_decision(has_more);
        Ok(())
    }

    pub(crate) fn clear_list(&mut self, id: FillerId) -> Result<(), DialogError> {
        let (items, has_more) = {
            let l = self.session.arena.list_mut(id).ok_or_else(|| dangling(id))?;
            (std::mem::take(&mut l.items), l.has_more)
        };
        for item in items {
            self.session.arena.remove_tree(item);
        }
        self.reset_decision(has_more);
        Ok(())
    }
}
