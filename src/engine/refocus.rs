//! 重聚焦：焦点消费不了本回合的新事件时，在活跃路径上找一个可进入且兼容的槽位
//!
//! 搜索范围：栈上每个帧的槽位（深度 0），以及这些槽位中帧类型目标的槽位（深度 1）。
//! 排序：未填写优先，深度 0 优先，离焦点近的帧优先，声明顺序靠前优先。

use super::Dialog;
use crate::core::DialogError;
use crate::event::{EventRef, EventScope};
use crate::filler::{FillerId, FillerKind};
use crate::schema::{AskStrategy, RESULT_SLOT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefocusMode {
    /// 槽位已是同一个值：只消费事件
    Revisit,
    /// 清空目标后重新填写
    Replace,
    /// 向列表追加元素
    Append,
    /// 重新进入已清理的槽位（取值检查失败后）
    Reenter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefocusPlan {
    /// 保留的栈前缀长度
    pub keep: usize,
    /// 在前缀之上压入的路径（最后一个是目标 Wrapper）
    pub path: Vec<FillerId>,
    pub target: FillerId,
    pub mode: RefocusMode,
    pub event: Option<EventRef>,
    /// 目标所在的 Scheduler（`Session::schedulers` 中的下标）；None 为当前 Scheduler
    pub scheduler: Option<usize>,
}

type Rank = (bool, usize, usize, usize);

impl<'a> Dialog<'a> {
    /// 用本回合的新事件搜索重聚焦目标
    pub(crate) fn find_refocus(&self) -> Result<Option<RefocusPlan>, DialogError> {
        self.find_refocus_in(None)
    }

    /// 在指定 Scheduler 的栈上搜索；用于更新暂停中的父意图
    pub(crate) fn find_refocus_in(&self, scheduler: Option<usize>) -> Result<Option<RefocusPlan>, DialogError> {
        let scope = EventScope::Turn(self.session.turn_id);
        let stack = match scheduler {
            Some(si) => match self.session.schedulers().nth(si) {
                Some(s) => s.stack.clone(),
                None => return Ok(None),
            },
            None => self.session.current().stack.clone(),
        };
        let mut best: Option<(Rank, RefocusPlan)> = None;

        for (pos, id) in stack.iter().enumerate().rev() {
            let Some(frame) = self.session.arena.frame(*id) else {
                continue;
            };
            let distance = stack.len() - 1 - pos;
            for (idx, w0) in frame.slots.iter().enumerate() {
                let rank = |filled: bool, depth: usize| (filled, depth, distance, idx);
                if let Some((filled, plan)) = self.refocus_candidate(*w0, &stack, pos + 1, vec![*w0], scope)? {
                    consider(&mut best, rank(filled, 0), plan);
                }
                if stack.contains(w0) {
                    continue;
                }
                let target = self.wrapper_state(*w0)?.target;
                let Some(sub) = self.session.arena.frame(target) else {
                    continue;
                };
                for w1 in &sub.slots {
                    let path = vec![*w0, target, *w1];
                    if let Some((filled, plan)) = self.refocus_candidate(*w1, &stack, pos + 1, path, scope)? {
                        consider(&mut best, rank(filled, 1), plan);
                    }
                }
            }
        }
        Ok(best.map(|(_, plan)| RefocusPlan { scheduler, ..plan }))
    }

    /// 单个槽位能否作为重聚焦目标；返回 (是否已填写, 计划)
    fn refocus_candidate(
        &self,
        wrapper: FillerId,
        stack: &[FillerId],
        keep: usize,
        path: Vec<FillerId>,
        scope: EventScope,
    ) -> Result<Option<(bool, RefocusPlan)>, DialogError> {
        let node = self.node(wrapper)?;
        if node.attribute == RESULT_SLOT {
            return Ok(None);
        }
        let w = self.wrapper_state(wrapper)?;
        if w.closed {
            return Ok(None);
        }
        // 帧 / 接口槽位通过其内部槽位进入
        let target_kind = &self.node(w.target)?.kind;
        if !matches!(target_kind, FillerKind::Entity(_) | FillerKind::List(_)) {
            return Ok(None);
        }
        let filled = self.is_filled(wrapper)?;
        if stack.contains(&wrapper) && !filled {
            return Ok(None);
        }
        let Some(spec) = self.slot_spec(wrapper)? else {
            return Ok(None);
        };
        if let AskStrategy::ConditionalAsk(cond) = &spec.ask {
            if !cond.eval(&self.owner_values(wrapper)?, self.registry()) {
                return Ok(None);
            }
        }
        let scope = self.scope_for(wrapper, scope);
        let Some(event) = self.find_slot_event(&w.slot.frame_type, &w.slot.attribute, &spec.slot_type, scope) else {
            return Ok(None);
        };
        let mode = if matches!(target_kind, FillerKind::List(_)) {
            RefocusMode::Append
        } else if filled && self.session.events.entity(&event).map(|e| &e.value) == self.session.arena.entity(w.target).and_then(|e| e.value.as_ref()) {
            RefocusMode::Revisit
        } else {
            RefocusMode::Replace
        };
        Ok(Some((
            filled,
            RefocusPlan {
                keep,
                path,
                target: wrapper,
                mode,
                event: Some(event),
                scheduler: None,
            },
        )))
    }

    /// 重新进入某个槽位：保留它在栈上最深的祖先，压入其下的祖先链
    pub(crate) fn reenter_plan(&self, target: FillerId) -> RefocusPlan {
        let lineage = self.session.arena.lineage(target);
        let stack = &self.session.current().stack;
        let anchor = lineage
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, id)| stack.iter().position(|s| s == id).map(|p| (i, p)));
        let (keep, path) = match anchor {
            Some((i, p)) if lineage[i] != target => (p + 1, lineage[i + 1..].to_vec()),
            Some((i, p)) => (p, lineage[i..].to_vec()),
            None => (0, lineage),
        };
        RefocusPlan {
            keep,
            path,
            target,
            mode: RefocusMode::Reenter,
            event: None,
            scheduler: None,
        }
    }

    /// 使目标所在帧内的取值检查失效，下次经过时重新执行
    pub(crate) fn recheck(&mut self, target: FillerId) {
        let Some(frame) = self.session.arena.owning_frame(target) else {
            return;
        };
        let mut pending = vec![frame];
        while let Some(id) = pending.pop() {
            if let Some(check) = self.session.arena.wrapper(id).and_then(|w| w.check) {
                if let Some(c) = self.session.arena.check_mut(check) {
                    c.passed = false;
                }
            }
            pending.extend(self.session.arena.children(id));
        }
    }
}

fn consider(best: &mut Option<(Rank, RefocusPlan)>, rank: Rank, plan: RefocusPlan) {
    if best.as_ref().map_or(true, |(r, _)| rank < *r) {
        *best = Some((rank, plan));
    }
}
