//! 帧（记录）填充器

use super::{CommitOutcome, Fill, FillerId, FillerKind, Grow};
use crate::core::DialogError;
use crate::engine::{dangling, Dialog};
use crate::event::{EventRef, EventScope};
use crate::schema::{SlotValues, RESULT_SLOT};
use crate::session::SlotValue;

impl<'a> Dialog<'a> {
    fn frame_needs_trigger(&self, id: FillerId) -> Result<bool, DialogError> {
        let f = self.session.arena.frame(id).ok_or_else(|| dangling(id))?;
        let external = self
            .registry()
            .frame(&f.frame_type)
            .is_some_and(|s| s.external_trigger);
        Ok(external && !f.triggered)
    }

    /// 声明顺序中第一个未完成的槽位（跳过 result）
    fn first_open_slot(&self, id: FillerId) -> Result<Option<FillerId>, DialogError> {
        let f = self.session.arena.frame(id).ok_or_else(|| dangling(id))?;
        for w in &f.slots {
            if self.node(*w)?.attribute == RESULT_SLOT {
                continue;
            }
            if !self.is_done(*w)? {
                return Ok(Some(*w));
            }
        }
        Ok(None)
    }

    pub(crate) fn is_frame_done(&self, id: FillerId) -> Result<bool, DialogError> {
        Ok(self.first_open_slot(id)?.is_none() && !self.frame_needs_trigger(id)?)
    }

    pub(crate) fn grow_frame(&self, id: FillerId) -> Result<Grow, DialogError> {
        if let Some(w) = self.first_open_slot(id)? {
            return Ok(Grow::Push(w));
        }
        if self.frame_needs_trigger(id)? {
            return Ok(match self.frame_fill(id, EventScope::Active)? {
                Some(fill) => Grow::Commit(fill),
                None => Grow::Blocked,
            });
        }
        Ok(Grow::Blocked)
    }

    /// 外部触发帧：等待同类型、带 triggered 标记且类型未被消费的事件
    pub(crate) fn frame_fill(&self, id: FillerId, scope: EventScope) -> Result<Option<Fill>, DialogError> {
        if !self.frame_needs_trigger(id)? || self.first_open_slot(id)?.is_some() {
            return Ok(None);
        }
        let frame_type = &self.session.arena.frame(id).ok_or_else(|| dangling(id))?.frame_type;
        Ok(self
            .session
            .events
            .active_frames(scope)
            .into_iter()
            .find(|(_, f)| f.triggered && !f.type_used && f.matches_type(frame_type))
            .map(|(path, _)| Fill::Event(EventRef::frame(path))))
    }

    pub(crate) fn commit_frame(&mut self, id: FillerId, event: &EventRef) -> Result<CommitOutcome, DialogError> {
        self.session.events.mark_used(event);
        let f = self.session.arena.frame_mut(id).ok_or_else(|| dangling(id))?;
        f.triggered = true;
        tracing::info!("Frame {} triggered", f.frame_type);
        Ok(CommitOutcome::Triggered)
    }

    pub(crate) fn clear_frame(&mut self, id: FillerId) -> Result<(), DialogError> {
        let slots = {
            let f = self.session.arena.frame_mut(id).ok_or_else(|| dangling(id))?;
            f.triggered = false;
            f.slots.clone()
        };
        for w in slots {
            self.clear(w)?;
        }
        Ok(())
    }

    /// 帧内已填写的值；嵌套帧以 `a.b` 为键，列表以逗号拼接
    pub fn frame_values(&self, id: FillerId) -> Result<SlotValues, DialogError> {
        let mut out = SlotValues::new();
        self.collect_values(id, "", &mut out)?;
        Ok(out)
    }

    fn collect_values(&self, frame: FillerId, prefix: &str, out: &mut SlotValues) -> Result<(), DialogError> {
        let f = self.session.arena.frame(frame).ok_or_else(|| dangling(frame))?;
        for w in &f.slots {
            let key = format!("{prefix}{}", self.node(*w)?.attribute);
            let target = self.wrapper_state(*w)?.target;
            self.collect_target(target, &key, out)?;
        }
        Ok(())
    }

    fn collect_target(&self, target: FillerId, key: &str, out: &mut SlotValues) -> Result<(), DialogError> {
        match &self.node(target)?.kind {
            FillerKind::Entity(e) => {
                if let Some(v) = &e.value {
                    out.insert(key.to_string(), v.clone());
                }
            }
            FillerKind::Frame(_) => self.collect_values(target, &format!("{key}."), out)?,
            FillerKind::Interface(i) => {
                if let Some(t) = self.session.arena.entity(i.real_type).and_then(|e| e.value.clone()) {
                    out.insert(key.to_string(), t);
                }
                if let Some(v) = i.variant {
                    self.collect_values(v, &format!("{key}."), out)?;
                }
            }
            FillerKind::List(l) => {
                let mut items = Vec::new();
                for (n, el) in l.items.iter().enumerate() {
                    let mut sub = SlotValues::new();
                    let el_target = self.wrapper_state(*el)?.target;
                    let el_key = format!("{key}.{n}");
                    self.collect_target(el_target, &el_key, &mut sub)?;
                    if let Some(v) = sub.get(&el_key) {
                        items.push(v.clone());
                    }
                    out.extend(sub);
                }
                if !items.is_empty() {
                    out.insert(key.to_string(), items.join(", "));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// 帧内所有已填写的实体值（带实体类型），用于历史与上下文查找
    pub(crate) fn typed_values(&self, root: FillerId) -> Vec<SlotValue> {
        let arena = &self.session.arena;
        let mut stack = vec![root];
        let mut out = Vec::new();
        while let Some(id) = stack.pop() {
            if let Some(e) = arena.entity(id) {
                if let Some(v) = &e.value {
                    let attribute = arena.get(id).map(|n| n.attribute.clone()).unwrap_or_default();
                    out.push(SlotValue {
                        attribute,
                        entity_type: e.entity_type.clone(),
                        value: v.clone(),
                    });
                }
            }
            let mut children = arena.children(id);
            children.reverse();
            stack.extend(children);
        }
        out
    }
}
