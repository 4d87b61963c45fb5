//! 实体（叶子）填充器与事件兼容性

use super::{CommitOutcome, Fill, FillerId, FillerKind};
use crate::core::DialogError;
use crate::engine::{dangling, Dialog};
use crate::event::{EventRef, EventScope};
use crate::schema::{system, CandidateQuery, SlotType};

impl<'a> Dialog<'a> {
    /// 槽位类型对应的兼容事件（列表看元素类型，接口看各实现类型）
    pub(crate) fn find_slot_event(
        &self,
        owner_type: &str,
        attribute: &str,
        slot_type: &SlotType,
        scope: EventScope,
    ) -> Option<EventRef> {
        match slot_type {
            SlotType::Entity(t) => self.find_entity_event(owner_type, attribute, Some(t), scope),
            SlotType::Frame(t) => self.find_frame_event(t, scope),
            SlotType::Interface(t) => self
                .registry()
                .variants_of(t)
                .iter()
                .find_map(|v| self.find_variant_event(v, scope)),
            SlotType::List { element, .. } => self.find_slot_event(owner_type, attribute, element, scope),
        }
    }

    /// 所属帧类型一致、属性相同且未使用的槽位赋值；事件带类型时类型也要一致
    pub(crate) fn find_entity_event(
        &self,
        owner_type: &str,
        attribute: &str,
        entity_type: Option<&str>,
        scope: EventScope,
    ) -> Option<EventRef> {
        for (path, f) in self.session.events.active_frames(scope) {
            if !f.matches_type(owner_type) {
                continue;
            }
            for (i, s) in f.slots.iter().enumerate() {
                if s.used || s.attribute != attribute {
                    continue;
                }
                if let (Some(want), Some(have)) = (entity_type, s.type_name.as_deref()) {
                    if want != have {
                        continue;
                    }
                }
                return Some(EventRef::entity(path, i));
            }
        }
        None
    }

    /// 同类型且还有未消费槽位的帧事件
    pub(crate) fn find_frame_event(&self, frame_type: &str, scope: EventScope) -> Option<EventRef> {
        self.session
            .events
            .active_frames(scope)
            .into_iter()
            .find(|(_, f)| f.matches_type(frame_type) && f.has_unused_slot())
            .map(|(path, _)| EventRef::frame(path))
    }

    /// 接口实现类型的事件；无槽位的事件以类型未被消费为准
    pub(crate) fn find_variant_event(&self, variant_type: &str, scope: EventScope) -> Option<EventRef> {
        self.session
            .events
            .active_frames(scope)
            .into_iter()
            .find(|(_, f)| f.matches_type(variant_type) && (!f.type_used || f.has_unused_slot()))
            .map(|(path, _)| EventRef::frame(path))
    }

    /// 实体节点当前可消费的事件
    pub(crate) fn entity_fill(&self, id: FillerId, scope: EventScope) -> Result<Option<Fill>, DialogError> {
        let node = self.node(id)?;
        let FillerKind::Entity(state) = &node.kind else {
            return Ok(None);
        };
        let Some(owner) = self.session.arena.owner(id) else {
            return Ok(None);
        };
        let scope = self.scope_for(id, scope);
        let found = match &self.node(owner)?.kind {
            FillerKind::Frame(f) => {
                self.find_entity_event(&f.frame_type, &node.attribute, Some(&state.entity_type), scope)
            }
            FillerKind::Interface(i) => self
                .registry()
                .variants_of(&i.interface_type)
                .iter()
                .find_map(|v| self.find_variant_event(v, scope))
                .or_else(|| self.find_entity_event(&i.interface_type, system::TYPE_ATTRIBUTE, None, scope)),
            _ => None,
        };
        Ok(found.map(Fill::Event))
    }

    pub(crate) fn commit_entity(&mut self, id: FillerId, event: &EventRef) -> Result<CommitOutcome, DialogError> {
        let attribute = self.node(id)?.attribute.clone();
        let entity_type = self
            .session
            .arena
            .entity(id)
            .ok_or_else(|| dangling(id))?
            .entity_type
            .clone();

        // 接口类型由实现类型的帧事件解析
        if event.slot.is_none() {
            return self.commit_real_type(id, event);
        }

        let e = self
            .session
            .events
            .entity(event)
            .cloned()
            .ok_or_else(|| DialogError::InvariantViolation(format!("stale event handle {:?}", event.path)))?;
        self.session.events.mark_used(event);

        if e.accepts_anything() {
            let state = self.session.arena.entity_mut(id).ok_or_else(|| dangling(id))?;
            state.value = None;
            state.dont_care = true;
            return Ok(CommitOutcome::Filled { attribute, value: None });
        }

        let raw = if e.is_context_ref() {
            match self.session.search_context(&entity_type, Some(id)) {
                Some(v) => v,
                None => {
                    return Ok(CommitOutcome::Rejected {
                        attribute,
                        value: e.value,
                        reason: format!("I don't know which {entity_type} you mean."),
                    })
                }
            }
        } else {
            e.value.clone()
        };

        let value = if entity_type == system::TYPE_NAME {
            match self.resolve_variant_name(id, &raw) {
                Some(v) => v,
                None => {
                    return Ok(CommitOutcome::Rejected {
                        attribute,
                        reason: format!("'{raw}' is not one of the options."),
                        value: raw,
                    })
                }
            }
        } else {
            match self.registry().entity(&entity_type).map(|s| s.validator.validate(&raw)) {
                Some(Err(reason)) => {
                    return Ok(CommitOutcome::Rejected {
                        attribute,
                        value: raw,
                        reason,
                    })
                }
                Some(Ok(v)) => v,
                None => raw,
            }
        };

        if !self.offered_if_hard(id, &value)? {
            return Ok(CommitOutcome::Rejected {
                attribute,
                reason: format!("'{value}' is not one of the suggestions."),
                value,
            });
        }

        let state = self.session.arena.entity_mut(id).ok_or_else(|| dangling(id))?;
        state.value = Some(value.clone());
        state.dont_care = false;
        tracing::debug!("Filled {} = {}", attribute, value);
        Ok(CommitOutcome::Filled {
            attribute,
            value: Some(value),
        })
    }

    fn commit_real_type(&mut self, id: FillerId, event: &EventRef) -> Result<CommitOutcome, DialogError> {
        let attribute = self.node(id)?.attribute.clone();
        let frame = self
            .session
            .events
            .frame(event)
            .ok_or_else(|| DialogError::InvariantViolation(format!("stale event handle {:?}", event.path)))?;
        let variant = self.registry().find_by_event(frame).map(|s| s.qualified());
        self.session.events.mark_used(event);
        match variant.and_then(|v| self.resolve_variant_name(id, &v)) {
            Some(v) => {
                if let Some(state) = self.session.arena.entity_mut(id) {
                    state.value = Some(v.clone());
                }
                Ok(CommitOutcome::Filled {
                    attribute,
                    value: Some(v),
                })
            }
            None => Ok(CommitOutcome::Rejected {
                attribute,
                value: String::new(),
                reason: "That is not one of the options.".to_string(),
            }),
        }
    }

    /// 把用户给出的类型名（简单名或限定名）映射到接口的某个实现
    fn resolve_variant_name(&self, real_type: FillerId, raw: &str) -> Option<String> {
        let interface = self.node(real_type).ok()?.parent?;
        let FillerKind::Interface(i) = &self.node(interface).ok()?.kind else {
            return None;
        };
        self.registry()
            .variants_of(&i.interface_type)
            .into_iter()
            .find(|v| v == raw || v.rsplit('.').next().is_some_and(|n| n.eq_ignore_ascii_case(raw)))
    }

    /// hard 推荐只接受候选中的值
    fn offered_if_hard(&self, entity: FillerId, value: &str) -> Result<bool, DialogError> {
        let Some(wrapper) = self.session.arena.parent_wrapper(entity) else {
            return Ok(true);
        };
        let Some(rec) = self.slot_spec(wrapper)?.and_then(|s| s.recommend.as_ref()) else {
            return Ok(true);
        };
        if !rec.hard {
            return Ok(true);
        }
        Ok(self.recommend_candidates(wrapper)?.iter().any(|c| c == value))
    }

    /// 推荐候选（全量，分页在推荐节点上做）
    pub(crate) fn recommend_candidates(&self, wrapper: FillerId) -> Result<Vec<String>, DialogError> {
        let Some(rec) = self.slot_spec(wrapper)?.and_then(|s| s.recommend.as_ref()) else {
            return Ok(Vec::new());
        };
        let Some(source) = self.registry().source(&rec.source) else {
            tracing::warn!("Unknown candidate source '{}'", rec.source);
            return Ok(Vec::new());
        };
        let w = self.wrapper_state(wrapper)?;
        let values = match self.session.arena.owning_frame(wrapper) {
            Some(frame) => self.frame_values(frame)?,
            None => Default::default(),
        };
        let query = CandidateQuery {
            frame_type: &w.slot.frame_type,
            attribute: &w.slot.attribute,
            values: &values,
        };
        Ok(source.candidates(&query))
    }

    pub(crate) fn clear_entity(&mut self, id: FillerId) -> Result<(), DialogError> {
        let state = self.session.arena.entity_mut(id).ok_or_else(|| dangling(id))?;
        state.value = None;
        state.dont_care = false;
        Ok(())
    }
}
