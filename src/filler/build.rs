//! 按 schema 构建填充子树
//!
//! 结构节点（frame 的全部槽位、interface 的类型实体、list 的 has-more）一次构建；
//! Wrapper 的辅助子节点、列表元素和接口的具体实现按需构建。

use super::{
    CheckState, DecisionPurpose, DecisionState, EntityState, Filler, FillerId, FillerKind, FrameState,
    InterfaceState, ListState, RecommendState, SlotKey, WrapperRole, WrapperState,
};
use crate::core::DialogError;
use crate::engine::{dangling, Dialog};
use crate::schema::{system, FrameSpec, SlotSpec, SlotType};

/// 按需构建的 Wrapper 辅助子节点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AuxKind {
    Gate,
    Confirm,
    Check,
    Recommend,
}

impl<'a> Dialog<'a> {
    /// 构建意图根：Root Wrapper 包着意图帧
    pub(crate) fn build_root(&mut self, intent_type: &str) -> Result<FillerId, DialogError> {
        let spec = self.registry().require_frame(intent_type)?;
        let mark = self.session.arena.mark();
        let w = self.session.arena.reserve();
        let target = self.rollback_on_err(mark, |d| d.build_frame(spec, w, "", 1))?;
        let owner = spec.qualified();
        self.session.arena.place(
            w,
            Filler {
                parent: None,
                attribute: String::new(),
                kind: FillerKind::Wrapper(WrapperState::new(WrapperRole::Root, SlotKey::new(owner, ""), target)),
            },
        );
        tracing::debug!("Built intent {} as {}", intent_type, w);
        Ok(w)
    }

    /// 构建失败时丢弃本次已分配的全部节点
    fn rollback_on_err<T>(
        &mut self,
        mark: FillerId,
        build: impl FnOnce(&mut Self) -> Result<T, DialogError>,
    ) -> Result<T, DialogError> {
        let out = build(self);
        if out.is_err() {
            self.session.arena.discard_from(mark);
        }
        out
    }

    /// 祖先链上的帧层数（含自身）
    fn frame_depth(&self, id: FillerId) -> usize {
        self.session
            .arena
            .lineage(id)
            .into_iter()
            .filter(|n| self.session.arena.frame(*n).is_some())
            .count()
    }

    /// depth 为所属帧的嵌套层数
    fn build_wrapper(
        &mut self,
        parent: FillerId,
        owner_type: &str,
        slot: &'a SlotSpec,
        role: WrapperRole,
        depth: usize,
    ) -> Result<FillerId, DialogError> {
        let slot_type = match (&slot.slot_type, role) {
            (SlotType::List { element, .. }, WrapperRole::Element) => element.as_ref(),
            (t, _) => t,
        };
        let w = self.session.arena.reserve();
        let target = self.build_target(slot_type, w, &slot.attribute, depth)?;
        self.session.arena.place(
            w,
            Filler {
                parent: Some(parent),
                attribute: slot.attribute.clone(),
                kind: FillerKind::Wrapper(WrapperState::new(role, SlotKey::new(owner_type, &slot.attribute), target)),
            },
        );
        Ok(w)
    }

    fn build_target(
        &mut self,
        slot_type: &SlotType,
        parent: FillerId,
        attribute: &str,
        depth: usize,
    ) -> Result<FillerId, DialogError> {
        match slot_type {
            SlotType::Entity(t) => Ok(self.session.arena.alloc(Filler {
                parent: Some(parent),
                attribute: attribute.to_string(),
                kind: FillerKind::Entity(EntityState {
                    entity_type: t.clone(),
                    value: None,
                    dont_care: false,
                }),
            })),
            SlotType::Frame(t) => {
                let spec = self.registry().require_frame(t)?;
                self.build_frame(spec, parent, attribute, depth + 1)
            }
            SlotType::Interface(t) => {
                self.registry().require_frame(t)?;
                let id = self.session.arena.reserve();
                let real_type = self.session.arena.alloc(Filler {
                    parent: Some(id),
                    attribute: system::TYPE_ATTRIBUTE.to_string(),
                    kind: FillerKind::Entity(EntityState {
                        entity_type: system::TYPE_NAME.to_string(),
                        value: None,
                        dont_care: false,
                    }),
                });
                self.session.arena.place(
                    id,
                    Filler {
                        parent: Some(parent),
                        attribute: attribute.to_string(),
                        kind: FillerKind::Interface(InterfaceState {
                            interface_type: t.clone(),
                            real_type,
                            variant: None,
                        }),
                    },
                );
                Ok(id)
            }
            SlotType::List { min, max, .. } => {
                let id = self.session.arena.reserve();
                let has_more = self.alloc_decision(id, attribute, DecisionPurpose::HasMore);
                self.session.arena.place(
                    id,
                    Filler {
                        parent: Some(parent),
                        attribute: attribute.to_string(),
                        kind: FillerKind::List(ListState {
                            items: Vec::new(),
                            has_more,
                            min: *min,
                            max: *max,
                        }),
                    },
                );
                Ok(id)
            }
        }
    }

    /// depth 为这一帧的嵌套层数，意图帧为 1
    fn build_frame(
        &mut self,
        spec: &'a FrameSpec,
        parent: FillerId,
        attribute: &str,
        depth: usize,
    ) -> Result<FillerId, DialogError> {
        let max = self.settings().max_build_depth;
        if depth > max {
            return Err(DialogError::Construction(format!(
                "frame {} under '{attribute}' nests deeper than {max} levels",
                spec.qualified()
            )));
        }
        let id = self.session.arena.reserve();
        let owner = spec.qualified();
        let mut slots = Vec::with_capacity(spec.slots.len());
        for slot in &spec.slots {
            slots.push(self.build_wrapper(id, &owner, slot, WrapperRole::Slot, depth)?);
        }
        self.session.arena.place(
            id,
            Filler {
                parent: Some(parent),
                attribute: attribute.to_string(),
                kind: FillerKind::Frame(FrameState {
                    frame_type: owner,
                    slots,
                    triggered: false,
                }),
            },
        );
        Ok(id)
    }

    /// 为列表追加一个元素 Wrapper
    pub(crate) fn build_element(&mut self, list: FillerId) -> Result<FillerId, DialogError> {
        let list_wrapper = self.node(list)?.parent.ok_or_else(|| dangling(list))?;
        let slot = self.slot_spec(list_wrapper)?.ok_or_else(|| {
            DialogError::InvariantViolation(format!("list {list} has no slot definition"))
        })?;
        let owner = self.wrapper_state(list_wrapper)?.slot.frame_type.clone();
        let depth = self.frame_depth(list);
        let mark = self.session.arena.mark();
        let element = self.rollback_on_err(mark, |d| d.build_wrapper(list, &owner, slot, WrapperRole::Element, depth))?;
        self.session
            .arena
            .list_mut(list)
            .ok_or_else(|| dangling(list))?
            .items
            .push(element);
        Ok(element)
    }

    /// 类型解析完成后构建接口的具体实现帧
    pub(crate) fn build_variant(&mut self, interface: FillerId, variant_type: &str) -> Result<FillerId, DialogError> {
        let spec = self.registry().require_frame(variant_type)?;
        let attribute = self.node(interface)?.attribute.clone();
        let depth = self.frame_depth(interface) + 1;
        let mark = self.session.arena.mark();
        let variant = self.rollback_on_err(mark, |d| d.build_frame(spec, interface, &attribute, depth))?;
        if let Some(FillerKind::Interface(i)) = self.session.arena.get_mut(interface).map(|n| &mut n.kind) {
            i.variant = Some(variant);
        }
        Ok(variant)
    }

    fn alloc_decision(&mut self, parent: FillerId, attribute: &str, purpose: DecisionPurpose) -> FillerId {
        self.session.arena.alloc(Filler {
            parent: Some(parent),
            attribute: attribute.to_string(),
            kind: FillerKind::Decision(DecisionState {
                purpose,
                answer: None,
                inferred: false,
            }),
        })
    }

    /// 取得（必要时构建）Wrapper 的某个辅助子节点
    pub(crate) fn ensure_aux(&mut self, wrapper: FillerId, kind: AuxKind) -> Result<FillerId, DialogError> {
        let w = self.wrapper_state(wrapper)?;
        let existing = match kind {
            AuxKind::Gate => w.gate,
            AuxKind::Confirm => w.confirm,
            AuxKind::Check => w.check,
            AuxKind::Recommend => w.recommend,
        };
        if let Some(id) = existing {
            return Ok(id);
        }
        let attribute = self.node(wrapper)?.attribute.clone();
        let id = match kind {
            AuxKind::Gate => self.alloc_decision(wrapper, &attribute, DecisionPurpose::Gate),
            AuxKind::Confirm => self.alloc_decision(wrapper, &attribute, DecisionPurpose::Confirm),
            AuxKind::Check => self.session.arena.alloc(Filler {
                parent: Some(wrapper),
                attribute,
                kind: FillerKind::Check(CheckState { passed: false }),
            }),
            AuxKind::Recommend => self.session.arena.alloc(Filler {
                parent: Some(wrapper),
                attribute,
                kind: FillerKind::Recommend(RecommendState {
                    page: 0,
                    offered: false,
                    chosen: false,
                    exhausted: false,
                }),
            }),
        };
        let w = self.wrapper_state_mut(wrapper)?;
        match kind {
            AuxKind::Gate => w.gate = Some(id),
            AuxKind::Confirm => w.confirm = Some(id),
            AuxKind::Check => w.check = Some(id),
            AuxKind::Recommend => w.recommend = Some(id),
        }
        Ok(id)
    }
}
