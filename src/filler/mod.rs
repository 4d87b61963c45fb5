//! 填充器层级：帧形状的运行时镜像
//!
//! 四种结构（entity / frame / interface / list）各自跟踪填写进度，每个槽位外面再包一层 Wrapper，
//! 负责门控、推荐、检查、确认与初始化。所有节点放在会话内的 FillerArena 中，以 FillerId 句柄引用；
//! 父指针是不拥有所有权的句柄，删除子树后旧句柄查找只会得到 None，不会悬空。
//!
//! 行为（done / grow / commit / clear / 兼容性）实现在 `Dialog` 上，分散在各子模块：
//! - **build**: 按 schema 构建子树
//! - **entity** / **frame** / **interface** / **list**: 结构节点
//! - **wrapper**: 横切策略装饰器
//! - **auxiliary**: 决策（gate / confirm / has-more）、检查、推荐等辅助子节点

mod auxiliary;
mod build;
mod entity;
mod frame;
mod interface;
mod list;
mod wrapper;

pub use auxiliary::CommitOutcome;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::DialogError;
use crate::engine::Dialog;
use crate::event::{EventRef, EventScope};

/// 填充器句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FillerId(pub usize);

impl std::fmt::Display for FillerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 槽位在 schema 中的位置：所属帧类型 + 属性
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotKey {
    pub frame_type: String,
    pub attribute: String,
}

impl SlotKey {
    pub fn new(frame_type: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            frame_type: frame_type.into(),
            attribute: attribute.into(),
        }
    }
}

/// Wrapper 的角色：意图根、帧槽位、列表元素
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WrapperRole {
    Root,
    Slot,
    Element,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrapperState {
    pub role: WrapperRole,
    /// Root 时 frame_type 为意图类型、attribute 为空
    pub slot: SlotKey,
    pub target: FillerId,
    pub gate: Option<FillerId>,
    pub recommend: Option<FillerId>,
    pub check: Option<FillerId>,
    pub confirm: Option<FillerId>,
    pub init_applied: bool,
    pub implicit_confirmed: bool,
    pub responded: bool,
    /// 门控被拒绝
    pub skipped: bool,
    /// 被显式恢复（重聚焦 / 清理）过，RecoverOnly 槽位因此可进入
    pub recover_enabled: bool,
    /// 祖先提前终止：视为已填写，但检查 / 确认仍会执行
    pub forced_filled: bool,
    /// 无条件完成（中止）
    pub closed: bool,
    pub done_notified: bool,
}

impl WrapperState {
    pub fn new(role: WrapperRole, slot: SlotKey, target: FillerId) -> Self {
        Self {
            role,
            slot,
            target,
            gate: None,
            recommend: None,
            check: None,
            confirm: None,
            init_applied: false,
            implicit_confirmed: false,
            responded: false,
            skipped: false,
            recover_enabled: false,
            forced_filled: false,
            closed: false,
            done_notified: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_type: String,
    pub value: Option<String>,
    pub dont_care: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameState {
    pub frame_type: String,
    /// 槽位 Wrapper，按声明顺序
    pub slots: Vec<FillerId>,
    pub triggered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceState {
    pub interface_type: String,
    /// 解析具体类型的实体子节点
    pub real_type: FillerId,
    pub variant: Option<FillerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListState {
    /// 元素 Wrapper，按加入顺序
    pub items: Vec<FillerId>,
    pub has_more: FillerId,
    pub min: usize,
    pub max: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionPurpose {
    Gate,
    Confirm,
    HasMore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionState {
    pub purpose: DecisionPurpose,
    pub answer: Option<bool>,
    /// 由其它输入推断得出，而非用户明确回答
    pub inferred: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckState {
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendState {
    pub page: usize,
    pub offered: bool,
    pub chosen: bool,
    pub exhausted: bool,
}

/// 封闭的节点种类
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FillerKind {
    Wrapper(WrapperState),
    Entity(EntityState),
    Frame(FrameState),
    Interface(InterfaceState),
    List(ListState),
    Decision(DecisionState),
    Check(CheckState),
    Recommend(RecommendState),
}

impl FillerKind {
    pub fn label(&self) -> &'static str {
        match self {
            FillerKind::Wrapper(_) => "wrapper",
            FillerKind::Entity(_) => "entity",
            FillerKind::Frame(_) => "frame",
            FillerKind::Interface(_) => "interface",
            FillerKind::List(_) => "list",
            FillerKind::Decision(_) => "decision",
            FillerKind::Check(_) => "check",
            FillerKind::Recommend(_) => "recommend",
        }
    }
}

/// 单个节点：父句柄 + 属性名 + 状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filler {
    pub parent: Option<FillerId>,
    pub attribute: String,
    pub kind: FillerKind,
}

/// 填充器 arena；句柄只增不复用，删除的节点直接移出，不留空位
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FillerArena {
    nodes: BTreeMap<usize, Filler>,
    next: usize,
}

impl FillerArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预留句柄，子节点可先以它为父构建
    pub fn reserve(&mut self) -> FillerId {
        let id = FillerId(self.next);
        self.next += 1;
        id
    }

    /// 只接受已预留的句柄
    pub fn place(&mut self, id: FillerId, filler: Filler) {
        if id.0 < self.next {
            self.nodes.insert(id.0, filler);
        }
    }

    pub fn alloc(&mut self, filler: Filler) -> FillerId {
        let id = self.reserve();
        self.nodes.insert(id.0, filler);
        id
    }

    /// 下一个将要分配的句柄，配合 `discard_from` 回滚一次失败的构建
    pub fn mark(&self) -> FillerId {
        FillerId(self.next)
    }

    /// 丢弃 mark 之后分配的全部节点
    pub fn discard_from(&mut self, mark: FillerId) {
        let dropped = self.nodes.split_off(&mark.0);
        if !dropped.is_empty() {
            tracing::debug!("Discarded {} fillers from {}", dropped.len(), mark);
        }
    }

    pub fn get(&self, id: FillerId) -> Option<&Filler> {
        self.nodes.get(&id.0)
    }

    pub fn get_mut(&mut self, id: FillerId) -> Option<&mut Filler> {
        self.nodes.get_mut(&id.0)
    }

    pub fn contains(&self, id: FillerId) -> bool {
        self.nodes.contains_key(&id.0)
    }

    pub fn live_count(&self) -> usize {
        self.nodes.len()
    }

    /// 清空节点；句柄计数保留，旧句柄不会指向新节点
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// 直接子节点（所有权意义上）
    pub fn children(&self, id: FillerId) -> Vec<FillerId> {
        let Some(node) = self.get(id) else {
            return Vec::new();
        };
        match &node.kind {
            FillerKind::Wrapper(w) => [Some(w.target), w.gate, w.recommend, w.check, w.confirm]
                .into_iter()
                .flatten()
                .collect(),
            FillerKind::Frame(f) => f.slots.clone(),
            FillerKind::Interface(i) => std::iter::once(i.real_type).chain(i.variant).collect(),
            FillerKind::List(l) => l.items.iter().copied().chain(std::iter::once(l.has_more)).collect(),
            FillerKind::Entity(_) | FillerKind::Decision(_) | FillerKind::Check(_) | FillerKind::Recommend(_) => {
                Vec::new()
            }
        }
    }

    /// 删除整棵子树
    pub fn remove_tree(&mut self, id: FillerId) {
        for child in self.children(id) {
            self.remove_tree(child);
        }
        self.nodes.remove(&id.0);
    }

    /// 所有存活句柄（创建顺序）
    pub fn ids(&self) -> impl Iterator<Item = FillerId> + '_ {
        self.nodes.keys().map(|i| FillerId(*i))
    }

    /// 最近的 Frame / Interface 祖先（不含自身）
    pub fn owner(&self, id: FillerId) -> Option<FillerId> {
        let mut cur = self.get(id)?.parent;
        while let Some(p) = cur {
            let node = self.get(p)?;
            if matches!(node.kind, FillerKind::Frame(_) | FillerKind::Interface(_)) {
                return Some(p);
            }
            cur = node.parent;
        }
        None
    }

    /// 最近的 Frame 祖先（不含自身）
    pub fn owning_frame(&self, id: FillerId) -> Option<FillerId> {
        let mut cur = self.get(id)?.parent;
        while let Some(p) = cur {
            let node = self.get(p)?;
            if matches!(node.kind, FillerKind::Frame(_)) {
                return Some(p);
            }
            cur = node.parent;
        }
        None
    }

    /// 最近的 Wrapper 祖先（不含自身）
    pub fn parent_wrapper(&self, id: FillerId) -> Option<FillerId> {
        let mut cur = self.get(id)?.parent;
        while let Some(p) = cur {
            let node = self.get(p)?;
            if matches!(node.kind, FillerKind::Wrapper(_)) {
                return Some(p);
            }
            cur = node.parent;
        }
        None
    }

    /// 从根到 id 的祖先链（含 id）
    pub fn lineage(&self, id: FillerId) -> Vec<FillerId> {
        let mut chain = vec![id];
        let mut cur = self.get(id).and_then(|n| n.parent);
        while let Some(p) = cur {
            chain.push(p);
            cur = self.get(p).and_then(|n| n.parent);
        }
        chain.reverse();
        chain
    }

    pub fn wrapper(&self, id: FillerId) -> Option<&WrapperState> {
        match &self.get(id)?.kind {
            FillerKind::Wrapper(w) => Some(w),
            _ => None,
        }
    }

    pub fn wrapper_mut(&mut self, id: FillerId) -> Option<&mut WrapperState> {
        match &mut self.get_mut(id)?.kind {
            FillerKind::Wrapper(w) => Some(w),
            _ => None,
        }
    }

    pub fn entity(&self, id: FillerId) -> Option<&EntityState> {
        match &self.get(id)?.kind {
            FillerKind::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn entity_mut(&mut self, id: FillerId) -> Option<&mut EntityState> {
        match &mut self.get_mut(id)?.kind {
            FillerKind::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn frame(&self, id: FillerId) -> Option<&FrameState> {
        match &self.get(id)?.kind {
            FillerKind::Frame(f) => Some(f),
            _ => None,
        }
    }

    pub fn frame_mut(&mut self, id: FillerId) -> Option<&mut FrameState> {
        match &mut self.get_mut(id)?.kind {
            FillerKind::Frame(f) => Some(f),
            _ => None,
        }
    }

    pub fn list(&self, id: FillerId) -> Option<&ListState> {
        match &self.get(id)?.kind {
            FillerKind::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn list_mut(&mut self, id: FillerId) -> Option<&mut ListState> {
        match &mut self.get_mut(id)?.kind {
            FillerKind::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn decision_mut(&mut self, id: FillerId) -> Option<&mut DecisionState> {
        match &mut self.get_mut(id)?.kind {
            FillerKind::Decision(d) => Some(d),
            _ => None,
        }
    }

    pub fn recommend_mut(&mut self, id: FillerId) -> Option<&mut RecommendState> {
        match &mut self.get_mut(id)?.kind {
            FillerKind::Recommend(r) => Some(r),
            _ => None,
        }
    }

    pub fn check_mut(&mut self, id: FillerId) -> Option<&mut CheckState> {
        match &mut self.get_mut(id)?.kind {
            FillerKind::Check(c) => Some(c),
            _ => None,
        }
    }

    /// Frame 中按属性找槽位 Wrapper
    pub fn slot_of(&self, frame: FillerId, attribute: &str) -> Option<FillerId> {
        self.frame(frame)?
            .slots
            .iter()
            .copied()
            .find(|w| self.get(*w).is_some_and(|n| n.attribute == attribute))
    }
}

/// 栈顶节点的下一步：压入子节点，或报告它需要什么
#[derive(Debug, Clone, PartialEq)]
pub enum Grow {
    Push(FillerId),
    /// 需要向用户询问
    Ask,
    /// 当前就能消费一个事件
    Commit(Fill),
    /// Wrapper 有待执行的初始化
    Update(FillerId),
    RunCheck(FillerId),
    ImplicitConfirm(FillerId),
    Respond(FillerId),
    /// 列表已满，但仍有匹配元素的事件
    Overflow { list: FillerId, event: EventRef },
    /// 等待外部输入
    Blocked,
}

/// 提交来源：真实事件，或由其它输入推断出的是 / 否
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fill {
    Event(EventRef),
    Infer(bool),
}

/// 按节点种类分派的填充器行为
impl<'a> Dialog<'a> {
    /// done 在显式 clear 之前单调
    pub fn is_done(&self, id: FillerId) -> Result<bool, DialogError> {
        match &self.node(id)?.kind {
            FillerKind::Wrapper(_) => self.is_wrapper_done(id),
            FillerKind::Entity(e) => Ok(e.value.is_some() || e.dont_care),
            FillerKind::Frame(_) => self.is_frame_done(id),
            FillerKind::Interface(_) => self.is_interface_done(id),
            FillerKind::List(_) => self.is_list_done(id),
            FillerKind::Decision(d) => Ok(d.answer.is_some()),
            FillerKind::Check(c) => Ok(c.passed),
            FillerKind::Recommend(r) => Ok(r.chosen || r.exhausted),
        }
    }

    /// 栈顶未完成时的下一步
    pub(crate) fn grow(&mut self, id: FillerId) -> Result<Grow, DialogError> {
        match &self.node(id)?.kind {
            FillerKind::Wrapper(_) => self.grow_wrapper(id),
            FillerKind::Frame(_) => self.grow_frame(id),
            FillerKind::Interface(_) => self.grow_interface(id),
            FillerKind::List(_) => self.grow_list(id),
            FillerKind::Check(_) => Ok(Grow::RunCheck(id)),
            FillerKind::Entity(_) | FillerKind::Decision(_) | FillerKind::Recommend(_) => self.grow_leaf(id),
        }
    }

    /// 节点此刻能直接消费的输入
    pub(crate) fn find_fill(&self, id: FillerId, scope: EventScope) -> Result<Option<Fill>, DialogError> {
        match &self.node(id)?.kind {
            FillerKind::Entity(_) => self.entity_fill(id, scope),
            FillerKind::Decision(_) => self.decision_fill(id, scope),
            FillerKind::Recommend(_) => self.recommend_fill(id, scope),
            FillerKind::Frame(_) => self.frame_fill(id, scope),
            FillerKind::Wrapper(_) => Ok(self.dont_care_event(id, scope)?.map(Fill::Event)),
            FillerKind::Interface(_) | FillerKind::List(_) | FillerKind::Check(_) => Ok(None),
        }
    }

    /// 消费输入；事件在此处被标记为已使用
    pub(crate) fn commit(&mut self, id: FillerId, fill: &Fill) -> Result<CommitOutcome, DialogError> {
        let kind = self.node(id)?.kind.label();
        match (&self.node(id)?.kind, fill) {
            (FillerKind::Decision(_), _) => self.commit_decision(id, fill),
            (FillerKind::Entity(_), Fill::Event(e)) => self.commit_entity(id, e),
            (FillerKind::Recommend(_), Fill::Event(e)) => self.commit_recommend(id, e),
            (FillerKind::Frame(_), Fill::Event(e)) => self.commit_frame(id, e),
            (FillerKind::Wrapper(_), Fill::Event(e)) => self.commit_wrapper(id, e),
            _ => Err(DialogError::InvariantViolation(format!(
                "cannot commit {fill:?} into {kind} {id}"
            ))),
        }
    }

    /// 重置为初始状态；幂等
    pub fn clear(&mut self, id: FillerId) -> Result<(), DialogError> {
        match &self.node(id)?.kind {
            FillerKind::Wrapper(_) => self.clear_wrapper(id)?,
            FillerKind::Entity(_) => self.clear_entity(id)?,
            FillerKind::Frame(_) => self.clear_frame(id)?,
            FillerKind::Interface(_) => self.clear_interface(id)?,
            FillerKind::List(_) => self.clear_list(id)?,
            FillerKind::Decision(_) | FillerKind::Check(_) | FillerKind::Recommend(_) => self.clear_aux(id)?,
        }
        self.session.prune_dead();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(parent: Option<FillerId>, attr: &str) -> Filler {
        Filler {
            parent,
            attribute: attr.to_string(),
            kind: FillerKind::Entity(EntityState {
                entity_type: "demo.Name".to_string(),
                value: None,
                dont_care: false,
            }),
        }
    }

    #[test]
    fn test_reserve_and_remove_tree() {
        let mut arena = FillerArena::new();
        let w = arena.reserve();
        let e = arena.alloc(entity(Some(w), "name"));
        arena.place(
            w,
            Filler {
                parent: None,
                attribute: "name".to_string(),
                kind: FillerKind::Wrapper(WrapperState::new(
                    WrapperRole::Slot,
                    SlotKey::new("demo.Person", "name"),
                    e,
                )),
            },
        );
        assert_eq!(arena.children(w), vec![e]);
        assert_eq!(arena.lineage(e), vec![w, e]);
        assert_eq!(arena.parent_wrapper(e), Some(w));
        arena.remove_tree(w);
        assert!(!arena.contains(e));
        assert_eq!(arena.live_count(), 0);
        // 句柄不复用
        assert_eq!(arena.reserve(), FillerId(2));
    }

    #[test]
    fn test_removed_nodes_leave_nothing_behind() {
        let mut arena = FillerArena::new();
        let a = arena.alloc(entity(None, "a"));
        let b = arena.alloc(entity(None, "b"));
        arena.remove_tree(a);
        assert_eq!(arena.ids().collect::<Vec<_>>(), vec![b]);

        let json = serde_json::to_string(&arena).unwrap();
        assert!(!json.contains("null"), "{json}");
        let back: FillerArena = serde_json::from_str(&json).unwrap();
        assert_eq!(back, arena);
        assert_eq!(back.clone().reserve(), FillerId(2));
    }

    #[test]
    fn test_discard_from_rolls_back_partial_build() {
        let mut arena = FillerArena::new();
        let kept = arena.alloc(entity(None, "kept"));
        let mark = arena.mark();
        let w = arena.reserve();
        arena.alloc(entity(Some(w), "half"));
        arena.discard_from(mark);
        assert_eq!(arena.ids().collect::<Vec<_>>(), vec![kept]);
        assert!(!arena.contains(w));
        // 回滚不回收句柄
        assert_eq!(arena.reserve(), FillerId(3));
    }
}
