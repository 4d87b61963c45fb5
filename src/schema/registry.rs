//! 帧注册表
//!
//! 按稳定字符串键注册 FrameSpec / EntitySpec / 具名谓词 / 推荐候选源，启动时构建一次，之后只读共享（Arc）。
//! 「按名构造」变成一次安全查表。

use std::collections::HashMap;
use std::sync::Arc;

use super::condition::SlotValues;
use super::spec::{FrameKind, FrameSpec, SlotSpec, SlotType};
use super::system;
use super::validator::{EntitySpec, Validator};
use crate::core::DialogError;
use crate::event::FrameEvent;

/// 具名谓词（ConditionalAsk / ValueCheck 使用）
pub type Predicate = Arc<dyn Fn(&SlotValues) -> bool + Send + Sync>;

/// 推荐候选查询上下文
#[derive(Debug, Clone, Copy)]
pub struct CandidateQuery<'a> {
    pub frame_type: &'a str,
    pub attribute: &'a str,
    /// 所属帧当前已填写的值
    pub values: &'a SlotValues,
}

/// 推荐候选源：返回全部候选，分页由引擎负责
pub trait CandidateSource: Send + Sync {
    fn candidates(&self, query: &CandidateQuery<'_>) -> Vec<String>;
}

impl<F> CandidateSource for F
where
    F: Fn(&CandidateQuery<'_>) -> Vec<String> + Send + Sync,
{
    fn candidates(&self, query: &CandidateQuery<'_>) -> Vec<String> {
        self(query)
    }
}

/// 固定候选列表
#[derive(Debug, Clone, Default)]
pub struct StaticCandidates(pub Vec<String>);

impl CandidateSource for StaticCandidates {
    fn candidates(&self, _query: &CandidateQuery<'_>) -> Vec<String> {
        self.0.clone()
    }
}

/// 注册表：frame / entity / predicate / candidate source 四类按名存储
#[derive(Default)]
pub struct Registry {
    frames: HashMap<String, FrameSpec>,
    entities: HashMap<String, EntitySpec>,
    predicates: HashMap<String, Predicate>,
    sources: HashMap<String, Arc<dyn CandidateSource>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("frames", &self.frame_names())
            .field("entities", &self.entities.len())
            .field("predicates", &self.predicates.len())
            .field("sources", &self.sources.len())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预注册 bee.Yes / bee.No / bee.NextPage / bee.AbortIntent
    pub fn with_system_frames() -> Self {
        let mut reg = Self::new();
        reg.register_frame(FrameSpec::frame(system::PACKAGE, "Yes"));
        reg.register_frame(FrameSpec::frame(system::PACKAGE, "No"));
        reg.register_frame(FrameSpec::frame(system::PACKAGE, "NextPage"));
        reg.register_frame(
            FrameSpec::intent(system::PACKAGE, "AbortIntent").slot(
                SlotSpec::entity(system::ABORT_TARGET, "bee.IntentName")
                    .ask(super::AskStrategy::NeverAsk),
            ),
        );
        reg.register_entity(EntitySpec::new("bee.IntentName", Validator::Any));
        reg.register_entity(EntitySpec::new(system::TYPE_NAME, Validator::Any));
        reg
    }

    pub fn register_frame(&mut self, spec: FrameSpec) {
        self.frames.insert(spec.qualified(), spec);
    }

    pub fn register_entity(&mut self, spec: EntitySpec) {
        self.entities.insert(spec.name.clone(), spec);
    }

    pub fn register_predicate<F>(&mut self, key: impl Into<String>, predicate: F)
    where
        F: Fn(&SlotValues) -> bool + Send + Sync + 'static,
    {
        self.predicates.insert(key.into(), Arc::new(predicate));
    }

    pub fn register_source(&mut self, key: impl Into<String>, source: impl CandidateSource + 'static) {
        self.sources.insert(key.into(), Arc::new(source));
    }

    pub fn frame(&self, key: &str) -> Option<&FrameSpec> {
        self.frames.get(key)
    }

    /// 查找帧定义，缺失视为构建失败
    pub fn require_frame(&self, key: &str) -> Result<&FrameSpec, DialogError> {
        self.frames
            .get(key)
            .ok_or_else(|| DialogError::UnknownFrame(key.to_string()))
    }

    pub fn entity(&self, key: &str) -> Option<&EntitySpec> {
        self.entities.get(key)
    }

    pub fn predicate(&self, key: &str) -> Option<&Predicate> {
        self.predicates.get(key)
    }

    pub fn source(&self, key: &str) -> Option<Arc<dyn CandidateSource>> {
        self.sources.get(key).cloned()
    }

    pub fn slot(&self, frame_type: &str, attribute: &str) -> Option<&SlotSpec> {
        self.frames.get(frame_type)?.slot_spec(attribute)
    }

    /// 按事件类型查找帧定义：先精确匹配限定名，再按简单名唯一匹配
    pub fn find_by_event(&self, event: &FrameEvent) -> Option<&FrameSpec> {
        if let Some(spec) = self.frames.get(&event.qualified_type()) {
            return Some(spec);
        }
        let mut hits = self.frames.values().filter(|s| event.matches_type(&s.qualified()));
        let first = hits.next()?;
        if hits.next().is_some() {
            tracing::warn!("Ambiguous frame type '{}'", event.type_name);
            return None;
        }
        Some(first)
    }

    /// 实现了某接口的具体帧类型
    pub fn variants_of(&self, interface: &str) -> Vec<String> {
        self.frames
            .get(interface)
            .map(|s| s.variants().to_vec())
            .unwrap_or_default()
    }

    pub fn frame_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.frames.keys().cloned().collect();
        names.sort();
        names
    }

    /// 启动时校验：所有槽位引用的帧类型都已注册，接口实现都存在
    pub fn validate(&self) -> Result<(), DialogError> {
        for spec in self.frames.values() {
            for slot in &spec.slots {
                self.validate_type(&spec.qualified(), &slot.attribute, &slot.slot_type)?;
            }
            if let FrameKind::Interface { variants } = &spec.kind {
                for v in variants {
                    if !self.frames.contains_key(v) {
                        return Err(DialogError::Construction(format!(
                            "{} lists unknown variant {}",
                            spec.qualified(),
                            v
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_type(&self, owner: &str, attribute: &str, slot_type: &SlotType) -> Result<(), DialogError> {
        match slot_type {
            SlotType::Entity(_) => Ok(()),
            SlotType::Frame(t) | SlotType::Interface(t) => {
                if self.frames.contains_key(t) {
                    Ok(())
                } else {
                    Err(DialogError::Construction(format!(
                        "{owner}.{attribute} refers to unknown frame {t}"
                    )))
                }
            }
            SlotType::List { element, .. } => self.validate_type(owner, attribute, element),
        }
    }
}
