//! 帧与槽位的静态定义
//!
//! 每个槽位携带一组策略（询问、门控、推荐、检查、确认、初始化），由 Wrapper 填充器在运行时按需展开。

use super::Condition;

/// 帧中被跳过的合成「结果」槽位：帧完成判定不看它，由 Wrapper 在确认之后单独推进
pub const RESULT_SLOT: &str = "result";

/// 帧的种类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// 主动追求的目标，完成后需要响应
    Intent,
    Frame,
    /// 和类型：运行时解析到具体实现之一
    Interface { variants: Vec<String> },
}

/// 槽位的结构类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotType {
    Entity(String),
    Frame(String),
    Interface(String),
    List {
        element: Box<SlotType>,
        min: usize,
        max: Option<usize>,
    },
}

impl SlotType {
    pub fn list(element: SlotType) -> Self {
        SlotType::List {
            element: Box::new(element),
            min: 1,
            max: None,
        }
    }

    pub fn bounded_list(element: SlotType, min: usize, max: Option<usize>) -> Self {
        SlotType::List {
            element: Box::new(element),
            min,
            max,
        }
    }

    /// 实体或列表元素的实体类型名
    pub fn entity_type(&self) -> Option<&str> {
        match self {
            SlotType::Entity(t) => Some(t),
            SlotType::List { element, .. } => element.entity_type(),
            _ => None,
        }
    }
}

/// 询问策略（每个槽位一个）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AskStrategy {
    AlwaysAsk,
    /// 只能被直接兼容的事件进入
    NeverAsk,
    ConditionalAsk(Condition),
    /// 只在显式恢复（重聚焦 / 清理）之后才会被询问
    RecoverOnly,
    /// 从不主动询问，只由外部投递的事件满足
    ExternalEvent,
    /// 先问是否要填写，否则跳过
    BoolGate { prompt: String },
}

/// 确认策略：显式（问 yes/no）或隐式（只告知）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub prompt: String,
    pub implicit: bool,
}

impl Confirmation {
    pub fn explicit(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            implicit: false,
        }
    }

    pub fn implicit(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            implicit: true,
        }
    }
}

/// 填写后的取值检查；失败时清理 cleanup 中的槽位（为空则清理自身）并重聚焦第一个
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueCheck {
    pub rule: Condition,
    pub message: String,
    pub cleanup: Vec<String>,
}

impl ValueCheck {
    pub fn new(rule: Condition, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
            cleanup: Vec::new(),
        }
    }

    pub fn cleanup<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cleanup = attributes.into_iter().map(Into::into).collect();
        self
    }
}

/// 分页推荐
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    /// 注册表中的候选源键
    pub source: String,
    pub page_size: Option<usize>,
    pub prompt: String,
    /// 只接受推荐过的值
    pub hard: bool,
}

impl Recommendation {
    pub fn new(source: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            page_size: None,
            prompt: prompt.into(),
            hard: false,
        }
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn hard(mut self) -> Self {
        self.hard = true;
        self
    }
}

/// 槽位初始化（状态更新）来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueInit {
    Const(String),
    /// 从全局单例帧读取
    Global { frame: String, attribute: String },
    /// 在已填写的帧中按实体类型查找
    Context,
}

/// 单个槽位定义
#[derive(Debug, Clone)]
pub struct SlotSpec {
    pub attribute: String,
    pub slot_type: SlotType,
    pub ask: AskStrategy,
    pub prompt: Option<String>,
    pub has_more_prompt: Option<String>,
    pub confirm: Option<Confirmation>,
    pub check: Option<ValueCheck>,
    pub recommend: Option<Recommendation>,
    pub init: Option<ValueInit>,
    pub on_done: Option<String>,
}

impl SlotSpec {
    pub fn new(attribute: impl Into<String>, slot_type: SlotType) -> Self {
        Self {
            attribute: attribute.into(),
            slot_type,
            ask: AskStrategy::AlwaysAsk,
            prompt: None,
            has_more_prompt: None,
            confirm: None,
            check: None,
            recommend: None,
            init: None,
            on_done: None,
        }
    }

    pub fn entity(attribute: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self::new(attribute, SlotType::Entity(entity_type.into()))
    }

    pub fn frame(attribute: impl Into<String>, frame_type: impl Into<String>) -> Self {
        Self::new(attribute, SlotType::Frame(frame_type.into()))
    }

    pub fn interface(attribute: impl Into<String>, interface_type: impl Into<String>) -> Self {
        Self::new(attribute, SlotType::Interface(interface_type.into()))
    }

    pub fn list(attribute: impl Into<String>, element: SlotType) -> Self {
        Self::new(attribute, SlotType::list(element))
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn ask(mut self, ask: AskStrategy) -> Self {
        self.ask = ask;
        self
    }

    pub fn has_more_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.has_more_prompt = Some(prompt.into());
        self
    }

    pub fn confirm(mut self, confirm: Confirmation) -> Self {
        self.confirm = Some(confirm);
        self
    }

    pub fn check(mut self, check: ValueCheck) -> Self {
        self.check = Some(check);
        self
    }

    pub fn recommend(mut self, recommend: Recommendation) -> Self {
        self.recommend = Some(recommend);
        self
    }

    pub fn init(mut self, init: ValueInit) -> Self {
        self.init = Some(init);
        self
    }

    pub fn on_done(mut self, template: impl Into<String>) -> Self {
        self.on_done = Some(template.into());
        self
    }

    /// 列表上下界（仅对 List 类型生效）
    pub fn bounds(mut self, min: usize, max: Option<usize>) -> Self {
        if let SlotType::List { min: lo, max: hi, .. } = &mut self.slot_type {
            *lo = min;
            *hi = max;
        }
        self
    }
}

/// 帧定义；注册表键为 `package.name`
#[derive(Debug, Clone)]
pub struct FrameSpec {
    pub package: String,
    pub name: String,
    pub kind: FrameKind,
    pub slots: Vec<SlotSpec>,
    /// 意图完成时的响应模板
    pub response: Option<String>,
    /// 需要外部触发事件才算完成
    pub external_trigger: bool,
    /// 完成后的值保存为全局单例
    pub singleton: bool,
    /// 接口类型解析时的提问
    pub type_prompt: Option<String>,
}

impl FrameSpec {
    fn with_kind(package: impl Into<String>, name: impl Into<String>, kind: FrameKind) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
            kind,
            slots: Vec::new(),
            response: None,
            external_trigger: false,
            singleton: false,
            type_prompt: None,
        }
    }

    pub fn intent(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_kind(package, name, FrameKind::Intent)
    }

    pub fn frame(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_kind(package, name, FrameKind::Frame)
    }

    pub fn interface<I, S>(package: impl Into<String>, name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let variants = variants.into_iter().map(Into::into).collect();
        Self::with_kind(package, name, FrameKind::Interface { variants })
    }

    pub fn slot(mut self, slot: SlotSpec) -> Self {
        self.slots.push(slot);
        self
    }

    pub fn response(mut self, template: impl Into<String>) -> Self {
        self.response = Some(template.into());
        self
    }

    pub fn externally_triggered(mut self) -> Self {
        self.external_trigger = true;
        self
    }

    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    pub fn type_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.type_prompt = Some(prompt.into());
        self
    }

    pub fn qualified(&self) -> String {
        if self.package.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.package, self.name)
        }
    }

    pub fn is_intent(&self) -> bool {
        matches!(self.kind, FrameKind::Intent)
    }

    pub fn variants(&self) -> &[String] {
        match &self.kind {
            FrameKind::Interface { variants } => variants,
            _ => &[],
        }
    }

    pub fn slot_spec(&self, attribute: &str) -> Option<&SlotSpec> {
        self.slots.iter().find(|s| s.attribute == attribute)
    }
}
