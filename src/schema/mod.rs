//! 静态帧定义：帧 / 槽位 / 策略 schema 与注册表
//!
//! - **spec**: FrameSpec、SlotSpec、AskStrategy 等静态策略
//! - **condition**: ConditionalAsk 与取值检查用的条件
//! - **validator**: 实体类型与取值校验
//! - **registry**: 按稳定字符串键构造的注册表（替代反射）

pub mod condition;
pub mod registry;
pub mod spec;
pub mod validator;

pub use condition::{Condition, SlotValues};
pub use registry::{CandidateQuery, CandidateSource, Predicate, Registry, StaticCandidates};
pub use spec::{
    AskStrategy, Confirmation, FrameKind, FrameSpec, Recommendation, SlotSpec, SlotType, ValueCheck,
    ValueInit, RESULT_SLOT,
};
pub use validator::{EntitySpec, Validator};

/// 系统内置帧类型
pub mod system {
    pub const PACKAGE: &str = "bee";
    pub const YES: &str = "bee.Yes";
    pub const NO: &str = "bee.No";
    pub const NEXT_PAGE: &str = "bee.NextPage";
    pub const ABORT_INTENT: &str = "bee.AbortIntent";
    /// AbortIntent 的可选目标槽位
    pub const ABORT_TARGET: &str = "intentType";
    /// 接口类型解析用的实体类型与属性名
    pub const TYPE_NAME: &str = "bee.TypeName";
    pub const TYPE_ATTRIBUTE: &str = "__type";
}
