//! Bee Frames - 帧式对话管理引擎
//!
//! 把结构化理解结果（帧事件）驱动成多轮对话：填槽、澄清、确认、推荐、取值检查与重聚焦。
//!
//! 模块划分：
//! - **action**: 可执行的 Action 与对话行为（DialogAct）、结构化日志
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与恢复引擎
//! - **engine**: Scheduler 状态机、kernel step、重聚焦、回合循环
//! - **event**: 帧事件与会话内事件日志
//! - **filler**: 填充树（实体 / 帧 / 接口 / 列表 / Wrapper 与辅助节点）
//! - **nlu**: 文本到帧事件的转换边界
//! - **observability**: 日志初始化
//! - **schema**: 帧定义、校验器、条件与注册表
//! - **service**: 按用户处理输入的对话服务
//! - **session**: 会话状态与存储

pub mod action;
pub mod config;
pub mod core;
pub mod engine;
pub mod event;
pub mod filler;
pub mod nlu;
pub mod observability;
pub mod schema;
pub mod service;
pub mod session;

pub use engine::{Dialog, DialogContext, SchedulerState};
pub use service::{DialogService, TurnOutput};
pub use session::Session;
