//! 回合引擎
//!
//! - **scheduler**: 显式状态栈（INIT / ASK / POST_ASK / RESCHEDULE / RESPOND / RECOVER）
//! - **kernel**: 单步决策，每次至多返回一个 Action
//! - **refocus**: 输入与焦点不匹配时在活跃路径上寻找可进入的槽位
//! - **turn**: 回合循环，驱动 kernel step 到静止，带迭代预算

mod kernel;
mod refocus;
pub mod scheduler;
mod turn;

pub use refocus::{RefocusMode, RefocusPlan};
pub use scheduler::{Scheduler, SchedulerState};

use std::sync::Arc;

use crate::config::DialogSection;
use crate::core::DialogError;
use crate::filler::{Filler, FillerId, WrapperState};
use crate::schema::{Registry, SlotSpec};
use crate::session::Session;

/// 显式上下文：注册表 + 对话配置，启动时构建一次，所有会话共享只读
#[derive(Debug, Clone)]
pub struct DialogContext {
    pub registry: Arc<Registry>,
    pub settings: DialogSection,
}

impl DialogContext {
    pub fn new(registry: Arc<Registry>, settings: DialogSection) -> Self {
        Self { registry, settings }
    }

    /// 绑定一个会话，得到可执行回合的句柄
    pub fn dialog<'a>(&'a self, session: &'a mut Session) -> Dialog<'a> {
        Dialog { session, ctx: self }
    }
}

/// 单个会话上的引擎视图；填充器行为、kernel 与 Action 都实现在它上面
pub struct Dialog<'a> {
    pub session: &'a mut Session,
    pub ctx: &'a DialogContext,
}

impl<'a> Dialog<'a> {
    /// 注册表引用与会话借用无关，可以在修改会话时继续持有
    pub fn registry(&self) -> &'a Registry {
        let ctx: &'a DialogContext = self.ctx;
        &ctx.registry
    }

    pub fn settings(&self) -> &'a DialogSection {
        let ctx: &'a DialogContext = self.ctx;
        &ctx.settings
    }

    pub(crate) fn node(&self, id: FillerId) -> Result<&Filler, DialogError> {
        self.session.arena.get(id).ok_or_else(|| dangling(id))
    }

    pub(crate) fn node_mut(&mut self, id: FillerId) -> Result<&mut Filler, DialogError> {
        self.session.arena.get_mut(id).ok_or_else(|| dangling(id))
    }

    pub(crate) fn wrapper_state(&self, id: FillerId) -> Result<&WrapperState, DialogError> {
        self.session.arena.wrapper(id).ok_or_else(|| dangling(id))
    }

    pub(crate) fn wrapper_state_mut(&mut self, id: FillerId) -> Result<&mut WrapperState, DialogError> {
        self.session.arena.wrapper_mut(id).ok_or_else(|| dangling(id))
    }

    /// Wrapper 对应的槽位定义；意图根没有
    pub(crate) fn slot_spec(&self, wrapper: FillerId) -> Result<Option<&'a SlotSpec>, DialogError> {
        let w = self.wrapper_state(wrapper)?;
        Ok(self.registry().slot(&w.slot.frame_type, &w.slot.attribute))
    }

    pub fn state(&self) -> SchedulerState {
        self.session.current().state
    }

    pub(crate) fn set_state(&mut self, state: SchedulerState) {
        let cur = self.session.current_mut();
        if cur.state != state {
            tracing::debug!("Scheduler {:?} -> {:?}", cur.state, state);
            cur.state = state;
        }
    }

    pub(crate) fn top(&self) -> Option<FillerId> {
        self.session.current().top()
    }
}

pub(crate) fn dangling(id: FillerId) -> DialogError {
    DialogError::InvariantViolation(format!("dangling filler handle {id}"))
}
