//! 通道 (lane).
//!
//! 通道是缓冲队列中一对入口/出口, 类型在创建时确定, 同一时刻只承载一条输入流.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tao_core::StreamType;
use tao_format::Stream;

use crate::input::InputStreamKey;
use crate::output::OutputId;

/// 通道标识, 单调递增, 不复用
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LaneId(pub u32);

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lane{}", self.0)
    }
}

/// 通道空闲时执行的一次性动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleAction {
    /// 解除与输出的绑定, 并尝试把输出转交给待激活的流
    Unassign,
    /// 重新评估输出绑定与解码器配置
    Reconfigure,
}

/// 通道
#[derive(Debug)]
pub struct Lane {
    pub id: LaneId,
    /// 创建后不再改变
    pub stream_type: StreamType,
    /// 当前接入的输入流
    pub input: Option<InputStreamKey>,
    /// 最近进入通道的流
    pub pending_stream: Option<Arc<Stream>>,
    /// 最近离开通道的流
    pub active_stream: Option<Arc<Stream>>,
    /// 切换前的活动流, 选择完成后清除
    pub old_stream: Option<Arc<Stream>>,
    /// 绑定的输出
    pub output: Option<OutputId>,
    /// 出口已见到流结束
    pub drained: bool,
    /// 出口串行化状态
    pub flow: Arc<LaneFlow>,
}

impl Lane {
    pub fn new(id: LaneId, stream_type: StreamType) -> Self {
        Self {
            id,
            stream_type,
            input: None,
            pending_stream: None,
            active_stream: None,
            old_stream: None,
            output: None,
            drained: false,
            flow: Arc::new(LaneFlow::default()),
        }
    }

    /// 活动流 (或尚未离开通道的待定流, 或切换前的旧流) 是否为该 id
    pub fn carries(&self, stream_id: &str) -> bool {
        let is = |s: &Option<Arc<Stream>>| s.as_ref().is_some_and(|s| &**s.id() == stream_id);
        is(&self.active_stream) || is(&self.pending_stream) || is(&self.old_stream)
    }

    pub fn active_id(&self) -> Option<&Arc<str>> {
        self.active_stream.as_ref().map(|s| s.id())
    }
}

#[derive(Debug, Default)]
struct FlowState {
    busy: bool,
    idle: VecDeque<IdleAction>,
}

/// 通道出口的串行化状态
///
/// 出口上的数据处理与空闲动作互斥执行: 数据流动期间提交的空闲动作排队,
/// 在当前数据处理完成后依次执行; 通道空闲时提交的动作立即在提交线程上执行.
#[derive(Debug, Default)]
pub struct LaneFlow {
    state: Mutex<FlowState>,
    idle_cond: Condvar,
}

impl LaneFlow {
    /// 数据进入出口, 等待正在执行的空闲动作结束
    pub fn enter(&self) {
        let mut state = self.state.lock();
        while state.busy {
            self.idle_cond.wait(&mut state);
        }
        state.busy = true;
    }

    /// 离开出口, 执行排队的空闲动作
    pub fn leave(&self, mut run: impl FnMut(IdleAction)) {
        loop {
            let next = {
                let mut state = self.state.lock();
                match state.idle.pop_front() {
                    Some(action) => action,
                    None => {
                        state.busy = false;
                        self.idle_cond.notify_all();
                        return;
                    }
                }
            };
            run(next);
        }
    }

    /// 提交空闲动作. 返回 true 表示调用方需要立即执行 (随后调用 `leave`)
    pub fn schedule(&self, action: IdleAction) -> bool {
        let mut state = self.state.lock();
        if state.busy {
            state.idle.push_back(action);
            false
        } else {
            state.busy = true;
            true
        }
    }
}
