//! 延迟执行的副作用.
//!
//! 持锁期间的决策只记录副作用, 释放锁之后再统一执行, 保证不会在持锁时
//! 调用下游, 缓冲队列或销毁线程.

use std::sync::Arc;

use tao_core::StreamType;

use crate::event::{ExposedPad, LaneItem, Message};
use crate::input::ParserHandle;
use crate::lane::{IdleAction, LaneId};
use crate::output::DecoderHandle;

#[derive(Debug)]
pub(crate) enum Effect {
    /// 发布消息
    Post(Message),
    /// 暴露输出端口
    PadAdded(ExposedPad),
    /// 移除输出端口
    PadRemoved(ExposedPad),
    /// 直接向输出端口推送数据 (重新接入后补发粘性事件)
    Deliver(ExposedPad, LaneItem),
    /// 通道空闲时执行动作
    Idle(LaneId, IdleAction),
    /// 在缓冲队列中创建通道
    CreateLane(LaneId, StreamType),
    /// 向通道入口推送数据
    Intake(LaneId, LaneItem),
    /// 后台释放通道
    ReleaseLane(LaneId),
    /// 后台停止解码器
    StopDecoder(String, DecoderHandle),
    /// 后台停止解析器
    ShutdownParser(ParserHandle),
    /// 把未知的流 id 转交给上游解析器
    Upstream { stream_ids: Vec<Arc<str>>, seqnum: u32 },
}

/// 副作用列表, 按记录顺序执行
#[derive(Debug, Default)]
pub(crate) struct Effects(Vec<Effect>);

impl Effects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, effect: Effect) {
        self.0.push(effect);
    }

    pub fn post(&mut self, message: Message) {
        self.0.push(Effect::Post(message));
    }

    pub fn idle(&mut self, lane: LaneId, action: IdleAction) {
        self.0.push(Effect::Idle(lane, action));
    }

    pub fn intake(&mut self, lane: LaneId, item: LaneItem) {
        self.0.push(Effect::Intake(lane, item));
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn take(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.0)
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Effect> {
        self.0.iter()
    }
}
