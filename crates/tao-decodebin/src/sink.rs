//! 与外部协作方之间的接口: 下游输出与缓冲队列.

use tao_core::{StreamType, TaoResult};

use crate::event::{ExposedPad, LaneItem, Message};
use crate::lane::LaneId;

/// 下游输出
///
/// 所有回调都在未持有内部锁的情况下调用, 实现可以阻塞.
pub trait OutputSink: Send + Sync {
    /// 输出端口首次暴露
    fn pad_added(&self, pad: &ExposedPad);

    /// 输出端口被移除
    fn pad_removed(&self, pad: &ExposedPad);

    /// 向输出端口推送数据
    fn push(&self, pad: &ExposedPad, item: LaneItem);

    /// 发布通知消息
    fn post(&self, message: Message);
}

/// 缓冲队列 (每条通道一个 FIFO)
///
/// 出口侧的数据由实现方的线程交给 `DecodeBin::lane_outlet`.
/// `push` 不能在调用线程上同步回调 `lane_outlet`.
pub trait BufferingStage: Send + Sync {
    /// 创建一条通道
    fn create_lane(&self, lane: LaneId, stream_type: StreamType) -> TaoResult<()>;

    /// 向通道入口推送数据
    fn push(&self, lane: LaneId, item: LaneItem);

    /// 释放通道
    fn release_lane(&self, lane: LaneId);
}
