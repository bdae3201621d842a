//! 选择策略.
//!
//! 路由层在关键步骤上询问策略对象, 默认实现给出标准行为.
//! 策略方法可能在持有选择锁时调用, 实现不能回调 `DecodeBin`.

use std::cmp::Ordering;
use std::sync::Arc;

use tao_codec::ElementFactory;
use tao_core::{Caps, StreamType};
use tao_format::{Stream, StreamCollection, compare_streams};

use crate::event::ExposedPad;
use crate::lane::LaneId;

/// 对单条流是否选中的意见
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamVerdict {
    /// 强制选中
    Select,
    /// 强制不选
    Skip,
    /// 交给默认规则
    NoOpinion,
}

/// 选择策略
pub trait SelectionPolicy: Send + Sync {
    /// 默认选择时对每条流的意见
    fn select_stream(&self, _collection: &StreamCollection, _stream: &Stream) -> StreamVerdict {
        StreamVerdict::NoOpinion
    }

    /// 合并集合的排序规则
    fn compare_streams(&self, a: &Stream, b: &Stream) -> Ordering {
        compare_streams(a, b)
    }

    /// 多输入合并后集合的上游标识
    fn merged_collection_id(&self) -> Option<String> {
        Some("decodebin".to_string())
    }

    /// 判断 caps 是否需要解码
    fn needs_decoder(&self, caps: &Caps, terminal_caps: &Caps) -> bool {
        !caps.can_intersect(terminal_caps)
    }

    /// 是否允许使用该工厂为流创建解码器
    fn allow_factory(&self, _stream: &Stream, _factory: &ElementFactory) -> bool {
        true
    }

    /// 新解码器 (或复用的解码器) 是否需要等待关键帧
    fn wait_for_keyframe(&self, stream_type: StreamType) -> bool {
        stream_type.contains(StreamType::VIDEO)
    }

    /// 输出端口名前缀
    fn pad_prefix(&self, stream_type: StreamType) -> &'static str {
        if stream_type.contains(StreamType::VIDEO) {
            "video"
        } else if stream_type.contains(StreamType::AUDIO) {
            "audio"
        } else if stream_type.contains(StreamType::TEXT) {
            "text"
        } else {
            "src"
        }
    }

    /// 合并集合更新
    fn on_collection(&self, _merged: &Arc<StreamCollection>) {}

    /// 选择完成
    fn on_selection_done(&self, _stream_ids: &[Arc<str>]) {}

    /// 收到切换请求
    fn on_stream_switch(&self, _stream_ids: &[Arc<str>], _seqnum: u32) {}

    /// 创建了新通道
    fn on_lane_created(&self, _lane: LaneId, _stream_type: StreamType) {}

    /// 输出端口首次暴露
    fn on_output_exposed(&self, _pad: &ExposedPad) {}

    /// 输出被销毁
    fn on_output_removed(&self, _pad: &ExposedPad) {}

    /// 没有可用的解码器
    fn on_missing_decoder(&self, _stream: &Stream, _caps: &Caps) {}

    /// 出现无法识别类型的流
    fn on_unknown_type(&self, _stream: &Stream) {}

    /// 所有输入都已排空
    fn on_about_to_finish(&self) {}
}

/// 默认策略
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPolicy;

impl SelectionPolicy for DefaultPolicy {}
