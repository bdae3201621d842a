//! 通道数据项, 拦截结果与下游消息.

use std::fmt;
use std::sync::Arc;

use tao_codec::Buffer;
use tao_core::{Caps, Segment, StreamType};
use tao_format::{Stream, StreamCollection};

/// 流结束事件的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EosKind {
    /// 上游真实的流结束
    Regular,
    /// 解析器端口移除时注入, 用于清空通道
    Custom,
    /// 全部通道排空后合成的最终流结束
    Final,
}

/// 在通道中流动的数据项 (事件或缓冲)
#[derive(Debug, Clone)]
pub enum LaneItem {
    /// 流开始; `flushing` 为真时仅用于重置通道状态
    StreamStart {
        stream: Arc<Stream>,
        flushing: bool,
    },
    Caps(Caps),
    Segment(Segment),
    Buffer(Buffer),
    Eos(EosKind),
    FlushStart,
    FlushStop,
}

impl LaneItem {
    pub fn stream_start(stream: Arc<Stream>) -> Self {
        Self::StreamStart {
            stream,
            flushing: false,
        }
    }

    pub fn eos() -> Self {
        Self::Eos(EosKind::Regular)
    }

    /// 粘性事件: 端口尚未接入通道时需要缓存并在接入后重放
    pub fn is_sticky(&self) -> bool {
        matches!(
            self,
            Self::StreamStart { .. } | Self::Caps(_) | Self::Segment(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::StreamStart { .. } => "stream-start",
            Self::Caps(_) => "caps",
            Self::Segment(_) => "segment",
            Self::Buffer(_) => "buffer",
            Self::Eos(_) => "eos",
            Self::FlushStart => "flush-start",
            Self::FlushStop => "flush-stop",
        }
    }
}

/// 拦截结果
#[derive(Debug, Clone)]
pub enum Disposition {
    /// 原样向下游传递
    Forward,
    /// 丢弃
    Drop,
    /// 替换为另一个数据项后传递
    Replace(LaneItem),
}

/// 通道出口上的查询
#[derive(Debug, Clone)]
pub enum OutletQuery {
    Caps,
    AcceptCaps(Caps),
}

/// 查询应答
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryAnswer {
    Caps(Caps),
    Accept(bool),
}

/// 数据投递结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// 已送达下游
    Ok,
    /// 通道没有绑定输出
    NotLinked,
    /// 被拦截丢弃
    Dropped,
    /// 通道已被移除
    Removed,
}

/// 对外暴露的输出端口
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExposedPad {
    name: Arc<str>,
    stream_type: StreamType,
}

impl ExposedPad {
    pub fn new(name: impl Into<Arc<str>>, stream_type: StreamType) -> Self {
        Self {
            name: name.into(),
            stream_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }
}

impl fmt::Display for ExposedPad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// 发往下游的通知消息
#[derive(Debug, Clone)]
pub enum Message {
    /// 合并后的流集合发生变化
    StreamCollection(Arc<StreamCollection>),
    /// 通道实际承载的流已覆盖整个合并集合
    ActiveCollection(Arc<StreamCollection>),
    /// 选择完成: 请求的流全部处于活动状态
    StreamsSelected {
        seqnum: Option<u32>,
        collection: Arc<StreamCollection>,
        streams: Vec<Arc<Stream>>,
    },
    /// 没有能处理该 caps 的解码器
    MissingDecoder { stream_id: Arc<str>, caps: Caps },
    /// 切换请求中包含未知的流 id
    UnknownStreams {
        seqnum: u32,
        stream_ids: Vec<Arc<str>>,
    },
    /// 所有输入都已排空
    AboutToFinish,
    /// 非致命警告
    Warning(String),
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StreamCollection(_) => "stream-collection",
            Self::ActiveCollection(_) => "active-collection",
            Self::StreamsSelected { .. } => "streams-selected",
            Self::MissingDecoder { .. } => "missing-decoder",
            Self::UnknownStreams { .. } => "unknown-streams",
            Self::AboutToFinish => "about-to-finish",
            Self::Warning(_) => "warning",
        }
    }
}
