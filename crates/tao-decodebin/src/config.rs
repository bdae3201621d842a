//! 解码路由配置.

use serde::{Deserialize, Serialize};
use tao_codec::Buffer;
use tao_core::{Caps, ClockTime, TaoError, TaoResult};

/// 默认的终端 caps: 原始音视频与可直接渲染的字幕
pub const DEFAULT_TERMINAL_CAPS: &str = "video/x-raw; audio/x-raw; text/x-raw; \
     subpicture/x-dvd; subpicture/x-dvb; subpicture/x-pgs";

/// 估算缓存时长的上限 (毫秒)
pub const DEFAULT_CACHE_CAP_MS: u64 = 250;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DecodeBinConfig {
    /// 可直接输出而无需解码的 caps
    #[serde(default = "default_terminal_caps")]
    pub terminal_caps: String,
    /// 默认选择所有流, 而不是每种类型一条
    #[serde(default)]
    pub expose_all: bool,
    /// PTS 连续性监测
    #[serde(default)]
    pub pts_monitor: PtsMonitorConfig,
    /// 首个完整的活动集合发布之前, 默认选择不沿用已有选择
    #[serde(default = "default_true")]
    pub wait_collection_posted: bool,
}

fn default_terminal_caps() -> String {
    DEFAULT_TERMINAL_CAPS.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for DecodeBinConfig {
    fn default() -> Self {
        Self {
            terminal_caps: default_terminal_caps(),
            expose_all: false,
            pts_monitor: PtsMonitorConfig::default(),
            wait_collection_posted: true,
        }
    }
}

impl DecodeBinConfig {
    /// 从 JSON 文本加载
    pub fn from_json(text: &str) -> TaoResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| TaoError::InvalidArgument(format!("解码路由配置解析失败: {e}")))
    }

    /// 解析终端 caps
    pub fn parse_terminal_caps(&self) -> TaoResult<Caps> {
        self.terminal_caps.parse()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PtsMonitorConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cache_time: CacheTimePolicy,
}

/// 缓存时长估算方式
///
/// 缓冲没有时间戳时, 用上次推送的时间戳加上缓存时长推算当前时间戳.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CacheTimePolicy {
    /// 优先使用缓冲时长, 其次为与上一时间戳的差值, 均不超过上限
    BufferDuration {
        #[serde(default = "default_cap_ms")]
        cap_ms: u64,
    },
    /// 只使用与上一时间戳的差值, 不超过上限
    PreviousDelta {
        #[serde(default = "default_cap_ms")]
        cap_ms: u64,
    },
}

fn default_cap_ms() -> u64 {
    DEFAULT_CACHE_CAP_MS
}

impl Default for CacheTimePolicy {
    fn default() -> Self {
        Self::BufferDuration {
            cap_ms: DEFAULT_CACHE_CAP_MS,
        }
    }
}

impl CacheTimePolicy {
    fn cap(&self) -> ClockTime {
        match *self {
            Self::BufferDuration { cap_ms } | Self::PreviousDelta { cap_ms } => {
                ClockTime::from_mseconds(cap_ms)
            }
        }
    }

    /// 估算缓存时长
    pub fn estimate(&self, buffer: &Buffer, delta: Option<ClockTime>) -> ClockTime {
        let cap = self.cap();
        let from_delta = delta.map(|d| d.min(cap));
        match self {
            Self::BufferDuration { .. } => buffer.duration.or(from_delta).unwrap_or(cap),
            Self::PreviousDelta { .. } => from_delta.unwrap_or(cap),
        }
    }
}
