//! 流类型定义.
//!
//! 流类型是位掩码, 一条流可以同时匹配多种类型. 通道与输出流按具体类型值区分.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// 基本流类型
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct StreamType: u32 {
        /// 未知类型
        const UNKNOWN   = 1 << 0;
        /// 音频流
        const AUDIO     = 1 << 1;
        /// 视频流
        const VIDEO     = 1 << 2;
        /// 容器流 (仍需解封装)
        const CONTAINER = 1 << 3;
        /// 文本/字幕流
        const TEXT      = 1 << 4;
    }
}

impl StreamType {
    /// 类型名称, 用于日志与输出端口命名
    pub fn name(self) -> &'static str {
        if self.contains(Self::VIDEO) {
            "video"
        } else if self.contains(Self::AUDIO) {
            "audio"
        } else if self.contains(Self::TEXT) {
            "text"
        } else if self.contains(Self::CONTAINER) {
            "container"
        } else {
            "unknown"
        }
    }

    /// 排序权重: 视频 < 音频 < 文本 < 容器 < 未知
    pub fn sort_rank(self) -> u8 {
        if self.contains(Self::VIDEO) {
            0
        } else if self.contains(Self::AUDIO) {
            1
        } else if self.contains(Self::TEXT) {
            2
        } else if self.contains(Self::CONTAINER) {
            3
        } else {
            4
        }
    }

    /// 是否是可路由的已知类型
    pub fn is_known(self) -> bool {
        !self.is_empty() && self != Self::UNKNOWN
    }

    /// 根据 caps 媒体名推断流类型
    pub fn from_media_name(name: &str) -> Self {
        if name.starts_with("video/") || name.starts_with("image/") {
            Self::VIDEO
        } else if name.starts_with("audio/") {
            Self::AUDIO
        } else if name.starts_with("text/")
            || name.starts_with("subpicture/")
            || name.starts_with("subtitle/")
            || name == "application/x-subtitle"
        {
            Self::TEXT
        } else if name.starts_with("application/") {
            Self::CONTAINER
        } else {
            Self::UNKNOWN
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.name() {
            "video" => "视频",
            "audio" => "音频",
            "text" => "文本",
            "container" => "容器",
            _ => "未知",
        };
        write!(f, "{name}")
    }
}
