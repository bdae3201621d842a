//! # tao-core
//!
//! Tao 多媒体框架核心库, 提供基础类型定义、错误处理和工具函数.
//!
//! 包含流类型、能力描述 (caps)、时钟时间与播放区间等解码路由层共用的类型.

pub mod caps;
pub mod error;
pub mod segment;
pub mod stream_type;
pub mod timestamp;

// 重导出常用类型
pub use caps::{Caps, CapsStructure, CapsValue};
pub use error::{TaoError, TaoResult};
pub use segment::{Segment, SegmentFormat};
pub use stream_type::StreamType;
pub use timestamp::ClockTime;
