//! # Tao (道)
//!
//! 纯 Rust 实现的多媒体处理框架.
//!
//! 本包汇总各子 crate, 并提供日志与配置文件的初始化:
//! - **流描述**: 流, 流集合与解析器接口
//! - **解码元素**: 缓冲, 元素生命周期与解码器注册表
//! - **解码路由**: 流选择, 缓冲通道分配, 解码器复用与排空
//!
//! # 快速开始
//!
//! ```rust
//! use tao::core::Caps;
//!
//! let caps: Caps = "video/x-raw; audio/x-raw".parse().unwrap();
//! assert!(caps.can_intersect(&Caps::new_simple("audio/x-raw")));
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `tao-core` | 核心类型: 错误, 流类型, caps, 时间与播放区间 |
//! | `tao-codec` | 缓冲, 元素 trait 与解码器工厂注册表 |
//! | `tao-format` | 流, 流集合与解析器 trait |
//! | `tao-decodebin` | 流路由与解码器生命周期管理 |

pub mod config;
pub mod logging;

pub use config::{TaoConfig, load_config};

/// 核心类型与工具
pub use tao_core as core;

/// 缓冲与解码元素
pub use tao_codec as codec;

/// 流描述与解析器接口
pub use tao_format as format;

/// 流路由与解码器生命周期
pub use tao_decodebin as decodebin;

/// 获取 Tao 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
