//! # tao-codec
//!
//! Tao 多媒体框架编解码器库, 提供数据缓冲、元素生命周期与解码器工厂注册表.
//!
//! ## 使用示例
//!
//! ```rust
//! use tao_codec::ElementRegistry;
//! use tao_core::Caps;
//!
//! let registry = ElementRegistry::new();
//! // 没有注册任何工厂时查找失败
//! assert!(registry.create_decoder(&Caps::new_simple("video/x-h264")).is_err());
//! ```

pub mod buffer;
pub mod element;
pub mod registry;

// 重导出常用类型
pub use buffer::{Buffer, BufferFlags};
pub use element::Element;
pub use registry::{ElementConstructor, ElementFactory, ElementRegistry, Rank};
