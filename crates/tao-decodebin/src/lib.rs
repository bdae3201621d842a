//! # tao-decodebin
//!
//! Tao 多媒体框架的流路由核心. 负责:
//! - 合并各输入报告的流集合, 计算默认选择
//! - 为选中的流分配缓冲通道, 在通道出口挂接输出和解码器
//! - 处理外部切换请求, 在同类型的流之间转交输出以复用解码器
//! - 所有通道排空后合成最终流结束
//!
//! 解析器, 缓冲队列, 解码器实现与下游都是外部协作方, 分别通过
//! [`tao_format::Parser`], [`BufferingStage`], [`tao_codec::Element`] 与
//! [`OutputSink`] 接入.
//!
//! ## 使用示例
//!
//! ```rust
//! use tao_decodebin::DecodeBinConfig;
//!
//! let config = DecodeBinConfig::from_json(r#"{ "expose_all": true }"#).unwrap();
//! assert!(config.expose_all);
//! assert!(config.parse_terminal_caps().is_ok());
//! ```

pub mod bin;
pub mod config;
mod drain;
mod effects;
pub mod event;
pub mod id_set;
pub mod input;
pub mod lane;
mod outlet;
pub mod output;
pub mod policy;
pub mod selection;
pub mod sink;
mod switch;
pub mod teardown;

pub use bin::DecodeBin;
pub use config::{CacheTimePolicy, DecodeBinConfig, PtsMonitorConfig};
pub use event::{
    Disposition, EosKind, ExposedPad, Flow, LaneItem, Message, OutletQuery, QueryAnswer,
};
pub use id_set::IdSet;
pub use input::{InputId, PadId};
pub use lane::LaneId;
pub use output::OutputId;
pub use policy::{DefaultPolicy, SelectionPolicy, StreamVerdict};
pub use selection::{LaneSnapshot, OutputSnapshot, SelectionSnapshot};
pub use sink::{BufferingStage, OutputSink};
