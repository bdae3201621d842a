//! # tao-format
//!
//! Tao 多媒体框架流描述库, 提供基本流描述、流集合与解析器接口.

pub mod collection;
pub mod parser;
pub mod stream;

// 重导出常用类型
pub use collection::{StreamCollection, compare_streams};
pub use parser::Parser;
pub use stream::{Stream, StreamFlags, TagList};
