//! 统一错误类型定义.
//!
//! 所有 Tao crate 共用的错误类型, 支持跨模块传播.
//! 解码路由层的错误都只影响单条流的解码路径, 不会中止整个管线.

use thiserror::Error;

/// Tao 框架统一错误类型
#[derive(Debug, Error)]
pub enum TaoError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 编解码器错误
    #[error("编解码器错误: {0}")]
    Codec(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 没有能处理该 caps 的解码器 (非致命, 仅通知上层)
    #[error("缺少解码器: {0}")]
    MissingDecoder(String),

    /// 链接或暴露输出失败
    #[error("链接失败: {0}")]
    LinkFailure(String),

    /// 请求已被更新的请求取代
    #[error("过期请求: 期望序号 {expected}, 实际 {got}")]
    StaleRequest { expected: u32, got: u32 },
}

/// Tao 框架统一 Result 类型
pub type TaoResult<T> = Result<T, TaoError>;

impl TaoError {
    /// 是否属于可以静默丢弃的错误
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleRequest { .. })
    }
}
