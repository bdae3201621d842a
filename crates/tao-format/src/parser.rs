//! 解析器 (Parser) trait 定义.
//!
//! 解析器把字节流拆分为带类型的基本流. 路由层只通过本 trait 与其交互,
//! 解析器自身的事件 (新流, 集合变化, 排空) 由调用方转交给路由层.

use std::sync::Arc;

/// 解析器 trait
pub trait Parser: Send {
    /// 获取解析器名称
    fn name(&self) -> &str;

    /// 请求解析器暴露指定的流
    ///
    /// 用于处理路由层尚不认识的流 id. 返回 `true` 表示解析器已处理该请求.
    fn forward_select_streams(&mut self, _stream_ids: &[Arc<str>], _seqnum: u32) -> bool {
        false
    }

    /// 停止解析器并释放资源
    ///
    /// 在后台销毁线程上调用, 不会阻塞数据流线程.
    fn shutdown(&mut self);
}
