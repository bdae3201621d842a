//! 元素 (Element) trait 定义.
//!
//! 解码路由层只关心元素的通用生命周期: 创建, 配置 caps, 激活, 处理数据, 停止.
//! 具体解码算法由各实现自行提供.

use tao_core::{Caps, TaoResult};

use crate::buffer::Buffer;

/// 元素 trait
///
/// 生命周期:
/// 1. 工厂创建实例
/// 2. `set_caps()` 配置输入 caps, 返回输出 caps
/// 3. `start()` 激活
/// 4. 反复 `process()` 处理数据
/// 5. 流结束时 `drain()` 取出缓存数据
/// 6. `stop()` 停止并释放资源
pub trait Element: Send {
    /// 元素名称
    fn name(&self) -> &str;

    /// 是否可以不重新配置直接接受新的输入 caps
    fn accept_caps(&self, caps: &Caps) -> bool;

    /// 配置输入 caps, 返回协商后的输出 caps
    fn set_caps(&mut self, caps: &Caps) -> TaoResult<Caps>;

    /// 激活元素
    fn start(&mut self) -> TaoResult<()> {
        Ok(())
    }

    /// 处理一个输入缓冲, 返回零个或多个输出缓冲
    fn process(&mut self, buffer: Buffer) -> TaoResult<Vec<Buffer>>;

    /// 流结束时取出内部缓存的数据
    fn drain(&mut self) -> Vec<Buffer> {
        Vec::new()
    }

    /// 丢弃内部状态 (flush)
    fn flush(&mut self) {}

    /// 停止元素, 之后不再使用
    fn stop(&mut self) {}
}
