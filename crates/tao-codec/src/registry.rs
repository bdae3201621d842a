//! 元素工厂注册表.
//!
//! 按输入 caps 查找可用的解码器工厂, 按优先级 (rank) 排序后实例化.

use std::fmt;
use std::sync::Arc;

use tao_core::{Caps, TaoError, TaoResult};

use crate::element::Element;

/// 元素构造函数类型
pub type ElementConstructor = Arc<dyn Fn() -> TaoResult<Box<dyn Element>> + Send + Sync>;

/// 工厂优先级, 数值越大越优先
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rank(pub u32);

impl Rank {
    /// 不参与自动选择
    pub const NONE: Rank = Rank(0);
    pub const MARGINAL: Rank = Rank(64);
    pub const SECONDARY: Rank = Rank(128);
    pub const PRIMARY: Rank = Rank(256);
}

/// 元素工厂
pub struct ElementFactory {
    /// 工厂名称
    name: String,
    /// 优先级
    rank: Rank,
    /// 可接受的输入 caps
    sink_caps: Caps,
    /// 构造函数
    constructor: ElementConstructor,
}

impl ElementFactory {
    pub fn new<F>(name: impl Into<String>, rank: Rank, sink_caps: Caps, constructor: F) -> Self
    where
        F: Fn() -> TaoResult<Box<dyn Element>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            rank,
            sink_caps,
            constructor: Arc::new(constructor),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn sink_caps(&self) -> &Caps {
        &self.sink_caps
    }

    /// 能否消费给定 caps
    pub fn can_sink(&self, caps: &Caps) -> bool {
        self.sink_caps.can_intersect(caps)
    }

    /// 实例化元素
    pub fn create(&self) -> TaoResult<Box<dyn Element>> {
        (self.constructor)()
    }
}

impl fmt::Debug for ElementFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementFactory")
            .field("name", &self.name)
            .field("rank", &self.rank)
            .field("sink_caps", &self.sink_caps.to_string())
            .finish()
    }
}

/// 元素工厂注册表
///
/// 管理所有已注册的解码器工厂, 支持按 caps 查找并创建实例.
#[derive(Debug, Default)]
pub struct ElementRegistry {
    /// 解码器工厂
    decoders: Vec<Arc<ElementFactory>>,
}

impl ElementRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个解码器工厂
    pub fn register_decoder(&mut self, factory: ElementFactory) {
        log::debug!(
            "注册解码器工厂 {} (rank={}, caps={})",
            factory.name,
            factory.rank.0,
            factory.sink_caps
        );
        self.decoders.push(Arc::new(factory));
    }

    /// 查找能消费 caps 的解码器工厂, 按优先级降序, 同级按名称排序
    pub fn find_decoders(&self, caps: &Caps) -> Vec<Arc<ElementFactory>> {
        let mut found: Vec<_> = self
            .decoders
            .iter()
            .filter(|f| f.rank > Rank::NONE && f.can_sink(caps))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.rank.cmp(&a.rank).then_with(|| a.name.cmp(&b.name)));
        found
    }

    /// 使用优先级最高的工厂创建解码器
    pub fn create_decoder(&self, caps: &Caps) -> TaoResult<Box<dyn Element>> {
        let factory = self
            .find_decoders(caps)
            .into_iter()
            .next()
            .ok_or_else(|| TaoError::MissingDecoder(format!("未找到 {caps} 的解码器")))?;
        factory.create()
    }

    /// 获取所有已注册的解码器名称
    pub fn list_decoders(&self) -> Vec<&str> {
        self.decoders.iter().map(|f| f.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;

    struct NullDecoder(&'static str);

    impl Element for NullDecoder {
        fn name(&self) -> &str {
            self.0
        }

        fn accept_caps(&self, _caps: &Caps) -> bool {
            true
        }

        fn set_caps(&mut self, _caps: &Caps) -> TaoResult<Caps> {
            Ok(Caps::new_simple("video/x-raw"))
        }

        fn process(&mut self, buffer: Buffer) -> TaoResult<Vec<Buffer>> {
            Ok(vec![buffer])
        }
    }

    fn factory(name: &'static str, rank: Rank, caps: &str) -> ElementFactory {
        ElementFactory::new(name, rank, caps.parse().unwrap(), move || {
            Ok(Box::new(NullDecoder(name)) as Box<dyn Element>)
        })
    }

    #[test]
    fn test_按优先级选择解码器() {
        let mut registry = ElementRegistry::new();
        registry.register_decoder(factory("h264-soft", Rank::SECONDARY, "video/x-h264"));
        registry.register_decoder(factory("h264-hw", Rank::PRIMARY, "video/x-h264"));
        registry.register_decoder(factory("h264-off", Rank::NONE, "video/x-h264"));
        registry.register_decoder(factory("aac", Rank::PRIMARY, "audio/mpeg"));

        let caps = Caps::new_simple("video/x-h264");
        let names: Vec<_> = registry
            .find_decoders(&caps)
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(names, vec!["h264-hw", "h264-soft"]);
        assert_eq!(registry.create_decoder(&caps).unwrap().name(), "h264-hw");
        assert_eq!(registry.list_decoders().len(), 4);
    }

    #[test]
    fn test_未注册的caps返回错误() {
        let registry = ElementRegistry::new();
        let err = registry
            .create_decoder(&Caps::new_simple("video/x-vp9"))
            .err()
            .unwrap();
        assert!(matches!(err, TaoError::MissingDecoder(_)));
    }
}
