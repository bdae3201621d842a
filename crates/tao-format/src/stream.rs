//! 流描述信息.
//!
//! 描述一条基本流 (id, 类型, caps, 标志, 标签). 流以 `Arc` 共享,
//! 可同时被多个流集合引用; caps 与标签会随协商与元数据更新而变化.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::RwLock;
use tao_core::{Caps, StreamType};

bitflags! {
    /// 流标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StreamFlags: u32 {
        /// 稀疏流 (如字幕)
        const SPARSE   = 1 << 0;
        /// 默认应被选中
        const SELECT   = 1 << 1;
        /// 默认不应被选中
        const UNSELECT = 1 << 2;
    }
}

/// 标签 (键值元数据)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagList(BTreeMap<String, String>);

impl TagList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 合并标签, 同名键以 `other` 为准
    pub fn merge(&self, other: &TagList) -> TagList {
        let mut merged = self.0.clone();
        merged.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        TagList(merged)
    }
}

/// 基本流描述
pub struct Stream {
    /// 全局唯一的流标识
    id: Arc<str>,
    /// 流类型
    stream_type: StreamType,
    /// 标志
    flags: StreamFlags,
    /// 当前 caps
    caps: RwLock<Option<Caps>>,
    /// 标签
    tags: RwLock<TagList>,
}

impl Stream {
    /// 创建流描述, 类型为空时根据 caps 推断
    pub fn new(
        id: impl Into<Arc<str>>,
        stream_type: StreamType,
        caps: Option<Caps>,
        flags: StreamFlags,
    ) -> Arc<Self> {
        let stream_type = if stream_type.is_empty() {
            caps.as_ref()
                .map(Caps::stream_type)
                .unwrap_or(StreamType::UNKNOWN)
        } else {
            stream_type
        };
        Arc::new(Self {
            id: id.into(),
            stream_type,
            flags,
            caps: RwLock::new(caps),
            tags: RwLock::new(TagList::new()),
        })
    }

    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    pub fn flags(&self) -> StreamFlags {
        self.flags
    }

    /// 当前 caps 的快照
    pub fn caps(&self) -> Option<Caps> {
        self.caps.read().clone()
    }

    /// 协商收窄后更新 caps
    pub fn set_caps(&self, caps: Caps) {
        *self.caps.write() = Some(caps);
    }

    pub fn tags(&self) -> TagList {
        self.tags.read().clone()
    }

    /// 合并新的标签
    pub fn merge_tags(&self, tags: &TagList) {
        let mut current = self.tags.write();
        *current = current.merge(tags);
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("type", &self.stream_type.name())
            .field("flags", &self.flags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_根据caps推断类型() {
        let s = Stream::new(
            "v0",
            StreamType::empty(),
            Some(Caps::new_simple("video/x-h264")),
            StreamFlags::empty(),
        );
        assert_eq!(s.stream_type(), StreamType::VIDEO);
        assert_eq!(&**s.id(), "v0");
    }

    #[test]
    fn test_标签合并() {
        let s = Stream::new("a0", StreamType::AUDIO, None, StreamFlags::empty());
        let mut t1 = TagList::new();
        t1.insert("language", "en");
        t1.insert("codec", "aac");
        s.merge_tags(&t1);
        let mut t2 = TagList::new();
        t2.insert("language", "fr");
        s.merge_tags(&t2);
        let tags = s.tags();
        assert_eq!(tags.get("language"), Some("fr"));
        assert_eq!(tags.get("codec"), Some("aac"));
    }
}
