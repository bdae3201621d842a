//! 流集合.
//!
//! 某一时刻已知的全部流, 有序且 id 唯一. 集合一旦构建便不再修改,
//! 更新时整体替换, 读者持有 `Arc` 快照即可安全访问.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tao_core::{TaoError, TaoResult};

use crate::stream::{Stream, StreamFlags};

/// 流集合
#[derive(Debug, Default)]
pub struct StreamCollection {
    /// 上游来源标识
    upstream_id: Option<String>,
    /// 有序的流列表
    streams: Vec<Arc<Stream>>,
    /// id -> 下标
    index: HashMap<Arc<str>, usize>,
}

impl StreamCollection {
    /// 构建集合, 流 id 重复时报错
    pub fn new(upstream_id: Option<String>, streams: Vec<Arc<Stream>>) -> TaoResult<Self> {
        let mut index = HashMap::with_capacity(streams.len());
        for (i, stream) in streams.iter().enumerate() {
            if index.insert(Arc::clone(stream.id()), i).is_some() {
                return Err(TaoError::InvalidArgument(format!(
                    "流集合中存在重复的流 id: {}",
                    stream.id()
                )));
            }
        }
        Ok(Self {
            upstream_id,
            streams,
            index,
        })
    }

    /// 空集合
    pub fn empty(upstream_id: Option<String>) -> Self {
        Self {
            upstream_id,
            ..Self::default()
        }
    }

    pub fn upstream_id(&self) -> Option<&str> {
        self.upstream_id.as_deref()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn streams(&self) -> &[Arc<Stream>] {
        &self.streams
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Stream>> {
        self.streams.iter()
    }

    /// 按 id 查找
    pub fn find(&self, id: &str) -> Option<&Arc<Stream>> {
        self.index.get(id).map(|&i| &self.streams[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// 按给定比较函数排序后返回新集合
    pub fn sorted_by<F>(&self, mut compare: F) -> Self
    where
        F: FnMut(&Stream, &Stream) -> Ordering,
    {
        let mut streams = self.streams.clone();
        streams.sort_by(|a, b| compare(a, b));
        let index = streams
            .iter()
            .enumerate()
            .map(|(i, s)| (Arc::clone(s.id()), i))
            .collect();
        Self {
            upstream_id: self.upstream_id.clone(),
            streams,
            index,
        }
    }

    /// 多个集合取并集, 相同 id 以先出现者为准
    pub fn merged<'a>(
        upstream_id: Option<String>,
        collections: impl IntoIterator<Item = &'a StreamCollection>,
    ) -> Self {
        let mut streams: Vec<Arc<Stream>> = Vec::new();
        let mut index = HashMap::new();
        for collection in collections {
            for stream in collection.iter() {
                if index.contains_key(stream.id()) {
                    continue;
                }
                index.insert(Arc::clone(stream.id()), streams.len());
                streams.push(Arc::clone(stream));
            }
        }
        Self {
            upstream_id,
            streams,
            index,
        }
    }
}

/// 默认排序: 视频 < 音频 < 文本 < 容器 < 未知, 其次带 SELECT 标志者优先, 最后按 id 字典序
pub fn compare_streams(a: &Stream, b: &Stream) -> Ordering {
    a.stream_type()
        .sort_rank()
        .cmp(&b.stream_type().sort_rank())
        .then_with(|| {
            let sa = a.flags().contains(StreamFlags::SELECT);
            let sb = b.flags().contains(StreamFlags::SELECT);
            sb.cmp(&sa)
        })
        .then_with(|| a.id().cmp(b.id()))
}
