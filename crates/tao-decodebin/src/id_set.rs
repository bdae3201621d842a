//! 有序流 id 集合.
//!
//! 保持插入顺序且元素唯一, 成员判断为 O(1).

use std::collections::HashSet;
use std::sync::Arc;

/// 有序流 id 集合
#[derive(Debug, Clone, Default)]
pub struct IdSet {
    order: Vec<Arc<str>>,
    members: HashSet<Arc<str>>,
}

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加到末尾, 已存在时返回 false
    pub fn insert(&mut self, id: Arc<str>) -> bool {
        if self.members.contains(&id) {
            return false;
        }
        self.members.insert(Arc::clone(&id));
        self.order.push(id);
        true
    }

    /// 移除, 不存在时返回 false
    pub fn remove(&mut self, id: &str) -> bool {
        if !self.members.remove(id) {
            return false;
        }
        self.order.retain(|x| &**x != id);
        true
    }

    /// 原位替换, 保持位置. 新 id 已存在时仅移除旧 id
    pub fn replace(&mut self, old: &str, new: Arc<str>) -> bool {
        if !self.members.contains(old) {
            return false;
        }
        if self.members.contains(&new) {
            return self.remove(old);
        }
        self.members.remove(old);
        self.members.insert(Arc::clone(&new));
        if let Some(slot) = self.order.iter_mut().find(|x| &***x == old) {
            *slot = new;
        }
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<str>> {
        self.order.iter()
    }

    /// 是否包含另一个集合的全部元素
    pub fn contains_all(&self, other: &IdSet) -> bool {
        other.iter().all(|id| self.contains(id))
    }

    pub fn to_vec(&self) -> Vec<Arc<str>> {
        self.order.clone()
    }
}

impl FromIterator<Arc<str>> for IdSet {
    fn from_iter<I: IntoIterator<Item = Arc<str>>>(iter: I) -> Self {
        let mut set = IdSet::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

impl Extend<Arc<str>> for IdSet {
    fn extend<I: IntoIterator<Item = Arc<str>>>(&mut self, iter: I) {
        for id in iter {
            self.insert(id);
        }
    }
}

/// 按顺序比较
impl PartialEq for IdSet {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
    }
}

impl Eq for IdSet {}
