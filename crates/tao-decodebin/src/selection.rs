//! 选择控制器状态.
//!
//! 维护三张选择列表 (requested / active / to_activate), 合并集合与活动集合,
//! 以及通道与输出之间的绑定关系. 本模块只做状态变换, 需要执行的外部动作
//! 记录到 `Effects` 中, 由调用方在释放锁后执行.
//!
//! 所有方法都要求调用方持有选择锁.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use tao_core::{Caps, StreamType};
use tao_format::{Stream, StreamCollection};

use crate::effects::{Effect, Effects};
use crate::event::{ExposedPad, Message};
use crate::id_set::IdSet;
use crate::input::InputStreamKey;
use crate::lane::{IdleAction, Lane, LaneId};
use crate::output::{OutputId, OutputStream};
use crate::policy::{SelectionPolicy, StreamVerdict};

/// 默认选择规则的开关
#[derive(Debug, Clone, Copy)]
pub(crate) struct SelectionRules {
    pub expose_all: bool,
    pub wait_collection_posted: bool,
}

pub(crate) struct Selection {
    pub lanes: Vec<Lane>,
    pub outputs: Vec<OutputStream>,
    /// 合并后的流集合
    pub merged: Arc<StreamCollection>,
    /// 通道实际承载的流
    pub active_collection: Arc<StreamCollection>,
    pub requested: IdSet,
    pub active: IdSet,
    /// 输出正在转交给新通道的流
    pub to_activate: IdSet,
    /// 选择有变化, 尚未发布选择完成
    pub dirty: bool,
    /// 正在处理的外部切换请求
    pub pending_request: Option<Vec<Arc<str>>>,
    /// 当前切换请求序号
    pub seqnum: Option<u32>,
    /// 完整的活动集合是否已发布
    pub collection_posted: bool,
    /// 最终流结束是否已合成
    pub final_eos_sent: bool,
    pub terminal_caps: Caps,
    next_lane: u32,
    next_output: u32,
    pad_counters: HashMap<&'static str, u32>,
}

impl Selection {
    pub fn new(terminal_caps: Caps) -> Self {
        Self {
            lanes: Vec::new(),
            outputs: Vec::new(),
            merged: Arc::new(StreamCollection::empty(None)),
            active_collection: Arc::new(StreamCollection::empty(None)),
            requested: IdSet::new(),
            active: IdSet::new(),
            to_activate: IdSet::new(),
            dirty: false,
            pending_request: None,
            seqnum: None,
            collection_posted: false,
            final_eos_sent: false,
            terminal_caps,
            next_lane: 0,
            next_output: 0,
            pad_counters: HashMap::new(),
        }
    }

    // ============================================================
    // 查找
    // ============================================================

    pub fn lane(&self, id: LaneId) -> Option<&Lane> {
        self.lanes.iter().find(|l| l.id == id)
    }

    pub fn lane_mut(&mut self, id: LaneId) -> Option<&mut Lane> {
        self.lanes.iter_mut().find(|l| l.id == id)
    }

    pub fn output(&self, id: OutputId) -> Option<&OutputStream> {
        self.outputs.iter().find(|o| o.id == id)
    }

    pub fn output_mut(&mut self, id: OutputId) -> Option<&mut OutputStream> {
        self.outputs.iter_mut().find(|o| o.id == id)
    }

    /// 通道绑定的输出
    pub fn output_of_lane_mut(&mut self, lane: LaneId) -> Option<&mut OutputStream> {
        let output = self.lane(lane).and_then(|l| l.output)?;
        self.output_mut(output)
    }

    /// 按流 id 查找通道 (活动流, 待定流或切换前的旧流)
    pub fn find_lane_for_stream_id(&self, stream_id: &str) -> Option<LaneId> {
        self.lanes
            .iter()
            .find(|l| l.carries(stream_id))
            .map(|l| l.id)
    }

    /// 已接入该输入流的通道
    pub fn find_lane_for_input(&self, key: InputStreamKey) -> Option<LaneId> {
        self.lanes
            .iter()
            .find(|l| l.input == Some(key))
            .map(|l| l.id)
    }

    // ============================================================
    // 通道与输出的创建和销毁
    // ============================================================

    /// 创建指定类型的通道
    pub fn create_lane(
        &mut self,
        stream_type: StreamType,
        policy: &dyn SelectionPolicy,
        fx: &mut Effects,
    ) -> LaneId {
        let id = LaneId(self.next_lane);
        self.next_lane += 1;
        debug!("创建 {} 通道 {id}", stream_type.name());
        self.lanes.push(Lane::new(id, stream_type));
        fx.push(Effect::CreateLane(id, stream_type));
        policy.on_lane_created(id, stream_type);
        id
    }

    /// 选取 (或创建) 承载输入流的通道, 并把输入流接入
    pub fn get_lane_for_input(
        &mut self,
        key: InputStreamKey,
        stream: &Arc<Stream>,
        policy: &dyn SelectionPolicy,
        fx: &mut Effects,
    ) -> LaneId {
        if let Some(lane) = self.find_lane_for_input(key) {
            return lane;
        }
        let stream_type = stream.stream_type();
        let mut candidate = None;
        // 从后往前找空闲的同类型通道, 优先选最近承载过同一条流的
        for lane in self.lanes.iter().rev() {
            if lane.stream_type != stream_type || lane.input.is_some() {
                continue;
            }
            if lane.active_id().is_some_and(|id| id == stream.id()) {
                candidate = Some(lane.id);
                break;
            }
            if candidate.is_none() {
                candidate = Some(lane.id);
            }
        }
        let lane_id = match candidate {
            Some(id) => {
                debug!("复用空闲通道 {id} 承载流 {}", stream.id());
                id
            }
            None => self.create_lane(stream_type, policy, fx),
        };
        if let Some(lane) = self.lane_mut(lane_id) {
            lane.input = Some(key);
            lane.pending_stream = Some(Arc::clone(stream));
        }
        lane_id
    }

    /// 创建输出流并分配端口名
    pub fn create_output(
        &mut self,
        stream_type: StreamType,
        policy: &dyn SelectionPolicy,
    ) -> OutputId {
        let id = OutputId(self.next_output);
        self.next_output += 1;
        let prefix = policy.pad_prefix(stream_type);
        let counter = self.pad_counters.entry(prefix).or_insert(0);
        let pad = ExposedPad::new(format!("{prefix}_{counter}"), stream_type);
        *counter += 1;
        debug!("创建输出 {id} ({pad})");
        self.outputs.push(OutputStream::new(id, stream_type, pad));
        id
    }

    /// 销毁输出: 解除通道绑定, 移除已暴露的端口, 停止解码器
    pub fn remove_output(&mut self, id: OutputId, policy: &dyn SelectionPolicy, fx: &mut Effects) {
        let Some(index) = self.outputs.iter().position(|o| o.id == id) else {
            return;
        };
        let output = self.outputs.remove(index);
        if let Some(lane) = output.lane.and_then(|l| self.lane_mut(l)) {
            lane.output = None;
        }
        debug!("销毁输出 {id} ({})", output.pad);
        if let Some(decoder) = output.decoder {
            fx.push(Effect::StopDecoder(decoder.factory, decoder.handle));
        }
        if output.exposed {
            policy.on_output_removed(&output.pad);
            fx.push(Effect::PadRemoved(output.pad));
        }
    }

    /// 移除通道 (连同其输出), 缓冲队列中的通道在后台释放
    pub fn remove_lane(&mut self, id: LaneId, policy: &dyn SelectionPolicy, fx: &mut Effects) {
        if let Some(output) = self.lane(id).and_then(|l| l.output) {
            self.remove_output(output, policy, fx);
        }
        if let Some(index) = self.lanes.iter().position(|l| l.id == id) {
            debug!("移除通道 {id}");
            let lane = self.lanes.remove(index);
            if let Some(stream) = &lane.active_stream {
                self.active.remove(stream.id());
            }
            fx.push(Effect::ReleaseLane(id));
        }
    }

    // ============================================================
    // 默认选择
    // ============================================================

    /// 根据合并集合计算默认选择
    pub fn update_requested_selection(&mut self, policy: &dyn SelectionPolicy, rules: SelectionRules) {
        if self.pending_request.is_some() {
            debug!("外部切换请求处理中, 不计算默认选择");
            return;
        }
        let collection = Arc::clone(&self.merged);
        let keep_current = self.collection_posted || !rules.wait_collection_posted;
        let mut selected = IdSet::new();
        let mut skipped = IdSet::new();
        let mut used_types = StreamType::empty();

        for stream in collection.iter() {
            let id = stream.id();
            let take = match policy.select_stream(&collection, stream) {
                StreamVerdict::Select => true,
                StreamVerdict::Skip => {
                    skipped.insert(Arc::clone(id));
                    false
                }
                StreamVerdict::NoOpinion => {
                    rules.expose_all
                        || (keep_current
                            && (self.requested.contains(id) || self.active.contains(id)))
                }
            };
            if take {
                debug!("选中流 {id}");
                selected.insert(Arc::clone(id));
                used_types |= stream.stream_type();
            }
        }

        // 尚未覆盖的类型各选第一条
        for stream in collection.iter() {
            let stream_type = stream.stream_type();
            if used_types.intersects(stream_type) || skipped.contains(stream.id()) {
                continue;
            }
            debug!("为 {} 类型选中流 {}", stream_type.name(), stream.id());
            selected.insert(Arc::clone(stream.id()));
            used_types |= stream_type;
        }

        if !selected.is_empty() {
            self.requested = selected;
            self.dirty = true;
        }
    }

    // ============================================================
    // 通道 -> 输出
    // ============================================================

    /// 找一个可以抢占的输出: 同类型, 且其通道上的流已不在请求列表中
    pub fn find_free_compatible_output(&self, stream_type: StreamType) -> Option<OutputId> {
        self.outputs
            .iter()
            .filter(|o| o.stream_type == stream_type)
            .find(|o| {
                o.lane
                    .and_then(|l| self.lane(l))
                    .and_then(|l| l.active_id())
                    .is_some_and(|id| !self.requested.contains(id))
            })
            .map(|o| o.id)
    }

    /// 为通道确定输出
    ///
    /// 已绑定时直接返回; 流未被请求时返回 None; 有可抢占的输出时把流放入
    /// to_activate 并安排旧通道解绑, 同样返回 None; 否则创建新输出.
    pub fn get_output_for_lane(
        &mut self,
        lane_id: LaneId,
        policy: &dyn SelectionPolicy,
        fx: &mut Effects,
    ) -> Option<OutputId> {
        let lane = self.lane(lane_id)?;
        if lane.output.is_some() {
            return lane.output;
        }
        let Some(stream) = lane.active_stream.clone() else {
            warn!("通道 {lane_id} 上没有流");
            return None;
        };
        let stream_type = lane.stream_type;
        let stream_id = stream.id();
        if !self.requested.contains(stream_id) {
            debug!("流 {stream_id} 未被请求, 通道 {lane_id} 不创建输出");
            return None;
        }

        if let Some(free) = self.find_free_compatible_output(stream_type) {
            let Some(old_lane) = self.output(free).and_then(|o| o.lane) else {
                return None;
            };
            debug!("输出 {free} 将从通道 {old_lane} 转交给流 {stream_id}");
            self.to_activate.insert(Arc::clone(stream_id));
            self.requested.remove(stream_id);
            fx.idle(old_lane, IdleAction::Unassign);
            return None;
        }

        let output = self.create_output(stream_type, policy);
        if let Some(o) = self.output_mut(output) {
            o.lane = Some(lane_id);
        }
        if let Some(lane) = self.lane_mut(lane_id) {
            lane.output = Some(output);
        }
        self.active.insert(Arc::clone(stream_id));
        debug!("通道 {lane_id} 绑定新输出 {output}");
        Some(output)
    }

    // ============================================================
    // 解绑与转交
    // ============================================================

    /// 解除通道与输出的绑定; 输出转交给待激活的同类型通道, 或被销毁
    pub fn reassign_lane(&mut self, lane_id: LaneId, policy: &dyn SelectionPolicy, fx: &mut Effects) {
        let Some(lane) = self.lane(lane_id) else {
            return;
        };
        let Some(stream_id) = lane.active_id().cloned() else {
            debug!("通道 {lane_id} 没有活动流");
            return;
        };
        let Some(output_id) = lane.output else {
            debug!("通道 {lane_id} 没有需要解绑的输出");
            return;
        };
        if self.requested.contains(&stream_id) {
            debug!("流 {stream_id} 又被请求, 不再解绑");
            return;
        }

        if let Some(lane) = self.lane_mut(lane_id) {
            lane.output = None;
        }
        let output_type = match self.output_mut(output_id) {
            Some(output) => {
                output.lane = None;
                output.linked = false;
                output.stream_type
            }
            None => return,
        };
        self.active.remove(&stream_id);

        let target = self.to_activate.iter().find_map(|tsid| {
            let lane = self.lane(self.find_lane_for_stream_id(tsid)?)?;
            (lane.stream_type == output_type && lane.output.is_none())
                .then(|| (lane.id, Arc::clone(tsid)))
        });

        match target {
            Some((target_lane, tsid)) => {
                debug!("输出 {output_id} 从通道 {lane_id} 转交给通道 {target_lane} (流 {tsid})");
                self.requested.insert(Arc::clone(&tsid));
                self.to_activate.remove(&tsid);
                if let Some(lane) = self.lane_mut(target_lane) {
                    lane.output = Some(output_id);
                }
                if let Some(output) = self.output_mut(output_id) {
                    output.lane = Some(target_lane);
                }
                self.active.insert(tsid);
                fx.idle(target_lane, IdleAction::Reconfigure);
            }
            None => {
                self.remove_output(output_id, policy, fx);
                if let Some(message) = self.is_selection_done(policy) {
                    fx.post(message);
                }
            }
        }
    }

    // ============================================================
    // 完成判定与集合
    // ============================================================

    /// 请求的流全部活动且没有待转交的流时, 生成选择完成消息
    pub fn is_selection_done(&mut self, policy: &dyn SelectionPolicy) -> Option<Message> {
        if !self.dirty {
            return None;
        }
        if !self.to_activate.is_empty() {
            debug!("仍有 {} 条流等待激活", self.to_activate.len());
            return None;
        }
        if !self.active.contains_all(&self.requested) {
            return None;
        }
        let mut streams = Vec::new();
        for output in &self.outputs {
            match output.lane.and_then(|l| self.lane(l)).and_then(|l| l.active_stream.clone()) {
                Some(stream) => streams.push(stream),
                None => warn!("输出 {} 没有有效的通道", output.id),
            }
        }
        for lane in &mut self.lanes {
            lane.old_stream = None;
        }
        self.dirty = false;
        let ids: Vec<Arc<str>> = streams.iter().map(|s| Arc::clone(s.id())).collect();
        debug!("选择完成: {ids:?}");
        policy.on_selection_done(&ids);
        Some(Message::StreamsSelected {
            seqnum: self.seqnum,
            collection: Arc::clone(&self.merged),
            streams,
        })
    }

    /// 通道承载的流改变后, 用新 id 替换选择列表中的旧 id
    pub fn migrate_stream_id(&mut self, old: &str, new: &Arc<str>) {
        if self.active.replace(old, Arc::clone(new)) {
            debug!("活动列表: {old} -> {new}");
        }
        if self.requested.replace(old, Arc::clone(new)) {
            debug!("请求列表: {old} -> {new}");
        }
    }

    /// 由各通道的活动流重建活动集合
    ///
    /// 启动阶段只有当活动集合覆盖整个合并集合时才发布, 之后每次变化都发布.
    pub fn update_active_collection(&mut self, policy: &dyn SelectionPolicy) -> Option<Message> {
        let streams: Vec<Arc<Stream>> = {
            let mut seen = IdSet::new();
            self.lanes
                .iter()
                .filter_map(|l| l.active_stream.clone())
                .filter(|s| seen.insert(Arc::clone(s.id())))
                .collect()
        };
        let unchanged = streams.len() == self.active_collection.len()
            && streams.iter().all(|s| self.active_collection.contains(s.id()));
        if unchanged {
            return None;
        }
        let unsorted = StreamCollection::new(policy.merged_collection_id(), streams).ok()?;
        let active = Arc::new(unsorted.sorted_by(|a, b| policy.compare_streams(a, b)));
        self.active_collection = Arc::clone(&active);

        if !self.collection_posted {
            if self.merged.is_empty() || self.merged.len() != active.len() {
                return None;
            }
            self.collection_posted = true;
        }
        debug!("发布活动集合 ({} 条流)", active.len());
        Some(Message::ActiveCollection(active))
    }

    /// 状态快照
    pub fn snapshot(&self) -> SelectionSnapshot {
        SelectionSnapshot {
            merged: Arc::clone(&self.merged),
            active_collection: Arc::clone(&self.active_collection),
            requested: self.requested.to_vec(),
            active: self.active.to_vec(),
            to_activate: self.to_activate.to_vec(),
            dirty: self.dirty,
            seqnum: self.seqnum,
            lanes: self
                .lanes
                .iter()
                .map(|l| LaneSnapshot {
                    id: l.id,
                    stream_type: l.stream_type,
                    active_stream: l.active_id().cloned(),
                    pending_stream: l.pending_stream.as_ref().map(|s| Arc::clone(s.id())),
                    output: l.output.and_then(|o| self.output(o)).map(|o| o.pad.clone()),
                    has_input: l.input.is_some(),
                    drained: l.drained,
                })
                .collect(),
            outputs: self
                .outputs
                .iter()
                .map(|o| OutputSnapshot {
                    pad: o.pad.clone(),
                    lane: o.lane,
                    decoder: o.decoder.as_ref().map(|d| d.factory.clone()),
                    exposed: o.exposed,
                })
                .collect(),
        }
    }
}

/// 通道状态快照
#[derive(Debug, Clone)]
pub struct LaneSnapshot {
    pub id: LaneId,
    pub stream_type: StreamType,
    pub active_stream: Option<Arc<str>>,
    pub pending_stream: Option<Arc<str>>,
    pub output: Option<ExposedPad>,
    pub has_input: bool,
    pub drained: bool,
}

/// 输出状态快照
#[derive(Debug, Clone)]
pub struct OutputSnapshot {
    pub pad: ExposedPad,
    pub lane: Option<LaneId>,
    /// 解码器工厂名
    pub decoder: Option<String>,
    pub exposed: bool,
}

/// 选择控制器状态快照
#[derive(Debug, Clone)]
pub struct SelectionSnapshot {
    pub merged: Arc<StreamCollection>,
    pub active_collection: Arc<StreamCollection>,
    pub requested: Vec<Arc<str>>,
    pub active: Vec<Arc<str>>,
    pub to_activate: Vec<Arc<str>>,
    pub dirty: bool,
    pub seqnum: Option<u32>,
    pub lanes: Vec<LaneSnapshot>,
    pub outputs: Vec<OutputSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DefaultPolicy;
    use tao_format::StreamFlags;

    const RULES: SelectionRules = SelectionRules {
        expose_all: false,
        wait_collection_posted: true,
    };

    fn stream(id: &str, stream_type: StreamType) -> Arc<Stream> {
        Stream::new(id, stream_type, None, StreamFlags::empty())
    }

    fn selection_with(streams: Vec<Arc<Stream>>) -> Selection {
        let mut sel = Selection::new(Caps::any());
        let collection = StreamCollection::new(None, streams).unwrap();
        sel.merged = Arc::new(collection.sorted_by(tao_format::compare_streams));
        sel
    }

    fn ids(sel: &IdSet) -> Vec<&str> {
        sel.iter().map(|s| &**s).collect()
    }

    /// 建一条承载该流且已开始流动的通道
    fn flowing_lane(sel: &mut Selection, s: &Arc<Stream>, fx: &mut Effects) -> LaneId {
        let lane = sel.create_lane(s.stream_type(), &DefaultPolicy, fx);
        let l = sel.lane_mut(lane).unwrap();
        l.pending_stream = Some(Arc::clone(s));
        l.active_stream = Some(Arc::clone(s));
        lane
    }

    #[test]
    fn test_默认选择每种类型一条() {
        let mut sel = selection_with(vec![
            stream("a1", StreamType::AUDIO),
            stream("v1", StreamType::VIDEO),
            stream("a2", StreamType::AUDIO),
            stream("t1", StreamType::TEXT),
        ]);
        sel.update_requested_selection(&DefaultPolicy, RULES);
        assert_eq!(ids(&sel.requested), vec!["v1", "a1", "t1"]);
        assert!(sel.dirty);
    }

    #[test]
    fn test_默认选择幂等() {
        let mut sel = selection_with(vec![
            stream("v1", StreamType::VIDEO),
            stream("v2", StreamType::VIDEO),
            stream("a1", StreamType::AUDIO),
        ]);
        sel.update_requested_selection(&DefaultPolicy, RULES);
        let first = sel.requested.clone();
        sel.update_requested_selection(&DefaultPolicy, RULES);
        assert_eq!(sel.requested, first);

        sel.collection_posted = true;
        sel.update_requested_selection(&DefaultPolicy, RULES);
        assert_eq!(sel.requested, first);
    }

    #[test]
    fn test_集合发布后保留当前流() {
        let mut sel = selection_with(vec![
            stream("v1", StreamType::VIDEO),
            stream("v2", StreamType::VIDEO),
        ]);
        sel.requested = IdSet::from_iter([Arc::from("v2")]);
        sel.update_requested_selection(&DefaultPolicy, RULES);
        // 启动阶段仍按类型选第一条
        assert_eq!(ids(&sel.requested), vec!["v1"]);

        sel.requested = IdSet::from_iter([Arc::from("v2")]);
        sel.collection_posted = true;
        sel.update_requested_selection(&DefaultPolicy, RULES);
        assert_eq!(ids(&sel.requested), vec!["v2"]);
    }

    #[test]
    fn test_全部暴露模式() {
        let mut sel = selection_with(vec![
            stream("v1", StreamType::VIDEO),
            stream("v2", StreamType::VIDEO),
        ]);
        let rules = SelectionRules {
            expose_all: true,
            ..RULES
        };
        sel.update_requested_selection(&DefaultPolicy, rules);
        assert_eq!(ids(&sel.requested), vec!["v1", "v2"]);
    }

    #[test]
    fn test_策略跳过的流不参与按类型选择() {
        struct SkipV1;
        impl SelectionPolicy for SkipV1 {
            fn select_stream(&self, _: &StreamCollection, stream: &Stream) -> StreamVerdict {
                if &**stream.id() == "v1" {
                    StreamVerdict::Skip
                } else {
                    StreamVerdict::NoOpinion
                }
            }
        }
        let mut sel = selection_with(vec![
            stream("v1", StreamType::VIDEO),
            stream("v2", StreamType::VIDEO),
        ]);
        sel.update_requested_selection(&SkipV1, RULES);
        assert_eq!(ids(&sel.requested), vec!["v2"]);
    }

    #[test]
    fn test_外部请求处理中不更新默认选择() {
        let mut sel = selection_with(vec![stream("v1", StreamType::VIDEO)]);
        sel.pending_request = Some(vec![Arc::from("v1")]);
        sel.update_requested_selection(&DefaultPolicy, RULES);
        assert!(sel.requested.is_empty());
        assert!(!sel.dirty);
    }

    #[test]
    fn test_未请求的流不创建输出() {
        let v1 = stream("v1", StreamType::VIDEO);
        let mut sel = selection_with(vec![Arc::clone(&v1)]);
        let mut fx = Effects::new();
        let lane = flowing_lane(&mut sel, &v1, &mut fx);
        assert!(sel.get_output_for_lane(lane, &DefaultPolicy, &mut fx).is_none());
        assert!(sel.outputs.is_empty());
    }

    #[test]
    fn test_输出转交与选择完成() {
        let v1 = stream("v1", StreamType::VIDEO);
        let v2 = stream("v2", StreamType::VIDEO);
        let mut sel = selection_with(vec![Arc::clone(&v1), Arc::clone(&v2)]);
        sel.update_requested_selection(&DefaultPolicy, RULES);
        let mut fx = Effects::new();
        let l1 = flowing_lane(&mut sel, &v1, &mut fx);
        let l2 = flowing_lane(&mut sel, &v2, &mut fx);

        let output = sel.get_output_for_lane(l1, &DefaultPolicy, &mut fx).unwrap();
        assert_eq!(sel.output(output).unwrap().pad.name(), "video_0");
        assert!(sel.is_selection_done(&DefaultPolicy).is_some());

        // 改为请求 v2: v2 的通道等待 v1 的输出
        sel.requested = IdSet::from_iter([Arc::from("v2")]);
        sel.dirty = true;
        let mut fx = Effects::new();
        assert!(sel.get_output_for_lane(l2, &DefaultPolicy, &mut fx).is_none());
        assert_eq!(ids(&sel.to_activate), vec!["v2"]);
        assert!(!sel.requested.contains("v2"));
        assert!(fx
            .iter()
            .any(|e| matches!(e, Effect::Idle(l, IdleAction::Unassign) if *l == l1)));
        assert!(sel.is_selection_done(&DefaultPolicy).is_none());

        let mut fx = Effects::new();
        sel.reassign_lane(l1, &DefaultPolicy, &mut fx);
        assert_eq!(sel.lane(l2).unwrap().output, Some(output));
        assert_eq!(sel.lane(l1).unwrap().output, None);
        assert_eq!(ids(&sel.active), vec!["v2"]);
        assert!(sel.to_activate.is_empty());
        assert_eq!(sel.outputs.len(), 1);
        assert!(fx
            .iter()
            .any(|e| matches!(e, Effect::Idle(l, IdleAction::Reconfigure) if *l == l2)));
        match sel.is_selection_done(&DefaultPolicy) {
            Some(Message::StreamsSelected { streams, .. }) => {
                assert_eq!(streams.len(), 1);
                assert_eq!(&**streams[0].id(), "v2");
            }
            other => panic!("意外的结果 {other:?}"),
        }
    }

    #[test]
    fn test_重新请求时放弃解绑() {
        let v1 = stream("v1", StreamType::VIDEO);
        let mut sel = selection_with(vec![Arc::clone(&v1)]);
        sel.update_requested_selection(&DefaultPolicy, RULES);
        let mut fx = Effects::new();
        let lane = flowing_lane(&mut sel, &v1, &mut fx);
        let output = sel.get_output_for_lane(lane, &DefaultPolicy, &mut fx);
        let mut fx = Effects::new();
        sel.reassign_lane(lane, &DefaultPolicy, &mut fx);
        assert_eq!(sel.lane(lane).unwrap().output, output);
        assert!(fx.is_empty());
    }

    #[test]
    fn test_无人接手的输出被销毁() {
        let v1 = stream("v1", StreamType::VIDEO);
        let mut sel = selection_with(vec![Arc::clone(&v1)]);
        sel.update_requested_selection(&DefaultPolicy, RULES);
        let mut fx = Effects::new();
        let lane = flowing_lane(&mut sel, &v1, &mut fx);
        let output = sel.get_output_for_lane(lane, &DefaultPolicy, &mut fx).unwrap();
        sel.output_mut(output).unwrap().exposed = true;
        sel.requested.clear();
        let mut fx = Effects::new();
        sel.reassign_lane(lane, &DefaultPolicy, &mut fx);
        assert!(sel.outputs.is_empty());
        assert!(sel.active.is_empty());
        assert!(fx.iter().any(|e| matches!(e, Effect::PadRemoved(p) if p.name() == "video_0")));
    }

    #[test]
    fn test_活动集合覆盖后才发布() {
        let v1 = stream("v1", StreamType::VIDEO);
        let a1 = stream("a1", StreamType::AUDIO);
        let mut sel = selection_with(vec![Arc::clone(&v1), Arc::clone(&a1)]);
        let mut fx = Effects::new();
        flowing_lane(&mut sel, &a1, &mut fx);
        assert!(sel.update_active_collection(&DefaultPolicy).is_none());
        assert!(!sel.collection_posted);
        flowing_lane(&mut sel, &v1, &mut fx);
        match sel.update_active_collection(&DefaultPolicy) {
            Some(Message::ActiveCollection(active)) => {
                let order: Vec<&str> = active.iter().map(|s| &**s.id()).collect();
                assert_eq!(order, vec!["v1", "a1"]);
            }
            other => panic!("意外的结果 {other:?}"),
        }
        assert!(sel.collection_posted);
        // 没有变化时不重复发布
        assert!(sel.update_active_collection(&DefaultPolicy).is_none());
    }

    #[test]
    fn test_流变化时迁移id() {
        let mut sel = selection_with(vec![stream("v1", StreamType::VIDEO)]);
        sel.requested = IdSet::from_iter([Arc::from("v1"), Arc::from("a1")]);
        sel.active = IdSet::from_iter([Arc::from("v1")]);
        sel.migrate_stream_id("v1", &Arc::from("v9"));
        assert_eq!(ids(&sel.requested), vec!["v9", "a1"]);
        assert_eq!(ids(&sel.active), vec!["v9"]);
    }

    #[test]
    fn test_空闲通道优先复用同一条流() {
        let v1 = stream("v1", StreamType::VIDEO);
        let v2 = stream("v2", StreamType::VIDEO);
        let mut sel = selection_with(vec![Arc::clone(&v1), Arc::clone(&v2)]);
        let mut fx = Effects::new();
        let l_v1 = flowing_lane(&mut sel, &v1, &mut fx);
        let _l_v2 = flowing_lane(&mut sel, &v2, &mut fx);
        let key = InputStreamKey {
            input: crate::input::InputId::MAIN,
            pad: 7,
        };
        assert_eq!(sel.get_lane_for_input(key, &v1, &DefaultPolicy, &mut fx), l_v1);
        // 幂等
        assert_eq!(sel.get_lane_for_input(key, &v1, &DefaultPolicy, &mut fx), l_v1);
        // 没有空闲的音频通道时新建
        let a1 = stream("a1", StreamType::AUDIO);
        let key2 = InputStreamKey { pad: 8, ..key };
        let before = sel.lanes.len();
        sel.get_lane_for_input(key2, &a1, &DefaultPolicy, &mut fx);
        assert_eq!(sel.lanes.len(), before + 1);
    }
}
