//! 输入.
//!
//! 每个输入持有一个解析器, 记录解析器报告的流集合, 以及尚未接入通道的
//! 待定端口. 待定端口在解析器报告不再有新端口, 或该输入上第一次有缓冲流动时
//! 统一接入通道; 在此之前收到的粘性事件先缓存, 接入后按顺序重放.

use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::{Mutex, MutexGuard};
use tao_core::{TaoError, TaoResult};
use tao_format::{Parser, Stream, StreamCollection};

use crate::bin::Shared;
use crate::effects::{Effect, Effects};
use crate::event::{EosKind, Flow, LaneItem, Message};
use crate::lane::LaneId;
use crate::selection::Selection;

/// 输入标识, 主输入为 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InputId(pub u32);

impl InputId {
    pub const MAIN: InputId = InputId(0);
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "input{}", self.0)
    }
}

/// 解析器端口编号, 在同一输入内唯一
pub type PadId = u32;

/// 某个输入上的某个解析器端口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputStreamKey {
    pub input: InputId,
    pub pad: PadId,
}

/// 解析器实例, 自带一把锁串行化对解析器的操作
#[derive(Clone, Default)]
pub struct ParserHandle(Arc<Mutex<Option<Box<dyn Parser>>>>);

impl ParserHandle {
    pub fn lock(&self) -> MutexGuard<'_, Option<Box<dyn Parser>>> {
        self.0.lock()
    }
}

impl fmt::Debug for ParserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_lock() {
            Some(parser) => {
                let name = parser.as_ref().map(|p| p.name().to_string());
                f.debug_tuple("ParserHandle").field(&name).finish()
            }
            None => f.write_str("ParserHandle(<busy>)"),
        }
    }
}

/// 尚未接入通道的解析器端口
#[derive(Debug)]
struct PendingConnection {
    pad: PadId,
    stream: Arc<Stream>,
    /// 接入前收到的粘性事件
    sticky: Vec<LaneItem>,
    saw_eos: bool,
}

impl PendingConnection {
    fn new(pad: PadId, stream: Arc<Stream>) -> Self {
        Self {
            pad,
            stream,
            sticky: Vec::new(),
            saw_eos: false,
        }
    }

    /// 同类粘性事件只保留最新的一个
    fn store_sticky(&mut self, item: LaneItem) {
        let same_kind = self
            .sticky
            .iter()
            .position(|old| std::mem::discriminant(old) == std::mem::discriminant(&item));
        match same_kind {
            Some(i) => self.sticky[i] = item,
            None => self.sticky.push(item),
        }
    }
}

/// 已接入通道的解析器端口
#[derive(Debug)]
struct InputStream {
    pad: PadId,
    stream: Arc<Stream>,
    lane: Option<LaneId>,
}

#[derive(Debug)]
pub(crate) struct Input {
    id: InputId,
    name: String,
    parser: ParserHandle,
    collection: Option<Arc<StreamCollection>>,
    pending: Vec<PendingConnection>,
    streams: Vec<InputStream>,
    no_more_pads: bool,
    drained: bool,
}

impl Input {
    fn new(id: InputId, name: String) -> Self {
        Self {
            id,
            name,
            parser: ParserHandle::default(),
            collection: None,
            pending: Vec::new(),
            streams: Vec::new(),
            no_more_pads: false,
            drained: false,
        }
    }

    fn is_main(&self) -> bool {
        self.id == InputId::MAIN
    }

    fn key(&self, pad: PadId) -> InputStreamKey {
        InputStreamKey { input: self.id, pad }
    }
}

/// 所有输入, 由输入锁保护
#[derive(Debug)]
pub(crate) struct InputTable {
    inputs: Vec<Input>,
    next_aux: u32,
    about_to_finish_posted: bool,
}

impl InputTable {
    pub fn new() -> Self {
        Self {
            inputs: vec![Input::new(InputId::MAIN, "sink".to_string())],
            next_aux: 0,
            about_to_finish_posted: false,
        }
    }

    fn get(&self, id: InputId) -> TaoResult<&Input> {
        self.inputs
            .iter()
            .find(|i| i.id == id)
            .ok_or_else(|| TaoError::InvalidArgument(format!("未知的输入 {id}")))
    }

    fn get_mut(&mut self, id: InputId) -> TaoResult<&mut Input> {
        self.inputs
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| TaoError::InvalidArgument(format!("未知的输入 {id}")))
    }

    pub fn parser_handles(&self) -> Vec<ParserHandle> {
        self.inputs.iter().map(|i| i.parser.clone()).collect()
    }

    /// 是否还有未见到流结束的待定端口
    pub fn has_unfinished_pending(&self) -> bool {
        self.inputs
            .iter()
            .any(|i| i.pending.iter().any(|p| !p.saw_eos))
    }

    /// 所有已接入通道的输入流
    pub fn linked_lanes(&self) -> Vec<LaneId> {
        self.inputs
            .iter()
            .flat_map(|i| i.streams.iter().filter_map(|s| s.lane))
            .collect()
    }

    /// 停止时的输入侧处理: 已接入的端口回到待定状态, 下次数据流动时重新接入
    pub fn reset(&mut self) {
        self.about_to_finish_posted = false;
        for input in &mut self.inputs {
            input.drained = false;
            for stream in std::mem::take(&mut input.streams) {
                let mut pending = PendingConnection::new(stream.pad, Arc::clone(&stream.stream));
                pending.store_sticky(LaneItem::stream_start(Arc::clone(&stream.stream)));
                if let Some(caps) = stream.stream.caps() {
                    pending.store_sticky(LaneItem::Caps(caps));
                }
                input.pending.push(pending);
            }
        }
    }

    /// 按主输入优先的顺序合并各输入的集合
    fn merged_collection(&self, upstream_id: Option<String>) -> StreamCollection {
        let mut ordered: Vec<&Input> = self.inputs.iter().collect();
        ordered.sort_by_key(|i| !i.is_main());
        StreamCollection::merged(
            upstream_id,
            ordered.into_iter().filter_map(|i| i.collection.as_deref()),
        )
    }
}

impl Shared {
    pub(crate) fn attach_parser(&self, id: InputId, parser: Box<dyn Parser>) -> TaoResult<Effects> {
        let mut fx = Effects::new();
        let inputs = self.inputs.lock();
        let input = inputs.get(id)?;
        debug!("{} 挂接解析器 {}", input.name, parser.name());
        let old = input.parser.lock().replace(parser);
        if let Some(old) = old {
            let retired = ParserHandle(Arc::new(Mutex::new(Some(old))));
            fx.push(Effect::ShutdownParser(retired));
        }
        Ok(fx)
    }

    pub(crate) fn request_input(&self) -> InputId {
        let mut inputs = self.inputs.lock();
        let index = inputs.next_aux;
        inputs.next_aux += 1;
        let id = InputId(index + 1);
        let name = format!("sink_{index}");
        debug!("新建辅助输入 {name}");
        inputs.inputs.push(Input::new(id, name));
        id
    }

    pub(crate) fn release_input(&self, id: InputId) -> TaoResult<Effects> {
        if id == InputId::MAIN {
            return Err(TaoError::InvalidArgument("主输入不能移除".into()));
        }
        let mut fx = Effects::new();
        let mut sel = self.selection.lock();
        let mut inputs = self.inputs.lock();
        let index = inputs
            .inputs
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| TaoError::InvalidArgument(format!("未知的输入 {id}")))?;
        let input = inputs.inputs.remove(index);
        debug!("移除输入 {}", input.name);
        for stream in &input.streams {
            if let Some(lane_id) = stream.lane {
                unlink_lane(&mut sel, lane_id, &mut fx);
            }
        }
        if input.collection.is_some() {
            self.remerge(&mut sel, &inputs, &mut fx);
        }
        fx.push(Effect::ShutdownParser(input.parser));
        Ok(fx)
    }

    pub(crate) fn parser_collection(
        &self,
        id: InputId,
        collection: StreamCollection,
    ) -> TaoResult<Effects> {
        let mut fx = Effects::new();
        let mut sel = self.selection.lock();
        let mut inputs = self.inputs.lock();
        let input = inputs.get_mut(id)?;
        debug!("{} 报告流集合 ({} 条流)", input.name, collection.len());
        input.collection = Some(Arc::new(collection));
        self.remerge(&mut sel, &inputs, &mut fx);
        Ok(fx)
    }

    /// 重新合并各输入的集合, 发布并更新默认选择
    fn remerge(&self, sel: &mut Selection, inputs: &InputTable, fx: &mut Effects) {
        let policy = self.policy.as_ref();
        let merged = inputs
            .merged_collection(policy.merged_collection_id())
            .sorted_by(|a, b| policy.compare_streams(a, b));
        let merged = Arc::new(merged);
        sel.merged = Arc::clone(&merged);
        policy.on_collection(&merged);
        fx.post(Message::StreamCollection(merged));
        sel.update_requested_selection(policy, self.rules);
    }

    pub(crate) fn parser_pad_added(
        &self,
        id: InputId,
        pad: PadId,
        stream: Arc<Stream>,
    ) -> TaoResult<Effects> {
        let mut fx = Effects::new();
        let mut sel = self.selection.lock();
        let mut inputs = self.inputs.lock();
        let input = inputs.get_mut(id)?;
        if !stream.stream_type().is_known() {
            warn!("{} 的端口 {pad} 类型未知 (流 {})", input.name, stream.id());
            self.policy.on_unknown_type(&stream);
            fx.post(Message::Warning(format!(
                "流 {} 的类型未知, 没有可用的解码器",
                stream.id()
            )));
            return Ok(fx);
        }
        debug!("{} 新端口 {pad}: 流 {}", input.name, stream.id());
        input.pending.push(PendingConnection::new(pad, stream));
        if input.no_more_pads {
            self.claim_pending(&mut sel, input, &mut fx);
        }
        Ok(fx)
    }

    pub(crate) fn parser_no_more_pads(&self, id: InputId) -> TaoResult<Effects> {
        let mut fx = Effects::new();
        let mut sel = self.selection.lock();
        let mut inputs = self.inputs.lock();
        let input = inputs.get_mut(id)?;
        input.no_more_pads = true;
        self.claim_pending(&mut sel, input, &mut fx);
        Ok(fx)
    }

    /// 为输入的所有待定端口分配通道并重放缓存的事件
    fn claim_pending(&self, sel: &mut Selection, input: &mut Input, fx: &mut Effects) {
        for pending in std::mem::take(&mut input.pending) {
            let key = input.key(pending.pad);
            let lane = sel.get_lane_for_input(key, &pending.stream, self.policy.as_ref(), fx);
            debug!("{} 端口 {} 接入 {lane}", input.name, pending.pad);
            let starts = matches!(pending.sticky.first(), Some(LaneItem::StreamStart { .. }));
            if !starts {
                fx.intake(lane, LaneItem::stream_start(Arc::clone(&pending.stream)));
            }
            for item in pending.sticky {
                fx.intake(lane, item);
            }
            if pending.saw_eos {
                fx.intake(lane, LaneItem::eos());
            }
            input.streams.push(InputStream {
                pad: pending.pad,
                stream: pending.stream,
                lane: Some(lane),
            });
        }
    }

    pub(crate) fn push_input(
        &self,
        id: InputId,
        pad: PadId,
        item: LaneItem,
    ) -> TaoResult<(Flow, Effects)> {
        let mut fx = Effects::new();
        let mut sel = self.selection.lock();
        let mut inputs = self.inputs.lock();
        let input = inputs.get_mut(id)?;

        if let Some(index) = input.pending.iter().position(|p| p.pad == pad) {
            match &item {
                LaneItem::Buffer(_) => {
                    // 第一个缓冲: 接入该输入的全部待定端口, 然后照常转发
                    self.claim_pending(&mut sel, input, &mut fx);
                }
                LaneItem::Eos(_) => {
                    input.pending[index].saw_eos = true;
                    if input.pending.iter().all(|p| p.saw_eos) {
                        debug!("{} 的待定端口全部结束", input.name);
                        self.claim_pending(&mut sel, input, &mut fx);
                    }
                    return Ok((Flow::Ok, fx));
                }
                _ if item.is_sticky() => {
                    let pending = &mut input.pending[index];
                    if let LaneItem::StreamStart { stream, .. } = &item {
                        pending.stream = Arc::clone(stream);
                    }
                    pending.store_sticky(item);
                    return Ok((Flow::Ok, fx));
                }
                _ => return Ok((Flow::Dropped, fx)),
            }
        }

        let Some(stream) = input.streams.iter_mut().find(|s| s.pad == pad) else {
            return Err(TaoError::InvalidArgument(format!(
                "{} 上没有端口 {pad}",
                input.name
            )));
        };
        let Some(lane_id) = stream.lane else {
            return Ok((Flow::NotLinked, fx));
        };
        if let LaneItem::StreamStart { stream: new, .. } = &item {
            stream.stream = Arc::clone(new);
            if let Some(lane) = sel.lane_mut(lane_id) {
                lane.pending_stream = Some(Arc::clone(new));
            }
        }
        if let LaneItem::Caps(caps) = &item {
            stream.stream.set_caps(caps.clone());
        }
        fx.intake(lane_id, item);
        Ok((Flow::Ok, fx))
    }

    pub(crate) fn parser_pad_removed(&self, id: InputId, pad: PadId) -> TaoResult<Effects> {
        let mut fx = Effects::new();
        let mut sel = self.selection.lock();
        let mut inputs = self.inputs.lock();
        let input = inputs.get_mut(id)?;
        if let Some(index) = input.pending.iter().position(|p| p.pad == pad) {
            debug!("{} 移除待定端口 {pad}", input.name);
            input.pending.remove(index);
            return Ok(fx);
        }
        let Some(index) = input.streams.iter().position(|s| s.pad == pad) else {
            warn!("{} 上没有端口 {pad}", input.name);
            return Ok(fx);
        };
        let stream = input.streams.remove(index);
        debug!("{} 移除端口 {pad} (流 {})", input.name, stream.stream.id());
        if let Some(lane_id) = stream.lane {
            unlink_lane(&mut sel, lane_id, &mut fx);
        }
        Ok(fx)
    }

    pub(crate) fn parser_drained(&self, id: InputId) -> TaoResult<Effects> {
        let mut fx = Effects::new();
        let mut inputs = self.inputs.lock();
        let input = inputs.get_mut(id)?;
        debug!("{} 已排空", input.name);
        input.drained = true;
        if inputs.inputs.iter().all(|i| i.drained) && !inputs.about_to_finish_posted {
            inputs.about_to_finish_posted = true;
            self.policy.on_about_to_finish();
            fx.post(Message::AboutToFinish);
        }
        Ok(fx)
    }
}

/// 断开通道与输入的连接, 并推入内部流结束以清空通道
fn unlink_lane(sel: &mut Selection, lane_id: LaneId, fx: &mut Effects) {
    if let Some(lane) = sel.lane_mut(lane_id) {
        lane.input = None;
    }
    fx.intake(lane_id, LaneItem::Eos(EosKind::Custom));
}
