//! 集成测试公共设施: 模拟解析器, 手动驱动的缓冲队列, 计数解码器与记录下游.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tao::codec::{Buffer, BufferFlags, Element, ElementFactory, ElementRegistry, Rank};
use tao::core::{Caps, ClockTime, StreamType, TaoError, TaoResult};
use tao::decodebin::{
    BufferingStage, DecodeBin, DecodeBinConfig, EosKind, ExposedPad, InputId, LaneId, LaneItem,
    Message, OutputSink, PadId,
};
use tao::format::{Parser, Stream, StreamCollection, StreamFlags};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================
// 缓冲队列
// ============================================================

/// 每条通道一个 FIFO, 由测试调用 `pump` 驱动出口
#[derive(Default)]
pub struct FifoStage {
    queues: Mutex<BTreeMap<LaneId, VecDeque<LaneItem>>>,
    created: Mutex<Vec<(LaneId, StreamType)>>,
    released: Mutex<Vec<LaneId>>,
}

impl FifoStage {
    /// 轮流从每条通道取一项交给出口, 直到所有队列为空
    pub fn pump(&self, bin: &DecodeBin) -> usize {
        let mut delivered = 0;
        loop {
            let batch: Vec<(LaneId, LaneItem)> = {
                let mut queues = self.queues.lock();
                queues
                    .iter_mut()
                    .filter_map(|(lane, queue)| queue.pop_front().map(|item| (*lane, item)))
                    .collect()
            };
            if batch.is_empty() {
                return delivered;
            }
            for (lane, item) in batch {
                bin.lane_outlet(lane, item);
                delivered += 1;
            }
        }
    }

    /// 只驱动一条通道, 供多个流线程各自驱动自己的通道
    pub fn pump_lane(&self, bin: &DecodeBin, lane: LaneId) -> usize {
        let mut delivered = 0;
        loop {
            // 出队与交付之间不持锁
            let item = self.queues.lock().get_mut(&lane).and_then(|q| q.pop_front());
            let Some(item) = item else {
                return delivered;
            };
            bin.lane_outlet(lane, item);
            delivered += 1;
        }
    }

    pub fn created(&self) -> Vec<(LaneId, StreamType)> {
        self.created.lock().clone()
    }

    pub fn released(&self) -> Vec<LaneId> {
        self.released.lock().clone()
    }
}

impl BufferingStage for FifoStage {
    fn create_lane(&self, lane: LaneId, stream_type: StreamType) -> TaoResult<()> {
        self.created.lock().push((lane, stream_type));
        self.queues.lock().insert(lane, VecDeque::new());
        Ok(())
    }

    fn push(&self, lane: LaneId, item: LaneItem) {
        self.queues.lock().entry(lane).or_default().push_back(item);
    }

    fn release_lane(&self, lane: LaneId) {
        self.queues.lock().remove(&lane);
        self.released.lock().push(lane);
    }
}

// ============================================================
// 下游
// ============================================================

#[derive(Debug, Clone)]
pub enum SinkEvent {
    PadAdded(String),
    PadRemoved(String),
    Push(String, LaneItem),
    Post(Message),
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    pub fn pads_added(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::PadAdded(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn pads_removed(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::PadRemoved(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Post(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn count_messages(&self, name: &str) -> usize {
        self.messages().iter().filter(|m| m.name() == name).count()
    }

    /// 所有选择完成消息: (序号, 流 id 列表)
    pub fn streams_selected(&self) -> Vec<(Option<u32>, Vec<String>)> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                Message::StreamsSelected {
                    seqnum, streams, ..
                } => Some((seqnum, streams.iter().map(|s| s.id().to_string()).collect())),
                _ => None,
            })
            .collect()
    }

    /// 某个端口收到的数据项
    pub fn items(&self, pad: &str) -> Vec<LaneItem> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Push(name, item) if name == pad => Some(item),
                _ => None,
            })
            .collect()
    }

    pub fn eos_count(&self, pad: &str) -> usize {
        self.items(pad)
            .iter()
            .filter(|item| matches!(item, LaneItem::Eos(EosKind::Regular)))
            .count()
    }

    pub fn buffer_count(&self, pad: &str) -> usize {
        self.items(pad)
            .iter()
            .filter(|item| matches!(item, LaneItem::Buffer(_)))
            .count()
    }
}

impl OutputSink for RecordingSink {
    fn pad_added(&self, pad: &ExposedPad) {
        self.events.lock().push(SinkEvent::PadAdded(pad.name().to_string()));
    }

    fn pad_removed(&self, pad: &ExposedPad) {
        self.events.lock().push(SinkEvent::PadRemoved(pad.name().to_string()));
    }

    fn push(&self, pad: &ExposedPad, item: LaneItem) {
        self.events
            .lock()
            .push(SinkEvent::Push(pad.name().to_string(), item));
    }

    fn post(&self, message: Message) {
        self.events.lock().push(SinkEvent::Post(message));
    }
}

// ============================================================
// 解码器
// ============================================================

/// 把某种压缩格式 "解码" 为原始格式, 数据原样输出
struct MockDecoder {
    name: String,
    media: String,
    raw: String,
    stopped: Arc<AtomicUsize>,
}

impl Element for MockDecoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept_caps(&self, caps: &Caps) -> bool {
        caps.media_name() == Some(self.media.as_str())
    }

    fn set_caps(&mut self, caps: &Caps) -> TaoResult<Caps> {
        if self.accept_caps(caps) {
            Ok(Caps::new_simple(&self.raw))
        } else {
            Err(TaoError::Unsupported(format!("{} 不支持 {caps}", self.name)))
        }
    }

    fn process(&mut self, buffer: Buffer) -> TaoResult<Vec<Buffer>> {
        Ok(vec![buffer])
    }

    fn stop(&mut self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

/// 解码器计数
#[derive(Default, Clone)]
pub struct DecoderStats {
    pub created: Arc<AtomicUsize>,
    pub stopped: Arc<AtomicUsize>,
}

impl DecoderStats {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

pub fn register_mock_decoder(registry: &mut ElementRegistry, name: &str, media: &str, raw: &str) -> DecoderStats {
    let stats = DecoderStats::default();
    let (created, stopped) = (Arc::clone(&stats.created), Arc::clone(&stats.stopped));
    let (name_owned, media_owned, raw_owned) = (name.to_string(), media.to_string(), raw.to_string());
    registry.register_decoder(ElementFactory::new(
        name,
        Rank::PRIMARY,
        Caps::new_simple(media),
        move || {
            created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockDecoder {
                name: name_owned.clone(),
                media: media_owned.clone(),
                raw: raw_owned.clone(),
                stopped: Arc::clone(&stopped),
            }) as Box<dyn Element>)
        },
    ));
    stats
}

/// 能创建但无法启动的解码器
struct BrokenDecoder {
    name: String,
    stopped: Arc<AtomicUsize>,
}

impl Element for BrokenDecoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept_caps(&self, _: &Caps) -> bool {
        true
    }

    fn set_caps(&mut self, caps: &Caps) -> TaoResult<Caps> {
        Ok(caps.clone())
    }

    fn start(&mut self) -> TaoResult<()> {
        Err(TaoError::Codec(format!("{} 启动失败", self.name)))
    }

    fn process(&mut self, buffer: Buffer) -> TaoResult<Vec<Buffer>> {
        Ok(vec![buffer])
    }

    fn stop(&mut self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn register_broken_decoder(registry: &mut ElementRegistry, name: &str, media: &str, rank: Rank) -> DecoderStats {
    let stats = DecoderStats::default();
    let (created, stopped) = (Arc::clone(&stats.created), Arc::clone(&stats.stopped));
    let name_owned = name.to_string();
    registry.register_decoder(ElementFactory::new(
        name,
        rank,
        Caps::new_simple(media),
        move || {
            created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(BrokenDecoder {
                name: name_owned.clone(),
                stopped: Arc::clone(&stopped),
            }) as Box<dyn Element>)
        },
    ));
    stats
}

// ============================================================
// 解析器
// ============================================================

pub type ForwardLog = Arc<Mutex<Vec<(Vec<String>, u32)>>>;

pub struct MockParser {
    pub forwarded: ForwardLog,
    pub shut_down: Arc<AtomicBool>,
}

impl Parser for MockParser {
    fn name(&self) -> &str {
        "mockparse"
    }

    fn forward_select_streams(&mut self, stream_ids: &[Arc<str>], seqnum: u32) -> bool {
        let ids = stream_ids.iter().map(|s| s.to_string()).collect();
        self.forwarded.lock().push((ids, seqnum));
        false
    }

    fn shutdown(&mut self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

// ============================================================
// 组装
// ============================================================

pub struct Harness {
    pub bin: DecodeBin,
    pub stage: Arc<FifoStage>,
    pub sink: Arc<RecordingSink>,
    pub video: DecoderStats,
    pub audio: DecoderStats,
    pub forwarded: ForwardLog,
    pub parser_shut_down: Arc<AtomicBool>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(DecodeBinConfig::default())
    }

    pub fn with_config(config: DecodeBinConfig) -> Self {
        Self::with_decoders(config, |_| {})
    }

    /// 在默认的 h264 与 aac 解码器之外再注册一些解码器
    pub fn with_decoders(config: DecodeBinConfig, extra: impl FnOnce(&mut ElementRegistry)) -> Self {
        init_logger();
        let mut registry = ElementRegistry::new();
        let video = register_mock_decoder(&mut registry, "mockh264dec", "video/x-h264", "video/x-raw");
        let audio = register_mock_decoder(&mut registry, "mockaacdec", "audio/mpeg", "audio/x-raw");
        extra(&mut registry);
        let stage = Arc::new(FifoStage::default());
        let sink = Arc::new(RecordingSink::default());
        let bin = DecodeBin::new(
            config,
            Arc::new(registry),
            Arc::clone(&stage) as Arc<dyn BufferingStage>,
            Arc::clone(&sink) as Arc<dyn OutputSink>,
        )
        .unwrap();
        let forwarded = ForwardLog::default();
        let parser_shut_down = Arc::new(AtomicBool::new(false));
        bin.attach_parser(
            InputId::MAIN,
            Box::new(MockParser {
                forwarded: Arc::clone(&forwarded),
                shut_down: Arc::clone(&parser_shut_down),
            }),
        )
        .unwrap();
        Self {
            bin,
            stage,
            sink,
            video,
            audio,
            forwarded,
            parser_shut_down,
        }
    }

    /// 按 caps 推断类型的流
    pub fn stream(id: &str, caps: &str) -> Arc<Stream> {
        Stream::new(
            id,
            StreamType::empty(),
            Some(caps.parse().unwrap()),
            StreamFlags::empty(),
        )
    }

    /// 在主输入上发布集合, 为每条流建端口并送出流开始与 caps, 最后报告不再有新端口
    pub fn start(&self, streams: &[Arc<Stream>]) {
        self.start_on(InputId::MAIN, streams);
    }

    pub fn start_on(&self, input: InputId, streams: &[Arc<Stream>]) {
        let collection = StreamCollection::new(Some("mockparse".into()), streams.to_vec()).unwrap();
        self.bin.parser_collection(input, collection).unwrap();
        for (pad, stream) in streams.iter().enumerate() {
            let pad = pad as PadId;
            self.bin
                .parser_pad_added(input, pad, Arc::clone(stream))
                .unwrap();
            self.bin
                .push_input(input, pad, LaneItem::stream_start(Arc::clone(stream)))
                .unwrap();
            if let Some(caps) = stream.caps() {
                self.bin.push_input(input, pad, LaneItem::Caps(caps)).unwrap();
            }
        }
        self.bin.parser_no_more_pads(input).unwrap();
    }

    /// 为已开始的输入补充一个端口
    pub fn add_pad(&self, pad: PadId, stream: &Arc<Stream>) {
        self.bin
            .parser_pad_added(InputId::MAIN, pad, Arc::clone(stream))
            .unwrap();
        self.bin
            .push_input(InputId::MAIN, pad, LaneItem::stream_start(Arc::clone(stream)))
            .unwrap();
        if let Some(caps) = stream.caps() {
            self.bin
                .push_input(InputId::MAIN, pad, LaneItem::Caps(caps))
                .unwrap();
        }
    }

    pub fn push_buffer(&self, pad: PadId, pts_ms: u64, keyframe: bool) {
        let flags = if keyframe {
            BufferFlags::empty()
        } else {
            BufferFlags::DELTA_UNIT
        };
        let buffer = Buffer::from_data(vec![0u8; 8])
            .with_pts(ClockTime::from_mseconds(pts_ms))
            .with_flags(flags);
        self.bin
            .push_input(InputId::MAIN, pad, LaneItem::Buffer(buffer))
            .unwrap();
    }

    pub fn push_eos(&self, pad: PadId) {
        self.bin
            .push_input(InputId::MAIN, pad, LaneItem::eos())
            .unwrap();
    }

    pub fn pump(&self) -> usize {
        self.stage.pump(&self.bin)
    }

    /// 选择状态不变式
    pub fn assert_invariants(&self) {
        let snapshot = self.bin.snapshot();
        for id in &snapshot.active {
            assert!(
                snapshot
                    .lanes
                    .iter()
                    .any(|l| l.active_stream.as_deref() == Some(&**id)),
                "活动流 {id} 没有对应的通道"
            );
        }
        let mut requested_types = StreamType::empty();
        let mut distinct = 0;
        for id in &snapshot.requested {
            if let Some(stream) = snapshot.merged.find(id) {
                if !requested_types.intersects(stream.stream_type()) {
                    distinct += 1;
                    requested_types |= stream.stream_type();
                }
            }
        }
        assert!(
            snapshot.outputs.len() <= distinct + snapshot.to_activate.len(),
            "输出数 {} 超过请求的类型数 {distinct} + 待激活数 {}",
            snapshot.outputs.len(),
            snapshot.to_activate.len()
        );
    }
}

pub fn ids(list: &[&str]) -> Vec<Arc<str>> {
    list.iter().map(|s| Arc::from(*s)).collect()
}
