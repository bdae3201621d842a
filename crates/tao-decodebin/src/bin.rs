//! `DecodeBin` 入口.
//!
//! 对外提供解析器事件入口, 通道出口入口与切换请求入口. 内部状态分为两把锁:
//! 选择锁 (`Selection`) 与输入锁 (`InputTable`), 需要同时持有时总是先取选择锁,
//! 再取输入锁, 最后才是单个解析器的锁. 下游回调, 缓冲队列调用与销毁任务
//! 都在释放锁之后执行.

use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use tao_codec::ElementRegistry;
use tao_core::{Caps, TaoResult};
use tao_format::{Parser, Stream, StreamCollection};

use crate::config::DecodeBinConfig;
use crate::effects::{Effect, Effects};
use crate::event::{ExposedPad, Flow, LaneItem, OutletQuery, QueryAnswer};
use crate::input::{InputId, InputTable, PadId};
use crate::lane::{IdleAction, LaneId};
use crate::policy::{DefaultPolicy, SelectionPolicy};
use crate::selection::{Selection, SelectionRules, SelectionSnapshot};
use crate::sink::{BufferingStage, OutputSink};
use crate::teardown::TeardownQueue;

pub(crate) struct Shared {
    pub config: DecodeBinConfig,
    pub rules: SelectionRules,
    pub policy: Arc<dyn SelectionPolicy>,
    pub registry: Arc<ElementRegistry>,
    pub stage: Arc<dyn BufferingStage>,
    pub sink: Arc<dyn OutputSink>,
    pub selection: Mutex<Selection>,
    pub inputs: Mutex<InputTable>,
    pub teardown: TeardownQueue,
}

impl Shared {
    /// 执行记录下来的副作用, 调用时不能持有任何内部锁
    pub(crate) fn apply(&self, mut fx: Effects) {
        for effect in fx.take() {
            match effect {
                Effect::Post(message) => {
                    debug!("发布消息 {}", message.name());
                    self.sink.post(message);
                }
                Effect::PadAdded(pad) => self.sink.pad_added(&pad),
                Effect::PadRemoved(pad) => self.sink.pad_removed(&pad),
                Effect::Deliver(pad, item) => self.sink.push(&pad, item),
                Effect::Idle(lane, action) => self.schedule_idle(lane, action),
                Effect::CreateLane(lane, stream_type) => {
                    if let Err(e) = self.stage.create_lane(lane, stream_type) {
                        warn!("缓冲队列无法创建通道 {lane}: {e}");
                    }
                }
                Effect::Intake(lane, item) => self.stage.push(lane, item),
                Effect::ReleaseLane(lane) => {
                    let stage = Arc::clone(&self.stage);
                    self.teardown
                        .submit("release-lane", Box::new(move || stage.release_lane(lane)));
                }
                Effect::StopDecoder(factory, decoder) => {
                    debug!("停止解码器 {factory}");
                    self.teardown
                        .submit("stop-decoder", Box::new(move || decoder.lock().stop()));
                }
                Effect::ShutdownParser(parser) => {
                    self.teardown.submit(
                        "shutdown-parser",
                        Box::new(move || {
                            if let Some(mut parser) = parser.lock().take() {
                                parser.shutdown();
                            }
                        }),
                    );
                }
                Effect::Upstream { stream_ids, seqnum } => {
                    self.forward_upstream(&stream_ids, seqnum);
                }
            }
        }
    }

    /// 在通道空闲时执行动作; 通道正在流动时排队
    fn schedule_idle(&self, lane: LaneId, action: IdleAction) {
        let Some(flow) = self.selection.lock().lane(lane).map(|l| Arc::clone(&l.flow)) else {
            debug!("通道 {lane} 已不存在, 忽略空闲动作 {action:?}");
            return;
        };
        if flow.schedule(action) {
            self.run_idle(lane, action);
            flow.leave(|next| self.run_idle(lane, next));
        }
    }

    pub(crate) fn run_idle(&self, lane: LaneId, action: IdleAction) {
        debug!("{lane} 空闲动作 {action:?}");
        match action {
            IdleAction::Unassign => {
                let mut fx = Effects::new();
                self.selection
                    .lock()
                    .reassign_lane(lane, self.policy.as_ref(), &mut fx);
                self.apply(fx);
            }
            IdleAction::Reconfigure => self.refresh_lane(lane),
        }
    }

    /// 为通道确定输出, 配置解码器, 然后检查选择是否完成
    pub(crate) fn refresh_lane(&self, lane: LaneId) {
        let mut fx = Effects::new();
        let attached = self
            .selection
            .lock()
            .get_output_for_lane(lane, self.policy.as_ref(), &mut fx)
            .is_some();
        self.apply(fx);
        if !attached {
            return;
        }
        self.reconfigure_output(lane);
        let mut fx = Effects::new();
        if let Some(message) = self.selection.lock().is_selection_done(self.policy.as_ref()) {
            fx.post(message);
        }
        self.apply(fx);
    }

    /// 销毁所有输出与通道, 清空选择状态
    pub(crate) fn reset(&self) -> Effects {
        let mut fx = Effects::new();
        let mut sel = self.selection.lock();
        let mut inputs = self.inputs.lock();
        let policy = self.policy.as_ref();
        let outputs: Vec<_> = sel.outputs.iter().map(|o| o.id).collect();
        for output in outputs {
            sel.remove_output(output, policy, &mut fx);
        }
        let lanes: Vec<_> = sel.lanes.iter().map(|l| l.id).collect();
        for lane in lanes {
            sel.remove_lane(lane, policy, &mut fx);
        }
        let merged = Arc::clone(&sel.merged);
        *sel = Selection::new(sel.terminal_caps.clone());
        sel.merged = merged;
        sel.update_requested_selection(policy, self.rules);
        inputs.reset();
        debug!("已重置, 默认选择 {:?}", sel.requested.to_vec());
        fx
    }

    /// 把解析器句柄取出后逐个转交, 不在输入锁内调用解析器
    fn forward_upstream(&self, stream_ids: &[Arc<str>], seqnum: u32) {
        let parsers = self.inputs.lock().parser_handles();
        let mut handled = false;
        for parser in &parsers {
            if let Some(parser) = parser.lock().as_mut() {
                handled |= parser.forward_select_streams(stream_ids, seqnum);
            }
        }
        if !handled {
            warn!("没有解析器能提供流 {stream_ids:?}");
        }
    }
}

/// 流路由与解码器生命周期核心
///
/// 可以在多个线程间共享 (`Clone` 只复制句柄).
#[derive(Clone)]
pub struct DecodeBin {
    shared: Arc<Shared>,
}

impl DecodeBin {
    /// 使用默认策略创建
    pub fn new(
        config: DecodeBinConfig,
        registry: Arc<ElementRegistry>,
        stage: Arc<dyn BufferingStage>,
        sink: Arc<dyn OutputSink>,
    ) -> TaoResult<Self> {
        Self::with_policy(config, registry, stage, sink, Arc::new(DefaultPolicy))
    }

    /// 使用自定义策略创建
    pub fn with_policy(
        config: DecodeBinConfig,
        registry: Arc<ElementRegistry>,
        stage: Arc<dyn BufferingStage>,
        sink: Arc<dyn OutputSink>,
        policy: Arc<dyn SelectionPolicy>,
    ) -> TaoResult<Self> {
        let terminal_caps = config.parse_terminal_caps()?;
        let rules = SelectionRules {
            expose_all: config.expose_all,
            wait_collection_posted: config.wait_collection_posted,
        };
        info!(
            "创建 decodebin: {} 个解码器工厂, 终端 caps {terminal_caps}",
            registry.list_decoders().len()
        );
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                rules,
                policy,
                registry,
                stage,
                sink,
                selection: Mutex::new(Selection::new(terminal_caps)),
                inputs: Mutex::new(InputTable::new()),
                teardown: TeardownQueue::new()?,
            }),
        })
    }

    /// 替换可直接输出的终端 caps, 对之后的配置生效
    pub fn set_terminal_caps(&self, caps: Caps) {
        debug!("终端 caps 设为 {caps}");
        self.shared.selection.lock().terminal_caps = caps;
    }

    pub fn terminal_caps(&self) -> Caps {
        self.shared.selection.lock().terminal_caps.clone()
    }

    // ============================================================
    // 输入侧
    // ============================================================

    /// 主输入
    pub fn main_input(&self) -> InputId {
        InputId::MAIN
    }

    /// 为输入挂接解析器, 已有的解析器在后台停止
    pub fn attach_parser(&self, input: InputId, parser: Box<dyn Parser>) -> TaoResult<()> {
        let fx = self.shared.attach_parser(input, parser)?;
        self.shared.apply(fx);
        Ok(())
    }

    /// 新建辅助输入 (`sink_%u`)
    pub fn request_input(&self) -> InputId {
        self.shared.request_input()
    }

    /// 移除辅助输入, 其解析器在后台停止
    pub fn release_input(&self, input: InputId) -> TaoResult<()> {
        let fx = self.shared.release_input(input)?;
        self.shared.apply(fx);
        Ok(())
    }

    /// 解析器报告流集合
    pub fn parser_collection(&self, input: InputId, collection: StreamCollection) -> TaoResult<()> {
        let fx = self.shared.parser_collection(input, collection)?;
        self.shared.apply(fx);
        Ok(())
    }

    /// 解析器出现新的输出端口
    pub fn parser_pad_added(&self, input: InputId, pad: PadId, stream: Arc<Stream>) -> TaoResult<()> {
        let fx = self.shared.parser_pad_added(input, pad, stream)?;
        self.shared.apply(fx);
        Ok(())
    }

    /// 解析器不会再产生新的端口
    pub fn parser_no_more_pads(&self, input: InputId) -> TaoResult<()> {
        let fx = self.shared.parser_no_more_pads(input)?;
        self.shared.apply(fx);
        Ok(())
    }

    /// 解析器端口移除
    pub fn parser_pad_removed(&self, input: InputId, pad: PadId) -> TaoResult<()> {
        let fx = self.shared.parser_pad_removed(input, pad)?;
        self.shared.apply(fx);
        Ok(())
    }

    /// 解析器已排空
    pub fn parser_drained(&self, input: InputId) -> TaoResult<()> {
        let fx = self.shared.parser_drained(input)?;
        self.shared.apply(fx);
        Ok(())
    }

    /// 解析器端口上的数据
    pub fn push_input(&self, input: InputId, pad: PadId, item: LaneItem) -> TaoResult<Flow> {
        let (flow, fx) = self.shared.push_input(input, pad, item)?;
        self.shared.apply(fx);
        Ok(flow)
    }

    // ============================================================
    // 通道出口
    // ============================================================

    /// 缓冲队列交出的数据, 在通道的出口线程上调用
    pub fn lane_outlet(&self, lane: LaneId, item: LaneItem) -> Flow {
        self.shared.lane_outlet(lane, item)
    }

    /// 通道出口上的查询
    pub fn outlet_query(&self, lane: LaneId, query: &OutletQuery) -> QueryAnswer {
        self.shared.outlet_query(lane, query)
    }

    // ============================================================
    // 切换
    // ============================================================

    /// 外部切换请求: 登记后执行切换, 不认识的流 id 转交给解析器
    ///
    /// 重复的序号直接忽略; 处理期间已被新请求覆盖时静默放弃.
    pub fn select_streams(&self, stream_ids: &[Arc<str>], seqnum: u32) -> TaoResult<()> {
        if !self.begin_select_streams(stream_ids, seqnum) {
            return Ok(());
        }
        match self.handle_stream_switch(stream_ids, seqnum) {
            Err(e) if e.is_stale() => Ok(()),
            other => other,
        }
    }

    /// 登记切换请求, 返回 false 表示序号重复
    pub fn begin_select_streams(&self, stream_ids: &[Arc<str>], seqnum: u32) -> bool {
        self.shared.selection.lock().begin_request(stream_ids, seqnum)
    }

    /// 执行已登记的切换请求, 序号已被覆盖时返回 `StaleRequest`
    pub fn handle_stream_switch(&self, stream_ids: &[Arc<str>], seqnum: u32) -> TaoResult<()> {
        let mut fx = Effects::new();
        let result = self.shared.selection.lock().handle_stream_switch(
            stream_ids,
            seqnum,
            self.shared.policy.as_ref(),
            &mut fx,
        );
        self.shared.apply(fx);
        if let Err(e) = &result {
            debug!("切换请求 {seqnum} 未执行: {e}");
        }
        result
    }

    /// 下游在输出端口上发起的切换请求
    pub fn pad_select_streams(
        &self,
        pad: &ExposedPad,
        stream_ids: &[Arc<str>],
        seqnum: u32,
    ) -> TaoResult<()> {
        debug!("端口 {pad} 上的切换请求 (seqnum {seqnum})");
        self.select_streams(stream_ids, seqnum)
    }

    // ============================================================
    // 状态
    // ============================================================

    /// 停止: 销毁所有输出与通道, 清空选择状态, 保留输入
    pub fn reset(&self) {
        let fx = self.shared.reset();
        self.shared.apply(fx);
    }

    /// 等待后台销毁任务全部完成
    pub fn sync_teardown(&self) {
        self.shared.teardown.sync();
    }

    /// 当前状态快照
    pub fn snapshot(&self) -> SelectionSnapshot {
        self.shared.selection.lock().snapshot()
    }
}
