//! 输出流.
//!
//! 输出流是对下游暴露的端口, 可以带一个解码器, 同一时刻至多绑定一个通道.
//! 解码器的选择与切换在 `reconfigure_output` 中分三步完成: 持锁制定计划,
//! 释放锁创建或复用解码器, 再持锁校验绑定关系并提交结果.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, trace, warn};
use parking_lot::{Mutex, MutexGuard};
use tao_codec::{Buffer, Element, ElementFactory};
use tao_core::{Caps, ClockTime, Segment, StreamType, TaoError, TaoResult};
use tao_format::Stream;

use crate::bin::Shared;
use crate::config::CacheTimePolicy;
use crate::effects::{Effect, Effects};
use crate::event::{ExposedPad, LaneItem, Message};
use crate::lane::LaneId;

/// 输出标识, 单调递增, 不复用
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputId(pub u32);

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output{}", self.0)
    }
}

/// 共享的解码器实例
#[derive(Clone)]
pub struct DecoderHandle(Arc<Mutex<Box<dyn Element>>>);

impl DecoderHandle {
    pub fn new(element: Box<dyn Element>) -> Self {
        Self(Arc::new(Mutex::new(element)))
    }

    pub fn lock(&self) -> MutexGuard<'_, Box<dyn Element>> {
        self.0.lock()
    }
}

impl fmt::Debug for DecoderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_lock() {
            Some(element) => f.debug_tuple("DecoderHandle").field(&element.name()).finish(),
            None => f.write_str("DecoderHandle(<busy>)"),
        }
    }
}

/// 输出上挂接的解码器
#[derive(Debug, Clone)]
pub struct OutputDecoder {
    /// 工厂名
    pub factory: String,
    pub handle: DecoderHandle,
}

/// 输出流
#[derive(Debug)]
pub struct OutputStream {
    pub id: OutputId,
    pub stream_type: StreamType,
    pub pad: ExposedPad,
    /// 绑定的通道
    pub lane: Option<LaneId>,
    pub decoder: Option<OutputDecoder>,
    /// 数据路径已接通
    pub linked: bool,
    /// 端口已对下游暴露
    pub exposed: bool,
    /// 当前生效的输入 caps
    pub configured_caps: Option<Caps>,
    /// 已向下游宣告的流 id
    pub announced: Option<Arc<str>>,
    /// 丢弃非关键帧直到第一个关键帧
    pub keyframe_wait: Arc<AtomicBool>,
    pub segment: Segment,
    /// 时间戳监视: 上一个放行缓冲的时间
    pub last_pushed: Option<ClockTime>,
}

impl OutputStream {
    pub fn new(id: OutputId, stream_type: StreamType, pad: ExposedPad) -> Self {
        Self {
            id,
            stream_type,
            pad,
            lane: None,
            decoder: None,
            linked: false,
            exposed: false,
            configured_caps: None,
            announced: None,
            keyframe_wait: Arc::new(AtomicBool::new(false)),
            segment: Segment::undefined(),
            last_pushed: None,
        }
    }

    /// 清空段与时间戳监视状态
    pub fn reset_timing(&mut self) {
        self.segment = Segment::undefined();
        self.last_pushed = None;
    }
}

/// 时间戳连续性检查, 返回 false 表示丢弃该缓冲
///
/// 时间戳回退的缓冲被丢弃; 间隔与估算的缓存时长不符时只记录日志.
pub fn check_pts_continuity(
    cache_time: &CacheTimePolicy,
    last: &mut Option<ClockTime>,
    buffer: &Buffer,
) -> bool {
    let (Some(prev), Some(cur)) = (*last, buffer.pts) else {
        if let Some(pts) = buffer.pts {
            *last = Some(pts);
        }
        return true;
    };
    if prev > cur {
        warn!("时间戳回退 {prev} -> {cur}, 丢弃缓冲");
        return false;
    }
    let delta = cur.checked_sub(prev);
    let cache = cache_time.estimate(buffer, delta);
    if delta.is_some_and(|d| d > cache) {
        debug!("时间戳间隔 {} 超过缓存时长 {cache}", cur - prev);
    }
    *last = Some(cur);
    true
}

/// 第二步的结果
enum DecoderChoice {
    /// 不需要解码
    Passthrough { out_caps: Caps },
    /// 复用现有解码器
    Reuse { out_caps: Caps },
    /// 新建解码器
    New { decoder: OutputDecoder, out_caps: Caps },
    /// 没有可用解码器
    Missing,
}

/// 放弃已做出的解码器选择
///
/// 复用时解码器已按新 caps 配置, 清除输出记录的 caps 使下次配置重新执行.
fn discard_choice(output: Option<&mut OutputStream>, choice: DecoderChoice, fx: &mut Effects) {
    match choice {
        DecoderChoice::New { decoder, .. } => {
            fx.push(Effect::StopDecoder(decoder.factory, decoder.handle));
        }
        DecoderChoice::Reuse { .. } => {
            if let Some(output) = output {
                output.configured_caps = None;
            }
        }
        DecoderChoice::Passthrough { .. } | DecoderChoice::Missing => {}
    }
}

struct ReconfigurePlan {
    output: OutputId,
    stream: Arc<Stream>,
    caps: Caps,
    needs_decoder: bool,
    current: Option<OutputDecoder>,
}

impl Shared {
    /// 重新评估通道输出的解码器配置, 并在成功后接通和暴露输出
    pub(crate) fn reconfigure_output(&self, lane_id: LaneId) {
        let Some(plan) = self.plan_reconfigure(lane_id) else {
            return;
        };
        let choice = self.choose_decoder(&plan);
        let mut fx = Effects::new();
        {
            let mut sel = self.selection.lock();
            let still_bound = sel.lane(lane_id).is_some_and(|l| {
                l.output == Some(plan.output)
                    && l.active_id().is_some_and(|id| id == plan.stream.id())
            });
            if !still_bound {
                debug!("{lane_id} 的绑定已改变, 放弃本次配置");
                discard_choice(sel.output_mut(plan.output), choice, &mut fx);
            } else if let Some(output) = sel.output_mut(plan.output) {
                let out_caps = match choice {
                    DecoderChoice::Missing => {
                        if let Some(old) = output.decoder.take() {
                            fx.push(Effect::StopDecoder(old.factory, old.handle));
                        }
                        output.linked = false;
                        output.configured_caps = None;
                        warn!("流 {} 没有可用的解码器 ({})", plan.stream.id(), plan.caps);
                        self.policy.on_missing_decoder(&plan.stream, &plan.caps);
                        fx.post(Message::MissingDecoder {
                            stream_id: Arc::clone(plan.stream.id()),
                            caps: plan.caps.clone(),
                        });
                        None
                    }
                    DecoderChoice::Passthrough { out_caps } => {
                        if let Some(old) = output.decoder.take() {
                            fx.push(Effect::StopDecoder(old.factory, old.handle));
                        }
                        Some(out_caps)
                    }
                    DecoderChoice::Reuse { out_caps } => Some(out_caps),
                    DecoderChoice::New { decoder, out_caps } => {
                        if let Some(old) = output.decoder.replace(decoder) {
                            fx.push(Effect::StopDecoder(old.factory, old.handle));
                        }
                        output.keyframe_wait.store(
                            self.policy.wait_for_keyframe(output.stream_type),
                            Ordering::Release,
                        );
                        Some(out_caps)
                    }
                };
                if let Some(out_caps) = out_caps {
                    if !output.linked && self.policy.wait_for_keyframe(output.stream_type) {
                        output.keyframe_wait.store(true, Ordering::Release);
                    }
                    output.linked = true;
                    output.configured_caps = Some(plan.caps.clone());
                    if !output.exposed {
                        output.exposed = true;
                        debug!("暴露输出端口 {}", output.pad);
                        self.policy.on_output_exposed(&output.pad);
                        fx.push(Effect::PadAdded(output.pad.clone()));
                    }
                    let pad = output.pad.clone();
                    if output.announced.as_ref() != Some(plan.stream.id()) {
                        output.announced = Some(Arc::clone(plan.stream.id()));
                        fx.push(Effect::Deliver(
                            pad.clone(),
                            LaneItem::stream_start(Arc::clone(&plan.stream)),
                        ));
                    }
                    fx.push(Effect::Deliver(pad.clone(), LaneItem::Caps(out_caps)));
                    if output.segment.is_defined() {
                        fx.push(Effect::Deliver(pad, LaneItem::Segment(output.segment.clone())));
                    }
                }
            }
        }
        self.apply(fx);
    }

    /// 第一步: 持锁检查是否需要重新配置
    fn plan_reconfigure(&self, lane_id: LaneId) -> Option<ReconfigurePlan> {
        let sel = self.selection.lock();
        let lane = sel.lane(lane_id)?;
        let output_id = lane.output?;
        let stream = lane.active_stream.clone()?;
        let Some(caps) = stream.caps() else {
            debug!("流 {} 的 caps 尚未确定", stream.id());
            return None;
        };
        let output = sel.output(output_id)?;
        if output.linked && output.configured_caps.as_ref() == Some(&caps) {
            trace!("{} 配置未变化", output.pad);
            return None;
        }
        Some(ReconfigurePlan {
            output: output_id,
            needs_decoder: self.policy.needs_decoder(&caps, &sel.terminal_caps),
            current: output.decoder.clone(),
            stream,
            caps,
        })
    }

    /// 第二步: 不持锁地复用或创建解码器
    fn choose_decoder(&self, plan: &ReconfigurePlan) -> DecoderChoice {
        if !plan.needs_decoder {
            return DecoderChoice::Passthrough {
                out_caps: plan.caps.clone(),
            };
        }
        if let Some(current) = &plan.current {
            let mut element = current.handle.lock();
            if element.accept_caps(&plan.caps) {
                match element.set_caps(&plan.caps) {
                    Ok(out_caps) => {
                        debug!("复用解码器 {} 处理 {}", current.factory, plan.caps);
                        return DecoderChoice::Reuse { out_caps };
                    }
                    Err(e) => warn!("解码器 {} 无法重新配置: {e}", current.factory),
                }
            }
        }
        for factory in self.registry.find_decoders(&plan.caps) {
            if !self.policy.allow_factory(&plan.stream, &factory) {
                debug!("策略跳过解码器 {}", factory.name());
                continue;
            }
            match self.instantiate(&factory, &plan.caps) {
                Ok((decoder, out_caps)) => return DecoderChoice::New { decoder, out_caps },
                Err(e) => warn!("{e}"),
            }
        }
        DecoderChoice::Missing
    }

    fn instantiate(
        &self,
        factory: &ElementFactory,
        caps: &Caps,
    ) -> TaoResult<(OutputDecoder, Caps)> {
        let mut element = factory.create()?;
        let configured = element
            .set_caps(caps)
            .and_then(|out_caps| element.start().map(|()| out_caps));
        match configured {
            Ok(out_caps) => {
                debug!("创建解码器 {} 处理 {caps}", factory.name());
                let decoder = OutputDecoder {
                    factory: factory.name().to_string(),
                    handle: DecoderHandle::new(element),
                };
                Ok((decoder, out_caps))
            }
            Err(e) => {
                let name = factory.name().to_string();
                self.teardown
                    .submit("stop-decoder", Box::new(move || element.stop()));
                Err(TaoError::LinkFailure(format!("解码器 {name} 接入失败: {e}")))
            }
        }
    }
}
