//! 通道出口.
//!
//! 缓冲队列交出的每个数据项先经过拦截 (`intercept`), 得到转发, 丢弃或替换
//! 的结论, 再交给输出 (`deliver`): 输出带解码器时先解码, 否则直接推给下游.
//! 同一通道上的出口处理与空闲动作互斥.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use log::{debug, trace, warn};
use tao_core::{Caps, SegmentFormat};

use crate::bin::Shared;
use crate::effects::Effects;
use crate::event::{Disposition, EosKind, ExposedPad, Flow, LaneItem, OutletQuery, QueryAnswer};
use crate::lane::LaneId;
use crate::output::{OutputDecoder, check_pts_continuity};

/// 拦截之后需要做的事
#[derive(Debug, Default, Clone, Copy)]
struct Followup {
    /// 转发前重新评估输出绑定与解码器
    refresh: bool,
    /// 处理完成后移除通道
    release: bool,
}

impl Shared {
    pub(crate) fn lane_outlet(&self, lane_id: LaneId, item: LaneItem) -> Flow {
        let Some(flow) = self.selection.lock().lane(lane_id).map(|l| Arc::clone(&l.flow)) else {
            debug!("{lane_id} 已移除, 丢弃 {}", item.name());
            return Flow::Removed;
        };
        flow.enter();
        let result = self.process_outlet(lane_id, item);
        flow.leave(|action| self.run_idle(lane_id, action));
        result
    }

    fn process_outlet(&self, lane_id: LaneId, item: LaneItem) -> Flow {
        let mut fx = Effects::new();
        let (disposition, followup) = self.intercept(lane_id, &item, &mut fx);
        self.apply(fx);
        if followup.refresh {
            self.refresh_lane(lane_id);
        }
        let result = match disposition {
            Disposition::Forward => self.deliver(lane_id, item),
            Disposition::Replace(replacement) => self.deliver(lane_id, replacement),
            Disposition::Drop => {
                trace!("{lane_id} 丢弃 {}", item.name());
                Flow::Dropped
            }
        };
        if followup.release {
            let mut fx = Effects::new();
            self.selection
                .lock()
                .remove_lane(lane_id, self.policy.as_ref(), &mut fx);
            self.apply(fx);
        }
        result
    }

    /// 出口拦截, 持有选择锁
    fn intercept(&self, lane_id: LaneId, item: &LaneItem, fx: &mut Effects) -> (Disposition, Followup) {
        let mut followup = Followup::default();
        let mut sel = self.selection.lock();
        let Some(lane) = sel.lane_mut(lane_id) else {
            return (Disposition::Drop, followup);
        };

        let disposition = match item {
            LaneItem::StreamStart { flushing: true, .. } => Disposition::Drop,
            LaneItem::StreamStart { stream, .. } => {
                lane.drained = false;
                let previous = lane.active_stream.replace(Arc::clone(stream));
                followup.refresh = stream.caps().is_some();
                sel.final_eos_sent = false;
                if let Some(old) = previous.filter(|old| old.id() != stream.id()) {
                    debug!("{lane_id} 的流由 {} 变为 {}", old.id(), stream.id());
                    sel.migrate_stream_id(old.id(), stream.id());
                    if let Some(lane) = sel.lane_mut(lane_id) {
                        lane.old_stream = Some(old);
                    }
                }
                if let Some(message) = sel.update_active_collection(self.policy.as_ref()) {
                    fx.post(message);
                }
                Disposition::Forward
            }
            LaneItem::Caps(caps) => {
                match &lane.active_stream {
                    Some(stream) => {
                        stream.set_caps(caps.clone());
                        followup.refresh = true;
                    }
                    None => warn!("{lane_id} 上没有流, 无法应用 caps {caps}"),
                }
                Disposition::Forward
            }
            LaneItem::Segment(segment) => match sel.output_of_lane_mut(lane_id) {
                _ if segment.format == SegmentFormat::Bytes => {
                    warn!("{lane_id} 不支持字节格式的段");
                    Disposition::Drop
                }
                Some(output)
                    if output.segment.is_defined() && output.segment.format != segment.format =>
                {
                    warn!("{} 的段格式发生变化, 丢弃", output.pad);
                    Disposition::Drop
                }
                Some(output) => {
                    output.segment = segment.clone();
                    Disposition::Forward
                }
                None => Disposition::Forward,
            },
            LaneItem::Buffer(buffer) => {
                let monitor = &self.config.pts_monitor;
                match sel.output_of_lane_mut(lane_id) {
                    Some(output) if monitor.enabled && output.segment.is_normal_rate() => {
                        if check_pts_continuity(&monitor.cache_time, &mut output.last_pushed, buffer)
                        {
                            Disposition::Forward
                        } else {
                            Disposition::Drop
                        }
                    }
                    _ => Disposition::Forward,
                }
            }
            LaneItem::FlushStop => {
                if let Some(output) = sel.output_of_lane_mut(lane_id) {
                    output.reset_timing();
                }
                Disposition::Forward
            }
            LaneItem::FlushStart => Disposition::Forward,
            LaneItem::Eos(kind) => {
                let was_drained = lane.drained;
                lane.drained = true;
                let has_input = lane.input.is_some();
                match kind {
                    EosKind::Final => Disposition::Replace(LaneItem::eos()),
                    EosKind::Custom => {
                        if !has_input {
                            debug!("{lane_id} 的输入已移除, 释放通道");
                            followup.release = true;
                        }
                        if !has_input || !was_drained {
                            self.check_all_drained(&mut sel, fx);
                        }
                        Disposition::Drop
                    }
                    EosKind::Regular if !has_input => {
                        followup.release = true;
                        Disposition::Forward
                    }
                    EosKind::Regular => {
                        self.check_all_drained(&mut sel, fx);
                        Disposition::Drop
                    }
                }
            }
        };
        (disposition, followup)
    }

    /// 把数据交给通道绑定的输出
    fn deliver(&self, lane_id: LaneId, item: LaneItem) -> Flow {
        let (pad, decoder, keyframe_wait) = {
            let mut sel = self.selection.lock();
            let Some(output) = sel.output_of_lane_mut(lane_id) else {
                return Flow::NotLinked;
            };
            if !output.linked {
                return Flow::NotLinked;
            }
            match &item {
                LaneItem::StreamStart { stream, .. } => {
                    if output.announced.as_ref() == Some(stream.id()) {
                        return Flow::Dropped;
                    }
                    output.announced = Some(Arc::clone(stream.id()));
                }
                // 解码器已在重新配置时按该 caps 设置
                LaneItem::Caps(caps) if output.configured_caps.as_ref() == Some(caps) => {
                    return Flow::Dropped;
                }
                _ => {}
            }
            (
                output.pad.clone(),
                output.decoder.clone(),
                Arc::clone(&output.keyframe_wait),
            )
        };
        match decoder {
            None => {
                self.sink.push(&pad, item);
                Flow::Ok
            }
            Some(decoder) => {
                if let LaneItem::Buffer(buffer) = &item {
                    if keyframe_wait.load(Ordering::Acquire) {
                        if !buffer.is_sync_point() {
                            trace!("{pad} 等待关键帧, 丢弃缓冲");
                            return Flow::Dropped;
                        }
                        keyframe_wait.store(false, Ordering::Release);
                    }
                }
                self.decode(&pad, &decoder, item)
            }
        }
    }

    fn decode(&self, pad: &ExposedPad, decoder: &OutputDecoder, item: LaneItem) -> Flow {
        let outputs = match item {
            LaneItem::Buffer(buffer) => match decoder.handle.lock().process(buffer) {
                Ok(buffers) => buffers.into_iter().map(LaneItem::Buffer).collect(),
                Err(e) => {
                    warn!("解码器 {} 处理失败: {e}", decoder.factory);
                    return Flow::Dropped;
                }
            },
            LaneItem::Eos(kind) => {
                let rest = decoder.handle.lock().drain();
                let mut items: Vec<LaneItem> = rest.into_iter().map(LaneItem::Buffer).collect();
                items.push(LaneItem::Eos(kind));
                items
            }
            LaneItem::FlushStop => {
                decoder.handle.lock().flush();
                vec![LaneItem::FlushStop]
            }
            LaneItem::Caps(caps) => match decoder.handle.lock().set_caps(&caps) {
                Ok(out_caps) => vec![LaneItem::Caps(out_caps)],
                Err(e) => {
                    warn!("解码器 {} 拒绝 caps {caps}: {e}", decoder.factory);
                    return Flow::Dropped;
                }
            },
            other => vec![other],
        };
        for item in outputs {
            self.sink.push(pad, item);
        }
        Flow::Ok
    }

    /// 出口查询: 通道出口接受任意 caps
    pub(crate) fn outlet_query(&self, lane_id: LaneId, query: &OutletQuery) -> QueryAnswer {
        trace!("{lane_id} 查询 {query:?}");
        match query {
            OutletQuery::Caps => QueryAnswer::Caps(Caps::any()),
            OutletQuery::AcceptCaps(_) => QueryAnswer::Accept(true),
        }
    }
}
