//! 排空检测与最终流结束.
//!
//! 解析器的流结束在通道出口被拦下, 只标记通道已排空. 所有带输出的通道都排空,
//! 且没有仍可能产生数据的待定端口时, 向每条已接入的通道入口推入一个
//! 刷新用的流开始和一个最终流结束, 最终流结束到达出口后才真正发往下游.

use log::debug;

use crate::bin::Shared;
use crate::effects::Effects;
use crate::event::{EosKind, LaneItem};
use crate::selection::Selection;

impl Shared {
    /// 调用方持有选择锁, 本函数会再取输入锁
    pub(crate) fn check_all_drained(&self, sel: &mut Selection, fx: &mut Effects) {
        if sel.final_eos_sent {
            return;
        }
        if let Some(lane) = sel.lanes.iter().find(|l| l.output.is_some() && !l.drained) {
            debug!("{} 尚未排空", lane.id);
            return;
        }
        let lanes = {
            let inputs = self.inputs.lock();
            if inputs.has_unfinished_pending() {
                debug!("仍有未接入的端口, 暂不结束");
                return;
            }
            inputs.linked_lanes()
        };
        debug!("所有通道已排空, 向 {} 条通道推送最终流结束", lanes.len());
        for lane_id in lanes {
            let Some(lane) = sel.lane(lane_id) else {
                continue;
            };
            let Some(stream) = lane.active_stream.clone().or_else(|| lane.pending_stream.clone())
            else {
                continue;
            };
            fx.intake(
                lane_id,
                LaneItem::StreamStart {
                    stream,
                    flushing: true,
                },
            );
            fx.intake(lane_id, LaneItem::Eos(EosKind::Final));
        }
        sel.final_eos_sent = true;
    }
}
