//! 外部切换请求.
//!
//! 请求带有递增的序号, 新请求覆盖旧请求. 处理时把通道分为保持, 待激活,
//! 待停用三类, 同类型的待激活与待停用两两配对, 配对成功的通道直接转交输出
//! (保留解码器), 未配对的分别唤醒或解绑.

use std::sync::Arc;

use log::{debug, warn};
use tao_core::{TaoError, TaoResult};

use crate::effects::{Effect, Effects};
use crate::event::Message;
use crate::id_set::IdSet;
use crate::lane::{IdleAction, LaneId};
use crate::policy::SelectionPolicy;
use crate::selection::Selection;

impl Selection {
    /// 登记切换请求; 序号与当前请求相同时返回 false
    pub fn begin_request(&mut self, stream_ids: &[Arc<str>], seqnum: u32) -> bool {
        if self.seqnum == Some(seqnum) {
            debug!("重复的切换请求 (seqnum {seqnum}), 忽略");
            return false;
        }
        debug!("登记切换请求 {seqnum}: {stream_ids:?}");
        self.seqnum = Some(seqnum);
        self.pending_request = Some(stream_ids.to_vec());
        true
    }

    /// 执行切换请求
    pub fn handle_stream_switch(
        &mut self,
        stream_ids: &[Arc<str>],
        seqnum: u32,
        policy: &dyn SelectionPolicy,
        fx: &mut Effects,
    ) -> TaoResult<()> {
        if self.seqnum != Some(seqnum) {
            return Err(TaoError::StaleRequest {
                expected: self.seqnum.unwrap_or_default(),
                got: seqnum,
            });
        }
        policy.on_stream_switch(stream_ids, seqnum);

        let mut future = IdSet::new();
        let mut to_activate: Vec<(LaneId, Arc<str>)> = Vec::new();
        let mut unknown: Vec<Arc<str>> = Vec::new();
        let mut not_flowing = false;

        for sid in stream_ids {
            let lane = self.find_lane_for_stream_id(sid).and_then(|id| self.lane(id));
            match lane {
                None if self.merged.contains(sid) => {
                    debug!("流 {sid} 尚未流动, 等待其通道出现");
                    not_flowing = true;
                }
                None => {
                    warn!("请求的流 {sid} 不在集合中");
                    unknown.push(Arc::clone(sid));
                    continue;
                }
                Some(lane) if lane.output.is_none() => {
                    if to_activate.iter().all(|(id, _)| *id != lane.id) {
                        to_activate.push((lane.id, Arc::clone(sid)));
                    }
                }
                Some(_) => debug!("流 {sid} 已经在输出"),
            }
            future.insert(Arc::clone(sid));
        }

        // 只等待尚未流动的流: 旧输出保留, 新通道出现时按类型抢占
        if to_activate.is_empty() && not_flowing {
            debug!("切换 {seqnum}: 请求的流尚未流动, 暂不停用任何输出");
            self.requested = future;
            self.dirty = true;
            self.pending_request = None;
            self.post_unknown(unknown, seqnum, fx);
            return Ok(());
        }

        // 有输出的通道, 活动流与待定流都不再被请求时停用
        let to_deactivate: Vec<LaneId> = self
            .lanes
            .iter()
            .filter(|lane| lane.output.is_some())
            .filter(|lane| {
                let requested = |id: Option<&Arc<str>>| id.is_some_and(|id| future.contains(id));
                !requested(lane.active_id())
                    && !requested(lane.pending_stream.as_ref().map(|s| s.id()))
            })
            .map(|lane| lane.id)
            .collect();
        debug!(
            "切换 {seqnum}: 待激活 {to_activate:?}, 待停用 {to_deactivate:?}, 未知 {unknown:?}"
        );

        // 同类型配对: 停用的通道把输出转交给激活的通道
        let mut unassign = Vec::new();
        for deactivate in to_deactivate {
            let Some(stream_type) = self.lane(deactivate).map(|l| l.stream_type) else {
                continue;
            };
            let paired = to_activate
                .iter()
                .position(|(id, _)| self.lane(*id).is_some_and(|l| l.stream_type == stream_type));
            if let Some(index) = paired {
                let (target, sid) = to_activate.remove(index);
                debug!("{deactivate} 的输出将转交给 {target} (流 {sid})");
                future.remove(&sid);
                self.to_activate.insert(sid);
            }
            unassign.push(deactivate);
        }

        self.requested = future;
        self.dirty = true;
        self.pending_request = None;

        for lane in unassign {
            fx.idle(lane, IdleAction::Unassign);
        }
        for (lane, _) in to_activate {
            fx.idle(lane, IdleAction::Reconfigure);
        }
        self.post_unknown(unknown, seqnum, fx);
        Ok(())
    }

    /// 集合中不存在的流交给上游处理
    fn post_unknown(&self, unknown: Vec<Arc<str>>, seqnum: u32, fx: &mut Effects) {
        if unknown.is_empty() {
            return;
        }
        fx.push(Effect::Upstream {
            stream_ids: unknown.clone(),
            seqnum,
        });
        fx.post(Message::UnknownStreams {
            seqnum,
            stream_ids: unknown,
        });
    }
}
