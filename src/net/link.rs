//! 链路
//!
//! 单向链路，一帧的到达时间 = 出端空闲时刻 + 串行化时延 + 传播时延。
//! 不建模队列容量，出端忙时帧只是顺延。

use super::id::{NodeId, PortNo};
use crate::sim::SimTime;

#[derive(Debug)]
pub struct Link {
    pub from: NodeId,
    pub to: NodeId,
    /// 帧在 `to` 上的入端口
    pub to_port: PortNo,
    pub latency: SimTime,
    pub bandwidth_bps: u64,
    /// 上一帧发完的时刻
    pub free_at: SimTime,
}

impl Link {
    pub fn new(
        from: NodeId,
        to: NodeId,
        to_port: PortNo,
        latency: SimTime,
        bandwidth_bps: u64,
    ) -> Self {
        Self {
            from,
            to,
            to_port,
            latency,
            bandwidth_bps,
            free_at: SimTime::ZERO,
        }
    }

    /// 串行化时延，向上取整到纳秒；带宽为 0 的链路视为永远发不完
    pub fn tx_time(&self, bytes: usize) -> SimTime {
        let bps = self.bandwidth_bps as u128;
        if bps == 0 {
            return SimTime(u64::MAX / 4);
        }
        let nanos = (bytes as u128 * 8 * 1_000_000_000).div_ceil(bps);
        SimTime(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// 占用链路发送一帧，返回它到达对端的时刻
    pub(crate) fn reserve(&mut self, now: SimTime, bytes: usize) -> SimTime {
        let depart = now.max(self.free_at).saturating_add(self.tx_time(bytes));
        self.free_at = depart;
        depart.saturating_add(self.latency)
    }
}
