//! 统计信息
//!
//! 一次仿真运行的帧计数，可直接序列化为 JSON 摘要。

use std::collections::BTreeMap;

use serde::Serialize;

/// 单个主机的收发计数
#[derive(Debug, Default, Clone, Serialize)]
pub struct HostStats {
    pub tx_frames: u64,
    pub tx_bytes: u64,
    pub rx_frames: u64,
    pub rx_bytes: u64,
}

/// 网络统计信息
#[derive(Debug, Default, Clone, Serialize)]
pub struct Stats {
    pub delivered_frames: u64,
    pub delivered_bytes: u64,
    /// 出端口不存在而被丢弃的帧
    pub dropped_no_port: u64,
    /// 进入 P4 交换机的帧
    pub switch_rx_frames: u64,
    /// P4 交换机发出的帧（组播时一入多出）
    pub switch_tx_frames: u64,
    /// 带发送时间标签的已送达帧的端到端时延
    pub total_latency_ns: u64,
    pub max_latency_ns: u64,
    pub hosts: BTreeMap<String, HostStats>,
}

impl Stats {
    /// 平均端到端时延（纳秒）
    pub fn avg_latency_ns(&self) -> u64 {
        self.total_latency_ns
            .checked_div(self.delivered_frames)
            .unwrap_or(0)
    }

    pub fn host(&self, name: &str) -> Option<&HostStats> {
        self.hosts.get(name)
    }

    pub(crate) fn host_mut(&mut self, name: &str) -> &mut HostStats {
        self.hosts.entry(name.to_string()).or_default()
    }
}
