//! 网络拓扑管理
//!
//! 节点、带编号端口的链路、帧的发送与交付，以及统计信息。

use std::collections::HashMap;
use std::net::IpAddr;

use super::deliver_frame::DeliverFrame;
use super::frame::Frame;
use super::header::MacAddr;
use super::id::{LinkId, NodeId, PortNo};
use super::link::Link;
use super::node::{Host, Node, P4Switch};
use super::stats::Stats;
use super::tag::Tag;
use crate::p4::{Pipeline, RuntimeError};
use crate::sim::{SimTime, Simulator};
use tracing::{debug, info, trace, warn};

/// 网络拓扑
#[derive(Default)]
pub struct Network {
    nodes: Vec<Option<Box<dyn Node>>>,
    names: Vec<String>,
    links: Vec<Link>,
    /// 每个节点的出链路，下标 = 端口号 - 1
    ports: Vec<Vec<LinkId>>,
    hosts: HashMap<NodeId, (IpAddr, MacAddr)>,
    next_frame_uid: u64,
    pub stats: Stats,
}

impl Network {
    fn push_node(&mut self, name: String, node: Box<dyn Node>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(node));
        self.names.push(name);
        self.ports.push(Vec::new());
        id
    }

    /// 添加主机节点
    pub fn add_host(&mut self, name: impl Into<String>, ip: IpAddr) -> NodeId {
        let name = name.into();
        let id = NodeId(self.nodes.len());
        let mac = MacAddr::from_index(id.0 as u16);
        self.hosts.insert(id, (ip, mac));
        self.stats.host_mut(&name);
        self.push_node(name.clone(), Box::new(Host::new(id, name, ip, mac)))
    }

    /// 添加由 P4 流水线驱动的交换机
    pub fn add_p4_switch(&mut self, name: impl Into<String>, pipeline: Pipeline) -> NodeId {
        let name = name.into();
        let id = NodeId(self.nodes.len());
        info!(node_id = ?id, name = %name, pipeline = %pipeline.name(), "添加 P4 交换机");
        self.push_node(name.clone(), Box::new(P4Switch::new(id, name, pipeline)))
    }

    /// 双向连接两个节点，返回 `(a 上的端口号, b 上的端口号)`
    pub fn connect(
        &mut self,
        a: NodeId,
        b: NodeId,
        latency: SimTime,
        bandwidth_bps: u64,
    ) -> (PortNo, PortNo) {
        let port_a = self.ports[a.0].len() as PortNo + 1;
        let port_b = self.ports[b.0].len() as PortNo + 1;

        let ab = LinkId(self.links.len());
        self.links.push(Link::new(a, b, port_b, latency, bandwidth_bps));
        let ba = LinkId(self.links.len());
        self.links.push(Link::new(b, a, port_a, latency, bandwidth_bps));

        self.ports[a.0].push(ab);
        self.ports[b.0].push(ba);
        trace!(a = ?a, port_a, b = ?b, port_b, "连接节点");
        (port_a, port_b)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn port_count(&self, node: NodeId) -> usize {
        self.ports[node.0].len()
    }

    pub fn node_name(&self, node: NodeId) -> &str {
        &self.names[node.0]
    }

    /// 主机的 IP 与 MAC 地址
    pub fn host_addr(&self, host: NodeId) -> Option<(IpAddr, MacAddr)> {
        self.hosts.get(&host).copied()
    }

    /// 按 IP 地址查找主机
    pub fn host_by_ip(&self, ip: IpAddr) -> Option<NodeId> {
        self.hosts
            .iter()
            .find(|(_, (addr, _))| *addr == ip)
            .map(|(&id, _)| id)
    }

    /// 分配一个新的帧 uid
    pub fn alloc_frame_uid(&mut self) -> u64 {
        let uid = self.next_frame_uid;
        self.next_frame_uid = self.next_frame_uid.wrapping_add(1);
        uid
    }

    /// 取得某个 P4 交换机（节点正在处理事件时取不到）
    pub fn p4_switch_mut(&mut self, id: NodeId) -> Option<&mut P4Switch> {
        self.nodes
            .get_mut(id.0)?
            .as_mut()?
            .as_any_mut()
            .downcast_mut::<P4Switch>()
    }

    /// 通过控制面通道给交换机下发一条命令
    pub fn switch_command(
        &mut self,
        id: NodeId,
        line: &str,
    ) -> Result<Option<String>, RuntimeError> {
        let sw = self
            .p4_switch_mut(id)
            .ok_or_else(|| RuntimeError::BadCommand {
                line: line.to_string(),
                reason: format!("node {id:?} is not a P4 switch"),
            })?;
        sw.pipeline_mut().run_command(line)
    }

    /// 主机从唯一端口发出一帧
    pub fn send_from_host(&mut self, host: NodeId, frame: Frame, sim: &mut Simulator) {
        let len = frame.len() as u64;
        let name = self.names[host.0].clone();
        let hs = self.stats.host_mut(&name);
        hs.tx_frames += 1;
        hs.tx_bytes += len;
        self.transmit(host, 1, frame, sim);
    }

    /// 从 `from` 的 `port` 发出一帧；端口不存在时丢弃并计数
    #[tracing::instrument(skip(self, frame, sim), fields(uid = frame.uid, from = ?from))]
    pub fn transmit(&mut self, from: NodeId, port: PortNo, frame: Frame, sim: &mut Simulator) {
        let link_id = match (port as usize)
            .checked_sub(1)
            .and_then(|i| self.ports[from.0].get(i))
        {
            Some(&id) => id,
            None => {
                warn!(ports = self.ports[from.0].len(), "⚠️ 出端口不存在，丢弃");
                self.stats.dropped_no_port += 1;
                return;
            }
        };

        let link = &mut self.links[link_id.0];
        let now = sim.now();
        let arrive = link.reserve(now, frame.len());
        let (to, in_port) = (link.to, link.to_port);
        debug!(
            link_id = ?link_id,
            to = ?to,
            in_port,
            now = ?now,
            arrive = ?arrive,
            "🚀 调度帧到达事件"
        );
        sim.schedule(arrive, DeliverFrame { to, in_port, frame });
    }

    /// 将帧交付给节点处理
    #[tracing::instrument(skip(self, frame, sim), fields(uid = frame.uid, to = ?to))]
    pub fn deliver(&mut self, to: NodeId, in_port: PortNo, frame: Frame, sim: &mut Simulator) {
        debug!("📬 将帧交付给节点处理");

        // 暂时把节点取出来，避免 &mut self 与 &mut node 的重叠借用。
        let Some(mut node) = self.nodes[to.0].take() else {
            warn!("节点正在处理中，丢弃重入交付");
            return;
        };
        node.on_frame(in_port, frame, sim, self);
        self.nodes[to.0] = Some(node);
    }

    /// 帧到达主机
    #[tracing::instrument(skip(self, frame), fields(uid = frame.uid, host = ?host))]
    pub(crate) fn on_delivered(&mut self, host: NodeId, frame: Frame, now: SimTime) {
        let len = frame.len() as u64;
        self.stats.delivered_frames += 1;
        self.stats.delivered_bytes += len;

        let sent_at = frame.packet_tags.iter().find_map(|t| match t {
            Tag::SentAt(at) => Some(*at),
            _ => None,
        });
        if let Some(at) = sent_at {
            let latency = now.as_nanos().saturating_sub(at.as_nanos());
            self.stats.total_latency_ns += latency;
            self.stats.max_latency_ns = self.stats.max_latency_ns.max(latency);
        }

        let name = self.names[host.0].clone();
        let hs = self.stats.host_mut(&name);
        hs.rx_frames += 1;
        hs.rx_bytes += len;
        debug!(host = %name, len, "✅ 帧送达主机");
    }
}
