//! 演示和示例代码
//!
//! 内置的 basic_switch 程序（IPv4/IPv6 LPM 单播或组播、组播剪枝、
//! 按 replication id 过滤副本、TTL / hop limit 递减），star 拓扑的默认
//! 控制面命令，以及流量注入事件。

use std::fmt::Write as _;
use std::net::IpAddr;
use std::sync::Arc;

use crate::net::{Frame, MacAddr, NetWorld, NodeId, Tag};
use crate::p4::runtime::{ProgramSpec, Runtime};
use crate::p4::{
    Control, DEFAULT_DROP_PORT, FieldId, FieldLayout, HeaderId, InstanceType, Pipeline,
    PipelineConfig, PipelineContext, PipelineError, PipelinePacket, ReferenceRuntime,
    RuntimeError, TableStore,
};
use crate::sim::{Event, SimTime, Simulator, World};
use tracing::{debug, trace};

/// 内置程序描述
pub const BASIC_SWITCH_JSON: &str = include_str!("../programs/basic_switch.json");

/// 组播组 1 对应的 IPv4 前缀
pub const MCAST_V4_PREFIX: &str = "10.0.255.0/24";
/// 组播组 1 对应的 IPv6 前缀
pub const MCAST_V6_PREFIX: &str = "ff0e::/16";

/// Ethernet + IPv4 + UDP 头长
const V4_UDP_OVERHEAD: usize = 14 + 20 + 8;
/// Ethernet + IPv6 + UDP 头长
const V6_UDP_OVERHEAD: usize = 14 + 40 + 8;

pub fn basic_program() -> Result<ProgramSpec, RuntimeError> {
    ProgramSpec::from_json(BASIC_SWITCH_JSON)
}

/// basic_switch 控制块用到的字段
#[derive(Debug, Clone, Copy)]
struct BasicFields {
    ingress_port: FieldId,
    egress_spec: FieldId,
    egress_port: FieldId,
    instance_type: FieldId,
    checksum_error: FieldId,
    mcast_grp: FieldId,
    ipv4: HeaderId,
    ipv4_ttl: FieldId,
    ipv6: HeaderId,
    ipv6_hop_limit: FieldId,
}

impl BasicFields {
    fn resolve(layout: &FieldLayout) -> Result<Self, RuntimeError> {
        Ok(Self {
            ingress_port: layout.require_field("standard_metadata.ingress_port")?,
            egress_spec: layout.require_field("standard_metadata.egress_spec")?,
            egress_port: layout.require_field("standard_metadata.egress_port")?,
            instance_type: layout.require_field("standard_metadata.instance_type")?,
            checksum_error: layout.require_field("standard_metadata.checksum_error")?,
            mcast_grp: layout.require_field("intrinsic_metadata.mcast_grp")?,
            ipv4: layout.require_header("ipv4")?,
            ipv4_ttl: layout.require_field("ipv4.ttl")?,
            ipv6: layout.require_header("ipv6")?,
            ipv6_hop_limit: layout.require_field("ipv6.hop_limit")?,
        })
    }

    fn mark_drop(&self, pkt: &mut PipelinePacket) {
        pkt.set(self.egress_spec, DEFAULT_DROP_PORT as u128);
    }
}

/// ingress：按目的地址查 LPM 表，选出端口或组播组
#[derive(Debug)]
pub struct BasicIngress {
    f: BasicFields,
}

impl Control for BasicIngress {
    fn apply(&mut self, pkt: &mut PipelinePacket, tables: &TableStore) {
        let f = &self.f;
        if pkt.get(f.checksum_error) != 0 {
            debug!(pkt_id = pkt.id(), "IPv4 校验和错误，丢弃");
            f.mark_drop(pkt);
            return;
        }

        let call = if pkt.is_valid(f.ipv4) {
            tables.lookup_packet("ipv4_lpm", pkt)
        } else if pkt.is_valid(f.ipv6) {
            tables.lookup_packet("ipv6_lpm", pkt)
        } else {
            None
        };

        match call.map(|c| (c.action.as_str(), c.arg(0))) {
            Some(("forward", port)) => pkt.set(f.egress_spec, port),
            Some(("multicast", mgid)) => pkt.set(f.mcast_grp, mgid),
            _ => f.mark_drop(pkt),
        }
    }
}

/// egress：剪掉回到入端口的副本，按 rid 过滤副本，递减 TTL / hop limit
#[derive(Debug)]
pub struct BasicEgress {
    f: BasicFields,
}

impl Control for BasicEgress {
    fn apply(&mut self, pkt: &mut PipelinePacket, tables: &TableStore) {
        let f = &self.f;
        if pkt.get(f.instance_type) == InstanceType::Replication.code() {
            if pkt.get(f.egress_port) == pkt.get(f.ingress_port) {
                trace!(pkt_id = pkt.id(), copy_id = pkt.copy_id(), "组播副本回到入端口，剪枝");
                f.mark_drop(pkt);
                return;
            }
            if tables.lookup_packet("rid_filter", pkt).is_some() {
                trace!(pkt_id = pkt.id(), copy_id = pkt.copy_id(), "rid_filter 命中，丢弃副本");
                f.mark_drop(pkt);
                return;
            }
        }

        let ttl = if pkt.is_valid(f.ipv4) {
            Some(f.ipv4_ttl)
        } else if pkt.is_valid(f.ipv6) {
            Some(f.ipv6_hop_limit)
        } else {
            None
        };
        if let Some(id) = ttl {
            match pkt.get(id) {
                0 | 1 => f.mark_drop(pkt),
                v => pkt.set(id, v - 1),
            }
        }
    }
}

/// 给参考运行时装上 basic_switch 的控制块
pub fn basic_runtime(program: ProgramSpec) -> Result<ReferenceRuntime, RuntimeError> {
    let rt = ReferenceRuntime::new(program)?;
    let f = BasicFields::resolve(rt.layout())?;
    Ok(rt
        .with_ingress(BasicIngress { f })
        .with_egress(BasicEgress { f }))
}

/// 构造 basic_switch 流水线
pub fn basic_pipeline(
    ctx: Arc<PipelineContext>,
    program: ProgramSpec,
    cfg: PipelineConfig,
) -> Result<Pipeline, PipelineError> {
    let rt = basic_runtime(program)?;
    Pipeline::new(ctx, Box::new(rt), cfg)
}

/// star 拓扑的默认控制面命令
///
/// 每个主机一条 /32（/128）单播表项；组播组 1 包含所有主机端口，
/// 每个端口一个节点（rid = 端口号）。
pub fn star_commands(host_ips: &[IpAddr]) -> String {
    let mut out = String::new();
    for (i, ip) in host_ips.iter().enumerate() {
        let port = i + 1;
        let _ = match ip {
            IpAddr::V4(v4) => writeln!(out, "table_add ipv4_lpm forward {v4}/32 => {port}"),
            IpAddr::V6(v6) => writeln!(out, "table_add ipv6_lpm forward {v6}/128 => {port}"),
        };
    }
    out.push_str("mc_mgrp_create 1\n");
    for i in 0..host_ips.len() {
        let port = i + 1;
        let _ = writeln!(out, "mc_node_create {port} {port}");
    }
    for handle in 0..host_ips.len() {
        let _ = writeln!(out, "mc_node_associate 1 {handle}");
    }
    let _ = writeln!(out, "table_add ipv4_lpm multicast {MCAST_V4_PREFIX} => 1");
    let _ = writeln!(out, "table_add ipv6_lpm multicast {MCAST_V6_PREFIX} => 1");
    out
}

/// 流量注入事件
///
/// 从 `src` 主机按固定间隔发出 UDP 帧
#[derive(Debug)]
pub struct InjectFlow {
    pub flow_id: u64,
    pub src: NodeId,
    pub dst_ip: IpAddr,
    /// 整帧字节数（含各层头）
    pub pkt_bytes: usize,
    pub remaining: u64,
    pub gap: SimTime,
}

impl InjectFlow {
    fn make_frame(&self, w: &mut NetWorld, now: SimTime) -> Option<Frame> {
        let (src_ip, src_mac) = w.net.host_addr(self.src)?;
        let dst_mac = w
            .net
            .host_by_ip(self.dst_ip)
            .and_then(|h| w.net.host_addr(h))
            .map_or(MacAddr::BROADCAST, |(_, mac)| mac);
        let overhead = if src_ip.is_ipv4() {
            V4_UDP_OVERHEAD
        } else {
            V6_UDP_OVERHEAD
        };
        let payload = vec![0u8; self.pkt_bytes.saturating_sub(overhead)];
        let uid = w.net.alloc_frame_uid();
        let port = 10_000 + (self.flow_id % 50_000) as u16;
        let mut frame =
            Frame::udp(uid, src_mac, dst_mac, src_ip, self.dst_ip, port, port, payload)?;
        frame.add_packet_tag(Tag::FlowId(self.flow_id));
        frame.add_packet_tag(Tag::SentAt(now));
        frame.add_byte_tag(Tag::FlowId(self.flow_id));
        Some(frame)
    }
}

impl Event for InjectFlow {
    #[tracing::instrument(skip(self, sim, world), fields(flow_id = self.flow_id, src = ?self.src, dst = %self.dst_ip))]
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let mut me = *self;
        let w = NetWorld::downcast(world);

        if me.remaining == 0 {
            return;
        }

        let Some(frame) = me.make_frame(w, sim.now()) else {
            debug!("源主机地址不可用或地址族不一致，停止注入");
            return;
        };
        w.net.send_from_host(me.src, frame, sim);

        me.remaining -= 1;
        if me.remaining > 0 {
            let next_at = sim.now().saturating_add(me.gap);
            sim.schedule(next_at, InjectFlow { ..me });
        }
    }
}
