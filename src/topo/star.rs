//! Star 拓扑构建
//!
//! 一个 P4 交换机 s0 居中，N 个主机各通过一条双向链路连到它。
//! 主机 i 连在交换机的端口 i+1 上。

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::net::{NetWorld, NodeId, PortNo};
use crate::p4::Pipeline;
use crate::sim::SimTime;

/// Star 拓扑配置选项
#[derive(Debug, Clone)]
pub struct StarOpts {
    pub hosts: usize,
    pub link_gbps: u64,
    pub link_latency: SimTime,
    /// 主机使用 IPv6 地址（2001:db8::i+1）而不是 IPv4（10.0.0.i+1）
    pub ipv6: bool,
}

impl Default for StarOpts {
    fn default() -> Self {
        Self {
            hosts: 4,
            link_gbps: 10,
            link_latency: SimTime::from_micros(2),
            ipv6: false,
        }
    }
}

/// 构建结果
#[derive(Debug, Clone)]
pub struct Star {
    pub switch: NodeId,
    pub hosts: Vec<NodeId>,
    /// `switch_ports[i]` 是主机 i 在交换机上的端口号
    pub switch_ports: Vec<PortNo>,
}

/// 第 i 个主机的地址
pub fn star_host_ip(i: usize, ipv6: bool) -> IpAddr {
    let n = (i + 1) as u16;
    if ipv6 {
        IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, n))
    } else {
        IpAddr::V4(Ipv4Addr::new(10, 0, (n >> 8) as u8, n as u8))
    }
}

/// 构建 star 拓扑
pub fn build_star(world: &mut NetWorld, pipeline: Pipeline, opts: &StarOpts) -> Star {
    let bps = opts.link_gbps.saturating_mul(1_000_000_000);
    let switch = world.net.add_p4_switch("s0", pipeline);

    let mut hosts = Vec::with_capacity(opts.hosts);
    let mut switch_ports = Vec::with_capacity(opts.hosts);
    for i in 0..opts.hosts {
        let h = world.net.add_host(format!("h{i}"), star_host_ip(i, opts.ipv6));
        let (_, sw_port) = world.net.connect(h, switch, opts.link_latency, bps);
        hosts.push(h);
        switch_ports.push(sw_port);
    }

    Star {
        switch,
        hosts,
        switch_ports,
    }
}
