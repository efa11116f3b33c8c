//! 仿真帧
//!
//! `Frame` 是仿真器内部的数据帧：结构化协议头 + 载荷字节 + 旁路标签。
//! 协议头按从外到内的顺序保存（Ethernet 在最前）。

use std::net::IpAddr;

use super::header::{
    ETHERTYPE_IPV4, ETHERTYPE_IPV6, EthernetHeader, Header, IPPROTO_UDP, Ipv4Header, Ipv6Header,
    MacAddr, UdpHeader,
};
use super::tag::{ByteTag, Tag};

/// 仿真数据帧
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub uid: u64,
    pub headers: Vec<Header>,
    pub payload: Vec<u8>,
    pub byte_tags: Vec<ByteTag>,
    pub packet_tags: Vec<Tag>,
}

impl Frame {
    pub fn new(uid: u64, headers: Vec<Header>, payload: Vec<u8>) -> Self {
        Self {
            uid,
            headers,
            payload,
            byte_tags: Vec::new(),
            packet_tags: Vec::new(),
        }
    }

    /// 没有任何结构化头的帧：全部字节作为载荷
    pub fn opaque(uid: u64, bytes: Vec<u8>) -> Self {
        Self::new(uid, Vec::new(), bytes)
    }

    /// 构造一个 Ethernet + IPv4/IPv6 + UDP 帧；源和目的地址族不同时返回 `None`
    #[allow(clippy::too_many_arguments)]
    pub fn udp(
        uid: u64,
        src_mac: MacAddr,
        dst_mac: MacAddr,
        src_ip: IpAddr,
        dst_ip: IpAddr,
        src_port: u16,
        dst_port: u16,
        payload: Vec<u8>,
    ) -> Option<Self> {
        let udp = UdpHeader::new(src_port, dst_port, payload.len() as u16);
        let l4_len = udp.length;
        let (ether_type, ip) = match (src_ip, dst_ip) {
            (IpAddr::V6(s), IpAddr::V6(d)) => (
                ETHERTYPE_IPV6,
                Header::Ipv6(Ipv6Header::new(s, d, IPPROTO_UDP, l4_len)),
            ),
            (IpAddr::V4(s), IpAddr::V4(d)) => (
                ETHERTYPE_IPV4,
                Header::Ipv4(Ipv4Header::new(s, d, IPPROTO_UDP, l4_len)),
            ),
            _ => return None,
        };
        let eth = EthernetHeader {
            dst: dst_mac,
            src: src_mac,
            ether_type,
        };
        Some(Self::new(
            uid,
            vec![Header::Ethernet(eth), ip, Header::Udp(udp)],
            payload,
        ))
    }

    /// 线上字节长度（头 + 载荷）
    pub fn len(&self) -> usize {
        self.headers
            .iter()
            .map(Header::serialized_len)
            .sum::<usize>()
            + self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 把整帧按线上格式追加到 `out`
    pub fn write_bytes(&self, out: &mut Vec<u8>) {
        for h in &self.headers {
            h.serialize(out);
        }
        out.extend_from_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        self.write_bytes(&mut out);
        out
    }

    /// 添加覆盖整帧的字节标签
    pub fn add_byte_tag(&mut self, tag: Tag) {
        let len = self.len();
        self.byte_tags.push(ByteTag::covering(len, tag));
    }

    pub fn add_packet_tag(&mut self, tag: Tag) {
        self.packet_tags.push(tag);
    }

    /// 帧上的 flow id（优先取整包标签）
    pub fn flow_id(&self) -> Option<u64> {
        self.packet_tags
            .iter()
            .chain(self.byte_tags.iter().map(|bt| &bt.tag))
            .find_map(|t| match t {
                Tag::FlowId(id) => Some(*id),
                _ => None,
            })
    }

    pub fn ethernet(&self) -> Option<&EthernetHeader> {
        self.headers.iter().find_map(|h| match h {
            Header::Ethernet(e) => Some(e),
            _ => None,
        })
    }

    pub fn ipv4(&self) -> Option<&Ipv4Header> {
        self.headers.iter().find_map(|h| match h {
            Header::Ipv4(ip) => Some(ip),
            _ => None,
        })
    }

    pub fn ipv6(&self) -> Option<&Ipv6Header> {
        self.headers.iter().find_map(|h| match h {
            Header::Ipv6(ip) => Some(ip),
            _ => None,
        })
    }

    /// 协议头名称链，例如 `["ethernet", "ipv4", "udp"]`
    pub fn header_chain(&self) -> Vec<&'static str> {
        self.headers.iter().map(Header::name).collect()
    }
}
