//! 协议头类型
//!
//! 仿真器能理解的结构化协议头：Ethernet / IPv4 / IPv6 / TCP / UDP。
//! 所有头都按网络字节序序列化，线上格式的读写交给 `pnet` 的包视图，
//! `deserialize` 在字节不足或格式不符时返回 `None`。

use std::net::{Ipv4Addr, Ipv6Addr};

use pnet::packet::ethernet::{EtherType, EthernetPacket, MutableEthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::packet::ipv4::{Ipv4Packet, MutableIpv4Packet};
use pnet::packet::ipv6::{Ipv6Packet, MutableIpv6Packet};
use pnet::packet::tcp::{MutableTcpPacket, TcpPacket};
use pnet::packet::udp::{MutableUdpPacket, UdpPacket};
use pnet::util::{MacAddr as WireMac, checksum};

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_IPV6: u16 = 0x86dd;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

/// 48-bit MAC 地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    /// 按节点序号生成一个本地管理地址（02:00:00:00:hi:lo）
    pub fn from_index(idx: u16) -> MacAddr {
        let [hi, lo] = idx.to_be_bytes();
        MacAddr([0x02, 0, 0, 0, hi, lo])
    }
}

impl From<MacAddr> for WireMac {
    fn from(m: MacAddr) -> Self {
        let [a, b, c, d, e, f] = m.0;
        WireMac(a, b, c, d, e, f)
    }
}

impl From<WireMac> for MacAddr {
    fn from(m: WireMac) -> Self {
        MacAddr([m.0, m.1, m.2, m.3, m.4, m.5])
    }
}

/// 在 `out` 末尾留出 `len` 字节（全 0），返回这段可写切片
fn grow(out: &mut Vec<u8>, len: usize) -> &mut [u8] {
    let start = out.len();
    out.resize(start + len, 0);
    &mut out[start..]
}

/// Ethernet II 头（14 字节，不含 VLAN）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ether_type: u16,
}

impl EthernetHeader {
    pub const LEN: usize = 14;

    pub fn serialize(&self, out: &mut Vec<u8>) {
        if let Some(mut pkt) = MutableEthernetPacket::new(grow(out, Self::LEN)) {
            pkt.set_destination(self.dst.into());
            pkt.set_source(self.src.into());
            pkt.set_ethertype(EtherType(self.ether_type));
        }
    }

    pub fn deserialize(buf: &[u8]) -> Option<(Self, usize)> {
        let pkt = EthernetPacket::new(buf)?;
        let hdr = EthernetHeader {
            dst: pkt.get_destination().into(),
            src: pkt.get_source().into(),
            ether_type: pkt.get_ethertype().0,
        };
        Some((hdr, Self::LEN))
    }
}

/// IPv4 头。选项按原始字节保存，保证重新序列化后字节一致。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    pub tos: u8,
    pub total_len: u16,
    pub identification: u16,
    /// flags(3) + fragment offset(13)
    pub flags_frag: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub options: Vec<u8>,
}

impl Ipv4Header {
    pub const MIN_LEN: usize = 20;

    /// 构造一个无选项的 IPv4 头，并计算头部校验和
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, payload_len: u16) -> Self {
        let mut hdr = Ipv4Header {
            tos: 0,
            total_len: payload_len.saturating_add(Self::MIN_LEN as u16),
            identification: 0,
            flags_frag: 0x4000,
            ttl: 64,
            protocol,
            checksum: 0,
            src,
            dst,
            options: Vec::new(),
        };
        hdr.checksum = hdr.compute_checksum();
        hdr
    }

    pub fn header_len(&self) -> usize {
        Self::MIN_LEN + self.options.len()
    }

    /// 按当前字段计算头部校验和（跳过校验和字段本身所在的第 5 个 16-bit 字）
    pub fn compute_checksum(&self) -> u16 {
        let mut raw = Vec::with_capacity(self.header_len());
        self.serialize(&mut raw);
        checksum(&raw, 5)
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        let len = self.header_len();
        let buf = grow(out, len);
        buf[Self::MIN_LEN..].copy_from_slice(&self.options);
        if let Some(mut pkt) = MutableIpv4Packet::new(buf) {
            pkt.set_version(4);
            pkt.set_header_length((len / 4) as u8);
            pkt.set_dscp(self.tos >> 2);
            pkt.set_ecn(self.tos & 0x03);
            pkt.set_total_length(self.total_len);
            pkt.set_identification(self.identification);
            pkt.set_flags((self.flags_frag >> 13) as u8);
            pkt.set_fragment_offset(self.flags_frag & 0x1fff);
            pkt.set_ttl(self.ttl);
            pkt.set_next_level_protocol(IpNextHeaderProtocol(self.protocol));
            pkt.set_checksum(self.checksum);
            pkt.set_source(self.src);
            pkt.set_destination(self.dst);
        }
    }

    pub fn deserialize(buf: &[u8]) -> Option<(Self, usize)> {
        let pkt = Ipv4Packet::new(buf)?;
        if pkt.get_version() != 4 {
            return None;
        }
        let hdr_len = pkt.get_header_length() as usize * 4;
        if hdr_len < Self::MIN_LEN || buf.len() < hdr_len {
            return None;
        }
        let hdr = Ipv4Header {
            tos: (pkt.get_dscp() << 2) | pkt.get_ecn(),
            total_len: pkt.get_total_length(),
            identification: pkt.get_identification(),
            flags_frag: ((pkt.get_flags() as u16) << 13) | pkt.get_fragment_offset(),
            ttl: pkt.get_ttl(),
            protocol: pkt.get_next_level_protocol().0,
            checksum: pkt.get_checksum(),
            src: pkt.get_source(),
            dst: pkt.get_destination(),
            options: buf[Self::MIN_LEN..hdr_len].to_vec(),
        };
        Some((hdr, hdr_len))
    }
}

/// IPv6 固定头（40 字节）。扩展头（例如 SRH）作为上层载荷处理。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Header {
    pub traffic_class: u8,
    /// 低 20 bit 有效
    pub flow_label: u32,
    pub payload_len: u16,
    pub next_header: u8,
    pub hop_limit: u8,
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
}

impl Ipv6Header {
    pub const LEN: usize = 40;

    pub fn new(src: Ipv6Addr, dst: Ipv6Addr, next_header: u8, payload_len: u16) -> Self {
        Ipv6Header {
            traffic_class: 0,
            flow_label: 0,
            payload_len,
            next_header,
            hop_limit: 64,
            src,
            dst,
        }
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        if let Some(mut pkt) = MutableIpv6Packet::new(grow(out, Self::LEN)) {
            pkt.set_version(6);
            pkt.set_traffic_class(self.traffic_class);
            pkt.set_flow_label(self.flow_label & 0x000f_ffff);
            pkt.set_payload_length(self.payload_len);
            pkt.set_next_header(IpNextHeaderProtocol(self.next_header));
            pkt.set_hop_limit(self.hop_limit);
            pkt.set_source(self.src);
            pkt.set_destination(self.dst);
        }
    }

    pub fn deserialize(buf: &[u8]) -> Option<(Self, usize)> {
        let pkt = Ipv6Packet::new(buf)?;
        if pkt.get_version() != 6 {
            return None;
        }
        let hdr = Ipv6Header {
            traffic_class: pkt.get_traffic_class(),
            flow_label: pkt.get_flow_label(),
            payload_len: pkt.get_payload_length(),
            next_header: pkt.get_next_header().0,
            hop_limit: pkt.get_hop_limit(),
            src: pkt.get_source(),
            dst: pkt.get_destination(),
        };
        Some((hdr, Self::LEN))
    }
}

/// TCP 头。选项按原始字节保存。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    /// reserved(4) + CWR/ECE/URG/ACK/PSH/RST/SYN/FIN（共 12 bit）
    pub flags: u16,
    pub window: u16,
    pub checksum: u16,
    pub urgent: u16,
    pub options: Vec<u8>,
}

impl TcpHeader {
    pub const MIN_LEN: usize = 20;

    pub fn header_len(&self) -> usize {
        Self::MIN_LEN + self.options.len()
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        let len = self.header_len();
        let buf = grow(out, len);
        buf[Self::MIN_LEN..].copy_from_slice(&self.options);
        if let Some(mut pkt) = MutableTcpPacket::new(buf) {
            pkt.set_source(self.src_port);
            pkt.set_destination(self.dst_port);
            pkt.set_sequence(self.seq);
            pkt.set_acknowledgement(self.ack);
            pkt.set_data_offset((len / 4) as u8);
            pkt.set_reserved(((self.flags >> 8) & 0x0f) as u8);
            pkt.set_flags((self.flags & 0xff) as u8);
            pkt.set_window(self.window);
            pkt.set_checksum(self.checksum);
            pkt.set_urgent_ptr(self.urgent);
        }
    }

    pub fn deserialize(buf: &[u8]) -> Option<(Self, usize)> {
        let pkt = TcpPacket::new(buf)?;
        let hdr_len = pkt.get_data_offset() as usize * 4;
        if hdr_len < Self::MIN_LEN || buf.len() < hdr_len {
            return None;
        }
        let hdr = TcpHeader {
            src_port: pkt.get_source(),
            dst_port: pkt.get_destination(),
            seq: pkt.get_sequence(),
            ack: pkt.get_acknowledgement(),
            flags: ((pkt.get_reserved() as u16) << 8) | pkt.get_flags() as u16,
            window: pkt.get_window(),
            checksum: pkt.get_checksum(),
            urgent: pkt.get_urgent_ptr(),
            options: buf[Self::MIN_LEN..hdr_len].to_vec(),
        };
        Some((hdr, hdr_len))
    }
}

/// UDP 头（8 字节）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16,
    pub checksum: u16,
}

impl UdpHeader {
    pub const LEN: usize = 8;

    pub fn new(src_port: u16, dst_port: u16, payload_len: u16) -> Self {
        UdpHeader {
            src_port,
            dst_port,
            length: payload_len.saturating_add(Self::LEN as u16),
            checksum: 0,
        }
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        if let Some(mut pkt) = MutableUdpPacket::new(grow(out, Self::LEN)) {
            pkt.set_source(self.src_port);
            pkt.set_destination(self.dst_port);
            pkt.set_length(self.length);
            pkt.set_checksum(self.checksum);
        }
    }

    pub fn deserialize(buf: &[u8]) -> Option<(Self, usize)> {
        let pkt = UdpPacket::new(buf)?;
        let hdr = UdpHeader {
            src_port: pkt.get_source(),
            dst_port: pkt.get_destination(),
            length: pkt.get_length(),
            checksum: pkt.get_checksum(),
        };
        Some((hdr, Self::LEN))
    }
}

/// 帧上挂载的结构化协议头
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    Ethernet(EthernetHeader),
    Ipv4(Ipv4Header),
    Ipv6(Ipv6Header),
    Tcp(TcpHeader),
    Udp(UdpHeader),
}

impl Header {
    pub fn name(&self) -> &'static str {
        match self {
            Header::Ethernet(_) => "ethernet",
            Header::Ipv4(_) => "ipv4",
            Header::Ipv6(_) => "ipv6",
            Header::Tcp(_) => "tcp",
            Header::Udp(_) => "udp",
        }
    }

    pub fn serialized_len(&self) -> usize {
        match self {
            Header::Ethernet(_) => EthernetHeader::LEN,
            Header::Ipv4(h) => h.header_len(),
            Header::Ipv6(_) => Ipv6Header::LEN,
            Header::Tcp(h) => h.header_len(),
            Header::Udp(_) => UdpHeader::LEN,
        }
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        match self {
            Header::Ethernet(h) => h.serialize(out),
            Header::Ipv4(h) => h.serialize(out),
            Header::Ipv6(h) => h.serialize(out),
            Header::Tcp(h) => h.serialize(out),
            Header::Udp(h) => h.serialize(out),
        }
    }
}

/// RFC 1071 internet checksum（奇数长度时末尾补 0），不跳过任何字
pub fn internet_checksum(data: &[u8]) -> u16 {
    // 字序号不可能等于字节长度，因此没有字被跳过
    checksum(data, data.len())
}
