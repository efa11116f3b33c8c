use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, Mutex};

use crate::demo::basic_program;
use crate::net::{
    ETHERTYPE_IPV4, EthernetHeader, Frame, Header, IPPROTO_TCP, Ipv4Header, MacAddr, TcpHeader,
};
use crate::p4::runtime::ProgramSpec;
use crate::p4::{
    Control, Pipeline, PipelineConfig, PipelineContext, PipelinePacket, ReferenceRuntime,
    TableStore,
};

pub(crate) type Log<T> = Arc<Mutex<Vec<T>>>;

pub(crate) fn new_log<T>() -> Log<T> {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn taken<T: Clone>(log: &Log<T>) -> Vec<T> {
    log.lock().expect("log lock").clone()
}

pub(crate) fn program() -> ProgramSpec {
    basic_program().expect("built-in program parses")
}

pub(crate) fn field(pkt: &PipelinePacket, name: &str) -> u128 {
    pkt.field(name)
        .unwrap_or_else(|| panic!("field {name} not declared"))
}

pub(crate) fn set(pkt: &mut PipelinePacket, name: &str, value: u128) {
    pkt.set_field(name, value).expect("field declared");
}

pub(crate) fn udp4(uid: u64, dst: [u8; 4], payload_len: usize) -> Frame {
    Frame::udp(
        uid,
        MacAddr::from_index(1),
        MacAddr::from_index(2),
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        IpAddr::V4(Ipv4Addr::from(dst)),
        1234,
        5678,
        (0..payload_len).map(|i| i as u8).collect(),
    )
    .expect("same address family")
}

pub(crate) fn udp6(uid: u64, payload_len: usize) -> Frame {
    Frame::udp(
        uid,
        MacAddr::from_index(1),
        MacAddr::from_index(2),
        IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1)),
        IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 2)),
        1234,
        5678,
        vec![0xab; payload_len],
    )
    .expect("same address family")
}

/// 带 IPv4 选项的 UDP 帧，总长度与校验和按选项更新
pub(crate) fn udp4_with_options(
    uid: u64,
    dst: [u8; 4],
    options: &[u8],
    payload_len: usize,
) -> Frame {
    let mut frame = udp4(uid, dst, payload_len);
    if let Some(Header::Ipv4(ip)) = frame.headers.get_mut(1) {
        ip.options = options.to_vec();
        ip.total_len += options.len() as u16;
        ip.checksum = ip.compute_checksum();
    }
    frame
}

/// IPv4 + 带 MSS/NOP/SACK-permitted 选项的 TCP SYN
pub(crate) fn tcp4_with_options(uid: u64, payload_len: usize) -> Frame {
    let tcp = TcpHeader {
        src_port: 40_000,
        dst_port: 80,
        seq: 7,
        ack: 0,
        flags: 0x002,
        window: 0xffff,
        checksum: 0x1234,
        urgent: 0,
        options: vec![0x02, 0x04, 0x05, 0xb4, 0x01, 0x01, 0x04, 0x02],
    };
    let payload = vec![0x5a; payload_len];
    let ip = Ipv4Header::new(
        Ipv4Addr::new(10, 0, 0, 1),
        Ipv4Addr::new(10, 0, 0, 2),
        IPPROTO_TCP,
        (tcp.header_len() + payload_len) as u16,
    );
    let eth = EthernetHeader {
        dst: MacAddr::from_index(2),
        src: MacAddr::from_index(1),
        ether_type: ETHERTYPE_IPV4,
    };
    Frame::new(
        uid,
        vec![Header::Ethernet(eth), Header::Ipv4(ip), Header::Tcp(tcp)],
        payload,
    )
}

/// 用内置程序的头和解析图，加上测试自己的控制块
pub(crate) fn pipeline_with(
    ctx: &Arc<PipelineContext>,
    ingress: impl Control + 'static,
    egress: impl Control + 'static,
) -> Pipeline {
    let rt = ReferenceRuntime::new(program())
        .expect("runtime loads")
        .with_ingress(ingress)
        .with_egress(egress);
    Pipeline::new(Arc::clone(ctx), Box::new(rt), PipelineConfig::named("test"))
        .expect("pipeline builds")
}

/// 把所有包送到固定端口的 ingress
pub(crate) fn to_port(port: u128) -> impl Control + 'static {
    move |pkt: &mut PipelinePacket, _: &TableStore| set(pkt, "standard_metadata.egress_spec", port)
}

/// 把所有包送到固定组播组的 ingress
pub(crate) fn to_group(mgid: u128) -> impl Control + 'static {
    move |pkt: &mut PipelinePacket, _: &TableStore| set(pkt, "intrinsic_metadata.mcast_grp", mgid)
}
