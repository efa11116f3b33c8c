use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::net::{
    ETHERTYPE_IPV4, EthernetHeader, Frame, Header, IPPROTO_TCP, Ipv4Header, MacAddr, Tag,
    TcpHeader,
};
use crate::p4::{FieldLayout, FrameConverter, MAX_PACKET_SIZE, PipelineError};
use crate::sim::SimTime;

use super::support::{udp4, udp6};

fn layout() -> Arc<FieldLayout> {
    Arc::new(FieldLayout::new())
}

fn tcp4_frame() -> Frame {
    let tcp = TcpHeader {
        src_port: 80,
        dst_port: 40000,
        seq: 1,
        ack: 2,
        flags: 0x018,
        window: 1024,
        checksum: 0xbeef,
        urgent: 0,
        options: vec![1, 1, 1, 1],
    };
    let ip = Ipv4Header::new(
        Ipv4Addr::new(10, 0, 0, 1),
        Ipv4Addr::new(10, 0, 0, 2),
        IPPROTO_TCP,
        (tcp.header_len() + 3) as u16,
    );
    let eth = EthernetHeader {
        dst: MacAddr::from_index(2),
        src: MacAddr::from_index(1),
        ether_type: ETHERTYPE_IPV4,
    };
    Frame::new(
        5,
        vec![Header::Ethernet(eth), Header::Ipv4(ip), Header::Tcp(tcp)],
        vec![9, 8, 7],
    )
}

#[test]
fn recognized_chains_round_trip_byte_identical() {
    let conv = FrameConverter::default();
    for frame in [udp4(1, [10, 0, 0, 9], 33), udp6(2, 17), tcp4_frame()] {
        let pkt = conv
            .to_pipeline(&frame, 3, 100, &layout())
            .expect("within size limit");
        assert_eq!(pkt.ingress_port(), 3);
        assert_eq!(pkt.id(), 100);
        assert_eq!(pkt.data(), frame.to_bytes().as_slice());

        let out = conv.to_frame(pkt, &frame);
        assert_eq!(out.headers, frame.headers);
        assert_eq!(out.payload, frame.payload);
        assert_eq!(out.to_bytes(), frame.to_bytes());
        assert_eq!(out.uid, 100);
    }
}

#[test]
fn unknown_ether_type_keeps_only_link_header() {
    let conv = FrameConverter::default();
    let eth = EthernetHeader {
        dst: MacAddr::BROADCAST,
        src: MacAddr::from_index(1),
        ether_type: 0x88b5,
    };
    let frame = Frame::new(1, vec![Header::Ethernet(eth)], vec![0x45; 40]);
    let out = conv.decode(1, frame.to_bytes());
    assert_eq!(out.header_chain(), vec!["ethernet"]);
    assert_eq!(out.payload, vec![0x45; 40]);
}

#[test]
fn unknown_ip_protocol_stops_after_network_header() {
    let conv = FrameConverter::default();
    let mut frame = udp4(1, [10, 0, 0, 2], 12);
    if let Some(Header::Ipv4(ip)) = frame.headers.get_mut(1) {
        ip.protocol = 47;
    }
    let out = conv.decode(1, frame.to_bytes());
    assert_eq!(out.header_chain(), vec!["ethernet", "ipv4"]);
    assert_eq!(out.payload.len(), 8 + 12);
}

#[test]
fn truncated_network_header_degrades_to_payload() {
    let conv = FrameConverter::default();
    let bytes = udp4(1, [10, 0, 0, 2], 0).to_bytes();
    let out = conv.decode(1, bytes[..14 + 10].to_vec());
    assert_eq!(out.header_chain(), vec!["ethernet"]);
    assert_eq!(out.payload.len(), 10);

    let tiny = conv.decode(2, vec![1, 2, 3]);
    assert!(tiny.headers.is_empty());
    assert_eq!(tiny.payload, vec![1, 2, 3]);
}

#[test]
fn size_limit_is_inclusive() {
    let conv = FrameConverter::default();
    let overhead = 14 + 20 + 8;
    let at_max = udp4(1, [10, 0, 0, 2], MAX_PACKET_SIZE - overhead);
    assert_eq!(at_max.len(), MAX_PACKET_SIZE);
    assert!(conv.to_pipeline(&at_max, 1, 0, &layout()).is_ok());

    let over = udp4(2, [10, 0, 0, 2], MAX_PACKET_SIZE - overhead + 1);
    match conv.to_pipeline(&over, 1, 1, &layout()) {
        Err(PipelineError::FrameTooLarge { len, max }) => {
            assert_eq!(len, MAX_PACKET_SIZE + 1);
            assert_eq!(max, MAX_PACKET_SIZE);
        }
        other => panic!("expected FrameTooLarge, got {other:?}"),
    }
}

#[test]
fn custom_size_limit_applies() {
    let conv = FrameConverter::new(64);
    assert_eq!(conv.max_packet_size(), 64);
    assert!(conv.to_pipeline(&udp4(1, [10, 0, 0, 2], 22), 1, 0, &layout()).is_ok());
    assert!(conv.to_pipeline(&udp4(1, [10, 0, 0, 2], 23), 1, 0, &layout()).is_err());
}

#[test]
fn tags_are_copied_onto_output() {
    let conv = FrameConverter::default();
    let mut frame = udp4(1, [10, 0, 0, 2], 20);
    frame.add_packet_tag(Tag::FlowId(42));
    frame.add_packet_tag(Tag::SentAt(SimTime(77)));
    frame.add_byte_tag(Tag::Named {
        name: "marker".into(),
        value: vec![1, 2],
    });

    let mut pkt = conv.to_pipeline(&frame, 1, 9, &layout()).expect("fits");
    let mut shorter = pkt.data().to_vec();
    shorter.truncate(shorter.len() - 5);
    pkt.set_data(shorter);

    let out = conv.to_frame(pkt, &frame);
    assert_eq!(out.packet_tags, frame.packet_tags);
    assert_eq!(out.byte_tags.len(), 1);
    assert_eq!(out.byte_tags[0].tag, frame.byte_tags[0].tag);
    assert_eq!(out.byte_tags[0].start, 0);
    assert_eq!(out.byte_tags[0].end, out.len());
    assert_eq!(out.flow_id(), Some(42));
}

#[test]
fn default_rules_are_ordered() {
    let conv = FrameConverter::default();
    let names: Vec<_> = conv.rules().iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["ethernet", "ipv4", "ipv6", "tcp", "udp"]);
}
