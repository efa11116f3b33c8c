use std::sync::Arc;

use crate::net::{Header, internet_checksum};
use crate::p4::runtime::ProgramSpec;
use crate::p4::{ParserError, PipelinePacket, ReferenceRuntime, Runtime, RuntimeError};

use super::support::{field, program, set, udp4, udp4_with_options, udp6};

fn runtime() -> ReferenceRuntime {
    ReferenceRuntime::new(program()).expect("runtime loads")
}

fn packet(rt: &ReferenceRuntime, bytes: Vec<u8>) -> PipelinePacket {
    PipelinePacket::new(0, 1, bytes, Arc::clone(rt.layout()))
}

#[test]
fn parses_ipv4_udp_chain() {
    let mut rt = runtime();
    let frame = udp4(1, [10, 0, 0, 2], 30);
    let mut pkt = packet(&rt, frame.to_bytes());
    rt.parse(&mut pkt);

    assert_eq!(pkt.parser_error(), ParserError::NoError);
    assert!(!pkt.checksum_error());
    assert!(pkt.header_valid("ethernet"));
    assert!(pkt.header_valid("ipv4"));
    assert!(pkt.header_valid("udp"));
    assert!(!pkt.header_valid("ipv6"));
    assert!(!pkt.header_valid("tcp"));
    assert_eq!(pkt.payload_offset(), 14 + 20 + 8);

    assert_eq!(field(&pkt, "ethernet.ether_type"), 0x0800);
    assert_eq!(field(&pkt, "ipv4.version"), 4);
    assert_eq!(field(&pkt, "ipv4.ihl"), 5);
    assert_eq!(field(&pkt, "ipv4.flags"), 0b010);
    assert_eq!(field(&pkt, "ipv4.ttl"), 64);
    assert_eq!(field(&pkt, "ipv4.dst_addr"), 0x0a00_0002);
    assert_eq!(field(&pkt, "udp.dst_port"), 5678);
}

#[test]
fn parses_ipv6_with_unaligned_fields() {
    let mut rt = runtime();
    let mut frame = udp6(1, 4);
    if let Some(Header::Ipv6(ip)) = frame.headers.get_mut(1) {
        ip.traffic_class = 0xa5;
        ip.flow_label = 0x5_4321;
    }
    let mut pkt = packet(&rt, frame.to_bytes());
    rt.parse(&mut pkt);

    assert!(pkt.header_valid("ipv6"));
    assert_eq!(field(&pkt, "ipv6.traffic_class"), 0xa5);
    assert_eq!(field(&pkt, "ipv6.flow_label"), 0x5_4321);
    assert_eq!(field(&pkt, "ipv6.hop_limit"), 64);

    rt.deparse(&mut pkt);
    assert_eq!(pkt.data(), frame.to_bytes().as_slice());
}

#[test]
fn truncated_packet_reports_too_short() {
    let mut rt = runtime();
    let bytes = udp4(1, [10, 0, 0, 2], 0).to_bytes();
    let mut pkt = packet(&rt, bytes[..14 + 10].to_vec());
    rt.parse(&mut pkt);

    assert_eq!(pkt.parser_error(), ParserError::PacketTooShort);
    assert!(pkt.header_valid("ethernet"));
    assert!(!pkt.header_valid("ipv4"));
    assert_eq!(pkt.payload_offset(), 14);

    rt.deparse(&mut pkt);
    assert_eq!(pkt.data(), &bytes[..14 + 10]);
}

#[test]
fn bad_checksum_is_flagged_and_fixed_on_deparse() {
    let mut rt = runtime();
    let good = udp4(1, [10, 0, 0, 2], 8).to_bytes();
    let mut bad = good.clone();
    bad[14 + 10] ^= 0xff;

    let mut pkt = packet(&rt, bad);
    rt.parse(&mut pkt);
    assert_eq!(pkt.parser_error(), ParserError::NoError);
    assert!(pkt.checksum_error());

    rt.deparse(&mut pkt);
    assert_eq!(pkt.data(), good.as_slice());
}

#[test]
fn deparse_reflects_field_and_validity_changes() {
    let mut rt = runtime();
    let frame = udp4(1, [10, 0, 0, 2], 8);
    let mut pkt = packet(&rt, frame.to_bytes());
    rt.parse(&mut pkt);

    set(&mut pkt, "ipv4.ttl", 9);
    rt.deparse(&mut pkt);
    let out = pkt.data().to_vec();
    assert_eq!(out[14 + 8], 9);
    assert_eq!(internet_checksum(&out[14..14 + 20]), 0);
    assert_eq!(out.len(), frame.len());

    let udp = rt.layout().header_id("udp").expect("udp declared");
    pkt.set_valid(udp, false);
    rt.deparse(&mut pkt);
    assert_eq!(pkt.len(), frame.len() - 8);
    assert_eq!(&pkt.data()[14 + 20..], frame.payload.as_slice());
}

#[test]
fn ipv4_options_stay_payload_and_join_the_checksum() {
    let mut rt = runtime();
    let frame = udp4_with_options(1, [10, 0, 0, 2], &[1, 1, 1, 0], 8);
    let mut pkt = packet(&rt, frame.to_bytes());
    rt.parse(&mut pkt);

    assert_eq!(pkt.parser_error(), ParserError::NoError);
    assert!(!pkt.checksum_error());
    assert_eq!(field(&pkt, "ipv4.ihl"), 6);
    assert!(!pkt.header_valid("udp"));
    assert_eq!(pkt.payload_offset(), 14 + 20);

    rt.deparse(&mut pkt);
    assert_eq!(pkt.data(), frame.to_bytes().as_slice());

    set(&mut pkt, "ipv4.ttl", 3);
    rt.deparse(&mut pkt);
    let out = pkt.data().to_vec();
    assert_eq!(out[14 + 8], 3);
    assert_eq!(&out[14 + 20..14 + 24], &[1, 1, 1, 0]);
    assert_eq!(internet_checksum(&out[14..14 + 24]), 0);
}

const ODD: &str = r#"
{
  "headers": [
    { "name": "h", "fields": [
      { "name": "a", "bits": 3 },
      { "name": "b", "bits": 11 },
      { "name": "c", "bits": 70 },
      { "name": "d", "bits": 4 }
    ] }
  ],
  "parser": [ { "name": "start", "extract": ["h"] } ],
  "deparser": ["h"]
}
"#;

#[test]
fn fields_straddling_bytes_extract_and_emit() {
    let mut rt = ReferenceRuntime::new(ProgramSpec::from_json(ODD).expect("json")).expect("load");
    // a=0b101, b=0x5a5, c=(1 << 69) | 0x1, d=0xf，共 88 bit = 11 字节
    let bytes = vec![
        0b1011_0110, 0b1001_0110, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1f, 0xee,
    ];
    let mut pkt = packet(&rt, bytes.clone());
    rt.parse(&mut pkt);

    assert_eq!(pkt.payload_offset(), 11);
    assert_eq!(field(&pkt, "h.a"), 0b101);
    assert_eq!(field(&pkt, "h.b"), 0x5a5);
    assert_eq!(field(&pkt, "h.c"), (1u128 << 69) | 1);
    assert_eq!(field(&pkt, "h.d"), 0xf);

    rt.deparse(&mut pkt);
    assert_eq!(pkt.data(), bytes.as_slice());

    set(&mut pkt, "h.b", 0);
    rt.deparse(&mut pkt);
    assert_eq!(&pkt.data()[..2], &[0b1010_0000, 0b0000_0010]);
}

const LOOPY: &str = r#"
{
  "headers": [
    { "name": "h", "fields": [ { "name": "kind", "bits": 8 } ] }
  ],
  "parser": [
    { "name": "start", "extract": ["h"], "select": "h.kind",
      "transitions": [ { "value": 1, "next": "spin" }, { "value": 2, "next": "reject" } ] },
    { "name": "spin", "default": "spin" }
  ],
  "deparser": ["h"]
}
"#;

#[test]
fn select_miss_without_default_is_no_match() {
    let mut rt = ReferenceRuntime::new(ProgramSpec::from_json(LOOPY).expect("json")).expect("loads");
    let mut pkt = packet(&rt, vec![7, 0xaa]);
    rt.parse(&mut pkt);
    assert_eq!(pkt.parser_error(), ParserError::NoMatch);
    assert_eq!(pkt.payload_offset(), 1);
}

#[test]
fn cyclic_parse_graph_times_out() {
    let mut rt = ReferenceRuntime::new(ProgramSpec::from_json(LOOPY).expect("json")).expect("loads");
    let mut pkt = packet(&rt, vec![1]);
    rt.parse(&mut pkt);
    assert_eq!(pkt.parser_error(), ParserError::ParserTimeout);
    assert_eq!(pkt.parser_error().code(), 5);
}

#[test]
fn reject_state_stops_without_error() {
    let mut rt = ReferenceRuntime::new(ProgramSpec::from_json(LOOPY).expect("json")).expect("loads");
    let mut pkt = packet(&rt, vec![2, 3, 4]);
    rt.parse(&mut pkt);
    assert_eq!(pkt.parser_error(), ParserError::NoError);
    assert_eq!(pkt.payload_offset(), 1);
}

#[test]
fn invalid_programs_fail_to_load() {
    let broken = [
        LOOPY.replace("\"next\": \"spin\"", "\"next\": \"nowhere\""),
        LOOPY.replace("\"deparser\": [\"h\"]", "\"deparser\": [\"x\"]"),
        LOOPY.replace("\"select\": \"h.kind\"", "\"select\": \"h.nope\""),
        LOOPY.replace(
            "\"deparser\": [\"h\"]",
            "\"deparser\": [\"h\"], \"checksums\": [{ \"header\": \"h\", \"field\": \"kind\", \"length_words\": \"len\" }]",
        ),
    ];
    for raw in broken {
        let program = ProgramSpec::from_json(&raw).expect("json");
        assert!(ReferenceRuntime::new(program).is_err());
    }

    assert!(matches!(
        ProgramSpec::from_json("{ not json"),
        Err(RuntimeError::Json(_))
    ));
    assert!(matches!(
        ReferenceRuntime::load("/definitely/not/here.json"),
        Err(RuntimeError::Io { .. })
    ));
}

#[test]
fn commands_return_handles() {
    let mut rt = runtime();
    assert_eq!(
        rt.run_command("table_add ipv4_lpm forward 10.0.0.1/32 => 1")
            .expect("add"),
        Some("0".to_string())
    );
    assert_eq!(
        rt.run_command("table_add ipv4_lpm forward 10.0.0.2/32 => 2")
            .expect("add"),
        Some("1".to_string())
    );
    assert_eq!(rt.run_command("mc_mgrp_create 1").expect("mgrp"), None);
    assert_eq!(
        rt.run_command("mc_node_create 1 1 2").expect("node"),
        Some("0".to_string())
    );
    assert_eq!(rt.run_command("mc_node_associate 1 0").expect("assoc"), None);
    assert_eq!(rt.replicate(1).len(), 2);
    assert_eq!(rt.tables().len("ipv4_lpm"), 2);

    assert_eq!(rt.run_command("table_delete ipv4_lpm 0").expect("delete"), None);
    assert_eq!(rt.tables().len("ipv4_lpm"), 1);
    assert!(rt.run_command("table_add nope forward 1 => 1").is_err());
    assert!(rt.run_command("mc_node_associate 9 0").is_err());
}
