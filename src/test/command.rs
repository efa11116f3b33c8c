use crate::p4::RuntimeError;
use crate::p4::runtime::{Command, KeyMatch, command_lines, parse_value};

#[test]
fn value_literals() {
    assert_eq!(parse_value("42"), Ok(42));
    assert_eq!(parse_value("0x1F"), Ok(31));
    assert_eq!(parse_value("10.0.0.1"), Ok(0x0a00_0001));
    assert_eq!(parse_value("00:11:22:33:44:55"), Ok(0x0011_2233_4455));
    assert_eq!(parse_value("2001::1"), Ok((0x2001u128 << 112) | 1));
    assert!(parse_value("10.0.0").is_err());
    assert!(parse_value("0xzz").is_err());
    assert!(parse_value("nope").is_err());
}

#[test]
fn table_add_with_prefix_key_and_args() {
    let cmd = Command::parse("table_add ipv6_forward forward 2001::/64 => 1").expect("valid");
    assert_eq!(
        cmd,
        Command::TableAdd {
            table: "ipv6_forward".into(),
            action: "forward".into(),
            keys: vec![KeyMatch::Lpm {
                value: 0x2001u128 << 112,
                prefix_len: 64
            }],
            args: vec![1],
        }
    );

    let cmd = Command::parse("table_add t a 7 0x08").expect("valid");
    assert_eq!(
        cmd,
        Command::TableAdd {
            table: "t".into(),
            action: "a".into(),
            keys: vec![KeyMatch::Exact(7), KeyMatch::Exact(8)],
            args: vec![],
        }
    );
}

#[test]
fn table_maintenance_commands() {
    assert_eq!(
        Command::parse("table_modify t fwd 3 => 9 10").expect("valid"),
        Command::TableModify {
            table: "t".into(),
            action: "fwd".into(),
            handle: 3,
            args: vec![9, 10],
        }
    );
    assert_eq!(
        Command::parse("table_set_default t drop").expect("valid"),
        Command::TableSetDefault {
            table: "t".into(),
            action: "drop".into(),
            args: vec![],
        }
    );
    assert_eq!(
        Command::parse("table_delete t 0").expect("valid"),
        Command::TableDelete {
            table: "t".into(),
            handle: 0
        }
    );
    assert_eq!(
        Command::parse("table_clear t").expect("valid"),
        Command::TableClear { table: "t".into() }
    );
}

#[test]
fn multicast_commands() {
    let batch = "mc_mgrp_create 1\nmc_node_create 1 1 2\nmc_node_associate 1 0";
    let cmds: Vec<_> = command_lines(batch)
        .map(|l| Command::parse(l).expect("valid"))
        .collect();
    assert_eq!(
        cmds,
        vec![
            Command::McMgrpCreate { mgid: 1 },
            Command::McNodeCreate {
                rid: 1,
                ports: vec![1, 2]
            },
            Command::McNodeAssociate { mgid: 1, handle: 0 },
        ]
    );
    assert_eq!(
        Command::parse("mc_node_update 4 7").expect("valid"),
        Command::McNodeUpdate {
            handle: 4,
            ports: vec![7]
        }
    );
    assert_eq!(
        Command::parse("mc_node_dissociate 1 0").expect("valid"),
        Command::McNodeDissociate { mgid: 1, handle: 0 }
    );
}

#[test]
fn malformed_commands_are_rejected() {
    for line in [
        "",
        "frobnicate 1",
        "table_add t",
        "table_delete t x",
        "mc_mgrp_create",
        "mc_node_create 70000 1",
        "mc_node_associate 1",
        "table_add t a 10.0.0.0/abc",
    ] {
        match Command::parse(line) {
            Err(RuntimeError::BadCommand { line: l, .. }) => assert_eq!(l, line),
            other => panic!("`{line}` should be rejected, got {other:?}"),
        }
    }
}

#[test]
fn command_lines_skip_blanks_and_comments() {
    let batch = "\n# bootstrap\n  table_clear t  \n\n#x\nmc_mgrp_create 2\n";
    let lines: Vec<_> = command_lines(batch).collect();
    assert_eq!(lines, vec!["table_clear t", "mc_mgrp_create 2"]);
}
