use crate::p4::RuntimeError;
use crate::p4::runtime::{KeyMatch, ProgramSpec, TableStore};

const PROGRAM: &str = r#"
{
  "headers": [
    { "name": "ipv4", "fields": [ { "name": "dst_addr", "bits": 32 }, { "name": "proto", "bits": 8 } ] }
  ],
  "tables": [
    {
      "name": "route",
      "keys": [ { "field": "ipv4.dst_addr", "match_kind": "lpm" } ],
      "actions": [ "forward", "drop" ],
      "default_action": "drop"
    },
    {
      "name": "acl",
      "keys": [ { "field": "ipv4.dst_addr", "match_kind": "lpm" }, { "field": "ipv4.proto" } ],
      "actions": [ "deny" ]
    }
  ]
}
"#;

fn store() -> TableStore {
    let program = ProgramSpec::from_json(PROGRAM).expect("program parses");
    let layout = program.build_layout().expect("layout");
    TableStore::new(&program, &layout).expect("tables")
}

fn lpm(value: u32, prefix_len: u16) -> KeyMatch {
    KeyMatch::Lpm {
        value: value as u128,
        prefix_len,
    }
}

#[test]
fn longest_prefix_wins_and_default_catches_misses() {
    let mut t = store();
    let wide = t
        .add("route", "forward", vec![lpm(0x0a00_0000, 8)], vec![1])
        .expect("add /8");
    let narrow = t
        .add("route", "forward", vec![lpm(0x0a00_0100, 24)], vec![2])
        .expect("add /24");
    assert_eq!((wide, narrow), (0, 1));
    assert_eq!(t.len("route"), 2);

    let hit = t.lookup("route", &[0x0a00_0105]).expect("hit");
    assert_eq!((hit.action.as_str(), hit.arg(0)), ("forward", 2));
    let hit = t.lookup("route", &[0x0a05_0505]).expect("hit");
    assert_eq!(hit.arg(0), 1);

    let miss = t.lookup("route", &[0x0b00_0001]).expect("default");
    assert_eq!(miss.action, "drop");
    assert!(miss.args.is_empty());
}

#[test]
fn zero_length_prefix_matches_everything() {
    let mut t = store();
    t.add("route", "forward", vec![lpm(0, 0)], vec![7])
        .expect("add /0");
    assert_eq!(t.lookup("route", &[0xffff_ffff]).map(|c| c.arg(0)), Some(7));
}

#[test]
fn exact_and_lpm_keys_combine() {
    let mut t = store();
    t.add(
        "acl",
        "deny",
        vec![lpm(0x0a00_0000, 8), KeyMatch::Exact(17)],
        vec![],
    )
    .expect("add");
    assert!(t.lookup("acl", &[0x0a01_0101, 17]).is_some());
    assert!(t.lookup("acl", &[0x0a01_0101, 6]).is_none());
    assert!(t.lookup("acl", &[0x0b01_0101, 17]).is_none());
}

#[test]
fn entry_lifecycle() {
    let mut t = store();
    let h = t
        .add("route", "forward", vec![lpm(0x0a00_0001, 32)], vec![1])
        .expect("add");
    t.modify("route", h, "forward", vec![5]).expect("modify");
    assert_eq!(t.lookup("route", &[0x0a00_0001]).map(|c| c.arg(0)), Some(5));

    t.set_default("route", "forward", vec![9]).expect("set default");
    assert_eq!(t.lookup("route", &[1]).map(|c| c.arg(0)), Some(9));

    t.delete("route", h).expect("delete");
    assert!(matches!(
        t.delete("route", h),
        Err(RuntimeError::UnknownEntry { handle, .. }) if handle == h
    ));

    t.add("route", "drop", vec![lpm(0, 1)], vec![]).expect("add");
    t.clear("route").expect("clear");
    assert_eq!(t.len("route"), 0);
    assert_eq!(t.entries("route").expect("table").count(), 0);
}

#[test]
fn bad_entries_are_rejected() {
    let mut t = store();
    assert!(matches!(
        t.add("nope", "forward", vec![], vec![]),
        Err(RuntimeError::UnknownTable(_))
    ));
    assert!(matches!(
        t.add("route", "teleport", vec![lpm(0, 0)], vec![]),
        Err(RuntimeError::UnknownAction { .. })
    ));
    assert!(matches!(
        t.add("route", "forward", vec![], vec![]),
        Err(RuntimeError::KeyCount {
            expected: 1,
            got: 0,
            ..
        })
    ));
    assert!(matches!(
        t.add("route", "forward", vec![lpm(0, 33)], vec![]),
        Err(RuntimeError::BadKey { index: 0, .. })
    ));
    assert!(matches!(
        t.add("route", "forward", vec![KeyMatch::Exact(1)], vec![]),
        Err(RuntimeError::BadKey { .. })
    ));
    assert!(matches!(
        t.add("acl", "deny", vec![lpm(0, 8), lpm(0, 8)], vec![]),
        Err(RuntimeError::BadKey { index: 1, .. })
    ));
    assert!(t.modify("route", 99, "forward", vec![]).is_err());
}

#[test]
fn table_without_default_misses_to_none() {
    let t = store();
    assert!(t.lookup("acl", &[0, 0]).is_none());
    assert!(t.lookup("unknown", &[0]).is_none());
}

#[test]
fn unknown_key_field_fails_to_load() {
    let raw = PROGRAM.replace("ipv4.proto", "ipv4.ttl");
    let program = ProgramSpec::from_json(&raw).expect("json parses");
    let layout = program.build_layout().expect("layout");
    assert!(matches!(
        TableStore::new(&program, &layout),
        Err(RuntimeError::UnknownField(f)) if f == "ipv4.ttl"
    ));
}
