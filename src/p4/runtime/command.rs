//! 控制面命令
//!
//! 行式小语言，每行一条命令：
//!
//! ```text
//! table_add <table> <action> <key...> => <arg...>
//! table_delete <table> <handle>
//! table_modify <table> <action> <handle> [=>] <arg...>
//! table_set_default <table> <action> <arg...>
//! table_clear <table>
//! mc_mgrp_create <mgid>
//! mc_mgrp_destroy <mgid>
//! mc_node_create <rid> <port...>
//! mc_node_update <handle> <port...>
//! mc_node_destroy <handle>
//! mc_node_associate <mgid> <handle>
//! mc_node_dissociate <mgid> <handle>
//! ```
//!
//! 空行与 `#` 开头的行被忽略。

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::p4::error::RuntimeError;

use super::table::KeyMatch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    TableAdd {
        table: String,
        action: String,
        keys: Vec<KeyMatch>,
        args: Vec<u128>,
    },
    TableDelete {
        table: String,
        handle: u32,
    },
    TableModify {
        table: String,
        action: String,
        handle: u32,
        args: Vec<u128>,
    },
    TableSetDefault {
        table: String,
        action: String,
        args: Vec<u128>,
    },
    TableClear {
        table: String,
    },
    McMgrpCreate {
        mgid: u32,
    },
    McMgrpDestroy {
        mgid: u32,
    },
    McNodeCreate {
        rid: u16,
        ports: Vec<u32>,
    },
    McNodeUpdate {
        handle: u32,
        ports: Vec<u32>,
    },
    McNodeDestroy {
        handle: u32,
    },
    McNodeAssociate {
        mgid: u32,
        handle: u32,
    },
    McNodeDissociate {
        mgid: u32,
        handle: u32,
    },
}

/// 一批命令中真正需要执行的行
pub fn command_lines(batch: &str) -> impl Iterator<Item = &str> {
    batch
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
}

impl Command {
    pub fn parse(line: &str) -> Result<Command, RuntimeError> {
        let bad = |reason: String| RuntimeError::BadCommand {
            line: line.to_string(),
            reason,
        };
        let toks: Vec<&str> = line.split_whitespace().collect();
        let Some((&verb, rest)) = toks.split_first() else {
            return Err(bad("empty command".into()));
        };
        let num = |s: &str| -> Result<u32, RuntimeError> {
            parse_value(s)
                .ok()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| bad(format!("`{s}` is not a valid number")))
        };
        let values = |toks: &[&str]| -> Result<Vec<u128>, RuntimeError> {
            toks.iter()
                .map(|t| parse_value(t).map_err(&bad))
                .collect()
        };

        match verb {
            "table_add" => {
                let [table, action, tail @ ..] = rest else {
                    return Err(bad("usage: table_add <table> <action> <key...> => <arg...>".into()));
                };
                let (keys, args) = match tail.iter().position(|t| *t == "=>") {
                    Some(i) => (&tail[..i], &tail[i + 1..]),
                    None => (tail, &[][..]),
                };
                let keys = keys
                    .iter()
                    .map(|k| parse_key(k).map_err(&bad))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Command::TableAdd {
                    table: table.to_string(),
                    action: action.to_string(),
                    keys,
                    args: values(args)?,
                })
            }
            "table_delete" => {
                let [table, handle] = rest else {
                    return Err(bad("usage: table_delete <table> <handle>".into()));
                };
                Ok(Command::TableDelete {
                    table: table.to_string(),
                    handle: num(*handle)?,
                })
            }
            "table_modify" => {
                let [table, action, handle, tail @ ..] = rest else {
                    return Err(bad("usage: table_modify <table> <action> <handle> <arg...>".into()));
                };
                let tail = match tail.first() {
                    Some(&"=>") => &tail[1..],
                    _ => tail,
                };
                Ok(Command::TableModify {
                    table: table.to_string(),
                    action: action.to_string(),
                    handle: num(*handle)?,
                    args: values(tail)?,
                })
            }
            "table_set_default" => {
                let [table, action, tail @ ..] = rest else {
                    return Err(bad("usage: table_set_default <table> <action> <arg...>".into()));
                };
                Ok(Command::TableSetDefault {
                    table: table.to_string(),
                    action: action.to_string(),
                    args: values(tail)?,
                })
            }
            "table_clear" => {
                let [table] = rest else {
                    return Err(bad("usage: table_clear <table>".into()));
                };
                Ok(Command::TableClear {
                    table: table.to_string(),
                })
            }
            "mc_mgrp_create" | "mc_mgrp_destroy" => {
                let [mgid] = rest else {
                    return Err(bad("expected a multicast group id".into()));
                };
                let mgid = num(*mgid)?;
                Ok(if verb == "mc_mgrp_create" {
                    Command::McMgrpCreate { mgid }
                } else {
                    Command::McMgrpDestroy { mgid }
                })
            }
            "mc_node_create" => {
                let [rid, ports @ ..] = rest else {
                    return Err(bad("usage: mc_node_create <rid> <port...>".into()));
                };
                let rid = u16::try_from(num(*rid)?).map_err(|_| bad("rid does not fit 16 bits".into()))?;
                Ok(Command::McNodeCreate {
                    rid,
                    ports: ports.iter().map(|p| num(*p)).collect::<Result<_, _>>()?,
                })
            }
            "mc_node_update" => {
                let [handle, ports @ ..] = rest else {
                    return Err(bad("usage: mc_node_update <handle> <port...>".into()));
                };
                Ok(Command::McNodeUpdate {
                    handle: num(*handle)?,
                    ports: ports.iter().map(|p| num(*p)).collect::<Result<_, _>>()?,
                })
            }
            "mc_node_destroy" => {
                let [handle] = rest else {
                    return Err(bad("usage: mc_node_destroy <handle>".into()));
                };
                Ok(Command::McNodeDestroy {
                    handle: num(*handle)?,
                })
            }
            "mc_node_associate" | "mc_node_dissociate" => {
                let [mgid, handle] = rest else {
                    return Err(bad("expected <mgid> <node handle>".into()));
                };
                let (mgid, handle) = (num(*mgid)?, num(*handle)?);
                Ok(if verb == "mc_node_associate" {
                    Command::McNodeAssociate { mgid, handle }
                } else {
                    Command::McNodeDissociate { mgid, handle }
                })
            }
            _ => Err(bad("unknown command".into())),
        }
    }
}

/// 解析一个值字面量：十进制、`0x` 十六进制、IPv4、IPv6、MAC。
pub fn parse_value(s: &str) -> Result<u128, String> {
    if let Some(mac) = parse_mac(s) {
        return Ok(mac);
    }
    if s.contains(':') {
        return s
            .parse::<Ipv6Addr>()
            .map(u128::from)
            .map_err(|_| format!("`{s}` is not a valid IPv6 address"));
    }
    if s.contains('.') {
        return s
            .parse::<Ipv4Addr>()
            .map(|a| u32::from(a) as u128)
            .map_err(|_| format!("`{s}` is not a valid IPv4 address"));
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u128::from_str_radix(hex, 16).map_err(|_| format!("`{s}` is not valid hex"));
    }
    s.parse::<u128>()
        .map_err(|_| format!("`{s}` is not a valid value"))
}

fn parse_mac(s: &str) -> Option<u128> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 6 || parts.iter().any(|p| p.len() != 2) {
        return None;
    }
    parts.iter().try_fold(0u128, |acc, p| {
        u8::from_str_radix(p, 16).ok().map(|b| (acc << 8) | b as u128)
    })
}

fn parse_key(s: &str) -> Result<KeyMatch, String> {
    match s.split_once('/') {
        Some((value, len)) => {
            let prefix_len = len
                .parse::<u16>()
                .map_err(|_| format!("`{len}` is not a valid prefix length"))?;
            Ok(KeyMatch::Lpm {
                value: parse_value(value)?,
                prefix_len,
            })
        }
        None => Ok(KeyMatch::Exact(parse_value(s)?)),
    }
}
