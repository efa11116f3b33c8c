//! 表项存储
//!
//! 参考运行时的最小匹配表：每个 key 是 exact 或 lpm；多条命中时取
//! lpm 前缀总长最大的一条，相同则取 handle 最小的；都未命中时返回默认动作。

use std::collections::{BTreeMap, HashMap};

use crate::p4::error::RuntimeError;
use crate::p4::field::{FieldId, FieldLayout};
use crate::p4::packet::PipelinePacket;

use super::program::{MatchKind, ProgramSpec, TableSpec};

/// 表项中的一个 key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMatch {
    Exact(u128),
    Lpm { value: u128, prefix_len: u16 },
}

/// 动作调用：动作名 + 参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCall {
    pub action: String,
    pub args: Vec<u128>,
}

impl ActionCall {
    /// 第 `i` 个参数，缺省为 0
    pub fn arg(&self, i: usize) -> u128 {
        self.args.get(i).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub handle: u32,
    pub keys: Vec<KeyMatch>,
    pub call: ActionCall,
}

#[derive(Debug)]
struct Table {
    spec: TableSpec,
    key_fields: Vec<FieldId>,
    key_bits: Vec<u16>,
    entries: BTreeMap<u32, TableEntry>,
    next_handle: u32,
    default: Option<ActionCall>,
}

impl Table {
    fn check_action(&self, action: &str) -> Result<(), RuntimeError> {
        if self.spec.actions.iter().any(|a| a == action) {
            Ok(())
        } else {
            Err(RuntimeError::UnknownAction {
                table: self.spec.name.clone(),
                action: action.to_string(),
            })
        }
    }

    fn matches(&self, entry: &TableEntry, values: &[u128]) -> Option<u32> {
        let mut score = 0u32;
        for ((key, &value), &bits) in entry.keys.iter().zip(values).zip(&self.key_bits) {
            match *key {
                KeyMatch::Exact(v) => {
                    if v != value {
                        return None;
                    }
                }
                KeyMatch::Lpm {
                    value: v,
                    prefix_len,
                } => {
                    let mask = prefix_mask(bits, prefix_len);
                    if v & mask != value & mask {
                        return None;
                    }
                    score += prefix_len as u32;
                }
            }
        }
        Some(score)
    }
}

fn prefix_mask(bits: u16, prefix_len: u16) -> u128 {
    if prefix_len == 0 {
        return 0;
    }
    let width_mask = if bits >= 128 {
        u128::MAX
    } else {
        (1u128 << bits) - 1
    };
    let host_bits = bits.saturating_sub(prefix_len) as u32;
    width_mask & !((1u128.checked_shl(host_bits).unwrap_or(0)).wrapping_sub(1))
}

/// 程序中所有表
#[derive(Debug, Default)]
pub struct TableStore {
    tables: HashMap<String, Table>,
}

impl TableStore {
    pub fn new(program: &ProgramSpec, layout: &FieldLayout) -> Result<Self, RuntimeError> {
        let mut tables = HashMap::new();
        for spec in &program.tables {
            let mut key_fields = Vec::with_capacity(spec.keys.len());
            let mut key_bits = Vec::with_capacity(spec.keys.len());
            for k in &spec.keys {
                let id = layout.require_field(&k.field)?;
                key_fields.push(id);
                key_bits.push(layout.field(id).bits);
            }
            let default = match &spec.default_action {
                Some(a) if !spec.actions.contains(a) => {
                    return Err(RuntimeError::UnknownAction {
                        table: spec.name.clone(),
                        action: a.clone(),
                    });
                }
                Some(a) => Some(ActionCall {
                    action: a.clone(),
                    args: Vec::new(),
                }),
                None => None,
            };
            let table = Table {
                spec: spec.clone(),
                key_fields,
                key_bits,
                entries: BTreeMap::new(),
                next_handle: 0,
                default,
            };
            if tables.insert(spec.name.clone(), table).is_some() {
                return Err(RuntimeError::InvalidProgram(format!(
                    "table `{}` declared twice",
                    spec.name
                )));
            }
        }
        Ok(Self { tables })
    }

    fn table(&self, name: &str) -> Result<&Table, RuntimeError> {
        self.tables
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownTable(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table, RuntimeError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| RuntimeError::UnknownTable(name.to_string()))
    }

    /// 添加表项，返回 handle
    pub fn add(
        &mut self,
        table: &str,
        action: &str,
        keys: Vec<KeyMatch>,
        args: Vec<u128>,
    ) -> Result<u32, RuntimeError> {
        let t = self.table_mut(table)?;
        t.check_action(action)?;
        if keys.len() != t.spec.keys.len() {
            return Err(RuntimeError::KeyCount {
                table: table.to_string(),
                expected: t.spec.keys.len(),
                got: keys.len(),
            });
        }
        for (index, (key, spec)) in keys.iter().zip(&t.spec.keys).enumerate() {
            let bits = t.key_bits[index];
            let reason = match (key, spec.match_kind) {
                (KeyMatch::Exact(_), MatchKind::Lpm) => Some("expected a prefix (value/len)".to_string()),
                (KeyMatch::Lpm { .. }, MatchKind::Exact) => Some("prefix given for an exact key".to_string()),
                (KeyMatch::Lpm { prefix_len, .. }, MatchKind::Lpm) if *prefix_len > bits => {
                    Some(format!("prefix length {prefix_len} exceeds field width {bits}"))
                }
                _ => None,
            };
            if let Some(reason) = reason {
                return Err(RuntimeError::BadKey {
                    table: table.to_string(),
                    index,
                    reason,
                });
            }
        }
        let handle = t.next_handle;
        t.next_handle += 1;
        t.entries.insert(
            handle,
            TableEntry {
                handle,
                keys,
                call: ActionCall {
                    action: action.to_string(),
                    args,
                },
            },
        );
        Ok(handle)
    }

    pub fn delete(&mut self, table: &str, handle: u32) -> Result<(), RuntimeError> {
        let t = self.table_mut(table)?;
        t.entries
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::UnknownEntry {
                table: table.to_string(),
                handle,
            })
    }

    pub fn modify(
        &mut self,
        table: &str,
        handle: u32,
        action: &str,
        args: Vec<u128>,
    ) -> Result<(), RuntimeError> {
        let t = self.table_mut(table)?;
        t.check_action(action)?;
        let entry = t
            .entries
            .get_mut(&handle)
            .ok_or_else(|| RuntimeError::UnknownEntry {
                table: table.to_string(),
                handle,
            })?;
        entry.call = ActionCall {
            action: action.to_string(),
            args,
        };
        Ok(())
    }

    pub fn set_default(
        &mut self,
        table: &str,
        action: &str,
        args: Vec<u128>,
    ) -> Result<(), RuntimeError> {
        let t = self.table_mut(table)?;
        t.check_action(action)?;
        t.default = Some(ActionCall {
            action: action.to_string(),
            args,
        });
        Ok(())
    }

    pub fn clear(&mut self, table: &str) -> Result<(), RuntimeError> {
        self.table_mut(table)?.entries.clear();
        Ok(())
    }

    /// 用给定的 key 值查表；未命中时返回默认动作（若有）
    pub fn lookup(&self, table: &str, values: &[u128]) -> Option<&ActionCall> {
        let t = self.tables.get(table)?;
        let mut best: Option<(u32, &TableEntry)> = None;
        for entry in t.entries.values() {
            if let Some(score) = t.matches(entry, values) {
                if best.is_none_or(|(s, _)| score > s) {
                    best = Some((score, entry));
                }
            }
        }
        best.map(|(_, e)| &e.call).or(t.default.as_ref())
    }

    /// 从包的字段里取 key 值后查表
    pub fn lookup_packet(&self, table: &str, pkt: &PipelinePacket) -> Option<&ActionCall> {
        let t = self.tables.get(table)?;
        let values: Vec<u128> = t.key_fields.iter().map(|&id| pkt.get(id)).collect();
        self.lookup(table, &values)
    }

    pub fn entries(&self, table: &str) -> Result<impl Iterator<Item = &TableEntry>, RuntimeError> {
        Ok(self.table(table)?.entries.values())
    }

    pub fn len(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.entries.len())
    }
}
