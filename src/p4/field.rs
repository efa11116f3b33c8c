//! 字段布局与 PHV
//!
//! 程序加载时把 `header.field` 形式的点分字段名解析成固定槽位；
//! 每个包只保存一块按槽位索引的值数组（PHV），热路径上不做字符串查找。

use std::collections::HashMap;
use std::ops::Range;

use super::error::RuntimeError;

/// 字段槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub(crate) usize);

/// 头槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeaderId(pub(crate) usize);

/// 单个字段的定义
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// 点分全名，例如 `standard_metadata.egress_spec`
    pub name: String,
    pub header: HeaderId,
    pub bits: u16,
    mask: u128,
}

impl FieldDef {
    pub fn mask(&self) -> u128 {
        self.mask
    }
}

/// 头定义：元数据头（metadata）始终有效，并在每次进入 ingress 前被清零。
#[derive(Debug, Clone)]
pub struct HeaderDef {
    pub name: String,
    pub metadata: bool,
    pub fields: Range<usize>,
    pub bits: usize,
}

/// 一个已加载程序的字段布局，在该程序的所有包之间共享（只读）。
#[derive(Debug, Default)]
pub struct FieldLayout {
    headers: Vec<HeaderDef>,
    fields: Vec<FieldDef>,
    field_by_name: HashMap<String, FieldId>,
    header_by_name: HashMap<String, HeaderId>,
}

impl FieldLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个头及其有序字段列表 `(name, bits)`
    pub fn add_header(
        &mut self,
        name: &str,
        metadata: bool,
        fields: &[(&str, u16)],
    ) -> Result<HeaderId, RuntimeError> {
        if self.header_by_name.contains_key(name) {
            return Err(RuntimeError::InvalidProgram(format!(
                "header `{name}` declared twice"
            )));
        }
        let hid = HeaderId(self.headers.len());
        let start = self.fields.len();
        let mut bits_total = 0usize;
        for &(fname, bits) in fields {
            if bits == 0 || bits > 128 {
                return Err(RuntimeError::InvalidProgram(format!(
                    "field `{name}.{fname}` has unsupported width {bits}"
                )));
            }
            let full = format!("{name}.{fname}");
            if self.field_by_name.contains_key(&full) {
                return Err(RuntimeError::InvalidProgram(format!(
                    "field `{full}` declared twice"
                )));
            }
            let mask = if bits == 128 {
                u128::MAX
            } else {
                (1u128 << bits) - 1
            };
            self.field_by_name
                .insert(full.clone(), FieldId(self.fields.len()));
            self.fields.push(FieldDef {
                name: full,
                header: hid,
                bits,
                mask,
            });
            bits_total += bits as usize;
        }
        self.headers.push(HeaderDef {
            name: name.to_string(),
            metadata,
            fields: start..self.fields.len(),
            bits: bits_total,
        });
        self.header_by_name.insert(name.to_string(), hid);
        Ok(hid)
    }

    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.field_by_name.get(name).copied()
    }

    /// 与 `field_id` 相同，但未声明时返回错误
    pub fn require_field(&self, name: &str) -> Result<FieldId, RuntimeError> {
        self.field_id(name)
            .ok_or_else(|| RuntimeError::UnknownField(name.to_string()))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_by_name.contains_key(name)
    }

    pub fn header_id(&self, name: &str) -> Option<HeaderId> {
        self.header_by_name.get(name).copied()
    }

    pub fn require_header(&self, name: &str) -> Result<HeaderId, RuntimeError> {
        self.header_id(name)
            .ok_or_else(|| RuntimeError::UnknownHeader(name.to_string()))
    }

    pub fn field(&self, id: FieldId) -> &FieldDef {
        &self.fields[id.0]
    }

    pub fn header(&self, id: HeaderId) -> &HeaderDef {
        &self.headers[id.0]
    }

    pub fn headers(&self) -> impl Iterator<Item = (HeaderId, &HeaderDef)> {
        self.headers.iter().enumerate().map(|(i, h)| (HeaderId(i), h))
    }

    /// 某个头的字段（按声明顺序）
    pub fn header_fields(&self, id: HeaderId) -> impl Iterator<Item = (FieldId, &FieldDef)> {
        let range = self.headers[id.0].fields.clone();
        range.map(|i| (FieldId(i), &self.fields[i]))
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn num_headers(&self) -> usize {
        self.headers.len()
    }
}

/// Packet header vector：按槽位保存的字段值 + 每个头的有效位。
///
/// `Clone` 是完整的值拷贝，组播副本之间互不影响。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phv {
    values: Box<[u128]>,
    valid: Box<[bool]>,
}

impl Phv {
    pub fn new(layout: &FieldLayout) -> Self {
        let valid = layout.headers.iter().map(|h| h.metadata).collect();
        Self {
            values: vec![0u128; layout.num_fields()].into_boxed_slice(),
            valid,
        }
    }

    pub fn get(&self, id: FieldId) -> u128 {
        self.values[id.0]
    }

    /// 直接写入槽位；调用方负责按位宽截断
    pub(crate) fn set_raw(&mut self, id: FieldId, value: u128) {
        self.values[id.0] = value;
    }

    pub fn is_valid(&self, id: HeaderId) -> bool {
        self.valid[id.0]
    }

    pub fn set_valid(&mut self, id: HeaderId, valid: bool) {
        self.valid[id.0] = valid;
    }

    /// 清零所有元数据头的字段
    pub fn reset_metadata(&mut self, layout: &FieldLayout) {
        for h in layout.headers.iter().filter(|h| h.metadata) {
            self.values[h.fields.clone()].fill(0);
        }
    }
}
