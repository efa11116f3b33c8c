//! 程序描述（JSON）
//!
//! 对应外部编译器输出的程序描述：头与字段、解析图、deparse 顺序、表、校验和字段。

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::p4::error::RuntimeError;
use crate::p4::field::FieldLayout;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub headers: Vec<HeaderSpec>,
    #[serde(default)]
    pub parser: Vec<ParseStateSpec>,
    #[serde(default)]
    pub deparser: Vec<String>,
    #[serde(default)]
    pub tables: Vec<TableSpec>,
    #[serde(default)]
    pub checksums: Vec<ChecksumSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderSpec {
    pub name: String,
    #[serde(default)]
    pub metadata: bool,
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub bits: u16,
}

/// 解析状态。第一个状态是入口；`accept` / `reject` 是保留的终止状态。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseStateSpec {
    pub name: String,
    #[serde(default)]
    pub extract: Vec<String>,
    #[serde(default)]
    pub select: Option<String>,
    #[serde(default)]
    pub transitions: Vec<TransitionSpec>,
    /// 没有 `select` 时缺省为 `accept`；有 `select` 但没有 default 时，未命中即 NoMatch
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionSpec {
    pub value: u64,
    pub next: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub keys: Vec<KeySpec>,
    pub actions: Vec<String>,
    #[serde(default)]
    pub default_action: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySpec {
    pub field: String,
    #[serde(default)]
    pub match_kind: MatchKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    #[default]
    Exact,
    Lpm,
}

/// IPv4 风格的头部校验和：parse 时校验，deparse 时重算。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksumSpec {
    pub header: String,
    pub field: String,
    /// 同一头内以 32-bit 字计的头长度字段（例如 IPv4 的 `ihl`）。
    /// 长度超过已提取的字段时，校验和还覆盖紧随其后、尚未解析的选项字节；
    /// 这要求该头是解析图中最后提取的头。
    #[serde(default)]
    pub length_words: Option<String>,
}

impl ProgramSpec {
    pub fn from_json(raw: &str) -> Result<Self, RuntimeError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| RuntimeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn build_layout(&self) -> Result<FieldLayout, RuntimeError> {
        let mut layout = FieldLayout::new();
        for h in &self.headers {
            let fields: Vec<(&str, u16)> =
                h.fields.iter().map(|f| (f.name.as_str(), f.bits)).collect();
            layout.add_header(&h.name, h.metadata, &fields)?;
        }
        Ok(layout)
    }
}
