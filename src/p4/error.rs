//! P4 流水线错误类型
//!
//! 只有配置类错误会以 `Err` 出现；逐包的解析失败、查表未命中等情况
//! 通过元数据字段或者更少的输出帧表达，不会产生错误。

use std::path::PathBuf;

use thiserror::Error;

/// 运行时错误：程序加载与控制面命令
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to read program {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid program description: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid program: {0}")]
    InvalidProgram(String),
    #[error("unknown header `{0}`")]
    UnknownHeader(String),
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("unknown table `{0}`")]
    UnknownTable(String),
    #[error("action `{action}` is not allowed in table `{table}`")]
    UnknownAction { table: String, action: String },
    #[error("table `{table}` has no entry with handle {handle}")]
    UnknownEntry { table: String, handle: u32 },
    #[error("table `{table}` expects {expected} key(s), got {got}")]
    KeyCount {
        table: String,
        expected: usize,
        got: usize,
    },
    #[error("key {index} of table `{table}`: {reason}")]
    BadKey {
        table: String,
        index: usize,
        reason: String,
    },
    #[error("multicast group {0} does not exist")]
    UnknownGroup(u32),
    #[error("multicast group {0} already exists")]
    DuplicateGroup(u32),
    #[error("multicast node {0} does not exist")]
    UnknownNode(u32),
    #[error("multicast node {node} is already associated with group {mgid}")]
    AlreadyAssociated { mgid: u32, node: u32 },
    #[error("multicast node {node} is not associated with group {mgid}")]
    NotAssociated { mgid: u32, node: u32 },
    #[error("bad command `{line}`: {reason}")]
    BadCommand { line: String, reason: String },
}

/// 致命的流水线错误，宿主层应当终止本次仿真
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("packet length {len} exceeds maximum packet size {max}")]
    FrameTooLarge { len: usize, max: usize },
    #[error("program does not declare required field `{0}`")]
    MissingRequiredField(String),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
