//! 可编程流水线运行时接口
//!
//! 流水线把解析、match-action 与 deparse 交给运行时完成，任何符合接口的实现都可以接入。
//! 本 crate 自带一个参考运行时：解析图来自 JSON 程序描述，控制块用 Rust 编写。

mod command;
mod pre;
mod program;
mod reference;
mod table;

use std::sync::Arc;

use super::error::RuntimeError;
use super::field::FieldLayout;
use super::packet::PipelinePacket;

pub use command::{Command, command_lines, parse_value};
pub use pre::{McNode, SimplePre};
pub use program::{
    ChecksumSpec, FieldSpec, HeaderSpec, KeySpec, MatchKind, ParseStateSpec, ProgramSpec,
    TableSpec, TransitionSpec,
};
pub use reference::{Control, NoopControl, ReferenceRuntime};
pub use table::{ActionCall, KeyMatch, TableEntry, TableStore};

/// 复制引擎的一个输出
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replica {
    pub egress_port: u32,
    pub rid: u16,
}

/// 一个已加载的 P4 程序
pub trait Runtime: Send {
    /// 程序的字段布局
    fn layout(&self) -> &Arc<FieldLayout>;

    /// 在包字节上运行解析器并填充头字段。失败只记录在包上，不作为错误返回。
    fn parse(&mut self, pkt: &mut PipelinePacket);

    fn apply_ingress(&mut self, pkt: &mut PipelinePacket);

    fn apply_egress(&mut self, pkt: &mut PipelinePacket);

    /// 把有效头按 deparse 顺序写回载荷之前
    fn deparse(&mut self, pkt: &mut PipelinePacket);

    /// 组播组的副本列表（按发出顺序），未知组或空组返回空
    fn replicate(&self, mgid: u32) -> Vec<Replica>;

    /// 执行一条控制面命令，返回它产生的句柄字符串（如果有）
    fn run_command(&mut self, line: &str) -> Result<Option<String>, RuntimeError>;
}
