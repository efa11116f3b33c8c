//! 参考运行时
//!
//! 解释 JSON 程序描述中的解析图与 deparse 顺序，match-action 部分由
//! Rust 编写的 [`Control`] 实现，表项与组播组通过控制面命令维护。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use bitvec::prelude::*;
use tracing::{debug, trace};

use crate::net::internet_checksum;
use crate::p4::error::RuntimeError;
use crate::p4::field::{FieldId, FieldLayout, HeaderId};
use crate::p4::packet::{ParserError, PipelinePacket};

use super::command::Command;
use super::pre::SimplePre;
use super::program::ProgramSpec;
use super::table::TableStore;
use super::{Replica, Runtime};

/// 解析器最多经过的状态数，超过即 ParserTimeout（防止环形解析图）
const MAX_PARSE_STEPS: usize = 256;

/// 一个 match-action 控制块
pub trait Control: Send {
    fn apply(&mut self, pkt: &mut PipelinePacket, tables: &TableStore);
}

impl<F> Control for F
where
    F: FnMut(&mut PipelinePacket, &TableStore) + Send,
{
    fn apply(&mut self, pkt: &mut PipelinePacket, tables: &TableStore) {
        self(pkt, tables)
    }
}

/// 什么都不做的控制块
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopControl;

impl Control for NoopControl {
    fn apply(&mut self, _pkt: &mut PipelinePacket, _tables: &TableStore) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    State(usize),
    Accept,
    Reject,
}

/// 一个已解析的校验和：所在头、校验和字段、可选的头长度字段
#[derive(Debug, Clone, Copy)]
struct Checksum {
    header: HeaderId,
    field: FieldId,
    length_words: Option<FieldId>,
}

#[derive(Debug)]
struct ParseState {
    extract: Vec<HeaderId>,
    select: Option<FieldId>,
    transitions: Vec<(u128, Next)>,
    default: Option<Next>,
}

pub struct ReferenceRuntime {
    program: ProgramSpec,
    layout: Arc<FieldLayout>,
    states: Vec<ParseState>,
    deparse_order: Vec<HeaderId>,
    checksums: Vec<Checksum>,
    tables: TableStore,
    pre: SimplePre,
    ingress: Box<dyn Control>,
    egress: Box<dyn Control>,
}

impl ReferenceRuntime {
    pub fn new(program: ProgramSpec) -> Result<Self, RuntimeError> {
        let layout = program.build_layout()?;

        let index: HashMap<&str, usize> = program
            .parser
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();
        let resolve = |name: &str| -> Result<Next, RuntimeError> {
            match name {
                "accept" => Ok(Next::Accept),
                "reject" => Ok(Next::Reject),
                _ => index.get(name).map(|&i| Next::State(i)).ok_or_else(|| {
                    RuntimeError::InvalidProgram(format!("unknown parser state `{name}`"))
                }),
            }
        };

        let mut states = Vec::with_capacity(program.parser.len());
        for s in &program.parser {
            let extract = s
                .extract
                .iter()
                .map(|h| layout.require_header(h))
                .collect::<Result<Vec<_>, _>>()?;
            let select = s
                .select
                .as_deref()
                .map(|f| layout.require_field(f))
                .transpose()?;
            let transitions = s
                .transitions
                .iter()
                .map(|t| Ok((t.value as u128, resolve(&t.next)?)))
                .collect::<Result<Vec<_>, RuntimeError>>()?;
            let default = s.default.as_deref().map(resolve).transpose()?;
            states.push(ParseState {
                extract,
                select,
                transitions,
                default,
            });
        }

        let deparse_order = program
            .deparser
            .iter()
            .map(|h| layout.require_header(h))
            .collect::<Result<Vec<_>, _>>()?;

        let checksums = program
            .checksums
            .iter()
            .map(|c| {
                let header = layout.require_header(&c.header)?;
                let field = layout.require_field(&format!("{}.{}", c.header, c.field))?;
                let length_words = c
                    .length_words
                    .as_deref()
                    .map(|f| layout.require_field(&format!("{}.{f}", c.header)))
                    .transpose()?;
                Ok(Checksum {
                    header,
                    field,
                    length_words,
                })
            })
            .collect::<Result<Vec<_>, RuntimeError>>()?;

        let tables = TableStore::new(&program, &layout)?;

        Ok(Self {
            program,
            layout: Arc::new(layout),
            states,
            deparse_order,
            checksums,
            tables,
            pre: SimplePre::new(),
            ingress: Box::new(NoopControl),
            egress: Box::new(NoopControl),
        })
    }

    /// 从 JSON 文件加载程序描述
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        Self::new(ProgramSpec::load(path)?)
    }

    pub fn with_ingress(mut self, control: impl Control + 'static) -> Self {
        self.ingress = Box::new(control);
        self
    }

    pub fn with_egress(mut self, control: impl Control + 'static) -> Self {
        self.egress = Box::new(control);
        self
    }

    pub fn program(&self) -> &ProgramSpec {
        &self.program
    }

    pub fn tables(&self) -> &TableStore {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut TableStore {
        &mut self.tables
    }

    pub fn pre(&self) -> &SimplePre {
        &self.pre
    }

    pub fn pre_mut(&mut self) -> &mut SimplePre {
        &mut self.pre
    }

    fn extract(&self, pkt: &mut PipelinePacket, hid: HeaderId, cursor: usize) -> usize {
        let mut pos = cursor;
        for (id, def) in self.layout.header_fields(hid) {
            let end = pos + def.bits as usize;
            let v: u128 = pkt.data().view_bits::<Msb0>()[pos..end].load_be();
            pkt.set(id, v);
            pos = end;
        }
        pkt.set_valid(hid, true);
        pos
    }

    /// 把一个头的字段按声明顺序追加到 `out`，`zeroed` 字段写 0
    fn emit(
        &self,
        pkt: &PipelinePacket,
        hid: HeaderId,
        zeroed: Option<FieldId>,
        out: &mut BitVec<u8, Msb0>,
    ) {
        for (id, def) in self.layout.header_fields(hid) {
            let v = if Some(id) == zeroed { 0 } else { pkt.get(id) };
            let start = out.len();
            out.resize(start + def.bits as usize, false);
            out[start..].store_be(v);
        }
    }

    /// 头部校验和。覆盖的范围是头长度字段给出的字节数（至少是字段总宽），
    /// 超出部分取自当前载荷的开头。
    fn header_checksum(&self, pkt: &PipelinePacket, c: &Checksum) -> u16 {
        let mut bits = BitVec::<u8, Msb0>::new();
        self.emit(pkt, c.header, Some(c.field), &mut bits);
        let mut bytes = into_bytes(bits);
        if let Some(len_id) = c.length_words {
            let want = pkt.get(len_id) as usize * 4;
            let rest = pkt.data().get(pkt.payload_offset()..).unwrap_or_default();
            let extra = want.saturating_sub(bytes.len()).min(rest.len());
            bytes.extend_from_slice(&rest[..extra]);
        }
        internet_checksum(&bytes)
    }
}

/// 补齐到整字节后取出底层字节
fn into_bytes(mut bits: BitVec<u8, Msb0>) -> Vec<u8> {
    let padded = bits.len().div_ceil(8) * 8;
    bits.resize(padded, false);
    bits.into_vec()
}

impl Runtime for ReferenceRuntime {
    fn layout(&self) -> &Arc<FieldLayout> {
        &self.layout
    }

    fn parse(&mut self, pkt: &mut PipelinePacket) {
        let total_bits = pkt.len() * 8;
        let mut cursor = 0usize;
        let mut next = if self.states.is_empty() {
            Next::Accept
        } else {
            Next::State(0)
        };
        let mut steps = 0usize;

        let err = 'parse: loop {
            let idx = match next {
                Next::Accept | Next::Reject => break ParserError::NoError,
                Next::State(i) => i,
            };
            steps += 1;
            if steps > MAX_PARSE_STEPS {
                break ParserError::ParserTimeout;
            }
            let state = &self.states[idx];
            for &hid in &state.extract {
                let bits = self.layout.header(hid).bits;
                if cursor + bits > total_bits {
                    break 'parse ParserError::PacketTooShort;
                }
                cursor = self.extract(pkt, hid, cursor);
            }
            next = match state.select {
                None => state.default.unwrap_or(Next::Accept),
                Some(fid) => {
                    let v = pkt.get(fid);
                    match state
                        .transitions
                        .iter()
                        .find(|(value, _)| *value == v)
                        .map(|(_, n)| *n)
                        .or(state.default)
                    {
                        Some(n) => n,
                        None => break ParserError::NoMatch,
                    }
                }
            };
        };

        if err != ParserError::NoError {
            debug!(pkt_id = pkt.id(), error = ?err, "解析失败");
        }
        pkt.set_parser_error(err);
        pkt.set_payload_offset(cursor.div_ceil(8));

        let mut bad_checksum = false;
        for c in &self.checksums {
            if pkt.is_valid(c.header) && self.header_checksum(pkt, c) as u128 != pkt.get(c.field)
            {
                bad_checksum = true;
            }
        }
        pkt.set_checksum_error(bad_checksum);
        trace!(pkt_id = pkt.id(), payload_offset = pkt.payload_offset(), "解析完成");
    }

    fn apply_ingress(&mut self, pkt: &mut PipelinePacket) {
        self.ingress.apply(pkt, &self.tables);
    }

    fn apply_egress(&mut self, pkt: &mut PipelinePacket) {
        self.egress.apply(pkt, &self.tables);
    }

    fn deparse(&mut self, pkt: &mut PipelinePacket) {
        for c in &self.checksums {
            if pkt.is_valid(c.header) {
                let csum = self.header_checksum(pkt, c);
                pkt.set(c.field, csum as u128);
            }
        }

        let mut bits = BitVec::<u8, Msb0>::new();
        for &hid in &self.deparse_order {
            if pkt.is_valid(hid) {
                self.emit(pkt, hid, None, &mut bits);
            }
        }
        let mut out = into_bytes(bits);
        let header_len = out.len();
        out.extend_from_slice(&pkt.data()[pkt.payload_offset()..]);
        pkt.set_data(out);
        pkt.set_payload_offset(header_len);
    }

    fn replicate(&self, mgid: u32) -> Vec<Replica> {
        self.pre.replicate(mgid)
    }

    fn run_command(&mut self, line: &str) -> Result<Option<String>, RuntimeError> {
        let handle = match Command::parse(line)? {
            Command::TableAdd {
                table,
                action,
                keys,
                args,
            } => Some(self.tables.add(&table, &action, keys, args)?),
            Command::TableDelete { table, handle } => {
                self.tables.delete(&table, handle)?;
                None
            }
            Command::TableModify {
                table,
                action,
                handle,
                args,
            } => {
                self.tables.modify(&table, handle, &action, args)?;
                None
            }
            Command::TableSetDefault {
                table,
                action,
                args,
            } => {
                self.tables.set_default(&table, &action, args)?;
                None
            }
            Command::TableClear { table } => {
                self.tables.clear(&table)?;
                None
            }
            Command::McMgrpCreate { mgid } => {
                self.pre.create_group(mgid)?;
                None
            }
            Command::McMgrpDestroy { mgid } => {
                self.pre.destroy_group(mgid)?;
                None
            }
            Command::McNodeCreate { rid, ports } => Some(self.pre.create_node(rid, ports)),
            Command::McNodeUpdate { handle, ports } => {
                self.pre.update_node(handle, ports)?;
                None
            }
            Command::McNodeDestroy { handle } => {
                self.pre.destroy_node(handle)?;
                None
            }
            Command::McNodeAssociate { mgid, handle } => {
                self.pre.associate(mgid, handle)?;
                None
            }
            Command::McNodeDissociate { mgid, handle } => {
                self.pre.dissociate(mgid, handle)?;
                None
            }
        };
        Ok(handle.map(|h| h.to_string()))
    }
}
