//! 流水线内部的包表示
//!
//! `PipelinePacket` = 原始字节 + 按程序布局组织的字段视图（PHV）。
//! 一个包只在一次 `process` 调用内存活；组播时按值克隆出兄弟副本。

use std::sync::Arc;

use super::error::RuntimeError;
use super::field::{FieldId, FieldLayout, HeaderId, Phv};

/// P4 core 解析错误码（写入 `standard_metadata.parser_error`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserError {
    #[default]
    NoError,
    PacketTooShort,
    NoMatch,
    StackOutOfBounds,
    HeaderTooShort,
    ParserTimeout,
}

impl ParserError {
    pub fn code(self) -> u32 {
        match self {
            ParserError::NoError => 0,
            ParserError::PacketTooShort => 1,
            ParserError::NoMatch => 2,
            ParserError::StackOutOfBounds => 3,
            ParserError::HeaderTooShort => 4,
            ParserError::ParserTimeout => 5,
        }
    }
}

/// 包实例类型（写入 `standard_metadata.instance_type`）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceType {
    Normal,
    IngressClone,
    EgressClone,
    Coalesced,
    Recirc,
    Replication,
    Resubmit,
}

impl InstanceType {
    pub fn code(self) -> u128 {
        match self {
            InstanceType::Normal => 0,
            InstanceType::IngressClone => 1,
            InstanceType::EgressClone => 2,
            InstanceType::Coalesced => 3,
            InstanceType::Recirc => 4,
            InstanceType::Replication => 5,
            InstanceType::Resubmit => 6,
        }
    }
}

/// 流水线中的一个包
#[derive(Debug, Clone)]
pub struct PipelinePacket {
    id: u64,
    copy_id: u32,
    ingress_port: u32,
    data: Vec<u8>,
    layout: Arc<FieldLayout>,
    phv: Phv,
    /// 解析器已消费的字节数；之后的字节是载荷
    payload_offset: usize,
    parser_error: ParserError,
    checksum_error: bool,
    exit: bool,
}

impl PipelinePacket {
    pub fn new(id: u64, ingress_port: u32, data: Vec<u8>, layout: Arc<FieldLayout>) -> Self {
        let phv = Phv::new(&layout);
        Self {
            id,
            copy_id: 0,
            ingress_port,
            data,
            layout,
            phv,
            payload_offset: 0,
            parser_error: ParserError::NoError,
            checksum_error: false,
            exit: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// 0 表示原始包，组播副本从 1 开始编号
    pub fn copy_id(&self) -> u32 {
        self.copy_id
    }

    pub fn ingress_port(&self) -> u32 {
        self.ingress_port
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 替换字节缓冲区（deparse 之后使用）
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn layout(&self) -> &Arc<FieldLayout> {
        &self.layout
    }

    pub fn phv(&self) -> &Phv {
        &self.phv
    }

    pub fn get(&self, id: FieldId) -> u128 {
        self.phv.get(id)
    }

    /// 写入字段值，超出位宽的高位被截断
    pub fn set(&mut self, id: FieldId, value: u128) {
        let mask = self.layout.field(id).mask();
        self.phv.set_raw(id, value & mask);
    }

    /// 按点分名读取字段；未声明的字段返回 `None`
    pub fn field(&self, name: &str) -> Option<u128> {
        self.layout.field_id(name).map(|id| self.phv.get(id))
    }

    pub fn set_field(&mut self, name: &str, value: u128) -> Result<(), RuntimeError> {
        let id = self.layout.require_field(name)?;
        self.set(id, value);
        Ok(())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.layout.has_field(name)
    }

    pub fn is_valid(&self, id: HeaderId) -> bool {
        self.phv.is_valid(id)
    }

    pub fn set_valid(&mut self, id: HeaderId, valid: bool) {
        self.phv.set_valid(id, valid);
    }

    /// 按名字判断头是否有效；未声明的头视为无效
    pub fn header_valid(&self, name: &str) -> bool {
        self.layout
            .header_id(name)
            .is_some_and(|id| self.phv.is_valid(id))
    }

    pub fn reset_metadata(&mut self) {
        let layout = Arc::clone(&self.layout);
        self.phv.reset_metadata(&layout);
    }

    pub fn payload_offset(&self) -> usize {
        self.payload_offset
    }

    pub fn set_payload_offset(&mut self, offset: usize) {
        self.payload_offset = offset.min(self.data.len());
    }

    pub fn parser_error(&self) -> ParserError {
        self.parser_error
    }

    pub fn set_parser_error(&mut self, err: ParserError) {
        self.parser_error = err;
    }

    pub fn checksum_error(&self) -> bool {
        self.checksum_error
    }

    pub fn set_checksum_error(&mut self, err: bool) {
        self.checksum_error = err;
    }

    /// 控制块执行了 `exit`
    pub fn mark_exit(&mut self) {
        self.exit = true;
    }

    pub fn exited(&self) -> bool {
        self.exit
    }

    pub fn reset_exit(&mut self) {
        self.exit = false;
    }

    /// 组播副本：复制当前的字段值和字节，之后两者完全独立
    pub fn replicate(&self, copy_id: u32) -> Self {
        let mut copy = self.clone();
        copy.copy_id = copy_id;
        copy
    }
}
