//! 帧标签
//!
//! 标签跟随帧字节一起传递，但不在字节里，P4 流水线看不到它们。
//! 格式转换器把入帧的标签复制到流水线为它发出的每一个帧上。

use crate::sim::SimTime;

/// 标签值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    /// 流标识，用于日志与统计
    FlowId(u64),
    /// 源主机发出该帧时的仿真时间
    SentAt(SimTime),
    /// 自由格式的标签
    Named { name: String, value: Vec<u8> },
}

/// 绑定到帧字节区间 `[start, end)` 的标签
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteTag {
    pub start: usize,
    pub end: usize,
    pub tag: Tag,
}

impl ByteTag {
    pub fn covering(len: usize, tag: Tag) -> Self {
        ByteTag { start: 0, end: len, tag }
    }
}
