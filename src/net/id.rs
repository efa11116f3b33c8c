//! 标识符类型
//!
//! 节点、链路的唯一标识符，以及节点上的端口号。

/// 节点标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// 链路标识符（单向）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub usize);

/// 节点上的端口号，从 1 开始按连接顺序编号
pub type PortNo = u32;
