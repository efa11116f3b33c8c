//! 进程级流水线上下文
//!
//! 所有流水线共享的全局计数器：packet id 与控制通道端口。
//! 显式传给每个流水线构造函数，同一进程里的多次仿真互不影响。

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// 一次仿真里所有流水线共享的计数器
#[derive(Debug)]
pub struct PipelineContext {
    next_packet_id: AtomicU64,
    next_control_port: AtomicU32,
}

impl PipelineContext {
    pub const DEFAULT_CONTROL_PORT: u16 = 9090;

    pub fn new() -> Self {
        Self::with_control_port_base(Self::DEFAULT_CONTROL_PORT)
    }

    pub fn with_control_port_base(base: u16) -> Self {
        Self {
            next_packet_id: AtomicU64::new(0),
            next_control_port: AtomicU32::new(base as u32),
        }
    }

    /// 分配一个全局唯一、单调递增的 packet id
    pub fn alloc_packet_id(&self) -> u64 {
        self.next_packet_id.fetch_add(1, Ordering::Relaxed)
    }

    /// 为新流水线分配控制通道端口（用于区分各流水线的日志目标）
    pub fn alloc_control_port(&self) -> u16 {
        let port = self.next_control_port.fetch_add(1, Ordering::Relaxed);
        u16::try_from(port).unwrap_or(u16::MAX)
    }

    /// 已分配的 packet 数
    pub fn packets_allocated(&self) -> u64 {
        self.next_packet_id.load(Ordering::Relaxed)
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new()
    }
}
