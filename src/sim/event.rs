//! 事件与世界
//!
//! 仿真器只认识这两个 trait：事件在某个时刻执行，世界是事件修改的状态。

use super::simulator::Simulator;
use std::any::Any;

/// 可调度的事件。按值消费自身，帧的所有权随事件转交给目标节点。
pub trait Event: Send + 'static {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World);
}

/// 仿真世界（网络拓扑、P4 交换机、统计），事件通过 downcast 取到具体类型。
pub trait World: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// 每个事件执行完后调用一次
    fn on_tick(&mut self, _sim: &mut Simulator) {}
}
