//! 帧交付事件
//!
//! 链路另一端的帧到达时间到了，把帧交给目标节点的入端口。

use super::frame::Frame;
use super::id::{NodeId, PortNo};
use super::net_world::NetWorld;
use crate::sim::{Event, Simulator, World};
use tracing::trace;

/// 事件：把一帧从 `in_port` 交给某个节点处理。
#[derive(Debug)]
pub struct DeliverFrame {
    pub to: NodeId,
    pub in_port: PortNo,
    pub frame: Frame,
}

impl Event for DeliverFrame {
    #[tracing::instrument(skip(self, sim, world), fields(uid = self.frame.uid, to = ?self.to, in_port = self.in_port))]
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let DeliverFrame { to, in_port, frame } = *self;
        trace!(now = ?sim.now(), len = frame.len(), "📨 帧到达事件执行");

        let w = NetWorld::downcast(world);
        w.net.deliver(to, in_port, frame, sim);
    }
}
