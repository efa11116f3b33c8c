//! 网络世界
//!
//! 仿真器里的 World：持有整个 Network。事件拿到的是 `&mut dyn World`，
//! 用 [`NetWorld::downcast`] 取回具体类型。

use std::any::Any;

use super::network::Network;
use crate::sim::World;

#[derive(Default)]
pub struct NetWorld {
    pub net: Network,
}

impl NetWorld {
    pub fn new(net: Network) -> Self {
        Self { net }
    }

    /// 事件只会在 NetWorld 上运行；拿到别的 World 是调用方的编程错误
    pub fn downcast(world: &mut dyn World) -> &mut NetWorld {
        world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld")
    }
}

impl World for NetWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
