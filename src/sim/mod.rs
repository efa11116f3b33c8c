//! 仿真核心模块
//!
//! 离散事件仿真的基础：纳秒精度的仿真时间、事件、世界和单线程仿真器。

mod event;
mod simulator;
mod time;

pub use event::{Event, World};
pub use simulator::Simulator;
pub use time::SimTime;
