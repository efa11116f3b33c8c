//! 节点类型
//!
//! 节点 trait 与两种具体节点：终端主机、以及由 P4 流水线驱动的交换机。

use std::any::Any;
use std::net::IpAddr;

use super::frame::Frame;
use super::header::MacAddr;
use super::id::{NodeId, PortNo};
use super::network::Network;
use crate::p4::Pipeline;
use crate::sim::Simulator;
use tracing::{debug, error, trace};

/// 节点接口
pub trait Node: Send {
    /// 获取节点标识符
    fn id(&self) -> NodeId;

    /// 获取节点名称
    fn name(&self) -> &str;

    /// 处理从 `in_port` 到达的帧
    fn on_frame(&mut self, in_port: PortNo, frame: Frame, sim: &mut Simulator, net: &mut Network);

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// 主机节点：只有一个端口（1），收到的帧全部视为送达
#[derive(Debug)]
pub struct Host {
    id: NodeId,
    name: String,
    ip: IpAddr,
    mac: MacAddr,
}

impl Host {
    /// 创建新主机
    pub fn new(id: NodeId, name: impl Into<String>, ip: IpAddr, mac: MacAddr) -> Self {
        Self {
            id,
            name: name.into(),
            ip,
            mac,
        }
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }
}

impl Node for Host {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip(self, frame, sim, net), fields(node_name = %self.name(), node_id = ?self.id(), uid = frame.uid, flow_id = ?frame.flow_id()))]
    fn on_frame(&mut self, in_port: PortNo, frame: Frame, sim: &mut Simulator, net: &mut Network) {
        debug!("🖥️  Host 收到帧");
        trace!(in_port, headers = ?frame.header_chain(), len = frame.len(), "帧信息");
        net.on_delivered(self.id, frame, sim.now());
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// P4 交换机：每个入帧交给流水线，按流水线给出的出端口转发
#[derive(Debug)]
pub struct P4Switch {
    id: NodeId,
    name: String,
    pipeline: Pipeline,
}

impl P4Switch {
    pub fn new(id: NodeId, name: impl Into<String>, pipeline: Pipeline) -> Self {
        Self {
            id,
            name: name.into(),
            pipeline,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// 运行期控制面通道
    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }
}

impl Node for P4Switch {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip(self, frame, sim, net), fields(node_name = %self.name(), node_id = ?self.id(), uid = frame.uid, flow_id = ?frame.flow_id()))]
    fn on_frame(&mut self, in_port: PortNo, frame: Frame, sim: &mut Simulator, net: &mut Network) {
        debug!("🔀 P4 交换机收到帧");
        net.stats.switch_rx_frames += 1;

        let out = match self.pipeline.process(&frame, in_port, sim.now()) {
            Ok(out) => out,
            Err(e) => {
                error!(error = %e, "💥 流水线致命错误，终止仿真");
                panic!("{}: fatal pipeline error: {e}", self.name);
            }
        };

        trace!(outputs = out.len(), "流水线输出");
        for (port, f) in out {
            net.stats.switch_tx_frames += 1;
            net.transmit(self.id, port, f, sim);
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
