//! 网络模拟模块
//!
//! 仿真器一侧的帧模型（协议头、帧、旁路标签）和设备层（链路、主机、
//! P4 交换机、网络拓扑）。

mod deliver_frame;
mod frame;
mod header;
mod id;
mod link;
mod net_world;
mod network;
mod node;
mod stats;
mod tag;

pub use deliver_frame::DeliverFrame;
pub use frame::Frame;
pub use header::{
    ETHERTYPE_IPV4, ETHERTYPE_IPV6, EthernetHeader, Header, IPPROTO_TCP, IPPROTO_UDP,
    Ipv4Header, Ipv6Header, MacAddr, TcpHeader, UdpHeader, internet_checksum,
};
pub use id::{LinkId, NodeId, PortNo};
pub use link::Link;
pub use net_world::NetWorld;
pub use network::Network;
pub use node::{Host, Node, P4Switch};
pub use stats::{HostStats, Stats};
pub use tag::{ByteTag, Tag};
