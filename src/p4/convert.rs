//! 帧格式转换
//!
//! 仿真器的结构化 `Frame` 与流水线的扁平字节缓冲之间的双向转换。
//! 出方向按一组有序规则从字节里尽力恢复协议头链，
//! 无法识别的部分原样作为载荷保留。

use std::sync::Arc;

use tracing::trace;

use crate::net::{
    ByteTag, ETHERTYPE_IPV4, ETHERTYPE_IPV6, EthernetHeader, Frame, Header, IPPROTO_TCP,
    IPPROTO_UDP, Ipv4Header, Ipv6Header, TcpHeader, UdpHeader,
};

use super::error::PipelineError;
use super::field::FieldLayout;
use super::packet::PipelinePacket;

/// 默认最大包长（字节）
pub const MAX_PACKET_SIZE: usize = 9000;

/// 已经解码到的协议层
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layer {
    #[default]
    Start,
    Link,
    Network,
    Transport,
}

/// 解码过程中的状态，规则根据它决定是否适用
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeState {
    pub layer: Layer,
    pub ether_type: Option<u16>,
    pub ip_protocol: Option<u8>,
}

/// 一条头部解码规则：`applies` 判断当前位置能否出现该头，
/// `decode` 尝试解出头并推进状态，返回消费的字节数。
#[derive(Clone, Copy)]
pub struct HeaderRule {
    pub name: &'static str,
    pub applies: fn(&DecodeState) -> bool,
    pub decode: fn(&[u8], &mut DecodeState) -> Option<(Header, usize)>,
}

impl std::fmt::Debug for HeaderRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderRule").field("name", &self.name).finish()
    }
}

impl HeaderRule {
    pub fn ethernet() -> Self {
        HeaderRule {
            name: "ethernet",
            applies: |s| s.layer == Layer::Start,
            decode: |buf, s| {
                let (h, n) = EthernetHeader::deserialize(buf)?;
                s.layer = Layer::Link;
                s.ether_type = Some(h.ether_type);
                Some((Header::Ethernet(h), n))
            },
        }
    }

    pub fn ipv4() -> Self {
        HeaderRule {
            name: "ipv4",
            applies: |s| s.layer == Layer::Link && s.ether_type == Some(ETHERTYPE_IPV4),
            decode: |buf, s| {
                let (h, n) = Ipv4Header::deserialize(buf)?;
                s.layer = Layer::Network;
                s.ip_protocol = Some(h.protocol);
                Some((Header::Ipv4(h), n))
            },
        }
    }

    pub fn ipv6() -> Self {
        HeaderRule {
            name: "ipv6",
            applies: |s| s.layer == Layer::Link && s.ether_type == Some(ETHERTYPE_IPV6),
            decode: |buf, s| {
                let (h, n) = Ipv6Header::deserialize(buf)?;
                s.layer = Layer::Network;
                s.ip_protocol = Some(h.next_header);
                Some((Header::Ipv6(h), n))
            },
        }
    }

    pub fn tcp() -> Self {
        HeaderRule {
            name: "tcp",
            applies: |s| s.layer == Layer::Network && s.ip_protocol == Some(IPPROTO_TCP),
            decode: |buf, s| {
                let (h, n) = TcpHeader::deserialize(buf)?;
                s.layer = Layer::Transport;
                Some((Header::Tcp(h), n))
            },
        }
    }

    pub fn udp() -> Self {
        HeaderRule {
            name: "udp",
            applies: |s| s.layer == Layer::Network && s.ip_protocol == Some(IPPROTO_UDP),
            decode: |buf, s| {
                let (h, n) = UdpHeader::deserialize(buf)?;
                s.layer = Layer::Transport;
                Some((Header::Udp(h), n))
            },
        }
    }
}

/// `Frame` <-> `PipelinePacket` 转换器
#[derive(Debug, Clone)]
pub struct FrameConverter {
    max_packet_size: usize,
    rules: Vec<HeaderRule>,
}

impl Default for FrameConverter {
    fn default() -> Self {
        Self::new(MAX_PACKET_SIZE)
    }
}

impl FrameConverter {
    /// 带默认规则（ethernet、ipv4、ipv6、tcp、udp）的转换器
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            max_packet_size,
            rules: vec![
                HeaderRule::ethernet(),
                HeaderRule::ipv4(),
                HeaderRule::ipv6(),
                HeaderRule::tcp(),
                HeaderRule::udp(),
            ],
        }
    }

    /// 追加一条解码规则（排在已有规则之后）
    pub fn with_rule(mut self, rule: HeaderRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    pub fn rules(&self) -> &[HeaderRule] {
        &self.rules
    }

    /// 入方向：把帧的线上字节拷进一个新的流水线包
    pub fn to_pipeline(
        &self,
        frame: &Frame,
        ingress_port: u32,
        id: u64,
        layout: &Arc<FieldLayout>,
    ) -> Result<PipelinePacket, PipelineError> {
        let len = frame.len();
        if len > self.max_packet_size {
            return Err(PipelineError::FrameTooLarge {
                len,
                max: self.max_packet_size,
            });
        }
        Ok(PipelinePacket::new(
            id,
            ingress_port,
            frame.to_bytes(),
            Arc::clone(layout),
        ))
    }

    /// 出方向：从 deparse 后的字节恢复结构化帧，并带上原始帧的标签
    pub fn to_frame(&self, pkt: PipelinePacket, origin: &Frame) -> Frame {
        let uid = pkt.id();
        let mut frame = self.decode(uid, pkt.into_data());
        let len = frame.len();
        frame.packet_tags = origin.packet_tags.clone();
        frame.byte_tags = origin
            .byte_tags
            .iter()
            .map(|bt| ByteTag::covering(len, bt.tag.clone()))
            .collect();
        frame
    }

    /// 按规则逐层解码；没有规则能继续时剩余字节作为载荷
    pub fn decode(&self, uid: u64, bytes: Vec<u8>) -> Frame {
        let mut state = DecodeState::default();
        let mut headers = Vec::new();
        let mut offset = 0usize;

        'layers: loop {
            for rule in &self.rules {
                if !(rule.applies)(&state) {
                    continue;
                }
                let mut next = state;
                if let Some((header, used)) = (rule.decode)(&bytes[offset..], &mut next) {
                    if used == 0 {
                        continue;
                    }
                    trace!(rule = rule.name, offset, used, "解出协议头");
                    headers.push(header);
                    offset += used;
                    state = next;
                    continue 'layers;
                }
            }
            break;
        }

        let payload = bytes[offset..].to_vec();
        Frame::new(uid, headers, payload)
    }
}
