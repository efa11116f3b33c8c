//! P4 流水线
//!
//! 一个入帧的完整处理：ingress -> 流量管理（单播 / 组播复制 / 丢弃）
//! -> 每个副本的 egress -> deparse。解析、匹配动作、deparse 与组播复制
//! 委托给 [`Runtime`]；本模块只负责标准元数据的生命周期和转发决策。

use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::net::Frame;
use crate::sim::SimTime;

use super::context::PipelineContext;
use super::convert::{FrameConverter, MAX_PACKET_SIZE};
use super::error::{PipelineError, RuntimeError};
use super::field::{FieldId, FieldLayout};
use super::packet::{InstanceType, PipelinePacket};
use super::runtime::{Runtime, command_lines};

/// 程序必须声明的标准元数据字段
pub const REQUIRED_FIELDS: [&str; 5] = [
    "standard_metadata.ingress_port",
    "standard_metadata.packet_length",
    "standard_metadata.instance_type",
    "standard_metadata.egress_spec",
    "standard_metadata.egress_port",
];

/// 默认的丢弃端口
pub const DEFAULT_DROP_PORT: u32 = 511;

/// 流水线配置
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub name: String,
    pub max_packet_size: usize,
    /// `egress_spec` 等于该值表示丢弃
    pub drop_port: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "p4".to_string(),
            max_packet_size: MAX_PACKET_SIZE,
            drop_port: DEFAULT_DROP_PORT,
        }
    }
}

impl PipelineConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// 加载时解析好的元数据槽位
#[derive(Debug, Clone, Copy)]
struct StandardFields {
    ingress_port: FieldId,
    packet_length: FieldId,
    instance_type: FieldId,
    egress_spec: FieldId,
    egress_port: FieldId,
    ingress_global_timestamp: Option<FieldId>,
    egress_global_timestamp: Option<FieldId>,
    parser_error: Option<FieldId>,
    checksum_error: Option<FieldId>,
    mcast_grp: Option<FieldId>,
    egress_rid: Option<FieldId>,
}

impl StandardFields {
    fn resolve(layout: &FieldLayout) -> Result<Self, PipelineError> {
        let required = |name: &str| {
            layout
                .field_id(name)
                .ok_or_else(|| PipelineError::MissingRequiredField(name.to_string()))
        };
        let [ingress_port, packet_length, instance_type, egress_spec, egress_port] =
            REQUIRED_FIELDS;
        Ok(Self {
            ingress_port: required(ingress_port)?,
            packet_length: required(packet_length)?,
            instance_type: required(instance_type)?,
            egress_spec: required(egress_spec)?,
            egress_port: required(egress_port)?,
            ingress_global_timestamp: layout.field_id("intrinsic_metadata.ingress_global_timestamp"),
            egress_global_timestamp: layout.field_id("intrinsic_metadata.egress_global_timestamp"),
            parser_error: layout.field_id("standard_metadata.parser_error"),
            checksum_error: layout.field_id("standard_metadata.checksum_error"),
            mcast_grp: layout.field_id("intrinsic_metadata.mcast_grp"),
            egress_rid: layout.field_id("intrinsic_metadata.egress_rid"),
        })
    }
}

/// 一个已加载程序的 P4 流水线
pub struct Pipeline {
    cfg: PipelineConfig,
    ctx: Arc<PipelineContext>,
    runtime: Box<dyn Runtime>,
    converter: FrameConverter,
    meta: StandardFields,
    control_port: u16,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("cfg", &self.cfg)
            .field("control_port", &self.control_port)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// 构造流水线；程序缺少必需的标准元数据字段时失败
    pub fn new(
        ctx: Arc<PipelineContext>,
        runtime: Box<dyn Runtime>,
        cfg: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let meta = StandardFields::resolve(runtime.layout())?;
        let control_port = ctx.alloc_control_port();
        let converter = FrameConverter::new(cfg.max_packet_size);
        info!(
            pipeline = %cfg.name,
            control_port,
            fields = runtime.layout().num_fields(),
            "🧩 P4 流水线已加载"
        );
        Ok(Self {
            cfg,
            ctx,
            runtime,
            converter,
            meta,
            control_port,
        })
    }

    /// 替换帧转换器（例如追加自定义解码规则）
    pub fn with_converter(mut self, converter: FrameConverter) -> Self {
        self.converter = converter;
        self
    }

    pub fn name(&self) -> &str {
        &self.cfg.name
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn control_port(&self) -> u16 {
        self.control_port
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.ctx
    }

    pub fn runtime(&self) -> &dyn Runtime {
        self.runtime.as_ref()
    }

    pub fn converter(&self) -> &FrameConverter {
        &self.converter
    }

    /// 执行一条控制面命令，返回它产生的 handle（若有）
    pub fn run_command(&mut self, line: &str) -> Result<Option<String>, RuntimeError> {
        let out = self.runtime.run_command(line)?;
        trace!(pipeline = %self.cfg.name, line, output = ?out, "控制面命令");
        Ok(out)
    }

    /// 执行一批命令（空行与 `#` 注释行被跳过），遇到第一个错误即停止
    pub fn run_commands(&mut self, batch: &str) -> Result<Vec<Option<String>>, RuntimeError> {
        let outputs = command_lines(batch)
            .map(|line| self.runtime.run_command(line))
            .collect::<Result<Vec<_>, _>>()?;
        info!(pipeline = %self.cfg.name, commands = outputs.len(), "📋 控制面命令执行完成");
        Ok(outputs)
    }

    /// 处理一个入帧，返回按副本生成顺序排列的 `(出端口, 帧)`
    ///
    /// 只有帧超过最大包长时返回错误；解析失败、查表未命中、空组播组
    /// 都只会让输出变少。
    #[tracing::instrument(skip(self, frame), fields(pipeline = %self.cfg.name, uid = frame.uid, len = frame.len()))]
    pub fn process(
        &mut self,
        frame: &Frame,
        ingress_port: u32,
        now: SimTime,
    ) -> Result<Vec<(u32, Frame)>, PipelineError> {
        let id = self.ctx.alloc_packet_id();
        let mut pkt = self
            .converter
            .to_pipeline(frame, ingress_port, id, self.runtime.layout())?;
        let orig_len = pkt.len();

        self.process_ingress(&mut pkt, ingress_port, now);
        let queued = self.traffic_manager(pkt);

        let mut out = Vec::with_capacity(queued.len());
        for (port, mut pkt) in queued {
            self.process_egress(&mut pkt, port, orig_len, now);
            if pkt.get(self.meta.egress_spec) == self.cfg.drop_port as u128 {
                debug!(pkt_id = id, copy_id = pkt.copy_id(), port, "🗑️ egress 丢弃");
                continue;
            }
            self.runtime.deparse(&mut pkt);
            out.push((port, self.converter.to_frame(pkt, frame)));
        }
        trace!(pkt_id = id, outputs = out.len(), "处理完成");
        Ok(out)
    }

    fn process_ingress(&mut self, pkt: &mut PipelinePacket, ingress_port: u32, now: SimTime) {
        let m = self.meta;
        pkt.reset_metadata();
        pkt.set(m.packet_length, pkt.len() as u128);
        pkt.set(m.instance_type, InstanceType::Normal.code());
        if let Some(ts) = m.ingress_global_timestamp {
            pkt.set(ts, now.as_nanos() as u128);
        }
        pkt.set(m.ingress_port, ingress_port as u128);

        self.runtime.parse(pkt);
        if let Some(id) = m.parser_error {
            pkt.set(id, pkt.parser_error().code() as u128);
        }
        if let Some(id) = m.checksum_error {
            pkt.set(id, pkt.checksum_error() as u128);
        }

        self.runtime.apply_ingress(pkt);
        pkt.reset_exit();
    }

    /// 单播 / 组播 / 丢弃 决策，每个入帧只做一次
    fn traffic_manager(&self, mut pkt: PipelinePacket) -> Vec<(u32, PipelinePacket)> {
        let m = self.meta;
        let mgid = m.mcast_grp.map_or(0, |id| pkt.get(id));
        if mgid != 0 {
            pkt.set(m.instance_type, InstanceType::Replication.code());
            return self.process_multicast(&pkt, mgid as u32);
        }

        let egress_spec = pkt.get(m.egress_spec);
        if egress_spec == self.cfg.drop_port as u128 {
            debug!(pkt_id = pkt.id(), "🗑️ ingress 丢弃");
            return Vec::new();
        }
        pkt.set(m.instance_type, InstanceType::Normal.code());
        vec![(egress_spec as u32, pkt)]
    }

    fn process_multicast(&self, pkt: &PipelinePacket, mgid: u32) -> Vec<(u32, PipelinePacket)> {
        let replicas = self.runtime.replicate(mgid);
        debug!(pkt_id = pkt.id(), mgid, replicas = replicas.len(), "📡 组播复制");
        replicas
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let mut copy = pkt.replicate(i as u32 + 1);
                if let Some(rid) = self.meta.egress_rid {
                    copy.set(rid, r.rid as u128);
                }
                trace!(copy_id = copy.copy_id(), port = r.egress_port, rid = r.rid, "副本");
                (r.egress_port, copy)
            })
            .collect()
    }

    fn process_egress(
        &mut self,
        pkt: &mut PipelinePacket,
        port: u32,
        orig_len: usize,
        now: SimTime,
    ) {
        let m = self.meta;
        if let Some(ts) = m.egress_global_timestamp {
            pkt.set(ts, now.as_nanos() as u128);
        }
        pkt.set(m.egress_port, port as u128);
        pkt.set(m.egress_spec, self.cfg.drop_port as u128 + 1);
        pkt.set(m.packet_length, orig_len as u128);
        self.runtime.apply_egress(pkt);
    }
}
