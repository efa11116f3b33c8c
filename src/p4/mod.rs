//! P4 可编程流水线
//!
//! 把仿真帧送进一个由外部 P4 程序定义行为的流水线，再把结果转换回仿真帧。

mod context;
mod convert;
mod error;
mod field;
mod packet;
mod pipeline;
pub mod runtime;

pub use context::PipelineContext;
pub use convert::{DecodeState, FrameConverter, HeaderRule, Layer, MAX_PACKET_SIZE};
pub use error::{PipelineError, RuntimeError};
pub use field::{FieldDef, FieldId, FieldLayout, HeaderDef, HeaderId, Phv};
pub use packet::{InstanceType, ParserError, PipelinePacket};
pub use pipeline::{DEFAULT_DROP_PORT, Pipeline, PipelineConfig, REQUIRED_FIELDS};
pub use runtime::{Control, NoopControl, ReferenceRuntime, Replica, Runtime, TableStore};
