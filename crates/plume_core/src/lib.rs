//! Plume Core
//!
//! Particle data-set storage:
//! - Variable types and layout building
//! - Structure-of-arrays data buffers
//! - Multi-buffered data sets with persistent particle IDs
//! - Execution lanes and deferred render commands
//! - Typed accessors and diagnostic dumps

pub mod accessor;
pub mod buffer;
pub mod config;
pub mod data_set;
pub mod dump;
pub mod lane;
pub mod layout;
pub mod render_queue;
pub mod types;
pub mod variable;

pub use accessor::{Accessor, AccessorError, AccessorMut, Attribute, ScriptBool};
pub use buffer::DataBuffer;
pub use config::{ConfigError, DataSetSettings, NanPolicy};
pub use data_set::{
    CpuDataSet, CpuSim, DataSet, DataSetId, DataSetKind, GpuDataSet, GpuSim, IdTableShrinkPolicy,
    ParticleId, RegisterError, RegisterTable, SimTarget, INDEX_NONE,
};
pub use dump::{BufferDump, BufferRole};
pub use lane::{RenderLane, SimLane};
pub use layout::{build_layout, DataSetLayout, LayoutError, VariableLayout};
pub use render_queue::{render_command_channel, RenderCommand, RenderCommandQueue, RenderCommandSender};
pub use types::{register_type, type_named, TypeDef};
pub use variable::Variable;

pub use glam;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
