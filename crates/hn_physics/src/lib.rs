// crates/hn_physics/src/lib.rs

//! HydroNet Physics Layer
//!
//! 物理层，实现河道汇流与水库调度。
//!
//! # 模块概览
//!
//! - [`transfer`]: Gamma 分布传递函数与按长度共享的缓存
//! - [`queue`]: 河道延迟队列
//! - [`topology`]: 全局河网与单元属性
//! - [`cell`]: 单元水文状态与通量账本
//! - [`routing`]: 子步汇流
//! - [`withdrawal`]: 邻近单元借水
//! - [`reservoir`]: 水库调度与供水网络
//! - [`partition`]: 分区驱动与全局水量平衡
//!
//! # 设计原则
//!
//! 1. **分区无关**: 任意分区方式得到与单分区逐位相同的结果
//! 2. **质量守恒**: 每个单元每天都能给出储量变化与通量之差
//! 3. **集体一致**: 任一分区出错时所有分区在同一步中止

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cell;
pub mod error;
pub mod partition;
pub mod queue;
pub mod reservoir;
pub mod routing;
pub mod topology;
pub mod transfer;
pub mod withdrawal;

/// 层级标识
pub const LAYER: u8 = 4;

pub use cell::{CellHydrology, DailyForcing, FluxAccount};
pub use error::TransferError;
pub use partition::{BalanceReport, HydroPartition};
pub use queue::DelayQueue;
pub use reservoir::{Purpose, Reservoir, ReservoirNetwork, ReservoirState};
pub use routing::{build_river_graph, RiverRouter};
pub use topology::{CellProperties, Downstream, RoutingEntry, Topology};
pub use transfer::{TransferCache, TransferFunction};
pub use withdrawal::WithdrawalNetwork;

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::cell::{CellHydrology, DailyForcing};
    pub use crate::partition::{BalanceReport, HydroPartition};
    pub use crate::topology::{CellProperties, Downstream, RoutingEntry, Topology};
}
