// crates/hn_foundation/src/lib.rs

//! HydroNet Foundation Layer
//!
//! 基础层，提供整个项目共用的错误类型、分区视图和数值工具。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型与 `ensure!` / `require!` 宏
//! - [`partition`]: 全局编号与分区本地编号的映射
//! - [`kahan`]: 补偿求和
//! - [`calendar`]: 365 天日历与结构常量
//!
//! # 设计原则
//!
//! 1. **最小依赖**: 仅依赖 serde 和 thiserror
//! 2. **显式映射**: 不通过指针偏移访问其他分区的数据

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod calendar;
pub mod error;
pub mod kahan;
pub mod partition;

/// 层级标识
pub const LAYER: u8 = 1;

pub use calendar::{ndaymonth, SimDate, HIST_YEARS, NDAYMONTH, NDAYYEAR, NIRRIGDAYS, NMONTH, NPURPOSE};
pub use error::{HnError, HnResult};
pub use kahan::KahanSum;
pub use partition::PartitionView;

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::calendar::{ndaymonth, SimDate, NMONTH};
    pub use crate::error::{HnError, HnResult};
    pub use crate::kahan::KahanSum;
    pub use crate::partition::PartitionView;
    pub use crate::{ensure, require};
}
