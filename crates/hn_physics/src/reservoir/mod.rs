// crates/hn_physics/src/reservoir/mod.rs

//! 水库调度
//!
//! # 模块概览
//!
//! - [`purpose`]: 大坝静态参数与调度用途
//! - [`history`]: 月历史、年统计与调度年起始月
//! - [`policy`]: 月目标与日下泄规则
//! - [`state`]: 单座大坝的运行状态
//! - [`network`]: 服务单元搜索、年度分配与每日供水

pub mod history;
pub mod network;
pub mod policy;
pub mod purpose;
pub mod state;

pub use history::{longest_wet_run, operational_start_month, ReservoirHistory, ReservoirStatistics};
pub use network::{served_cells, ReservoirNetwork};
pub use purpose::{Purpose, Reservoir};
pub use state::{ReservoirState, SurfaceBalance};
