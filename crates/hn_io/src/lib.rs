// crates/hn_io/src/lib.rs

//! HydroNet IO 层
//!
//! # 模块概览
//!
//! - [`clm`]: CLM 二进制文件头，带字节序检测
//! - [`reservoir_input`]: 水库静态参数
//! - [`drainage_input`]: 河网（下游单元与河段长度）
//! - [`checkpoint`]: 水库重启文件
//! - [`error`]: IO 错误类型

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod clm;
pub mod drainage_input;
pub mod error;
pub mod reservoir_input;

/// 层级标识
pub const LAYER: u8 = 3;

pub use checkpoint::{History, ReservoirRestart, RestartFile};
pub use clm::{ByteOrder, ClmHeader};
pub use drainage_input::{read_drainage, write_drainage, RoutingRecord};
pub use error::{CheckpointError, CheckpointResult, IoError, IoResult};
pub use reservoir_input::{read_reservoirs, write_reservoirs, ReservoirRecord, CAPACITY_SCALE};
