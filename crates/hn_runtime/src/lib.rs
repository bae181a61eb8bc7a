// crates/hn_runtime/src/lib.rs

//! HydroNet Runtime Layer (Layer 2)
//!
//! 分区运行时：集体通信与跨分区交换图。
//!
//! # 模块概览
//!
//! - [`comm`]: `Communicator` trait，`SerialComm` 与 `ThreadComm`
//! - [`pnet`]: `PnetBuilder` / `ExchangeGraph` / `Pnet` 交换原语
//!
//! # 层级架构
//!
//! ```text
//! Layer 4: hn_physics    ─> 汇流、水库调度
//! Layer 3: hn_config / hn_io
//! Layer 2: hn_runtime    ─> Communicator, Pnet (本层)
//! Layer 1: hn_foundation ─> HnError, PartitionView
//! ```
//!
//! # 设计原则
//!
//! 1. **集体失败**: 交换前后的错误通过 `all_agree` 广播，所有分区一起中止
//! 2. **确定性**: 入边顺序与分区方式无关，多分区与单分区结果一致

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod comm;
pub mod pnet;

/// 层级标识
pub const LAYER: u8 = 2;

pub use comm::{Communicator, SerialComm, ThreadComm};
pub use pnet::{ExchangeGraph, Pnet, PnetBuilder, Published, Received};
