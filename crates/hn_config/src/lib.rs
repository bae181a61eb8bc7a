// crates/hn_config/src/lib.rs

//! HydroNet 配置层
//!
//! 提供 [`HydroConfig`]：汇流参数 [`RoutingConfig`] 与水库参数 [`ReservoirConfig`]。
//! 配置从 JSON 加载，未给出的字段取默认值，加载后立即验证。
//!
//! # 使用示例
//!
//! ```
//! use hn_config::HydroConfig;
//!
//! let config = HydroConfig::default();
//! config.validate().unwrap();
//! assert_eq!(config.reservoir.alpha, 0.85);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod hydro_config;

/// 层级标识
pub const LAYER: u8 = 3;

pub use error::ConfigError;
pub use hydro_config::{HydroConfig, ReservoirConfig, RoutingConfig};
