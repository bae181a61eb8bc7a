// crates/hn_physics/src/error.rs

//! 物理层错误类型
//!
//! 传递函数生成失败属于启动期错误：没有系数就无法排空该单元的延迟队列，
//! 运行必须在开始前中止。

use hn_foundation::HnError;
use thiserror::Error;

/// 传递函数生成错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    /// 河段长度无效
    #[error("河段长度无效: {length} m")]
    InvalidLength {
        /// 河段长度 [m]
        length: i32,
    },

    /// 系数超出 [0, 1]
    #[error("河段长度 {length} m 的第 {index} 个系数 {value} 超出 [0, 1]")]
    CoefficientOutOfRange {
        /// 河段长度 [m]
        length: i32,
        /// 系数位置
        index: usize,
        /// 系数值
        value: f64,
    },

    /// 截断后的总质量为零
    #[error("河段长度 {length} m 的传递函数总质量为零")]
    Degenerate {
        /// 河段长度 [m]
        length: i32,
    },
}

impl From<TransferError> for HnError {
    fn from(err: TransferError) -> Self {
        HnError::invalid_input(err.to_string())
    }
}
