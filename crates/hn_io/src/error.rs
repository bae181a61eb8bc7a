// crates/hn_io/src/error.rs
//! IO 错误类型定义
//!
//! 输入文件与重启文件各有一个错误枚举，都可以转换为 `HnError`
//! 以便跨层传递。输入文件错误属于启动期错误，运行开始前即中止。

use hn_foundation::HnError;
use thiserror::Error;

/// 输入文件结果类型别名
pub type IoResult<T> = Result<T, IoError>;

/// 输入文件错误
#[derive(Error, Debug)]
pub enum IoError {
    /// 底层 IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 文件头标识不符
    #[error("文件头标识不符: {file}, 期望 {expected}, 实际 {found}")]
    Header {
        /// 文件
        file: String,
        /// 期望的标识
        expected: String,
        /// 读到的标识
        found: String,
    },

    /// 不支持的文件头版本
    #[error("不支持的文件头版本: {file}, 版本 {version}")]
    UnsupportedVersion {
        /// 文件
        file: String,
        /// 版本号
        version: i32,
    },

    /// 波段数不符
    #[error("波段数不符: {file}, 期望 {expected}, 实际 {found}")]
    Bands {
        /// 文件
        file: String,
        /// 期望波段数
        expected: i32,
        /// 实际波段数
        found: i32,
    },

    /// 请求的单元范围不在文件内
    #[error("单元范围无效: {file}: {message}")]
    Range {
        /// 文件
        file: String,
        /// 说明
        message: String,
    },
}

impl From<IoError> for HnError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::Io(e) => HnError::from(e),
            other => HnError::invalid_input(other.to_string()),
        }
    }
}

/// 重启文件结果类型别名
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// 重启文件错误
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// 底层 IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 格式错误
    #[error("格式错误: {0}")]
    Format(String),

    /// 版本不兼容
    #[error("版本不兼容: 文件版本 {file}, 当前版本 {current}")]
    Version {
        /// 文件中的版本
        file: u32,
        /// 当前支持的版本
        current: u32,
    },

    /// 校验和不匹配
    #[error("校验和不匹配: 期望 {expected:08x}, 实际 {found:08x}")]
    Checksum {
        /// 文件记录的校验和
        expected: u32,
        /// 重新计算的校验和
        found: u32,
    },
}

impl From<CheckpointError> for HnError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::Io(e) => HnError::from(e),
            other => HnError::serialization(other.to_string()),
        }
    }
}
