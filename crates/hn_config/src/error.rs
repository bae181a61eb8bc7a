// crates/hn_config/src/error.rs

//! 配置层错误类型

use hn_foundation::HnError;

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(String),

    /// 无效值
    #[error("无效值 '{key}': {value} - {reason}")]
    InvalidValue {
        /// 配置键
        key: String,
        /// 配置值
        value: String,
        /// 原因
        reason: String,
    },
}

impl ConfigError {
    /// 构造无效值错误
    pub fn invalid(key: &str, value: impl ToString, reason: &str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<ConfigError> for HnError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(e) => HnError::from(e),
            ConfigError::Parse(message) => HnError::serialization(message),
            ConfigError::InvalidValue { key, value, reason } => {
                HnError::invalid_config(key, value, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("routing.segment_length", -1.0, "必须为正");
        assert!(err.to_string().contains("segment_length"));
    }

    #[test]
    fn test_into_hn_error() {
        let err: HnError = ConfigError::invalid("reservoir.alpha", 2.0, "必须在 (0, 1] 内").into();
        assert!(matches!(err, HnError::InvalidConfig { .. }));
    }
}
