// crates/hn_config/src/hydro_config.rs

//! HydroConfig - 汇流与水库调度参数
//!
//! 所有物理常数集中在一个不可变的配置对象里，构建各组件时按引用传入，
//! 不存在进程级的全局参数表。

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// 顶层配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HydroConfig {
    /// 汇流参数
    #[serde(default)]
    pub routing: RoutingConfig,

    /// 水库参数
    #[serde(default)]
    pub reservoir: ReservoirConfig,
}

// ============================================================
// 汇流参数
// ============================================================

/// 河道汇流参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// 线性水库串联中单个河段的长度 [m]
    #[serde(default = "default_segment_length")]
    pub segment_length: f64,

    /// 河道流速 [m/day]
    #[serde(default = "default_flow_velocity")]
    pub flow_velocity: f64,

    /// 每日子步数
    #[serde(default = "default_substeps_per_day")]
    pub substeps_per_day: usize,

    /// 传递函数截断的累计质量
    #[serde(default = "default_transfer_cutoff")]
    pub transfer_cutoff: f64,

    /// 允许按小值截断前需要达到的累计质量
    #[serde(default = "default_transfer_floor")]
    pub transfer_floor: f64,

    /// 可忽略的单个系数
    #[serde(default = "default_transfer_epsilon")]
    pub transfer_epsilon: f64,

    /// 传递函数最大长度
    #[serde(default = "default_max_transfer_coefficients")]
    pub max_transfer_coefficients: usize,

    /// 每个时间格内的数值积分点数
    #[serde(default = "default_integration_steps")]
    pub integration_steps: usize,

    /// 湖泊出流系数 kr [1/day]
    #[serde(default = "default_lake_outflow_rate")]
    pub lake_outflow_rate: f64,

    /// 湖泊最大水深 [m]
    #[serde(default = "default_lake_depth")]
    pub lake_depth: f64,
}

fn default_segment_length() -> f64 { 10_000.0 }
fn default_flow_velocity() -> f64 { 86_400.0 }
fn default_substeps_per_day() -> usize { 8 }
fn default_transfer_cutoff() -> f64 { 0.99 }
fn default_transfer_floor() -> f64 { 0.1 }
fn default_transfer_epsilon() -> f64 { 1e-5 }
fn default_max_transfer_coefficients() -> usize { 512 }
fn default_integration_steps() -> usize { 64 }
fn default_lake_outflow_rate() -> f64 { 0.001 }
fn default_lake_depth() -> f64 { 5.0 }

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            segment_length: default_segment_length(),
            flow_velocity: default_flow_velocity(),
            substeps_per_day: default_substeps_per_day(),
            transfer_cutoff: default_transfer_cutoff(),
            transfer_floor: default_transfer_floor(),
            transfer_epsilon: default_transfer_epsilon(),
            max_transfer_coefficients: default_max_transfer_coefficients(),
            integration_steps: default_integration_steps(),
            lake_outflow_rate: default_lake_outflow_rate(),
            lake_depth: default_lake_depth(),
        }
    }
}

impl RoutingConfig {
    /// 单个河段的时间常数 τ [day]
    #[inline]
    pub fn tau(&self) -> f64 {
        self.segment_length / self.flow_velocity
    }

    /// 子步长 [day]
    #[inline]
    pub fn tstep(&self) -> f64 {
        1.0 / self.substeps_per_day as f64
    }
}

// ============================================================
// 水库参数
// ============================================================

/// 水库调度参数（Hanasaki 2006 规则）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservoirConfig {
    /// 目标蓄水系数 α
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// 始终下泄到河道的月均入流比例
    #[serde(default = "default_env_flow")]
    pub env_flow: f64,

    /// 库容入流比阈值，高于它完全按目标下泄
    #[serde(default = "default_release_ratio_threshold")]
    pub release_ratio_threshold: f64,

    /// 灌溉水库的下泄比例 M
    #[serde(default = "default_irrigation_release_ratio")]
    pub irrigation_release_ratio: f64,

    /// 水面蒸发的 Priestley-Taylor 系数
    #[serde(default = "default_priestley_taylor")]
    pub priestley_taylor: f64,

    /// 灌溉缓冲允许的负值舍入误差
    #[serde(default = "default_demand_tolerance")]
    pub demand_tolerance: f64,

    /// 向上游搜索供水单元的层数
    #[serde(default = "default_upstream_levels")]
    pub upstream_levels: usize,

    /// 重启文件库容与输入库容的相对容差
    #[serde(default = "default_capacity_tolerance")]
    pub capacity_tolerance: f64,
}

fn default_alpha() -> f64 { 0.85 }
fn default_env_flow() -> f64 { 0.1 }
fn default_release_ratio_threshold() -> f64 { 0.5 }
fn default_irrigation_release_ratio() -> f64 { 0.5 }
fn default_priestley_taylor() -> f64 { 1.32 }
fn default_demand_tolerance() -> f64 { 1e-4 }
fn default_upstream_levels() -> usize { 4 }
fn default_capacity_tolerance() -> f64 { 1e-6 }

impl Default for ReservoirConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            env_flow: default_env_flow(),
            release_ratio_threshold: default_release_ratio_threshold(),
            irrigation_release_ratio: default_irrigation_release_ratio(),
            priestley_taylor: default_priestley_taylor(),
            demand_tolerance: default_demand_tolerance(),
            upstream_levels: default_upstream_levels(),
            capacity_tolerance: default_capacity_tolerance(),
        }
    }
}

// ============================================================
// 加载与验证
// ============================================================

impl HydroConfig {
    /// 从 JSON 文件加载并验证
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: HydroConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 保存为 JSON 文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.routing;
        positive("routing.segment_length", r.segment_length)?;
        positive("routing.flow_velocity", r.flow_velocity)?;
        positive("routing.lake_depth", r.lake_depth)?;
        if r.substeps_per_day == 0 {
            return Err(ConfigError::invalid("routing.substeps_per_day", 0, "至少为 1"));
        }
        if r.integration_steps == 0 {
            return Err(ConfigError::invalid("routing.integration_steps", 0, "至少为 1"));
        }
        if r.max_transfer_coefficients == 0 {
            return Err(ConfigError::invalid(
                "routing.max_transfer_coefficients",
                0,
                "至少为 1",
            ));
        }
        unit_interval("routing.transfer_cutoff", r.transfer_cutoff)?;
        unit_interval("routing.transfer_floor", r.transfer_floor)?;
        if r.transfer_floor > r.transfer_cutoff {
            return Err(ConfigError::invalid(
                "routing.transfer_floor",
                r.transfer_floor,
                "不能大于 transfer_cutoff",
            ));
        }
        non_negative("routing.transfer_epsilon", r.transfer_epsilon)?;
        non_negative("routing.lake_outflow_rate", r.lake_outflow_rate)?;

        let s = &self.reservoir;
        unit_interval("reservoir.alpha", s.alpha)?;
        positive("reservoir.alpha", s.alpha)?;
        unit_interval("reservoir.env_flow", s.env_flow)?;
        positive("reservoir.release_ratio_threshold", s.release_ratio_threshold)?;
        unit_interval("reservoir.irrigation_release_ratio", s.irrigation_release_ratio)?;
        non_negative("reservoir.priestley_taylor", s.priestley_taylor)?;
        non_negative("reservoir.demand_tolerance", s.demand_tolerance)?;
        non_negative("reservoir.capacity_tolerance", s.capacity_tolerance)?;
        Ok(())
    }
}

fn positive(key: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::invalid(key, value, "必须为正的有限值"))
    }
}

fn non_negative(key: &str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::invalid(key, value, "不能为负"))
    }
}

fn unit_interval(key: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(key, value, "必须在 [0, 1] 范围内"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = HydroConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.routing.substeps_per_day, 8);
        assert!((config.routing.tau() - 10_000.0 / 86_400.0).abs() < 1e-15);
        assert_eq!(config.routing.tstep(), 0.125);
    }

    #[test]
    fn test_invalid_alpha() {
        let mut config = HydroConfig::default();
        config.reservoir.alpha = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("reservoir.alpha"));
    }

    #[test]
    fn test_floor_above_cutoff() {
        let mut config = HydroConfig::default();
        config.routing.transfer_floor = 0.995;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "routing": { "substeps_per_day": 4 } }"#;
        let config: HydroConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.routing.substeps_per_day, 4);
        assert_eq!(config.routing.segment_length, 10_000.0);
        assert_eq!(config.reservoir, ReservoirConfig::default());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hydro.json");
        let mut config = HydroConfig::default();
        config.reservoir.env_flow = 0.2;
        config.save_to_file(&path).unwrap();
        let loaded = HydroConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "routing": { "segment_length": -5.0 } }"#).unwrap();
        assert!(HydroConfig::from_file(&path).is_err());
    }
}
