// crates/hn_physics/src/reservoir/policy.rs

//! 下泄规则（Hanasaki 2006）
//!
//! # 月目标
//!
//! 记 i 为年均日入流，d 为年均日需水，d_m 为该月日均需水，M 为灌溉下泄比例：
//!
//! | 用途 | 条件 | 日目标 |
//! |------|------|--------|
//! | 灌溉 | d ≥ (1-M)·i | i·(M + (1-M)·d_m/d) |
//! | 灌溉 | 其他 | i + d_m - d |
//! | 防洪 / 其他 | - | i |
//!
//! 月目标为日目标乘以当月天数。
//!
//! # 日下泄
//!
//! 库容入流比 c 不低于阈值时按 `k_rls · 月目标 / 天数` 下泄；
//! 否则在目标与天然入流之间按 `(c / 阈值)²` 插值。

use hn_config::ReservoirConfig;
use hn_foundation::{ndaymonth, NMONTH};

use super::history::ReservoirStatistics;
use super::purpose::Purpose;

/// 某月的目标下泄量 [dm³/month]
pub fn monthly_target(purpose: Purpose, stats: &ReservoirStatistics, month: usize, config: &ReservoirConfig) -> f64 {
    let days = ndaymonth(month) as f64;
    let i = stats.mean_inflow;
    let daily = match purpose {
        Purpose::Irrigation if stats.mean_demand > 0.0 => {
            let m = config.irrigation_release_ratio;
            let d = stats.mean_demand;
            let d_month = stats.mean_demand_month[month] / days;
            if d >= (1.0 - m) * i {
                i * (m + (1.0 - m) * d_month / d)
            } else {
                i + d_month - d
            }
        }
        Purpose::Irrigation | Purpose::FloodControl | Purpose::Other => i,
    };
    daily.max(0.0) * days
}

/// 全年十二个月的目标
pub fn yearly_targets(purpose: Purpose, stats: &ReservoirStatistics, config: &ReservoirConfig) -> [f64; NMONTH] {
    let mut targets = [0.0; NMONTH];
    for (month, target) in targets.iter_mut().enumerate() {
        *target = monthly_target(purpose, stats, month, config);
    }
    targets
}

/// 当日的计划下泄量 [dm³/day]，未按蓄水截断
pub fn daily_release(
    stats: &ReservoirStatistics,
    k_rls: f64,
    target_release_month: &[f64; NMONTH],
    month: usize,
    config: &ReservoirConfig,
) -> f64 {
    let days = ndaymonth(month) as f64;
    let target = k_rls * target_release_month[month] / days;
    let threshold = config.release_ratio_threshold;
    let release = if stats.capacity_ratio >= threshold {
        target
    } else {
        let ratio = (stats.capacity_ratio / threshold).powi(2);
        ratio * target + (1.0 - ratio) * stats.mean_inflow_month[month] / days
    };
    release.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn stats(mean_inflow: f64, mean_demand: f64, demand_month: f64) -> ReservoirStatistics {
        let mut s = ReservoirStatistics {
            mean_inflow,
            mean_demand,
            capacity_ratio: 1.0,
            ..Default::default()
        };
        for month in 0..NMONTH {
            s.mean_demand_month[month] = demand_month * ndaymonth(month) as f64;
            s.mean_inflow_month[month] = mean_inflow * ndaymonth(month) as f64;
        }
        s
    }

    #[test]
    fn test_non_irrigation_targets_mean_inflow() {
        let config = ReservoirConfig::default();
        let s = stats(100.0, 80.0, 50.0);
        assert_relative_eq!(monthly_target(Purpose::Other, &s, 0, &config), 3100.0);
        assert_relative_eq!(monthly_target(Purpose::FloodControl, &s, 1, &config), 2800.0);
    }

    #[test]
    fn test_irrigation_high_demand() {
        let config = ReservoirConfig::default();
        // d = 80 ≥ 0.5 · 100
        let s = stats(100.0, 80.0, 40.0);
        let expected = 100.0 * (0.5 + 0.5 * 40.0 / 80.0) * 30.0;
        assert_relative_eq!(monthly_target(Purpose::Irrigation, &s, 3, &config), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_irrigation_low_demand() {
        let config = ReservoirConfig::default();
        let s = stats(100.0, 20.0, 35.0);
        assert_relative_eq!(
            monthly_target(Purpose::Irrigation, &s, 0, &config),
            (100.0 + 35.0 - 20.0) * 31.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_irrigation_without_demand_history() {
        let config = ReservoirConfig::default();
        let s = stats(100.0, 0.0, 0.0);
        assert_relative_eq!(monthly_target(Purpose::Irrigation, &s, 0, &config), 3100.0);
    }

    #[test]
    fn test_release_above_threshold_follows_target() {
        let config = ReservoirConfig::default();
        let s = stats(100.0, 0.0, 0.0);
        let targets = [3000.0; NMONTH];
        assert_relative_eq!(daily_release(&s, 0.8, &targets, 3, &config), 80.0, epsilon = 1e-12);
    }

    #[test]
    fn test_release_below_threshold_blends() {
        let config = ReservoirConfig::default();
        let mut s = stats(100.0, 0.0, 0.0);
        s.capacity_ratio = 0.25;
        let targets = [0.0; NMONTH];
        // ratio = 0.25，剩余 0.75 按天然入流
        assert_relative_eq!(daily_release(&s, 1.0, &targets, 0, &config), 75.0, epsilon = 1e-12);
    }
}
