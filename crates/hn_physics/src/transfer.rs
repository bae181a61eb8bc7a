// crates/hn_physics/src/transfer.rs

//! 河段传递函数
//!
//! 单元间的河道被视为 n 个等长线性水库的串联（Nash 级联），
//! 进入河段的单位脉冲在出口处的响应是一个 Gamma 分布：
//!
//! ```text
//! h(t) = t^(n-1) · exp(-t/τ) / (Γ(n) · τ^n)
//! ```
//!
//! 其中 n = 河段长度 / 分段长度（不足 1 取 1），τ = 分段长度 / 流速。
//! 把 h(t) 在每个子步时间格 [kΔ, (k+1)Δ] 上积分，即得到第 k 个系数。
//!
//! # 截断规则
//!
//! 依次计算系数，满足任一条件即停止：
//!
//! 1. 累计质量超过 `transfer_cutoff`
//! 2. 当前系数小于 `transfer_epsilon` 且累计质量已超过 `transfer_floor`
//! 3. 系数个数达到 `max_transfer_coefficients`（记录警告）
//!
//! 截断后整体归一化，保证注入的质量最终全部离开延迟队列。

use std::collections::HashMap;
use std::sync::Arc;

use hn_config::RoutingConfig;
use rayon::prelude::*;

use crate::error::TransferError;

// ============================================================
// Gamma 函数
// ============================================================

const LANCZOS_G: f64 = 7.0;

const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.999_999_999_999_809_93,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_13,
    -176.615_029_162_140_59,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_571_6e-6,
    1.505_632_735_149_311_6e-7,
];

/// ln Γ(x)，x > 0（Lanczos 近似）
pub fn ln_gamma(x: f64) -> f64 {
    let x = x - 1.0;
    let mut series = LANCZOS_COEFFICIENTS[0];
    for (i, &c) in LANCZOS_COEFFICIENTS.iter().enumerate().skip(1) {
        series += c / (x + i as f64);
    }
    let t = x + LANCZOS_G + 0.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

/// Gamma 分布密度，形状 n、尺度 τ
#[inline]
fn gamma_density(t: f64, shape: f64, tau: f64, ln_norm: f64) -> f64 {
    if t <= 0.0 {
        return 0.0;
    }
    ((shape - 1.0) * t.ln() - t / tau - ln_norm).exp()
}

// ============================================================
// 传递函数
// ============================================================

/// 某一河段长度的离散传递函数
///
/// 系数非负、总和为 1，第 k 个系数表示注入质量在第 k 个子步后离开的份额。
#[derive(Debug, Clone, PartialEq)]
pub struct TransferFunction {
    coefficients: Vec<f64>,
}

impl TransferFunction {
    /// 由河段长度 [m] 生成
    pub fn generate(reach_length: i32, config: &RoutingConfig) -> Result<Self, TransferError> {
        if reach_length < 0 {
            return Err(TransferError::InvalidLength {
                length: reach_length,
            });
        }
        let shape = Self::shape(reach_length, config);
        let tau = config.tau();
        let tstep = config.tstep();
        let ln_norm = ln_gamma(shape) + shape * tau.ln();
        let points = config.integration_steps.max(1);
        let h = tstep / points as f64;

        let mut coefficients = Vec::new();
        let mut total = 0.0;
        loop {
            let k = coefficients.len();
            let start = k as f64 * tstep;
            let bin: f64 = (0..points)
                .map(|j| gamma_density(start + (j as f64 + 0.5) * h, shape, tau, ln_norm) * h)
                .sum();
            if !bin.is_finite() || !(0.0..=1.0).contains(&bin) {
                return Err(TransferError::CoefficientOutOfRange {
                    length: reach_length,
                    index: k,
                    value: bin,
                });
            }
            coefficients.push(bin);
            total += bin;

            if total > config.transfer_cutoff {
                break;
            }
            if bin < config.transfer_epsilon && total > config.transfer_floor {
                break;
            }
            if coefficients.len() >= config.max_transfer_coefficients {
                tracing::warn!(
                    reach_length,
                    total,
                    n = coefficients.len(),
                    "传递函数达到最大长度仍未收敛，按当前结果归一化"
                );
                break;
            }
        }

        if total <= 0.0 {
            return Err(TransferError::Degenerate {
                length: reach_length,
            });
        }
        for c in &mut coefficients {
            *c /= total;
        }
        Ok(Self { coefficients })
    }

    /// 级联水库数 n
    pub fn shape(reach_length: i32, config: &RoutingConfig) -> f64 {
        (f64::from(reach_length) / config.segment_length).max(1.0)
    }

    /// 系数
    #[inline]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// 系数个数
    #[inline]
    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    /// 是否为空（正常生成的传递函数不会为空）
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }
}

// ============================================================
// 缓存
// ============================================================

/// 按河段长度共享的传递函数
///
/// 相同长度的河段使用同一个 `Arc`，生成过程按长度并行。
#[derive(Debug, Default)]
pub struct TransferCache {
    by_length: HashMap<i32, Arc<TransferFunction>>,
}

impl TransferCache {
    /// 为给定的河段长度集合生成传递函数
    pub fn build<I>(lengths: I, config: &RoutingConfig) -> Result<Self, TransferError>
    where
        I: IntoIterator<Item = i32>,
    {
        let mut distinct: Vec<i32> = lengths.into_iter().collect();
        distinct.sort_unstable();
        distinct.dedup();

        let generated: Result<Vec<_>, TransferError> = distinct
            .par_iter()
            .map(|&len| TransferFunction::generate(len, config).map(|tf| (len, Arc::new(tf))))
            .collect();
        let by_length: HashMap<_, _> = generated?.into_iter().collect();
        tracing::debug!(lengths = by_length.len(), "传递函数生成完成");
        Ok(Self { by_length })
    }

    /// 查询某长度的传递函数
    pub fn get(&self, reach_length: i32) -> Option<Arc<TransferFunction>> {
        self.by_length.get(&reach_length).cloned()
    }

    /// 不同长度的个数
    pub fn len(&self) -> usize {
        self.by_length.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.by_length.is_empty()
    }
}
