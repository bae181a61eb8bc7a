// crates/hn_foundation/src/kahan.rs

//! Kahan 补偿求和
//!
//! 水量平衡检查需要把大量量级相近的通量累加起来，普通累加的舍入误差
//! 会直接体现在残差里。

/// Kahan 求和器
///
/// # 示例
///
/// ```
/// use hn_foundation::KahanSum;
///
/// let total = KahanSum::sum_iter(std::iter::repeat(0.1).take(1000));
/// assert!((total - 100.0).abs() < 1e-10);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct KahanSum {
    sum: f64,
    compensation: f64,
}

impl KahanSum {
    /// 创建新的求和器
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一个值
    #[inline]
    pub fn add(&mut self, value: f64) {
        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
    }

    /// 当前求和值
    #[inline]
    pub fn value(&self) -> f64 {
        self.sum
    }

    /// 重置
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// 从迭代器求和
    pub fn sum_iter<I: IntoIterator<Item = f64>>(iter: I) -> f64 {
        let mut kahan = Self::new();
        for v in iter {
            kahan.add(v);
        }
        kahan.value()
    }
}

impl Extend<f64> for KahanSum {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for v in iter {
            self.add(v);
        }
    }
}
