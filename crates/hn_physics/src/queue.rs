// crates/hn_physics/src/queue.rs

//! 延迟队列
//!
//! 环形缓冲区，槽数等于所属单元传递函数的系数个数。
//! 队头是下一个子步要流出的质量。
//!
//! 注入时第 k 个系数的份额加到距队头 k 的槽上，所以偏移 0 的份额
//! 在下一次排空时流出：同一子步内注入的水不会当步离开。

use hn_foundation::KahanSum;

use crate::transfer::TransferFunction;

/// 河道延迟队列
#[derive(Debug, Clone)]
pub struct DelayQueue {
    slots: Vec<f64>,
    head: usize,
}

impl DelayQueue {
    /// 创建与传递函数等长的空队列
    pub fn new(transfer: &TransferFunction) -> Self {
        Self {
            slots: vec![0.0; transfer.len().max(1)],
            head: 0,
        }
    }

    /// 槽数
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// 槽数为零（不会发生，队列至少一个槽）
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 按传递函数分配注入的质量
    pub fn inject(&mut self, mass: f64, transfer: &TransferFunction) {
        debug_assert_eq!(transfer.len(), self.slots.len());
        let n = self.slots.len();
        for (k, &c) in transfer.coefficients().iter().enumerate() {
            self.slots[(self.head + k) % n] += mass * c;
        }
    }

    /// 取出队头质量并前移一槽
    pub fn release(&mut self) -> f64 {
        let out = std::mem::take(&mut self.slots[self.head]);
        self.head = (self.head + 1) % self.slots.len();
        out
    }

    /// 队列中尚未流出的总质量
    pub fn pending(&self) -> f64 {
        KahanSum::sum_iter(self.slots.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hn_config::RoutingConfig;

    #[test]
    fn test_injected_mass_fully_released() {
        let tf = TransferFunction::generate(80_000, &RoutingConfig::default()).unwrap();
        let mut queue = DelayQueue::new(&tf);
        queue.inject(1_000.0, &tf);
        assert_relative_eq!(queue.pending(), 1_000.0, epsilon = 1e-9);

        let mut released = 0.0;
        for _ in 0..queue.len() {
            released += queue.release();
        }
        assert_relative_eq!(released, 1_000.0, epsilon = 1e-9);
        assert_eq!(queue.pending(), 0.0);
    }

    #[test]
    fn test_release_follows_coefficients() {
        let tf = TransferFunction::generate(30_000, &RoutingConfig::default()).unwrap();
        let mut queue = DelayQueue::new(&tf);
        // 先前移两槽，检验环形下标
        queue.release();
        queue.release();
        queue.inject(2.0, &tf);
        for &c in tf.coefficients() {
            assert_relative_eq!(queue.release(), 2.0 * c, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_overlapping_injections_accumulate() {
        let tf = TransferFunction::generate(10_000, &RoutingConfig::default()).unwrap();
        let mut queue = DelayQueue::new(&tf);
        queue.inject(1.0, &tf);
        let first = queue.release();
        queue.inject(1.0, &tf);
        let second = queue.release();
        assert_relative_eq!(first, tf.coefficients()[0], epsilon = 1e-15);
        if tf.len() > 1 {
            assert_relative_eq!(
                second,
                tf.coefficients()[0] + tf.coefficients()[1],
                epsilon = 1e-15
            );
        }
    }
}
