// crates/hn_foundation/src/partition.rs

//! 分区视图
//!
//! 全局单元按连续区间切分给各个计算分区。`PartitionView` 封装一个分区
//! 拥有的区间 `[lo, hi)`，并提供全局编号与分区本地编号之间的互相转换，
//! 替代按偏移量重定位数组指针的做法。
//!
//! # 切分规则
//!
//! `slice = n / ntask`，`rem = n % ntask`，前 `rem` 个分区各多分到一个单元。
//!
//! # 使用示例
//!
//! ```
//! use hn_foundation::PartitionView;
//!
//! let view = PartitionView::new(10, 1, 3).unwrap();
//! assert_eq!(view.range(), 4..7);
//! assert_eq!(view.global_to_local(5).unwrap(), 1);
//! assert_eq!(view.local_to_global(2), 6);
//! assert_eq!(view.owner_of(9).unwrap(), 2);
//! ```

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{HnError, HnResult};

/// 单个分区的全局索引区间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionView {
    rank: usize,
    ntask: usize,
    global_len: usize,
    lo: usize,
    hi: usize,
}

impl PartitionView {
    /// 创建第 `rank` 个分区（共 `ntask` 个）的视图
    pub fn new(global_len: usize, rank: usize, ntask: usize) -> HnResult<Self> {
        if ntask == 0 {
            return Err(HnError::invalid_input("分区数必须大于 0"));
        }
        HnError::check_index("Partition", rank, ntask)?;
        if global_len < ntask {
            return Err(HnError::invalid_input(format!(
                "单元数 {global_len} 少于分区数 {ntask}"
            )));
        }
        let (lo, hi) = Self::bounds(global_len, ntask, rank);
        Ok(Self {
            rank,
            ntask,
            global_len,
            lo,
            hi,
        })
    }

    /// 单分区视图，拥有全部单元
    pub fn single(global_len: usize) -> HnResult<Self> {
        Self::new(global_len, 0, 1)
    }

    /// 一次生成所有分区的视图
    pub fn split(global_len: usize, ntask: usize) -> HnResult<Vec<Self>> {
        (0..ntask)
            .map(|rank| Self::new(global_len, rank, ntask))
            .collect()
    }

    fn bounds(global_len: usize, ntask: usize, rank: usize) -> (usize, usize) {
        let slice = global_len / ntask;
        let rem = global_len % ntask;
        let lo = rank * slice + rank.min(rem);
        let hi = lo + slice + usize::from(rank < rem);
        (lo, hi)
    }

    /// 分区编号
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// 分区总数
    #[inline]
    pub fn ntask(&self) -> usize {
        self.ntask
    }

    /// 全局单元数
    #[inline]
    pub fn global_len(&self) -> usize {
        self.global_len
    }

    /// 本分区第一个全局索引
    #[inline]
    pub fn lo(&self) -> usize {
        self.lo
    }

    /// 本分区最后一个全局索引之后的位置
    #[inline]
    pub fn hi(&self) -> usize {
        self.hi
    }

    /// 本地单元数
    #[inline]
    pub fn len(&self) -> usize {
        self.hi - self.lo
    }

    /// 是否不含任何单元
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hi == self.lo
    }

    /// 全局索引区间
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.lo..self.hi
    }

    /// 全局索引是否属于本分区
    #[inline]
    pub fn contains(&self, global: usize) -> bool {
        (self.lo..self.hi).contains(&global)
    }

    /// 全局索引转本地索引
    pub fn global_to_local(&self, global: usize) -> HnResult<usize> {
        if self.contains(global) {
            Ok(global - self.lo)
        } else {
            Err(HnError::invalid_input(format!(
                "全局索引 {global} 不属于分区 {} [{}, {})",
                self.rank, self.lo, self.hi
            )))
        }
    }

    /// 本地索引转全局索引
    #[inline]
    pub fn local_to_global(&self, local: usize) -> usize {
        debug_assert!(local < self.len());
        self.lo + local
    }

    /// 拥有某个全局索引的分区编号
    pub fn owner_of(&self, global: usize) -> HnResult<usize> {
        HnError::check_index("Cell", global, self.global_len)?;
        let slice = self.global_len / self.ntask;
        let rem = self.global_len % self.ntask;
        let wide = rem * (slice + 1);
        let owner = if global < wide {
            global / (slice + 1)
        } else {
            rem + (global - wide) / slice
        };
        Ok(owner)
    }
}
