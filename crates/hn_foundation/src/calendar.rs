// crates/hn_foundation/src/calendar.rs

//! 日历与结构常量
//!
//! 模型采用无闰年的 365 天日历。水库历史与重启文件的数组尺寸在这里
//! 固定为编译期常量，因为它们决定了重启记录的二进制布局。

use serde::{Deserialize, Serialize};

/// 每年月数
pub const NMONTH: usize = 12;

/// 每年天数
pub const NDAYYEAR: usize = 365;

/// 水库滚动历史保留的年数
pub const HIST_YEARS: usize = 20;

/// 灌溉缓冲的天数，超过后未用的水回到河道
pub const NIRRIGDAYS: usize = 5;

/// 水库用途字段个数
pub const NPURPOSE: usize = 5;

/// 各月天数
pub const NDAYMONTH: [usize; NMONTH] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// 某月的天数（`month` 从 0 开始）
#[inline]
pub fn ndaymonth(month: usize) -> usize {
    NDAYMONTH[month % NMONTH]
}

/// 模拟日期：年份与一年中的第几天（从 0 开始）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SimDate {
    /// 年份
    pub year: i32,
    /// 年内日序 `0..365`
    pub day: usize,
}

impl SimDate {
    /// 创建日期，日序超出范围时折回本年
    pub fn new(year: i32, day: usize) -> Self {
        Self {
            year,
            day: day % NDAYYEAR,
        }
    }

    /// 所在月份（从 0 开始）
    pub fn month(&self) -> usize {
        let mut remaining = self.day;
        for (month, &len) in NDAYMONTH.iter().enumerate() {
            if remaining < len {
                return month;
            }
            remaining -= len;
        }
        NMONTH - 1
    }

    /// 所在月的第几天（从 0 开始）
    pub fn day_of_month(&self) -> usize {
        let first: usize = NDAYMONTH[..self.month()].iter().sum();
        self.day - first
    }

    /// 是否为一年的第一天
    pub fn is_first_day_of_year(&self) -> bool {
        self.day == 0
    }

    /// 是否为当月最后一天
    pub fn is_last_day_of_month(&self) -> bool {
        self.day_of_month() + 1 == ndaymonth(self.month())
    }

    /// 是否为一年的最后一天
    pub fn is_last_day_of_year(&self) -> bool {
        self.day + 1 == NDAYYEAR
    }

    /// 下一天
    pub fn next(&self) -> Self {
        if self.is_last_day_of_year() {
            Self::new(self.year + 1, 0)
        } else {
            Self::new(self.year, self.day + 1)
        }
    }
}
