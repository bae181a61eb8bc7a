// crates/hn_physics/src/reservoir/history.rs

//! 水库月历史与年统计
//!
//! 入流、需水、库容三张 `[年][月]` 表，第 0 行是当年。
//! 每年一月记录前整体后移一行，最旧的一年被丢弃。
//! 入流为负表示该月尚无数据。

use hn_foundation::{ndaymonth, HIST_YEARS, NMONTH};
use hn_io::History;

/// 无数据标记
pub const NO_DATA: f64 = -1.0;

/// 月历史
#[derive(Debug, Clone, PartialEq)]
pub struct ReservoirHistory {
    /// 月入流 [dm³]
    pub inflow: History,
    /// 月灌溉需水 [dm³]
    pub demand: History,
    /// 月末蓄水 [dm³]
    pub level: History,
    saturation_reported: bool,
}

impl Default for ReservoirHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ReservoirHistory {
    /// 空历史
    pub fn new() -> Self {
        Self {
            inflow: [[NO_DATA; NMONTH]; HIST_YEARS],
            demand: [[0.0; NMONTH]; HIST_YEARS],
            level: [[0.0; NMONTH]; HIST_YEARS],
            saturation_reported: false,
        }
    }

    /// 由重启数据恢复
    pub fn from_tables(inflow: History, demand: History, level: History) -> Self {
        Self {
            inflow,
            demand,
            level,
            saturation_reported: false,
        }
    }

    /// 后移一年，空出第 0 行
    pub fn roll_year(&mut self, cell: usize) {
        if !self.saturation_reported && self.inflow[HIST_YEARS - 1].iter().any(|&v| v >= 0.0) {
            tracing::debug!(cell, years = HIST_YEARS, "水库历史已满，开始丢弃最旧的一年");
            self.saturation_reported = true;
        }
        self.inflow.rotate_right(1);
        self.demand.rotate_right(1);
        self.level.rotate_right(1);
        self.inflow[0] = [NO_DATA; NMONTH];
        self.demand[0] = [0.0; NMONTH];
        self.level[0] = [0.0; NMONTH];
    }

    /// 写入当年某月
    pub fn record(&mut self, month: usize, inflow: f64, demand: f64, level: f64) {
        self.inflow[0][month] = inflow;
        self.demand[0][month] = demand;
        self.level[0][month] = level;
    }

    /// 某月有数据的年数
    pub fn valid_years(&self, month: usize) -> usize {
        self.inflow.iter().filter(|row| row[month] >= 0.0).count()
    }
}

/// 由历史推出的年统计
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReservoirStatistics {
    /// 多年平均日入流 [dm³/day]
    pub mean_inflow: f64,
    /// 多年平均日需水 [dm³/day]
    pub mean_demand: f64,
    /// 多年平均月末蓄水 [dm³]
    pub mean_volume: f64,
    /// 库容与年入流之比 c
    pub capacity_ratio: f64,
    /// 调度年起始月（0 起）
    pub operational_start_month: usize,
    /// 各月平均入流 [dm³/month]
    pub mean_inflow_month: [f64; NMONTH],
    /// 各月平均需水 [dm³/month]
    pub mean_demand_month: [f64; NMONTH],
    /// 各月平均月末蓄水 [dm³]
    pub mean_level_month: [f64; NMONTH],
}

impl ReservoirStatistics {
    /// 由历史计算，没有任何有效月份时返回 `None`
    ///
    /// 每个月只统计入流非负的年份，需水与蓄水使用同样的年份。
    pub fn from_history(history: &ReservoirHistory, capacity: f64) -> Option<Self> {
        let mut stats = Self::default();
        let mut valid_days = 0usize;
        let mut valid_months = 0usize;
        let mut inflow_total = 0.0;
        let mut demand_total = 0.0;
        let mut level_total = 0.0;

        for month in 0..NMONTH {
            let mut count = 0usize;
            let (mut inflow, mut demand, mut level) = (0.0, 0.0, 0.0);
            for year in 0..HIST_YEARS {
                if history.inflow[year][month] >= 0.0 {
                    count += 1;
                    inflow += history.inflow[year][month];
                    demand += history.demand[year][month];
                    level += history.level[year][month];
                }
            }
            if count == 0 {
                continue;
            }
            let n = count as f64;
            stats.mean_inflow_month[month] = inflow / n;
            stats.mean_demand_month[month] = demand / n;
            stats.mean_level_month[month] = level / n;
            inflow_total += inflow / n;
            demand_total += demand / n;
            level_total += level / n;
            valid_days += ndaymonth(month);
            valid_months += 1;
        }
        if valid_months == 0 {
            return None;
        }

        stats.mean_inflow = inflow_total / valid_days as f64;
        stats.mean_demand = demand_total / valid_days as f64;
        stats.mean_volume = level_total / valid_months as f64;
        stats.capacity_ratio = if stats.mean_inflow > 0.0 {
            capacity / (stats.mean_inflow * hn_foundation::NDAYYEAR as f64)
        } else {
            f64::INFINITY
        };
        stats.operational_start_month =
            operational_start_month(&stats.mean_inflow_month, stats.mean_inflow);
        Some(stats)
    }
}

/// 最长的连续丰水期，返回 `(长度, 其后第一个枯水月)`
///
/// 月份首尾相接，扫描两遍以覆盖跨年的丰水期。长度相同时保留先找到的。
/// 全年丰水或全年枯水时起始月为 0。
pub fn longest_wet_run(wet: &[bool; NMONTH]) -> (usize, usize) {
    let mut longest = 0;
    let mut start = 0;
    let mut run = 0;
    for _ in 0..2 {
        for (month, &is_wet) in wet.iter().enumerate() {
            if is_wet {
                run += 1;
            } else {
                if run > longest {
                    longest = run;
                    start = month;
                }
                run = 0;
            }
        }
    }
    if longest == 0 && run > 0 {
        longest = NMONTH;
    }
    (longest, start)
}

/// 调度年起始月：最长丰水期结束后的第一个枯水月
///
/// 月均日入流不低于年均日入流的月份为丰水月。
pub fn operational_start_month(mean_inflow_month: &[f64; NMONTH], mean_inflow: f64) -> usize {
    let mut wet = [false; NMONTH];
    for (month, flag) in wet.iter_mut().enumerate() {
        *flag = mean_inflow_month[month] / ndaymonth(month) as f64 >= mean_inflow;
    }
    longest_wet_run(&wet).1
}
