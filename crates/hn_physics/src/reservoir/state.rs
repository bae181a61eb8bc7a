// crates/hn_physics/src/reservoir/state.rs

//! 水库运行状态
//!
//! 一座大坝在投入运行年份的第一天激活，此前只占位不参与任何水量计算。
//!
//! # 每日流程
//!
//! 1. 汇流前：按调度规则下泄，灌溉水库把下泄的一部分存入灌溉缓冲
//! 2. 子步内：河道入流先进库，超出库容的部分溢入湖泊
//! 3. 汇流后：库面降水与蒸发，随后按缓冲可用量向服务单元供水
//!
//! # 灌溉缓冲
//!
//! `irrigation_buffer` 是 `NIRRIGDAYS` 天的滑动窗口，第 0 槽最旧。
//! 每天最旧一槽未被取用的水回到河道，新存入的水放在最后一槽。
//! 供水从最旧的槽开始取。

use hn_config::ReservoirConfig;
use hn_foundation::{HnError, HnResult, KahanSum, NIRRIGDAYS, NMONTH};
use hn_io::ReservoirRestart;

use super::history::{ReservoirHistory, ReservoirStatistics};
use super::policy;
use super::purpose::Reservoir;

/// 一天的库面水量平衡
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SurfaceBalance {
    /// 库面降水 [dm³]
    pub precipitation: f64,
    /// 库面蒸发 [dm³]
    pub evaporation: f64,
    /// 降水后溢出到湖泊 [dm³]
    pub overflow: f64,
}

/// 一座大坝的运行状态
#[derive(Debug, Clone)]
pub struct ReservoirState {
    reservoir: Reservoir,
    active: bool,

    /// 库面占单元面积的比例
    pub reservoir_fraction: f64,
    /// 库内碳库
    pub carbon_pool: f64,
    /// 库内氮库
    pub nitrogen_pool: f64,
    /// 蓄水量 [dm³]
    pub stored_mass: f64,
    /// 年下泄系数 k_rls
    pub k_rls: f64,
    /// 调度年目标下泄总量 [dm³]
    pub target_release_year: f64,
    /// 各月目标下泄量 [dm³]
    pub target_release_month: [f64; NMONTH],
    /// 灌溉缓冲 [dm³]
    pub irrigation_buffer: [f64; NIRRIGDAYS],

    /// 月历史
    pub history: ReservoirHistory,
    /// 年统计
    pub stats: ReservoirStatistics,

    /// 每个服务单元的需水份额（与供水图入边顺序一致）
    pub fraction: Vec<f64>,

    /// 当日汇总需水 [dm³]
    pub daily_demand: f64,
    /// 当月累计需水 [dm³]
    pub month_demand: f64,
    /// 当月累计入流 [dm³]
    pub month_inflow: f64,
    /// 当日需水满足比例
    pub demand_fraction: f64,
    /// 当日计划下泄 [dm³]
    pub daily_release: f64,
    /// 当日实际供水 [dm³]
    pub daily_supply: f64,
}

impl ReservoirState {
    /// 未激活的状态
    pub fn new(reservoir: Reservoir) -> Self {
        Self {
            reservoir,
            active: false,
            reservoir_fraction: 0.0,
            carbon_pool: 0.0,
            nitrogen_pool: 0.0,
            stored_mass: 0.0,
            k_rls: 0.0,
            target_release_year: 0.0,
            target_release_month: [0.0; NMONTH],
            irrigation_buffer: [0.0; NIRRIGDAYS],
            history: ReservoirHistory::new(),
            stats: ReservoirStatistics::default(),
            fraction: Vec::new(),
            daily_demand: 0.0,
            month_demand: 0.0,
            month_inflow: 0.0,
            demand_fraction: 0.0,
            daily_release: 0.0,
            daily_supply: 0.0,
        }
    }

    /// 静态参数
    #[inline]
    pub fn reservoir(&self) -> &Reservoir {
        &self.reservoir
    }

    /// 是否已投入运行
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// 投入运行：空库，历史清零
    pub fn activate(&mut self, cell: usize, cell_area: f64) {
        self.active = true;
        self.stored_mass = 0.0;
        self.carbon_pool = 0.0;
        self.nitrogen_pool = 0.0;
        self.k_rls = 0.0;
        self.target_release_year = 0.0;
        self.target_release_month = [0.0; NMONTH];
        self.irrigation_buffer = [0.0; NIRRIGDAYS];
        self.history = ReservoirHistory::new();
        self.stats = ReservoirStatistics::default();
        self.month_demand = 0.0;
        self.month_inflow = 0.0;
        self.reservoir_fraction = (self.reservoir.surface_area * 1e6 / cell_area).min(1.0);
        tracing::info!(
            cell,
            year = self.reservoir.commission_year,
            capacity = self.reservoir.capacity,
            purpose = ?self.reservoir.purpose,
            "水库投入运行"
        );
    }

    /// 库内与缓冲中的全部水量
    pub fn storage(&self) -> f64 {
        self.stored_mass + KahanSum::sum_iter(self.irrigation_buffer.iter().copied())
    }

    /// 向灌溉服务单元提供的可分配水量
    pub fn offered_volume(&self) -> f64 {
        if self.active && self.reservoir.purpose.serves_irrigation() {
            self.stats.mean_volume
        } else {
            0.0
        }
    }

    /// 进库，返回超出库容的部分
    pub fn fill(&mut self, inflow: f64) -> f64 {
        self.stored_mass += inflow;
        let capacity = self.reservoir.capacity;
        if self.stored_mass > capacity {
            let overflow = self.stored_mass - capacity;
            self.stored_mass = capacity;
            overflow
        } else {
            0.0
        }
    }

    /// 汇流前的日下泄，返回流入湖泊的水量
    ///
    /// 出口单元上的大坝没有下游，不做计划下泄。
    /// 灌溉水库在放回河道前先轮转缓冲：最旧一槽归还河道，
    /// 超出环境流量的下泄存入最新一槽。
    pub fn release(&mut self, month: usize, has_downstream: bool, config: &ReservoirConfig) -> f64 {
        let mut to_river = 0.0;
        if has_downstream {
            let planned = policy::daily_release(
                &self.stats,
                self.k_rls,
                &self.target_release_month,
                month,
                config,
            );
            to_river = planned.min(self.stored_mass).max(0.0);
            self.stored_mass -= to_river;
        }
        self.daily_release = to_river;

        if self.reservoir.purpose.serves_irrigation() {
            let returned = self.irrigation_buffer[0];
            self.irrigation_buffer.rotate_left(1);
            let env_flow = config.env_flow * self.stats.mean_inflow_month[month]
                / hn_foundation::ndaymonth(month) as f64;
            let buffered = (to_river - env_flow).max(0.0);
            self.irrigation_buffer[NIRRIGDAYS - 1] = buffered;
            to_river = to_river - buffered + returned;
        }
        to_river
    }

    /// 库面降水与蒸发
    ///
    /// 降水先进库，超出库容的部分溢出；随后蒸发，蒸发量不超过蓄水量。
    pub fn apply_surface_balance(&mut self, precipitation: f64, evaporation_demand: f64) -> SurfaceBalance {
        let precipitation = precipitation.max(0.0);
        let overflow = self.fill(precipitation);
        let evaporation = evaporation_demand.max(0.0).min(self.stored_mass.max(0.0));
        self.stored_mass -= evaporation;
        if self.stored_mass < 0.0 {
            self.stored_mass = 0.0;
        }
        SurfaceBalance {
            precipitation,
            evaporation,
            overflow,
        }
    }

    /// 按缓冲可用量满足当日汇总需水，返回实际供水量
    ///
    /// 缓冲总量在容差内为负时视为零；超出容差说明记账出错，返回不变量错误。
    pub fn supply(&mut self, demand: f64, cell: usize, config: &ReservoirConfig) -> HnResult<f64> {
        self.daily_demand = demand.max(0.0);
        self.month_demand += self.daily_demand;
        self.demand_fraction = 0.0;
        self.daily_supply = 0.0;
        if self.daily_demand <= 0.0 {
            return Ok(0.0);
        }

        let mut available = KahanSum::sum_iter(self.irrigation_buffer.iter().copied());
        if available < 0.0 {
            if available >= -config.demand_tolerance {
                self.irrigation_buffer = [0.0; NIRRIGDAYS];
                available = 0.0;
            } else {
                return Err(HnError::invariant(
                    cell,
                    format!("灌溉缓冲为负: {available}"),
                ));
            }
        }

        let fraction = (available / self.daily_demand).min(1.0);
        let wanted = fraction * self.daily_demand;
        let mut remaining = wanted;
        for slot in &mut self.irrigation_buffer {
            if remaining <= 0.0 {
                break;
            }
            let take = slot.max(0.0).min(remaining);
            *slot -= take;
            remaining -= take;
        }
        if remaining > config.demand_tolerance {
            return Err(HnError::invariant(
                cell,
                format!("灌溉缓冲不足: 仍缺 {remaining}"),
            ));
        }
        self.demand_fraction = fraction;
        self.daily_supply = wanted - remaining;
        Ok(self.daily_supply)
    }

    /// 月末记账；年末先更新统计；进入新调度年时重算目标
    pub fn close_month(&mut self, month: usize, year_end: bool, cell: usize, config: &ReservoirConfig) {
        if month == 0 {
            self.history.roll_year(cell);
        }
        self.history
            .record(month, self.month_inflow, self.month_demand, self.stored_mass);
        self.month_inflow = 0.0;
        self.month_demand = 0.0;

        if year_end {
            self.update_statistics(cell);
        }
        if (month + 1) % NMONTH == self.stats.operational_start_month {
            self.begin_operational_year(config);
        }
    }

    /// 由历史重算年统计，没有有效数据时保留原值
    pub fn update_statistics(&mut self, cell: usize) -> bool {
        match ReservoirStatistics::from_history(&self.history, self.reservoir.capacity) {
            Some(stats) => {
                self.stats = stats;
                tracing::debug!(
                    cell,
                    mean_inflow = stats.mean_inflow,
                    c = stats.capacity_ratio,
                    start_month = stats.operational_start_month,
                    "水库年统计更新"
                );
                true
            }
            None => {
                tracing::warn!(cell, "水库没有任何有效的入流历史，跳过年统计更新");
                false
            }
        }
    }

    /// 调度年开始：更新 k_rls 与各月目标
    pub fn begin_operational_year(&mut self, config: &ReservoirConfig) {
        self.k_rls = self.stored_mass / (config.alpha * self.reservoir.capacity);
        self.target_release_month = policy::yearly_targets(self.reservoir.purpose, &self.stats, config);
        self.target_release_year = KahanSum::sum_iter(self.target_release_month.iter().copied());
    }

    /// 导出重启记录
    pub fn to_restart(&self, cell: usize) -> ReservoirRestart {
        ReservoirRestart {
            cell: cell as u64,
            reservoir_fraction: self.reservoir_fraction,
            carbon_pool: self.carbon_pool,
            nitrogen_pool: self.nitrogen_pool,
            stored_mass: self.stored_mass,
            k_rls: self.k_rls,
            target_release_year: self.target_release_year,
            capacity: self.reservoir.capacity,
            irrigation_buffer: self.irrigation_buffer,
            target_release_month: self.target_release_month,
            demand_hist: self.history.demand,
            inflow_hist: self.history.inflow,
            level_hist: self.history.level,
        }
    }

    /// 由重启记录恢复，库容必须与输入一致
    pub fn restore(&mut self, record: &ReservoirRestart, config: &ReservoirConfig) -> HnResult<()> {
        let cell = record.cell as usize;
        let capacity = self.reservoir.capacity;
        if (record.capacity - capacity).abs() > config.capacity_tolerance * capacity {
            return Err(HnError::invalid_input(format!(
                "单元 {cell} 的重启库容 {} 与输入库容 {capacity} 不一致",
                record.capacity
            )));
        }
        if !(record.stored_mass >= 0.0 && record.stored_mass <= capacity * (1.0 + config.capacity_tolerance)) {
            return Err(HnError::invalid_input(format!(
                "单元 {cell} 的重启蓄水量无效: {}",
                record.stored_mass
            )));
        }
        self.active = true;
        self.reservoir_fraction = record.reservoir_fraction;
        self.carbon_pool = record.carbon_pool;
        self.nitrogen_pool = record.nitrogen_pool;
        self.stored_mass = record.stored_mass.min(capacity);
        self.k_rls = record.k_rls;
        self.target_release_year = record.target_release_year;
        self.target_release_month = record.target_release_month;
        self.irrigation_buffer = record.irrigation_buffer;
        self.history = ReservoirHistory::from_tables(record.inflow_hist, record.demand_hist, record.level_hist);
        self.month_demand = 0.0;
        self.month_inflow = 0.0;
        self.update_statistics(cell);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservoir::purpose::Purpose;
    use approx::assert_relative_eq;
    use hn_foundation::ndaymonth;

    fn dam(purpose: Purpose) -> ReservoirState {
        let purposes = match purpose {
            Purpose::Irrigation => [2, 0, 0, 0, 0],
            Purpose::FloodControl => [3, 0, 0, 0, 0],
            Purpose::Other => [1, 0, 0, 0, 0],
        };
        let mut state = ReservoirState::new(Reservoir {
            commission_year: 1990,
            capacity: 1_000.0,
            surface_area: 1.0,
            installed_capacity: 0,
            dam_height: 10,
            purposes,
            purpose,
        });
        state.activate(0, 4e6);
        state
    }

    #[test]
    fn test_activation_resets_state() {
        let state = dam(Purpose::Other);
        assert!(state.is_active());
        assert_eq!(state.stored_mass, 0.0);
        assert_relative_eq!(state.reservoir_fraction, 0.25);
        assert_eq!(state.offered_volume(), 0.0);
    }

    #[test]
    fn test_fill_caps_at_capacity() {
        let mut state = dam(Purpose::Other);
        assert_eq!(state.fill(600.0), 0.0);
        assert_eq!(state.fill(600.0), 200.0);
        assert_eq!(state.stored_mass, 1_000.0);
    }

    #[test]
    fn test_surface_balance_overflow_then_evaporation() {
        let mut state = dam(Purpose::Other);
        state.stored_mass = 950.0;
        let b = state.apply_surface_balance(100.0, 30.0);
        assert_eq!(b.overflow, 50.0);
        assert_eq!(b.evaporation, 30.0);
        assert_eq!(state.stored_mass, 970.0);
    }

    #[test]
    fn test_evaporation_limited_by_storage() {
        let mut state = dam(Purpose::Other);
        state.stored_mass = 5.0;
        let b = state.apply_surface_balance(0.0, 30.0);
        assert_eq!(b.evaporation, 5.0);
        assert_eq!(state.stored_mass, 0.0);
    }

    #[test]
    fn test_release_clamped_to_storage() {
        let config = ReservoirConfig::default();
        let mut state = dam(Purpose::Other);
        state.stats.capacity_ratio = 1.0;
        state.k_rls = 1.0;
        state.target_release_month = [31_000.0; NMONTH];
        state.stored_mass = 400.0;
        let to_lake = state.release(0, true, &config);
        assert_eq!(to_lake, 400.0);
        assert_eq!(state.stored_mass, 0.0);
    }

    #[test]
    fn test_outlet_dam_does_not_release() {
        let config = ReservoirConfig::default();
        let mut state = dam(Purpose::Other);
        state.stats.capacity_ratio = 1.0;
        state.k_rls = 1.0;
        state.target_release_month = [310.0; NMONTH];
        state.stored_mass = 400.0;
        assert_eq!(state.release(0, false, &config), 0.0);
        assert_eq!(state.stored_mass, 400.0);
    }

    #[test]
    fn test_irrigation_buffer_rotation() {
        let config = ReservoirConfig::default();
        let mut state = dam(Purpose::Irrigation);
        state.stats.capacity_ratio = 1.0;
        state.stats.mean_inflow_month[0] = 310.0;
        state.k_rls = 1.0;
        state.target_release_month = [3_100.0; NMONTH];
        state.stored_mass = 1_000.0;
        state.irrigation_buffer = [7.0, 0.0, 0.0, 0.0, 0.0];

        // 计划下泄 100，环境流量 0.1 * 10 = 1
        let to_lake = state.release(0, true, &config);
        assert_relative_eq!(state.irrigation_buffer[NIRRIGDAYS - 1], 99.0);
        assert_relative_eq!(to_lake, 1.0 + 7.0);
        assert_relative_eq!(state.stored_mass + state.irrigation_buffer.iter().sum::<f64>() + to_lake, 1_007.0);
    }

    #[test]
    fn test_supply_takes_oldest_first() {
        let config = ReservoirConfig::default();
        let mut state = dam(Purpose::Irrigation);
        state.irrigation_buffer = [3.0, 4.0, 0.0, 0.0, 5.0];
        let supplied = state.supply(6.0, 0, &config).unwrap();
        assert_eq!(supplied, 6.0);
        assert_eq!(state.demand_fraction, 1.0);
        assert_eq!(state.irrigation_buffer, [0.0, 1.0, 0.0, 0.0, 5.0]);
        assert_eq!(state.month_demand, 6.0);
    }

    #[test]
    fn test_supply_partial_when_buffer_short() {
        let config = ReservoirConfig::default();
        let mut state = dam(Purpose::Irrigation);
        state.irrigation_buffer = [1.0, 1.0, 0.0, 0.0, 0.0];
        let supplied = state.supply(8.0, 0, &config).unwrap();
        assert_relative_eq!(supplied, 2.0);
        assert_relative_eq!(state.demand_fraction, 0.25);
        assert_relative_eq!(state.irrigation_buffer.iter().sum::<f64>(), 0.0);
    }

    #[test]
    fn test_negative_buffer_within_tolerance_is_zeroed() {
        let config = ReservoirConfig::default();
        let mut state = dam(Purpose::Irrigation);
        state.irrigation_buffer = [-1e-6, 0.0, 0.0, 0.0, 0.0];
        assert_eq!(state.supply(1.0, 0, &config).unwrap(), 0.0);
        assert_eq!(state.irrigation_buffer, [0.0; NIRRIGDAYS]);
    }

    #[test]
    fn test_negative_buffer_beyond_tolerance_fails() {
        let config = ReservoirConfig::default();
        let mut state = dam(Purpose::Irrigation);
        state.irrigation_buffer = [-1.0, 0.0, 0.0, 0.0, 0.0];
        let err = state.supply(1.0, 9, &config).unwrap_err();
        assert!(matches!(err, HnError::Invariant { cell: 9, .. }));
    }

    #[test]
    fn test_year_of_history_sets_targets() {
        let config = ReservoirConfig::default();
        let mut state = dam(Purpose::Other);
        for month in 0..NMONTH {
            state.month_inflow = 10.0 * ndaymonth(month) as f64;
            state.stored_mass = 850.0;
            state.close_month(month, month == NMONTH - 1, 0, &config);
        }
        assert_relative_eq!(state.stats.mean_inflow, 10.0, epsilon = 1e-12);
        // 全年入流相同，全部为丰水月，调度年从一月开始
        assert_eq!(state.stats.operational_start_month, 0);
        assert_relative_eq!(state.k_rls, 1.0, epsilon = 1e-12);
        assert_relative_eq!(state.target_release_year, 3_650.0, epsilon = 1e-9);
    }

    #[test]
    fn test_restart_roundtrip_and_capacity_check() {
        let config = ReservoirConfig::default();
        let mut state = dam(Purpose::Irrigation);
        state.stored_mass = 321.0;
        state.irrigation_buffer = [1.0, 2.0, 3.0, 4.0, 5.0];
        state.history.record(2, 50.0, 1.0, 300.0);
        let record = state.to_restart(17);

        let mut restored = ReservoirState::new(*state.reservoir());
        restored.restore(&record, &config).unwrap();
        assert!(restored.is_active());
        assert_eq!(restored.to_restart(17), record);

        let mut wrong = record.clone();
        wrong.capacity *= 2.0;
        let mut other = ReservoirState::new(*state.reservoir());
        assert!(other.restore(&wrong, &config).is_err());
        assert!(!other.is_active());
    }
}
