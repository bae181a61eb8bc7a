// crates/hn_physics/src/cell.rs

//! 单元水文状态
//!
//! 每个本地单元持有河道、湖泊、取水和（可选的）水库状态，
//! 以及当日的通量账本 [`FluxAccount`]，用于逐单元与全局的水量平衡校验。
//!
//! 所有水量单位为 dm³，径流、降水、蒸发强迫以 mm 给出，乘以面积 [m²] 即为 dm³。
//!
//! # 平衡口径
//!
//! 储量 = 河道 + 湖泊 + 水库蓄水 + 灌溉缓冲。
//! 邻近单元借水与水库向服务单元供水属于消耗，不计入服务单元的储量。

use std::sync::Arc;

use hn_config::{HydroConfig, RoutingConfig};
use hn_foundation::{HnError, HnResult};

use crate::queue::DelayQueue;
use crate::reservoir::ReservoirState;
use crate::topology::{CellProperties, Downstream};
use crate::transfer::TransferFunction;

/// 单日强迫
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DailyForcing {
    /// 产流 [mm]
    pub runoff: f64,
    /// 降水 [mm]
    pub precipitation: f64,
    /// 潜在蒸散 [mm]
    pub pet: f64,
    /// 取水需求 [dm³]
    pub withdrawal_demand: f64,
}

/// 当日通量 [dm³]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FluxAccount {
    /// 产流
    pub runoff: f64,
    /// 上游来水
    pub routed_in: f64,
    /// 流向下游
    pub routed_out: f64,
    /// 出口流出模型
    pub ocean_outflow: f64,
    /// 取水
    pub withdrawal: f64,
    /// 库面降水
    pub reservoir_precipitation: f64,
    /// 库面蒸发
    pub reservoir_evaporation: f64,
    /// 水库向灌溉单元供水
    pub reservoir_supply: f64,
    /// 水库溢流入湖（内部转移）
    pub overflow_to_lake: f64,
    /// 水库下泄入湖（内部转移）
    pub release_to_lake: f64,
}

impl FluxAccount {
    /// 进入本单元储量的水量
    #[inline]
    pub fn pooled_inflow(&self) -> f64 {
        self.runoff + self.routed_in + self.reservoir_precipitation
    }

    /// 离开本单元储量的水量
    #[inline]
    pub fn pooled_outflow(&self) -> f64 {
        self.routed_out
            + self.ocean_outflow
            + self.withdrawal
            + self.reservoir_evaporation
            + self.reservoir_supply
    }
}

/// 单元水文状态
#[derive(Debug, Clone)]
pub struct CellHydrology {
    /// 全局编号
    pub global: usize,
    /// 下游
    pub downstream: Downstream,
    /// 面积 [m²]
    pub area: f64,

    /// 河道水量
    pub river_mass: f64,
    /// 湖泊水量
    pub lake_mass: f64,
    /// 湖泊最大水量
    pub lake_mass_max: f64,
    /// 当日出流
    pub daily_discharge: f64,

    /// 本单元原始取水需求
    pub own_demand: f64,
    /// 当日在本单元河道与湖泊中取水的需求（含邻近单元转来的部分）
    pub withdrawal_demand: f64,
    /// 当日在本单元实际取水
    pub withdrawal: f64,
    /// 转给邻近单元的需求
    pub neighbour_request_sent: f64,
    /// 邻近单元转来的需求
    pub neighbor_withdrawal_request: f64,
    /// 转来的需求中被满足的比例
    pub neighbour_share: f64,
    /// 从邻近单元得到的水量
    pub neighbour_supply: f64,
    /// 仍未满足、可由水库补充的需求
    pub unmet_demand: f64,
    /// 从水库得到的水量
    pub reservoir_supply_received: f64,
    /// 最终缺水量
    pub withdrawal_deficit: f64,

    /// 每个供水水库分给本单元的权重（与回传图入边顺序一致）
    pub reservoir_weights: Vec<f64>,
    /// 本单元的大坝
    pub reservoir: Option<ReservoirState>,

    /// 当日通量
    pub flux: FluxAccount,

    queue: DelayQueue,
    transfer: Arc<TransferFunction>,
    storage_at_day_start: f64,
}

impl CellHydrology {
    /// 初始状态：河道、湖泊为空
    pub fn new(
        global: usize,
        downstream: Downstream,
        properties: &CellProperties,
        transfer: Arc<TransferFunction>,
        routing: &RoutingConfig,
    ) -> Self {
        Self {
            global,
            downstream,
            area: properties.area,
            river_mass: 0.0,
            lake_mass: 0.0,
            lake_mass_max: properties.lake_fraction * properties.area * routing.lake_depth * 1000.0,
            daily_discharge: 0.0,
            own_demand: 0.0,
            withdrawal_demand: 0.0,
            withdrawal: 0.0,
            neighbour_request_sent: 0.0,
            neighbor_withdrawal_request: 0.0,
            neighbour_share: 0.0,
            neighbour_supply: 0.0,
            unmet_demand: 0.0,
            reservoir_supply_received: 0.0,
            withdrawal_deficit: 0.0,
            reservoir_weights: Vec::new(),
            reservoir: None,
            flux: FluxAccount::default(),
            queue: DelayQueue::new(&transfer),
            transfer,
            storage_at_day_start: 0.0,
        }
    }

    /// 已投入运行的大坝
    #[inline]
    pub fn active_reservoir(&self) -> Option<&ReservoirState> {
        self.reservoir.as_ref().filter(|r| r.is_active())
    }

    #[inline]
    fn active_reservoir_mut(&mut self) -> Option<&mut ReservoirState> {
        self.reservoir.as_mut().filter(|r| r.is_active())
    }

    /// 传递函数
    #[inline]
    pub fn transfer(&self) -> &TransferFunction {
        &self.transfer
    }

    /// 延迟队列中尚未流出的水量
    pub fn queued_mass(&self) -> f64 {
        self.queue.pending()
    }

    /// 当前储量
    pub fn storage(&self) -> f64 {
        self.river_mass
            + self.lake_mass
            + self.reservoir.as_ref().map_or(0.0, |r| r.storage())
    }

    /// 当日储量变化与净通量之差
    pub fn balance_residual(&self) -> f64 {
        (self.storage() - self.storage_at_day_start)
            - (self.flux.pooled_inflow() - self.flux.pooled_outflow())
    }

    /// 当日储量变化
    pub fn storage_change(&self) -> f64 {
        self.storage() - self.storage_at_day_start
    }

    // ========================================================
    // 日初
    // ========================================================

    /// 清空当日账本并登记取水需求
    pub fn begin_day(&mut self, forcing: &DailyForcing) {
        self.flux = FluxAccount::default();
        self.storage_at_day_start = self.storage();
        self.own_demand = forcing.withdrawal_demand.max(0.0);
        self.withdrawal_demand = self.own_demand;
        self.withdrawal = 0.0;
        self.neighbour_request_sent = 0.0;
        self.neighbor_withdrawal_request = 0.0;
        self.neighbour_share = 0.0;
        self.neighbour_supply = 0.0;
        self.unmet_demand = 0.0;
        self.reservoir_supply_received = 0.0;
        self.withdrawal_deficit = 0.0;
    }

    /// 本单元前一日出流不足以满足的需求转给邻近单元
    pub fn prepare_neighbour_request(&mut self, has_neighbour: bool) {
        let deficit = self.own_demand - self.daily_discharge;
        if has_neighbour && deficit > 0.0 {
            self.neighbour_request_sent = deficit;
            self.withdrawal_demand = self.own_demand - deficit;
        }
    }

    /// 登记邻近单元转来的需求
    pub fn accept_neighbour_requests(&mut self, requested: f64) {
        self.neighbor_withdrawal_request = requested;
        self.withdrawal_demand += requested;
    }

    // ========================================================
    // 汇流
    // ========================================================

    /// 产流进入水库或湖泊
    pub fn add_runoff(&mut self, runoff_mm: f64) {
        let volume = runoff_mm * self.area;
        self.flux.runoff += volume;
        let (to_lake, overflow) = match self.active_reservoir_mut() {
            Some(res) => {
                res.month_inflow += volume;
                let overflow = res.fill(volume);
                (overflow, overflow)
            }
            None => (volume, 0.0),
        };
        self.flux.overflow_to_lake += overflow;
        self.lake_mass += to_lake;
    }

    /// 水库日下泄
    pub fn release_reservoir(&mut self, month: usize, config: &HydroConfig) {
        let has_downstream = !self.downstream.is_outlet();
        if let Some(res) = self.active_reservoir_mut() {
            let to_lake = res.release(month, has_downstream, &config.reservoir);
            self.lake_mass += to_lake;
            self.flux.release_to_lake += to_lake;
        }
    }

    /// 本子步从河道流出的水量
    pub fn drain_queue(&mut self) -> f64 {
        let out = self.queue.release();
        self.river_mass -= out;
        self.daily_discharge += out;
        match self.downstream {
            Downstream::Cell(_) => self.flux.routed_out += out,
            Downstream::Outlet => self.flux.ocean_outflow += out,
        }
        out
    }

    /// 处理本子步的上游来水
    ///
    /// 来水依次经过水库、湖泊，湖泊出流汇入后扣除取水，剩余注入延迟队列。
    pub fn route_inflow(&mut self, inflow: f64, substeps: usize, routing: &RoutingConfig) {
        self.flux.routed_in += inflow;
        let mut fin = inflow;

        if let Some(res) = self.active_reservoir_mut() {
            res.month_inflow += fin;
            fin = res.fill(fin);
            self.flux.overflow_to_lake += fin;
        }

        self.lake_mass += fin;
        fin = 0.0;
        if self.lake_mass > self.lake_mass_max {
            fin = self.lake_mass - self.lake_mass_max;
            self.lake_mass = self.lake_mass_max;
        }

        if !self.downstream.is_outlet() && self.lake_mass_max > 0.0 && self.lake_mass > 0.0 {
            let rate = routing.lake_outflow_rate / substeps as f64;
            let out = (rate * self.lake_mass * (self.lake_mass / self.lake_mass_max).powf(1.5))
                .min(self.lake_mass);
            self.lake_mass -= out;
            fin += out;
        }

        let quota = self.withdrawal_demand / substeps as f64;
        let taken = fin.min(quota).min(self.withdrawal_demand - self.withdrawal).max(0.0);
        fin -= taken;
        self.withdrawal += taken;
        self.flux.withdrawal += taken;

        self.queue.inject(fin, &self.transfer);
        self.river_mass += fin;
    }

    /// 子步结束后仍未满足的取水从湖泊补足
    pub fn withdraw_from_lake(&mut self) {
        let remaining = self.withdrawal_demand - self.withdrawal;
        if remaining > 0.0 && self.lake_mass > 0.0 {
            let taken = remaining.min(self.lake_mass);
            self.lake_mass -= taken;
            self.withdrawal += taken;
            self.flux.withdrawal += taken;
        }
    }

    // ========================================================
    // 取水结算
    // ========================================================

    /// 本单元为邻近单元取到的比例
    ///
    /// 先满足本单元自身需求，剩余部分按比例分给转来的需求。
    pub fn settle_neighbour_share(&mut self) -> f64 {
        self.neighbour_share = if self.neighbor_withdrawal_request > 0.0 {
            let own = self.withdrawal_demand - self.neighbor_withdrawal_request;
            let surplus = self.withdrawal - own;
            (surplus / self.neighbor_withdrawal_request).clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.neighbour_share
    }

    /// 收到邻近单元代取的水后计算剩余缺口
    pub fn finish_withdrawal(&mut self, neighbour_supply: f64) {
        self.neighbour_supply = neighbour_supply;
        let given = self.neighbour_share * self.neighbor_withdrawal_request;
        let obtained = self.withdrawal - given + neighbour_supply;
        self.unmet_demand = (self.own_demand - obtained).max(0.0);
        self.withdrawal_deficit = self.unmet_demand;
    }

    // ========================================================
    // 水库
    // ========================================================

    /// 库面降水与蒸发
    pub fn reservoir_surface_balance(&mut self, forcing: &DailyForcing, config: &HydroConfig) {
        let area = self.area;
        let Some(res) = self.active_reservoir_mut() else {
            return;
        };
        let surface = area * res.reservoir_fraction;
        let balance = res.apply_surface_balance(
            forcing.precipitation * surface,
            forcing.pet * config.reservoir.priestley_taylor * surface,
        );
        self.lake_mass += balance.overflow;
        self.flux.reservoir_precipitation += balance.precipitation;
        self.flux.reservoir_evaporation += balance.evaporation;
        self.flux.overflow_to_lake += balance.overflow;
    }

    /// 大坝当日向服务单元供水
    pub fn supply_irrigation(&mut self, demand: f64, config: &HydroConfig) -> HnResult<()> {
        let global = self.global;
        let Some(res) = self.active_reservoir_mut() else {
            if demand > 0.0 {
                return Err(HnError::invariant(global, "未运行的大坝收到供水需求"));
            }
            return Ok(());
        };
        let supplied = res.supply(demand, global, &config.reservoir)?;
        self.flux.reservoir_supply += supplied;
        Ok(())
    }

    /// 登记从水库得到的水量
    pub fn receive_reservoir_supply(&mut self, received: f64) {
        self.reservoir_supply_received = received;
        self.withdrawal_deficit = (self.unmet_demand - received).max(0.0);
    }
}
