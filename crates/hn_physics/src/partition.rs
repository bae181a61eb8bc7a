// crates/hn_physics/src/partition.rs

//! 分区驱动
//!
//! [`HydroPartition`] 持有一个分区内的全部单元状态与交换网络，
//! 按固定顺序推进一天。所有分区必须以相同的日期序列调用 [`HydroPartition::run_day`]。
//!
//! # 日内顺序
//!
//! 1. 取水需求登记，缺口转给邻近单元
//! 2. 河道汇流（子步）
//! 3. 邻近单元回传借水结果
//! 4. 年初：激活到期的大坝，重新分配供水份额
//! 5. 库面降水与蒸发
//! 6. 水库向服务单元供水
//! 7. 月末记账，年末更新统计
//!
//! # 使用示例
//!
//! ```no_run
//! use hn_config::HydroConfig;
//! use hn_foundation::{PartitionView, SimDate};
//! use hn_physics::{DailyForcing, HydroPartition, Topology};
//! use hn_runtime::SerialComm;
//!
//! # fn run(topology: &Topology) -> hn_foundation::HnResult<()> {
//! let view = PartitionView::single(topology.len())?;
//! let reservoirs = vec![None; view.len()];
//! let config = HydroConfig::default();
//! let mut partition = HydroPartition::build(&SerialComm, view, topology, &reservoirs, &config)?;
//! let forcing = vec![DailyForcing::default(); view.len()];
//! let mut date = SimDate::new(2000, 0);
//! for _ in 0..365 {
//!     partition.run_day(&SerialComm, date, &forcing)?;
//!     partition.check_balance(&SerialComm, 1e-9)?;
//!     date = date.next();
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use hn_config::HydroConfig;
use hn_foundation::{require, HnError, HnResult, KahanSum, PartitionView, SimDate};
use hn_io::{ReservoirRecord, ReservoirRestart};
use hn_runtime::Communicator;

use crate::cell::{CellHydrology, DailyForcing};
use crate::reservoir::{Reservoir, ReservoirNetwork, ReservoirState};
use crate::routing::{build_river_graph, RiverRouter};
use crate::topology::Topology;
use crate::transfer::TransferCache;
use crate::withdrawal::WithdrawalNetwork;

/// 全局水量平衡 [dm³]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BalanceReport {
    /// 储量变化
    pub storage_change: f64,
    /// 外部输入：产流与库面降水
    pub external_inflow: f64,
    /// 外部输出：入海、取水、库面蒸发与水库供水
    pub external_outflow: f64,
    /// 单元间流出与流入之差
    pub routing_imbalance: f64,
    /// 储量变化与净外部通量之差
    pub residual: f64,
}

impl BalanceReport {
    /// 用于相对容差的量级
    pub fn scale(&self) -> f64 {
        1.0_f64
            .max(self.external_inflow.abs())
            .max(self.external_outflow.abs())
            .max(self.storage_change.abs())
    }
}

/// 一个分区的水文状态
#[derive(Debug)]
pub struct HydroPartition {
    view: PartitionView,
    config: HydroConfig,
    cells: Vec<CellHydrology>,
    router: RiverRouter,
    reservoirs: ReservoirNetwork,
    withdrawal: WithdrawalNetwork,
}

impl HydroPartition {
    /// 构建分区（集体操作）
    ///
    /// `reservoirs` 为本分区各单元的大坝记录，长度等于本地单元数。
    pub fn build<C: Communicator>(
        comm: &C,
        view: PartitionView,
        topology: &Topology,
        reservoirs: &[Option<ReservoirRecord>],
        config: &HydroConfig,
    ) -> HnResult<Self> {
        let mut cells = comm.agree(Self::build_cells(view, topology, reservoirs, config))?;

        let river = Arc::new(build_river_graph(comm, view, topology)?);
        let router = RiverRouter::new(river);
        let reservoir_network = ReservoirNetwork::build(comm, view, topology, &mut cells, config)?;
        let withdrawal = WithdrawalNetwork::build(comm, view, topology)?;

        tracing::info!(
            rank = view.rank(),
            cells = cells.len(),
            dams = cells.iter().filter(|c| c.reservoir.is_some()).count(),
            "分区构建完成"
        );
        Ok(Self {
            view,
            config: config.clone(),
            cells,
            router,
            reservoirs: reservoir_network,
            withdrawal,
        })
    }

    fn build_cells(
        view: PartitionView,
        topology: &Topology,
        reservoirs: &[Option<ReservoirRecord>],
        config: &HydroConfig,
    ) -> HnResult<Vec<CellHydrology>> {
        HnError::check_size("topology", view.global_len(), topology.len())?;
        HnError::check_size("reservoirs", view.len(), reservoirs.len())?;
        config.validate()?;

        let lengths = view.range().map(|g| topology.routing(g).reach_length);
        let cache = TransferCache::build(lengths, &config.routing)?;

        let mut cells = Vec::with_capacity(view.len());
        for (global, record) in view.range().zip(reservoirs) {
            let entry = topology.routing(global);
            let transfer = require!(
                cache.get(entry.reach_length),
                HnError::internal(format!("缺少河段长度 {} 的传递函数", entry.reach_length))
            );
            let mut cell = CellHydrology::new(
                global,
                entry.downstream,
                topology.properties(global),
                transfer,
                &config.routing,
            );
            if let Some(record) = record {
                cell.reservoir = Some(ReservoirState::new(Reservoir::from_record(global, record)?));
            }
            cells.push(cell);
        }
        Ok(cells)
    }

    /// 分区视图
    #[inline]
    pub fn view(&self) -> &PartitionView {
        &self.view
    }

    /// 配置
    #[inline]
    pub fn config(&self) -> &HydroConfig {
        &self.config
    }

    /// 本地单元
    #[inline]
    pub fn cells(&self) -> &[CellHydrology] {
        &self.cells
    }

    /// 按全局编号查询本地单元
    pub fn cell(&self, global: usize) -> HnResult<&CellHydrology> {
        let local = self.view.global_to_local(global)?;
        Ok(&self.cells[local])
    }

    /// 水库供水网络
    pub fn reservoir_network(&self) -> &ReservoirNetwork {
        &self.reservoirs
    }

    /// 推进一天（集体操作）
    pub fn run_day<C: Communicator>(&mut self, comm: &C, date: SimDate, forcing: &[DailyForcing]) -> HnResult<()> {
        comm.all_agree(HnError::check_size("forcing", self.cells.len(), forcing.len()))?;
        let month = date.month();

        for (cell, f) in self.cells.iter_mut().zip(forcing) {
            cell.begin_day(f);
        }
        self.withdrawal.request(comm, &mut self.cells)?;
        self.router
            .drain(comm, &mut self.cells, forcing, month, &self.config)?;
        self.withdrawal.settle(comm, &mut self.cells)?;

        if date.is_first_day_of_year() {
            for cell in &mut self.cells {
                let area = cell.area;
                let global = cell.global;
                if let Some(res) = cell.reservoir.as_mut() {
                    if !res.is_active() && res.reservoir().commission_year <= date.year {
                        res.activate(global, area);
                    }
                }
            }
            self.reservoirs.allocate(comm, &mut self.cells)?;
        }

        for (cell, f) in self.cells.iter_mut().zip(forcing) {
            cell.reservoir_surface_balance(f, &self.config);
        }
        self.reservoirs.supply(comm, &mut self.cells, &self.config)?;

        if date.is_last_day_of_month() {
            let year_end = date.is_last_day_of_year();
            for cell in &mut self.cells {
                let global = cell.global;
                if let Some(res) = cell.reservoir.as_mut().filter(|r| r.is_active()) {
                    res.close_month(month, year_end, global, &self.config.reservoir);
                }
            }
        }
        Ok(())
    }

    /// 全局水量平衡（集体操作）
    ///
    /// 残差超过 `tolerance` 乘以量级时返回错误，所有分区得到相同的结论。
    pub fn check_balance<C: Communicator>(&self, comm: &C, tolerance: f64) -> HnResult<BalanceReport> {
        let mut storage = KahanSum::new();
        let mut inflow = KahanSum::new();
        let mut outflow = KahanSum::new();
        let mut routed = KahanSum::new();
        for cell in &self.cells {
            let f = &cell.flux;
            storage.add(cell.storage_change());
            inflow.add(f.runoff);
            inflow.add(f.reservoir_precipitation);
            outflow.add(f.ocean_outflow);
            outflow.add(f.withdrawal);
            outflow.add(f.reservoir_evaporation);
            outflow.add(f.reservoir_supply);
            routed.add(f.routed_out);
            routed.add(-f.routed_in);
        }

        let storage_change = comm.all_reduce_sum(storage.value())?;
        let external_inflow = comm.all_reduce_sum(inflow.value())?;
        let external_outflow = comm.all_reduce_sum(outflow.value())?;
        let routing_imbalance = comm.all_reduce_sum(routed.value())?;
        let report = BalanceReport {
            storage_change,
            external_inflow,
            external_outflow,
            routing_imbalance,
            residual: storage_change - (external_inflow - external_outflow),
        };

        let limit = tolerance * report.scale();
        if report.residual.abs() > limit || report.routing_imbalance.abs() > limit {
            tracing::error!(?report, "全局水量不平衡");
            return Err(HnError::out_of_range("water_balance_residual", report.residual, -limit, limit));
        }
        Ok(report)
    }

    /// 已运行大坝的重启记录
    pub fn restart_records(&self) -> Vec<ReservoirRestart> {
        self.cells
            .iter()
            .filter_map(|cell| cell.active_reservoir().map(|res| res.to_restart(cell.global)))
            .collect()
    }

    /// 从重启记录恢复本分区的大坝，忽略其他分区的记录
    pub fn restore(&mut self, records: &[ReservoirRestart]) -> HnResult<()> {
        let mut restored = 0usize;
        for record in records {
            let global = usize::try_from(record.cell)
                .map_err(|_| HnError::invalid_input(format!("重启记录单元编号无效: {}", record.cell)))?;
            if !self.view.contains(global) {
                continue;
            }
            let local = self.view.global_to_local(global)?;
            let res = require!(
                self.cells[local].reservoir.as_mut(),
                HnError::invalid_input(format!("重启记录的单元 {global} 没有大坝"))
            );
            res.restore(record, &self.config.reservoir)?;
            restored += 1;
        }
        tracing::info!(rank = self.view.rank(), restored, "水库状态已从重启记录恢复");
        Ok(())
    }
}
