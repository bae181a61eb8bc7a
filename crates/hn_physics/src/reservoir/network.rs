// crates/hn_physics/src/reservoir/network.rs

//! 水库供水网络
//!
//! 每座大坝服务一组单元：大坝所在单元、沿河向下直到出口的单元，
//! 以及从这些单元向上游搜索若干层、且高程低于大坝的单元。
//!
//! 两张交换图：
//!
//! - 供水图：目标为大坝，来源为服务单元，用于汇总需水
//! - 回传图：供水图的反向，用于把分配结果送回服务单元
//!
//! # 年度分配（两遍）
//!
//! 1. 回传图：大坝提供可分配水量，服务单元按各坝提供量的占比得到权重
//! 2. 供水图：服务单元回报收到的总提供量，大坝据此计算每个服务单元的需水份额
//!
//! # 每日供水
//!
//! 1. 供水图：服务单元上报未满足需求，大坝按份额汇总并从灌溉缓冲供水
//! 2. 回传图：大坝回传满足比例，服务单元按权重得到水量

use std::sync::Arc;

use hn_config::HydroConfig;
use hn_foundation::{HnResult, PartitionView};
use hn_runtime::{Communicator, ExchangeGraph, Pnet, PnetBuilder};

use crate::cell::CellHydrology;
use crate::topology::Topology;

/// 大坝服务的单元（全局编号，含大坝自身）
///
/// `upstream` 为 [`Topology::upstream`] 的结果。
pub fn served_cells(topology: &Topology, upstream: &[Vec<usize>], dam: usize, levels: usize) -> Vec<usize> {
    let mut visited = vec![false; topology.len()];
    let mut served = Vec::new();
    let mut frontier = vec![dam];
    visited[dam] = true;
    for cell in topology.downstream_path(dam) {
        if !visited[cell] {
            visited[cell] = true;
            frontier.push(cell);
        }
    }

    let dam_elevation = topology.properties(dam).elevation;
    for level in 0..=levels {
        let mut next = Vec::new();
        for &cell in &frontier {
            served.push(cell);
            if level == levels {
                continue;
            }
            for &up in &upstream[cell] {
                if !visited[up] && topology.properties(up).elevation < dam_elevation {
                    visited[up] = true;
                    next.push(up);
                }
            }
        }
        frontier = next;
    }
    served
}

/// 水库供水网络
pub struct ReservoirNetwork {
    supply: Pnet<f64>,
    back: Pnet<f64>,
}

impl std::fmt::Debug for ReservoirNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservoirNetwork")
            .field("supply_edges", &self.supply.graph().edge_count())
            .field("back_edges", &self.back.graph().edge_count())
            .finish()
    }
}

impl ReservoirNetwork {
    /// 构建两张交换图，并为本地单元分配份额与权重数组（集体操作）
    pub fn build<C: Communicator>(
        comm: &C,
        view: PartitionView,
        topology: &Topology,
        cells: &mut [CellHydrology],
        config: &HydroConfig,
    ) -> HnResult<Self> {
        let upstream = topology.upstream();
        let mut builder = PnetBuilder::new(view);
        let mut outcome = Ok(());
        for cell in cells.iter().filter(|c| c.reservoir.is_some()) {
            for served in served_cells(topology, &upstream, cell.global, config.reservoir.upstream_levels) {
                if let Err(err) = builder.add_connect(cell.global, served) {
                    outcome = Err(err);
                    break;
                }
            }
        }
        comm.all_agree(outcome)?;

        let reversed = builder.reverse(comm)?;
        let supply_graph = Arc::new(builder.setup(comm)?);
        let back_graph = Arc::new(reversed.setup(comm)?);

        for (local, cell) in cells.iter_mut().enumerate() {
            cell.reservoir_weights = vec![0.0; back_graph.in_len(local)];
            if let Some(res) = cell.reservoir.as_mut() {
                res.fraction = vec![0.0; supply_graph.in_len(local)];
            }
        }
        tracing::debug!(
            rank = view.rank(),
            edges = supply_graph.edge_count(),
            "水库供水网络构建完成"
        );
        Ok(Self {
            supply: Pnet::new(supply_graph),
            back: Pnet::new(back_graph),
        })
    }

    /// 供水图
    pub fn supply_graph(&self) -> &ExchangeGraph {
        self.supply.graph()
    }

    /// 回传图
    pub fn back_graph(&self) -> &ExchangeGraph {
        self.back.graph()
    }

    /// 年度分配（集体操作）
    pub fn allocate<C: Communicator>(&mut self, comm: &C, cells: &mut [CellHydrology]) -> HnResult<()> {
        let offered_total: Vec<f64> = {
            let received = self
                .back
                .publish(|local| cells[local].active_reservoir().map_or(0.0, |r| r.offered_volume()))
                .exchange(comm)?;
            cells
                .iter_mut()
                .enumerate()
                .map(|(local, cell)| {
                    let total = received.sum(local);
                    for (weight, offered) in cell.reservoir_weights.iter_mut().zip(received.inputs(local)) {
                        *weight = if total > 0.0 { offered / total } else { 0.0 };
                    }
                    total
                })
                .collect()
        };

        let received = self.supply.publish(|local| offered_total[local]).exchange(comm)?;
        for (local, cell) in cells.iter_mut().enumerate() {
            if let Some(res) = cell.reservoir.as_mut() {
                let offered = if res.is_active() { res.offered_volume() } else { 0.0 };
                for (fraction, total) in res.fraction.iter_mut().zip(received.inputs(local)) {
                    *fraction = if total > 0.0 { offered / total } else { 0.0 };
                }
            }
        }
        Ok(())
    }

    /// 每日需水汇总与供水（集体操作）
    pub fn supply<C: Communicator>(
        &mut self,
        comm: &C,
        cells: &mut [CellHydrology],
        config: &HydroConfig,
    ) -> HnResult<()> {
        let mut outcome = Ok(());
        {
            let received = self
                .supply
                .publish(|local| cells[local].unmet_demand)
                .exchange(comm)?;
            for (index, cell) in cells.iter_mut().enumerate() {
                let demand = match cell.reservoir.as_ref() {
                    Some(res) => received.weighted_sum(index, &res.fraction),
                    None => continue,
                };
                if let Err(err) = cell.supply_irrigation(demand, config) {
                    outcome = Err(err);
                    break;
                }
            }
        }
        comm.all_agree(outcome)?;

        let received = self
            .back
            .publish(|local| cells[local].active_reservoir().map_or(0.0, |r| r.demand_fraction))
            .exchange(comm)?;
        for (local, cell) in cells.iter_mut().enumerate() {
            let satisfied = received.weighted_sum(local, &cell.reservoir_weights);
            cell.receive_reservoir_supply(satisfied * cell.unmet_demand);
        }
        Ok(())
    }
}
