// crates/hn_physics/src/routing.rs

//! 河道汇流
//!
//! 每日按固定子步数推进。每个子步内：
//!
//! 1. 各单元从延迟队列头取出本子步出流
//! 2. 出流沿河网交换给下游单元（集体操作）
//! 3. 下游单元把来水依次送入水库、湖泊，扣除取水后注入自己的延迟队列
//!
//! 子步开始前处理产流与水库下泄，子步结束后从湖泊补足剩余取水。

use std::sync::Arc;

use hn_config::HydroConfig;
use hn_foundation::{HnResult, PartitionView};
use hn_runtime::{Communicator, ExchangeGraph, Pnet, PnetBuilder};

use crate::cell::{CellHydrology, DailyForcing};
use crate::topology::{Downstream, Topology};

/// 构建河网交换图：目标为下游单元，来源为其直接上游（集体操作）
pub fn build_river_graph<C: Communicator>(
    comm: &C,
    view: PartitionView,
    topology: &Topology,
) -> HnResult<ExchangeGraph> {
    // 先按“上游依赖下游”登记，再整体反向
    let mut builder = PnetBuilder::new(view);
    let mut outcome = Ok(());
    for cell in view.range() {
        if let Downstream::Cell(next) = topology.routing(cell).downstream {
            if let Err(err) = builder.add_connect(cell, next) {
                outcome = Err(err);
                break;
            }
        }
    }
    comm.all_agree(outcome)?;
    builder.reverse(comm)?.setup(comm)
}

/// 河道汇流器
#[derive(Debug)]
pub struct RiverRouter {
    river: Pnet<f64>,
    outflow: Vec<f64>,
}

impl RiverRouter {
    /// 绑定河网交换图
    pub fn new(graph: Arc<ExchangeGraph>) -> Self {
        let n = graph.view().len();
        Self {
            river: Pnet::new(graph),
            outflow: vec![0.0; n],
        }
    }

    /// 河网交换图
    pub fn graph(&self) -> &ExchangeGraph {
        self.river.graph()
    }

    /// 推进一天（集体操作）
    pub fn drain<C: Communicator>(
        &mut self,
        comm: &C,
        cells: &mut [CellHydrology],
        forcing: &[DailyForcing],
        month: usize,
        config: &HydroConfig,
    ) -> HnResult<()> {
        for (cell, f) in cells.iter_mut().zip(forcing) {
            cell.daily_discharge = 0.0;
            cell.add_runoff(f.runoff);
            cell.release_reservoir(month, config);
        }

        let substeps = config.routing.substeps_per_day;
        for _ in 0..substeps {
            for (cell, out) in cells.iter_mut().zip(self.outflow.iter_mut()) {
                *out = cell.drain_queue();
            }
            let outflow = &self.outflow;
            let received = self.river.publish(|local| outflow[local]).exchange(comm)?;
            for (local, cell) in cells.iter_mut().enumerate() {
                cell.route_inflow(received.sum(local), substeps, &config.routing);
            }
        }

        for cell in cells.iter_mut() {
            cell.withdraw_from_lake();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{CellProperties, RoutingEntry};
    use crate::transfer::TransferFunction;
    use approx::assert_relative_eq;
    use hn_runtime::SerialComm;

    /// 0 → 1 → 2(出口)
    fn chain() -> (Topology, Vec<CellHydrology>, RiverRouter) {
        let config = HydroConfig::default();
        let topology = Topology::new(
            vec![RoutingEntry::to(1, 30_000), RoutingEntry::to(2, 30_000), RoutingEntry::OUTLET],
            vec![CellProperties::with_area(1e6); 3],
        )
        .unwrap();
        let view = PartitionView::single(3).unwrap();
        let graph = Arc::new(build_river_graph(&SerialComm, view, &topology).unwrap());
        let cells = (0..3)
            .map(|g| {
                let entry = topology.routing(g);
                let tf = Arc::new(TransferFunction::generate(entry.reach_length, &config.routing).unwrap());
                CellHydrology::new(g, entry.downstream, topology.properties(g), tf, &config.routing)
            })
            .collect();
        (topology, cells, RiverRouter::new(graph))
    }

    #[test]
    fn test_graph_edges_follow_flow() {
        let (_, _, router) = chain();
        assert_eq!(router.graph().in_len(0), 0);
        assert_eq!(router.graph().sources(1), &[0]);
        assert_eq!(router.graph().sources(2), &[1]);
    }

    #[test]
    fn test_pulse_reaches_outlet_and_conserves_mass() {
        let config = HydroConfig::default();
        let (_, mut cells, mut router) = chain();
        let mut forcing = vec![DailyForcing::default(); 3];
        forcing[0].runoff = 10.0;

        let mut ocean = 0.0;
        for day in 0..30 {
            for (cell, f) in cells.iter_mut().zip(&forcing) {
                cell.begin_day(f);
            }
            router.drain(&SerialComm, &mut cells, &forcing, 0, &config).unwrap();
            for cell in &cells {
                assert_relative_eq!(cell.balance_residual(), 0.0, epsilon = 1e-6);
            }
            ocean += cells[2].flux.ocean_outflow;
            if day == 0 {
                forcing[0].runoff = 0.0;
            }
        }
        let remaining: f64 = cells.iter().map(|c| c.storage()).sum();
        assert_relative_eq!(ocean + remaining, 1e7, max_relative = 1e-12);
        assert!(ocean > 0.99 * 1e7);
    }

    #[test]
    fn test_routed_flux_pairs_up() {
        let config = HydroConfig::default();
        let (_, mut cells, mut router) = chain();
        let forcing = vec![
            DailyForcing {
                runoff: 3.0,
                ..Default::default()
            };
            3
        ];
        for _ in 0..3 {
            for (cell, f) in cells.iter_mut().zip(&forcing) {
                cell.begin_day(f);
            }
            router.drain(&SerialComm, &mut cells, &forcing, 0, &config).unwrap();
            assert_relative_eq!(cells[0].flux.routed_out, cells[1].flux.routed_in, epsilon = 1e-9);
            assert_relative_eq!(cells[1].flux.routed_out, cells[2].flux.routed_in, epsilon = 1e-9);
        }
    }
}
