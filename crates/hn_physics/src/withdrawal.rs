// crates/hn_physics/src/withdrawal.rs

//! 邻近单元借水
//!
//! 单元自身前一日出流不足以满足取水需求时，把缺口转给指定的邻近单元，
//! 由邻近单元在汇流中一并取水。汇流结束后邻近单元先满足自身需求，
//! 剩余部分按比例回给转来需求的单元。
//!
//! 两张交换图：请求图（目标为借出方）与回传图（目标为借入方）。

use std::sync::Arc;

use hn_foundation::{HnResult, PartitionView};
use hn_runtime::{Communicator, Pnet, PnetBuilder};

use crate::cell::CellHydrology;
use crate::topology::Topology;

/// 借水网络
#[derive(Debug)]
pub struct WithdrawalNetwork {
    request: Pnet<f64>,
    back: Pnet<f64>,
}

impl WithdrawalNetwork {
    /// 构建借水网络（集体操作）
    pub fn build<C: Communicator>(comm: &C, view: PartitionView, topology: &Topology) -> HnResult<Self> {
        let mut builder = PnetBuilder::new(view);
        let mut outcome = Ok(());
        for cell in view.range() {
            if let Some(neighbour) = topology.properties(cell).withdrawal_neighbour {
                if neighbour == cell {
                    continue;
                }
                if let Err(err) = builder.add_connect(cell, neighbour) {
                    outcome = Err(err);
                    break;
                }
            }
        }
        comm.all_agree(outcome)?;

        let request = builder.reverse(comm)?.setup(comm)?;
        let back = builder.setup(comm)?;
        Ok(Self {
            request: Pnet::new(Arc::new(request)),
            back: Pnet::new(Arc::new(back)),
        })
    }

    /// 汇流前：转出缺口并登记转来的需求（集体操作）
    pub fn request<C: Communicator>(&mut self, comm: &C, cells: &mut [CellHydrology]) -> HnResult<()> {
        let back = self.back.graph();
        for (local, cell) in cells.iter_mut().enumerate() {
            cell.prepare_neighbour_request(back.in_len(local) > 0);
        }
        let received = self
            .request
            .publish(|local| cells[local].neighbour_request_sent)
            .exchange(comm)?;
        for (local, cell) in cells.iter_mut().enumerate() {
            cell.accept_neighbour_requests(received.sum(local));
        }
        Ok(())
    }

    /// 汇流后：回传满足比例并计算各单元剩余缺口（集体操作）
    pub fn settle<C: Communicator>(&mut self, comm: &C, cells: &mut [CellHydrology]) -> HnResult<()> {
        for cell in cells.iter_mut() {
            cell.settle_neighbour_share();
        }
        let received = self
            .back
            .publish(|local| cells[local].neighbour_share)
            .exchange(comm)?;
        for (local, cell) in cells.iter_mut().enumerate() {
            let supplied = received.sum(local) * cell.neighbour_request_sent;
            cell.finish_withdrawal(supplied);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::DailyForcing;
    use crate::topology::{CellProperties, RoutingEntry};
    use crate::transfer::TransferFunction;
    use approx::assert_relative_eq;
    use hn_config::RoutingConfig;
    use hn_runtime::SerialComm;

    #[test]
    fn test_request_and_settle() {
        let routing = RoutingConfig::default();
        let mut requester = CellProperties::with_area(1e6);
        requester.withdrawal_neighbour = Some(1);
        let topology = Topology::new(
            vec![RoutingEntry::OUTLET, RoutingEntry::OUTLET],
            vec![requester, CellProperties::with_area(1e6)],
        )
        .unwrap();
        let view = PartitionView::single(2).unwrap();
        let mut network = WithdrawalNetwork::build(&SerialComm, view, &topology).unwrap();

        let tf = Arc::new(TransferFunction::generate(0, &routing).unwrap());
        let mut cells: Vec<_> = (0..2)
            .map(|g| CellHydrology::new(g, topology.routing(g).downstream, topology.properties(g), tf.clone(), &routing))
            .collect();
        let demand = DailyForcing {
            withdrawal_demand: 10.0,
            ..Default::default()
        };
        cells[0].begin_day(&demand);
        cells[1].begin_day(&demand);

        network.request(&SerialComm, &mut cells).unwrap();
        assert_eq!(cells[0].withdrawal_demand, 0.0);
        assert_eq!(cells[1].neighbor_withdrawal_request, 10.0);
        assert_eq!(cells[1].withdrawal_demand, 20.0);

        // 借出方取到 15：自身 10，借入方得到一半
        cells[1].withdrawal = 15.0;
        network.settle(&SerialComm, &mut cells).unwrap();
        assert_relative_eq!(cells[0].neighbour_supply, 5.0);
        assert_relative_eq!(cells[0].unmet_demand, 5.0);
        assert_eq!(cells[1].unmet_demand, 0.0);
    }
}
