// tests/common/mod.rs

//! 集成测试共用的小流域
//!
//! ```text
//! 0 ─┐          3 ─> 4 ─┐
//!    ├─> 2 ─────────────┴─> 5(灌溉坝) ─┐
//! 1 ─┘                                 ├─> 8 ─┐
//!              6 ─> 7(防洪坝) ──────────┘      ├─> 11(出口)
//!                                   9 ─> 10 ──┘
//! ```
//!
//! 单元 3 向单元 5 借水，单元 9 向单元 8 借水。径流在四月至九月偏大。

#![allow(dead_code)]

use hn_config::HydroConfig;
use hn_foundation::{HnResult, PartitionView, SimDate, NDAYYEAR};
use hn_io::ReservoirRecord;
use hn_physics::{BalanceReport, CellProperties, DailyForcing, HydroPartition, RoutingEntry, Topology};
use hn_runtime::Communicator;

pub const N: usize = 12;
pub const FIRST_YEAR: i32 = 2000;
pub const IRRIGATION_DAM: usize = 5;
pub const FLOOD_DAM: usize = 7;

pub fn topology() -> Topology {
    let downstream = [2, 2, 5, 4, 5, 8, 7, 8, 11, 10, 11];
    let mut routing: Vec<RoutingEntry> = downstream
        .iter()
        .enumerate()
        .map(|(g, &next)| RoutingEntry::to(next, 20_000 + 7_000 * g as i32))
        .collect();
    routing.push(RoutingEntry::OUTLET);

    let elevations = [60.0, 140.0, 55.0, 130.0, 120.0, 100.0, 160.0, 150.0, 40.0, 45.0, 35.0, 5.0];
    let properties = (0..N)
        .map(|g| CellProperties {
            area: 1e8,
            lake_fraction: if g % 4 == 1 { 0.05 } else { 0.0 },
            elevation: elevations[g],
            withdrawal_neighbour: match g {
                3 => Some(5),
                9 => Some(8),
                _ => None,
            },
        })
        .collect();
    Topology::new(routing, properties).unwrap()
}

pub fn reservoir_records() -> Vec<Option<ReservoirRecord>> {
    let mut records = vec![None; N];
    records[IRRIGATION_DAM] = Some(ReservoirRecord {
        commission_year: 1990,
        capacity: 8e10,
        surface_area: 5.0,
        installed_capacity: 0,
        dam_height: 60,
        purposes: [2, 1, 0, 0, 0],
    });
    records[FLOOD_DAM] = Some(ReservoirRecord {
        commission_year: FIRST_YEAR + 1,
        capacity: 2e10,
        surface_area: 2.0,
        installed_capacity: 0,
        dam_height: 40,
        purposes: [3, 0, 0, 0, 0],
    });
    records
}

/// 第 `day` 天（从模拟开始计）的强迫
pub fn forcing(view: &PartitionView, day: usize) -> Vec<DailyForcing> {
    let month = SimDate::new(FIRST_YEAR, day % NDAYYEAR).month();
    let season = if (3..=8).contains(&month) { 4.0 } else { 0.5 };
    view.range()
        .map(|g| DailyForcing {
            runoff: season * (1.0 + ((day * 7 + g * 3) % 11) as f64 * 0.1),
            precipitation: season * 1.2,
            pet: 1.5,
            withdrawal_demand: match g {
                2 => 2e9,
                3 | 9 => 3e8,
                8 | 10 => 1e8,
                _ => 0.0,
            },
        })
        .collect()
}

/// 测试日志，`RUST_LOG` 控制级别
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn build<C: Communicator>(comm: &C, view: PartitionView) -> HnResult<HydroPartition> {
    init_tracing();
    let records = reservoir_records();
    let local = records[view.lo()..view.hi()].to_vec();
    HydroPartition::build(comm, view, &topology(), &local, &HydroConfig::default())
}

/// 从第 0 天开始逐日推进
pub fn run<C: Communicator>(
    comm: &C,
    partition: &mut HydroPartition,
    days: usize,
) -> HnResult<Vec<(BalanceReport, f64)>> {
    run_from(comm, partition, 0, days)
}

/// 从第 `start` 天开始逐日推进，每天做全局平衡检查，返回平衡报告与当日水库供水总量
pub fn run_from<C: Communicator>(
    comm: &C,
    partition: &mut HydroPartition,
    start: usize,
    days: usize,
) -> HnResult<Vec<(BalanceReport, f64)>> {
    let view = *partition.view();
    let mut date = SimDate::new(FIRST_YEAR + (start / NDAYYEAR) as i32, start % NDAYYEAR);
    let mut reports = Vec::with_capacity(days);
    for day in start..start + days {
        partition.run_day(comm, date, &forcing(&view, day))?;
        let report = partition.check_balance(comm, 1e-9)?;
        let supply: f64 = partition.cells().iter().map(|c| c.flux.reservoir_supply).sum();
        reports.push((report, comm.all_reduce_sum(supply)?));
        date = date.next();
    }
    Ok(reports)
}

/// 逐单元状态快照，用于跨分区方式逐位比较
pub fn snapshot(partition: &HydroPartition) -> Vec<(usize, Vec<u64>)> {
    partition
        .cells()
        .iter()
        .map(|c| {
            let mut bits = vec![
                c.river_mass.to_bits(),
                c.lake_mass.to_bits(),
                c.daily_discharge.to_bits(),
                c.withdrawal.to_bits(),
                c.neighbour_supply.to_bits(),
                c.unmet_demand.to_bits(),
                c.reservoir_supply_received.to_bits(),
                c.withdrawal_deficit.to_bits(),
            ];
            if let Some(res) = c.reservoir.as_ref() {
                bits.push(res.stored_mass.to_bits());
                bits.push(res.k_rls.to_bits());
                bits.extend(res.irrigation_buffer.iter().map(|v| v.to_bits()));
                bits.extend(res.fraction.iter().map(|v| v.to_bits()));
            }
            bits.extend(c.reservoir_weights.iter().map(|v| v.to_bits()));
            (c.global, bits)
        })
        .collect()
}
