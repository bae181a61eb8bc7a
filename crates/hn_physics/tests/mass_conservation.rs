// tests/mass_conservation.rs

//! 全流域水量守恒测试
//!
//! # 测试覆盖
//!
//! - 多年逐日全局平衡
//! - 逐单元平衡
//! - 水库投入运行与灌溉供水
//! - 出口单元的大坝不下泄
//! - 负取水需求按零处理
//! - 无可分配水量时权重与份额全为零

mod common;

use approx::assert_relative_eq;
use hn_config::HydroConfig;
use hn_foundation::{PartitionView, SimDate, NDAYYEAR};
use hn_io::ReservoirRecord;
use hn_physics::{CellProperties, DailyForcing, HydroPartition, RoutingEntry, Topology};
use hn_runtime::SerialComm;

use common::{FLOOD_DAM, IRRIGATION_DAM, N};

#[test]
fn test_balance_closes_every_day_for_three_years() {
    let view = PartitionView::single(N).unwrap();
    let mut partition = common::build(&SerialComm, view).unwrap();
    let reports = common::run(&SerialComm, &mut partition, 3 * NDAYYEAR).unwrap();

    for (day, (report, _)) in reports.iter().enumerate() {
        assert!(
            report.residual.abs() <= 1e-9 * report.scale(),
            "day {day}: residual {}",
            report.residual
        );
    }
    for cell in partition.cells() {
        assert!(
            cell.balance_residual().abs() <= 1e-9 * cell.flux.pooled_inflow().max(1.0),
            "cell {}",
            cell.global
        );
    }
}

#[test]
fn test_dams_activate_and_irrigation_is_supplied() {
    let view = PartitionView::single(N).unwrap();
    let mut partition = common::build(&SerialComm, view).unwrap();

    let first_year = common::run(&SerialComm, &mut partition, NDAYYEAR).unwrap();
    let irrigation = partition.cell(IRRIGATION_DAM).unwrap().reservoir.as_ref().unwrap();
    assert!(irrigation.is_active());
    assert!(irrigation.stored_mass > 0.0);
    assert!(irrigation.stored_mass <= irrigation.reservoir().capacity);
    assert!(irrigation.stats.mean_volume > 0.0);
    assert!(!partition.cell(FLOOD_DAM).unwrap().reservoir.as_ref().unwrap().is_active());
    // 第一年没有历史，不供水
    assert!(first_year.iter().all(|(_, supply)| *supply == 0.0));

    let later = common::run_from(&SerialComm, &mut partition, NDAYYEAR, 2 * NDAYYEAR).unwrap();
    assert!(partition.cell(FLOOD_DAM).unwrap().reservoir.as_ref().unwrap().is_active());
    let supplied: f64 = later.iter().map(|(_, s)| s).sum();
    assert!(supplied > 0.0);

    let served = partition.cell(2).unwrap();
    assert_eq!(served.reservoir_weights.len(), 2);
    assert_relative_eq!(served.reservoir_weights.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
}

#[test]
fn test_outlet_dam_keeps_water() {
    // 0 → 1(出口，带坝)
    let topology = Topology::new(
        vec![RoutingEntry::to(1, 10_000), RoutingEntry::OUTLET],
        vec![CellProperties::with_area(1e6); 2],
    )
    .unwrap();
    let record = ReservoirRecord {
        commission_year: 1900,
        capacity: 1e12,
        surface_area: 0.0,
        installed_capacity: 0,
        dam_height: 10,
        purposes: [1, 0, 0, 0, 0],
    };
    let view = PartitionView::single(2).unwrap();
    let config = HydroConfig::default();
    let mut partition =
        HydroPartition::build(&SerialComm, view, &topology, &[None, Some(record)], &config).unwrap();

    let forcing = vec![
        DailyForcing {
            runoff: 1.0,
            ..Default::default()
        };
        2
    ];
    let mut date = SimDate::new(2000, 0);
    for _ in 0..20 {
        partition.run_day(&SerialComm, date, &forcing).unwrap();
        partition.check_balance(&SerialComm, 1e-12).unwrap();
        date = date.next();
    }
    let outlet = partition.cell(1).unwrap();
    assert_eq!(outlet.flux.ocean_outflow, 0.0);
    assert_eq!(outlet.flux.release_to_lake, 0.0);
    assert!(outlet.active_reservoir().unwrap().stored_mass > 19.0 * 1e6);
}

#[test]
fn test_mismatched_forcing_rejected() {
    let view = PartitionView::single(N).unwrap();
    let mut partition = common::build(&SerialComm, view).unwrap();
    let err = partition
        .run_day(&SerialComm, SimDate::new(2000, 0), &[DailyForcing::default(); 3])
        .unwrap_err();
    assert!(matches!(err, hn_foundation::HnError::SizeMismatch { .. }));
}

#[test]
fn test_negative_demand_treated_as_zero() {
    let view = PartitionView::single(N).unwrap();
    let mut partition = common::build(&SerialComm, view).unwrap();
    let mut date = SimDate::new(common::FIRST_YEAR, 0);
    for day in 0..60 {
        let forcing: Vec<_> = common::forcing(&view, day)
            .into_iter()
            .map(|f| DailyForcing {
                withdrawal_demand: -5e5,
                ..f
            })
            .collect();
        partition.run_day(&SerialComm, date, &forcing).unwrap();
        partition.check_balance(&SerialComm, 1e-12).unwrap();
        for cell in partition.cells() {
            assert_eq!(cell.withdrawal_demand, 0.0, "cell {}", cell.global);
            assert_eq!(cell.withdrawal, 0.0, "cell {}", cell.global);
            assert_eq!(cell.flux.withdrawal, 0.0, "cell {}", cell.global);
            assert_eq!(cell.unmet_demand, 0.0, "cell {}", cell.global);
            assert!(cell.withdrawal_deficit >= 0.0, "cell {}", cell.global);
        }
        date = date.next();
    }
}

#[test]
fn test_zero_offer_gives_zero_weights() {
    let view = PartitionView::single(N).unwrap();
    let mut partition = common::build(&SerialComm, view).unwrap();
    // 第一天大坝刚投入运行，还没有平均库容可分配
    common::run(&SerialComm, &mut partition, 1).unwrap();

    let dam = partition.cell(IRRIGATION_DAM).unwrap().active_reservoir().unwrap();
    assert_eq!(dam.stats.mean_volume, 0.0);
    assert!(!dam.fraction.is_empty());
    assert!(dam.fraction.iter().all(|&f| f == 0.0));

    let mut served = 0;
    for cell in partition.cells() {
        served += cell.reservoir_weights.len();
        assert!(cell.reservoir_weights.iter().all(|&w| w == 0.0), "cell {}", cell.global);
        if let Some(res) = cell.reservoir.as_ref() {
            assert!(res.fraction.iter().all(|&f| f == 0.0), "dam {}", cell.global);
        }
    }
    assert!(served > 0);
}
