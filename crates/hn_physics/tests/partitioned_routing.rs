// tests/partitioned_routing.rs

//! 分区一致性测试
//!
//! 同一流域在单分区与多分区（线程）下逐日推进，最终状态必须逐位相同。
//!
//! # 测试覆盖
//!
//! - 跨分区的河网、借水与水库供水
//! - 一个分区的输入错误使所有分区一起失败

mod common;

use hn_foundation::{PartitionView, NDAYYEAR};
use hn_runtime::{Communicator, SerialComm, ThreadComm};

use common::N;

type Snapshot = Vec<(usize, Vec<u64>)>;

fn run_serial(days: usize) -> (Snapshot, Vec<f64>) {
    let view = PartitionView::single(N).unwrap();
    let mut partition = common::build(&SerialComm, view).unwrap();
    let reports = common::run(&SerialComm, &mut partition, days).unwrap();
    (common::snapshot(&partition), reports.iter().map(|(_, s)| *s).collect())
}

fn run_threaded(ntask: usize, days: usize) -> Snapshot {
    let world = ThreadComm::world(ntask).unwrap();
    let views = PartitionView::split(N, ntask).unwrap();
    let mut all = Vec::new();
    std::thread::scope(|s| {
        let handles: Vec<_> = world
            .iter()
            .zip(views)
            .map(|(comm, view)| {
                s.spawn(move || {
                    let mut partition = common::build(comm, view).unwrap();
                    common::run(comm, &mut partition, days).unwrap();
                    common::snapshot(&partition)
                })
            })
            .collect();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
    });
    all.sort_by_key(|(global, _)| *global);
    all
}

#[test]
fn test_threaded_matches_serial_bitwise() {
    let days = 2 * NDAYYEAR;
    let (serial, supply) = run_serial(days);
    assert!(supply.iter().any(|&s| s > 0.0), "水库未向灌溉单元供水");

    for ntask in [2, 3, 4] {
        let threaded = run_threaded(ntask, days);
        assert_eq!(serial.len(), threaded.len());
        for (a, b) in serial.iter().zip(&threaded) {
            assert_eq!(a.0, b.0);
            assert_eq!(a.1, b.1, "ntask {ntask} cell {}", a.0);
        }
    }
}

#[test]
fn test_bad_reservoir_record_aborts_all_partitions() {
    let world = ThreadComm::world(3).unwrap();
    let views = PartitionView::split(N, 3).unwrap();
    std::thread::scope(|s| {
        for (comm, view) in world.iter().zip(views) {
            s.spawn(move || {
                let mut records = common::reservoir_records()[view.lo()..view.hi()].to_vec();
                if comm.rank() == 1 {
                    // 本分区记录数错误
                    records.pop();
                }
                let result = hn_physics::HydroPartition::build(
                    comm,
                    view,
                    &common::topology(),
                    &records,
                    &hn_config::HydroConfig::default(),
                );
                assert!(result.is_err());
            });
        }
    });
}
