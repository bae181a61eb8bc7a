// tests/partitioned_exchange.rs

//! 多分区交换一致性测试
//!
//! 同一张交换图在单分区和多分区（线程）下必须给出相同的聚合结果。
//!
//! # 测试覆盖
//!
//! - 任意多对多图的正向交换
//! - 反向图
//! - 一个分区登记非法边时所有分区一起失败

use std::sync::Arc;

use hn_foundation::PartitionView;
use hn_runtime::{Communicator, Pnet, PnetBuilder, SerialComm, ThreadComm};

const N: usize = 23;

// ============================================================================
// 测试辅助函数
// ============================================================================

/// 确定性的多对多边：目标 t 依赖 (t*7+k) % N，k = 0..t%4
fn edges_of(target: usize) -> Vec<usize> {
    (0..target % 4).map(|k| (target * 7 + k * 5 + 3) % N).collect()
}

fn value_of(global: usize) -> f64 {
    1.0 / (global as f64 + 1.0)
}

/// 构建图并做一次正向、一次反向交换，返回本分区各目标的 (正向和, 反向和)
fn run_partition<C: Communicator>(comm: &C, view: PartitionView) -> Vec<(usize, f64, f64)> {
    let mut builder = PnetBuilder::new(view);
    for target in view.range() {
        for source in edges_of(target) {
            builder.add_connect(target, source).unwrap();
        }
    }
    let reversed = builder.clone().reverse(comm).unwrap();
    let forward = Arc::new(builder.setup(comm).unwrap());
    let backward = Arc::new(reversed.setup(comm).unwrap());

    let mut fwd: Pnet<f64> = Pnet::new(forward);
    let mut bwd: Pnet<f64> = Pnet::new(backward);

    let mut results = Vec::new();
    let fwd_received = fwd
        .publish(|local| value_of(view.local_to_global(local)))
        .exchange(comm)
        .unwrap();
    let bwd_received = bwd
        .publish(|local| value_of(view.local_to_global(local)))
        .exchange(comm)
        .unwrap();
    for local in 0..view.len() {
        results.push((
            view.local_to_global(local),
            fwd_received.sum(local),
            bwd_received.sum(local),
        ));
    }
    results
}

fn run_threaded(ntask: usize) -> Vec<(usize, f64, f64)> {
    let world = ThreadComm::world(ntask).unwrap();
    let views = PartitionView::split(N, ntask).unwrap();
    let mut all = Vec::new();
    std::thread::scope(|s| {
        let handles: Vec<_> = world
            .iter()
            .zip(views)
            .map(|(comm, view)| s.spawn(move || run_partition(comm, view)))
            .collect();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
    });
    all.sort_by_key(|r| r.0);
    all
}

// ============================================================================
// 测试
// ============================================================================

#[test]
fn test_forward_sums_match_definition() {
    let results = run_partition(&SerialComm, PartitionView::single(N).unwrap());
    for (target, forward, _) in results {
        let expected: f64 = edges_of(target).into_iter().map(value_of).sum();
        assert_eq!(forward, expected, "target {target}");
    }
}

#[test]
fn test_backward_sums_match_definition() {
    let results = run_partition(&SerialComm, PartitionView::single(N).unwrap());
    for (node, _, backward) in results {
        let mut dependents: Vec<usize> = (0..N)
            .filter(|&t| edges_of(t).contains(&node))
            .flat_map(|t| std::iter::repeat(t).take(edges_of(t).iter().filter(|&&s| s == node).count()))
            .collect();
        dependents.sort_unstable();
        let expected: f64 = dependents.into_iter().map(value_of).sum();
        assert_eq!(backward, expected, "node {node}");
    }
}

#[test]
fn test_threaded_matches_serial_bitwise() {
    let serial = run_partition(&SerialComm, PartitionView::single(N).unwrap());
    for ntask in [2, 3, 5] {
        let threaded = run_threaded(ntask);
        assert_eq!(serial.len(), threaded.len());
        for (a, b) in serial.iter().zip(&threaded) {
            assert_eq!(a.0, b.0);
            assert_eq!(a.1.to_bits(), b.1.to_bits(), "ntask {ntask} target {}", a.0);
            assert_eq!(a.2.to_bits(), b.2.to_bits(), "ntask {ntask} target {}", a.0);
        }
    }
}

#[test]
fn test_invalid_edge_aborts_all_partitions() {
    let world = ThreadComm::world(3).unwrap();
    let views = PartitionView::split(N, 3).unwrap();
    std::thread::scope(|s| {
        for (comm, view) in world.iter().zip(views) {
            s.spawn(move || {
                let mut builder = PnetBuilder::new(view);
                if comm.rank() == 2 {
                    // 目标不属于本分区
                    assert!(builder.add_connect(0, 1).is_err());
                }
                assert!(builder.setup(comm).is_err());
            });
        }
    });
}
