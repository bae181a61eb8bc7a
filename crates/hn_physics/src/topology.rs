// crates/hn_physics/src/topology.rs

//! 河网拓扑
//!
//! 全局只读的单元属性与下游关系，由所有分区共享。
//! 每个单元最多一个下游，出口单元没有下游。

use hn_foundation::{HnError, HnResult};
use hn_io::RoutingRecord;

/// 下游关系
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Downstream {
    /// 流向另一个单元（全局编号）
    Cell(usize),
    /// 流出模型区域
    Outlet,
}

impl Downstream {
    /// 是否为出口
    #[inline]
    pub fn is_outlet(&self) -> bool {
        matches!(self, Downstream::Outlet)
    }
}

/// 单元的河道信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutingEntry {
    /// 下游
    pub downstream: Downstream,
    /// 到下游的河段长度 [m]
    pub reach_length: i32,
}

impl RoutingEntry {
    /// 出口单元
    pub const OUTLET: RoutingEntry = RoutingEntry {
        downstream: Downstream::Outlet,
        reach_length: 0,
    };

    /// 流向 `next` 的单元
    pub fn to(next: usize, reach_length: i32) -> Self {
        Self {
            downstream: Downstream::Cell(next),
            reach_length,
        }
    }

    /// 由输入记录转换，负下标为出口
    pub fn from_record(record: &RoutingRecord) -> Self {
        match usize::try_from(record.index) {
            Ok(next) => Self::to(next, record.len),
            Err(_) => Self {
                downstream: Downstream::Outlet,
                reach_length: record.len,
            },
        }
    }
}

/// 单元的静态属性
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellProperties {
    /// 单元面积 [m²]
    pub area: f64,
    /// 湖泊面积占比
    pub lake_fraction: f64,
    /// 平均高程 [m]
    pub elevation: f64,
    /// 可借水的邻近单元（全局编号）
    pub withdrawal_neighbour: Option<usize>,
}

impl CellProperties {
    /// 只给定面积，其余取零
    pub fn with_area(area: f64) -> Self {
        Self {
            area,
            lake_fraction: 0.0,
            elevation: 0.0,
            withdrawal_neighbour: None,
        }
    }
}

/// 全局河网
#[derive(Debug, Clone)]
pub struct Topology {
    routing: Vec<RoutingEntry>,
    properties: Vec<CellProperties>,
}

impl Topology {
    /// 构建并校验
    pub fn new(routing: Vec<RoutingEntry>, properties: Vec<CellProperties>) -> HnResult<Self> {
        HnError::check_size("cell_properties", routing.len(), properties.len())?;
        let n = routing.len();
        for (cell, entry) in routing.iter().enumerate() {
            if let Downstream::Cell(next) = entry.downstream {
                if next >= n {
                    return Err(HnError::invalid_input(format!(
                        "单元 {cell} 的下游 {next} 超出单元总数 {n}"
                    )));
                }
                if next == cell {
                    return Err(HnError::invalid_input(format!("单元 {cell} 的下游指向自身")));
                }
            }
        }
        for (cell, p) in properties.iter().enumerate() {
            if !(p.area > 0.0 && p.area.is_finite()) {
                return Err(HnError::invalid_input(format!("单元 {cell} 的面积无效: {}", p.area)));
            }
            HnError::check_range("lake_fraction", p.lake_fraction, 0.0, 1.0)?;
            if let Some(neighbour) = p.withdrawal_neighbour {
                HnError::check_index("withdrawal_neighbour", neighbour, n)?;
            }
        }
        Ok(Self {
            routing,
            properties,
        })
    }

    /// 由河网输入记录构建
    pub fn from_records(records: &[RoutingRecord], properties: Vec<CellProperties>) -> HnResult<Self> {
        Self::new(records.iter().map(RoutingEntry::from_record).collect(), properties)
    }

    /// 单元总数
    #[inline]
    pub fn len(&self) -> usize {
        self.routing.len()
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.routing.is_empty()
    }

    /// 单元的河道信息
    #[inline]
    pub fn routing(&self, cell: usize) -> &RoutingEntry {
        &self.routing[cell]
    }

    /// 单元属性
    #[inline]
    pub fn properties(&self, cell: usize) -> &CellProperties {
        &self.properties[cell]
    }

    /// 每个单元的直接上游单元，按编号升序
    pub fn upstream(&self) -> Vec<Vec<usize>> {
        let mut upstream = vec![Vec::new(); self.len()];
        for (cell, entry) in self.routing.iter().enumerate() {
            if let Downstream::Cell(next) = entry.downstream {
                upstream[next].push(cell);
            }
        }
        upstream
    }

    /// 从 `start` 沿河而下的单元序列（不含 `start`）
    ///
    /// 遇到出口或重复访问的单元时停止，后者说明河网有环，记录警告。
    pub fn downstream_path(&self, start: usize) -> Vec<usize> {
        let mut path = Vec::new();
        let mut visited = vec![false; self.len()];
        visited[start] = true;
        let mut current = start;
        while let Downstream::Cell(next) = self.routing[current].downstream {
            if visited[next] {
                tracing::warn!(start, cell = next, "河网存在环路，停止向下游追踪");
                break;
            }
            visited[next] = true;
            path.push(next);
            current = next;
        }
        path
    }
}
