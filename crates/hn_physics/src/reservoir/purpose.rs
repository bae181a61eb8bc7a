// crates/hn_physics/src/reservoir/purpose.rs

//! 大坝静态参数与用途

use hn_foundation::{ensure, HnError, HnResult, NPURPOSE};
use hn_io::ReservoirRecord;

/// 主用途编码：灌溉
pub const PURPOSE_CODE_IRRIGATION: i32 = 2;
/// 主用途编码：防洪
pub const PURPOSE_CODE_FLOOD_CONTROL: i32 = 3;

/// 调度用途
///
/// 决定每月目标下泄量的计算方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// 灌溉（下泄量跟随需水的季节变化）
    Irrigation,
    /// 防洪（目标为年均入流）
    FloodControl,
    /// 其他（发电、供水等，目标为年均入流）
    Other,
}

impl Purpose {
    /// 由用途编码判断调度方式
    ///
    /// 主用途为灌溉，或第二项标记了灌溉，都按灌溉调度。
    pub fn from_codes(purposes: &[i32; NPURPOSE]) -> Self {
        if purposes[0] == PURPOSE_CODE_IRRIGATION || purposes[1] == 1 {
            Purpose::Irrigation
        } else if purposes[0] == PURPOSE_CODE_FLOOD_CONTROL {
            Purpose::FloodControl
        } else {
            Purpose::Other
        }
    }

    /// 是否向灌溉供水
    #[inline]
    pub fn serves_irrigation(&self) -> bool {
        matches!(self, Purpose::Irrigation)
    }
}

/// 一座大坝的不变参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reservoir {
    /// 投入运行年份
    pub commission_year: i32,
    /// 库容 [dm³]
    pub capacity: f64,
    /// 水面面积 [km²]
    pub surface_area: f64,
    /// 装机容量
    pub installed_capacity: i32,
    /// 坝高 [m]
    pub dam_height: i32,
    /// 原始用途编码
    pub purposes: [i32; NPURPOSE],
    /// 调度用途
    pub purpose: Purpose,
}

impl Reservoir {
    /// 由输入记录构建，库容必须为正
    pub fn from_record(cell: usize, record: &ReservoirRecord) -> HnResult<Self> {
        ensure!(
            record.capacity > 0.0 && record.capacity.is_finite(),
            HnError::invalid_input(format!("单元 {cell} 的水库库容无效: {}", record.capacity))
        );
        ensure!(
            record.surface_area >= 0.0 && record.surface_area.is_finite(),
            HnError::invalid_input(format!("单元 {cell} 的水库面积无效: {}", record.surface_area))
        );
        Ok(Self {
            commission_year: record.commission_year,
            capacity: record.capacity,
            surface_area: record.surface_area,
            installed_capacity: record.installed_capacity,
            dam_height: record.dam_height,
            purposes: record.purposes,
            purpose: Purpose::from_codes(&record.purposes),
        })
    }
}
