// crates/hn_io/src/checkpoint.rs

//! 水库重启文件
//!
//! 保存每座已运行大坝的运行状态，续算时逐位恢复。
//!
//! # 文件格式 (v1)
//!
//! ```text
//! [魔数: 4 bytes] "HNRS"
//! [版本: u32]
//! [年份: i32]
//! [记录数: u64]
//! 每条记录:
//!   [块名: 4 bytes] "RESD"
//!   [单元编号: u64]
//!   [水库面积比例, 碳库, 氮库, 蓄水量, k_rls, 年目标下泄, 库容: 7 × f64]
//!   [灌溉缓冲: NIRRIGDAYS × f64]
//!   [月目标下泄: 12 × f64]
//!   [需水历史, 入流历史, 水位历史: 3 × HIST_YEARS × 12 × f64]
//! [CRC32: u32]
//! ```
//!
//! 所有实数以小端 f64 存储，保存再读取不改变任何一位。

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use hn_foundation::{HIST_YEARS, NIRRIGDAYS, NMONTH};

use crate::error::{CheckpointError, CheckpointResult};

/// 当前版本
const RESTART_VERSION: u32 = 1;

/// 文件魔数
const RESTART_MAGIC: &[u8; 4] = b"HNRS";

/// 记录块名
const BLOCK_TAG: &[u8; 4] = b"RESD";

/// 月度历史块
pub type History = [[f64; NMONTH]; HIST_YEARS];

/// 一座大坝的重启记录
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReservoirRestart {
    /// 大坝所在单元的全局编号
    pub cell: u64,
    /// 水库占单元面积的比例
    pub reservoir_fraction: f64,
    /// 淹没土地转入的碳库
    pub carbon_pool: f64,
    /// 淹没土地转入的氮库
    pub nitrogen_pool: f64,
    /// 蓄水量
    pub stored_mass: f64,
    /// 本运行年的下泄系数
    pub k_rls: f64,
    /// 本运行年的目标下泄总量
    pub target_release_year: f64,
    /// 库容副本，用于与输入文件核对
    pub capacity: f64,
    /// 灌溉缓冲
    pub irrigation_buffer: [f64; NIRRIGDAYS],
    /// 各月目标下泄
    pub target_release_month: [f64; NMONTH],
    /// 需水历史
    pub demand_hist: History,
    /// 入流历史
    pub inflow_hist: History,
    /// 水位历史
    pub level_hist: History,
}

/// 重启文件
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RestartFile {
    /// 写出时的模拟年份
    pub year: i32,
    /// 各大坝的记录
    pub records: Vec<ReservoirRestart>,
}

impl RestartFile {
    /// 保存到文件（先写临时文件再原子重命名）
    pub fn save(&self, path: &Path) -> CheckpointResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("hnrs.tmp");

        let mut data = Vec::new();
        data.extend_from_slice(RESTART_MAGIC);
        data.extend_from_slice(&RESTART_VERSION.to_le_bytes());
        data.extend_from_slice(&self.year.to_le_bytes());
        data.extend_from_slice(&(self.records.len() as u64).to_le_bytes());
        for record in &self.records {
            encode_record(record, &mut data);
        }
        let crc = compute_crc32(&data);

        {
            let mut writer = BufWriter::new(File::create(&temp_path)?);
            writer.write_all(&data)?;
            writer.write_all(&crc.to_le_bytes())?;
            writer.flush()?;
        }
        std::fs::rename(&temp_path, path)?;

        tracing::info!(path = %path.display(), dams = self.records.len(), "写出水库重启文件");
        Ok(())
    }

    /// 从文件加载，校验 CRC
    pub fn load(path: &Path) -> CheckpointResult<Self> {
        let mut all_data = Vec::new();
        BufReader::new(File::open(path)?).read_to_end(&mut all_data)?;

        if all_data.len() < 4 + 4 + 4 + 8 + 4 {
            return Err(CheckpointError::Format("文件太小".into()));
        }
        let crc_offset = all_data.len() - 4;
        let (data, crc_bytes) = all_data.split_at(crc_offset);
        let mut stored = [0u8; 4];
        stored.copy_from_slice(crc_bytes);
        let stored_crc = u32::from_le_bytes(stored);
        let computed_crc = compute_crc32(data);
        if stored_crc != computed_crc {
            return Err(CheckpointError::Checksum {
                expected: stored_crc,
                found: computed_crc,
            });
        }

        let mut cursor = Cursor::new(data);
        if cursor.take::<4>()? != *RESTART_MAGIC {
            return Err(CheckpointError::Format("无效的重启文件格式".into()));
        }
        let version = u32::from_le_bytes(cursor.take::<4>()?);
        if version > RESTART_VERSION {
            return Err(CheckpointError::Version {
                file: version,
                current: RESTART_VERSION,
            });
        }
        let year = i32::from_le_bytes(cursor.take::<4>()?);
        let count = u64::from_le_bytes(cursor.take::<8>()?) as usize;

        let mut records = Vec::with_capacity(count.min(data.len()));
        for _ in 0..count {
            records.push(decode_record(&mut cursor)?);
        }
        if !cursor.is_empty() {
            return Err(CheckpointError::Format("记录之后存在多余数据".into()));
        }
        Ok(Self { year, records })
    }
}

// ============================================================
// 编解码
// ============================================================

fn encode_record(record: &ReservoirRestart, data: &mut Vec<u8>) {
    data.extend_from_slice(BLOCK_TAG);
    data.extend_from_slice(&record.cell.to_le_bytes());
    for value in [
        record.reservoir_fraction,
        record.carbon_pool,
        record.nitrogen_pool,
        record.stored_mass,
        record.k_rls,
        record.target_release_year,
        record.capacity,
    ] {
        data.extend_from_slice(&value.to_le_bytes());
    }
    for value in record
        .irrigation_buffer
        .iter()
        .chain(&record.target_release_month)
    {
        data.extend_from_slice(&value.to_le_bytes());
    }
    for history in [&record.demand_hist, &record.inflow_hist, &record.level_hist] {
        for value in history.iter().flatten() {
            data.extend_from_slice(&value.to_le_bytes());
        }
    }
}

fn decode_record(cursor: &mut Cursor<'_>) -> CheckpointResult<ReservoirRestart> {
    if cursor.take::<4>()? != *BLOCK_TAG {
        return Err(CheckpointError::Format("缺少水库记录块名".into()));
    }
    let mut record = ReservoirRestart {
        cell: u64::from_le_bytes(cursor.take::<8>()?),
        ..Default::default()
    };
    record.reservoir_fraction = cursor.f64()?;
    record.carbon_pool = cursor.f64()?;
    record.nitrogen_pool = cursor.f64()?;
    record.stored_mass = cursor.f64()?;
    record.k_rls = cursor.f64()?;
    record.target_release_year = cursor.f64()?;
    record.capacity = cursor.f64()?;
    for value in &mut record.irrigation_buffer {
        *value = cursor.f64()?;
    }
    for value in &mut record.target_release_month {
        *value = cursor.f64()?;
    }
    for history in [
        &mut record.demand_hist,
        &mut record.inflow_hist,
        &mut record.level_hist,
    ] {
        for value in history.iter_mut().flatten() {
            *value = cursor.f64()?;
        }
    }
    Ok(record)
}

/// 按顺序读取字节的游标，越界返回格式错误
struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take<const N: usize>(&mut self) -> CheckpointResult<[u8; N]> {
        let end = self.offset + N;
        let slice = self
            .data
            .get(self.offset..end)
            .ok_or_else(|| CheckpointError::Format(format!("数据在偏移 {} 处截断", self.offset)))?;
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(slice);
        self.offset = end;
        Ok(bytes)
    }

    fn f64(&mut self) -> CheckpointResult<f64> {
        Ok(f64::from_le_bytes(self.take::<8>()?))
    }

    fn is_empty(&self) -> bool {
        self.offset == self.data.len()
    }
}

// ============================================================
// CRC32
// ============================================================

/// 计算 CRC32 校验和（IEEE 多项式）
fn compute_crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        let index = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = CRC32_TABLE[index] ^ (crc >> 8);
    }
    !crc
}

/// 生成 CRC32 查找表（编译期计算）
const fn generate_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 1 != 0 { 0xEDB8_8320 ^ (crc >> 1) } else { crc >> 1 };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const CRC32_TABLE: [u32; 256] = generate_crc32_table();
