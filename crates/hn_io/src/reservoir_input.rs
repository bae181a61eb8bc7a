// crates/hn_io/src/reservoir_input.rs

//! 水库输入文件
//!
//! 每个单元一条 10 波段、每波段 4 字节的记录：
//!
//! ```text
//! [year: i32] [capacity: f32] [area: f32] [inst_cap: i32] [height: i32] [purpose: 5 × i32]
//! ```
//!
//! 库容在读入时乘以 [`CAPACITY_SCALE`]。`year <= 0` 表示该单元没有大坝。

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use hn_foundation::NPURPOSE;

use crate::clm::{available_cells, read_header, write_header, ByteOrder, ClmHeader, HEADER_RESERVOIR};
use crate::error::{IoError, IoResult};

/// 水库记录的波段数
pub const RESERVOIR_BANDS: i32 = 10;

/// 单条记录的字节数
pub const RESERVOIR_RECORD_LEN: usize = 4 * RESERVOIR_BANDS as usize;

/// 库容换算系数
pub const CAPACITY_SCALE: f64 = 1e12;

/// 一座大坝的静态参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReservoirRecord {
    /// 投入运行的年份
    pub commission_year: i32,
    /// 库容（已换算）
    pub capacity: f64,
    /// 水面面积 [km²]
    pub surface_area: f64,
    /// 装机容量
    pub installed_capacity: i32,
    /// 坝高 [m]
    pub dam_height: i32,
    /// 用途编码，第 0 项为主用途
    pub purposes: [i32; NPURPOSE],
}

impl ReservoirRecord {
    fn decode(bytes: &[u8; RESERVOIR_RECORD_LEN], order: ByteOrder) -> Self {
        let word = |i: usize| -> [u8; 4] {
            [bytes[4 * i], bytes[4 * i + 1], bytes[4 * i + 2], bytes[4 * i + 3]]
        };
        let mut purposes = [0i32; NPURPOSE];
        for (k, purpose) in purposes.iter_mut().enumerate() {
            *purpose = order.i32_from(word(5 + k));
        }
        Self {
            commission_year: order.i32_from(word(0)),
            capacity: f64::from(order.f32_from(word(1))) * CAPACITY_SCALE,
            surface_area: f64::from(order.f32_from(word(2))),
            installed_capacity: order.i32_from(word(3)),
            dam_height: order.i32_from(word(4)),
            purposes,
        }
    }

    fn encode(record: Option<&ReservoirRecord>, order: ByteOrder) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(RESERVOIR_RECORD_LEN);
        match record {
            Some(r) => {
                bytes.extend_from_slice(&order.i32_to(r.commission_year));
                bytes.extend_from_slice(&order.f32_to((r.capacity / CAPACITY_SCALE) as f32));
                bytes.extend_from_slice(&order.f32_to(r.surface_area as f32));
                bytes.extend_from_slice(&order.i32_to(r.installed_capacity));
                bytes.extend_from_slice(&order.i32_to(r.dam_height));
                for &purpose in &r.purposes {
                    bytes.extend_from_slice(&order.i32_to(purpose));
                }
            }
            None => bytes.resize(RESERVOIR_RECORD_LEN, 0),
        }
        bytes
    }
}

/// 读取 `[first_cell, first_cell + n_cells)` 范围内各单元的大坝记录
///
/// 没有大坝的单元为 `None`。
pub fn read_reservoirs(
    path: &Path,
    first_cell: usize,
    n_cells: usize,
) -> IoResult<Vec<Option<ReservoirRecord>>> {
    let file = path.display().to_string();
    let mut reader = BufReader::new(File::open(path)?);
    let (header, order) = read_header(&mut reader, HEADER_RESERVOIR, &file)?;
    if header.n_bands != RESERVOIR_BANDS {
        return Err(IoError::Bands {
            file,
            expected: RESERVOIR_BANDS,
            found: header.n_bands,
        });
    }
    let available = available_cells(&header, first_cell, n_cells, &file)?;
    let skip = (first_cell - header.first_cell as usize) * RESERVOIR_RECORD_LEN;
    reader.seek_relative(skip as i64)?;

    let mut records = Vec::with_capacity(n_cells);
    let mut bytes = [0u8; RESERVOIR_RECORD_LEN];
    for cell in 0..available {
        if let Err(err) = reader.read_exact(&mut bytes) {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                tracing::warn!(file = %file, cell = first_cell + cell, "水库文件提前结束");
                break;
            }
            return Err(err.into());
        }
        let record = ReservoirRecord::decode(&bytes, order);
        records.push((record.commission_year > 0).then_some(record));
    }
    records.resize(n_cells, None);

    let dams = records.iter().filter(|r| r.is_some()).count();
    tracing::info!(file = %file, cells = n_cells, dams, "读取水库输入");
    Ok(records)
}

/// 写出水库输入文件，文件起始单元为 `first_cell`
pub fn write_reservoirs(
    path: &Path,
    first_cell: i32,
    records: &[Option<ReservoirRecord>],
    order: ByteOrder,
) -> IoResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    let mut header = ClmHeader::new(records.len() as i32, RESERVOIR_BANDS);
    header.first_cell = first_cell;
    write_header(&mut writer, HEADER_RESERVOIR, &header, order)?;
    for record in records {
        writer.write_all(&ReservoirRecord::encode(record.as_ref(), order))?;
    }
    writer.flush()?;
    Ok(())
}
