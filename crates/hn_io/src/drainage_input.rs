// crates/hn_io/src/drainage_input.rs

//! 河网输入文件
//!
//! 每个单元两个 i32 波段：下游单元的全局编号与河段长度 [m]。
//! 下游编号为负表示出海口或内流终点。

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::clm::{available_cells, read_header, write_header, ByteOrder, ClmHeader, HEADER_DRAINAGE};
use crate::error::{IoError, IoResult};

/// 河网记录的波段数
pub const DRAINAGE_BANDS: i32 = 2;

/// 一个单元的河网记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingRecord {
    /// 下游单元全局编号，负值为出口
    pub index: i32,
    /// 河段长度 [m]
    pub len: i32,
}

impl RoutingRecord {
    /// 出口记录
    pub const OUTLET: RoutingRecord = RoutingRecord { index: -1, len: 0 };
}

/// 读取 `[first_cell, first_cell + n_cells)` 范围的河网记录
///
/// 文件不足时缺少的单元按出口处理。
pub fn read_drainage(path: &Path, first_cell: usize, n_cells: usize) -> IoResult<Vec<RoutingRecord>> {
    let file = path.display().to_string();
    let mut reader = BufReader::new(File::open(path)?);
    let (header, order) = read_header(&mut reader, HEADER_DRAINAGE, &file)?;
    if header.n_bands != DRAINAGE_BANDS {
        return Err(IoError::Bands {
            file,
            expected: DRAINAGE_BANDS,
            found: header.n_bands,
        });
    }
    let available = available_cells(&header, first_cell, n_cells, &file)?;
    let skip = (first_cell - header.first_cell as usize) * 4 * DRAINAGE_BANDS as usize;
    reader.seek_relative(skip as i64)?;

    let mut records = Vec::with_capacity(n_cells);
    let mut bytes = [0u8; 8];
    for cell in 0..available {
        if let Err(err) = reader.read_exact(&mut bytes) {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                tracing::warn!(file = %file, cell = first_cell + cell, "河网文件提前结束");
                break;
            }
            return Err(err.into());
        }
        records.push(RoutingRecord {
            index: order.i32_from([bytes[0], bytes[1], bytes[2], bytes[3]]),
            len: order.i32_from([bytes[4], bytes[5], bytes[6], bytes[7]]),
        });
    }
    records.resize(n_cells, RoutingRecord::OUTLET);
    Ok(records)
}

/// 写出河网文件，文件起始单元为 `first_cell`
pub fn write_drainage(
    path: &Path,
    first_cell: i32,
    records: &[RoutingRecord],
    order: ByteOrder,
) -> IoResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    let mut header = ClmHeader::new(records.len() as i32, DRAINAGE_BANDS);
    header.first_cell = first_cell;
    write_header(&mut writer, HEADER_DRAINAGE, &header, order)?;
    for record in records {
        writer.write_all(&order.i32_to(record.index))?;
        writer.write_all(&order.i32_to(record.len))?;
    }
    writer.flush()?;
    Ok(())
}
