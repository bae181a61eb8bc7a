// crates/hn_io/src/clm.rs

//! CLM 二进制输入文件头
//!
//! 栅格输入文件以一个标识字符串开头，其后是版本号和按版本扩展的文件头字段，
//! 然后是按单元顺序排列的定长记录。
//!
//! # 文件头格式
//!
//! ```text
//! [标识: N bytes]        如 "LPJDAMS"、"LPJDRAI"
//! [版本: i32]
//! [order, first_year, n_year, first_cell, n_cell, n_bands: 6 × i32]   v1
//! [cellsize_lon: f32, scalar: f32]                                    v2 起
//! [cellsize_lat: f32, datatype: i32]                                  v3 起
//! ```
//!
//! # 字节序检测
//!
//! 版本号很小，按本文件约定的小端读取时低字节为零，就说明文件是大端写出的，
//! 之后的所有字段都需要按大端解码。

use std::io::{Read, Write};

use crate::error::{IoError, IoResult};

/// 水库输入文件标识
pub const HEADER_RESERVOIR: &str = "LPJDAMS";

/// 汇流（河网）输入文件标识
pub const HEADER_DRAINAGE: &str = "LPJDRAI";

/// 当前写出的文件头版本
pub const CLM_VERSION: i32 = 3;

/// 文件字节序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// 小端
    Little,
    /// 大端
    Big,
}

impl ByteOrder {
    /// 解码 i32
    #[inline]
    pub fn i32_from(self, bytes: [u8; 4]) -> i32 {
        match self {
            ByteOrder::Little => i32::from_le_bytes(bytes),
            ByteOrder::Big => i32::from_be_bytes(bytes),
        }
    }

    /// 解码 f32
    #[inline]
    pub fn f32_from(self, bytes: [u8; 4]) -> f32 {
        f32::from_bits(self.i32_from(bytes) as u32)
    }

    /// 编码 i32
    #[inline]
    pub fn i32_to(self, value: i32) -> [u8; 4] {
        match self {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        }
    }

    /// 编码 f32
    #[inline]
    pub fn f32_to(self, value: f32) -> [u8; 4] {
        self.i32_to(value.to_bits() as i32)
    }
}

/// 文件头
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClmHeader {
    /// 文件头版本
    pub version: i32,
    /// 数据排列顺序
    pub order: i32,
    /// 起始年份
    pub first_year: i32,
    /// 年数
    pub n_year: i32,
    /// 文件中第一个单元的全局编号
    pub first_cell: i32,
    /// 文件中的单元数
    pub n_cell: i32,
    /// 每个单元的波段数
    pub n_bands: i32,
    /// 经向分辨率 [度]
    pub cellsize_lon: f32,
    /// 数据缩放系数
    pub scalar: f32,
    /// 纬向分辨率 [度]
    pub cellsize_lat: f32,
    /// 数据类型编码
    pub datatype: i32,
}

impl ClmHeader {
    /// 当前版本的文件头，起始单元为 0
    pub fn new(n_cell: i32, n_bands: i32) -> Self {
        Self {
            version: CLM_VERSION,
            order: 1,
            first_year: 0,
            n_year: 1,
            first_cell: 0,
            n_cell,
            n_bands,
            cellsize_lon: 0.5,
            scalar: 1.0,
            cellsize_lat: 0.5,
            datatype: 2,
        }
    }

    /// 文件头在文件中占用的字节数（含标识）
    pub fn encoded_len(&self, id: &str) -> usize {
        let fields = match self.version {
            1 => 6,
            2 => 8,
            _ => 10,
        };
        id.len() + 4 + 4 * fields
    }
}

fn read_word<R: Read>(reader: &mut R) -> IoResult<[u8; 4]> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

/// 读取并校验文件头，返回文件头与检测到的字节序
pub fn read_header<R: Read>(reader: &mut R, id: &str, file: &str) -> IoResult<(ClmHeader, ByteOrder)> {
    let mut found = vec![0u8; id.len()];
    reader.read_exact(&mut found)?;
    if found != id.as_bytes() {
        return Err(IoError::Header {
            file: file.to_string(),
            expected: id.to_string(),
            found: String::from_utf8_lossy(&found).into_owned(),
        });
    }

    let version_bytes = read_word(reader)?;
    let mut order = ByteOrder::Little;
    let mut version = order.i32_from(version_bytes);
    if version & 0xff == 0 {
        order = ByteOrder::Big;
        version = order.i32_from(version_bytes);
    }
    if !(1..=CLM_VERSION).contains(&version) {
        return Err(IoError::UnsupportedVersion {
            file: file.to_string(),
            version,
        });
    }

    let mut ints = [0i32; 6];
    for value in &mut ints {
        *value = order.i32_from(read_word(reader)?);
    }
    let mut header = ClmHeader {
        version,
        order: ints[0],
        first_year: ints[1],
        n_year: ints[2],
        first_cell: ints[3],
        n_cell: ints[4],
        n_bands: ints[5],
        cellsize_lon: 0.5,
        scalar: 1.0,
        cellsize_lat: 0.5,
        datatype: 1,
    };
    if version >= 2 {
        header.cellsize_lon = order.f32_from(read_word(reader)?);
        header.scalar = order.f32_from(read_word(reader)?);
        header.cellsize_lat = header.cellsize_lon;
    }
    if version >= 3 {
        header.cellsize_lat = order.f32_from(read_word(reader)?);
        header.datatype = order.i32_from(read_word(reader)?);
    }
    tracing::debug!(file, version, ?order, n_cell = header.n_cell, "读取文件头");
    Ok((header, order))
}

/// 写出文件头
pub fn write_header<W: Write>(
    writer: &mut W,
    id: &str,
    header: &ClmHeader,
    order: ByteOrder,
) -> IoResult<()> {
    writer.write_all(id.as_bytes())?;
    writer.write_all(&order.i32_to(header.version))?;
    for value in [
        header.order,
        header.first_year,
        header.n_year,
        header.first_cell,
        header.n_cell,
        header.n_bands,
    ] {
        writer.write_all(&order.i32_to(value))?;
    }
    if header.version >= 2 {
        writer.write_all(&order.f32_to(header.cellsize_lon))?;
        writer.write_all(&order.f32_to(header.scalar))?;
    }
    if header.version >= 3 {
        writer.write_all(&order.f32_to(header.cellsize_lat))?;
        writer.write_all(&order.i32_to(header.datatype))?;
    }
    Ok(())
}

/// 检查文件是否覆盖请求的单元范围
///
/// 返回文件中实际可读的单元数。起始单元早于文件时报错；
/// 文件单元数不足时只记录警告，由调用方按缺省值处理剩余单元。
pub(crate) fn available_cells(
    header: &ClmHeader,
    first_cell: usize,
    n_cells: usize,
    file: &str,
) -> IoResult<usize> {
    let file_first = usize::try_from(header.first_cell).map_err(|_| IoError::Range {
        file: file.to_string(),
        message: format!("文件起始单元为负: {}", header.first_cell),
    })?;
    let file_cells = usize::try_from(header.n_cell).unwrap_or(0);
    if first_cell < file_first {
        return Err(IoError::Range {
            file: file.to_string(),
            message: format!("请求起始单元 {first_cell} 早于文件起始单元 {file_first}"),
        });
    }
    let available = (file_first + file_cells).saturating_sub(first_cell).min(n_cells);
    if available < n_cells {
        tracing::warn!(
            file,
            requested = n_cells,
            available,
            "文件单元数少于请求数，缺少的单元按缺省处理"
        );
    }
    Ok(available)
}
