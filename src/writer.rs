//! Per-node chunk files: headerless runs of 27-byte point records.
//!
//! Record layout: x, y, z as native-endian `f64`, then red, green, blue bytes.
//! Readers need `meta.json` to know how many records a chunk holds.

use crate::point::PointData;
use binrw::{BinRead, BinReaderExt};
use byteorder::{NativeEndian, WriteBytesExt};
use glam::{DVec3, U8Vec3};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;
use thiserror::Error;

pub const POINT_RECORD_SIZE: usize = 3 * 8 + 3;

#[derive(Error, Debug)]
pub enum ReadChunkError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid binary data")]
    InvalidBinaryData(#[from] binrw::Error),

    #[error("Chunk length {0} is not a multiple of the 27 byte record size")]
    TrailingBytes(usize),
}

#[derive(BinRead, Debug, Clone, Copy)]
struct PointRecord {
    x: f64,
    y: f64,
    z: f64,
    color: [u8; 3],
}

impl From<PointRecord> for PointData {
    fn from(record: PointRecord) -> Self {
        PointData::new(
            DVec3::new(record.x, record.y, record.z),
            U8Vec3::from_array(record.color),
        )
    }
}

/// Appends point records to a chunk file, creating it if needed.
pub struct PointWriter {
    writer: BufWriter<File>,
    num_points: u64,
}

impl PointWriter {
    pub fn append(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;

        Ok(Self {
            writer: BufWriter::new(file),
            num_points: 0,
        })
    }

    pub fn write(&mut self, point: &PointData) -> std::io::Result<()> {
        self.writer.write_f64::<NativeEndian>(point.position.x)?;
        self.writer.write_f64::<NativeEndian>(point.position.y)?;
        self.writer.write_f64::<NativeEndian>(point.position.z)?;
        self.writer.write_all(&point.color.to_array())?;
        self.num_points += 1;
        Ok(())
    }

    pub fn write_all(&mut self, points: &[PointData]) -> std::io::Result<()> {
        for point in points {
            self.write(point)?;
        }
        Ok(())
    }

    pub fn num_points(&self) -> u64 {
        self.num_points
    }

    /// Flushes buffered records and returns how many were written.
    pub fn finish(mut self) -> std::io::Result<u64> {
        self.writer.flush()?;
        Ok(self.num_points)
    }
}

/// Writes `points` to `path` in one go.
pub fn write_chunk(path: impl AsRef<Path>, points: &[PointData]) -> std::io::Result<u64> {
    let mut writer = PointWriter::append(path)?;
    writer.write_all(points)?;
    writer.finish()
}

pub fn read_chunk(path: impl AsRef<Path>) -> Result<Vec<PointData>, ReadChunkError> {
    let bytes = std::fs::read(path)?;
    parse_chunk(&bytes)
}

pub fn parse_chunk(buf: &[u8]) -> Result<Vec<PointData>, ReadChunkError> {
    if buf.len() % POINT_RECORD_SIZE != 0 {
        return Err(ReadChunkError::TrailingBytes(buf.len()));
    }

    let num_points = buf.len() / POINT_RECORD_SIZE;
    let mut cursor = Cursor::new(buf);
    let mut points = Vec::with_capacity(num_points);

    for _ in 0..num_points {
        let record: PointRecord = cursor.read_ne()?;
        points.push(record.into());
    }

    Ok(points)
}
