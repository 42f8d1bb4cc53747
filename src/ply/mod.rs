//! Binary PLY vertex reader.
//!
//! The header is parsed with `ply_rs`; the body is streamed record by record so
//! the cloud never has to fit in memory. Only the scalar properties of the
//! `vertex` element are decoded: `x`, `y`, `z` become the position and `red`,
//! `green`, `blue` the colour.

pub mod property;

use crate::octree::aabb::Aabb;
use crate::point::PointData;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use glam::{DVec3, U8Vec3};
use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, ElementDef, Encoding, Header, PropertyType};
use property::{scalar_size, Property};
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, ErrorKind, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ReadPlyError {
    #[error("Failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Header is not terminated by end_header")]
    MissingEndHeader,

    #[error("Header declares no vertex property")]
    NoProperties,

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported property: {0}")]
    UnsupportedProperty(String),

    #[error("Truncated record at vertex {index}")]
    TruncatedRecord { index: u64 },

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

/// Vertex layout extracted from a PLY header.
#[derive(Debug, Clone, Default)]
pub struct PlyHeader {
    pub endianness: Endianness,
    pub vertex_count: u64,
    pub properties: Vec<Property>,
    pub comments: Vec<String>,
    /// Body bytes of the elements declared before `vertex`.
    pub skip_bytes: u64,
}

impl PlyHeader {
    /// Consumes the header, up to and including the `end_header` line.
    pub fn parse<R: BufRead>(reader: &mut R) -> Result<Self, ReadPlyError> {
        let bytes = read_header_bytes(reader)?;
        let header = Parser::<DefaultElement>::new()
            .read_header(&mut Cursor::new(bytes))
            .map_err(|error| ReadPlyError::InvalidHeader(error.to_string()))?;

        Self::from_ply(&header)
    }

    fn from_ply(header: &Header) -> Result<Self, ReadPlyError> {
        let endianness = match header.encoding {
            Encoding::BinaryLittleEndian => Endianness::Little,
            Encoding::BinaryBigEndian => Endianness::Big,
            Encoding::Ascii => return Err(ReadPlyError::UnsupportedFormat("ascii".to_string())),
        };

        let mut skip_bytes = 0u64;
        let mut vertex = None;
        for element in header.elements.values() {
            if element.name == "vertex" {
                vertex = Some(element);
                break;
            }
            skip_bytes += element.count as u64 * element_record_size(element)? as u64;
        }
        let Some(vertex) = vertex else {
            return Err(ReadPlyError::NoProperties);
        };

        let mut properties = Vec::with_capacity(vertex.properties.len());
        let mut offset = 0;
        for definition in vertex.properties.values() {
            let PropertyType::Scalar(scalar) = &definition.data_type else {
                return Err(ReadPlyError::UnsupportedProperty(format!(
                    "list property {} in vertex",
                    definition.name
                )));
            };
            let property = Property {
                name: definition.name.clone(),
                scalar: scalar.clone(),
                offset,
            };
            offset += property.size();
            properties.push(property);
        }

        if properties.is_empty() {
            return Err(ReadPlyError::NoProperties);
        }

        Ok(Self {
            endianness,
            vertex_count: vertex.count as u64,
            properties,
            comments: header.comments.clone(),
            skip_bytes,
        })
    }

    /// Size of one vertex record in bytes.
    pub fn record_size(&self) -> usize {
        self.properties.iter().map(Property::size).sum()
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|property| property.name == name)
    }
}

/// Header lines up to `end_header`; the body stays in `reader`.
fn read_header_bytes<R: BufRead>(reader: &mut R) -> Result<Vec<u8>, ReadPlyError> {
    let mut bytes = Vec::new();
    loop {
        let start = bytes.len();
        if reader.read_until(b'\n', &mut bytes)? == 0 {
            return Err(ReadPlyError::MissingEndHeader);
        }
        if bytes[start..].trim_ascii() == b"end_header" {
            return Ok(bytes);
        }
    }
}

/// Record size of an element preceding the vertices; list properties have no
/// fixed size and cannot be skipped.
fn element_record_size(element: &ElementDef) -> Result<usize, ReadPlyError> {
    element
        .properties
        .values()
        .map(|definition| match &definition.data_type {
            PropertyType::Scalar(scalar) => Ok(scalar_size(scalar)),
            PropertyType::List(..) => Err(ReadPlyError::UnsupportedProperty(format!(
                "list property {} in element {} before vertex",
                definition.name, element.name
            ))),
        })
        .sum()
}

/// Properties feeding a point; absent ones decode as zero.
#[derive(Debug, Clone)]
struct FieldMap {
    position: [Option<Property>; 3],
    color: [Option<Property>; 3],
}

impl FieldMap {
    fn new(header: &PlyHeader) -> Self {
        let lookup = |name: &str| header.property(name).cloned();
        Self {
            position: [lookup("x"), lookup("y"), lookup("z")],
            color: [lookup("red"), lookup("green"), lookup("blue")],
        }
    }

    fn decode<B: ByteOrder>(&self, record: &[u8]) -> PointData {
        let coord = |field: &Option<Property>| {
            field
                .as_ref()
                .map_or(0.0, |property| property.decode::<B>(record))
        };
        let channel = |field: &Option<Property>| {
            field
                .as_ref()
                .map_or(0, |property| property.decode_color::<B>(record))
        };

        PointData::new(
            DVec3::new(
                coord(&self.position[0]),
                coord(&self.position[1]),
                coord(&self.position[2]),
            ),
            U8Vec3::new(
                channel(&self.color[0]),
                channel(&self.color[1]),
                channel(&self.color[2]),
            ),
        )
    }
}

/// Streams the vertices of a binary PLY file, growing a bounding box as it goes.
pub struct PlyReader<R> {
    reader: R,
    header: PlyHeader,
    fields: FieldMap,
    record: Vec<u8>,
    points_read: u64,
    aabb: Aabb,
    done: bool,
}

impl PlyReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReadPlyError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ReadPlyError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        Self::new(BufReader::new(file))
    }
}

impl<R: BufRead> PlyReader<R> {
    pub fn new(mut reader: R) -> Result<Self, ReadPlyError> {
        let header = PlyHeader::parse(&mut reader)?;
        debug!(
            properties = header.properties.len(),
            record_size = header.record_size(),
            vertex_count = header.vertex_count,
            skip_bytes = header.skip_bytes,
            endianness = ?header.endianness,
            "parsed ply header"
        );

        if header.skip_bytes > 0 {
            let skipped = std::io::copy(
                &mut reader.by_ref().take(header.skip_bytes),
                &mut std::io::sink(),
            )?;
            if skipped < header.skip_bytes {
                return Err(ReadPlyError::TruncatedRecord { index: 0 });
            }
        }

        Ok(Self {
            fields: FieldMap::new(&header),
            record: vec![0; header.record_size()],
            reader,
            header,
            points_read: 0,
            aabb: Aabb::empty(),
            done: false,
        })
    }

    pub fn header(&self) -> &PlyHeader {
        &self.header
    }

    /// Bounding box of the positions read so far.
    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    pub fn points_read(&self) -> u64 {
        self.points_read
    }

    /// Reads the next vertex, `None` once the declared count is reached.
    pub fn read_point(&mut self) -> Result<Option<PointData>, ReadPlyError> {
        if self.points_read >= self.header.vertex_count {
            return Ok(None);
        }

        match self.reader.read_exact(&mut self.record) {
            Ok(()) => {}
            Err(error) if error.kind() == ErrorKind::UnexpectedEof => {
                return Err(ReadPlyError::TruncatedRecord {
                    index: self.points_read,
                });
            }
            Err(error) => return Err(error.into()),
        }

        let point = match self.header.endianness {
            Endianness::Little => self.fields.decode::<LittleEndian>(&self.record),
            Endianness::Big => self.fields.decode::<BigEndian>(&self.record),
        };

        self.aabb.update(point.position);
        self.points_read += 1;

        Ok(Some(point))
    }
}

impl<R: BufRead> Iterator for PlyReader<R> {
    type Item = Result<PointData, ReadPlyError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let next = self.read_point().transpose();
        if !matches!(next, Some(Ok(_))) {
            self.done = true;
        }
        next
    }
}

/// All points of a PLY file and their bounding box.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    pub points: Vec<PointData>,
    pub aabb: Aabb,
}

impl PointCloud {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

pub fn read_ply(path: impl AsRef<Path>) -> Result<PointCloud, ReadPlyError> {
    let mut reader = PlyReader::open(path)?;
    let capacity = reader.header().vertex_count.min(1 << 24) as usize;
    let mut points = Vec::with_capacity(capacity);

    while let Some(point) = reader.read_point()? {
        points.push(point);
    }

    Ok(PointCloud {
        points,
        aabb: reader.aabb(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLOR_PROPERTIES: &str =
        "property uchar red\nproperty uchar green\nproperty uchar blue\nend_header\n";

    fn double_header(count: u64) -> String {
        format!(
            "ply\nformat binary_little_endian 1.0\ncomment generated\nelement vertex {count}\n\
             property double x\nproperty double y\nproperty double z\n{COLOR_PROPERTIES}"
        )
    }

    fn double_record(p: [f64; 3], c: [u8; 3]) -> Vec<u8> {
        let mut buf = Vec::new();
        for v in p {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf.extend_from_slice(&c);
        buf
    }

    fn reader(bytes: Vec<u8>) -> Result<PlyReader<Cursor<Vec<u8>>>, ReadPlyError> {
        PlyReader::new(Cursor::new(bytes))
    }

    #[test]
    fn header_layout() {
        let mut cursor = Cursor::new(double_header(2).into_bytes());
        let header = PlyHeader::parse(&mut cursor).unwrap();

        assert_eq!(header.endianness, Endianness::Little);
        assert_eq!(header.vertex_count, 2);
        assert_eq!(header.comments.len(), 1);
        assert!(header.comments[0].contains("generated"));
        assert_eq!(header.record_size(), 27);
        assert_eq!(header.skip_bytes, 0);
        assert_eq!(header.property("z").unwrap().offset, 16);
        assert_eq!(header.property("blue").unwrap().offset, 26);
    }

    #[test]
    fn reads_double_records() {
        let mut bytes = double_header(2).into_bytes();
        bytes.extend(double_record([1.0, -2.0, 3.5], [10, 20, 30]));
        bytes.extend(double_record([-4.0, 5.0, 0.25], [255, 0, 1]));

        let mut reader = reader(bytes).unwrap();
        let points: Vec<PointData> = reader.by_ref().collect::<Result<_, _>>().unwrap();

        assert_eq!(
            points,
            vec![
                PointData::new(DVec3::new(1.0, -2.0, 3.5), U8Vec3::new(10, 20, 30)),
                PointData::new(DVec3::new(-4.0, 5.0, 0.25), U8Vec3::new(255, 0, 1)),
            ]
        );
        assert_eq!(reader.points_read(), 2);
        assert_eq!(
            reader.aabb(),
            Aabb::new(DVec3::new(-4.0, -2.0, 0.25), DVec3::new(1.0, 5.0, 3.5))
        );
    }

    #[test]
    fn float_big_endian_with_extra_properties() {
        let mut bytes = b"ply\nformat binary_big_endian 1.0\nelement vertex 1\n\
            property float x\nproperty float y\nproperty float z\n\
            property float nx\nproperty ushort red\nproperty ushort green\nproperty ushort blue\n\
            element face 0\nproperty list uchar int vertex_indices\nend_header\n"
            .to_vec();
        for v in [0.5f32, -1.25, 8.0, 9.0] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        for c in [65535u16, 128, 1024] {
            bytes.extend_from_slice(&c.to_be_bytes());
        }

        let mut reader = reader(bytes).unwrap();
        assert_eq!(reader.header().endianness, Endianness::Big);
        assert_eq!(reader.header().record_size(), 22);

        let point = reader.read_point().unwrap().unwrap();
        assert_eq!(point.position, DVec3::new(0.5, -1.25, 8.0));
        assert_eq!(point.color, U8Vec3::new(255, 128, 4));
        assert!(reader.read_point().unwrap().is_none());
    }

    #[test]
    fn vertex_count_bounds_the_body() {
        let mut bytes = double_header(1).into_bytes();
        bytes.extend(double_record([1.0, 1.0, 1.0], [1, 1, 1]));
        // trailing element data must not be read as vertices
        bytes.extend([0u8; 40]);

        let points: Vec<_> = reader(bytes).unwrap().collect();
        assert_eq!(points.len(), 1);
        assert!(points[0].is_ok());
    }

    #[test]
    fn elements_before_vertex_are_skipped() {
        let mut bytes = format!(
            "ply\nformat binary_little_endian 1.0\n\
             element material 2\nproperty uchar id\nproperty float shine\n\
             element vertex 1\nproperty double x\nproperty double y\nproperty double z\n\
             {COLOR_PROPERTIES}"
        )
        .into_bytes();
        // two 5-byte material records that would corrupt the vertex if read
        bytes.extend([0xffu8; 10]);
        bytes.extend(double_record([1.0, 2.0, 3.0], [4, 5, 6]));

        let mut reader = reader(bytes).unwrap();
        assert_eq!(reader.header().skip_bytes, 10);

        let point = reader.read_point().unwrap().unwrap();
        assert_eq!(point.position, DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(point.color, U8Vec3::new(4, 5, 6));
        assert!(reader.read_point().unwrap().is_none());
    }

    #[test]
    fn list_element_before_vertex_is_rejected() {
        let bytes = format!(
            "ply\nformat binary_little_endian 1.0\n\
             element face 1\nproperty list uchar int vertex_indices\n\
             element vertex 1\nproperty double x\nproperty double y\nproperty double z\n\
             {COLOR_PROPERTIES}"
        )
        .into_bytes();

        assert!(matches!(
            reader(bytes),
            Err(ReadPlyError::UnsupportedProperty(_))
        ));
    }

    #[test]
    fn truncated_record() {
        let mut bytes = double_header(3).into_bytes();
        bytes.extend(double_record([1.0, 2.0, 3.0], [1, 2, 3]));
        bytes.extend([0u8; 10]);

        let results: Vec<_> = reader(bytes).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[1],
            Err(ReadPlyError::TruncatedRecord { index: 1 })
        ));
    }

    #[test]
    fn missing_records_for_declared_count() {
        let mut bytes = double_header(3).into_bytes();
        bytes.extend(double_record([1.0, 2.0, 3.0], [1, 2, 3]));

        let mut reader = reader(bytes).unwrap();
        assert!(reader.read_point().unwrap().is_some());
        assert!(matches!(
            reader.read_point(),
            Err(ReadPlyError::TruncatedRecord { index: 1 })
        ));
    }

    #[test]
    fn header_errors() {
        let missing_end = b"ply\nformat binary_little_endian 1.0\nelement vertex 1\n\
            property double x\n"
            .to_vec();
        assert!(matches!(reader(missing_end), Err(ReadPlyError::MissingEndHeader)));

        let no_properties = b"ply\nformat binary_little_endian 1.0\nelement vertex 0\nend_header\n".to_vec();
        assert!(matches!(reader(no_properties), Err(ReadPlyError::NoProperties)));

        let no_vertex = b"ply\nformat binary_little_endian 1.0\nelement face 0\n\
            property uchar id\nend_header\n"
            .to_vec();
        assert!(matches!(reader(no_vertex), Err(ReadPlyError::NoProperties)));

        let ascii = b"ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\nend_header\n".to_vec();
        assert!(matches!(reader(ascii), Err(ReadPlyError::UnsupportedFormat(f)) if f == "ascii"));

        let list = b"ply\nformat binary_little_endian 1.0\nelement vertex 1\n\
            property list uchar int x\nend_header\n"
            .to_vec();
        assert!(matches!(reader(list), Err(ReadPlyError::UnsupportedProperty(_))));

        let bad_count = b"ply\nformat binary_little_endian 1.0\nelement vertex many\n\
            property double x\nend_header\n"
            .to_vec();
        assert!(matches!(reader(bad_count), Err(ReadPlyError::InvalidHeader(_))));
    }

    #[test]
    fn read_ply_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.ply");
        let mut bytes = double_header(2).into_bytes();
        bytes.extend(double_record([0.0, 0.0, 0.0], [0, 0, 0]));
        bytes.extend(double_record([2.0, 4.0, 6.0], [9, 9, 9]));
        std::fs::write(&path, bytes).unwrap();

        let cloud = read_ply(&path).unwrap();
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.aabb.size(), DVec3::new(2.0, 4.0, 6.0));

        let missing = read_ply(dir.path().join("missing.ply"));
        assert!(matches!(missing, Err(ReadPlyError::Open { .. })));
    }
}
