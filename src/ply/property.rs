use byteorder::ByteOrder;
use ply_rs::ply::ScalarType;

/// Width in bytes of a scalar property.
pub fn scalar_size(scalar: &ScalarType) -> usize {
    match scalar {
        ScalarType::Char | ScalarType::UChar => 1,
        ScalarType::Short | ScalarType::UShort => 2,
        ScalarType::Int | ScalarType::UInt | ScalarType::Float => 4,
        ScalarType::Double => 8,
    }
}

/// A fixed-width field of a vertex record.
#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub scalar: ScalarType,
    /// Byte offset inside the record.
    pub offset: usize,
}

impl Property {
    pub fn size(&self) -> usize {
        scalar_size(&self.scalar)
    }

    pub fn bytes<'a>(&self, record: &'a [u8]) -> &'a [u8] {
        &record[self.offset..self.offset + self.size()]
    }

    /// Converts the field to `f64` according to its declared type.
    pub fn decode<B: ByteOrder>(&self, record: &[u8]) -> f64 {
        let bytes = self.bytes(record);
        match self.scalar {
            ScalarType::Char => bytes[0] as i8 as f64,
            ScalarType::UChar => bytes[0] as f64,
            ScalarType::Short => B::read_i16(bytes) as f64,
            ScalarType::UShort => B::read_u16(bytes) as f64,
            ScalarType::Int => B::read_i32(bytes) as f64,
            ScalarType::UInt => B::read_u32(bytes) as f64,
            ScalarType::Float => B::read_f32(bytes) as f64,
            ScalarType::Double => B::read_f64(bytes),
        }
    }

    /// Colour channel; 8-bit values pass through, wider ones are scaled down
    /// when they exceed the 8-bit range.
    pub fn decode_color<B: ByteOrder>(&self, record: &[u8]) -> u8 {
        match self.scalar {
            ScalarType::Char | ScalarType::UChar => self.bytes(record)[0],
            _ => {
                let value = self.decode::<B>(record);
                let value = if value > 255.0 { value / 256.0 } else { value };
                value.clamp(0.0, 255.0) as u8
            }
        }
    }
}
