//! # Declarative Binary Serializer
//!
//! Field-based pack/unpack over a byte buffer. A builder accumulates ordered
//! fields, each with a fixed byte width and a pair of get/set accessors into
//! the owning struct. `pack` writes fields in declaration order, `unpack`
//! reads them back in the same order. Only fixed-width fields are supported;
//! variable-length components (protobuf bodies) are appended outside the
//! serializer.

use crate::error::{ProtocolError, Result};

/// Endianness applied to every numeric field of a serializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

struct Field<O> {
    width: usize,
    write: Box<dyn Fn(&O, &mut Vec<u8>, ByteOrder) + Send + Sync>,
    read: Box<dyn Fn(&mut O, &[u8], ByteOrder) + Send + Sync>,
}

/// An ordered set of fixed-width fields over an owner type `O`.
pub struct Serializer<O> {
    order: ByteOrder,
    fields: Vec<Field<O>>,
}

impl<O> Serializer<O> {
    pub fn builder(order: ByteOrder) -> SerializerBuilder<O> {
        SerializerBuilder {
            serializer: Serializer {
                order,
                fields: Vec::new(),
            },
        }
    }

    /// Total byte width of all declared fields.
    pub fn size(&self) -> usize {
        self.fields.iter().map(|f| f.width).sum()
    }

    /// Write all fields of `owner` in declaration order into a fresh buffer.
    pub fn pack(&self, owner: &O) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        for field in &self.fields {
            (field.write)(owner, &mut buf, self.order);
        }
        buf
    }

    /// Read all fields in declaration order from `data` into `owner`.
    ///
    /// Fails if `data` is shorter than the declared width; trailing bytes
    /// are ignored so headers can be unpacked from a full message buffer.
    pub fn unpack(&self, owner: &mut O, data: &[u8]) -> Result<()> {
        if data.len() < self.size() {
            return Err(ProtocolError::MalformedMessage(format!(
                "buffer too short: {} bytes, need {}",
                data.len(),
                self.size()
            )));
        }

        let mut offset = 0;
        for field in &self.fields {
            (field.read)(owner, &data[offset..offset + field.width], self.order);
            offset += field.width;
        }
        Ok(())
    }
}

macro_rules! numeric_field {
    ($fn_name:ident, $ty:ty, $width:expr) => {
        pub fn $fn_name(
            mut self,
            getter: impl Fn(&O) -> $ty + Send + Sync + 'static,
            setter: impl Fn(&mut O, $ty) + Send + Sync + 'static,
        ) -> Self {
            self.serializer.fields.push(Field {
                width: $width,
                write: Box::new(move |owner, buf, order| {
                    let value = getter(owner);
                    match order {
                        ByteOrder::Little => buf.extend_from_slice(&value.to_le_bytes()),
                        ByteOrder::Big => buf.extend_from_slice(&value.to_be_bytes()),
                    }
                }),
                read: Box::new(move |owner, data, order| {
                    let mut raw = [0u8; $width];
                    raw.copy_from_slice(data);
                    let value = match order {
                        ByteOrder::Little => <$ty>::from_le_bytes(raw),
                        ByteOrder::Big => <$ty>::from_be_bytes(raw),
                    };
                    setter(owner, value);
                }),
            });
            self
        }
    };
}

/// Builder collecting fields in declaration order.
pub struct SerializerBuilder<O> {
    serializer: Serializer<O>,
}

impl<O> SerializerBuilder<O> {
    numeric_field!(u8_field, u8, 1);
    numeric_field!(u16_field, u16, 2);
    numeric_field!(i32_field, i32, 4);
    numeric_field!(u32_field, u32, 4);
    numeric_field!(i64_field, i64, 8);
    numeric_field!(u64_field, u64, 8);

    /// Fixed-length byte array field.
    pub fn bytes_field(
        mut self,
        width: usize,
        getter: impl Fn(&O) -> Vec<u8> + Send + Sync + 'static,
        setter: impl Fn(&mut O, Vec<u8>) + Send + Sync + 'static,
    ) -> Self {
        self.serializer.fields.push(Field {
            width,
            write: Box::new(move |owner, buf, _| {
                let mut value = getter(owner);
                value.resize(width, 0);
                buf.extend_from_slice(&value);
            }),
            read: Box::new(move |owner, data, _| setter(owner, data.to_vec())),
        });
        self
    }

    /// Fixed-length string field, zero-padded on write, trailing NULs
    /// stripped on read.
    pub fn string_field(
        mut self,
        width: usize,
        getter: impl Fn(&O) -> String + Send + Sync + 'static,
        setter: impl Fn(&mut O, String) + Send + Sync + 'static,
    ) -> Self {
        self.serializer.fields.push(Field {
            width,
            write: Box::new(move |owner, buf, _| {
                let mut raw = getter(owner).into_bytes();
                raw.resize(width, 0);
                buf.extend_from_slice(&raw);
            }),
            read: Box::new(move |owner, data, _| {
                let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
                setter(owner, String::from_utf8_lossy(&data[..end]).into_owned());
            }),
        });
        self
    }

    pub fn build(self) -> Serializer<O> {
        self.serializer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Sample {
        kind: i32,
        flags: u8,
        version: u16,
        job: i64,
        tag: Vec<u8>,
        name: String,
    }

    fn sample_serializer() -> Serializer<Sample> {
        Serializer::builder(ByteOrder::Little)
            .i32_field(|s: &Sample| s.kind, |s, v| s.kind = v)
            .u8_field(|s| s.flags, |s, v| s.flags = v)
            .u16_field(|s| s.version, |s, v| s.version = v)
            .i64_field(|s| s.job, |s, v| s.job = v)
            .bytes_field(4, |s| s.tag.clone(), |s, v| s.tag = v)
            .string_field(8, |s| s.name.clone(), |s, v| s.name = v)
            .build()
    }

    #[test]
    fn size_is_sum_of_field_widths() {
        assert_eq!(sample_serializer().size(), 4 + 1 + 2 + 8 + 4 + 8);
    }

    #[test]
    fn pack_unpack_round_trips_bit_for_bit() {
        let original = Sample {
            kind: -7,
            flags: 0xAB,
            version: 0x0102,
            job: i64::MIN + 3,
            tag: vec![1, 2, 3, 4],
            name: "steam".to_string(),
        };

        let serializer = sample_serializer();
        let packed = serializer.pack(&original);
        assert_eq!(packed.len(), serializer.size());

        let mut restored = Sample::default();
        serializer.unpack(&mut restored, &packed).unwrap();
        assert_eq!(restored, original);

        // And the bytes themselves round-trip.
        assert_eq!(serializer.pack(&restored), packed);
    }

    #[test]
    fn little_endian_layout_is_exact() {
        let serializer = Serializer::builder(ByteOrder::Little)
            .i32_field(|s: &Sample| s.kind, |s, v| s.kind = v)
            .build();
        assert_eq!(
            serializer.pack(&Sample {
                kind: 0x31305456,
                ..Sample::default()
            }),
            vec![0x56, 0x54, 0x30, 0x31]
        );
    }

    #[test]
    fn unpack_rejects_short_buffer() {
        let mut sample = Sample::default();
        assert!(sample_serializer().unpack(&mut sample, &[0; 4]).is_err());
    }

    #[test]
    fn unpack_ignores_trailing_bytes() {
        let serializer = Serializer::builder(ByteOrder::Little)
            .u16_field(|s: &Sample| s.version, |s, v| s.version = v)
            .build();
        let mut sample = Sample::default();
        serializer
            .unpack(&mut sample, &[0x34, 0x12, 0xFF, 0xFF])
            .unwrap();
        assert_eq!(sample.version, 0x1234);
    }
}
