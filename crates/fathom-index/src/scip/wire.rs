//! Bounds-checked protobuf wire reader.
//!
//! Every read is checked against the enclosing frame, so a length prefix that
//! overruns its parent message is reported instead of silently reading into
//! the next record.

use super::{MalformedKind, MalformedStreamError};

/// Protobuf wire types accepted by the SCIP schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WireType {
    Varint,
    Fixed64,
    Len,
    Fixed32,
}

impl WireType {
    pub(crate) fn code(self) -> u8 {
        match self {
            WireType::Varint => 0,
            WireType::Fixed64 => 1,
            WireType::Len => 2,
            WireType::Fixed32 => 5,
        }
    }
}

/// Cursor over one protobuf frame.
///
/// `base` is the absolute offset of `buf[0]` in the original stream, used for
/// error reporting.
#[derive(Debug, Clone)]
pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, base: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub(crate) fn offset(&self) -> usize {
        self.base + self.pos
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn error(&self, kind: MalformedKind) -> MalformedStreamError {
        MalformedStreamError::new(self.offset(), kind)
    }

    pub(crate) fn read_varint(&mut self) -> Result<u64, MalformedStreamError> {
        let start = self.offset();
        let mut value: u64 = 0;
        for i in 0..10 {
            let Some(&byte) = self.buf.get(self.pos) else {
                return Err(MalformedStreamError::new(start, MalformedKind::TruncatedVarint));
            };
            self.pos += 1;
            // The tenth byte may only carry the final bit of a 64-bit value.
            if i == 9 && byte > 1 {
                return Err(MalformedStreamError::new(start, MalformedKind::VarintOverflow));
            }
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(MalformedStreamError::new(start, MalformedKind::VarintOverflow))
    }

    /// Read a field key, returning `(field_number, wire_type)`.
    pub(crate) fn read_tag(&mut self) -> Result<(u32, WireType), MalformedStreamError> {
        let start = self.offset();
        let key = self.read_varint()?;
        let wire_type = match key & 0x7 {
            0 => WireType::Varint,
            1 => WireType::Fixed64,
            2 => WireType::Len,
            5 => WireType::Fixed32,
            other => {
                return Err(MalformedStreamError::new(
                    start,
                    MalformedKind::InvalidWireType(other as u8),
                ))
            }
        };
        let field = key >> 3;
        if field == 0 {
            return Err(MalformedStreamError::new(start, MalformedKind::ZeroFieldNumber));
        }
        let field = u32::try_from(field)
            .map_err(|_| MalformedStreamError::new(start, MalformedKind::FieldNumberOverflow))?;
        Ok((field, wire_type))
    }

    pub(crate) fn read_bytes(&mut self) -> Result<&'a [u8], MalformedStreamError> {
        let start = self.offset();
        let declared = self.read_varint()?;
        let remaining = self.remaining();
        if declared > remaining as u64 {
            return Err(MalformedStreamError::new(
                start,
                MalformedKind::LengthOverrun {
                    declared,
                    remaining,
                },
            ));
        }
        let len = declared as usize;
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Read a length-delimited field as a nested frame.
    pub(crate) fn read_message(&mut self) -> Result<WireReader<'a>, MalformedStreamError> {
        let bytes = self.read_bytes()?;
        // The cursor now sits just past the payload.
        let base = self.offset() - bytes.len();
        Ok(WireReader {
            buf: bytes,
            pos: 0,
            base,
        })
    }

    pub(crate) fn read_string(&mut self) -> Result<String, MalformedStreamError> {
        let start = self.offset();
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| MalformedStreamError::new(start, MalformedKind::InvalidUtf8))
    }

    /// Decode an `int32` varint; negative values arrive sign-extended to 64 bits.
    pub(crate) fn read_int32(&mut self) -> Result<i32, MalformedStreamError> {
        Ok(self.read_varint()? as i64 as i32)
    }

    pub(crate) fn read_bool(&mut self) -> Result<bool, MalformedStreamError> {
        Ok(self.read_varint()? != 0)
    }

    /// Read a repeated `int32` field, accepting both packed and unpacked encodings.
    pub(crate) fn read_repeated_int32(
        &mut self,
        wire_type: WireType,
        out: &mut Vec<i32>,
    ) -> Result<(), MalformedStreamError> {
        match wire_type {
            WireType::Varint => out.push(self.read_int32()?),
            WireType::Len => {
                let mut packed = self.read_message()?;
                while !packed.is_empty() {
                    out.push(packed.read_int32()?);
                }
            }
            other => return Err(self.error(MalformedKind::UnexpectedWireType(other.code()))),
        }
        Ok(())
    }

    fn advance(&mut self, len: usize) -> Result<(), MalformedStreamError> {
        if self.remaining() < len {
            return Err(self.error(MalformedKind::TruncatedFixed));
        }
        self.pos += len;
        Ok(())
    }

    /// Skip an unknown field, still validating its framing.
    pub(crate) fn skip(&mut self, wire_type: WireType) -> Result<(), MalformedStreamError> {
        match wire_type {
            WireType::Varint => self.read_varint().map(|_| ()),
            WireType::Fixed64 => self.advance(8),
            WireType::Len => self.read_bytes().map(|_| ()),
            WireType::Fixed32 => self.advance(4),
        }
    }

    /// Fail unless `actual` is the wire type the schema declares for a field.
    pub(crate) fn expect(
        &self,
        actual: WireType,
        expected: WireType,
    ) -> Result<(), MalformedStreamError> {
        if actual == expected {
            Ok(())
        } else {
            Err(self.error(MalformedKind::UnexpectedWireType(actual.code())))
        }
    }
}
