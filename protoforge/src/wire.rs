//! Protobuf binary wire format.
//!
//! [`Writer`] mirrors the chained call style generated encoders use:
//! `writer.uint32(10).string(&self.name)`. Length-delimited sub-messages are
//! written with [`Writer::fork`] / [`Writer::ldelim`]. Closing a fork records
//! its length prefix; [`Writer::finish`] merges every prefix into the body in
//! a single pass.
//!
//! [`Reader`] is a cursor over a borrowed buffer. Generated decoders compute
//! a frame end with [`Reader::frame_end`], loop while `pos() < end`, and
//! finish with [`Reader::finish_frame`].

use std::cmp::Reverse;
use std::str::FromStr;

use crate::error::DecodeError;
use crate::message::Message;

/// Wire type of a varint-encoded value.
pub const WIRE_VARINT: u32 = 0;
/// Wire type of a little-endian 64-bit value.
pub const WIRE_FIXED64: u32 = 1;
/// Wire type of a length-delimited value.
pub const WIRE_LENGTH_DELIMITED: u32 = 2;
/// Wire type of a deprecated group start.
pub const WIRE_START_GROUP: u32 = 3;
/// Wire type of a deprecated group end.
pub const WIRE_END_GROUP: u32 = 4;
/// Wire type of a little-endian 32-bit value.
pub const WIRE_FIXED32: u32 = 5;

const MAX_VARINT_LEN: usize = 10;

/// Length prefix of a closed fork, inserted at `at` by [`Writer::finish`].
#[derive(Debug, Clone, Copy)]
struct Prefix {
    at: usize,
    bytes: [u8; MAX_VARINT_LEN],
    len: u8,
}

impl Prefix {
    fn new(at: usize, mut length: u64) -> Self {
        let mut bytes = [0; MAX_VARINT_LEN];
        let mut len = 0;
        while length >= 0x80 {
            bytes[len] = (length as u8 & 0x7f) | 0x80;
            length >>= 7;
            len += 1;
        }
        bytes[len] = length as u8;
        Self {
            at,
            bytes,
            len: len as u8 + 1,
        }
    }

    fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

/// Append-only protobuf encoder.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
    /// Open forks: body offset in `buf`, and `prefix_len` when the fork opened.
    forks: Vec<(usize, usize)>,
    prefixes: Vec<Prefix>,
    /// Total bytes across `prefixes`.
    prefix_len: usize,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written so far, excluding any open forks' length prefixes.
    pub fn len(&self) -> usize {
        self.buf.len() + self.prefix_len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn varint(&mut self, mut value: u64) -> &mut Self {
        while value >= 0x80 {
            self.buf.push((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
        self
    }

    pub fn uint32(&mut self, value: u32) -> &mut Self {
        self.varint(value as u64)
    }

    /// Negative values are sign-extended to ten bytes, as protobuf requires.
    pub fn int32(&mut self, value: i32) -> &mut Self {
        self.varint(value as i64 as u64)
    }

    pub fn sint32(&mut self, value: i32) -> &mut Self {
        self.varint(((value << 1) ^ (value >> 31)) as u32 as u64)
    }

    pub fn uint64(&mut self, value: u64) -> &mut Self {
        self.varint(value)
    }

    pub fn int64(&mut self, value: i64) -> &mut Self {
        self.varint(value as u64)
    }

    pub fn sint64(&mut self, value: i64) -> &mut Self {
        self.varint(((value << 1) ^ (value >> 63)) as u64)
    }

    pub fn fixed32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn sfixed32(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn fixed64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn sfixed64(&mut self, value: i64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn float(&mut self, value: f32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn double(&mut self, value: f64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.varint(value as u64)
    }

    pub fn string(&mut self, value: &str) -> &mut Self {
        self.bytes(value.as_bytes())
    }

    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.varint(value.len() as u64);
        self.buf.extend_from_slice(value);
        self
    }

    /// Start a length-delimited block. Must be closed with [`Writer::ldelim`].
    pub fn fork(&mut self) -> &mut Self {
        self.forks.push((self.buf.len(), self.prefix_len));
        self
    }

    /// Close the innermost [`Writer::fork`], prefixing the block with its length.
    pub fn ldelim(&mut self) -> &mut Self {
        debug_assert!(!self.forks.is_empty(), "ldelim called without a matching fork");
        let Some((start, prefix_len)) = self.forks.pop() else {
            return self;
        };
        // nested prefixes closed inside this block count towards its length
        let length = self.buf.len() - start + self.prefix_len - prefix_len;
        let prefix = Prefix::new(start, length as u64);
        self.prefix_len += prefix.len as usize;
        self.prefixes.push(prefix);
        self
    }

    /// Write `message` as a length-delimited field with the given tag.
    pub fn message<M: Message>(&mut self, tag: u32, message: &M) -> &mut Self {
        self.uint32(tag).fork();
        message.encode(self);
        self.ldelim()
    }

    /// Take the encoded bytes. Open forks are closed first.
    pub fn finish(mut self) -> Vec<u8> {
        while !self.forks.is_empty() {
            self.ldelim();
        }
        if self.prefixes.is_empty() {
            return self.buf;
        }
        // inner blocks close first, so at a shared offset the outer prefix goes first
        let mut prefixes: Vec<_> = self.prefixes.into_iter().enumerate().collect();
        prefixes.sort_unstable_by_key(|(closed, prefix)| (prefix.at, Reverse(*closed)));

        let mut out = Vec::with_capacity(self.buf.len() + self.prefix_len);
        let mut copied = 0;
        for (_, prefix) in &prefixes {
            out.extend_from_slice(&self.buf[copied..prefix.at]);
            out.extend_from_slice(prefix.as_slice());
            copied = prefix.at;
        }
        out.extend_from_slice(&self.buf[copied..]);
        out
    }
}

/// Parse the decimal-string form of a signed 64-bit field for encoding.
///
/// An empty string is zero. Anything else that does not parse is logged and
/// encoded as zero.
pub fn int64_from_decimal(text: &str) -> i64 {
    from_decimal(text, "int64")
}

/// Unsigned counterpart of [`int64_from_decimal`].
pub fn uint64_from_decimal(text: &str) -> u64 {
    from_decimal(text, "uint64")
}

fn from_decimal<T: FromStr + Default>(text: &str, target: &'static str) -> T {
    if text.is_empty() {
        return T::default();
    }
    text.trim().parse().unwrap_or_else(|_| {
        tracing::warn!(text, integer = target, "malformed decimal integer, encoding 0");
        T::default()
    })
}

/// Deepest nesting of sub-messages and groups a [`Reader`] will follow.
pub const RECURSION_LIMIT: u32 = 100;

/// Cursor over an encoded protobuf buffer.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: u32,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, depth: 0 }
    }

    fn descend(&mut self) -> Result<(), DecodeError> {
        if self.depth >= RECURSION_LIMIT {
            return Err(DecodeError::RecursionLimit {
                offset: self.pos,
                limit: RECURSION_LIMIT,
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Total length of the underlying buffer.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// End offset of the frame starting at the current position.
    ///
    /// `None` means the frame runs to the end of the buffer.
    pub fn frame_end(&self, length: Option<usize>) -> Result<usize, DecodeError> {
        let Some(length) = length else {
            return Ok(self.buf.len());
        };
        match self.pos.checked_add(length) {
            Some(end) if end <= self.buf.len() => Ok(end),
            _ => Err(DecodeError::FrameOverrun {
                offset: self.pos,
                length,
            }),
        }
    }

    /// Verify the decode loop stopped exactly on the frame boundary.
    pub fn finish_frame(&self, end: usize) -> Result<(), DecodeError> {
        if self.pos == end {
            Ok(())
        } else {
            Err(DecodeError::FieldOverrun {
                position: self.pos,
                end,
            })
        }
    }

    /// Read the length prefix of a packed block and return its end offset.
    pub fn packed_end(&mut self) -> Result<usize, DecodeError> {
        let length = self.uint32()? as usize;
        self.frame_end(Some(length))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or(DecodeError::Truncated { offset: self.pos })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn varint(&mut self) -> Result<u64, DecodeError> {
        let start = self.pos;
        let mut value = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let Some(&byte) = self.buf.get(self.pos) else {
                return Err(DecodeError::Truncated { offset: self.pos });
            };
            self.pos += 1;
            value |= ((byte & 0x7f) as u64) << (7 * i);
            if byte < 0x80 {
                return Ok(value);
            }
        }
        Err(DecodeError::VarintOverflow { offset: start })
    }

    pub fn uint32(&mut self) -> Result<u32, DecodeError> {
        Ok(self.varint()? as u32)
    }

    pub fn int32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.varint()? as i32)
    }

    pub fn sint32(&mut self) -> Result<i32, DecodeError> {
        let n = self.varint()? as u32;
        Ok(((n >> 1) as i32) ^ -((n & 1) as i32))
    }

    pub fn uint64(&mut self) -> Result<u64, DecodeError> {
        self.varint()
    }

    pub fn int64(&mut self) -> Result<i64, DecodeError> {
        Ok(self.varint()? as i64)
    }

    pub fn sint64(&mut self) -> Result<i64, DecodeError> {
        let n = self.varint()?;
        Ok(((n >> 1) as i64) ^ -((n & 1) as i64))
    }

    pub fn fixed32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn sfixed32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn fixed64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn sfixed64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    pub fn float(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    pub fn double(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    pub fn bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.varint()? != 0)
    }

    pub fn bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let length = self.uint32()? as usize;
        Ok(self.take(length)?.to_vec())
    }

    pub fn string(&mut self) -> Result<String, DecodeError> {
        let offset = self.pos;
        String::from_utf8(self.bytes()?).map_err(|_| DecodeError::InvalidUtf8 { offset })
    }

    /// Decode a length-prefixed sub-message.
    pub fn message<M: Message>(&mut self) -> Result<M, DecodeError> {
        let length = self.uint32()? as usize;
        self.descend()?;
        let message = M::decode(self, Some(length));
        self.depth -= 1;
        message
    }

    pub fn skip(&mut self, n: usize) -> Result<&mut Self, DecodeError> {
        self.take(n)?;
        Ok(self)
    }

    /// Skip one value of the given wire type.
    pub fn skip_type(&mut self, wire_type: u32) -> Result<&mut Self, DecodeError> {
        match wire_type {
            WIRE_VARINT => {
                self.varint()?;
            }
            WIRE_FIXED64 => {
                self.skip(8)?;
            }
            WIRE_LENGTH_DELIMITED => {
                let length = self.uint32()? as usize;
                self.skip(length)?;
            }
            WIRE_START_GROUP => {
                let start = self.pos;
                self.descend()?;
                loop {
                    if self.pos >= self.buf.len() {
                        return Err(DecodeError::UnterminatedGroup { offset: start });
                    }
                    let wire_type = self.uint32()? & 7;
                    if wire_type == WIRE_END_GROUP {
                        self.depth -= 1;
                        break;
                    }
                    self.skip_type(wire_type)?;
                }
            }
            WIRE_FIXED32 => {
                self.skip(4)?;
            }
            _ => {
                return Err(DecodeError::InvalidWireType {
                    wire_type,
                    offset: self.pos,
                });
            }
        }
        Ok(self)
    }
}
