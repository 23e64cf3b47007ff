//! Well-known types that generated code maps onto native Rust types.
//!
//! `google.protobuf.Timestamp` fields are `chrono::DateTime<Utc>` in
//! generated structs and travel through [`Timestamp`] on the wire. The nine
//! `google.protobuf.*Value` wrappers are plain primitives encoded with
//! [`encode_wrapper`] / [`decode_wrapper`].

use chrono::{DateTime, Utc};

use crate::error::DecodeError;
use crate::message::Message;
use crate::wire::{Reader, Writer};

/// Wire representation of `google.protobuf.Timestamp`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl Timestamp {
    pub fn from_datetime(date: &DateTime<Utc>) -> Self {
        Self {
            seconds: date.timestamp(),
            nanos: date.timestamp_subsec_nanos() as i32,
        }
    }

    /// Out-of-range values clamp to the Unix epoch.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        u32::try_from(self.nanos)
            .ok()
            .and_then(|nanos| DateTime::from_timestamp(self.seconds, nanos))
            .unwrap_or_default()
    }
}

impl Message for Timestamp {
    fn encode(&self, writer: &mut Writer) {
        if self.seconds != 0 {
            writer.uint32(8).int64(self.seconds);
        }
        if self.nanos != 0 {
            writer.uint32(16).int32(self.nanos);
        }
    }

    fn decode(reader: &mut Reader<'_>, length: Option<usize>) -> Result<Self, DecodeError> {
        let end = reader.frame_end(length)?;
        let mut message = Self::default();
        while reader.pos() < end {
            let tag = reader.uint32()?;
            match tag >> 3 {
                1 => message.seconds = reader.int64()?,
                2 => message.nanos = reader.int32()?,
                _ => {
                    reader.skip_type(tag & 7)?;
                }
            }
        }
        reader.finish_frame(end)?;
        Ok(message)
    }
}

/// A primitive that can be the `value` field of a wrapper message.
pub trait WrapperValue: Sized + Default + PartialEq {
    /// Write the wrapper's field 1 with its tag.
    fn write(&self, writer: &mut Writer);

    fn read(reader: &mut Reader<'_>) -> Result<Self, DecodeError>;
}

macro_rules! wrapper_value {
    ($ty:ty, $wire:literal, $write:ident, $read:ident) => {
        impl WrapperValue for $ty {
            fn write(&self, writer: &mut Writer) {
                writer.uint32((1 << 3) | $wire).$write(*self);
            }

            fn read(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
                reader.$read()
            }
        }
    };
}

wrapper_value!(f64, 1, double, double);
wrapper_value!(f32, 5, float, float);
wrapper_value!(i64, 0, int64, int64);
wrapper_value!(u64, 0, uint64, uint64);
wrapper_value!(i32, 0, int32, int32);
wrapper_value!(u32, 0, uint32, uint32);
wrapper_value!(bool, 0, bool, bool);

impl WrapperValue for String {
    fn write(&self, writer: &mut Writer) {
        writer.uint32(10).string(self);
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        reader.string()
    }
}

impl WrapperValue for Vec<u8> {
    fn write(&self, writer: &mut Writer) {
        writer.uint32(10).bytes(self);
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        reader.bytes()
    }
}

/// Write `value` as a wrapper sub-message under `tag`.
///
/// The wrapper is always present; its inner value is omitted when default.
pub fn encode_wrapper<T: WrapperValue>(writer: &mut Writer, tag: u32, value: &T) {
    writer.uint32(tag).fork();
    if *value != T::default() {
        value.write(writer);
    }
    writer.ldelim();
}

/// Read a length-prefixed wrapper sub-message.
pub fn decode_wrapper<T: WrapperValue>(reader: &mut Reader<'_>) -> Result<T, DecodeError> {
    let length = reader.uint32()? as usize;
    let end = reader.frame_end(Some(length))?;
    let mut value = T::default();
    while reader.pos() < end {
        let tag = reader.uint32()?;
        if tag >> 3 == 1 {
            value = T::read(reader)?;
        } else {
            reader.skip_type(tag & 7)?;
        }
    }
    reader.finish_frame(end)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_keeps_seconds_and_nanos() {
        let ts = Timestamp {
            seconds: 1_000_000,
            nanos: 500_000_000,
        };
        assert_eq!(Timestamp::from_datetime(&ts.to_datetime()), ts);
        let decoded = Timestamp::decode_bytes(&ts.encode_to_vec()).unwrap();
        assert_eq!(decoded, ts);
    }

    #[test]
    fn negative_timestamps_use_positive_nanos() {
        let date = DateTime::from_timestamp(-2, 250_000_000).unwrap();
        let ts = Timestamp::from_datetime(&date);
        assert_eq!(ts.seconds, -2);
        assert_eq!(ts.nanos, 250_000_000);
        assert_eq!(ts.to_datetime(), date);
    }

    #[test]
    fn wrapper_round_trips_inside_parent() {
        let mut writer = Writer::new();
        encode_wrapper(&mut writer, 10, &"hello".to_string());
        encode_wrapper(&mut writer, 18, &0i32);
        encode_wrapper(&mut writer, 26, &-5i64);
        let bytes = writer.finish();

        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.uint32().unwrap(), 10);
        assert_eq!(decode_wrapper::<String>(&mut reader).unwrap(), "hello");
        assert_eq!(reader.uint32().unwrap(), 18);
        assert_eq!(decode_wrapper::<i32>(&mut reader).unwrap(), 0);
        assert_eq!(reader.uint32().unwrap(), 26);
        assert_eq!(decode_wrapper::<i64>(&mut reader).unwrap(), -5);
    }

    #[test]
    fn default_wrapper_is_an_empty_message() {
        let mut writer = Writer::new();
        encode_wrapper(&mut writer, 10, &false);
        assert_eq!(writer.finish(), vec![10, 0]);
    }
}
