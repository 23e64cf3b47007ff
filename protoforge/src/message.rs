use bytes::Bytes;

use crate::error::{DecodeError, JsonError};
use crate::wire::{Reader, Writer};

/// Binary protobuf codec implemented by every generated message.
pub trait Message: Sized {
    /// Append the message body (without a length prefix) to `writer`.
    fn encode(&self, writer: &mut Writer);

    /// Decode a message body. `length` bounds the frame; `None` reads to the
    /// end of the buffer.
    fn decode(reader: &mut Reader<'_>, length: Option<usize>) -> Result<Self, DecodeError>;

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        self.encode(&mut writer);
        writer.finish()
    }

    fn encode_to_bytes(&self) -> Bytes {
        Bytes::from(self.encode_to_vec())
    }

    fn decode_bytes(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(buf);
        Self::decode(&mut reader, None)
    }
}

/// Canonical JSON codec implemented by every generated message.
pub trait JsonMessage: Sized {
    fn to_json(&self) -> serde_json::Value;

    fn from_json(object: &serde_json::Value) -> Result<Self, JsonError>;
}

/// Construction from a recursively partial value.
///
/// `Partial` has every field optional; absent fields keep the message's
/// default.
pub trait FromPartial: Sized {
    type Partial: Default;

    fn from_partial(object: Self::Partial) -> Self;
}
