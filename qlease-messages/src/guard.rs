use crate::{require, DecodeError, WireMessage};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Opens a window during which the grantor will accept a fresh [`crate::Promise`] from the sender.
///
/// Sent by a prospective lease grantee to every peer it wants to establish a lease against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Guard {
    pub replica_id: i32,
    pub timestamp_ns: i64,
    pub guard_duration_ns: i64,
}

impl WireMessage for Guard {
    const WIRE_SIZE: usize = 4 + 8 + 8;

    fn marshal(&self, dst: &mut BytesMut) {
        dst.put_i32_le(self.replica_id);
        dst.put_i64_le(self.timestamp_ns);
        dst.put_i64_le(self.guard_duration_ns);
    }

    fn unmarshal(src: &mut Bytes) -> Result<Self, DecodeError> {
        require(src, Self::WIRE_SIZE)?;
        Ok(Self {
            replica_id: src.get_i32_le(),
            timestamp_ns: src.get_i64_le(),
            guard_duration_ns: src.get_i64_le(),
        })
    }
}

/// Acknowledges a [`Guard`]; causes the original sender to respond with a [`crate::Promise`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuardReply {
    pub replica_id: i32,
    pub timestamp_ns: i64,
}

impl WireMessage for GuardReply {
    const WIRE_SIZE: usize = 4 + 8;

    fn marshal(&self, dst: &mut BytesMut) {
        dst.put_i32_le(self.replica_id);
        dst.put_i64_le(self.timestamp_ns);
    }

    fn unmarshal(src: &mut Bytes) -> Result<Self, DecodeError> {
        require(src, Self::WIRE_SIZE)?;
        Ok(Self { replica_id: src.get_i32_le(), timestamp_ns: src.get_i64_le() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::roundtrip;

    #[test]
    fn guard_roundtrip() {
        roundtrip(Guard { replica_id: 2, timestamp_ns: 1_000_000, guard_duration_ns: 50_000_000 });
    }

    #[test]
    fn guard_reply_roundtrip() {
        roundtrip(GuardReply { replica_id: 2, timestamp_ns: 1_000_000 });
    }

    #[test]
    fn short_buffer_is_rejected() {
        let mut bytes = Bytes::from_static(&[1, 2, 3]);
        assert_eq!(
            GuardReply::unmarshal(&mut bytes),
            Err(DecodeError::ShortBuffer { expected: GuardReply::WIRE_SIZE, found: 3 })
        );
    }
}
