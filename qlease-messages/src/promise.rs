use crate::{require, DecodeError, WireMessage};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// The lease grant itself: "until `now + duration_ns`, I will not serve a local read that could
/// contradict consensus up to `latest_accepted_instance`."
///
/// Sent by a grantee to a grantor, either after a [`crate::GuardReply`] (establishing a lease) or
/// standalone (renewing one).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Promise {
    pub replica_id: i32,
    pub lease_instance: i32,
    pub timestamp_ns: i64,
    pub duration_ns: i64,
    pub latest_accepted_instance: i32,
}

impl WireMessage for Promise {
    const WIRE_SIZE: usize = 4 + 4 + 8 + 8 + 4;

    fn marshal(&self, dst: &mut BytesMut) {
        dst.put_i32_le(self.replica_id);
        dst.put_i32_le(self.lease_instance);
        dst.put_i64_le(self.timestamp_ns);
        dst.put_i64_le(self.duration_ns);
        dst.put_i32_le(self.latest_accepted_instance);
    }

    fn unmarshal(src: &mut Bytes) -> Result<Self, DecodeError> {
        require(src, Self::WIRE_SIZE)?;
        Ok(Self {
            replica_id: src.get_i32_le(),
            lease_instance: src.get_i32_le(),
            timestamp_ns: src.get_i64_le(),
            duration_ns: src.get_i64_le(),
            latest_accepted_instance: src.get_i32_le(),
        })
    }
}

/// Confirms acceptance of a [`Promise`] (echoing the grantee's instance) or rejects it (carrying
/// a higher instance the grantee must adopt before retrying).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PromiseReply {
    pub replica_id: i32,
    pub lease_instance: i32,
    pub timestamp_ns: i64,
}

impl WireMessage for PromiseReply {
    const WIRE_SIZE: usize = 4 + 4 + 8;

    fn marshal(&self, dst: &mut BytesMut) {
        dst.put_i32_le(self.replica_id);
        dst.put_i32_le(self.lease_instance);
        dst.put_i64_le(self.timestamp_ns);
    }

    fn unmarshal(src: &mut Bytes) -> Result<Self, DecodeError> {
        require(src, Self::WIRE_SIZE)?;
        Ok(Self {
            replica_id: src.get_i32_le(),
            lease_instance: src.get_i32_le(),
            timestamp_ns: src.get_i64_le(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::roundtrip;

    #[test]
    fn promise_roundtrip() {
        roundtrip(Promise {
            replica_id: 1,
            lease_instance: 7,
            timestamp_ns: 42,
            duration_ns: 30_000_000,
            latest_accepted_instance: 100,
        });
    }

    #[test]
    fn promise_reply_roundtrip() {
        roundtrip(PromiseReply { replica_id: 1, lease_instance: 7, timestamp_ns: 42 });
    }
}
