use crate::{require, DecodeError, WireMessage};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// A round-trip probe carrying the originator's cycle-counter timestamp. Echoed verbatim by
/// [`BeaconReply`] so the originator can derive a latency sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Beacon {
    pub timestamp: u64,
}

impl WireMessage for Beacon {
    const WIRE_SIZE: usize = 8;

    fn marshal(&self, dst: &mut BytesMut) {
        dst.put_u64_le(self.timestamp);
    }

    fn unmarshal(src: &mut Bytes) -> Result<Self, DecodeError> {
        require(src, Self::WIRE_SIZE)?;
        Ok(Self { timestamp: src.get_u64_le() })
    }
}

/// The reply to a [`Beacon`]; carries back the same timestamp unmodified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BeaconReply {
    pub timestamp: u64,
}

impl WireMessage for BeaconReply {
    const WIRE_SIZE: usize = 8;

    fn marshal(&self, dst: &mut BytesMut) {
        dst.put_u64_le(self.timestamp);
    }

    fn unmarshal(src: &mut Bytes) -> Result<Self, DecodeError> {
        require(src, Self::WIRE_SIZE)?;
        Ok(Self { timestamp: src.get_u64_le() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::roundtrip;

    #[test]
    fn beacon_roundtrip() {
        roundtrip(Beacon { timestamp: 123_456 });
        roundtrip(BeaconReply { timestamp: 123_456 });
    }
}
