// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.

#![forbid(unsafe_code)]

//! Wire messages exchanged between replicas: the lease protocol's four
//! message kinds plus the beacon round-trip pair. Every message has a
//! fixed marshalled width, so the peer mesh never needs a length prefix
//! to know how many bytes to read once it has seen the type code.

mod beacon;
pub use beacon::{Beacon, BeaconReply};

mod guard;
pub use guard::{Guard, GuardReply};

mod promise;
pub use promise::{Promise, PromiseReply};

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

/// The built-in type code for [`Beacon`]. Reserved by the RPC dispatcher.
pub const BEACON_TYPE_CODE: u8 = 0;
/// The built-in type code for [`BeaconReply`]. Reserved by the RPC dispatcher.
pub const BEACON_REPLY_TYPE_CODE: u8 = 1;
/// The first type code available for registration by callers of the dispatcher.
pub const FIRST_REGISTRABLE_TYPE_CODE: u8 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected {expected} bytes for this message, found {found}")]
    ShortBuffer { expected: usize, found: usize },
    #[error("leftover bytes after decoding a fixed-shape message")]
    TrailingBytes,
}

/// A fixed-shape message keyed by a 1-byte type code in the peer RPC dispatcher.
///
/// Every implementor must marshal to exactly [`WireMessage::WIRE_SIZE`] bytes, since the wire
/// format carries no length prefix: the reader learns how much to read from the type code alone.
pub trait WireMessage: Sized + Send + Sync + 'static {
    /// The exact number of bytes this message occupies on the wire, excluding the type code.
    const WIRE_SIZE: usize;

    /// Appends this message's marshalled form to `dst`.
    fn marshal(&self, dst: &mut BytesMut);

    /// Consumes exactly [`Self::WIRE_SIZE`] bytes from `src` and reconstructs the message.
    fn unmarshal(src: &mut Bytes) -> Result<Self, DecodeError>;
}

/// Asserts `src` has at least `n` bytes remaining, for use at the top of `unmarshal` impls.
fn require(src: &Bytes, n: usize) -> Result<(), DecodeError> {
    if src.remaining() < n {
        return Err(DecodeError::ShortBuffer { expected: n, found: src.remaining() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn roundtrip<T: WireMessage + std::fmt::Debug + PartialEq>(msg: T) {
        let mut buf = BytesMut::with_capacity(T::WIRE_SIZE);
        msg.marshal(&mut buf);
        assert_eq!(buf.len(), T::WIRE_SIZE, "marshalled length must equal WIRE_SIZE");
        let mut bytes = buf.freeze();
        let decoded = T::unmarshal(&mut bytes).unwrap();
        assert_eq!(bytes.remaining(), 0, "unmarshal must consume the whole buffer");
        assert_eq!(msg, decoded);
    }
}
