use crate::error::NetError;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use qlease_messages::{DecodeError, WireMessage, FIRST_REGISTRABLE_TYPE_CODE};
use std::{collections::HashMap, sync::atomic::{AtomicU8, Ordering}, sync::Arc};
use tokio::sync::mpsc;

/// A 1-byte RPC type code, as assigned by [`Dispatcher::register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeCode(pub u8);

#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn dispatch(&self, sender_id: u32, payload: Bytes) -> Result<(), NetError>;
    fn wire_size(&self) -> usize;
}

struct TypedHandler<T: WireMessage> {
    tx: mpsc::Sender<(u32, T)>,
}

#[async_trait]
impl<T: WireMessage> ErasedHandler for TypedHandler<T> {
    async fn dispatch(&self, sender_id: u32, mut payload: Bytes) -> Result<(), NetError> {
        let message = T::unmarshal(&mut payload).map_err(|error: DecodeError| {
            NetError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string()))
        })?;
        // The registered channel's receiver decides backpressure; a closed receiver just drops
        // the message, matching the teacher's "posted to the registered channel" dispatch model.
        let _ = self.tx.send((sender_id, message)).await;
        Ok(())
    }

    fn wire_size(&self) -> usize {
        T::WIRE_SIZE
    }
}

/// Maps 1-byte type codes to typed inbound channels.
///
/// Codes 0 and 1 are reserved for [`qlease_messages::Beacon`] and
/// [`qlease_messages::BeaconReply`] and are wired in at construction time; every other type is
/// registered at runtime and assigned the next free code starting at
/// [`FIRST_REGISTRABLE_TYPE_CODE`].
pub struct Dispatcher {
    handlers: RwLock<HashMap<u8, Arc<dyn ErasedHandler>>>,
    next_code: AtomicU8,
}

impl Dispatcher {
    pub fn new(
        tx_beacon: mpsc::Sender<(u32, qlease_messages::Beacon)>,
        tx_beacon_reply: mpsc::Sender<(u32, qlease_messages::BeaconReply)>,
    ) -> Self {
        let mut handlers: HashMap<u8, Arc<dyn ErasedHandler>> = HashMap::new();
        handlers.insert(qlease_messages::BEACON_TYPE_CODE, Arc::new(TypedHandler { tx: tx_beacon }));
        handlers.insert(qlease_messages::BEACON_REPLY_TYPE_CODE, Arc::new(TypedHandler { tx: tx_beacon_reply }));
        Self { handlers: RwLock::new(handlers), next_code: AtomicU8::new(FIRST_REGISTRABLE_TYPE_CODE) }
    }

    /// Registers a new message type, returning the type code assigned to it.
    ///
    /// Panics if more than `256 - FIRST_REGISTRABLE_TYPE_CODE` types are registered; that ceiling
    /// is inherent to a 1-byte type code and is not expected to be approached in practice.
    pub fn register<T: WireMessage>(&self, tx: mpsc::Sender<(u32, T)>) -> TypeCode {
        let code = self.next_code.fetch_add(1, Ordering::Relaxed);
        assert!(code != 0, "exhausted the 1-byte RPC type code space");
        self.handlers.write().insert(code, Arc::new(TypedHandler { tx }));
        TypeCode(code)
    }

    /// Returns the fixed wire size registered for `type_code`, if any.
    pub(crate) fn wire_size_for(&self, type_code: u8) -> Option<usize> {
        self.handlers.read().get(&type_code).map(|h| h.wire_size())
    }

    /// Decodes `payload` as the type registered at `type_code` and posts it to that type's
    /// channel. Unknown codes are logged and dropped, per the RPC dispatch contract.
    pub(crate) async fn dispatch(&self, sender_id: u32, type_code: u8, payload: Bytes) {
        let handler = self.handlers.read().get(&type_code).cloned();
        match handler {
            Some(handler) => {
                if let Err(error) = handler.dispatch(sender_id, payload).await {
                    tracing::warn!(sender_id, type_code, %error, "failed to dispatch an inbound message");
                }
            }
            None => {
                tracing::warn!(sender_id, type_code, "dropping a message with an unregistered type code");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qlease_messages::{Beacon, BeaconReply};

    #[tokio::test]
    async fn registration_assigns_increasing_codes_starting_at_two() {
        let (tx_b, _rx_b) = mpsc::channel(1);
        let (tx_br, _rx_br) = mpsc::channel(1);
        let dispatcher = Dispatcher::new(tx_b, tx_br);

        let (tx1, _rx1) = mpsc::channel::<(u32, Beacon)>(1);
        let (tx2, _rx2) = mpsc::channel::<(u32, BeaconReply)>(1);
        assert_eq!(dispatcher.register(tx1).0, 2);
        assert_eq!(dispatcher.register(tx2).0, 3);
    }

    #[tokio::test]
    async fn unknown_code_is_dropped_without_panicking() {
        let (tx_b, _rx_b) = mpsc::channel(1);
        let (tx_br, _rx_br) = mpsc::channel(1);
        let dispatcher = Dispatcher::new(tx_b, tx_br);
        dispatcher.dispatch(0, 200, Bytes::new()).await;
    }

    #[tokio::test]
    async fn builtin_beacon_code_dispatches_to_registered_channel() {
        let (tx_b, mut rx_b) = mpsc::channel(1);
        let (tx_br, _rx_br) = mpsc::channel(1);
        let dispatcher = Dispatcher::new(tx_b, tx_br);

        use bytes::{BufMut, BytesMut};
        let mut buf = BytesMut::new();
        buf.put_u64_le(7);
        dispatcher.dispatch(3, qlease_messages::BEACON_TYPE_CODE, buf.freeze()).await;

        let (sender, beacon) = rx_b.recv().await.unwrap();
        assert_eq!(sender, 3);
        assert_eq!(beacon.timestamp, 7);
    }
}
