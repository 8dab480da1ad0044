use bytes::Bytes;
use qlease_messages::Beacon;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// A client connection's write half, guarded by the per-connection mutex that serializes replies
/// to it. There is no reordering above the TCP stream (§4.5): whichever task holds this lock
/// writes the next reply.
pub struct ClientConnection<W> {
    writer: Mutex<W>,
}

impl<W> ClientConnection<W> {
    pub fn new(writer: W) -> Self {
        Self { writer: Mutex::new(writer) }
    }

    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, W> {
        self.writer.lock().await
    }
}

/// A client `Propose` record: an opaque command payload plus the connection it arrived on.
///
/// The command's contents are a key-value store concern external to this core (§1); the lease
/// core only carries the bytes from the client-acceptor task to whatever drains this channel and
/// back out to the reply path via `client`.
pub struct Propose<W> {
    pub command: Bytes,
    pub client: Arc<ClientConnection<W>>,
}

impl<W> Clone for Propose<W> {
    fn clone(&self) -> Self {
        Self { command: self.command.clone(), client: self.client.clone() }
    }
}

#[derive(Clone)]
pub struct ProposeSender<W> {
    pub tx_propose: mpsc::Sender<Propose<W>>,
}

pub struct ProposeReceiver<W> {
    pub rx_propose: mpsc::Receiver<Propose<W>>,
}

/// Initializes the Propose channel at the configured depth (~500k by default, per §4.5).
pub fn init_propose_channel<W>(capacity: usize) -> (ProposeSender<W>, ProposeReceiver<W>) {
    let (tx_propose, rx_propose) = mpsc::channel(capacity);
    (ProposeSender { tx_propose }, ProposeReceiver { rx_propose })
}

/// The action required of the layer draining the Beacon channel: every inbound [`Beacon`]
/// requires exactly one [`BeaconAction::ReplyBeacon`], per §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconAction {
    ReplyBeacon { to: u32, timestamp: u64 },
}

/// Builds the action an inbound Beacon from `sender` requires.
pub fn beacon_action(sender: u32, beacon: &Beacon) -> BeaconAction {
    BeaconAction::ReplyBeacon { to: sender, timestamp: beacon.timestamp }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beacon_action_echoes_the_senders_timestamp() {
        let action = beacon_action(2, &Beacon { timestamp: 55 });
        assert_eq!(action, BeaconAction::ReplyBeacon { to: 2, timestamp: 55 });
    }

    #[tokio::test]
    async fn propose_channel_round_trips_a_record() {
        let (sender, mut receiver) = init_propose_channel::<Vec<u8>>(4);
        let client = Arc::new(ClientConnection::new(Vec::new()));
        sender.tx_propose.send(Propose { command: Bytes::from_static(b"cmd"), client }).await.unwrap();
        let received = receiver.rx_propose.recv().await.unwrap();
        assert_eq!(received.command, Bytes::from_static(b"cmd"));
    }
}
