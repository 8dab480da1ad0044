use crate::{dispatcher::Dispatcher, error::NetError, peer::PeerHandle};
use bytes::{Bytes, BytesMut};
use qlease_messages::WireMessage;
use std::{
    net::SocketAddr,
    sync::{atomic::{AtomicBool, Ordering}, Arc},
};
use tokio::{
    net::{TcpListener, TcpStream},
    time::{sleep, Duration},
};

/// The interval between dial retries while the mesh is still being established.
const DIAL_RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// A symmetric TCP mesh among a fixed set of `N` replicas.
///
/// Replica `i` dials every peer with an id lower than its own and accepts inbound connections
/// from every peer with a higher id, so that exactly one TCP connection exists per pair. Once
/// established, one reader task per peer decodes `(type: u8, payload)` records and hands them to
/// the [`Dispatcher`]; writes are serialized per peer by [`PeerHandle::send_framed`].
pub struct PeerMesh {
    self_id: u32,
    peers: Vec<Arc<PeerHandle>>,
    dispatcher: Arc<Dispatcher>,
    shutdown: Arc<AtomicBool>,
}

impl PeerMesh {
    /// Binds the local listener, dials every lower-id peer, and accepts from every higher-id
    /// peer. Returns once the listener and all dial tasks have been spawned — it does not block
    /// until every connection completes; callers observe that via [`PeerMesh::peer_alive`].
    pub async fn spawn(
        self_id: u32,
        addrs: Vec<SocketAddr>,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Arc<Self>, NetError> {
        let peers: Vec<Arc<PeerHandle>> =
            addrs.iter().enumerate().map(|(id, addr)| Arc::new(PeerHandle::new(id as u32, *addr))).collect();

        let shutdown = Arc::new(AtomicBool::new(false));
        let mesh = Arc::new(Self { self_id, peers, dispatcher, shutdown });

        let listener = TcpListener::bind(mesh.peers[self_id as usize].addr).await?;
        tokio::spawn(mesh.clone().run_acceptor(listener));

        for peer_id in 0..self_id {
            tokio::spawn(mesh.clone().run_dialer(peer_id));
        }

        Ok(mesh)
    }

    pub fn self_id(&self) -> u32 {
        self.self_id
    }

    pub fn num_replicas(&self) -> usize {
        self.peers.len()
    }

    pub fn peer_alive(&self, id: u32) -> bool {
        self.peers.get(id as usize).map(|p| p.is_alive()).unwrap_or(false)
    }

    pub fn alive_peer_ids(&self) -> Vec<u32> {
        self.peers.iter().filter(|p| p.id != self.self_id && p.is_alive()).map(|p| p.id).collect()
    }

    /// Stops all reader tasks at their next read. In-flight sends are not cancelled.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Marshals `msg` and sends it to `peer_id`, under that peer's send mutex.
    pub async fn send<T: WireMessage>(&self, peer_id: u32, type_code: u8, msg: &T) -> Result<(), NetError> {
        let peer = self.peers.get(peer_id as usize).ok_or(NetError::UnknownPeer(peer_id, self.peers.len()))?;
        let mut buf = BytesMut::with_capacity(T::WIRE_SIZE);
        msg.marshal(&mut buf);
        peer.send_framed(type_code, &buf).await
    }

    /// Sends `msg` to every alive peer except self. Send failures are logged, not propagated —
    /// broadcast is best-effort by design, matching the per-peer failure semantics in §4.1.
    pub async fn broadcast<T: WireMessage>(&self, type_code: u8, msg: &T) {
        for id in self.alive_peer_ids() {
            if let Err(error) = self.send(id, type_code, msg).await {
                tracing::debug!(peer_id = id, %error, "broadcast send failed");
            }
        }
    }

    async fn run_dialer(self: Arc<Self>, peer_id: u32) {
        let addr = self.peers[peer_id as usize].addr;
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return;
            }
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    if let Err(error) = self.complete_handshake_as_dialer(peer_id, stream).await {
                        tracing::warn!(peer_id, %error, "dial handshake failed, retrying");
                    } else {
                        return;
                    }
                }
                Err(error) => {
                    tracing::debug!(peer_id, %addr, %error, "dial failed, retrying");
                }
            }
            sleep(DIAL_RETRY_INTERVAL).await;
        }
    }

    async fn complete_handshake_as_dialer(&self, peer_id: u32, stream: TcpStream) -> Result<(), NetError> {
        use tokio::io::AsyncWriteExt;
        let (read_half, mut write_half) = stream.into_split();
        write_half.write_u32_le(self.self_id).await?;
        write_half.flush().await?;
        self.peers[peer_id as usize].attach(write_half).await;
        tokio::spawn(Self::run_reader(
            read_half,
            peer_id,
            self.dispatcher.clone(),
            self.shutdown.clone(),
        ));
        Ok(())
    }

    async fn run_acceptor(self: Arc<Self>, listener: TcpListener) {
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return;
            }
            let (stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(error) => {
                    tracing::warn!(%error, "accept failed");
                    continue;
                }
            };
            let mesh = self.clone();
            tokio::spawn(async move {
                if let Err(error) = mesh.complete_handshake_as_acceptor(stream).await {
                    tracing::warn!(%error, "inbound handshake failed");
                }
            });
        }
    }

    async fn complete_handshake_as_acceptor(&self, stream: TcpStream) -> Result<(), NetError> {
        use tokio::io::AsyncReadExt;
        let (mut read_half, write_half) = stream.into_split();
        let peer_id = read_half.read_u32_le().await?;
        let peer = self.peers.get(peer_id as usize).ok_or(NetError::UnknownPeer(peer_id, self.peers.len()))?;
        peer.attach(write_half).await;
        tokio::spawn(Self::run_reader(read_half, peer_id, self.dispatcher.clone(), self.shutdown.clone()));
        Ok(())
    }

    /// Consumes a framed stream of `(type: u8, payload)` records, dispatching each in the exact
    /// order it arrived on the wire. Unknown type codes leave the framing undeterminable (there
    /// is no length prefix to skip), so they terminate the reader, same as any other read error.
    async fn run_reader(
        mut read_half: tokio::net::tcp::OwnedReadHalf,
        sender_id: u32,
        dispatcher: Arc<Dispatcher>,
        shutdown: Arc<AtomicBool>,
    ) {
        use tokio::io::AsyncReadExt;
        loop {
            if shutdown.load(Ordering::Acquire) {
                return;
            }
            let type_code = match read_half.read_u8().await {
                Ok(code) => code,
                Err(_) => return,
            };
            let Some(size) = dispatcher.wire_size_for(type_code) else {
                tracing::warn!(sender_id, type_code, "unknown type code, terminating reader");
                return;
            };
            let mut buf = vec![0u8; size];
            if read_half.read_exact(&mut buf).await.is_err() {
                return;
            }
            dispatcher.dispatch(sender_id, type_code, Bytes::from(buf)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qlease_messages::{Beacon, BeaconReply};
    use std::time::Duration as StdDuration;
    use tokio::sync::mpsc;

    async fn free_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    #[tokio::test]
    async fn three_replicas_form_a_full_mesh_and_exchange_a_beacon() {
        let addrs = vec![free_addr().await, free_addr().await, free_addr().await];

        let mut meshes = Vec::new();
        let mut beacon_rxs = Vec::new();
        for id in 0..3u32 {
            let (tx_b, rx_b) = mpsc::channel(8);
            let (tx_br, _rx_br) = mpsc::channel(8);
            let dispatcher = Arc::new(Dispatcher::new(tx_b, tx_br));
            let mesh = PeerMesh::spawn(id, addrs.clone(), dispatcher).await.unwrap();
            meshes.push(mesh);
            beacon_rxs.push(rx_b);
        }

        // Give the dial/accept handshakes time to complete.
        tokio::time::timeout(StdDuration::from_secs(5), async {
            loop {
                if meshes.iter().enumerate().all(|(i, m)| {
                    (0..3u32).filter(|&j| j != i as u32).all(|j| m.peer_alive(j))
                }) {
                    break;
                }
                tokio::time::sleep(StdDuration::from_millis(20)).await;
            }
        })
        .await
        .expect("mesh did not fully connect in time");

        meshes[0].send(1, qlease_messages::BEACON_TYPE_CODE, &Beacon { timestamp: 99 }).await.unwrap();
        let (sender, beacon) = beacon_rxs[1].recv().await.unwrap();
        assert_eq!(sender, 0);
        assert_eq!(beacon.timestamp, 99);
    }
}
