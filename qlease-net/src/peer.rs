use crate::error::NetError;
use std::{
    net::SocketAddr,
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::{io::BufWriter, net::tcp::OwnedWriteHalf, sync::Mutex};

/// Bookkeeping for one other replica: its address, the live write half of the connection (if
/// any), a liveness bit, and the per-peer send mutex that serializes writes to the socket.
///
/// Peer records are created at startup and never destroyed. `alive` is sticky-false once a send
/// fails — this core does not reconnect; a supervisor above it may replace the mesh entirely.
pub struct PeerHandle {
    pub id: u32,
    pub addr: SocketAddr,
    writer: Mutex<Option<BufWriter<OwnedWriteHalf>>>,
    alive: AtomicBool,
}

impl PeerHandle {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self { id, addr, writer: Mutex::new(None), alive: AtomicBool::new(false) }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Installs a freshly dialed or accepted connection's write half, marking the peer alive.
    pub(crate) async fn attach(&self, write_half: OwnedWriteHalf) {
        *self.writer.lock().await = Some(BufWriter::new(write_half));
        self.alive.store(true, Ordering::Release);
    }

    /// Writes `type_code` followed by `payload` and flushes, under the per-peer send mutex.
    ///
    /// A write or flush failure marks the peer not-alive and is surfaced to the caller; there is
    /// no retry at this layer.
    pub(crate) async fn send_framed(&self, type_code: u8, payload: &[u8]) -> Result<(), NetError> {
        use tokio::io::AsyncWriteExt;

        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(NetError::NotConnected(self.id));
        };

        let result: std::io::Result<()> = async {
            writer.write_u8(type_code).await?;
            writer.write_all(payload).await?;
            writer.flush().await?;
            Ok(())
        }
        .await;

        if let Err(error) = result {
            self.alive.store(false, Ordering::Release);
            return Err(NetError::Io(error));
        }
        Ok(())
    }
}
