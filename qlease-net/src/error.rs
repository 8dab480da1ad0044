use thiserror::Error;

/// Transport-boundary errors. Per the lease core's error-handling policy, these are caught at the
/// call site and folded into a peer's `alive` flag or a stale-drop counter — they never propagate
/// up to the consensus layer as a hard failure.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("peer {0} is not connected")]
    NotConnected(u32),
    #[error("peer id {0} is out of range for a mesh of size {1}")]
    UnknownPeer(u32, usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
