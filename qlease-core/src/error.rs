use thiserror::Error;

/// Fatal startup-time errors. Per §7, only stable-store creation failure and configuration
/// validation are fatal; every runtime error (transient network, protocol staleness, unknown RPC
/// codes) is absorbed into the peer `alive` flag or a stale-drop counter and never reaches here.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid replica configuration: {0}")]
    InvalidConfig(#[source] anyhow::Error),
    #[error("failed to create the stable-store file: {0}")]
    StableStore(#[source] std::io::Error),
    #[error(transparent)]
    Net(#[from] qlease_net::NetError),
}
