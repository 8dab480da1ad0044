use std::net::SocketAddr;

/// Default Promise duration: tens of milliseconds, per §3.
pub const DEFAULT_LEASE_DURATION_NS: i64 = 50_000_000;
/// Default Guard window: the grantor accepts a Promise from the sender for this long after a
/// Guard without requiring a fresh round.
pub const DEFAULT_GUARD_DURATION_NS: i64 = 10_000_000;
/// Default beacon period.
pub const DEFAULT_BEACON_PERIOD_MS: u64 = 1_000;
/// Default depth of the Propose channel, per §4.5.
pub const DEFAULT_PROPOSE_CHANNEL_CAPACITY: usize = 500_000;
/// Default depth of the Beacon inbound channel.
pub const DEFAULT_BEACON_CHANNEL_CAPACITY: usize = 1_024;

/// Typed, validated startup configuration for one replica.
///
/// `peers` is indexed by replica id; the entry at `id` is this replica's own bind address and is
/// never dialed.
#[derive(Clone, Debug)]
pub struct ReplicaConfig {
    pub id: u32,
    pub peers: Vec<SocketAddr>,
    pub lease_duration_ns: i64,
    pub guard_duration_ns: i64,
    pub beacon_period_ms: u64,
    pub propose_channel_capacity: usize,
    pub beacon_channel_capacity: usize,
}

impl ReplicaConfig {
    /// Builds a configuration for `id` among `peers`, with every tuneable at its spec default.
    pub fn new(id: u32, peers: Vec<SocketAddr>) -> Self {
        Self {
            id,
            peers,
            lease_duration_ns: DEFAULT_LEASE_DURATION_NS,
            guard_duration_ns: DEFAULT_GUARD_DURATION_NS,
            beacon_period_ms: DEFAULT_BEACON_PERIOD_MS,
            propose_channel_capacity: DEFAULT_PROPOSE_CHANNEL_CAPACITY,
            beacon_channel_capacity: DEFAULT_BEACON_CHANNEL_CAPACITY,
        }
    }

    pub fn num_replicas(&self) -> usize {
        self.peers.len()
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.peers
            .get(self.id as usize)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("replica id {} has no entry in the peer list", self.id))
    }

    /// Validates the shape of this configuration: a non-empty, in-range id and strictly positive
    /// durations. Called at startup; failures here are fatal, matching §7's "Stable-store
    /// creation"-class startup errors.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.peers.is_empty(), "replica set must be non-empty");
        anyhow::ensure!((self.id as usize) < self.peers.len(), "replica id {} is out of range for N={}", self.id, self.peers.len());
        anyhow::ensure!(self.lease_duration_ns > 0, "lease_duration_ns must be positive");
        anyhow::ensure!(self.guard_duration_ns > 0, "guard_duration_ns must be positive");
        anyhow::ensure!(self.propose_channel_capacity > 0, "propose_channel_capacity must be positive");
        Ok(())
    }
}
