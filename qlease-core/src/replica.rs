use crate::{
    beacon::Beacons,
    channels::{beacon_action, BeaconAction},
    clock::Clock,
    config::ReplicaConfig,
    gate::Gate,
    lease::{LeaseState, PromiseOutcome, PromiseReplyOutcome},
};
use qlease_messages::{Beacon, BeaconReply, Guard, GuardReply, Promise, PromiseReply, BEACON_REPLY_TYPE_CODE, BEACON_TYPE_CODE};
use qlease_net::{Dispatcher, PeerMesh, TypeCode};
use std::{
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc;

/// The minimum channel depth for the lease protocol's internal control messages. These are
/// low-volume (one Guard/Promise round per peer per lease period), unlike the client-facing
/// Propose channel which needs the ~500k depth from §4.5.
const LEASE_CONTROL_CHANNEL_CAPACITY: usize = 256;

/// A running replica: the peer mesh, the lease-protocol task that owns the single
/// [`LeaseState`], and the beacon task — wired together the way the layer above (the consensus
/// core, out of scope per §1) would embed this crate.
///
/// Handed out as an `Arc` because the gate and peer mesh are meant to be read from many tasks;
/// the lease state itself never leaves the task that owns it, per §5's single-writer model.
pub struct ReplicaHandle {
    mesh: Arc<PeerMesh>,
    gate: Arc<Gate>,
    beacons: Arc<Beacons>,
    latest_accepted_instance: Arc<AtomicI32>,
}

impl ReplicaHandle {
    pub fn mesh(&self) -> &Arc<PeerMesh> {
        &self.mesh
    }

    /// The two gate horizons the consensus layer above queries.
    pub fn gate(&self) -> &Arc<Gate> {
        &self.gate
    }

    pub fn beacons(&self) -> &Arc<Beacons> {
        &self.beacons
    }

    /// Informs the lease task of the latest instance accepted by the consensus algorithm above,
    /// so the next Promise or renewal it sends carries an up-to-date `latest_accepted_instance`.
    pub fn set_latest_accepted_instance(&self, instance: i32) {
        self.latest_accepted_instance.store(instance, Ordering::Release);
    }

    /// Stops all reader tasks at their next read (§5's shutdown-flag cancellation model).
    pub fn shutdown(&self) {
        self.mesh.shutdown();
    }
}

/// Binds the mesh, wires the RPC dispatcher, and spawns the lease and beacon tasks for `config`.
///
/// Returns once every task has been spawned; it does not block until the mesh fully connects —
/// callers observe that via [`PeerMesh::peer_alive`] on [`ReplicaHandle::mesh`].
pub async fn spawn(config: ReplicaConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Arc<ReplicaHandle>> {
    config.validate().map_err(crate::error::StartupError::InvalidConfig)?;
    let n = config.num_replicas();

    let (tx_guard, rx_guard) = mpsc::channel(LEASE_CONTROL_CHANNEL_CAPACITY);
    let (tx_guard_reply, rx_guard_reply) = mpsc::channel(LEASE_CONTROL_CHANNEL_CAPACITY);
    let (tx_promise, rx_promise) = mpsc::channel(LEASE_CONTROL_CHANNEL_CAPACITY);
    let (tx_promise_reply, rx_promise_reply) = mpsc::channel(LEASE_CONTROL_CHANNEL_CAPACITY);
    let (tx_beacon, rx_beacon) = mpsc::channel(config.beacon_channel_capacity);
    let (tx_beacon_reply, rx_beacon_reply) = mpsc::channel(config.beacon_channel_capacity);

    let dispatcher = Arc::new(Dispatcher::new(tx_beacon, tx_beacon_reply));
    let guard_code = dispatcher.register(tx_guard);
    let guard_reply_code = dispatcher.register(tx_guard_reply);
    let promise_code = dispatcher.register(tx_promise);
    let promise_reply_code = dispatcher.register(tx_promise_reply);

    let mesh = PeerMesh::spawn(config.id, config.peers.clone(), dispatcher).await?;

    let gate = Arc::new(Gate::new());
    let beacons = Arc::new(Beacons::new(config.id, n));
    let latest_accepted_instance = Arc::new(AtomicI32::new(0));

    let lease = LeaseState::new(config.id, n, config.lease_duration_ns, config.guard_duration_ns, clock.clone());
    // Renew at half the lease duration so a renewal always lands before the prior grant expires,
    // which is the precondition §4.3 relies on for the grantor's freshness check to keep passing.
    let renew_period = Duration::from_nanos((config.lease_duration_ns / 2).max(1) as u64);

    tokio::spawn(run_lease_task(
        lease,
        mesh.clone(),
        gate.clone(),
        latest_accepted_instance.clone(),
        guard_code,
        guard_reply_code,
        promise_code,
        promise_reply_code,
        rx_guard,
        rx_guard_reply,
        rx_promise,
        rx_promise_reply,
        renew_period,
    ));

    tokio::spawn(run_beacon_task(
        mesh.clone(),
        beacons.clone(),
        clock,
        rx_beacon,
        rx_beacon_reply,
        config.beacon_period_ms,
    ));

    Ok(Arc::new(ReplicaHandle { mesh, gate, beacons, latest_accepted_instance }))
}

#[allow(clippy::too_many_arguments)]
async fn run_lease_task(
    mut lease: LeaseState,
    mesh: Arc<PeerMesh>,
    gate: Arc<Gate>,
    latest_accepted_instance: Arc<AtomicI32>,
    guard_code: TypeCode,
    guard_reply_code: TypeCode,
    promise_code: TypeCode,
    promise_reply_code: TypeCode,
    mut rx_guard: mpsc::Receiver<(u32, Guard)>,
    mut rx_guard_reply: mpsc::Receiver<(u32, GuardReply)>,
    mut rx_promise: mpsc::Receiver<(u32, Promise)>,
    mut rx_promise_reply: mpsc::Receiver<(u32, PromiseReply)>,
    renew_period: Duration,
) {
    // `PeerMesh::spawn` only binds the listener and spawns dial/accept tasks; the mesh is not
    // necessarily connected yet when this task starts. `established` tracks whether this
    // replica has ever broadcast a Guard to the *full* peer set (not just whoever happened to
    // be alive on an earlier tick), so the first tick(s) of `renew_interval` re-attempt
    // establish() against newly-alive peers instead of renewing a lease nobody has granted.
    let mut renew_interval = tokio::time::interval(renew_period);
    let mut established = false;

    loop {
        tokio::select! {
            Some((sender, guard)) = rx_guard.recv() => {
                let reply = lease.handle_guard(sender, &guard);
                if let Err(error) = mesh.send(sender, guard_reply_code.0, &reply).await {
                    tracing::debug!(sender, %error, "failed to send GuardReply");
                }
            }
            Some((sender, reply)) = rx_guard_reply.recv() => {
                let instance = latest_accepted_instance.load(Ordering::Acquire);
                match lease.handle_guard_reply(sender, &reply, instance) {
                    Some(promise) => {
                        if let Err(error) = mesh.send(sender, promise_code.0, &promise).await {
                            tracing::debug!(sender, %error, "failed to send Promise");
                        }
                        publish(&lease, &gate);
                    }
                    None => tracing::trace!(sender, "dropped a stale GuardReply"),
                }
            }
            Some((sender, promise)) = rx_promise.recv() => {
                match lease.handle_promise(sender, &promise) {
                    PromiseOutcome::Dropped => tracing::trace!(sender, "dropped an unsolicited or post-guard-window Promise"),
                    PromiseOutcome::Rejected { reply } => {
                        if let Err(error) = mesh.send(sender, promise_reply_code.0, &reply).await {
                            tracing::debug!(sender, %error, "failed to send corrective PromiseReply");
                        }
                    }
                    PromiseOutcome::Accepted { reply } => {
                        if let Err(error) = mesh.send(sender, promise_reply_code.0, &reply).await {
                            tracing::debug!(sender, %error, "failed to send PromiseReply");
                        }
                    }
                }
                publish(&lease, &gate);
            }
            Some((sender, reply)) = rx_promise_reply.recv() => {
                match lease.handle_promise_reply(sender, &reply) {
                    PromiseReplyOutcome::Stale => tracing::trace!(sender, "dropped a stale PromiseReply"),
                    PromiseReplyOutcome::Rejected => {
                        tracing::warn!(sender, rejects = lease.promise_rejects(), "Promise rejected; instance must advance");
                        if lease.write_in_quorum_until() == 0 {
                            // Every peer has now rejected this instance (§8 S4): nobody holds
                            // this replica's lease anymore. Bump past it and fall back to a
                            // fresh establish() on the next tick instead of renewing a lease
                            // no one honors.
                            lease.bump_my_instance();
                            established = false;
                        }
                    }
                    PromiseReplyOutcome::Accepted => tracing::trace!(sender, "recorded an accepted PromiseReply"),
                }
                publish(&lease, &gate);
            }
            _ = renew_interval.tick() => {
                let alive = mesh.alive_peer_ids();
                if established {
                    let instance = latest_accepted_instance.load(Ordering::Acquire);
                    for (peer, promise) in lease.renew(&alive, instance) {
                        if let Err(error) = mesh.send(peer, promise_code.0, &promise).await {
                            tracing::debug!(peer, %error, "renewal send failed");
                        }
                    }
                } else if alive.is_empty() {
                    tracing::trace!("no alive peers yet; deferring lease establishment");
                } else {
                    let guard = lease.establish();
                    for &peer in &alive {
                        if let Err(error) = mesh.send(peer, guard_code.0, &guard).await {
                            tracing::debug!(peer, %error, "failed to send Guard");
                        }
                    }
                    // Only switch to renewal mode once every peer has been reached; on a
                    // partially-connected mesh the next tick re-broadcasts Guard to whichever
                    // peers are alive by then, rather than silently skipping the late joiners.
                    established = alive.len() + 1 == mesh.num_replicas();
                }
                publish(&lease, &gate);
            }
        }
    }
}

fn publish(lease: &LeaseState, gate: &Gate) {
    gate.publish(lease.read_locally_until(), lease.write_in_quorum_until());
}

async fn run_beacon_task(
    mesh: Arc<PeerMesh>,
    beacons: Arc<Beacons>,
    clock: Arc<dyn Clock>,
    mut rx_beacon: mpsc::Receiver<(u32, Beacon)>,
    mut rx_beacon_reply: mpsc::Receiver<(u32, BeaconReply)>,
    period_ms: u64,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(period_ms.max(1)));
    loop {
        tokio::select! {
            Some((sender, beacon)) = rx_beacon.recv() => {
                let BeaconAction::ReplyBeacon { to, timestamp } = beacon_action(sender, &beacon);
                let reply = BeaconReply { timestamp };
                if let Err(error) = mesh.send(to, BEACON_REPLY_TYPE_CODE, &reply).await {
                    tracing::debug!(sender, %error, "failed to send BeaconReply");
                }
            }
            Some((sender, reply)) = rx_beacon_reply.recv() => {
                beacons.record_reply(sender, clock.now_cycles(), &reply);
            }
            _ = interval.tick() => {
                let beacon = Beacon { timestamp: clock.now_cycles() };
                mesh.broadcast(BEACON_TYPE_CODE, &beacon).await;
            }
        }
    }
}
