use crate::clock::Clock;
use qlease_messages::{Guard, GuardReply, Promise, PromiseReply};
use std::sync::Arc;

/// The outcome of handling an inbound [`Promise`] at the grantor side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromiseOutcome {
    /// The promise was unsolicited (no live guard window, no existing grant) and was dropped.
    /// §4.3 notes a NACK could be added here as an optimization; this core does not send one.
    Dropped,
    /// The sender's `lease_instance` is behind ours; `reply` carries the instance it must adopt.
    Rejected { reply: PromiseReply },
    /// The grant was recorded; `reply` acknowledges it.
    Accepted { reply: PromiseReply },
}

/// The outcome of handling an inbound [`PromiseReply`] at the grantee side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseReplyOutcome {
    /// The reply predates `latest_ts_sent` and was dropped.
    Stale,
    /// The reply carries a higher instance than we offered; `promise_rejects` was incremented.
    Rejected,
    /// The grantor accepted our promise; its horizon was recorded.
    Accepted,
}

/// Per-replica lease bookkeeping: who this replica promises to, who promises it, and the two
/// gate horizons derived from those promises.
///
/// A single [`LeaseState`] is simultaneously grantee to some peers and grantor to others (§4.3).
/// It is not internally synchronized: per §5, exactly one task is expected to own and mutate it,
/// which is why every method here takes `&mut self` rather than acquiring a lock.
pub struct LeaseState {
    id: u32,
    n: usize,
    duration_ns: i64,
    guard_duration_ns: i64,

    promised_by_me_inst: i32,
    promised_to_me_inst: i32,
    latest_ts_sent: i64,

    guard_expires: Vec<i64>,
    latest_promises_received: Vec<i64>,
    latest_replies_received: Vec<i64>,
    last_reply_received_timestamp: Vec<i64>,

    write_in_quorum_until: i64,
    read_locally_until: i64,
    promise_rejects: u32,

    clock: Arc<dyn Clock>,
}

impl LeaseState {
    pub fn new(id: u32, n: usize, duration_ns: i64, guard_duration_ns: i64, clock: Arc<dyn Clock>) -> Self {
        assert!((id as usize) < n, "replica id {id} is out of range for N={n}");
        Self {
            id,
            n,
            duration_ns,
            guard_duration_ns,
            promised_by_me_inst: 0,
            promised_to_me_inst: 0,
            latest_ts_sent: 0,
            guard_expires: vec![0; n],
            latest_promises_received: vec![0; n],
            latest_replies_received: vec![0; n],
            last_reply_received_timestamp: vec![0; n],
            write_in_quorum_until: 0,
            read_locally_until: 0,
            promise_rejects: 0,
            clock,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn read_locally_until(&self) -> i64 {
        self.read_locally_until
    }

    pub fn write_in_quorum_until(&self) -> i64 {
        self.write_in_quorum_until
    }

    pub fn promised_by_me_inst(&self) -> i32 {
        self.promised_by_me_inst
    }

    pub fn promised_to_me_inst(&self) -> i32 {
        self.promised_to_me_inst
    }

    pub fn promise_rejects(&self) -> u32 {
        self.promise_rejects
    }

    pub fn latest_promises_received(&self, peer: u32) -> i64 {
        self.latest_promises_received[peer as usize]
    }

    pub fn latest_replies_received(&self, peer: u32) -> i64 {
        self.latest_replies_received[peer as usize]
    }

    pub fn last_reply_received_timestamp(&self, peer: u32) -> i64 {
        self.last_reply_received_timestamp[peer as usize]
    }

    /// Advances `promised_by_me_inst` to a new lease instance, invalidating any prior grant a
    /// peer might still believe is current. Called by the layer above after a full rejection
    /// (§8 S4) before retrying [`LeaseState::establish`].
    pub fn bump_my_instance(&mut self) -> i32 {
        self.promised_by_me_inst += 1;
        self.promised_by_me_inst
    }

    /// Begins establishing a lease: stamps `latest_ts_sent`, clears `promise_rejects`, and
    /// returns the single [`Guard`] to broadcast to every alive peer except self.
    pub fn establish(&mut self) -> Guard {
        let now = self.clock.now_ns();
        self.latest_ts_sent = now;
        self.promise_rejects = 0;
        Guard { replica_id: self.id as i32, timestamp_ns: now, guard_duration_ns: self.guard_duration_ns }
    }

    /// Grantor side: records the guard window and returns the [`GuardReply`] to send back.
    pub fn handle_guard(&mut self, sender: u32, guard: &Guard) -> GuardReply {
        let now = self.clock.now_ns();
        self.guard_expires[sender as usize] = now + guard.guard_duration_ns;
        GuardReply { replica_id: self.id as i32, timestamp_ns: guard.timestamp_ns }
    }

    /// Grantee side: on a fresh [`GuardReply`], builds the [`Promise`] to send to `sender` and
    /// provisionally raises `write_in_quorum_until`. Returns `None` if the reply is stale.
    pub fn handle_guard_reply(
        &mut self,
        sender: u32,
        reply: &GuardReply,
        latest_accepted_instance: i32,
    ) -> Option<Promise> {
        if reply.timestamp_ns < self.latest_ts_sent {
            return None;
        }
        let now = self.clock.now_ns();
        let promise = Promise {
            replica_id: self.id as i32,
            lease_instance: self.promised_by_me_inst,
            timestamp_ns: now,
            duration_ns: self.duration_ns,
            latest_accepted_instance,
        };
        let horizon = now + self.guard_duration_ns + self.duration_ns;
        self.latest_replies_received[sender as usize] = horizon;
        self.write_in_quorum_until = self.write_in_quorum_until.max(horizon);
        Some(promise)
    }

    /// Grantor side: the full freshness/instance-ordering/record-grant/recompute pipeline of
    /// §4.3. Always returns the action the caller must take (send a reply, or nothing).
    pub fn handle_promise(&mut self, sender: u32, promise: &Promise) -> PromiseOutcome {
        let now = self.clock.now_ns();
        let sender_idx = sender as usize;

        // 1. Freshness check: reject anything that arrived unsolicited or after the guard
        // window closed, unless there's already a live grant from a prior round.
        if self.latest_promises_received[sender_idx] < now && self.guard_expires[sender_idx] < now {
            return PromiseOutcome::Dropped;
        }

        // 2. Instance ordering.
        if promise.lease_instance < self.promised_to_me_inst {
            let reply = PromiseReply {
                replica_id: self.id as i32,
                lease_instance: self.promised_to_me_inst,
                timestamp_ns: promise.timestamp_ns,
            };
            return PromiseOutcome::Rejected { reply };
        }
        if promise.lease_instance > self.promised_to_me_inst {
            self.promised_to_me_inst = promise.lease_instance;
            self.latest_promises_received.iter_mut().for_each(|v| *v = 0);
        }

        // 3. Record the grant.
        self.latest_promises_received[sender_idx] = now + promise.duration_ns;

        // 4. Acknowledge.
        let reply = PromiseReply {
            replica_id: self.id as i32,
            lease_instance: self.promised_to_me_inst,
            timestamp_ns: promise.timestamp_ns,
        };

        // 5. Recompute read_locally_until.
        self.recompute_read_locally_until();

        PromiseOutcome::Accepted { reply }
    }

    /// The median-high order statistic over `latest_promises_received` with the self slot
    /// zeroed, per §4.3 step 5 and §9's "self-exclusion in median" note.
    ///
    /// Implemented as index `N / 2` (integer division) into the ascending-sorted array. This is
    /// the floor(N/2)-th order statistic, the largest threshold still backed by a majority
    /// (`ceil(N/2)` entries, counting the zeroed self slot) having matched or exceeded it — see
    /// `DESIGN.md` for why this core picks that index over the literal worked arithmetic in the
    /// owning specification, which would let a single grantor's promise leak through as a
    /// majority-backed horizon.
    fn recompute_read_locally_until(&mut self) {
        let mut scratch = self.latest_promises_received.clone();
        scratch[self.id as usize] = 0;
        scratch.sort_unstable();
        self.read_locally_until = scratch[self.n / 2];
    }

    /// Grantee side: consumes a [`PromiseReply`], updating rejection/acceptance bookkeeping.
    pub fn handle_promise_reply(&mut self, sender: u32, pr: &PromiseReply) -> PromiseReplyOutcome {
        if pr.timestamp_ns < self.latest_ts_sent {
            return PromiseReplyOutcome::Stale;
        }
        if pr.lease_instance > self.promised_by_me_inst {
            self.promise_rejects += 1;
            // The sender rejected this instance and no longer honors any grant it previously
            // recorded for us; clear its horizon so a later Accepted reply from a different peer
            // can't resurrect this stale entry through the max-fold below.
            self.latest_replies_received[sender as usize] = 0;
            // All N-1 peers (every other replica) have now rejected: no one holds this
            // replica's lease, so the write gate falls back to unconstrained. The owning
            // specification phrases the threshold as "reaches N", but this core has only N-1
            // peers to hear from, so N-1 is the count that is actually reachable.
            if self.promise_rejects as usize >= self.n - 1 {
                self.write_in_quorum_until = 0;
            }
            return PromiseReplyOutcome::Rejected;
        }

        let now = self.clock.now_ns();
        self.latest_replies_received[sender as usize] = now + self.duration_ns;
        self.write_in_quorum_until = self
            .latest_replies_received
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != self.id as usize)
            .map(|(_, v)| *v)
            .fold(now, i64::max);
        self.last_reply_received_timestamp[sender as usize] = now;
        PromiseReplyOutcome::Accepted
    }

    /// Re-broadcasts a fresh [`Promise`] to every peer in `alive_peers`, without a preceding
    /// Guard round, extending the write gate pessimistically by `duration_ns`.
    ///
    /// The shortcut is only safe because renewals must land before the prior lease expires —
    /// otherwise the grantor's freshness check in [`LeaseState::handle_promise`] discounts them —
    /// so the `+=` extension below can never under-approximate the true horizon (§4.3).
    pub fn renew(&mut self, alive_peers: &[u32], latest_accepted_instance: i32) -> Vec<(u32, Promise)> {
        let now = self.clock.now_ns();
        self.promise_rejects = 0;

        let mut outbound = Vec::with_capacity(alive_peers.len());
        for &peer in alive_peers {
            self.latest_replies_received[peer as usize] += self.duration_ns;
            outbound.push((
                peer,
                Promise {
                    replica_id: self.id as i32,
                    lease_instance: self.promised_by_me_inst,
                    timestamp_ns: now,
                    duration_ns: self.duration_ns,
                    latest_accepted_instance,
                },
            ));
        }

        self.latest_ts_sent = now;
        self.write_in_quorum_until += self.duration_ns;
        outbound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    fn lease(id: u32, n: usize, clock: &Arc<FakeClock>) -> LeaseState {
        LeaseState::new(id, n, 30_000_000, 10_000_000, clock.clone())
    }

    /// S1: three-replica lease establish. Replica 0 establishes against {1, 2}; each peer
    /// accumulates promises from 0 and only reaches a nonzero, majority-backed
    /// `read_locally_until` once it has a second grantor.
    #[test]
    fn s1_three_replica_establish_needs_two_grantors_for_a_nonzero_horizon() {
        let clock = Arc::new(FakeClock::new(1_000_000_000));
        let mut replica1 = lease(1, 3, &clock);

        // Replica 0's Guard round-trip already happened; replica 1 now receives 0's Promise.
        let promise_from_0 = Promise {
            replica_id: 0,
            lease_instance: 0,
            timestamp_ns: clock.now_ns(),
            duration_ns: 30_000_000,
            latest_accepted_instance: 0,
        };
        // Open the guard window so the freshness check passes, as handle_guard would have.
        replica1.guard_expires[0] = clock.now_ns() + 10_000_000;
        let outcome = replica1.handle_promise(0, &promise_from_0);
        assert!(matches!(outcome, PromiseOutcome::Accepted { .. }));
        assert_eq!(replica1.read_locally_until(), 0, "a single grantor must not unblock local reads");

        // A second grantor (replica 2) now promises as well.
        replica1.guard_expires[2] = clock.now_ns() + 10_000_000;
        let promise_from_2 = Promise {
            replica_id: 2,
            lease_instance: 0,
            timestamp_ns: clock.now_ns(),
            duration_ns: 30_000_000,
            latest_accepted_instance: 0,
        };
        let outcome = replica1.handle_promise(2, &promise_from_2);
        assert!(matches!(outcome, PromiseOutcome::Accepted { .. }));
        assert_eq!(
            replica1.read_locally_until(),
            clock.now_ns() + 30_000_000,
            "with two grantors the horizon must equal the smaller (here: equal) of the two grants"
        );
    }

    /// S2: a stale PromiseReply (timestamp predates latest_ts_sent) changes nothing.
    #[test]
    fn s2_stale_reply_is_dropped() {
        let clock = Arc::new(FakeClock::new(1_000));
        let mut replica = lease(0, 3, &clock);
        replica.latest_ts_sent = 1_000;
        let before_gate = replica.write_in_quorum_until();
        let before_ts = replica.last_reply_received_timestamp(1);

        let reply = PromiseReply { replica_id: 1, lease_instance: 0, timestamp_ns: 900 };
        let outcome = replica.handle_promise_reply(1, &reply);

        assert_eq!(outcome, PromiseReplyOutcome::Stale);
        assert_eq!(replica.write_in_quorum_until(), before_gate);
        assert_eq!(replica.last_reply_received_timestamp(1), before_ts);
    }

    /// S3: a higher lease_instance bumps promised_to_me_inst and zeros every prior grant except
    /// the sender's freshly recorded one.
    #[test]
    fn s3_instance_bump_resets_other_grants() {
        let clock = Arc::new(FakeClock::new(0));
        let mut replica = lease(0, 4, &clock);
        replica.promised_to_me_inst = 5;
        replica.latest_promises_received = vec![999, 999, 999, 999];
        replica.guard_expires[1] = 1;

        let promise = Promise { replica_id: 1, lease_instance: 7, timestamp_ns: 0, duration_ns: 40, latest_accepted_instance: 0 };
        let outcome = replica.handle_promise(1, &promise);

        assert!(matches!(outcome, PromiseOutcome::Accepted { .. }));
        assert_eq!(replica.promised_to_me_inst(), 7);
        for (peer, &value) in replica.latest_promises_received.iter().enumerate() {
            if peer == 1 {
                assert_eq!(value, 40);
            } else {
                assert_eq!(value, 0);
            }
        }
    }

    /// S4: once every other replica rejects with a higher instance, write_in_quorum_until is
    /// forced to zero — no one holds this replica's lease anymore.
    #[test]
    fn s4_full_rejection_zeroes_the_write_gate() {
        let clock = Arc::new(FakeClock::new(5_000));
        let mut replica = lease(0, 3, &clock);
        replica.latest_ts_sent = 0;
        replica.write_in_quorum_until = 123_456;

        let reply1 = PromiseReply { replica_id: 1, lease_instance: 99, timestamp_ns: 10_000 };
        assert_eq!(replica.handle_promise_reply(1, &reply1), PromiseReplyOutcome::Rejected);
        assert_eq!(replica.promise_rejects(), 1);
        assert_ne!(replica.write_in_quorum_until(), 0, "gate must not zero until every peer has rejected");

        let reply2 = PromiseReply { replica_id: 2, lease_instance: 99, timestamp_ns: 10_000 };
        assert_eq!(replica.handle_promise_reply(2, &reply2), PromiseReplyOutcome::Rejected);
        assert_eq!(replica.promise_rejects(), 2);
        assert_eq!(replica.write_in_quorum_until(), 0, "once all N-1 peers reject, the write gate must zero");
    }

    /// S5: renewal math — write_in_quorum_until grows by exactly `duration_ns`, and every alive
    /// peer's recorded horizon grows by the same amount, before any reply is processed.
    #[test]
    fn s5_renewal_extends_the_write_gate_by_duration() {
        let clock = Arc::new(FakeClock::new(1_000_000));
        let mut replica = lease(0, 4, &clock);
        replica.write_in_quorum_until = 2_000_000;
        replica.latest_replies_received = vec![0, 500_000, 700_000, 0];

        let before = replica.write_in_quorum_until();
        let outbound = replica.renew(&[1, 2], 0);

        assert_eq!(outbound.len(), 2);
        assert_eq!(replica.write_in_quorum_until(), before + 30_000_000);
        assert_eq!(replica.latest_replies_received(1), 500_000 + 30_000_000);
        assert_eq!(replica.latest_replies_received(2), 700_000 + 30_000_000);
        assert_eq!(replica.promise_rejects(), 0);
    }

    #[test]
    fn establish_stamps_latest_ts_sent_and_clears_rejects() {
        let clock = Arc::new(FakeClock::new(42));
        let mut replica = lease(0, 3, &clock);
        replica.promise_rejects = 7;
        let guard = replica.establish();
        assert_eq!(guard.replica_id, 0);
        assert_eq!(guard.timestamp_ns, 42);
        assert_eq!(replica.promise_rejects(), 0);
    }

    #[test]
    fn handle_promise_too_low_instance_sends_corrective_reply_and_does_not_record_grant() {
        let clock = Arc::new(FakeClock::new(0));
        let mut replica = lease(0, 3, &clock);
        replica.promised_to_me_inst = 9;
        replica.guard_expires[1] = 100;

        let promise = Promise { replica_id: 1, lease_instance: 3, timestamp_ns: 0, duration_ns: 10, latest_accepted_instance: 0 };
        match replica.handle_promise(1, &promise) {
            PromiseOutcome::Rejected { reply } => assert_eq!(reply.lease_instance, 9),
            other => panic!("expected Rejected, got {other:?}"),
        }
        assert_eq!(replica.latest_promises_received(1), 0);
    }

    #[test]
    fn handle_promise_unsolicited_is_dropped() {
        let clock = Arc::new(FakeClock::new(1_000));
        let replica_n = 3;
        let mut replica = lease(0, replica_n, &clock);
        // No guard was sent, no grant exists: both halves of the freshness check fail.
        let promise = Promise { replica_id: 1, lease_instance: 0, timestamp_ns: 1_000, duration_ns: 10, latest_accepted_instance: 0 };
        assert_eq!(replica.handle_promise(1, &promise), PromiseOutcome::Dropped);
    }

    #[test]
    fn handle_guard_reply_drops_stale_replies() {
        let clock = Arc::new(FakeClock::new(5_000));
        let mut replica = lease(0, 3, &clock);
        replica.latest_ts_sent = 5_000;
        let stale = GuardReply { replica_id: 1, timestamp_ns: 4_999 };
        assert!(replica.handle_guard_reply(1, &stale, 0).is_none());
    }
}
