use parking_lot::Mutex;
use qlease_messages::{Beacon, BeaconReply};

/// Smoothing factor for the round-trip EWMA: `ewma := ALPHA * ewma + (1 - ALPHA) * sample`.
const EWMA_ALPHA: f64 = 0.99;

/// Per-peer round-trip latency estimation and preferred-peer ordering, per §4.4.
///
/// A [`Beacon`] is echoed immediately on receipt (see [`crate::replica`]); the originator feeds
/// the round trip into an exponentially weighted moving average here. `preferred_order` is
/// reordered on demand by [`Beacons::update_preferred_peer_order`] so that higher layers can
/// contact a quorum's likely-fastest members first.
pub struct Beacons {
    self_id: u32,
    ewma_cycles: Mutex<Vec<f64>>,
    preferred_order: Mutex<Vec<u32>>,
}

impl Beacons {
    /// Builds tracking for `n` replicas, with an initial preferred order of every other replica
    /// in ascending id order.
    pub fn new(self_id: u32, n: usize) -> Self {
        let preferred_order = (0..n as u32).filter(|&id| id != self_id).collect();
        Self { self_id, ewma_cycles: Mutex::new(vec![0.0; n]), preferred_order: Mutex::new(preferred_order) }
    }

    /// Builds the [`BeaconReply`] to send back immediately on receipt of `beacon`.
    pub fn reply_to(beacon: &Beacon) -> BeaconReply {
        BeaconReply { timestamp: beacon.timestamp }
    }

    /// Records a round-trip sample for `peer`, given the current cycle counter.
    pub fn record_reply(&self, peer: u32, now_cycles: u64, reply: &BeaconReply) {
        let sample = now_cycles.saturating_sub(reply.timestamp) as f64;
        let mut ewma = self.ewma_cycles.lock();
        let idx = peer as usize;
        ewma[idx] = EWMA_ALPHA * ewma[idx] + (1.0 - EWMA_ALPHA) * sample;
    }

    /// The current EWMA round-trip estimate for `peer`, in cycles.
    pub fn latency_estimate(&self, peer: u32) -> f64 {
        self.ewma_cycles.lock()[peer as usize]
    }

    /// The current preferred peer order (self excluded).
    pub fn preferred_order(&self) -> Vec<u32> {
        self.preferred_order.lock().clone()
    }

    /// Reorders the preferred peer list so that `quorum`'s members (excluding self) come first,
    /// in the order given, followed by the remaining peers in their previous relative order.
    pub fn update_preferred_peer_order(&self, quorum: &[u32]) {
        let mut order = self.preferred_order.lock();
        *order = reorder_for_quorum(&order, quorum, self.self_id);
    }
}

/// Pure reordering helper underlying [`Beacons::update_preferred_peer_order`]; split out so it
/// can be unit tested without a [`Beacons`] instance (§8 S6).
fn reorder_for_quorum(current: &[u32], quorum: &[u32], self_id: u32) -> Vec<u32> {
    let mut reordered: Vec<u32> = quorum.iter().copied().filter(|&id| id != self_id).collect();
    for &id in current {
        if !reordered.contains(&id) {
            reordered.push(id);
        }
    }
    reordered
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S6: PreferredPeerOrder = [1,2,3,4], self=0, quorum=[0,3,1] -> [3,1,2,4].
    #[test]
    fn s6_preferred_order_promotes_quorum_members_first() {
        let current = [1u32, 2, 3, 4];
        let quorum = [0u32, 3, 1];
        assert_eq!(reorder_for_quorum(&current, &quorum, 0), vec![3, 1, 2, 4]);
    }

    #[test]
    fn update_preferred_peer_order_mutates_in_place() {
        let beacons = Beacons::new(0, 5);
        assert_eq!(beacons.preferred_order(), vec![1, 2, 3, 4]);
        beacons.update_preferred_peer_order(&[0, 3, 1]);
        assert_eq!(beacons.preferred_order(), vec![3, 1, 2, 4]);
    }

    #[test]
    fn record_reply_updates_the_ewma_towards_the_sample() {
        let beacons = Beacons::new(0, 3);
        assert_eq!(beacons.latency_estimate(1), 0.0);
        beacons.record_reply(1, 1_000, &BeaconReply { timestamp: 0 });
        assert!(beacons.latency_estimate(1) > 0.0);
    }
}
