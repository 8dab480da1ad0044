use std::sync::atomic::{AtomicI64, Ordering};

/// The two scalars the consensus layer above this core queries to decide whether a read may be
/// served locally and whether a write may be committed.
///
/// Published by the single task that owns [`crate::LeaseState`] after every mutation, and read
/// from any number of other tasks without taking a lock — mirroring the teacher's
/// `leader_certificate_timer: Arc<AtomicI64>` pattern for a value one task writes and many read.
#[derive(Debug, Default)]
pub struct Gate {
    read_locally_until: AtomicI64,
    write_in_quorum_until: AtomicI64,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// The future timestamp up to which this replica may answer a read without a round trip.
    pub fn read_locally_until(&self) -> i64 {
        self.read_locally_until.load(Ordering::Acquire)
    }

    /// The future timestamp after which a write may be committed without waiting for outstanding
    /// grants elsewhere to expire.
    pub fn write_in_quorum_until(&self) -> i64 {
        self.write_in_quorum_until.load(Ordering::Acquire)
    }

    /// Whether a read at `now` may be served locally without consulting the quorum.
    pub fn can_read_locally(&self, now: i64) -> bool {
        now < self.read_locally_until()
    }

    /// Whether a write may be committed at `now` without waiting on outstanding grants.
    pub fn can_commit_write(&self, now: i64) -> bool {
        now > self.write_in_quorum_until()
    }

    pub(crate) fn publish(&self, read_locally_until: i64, write_in_quorum_until: i64) {
        self.read_locally_until.store(read_locally_until, Ordering::Release);
        self.write_in_quorum_until.store(write_in_quorum_until, Ordering::Release);
    }
}
