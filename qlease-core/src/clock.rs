use std::{
    sync::atomic::{AtomicI64, AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

/// A monotonic time source for the lease protocol.
///
/// The protocol only ever compares timestamps it produced itself against each other, so the
/// only real requirement is monotonicity; the unit is nanoseconds to match the wire format's
/// `timestamp_ns: i64` fields. A separate, coarser cycle counter feeds the beacon/EWMA latency
/// estimate, since that value never crosses the wire as an absolute timestamp.
pub trait Clock: Send + Sync + 'static {
    /// The current time, in nanoseconds, for use in lease horizons.
    fn now_ns(&self) -> i64;

    /// A free-running counter used only to measure beacon round-trip latency.
    fn now_cycles(&self) -> u64 {
        self.now_ns() as u64
    }
}

/// The production clock: wall-clock nanoseconds since the Unix epoch.
///
/// `SystemTime` is not strictly monotonic across NTP adjustments, but within the lifetime of a
/// single replica process the lease protocol only needs "not observably backwards between two
/// calls issued by this task," which holds in practice; see the design notes on why the core
/// does not persist lease state across restarts.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ns(&self) -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before the Unix epoch").as_nanos() as i64
    }
}

/// A fake clock for deterministic tests: callers advance it explicitly with [`FakeClock::advance`]
/// or pin it with [`FakeClock::set`].
#[derive(Debug, Default)]
pub struct FakeClock {
    now_ns: AtomicI64,
    cycles: AtomicU64,
}

impl FakeClock {
    pub fn new(start_ns: i64) -> Self {
        Self { now_ns: AtomicI64::new(start_ns), cycles: AtomicU64::new(0) }
    }

    pub fn set(&self, now_ns: i64) {
        self.now_ns.store(now_ns, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ns: i64) {
        self.now_ns.fetch_add(delta_ns, Ordering::SeqCst);
    }

    pub fn advance_cycles(&self, delta: u64) {
        self.cycles.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_ns(&self) -> i64 {
        self.now_ns.load(Ordering::SeqCst)
    }

    fn now_cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }
}
