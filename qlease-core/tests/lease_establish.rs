//! End-to-end exercise of §8 S1: three replicas form a mesh, each establishes a lease against
//! the other two, and every replica's `read_locally_until` eventually reflects a majority
//! (two-of-three, counting self) of promises.

use qlease_core::{config::ReplicaConfig, replica, SystemClock};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;

async fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test]
async fn three_replicas_converge_on_nonzero_gate_horizons() {
    let addrs = vec![free_addr().await, free_addr().await, free_addr().await];

    let mut handles = Vec::new();
    for id in 0..3u32 {
        let mut config = ReplicaConfig::new(id, addrs.clone());
        // Tight durations so the test converges quickly without waiting on the default
        // tens-of-milliseconds lease window.
        config.lease_duration_ns = 200_000_000;
        config.guard_duration_ns = 100_000_000;
        let handle = replica::spawn(config, Arc::new(SystemClock)).await.unwrap();
        handles.push(handle);
    }

    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if handles.iter().all(|h| h.gate().read_locally_until() > 0) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("gate horizons did not converge to a nonzero value in time");

    for handle in &handles {
        assert!(handle.gate().write_in_quorum_until() > 0, "write gate must reflect outstanding grants");
    }

    for handle in handles {
        handle.shutdown();
    }
}
