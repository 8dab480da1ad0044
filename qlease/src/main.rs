// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.

//! A minimal replica process that wires [`qlease_core`] into a runnable binary.
//!
//! This is not the client command-line interface the owning specification excludes from scope:
//! there are no subcommands and no client-facing protocol handling here, only the executable
//! shell a production node binary would embed the lease core into — a peer mesh, a lease task,
//! and a beacon task, reporting the two gate horizons on an interval until the process is killed.

use clap::Parser;
use qlease_core::{config::ReplicaConfig, replica, stable_store, SystemClock};
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

/// Starts one replica of a quorum-lease cluster.
#[derive(Parser, Debug)]
#[command(name = "qlease", version, about)]
struct Args {
    /// This replica's id, in `[0, peers.len())`.
    #[arg(long)]
    id: u32,

    /// Every replica's bind address, indexed by id (including this replica's own).
    #[arg(long, value_delimiter = ',', required = true)]
    peers: Vec<SocketAddr>,

    /// Directory holding this replica's `stable-store-replica{id}` file.
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Nominal lease duration, in nanoseconds.
    #[arg(long)]
    lease_duration_ns: Option<i64>,

    /// Guard window duration, in nanoseconds.
    #[arg(long)]
    guard_duration_ns: Option<i64>,

    /// Logging verbosity; repeat for more detail (e.g. `-vv`).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn initialize_logger(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", level);
    }
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    tracing_subscriber::fmt().with_env_filter(filter).with_target(verbosity > 1).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    initialize_logger(args.verbose);

    // Opening the stable-store file is fatal at startup (§7); this core never reads it back, it
    // is only the opaque append-only sink a consensus layer above would write durable records to.
    let _stable_store = stable_store::open_stable_store(&args.data_dir, args.id)?;

    let mut config = ReplicaConfig::new(args.id, args.peers);
    if let Some(lease_duration_ns) = args.lease_duration_ns {
        config.lease_duration_ns = lease_duration_ns;
    }
    if let Some(guard_duration_ns) = args.guard_duration_ns {
        config.guard_duration_ns = guard_duration_ns;
    }

    tracing::info!(id = config.id, n = config.num_replicas(), "starting replica");
    let handle = replica::spawn(config, Arc::new(SystemClock)).await?;

    let mut report = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = report.tick() => {
                let gate = handle.gate();
                tracing::info!(
                    read_locally_until = gate.read_locally_until(),
                    write_in_quorum_until = gate.write_in_quorum_until(),
                    "gate status"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                handle.shutdown();
                return Ok(());
            }
        }
    }
}
