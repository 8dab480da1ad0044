// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
// http://www.apache.org/licenses/LICENSE-2.0

// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![allow(clippy::type_complexity)]

//! The quorum-lease protocol state machine, gate, and replica runtime.
//!
//! This crate owns the hard part of the system: the time-bounded agreement on who holds read
//! authority ([`lease`]), the two scalars the consensus layer above reads to decide whether a
//! read may be served locally or a write may be committed ([`gate`]), the beacon/EWMA latency
//! tracking that orders peers by preference ([`beacon`]), and the task wiring that drives all of
//! it over a [`qlease_net::PeerMesh`] ([`replica`]).
//!
//! The underlying consensus algorithm that orders writes, the client command protocol, the
//! key-value store, and the stable-store file's contents are all external collaborators — this
//! crate exposes `latest-accepted-instance` as a plain parameter and treats the stable store as
//! an opaque append-only sink (see [`stable_store`]).

#[macro_use]
extern crate tracing;

pub mod beacon;
pub mod channels;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod lease;
pub mod replica;
pub mod stable_store;

pub use beacon::Beacons;
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::ReplicaConfig;
pub use error::StartupError;
pub use gate::Gate;
pub use lease::{LeaseState, PromiseOutcome, PromiseReplyOutcome};
pub use replica::ReplicaHandle;
