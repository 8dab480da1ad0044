// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.

#![forbid(unsafe_code)]

//! A symmetric TCP peer mesh and typed RPC dispatcher for a fixed-size replica cluster.
//!
//! Dial direction is fixed by id: a replica dials every peer with a lower id and accepts
//! connections from every peer with a higher id, producing exactly one TCP connection per pair.
//! There is no reconnect logic and no membership change support — both are explicitly out of
//! scope for this core (see the crate's owning specification).

mod dispatcher;
pub use dispatcher::{Dispatcher, TypeCode};

mod error;
pub use error::NetError;

mod mesh;
pub use mesh::PeerMesh;

mod peer;
pub use peer::PeerHandle;
