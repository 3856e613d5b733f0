// Copyright 2020 The Weft Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Networking plumbing for the lane services. The peer-to-peer overlay
//! itself is out of scope and modeled as an opaque [`Endpoint`]; this crate
//! provides what the storage protocols need on top of it: message framing,
//! promises for in-flight requests, protocol dispatch on the serving side
//! and an in-process transport for intra-node RPC.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

pub mod client;
pub mod local;
pub mod msg;
pub mod promise;
pub mod protocol;
pub mod requests;
pub mod types;

pub use crate::client::RpcClient;
pub use crate::local::{LocalEndpoint, LocalNetwork};
pub use crate::msg::{
	MsgHeader, CHANNEL_RPC, PROTOCOL_VERSION, SERVICE_CONTROLLER, SERVICE_MISSING_TX_FINDER,
	SERVICE_TX_STORE, SERVICE_TX_STORE_SYNC,
};
pub use crate::promise::{Promise, PromiseOf, Resolution};
pub use crate::protocol::{CallContext, Protocol, RpcServer};
pub use crate::requests::{Counts, RequestingQueue};
pub use crate::types::{Endpoint, Error, PeerAddr};
