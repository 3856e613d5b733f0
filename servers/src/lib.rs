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

//! One lane service per shard: the transaction storage engine behind its
//! intra-node RPC protocol, the peer-facing sync protocol, the inbound
//! transaction verifier and the client-side sync state machine that keeps
//! the lane's holdings aligned with its peers.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

pub mod common;
pub mod lane;

pub use crate::common::sinks::TransactionSink;
pub use crate::common::types::{Error, ShardConfig, SyncConfig};
pub use crate::lane::service::{LaneService, Mode};
