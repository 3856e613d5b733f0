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

//! Server types: per-lane configuration and the module-spanning error.

use failure::Fail;
use serde_derive::{Deserialize, Serialize};
use std::time::Duration;

use weft_p2p as p2p;
use weft_pool as pool;
use weft_store as store;

/// Timing knobs for the sync service, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
	/// Deadline for resolving the initial object-count fan-out
	pub main_timeout_ms: u64,
	/// Deadline carried by every outbound promise
	pub promise_wait_timeout_ms: u64,
	/// Interval between regular gossip polls of the recent caches
	pub fetch_object_wait_ms: u64,
}

impl Default for SyncConfig {
	fn default() -> SyncConfig {
		SyncConfig {
			main_timeout_ms: 5_000,
			promise_wait_timeout_ms: 2_000,
			fetch_object_wait_ms: 5_000,
		}
	}
}

impl SyncConfig {
	/// Object-count resolution deadline.
	pub fn main_timeout(&self) -> Duration {
		Duration::from_millis(self.main_timeout_ms)
	}

	/// Per-promise deadline.
	pub fn promise_wait_timeout(&self) -> Duration {
		Duration::from_millis(self.promise_wait_timeout_ms)
	}

	/// Gossip poll interval.
	pub fn fetch_object_wait_duration(&self) -> Duration {
		Duration::from_millis(self.fetch_object_wait_ms)
	}
}

/// Per-lane configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShardConfig {
	/// This lane's id, in `[0, num_lanes)`
	pub lane_id: u32,
	/// Total number of lanes in the system; must be a power of two
	pub num_lanes: u32,
	/// Number of verifier threads to run
	pub verification_threads: usize,
	/// Prefix for the lane's on-disk storage files
	pub storage_path: String,
	/// Sync service timing
	pub sync: SyncConfig,
}

impl Default for ShardConfig {
	fn default() -> ShardConfig {
		ShardConfig {
			lane_id: 0,
			num_lanes: 1,
			verification_threads: 1,
			storage_path: "weft_data".to_owned(),
			sync: SyncConfig::default(),
		}
	}
}

impl ShardConfig {
	/// Log2 of the lane count. Panics (via assert) on a non power of two
	/// lane count, which is a configuration error.
	pub fn log2_num_lanes(&self) -> u32 {
		assert!(
			self.num_lanes.is_power_of_two(),
			"num_lanes must be a power of two"
		);
		self.num_lanes.trailing_zeros()
	}
}

/// Error type wrapping underlying module errors.
#[derive(Debug, Fail)]
pub enum Error {
	/// Error originating from the storage engine.
	#[fail(display = "pool error: {}", _0)]
	Pool(pool::Error),
	/// Error originating from the durable store.
	#[fail(display = "store error: {}", _0)]
	Store(store::Error),
	/// Error originating from the RPC layer.
	#[fail(display = "p2p error: {}", _0)]
	P2P(p2p::Error),
}

impl From<pool::Error> for Error {
	fn from(e: pool::Error) -> Error {
		Error::Pool(e)
	}
}

impl From<store::Error> for Error {
	fn from(e: store::Error) -> Error {
		Error::Store(e)
	}
}

impl From<p2p::Error> for Error {
	fn from(e: p2p::Error) -> Error {
		Error::P2P(e)
	}
}
