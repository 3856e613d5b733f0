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

//! Intra-node RPC surface over the transaction storage engine, used by the
//! node controller. Transactions arriving here are internal traffic, not
//! fresh network arrivals, so they don't enter the recent cache.

use log::warn;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use weft_core::ser;
use weft_core::{Digest, Transaction};
use weft_p2p::{CallContext, Error, Protocol};
use weft_pool::TransactionStorageEngine;

/// Method id: store a transaction.
pub const ADD: u8 = 0;
/// Method id: presence check by digest.
pub const HAS: u8 = 1;
/// Method id: fetch by digest.
pub const GET: u8 = 2;
/// Method id: total stored count.
pub const GET_COUNT: u8 = 3;
/// Method id: flush recent transaction layouts.
pub const GET_RECENT: u8 = 4;

/// Per-operation call counters.
#[derive(Default)]
pub struct StorageProtocolCounters {
	add: AtomicU64,
	has: AtomicU64,
	get: AtomicU64,
	get_count: AtomicU64,
	get_recent: AtomicU64,
}

impl StorageProtocolCounters {
	/// Total ADD calls served.
	pub fn add_total(&self) -> u64 {
		self.add.load(Ordering::Relaxed)
	}
	/// Total HAS calls served.
	pub fn has_total(&self) -> u64 {
		self.has.load(Ordering::Relaxed)
	}
	/// Total GET calls served.
	pub fn get_total(&self) -> u64 {
		self.get.load(Ordering::Relaxed)
	}
	/// Total GET_COUNT calls served.
	pub fn get_count_total(&self) -> u64 {
		self.get_count.load(Ordering::Relaxed)
	}
	/// Total GET_RECENT calls served.
	pub fn get_recent_total(&self) -> u64 {
		self.get_recent.load(Ordering::Relaxed)
	}
}

/// The storage engine behind the `TX_STORE` service id.
pub struct TransactionStorageProtocol {
	lane: u32,
	storage: Arc<TransactionStorageEngine>,
	counters: StorageProtocolCounters,
}

impl TransactionStorageProtocol {
	/// New protocol serving the provided engine.
	pub fn new(storage: Arc<TransactionStorageEngine>, lane: u32) -> TransactionStorageProtocol {
		TransactionStorageProtocol {
			lane,
			storage,
			counters: StorageProtocolCounters::default(),
		}
	}

	/// The protocol's call counters.
	pub fn counters(&self) -> &StorageProtocolCounters {
		&self.counters
	}

	fn add(&self, body: &[u8]) -> Result<Vec<u8>, Error> {
		let tx: Transaction = ser::deserialize(&mut &*body)?;
		// internal traffic is never treated as a fresh network arrival
		if let Err(e) = self.storage.add(tx, false) {
			warn!("lane {}: rejected internal add: {}", self.lane, e);
		}
		Ok(vec![])
	}

	fn has(&self, body: &[u8]) -> Result<Vec<u8>, Error> {
		let digest: Digest = ser::deserialize(&mut &*body)?;
		let found = self.storage.has(&digest);
		Ok(vec![found as u8])
	}

	fn get(&self, body: &[u8]) -> Result<Vec<u8>, Error> {
		let digest: Digest = ser::deserialize(&mut &*body)?;
		match self.storage.get(&digest) {
			Ok(tx) => {
				// a transaction the controller looked up must survive a
				// restart, so schedule it for archival
				self.storage.confirm(digest);
				Ok(ser::ser_vec(&tx)?)
			}
			Err(e) => {
				warn!(
					"lane {}: unable to lookup transaction 0x{}",
					self.lane,
					digest.to_hex()
				);
				Err(Error::Request(format!("{}", e)))
			}
		}
	}

	fn get_count(&self) -> Result<Vec<u8>, Error> {
		Ok(ser::ser_vec(&self.storage.count())?)
	}

	fn get_recent(&self, body: &[u8]) -> Result<Vec<u8>, Error> {
		let max_to_poll: u32 = ser::deserialize(&mut &*body)?;
		let layouts = self.storage.get_recent(max_to_poll);
		Ok(ser::ser_vec(&layouts)?)
	}
}

impl Protocol for TransactionStorageProtocol {
	fn dispatch(&self, method: u8, body: &[u8], _ctx: &CallContext) -> Result<Vec<u8>, Error> {
		match method {
			ADD => {
				self.counters.add.fetch_add(1, Ordering::Relaxed);
				self.add(body)
			}
			HAS => {
				self.counters.has.fetch_add(1, Ordering::Relaxed);
				self.has(body)
			}
			GET => {
				self.counters.get.fetch_add(1, Ordering::Relaxed);
				self.get(body)
			}
			GET_COUNT => {
				self.counters.get_count.fetch_add(1, Ordering::Relaxed);
				self.get_count()
			}
			GET_RECENT => {
				self.counters.get_recent.fetch_add(1, Ordering::Relaxed);
				self.get_recent(body)
			}
			_ => Err(Error::UnknownMethod {
				service: weft_p2p::SERVICE_TX_STORE,
				method,
			}),
		}
	}
}
