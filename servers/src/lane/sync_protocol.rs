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

//! Peer-facing synchronization protocol. Serves the lane's object count,
//! a time-bounded cache of recently accepted transactions, archive
//! subtrees for cold-starting peers and point lookups for known-missing
//! digests. All methods are idempotent and read-only.

use chrono::prelude::{DateTime, Utc};
use chrono::Duration;
use log::{debug, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use weft_core::ser;
use weft_core::{Digest, Transaction};
use weft_p2p::{CallContext, Error, Protocol};
use weft_pool::TransactionStorageEngine;
use weft_util::Mutex;

/// Method id: number of transactions held by this lane.
pub const OBJECT_COUNT: u8 = 1;
/// Method id: snapshot of the recent-gossip cache.
pub const PULL_OBJECTS: u8 = 2;
/// Method id: bulk fetch of one digest-prefix subtree.
pub const PULL_SUBTREE: u8 = 3;
/// Method id: point lookups for a set of digests.
pub const PULL_SPECIFIC_OBJECTS: u8 = 4;

/// Most transactions a single pull returns.
pub const PULL_LIMIT: usize = 10_000;

/// How long a transaction stays in the recent-gossip cache.
const MAX_CACHE_LIFETIME_MS: i64 = 60 * 1000;

struct CachedTx {
	tx: Transaction,
	received: DateTime<Utc>,
}

/// Per-operation call counters.
#[derive(Default)]
pub struct SyncProtocolCounters {
	object_count: AtomicU64,
	pull_objects: AtomicU64,
	pull_subtree: AtomicU64,
	pull_specific: AtomicU64,
}

impl SyncProtocolCounters {
	/// Total OBJECT_COUNT calls served.
	pub fn object_count_total(&self) -> u64 {
		self.object_count.load(Ordering::Relaxed)
	}
	/// Total PULL_OBJECTS calls served.
	pub fn pull_objects_total(&self) -> u64 {
		self.pull_objects.load(Ordering::Relaxed)
	}
	/// Total PULL_SUBTREE calls served.
	pub fn pull_subtree_total(&self) -> u64 {
		self.pull_subtree.load(Ordering::Relaxed)
	}
	/// Total PULL_SPECIFIC_OBJECTS calls served.
	pub fn pull_specific_total(&self) -> u64 {
		self.pull_specific.load(Ordering::Relaxed)
	}
}

/// The lane's sync surface behind the `TX_STORE_SYNC` service id, plus the
/// recent-gossip cache it serves from.
pub struct TransactionSyncProtocol {
	lane: u32,
	storage: Arc<TransactionStorageEngine>,
	cache: Mutex<Vec<CachedTx>>,
	counters: SyncProtocolCounters,
}

impl TransactionSyncProtocol {
	/// New protocol serving the provided engine.
	pub fn new(storage: Arc<TransactionStorageEngine>, lane: u32) -> TransactionSyncProtocol {
		TransactionSyncProtocol {
			lane,
			storage,
			cache: Mutex::new(vec![]),
			counters: SyncProtocolCounters::default(),
		}
	}

	/// The protocol's call counters.
	pub fn counters(&self) -> &SyncProtocolCounters {
		&self.counters
	}

	/// Record a transaction the lane just accepted so peers polling
	/// `PULL_OBJECTS` pick it up.
	pub fn on_new_tx(&self, tx: &Transaction) {
		self.cache.lock().push(CachedTx {
			tx: tx.clone(),
			received: Utc::now(),
		});
	}

	/// Drop cache entries older than the cache lifetime. Invoked from the
	/// sync service's trim state.
	pub fn trim_cache(&self) {
		let cut_off = Utc::now() - Duration::milliseconds(MAX_CACHE_LIFETIME_MS);
		let mut cache = self.cache.lock();
		let curr_size = cache.len();
		cache.retain(|entry| entry.received > cut_off);
		if curr_size != 0 && cache.len() != curr_size {
			debug!(
				"lane {}: new cache size: {}, old cache size: {}",
				self.lane,
				cache.len(),
				curr_size
			);
		}
	}

	/// Number of entries currently cached for gossip.
	pub fn cache_size(&self) -> usize {
		self.cache.lock().len()
	}

	fn object_count(&self) -> Result<Vec<u8>, Error> {
		Ok(ser::ser_vec(&self.storage.count())?)
	}

	fn pull_objects(&self, ctx: &CallContext) -> Result<Vec<u8>, Error> {
		let txs: Vec<Transaction> = {
			let cache = self.cache.lock();
			cache.iter().take(PULL_LIMIT).map(|c| c.tx.clone()).collect()
		};
		if !txs.is_empty() {
			debug!(
				"lane {}: pull_objects: sending {} txs to {:?}",
				self.lane,
				txs.len(),
				ctx.sender
			);
		}
		encode_txs(&txs)
	}

	fn pull_subtree(&self, body: &[u8]) -> Result<Vec<u8>, Error> {
		let mut cursor = body;
		let prefix: Digest = ser::deserialize(&mut cursor)?;
		let bit_count: u64 = ser::deserialize(&mut cursor)?;

		let txs = self
			.storage
			.pull_subtree(&prefix, bit_count, PULL_LIMIT)
			.map_err(|e| Error::Request(format!("{}", e)))?;
		info!(
			"lane {}: pull_subtree({:?}, {}): {} txs",
			self.lane,
			prefix,
			bit_count,
			txs.len()
		);
		encode_txs(&txs)
	}

	fn pull_specific_objects(&self, body: &[u8]) -> Result<Vec<u8>, Error> {
		let digests: Vec<Digest> = ser::deserialize(&mut &*body)?;
		let mut txs = Vec::new();
		for digest in &digests {
			// missing digests are silently skipped
			if let Ok(tx) = self.storage.get(digest) {
				txs.push(tx);
			}
		}
		encode_txs(&txs)
	}
}

fn encode_txs(txs: &Vec<Transaction>) -> Result<Vec<u8>, Error> {
	Ok(ser::ser_vec(txs)?)
}

impl Protocol for TransactionSyncProtocol {
	fn dispatch(&self, method: u8, body: &[u8], ctx: &CallContext) -> Result<Vec<u8>, Error> {
		match method {
			OBJECT_COUNT => {
				self.counters.object_count.fetch_add(1, Ordering::Relaxed);
				self.object_count()
			}
			PULL_OBJECTS => {
				self.counters.pull_objects.fetch_add(1, Ordering::Relaxed);
				self.pull_objects(ctx)
			}
			PULL_SUBTREE => {
				self.counters.pull_subtree.fetch_add(1, Ordering::Relaxed);
				self.pull_subtree(body)
			}
			PULL_SPECIFIC_OBJECTS => {
				self.counters.pull_specific.fetch_add(1, Ordering::Relaxed);
				self.pull_specific_objects(body)
			}
			_ => Err(Error::UnknownMethod {
				service: weft_p2p::SERVICE_TX_STORE_SYNC,
				method,
			}),
		}
	}
}
