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

//! The transaction storage engine facade. One instance per lane, binding
//! the memory pool, the durable archive, the recent-transaction cache and
//! the archiver behind the `add`/`has`/`get`/`confirm`/`get_recent`/
//! `pull_subtree` surface the protocols expose.

use log::debug;
use std::path::Path;
use std::sync::Arc;

use weft_core::{Digest, Transaction, TransactionLayout};
use weft_store::TransactionArchive;
use weft_util::{BoundedQueue, Mutex, Reactor, RwLock};

use crate::aggregator::TransactionStoreAggregator;
use crate::archiver::{ArchiverCounters, TransactionArchiver};
use crate::mem_pool::TransactionMemoryPool;
use crate::recent_cache::RecentTransactionsCache;
use crate::Error;

/// Upper bound on the recent-transaction cache.
pub const MAX_NUM_RECENT_TX: usize = 1 << 15;

/// Callback invoked for every transaction accepted by the engine.
pub type NewTxCallback = Box<dyn Fn(&Transaction) + Send + Sync>;

/// Whether to create a fresh database or load an existing one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreMode {
	/// Discard any existing files and start empty
	Create,
	/// Load existing files, creating them when missing
	Load,
}

/// One lane's transaction storage engine.
pub struct TransactionStorageEngine {
	lane: u32,
	log2_num_lanes: u32,
	archive: Arc<TransactionArchive>,
	store: TransactionStoreAggregator,
	recent: RecentTransactionsCache,
	confirmations: BoundedQueue<Digest>,
	archiver: Arc<Mutex<TransactionArchiver>>,
	counters: Arc<ArchiverCounters>,
	new_tx_callback: RwLock<Option<NewTxCallback>>,
}

impl TransactionStorageEngine {
	/// Build the storage engine for one lane, opening (or creating) its
	/// document and index files.
	pub fn new<P>(
		log2_num_lanes: u32,
		lane: u32,
		doc_path: P,
		idx_path: P,
		mode: StoreMode,
	) -> Result<TransactionStorageEngine, Error>
	where
		P: AsRef<Path>,
	{
		let archive = Arc::new(match mode {
			StoreMode::Create => TransactionArchive::new(doc_path, idx_path, true)?,
			StoreMode::Load => TransactionArchive::load(doc_path, idx_path, true)?,
		});
		let pool = Arc::new(TransactionMemoryPool::new());
		let archiver = TransactionArchiver::new(lane, pool.clone(), archive.clone());
		let confirmations = archiver.confirmation_queue();
		let counters = archiver.counters();

		Ok(TransactionStorageEngine {
			lane,
			log2_num_lanes,
			archive: archive.clone(),
			store: TransactionStoreAggregator::new(pool, archive),
			recent: RecentTransactionsCache::new(MAX_NUM_RECENT_TX, log2_num_lanes),
			confirmations,
			archiver: Arc::new(Mutex::new(archiver)),
			counters,
			new_tx_callback: RwLock::new(None),
		})
	}

	/// The lane this engine owns.
	pub fn lane(&self) -> u32 {
		self.lane
	}

	/// Attach the archiver state machine to the provided reactor.
	pub fn attach_to_reactor(&self, reactor: &mut Reactor) {
		reactor.attach(self.archiver.clone());
	}

	/// The archiver state machine, for callers driving it manually.
	pub fn archiver(&self) -> Arc<Mutex<TransactionArchiver>> {
		self.archiver.clone()
	}

	/// The archiver's counters.
	pub fn archiver_counters(&self) -> Arc<ArchiverCounters> {
		self.counters.clone()
	}

	/// Set the handler invoked for every accepted transaction. Not thread
	/// safe with respect to concurrent adds; call it once during lane
	/// service setup.
	pub fn set_new_tx_handler(&self, callback: NewTxCallback) {
		*self.new_tx_callback.write() = Some(callback);
	}

	/// Add a new transaction to the storage engine. Transactions routed to
	/// other lanes are rejected. With `is_recent` set (and the transaction
	/// not originating from subtree sync) the transaction also enters the
	/// recent cache for the block packer.
	pub fn add(&self, tx: Transaction, is_recent: bool) -> Result<(), Error> {
		let tx_lane = tx.digest.lane(self.log2_num_lanes);
		if tx_lane != self.lane {
			return Err(Error::ShardMismatch {
				tx_lane,
				lane: self.lane,
			});
		}

		self.store.add(tx.clone());

		if is_recent && !tx.from_subtree_sync {
			self.recent.add(&tx);
		}

		if let Some(callback) = self.new_tx_callback.read().as_ref() {
			callback(&tx);
		}

		Ok(())
	}

	/// Whether the pool or the archive holds the digest.
	pub fn has(&self, digest: &Digest) -> bool {
		self.store.has(digest)
	}

	/// Whether the digest has already been archived durably.
	pub fn is_archived(&self, digest: &Digest) -> bool {
		self.archive.has(digest)
	}

	/// Retrieve a transaction by digest.
	pub fn get(&self, digest: &Digest) -> Result<Transaction, Error> {
		match self.store.get(digest)? {
			Some(tx) => Ok(tx),
			None => Err(Error::NotFound),
		}
	}

	/// Total number of stored transactions.
	pub fn count(&self) -> u64 {
		self.store.count()
	}

	/// Confirm that a transaction has been included in the chain and must
	/// be archived. Idempotent; duplicate confirmations surface on the
	/// archiver's duplicate counter.
	pub fn confirm(&self, digest: Digest) {
		debug!("lane {}: confirming tx {:?}", self.lane, digest);
		self.confirmations.push(digest);
		self.counters.inc_confirmed();
	}

	/// Flush up to `max_to_poll` recent transaction layouts, newest first.
	pub fn get_recent(&self, max_to_poll: u32) -> Vec<TransactionLayout> {
		self.recent.flush(max_to_poll as usize)
	}

	/// Pull transactions from the archive whose digests share the top
	/// `bit_count` bits of `partial_digest`.
	pub fn pull_subtree(
		&self,
		partial_digest: &Digest,
		bit_count: u64,
		pull_limit: usize,
	) -> Result<Vec<Transaction>, Error> {
		self.archive
			.pull_subtree(partial_digest, bit_count, pull_limit)
			.map_err(From::from)
	}
}
