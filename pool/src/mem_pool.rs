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

//! In-memory pool of unconfirmed transactions, keyed by digest. No eviction
//! policy of its own; growth is bounded by the archiver promptly draining
//! confirmed entries.

use weft_core::{Digest, DigestMap, Transaction};
use weft_util::Mutex;

/// Mutex-guarded map of unconfirmed transactions.
pub struct TransactionMemoryPool {
	txs: Mutex<DigestMap<Transaction>>,
}

impl Default for TransactionMemoryPool {
	fn default() -> TransactionMemoryPool {
		TransactionMemoryPool::new()
	}
}

impl TransactionMemoryPool {
	/// New empty pool.
	pub fn new() -> TransactionMemoryPool {
		TransactionMemoryPool {
			txs: Mutex::new(DigestMap::default()),
		}
	}

	/// Insert a transaction under its digest, overwriting any previous copy.
	pub fn add(&self, tx: Transaction) {
		self.txs.lock().insert(tx.digest, tx);
	}

	/// Whether the pool holds the given digest.
	pub fn has(&self, digest: &Digest) -> bool {
		self.txs.lock().contains_key(digest)
	}

	/// Fetch a copy of the transaction with the given digest.
	pub fn get(&self, digest: &Digest) -> Option<Transaction> {
		self.txs.lock().get(digest).cloned()
	}

	/// Number of pooled transactions.
	pub fn count(&self) -> u64 {
		self.txs.lock().len() as u64
	}

	/// Remove the transaction with the given digest. A no-op if absent.
	pub fn remove(&self, digest: &Digest) {
		self.txs.lock().remove(digest);
	}
}
