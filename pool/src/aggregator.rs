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

//! Read-through view over the memory pool and the durable archive,
//! presenting both as one store.

use std::sync::Arc;

use weft_core::{Digest, Transaction};
use weft_store::TransactionArchive;

use crate::mem_pool::TransactionMemoryPool;
use crate::Error;

/// Presents pool ∪ archive as a single store. Writes land in the pool;
/// moving entries into the archive is the archiver's job.
pub struct TransactionStoreAggregator {
	pool: Arc<TransactionMemoryPool>,
	archive: Arc<TransactionArchive>,
}

impl TransactionStoreAggregator {
	/// New aggregator over the provided pool and archive.
	pub fn new(
		pool: Arc<TransactionMemoryPool>,
		archive: Arc<TransactionArchive>,
	) -> TransactionStoreAggregator {
		TransactionStoreAggregator { pool, archive }
	}

	/// Transactions are always added to the pool first.
	pub fn add(&self, tx: Transaction) {
		self.pool.add(tx);
	}

	/// Whether either store holds the digest.
	pub fn has(&self, digest: &Digest) -> bool {
		self.pool.has(digest) || self.archive.has(digest)
	}

	/// Fetch from the pool first, falling back to the archive.
	pub fn get(&self, digest: &Digest) -> Result<Option<Transaction>, Error> {
		if let Some(tx) = self.pool.get(digest) {
			return Ok(Some(tx));
		}
		self.archive.get(digest).map_err(From::from)
	}

	/// Summed count of both stores. A digest mid-archival may briefly be
	/// counted twice.
	pub fn count(&self) -> u64 {
		self.pool.count() + self.archive.count()
	}
}
