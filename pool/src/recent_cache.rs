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

//! Bounded, insertion-ordered cache of recently accepted transaction
//! layouts. The block packer flushes it periodically to learn what to pack
//! into the next blocks.

use std::collections::VecDeque;

use weft_core::{DigestSet, Transaction, TransactionLayout};
use weft_util::Mutex;

struct Inner {
	digests: DigestSet,
	queue: VecDeque<TransactionLayout>,
}

/// Newest-first deque of layouts with a parallel digest set for duplicate
/// suppression. Overflow drops the oldest insertion.
pub struct RecentTransactionsCache {
	max_cache_size: usize,
	log2_num_lanes: u32,
	inner: Mutex<Inner>,
}

impl RecentTransactionsCache {
	/// New cache bounded to `max_cache_size` entries for a system of
	/// `2^log2_num_lanes` lanes.
	pub fn new(max_cache_size: usize, log2_num_lanes: u32) -> RecentTransactionsCache {
		RecentTransactionsCache {
			max_cache_size,
			log2_num_lanes,
			inner: Mutex::new(Inner {
				digests: DigestSet::default(),
				queue: VecDeque::new(),
			}),
		}
	}

	/// Add a recently seen transaction. Digests already present are
	/// ignored; overflowing entries fall off the old end.
	pub fn add(&self, tx: &Transaction) {
		let mut inner = self.inner.lock();

		if !inner.digests.contains(&tx.digest) {
			inner.digests.insert(tx.digest);
			let layout = TransactionLayout::new(tx, self.log2_num_lanes);
			inner.queue.push_front(layout);
		}

		while inner.queue.len() > self.max_cache_size {
			if let Some(oldest) = inner.queue.pop_back() {
				inner.digests.remove(&oldest.digest);
			}
		}
	}

	/// Number of cached layouts.
	pub fn len(&self) -> usize {
		self.inner.lock().queue.len()
	}

	/// Whether the cache is empty.
	pub fn is_empty(&self) -> bool {
		self.inner.lock().queue.is_empty()
	}

	/// Pop up to `num_to_flush` layouts, newest first. Flushed digests may
	/// re-enter the cache later.
	pub fn flush(&self, num_to_flush: usize) -> Vec<TransactionLayout> {
		let mut layouts = Vec::with_capacity(num_to_flush.min(64));
		let mut inner = self.inner.lock();
		for _ in 0..num_to_flush {
			match inner.queue.pop_front() {
				Some(layout) => {
					inner.digests.remove(&layout.digest);
					layouts.push(layout);
				}
				None => break,
			}
		}
		layouts
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use weft_core::{Digest, TransactionBuilder};

	fn tx_with_digest_byte(byte: u8) -> Transaction {
		let mut bytes = [0u8; 32];
		bytes[0] = byte;
		TransactionBuilder::new()
			.valid_until(100)
			.signatory(b"id".to_vec(), b"sig".to_vec())
			.build_with_digest(Digest(bytes))
	}

	#[test]
	fn newest_first_with_bounded_size() {
		let cache = RecentTransactionsCache::new(5, 0);
		for byte in 1..=10u8 {
			cache.add(&tx_with_digest_byte(byte));
		}
		assert_eq!(cache.len(), 5);

		let layouts = cache.flush(10);
		let first_bytes: Vec<u8> = layouts.iter().map(|l| l.digest.0[0]).collect();
		assert_eq!(first_bytes, vec![10, 9, 8, 7, 6]);
		assert!(cache.is_empty());
	}

	#[test]
	fn duplicate_digests_are_suppressed() {
		let cache = RecentTransactionsCache::new(10, 0);
		let tx = tx_with_digest_byte(1);
		cache.add(&tx);
		cache.add(&tx);
		assert_eq!(cache.len(), 1);

		// once flushed the digest may come back
		cache.flush(1);
		cache.add(&tx);
		assert_eq!(cache.len(), 1);
	}

	#[test]
	fn zero_capacity_drops_everything() {
		let cache = RecentTransactionsCache::new(0, 0);
		cache.add(&tx_with_digest_byte(1));
		assert_eq!(cache.len(), 0);
		assert!(cache.flush(10).is_empty());

		// and the digest set must not leak entries that were never kept
		cache.add(&tx_with_digest_byte(1));
		assert_eq!(cache.len(), 0);
	}

	#[test]
	fn partial_flush_keeps_remainder() {
		let cache = RecentTransactionsCache::new(10, 0);
		for byte in 1..=6u8 {
			cache.add(&tx_with_digest_byte(byte));
		}
		let layouts = cache.flush(2);
		assert_eq!(layouts.len(), 2);
		assert_eq!(layouts[0].digest.0[0], 6);
		assert_eq!(layouts[1].digest.0[0], 5);
		assert_eq!(cache.len(), 4);
	}
}
