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

//! Staging area for a batch of in-flight requests. The owning state
//! machine adds `(key, promise)` pairs as it fans calls out, then
//! repeatedly `resolve()`s to migrate settled promises into the completed
//! and failed sets, draining them in bounded chunks per cycle.

use std::collections::VecDeque;

use weft_core::ser::Readable;

use crate::promise::{PromiseOf, Resolution};

/// Counts returned by a resolve pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counts {
	/// Requests still awaiting a result
	pub pending: usize,
	/// Results decoded and awaiting collection
	pub completed: usize,
	/// Requests that failed and await acknowledgement
	pub failed: usize,
}

/// A set of keyed in-flight requests with settled results staged for
/// bounded collection.
pub struct RequestingQueue<K, T> {
	pending: Vec<(K, PromiseOf<T>)>,
	completed: VecDeque<(K, T)>,
	failed: VecDeque<K>,
}

impl<K, T> Default for RequestingQueue<K, T>
where
	K: Clone,
	T: Readable,
{
	fn default() -> RequestingQueue<K, T> {
		RequestingQueue::new()
	}
}

impl<K, T> RequestingQueue<K, T>
where
	K: Clone,
	T: Readable,
{
	/// New empty queue.
	pub fn new() -> RequestingQueue<K, T> {
		RequestingQueue {
			pending: vec![],
			completed: VecDeque::new(),
			failed: VecDeque::new(),
		}
	}

	/// Stage a new in-flight request under its key.
	pub fn add(&mut self, key: K, promise: PromiseOf<T>) {
		self.pending.push((key, promise));
	}

	/// Poll every pending promise, migrating settled ones into the
	/// completed/failed sets. Returns the post-pass counts.
	pub fn resolve(&mut self) -> Counts {
		let mut still_pending = Vec::with_capacity(self.pending.len());
		for (key, promise) in self.pending.drain(..) {
			match promise.poll() {
				Resolution::Pending => still_pending.push((key, promise)),
				Resolution::Complete(value) => self.completed.push_back((key, value)),
				Resolution::Failed => self.failed.push_back(key),
			}
		}
		self.pending = still_pending;

		Counts {
			pending: self.pending.len(),
			completed: self.completed.len(),
			failed: self.failed.len(),
		}
	}

	/// Collect up to `max` completed results, oldest first.
	pub fn take_completed(&mut self, max: usize) -> Vec<(K, T)> {
		let take = max.min(self.completed.len());
		self.completed.drain(..take).collect()
	}

	/// Collect the keys of up to `max` failed requests, oldest first.
	pub fn take_failed(&mut self, max: usize) -> Vec<K> {
		let take = max.min(self.failed.len());
		self.failed.drain(..take).collect()
	}

	/// Drop all staged failures.
	pub fn discard_failures(&mut self) {
		self.failed.clear();
	}

	/// Number of requests still in flight.
	pub fn num_pending(&self) -> usize {
		self.pending.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::promise::Promise;
	use weft_core::ser::ser_vec;

	fn typed(promise: &Promise) -> PromiseOf<u64> {
		PromiseOf::new(promise.clone())
	}

	#[test]
	fn resolve_partitions_settled_promises() {
		let mut queue: RequestingQueue<u32, u64> = RequestingQueue::new();
		let (a, b, c) = (Promise::new(), Promise::new(), Promise::new());
		queue.add(1, typed(&a));
		queue.add(2, typed(&b));
		queue.add(3, typed(&c));

		a.fulfill(ser_vec(&10u64).unwrap());
		b.fail();

		let counts = queue.resolve();
		assert_eq!(
			counts,
			Counts {
				pending: 1,
				completed: 1,
				failed: 1
			}
		);

		assert_eq!(queue.take_completed(10), vec![(1, 10u64)]);
		assert_eq!(queue.take_failed(10), vec![2]);
		assert_eq!(queue.num_pending(), 1);

		c.fulfill(ser_vec(&30u64).unwrap());
		let counts = queue.resolve();
		assert_eq!(counts.pending, 0);
		assert_eq!(queue.take_completed(10), vec![(3, 30u64)]);
	}

	#[test]
	fn bounded_collection() {
		let mut queue: RequestingQueue<u32, u64> = RequestingQueue::new();
		for i in 0..10u32 {
			let promise = Promise::new();
			promise.fulfill(ser_vec(&u64::from(i)).unwrap());
			queue.add(i, typed(&promise));
		}
		queue.resolve();

		assert_eq!(queue.take_completed(3).len(), 3);
		assert_eq!(queue.take_completed(100).len(), 7);
	}

	#[test]
	fn discard_failures_clears_staging() {
		let mut queue: RequestingQueue<u32, u64> = RequestingQueue::new();
		let promise = Promise::new();
		promise.fail();
		queue.add(1, typed(&promise));
		queue.resolve();

		queue.discard_failures();
		assert!(queue.take_failed(10).is_empty());
	}
}
