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

//! Bounded multi-producer multi-consumer queue. Producers observing a full
//! queue block until a consumer makes room, so no element is ever dropped.
//! Single-consumer usage is a convention of the call site, not a separate
//! type.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Duration;

/// A bounded MPMC queue. Cloning the queue yields another handle onto the
/// same underlying channel, usable from any thread.
pub struct BoundedQueue<T> {
	tx: Sender<T>,
	rx: Receiver<T>,
}

impl<T> Clone for BoundedQueue<T> {
	fn clone(&self) -> BoundedQueue<T> {
		BoundedQueue {
			tx: self.tx.clone(),
			rx: self.rx.clone(),
		}
	}
}

impl<T> BoundedQueue<T> {
	/// Create a new queue holding at most `capacity` elements.
	pub fn new(capacity: usize) -> BoundedQueue<T> {
		let (tx, rx) = bounded(capacity);
		BoundedQueue { tx, rx }
	}

	/// Push an element onto the queue, blocking while the queue is full.
	pub fn push(&self, item: T) {
		// the queue owns both channel ends so the channel can never disconnect
		self.tx
			.send(item)
			.expect("bounded queue disconnected");
	}

	/// Attempt to push without blocking. Returns the element back if the
	/// queue is full.
	pub fn try_push(&self, item: T) -> Result<(), T> {
		match self.tx.try_send(item) {
			Ok(()) => Ok(()),
			Err(TrySendError::Full(item)) => Err(item),
			Err(TrySendError::Disconnected(_)) => {
				unreachable!("bounded queue disconnected")
			}
		}
	}

	/// Pop an element, waiting up to `timeout` for one to arrive.
	pub fn pop(&self, timeout: Duration) -> Option<T> {
		match self.rx.recv_timeout(timeout) {
			Ok(item) => Some(item),
			Err(RecvTimeoutError::Timeout) => None,
			Err(RecvTimeoutError::Disconnected) => None,
		}
	}

	/// Pop an element if one is immediately available.
	pub fn try_pop(&self) -> Option<T> {
		self.rx.try_recv().ok()
	}

	/// Number of elements currently queued.
	pub fn len(&self) -> usize {
		self.rx.len()
	}

	/// Whether the queue is currently empty.
	pub fn is_empty(&self) -> bool {
		self.rx.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::thread;

	#[test]
	fn push_pop_ordering() {
		let queue = BoundedQueue::new(8);
		for i in 0..5u32 {
			queue.push(i);
		}
		assert_eq!(queue.len(), 5);
		for i in 0..5u32 {
			assert_eq!(queue.try_pop(), Some(i));
		}
		assert_eq!(queue.try_pop(), None);
	}

	#[test]
	fn pop_timeout_on_empty() {
		let queue: BoundedQueue<u32> = BoundedQueue::new(4);
		assert_eq!(queue.pop(Duration::from_millis(10)), None);
	}

	#[test]
	fn try_push_full() {
		let queue = BoundedQueue::new(1);
		assert!(queue.try_push(1u32).is_ok());
		assert_eq!(queue.try_push(2u32), Err(2u32));
	}

	#[test]
	fn cross_thread() {
		let queue = BoundedQueue::new(16);
		let producer = queue.clone();
		let handle = thread::spawn(move || {
			for i in 0..100u32 {
				producer.push(i);
			}
		});
		let mut seen = 0;
		while seen < 100 {
			if queue.pop(Duration::from_millis(100)).is_some() {
				seen += 1;
			}
		}
		handle.join().unwrap();
	}
}
