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

//! Multi-threaded transaction verification pipeline: N worker threads pop
//! inbound transactions, verify them and push survivors onto a second
//! queue that a single dispatcher drains in batches into the sink.

use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use weft_core::Transaction;
use weft_util::BoundedQueue;

use crate::common::sinks::TransactionSink;

/// Capacity of the unverified and verified queues.
const QUEUE_SIZE: usize = 1 << 16;

/// How long a verifier thread waits for an inbound transaction before
/// re-checking the stop flag.
const POP_TIMEOUT: Duration = Duration::from_millis(300);

/// Dispatcher wait for the first transaction of a batch.
const FIRST_POP_WAIT: Duration = Duration::from_millis(1000);

/// Dispatcher wait while topping up a non-empty batch.
const DRAIN_POP_WAIT: Duration = Duration::from_millis(1);

/// Most transactions dispatched to the sink in one batch.
const DISPATCH_BATCH_SIZE: usize = 100;

/// Verification worker pool plus dispatcher. `start` and `stop` are
/// idempotent; `stop` joins every thread.
pub struct TransactionVerifier {
	name: String,
	verifying_threads: usize,
	sink: Arc<dyn TransactionSink>,
	active: Arc<AtomicBool>,
	threads: Vec<thread::JoinHandle<()>>,
	unverified: BoundedQueue<Box<Transaction>>,
	verified: BoundedQueue<Box<Transaction>>,
}

impl TransactionVerifier {
	/// New verifier feeding the provided sink.
	pub fn new(
		sink: Arc<dyn TransactionSink>,
		verifying_threads: usize,
		name: &str,
	) -> TransactionVerifier {
		TransactionVerifier {
			name: name.to_owned(),
			verifying_threads: verifying_threads.max(1),
			sink,
			active: Arc::new(AtomicBool::new(false)),
			threads: vec![],
			unverified: BoundedQueue::new(QUEUE_SIZE),
			verified: BoundedQueue::new(QUEUE_SIZE),
		}
	}

	/// Queue a transaction for verification. Blocks briefly while the
	/// inbound queue is full.
	pub fn add_transaction(&self, tx: Transaction) {
		self.unverified.push(Box::new(tx));
	}

	/// Spawn the verifier and dispatcher threads. A no-op when already
	/// running.
	pub fn start(&mut self) {
		if !self.threads.is_empty() {
			return;
		}
		self.active.store(true, Ordering::Relaxed);

		for i in 0..self.verifying_threads {
			let active = self.active.clone();
			let unverified = self.unverified.clone();
			let verified = self.verified.clone();
			let name = format!("{}-v{}", self.name, i);
			let handle = thread::Builder::new()
				.name(name.clone())
				.spawn(move || verifier_loop(&name, &active, &unverified, &verified))
				.expect("failed to spawn verifier thread");
			self.threads.push(handle);
		}

		let active = self.active.clone();
		let verified = self.verified.clone();
		let sink = self.sink.clone();
		let name = format!("{}-d", self.name);
		let handle = thread::Builder::new()
			.name(name)
			.spawn(move || dispatcher_loop(&active, &verified, sink.as_ref()))
			.expect("failed to spawn dispatcher thread");
		self.threads.push(handle);

		debug!(
			"{}: started {} verifier threads",
			self.name, self.verifying_threads
		);
	}

	/// Signal all threads to stop and join them. A no-op when already
	/// stopped.
	pub fn stop(&mut self) {
		self.active.store(false, Ordering::Relaxed);
		for handle in self.threads.drain(..) {
			if handle.join().is_err() {
				warn!("{}: worker thread panicked", self.name);
			}
		}
	}
}

impl Drop for TransactionVerifier {
	fn drop(&mut self) {
		self.stop();
	}
}

fn verifier_loop(
	name: &str,
	active: &AtomicBool,
	unverified: &BoundedQueue<Box<Transaction>>,
	verified: &BoundedQueue<Box<Transaction>>,
) {
	while active.load(Ordering::Relaxed) {
		if let Some(tx) = unverified.pop(POP_TIMEOUT) {
			match tx.verify() {
				Ok(()) => verified.push(tx),
				Err(e) => {
					warn!("{}: unable to verify tx 0x{}: {}", name, tx.digest.to_hex(), e)
				}
			}
		}
	}
}

fn dispatcher_loop(
	active: &AtomicBool,
	verified: &BoundedQueue<Box<Transaction>>,
	sink: &dyn TransactionSink,
) {
	let mut batch: Vec<Box<Transaction>> = Vec::with_capacity(DISPATCH_BATCH_SIZE);

	while active.load(Ordering::Relaxed) {
		while batch.len() < DISPATCH_BATCH_SIZE && active.load(Ordering::Relaxed) {
			let wait = if batch.is_empty() {
				FIRST_POP_WAIT
			} else {
				DRAIN_POP_WAIT
			};
			match verified.pop(wait) {
				Some(tx) => batch.push(tx),
				None => break,
			}
		}

		for tx in batch.drain(..) {
			sink.on_transaction(*tx);
		}
	}
}
