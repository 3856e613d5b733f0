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

//! The transaction archiver moves confirmed transactions from the memory
//! pool into the durable archive. Confirmations land on a bounded queue;
//! a two-state machine drains the queue in batches and flushes one
//! transaction per step.
//!
//! ```text
//!                 ┌─────────────┐               ┌─────────────┐
//!                 │ Transaction │               │ Transaction │
//!                 │    Pool     │               │   Archive   │
//!                 └─────────────┘               └─────────────┘
//!                        │                             ▲
//!                        │       ┌─────────────┐       │
//!                        └──────▶│ Transaction │───────┘
//!                                │  Archiver   │
//!                                └─────────────┘
//! ```

use log::{error, warn};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use weft_core::Digest;
use weft_store::TransactionArchive;
use weft_util::{BoundedQueue, Runnable, StateMachine};

use crate::mem_pool::TransactionMemoryPool;

/// Number of confirmations processed per flush batch.
pub const BATCH_SIZE: usize = 100;

/// Capacity of the confirmation queue.
pub const CONFIRMATION_QUEUE_SIZE: usize = 1 << 15;

/// Delay before re-checking an empty confirmation queue.
const IDLE_DELAY: Duration = Duration::from_secs(1);

/// Archiver state machine states.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum State {
	/// Draining the confirmation queue into a local batch
	Collecting,
	/// Writing the batch out, one transaction per step
	Flushing,
}

impl fmt::Display for State {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			State::Collecting => write!(f, "Collecting"),
			State::Flushing => write!(f, "Flushing"),
		}
	}
}

/// Monotonic counters exposed by the archiver.
#[derive(Default)]
pub struct ArchiverCounters {
	confirmed: AtomicU64,
	duplicate: AtomicU64,
	additions: AtomicU64,
	lost: AtomicU64,
	processed: AtomicU64,
}

impl ArchiverCounters {
	/// Total confirmations enqueued.
	pub fn confirmed_total(&self) -> u64 {
		self.confirmed.load(Ordering::Relaxed)
	}
	/// Confirmations for digests already archived.
	pub fn duplicate_total(&self) -> u64 {
		self.duplicate.load(Ordering::Relaxed)
	}
	/// Transactions moved from the pool into the archive.
	pub fn additions_total(&self) -> u64 {
		self.additions.load(Ordering::Relaxed)
	}
	/// Confirmations whose transaction could not be found anywhere.
	pub fn lost_total(&self) -> u64 {
		self.lost.load(Ordering::Relaxed)
	}
	/// Total confirmations processed through the flush path.
	pub fn processed_total(&self) -> u64 {
		self.processed.load(Ordering::Relaxed)
	}

	pub(crate) fn inc_confirmed(&self) {
		self.confirmed.fetch_add(1, Ordering::Relaxed);
	}
	fn inc_duplicate(&self) {
		self.duplicate.fetch_add(1, Ordering::Relaxed);
	}
	fn inc_additions(&self) {
		self.additions.fetch_add(1, Ordering::Relaxed);
	}
	fn inc_lost(&self) {
		self.lost.fetch_add(1, Ordering::Relaxed);
	}
	fn inc_processed(&self) {
		self.processed.fetch_add(1, Ordering::Relaxed);
	}
}

/// Drains the confirmation queue and archives confirmed transactions.
/// Driven through the reactor as a two-state machine.
pub struct TransactionArchiver {
	lane: u32,
	pool: Arc<TransactionMemoryPool>,
	archive: Arc<TransactionArchive>,
	confirmation_queue: BoundedQueue<Digest>,
	batch: Vec<Digest>,
	sm: StateMachine<State>,
	counters: Arc<ArchiverCounters>,
}

impl TransactionArchiver {
	/// New archiver bridging the provided pool and archive.
	pub fn new(
		lane: u32,
		pool: Arc<TransactionMemoryPool>,
		archive: Arc<TransactionArchive>,
	) -> TransactionArchiver {
		TransactionArchiver {
			lane,
			pool,
			archive,
			confirmation_queue: BoundedQueue::new(CONFIRMATION_QUEUE_SIZE),
			batch: Vec::with_capacity(BATCH_SIZE),
			sm: StateMachine::new(&format!("TxArchiver-{}", lane), State::Collecting),
			counters: Arc::new(ArchiverCounters::default()),
		}
	}

	/// A producer handle onto the confirmation queue. Pushing blocks
	/// briefly while the queue is full, so confirmations are never lost.
	pub fn confirmation_queue(&self) -> BoundedQueue<Digest> {
		self.confirmation_queue.clone()
	}

	/// The archiver's counters.
	pub fn counters(&self) -> Arc<ArchiverCounters> {
		self.counters.clone()
	}

	/// The current state machine state.
	pub fn state(&self) -> State {
		self.sm.state()
	}

	fn on_collecting(&mut self) -> State {
		loop {
			let popped = self.confirmation_queue.try_pop();
			if let Some(digest) = popped {
				self.batch.push(digest);
			}

			let is_buffer_full = self.batch.len() == BATCH_SIZE;
			let is_batch_complete = popped.is_none() && !self.batch.is_empty();
			if is_buffer_full || is_batch_complete {
				return State::Flushing;
			}

			// queue is empty and nothing to write, hold in this state
			if popped.is_none() {
				self.sm.delay(IDLE_DELAY);
				return State::Collecting;
			}
		}
	}

	fn on_flushing(&mut self) -> State {
		let current = match self.batch.last() {
			Some(digest) => *digest,
			None => return State::Collecting,
		};

		if self.archive.has(&current) {
			self.counters.inc_duplicate();
		} else if let Some(tx) = self.pool.get(&current) {
			match self.archive.add(&tx) {
				Ok(()) => {
					self.pool.remove(&current);
					self.counters.inc_additions();
				}
				Err(e) => {
					error!(
						"lane {}: failed to archive tx {}: {}",
						self.lane, current, e
					);
					self.counters.inc_lost();
				}
			}
		} else {
			warn!(
				"lane {}: unable to lookup tx 0x{} from pool",
				self.lane,
				current.to_hex()
			);
			self.counters.inc_lost();
		}

		self.batch.pop();
		self.counters.inc_processed();

		if self.batch.is_empty() {
			// settle the batch onto disk before collecting more
			if let Err(e) = self.archive.flush(false) {
				error!("lane {}: archive flush failed: {}", self.lane, e);
			}
		}

		State::Flushing
	}
}

impl Runnable for TransactionArchiver {
	fn name(&self) -> String {
		format!("TxArchiver-{}", self.lane)
	}

	fn is_ready_to_execute(&self) -> bool {
		self.sm.is_ready()
	}

	fn execute(&mut self) {
		let next = match self.sm.state() {
			State::Collecting => self.on_collecting(),
			State::Flushing => self.on_flushing(),
		};
		self.sm.transition(next);
	}
}
