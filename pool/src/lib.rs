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

//! The volatile half of a lane's transaction storage: the memory pool of
//! unconfirmed transactions, the recent-transaction cache polled by the
//! block packer, the confirmation-driven archiver that moves transactions
//! into the durable store, and the storage engine facade binding it all
//! together.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

use failure::Fail;

use weft_store as store;

pub mod aggregator;
pub mod archiver;
pub mod engine;
pub mod mem_pool;
pub mod recent_cache;

pub use crate::aggregator::TransactionStoreAggregator;
pub use crate::archiver::{ArchiverCounters, TransactionArchiver};
pub use crate::engine::{StoreMode, TransactionStorageEngine, MAX_NUM_RECENT_TX};
pub use crate::mem_pool::TransactionMemoryPool;
pub use crate::recent_cache::RecentTransactionsCache;

/// Main error type for this crate.
#[derive(Debug, Fail)]
pub enum Error {
	/// Digest not present in either the pool or the archive
	#[fail(display = "transaction not found")]
	NotFound,
	/// The transaction is routed to another lane and may not be stored here
	#[fail(display = "transaction belongs to lane {}, this engine owns lane {}", tx_lane, lane)]
	ShardMismatch {
		/// Lane the digest routes to
		tx_lane: u32,
		/// Lane this engine owns
		lane: u32,
	},
	/// Failure in the durable store
	#[fail(display = "storage error: {}", _0)]
	Store(store::Error),
}

impl From<store::Error> for Error {
	fn from(e: store::Error) -> Error {
		Error::Store(e)
	}
}
