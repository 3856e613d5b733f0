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

//! Queue of explicitly requested missing digests. Local consumers (the
//! block coordinator, typically) announce digests they need; the sync
//! service drains the queue and asks peers for them directly.

use weft_core::{Digest, DigestSet};
use weft_p2p::{CallContext, Error, Protocol};
use weft_util::BoundedQueue;

use weft_core::ser;

/// Method id: enqueue digests that must be fetched from peers.
pub const ISSUE_CALL_FOR_MISSING_TXS: u8 = 1;

/// Capacity of the missing-digest queue.
const QUEUE_SIZE: usize = 1 << 15;

/// The missing-transaction finder behind the `MISSING_TX_FINDER` service
/// id.
pub struct TxFinderProtocol {
	queue: BoundedQueue<Digest>,
}

impl Default for TxFinderProtocol {
	fn default() -> TxFinderProtocol {
		TxFinderProtocol::new()
	}
}

impl TxFinderProtocol {
	/// New finder with an empty queue.
	pub fn new() -> TxFinderProtocol {
		TxFinderProtocol {
			queue: BoundedQueue::new(QUEUE_SIZE),
		}
	}

	/// Pop one requested digest, if any.
	pub fn pop(&self) -> Option<Digest> {
		self.queue.try_pop()
	}

	/// Queue digests that should be fetched from peers.
	pub fn issue_call_for_missing_txs(&self, digests: DigestSet) {
		for digest in digests {
			self.queue.push(digest);
		}
	}
}

impl Protocol for TxFinderProtocol {
	fn dispatch(&self, method: u8, body: &[u8], _ctx: &CallContext) -> Result<Vec<u8>, Error> {
		match method {
			ISSUE_CALL_FOR_MISSING_TXS => {
				let digests: Vec<Digest> = ser::deserialize(&mut &*body)?;
				self.issue_call_for_missing_txs(digests.into_iter().collect());
				Ok(vec![])
			}
			_ => Err(Error::UnknownMethod {
				service: weft_p2p::SERVICE_MISSING_TX_FINDER,
				method,
			}),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pop_drains_in_order_of_issue() {
		let finder = TxFinderProtocol::new();
		assert_eq!(finder.pop(), None);

		let mut digests = DigestSet::default();
		digests.insert(Digest([1; 32]));
		finder.issue_call_for_missing_txs(digests);

		assert_eq!(finder.pop(), Some(Digest([1; 32])));
		assert_eq!(finder.pop(), None);
	}
}
