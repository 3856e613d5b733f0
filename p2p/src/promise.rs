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

//! Handles to in-flight RPC results. A promise is settled exactly once by
//! the transport and polled (never awaited) by the requesting state
//! machines. Each promise carries a wall-clock deadline; a promise past its
//! deadline counts as failed and a late result is discarded.

use log::warn;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use weft_core::ser::{self, Readable};
use weft_util::Mutex;

static NEXT_PROMISE_ID: AtomicU64 = AtomicU64::new(1);

enum State {
	Waiting { deadline: Option<Instant> },
	Complete(Vec<u8>),
	Failed,
}

/// Result of polling an untyped promise.
pub enum Poll {
	/// Not settled yet
	Pending,
	/// Settled successfully with the response payload
	Complete(Vec<u8>),
	/// Failed, timed out or unreachable
	Failed,
}

/// A handle to the byte payload of an in-flight RPC call.
#[derive(Clone)]
pub struct Promise {
	id: u64,
	state: Arc<Mutex<State>>,
}

impl Promise {
	/// New pending promise with no deadline.
	pub fn new() -> Promise {
		Promise {
			id: NEXT_PROMISE_ID.fetch_add(1, Ordering::Relaxed),
			state: Arc::new(Mutex::new(State::Waiting { deadline: None })),
		}
	}

	/// Unique id of this promise.
	pub fn id(&self) -> u64 {
		self.id
	}

	/// Arm the wall-clock deadline, measured from now.
	pub fn set_deadline(&self, timeout: Duration) {
		let mut state = self.state.lock();
		if let State::Waiting { ref mut deadline } = *state {
			*deadline = Some(Instant::now() + timeout);
		}
	}

	/// Settle the promise with a response payload. Ignored once the promise
	/// has already been settled or has timed out.
	pub fn fulfill(&self, payload: Vec<u8>) {
		let mut state = self.state.lock();
		match *state {
			State::Waiting { deadline } => {
				if deadline.map(|d| Instant::now() >= d).unwrap_or(false) {
					// late result, the caller already gave up on it
					*state = State::Failed;
				} else {
					*state = State::Complete(payload);
				}
			}
			_ => (),
		}
	}

	/// Settle the promise as failed. Ignored once settled.
	pub fn fail(&self) {
		let mut state = self.state.lock();
		if let State::Waiting { .. } = *state {
			*state = State::Failed;
		}
	}

	/// Current status. An expired deadline turns a pending promise into a
	/// failure at poll time.
	pub fn poll(&self) -> Poll {
		let mut state = self.state.lock();
		match *state {
			State::Waiting { deadline } => {
				if deadline.map(|d| Instant::now() >= d).unwrap_or(false) {
					*state = State::Failed;
					Poll::Failed
				} else {
					Poll::Pending
				}
			}
			State::Complete(ref payload) => Poll::Complete(payload.clone()),
			State::Failed => Poll::Failed,
		}
	}
}

impl Default for Promise {
	fn default() -> Promise {
		Promise::new()
	}
}

/// Result of polling a typed promise.
pub enum Resolution<T> {
	/// Not settled yet
	Pending,
	/// Settled and decoded successfully
	Complete(T),
	/// Failed, timed out or undecodable
	Failed,
}

/// A promise whose payload decodes into `T`. A payload that fails to decode
/// counts as a failed promise.
pub struct PromiseOf<T> {
	promise: Promise,
	_marker: PhantomData<T>,
}

impl<T: Readable> PromiseOf<T> {
	/// Wraps an untyped promise.
	pub fn new(promise: Promise) -> PromiseOf<T> {
		PromiseOf {
			promise,
			_marker: PhantomData,
		}
	}

	/// Unique id of the underlying promise.
	pub fn id(&self) -> u64 {
		self.promise.id()
	}

	/// Current status, decoding the payload on completion.
	pub fn poll(&self) -> Resolution<T> {
		match self.promise.poll() {
			Poll::Pending => Resolution::Pending,
			Poll::Failed => Resolution::Failed,
			Poll::Complete(payload) => match ser::deserialize(&mut &payload[..]) {
				Ok(value) => Resolution::Complete(value),
				Err(e) => {
					warn!("promise {}: undecodable response: {}", self.promise.id(), e);
					Resolution::Failed
				}
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::thread;
	use weft_core::ser::ser_vec;

	#[test]
	fn fulfill_then_poll() {
		let promise = Promise::new();
		assert!(matches!(promise.poll(), Poll::Pending));

		promise.fulfill(vec![1, 2, 3]);
		match promise.poll() {
			Poll::Complete(payload) => assert_eq!(payload, vec![1, 2, 3]),
			_ => panic!("expected completion"),
		}
	}

	#[test]
	fn fail_is_sticky() {
		let promise = Promise::new();
		promise.fail();
		promise.fulfill(vec![1]);
		assert!(matches!(promise.poll(), Poll::Failed));
	}

	#[test]
	fn deadline_expiry_fails_the_promise() {
		let promise = Promise::new();
		promise.set_deadline(Duration::from_millis(20));
		assert!(matches!(promise.poll(), Poll::Pending));

		thread::sleep(Duration::from_millis(30));
		assert!(matches!(promise.poll(), Poll::Failed));

		// a late result is discarded
		promise.fulfill(vec![1]);
		assert!(matches!(promise.poll(), Poll::Failed));
	}

	#[test]
	fn typed_promise_decodes() {
		let promise = Promise::new();
		let typed: PromiseOf<u64> = PromiseOf::new(promise.clone());

		promise.fulfill(ser_vec(&99u64).unwrap());
		match typed.poll() {
			Resolution::Complete(value) => assert_eq!(value, 99),
			_ => panic!("expected completion"),
		}
	}

	#[test]
	fn typed_promise_rejects_garbage() {
		let promise = Promise::new();
		let typed: PromiseOf<u64> = PromiseOf::new(promise.clone());

		promise.fulfill(vec![1, 2]); // not enough bytes for a u64
		assert!(matches!(typed.poll(), Resolution::Failed));
	}
}
