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

//! Calling side of the RPC layer: frames a method call against one
//! service, hands it to the endpoint and returns a typed promise with the
//! client's deadline armed.

use log::trace;
use std::sync::Arc;
use std::time::Duration;

use weft_core::ser::Readable;

use crate::msg;
use crate::promise::PromiseOf;
use crate::types::{Endpoint, PeerAddr};

/// A client bound to one service on one endpoint.
pub struct RpcClient {
	name: String,
	endpoint: Arc<dyn Endpoint>,
	service: u16,
	channel: u16,
	timeout: Duration,
}

impl RpcClient {
	/// New client calling `service` over `channel` with the given
	/// per-request deadline.
	pub fn new(
		name: &str,
		endpoint: Arc<dyn Endpoint>,
		service: u16,
		channel: u16,
		timeout: Duration,
	) -> RpcClient {
		RpcClient {
			name: name.to_owned(),
			endpoint,
			service,
			channel,
			timeout,
		}
	}

	/// Issue a call with a pre-encoded argument payload. The returned
	/// promise fails by itself once the deadline elapses.
	pub fn call<T: Readable>(&self, peer: &PeerAddr, method: u8, body: Vec<u8>) -> PromiseOf<T> {
		trace!(
			"{}: calling {}/{} on {:?}, {} arg bytes",
			self.name,
			self.service,
			method,
			peer,
			body.len()
		);
		let frame = msg::encode_request(self.service, self.channel, method, &body);
		let promise = self.endpoint.request(peer, frame);
		promise.set_deadline(self.timeout);
		PromiseOf::new(promise)
	}
}
