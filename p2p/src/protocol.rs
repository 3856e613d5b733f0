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

//! Serving side of the RPC layer: protocols expose methods under a
//! service id, the server decodes incoming frames and routes them.

use std::collections::HashMap;
use std::sync::Arc;

use weft_util::RwLock;

use crate::msg;
use crate::types::{Error, PeerAddr};

/// Context of an incoming call.
#[derive(Clone, Copy, Debug)]
pub struct CallContext {
	/// Address of the calling peer
	pub sender: PeerAddr,
}

/// A service exposed over RPC. Implementations decode their own method
/// arguments from the body and encode their own response payloads; all
/// methods are expected to return promptly.
pub trait Protocol: Send + Sync {
	/// Handle one call, returning the response payload.
	fn dispatch(&self, method: u8, body: &[u8], ctx: &CallContext) -> Result<Vec<u8>, Error>;
}

/// Routes decoded frames to the protocol registered for their service id.
pub struct RpcServer {
	services: RwLock<HashMap<u16, Arc<dyn Protocol>>>,
}

impl Default for RpcServer {
	fn default() -> RpcServer {
		RpcServer::new()
	}
}

impl RpcServer {
	/// New server with no services registered.
	pub fn new() -> RpcServer {
		RpcServer {
			services: RwLock::new(HashMap::new()),
		}
	}

	/// Register a protocol under a service id, replacing any previous one.
	pub fn add_service(&self, service: u16, protocol: Arc<dyn Protocol>) {
		self.services.write().insert(service, protocol);
	}

	/// Decode a frame and dispatch it, returning the response payload.
	pub fn handle(&self, frame: &[u8], ctx: &CallContext) -> Result<Vec<u8>, Error> {
		let (header, body) = msg::decode_request(frame)?;
		let protocol = self
			.services
			.read()
			.get(&header.service)
			.cloned()
			.ok_or(Error::UnknownService(header.service))?;
		protocol.dispatch(header.method, &body, ctx)
	}
}
