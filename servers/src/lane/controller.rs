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

//! Lane controller: the node tells each lane which peers to talk to. The
//! peer set itself is opaque to the storage core.

use log::info;
use std::sync::Arc;

use weft_core::ser;
use weft_p2p::{CallContext, Endpoint, Error, PeerAddr, Protocol};

/// Method id: replace the lane's peer set.
pub const USE_THESE_PEERS: u8 = 1;

/// Connects the lane's external endpoint to the peers the node hands down.
pub struct LaneController {
	endpoint: Arc<dyn Endpoint>,
}

impl LaneController {
	/// New controller managing the provided endpoint.
	pub fn new(endpoint: Arc<dyn Endpoint>) -> LaneController {
		LaneController { endpoint }
	}

	/// Connect to the given peers, dropping connections to absent ones.
	pub fn use_these_peers(&self, peers: Vec<PeerAddr>) {
		info!("connecting lane endpoint to {} peers", peers.len());
		for existing in self.endpoint.connected_peers() {
			if !peers.contains(&existing) {
				self.endpoint.disconnect(&existing);
			}
		}
		for peer in peers {
			self.endpoint.connect(peer);
		}
	}
}

/// The controller behind the `CONTROLLER` service id.
pub struct LaneControllerProtocol {
	controller: Arc<LaneController>,
}

impl LaneControllerProtocol {
	/// New protocol wrapping the provided controller.
	pub fn new(controller: Arc<LaneController>) -> LaneControllerProtocol {
		LaneControllerProtocol { controller }
	}
}

impl Protocol for LaneControllerProtocol {
	fn dispatch(&self, method: u8, body: &[u8], _ctx: &CallContext) -> Result<Vec<u8>, Error> {
		match method {
			USE_THESE_PEERS => {
				let peers: Vec<PeerAddr> = ser::deserialize(&mut &*body)?;
				self.controller.use_these_peers(peers);
				Ok(vec![])
			}
			_ => Err(Error::UnknownMethod {
				service: weft_p2p::SERVICE_CONTROLLER,
				method,
			}),
		}
	}
}
